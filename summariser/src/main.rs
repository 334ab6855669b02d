use std::path::Path;

use anyhow::Context;
use clap::Parser as _;
use log::{debug, info};
use psi_summariser::config::PsiConfig;
use psi_summariser::frame::{
    events_frame, kpi_frame, pressure_frame, read_kpi_csv, stats_frame, write_csv,
};
use psi_summariser::{filter, parse_run, RunAggregator};
use regex::Regex;

use crate::cli::{CliArgs, Command, KpiArgs, ParseArgs, StatsArgs};

mod cli;

/// Default name of the events table, next to the PSI table
const DEFAULT_EVENTS_CSV: &str = "events.csv";

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = CliArgs::parse();
    let config = match &args.config {
        Some(path) => PsiConfig::load(path)
            .with_context(|| format!("Loading config from {}", path.display()))?,
        None => PsiConfig::default(),
    };
    debug!("Using config: {config:?}");

    match args.command {
        Command::Parse(args) => parse(args, &config),
        Command::Kpis(args) => kpis(args, config),
        Command::Stats(args) => stats(args),
    }
}

fn parse(args: ParseArgs, config: &PsiConfig) -> anyhow::Result<()> {
    let run = parse_run(&args.input.psi_dump, args.input.logcat.as_deref(), config)?;

    write_csv(&mut pressure_frame(&run.dump.records)?, &args.psi_csv)?;
    info!(
        "Wrote {} PSI records to {}",
        run.dump.records.len(),
        args.psi_csv.display()
    );

    if let Some(events) = &run.events {
        let events_csv = args.events_csv.unwrap_or_else(|| {
            args.psi_csv
                .parent()
                .unwrap_or(Path::new(""))
                .join(DEFAULT_EVENTS_CSV)
        });
        write_csv(&mut events_frame(events)?, &events_csv)?;
        info!("Wrote {} events to {}", events.len(), events_csv.display());
    }

    Ok(())
}

fn kpis(args: KpiArgs, mut config: PsiConfig) -> anyhow::Result<()> {
    if let Some(psi_to_monitor) = args.psi_to_monitor {
        config.psi_to_monitor = psi_to_monitor;
    }

    let kpis = parse_run(&args.input.psi_dump, args.input.logcat.as_deref(), &config)?
        .kpis(config.psi_to_monitor)
        .with_context(|| format!("Computing KPIs for {}", args.input.psi_dump.display()))?;

    write_csv(&mut kpi_frame(&kpis)?, &args.out_kpi_csv)?;
    info!("Wrote {} KPIs to {}", kpis.len(), args.out_kpi_csv.display());
    Ok(())
}

fn stats(args: StatsArgs) -> anyhow::Result<()> {
    let run_id_re = Regex::new(&args.run_id_re)
        .with_context(|| format!("Invalid run id regex {}", args.run_id_re))?;

    let paths = match &args.runs_dir {
        Some(runs_dir) => filter::find_kpi_tables(runs_dir)?,
        None => args.kpi_csv_files,
    };

    let mut aggregator = RunAggregator::new();
    for (run_id, path) in filter::select_kpi_tables(paths, &run_id_re) {
        debug!("Reading KPIs of run {run_id} from {}", path.display());
        aggregator = aggregator.with_run(run_id, read_kpi_csv(&path)?);
    }

    let stats = aggregator.aggregate().context("Aggregating KPIs")?;
    write_csv(&mut stats_frame(&stats)?, &args.out_file)?;
    info!(
        "Wrote statistics for {} KPIs across {} runs to {}",
        stats.len(),
        aggregator.run_ids().count(),
        args.out_file.display()
    );
    Ok(())
}
