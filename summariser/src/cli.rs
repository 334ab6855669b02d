use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use psi_summariser::filter::DEFAULT_RUN_ID_RE;
use psi_summariser::model::PsiField;

#[derive(Parser)]
#[command(about, version, long_about = None)]
pub struct CliArgs {
    /// Path to a TOML config file.
    #[arg(long, global = true, env = "PSI_SUMMARISER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Parse a PSI dump, and optionally a logcat, into CSV tables.
    Parse(ParseArgs),
    /// Compute the CUJ KPIs of a single run.
    Kpis(KpiArgs),
    /// Compute statistics of the KPIs across several runs.
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct InputArgs {
    /// Path to the PSI dump written by the PSI monitor.
    #[arg(long)]
    pub psi_dump: PathBuf,

    /// Path to the logcat captured during the same run.
    #[arg(long)]
    pub logcat: Option<PathBuf>,
}

#[derive(Args)]
pub struct ParseArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output path of the PSI table.
    #[arg(long)]
    pub psi_csv: PathBuf,

    /// Output path of the events table. Defaults to `events.csv` next to the PSI table.
    #[arg(long)]
    pub events_csv: Option<PathBuf>,
}

#[derive(Args)]
pub struct KpiArgs {
    #[command(flatten)]
    pub input: InputArgs,

    /// Output path of the KPI table.
    #[arg(long, default_value = "kpis.csv")]
    pub out_kpi_csv: PathBuf,

    /// The PSI metric to compute KPIs from, overrides the config file.
    #[arg(long)]
    pub psi_to_monitor: Option<PsiField>,
}

#[derive(Args)]
pub struct StatsArgs {
    /// Comma separated paths of the KPI tables of each run.
    #[arg(
        long,
        value_delimiter = ',',
        required_unless_present = "runs_dir",
        conflicts_with = "runs_dir"
    )]
    pub kpi_csv_files: Vec<PathBuf>,

    /// Directory to search for KPI tables instead of listing them.
    #[arg(long)]
    pub runs_dir: Option<PathBuf>,

    /// Regex matched from the start of each KPI table path. Its first capture group is the run id.
    #[arg(long, default_value = DEFAULT_RUN_ID_RE)]
    pub run_id_re: String,

    /// Output path of the statistics table.
    #[arg(long)]
    pub out_file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }

    #[test]
    fn stats_accepts_comma_separated_files() {
        let args = CliArgs::try_parse_from([
            "psi-summariser",
            "stats",
            "--kpi-csv-files",
            "a/run_1/processed/kpis.csv,a/run_2/processed/kpis.csv",
            "--out-file",
            "stats.csv",
        ])
        .unwrap();
        let Command::Stats(stats) = args.command else {
            panic!("Expected stats command");
        };
        assert_eq!(stats.kpi_csv_files.len(), 2);
        assert_eq!(stats.run_id_re, DEFAULT_RUN_ID_RE);
    }

    #[test]
    fn stats_requires_an_input() {
        assert!(
            CliArgs::try_parse_from(["psi-summariser", "stats", "--out-file", "s.csv"]).is_err()
        );
    }

    #[test]
    fn kpis_parses_psi_field() {
        let args = CliArgs::try_parse_from([
            "psi-summariser",
            "kpis",
            "--psi-dump",
            "psi.txt",
            "--psi-to-monitor",
            "io_full_avg60",
        ])
        .unwrap();
        let Command::Kpis(kpis) = args.command else {
            panic!("Expected kpis command");
        };
        assert_eq!(kpis.psi_to_monitor.unwrap().to_string(), "io_full_avg60");
        assert!(CliArgs::try_parse_from([
            "psi-summariser",
            "kpis",
            "--psi-dump",
            "psi.txt",
            "--psi-to-monitor",
            "io_full_avg5",
        ])
        .is_err());
    }
}
