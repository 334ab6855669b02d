use std::path::Path;

use anyhow::Context;
use psi_kpi_model::KpiRow;

use crate::config::PsiConfig;
use crate::dump::PsiDump;
use crate::model::{LogEvent, PsiField};

pub mod aggregate;
mod analyze;
pub mod config;
pub mod dump;
pub mod filter;
pub mod frame;
pub mod grammar;
pub mod kpi;
pub mod logcat;
pub mod model;
mod partition;

pub use aggregate::{AggregateError, RunAggregator};
pub use kpi::{extract_kpis, KpiError};

/// The parsed inputs of a single run.
#[derive(Debug, Clone)]
pub struct ParsedRun {
    pub dump: PsiDump,
    /// Events from the logcat, if one was captured
    pub events: Option<Vec<LogEvent>>,
}

impl ParsedRun {
    pub fn kpis(&self, psi_to_monitor: PsiField) -> Result<Vec<KpiRow>, KpiError> {
        extract_kpis(&self.dump.records, self.events.as_deref(), psi_to_monitor)
    }
}

/// Parse the PSI dump of a run and, when given, its logcat.
///
/// Logcat timestamps are made relative to the start of the PSI dump.
pub fn parse_run(
    psi_dump: &Path,
    logcat: Option<&Path>,
    config: &PsiConfig,
) -> anyhow::Result<ParsedRun> {
    let dump = dump::parse_psi_dump_file(psi_dump)
        .with_context(|| format!("Parsing PSI dump {}", psi_dump.display()))?;
    log::debug!(
        "Parsed {} PSI records from {}, monitor started at {}",
        dump.records.len(),
        psi_dump.display(),
        dump.monitor_start_epoch_millis
    );

    let events = logcat
        .map(|logcat| {
            logcat::parse_logcat_file(logcat, dump.monitor_start_epoch_millis, config)
                .with_context(|| format!("Parsing logcat {}", logcat.display()))
        })
        .transpose()?;

    Ok(ParsedRun { dump, events })
}
