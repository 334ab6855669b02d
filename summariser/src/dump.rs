use std::io::{BufRead as _, Read};
use std::path::Path;
use std::str::FromStr;

use chrono::{Local, NaiveDateTime, TimeZone};

use crate::grammar::{self, EVENT_DESCRIPTIONS, LOCAL_DATETIME, UPTIME_MILLIS};
use crate::model::{PressureRecord, PsiField, PsiStat};

/// Format of the local timestamps in both the PSI dump and logcat.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// The parsed PSI dump of a single run.
#[derive(Debug, Clone, PartialEq)]
pub struct PsiDump {
    /// Records in sampling order
    pub records: Vec<PressureRecord>,
    /// Epoch time of the first record, the reference for every relative timestamp of the run
    pub monitor_start_epoch_millis: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum DumpParseError {
    #[error("An error occurred while reading the PSI dump: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse PSI line {line_number}: {line}\n\nFormat: {grammar}")]
    Format {
        line_number: usize,
        line: String,
        grammar: &'static str,
    },
    #[error("Invalid value `{value}` for `{field}` on PSI line {line_number}")]
    InvalidValue {
        line_number: usize,
        field: String,
        value: String,
    },
    #[error("Uptime went backwards on PSI line {line_number}: {uptime_millis}ms after {previous_uptime_millis}ms")]
    UptimeWentBackwards {
        line_number: usize,
        uptime_millis: i64,
        previous_uptime_millis: i64,
    },
    #[error("The PSI dump has no records")]
    Empty,
}

/// Parse a PSI dump file.
pub fn parse_psi_dump_file<P>(path: P) -> Result<PsiDump, DumpParseError>
where
    P: AsRef<Path>,
{
    let file = std::fs::File::open(path)?;
    parse_psi_dump(file)
}

/// Parse a PSI dump from a reader.
pub fn parse_psi_dump<R>(reader: R) -> Result<PsiDump, DumpParseError>
where
    R: Read,
{
    let lines = std::io::BufReader::new(reader)
        .lines()
        .collect::<Result<Vec<_>, _>>()?;
    parse_psi_lines(lines)
}

/// Parse the lines of a PSI dump.
///
/// Every non-blank line must match [grammar::psi_line_regex]. A line that doesn't means the
/// monitor changed its output format, so the whole dump is rejected rather than skipping the
/// line.
pub fn parse_psi_lines<I, S>(lines: I) -> Result<PsiDump, DumpParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records: Vec<PressureRecord> = Vec::new();
    let mut monitor_start: Option<(i64, i64)> = None;

    for (index, line) in lines.into_iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        let line_number = index + 1;
        let mut record = parse_psi_line(line, line_number)?;

        if let Some(previous) = records.last() {
            if record.uptime_millis < previous.uptime_millis {
                return Err(DumpParseError::UptimeWentBackwards {
                    line_number,
                    uptime_millis: record.uptime_millis,
                    previous_uptime_millis: previous.uptime_millis,
                });
            }
        }

        let (start_uptime_millis, _) =
            *monitor_start.get_or_insert((record.uptime_millis, record.epoch_millis));
        record.monitor_start_relative_millis = record.uptime_millis - start_uptime_millis;

        log::trace!("PSI record: {record:?}");
        records.push(record);
    }

    let (_, monitor_start_epoch_millis) = monitor_start.ok_or(DumpParseError::Empty)?;
    log::debug!(
        "Parsed {} PSI records, monitor started at {monitor_start_epoch_millis}",
        records.len()
    );

    Ok(PsiDump {
        records,
        monitor_start_epoch_millis,
    })
}

/// Parse one trimmed dump line. The relative time is filled in by the caller.
fn parse_psi_line(line: &str, line_number: usize) -> Result<PressureRecord, DumpParseError> {
    let caps = grammar::psi_line_regex()
        .captures(line)
        .ok_or_else(|| DumpParseError::Format {
            line_number,
            line: line.to_string(),
            grammar: grammar::psi_line_grammar(),
        })?;

    let local_datetime = truncate_to_micros(&caps[LOCAL_DATETIME]);
    let mut record = PressureRecord {
        uptime_millis: parse_value(&caps[UPTIME_MILLIS], UPTIME_MILLIS, line_number)?,
        epoch_millis: local_epoch_millis(&local_datetime),
        local_datetime,
        ..Default::default()
    };

    for field in PsiField::all() {
        let name = field.to_string();
        // Optional blocks that are absent keep their zero defaults
        let Some(value) = caps.name(&name) else {
            continue;
        };
        let value = value.as_str();
        let stats = record.block_mut(field.block);
        match field.stat {
            PsiStat::Avg10 => stats.avg10 = parse_value(value, &name, line_number)?,
            PsiStat::Avg60 => stats.avg60 = parse_value(value, &name, line_number)?,
            PsiStat::Avg300 => stats.avg300 = parse_value(value, &name, line_number)?,
            PsiStat::Total => stats.total = parse_value(value, &name, line_number)?,
        }
    }

    record.event_descriptions = caps
        .name(EVENT_DESCRIPTIONS)
        .map(|segment| grammar::split_annotations(segment.as_str()))
        .unwrap_or_default();

    Ok(record)
}

fn parse_value<T: FromStr>(
    value: &str,
    field: &str,
    line_number: usize,
) -> Result<T, DumpParseError> {
    value.parse().map_err(|_| DumpParseError::InvalidValue {
        line_number,
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// The monitor prints nanoseconds but only microseconds are kept.
fn truncate_to_micros(datetime: &str) -> String {
    match datetime.split_once('.') {
        Some((seconds, fraction)) => {
            format!("{seconds}.{}", fraction.chars().take(6).collect::<String>())
        }
        None => datetime.to_string(),
    }
}

/// Convert a naive local timestamp to milliseconds since the Unix epoch.
///
/// Returns 0 when the timestamp is not a valid local time. The values recorded alongside it are
/// still usable, so this is not treated as an error.
pub(crate) fn local_epoch_millis(datetime: &str) -> i64 {
    let parsed = NaiveDateTime::parse_from_str(datetime, DATETIME_FORMAT)
        .map_err(|e| e.to_string())
        .and_then(|naive| {
            Local
                .from_local_datetime(&naive)
                .earliest()
                .ok_or_else(|| "not a valid local time".to_string())
        });

    match parsed {
        Ok(datetime) => datetime.timestamp_millis(),
        Err(e) => {
            log::warn!("Error parsing date '{datetime}': {e}");
            0
        }
    }
}
