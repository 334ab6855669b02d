use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use regex::Captures;

use crate::config::PsiConfig;
use crate::dump::local_epoch_millis;
use crate::grammar::{self, LOCAL_DATETIME};
use crate::model::{EventColor, LogEvent, LogEventKind};

#[derive(Debug, thiserror::Error)]
pub enum LogcatError {
    #[error("An error occurred while reading logcat: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse the CUJ events from a logcat file.
pub fn parse_logcat_file<P>(
    path: P,
    monitor_start_epoch_millis: i64,
    config: &PsiConfig,
) -> Result<Vec<LogEvent>, LogcatError>
where
    P: AsRef<Path>,
{
    let file = std::fs::File::open(path)?;
    parse_logcat(file, monitor_start_epoch_millis, config)
}

/// Parse the CUJ events from a reader.
///
/// Logcat may contain bytes that are not valid UTF-8, they are replaced rather than failing the
/// whole log.
pub fn parse_logcat<R>(
    mut reader: R,
    monitor_start_epoch_millis: i64,
    config: &PsiConfig,
) -> Result<Vec<LogEvent>, LogcatError>
where
    R: Read,
{
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;
    let content = String::from_utf8_lossy(&content);
    Ok(parse_logcat_lines(
        content.lines(),
        monitor_start_epoch_millis,
        config,
    ))
}

/// Parse the CUJ events from logcat lines.
///
/// Lines that don't match any of the known shapes are ignored.
pub fn parse_logcat_lines<I, S>(
    lines: I,
    monitor_start_epoch_millis: i64,
    config: &PsiConfig,
) -> Vec<LogEvent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    // Occurrences of each event key seen so far in this log
    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut events = Vec::new();

    for line in lines {
        let line = line.as_ref().trim();
        let Some(matched) = match_line(line, config) else {
            continue;
        };

        let epoch_millis = local_epoch_millis(&matched.local_datetime);
        let monitor_start_relative_millis = epoch_millis - monitor_start_epoch_millis;
        if monitor_start_relative_millis < -config.event_time_tolerance_millis {
            log::debug!(
                "Dropping event {:?} at {monitor_start_relative_millis}ms, too long before the monitor started",
                matched.description
            );
            continue;
        }

        let mut description = matched.description;
        let mut event_key = matched.key;
        if let Some(key) = event_key.as_mut() {
            let count = occurrences.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                let suffix = format!(": Occurrence {count}");
                key.push_str(&suffix);
                description.push_str(&suffix);
            }
        }

        events.push(LogEvent {
            epoch_millis,
            monitor_start_relative_millis,
            kind: matched.kind,
            event_tag: matched.kind.tag().to_string(),
            event_description: description,
            event_key,
            duration_value: matched.duration_millis,
            is_high_latency_event: matched.is_high_latency,
            color: matched.color,
            should_plot: matched.should_plot,
        });
    }

    log::debug!("Parsed {} logcat events", events.len());
    events
}

/// The parts of an event that only depend on its own line.
struct MatchedLine {
    kind: LogEventKind,
    local_datetime: String,
    description: String,
    key: Option<String>,
    duration_millis: Option<i64>,
    is_high_latency: bool,
    color: EventColor,
    should_plot: bool,
}

impl MatchedLine {
    fn new(kind: LogEventKind, caps: &Captures, description: String, color: EventColor) -> Self {
        Self {
            kind,
            local_datetime: caps[LOCAL_DATETIME].to_string(),
            description,
            key: None,
            duration_millis: None,
            is_high_latency: false,
            color,
            should_plot: true,
        }
    }
}

/// Match a line against each known shape, in order. The first match wins.
fn match_line(line: &str, config: &PsiConfig) -> Option<MatchedLine> {
    if let Some(caps) = grammar::task_start_regex().captures(line) {
        let description = format!(
            "Started {} for user {}",
            &caps["activity_name"], &caps["user_id"]
        );
        return Some(MatchedLine::new(
            LogEventKind::TaskStart,
            &caps,
            description,
            EventColor::Lime,
        ));
    }

    if let Some(caps) = grammar::task_displayed_regex().captures(line) {
        let duration_millis = displayed_duration_millis(&caps)?;
        let key = format!(
            "Displayed {} for user {}",
            &caps["activity_name"], &caps["user_id"]
        );
        let is_high_latency = duration_millis >= config.displayed_high_latency_millis;
        return Some(MatchedLine {
            key: Some(key.clone()),
            duration_millis: Some(duration_millis),
            is_high_latency,
            ..MatchedLine::new(
                LogEventKind::TaskDisplayed,
                &caps,
                format!("{key} took {duration_millis}ms"),
                if is_high_latency {
                    EventColor::OrangeRed
                } else {
                    EventColor::Green
                },
            )
        });
    }

    if let Some(caps) = grammar::async_timing_complete_regex().captures(line) {
        let duration_millis = caps["duration_millis"].parse::<i64>().ok()?;
        let key = format!("SystemServer event {}", &caps["event_description"]);
        let is_high_latency = duration_millis >= config.ss_event_high_latency_millis;
        return Some(MatchedLine {
            key: Some(key.clone()),
            duration_millis: Some(duration_millis),
            is_high_latency,
            should_plot: duration_millis >= config.ss_event_min_duration_to_plot_millis,
            ..MatchedLine::new(
                LogEventKind::AsyncTimingComplete,
                &caps,
                format!("{key} took {duration_millis}ms"),
                if is_high_latency {
                    EventColor::Red
                } else {
                    EventColor::SaddleBrown
                },
            )
        });
    }

    if let Some(caps) = grammar::async_timing_start_regex().captures(line) {
        let description = format!("SystemServer event {}", &caps["event_description"]);
        return Some(MatchedLine::new(
            LogEventKind::AsyncTimingStart,
            &caps,
            description,
            EventColor::Yellow,
        ));
    }

    None
}

/// `+1s205ms` is 1205ms, the seconds part is optional.
fn displayed_duration_millis(caps: &Captures) -> Option<i64> {
    let secs = match caps.name("duration_secs") {
        Some(secs) => secs.as_str().parse::<i64>().ok()?,
        None => 0,
    };
    let millis = caps["duration_millis"].parse::<i64>().ok()?;
    secs.checked_mul(1000)?.checked_add(millis)
}
