//! Line grammars for the PSI monitor dump, the logcat lines that carry CUJ events and the PSI
//! monitor's own event annotations.
//!
//! Every pattern is assembled once, on first use, from named sub-patterns.
//!
//! A PSI dump line looks like this (tabs and spaces are interchangeable):
//!
//! ```text
//! 13980	2024-09-06 10:18:38.123456789	cpu:some avg10=4.39 avg60=1.29 avg300=0.29 total=1462999
//!   cpu:full avg10=0.00 avg60=0.00 avg300=0.00 total=0
//!   io:some avg10=3.29 avg60=0.87 avg300=0.19 total=737543
//!   io:full avg10=2.05 avg60=0.54 avg300=0.12 total=455996
//!   irq:full avg10=0.32 avg60=0.06 avg300=0.01 total=90937
//!   memory:some avg10=0.00 avg60=0.00 avg300=0.00 total=0
//!   memory:full avg10=0.00 avg60=0.00 avg300=0.00 total=0 "CUJ completed" "PSI exceeded threshold: 80% cpu:some"
//! ```
//!
//! The supported logcat lines are:
//!
//! ```text
//! 2024-09-26 09:19:56.140  1627  1805 I ActivityTaskManager: START u0 {act=android.intent.action.MAIN cmp=com.android.car.cluster.home/.ClusterHomeActivityLightMode} with LAUNCH_SINGLE_TASK
//! 2024-09-26 09:19:56.675  1627  1811 I ActivityTaskManager: Displayed com.android.car.cluster.home/.ClusterHomeActivityLightMode for user 0: +262ms
//! 2024-09-26 09:19:56.144  1627  1822 V SystemServerTimingAsync: ssm.UnlockingUser-0 took to complete: 47ms
//! 2024-09-26 09:19:56.097  1627  1822 D SystemServerTimingAsync: ssm.UnlockingUser-0
//! ```

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{PsiBlock, PsiField};

pub const UPTIME_MILLIS: &str = "uptime_millis";
pub const LOCAL_DATETIME: &str = "local_datetime";
pub const EPOCH_MILLIS: &str = "epoch_millis";
pub const MONITOR_START_RELATIVE_MILLIS: &str = "monitor_start_relative_millis";
pub const EVENT_DESCRIPTIONS: &str = "event_descriptions";

/// Separator the PSI monitor puts between the quoted events of one polling instant.
pub const ANNOTATION_DELIMITER: &str = r#"" ""#;

/// The annotation the CUJ runner emits once the journey has completed.
pub const CUJ_COMPLETED_EVENT: &str = "CUJ completed";

/// Columns of the event table, in output order.
pub const EVENT_OUT_FIELDS: [&str; 9] = [
    "epoch_millis",
    "monitor_start_relative_millis",
    "event_tag",
    "event_description",
    "event_key",
    "duration_value",
    "is_high_latency_event",
    "color",
    "should_plot",
];

const NUMBER: &str = r"[0-9]+(?:\.[0-9]+)?";
const DATETIME: &str = r"[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}";

/// Columns of the pressure table, in output order.
pub fn psi_out_fields() -> Vec<String> {
    [UPTIME_MILLIS, LOCAL_DATETIME, EPOCH_MILLIS, MONITOR_START_RELATIVE_MILLIS]
        .into_iter()
        .map(str::to_string)
        .chain(PsiField::all().map(|field| field.to_string()))
        .chain(std::iter::once(EVENT_DESCRIPTIONS.to_string()))
        .collect()
}

fn block_pattern(block: PsiBlock) -> String {
    let prefix = block.prefix();
    format!(
        r"{label}\s+avg10=(?P<{prefix}_avg10>{NUMBER})\s+avg60=(?P<{prefix}_avg60>{NUMBER})\s+avg300=(?P<{prefix}_avg300>{NUMBER})\s+total=(?P<{prefix}_total>[0-9]+)",
        label = regex::escape(block.label()),
    )
}

fn psi_line_pattern() -> String {
    // Sub-microsecond digits are captured here and truncated by the parser.
    let mut pattern = format!(
        r"^(?P<{UPTIME_MILLIS}>[0-9]+)\s+(?P<{LOCAL_DATETIME}>{DATETIME}(?:\.[0-9]+)?)"
    );
    for block in PsiBlock::ALL {
        if block.is_optional() {
            pattern.push_str(&format!(r"(?:\s+{})?", block_pattern(block)));
        } else {
            pattern.push_str(&format!(r"\s+{}", block_pattern(block)));
        }
    }
    pattern.push_str(&format!(r#"(?:\s+"(?P<{EVENT_DESCRIPTIONS}>.*)")?$"#));
    pattern
}

/// The full PSI dump line.
pub fn psi_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&psi_line_pattern()).expect("PSI line regex"))
}

/// The expected PSI dump line grammar, for error messages.
pub fn psi_line_grammar() -> &'static str {
    psi_line_regex().as_str()
}

fn logcat_regex(message: &str) -> Regex {
    Regex::new(&format!(
        r"^(?P<{LOCAL_DATETIME}>{DATETIME}\.[0-9]{{3}})\s+(?P<pid>[0-9]+)\s+(?P<tid>[0-9]+)\s+(?P<loglevel>[VDIWEFS])\s+{message}$"
    ))
    .expect("logcat regex")
}

pub fn task_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        logcat_regex(
            r"ActivityTaskManager:\s+START\s+u(?P<user_id>[0-9]+)\s+\{.*cmp=(?P<activity_name>[0-9A-Za-z_$./]+)(?:\s+|\}).*",
        )
    })
}

pub fn task_displayed_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        logcat_regex(
            r"ActivityTaskManager:\s+Displayed\s+(?P<activity_name>.*)\s+for\s+user\s+(?P<user_id>[0-9]+):\s+\+(?:(?P<duration_secs>[0-9]+)s)?(?P<duration_millis>[0-9]+)ms",
        )
    })
}

pub fn async_timing_complete_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        logcat_regex(
            r"SystemServerTimingAsync: (?P<event_description>.*)\s+took to complete:\s+(?P<duration_millis>[0-9]+)ms",
        )
    })
}

pub fn async_timing_start_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| logcat_regex(r"SystemServerTimingAsync: (?P<event_description>.*)"))
}

pub fn psi_exceeded_threshold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^PSI exceeded threshold: (?P<psi_value>[0-9]+)%\s+(?P<psi_type>.*)$")
            .expect("exceeded threshold regex")
    })
}

pub fn psi_dropped_below_threshold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^PSI dropped below threshold: (?P<psi_value>[0-9]+)%\s+(?P<psi_type>.*)$")
            .expect("dropped below threshold regex")
    })
}

pub fn psi_reached_baseline_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^PSI reached baseline across latest\s+(?P<latest_psi_entries>[0-9]+)\s+entries$",
        )
        .expect("reached baseline regex")
    })
}

/// Split the captured annotation segment of a dump line into its events.
pub fn split_annotations(segment: &str) -> Vec<String> {
    if segment.is_empty() {
        return Vec::new();
    }
    segment
        .split(ANNOTATION_DELIMITER)
        .map(str::to_string)
        .collect()
}

/// Encode events the way the PSI monitor writes them, the inverse of [split_annotations] once the
/// outer quotes are removed by the line grammar.
pub fn encode_annotations(annotations: &[String]) -> String {
    if annotations.is_empty() {
        return String::new();
    }
    format!("\"{}\"", annotations.join(ANNOTATION_DELIMITER))
}
