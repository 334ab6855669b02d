/// The logcat line shapes that produce a [LogEvent].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogEventKind {
    /// `ActivityTaskManager: START u0 {...}`
    TaskStart,
    /// `ActivityTaskManager: Displayed <activity> for user 0: +262ms`
    TaskDisplayed,
    /// `SystemServerTimingAsync: <event> took to complete: 47ms`
    AsyncTimingComplete,
    /// `SystemServerTimingAsync: <event>`
    AsyncTimingStart,
}

impl LogEventKind {
    /// The logcat tag that emits this kind of line.
    pub fn tag(&self) -> &'static str {
        match self {
            LogEventKind::TaskStart | LogEventKind::TaskDisplayed => "ActivityTaskManager",
            LogEventKind::AsyncTimingComplete | LogEventKind::AsyncTimingStart => {
                "SystemServerTimingAsync"
            }
        }
    }
}

/// Color hint for drawing an event marker on a PSI plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventColor {
    Lime,
    Green,
    OrangeRed,
    Yellow,
    SaddleBrown,
    Red,
}

impl EventColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventColor::Lime => "lime",
            EventColor::Green => "green",
            EventColor::OrangeRed => "orangered",
            EventColor::Yellow => "yellow",
            EventColor::SaddleBrown => "saddlebrown",
            EventColor::Red => "red",
        }
    }
}

/// A discrete event parsed from logcat.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub epoch_millis: i64,
    /// Relative to the first PSI record, negative when the event happened before the monitor
    /// started
    pub monitor_start_relative_millis: i64,
    pub kind: LogEventKind,
    pub event_tag: String,
    pub event_description: String,
    /// Identifies repeated occurrences of the same logical event
    pub event_key: Option<String>,
    pub duration_value: Option<i64>,
    pub is_high_latency_event: bool,
    pub color: EventColor,
    pub should_plot: bool,
}
