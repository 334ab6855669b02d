use serde::Serialize;

/// KPI category for values derived from the PSI dump.
pub const PSI_EVENT_TYPE: &str = "psi_event";
/// KPI category for durations reported by discrete logcat events.
pub const LOGCAT_EVENT_TYPE: &str = "logcat_event";
/// Tag carried by every PSI derived KPI.
pub const PSI_MONITOR_TAG: &str = "psi_monitor";

/// Units used in the `Unit` column of a KPI table.
pub mod unit {
    pub const SECONDS_SINCE_MONITOR_START: &str = "Seconds since monitor start";
    pub const DURATION_SECONDS: &str = "Duration seconds";
    pub const DURATION_MILLIS: &str = "Duration millis";
    pub const NUMBER_OF_ENTRIES: &str = "Number of entries";
    pub const PERCENT: &str = "Percent";
}

/// Column names of the KPI and KPI statistics tables.
///
/// These match the headers of the CSV files consumed by the plotting and reporting tools, so
/// they must not change.
pub mod column {
    pub const EVENT: &str = "Event";
    pub const TYPE: &str = "Type";
    pub const TAG: &str = "Tag";
    pub const VALUE: &str = "Value";
    pub const UNIT: &str = "Unit";
    pub const RUN_ID: &str = "RunId";

    pub const MIN: &str = "Min";
    pub const MAX: &str = "Max";
    pub const Q1: &str = "Q1";
    pub const MEDIAN: &str = "Median";
    pub const Q3: &str = "Q3";
    pub const STDDEV: &str = "Stddev";
    pub const SIZE: &str = "Size";
    pub const COUNT_NON_NA: &str = "Count_non_na";
    pub const LOW_OUTLIER_RUN_IDS: &str = "Low outlier run ids";
    pub const HIGH_OUTLIER_RUN_IDS: &str = "High outlier run ids";
    pub const OUTLIERS: &str = "Outliers";

    /// Columns of a single run's KPI table, in output order.
    pub const KPI_COLUMNS: [&str; 5] = [EVENT, TYPE, TAG, VALUE, UNIT];

    /// Columns of the KPI statistics table, in output order.
    pub const KPI_STATS_COLUMNS: [&str; 14] = [
        EVENT,
        TYPE,
        UNIT,
        MIN,
        MAX,
        Q1,
        MEDIAN,
        Q3,
        STDDEV,
        SIZE,
        COUNT_NON_NA,
        LOW_OUTLIER_RUN_IDS,
        HIGH_OUTLIER_RUN_IDS,
        OUTLIERS,
    ];
}

/// One KPI computed for a single run.
///
/// A KPI table is an append-only list of these rows. Rows are never updated once emitted.
#[derive(Debug, Clone, PartialEq)]
pub struct KpiRow {
    /// Human readable name of the KPI, unique within a run
    pub event: String,
    /// The KPI category, either [PSI_EVENT_TYPE] or [LOGCAT_EVENT_TYPE]
    pub kind: String,
    /// The source of the KPI
    ///
    /// This is [PSI_MONITOR_TAG] for PSI KPIs and the logcat tag for logcat events.
    pub tag: String,
    pub value: f64,
    pub unit: String,
}

impl KpiRow {
    /// Create a new KPI row
    pub fn new(
        event: impl Into<String>,
        kind: impl Into<String>,
        tag: impl Into<String>,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            kind: kind.into(),
            tag: tag.into(),
            value,
            unit: unit.into(),
        }
    }

    /// Create a KPI derived from the PSI dump
    pub fn psi(event: impl Into<String>, value: f64, unit: &str) -> Self {
        Self::new(event, PSI_EVENT_TYPE, PSI_MONITOR_TAG, value, unit)
    }

    /// Create a KPI from the duration of a discrete logcat event
    pub fn logcat(event: impl Into<String>, tag: impl Into<String>, duration_millis: f64) -> Self {
        Self::new(
            event,
            LOGCAT_EVENT_TYPE,
            tag,
            duration_millis,
            unit::DURATION_MILLIS,
        )
    }
}

/// Descriptive statistics for one (event, type, unit) group across several runs.
#[derive(Debug, Clone, PartialEq)]
pub struct StatRow {
    pub event: String,
    pub kind: String,
    pub unit: String,
    /// The statistics are [None] when the group has no non-missing values
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub q1: Option<f64>,
    pub median: Option<f64>,
    pub q3: Option<f64>,
    /// Population standard deviation
    pub stddev: Option<f64>,
    /// Number of rows in the group, including missing values
    pub size: usize,
    /// Number of rows in the group with a value
    pub count_non_na: usize,
    /// Runs whose value is below `Q1 - 1.5 * IQR`
    pub low_outlier_run_ids: Vec<String>,
    /// Runs whose value is above `Q3 + 1.5 * IQR`
    pub high_outlier_run_ids: Vec<String>,
    /// The raw values of every outlier, in row order
    pub outliers: Vec<f64>,
}

/// Encode a list cell of the statistics table.
///
/// CSV has no list type so list columns are stored as JSON arrays.
pub fn encode_list<T: Serialize>(values: &[T]) -> serde_json::Result<String> {
    serde_json::to_string(values)
}
