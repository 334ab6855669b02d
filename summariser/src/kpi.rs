//! KPI extraction from a parsed PSI dump.
//!
//! A single pass over the records locates the four CUJ milestones and accumulates the PSI
//! statistics. The milestones are then validated together before any KPI row is produced.

use psi_kpi_model::{unit, KpiRow};

use crate::grammar::{
    psi_dropped_below_threshold_regex, psi_exceeded_threshold_regex, psi_reached_baseline_regex,
    CUJ_COMPLETED_EVENT,
};
use crate::model::{LogEvent, PressureRecord, PsiField};

/// Severity bands that exposure time is accumulated for, in percent.
const EXPOSURE_BANDS: [u32; 3] = [80, 50, 30];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum KpiError {
    #[error("{0} event not found")]
    MissingMilestone(&'static str),
    #[error("PSI threshold type mismatch: exceeded {exceeded:?} != dropped below {dropped:?}")]
    ThresholdTypeMismatch { exceeded: String, dropped: String },
    #[error("PSI threshold value mismatch: exceeded {exceeded}% != dropped below {dropped}%")]
    ThresholdValueMismatch { exceeded: u32, dropped: u32 },
    #[error("PSI exceeded threshold millis ({exceeded}) >= dropped below threshold millis ({dropped})")]
    ExceededNotBeforeDropped { exceeded: i64, dropped: i64 },
    #[error("CUJ completed millis ({cuj_completed}) > exceeded threshold millis ({exceeded})")]
    CujAfterExceeded { cuj_completed: i64, exceeded: i64 },
    #[error("CUJ completed millis ({cuj_completed}) > reached baseline millis ({baseline})")]
    CujAfterBaseline { cuj_completed: i64, baseline: i64 },
    #[error("Time taken to reach PSI baseline <= 0: {0}")]
    NonPositiveBaselineDuration(i64),
    #[error("Previous {entries} PSI entries used in baseline calculation is greater than index {index}")]
    BaselineWindowOutOfRange { entries: usize, index: usize },
    #[error("Unreadable number of PSI entries used in baseline calculation: {0}")]
    InvalidBaselineWindow(String),
    #[error("Unreadable PSI threshold percentage: {0}")]
    InvalidThresholdValue(String),
}

/// A threshold crossing reported by the PSI monitor.
#[derive(Debug, Clone, PartialEq)]
struct Threshold {
    time_millis: i64,
    percent: u32,
    psi_type: String,
}

impl Threshold {
    /// `None` when the annotation is not this kind of threshold crossing.
    fn parse(
        regex: &regex::Regex,
        time_millis: i64,
        annotation: &str,
    ) -> Result<Option<Self>, KpiError> {
        let Some(caps) = regex.captures(annotation) else {
            return Ok(None);
        };
        let percent = &caps["psi_value"];
        Ok(Some(Self {
            time_millis,
            percent: percent
                .parse()
                .map_err(|_| KpiError::InvalidThresholdValue(percent.to_string()))?,
            psi_type: caps["psi_type"].to_string(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Baseline {
    time_millis: i64,
    entries: usize,
    calculation_duration_millis: i64,
}

/// The four milestones of a CUJ, each set at most once.
#[derive(Debug, Default)]
struct Milestones {
    cuj_completed: Option<i64>,
    exceeded: Option<Threshold>,
    dropped: Option<Threshold>,
    baseline: Option<Baseline>,
}

impl Milestones {
    /// Record the first milestone that the annotation matches, if any.
    fn observe(
        &mut self,
        records: &[PressureRecord],
        index: usize,
        annotation: &str,
    ) -> Result<(), KpiError> {
        let time_millis = records[index].monitor_start_relative_millis;

        if self.cuj_completed.is_none() && annotation == CUJ_COMPLETED_EVENT {
            self.cuj_completed = Some(time_millis);
            return Ok(());
        }

        if self.exceeded.is_none() {
            if let Some(threshold) =
                Threshold::parse(psi_exceeded_threshold_regex(), time_millis, annotation)?
            {
                self.exceeded = Some(threshold);
                return Ok(());
            }
        }

        if self.dropped.is_none() {
            if let Some(threshold) =
                Threshold::parse(psi_dropped_below_threshold_regex(), time_millis, annotation)?
            {
                self.dropped = Some(threshold);
                return Ok(());
            }
        }

        if self.baseline.is_none() {
            let Some(caps) = psi_reached_baseline_regex().captures(annotation) else {
                return Ok(());
            };
            let entries = &caps["latest_psi_entries"];
            let entries = entries
                .parse::<usize>()
                .map_err(|_| KpiError::InvalidBaselineWindow(entries.to_string()))?;
            if entries > index {
                return Err(KpiError::BaselineWindowOutOfRange { entries, index });
            }
            self.baseline = Some(Baseline {
                time_millis,
                entries,
                calculation_duration_millis: time_millis
                    - records[index - entries].monitor_start_relative_millis,
            });
        }

        Ok(())
    }

    /// Check the ordering rules and hand back the complete set of milestones.
    fn validate(self) -> Result<ValidMilestones, KpiError> {
        let cuj_completed = self
            .cuj_completed
            .ok_or(KpiError::MissingMilestone("CUJ completed"))?;
        let exceeded = self
            .exceeded
            .ok_or(KpiError::MissingMilestone("PSI exceeded threshold"))?;
        let dropped = self
            .dropped
            .ok_or(KpiError::MissingMilestone("PSI dropped below threshold"))?;
        let baseline = self
            .baseline
            .ok_or(KpiError::MissingMilestone("PSI reached baseline"))?;

        if dropped.psi_type != exceeded.psi_type {
            return Err(KpiError::ThresholdTypeMismatch {
                exceeded: exceeded.psi_type,
                dropped: dropped.psi_type,
            });
        }
        if dropped.percent != exceeded.percent {
            return Err(KpiError::ThresholdValueMismatch {
                exceeded: exceeded.percent,
                dropped: dropped.percent,
            });
        }
        if exceeded.time_millis >= dropped.time_millis {
            return Err(KpiError::ExceededNotBeforeDropped {
                exceeded: exceeded.time_millis,
                dropped: dropped.time_millis,
            });
        }
        if cuj_completed > exceeded.time_millis {
            return Err(KpiError::CujAfterExceeded {
                cuj_completed,
                exceeded: exceeded.time_millis,
            });
        }
        if cuj_completed > baseline.time_millis {
            return Err(KpiError::CujAfterBaseline {
                cuj_completed,
                baseline: baseline.time_millis,
            });
        }
        if baseline.calculation_duration_millis <= 0 {
            return Err(KpiError::NonPositiveBaselineDuration(
                baseline.calculation_duration_millis,
            ));
        }

        Ok(ValidMilestones {
            cuj_completed,
            exceeded,
            dropped,
            baseline,
        })
    }
}

struct ValidMilestones {
    cuj_completed: i64,
    exceeded: Threshold,
    dropped: Threshold,
    baseline: Baseline,
}

/// Running PSI statistics, independent of the milestones.
#[derive(Debug)]
struct Accumulators {
    max_value: f64,
    max_value_after_dropped: f64,
    exposure_millis: [i64; EXPOSURE_BANDS.len()],
    previous_value: f64,
    previous_time_millis: i64,
}

impl Default for Accumulators {
    fn default() -> Self {
        Self {
            max_value: 0.0,
            max_value_after_dropped: 0.0,
            exposure_millis: [0; EXPOSURE_BANDS.len()],
            previous_value: 0.0,
            previous_time_millis: 0,
        }
    }
}

impl Accumulators {
    fn observe(&mut self, time_millis: i64, value: f64, after_dropped: bool) {
        self.max_value = self.max_value.max(value);
        if after_dropped {
            self.max_value_after_dropped = self.max_value_after_dropped.max(value);
        }

        // A polling interval counts towards a band when either end of it is in the band
        let interval_millis = time_millis - self.previous_time_millis;
        for (band, exposure) in EXPOSURE_BANDS.iter().zip(self.exposure_millis.iter_mut()) {
            let band = f64::from(*band);
            if value >= band || self.previous_value >= band {
                *exposure += interval_millis;
            }
        }

        self.previous_value = value;
        self.previous_time_millis = time_millis;
    }
}

fn millis_to_secs(millis: i64) -> f64 {
    millis as f64 / 1000.0
}

/// Extract the KPIs for one run.
///
/// `records` must be in sampling order. When `events` are given, every event with a key and a
/// positive duration is appended as a logcat KPI after the PSI KPIs.
pub fn extract_kpis(
    records: &[PressureRecord],
    events: Option<&[LogEvent]>,
    psi_to_monitor: PsiField,
) -> Result<Vec<KpiRow>, KpiError> {
    let mut milestones = Milestones::default();
    let mut accumulators = Accumulators::default();

    for (index, record) in records.iter().enumerate() {
        for annotation in &record.event_descriptions {
            milestones.observe(records, index, annotation)?;
        }
        accumulators.observe(
            record.monitor_start_relative_millis,
            record.value(psi_to_monitor),
            milestones.dropped.is_some(),
        );
    }

    let ValidMilestones {
        cuj_completed,
        exceeded,
        dropped,
        baseline,
    } = milestones.validate()?;
    log::debug!(
        "Found CUJ milestones: completed at {cuj_completed}ms, above '{}' {}% from {}ms to {}ms, baseline at {}ms",
        exceeded.psi_type,
        exceeded.percent,
        exceeded.time_millis,
        dropped.time_millis,
        baseline.time_millis
    );

    let psi_type = &dropped.psi_type;
    let mut kpis = vec![
        KpiRow::psi(
            CUJ_COMPLETED_EVENT,
            millis_to_secs(cuj_completed),
            unit::SECONDS_SINCE_MONITOR_START,
        ),
        KpiRow::psi(
            format!("Time taken to reach '{psi_type}' PSI baseline (including baseline calculation duration)"),
            millis_to_secs(baseline.time_millis - cuj_completed),
            unit::DURATION_SECONDS,
        ),
        KpiRow::psi(
            format!("Total number of '{psi_type}' PSI entries used in baseline calculation"),
            baseline.entries as f64,
            unit::NUMBER_OF_ENTRIES,
        ),
        KpiRow::psi(
            "Baseline calculation duration",
            millis_to_secs(baseline.calculation_duration_millis),
            unit::DURATION_SECONDS,
        ),
        KpiRow::psi(
            format!("Max '{psi_type}' PSI value"),
            accumulators.max_value,
            unit::PERCENT,
        ),
        KpiRow::psi(
            format!(
                "Time spent above the '{psi_type}' PSI threshold {}%",
                dropped.percent
            ),
            millis_to_secs(dropped.time_millis - exceeded.time_millis),
            unit::DURATION_SECONDS,
        ),
        KpiRow::psi(
            format!("Time taken to drop below the '{psi_type}' PSI threshold"),
            millis_to_secs(dropped.time_millis - cuj_completed),
            unit::DURATION_SECONDS,
        ),
        KpiRow::psi(
            format!("Max '{psi_type}' PSI value after dropped below threshold"),
            accumulators.max_value_after_dropped,
            unit::PERCENT,
        ),
    ];
    for (band, exposure_millis) in EXPOSURE_BANDS.iter().zip(accumulators.exposure_millis) {
        kpis.push(KpiRow::psi(
            format!("Total time spent above the '{psi_type}' PSI threshold {band}%"),
            millis_to_secs(exposure_millis),
            unit::DURATION_SECONDS,
        ));
    }

    if let Some(events) = events {
        kpis.extend(events.iter().filter_map(|event| {
            let key = event.event_key.as_ref()?;
            let duration = event.duration_value.filter(|duration| *duration > 0)?;
            Some(KpiRow::logcat(
                key.as_str(),
                event.event_tag.as_str(),
                duration as f64,
            ))
        }));
    }

    Ok(kpis)
}
