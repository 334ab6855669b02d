//! Statistics for KPIs across repeated runs of the same CUJ.

use anyhow::Context;
use polars::prelude::*;
use psi_kpi_model::{column, unit, KpiRow, StatRow, PSI_EVENT_TYPE};

use crate::analyze::{iqr_outliers, value_stats, Outliers};
use crate::frame::kpi_frame;
use crate::partition::partition_by_columns;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("No KPIs found in any of the {0} runs")]
    NoRuns(usize),
}

/// Collects the KPI tables of several runs, keyed by run id.
#[derive(Debug, Default, Clone)]
pub struct RunAggregator {
    runs: Vec<(String, DataFrame)>,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the KPI table of one run.
    pub fn with_run(mut self, run_id: impl Into<String>, kpis: DataFrame) -> Self {
        self.runs.push((run_id.into(), kpis));
        self
    }

    pub fn from_kpi_tables<I, S>(tables: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (S, Vec<KpiRow>)>,
        S: Into<String>,
    {
        tables
            .into_iter()
            .try_fold(
                Self::new(),
                |aggregator, (run_id, kpis)| -> anyhow::Result<Self> {
                    Ok(aggregator.with_run(run_id, kpi_frame(&kpis)?))
                },
            )
    }

    pub fn run_ids(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(|(run_id, _)| run_id.as_str())
    }

    /// Merge every run into one table with a [column::RUN_ID] column.
    ///
    /// Columns missing from some runs are null for those runs. PSI durations reported in
    /// milliseconds are converted to seconds.
    pub fn merge(&self) -> anyhow::Result<DataFrame> {
        let frames = self
            .runs
            .iter()
            .filter(|(_, kpis)| kpis.height() > 0)
            .map(|(run_id, kpis)| {
                kpis.clone()
                    .lazy()
                    .with_column(lit(run_id.as_str()).alias(column::RUN_ID))
            })
            .collect::<Vec<_>>();
        if frames.is_empty() {
            return Err(AggregateError::NoRuns(self.runs.len()).into());
        }

        let is_psi_millis = col(column::UNIT)
            .eq(lit(unit::DURATION_MILLIS))
            .and(col(column::TYPE).eq(lit(PSI_EVENT_TYPE)));

        let merged = concat_lf_diagonal(frames, UnionArgs::default())?
            .with_columns([
                when(is_psi_millis.clone())
                    .then(col(column::VALUE).cast(DataType::Float64) / lit(1000.0))
                    .otherwise(col(column::VALUE).cast(DataType::Float64))
                    .alias(column::VALUE),
                when(is_psi_millis)
                    .then(lit(unit::DURATION_SECONDS))
                    .otherwise(col(column::UNIT))
                    .alias(column::UNIT),
            ])
            .collect()
            .context("Merging KPI tables")?;

        log::debug!(
            "Merged {} KPI rows from {} runs",
            merged.height(),
            self.runs.len()
        );
        Ok(merged)
    }

    /// One row of statistics per (event, type, unit), ordered by that key.
    pub fn aggregate(&self) -> anyhow::Result<Vec<StatRow>> {
        let merged = self.merge()?;
        let groups = partition_by_columns(&merged, &[column::EVENT, column::TYPE, column::UNIT])?;

        groups
            .into_iter()
            .map(|(key, group)| {
                let [event, kind, unit] = <[Option<String>; 3]>::try_from(key)
                    .map_err(|key| anyhow::anyhow!("Unexpected group key {key:?}"))?;
                let stats = value_stats(&group, column::VALUE)?;
                let outliers = match (stats.q1, stats.q3) {
                    (Some(q1), Some(q3)) => {
                        iqr_outliers(&group, column::VALUE, column::RUN_ID, q1, q3)?
                    }
                    _ => Outliers::default(),
                };

                Ok(StatRow {
                    event: event.unwrap_or_default(),
                    kind: kind.unwrap_or_default(),
                    unit: unit.unwrap_or_default(),
                    min: stats.min,
                    max: stats.max,
                    q1: stats.q1,
                    median: stats.median,
                    q3: stats.q3,
                    stddev: stats.stddev,
                    size: stats.size,
                    count_non_na: stats.count_non_na,
                    low_outlier_run_ids: outliers.low_ids,
                    high_outlier_run_ids: outliers.high_ids,
                    outliers: outliers.values,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use psi_kpi_model::LOGCAT_EVENT_TYPE;

    fn cuj_completed(value: f64) -> Vec<KpiRow> {
        vec![KpiRow::psi(
            "CUJ completed",
            value,
            unit::SECONDS_SINCE_MONITOR_START,
        )]
    }

    #[test]
    fn flags_high_outlier_run() -> anyhow::Result<()> {
        let aggregator = RunAggregator::from_kpi_tables([
            ("1", cuj_completed(10.0)),
            ("2", cuj_completed(10.0)),
            ("3", cuj_completed(100.0)),
        ])?;
        let stats = aggregator.aggregate()?;

        assert_eq!(stats.len(), 1);
        let row = &stats[0];
        assert_eq!(row.event, "CUJ completed");
        assert_eq!(row.kind, PSI_EVENT_TYPE);
        assert_eq!(row.q1, Some(10.0));
        assert_eq!(row.q3, Some(10.0));
        assert_eq!(row.median, Some(10.0));
        assert_eq!(row.min, Some(10.0));
        assert_eq!(row.max, Some(100.0));
        assert_eq!(row.size, 3);
        assert_eq!(row.high_outlier_run_ids, vec!["3"]);
        assert!(row.low_outlier_run_ids.is_empty());
        assert_eq!(row.outliers, vec![100.0]);
        Ok(())
    }

    #[test]
    fn groups_by_event_type_and_unit() -> anyhow::Result<()> {
        let run = |cuj: f64, displayed: f64| {
            vec![
                KpiRow::psi("CUJ completed", cuj, unit::SECONDS_SINCE_MONITOR_START),
                KpiRow::logcat("Displayed foo for user 0", "ActivityTaskManager", displayed),
            ]
        };
        let stats =
            RunAggregator::from_kpi_tables([("1", run(1.0, 300.0)), ("2", run(3.0, 500.0))])?
                .aggregate()?;

        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].event, "CUJ completed");
        assert_eq!(stats[0].median, Some(2.0));
        assert_eq!(stats[0].stddev, Some(1.0));
        assert_eq!(stats[1].event, "Displayed foo for user 0");
        assert_eq!(stats[1].kind, LOGCAT_EVENT_TYPE);
        // Logcat durations stay in milliseconds
        assert_eq!(stats[1].unit, unit::DURATION_MILLIS);
        assert_eq!(stats[1].max, Some(500.0));
        Ok(())
    }

    #[test]
    fn converts_psi_millis_to_seconds() -> anyhow::Result<()> {
        let kpis = vec![KpiRow::psi("Settle time", 1500.0, unit::DURATION_MILLIS)];
        let merged = RunAggregator::from_kpi_tables([("7", kpis)])?.merge()?;

        assert_eq!(merged.column(column::VALUE)?.f64()?.get(0), Some(1.5));
        assert_eq!(
            merged.column(column::UNIT)?.str()?.get(0),
            Some(unit::DURATION_SECONDS)
        );
        assert_eq!(merged.column(column::RUN_ID)?.str()?.get(0), Some("7"));
        Ok(())
    }

    #[test]
    fn merges_runs_with_different_columns() -> anyhow::Result<()> {
        let extra = kpi_frame(&cuj_completed(2.0))?
            .lazy()
            .with_column(lit("x").alias("Extra"))
            .collect()?;
        let aggregator = RunAggregator::new()
            .with_run("1", kpi_frame(&cuj_completed(1.0))?)
            .with_run("2", extra);

        let merged = aggregator.merge()?;
        assert_eq!(merged.height(), 2);
        assert_eq!(merged.column("Extra")?.null_count(), 1);
        assert_eq!(aggregator.aggregate()?.len(), 1);
        Ok(())
    }

    #[test]
    fn fails_without_any_kpis() -> anyhow::Result<()> {
        let err = RunAggregator::new().aggregate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AggregateError>(),
            Some(AggregateError::NoRuns(0))
        ));

        let err = RunAggregator::from_kpi_tables([("1", vec![])])?
            .merge()
            .unwrap_err();
        assert!(err.to_string().contains("No KPIs found"), "{err}");
        Ok(())
    }
}
