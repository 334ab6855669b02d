//! Conversion of the parsed tables to polars [DataFrame]s, and CSV I/O for them.

use std::path::Path;

use anyhow::Context;
use polars::prelude::*;
use psi_kpi_model::{column, encode_list, KpiRow, StatRow};

use crate::grammar::{encode_annotations, psi_out_fields, EVENT_OUT_FIELDS};
use crate::model::{LogEvent, PressureRecord, PsiField, PsiStat};

/// One row per PSI sample, with a column per PSI metric, named and ordered by [psi_out_fields].
///
/// The annotations are stored in a single column, encoded with [encode_annotations].
pub fn pressure_frame(records: &[PressureRecord]) -> PolarsResult<DataFrame> {
    let mut values = vec![
        Series::new(
            PlSmallStr::EMPTY,
            records.iter().map(|r| r.uptime_millis).collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            records
                .iter()
                .map(|r| r.local_datetime.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            records.iter().map(|r| r.epoch_millis).collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            records
                .iter()
                .map(|r| r.monitor_start_relative_millis)
                .collect::<Vec<_>>(),
        ),
    ];

    for field in PsiField::all() {
        let series = match field.stat {
            PsiStat::Total => Series::new(
                PlSmallStr::EMPTY,
                records
                    .iter()
                    .map(|r| r.block(field.block).total)
                    .collect::<Vec<u64>>(),
            ),
            stat => Series::new(
                PlSmallStr::EMPTY,
                records
                    .iter()
                    .map(|r| r.block(field.block).get(stat))
                    .collect::<Vec<f64>>(),
            ),
        };
        values.push(series);
    }

    values.push(Series::new(
        PlSmallStr::EMPTY,
        records
            .iter()
            .map(|r| encode_annotations(&r.event_descriptions))
            .collect::<Vec<_>>(),
    ));

    named_frame(psi_out_fields(), values)
}

/// One row per logcat event, with columns named and ordered by [EVENT_OUT_FIELDS].
pub fn events_frame(events: &[LogEvent]) -> PolarsResult<DataFrame> {
    let values = vec![
        Series::new(
            PlSmallStr::EMPTY,
            events.iter().map(|e| e.epoch_millis).collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events
                .iter()
                .map(|e| e.monitor_start_relative_millis)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events.iter().map(|e| e.event_tag.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events
                .iter()
                .map(|e| e.event_description.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events
                .iter()
                .map(|e| e.event_key.as_deref())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events.iter().map(|e| e.duration_value).collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events
                .iter()
                .map(|e| e.is_high_latency_event)
                .collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events.iter().map(|e| e.color.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            PlSmallStr::EMPTY,
            events.iter().map(|e| e.should_plot).collect::<Vec<_>>(),
        ),
    ];

    named_frame(EVENT_OUT_FIELDS, values)
}

/// Pair each column with its name, in order.
fn named_frame<I>(names: I, values: Vec<Series>) -> PolarsResult<DataFrame>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let names = names
        .into_iter()
        .map(|name| PlSmallStr::from(name.as_ref()))
        .collect::<Vec<_>>();
    if names.len() != values.len() {
        return Err(PolarsError::ShapeMismatch(
            format!("{} column names for {} columns", names.len(), values.len()).into(),
        ));
    }

    DataFrame::new(
        names
            .into_iter()
            .zip(values)
            .map(|(name, series)| Column::from(series.with_name(name)))
            .collect(),
    )
}

pub fn kpi_frame(kpis: &[KpiRow]) -> PolarsResult<DataFrame> {
    df!(
        column::EVENT => kpis.iter().map(|k| k.event.as_str()).collect::<Vec<_>>(),
        column::TYPE => kpis.iter().map(|k| k.kind.as_str()).collect::<Vec<_>>(),
        column::TAG => kpis.iter().map(|k| k.tag.as_str()).collect::<Vec<_>>(),
        column::VALUE => kpis.iter().map(|k| k.value).collect::<Vec<_>>(),
        column::UNIT => kpis.iter().map(|k| k.unit.as_str()).collect::<Vec<_>>(),
    )
}

/// The list columns are JSON encoded, CSV has no list type.
pub fn stats_frame(stats: &[StatRow]) -> anyhow::Result<DataFrame> {
    let low_outlier_run_ids = stats
        .iter()
        .map(|s| encode_list(&s.low_outlier_run_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let high_outlier_run_ids = stats
        .iter()
        .map(|s| encode_list(&s.high_outlier_run_ids))
        .collect::<Result<Vec<_>, _>>()?;
    let outliers = stats
        .iter()
        .map(|s| encode_list(&s.outliers))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(df!(
        column::EVENT => stats.iter().map(|s| s.event.as_str()).collect::<Vec<_>>(),
        column::TYPE => stats.iter().map(|s| s.kind.as_str()).collect::<Vec<_>>(),
        column::UNIT => stats.iter().map(|s| s.unit.as_str()).collect::<Vec<_>>(),
        column::MIN => stats.iter().map(|s| s.min).collect::<Vec<_>>(),
        column::MAX => stats.iter().map(|s| s.max).collect::<Vec<_>>(),
        column::Q1 => stats.iter().map(|s| s.q1).collect::<Vec<_>>(),
        column::MEDIAN => stats.iter().map(|s| s.median).collect::<Vec<_>>(),
        column::Q3 => stats.iter().map(|s| s.q3).collect::<Vec<_>>(),
        column::STDDEV => stats.iter().map(|s| s.stddev).collect::<Vec<_>>(),
        column::SIZE => stats.iter().map(|s| s.size as u64).collect::<Vec<_>>(),
        column::COUNT_NON_NA => stats.iter().map(|s| s.count_non_na as u64).collect::<Vec<_>>(),
        column::LOW_OUTLIER_RUN_IDS => low_outlier_run_ids,
        column::HIGH_OUTLIER_RUN_IDS => high_outlier_run_ids,
        column::OUTLIERS => outliers,
    )?)
}

/// Write a frame as CSV with a header row, replacing any existing file.
pub fn write_csv<P>(frame: &mut DataFrame, path: P) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Creating output directory {}", parent.display()))?;
    }
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Creating output file {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(frame)
        .with_context(|| format!("Writing CSV to {}", path.display()))?;
    log::debug!("Wrote {} rows to {}", frame.height(), path.display());
    Ok(())
}

/// Read a KPI table written by [kpi_frame] and [write_csv].
///
/// The value column is always read as `f64`, the text columns as strings.
pub fn read_kpi_csv<P>(path: P) -> anyhow::Result<DataFrame>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Reading KPI table {}", path.display()))?;

    let missing = column::KPI_COLUMNS
        .iter()
        .filter(|name| frame.column(name).is_err())
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        anyhow::bail!(
            "KPI table {} is missing columns: {missing:?}",
            path.display()
        );
    }

    let frame = frame
        .lazy()
        .with_columns([
            col(column::EVENT).cast(DataType::String),
            col(column::TYPE).cast(DataType::String),
            col(column::TAG).cast(DataType::String),
            col(column::VALUE).cast(DataType::Float64),
            col(column::UNIT).cast(DataType::String),
        ])
        .collect()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::EVENT_DESCRIPTIONS;
    use crate::model::{EventColor, LogEventKind};
    use pretty_assertions::assert_eq;
    use psi_kpi_model::unit;

    fn names(frame: &DataFrame) -> Vec<String> {
        frame
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    #[test]
    fn pressure_frame_has_one_column_per_field() -> anyhow::Result<()> {
        let mut record = PressureRecord {
            uptime_millis: 100,
            local_datetime: "2024-09-06 10:18:38.123456".to_string(),
            event_descriptions: vec!["CUJ completed".to_string(), "other".to_string()],
            ..Default::default()
        };
        record.io_full.total = 42;
        let frame = pressure_frame(&[record])?;

        assert_eq!(names(&frame), psi_out_fields());
        assert_eq!(frame.column("io_full_total")?.u64()?.get(0), Some(42));
        assert_eq!(
            frame.column(EVENT_DESCRIPTIONS)?.str()?.get(0),
            Some(r#""CUJ completed" "other""#)
        );
        Ok(())
    }

    #[test]
    fn events_frame_keeps_missing_values_null() -> anyhow::Result<()> {
        let event = LogEvent {
            epoch_millis: 1,
            monitor_start_relative_millis: 2,
            kind: LogEventKind::TaskStart,
            event_tag: "ActivityTaskManager".to_string(),
            event_description: "Started foo for user 0".to_string(),
            event_key: None,
            duration_value: None,
            is_high_latency_event: false,
            color: EventColor::Lime,
            should_plot: true,
        };
        let frame = events_frame(&[event])?;

        assert_eq!(names(&frame), EVENT_OUT_FIELDS.to_vec());
        assert_eq!(frame.column("event_key")?.null_count(), 1);
        assert_eq!(frame.column("duration_value")?.null_count(), 1);
        assert_eq!(frame.column("color")?.str()?.get(0), Some("lime"));
        Ok(())
    }

    #[test]
    fn empty_tables_keep_their_columns() -> anyhow::Result<()> {
        assert_eq!(names(&pressure_frame(&[])?), psi_out_fields());
        assert_eq!(names(&events_frame(&[])?), EVENT_OUT_FIELDS.to_vec());
        Ok(())
    }

    #[test]
    fn named_frame_rejects_missing_names() {
        let values = vec![
            Series::new(PlSmallStr::EMPTY, [1i64]),
            Series::new(PlSmallStr::EMPTY, [2i64]),
        ];
        assert!(named_frame(["only_one"], values).is_err());
    }

    #[test]
    fn stats_frame_encodes_lists() -> anyhow::Result<()> {
        let row = StatRow {
            event: "CUJ completed".to_string(),
            kind: "psi_event".to_string(),
            unit: unit::SECONDS_SINCE_MONITOR_START.to_string(),
            min: Some(1.0),
            max: Some(3.0),
            q1: Some(1.0),
            median: Some(2.0),
            q3: Some(3.0),
            stddev: None,
            size: 3,
            count_non_na: 3,
            low_outlier_run_ids: vec![],
            high_outlier_run_ids: vec!["7".to_string()],
            outliers: vec![3.0],
        };
        let frame = stats_frame(&[row])?;

        assert_eq!(names(&frame), column::KPI_STATS_COLUMNS.to_vec());
        assert_eq!(
            frame.column(column::LOW_OUTLIER_RUN_IDS)?.str()?.get(0),
            Some("[]")
        );
        assert_eq!(
            frame.column(column::HIGH_OUTLIER_RUN_IDS)?.str()?.get(0),
            Some(r#"["7"]"#)
        );
        assert_eq!(frame.column(column::STDDEV)?.null_count(), 1);
        Ok(())
    }

    #[test]
    fn kpi_csv_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("processed").join("kpis.csv");
        let kpis = vec![
            KpiRow::psi("CUJ completed", 1.0, unit::SECONDS_SINCE_MONITOR_START),
            KpiRow::logcat("Displayed foo for user 0", "ActivityTaskManager", 1200.0),
        ];

        write_csv(&mut kpi_frame(&kpis)?, &path)?;
        let frame = read_kpi_csv(&path)?;

        assert!(frame.equals(&kpi_frame(&kpis)?), "{frame}");
        Ok(())
    }

    #[test]
    fn read_kpi_csv_rejects_other_tables() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("kpis.csv");
        std::fs::write(&path, "a,b\n1,2\n")?;

        let err = read_kpi_csv(&path).unwrap_err();
        assert!(err.to_string().contains("missing columns"), "{err}");
        Ok(())
    }
}
