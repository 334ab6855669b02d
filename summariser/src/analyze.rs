use anyhow::Context;
use polars::frame::DataFrame;
use polars::prelude::*;

/// Descriptive statistics over the non-null values of one column.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ValueStats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Lower-rank 25th percentile
    pub q1: Option<f64>,
    pub median: Option<f64>,
    /// Lower-rank 75th percentile
    pub q3: Option<f64>,
    /// Population standard deviation
    pub stddev: Option<f64>,
    /// Number of rows, including nulls
    pub size: usize,
    pub count_non_na: usize,
}

pub(crate) fn value_stats(frame: &DataFrame, column: &str) -> anyhow::Result<ValueStats> {
    let values = frame.column(column)?.cast(&DataType::Float64)?;
    let values = values.f64()?;

    Ok(ValueStats {
        min: values.min(),
        max: values.max(),
        q1: values
            .quantile(0.25, QuantileMethod::Lower)
            .context("Q1")?,
        median: values.median(),
        q3: values
            .quantile(0.75, QuantileMethod::Lower)
            .context("Q3")?,
        stddev: values.std(0),
        size: values.len(),
        count_non_na: values.len() - values.null_count(),
    })
}

/// Rows outside the 1.5 IQR fence around the quartiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Outliers {
    pub low_ids: Vec<String>,
    pub high_ids: Vec<String>,
    pub values: Vec<f64>,
}

pub(crate) fn iqr_outliers(
    frame: &DataFrame,
    value_column: &str,
    id_column: &str,
    q1: f64,
    q3: f64,
) -> anyhow::Result<Outliers> {
    let iqr = q3 - q1;
    let lower_bound = q1 - 1.5 * iqr;
    let upper_bound = q3 + 1.5 * iqr;

    let values = frame.column(value_column)?.cast(&DataType::Float64)?;
    let ids = frame.column(id_column)?.cast(&DataType::String)?;

    let mut outliers = Outliers::default();
    for (value, id) in values.f64()?.into_iter().zip(ids.str()?.into_iter()) {
        let Some(value) = value else {
            continue;
        };
        let id = id.unwrap_or_default().to_string();
        if value < lower_bound {
            outliers.low_ids.push(id);
            outliers.values.push(value);
        } else if value > upper_bound {
            outliers.high_ids.push(id);
            outliers.values.push(value);
        }
    }

    Ok(outliers)
}
