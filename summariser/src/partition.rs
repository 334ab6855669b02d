use polars::prelude::{col, lit, AnyValue, DataFrame, Expr, IntoLazy, UniqueKeepStrategy};
use std::collections::{BTreeMap, HashSet};

/// The value of one key column within a partition. `None` is a null value.
pub type PartitionKey = Vec<Option<String>>;

/// Partition the [`DataFrame`] by unique combination of values across multiple key columns.
///
/// Values in the key columns MUST be strings or nulls.
///
/// Returns all the sub-DataFrames for each unique combination of key values as a [`BTreeMap`]
/// keyed by the values of the given columns, in the order the columns were given. If no columns
/// are given, the whole frame is returned as a single partition with an empty key.
pub fn partition_by_columns(
    data_frame: &DataFrame,
    columns: &[&str],
) -> anyhow::Result<BTreeMap<PartitionKey, DataFrame>> {
    // Check for duplicate column names
    let mut unique_columns = HashSet::with_capacity(columns.len());
    for &name in columns {
        if !unique_columns.insert(name) {
            return Err(anyhow::anyhow!("Duplicate key column found: {}", name));
        }
    }

    let mut partitioned = BTreeMap::new();
    if columns.is_empty() {
        partitioned.insert(Vec::new(), data_frame.clone());
        return Ok(partitioned);
    }

    // Get unique combinations of all key values
    let key_columns: Vec<String> = columns.iter().map(|&name| name.to_string()).collect();
    let selectors = data_frame
        .clone()
        .lazy()
        .select(columns.iter().map(|&name| col(name)).collect::<Vec<_>>())
        .unique(Some(key_columns), UniqueKeepStrategy::Any)
        .collect()?;

    // For each row in the selectors DataFrame, we have a unique combination of key values
    for row_idx in 0..selectors.height() {
        let mut filter_expr: Option<Expr> = None;
        let mut key = Vec::with_capacity(columns.len());

        for &name in columns {
            let (value, key_filter) = match selectors.column(name)?.get(row_idx)? {
                AnyValue::String(s) => (Some(s.to_string()), col(name).eq(lit(s.to_string()))),
                AnyValue::StringOwned(s) => {
                    let s = s.to_string();
                    (Some(s.clone()), col(name).eq(lit(s)))
                }
                AnyValue::Null => (None, col(name).is_null()),
                v => anyhow::bail!("In key column {name}, found non String value: {v:?}"),
            };

            key.push(value);
            filter_expr = Some(match filter_expr {
                None => key_filter,
                Some(expr) => expr.and(key_filter),
            });
        }

        log::trace!("Partition for {key:?}");
        if let Some(filter) = filter_expr {
            let filtered = data_frame.clone().lazy().filter(filter).collect()?;
            partitioned.insert(key, filtered);
        }
    }

    Ok(partitioned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::df;

    fn key(values: &[&str]) -> PartitionKey {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    // Merged KPI rows from three runs
    fn create_test_dataframe() -> DataFrame {
        df! [
            "Event" => ["CUJ completed", "CUJ completed", "Max PSI", "Max PSI", "CUJ completed", "Displayed foo"],
            "Unit"  => ["Seconds", "Seconds", "Percent", "Percent", "Seconds", "Duration millis"],
            "Value" => [1.,  2.,  30.,  40.,  5.,  600.],
            "RunId" => [1, 2, 1, 2, 3, 1],
        ]
        .unwrap()
    }

    #[test]
    fn test_partition_with_no_columns() -> anyhow::Result<()> {
        let df = create_test_dataframe();
        let partitioned = partition_by_columns(&df, &[])?;
        assert_eq!(partitioned.len(), 1);
        assert_eq!(partitioned[&Vec::new()].height(), 6);
        Ok(())
    }

    #[test]
    fn test_partition_with_nonexistent_column() {
        let df = create_test_dataframe();
        assert!(partition_by_columns(&df, &["nonexistent"]).is_err());
    }

    #[test]
    fn test_partition_with_duplicate_columns() {
        let df = create_test_dataframe();
        assert!(partition_by_columns(&df, &["Event", "Event"]).is_err());
    }

    #[test]
    fn test_partition_with_numerical_column() {
        let df = create_test_dataframe();
        assert!(partition_by_columns(&df, &["Event", "RunId"]).is_err());
    }

    #[test]
    fn test_partition_by_single_column() -> anyhow::Result<()> {
        let df = create_test_dataframe();
        let partitioned = partition_by_columns(&df, &["Event"])?;

        assert_eq!(partitioned.len(), 3);
        assert_eq!(partitioned[&key(&["Max PSI"])].height(), 2);
        assert_eq!(partitioned[&key(&["Displayed foo"])].height(), 1);

        let values: Vec<f64> = partitioned[&key(&["CUJ completed"])]
            .column("Value")?
            .f64()?
            .into_iter()
            .map(|v| v.unwrap())
            .collect();
        assert_eq!(values, vec![1., 2., 5.]);

        // Partitions are ordered by key
        let keys = partitioned.keys().cloned().collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                key(&["CUJ completed"]),
                key(&["Displayed foo"]),
                key(&["Max PSI"])
            ]
        );
        Ok(())
    }

    #[test]
    fn test_partition_by_two_columns() -> anyhow::Result<()> {
        let df = create_test_dataframe();
        let partitioned = partition_by_columns(&df, &["Event", "Unit"])?;

        assert_eq!(partitioned.len(), 3);
        assert_eq!(
            partitioned[&key(&["CUJ completed", "Seconds"])].height(),
            3
        );
        assert_eq!(
            partitioned[&key(&["Displayed foo", "Duration millis"])].height(),
            1
        );
        Ok(())
    }

    #[test]
    fn test_partition_keeps_null_values_together() -> anyhow::Result<()> {
        let df = df! [
            "Event" => ["a", "a", "a"],
            "Unit"  => [Some("Percent"), None, None],
        ]?;
        let partitioned = partition_by_columns(&df, &["Event", "Unit"])?;

        assert_eq!(partitioned.len(), 2);
        assert_eq!(
            partitioned[&vec![Some("a".to_string()), None]].height(),
            2
        );
        Ok(())
    }
}
