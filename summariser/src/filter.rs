use std::path::{Path, PathBuf};

use itertools::Itertools;
use regex::Regex;
use walkdir::WalkDir;

/// File name of the per-run KPI table.
pub const KPI_TABLE_FILE_NAME: &str = "kpis.csv";

/// Matches the layout the CUJ runner writes its KPI tables to.
pub const DEFAULT_RUN_ID_RE: &str = r".*/run_(\d+)/processed/kpis\.csv";

/// The run id of a KPI table, taken from the first capture group of `run_id_re`.
///
/// The pattern must match from the start of the path.
pub fn run_id_from_path(path: &Path, run_id_re: &Regex) -> Option<String> {
    run_id_re
        .captures(&path.to_string_lossy())
        .filter(|caps| caps.get(0).is_some_and(|m| m.start() == 0))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Every KPI table under `root`, in path order.
pub fn find_kpi_tables(root: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut tables = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == KPI_TABLE_FILE_NAME {
            tables.push(entry.into_path());
        }
    }
    log::debug!("Found {} KPI tables under {}", tables.len(), root.display());
    Ok(tables)
}

/// Pair each KPI table with its run id, ordered by run id.
///
/// Paths without a run id are skipped. If a run id appears more than once, the lexically last
/// path is used.
pub fn select_kpi_tables<I>(paths: I, run_id_re: &Regex) -> Vec<(String, PathBuf)>
where
    I: IntoIterator<Item = PathBuf>,
{
    paths
        .into_iter()
        .filter_map(|path| match run_id_from_path(&path, run_id_re) {
            Some(run_id) => Some((run_id, path)),
            None => {
                log::warn!(
                    "Skipping {}, no run id matching {}",
                    path.display(),
                    run_id_re.as_str()
                );
                None
            }
        })
        .into_group_map()
        .into_iter()
        .filter_map(|(run_id, mut paths)| {
            paths.sort();
            if paths.len() > 1 {
                log::warn!("Found {} KPI tables for run {run_id}: {paths:?}", paths.len());
            }
            paths.pop().map(|path| (run_id, path))
        })
        .sorted()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn default_re() -> Regex {
        Regex::new(DEFAULT_RUN_ID_RE).unwrap()
    }

    #[test]
    fn run_id_from_default_layout() {
        let re = default_re();
        assert_eq!(
            run_id_from_path(Path::new("/out/cuj/run_12/processed/kpis.csv"), &re),
            Some("12".to_string())
        );
        assert_eq!(
            run_id_from_path(Path::new("/out/cuj/run_12/kpis.csv"), &re),
            None
        );
    }

    #[test]
    fn run_id_pattern_is_anchored_at_path_start() -> anyhow::Result<()> {
        let path = Path::new("/out/run_3/processed/kpis.csv");
        let relative = Regex::new(r"run_([0-9]+)/processed/kpis\.csv")?;
        assert_eq!(run_id_from_path(path, &relative), None);
        assert_eq!(
            run_id_from_path(Path::new("run_3/processed/kpis.csv"), &relative),
            Some("3".to_string())
        );
        assert_eq!(run_id_from_path(path, &default_re()), Some("3".to_string()));
        Ok(())
    }

    #[test]
    fn select_skips_unmatched_and_keeps_last_duplicate() {
        let paths = vec![
            PathBuf::from("/b/run_2/processed/kpis.csv"),
            PathBuf::from("/a/run_1/processed/kpis.csv"),
            PathBuf::from("/somewhere/kpis.csv"),
            PathBuf::from("/a/run_2/processed/kpis.csv"),
        ];
        let selected = select_kpi_tables(paths, &default_re());
        assert_eq!(
            selected,
            vec![
                (
                    "1".to_string(),
                    PathBuf::from("/a/run_1/processed/kpis.csv")
                ),
                (
                    "2".to_string(),
                    PathBuf::from("/b/run_2/processed/kpis.csv")
                ),
            ]
        );
    }

    #[test]
    fn find_tables_in_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        for run in ["run_1", "run_2"] {
            let processed = dir.path().join(run).join("processed");
            std::fs::create_dir_all(&processed)?;
            std::fs::write(processed.join(KPI_TABLE_FILE_NAME), "")?;
            std::fs::write(processed.join("psi.csv"), "")?;
        }

        let tables = find_kpi_tables(dir.path())?;
        assert_eq!(
            tables,
            vec![
                dir.path().join("run_1/processed/kpis.csv"),
                dir.path().join("run_2/processed/kpis.csv"),
            ]
        );
        Ok(())
    }
}
