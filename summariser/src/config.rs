use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::PsiField;

/// Scalar configuration for parsing and KPI extraction.
///
/// Every field is optional in a config file and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsiConfig {
    /// The PSI metric that KPIs are computed from
    pub psi_to_monitor: PsiField,
    /// Logcat events earlier than this before the monitor started are treated as having corrupt
    /// timestamps and are dropped
    pub event_time_tolerance_millis: i64,
    /// `Displayed` events at or above this duration are high latency
    pub displayed_high_latency_millis: i64,
    /// SystemServer timing events at or above this duration are high latency
    pub ss_event_high_latency_millis: i64,
    /// SystemServer timing events below this duration are not plotted
    pub ss_event_min_duration_to_plot_millis: i64,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self {
            psi_to_monitor: PsiField::default(),
            event_time_tolerance_millis: 600_000,
            displayed_high_latency_millis: 1000,
            ss_event_high_latency_millis: 250,
            ss_event_min_duration_to_plot_millis: 50,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl PsiConfig {
    /// Load the config from a TOML file.
    pub fn load<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PsiBlock, PsiStat};

    #[test]
    fn empty_config_uses_defaults() {
        let config = PsiConfig::from_toml_str("").unwrap();
        assert_eq!(config, PsiConfig::default());
        assert_eq!(config.psi_to_monitor.to_string(), "cpu_some_avg10");
        assert_eq!(config.event_time_tolerance_millis, 600_000);
    }

    #[test]
    fn partial_config_overrides_given_fields() {
        let config = PsiConfig::from_toml_str(
            r#"
            psi_to_monitor = "memory_full_avg60"
            ss_event_high_latency_millis = 500
            "#,
        )
        .unwrap();
        assert_eq!(
            config.psi_to_monitor,
            PsiField::new(PsiBlock::MemoryFull, PsiStat::Avg60)
        );
        assert_eq!(config.ss_event_high_latency_millis, 500);
        assert_eq!(config.displayed_high_latency_millis, 1000);
    }

    #[test]
    fn unknown_psi_field_is_rejected() {
        let err = PsiConfig::from_toml_str(r#"psi_to_monitor = "irq_some_avg10""#).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
        assert!(err.to_string().contains("irq_some_avg10"));
    }

    #[test]
    fn load_from_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("psi.toml");
        std::fs::write(&path, "event_time_tolerance_millis = 1000\n")?;
        assert_eq!(PsiConfig::load(&path)?.event_time_tolerance_millis, 1000);
        Ok(())
    }
}
