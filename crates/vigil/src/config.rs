//! # Engine Configuration
//!
//! One TOML file configures the whole engine. Detection sections sit at the
//! top level; the synchronizer, audit log and session settings get their
//! own tables.
//!
//! ```toml
//! [ledger]
//! grace_ms = 10000
//!
//! [checks.speed]
//! max_speed = 7.2
//!
//! [sync]
//! ttl_ms = 300000
//! fetch_timeout_ms = 50
//!
//! [audit]
//! enabled = true
//! path = "/var/lib/vigil/audit.log"
//!
//! [session]
//! idle_timeout_ms = 300000
//! ```

use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vigil_audit::AuditConfig;
use vigil_cluster::SyncConfig;
use vigil_detection::{ConfigError, ConfigResult, DetectionConfig};

/// Session lifecycle settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions without events for this long are torn down by `sweep` (ms).
    pub idle_timeout_ms: u64,
    /// Fetch cluster state when a session is created.
    pub fetch_on_join: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 300_000, // 5 minutes
            fetch_on_join: true,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Checks, ledger and normalizer (hot-reloadable).
    #[serde(flatten)]
    pub detection: DetectionConfig,
    /// Cluster synchronizer.
    pub sync: SyncConfig,
    /// Audit log.
    pub audit: AuditConfig,
    /// Sessions.
    pub session: SessionConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Parse or validation failure.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// I/O, parse or validation failure.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// The first out-of-range value.
    pub fn validate(&self) -> EngineResult<()> {
        self.detection.validate()?;
        self.sync.validate()?;
        if self.sync.enabled {
            check_cluster_ttl(&self.detection, &self.sync)?;
        }
        if self.audit.enabled {
            self.audit.validate()?;
        }
        self.validate_session()?;
        Ok(())
    }

    fn validate_session(&self) -> ConfigResult<()> {
        if self.session.idle_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "session.idle_timeout_ms".into(),
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Rejects a store expiry shorter than the local decay-to-clean time, which
/// would let a player shed a live level by moving to another instance.
pub(crate) fn check_cluster_ttl(detection: &DetectionConfig, sync: &SyncConfig) -> ConfigResult<()> {
    let required = detection.min_cluster_ttl_ms();
    if sync.ttl_ms < required {
        return Err(ConfigError::Invalid {
            field: "sync.ttl_ms".into(),
            reason: format!("{} is shorter than the {required} ms a punish-level entry needs to decay", sync.ttl_ms),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use vigil_shared::CheckId;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert!(!config.audit.enabled);
        assert!(config.sync.enabled);
    }

    #[test]
    fn test_sections_parse() {
        let config = EngineConfig::from_toml_str(
            r#"
            [ledger]
            grace_ms = 5000

            [checks.speed]
            max_speed = 9.0
            flag_threshold = 6.0

            [sync]
            fetch_timeout_ms = 25

            [session]
            idle_timeout_ms = 60000
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.ledger.grace_ms, 5_000);
        assert!((config.detection.checks.speed.max_speed - 9.0).abs() < f64::EPSILON);
        assert!((config.detection.common(CheckId::SPEED).flag_threshold - 6.0).abs() < f64::EPSILON);
        assert_eq!(config.sync.fetch_timeout_ms, 25);
        assert_eq!(config.session.idle_timeout_ms, 60_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_session = EngineConfig::from_toml_str("[session]\nidle_timeout_ms = 0\n");
        assert!(matches!(bad_session, Err(EngineError::Config(ConfigError::Invalid { .. }))));

        let bad_thresholds = EngineConfig::from_toml_str("[checks.reach]\nflag_threshold = 9.0\npunish_threshold = 3.0\n");
        assert!(matches!(bad_thresholds, Err(EngineError::Config(ConfigError::Invalid { .. }))));

        let bad_sync = EngineConfig::from_toml_str("[sync]\nttl_ms = 0\n");
        assert!(bad_sync.is_err());
    }

    #[test]
    fn test_ttl_must_outlive_decay() {
        let short = EngineConfig::from_toml_str("[checks.custom.slow]\ntau_secs = 1000.0\n\n[sync]\nttl_ms = 100\n");
        assert!(matches!(
            short,
            Err(EngineError::Config(ConfigError::Invalid { ref field, .. })) if field == "sync.ttl_ms"
        ));

        // Same settings are fine without a cluster.
        let local = EngineConfig::from_toml_str(
            "[checks.custom.slow]\ntau_secs = 1000.0\n\n[sync]\nenabled = false\nttl_ms = 100\n",
        );
        assert!(local.is_ok());

        let defaults = EngineConfig::default();
        assert!(defaults.sync.ttl_ms >= defaults.detection.min_cluster_ttl_ms());
    }
}
