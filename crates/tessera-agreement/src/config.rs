use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::serialize;

use crate::error::AgreementError;

/// Agreement configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgreementConfig {
    /// Base clock unit in milliseconds; each state waits a multiple of it
    pub lambda_ms: u64,

    /// Upper bound on blocks parked in the leader selector's pending pool
    pub max_pending_blocks: usize,

    /// Retry interval of the background fast-vote validation task
    pub fast_vote_retry_ms: u64,
}

impl Default for AgreementConfig {
    fn default() -> Self {
        AgreementConfig {
            lambda_ms: 250,
            max_pending_blocks: 256,
            fast_vote_retry_ms: 5,
        }
    }
}

impl AgreementConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self, AgreementError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AgreementError::Config(format!("{}: {}", path.display(), e)))?;
        let config: AgreementConfig = serialize::from_json(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), AgreementError> {
        let content = serialize::to_json_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| AgreementError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AgreementError> {
        if self.lambda_ms == 0 {
            return Err(AgreementError::Config("lambda_ms must be positive".into()));
        }
        if self.max_pending_blocks == 0 {
            return Err(AgreementError::Config(
                "max_pending_blocks must be positive".into(),
            ));
        }
        if self.fast_vote_retry_ms == 0 {
            return Err(AgreementError::Config(
                "fast_vote_retry_ms must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn lambda(&self) -> Duration {
        Duration::from_millis(self.lambda_ms)
    }

    pub fn fast_vote_retry(&self) -> Duration {
        Duration::from_millis(self.fast_vote_retry_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgreementConfig::default();
        assert_eq!(config.lambda(), Duration::from_millis(250));
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!(
            "tessera-agreement-config-{}.json",
            std::process::id()
        ));
        let config = AgreementConfig {
            lambda_ms: 40,
            max_pending_blocks: 8,
            fast_vote_retry_ms: 1,
        };
        config.save(&path).unwrap();
        let loaded = AgreementConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AgreementConfig = serialize::from_json("{\"lambda_ms\": 10}").unwrap();
        assert_eq!(config.lambda_ms, 10);
        assert_eq!(config.max_pending_blocks, 256);
    }

    #[test]
    fn test_config_from_json_value() {
        let value = serde_json::json!({
            "lambda_ms": 100,
            "max_pending_blocks": 16,
            "fast_vote_retry_ms": 2,
        });
        let config: AgreementConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.lambda(), Duration::from_millis(100));
        assert_eq!(config.fast_vote_retry(), Duration::from_millis(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_lambda_rejected() {
        let config = AgreementConfig {
            lambda_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AgreementError::Config(_))));
    }
}
