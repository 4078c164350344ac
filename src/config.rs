use crate::error::{ImportError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// What to do with a transaction whose `type` matches neither the credit nor
/// the debit vocabulary and whose amount carries no sign or Dr/Cr marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownDirectionPolicy {
    /// Keep the record as a debit and report the assumption in the notes.
    #[default]
    Debit,
    /// Keep the record as a credit and report the assumption in the notes.
    Credit,
    /// Discard the record.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Largest chunk, in bytes, sent to the structuring service in one call.
    pub max_chunk_size: usize,
    /// Documents shorter than this are rejected before any structuring call.
    pub min_statement_length: usize,
    pub max_attempts: u32,
    /// Base of the exponential backoff; the wait after attempt `k` is `base * 2^k`.
    pub backoff_base_ms: u64,
    pub happy_path_confidence: f64,
    pub repaired_confidence: f64,
    pub unknown_direction: UnknownDirectionPolicy,
    /// When false, a record with neither description nor payee is kept with a
    /// placeholder description instead of being dropped.
    pub require_description: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 12_000,
            min_statement_length: 50,
            max_attempts: 2,
            backoff_base_ms: 1_000,
            happy_path_confidence: 0.7,
            repaired_confidence: 0.5,
            unknown_direction: UnknownDirectionPolicy::Debit,
            require_description: true,
        }
    }
}

impl ImportConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ImportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ImportError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.max_chunk_size == 0 {
            return Err(ImportError::InvalidConfig(
                "max_chunk_size must be greater than 0".to_string(),
            ));
        }
        for confidence in [self.happy_path_confidence, self.repaired_confidence] {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(ImportError::InvalidConfidence(confidence));
            }
        }
        Ok(())
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ImportConfig::from_json_str(
            r#"{"max_attempts": 4, "unknown_direction": "drop"}"#,
        )
        .unwrap();
        assert_eq!(config.max_attempts, 4);
        assert_eq!(config.unknown_direction, UnknownDirectionPolicy::Drop);
        assert_eq!(config.max_chunk_size, 12_000);
        assert_eq!(config.backoff_base(), Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = ImportConfig::from_json_str(r#"{"max_attempts": 0}"#).unwrap_err();
        assert!(matches!(err, ImportError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let err = ImportConfig::from_json_str(r#"{"repaired_confidence": 1.5}"#).unwrap_err();
        assert!(matches!(err, ImportError::InvalidConfidence(c) if c == 1.5));
    }

    #[test]
    fn test_default_is_valid() {
        assert!(ImportConfig::default().validate().is_ok());
    }
}
