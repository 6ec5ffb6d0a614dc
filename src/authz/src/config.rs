//! Engine configuration loading and validation

use crate::error::{AuthzError, Result};
use crate::hierarchy::DEFAULT_MAX_DEPTH;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete engine configuration
///
/// Every section is optional in TOML; missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub hierarchy: HierarchySection,

    #[serde(default)]
    pub audit: AuditSection,

    #[serde(default)]
    pub metrics: MetricsSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_role_ttl")]
    pub role_ttl_secs: u64,
    #[serde(default = "default_decision_ttl")]
    pub decision_ttl_secs: u64,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HierarchySection {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuditSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_buffer")]
    pub buffer_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            role_ttl_secs: default_role_ttl(),
            decision_ttl_secs: default_decision_ttl(),
            capacity: default_cache_capacity(),
        }
    }
}

impl Default for HierarchySection {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

impl Default for AuditSection {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_size: default_audit_buffer(),
        }
    }
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self { enabled: true }
    }
}

// Default value functions
fn default_true() -> bool { true }
fn default_role_ttl() -> u64 { 300 }
fn default_decision_ttl() -> u64 { 60 }
fn default_cache_capacity() -> usize { 10_000 }
fn default_max_depth() -> usize { DEFAULT_MAX_DEPTH }
fn default_audit_buffer() -> usize { 10_000 }

impl CacheSection {
    pub fn role_ttl(&self) -> Duration {
        Duration::from_secs(self.role_ttl_secs)
    }

    pub fn decision_ttl(&self) -> Duration {
        Duration::from_secs(self.decision_ttl_secs)
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(contents)
            .map_err(|e| AuthzError::Config(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AuthzError::Config(format!("failed to encode configuration: {}", e)))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.hierarchy.max_depth == 0 || self.hierarchy.max_depth > DEFAULT_MAX_DEPTH {
            return Err(AuthzError::Config(format!(
                "hierarchy.max_depth must be between 1 and {}",
                DEFAULT_MAX_DEPTH
            )));
        }

        if self.cache.enabled {
            if self.cache.role_ttl_secs == 0 || self.cache.decision_ttl_secs == 0 {
                return Err(AuthzError::Config("cache TTLs must be greater than zero".to_string()));
            }
            if self.cache.capacity == 0 {
                return Err(AuthzError::Config("cache.capacity must be greater than zero".to_string()));
            }
        }

        if self.audit.enabled && self.audit.buffer_size == 0 {
            return Err(AuthzError::Config("audit.buffer_size must be greater than zero".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.role_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.decision_ttl(), Duration::from_secs(60));
        assert_eq!(config.hierarchy.max_depth, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [cache]
            decision_ttl_secs = 15

            [audit]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.decision_ttl_secs, 15);
        assert_eq!(config.cache.role_ttl_secs, 300);
        assert!(!config.audit.enabled);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_toml_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_rejects_out_of_range_depth() {
        let err = EngineConfig::from_toml_str("[hierarchy]\nmax_depth = 12\n").unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
        assert!(EngineConfig::from_toml_str("[hierarchy]\nmax_depth = 0\n").is_err());
    }

    #[test]
    fn test_rejects_zero_ttl_only_when_cache_enabled() {
        assert!(EngineConfig::from_toml_str("[cache]\nrole_ttl_secs = 0\n").is_err());
        assert!(EngineConfig::from_toml_str("[cache]\nenabled = false\nrole_ttl_secs = 0\n").is_ok());
    }

    #[test]
    fn test_malformed_toml() {
        let err = EngineConfig::from_toml_str("[cache\nenabled = true").unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hierarchy]\nmax_depth = 4").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.hierarchy.max_depth, 4);

        assert!(EngineConfig::load("/nonexistent/bastion.toml").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let encoded = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&encoded).unwrap(), config);
    }
}
