//! Transformer configuration

use serde::{Deserialize, Serialize};
use vcfg_metadata::{is_bookkeeping_key, DEFAULT_MAX_DEPTH};

use crate::error::ConfigError;

/// Transformer configuration
///
/// Every field has a default, so a partial TOML document is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformerConfig {
    /// Compound discriminator field in extracted output and builder input
    pub discriminator_key: String,
    /// Schema nesting limit for the normalizer
    pub max_schema_depth: usize,
    /// Carry matching fields over when a compound switches variant
    pub carry_over_fields: bool,
    /// Report changed paths from diffs
    pub collect_diff_paths: bool,
}

impl TransformerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With discriminator field
    #[inline]
    #[must_use]
    pub fn with_discriminator_key(mut self, key: impl Into<String>) -> Self {
        self.discriminator_key = key.into();
        self
    }

    /// With schema depth limit
    #[inline]
    #[must_use]
    pub fn with_max_schema_depth(mut self, depth: usize) -> Self {
        self.max_schema_depth = depth;
        self
    }

    /// With field carryover on variant switch
    #[inline]
    #[must_use]
    pub fn with_carry_over_fields(mut self, enabled: bool) -> Self {
        self.carry_over_fields = enabled;
        self
    }

    /// With changed-path collection in diffs
    #[inline]
    #[must_use]
    pub fn with_collect_diff_paths(mut self, enabled: bool) -> Self {
        self.collect_diff_paths = enabled;
        self
    }

    /// Parse and validate a TOML document
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the document is malformed or invalid
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check field constraints
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the offending field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discriminator_key.is_empty() {
            return Err(ConfigError::Invalid(
                "discriminator_key must not be empty".into(),
            ));
        }
        if is_bookkeeping_key(&self.discriminator_key) {
            return Err(ConfigError::Invalid(format!(
                "discriminator_key '{}' uses the reserved '__' prefix",
                self.discriminator_key
            )));
        }
        if self.max_schema_depth == 0 {
            return Err(ConfigError::Invalid(
                "max_schema_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for TransformerConfig {
    fn default() -> Self {
        Self {
            discriminator_key: "type".to_owned(),
            max_schema_depth: DEFAULT_MAX_DEPTH,
            carry_over_fields: true,
            collect_diff_paths: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TransformerConfig::default();
        assert_eq!(config.discriminator_key, "type");
        assert_eq!(config.max_schema_depth, 64);
        assert!(config.carry_over_fields);
        assert!(config.collect_diff_paths);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = TransformerConfig::from_toml_str(
            r#"
            discriminator_key = "kind"
            carry_over_fields = false
            "#,
        )
        .unwrap();
        assert_eq!(config.discriminator_key, "kind");
        assert!(!config.carry_over_fields);
        assert_eq!(config.max_schema_depth, 64);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            TransformerConfig::from_toml_str(r#"discriminator_key = """#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TransformerConfig::from_toml_str(r#"discriminator_key = "__type""#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TransformerConfig::from_toml_str("max_schema_depth = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            TransformerConfig::from_toml_str("max_schema_depth = \"deep\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn builder_methods() {
        let config = TransformerConfig::new()
            .with_discriminator_key("variant")
            .with_max_schema_depth(8)
            .with_collect_diff_paths(false);
        assert_eq!(config.discriminator_key, "variant");
        assert_eq!(config.max_schema_depth, 8);
        assert!(!config.collect_diff_paths);
    }
}
