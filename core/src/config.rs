//! Configuration surface of the core: the benign-pattern flag table (§4.3)
//! and the pattern-catalogue file format (§6).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CompareError, Result};

/// Independently toggled benign-pattern flags, defaults per §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ComparatorConfig {
    pub struct_alignment: bool,
    pub function_splits: bool,
    pub unused_return_types: bool,
    pub kernel_prints: bool,
    pub dead_code: bool,
    pub numerical_macros: bool,
    pub type_casts: bool,
    pub control_flow_only: bool,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        ComparatorConfig {
            struct_alignment: true,
            function_splits: true,
            unused_return_types: true,
            kernel_prints: true,
            dead_code: true,
            numerical_macros: true,
            type_casts: false,
            control_flow_only: false,
        }
    }
}

/// What to do when a pattern module fails to parse or does not conform to
/// the pattern conventions in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OnParseFailure {
    Warn,
    Abort,
}

impl Default for OnParseFailure {
    fn default() -> Self {
        OnParseFailure::Warn
    }
}

impl std::fmt::Display for OnParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OnParseFailure::Warn => f.write_str("warn"),
            OnParseFailure::Abort => f.write_str("abort"),
        }
    }
}

/// On-disk shape of the pattern-catalogue configuration file (§6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternCatalogueConfig {
    #[serde(default, rename = "on-parse-failure")]
    pub on_parse_failure: OnParseFailure,
    #[serde(default)]
    pub patterns: Vec<PathBuf>,
}

impl PatternCatalogueConfig {
    /// Parse a pattern-catalogue configuration file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| CompareError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| CompareError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = ComparatorConfig::default();
        assert!(cfg.struct_alignment);
        assert!(cfg.function_splits);
        assert!(cfg.unused_return_types);
        assert!(cfg.kernel_prints);
        assert!(cfg.dead_code);
        assert!(cfg.numerical_macros);
        assert!(!cfg.type_casts);
        assert!(!cfg.control_flow_only);
    }

    #[test]
    fn parses_pattern_catalogue() {
        let toml_text = r#"
            on-parse-failure = "abort"
            patterns = ["patterns/struct-pad.bc", "patterns/kprint.bc"]
        "#;
        let parsed: PatternCatalogueConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(parsed.on_parse_failure, OnParseFailure::Abort);
        assert_eq!(parsed.patterns.len(), 2);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: PatternCatalogueConfig = toml::from_str("").unwrap();
        assert_eq!(parsed.on_parse_failure, OnParseFailure::Warn);
        assert!(parsed.patterns.is_empty());
    }
}
