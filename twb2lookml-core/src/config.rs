//! Run configuration.
//!
//! Everything partner-tunable lives here: scoring weights and thresholds,
//! visualization overrides, identifier shape and model-level settings.

use crate::emit::lookml::embeds_terminator;
use crate::error::TranslateError;
use crate::{DEFAULT_CONNECTION, DEFAULT_FALLBACK_VIS, DEFAULT_HASH_LEN, DEFAULT_MAX_SLUG_LEN};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Configuration for one translation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Model name; derived from the workbook name when absent.
    pub model_name: Option<String>,
    /// Looker connection name written into the model.
    pub connection: String,
    /// Caching policy block; omitted from the model when `None`.
    pub datagroup: Option<DatagroupConfig>,
    /// Identifier shape.
    pub naming: NamingConfig,
    /// Complexity scoring.
    pub scoring: ScoringConfig,
    /// Visualization mapping.
    pub visualization: VisualizationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model_name: None,
            connection: DEFAULT_CONNECTION.to_string(),
            datagroup: Some(DatagroupConfig::default()),
            naming: NamingConfig::default(),
            scoring: ScoringConfig::default(),
            visualization: VisualizationConfig::default(),
        }
    }
}

/// Datagroup rendered into the model, plus `persist_with`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatagroupConfig {
    pub name: String,
    pub sql_trigger: String,
    pub max_cache_age: String,
}

impl Default for DatagroupConfig {
    fn default() -> Self {
        Self {
            name: "default_datagroup".to_string(),
            sql_trigger: "SELECT MAX(updated_at) FROM etl_metadata".to_string(),
            max_cache_age: "1 hour".to_string(),
        }
    }
}

/// Identifier shape used by the naming service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Hex characters of the content hash kept as suffix.
    pub hash_len: usize,
    /// Maximum length of the human-readable slug.
    pub max_slug_len: usize,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            hash_len: DEFAULT_HASH_LEN,
            max_slug_len: DEFAULT_MAX_SLUG_LEN,
        }
    }
}

/// Complexity scoring configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoringWeights,
    /// Characters of normalized SQL per length bucket.
    pub sql_length_bucket: u32,
    pub thresholds: Thresholds,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            sql_length_bucket: 500,
            thresholds: Thresholds::default(),
        }
    }
}

impl ScoringConfig {
    /// Flags more work for review: heavier weights, lower thresholds.
    pub fn strict() -> Self {
        Self {
            weights: ScoringWeights {
                lod: 6,
                join: 3,
                aggregation: 1,
                sql_length: 2,
                unsupported: 6,
                conflict: 4,
            },
            sql_length_bucket: 250,
            thresholds: Thresholds {
                review: 3,
                high_risk: 8,
            },
        }
    }

    /// Only clearly complex views leave the automated bucket.
    pub fn lenient() -> Self {
        Self {
            weights: ScoringWeights {
                lod: 4,
                join: 1,
                aggregation: 0,
                sql_length: 1,
                unsupported: 3,
                conflict: 1,
            },
            sql_length_bucket: 1000,
            thresholds: Thresholds {
                review: 10,
                high_risk: 25,
            },
        }
    }
}

/// Points per occurrence of each scoring factor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    /// Per LOD expression.
    pub lod: u32,
    /// Per join keyword in Custom SQL.
    pub join: u32,
    /// Per distinct aggregation function.
    pub aggregation: u32,
    /// Per SQL length bucket.
    pub sql_length: u32,
    /// Per unsupported calculation or connection construct.
    pub unsupported: u32,
    /// Per field conflict.
    pub conflict: u32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            lod: 5,
            join: 2,
            aggregation: 1,
            sql_length: 1,
            unsupported: 4,
            conflict: 2,
        }
    }
}

/// Category boundaries. `score < review` is automated, `score > high_risk`
/// is high risk, everything between needs manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub review: u32,
    pub high_risk: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            review: 5,
            high_risk: 12,
        }
    }
}

/// Visualization mapping configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizationConfig {
    /// Tableau mark class (case-insensitive) to Looker element type.
    pub overrides: BTreeMap<String, String>,
    /// Element type for marks absent from the table.
    pub fallback: String,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            overrides: BTreeMap::new(),
            fallback: DEFAULT_FALLBACK_VIS.to_string(),
        }
    }
}

impl RunConfig {
    /// Parse and validate a YAML configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, TranslateError> {
        let config: RunConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TranslateError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading run configuration from {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        Ok(config)
    }

    /// Reject configurations the pipeline cannot honor.
    pub fn validate(&self) -> Result<(), TranslateError> {
        let thresholds = &self.scoring.thresholds;
        if thresholds.review > thresholds.high_risk {
            return Err(TranslateError::InvalidConfig(format!(
                "review threshold {} exceeds high-risk threshold {}",
                thresholds.review, thresholds.high_risk
            )));
        }
        if self.scoring.sql_length_bucket == 0 {
            return Err(TranslateError::InvalidConfig(
                "sql_length_bucket must be positive".to_string(),
            ));
        }
        if !(1..=64).contains(&self.naming.hash_len) {
            return Err(TranslateError::InvalidConfig(format!(
                "hash_len must be within 1..=64, got {}",
                self.naming.hash_len
            )));
        }
        if self.naming.max_slug_len == 0 {
            return Err(TranslateError::InvalidConfig(
                "max_slug_len must be positive".to_string(),
            ));
        }
        if let Some(datagroup) = &self.datagroup {
            if embeds_terminator(&datagroup.sql_trigger) {
                return Err(TranslateError::InvalidConfig(format!(
                    "datagroup '{}' sql_trigger must not contain ';;'",
                    datagroup.name
                )));
            }
        }
        if self.visualization.fallback.trim().is_empty() {
            return Err(TranslateError::InvalidConfig(
                "visualization fallback must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = RunConfig::default();
        assert_eq!(config.connection, "enterprise_database");
        assert_eq!(config.naming.hash_len, 8);
        assert_eq!(config.visualization.fallback, "table");
        assert!(config.datagroup.is_some());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn strict_flags_earlier_than_lenient() {
        let strict = ScoringConfig::strict();
        let lenient = ScoringConfig::lenient();
        assert!(strict.thresholds.review < lenient.thresholds.review);
        assert!(strict.thresholds.high_risk < lenient.thresholds.high_risk);
        assert!(strict.weights.lod > lenient.weights.lod);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
connection: warehouse
scoring:
  thresholds:
    review: 2
visualization:
  overrides:
    Treemap: looker_grid
"#;
        let config = RunConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.connection, "warehouse");
        assert_eq!(config.scoring.thresholds.review, 2);
        assert_eq!(config.scoring.thresholds.high_risk, 12);
        assert_eq!(config.scoring.weights.lod, 5);
        assert_eq!(
            config.visualization.overrides.get("Treemap").map(String::as_str),
            Some("looker_grid")
        );
    }

    #[test]
    fn inverted_thresholds_rejected() {
        let yaml = "scoring:\n  thresholds:\n    review: 20\n    high_risk: 10\n";
        let err = RunConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, TranslateError::InvalidConfig(_)));
    }

    #[test]
    fn out_of_range_hash_len_rejected() {
        let mut config = RunConfig::default();
        config.naming.hash_len = 0;
        assert!(config.validate().is_err());
        config.naming.hash_len = 65;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_fallback_rejected() {
        let mut config = RunConfig::default();
        config.visualization.fallback = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn datagroup_trigger_with_terminator_rejected() {
        let parsed = RunConfig::from_yaml_str("datagroup:\n  sql_trigger: \"SELECT ';;'\"\n");
        assert!(matches!(parsed, Err(TranslateError::InvalidConfig(_))));
    }

    #[test]
    fn datagroup_can_be_disabled() {
        let config = RunConfig::from_yaml_str("datagroup: null\n").unwrap();
        assert!(config.datagroup.is_none());
    }
}
