//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! [diff]
//! ignored_fields = ["_id", "_rev", "_updatedAt"]
//! summarizers = ["reference"]
//!
//! [[diff.schema]]
//! name = "post"
//! title = "Post"
//!
//! [changeset]
//! text_patches = true
//!
//! [keys]
//! length = 12
//!
//! [session]
//! auto_flush = false
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::changeset::ChangeSetOptions;
use crate::diff::{
    BlockSummarizer, DiffOptions, ReferenceSummarizer, Schema, SummarizerRegistry, DEFAULT_IGNORED_FIELDS,
};
use crate::keys::DEFAULT_KEY_LENGTH;
use crate::patch::ApplyOptions;
use crate::reconcile::SessionConfig;

/// Built-in summarizers selectable by name.
pub const BUILTIN_SUMMARIZERS: [&str; 2] = ["reference", "block"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown summarizer {0:?}")]
    UnknownSummarizer(String),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub ignored_fields: Vec<String>,
    /// Names from [`BUILTIN_SUMMARIZERS`], each registered under its own name.
    pub summarizers: Vec<String>,
    pub schema: Schema,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            ignored_fields: DEFAULT_IGNORED_FIELDS.iter().map(|f| f.to_string()).collect(),
            summarizers: BUILTIN_SUMMARIZERS.iter().map(|s| s.to_string()).collect(),
            schema: Schema::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub length: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            length: DEFAULT_KEY_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub diff: DiffConfig,
    pub changeset: ChangeSetOptions,
    pub keys: KeyConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = self
            .diff
            .summarizers
            .iter()
            .find(|name| !BUILTIN_SUMMARIZERS.contains(&name.as_str()))
        {
            return Err(ConfigError::UnknownSummarizer(name.clone()));
        }
        if self.keys.length == 0 {
            return Err(ConfigError::Invalid {
                field: "keys.length",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.changeset.text_max_ratio.is_finite() && self.changeset.text_max_ratio > 0.0) {
            return Err(ConfigError::Invalid {
                field: "changeset.text_max_ratio",
                reason: format!("{} is not a positive number", self.changeset.text_max_ratio),
            });
        }
        Ok(())
    }

    pub fn diff_options(&self) -> DiffOptions {
        let mut summarizers = SummarizerRegistry::new();
        for name in &self.diff.summarizers {
            match name.as_str() {
                "reference" => summarizers.register(name.clone(), ReferenceSummarizer),
                "block" => summarizers.register(name.clone(), BlockSummarizer),
                _ => {}
            }
        }
        DiffOptions {
            ignored_fields: self.diff.ignored_fields.iter().cloned().collect(),
            summarizers,
            schema: self.diff.schema.clone(),
        }
    }

    pub fn changeset_options(&self) -> ChangeSetOptions {
        self.changeset.clone()
    }

    pub fn apply_options(&self) -> ApplyOptions {
        ApplyOptions {
            key_length: self.keys.length,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        self.session.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.apply_options(), ApplyOptions::default());
        assert!(config.diff_options().summarizers.get("reference").is_some());
        assert!(config.diff_options().ignored_fields.contains("_rev"));
        assert!(config.session.auto_flush);
    }

    #[test]
    fn reads_every_section() {
        let config = EngineConfig::from_toml_str(
            r#"
            [diff]
            ignored_fields = ["_id"]
            summarizers = ["block"]

            [[diff.schema]]
            name = "post"
            title = "Post"
            fields = [{ name = "body", title = "Body", type = "array" }]

            [changeset]
            text_patches = true
            text_min_length = 10

            [keys]
            length = 8

            [session]
            auto_flush = false
            "#,
        )
        .unwrap();
        let diff = config.diff_options();
        assert!(diff.summarizers.get("reference").is_none());
        assert!(diff.summarizers.get("block").is_some());
        assert_eq!(diff.schema.get("post").unwrap().field_title("body"), "Body");
        assert!(config.changeset.text_patches);
        assert_eq!(config.changeset.text_min_length, 10);
        assert_eq!(config.changeset.text_max_ratio, 1.2);
        assert_eq!(config.apply_options().key_length, 8);
        assert!(!config.session.auto_flush);
        assert!(config.session.use_if_revision);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml_str("[diff]\nsummarizers = [\"nope\"]"),
            Err(ConfigError::UnknownSummarizer(name)) if name == "nope"
        ));
        assert!(matches!(
            EngineConfig::from_toml_str("[keys]\nlength = 0"),
            Err(ConfigError::Invalid { field: "keys.length", .. })
        ));
        assert!(matches!(EngineConfig::from_toml_str("keys = 3"), Err(ConfigError::Parse(_))));
    }
}
