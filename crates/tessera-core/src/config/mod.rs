//! Configuration system for tessera.

use serde::{Deserialize, Serialize};

use crate::error::{TesseraError, TesseraResult};
use crate::merge::ConflictPolicy;

/// What a multi-unit run does when one unit cannot be assigned an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and keep building the remaining units.
    #[default]
    SkipAndContinue,
    /// Stop the run at the first failed unit.
    Abort,
}

/// Graph construction and consolidation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// How conflicting non-empty property values are resolved.
    pub conflict_policy: ConflictPolicy,
    /// Synthesize a reverse companion for every edge after consolidation.
    pub add_reverse_edges: bool,
    /// Suffix appended to the label of synthesized reverse edges.
    pub reverse_suffix: String,
    /// Maximum schema nesting depth accepted by introspection (default: 4).
    pub max_nesting_depth: usize,
    /// Hex characters of the SHA-256 digest kept in node ids (default: 32, i.e. 128 bits).
    pub id_hash_length: usize,
    /// String properties longer than this are truncated (default: 1000).
    pub max_string_length: usize,
    /// Appended to truncated string properties.
    pub truncate_suffix: String,
    /// Key flattened component properties as `field.sub_field`.
    pub prefix_component_fields: bool,
    /// Check the no-orphan-edge invariant on every produced graph.
    pub validate_graph: bool,
    /// Batch behavior when a unit fails identity resolution.
    pub failure_policy: FailurePolicy,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            add_reverse_edges: false,
            reverse_suffix: "_REVERSE".to_string(),
            max_nesting_depth: 4,
            id_hash_length: 32,
            max_string_length: 1000,
            truncate_suffix: "...".to_string(),
            prefix_component_fields: true,
            validate_graph: true,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl GraphConfig {
    /// Shortest digest prefix accepted in ids, in hex characters.
    pub const MIN_ID_HASH_LENGTH: usize = 32;
    /// Full SHA-256 digest, in hex characters.
    pub const MAX_ID_HASH_LENGTH: usize = 64;

    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> TesseraResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| TesseraError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TesseraError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| TesseraError::Configuration(e.to_string()))?,
            _ => {
                return Err(TesseraError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(policy) = std::env::var("TESSERA_CONFLICT_POLICY") {
            if let Ok(policy) = policy.parse() {
                config.conflict_policy = policy;
            }
        }
        if let Ok(value) = std::env::var("TESSERA_REVERSE_EDGES") {
            config.add_reverse_edges = matches!(value.trim(), "1" | "true" | "yes");
        }
        if let Some(depth) = env_usize("TESSERA_MAX_DEPTH") {
            config.max_nesting_depth = depth;
        }
        if let Some(len) = env_usize("TESSERA_ID_HASH_LENGTH") {
            config.id_hash_length = len;
        }
        if let Ok(value) = std::env::var("TESSERA_FAILURE_POLICY") {
            match value.trim() {
                "abort" => config.failure_policy = FailurePolicy::Abort,
                "skip_and_continue" | "skip" => {
                    config.failure_policy = FailurePolicy::SkipAndContinue
                }
                _ => {}
            }
        }

        config
    }

    /// Reject values the engine cannot honor.
    pub fn validate(&self) -> TesseraResult<()> {
        if !(Self::MIN_ID_HASH_LENGTH..=Self::MAX_ID_HASH_LENGTH).contains(&self.id_hash_length) {
            return Err(TesseraError::Configuration(format!(
                "id_hash_length must be between {} and {}, got {}",
                Self::MIN_ID_HASH_LENGTH,
                Self::MAX_ID_HASH_LENGTH,
                self.id_hash_length
            )));
        }
        if self.max_nesting_depth == 0 {
            return Err(TesseraError::Configuration(
                "max_nesting_depth must be at least 1".to_string(),
            ));
        }
        if self.reverse_suffix.is_empty() {
            return Err(TesseraError::Configuration(
                "reverse_suffix must not be empty".to_string(),
            ));
        }
        if self.max_string_length <= self.truncate_suffix.chars().count() {
            return Err(TesseraError::Configuration(
                "max_string_length must exceed the truncate suffix length".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the conflict resolution policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Enable or disable reverse edge synthesis.
    pub fn with_reverse_edges(mut self, enabled: bool) -> Self {
        self.add_reverse_edges = enabled;
        self
    }

    /// Set the maximum schema nesting depth.
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Set the batch failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Enable or disable component field prefixes.
    pub fn with_component_prefixes(mut self, enabled: bool) -> Self {
        self.prefix_component_fields = enabled;
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
