use perspectiva_catalog::{Catalog, CatalogIssue};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

mod aggregate;
mod answers;
mod binding;
mod dimensions;
mod exact_match;
mod profile;
mod resolver;

pub use aggregate::{score_couple, score_couple_with, ScoreResult};
pub use answers::AnswerSet;
pub use binding::{compute_answers_hash, compute_inputs_hash};
pub use dimensions::{
    score_scenario, ExclusionReason, Respondent, ScenarioBreakdown, ScenarioComponents,
    ScenarioExclusion, ScenarioScores,
};
pub use exact_match::{score_exact_match, ExactMatchScores};
pub use profile::{tag_profile, TagAverage};
pub use resolver::{resolve_answer, resolve_tags, ResolveError};

pub const SCORING_ALGO_ID: &str = "perspective4_tag_union_v1";
pub const CONFIG_ENV_VAR: &str = "PERSPECTIVA_CONFIG";
pub use perspectiva_core::MAX_ROUND_DIGITS;

#[derive(Debug, thiserror::Error)]
pub enum HashError {
    #[error("canonical JSON serialization failed: {0}")]
    Jcs(#[from] serde_json::Error),
}

pub fn jcs_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HashError> {
    Ok(serde_jcs::to_vec(value)?)
}

pub fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn config_hash(config: &ScoringConfig) -> Result<String, HashError> {
    Ok(blake3_hex(&jcs_bytes(config)?))
}

pub fn catalog_hash(catalog: &Catalog) -> Result<String, HashError> {
    Ok(blake3_hex(&jcs_bytes(catalog)?))
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    /// Tag-vector dimensions only.
    TagVector,
    /// Tag-vector dimensions plus the exact-match secondary report.
    TagVectorWithExactMatch,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    pub scoring_algo_id: String,
    pub similarity_metric_id: String,
    pub round_digits: u32,
    pub report_components: bool,
    pub method: ScoringMethod,
}

impl ScoringConfig {
    pub fn includes_exact_match(&self) -> bool {
        self.method == ScoringMethod::TagVectorWithExactMatch
    }
}

pub fn default_scoring_config() -> ScoringConfig {
    ScoringConfig {
        scoring_algo_id: SCORING_ALGO_ID.to_string(),
        similarity_metric_id: perspectiva_core::SIMILARITY_METRIC_ID.to_string(),
        round_digits: 1,
        report_components: true,
        method: ScoringMethod::TagVector,
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Env,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
    #[error("invalid config at {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("unsupported config: {message}")]
    Invalid { message: String },
}

#[derive(Clone, Debug)]
pub struct LoadedConfig {
    pub config: ScoringConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
}

/// Resolves configuration from an explicit path, then `PERSPECTIVA_CONFIG`,
/// then built-in defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    load_config_from(explicit, std::env::var_os(CONFIG_ENV_VAR))
}

pub fn load_config_from(
    explicit: Option<&Path>,
    env_path: Option<OsString>,
) -> Result<LoadedConfig, ConfigError> {
    let (path, source) = match (explicit, env_path) {
        (Some(path), _) => (path.to_path_buf(), ConfigSource::File),
        (None, Some(value)) if !value.is_empty() => (PathBuf::from(value), ConfigSource::Env),
        _ => {
            return Ok(LoadedConfig {
                config: default_scoring_config(),
                source: ConfigSource::Default,
                path: None,
            })
        }
    };

    let raw = fs::read_to_string(&path).map_err(|err| ConfigError::Io {
        path: path.clone(),
        message: err.to_string(),
    })?;
    let config: ScoringConfig = serde_json::from_str(&raw).map_err(|err| ConfigError::Parse {
        path: path.clone(),
        message: err.to_string(),
    })?;
    check_config(&config)?;
    tracing::debug!(path = %path.display(), ?source, "loaded scoring config");

    Ok(LoadedConfig {
        config,
        source,
        path: Some(path),
    })
}

fn check_config(config: &ScoringConfig) -> Result<(), ConfigError> {
    if config.scoring_algo_id != SCORING_ALGO_ID {
        return Err(ConfigError::Invalid {
            message: format!(
                "scoring_algo_id {:?} is not supported (expected {:?})",
                config.scoring_algo_id, SCORING_ALGO_ID
            ),
        });
    }
    if config.similarity_metric_id != perspectiva_core::SIMILARITY_METRIC_ID {
        return Err(ConfigError::Invalid {
            message: format!(
                "similarity_metric_id {:?} is not supported",
                config.similarity_metric_id
            ),
        });
    }
    if config.round_digits > MAX_ROUND_DIGITS {
        return Err(ConfigError::Invalid {
            message: format!(
                "round_digits must be at most {}, got {}",
                MAX_ROUND_DIGITS, config.round_digits
            ),
        });
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AuditTrace {
    pub catalog: CatalogTrace,
    pub hashes: HashesTrace,
    #[serde(default)]
    pub warnings: Vec<AuditWarning>,
    pub config_source: ConfigSource,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CatalogTrace {
    pub catalog_id: String,
    pub revision: String,
    pub scenario_count: usize,
}

impl CatalogTrace {
    pub fn of(catalog: &Catalog) -> Self {
        Self {
            catalog_id: catalog.catalog_id.clone(),
            revision: catalog.revision.clone(),
            scenario_count: catalog.scenarios.len(),
        }
    }
}

pub const CATALOG_UNAVAILABLE: &str = "unavailable";

impl CatalogTrace {
    pub fn unavailable() -> Self {
        Self {
            catalog_id: CATALOG_UNAVAILABLE.to_string(),
            revision: CATALOG_UNAVAILABLE.to_string(),
            scenario_count: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct HashesTrace {
    pub catalog_hash: String,
    pub config_hash: String,
    pub inputs_hash: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditWarning {
    #[serde(rename = "type")]
    pub warning_type: String,
    pub message: String,
}

impl AuditWarning {
    pub fn new(warning_type: &str, message: impl Into<String>) -> Self {
        Self {
            warning_type: warning_type.to_string(),
            message: message.into(),
        }
    }
}

pub fn catalog_warnings(issues: &[CatalogIssue]) -> Vec<AuditWarning> {
    issues
        .iter()
        .map(|issue| AuditWarning::new("CATALOG_DATA_QUALITY", issue.to_string()))
        .collect()
}

pub const HASH_UNAVAILABLE: &str = "UNAVAILABLE";

pub fn audit_trace(
    catalog: &Catalog,
    config: &ScoringConfig,
    source: ConfigSource,
    inputs_hash: Option<String>,
    warnings: Vec<AuditWarning>,
) -> AuditTrace {
    let unavailable = |err: HashError| {
        tracing::warn!(error = %err, "hash unavailable");
        HASH_UNAVAILABLE.to_string()
    };
    AuditTrace {
        catalog: CatalogTrace::of(catalog),
        hashes: HashesTrace {
            catalog_hash: catalog_hash(catalog).unwrap_or_else(unavailable),
            config_hash: config_hash(config).unwrap_or_else(unavailable),
            inputs_hash: inputs_hash.unwrap_or_else(|| HASH_UNAVAILABLE.to_string()),
        },
        warnings,
        config_source: source,
    }
}

/// Trace for a run that failed before its catalog and config were loaded.
pub fn unavailable_trace(inputs_hash: Option<String>) -> AuditTrace {
    AuditTrace {
        catalog: CatalogTrace::unavailable(),
        hashes: HashesTrace {
            catalog_hash: HASH_UNAVAILABLE.to_string(),
            config_hash: HASH_UNAVAILABLE.to_string(),
            inputs_hash: inputs_hash.unwrap_or_else(|| HASH_UNAVAILABLE.to_string()),
        },
        warnings: Vec::new(),
        config_source: ConfigSource::Default,
    }
}
