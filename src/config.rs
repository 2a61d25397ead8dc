use crate::error::{PipelineError, Result};
use crate::model::{columns, UsageThresholds};
use crate::vocabulary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

const ENV_PREFIX: &str = "CONCEPT_PIPELINE_";

/// Run-wide settings. Every field has a default so a partial JSON file is enough.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub module_id: String,
    /// Alternate identifier scheme of the external coding system.
    pub scheme_id: String,
    pub parent_concept_id: String,
    pub semantic_tag: String,
    pub dialect_refsets: Vec<String>,
    /// Simple refset every generated concept is a member of, if any.
    pub membership_refset_id: Option<String>,
    /// Also accept mapping rows whose status is MAPPED.
    pub accept_mapped_status: bool,
    /// Parts that may legitimately have no mapping; never reported as missing.
    pub allowed_unmapped_parts: BTreeSet<String>,
    pub skipped_columns: BTreeSet<String>,
    pub primitive_fallback_columns: BTreeSet<String>,
    pub unknown_vocabulary: Vec<String>,
    /// Manually maintained codes that bypass generation and change-set determination.
    pub manual_external_ids: BTreeSet<String>,
    pub usage: UsageThresholds,
    /// Inactive value → replacement, consulted before the ontology's own associations.
    pub known_replacements: BTreeMap<String, String>,
    /// Value concept → literal term used in names, extending the built-in overrides.
    pub term_overrides: BTreeMap<String, String>,
    pub namespace: Option<u32>,
    pub worker_count: usize,
    pub confirm_unchanged_alternate_identifiers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            module_id: vocabulary::DEFAULT_MODULE.to_string(),
            scheme_id: vocabulary::DEFAULT_SCHEME.to_string(),
            parent_concept_id: vocabulary::OBSERVABLE_ENTITY.to_string(),
            semantic_tag: "observable entity".to_string(),
            dialect_refsets: vec![
                vocabulary::US_ENGLISH_REFSET.to_string(),
                vocabulary::GB_ENGLISH_REFSET.to_string(),
            ],
            membership_refset_id: None,
            accept_mapped_status: false,
            allowed_unmapped_parts: BTreeSet::new(),
            skipped_columns: [columns::SUPER_SYSTEM, "CLASS", "ADJUSTMENT", "COUNT"]
                .into_iter()
                .map(String::from)
                .collect(),
            primitive_fallback_columns: [columns::SYSTEM, columns::METHOD, columns::CHALLENGE]
                .into_iter()
                .map(String::from)
                .collect(),
            unknown_vocabulary: ["unspecified", "other", "unknown"]
                .into_iter()
                .map(String::from)
                .collect(),
            manual_external_ids: BTreeSet::new(),
            usage: UsageThresholds::default(),
            known_replacements: BTreeMap::new(),
            term_overrides: BTreeMap::new(),
            namespace: None,
            worker_count: 1,
            confirm_unchanged_alternate_identifiers: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults, overlaid with the JSON file when given, then with environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    PipelineError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                let config: PipelineConfig = serde_json::from_str(&content).map_err(|e| {
                    PipelineError::Config(format!("Failed to parse {}: {}", path.display(), e))
                })?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => PipelineConfig::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("MODULE_ID") {
            self.module_id = v;
        }
        if let Some(v) = var("SCHEME_ID") {
            self.scheme_id = v;
        }
        if let Some(v) = var("MEMBERSHIP_REFSET_ID") {
            self.membership_refset_id = Some(v);
        }
        if let Some(v) = var("ACCEPT_MAPPED") {
            self.accept_mapped_status = crate::tsv::parse_flag(&v);
        }
        if let Some(v) = var("NAMESPACE") {
            let ns = v
                .parse::<u32>()
                .map_err(|e| PipelineError::Config(format!("Bad namespace '{}': {}", v, e)))?;
            self.namespace = Some(ns);
        }
        if let Some(v) = var("WORKERS") {
            self.worker_count = v
                .parse::<usize>()
                .map_err(|e| PipelineError::Config(format!("Bad worker count '{}': {}", v, e)))?;
        }
        if let Some(v) = var("MANUAL_IDS") {
            self.manual_external_ids
                .extend(v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        }
        debug!("Configuration after environment overrides: {:?}", self);
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.module_id.trim().is_empty() {
            return Err(PipelineError::Config("module_id must not be empty".to_string()));
        }
        if self.scheme_id.trim().is_empty() {
            return Err(PipelineError::Config("scheme_id must not be empty".to_string()));
        }
        if self.dialect_refsets.is_empty() {
            return Err(PipelineError::Config(
                "At least one dialect refset is required".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PipelineError::Config("worker_count must be at least 1".to_string()));
        }
        if let Some(ns) = self.namespace {
            if ns >= 10_000_000 {
                return Err(PipelineError::Config(format!(
                    "Namespace {} has more than 7 digits",
                    ns
                )));
            }
        }
        Ok(())
    }

    pub fn is_manual(&self, external_id: &str) -> bool {
        self.manual_external_ids.contains(external_id)
    }

    pub fn is_skipped_column(&self, column: &str) -> bool {
        self.skipped_columns.iter().any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn allows_primitive_fallback(&self, column: &str) -> bool {
        self.primitive_fallback_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }
}
