//! Persisted external identifier → target concept cross-reference.
//!
//! The index is the only join key between runs. It is read at the start of a
//! run and grows additively: entries are never removed, and an external
//! identifier may map to a single target concept only.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub external_id: String,
    pub concept_id: String,
    #[serde(default)]
    pub member_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlternateIdentifierIndex {
    schemes: BTreeMap<String, BTreeMap<String, IndexEntry>>,
    #[serde(skip)]
    additions: usize,
}

impl AlternateIdentifierIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index, starting empty when no index has been persisted yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No alternate identifier index at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let content = std::fs::read_to_string(path)?;
        let index: AlternateIdentifierIndex = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Input(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        info!(
            "Loaded {} alternate identifiers from {}",
            index.schemes.values().map(BTreeMap::len).sum::<usize>(),
            path.display()
        );
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn lookup(&self, scheme_id: &str, external_id: &str) -> Option<&IndexEntry> {
        self.schemes.get(scheme_id)?.get(external_id)
    }

    /// Records a mapping. Re-recording the same target is a no-op; pointing an
    /// external identifier at a second target is an integrity error.
    pub fn record(&mut self, scheme_id: &str, entry: IndexEntry) -> Result<()> {
        let scheme = self.schemes.entry(scheme_id.to_string()).or_default();
        match scheme.get_mut(&entry.external_id) {
            Some(existing) if existing.concept_id != entry.concept_id => {
                Err(PipelineError::Integrity(format!(
                    "{} is already mapped to {} in scheme {}, refusing to remap to {}",
                    entry.external_id, existing.concept_id, scheme_id, entry.concept_id
                )))
            }
            Some(existing) => {
                if existing.member_id.is_none() {
                    existing.member_id = entry.member_id;
                }
                Ok(())
            }
            None => {
                scheme.insert(entry.external_id.clone(), entry);
                self.additions += 1;
                Ok(())
            }
        }
    }

    pub fn entries<'a>(&'a self, scheme_id: &str) -> impl Iterator<Item = &'a IndexEntry> + 'a {
        self.schemes.get(scheme_id).into_iter().flat_map(|s| s.values())
    }

    pub fn len(&self, scheme_id: &str) -> usize {
        self.schemes.get(scheme_id).map_or(0, BTreeMap::len)
    }

    /// Entries added since the index was loaded.
    pub fn additions(&self) -> usize {
        self.additions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(external: &str, concept: &str) -> IndexEntry {
        IndexEntry {
            external_id: external.to_string(),
            concept_id: concept.to_string(),
            member_id: None,
        }
    }

    #[test]
    fn test_record_and_lookup() {
        let mut index = AlternateIdentifierIndex::new();
        index.record("S", entry("1-1", "100")).unwrap();
        assert_eq!(index.lookup("S", "1-1").unwrap().concept_id, "100");
        assert!(index.lookup("OTHER", "1-1").is_none());
        assert_eq!(index.additions(), 1);
    }

    #[test]
    fn test_remapping_is_rejected() {
        let mut index = AlternateIdentifierIndex::new();
        index.record("S", entry("1-1", "100")).unwrap();
        index.record("S", entry("1-1", "100")).unwrap();
        assert!(index.record("S", entry("1-1", "200")).is_err());
        assert_eq!(index.len("S"), 1);
    }

    #[test]
    fn test_persisted_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        let mut index = AlternateIdentifierIndex::new();
        index.record("S", entry("1-1", "100")).unwrap();
        index.save(&path).unwrap();

        let loaded = AlternateIdentifierIndex::load(&path).unwrap();
        assert_eq!(loaded.lookup("S", "1-1").unwrap().concept_id, "100");
        assert_eq!(loaded.additions(), 0);
        assert_eq!(AlternateIdentifierIndex::load(&dir.path().join("missing.json")).unwrap().len("S"), 0);
    }
}
