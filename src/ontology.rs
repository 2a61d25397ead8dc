//! Read/write access to the target ontology's published state.
//!
//! The ontology server is an external collaborator; `InMemoryOntology` is a
//! file-backed stand-in holding reference concepts, previously generated
//! concepts and historical associations.

use crate::error::{PipelineError, Result};
use crate::model::Concept;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

const MAX_REPLACEMENT_DEPTH: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssociationType {
    ReplacedBy,
    SameAs,
    PossiblyEquivalentTo,
    MovedTo,
    WasA,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalAssociation {
    pub source_id: String,
    pub association: AssociationType,
    pub target_id: String,
}

pub trait OntologyStore: Send + Sync {
    fn concept(&self, id: &str) -> Option<&Concept>;

    fn historical_associations(&self, id: &str) -> &[HistoricalAssociation];

    fn upsert(&mut self, concept: Concept) -> Result<()>;

    /// Every identifier held by the store, used to seed identifier minting.
    fn component_ids(&self) -> Vec<&str>;

    fn is_active(&self, id: &str) -> bool {
        self.concept(id).map_or(false, |c| c.active)
    }

    fn preferred_term(&self, id: &str, refset_id: &str) -> Option<&str> {
        self.concept(id)?
            .preferred_synonym(refset_id)
            .map(|d| d.term.as_str())
    }

    /// Follows unambiguous historical associations to an active concept.
    fn find_replacement(&self, id: &str) -> Option<String> {
        let mut current = id.to_string();
        let mut visited = HashSet::new();
        for _ in 0..MAX_REPLACEMENT_DEPTH {
            if !visited.insert(current.clone()) {
                return None;
            }
            let associations = self.historical_associations(&current);
            let strong: Vec<&HistoricalAssociation> = associations
                .iter()
                .filter(|a| matches!(a.association, AssociationType::ReplacedBy | AssociationType::SameAs))
                .collect();
            let candidates: Vec<&HistoricalAssociation> = if strong.is_empty() {
                associations
                    .iter()
                    .filter(|a| a.association == AssociationType::PossiblyEquivalentTo)
                    .collect()
            } else {
                strong
            };
            let [only] = candidates.as_slice() else {
                return None;
            };
            if self.is_active(&only.target_id) {
                return Some(only.target_id.clone());
            }
            current = only.target_id.clone();
        }
        None
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct OntologySnapshot {
    #[serde(default)]
    concepts: Vec<Concept>,
    #[serde(default)]
    associations: Vec<HistoricalAssociation>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryOntology {
    concepts: HashMap<String, Concept>,
    associations: HashMap<String, Vec<HistoricalAssociation>>,
}

impl InMemoryOntology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Input(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let snapshot: OntologySnapshot = serde_json::from_str(&content).map_err(|e| {
            PipelineError::Input(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        let mut store = InMemoryOntology::new();
        for concept in snapshot.concepts {
            store.upsert(concept)?;
        }
        for association in snapshot.associations {
            store.add_association(association);
        }
        info!(
            "Loaded {} concepts and {} historical associations from {}",
            store.concepts.len(),
            store.associations.values().map(Vec::len).sum::<usize>(),
            path.display()
        );
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut concepts: Vec<Concept> = self.concepts.values().cloned().collect();
        concepts.sort_by(|a, b| a.id.cmp(&b.id));
        let mut associations: Vec<HistoricalAssociation> =
            self.associations.values().flatten().cloned().collect();
        associations.sort_by(|a, b| (&a.source_id, &a.target_id).cmp(&(&b.source_id, &b.target_id)));
        let snapshot = OntologySnapshot {
            concepts,
            associations,
        };
        std::fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        Ok(())
    }

    pub fn add_association(&mut self, association: HistoricalAssociation) {
        self.associations
            .entry(association.source_id.clone())
            .or_default()
            .push(association);
    }

    pub fn with_concept(mut self, concept: Concept) -> Self {
        if let Some(id) = concept.id.clone() {
            self.concepts.insert(id, concept);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }
}

impl OntologyStore for InMemoryOntology {
    fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.get(id)
    }

    fn historical_associations(&self, id: &str) -> &[HistoricalAssociation] {
        self.associations.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn upsert(&mut self, mut concept: Concept) -> Result<()> {
        let id = concept.id.clone().ok_or_else(|| {
            PipelineError::Integrity("Cannot store a concept without an identifier".to_string())
        })?;
        concept.clear_changes();
        self.concepts.insert(id, concept);
        Ok(())
    }

    fn component_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        for concept in self.concepts.values() {
            ids.extend(concept.id.as_deref());
            ids.extend(concept.descriptions.iter().filter_map(|d| d.id.as_deref()));
            ids.extend(
                concept
                    .axiom
                    .relationships
                    .iter()
                    .chain(concept.inferred.iter())
                    .filter_map(|r| r.id.as_deref()),
            );
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inactive(id: &str, fsn: &str, pt: &str) -> Concept {
        let mut c = Concept::reference(id, fsn, pt);
        c.active = false;
        c
    }

    #[test]
    fn test_find_replacement_follows_chain() {
        let mut store = InMemoryOntology::new()
            .with_concept(inactive("100", "Old (substance)", "Old"))
            .with_concept(inactive("200", "Middle (substance)", "Middle"))
            .with_concept(Concept::reference("300", "New (substance)", "New"));
        store.add_association(HistoricalAssociation {
            source_id: "100".into(),
            association: AssociationType::ReplacedBy,
            target_id: "200".into(),
        });
        store.add_association(HistoricalAssociation {
            source_id: "200".into(),
            association: AssociationType::SameAs,
            target_id: "300".into(),
        });
        assert_eq!(store.find_replacement("100"), Some("300".to_string()));
    }

    #[test]
    fn test_find_replacement_ambiguous_is_none() {
        let mut store = InMemoryOntology::new()
            .with_concept(inactive("100", "Old (substance)", "Old"))
            .with_concept(Concept::reference("300", "A (substance)", "A"))
            .with_concept(Concept::reference("400", "B (substance)", "B"));
        for target in ["300", "400"] {
            store.add_association(HistoricalAssociation {
                source_id: "100".into(),
                association: AssociationType::PossiblyEquivalentTo,
                target_id: target.into(),
            });
        }
        assert_eq!(store.find_replacement("100"), None);
    }

    #[test]
    fn test_save_and_load_round_trip_keeps_concepts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ontology.json");
        let store = InMemoryOntology::new().with_concept(Concept::reference(
            "119364003",
            "Serum specimen (specimen)",
            "Serum specimen",
        ));
        store.save(&path).unwrap();
        let loaded = InMemoryOntology::load(&path).unwrap();
        assert_eq!(
            loaded.preferred_term("119364003", crate::vocabulary::US_ENGLISH_REFSET),
            Some("Serum specimen")
        );
    }
}
