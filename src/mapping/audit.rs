use crate::model::ExternalConcept;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Audit trail entry produced while resolving a part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MappingNote {
    pub external_id: String,
    pub part_number: String,
    pub note: String,
    pub successful: bool,
}

/// A part with no usable mapping and the external concepts it held back.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MissingMapping {
    pub part_number: String,
    pub part_name: String,
    pub part_type: String,
    pub affected: BTreeSet<String>,
    pub high_usage: BTreeSet<String>,
    pub highest_usage: BTreeSet<String>,
}

impl MissingMapping {
    fn merge(&mut self, other: MissingMapping) {
        if self.part_name.is_empty() {
            self.part_name = other.part_name;
        }
        if self.part_type.is_empty() {
            self.part_type = other.part_type;
        }
        self.affected.extend(other.affected);
        self.high_usage.extend(other.high_usage);
        self.highest_usage.extend(other.highest_usage);
    }
}

/// Mutable bookkeeping shared by every resolution in a run.
///
/// Each modelling worker owns one and they are merged once modelling is
/// complete, so the mapping manager itself stays read-only.
#[derive(Debug, Clone, Default)]
pub struct MappingAudit {
    missing: BTreeMap<String, MissingMapping>,
    notes: Vec<MappingNote>,
}

impl MappingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_missing(&mut self, concept: &ExternalConcept, part_number: &str, part_name: &str, part_type: &str) {
        let entry = self
            .missing
            .entry(part_number.to_string())
            .or_insert_with(|| MissingMapping {
                part_number: part_number.to_string(),
                part_name: part_name.to_string(),
                part_type: part_type.to_string(),
                ..MissingMapping::default()
            });
        entry.affected.insert(concept.identifier.clone());
        if concept.high_usage {
            entry.high_usage.insert(concept.identifier.clone());
        }
        if concept.highest_usage {
            entry.highest_usage.insert(concept.identifier.clone());
        }
    }

    pub fn note(&mut self, external_id: &str, part_number: &str, note: impl Into<String>, successful: bool) {
        self.notes.push(MappingNote {
            external_id: external_id.to_string(),
            part_number: part_number.to_string(),
            note: note.into(),
            successful,
        });
    }

    /// Number of distinct external concepts held back by a missing part.
    pub fn missing_count(&self, part_number: &str) -> usize {
        self.missing.get(part_number).map_or(0, |m| m.affected.len())
    }

    pub fn missing(&self) -> impl Iterator<Item = &MissingMapping> {
        self.missing.values()
    }

    pub fn notes(&self) -> &[MappingNote] {
        &self.notes
    }

    pub fn notes_for<'a>(&'a self, external_id: &'a str) -> impl Iterator<Item = &'a MappingNote> + 'a {
        self.notes.iter().filter(move |n| n.external_id == external_id)
    }

    pub fn merge(&mut self, other: MappingAudit) {
        for (part, missing) in other.missing {
            match self.missing.get_mut(&part) {
                Some(existing) => existing.merge(missing),
                None => {
                    self.missing.insert(part, missing);
                }
            }
        }
        self.notes.extend(other.notes);
    }
}
