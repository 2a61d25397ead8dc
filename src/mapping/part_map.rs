use super::audit::MappingAudit;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{ExternalConcept, Relationship};
use crate::ontology::OntologyStore;
use crate::tsv::{self, ColumnIndex};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Attribute type placeholder in hardcoded overrides; replaced by the requested type.
const ANY_ATTRIBUTE: &str = "*";

/// An (attribute type, value) pair to attach to a generated concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipTemplate {
    pub type_id: String,
    pub value_id: String,
    pub group: Option<u32>,
}

impl RelationshipTemplate {
    pub fn new(type_id: impl Into<String>, value_id: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            value_id: value_id.into(),
            group: None,
        }
    }

    fn with_type(&self, type_id: &str) -> Self {
        Self {
            type_id: type_id.to_string(),
            value_id: self.value_id.clone(),
            group: self.group,
        }
    }

    pub fn to_relationship(&self, default_group: u32) -> Relationship {
        Relationship::stated(
            self.type_id.clone(),
            self.value_id.clone(),
            self.group.unwrap_or(default_group),
        )
    }
}

lazy_static! {
    /// Parts whose modelling cannot be expressed by a single row of the mapping file.
    static ref HARDCODED_OVERRIDES: HashMap<&'static str, Vec<RelationshipTemplate>> = {
        let mut m = HashMap::new();
        // Cholesterol.in LDL+VLDL
        m.insert("LP43576-5", vec![
            RelationshipTemplate::new(ANY_ATTRIBUTE, "102739008"),
            RelationshipTemplate::new(ANY_ATTRIBUTE, "102740005"),
        ]);
        // Single point in time
        m.insert("LP6960-1", vec![RelationshipTemplate::new(ANY_ATTRIBUTE, "123029007")]);
        m
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RowStatus {
    Accepted,
    Mapped,
    Unmapped,
    Other(String),
}

impl RowStatus {
    fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACCEPTED" => RowStatus::Accepted,
            "MAPPED" => RowStatus::Mapped,
            "UNMAPPED" => RowStatus::Unmapped,
            other => RowStatus::Other(other.to_string()),
        }
    }
}

/// Resolves external parts to the attribute values of generated concepts.
#[derive(Debug, Clone, Default)]
pub struct AttributePartMapManager {
    part_to_value: HashMap<String, String>,
    known_replacements: HashMap<String, String>,
    allowed_unmapped: BTreeSet<String>,
    load_notes: Vec<String>,
}

impl AttributePartMapManager {
    pub fn new(part_to_value: HashMap<String, String>, config: &PipelineConfig) -> Self {
        Self {
            part_to_value,
            known_replacements: config
                .known_replacements
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            allowed_unmapped: config.allowed_unmapped_parts.clone(),
            load_notes: Vec::new(),
        }
    }

    /// Loads the part mapping file. Column positions come from the header row;
    /// a missing required column means the file is corrupt and fails the run.
    pub fn load(path: &Path, config: &PipelineConfig) -> Result<Self> {
        let mut reader = tsv::open_reader(path)?;
        let columns = ColumnIndex::from_headers(path, reader.headers()?);
        let part_idx = columns
            .require(&["SOURCE_CODE", "PART_NUMBER", "SOURCE_PART_CODE", "PARTNUMBER"])
            .map_err(|e| PipelineError::Mapping(e.to_string()))?;
        let status_idx = columns
            .require(&["STATUS", "MAP_STATUS"])
            .map_err(|e| PipelineError::Mapping(e.to_string()))?;
        let no_map_idx = columns
            .require(&["NO_MAP", "NOMAP"])
            .map_err(|e| PipelineError::Mapping(e.to_string()))?;
        let target_idx = columns
            .require(&["TARGET_CODE", "TARGET_CONCEPT_ID", "SCTID"])
            .map_err(|e| PipelineError::Mapping(e.to_string()))?;

        let mut manager = AttributePartMapManager::new(HashMap::new(), config);
        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            rows += 1;
            let part = tsv::cell(&record, part_idx);
            if part.is_empty() {
                continue;
            }
            if manager.part_to_value.contains_key(part) {
                manager.load_note(format!(
                    "Duplicate mapping for part {}, keeping the first occurrence",
                    part
                ));
                continue;
            }
            if tsv::parse_flag(tsv::cell(&record, no_map_idx)) {
                debug!("Part {} flagged as no-map", part);
                continue;
            }

            let accepted = match RowStatus::parse(tsv::cell(&record, status_idx)) {
                RowStatus::Accepted => true,
                RowStatus::Mapped => config.accept_mapped_status,
                RowStatus::Unmapped => false,
                RowStatus::Other(status) => {
                    manager.load_note(format!(
                        "Part {} has non-viable mapping status '{}'",
                        part, status
                    ));
                    false
                }
            };
            if !accepted {
                continue;
            }

            let target = tsv::cell(&record, target_idx);
            if target.is_empty() {
                manager.load_note(format!("Part {} is accepted but has no target code", part));
                continue;
            }
            manager.part_to_value.insert(part.to_string(), target.to_string());
        }

        info!(
            "Loaded {} part mappings from {} rows of {} ({} notes)",
            manager.part_to_value.len(),
            rows,
            path.display(),
            manager.load_notes.len()
        );
        Ok(manager)
    }

    fn load_note(&mut self, note: String) {
        warn!("{}", note);
        self.load_notes.push(note);
    }

    pub fn load_notes(&self) -> &[String] {
        &self.load_notes
    }

    pub fn len(&self) -> usize {
        self.part_to_value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.part_to_value.is_empty()
    }

    pub fn has_mapping(&self, part_number: &str) -> bool {
        HARDCODED_OVERRIDES.contains_key(part_number) || self.part_to_value.contains_key(part_number)
    }

    /// Relationships for one part of an external concept, with `attribute_type`
    /// substituted in. Empty when the part has no mapping.
    pub fn resolve(
        &self,
        concept: &ExternalConcept,
        part_number: &str,
        attribute_type: &str,
        store: &dyn OntologyStore,
        audit: &mut MappingAudit,
    ) -> Vec<RelationshipTemplate> {
        let resolved: Vec<RelationshipTemplate> = if let Some(overrides) = HARDCODED_OVERRIDES.get(part_number) {
            overrides.iter().map(|t| t.with_type(attribute_type)).collect()
        } else if let Some(value) = self.part_to_value.get(part_number) {
            vec![RelationshipTemplate::new(attribute_type, value.clone())]
        } else {
            if !self.allowed_unmapped.contains(part_number) {
                let link = concept.parts.iter().find(|p| p.part_number == part_number);
                audit.record_missing(
                    concept,
                    part_number,
                    link.map_or("", |l| l.part_name.as_str()),
                    link.map_or("", |l| l.part_type.as_str()),
                );
            }
            return Vec::new();
        };

        resolved
            .into_iter()
            .map(|template| self.replace_if_inactive(concept, part_number, template, store, audit))
            .collect()
    }

    fn replace_if_inactive(
        &self,
        concept: &ExternalConcept,
        part_number: &str,
        mut template: RelationshipTemplate,
        store: &dyn OntologyStore,
        audit: &mut MappingAudit,
    ) -> RelationshipTemplate {
        let value = template.value_id.clone();
        match store.concept(&value) {
            None => {
                audit.note(
                    &concept.identifier,
                    part_number,
                    format!("Mapped value {} for part {} is not present in the ontology", value, part_number),
                    false,
                );
            }
            Some(c) if !c.active => {
                let replacement = self
                    .known_replacements
                    .get(&value)
                    .cloned()
                    .or_else(|| store.find_replacement(&value));
                match replacement {
                    Some(replacement) => {
                        audit.note(
                            &concept.identifier,
                            part_number,
                            format!(
                                "Inactive value {} mapped from part {} replaced with {}",
                                value, part_number, replacement
                            ),
                            true,
                        );
                        template.value_id = replacement;
                    }
                    None => {
                        audit.note(
                            &concept.identifier,
                            part_number,
                            format!(
                                "Inactive value {} mapped from part {} has no known replacement",
                                value, part_number
                            ),
                            false,
                        );
                    }
                }
            }
            Some(_) => {}
        }
        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Concept;
    use crate::ontology::{AssociationType, HistoricalAssociation, InMemoryOntology};
    use crate::vocabulary;
    use std::io::Write;

    fn glucose_concept() -> ExternalConcept {
        ExternalConcept::new("2345-7", "MCnc")
            .with_part("COMPNUM", "LP14635-4", "Glucose")
            .with_part("METHOD", "LP99999-9", "Magic")
    }

    fn store() -> InMemoryOntology {
        InMemoryOntology::new().with_concept(Concept::reference("67079006", "Glucose (substance)", "Glucose"))
    }

    fn write_map(rows: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "Target Code\tSTATUS\tNo Map\tSOURCE_CODE\n{}", rows).unwrap();
        file
    }

    #[test]
    fn test_load_honours_status_and_duplicates() {
        let file = write_map(
            "67079006\tACCEPTED\t\tLP14635-4\n\
             11111111\tACCEPTED\t\tLP14635-4\n\
             22222222\tMAPPED\t\tLP2\n\
             33333333\tUNMAPPED\t\tLP3\n\
             44444444\tDRAFT\t\tLP4\n\
             55555555\tACCEPTED\tY\tLP5\n",
        );
        let config = PipelineConfig::default();
        let manager = AttributePartMapManager::load(file.path(), &config).unwrap();
        assert_eq!(manager.len(), 1);
        assert!(manager.has_mapping("LP14635-4"));
        assert!(!manager.has_mapping("LP5"));
        assert_eq!(manager.load_notes().len(), 2);

        let config = PipelineConfig {
            accept_mapped_status: true,
            ..PipelineConfig::default()
        };
        let manager = AttributePartMapManager::load(file.path(), &config).unwrap();
        assert!(manager.has_mapping("LP2"));
    }

    #[test]
    fn test_load_rejects_missing_column() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "SOURCE_CODE\tSTATUS\tTARGET_CODE\nLP1\tACCEPTED\t1\n").unwrap();
        let err = AttributePartMapManager::load(file.path(), &PipelineConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Mapping(_)));
    }

    #[test]
    fn test_resolve_substitutes_attribute_type() {
        let mut table = HashMap::new();
        table.insert("LP14635-4".to_string(), "67079006".to_string());
        let manager = AttributePartMapManager::new(table, &PipelineConfig::default());
        let mut audit = MappingAudit::new();
        let resolved = manager.resolve(&glucose_concept(), "LP14635-4", vocabulary::COMPONENT, &store(), &mut audit);
        assert_eq!(resolved, vec![RelationshipTemplate::new(vocabulary::COMPONENT, "67079006")]);
        assert!(audit.notes().is_empty());
    }

    #[test]
    fn test_resolve_hardcoded_override_expands() {
        let manager = AttributePartMapManager::default();
        let mut audit = MappingAudit::new();
        let resolved = manager.resolve(&glucose_concept(), "LP43576-5", vocabulary::COMPONENT, &store(), &mut audit);
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|r| r.type_id == vocabulary::COMPONENT));
    }

    #[test]
    fn test_resolve_missing_records_once_per_concept() {
        let manager = AttributePartMapManager::default();
        let mut audit = MappingAudit::new();
        let concept = glucose_concept();
        assert!(manager.resolve(&concept, "LP99999-9", vocabulary::TECHNIQUE, &store(), &mut audit).is_empty());
        assert!(manager.resolve(&concept, "LP99999-9", vocabulary::TECHNIQUE, &store(), &mut audit).is_empty());
        assert_eq!(audit.missing_count("LP99999-9"), 1);
    }

    #[test]
    fn test_resolve_allowed_unmapped_is_not_recorded() {
        let config = PipelineConfig {
            allowed_unmapped_parts: ["LP99999-9".to_string()].into_iter().collect(),
            ..PipelineConfig::default()
        };
        let manager = AttributePartMapManager::new(HashMap::new(), &config);
        let mut audit = MappingAudit::new();
        manager.resolve(&glucose_concept(), "LP99999-9", vocabulary::TECHNIQUE, &store(), &mut audit);
        assert_eq!(audit.missing_count("LP99999-9"), 0);
    }

    #[test]
    fn test_inactive_value_uses_known_replacement() {
        let mut old = Concept::reference("111", "Old glucose (substance)", "Old glucose");
        old.active = false;
        let store = store().with_concept(old);
        let mut table = HashMap::new();
        table.insert("LP14635-4".to_string(), "111".to_string());
        let config = PipelineConfig {
            known_replacements: [("111".to_string(), "67079006".to_string())].into_iter().collect(),
            ..PipelineConfig::default()
        };
        let manager = AttributePartMapManager::new(table, &config);
        let mut audit = MappingAudit::new();
        let resolved = manager.resolve(&glucose_concept(), "LP14635-4", vocabulary::COMPONENT, &store, &mut audit);
        assert_eq!(resolved[0].value_id, "67079006");
        assert!(audit.notes()[0].note.contains("replaced with"));
        assert!(audit.notes()[0].successful);
    }

    #[test]
    fn test_inactive_value_falls_back_to_historical_association() {
        let mut old = Concept::reference("111", "Old glucose (substance)", "Old glucose");
        old.active = false;
        let mut store = store().with_concept(old);
        store.add_association(HistoricalAssociation {
            source_id: "111".into(),
            association: AssociationType::ReplacedBy,
            target_id: "67079006".into(),
        });
        let mut table = HashMap::new();
        table.insert("LP14635-4".to_string(), "111".to_string());
        let manager = AttributePartMapManager::new(table, &PipelineConfig::default());
        let mut audit = MappingAudit::new();
        let resolved = manager.resolve(&glucose_concept(), "LP14635-4", vocabulary::COMPONENT, &store, &mut audit);
        assert_eq!(resolved[0].value_id, "67079006");
    }

    #[test]
    fn test_inactive_value_without_replacement_is_kept_and_flagged() {
        let mut old = Concept::reference("111", "Old glucose (substance)", "Old glucose");
        old.active = false;
        let store = store().with_concept(old);
        let mut table = HashMap::new();
        table.insert("LP14635-4".to_string(), "111".to_string());
        let manager = AttributePartMapManager::new(table, &PipelineConfig::default());
        let mut audit = MappingAudit::new();
        let resolved = manager.resolve(&glucose_concept(), "LP14635-4", vocabulary::COMPONENT, &store, &mut audit);
        assert_eq!(resolved[0].value_id, "111");
        assert!(!audit.notes()[0].successful);
    }
}
