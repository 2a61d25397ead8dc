//! Delta records: one per changed component of a published concept.

use crate::error::Result;
use crate::model::Concept;
use crate::template::{IterationIndicator, TemplatedConcept};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComponentType {
    Concept,
    Description,
    Axiom,
    LanguageEntry,
    AlternateIdentifier,
    RefsetMember,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaRecord {
    pub component_type: ComponentType,
    pub id: String,
    pub concept_id: String,
    pub active: bool,
    pub external_id: String,
    pub iteration: IterationIndicator,
    pub details: serde_json::Value,
}

/// Records for every changed component. UNCHANGED concepts emit nothing unless
/// `confirm_alternate_identifiers` asks for their alternate identifiers.
pub fn delta_records(tc: &TemplatedConcept, confirm_alternate_identifiers: bool) -> Vec<DeltaRecord> {
    let Some(iteration) = tc.iteration else {
        return Vec::new();
    };
    let concept = &tc.concept;
    let Some(concept_id) = concept.id.clone() else {
        return Vec::new();
    };
    let record = |component_type, id: &Option<String>, active, details| DeltaRecord {
        component_type,
        id: id.clone().unwrap_or_default(),
        concept_id: concept_id.clone(),
        active,
        external_id: tc.external_id.clone(),
        iteration,
        details,
    };

    let mut records = Vec::new();
    match iteration {
        IterationIndicator::Manual => return records,
        IterationIndicator::Unchanged => {
            if confirm_alternate_identifiers {
                for alternate in concept.alternate_identifiers.iter().filter(|a| a.active) {
                    records.push(record(
                        ComponentType::AlternateIdentifier,
                        &alternate.id,
                        alternate.active,
                        json!({
                            "scheme_id": alternate.scheme_id,
                            "alternate_identifier": alternate.alternate_identifier,
                        }),
                    ));
                }
            }
            return records;
        }
        _ => {}
    }

    if concept.changed {
        records.push(record(
            ComponentType::Concept,
            &concept.id,
            concept.active,
            json!({
                "module_id": concept.module_id,
                "definition_status_id": concept.definition_status.sctid(),
            }),
        ));
    }
    for description in &concept.descriptions {
        if description.changed {
            records.push(record(
                ComponentType::Description,
                &description.id,
                description.active,
                json!({
                    "term": description.term,
                    "type_id": description.description_type.sctid(),
                    "case_significance_id": description.case_significance.sctid(),
                    "language_code": description.language_code,
                }),
            ));
        }
        for entry in description.lang_refset_entries.iter().filter(|e| e.changed) {
            records.push(record(
                ComponentType::LanguageEntry,
                &entry.id,
                entry.active,
                json!({
                    "refset_id": entry.refset_id,
                    "referenced_component_id": description.id,
                    "acceptability_id": entry.acceptability.sctid(),
                }),
            ));
        }
    }
    if concept.axiom.changed {
        records.push(record(
            ComponentType::Axiom,
            &concept.axiom.id,
            concept.axiom.active,
            json!({ "expression": concept.to_expression() }),
        ));
    }
    for alternate in concept.alternate_identifiers.iter().filter(|a| a.changed) {
        records.push(record(
            ComponentType::AlternateIdentifier,
            &alternate.id,
            alternate.active,
            json!({
                "scheme_id": alternate.scheme_id,
                "alternate_identifier": alternate.alternate_identifier,
            }),
        ));
    }
    for member in concept.refset_members.iter().filter(|m| m.changed) {
        records.push(record(
            ComponentType::RefsetMember,
            &member.id,
            member.active,
            json!({ "refset_id": member.refset_id }),
        ));
    }
    records
}

/// Writes one JSON object per line.
pub fn write_delta(path: &Path, records: &[DeltaRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_delta(path: &Path) -> Result<Vec<DeltaRecord>> {
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Short description of a concept for comparison reports.
pub fn describe(concept: Option<&Concept>, refset_id: &str) -> (String, String, String) {
    match concept {
        Some(c) => (
            c.fsn_term().unwrap_or_default().to_string(),
            c.preferred_synonym(refset_id)
                .map(|d| d.term.clone())
                .unwrap_or_default(),
            c.to_expression(),
        ),
        None => (String::new(), String::new(), String::new()),
    }
}
