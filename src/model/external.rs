//! Source-system codes and the parts they decompose into.

use crate::error::{PipelineError, Result};
use crate::tsv::{self, ColumnIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{info, warn};

/// Originating column identifiers of part links.
pub mod columns {
    pub const COMPONENT: &str = "COMPONENT";
    pub const COMPNUM: &str = "COMPNUM";
    pub const COMPDENOM: &str = "COMPDENOM";
    pub const PROPERTY: &str = "PROPERTY";
    pub const TIME: &str = "TIME";
    pub const SYSTEM: &str = "SYSTEM";
    pub const SCALE: &str = "SCALE";
    pub const METHOD: &str = "METHOD";
    pub const CHALLENGE: &str = "CHALLENGE";
    pub const SUPER_SYSTEM: &str = "SUPER SYSTEM";
}

/// Catalog entry for an atomic part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub number: String,
    pub name: String,
    pub type_name: String,
    pub status: String,
}

/// One part referenced by an external concept, tagged with the column it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartLink {
    pub part_number: String,
    pub part_name: String,
    pub part_type: String,
    pub column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConcept {
    pub identifier: String,
    pub display_name: String,
    pub property: String,
    /// Usage rank, 0 when the code is unranked.
    pub usage_rank: u32,
    pub high_usage: bool,
    pub highest_usage: bool,
    pub grouper: bool,
    pub parts: Vec<PartLink>,
}

impl ExternalConcept {
    pub fn new(identifier: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            display_name: String::new(),
            property: property.into(),
            usage_rank: 0,
            high_usage: false,
            highest_usage: false,
            grouper: false,
            parts: Vec::new(),
        }
    }

    pub fn with_part(mut self, column: &str, number: &str, name: &str) -> Self {
        self.parts.push(PartLink {
            part_number: number.to_string(),
            part_name: name.to_string(),
            part_type: column.to_string(),
            column: column.to_string(),
        });
        self
    }

    pub fn part_in(&self, column: &str) -> Option<&PartLink> {
        self.parts.iter().find(|p| p.column.eq_ignore_ascii_case(column))
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.part_in(column).is_some()
    }

    pub fn apply_usage_rank(&mut self, rank: u32, thresholds: &UsageThresholds) {
        self.usage_rank = rank;
        self.high_usage = rank > 0 && rank <= thresholds.high_usage;
        self.highest_usage = rank > 0 && rank <= thresholds.highest_usage;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageThresholds {
    pub high_usage: u32,
    pub highest_usage: u32,
}

impl Default for UsageThresholds {
    fn default() -> Self {
        Self {
            high_usage: 2000,
            highest_usage: 300,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PartCatalog {
    parts: HashMap<String, Part>,
}

impl PartCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = tsv::open_reader(path)?;
        let columns = ColumnIndex::from_headers(path, reader.headers()?);
        let number_idx = columns.require(&["PART_NUMBER", "PARTNUMBER"])?;
        let name_idx = columns.require(&["PART_NAME", "PARTNAME"])?;
        let type_idx = columns.optional(&["PART_TYPE", "PART_TYPE_NAME", "PARTTYPENAME"]);
        let status_idx = columns.optional(&["STATUS"]);

        let mut catalog = PartCatalog::default();
        for record in reader.records() {
            let record = record?;
            let number = tsv::cell(&record, number_idx);
            if number.is_empty() {
                continue;
            }
            catalog.insert(Part {
                number: number.to_string(),
                name: tsv::cell(&record, name_idx).to_string(),
                type_name: tsv::optional_cell(&record, type_idx).to_string(),
                status: tsv::optional_cell(&record, status_idx).to_string(),
            });
        }
        info!("Loaded {} parts from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    pub fn insert(&mut self, part: Part) {
        self.parts.insert(part.number.clone(), part);
    }

    pub fn get(&self, number: &str) -> Option<&Part> {
        self.parts.get(number)
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// All external concepts of one run, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct ExternalSource {
    concepts: BTreeMap<String, ExternalConcept>,
    integrity_issues: Vec<String>,
}

impl ExternalSource {
    pub fn from_concepts(concepts: impl IntoIterator<Item = ExternalConcept>) -> Self {
        Self {
            concepts: concepts
                .into_iter()
                .map(|c| (c.identifier.clone(), c))
                .collect(),
            integrity_issues: Vec::new(),
        }
    }

    /// Loads the concept rows, then attaches part links to their owners.
    /// Repeated codes and link rows naming an unknown code are reported and skipped.
    pub fn load(
        concepts_path: &Path,
        links_path: &Path,
        catalog: &PartCatalog,
        thresholds: &UsageThresholds,
    ) -> Result<Self> {
        let mut source = ExternalSource::default();

        let mut reader = tsv::open_reader(concepts_path)?;
        let columns = ColumnIndex::from_headers(concepts_path, reader.headers()?);
        let code_idx = columns.require(&["CODE", "LOINC_NUM", "EXTERNAL_ID"])?;
        let property_idx = columns.require(&["PROPERTY"])?;
        let name_idx = columns.optional(&["NAME", "DISPLAY_NAME", "LONG_COMMON_NAME"]);
        let rank_idx = columns.optional(&["USAGE_RANK", "COMMON_TEST_RANK", "RANK"]);
        let grouper_idx = columns.optional(&["GROUPER", "IS_GROUPER", "PANEL"]);

        for record in reader.records() {
            let record = record?;
            let code = tsv::cell(&record, code_idx);
            if code.is_empty() {
                continue;
            }
            if source.concepts.contains_key(code) {
                let issue = format!("Duplicate external concept row for {}, keeping the first occurrence", code);
                warn!("{}", issue);
                source.integrity_issues.push(issue);
                continue;
            }
            let mut concept = ExternalConcept::new(code, tsv::cell(&record, property_idx));
            concept.display_name = tsv::optional_cell(&record, name_idx).to_string();
            concept.grouper = tsv::parse_flag(tsv::optional_cell(&record, grouper_idx));
            let rank_text = tsv::optional_cell(&record, rank_idx);
            let rank = if rank_text.is_empty() {
                0
            } else {
                rank_text.parse::<u32>().map_err(|e| {
                    PipelineError::Input(format!(
                        "{}: bad usage rank '{}' for {}: {}",
                        concepts_path.display(),
                        rank_text,
                        code,
                        e
                    ))
                })?
            };
            concept.apply_usage_rank(rank, thresholds);
            source.concepts.insert(code.to_string(), concept);
        }

        let mut reader = tsv::open_reader(links_path)?;
        let columns = ColumnIndex::from_headers(links_path, reader.headers()?);
        let code_idx = columns.require(&["CODE", "LOINC_NUM", "EXTERNAL_ID"])?;
        let part_idx = columns.require(&["PART_NUMBER", "PARTNUMBER"])?;
        let column_idx = columns.require(&["COLUMN", "LINK_TYPE", "PART_COLUMN"])?;
        let name_idx = columns.optional(&["PART_NAME", "PARTNAME"]);
        let type_idx = columns.optional(&["PART_TYPE", "PART_TYPE_NAME", "PARTTYPENAME"]);

        let mut link_count = 0;
        for record in reader.records() {
            let record = record?;
            let code = tsv::cell(&record, code_idx);
            let part_number = tsv::cell(&record, part_idx);
            if code.is_empty() || part_number.is_empty() {
                continue;
            }
            let Some(owner) = source.concepts.get_mut(code) else {
                let issue = format!(
                    "Part link {} references {} which is absent from the external concept source",
                    part_number, code
                );
                warn!("{}", issue);
                source.integrity_issues.push(issue);
                continue;
            };

            let catalog_part = catalog.get(part_number);
            let mut part_name = tsv::optional_cell(&record, name_idx).to_string();
            if part_name.is_empty() {
                part_name = catalog_part
                    .map(|p| p.name.clone())
                    .unwrap_or_else(|| part_number.to_string());
            }
            let mut part_type = tsv::optional_cell(&record, type_idx).to_string();
            if part_type.is_empty() {
                part_type = catalog_part.map(|p| p.type_name.clone()).unwrap_or_default();
            }
            let column = tsv::cell(&record, column_idx).to_uppercase();
            if part_type.is_empty() {
                part_type = column.clone();
            }

            owner.parts.push(PartLink {
                part_number: part_number.to_string(),
                part_name,
                part_type,
                column,
            });
            link_count += 1;
        }

        info!(
            "Loaded {} external concepts with {} part links",
            source.concepts.len(),
            link_count
        );
        Ok(source)
    }

    pub fn get(&self, identifier: &str) -> Option<&ExternalConcept> {
        self.concepts.get(identifier)
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.concepts.contains_key(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExternalConcept> {
        self.concepts.values()
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn integrity_issues(&self) -> &[String] {
        &self.integrity_issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_rank_flags() {
        let thresholds = UsageThresholds::default();
        let mut c = ExternalConcept::new("1-1", "MCnc");
        c.apply_usage_rank(150, &thresholds);
        assert!(c.high_usage && c.highest_usage);
        c.apply_usage_rank(1500, &thresholds);
        assert!(c.high_usage && !c.highest_usage);
        c.apply_usage_rank(0, &thresholds);
        assert!(!c.high_usage && !c.highest_usage);
    }

    #[test]
    fn test_part_in_matches_column() {
        let c = ExternalConcept::new("1-1", "MCnc")
            .with_part(columns::COMPNUM, "LP1", "Glucose")
            .with_part(columns::SYSTEM, "LP2", "Ser/Plas");
        assert_eq!(c.part_in("compnum").map(|p| p.part_number.as_str()), Some("LP1"));
        assert!(!c.has_column(columns::METHOD));
    }

    #[test]
    fn test_duplicate_code_keeps_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let concepts = dir.path().join("concepts.tsv");
        let links = dir.path().join("part_links.tsv");
        std::fs::write(
            &concepts,
            "CODE\tNAME\tPROPERTY\n2345-7\tGlucose in Serum\tMCnc\n2345-7\tGlucose in Urine\tSCnc\n",
        )
        .unwrap();
        std::fs::write(
            &links,
            "CODE\tPART_NUMBER\tPART_NAME\tCOLUMN\n2345-7\tLP-SER\tSer\tSYSTEM\n",
        )
        .unwrap();

        let source = ExternalSource::load(&concepts, &links, &PartCatalog::default(), &UsageThresholds::default())
            .unwrap();
        let concept = source.get("2345-7").unwrap();
        assert_eq!(concept.display_name, "Glucose in Serum");
        assert_eq!(concept.property, "MCnc");
        assert_eq!(concept.part_in(columns::SYSTEM).map(|p| p.part_number.as_str()), Some("LP-SER"));
        assert_eq!(source.integrity_issues().len(), 1);
        assert!(source.integrity_issues()[0].contains("2345-7"));
    }
}
