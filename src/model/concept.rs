use super::description::{Acceptability, CaseSignificance, Description, DescriptionType};
use super::refset::{AlternateIdentifier, RefsetMember};
use super::relationship::{Axiom, Relationship};
use crate::vocabulary;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DefinitionStatus {
    Primitive,
    FullyDefined,
}

impl DefinitionStatus {
    pub fn sctid(&self) -> &'static str {
        match self {
            DefinitionStatus::Primitive => vocabulary::PRIMITIVE,
            DefinitionStatus::FullyDefined => vocabulary::FULLY_DEFINED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: Option<String>,
    pub active: bool,
    pub module_id: String,
    pub definition_status: DefinitionStatus,
    #[serde(default)]
    pub descriptions: Vec<Description>,
    #[serde(default)]
    pub axiom: Axiom,
    #[serde(default)]
    pub inferred: Vec<Relationship>,
    #[serde(default)]
    pub alternate_identifiers: Vec<AlternateIdentifier>,
    #[serde(default)]
    pub refset_members: Vec<RefsetMember>,
    #[serde(skip)]
    pub changed: bool,
}

impl Concept {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            id: None,
            active: true,
            module_id: module_id.into(),
            definition_status: DefinitionStatus::Primitive,
            descriptions: Vec::new(),
            axiom: Axiom::default(),
            inferred: Vec::new(),
            alternate_identifiers: Vec::new(),
            refset_members: Vec::new(),
            changed: true,
        }
    }

    /// An already-published concept carrying just an FSN and a US/GB preferred term.
    pub fn reference(id: &str, fsn: &str, preferred_term: &str) -> Self {
        let dialects = vec![
            vocabulary::US_ENGLISH_REFSET.to_string(),
            vocabulary::GB_ENGLISH_REFSET.to_string(),
        ];
        let mut concept = Concept::new(vocabulary::DEFAULT_MODULE);
        concept.id = Some(id.to_string());
        concept.changed = false;
        concept.descriptions.push(
            Description::new(fsn, DescriptionType::Fsn, CaseSignificance::InitialCharacterCaseInsensitive)
                .with_acceptability(&dialects, Acceptability::Preferred),
        );
        concept.descriptions.push(
            Description::new(
                preferred_term,
                DescriptionType::Synonym,
                CaseSignificance::InitialCharacterCaseInsensitive,
            )
            .with_acceptability(&dialects, Acceptability::Preferred),
        );
        concept
    }

    pub fn id_or_placeholder(&self) -> &str {
        self.id.as_deref().unwrap_or("(unassigned)")
    }

    pub fn fsn(&self) -> Option<&Description> {
        self.descriptions
            .iter()
            .find(|d| d.active && d.description_type == DescriptionType::Fsn)
    }

    pub fn fsn_term(&self) -> Option<&str> {
        self.fsn().map(|d| d.term.as_str())
    }

    /// Preferred synonym, falling back to a synonym preferred in any dialect.
    pub fn preferred_synonym(&self, refset_id: &str) -> Option<&Description> {
        let synonyms = || {
            self.descriptions
                .iter()
                .filter(|d| d.active && d.description_type == DescriptionType::Synonym)
        };
        synonyms()
            .find(|d| d.is_preferred_in(refset_id))
            .or_else(|| synonyms().find(|d| d.is_preferred_anywhere()))
    }

    pub fn semantic_tag(&self) -> Option<&str> {
        self.fsn_term().and_then(semantic_tag_of)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.axiom.active_relationships()
    }

    pub fn relationships_of_type<'a>(&'a self, type_id: &'a str) -> impl Iterator<Item = &'a Relationship> {
        self.relationships().filter(move |r| r.type_id == type_id)
    }

    /// Adds a stated relationship unless an identical triple is already present.
    pub fn add_relationship(&mut self, relationship: Relationship) -> bool {
        if self.relationships().any(|r| r.same_triple(&relationship)) {
            return false;
        }
        self.axiom.relationships.push(relationship);
        true
    }

    /// Number of active defining relationships, including IS-A.
    pub fn relationship_count(&self) -> usize {
        self.relationships().count()
    }

    /// Compositional rendering of the stated definition, e.g.
    /// `=== 363787002 : { 246093002 = 1, 704327008 = 2 }`.
    pub fn to_expression(&self) -> String {
        let prefix = match self.definition_status {
            DefinitionStatus::FullyDefined => "===",
            DefinitionStatus::Primitive => "<<<",
        };
        let parents = self
            .relationships()
            .filter(|r| r.is_a())
            .map(|r| r.target_id.as_str())
            .sorted()
            .join(" + ");

        let mut groups: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for r in self.relationships().filter(|r| !r.is_a()) {
            groups
                .entry(r.group)
                .or_default()
                .push(format!("{} = {}", r.type_id, r.target_id));
        }
        if groups.is_empty() {
            return format!("{} {}", prefix, parents);
        }

        let refinement = groups
            .into_iter()
            .map(|(group, mut attrs)| {
                attrs.sort();
                if group == 0 {
                    attrs.join(", ")
                } else {
                    format!("{{ {} }}", attrs.join(", "))
                }
            })
            .join(", ");
        format!("{} {} : {}", prefix, parents, refinement)
    }

    /// True when this concept or any of its components carries a change.
    pub fn has_changes(&self) -> bool {
        self.changed
            || self.axiom.changed
            || self
                .descriptions
                .iter()
                .any(|d| d.changed || d.lang_refset_entries.iter().any(|e| e.changed))
            || self.alternate_identifiers.iter().any(|a| a.changed)
            || self.refset_members.iter().any(|m| m.changed)
    }

    /// Marks every component unchanged, as after a successful publication.
    pub fn clear_changes(&mut self) {
        self.changed = false;
        self.axiom.changed = false;
        for r in self.axiom.relationships.iter_mut().chain(self.inferred.iter_mut()) {
            r.changed = false;
        }
        for d in &mut self.descriptions {
            d.changed = false;
            for e in &mut d.lang_refset_entries {
                e.changed = false;
            }
        }
        for a in &mut self.alternate_identifiers {
            a.changed = false;
        }
        for m in &mut self.refset_members {
            m.changed = false;
        }
    }
}

/// Extracts "observable entity" from "Foo (observable entity)".
pub fn semantic_tag_of(fsn: &str) -> Option<&str> {
    let trimmed = fsn.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    let open = trimmed.rfind('(')?;
    Some(&trimmed[open + 1..trimmed.len() - 1])
}
