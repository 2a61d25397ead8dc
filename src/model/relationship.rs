use crate::vocabulary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacteristicType {
    Stated,
    Inferred,
}

impl CharacteristicType {
    pub fn sctid(&self) -> &'static str {
        match self {
            CharacteristicType::Stated => vocabulary::STATED,
            CharacteristicType::Inferred => vocabulary::INFERRED,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Option<String>,
    pub active: bool,
    pub type_id: String,
    pub target_id: String,
    pub group: u32,
    pub characteristic: CharacteristicType,
    #[serde(skip)]
    pub changed: bool,
}

impl Relationship {
    pub fn stated(type_id: impl Into<String>, target_id: impl Into<String>, group: u32) -> Self {
        Self {
            id: None,
            active: true,
            type_id: type_id.into(),
            target_id: target_id.into(),
            group,
            characteristic: CharacteristicType::Stated,
            changed: true,
        }
    }

    /// Copy of this relationship as part of the derived view.
    pub fn as_inferred(&self) -> Self {
        Self {
            id: None,
            active: self.active,
            type_id: self.type_id.clone(),
            target_id: self.target_id.clone(),
            group: self.group,
            characteristic: CharacteristicType::Inferred,
            changed: true,
        }
    }

    pub fn is_a(&self) -> bool {
        self.type_id == vocabulary::IS_A
    }

    pub fn same_triple(&self, other: &Relationship) -> bool {
        self.type_id == other.type_id && self.target_id == other.target_id && self.group == other.group
    }

    pub fn triple(&self) -> (u32, &str, &str) {
        (self.group, self.type_id.as_str(), self.target_id.as_str())
    }
}

/// The class axiom holding a concept's stated (defining) relationships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axiom {
    pub id: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(skip)]
    pub changed: bool,
}

impl Default for Axiom {
    fn default() -> Self {
        Self {
            id: None,
            active: true,
            relationships: Vec::new(),
            changed: true,
        }
    }
}

impl Axiom {
    pub fn active_relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter().filter(|r| r.active)
    }

    /// Sorted (group, type, value) triples of the active relationships.
    pub fn normal_form(&self) -> Vec<(u32, &str, &str)> {
        let mut triples: Vec<_> = self.active_relationships().map(|r| r.triple()).collect();
        triples.sort();
        triples.dedup();
        triples
    }

    /// Two axioms are equivalent when they state the same set of triples.
    pub fn equivalent_to(&self, other: &Axiom) -> bool {
        self.normal_form() == other.normal_form()
    }
}
