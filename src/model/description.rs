use crate::vocabulary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DescriptionType {
    Fsn,
    Synonym,
}

impl DescriptionType {
    pub fn sctid(&self) -> &'static str {
        match self {
            DescriptionType::Fsn => vocabulary::FSN_TYPE,
            DescriptionType::Synonym => vocabulary::SYNONYM_TYPE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaseSignificance {
    CaseInsensitive,
    InitialCharacterCaseInsensitive,
    CaseSensitive,
}

impl CaseSignificance {
    pub fn sctid(&self) -> &'static str {
        match self {
            CaseSignificance::CaseInsensitive => vocabulary::CASE_INSENSITIVE,
            CaseSignificance::InitialCharacterCaseInsensitive => {
                vocabulary::INITIAL_CHARACTER_CASE_INSENSITIVE
            }
            CaseSignificance::CaseSensitive => vocabulary::CASE_SENSITIVE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CaseSignificance::CaseInsensitive => "ci",
            CaseSignificance::InitialCharacterCaseInsensitive => "cI",
            CaseSignificance::CaseSensitive => "CS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Acceptability {
    Preferred,
    Acceptable,
}

impl Acceptability {
    pub fn sctid(&self) -> &'static str {
        match self {
            Acceptability::Preferred => vocabulary::PREFERRED,
            Acceptability::Acceptable => vocabulary::ACCEPTABLE,
        }
    }
}

/// Language reference set membership giving a description its acceptability in one dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LangRefsetEntry {
    pub id: Option<String>,
    pub active: bool,
    pub refset_id: String,
    pub acceptability: Acceptability,
    #[serde(skip)]
    pub changed: bool,
}

impl LangRefsetEntry {
    pub fn new(refset_id: impl Into<String>, acceptability: Acceptability) -> Self {
        Self {
            id: None,
            active: true,
            refset_id: refset_id.into(),
            acceptability,
            changed: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Description {
    pub id: Option<String>,
    pub active: bool,
    pub term: String,
    pub description_type: DescriptionType,
    pub case_significance: CaseSignificance,
    #[serde(default = "default_language")]
    pub language_code: String,
    #[serde(default)]
    pub lang_refset_entries: Vec<LangRefsetEntry>,
    #[serde(skip)]
    pub changed: bool,
}

fn default_language() -> String {
    "en".to_string()
}

impl Description {
    pub fn new(
        term: impl Into<String>,
        description_type: DescriptionType,
        case_significance: CaseSignificance,
    ) -> Self {
        Self {
            id: None,
            active: true,
            term: term.into(),
            description_type,
            case_significance,
            language_code: default_language(),
            lang_refset_entries: Vec::new(),
            changed: true,
        }
    }

    /// Adds an entry with the given acceptability for every dialect refset.
    pub fn with_acceptability(mut self, refsets: &[String], acceptability: Acceptability) -> Self {
        for refset in refsets {
            self.lang_refset_entries.push(LangRefsetEntry::new(refset.clone(), acceptability));
        }
        self
    }

    pub fn acceptability_in(&self, refset_id: &str) -> Option<Acceptability> {
        self.lang_refset_entries
            .iter()
            .find(|e| e.active && e.refset_id == refset_id)
            .map(|e| e.acceptability)
    }

    pub fn is_preferred_in(&self, refset_id: &str) -> bool {
        self.acceptability_in(refset_id) == Some(Acceptability::Preferred)
    }

    pub fn is_preferred_anywhere(&self) -> bool {
        self.lang_refset_entries
            .iter()
            .any(|e| e.active && e.acceptability == Acceptability::Preferred)
    }
}
