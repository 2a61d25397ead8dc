use serde::{Deserialize, Serialize};

/// Cross-reference from an owning concept back to a code in an external scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternateIdentifier {
    pub id: Option<String>,
    pub active: bool,
    pub scheme_id: String,
    pub alternate_identifier: String,
    #[serde(skip)]
    pub changed: bool,
}

impl AlternateIdentifier {
    pub fn new(scheme_id: impl Into<String>, alternate_identifier: impl Into<String>) -> Self {
        Self {
            id: None,
            active: true,
            scheme_id: scheme_id.into(),
            alternate_identifier: alternate_identifier.into(),
            changed: true,
        }
    }

    pub fn matches(&self, other: &AlternateIdentifier) -> bool {
        self.scheme_id == other.scheme_id && self.alternate_identifier == other.alternate_identifier
    }
}

/// Membership of the owning concept in a simple (non-language) reference set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefsetMember {
    pub id: Option<String>,
    pub active: bool,
    pub refset_id: String,
    #[serde(skip)]
    pub changed: bool,
}

impl RefsetMember {
    pub fn new(refset_id: impl Into<String>) -> Self {
        Self {
            id: None,
            active: true,
            refset_id: refset_id.into(),
            changed: true,
        }
    }
}
