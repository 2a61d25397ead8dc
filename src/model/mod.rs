pub mod concept;
pub mod description;
pub mod external;
pub mod refset;
pub mod relationship;

pub use concept::{semantic_tag_of, Concept, DefinitionStatus};
pub use description::{Acceptability, CaseSignificance, Description, DescriptionType, LangRefsetEntry};
pub use external::{columns, ExternalConcept, ExternalSource, Part, PartCatalog, PartLink, UsageThresholds};
pub use refset::{AlternateIdentifier, RefsetMember};
pub use relationship::{Axiom, CharacteristicType, Relationship};
