//! Part-to-attribute resolution and its audit trail.

pub mod audit;
pub mod part_map;

pub use audit::{MappingAudit, MappingNote, MissingMapping};
pub use part_map::{AttributePartMapManager, RelationshipTemplate};
