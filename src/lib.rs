pub mod alternate_index;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod mapping;
pub mod model;
pub mod ontology;
pub mod pipeline;
pub mod template;
pub mod tsv;
pub mod vocabulary;

pub use alternate_index::AlternateIdentifierIndex;
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use ontology::{InMemoryOntology, OntologyStore};
pub use pipeline::{PipelineInputs, PipelineManager, RunOutcome};
pub use template::{IterationIndicator, ProcessingFlag, TemplateKind, TemplatedConcept};
