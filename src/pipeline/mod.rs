//! Run orchestration, change-set determination and run outputs.

pub mod changeset;
pub mod manager;
pub mod output;
pub mod report;
pub mod summary;

pub use changeset::ChangeSetEngine;
pub use manager::{PipelineInputs, PipelineManager, RunOutcome};
pub use output::{delta_records, read_delta, write_delta, ComponentType, DeltaRecord};
pub use report::{package_archive, ArchiveManifest};
pub use summary::RunSummary;
