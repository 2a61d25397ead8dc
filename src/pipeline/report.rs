//! Tab-delimited run reports and the packaged delta archive.

use super::output::{describe, ComponentType, DeltaRecord};
use super::summary::RunSummary;
use crate::error::{PipelineError, Result};
use crate::mapping::MappingAudit;
use crate::template::TemplatedConcept;
use crate::tsv;
use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const MISSING_MAPPINGS: &str = "missing_mappings.tsv";
pub const ISSUES: &str = "issues.tsv";
pub const COMPARISON: &str = "comparison.tsv";
pub const SUMMARY: &str = "summary.tsv";
pub const MAPPING_NOTES: &str = "mapping_notes.tsv";
pub const ARCHIVE: &str = "delta_archive.json";

/// How many affected codes are listed per missing part.
const EXAMPLE_LIMIT: usize = 5;

pub fn write_missing_mappings(path: &Path, audit: &MappingAudit) -> Result<()> {
    let mut writer = tsv::open_writer(path)?;
    writer.write_record([
        "PART_NUMBER",
        "PART_NAME",
        "PART_TYPE",
        "AFFECTED",
        "HIGH_USAGE",
        "HIGHEST_USAGE",
        "EXAMPLES",
    ])?;
    let rows = audit
        .missing()
        .sorted_by(|a, b| b.affected.len().cmp(&a.affected.len()).then(a.part_number.cmp(&b.part_number)));
    for missing in rows {
        writer.write_record([
            missing.part_number.clone(),
            missing.part_name.clone(),
            missing.part_type.clone(),
            missing.affected.len().to_string(),
            missing.high_usage.len().to_string(),
            missing.highest_usage.len().to_string(),
            missing.affected.iter().take(EXAMPLE_LIMIT).join(","),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_issues(path: &Path, concepts: &[&TemplatedConcept]) -> Result<()> {
    let mut writer = tsv::open_writer(path)?;
    writer.write_record(["EXTERNAL_ID", "CONCEPT_ID", "TEMPLATE", "FLAGS", "ISSUE"])?;
    for tc in concepts {
        for issue in &tc.issues {
            writer.write_record([
                tc.external_id.clone(),
                tc.concept.id.clone().unwrap_or_default(),
                tc.kind.map(|k| k.to_string()).unwrap_or_default(),
                tc.flags.to_string(),
                issue.clone(),
            ])?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Before/after view of every classified concept that changed.
pub fn write_comparison(path: &Path, concepts: &[&TemplatedConcept], refset_id: &str) -> Result<()> {
    let mut writer = tsv::open_writer(path)?;
    writer.write_record([
        "EXTERNAL_ID",
        "CONCEPT_ID",
        "ITERATION",
        "TEMPLATE",
        "BEFORE_FSN",
        "AFTER_FSN",
        "BEFORE_PT",
        "AFTER_PT",
        "BEFORE_EXPRESSION",
        "AFTER_EXPRESSION",
    ])?;
    for tc in concepts {
        let Some(iteration) = tc.iteration else {
            continue;
        };
        let (before_fsn, before_pt, before_expression) = describe(tc.existing.as_ref(), refset_id);
        let (after_fsn, after_pt, after_expression) = describe(Some(&tc.concept), refset_id);
        writer.write_record([
            tc.external_id.clone(),
            tc.concept.id.clone().unwrap_or_default(),
            iteration.to_string(),
            tc.kind.map(|k| k.to_string()).unwrap_or_default(),
            before_fsn,
            after_fsn,
            before_pt,
            after_pt,
            before_expression,
            after_expression,
        ])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    let mut writer = tsv::open_writer(path)?;
    writer.write_record(["ITEM", "COUNT"])?;
    for (item, count) in summary.rows() {
        writer.write_record([item, count.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_mapping_notes(path: &Path, audit: &MappingAudit, load_notes: &[String]) -> Result<()> {
    let mut writer = tsv::open_writer(path)?;
    writer.write_record(["EXTERNAL_ID", "PART_NUMBER", "SUCCESSFUL", "NOTE"])?;
    for note in load_notes {
        writer.write_record(["", "", "N", note.as_str()])?;
    }
    for note in audit.notes() {
        writer.write_record([
            note.external_id.as_str(),
            note.part_number.as_str(),
            if note.successful { "Y" } else { "N" },
            note.note.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub counts: BTreeMap<ComponentType, usize>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Archive {
    manifest: ArchiveManifest,
    components: BTreeMap<ComponentType, Vec<DeltaRecord>>,
}

/// Groups the delta by component type into a single bundle with a manifest.
pub fn write_archive(path: &Path, run_id: &str, records: Vec<DeltaRecord>) -> Result<ArchiveManifest> {
    let record_count = records.len();
    let mut components: BTreeMap<ComponentType, Vec<DeltaRecord>> = BTreeMap::new();
    for record in records {
        components.entry(record.component_type).or_default().push(record);
    }
    let manifest = ArchiveManifest {
        run_id: run_id.to_string(),
        created_at: Utc::now(),
        record_count,
        counts: components.iter().map(|(k, v)| (*k, v.len())).collect(),
    };
    let archive = Archive {
        manifest: manifest.clone(),
        components,
    };
    std::fs::write(path, serde_json::to_string_pretty(&archive)?)?;
    info!("Archived {} delta records to {}", record_count, path.display());
    Ok(manifest)
}

/// Packages the archive on the blocking pool; the caller awaits it before exiting.
pub async fn package_archive(output_dir: PathBuf, run_id: String, records: Vec<DeltaRecord>) -> Result<ArchiveManifest> {
    tokio::task::spawn_blocking(move || write_archive(&output_dir.join(ARCHIVE), &run_id, records))
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}
