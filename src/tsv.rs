//! Tab-delimited input helpers.
//!
//! Input files carry a header row whose column order is not fixed; columns are
//! located by name when the file is opened.

use crate::error::{PipelineError, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

pub fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path)
        .map_err(|e| PipelineError::Input(format!("Failed to open {}: {}", path.display(), e)))?;
    Ok(ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .quoting(false)
        .from_reader(file))
}

pub fn open_writer(path: &Path) -> Result<csv::Writer<File>> {
    let file = File::create(path)
        .map_err(|e| PipelineError::Input(format!("Failed to create {}: {}", path.display(), e)))?;
    Ok(WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(file))
}

/// Header name → position, discovered at runtime.
#[derive(Debug, Clone)]
pub struct ColumnIndex {
    source: String,
    positions: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn from_headers(source: &Path, headers: &StringRecord) -> Self {
        let positions = headers
            .iter()
            .enumerate()
            .map(|(idx, h)| (normalize_header(h), idx))
            .collect();
        Self {
            source: source.display().to_string(),
            positions,
        }
    }

    /// Position of the first alias present in the header.
    pub fn optional(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.positions.get(&normalize_header(alias)).copied())
    }

    pub fn require(&self, aliases: &[&str]) -> Result<usize> {
        self.optional(aliases).ok_or_else(|| {
            PipelineError::Input(format!(
                "{} has no column named any of {:?}",
                self.source, aliases
            ))
        })
    }
}

fn normalize_header(h: &str) -> String {
    h.trim()
        .trim_start_matches('\u{feff}')
        .to_uppercase()
        .replace([' ', '-'], "_")
}

pub fn cell(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).map(str::trim).unwrap_or("")
}

pub fn optional_cell(record: &StringRecord, idx: Option<usize>) -> &str {
    idx.map(|i| cell(record, i)).unwrap_or("")
}

pub fn parse_flag(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "true" | "yes" | "y" | "1" | "x"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_order_and_case_insensitive() {
        let headers = StringRecord::from(vec!["Target Code", "status", "SOURCE_CODE"]);
        let idx = ColumnIndex::from_headers(Path::new("map.tsv"), &headers);
        assert_eq!(idx.require(&["SOURCE_CODE"]).unwrap(), 2);
        assert_eq!(idx.require(&["TARGET_CODE"]).unwrap(), 0);
        assert_eq!(idx.optional(&["NO_MAP"]), None);
        assert!(idx.require(&["NO_MAP"]).is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" y "));
        assert!(!parse_flag(""));
        assert!(!parse_flag("false"));
    }
}
