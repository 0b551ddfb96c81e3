//! Tabular source loading for processed discharge summaries.
//!
//! The source is a CSV with one row per admission, carrying at minimum the
//! `hadm_id` and `text` columns. Display columns (age, gender, diagnosis,
//! medications, follow-up) are optional.

use std::path::Path;

use tracing::info;

use crate::document::DischargeRecord;
use crate::error::{RagError, Result};

/// Read all discharge records from a CSV file.
///
/// # Errors
///
/// Returns [`RagError::DataSource`] if the file cannot be opened or a row
/// fails to parse.
pub fn load_records(path: &Path) -> Result<Vec<DischargeRecord>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        RagError::DataSource(format!("failed to open '{}': {e}", path.display()))
    })?;

    let mut records = Vec::new();
    for row in reader.deserialize() {
        let record: DischargeRecord = row.map_err(|e| {
            RagError::DataSource(format!("malformed row in '{}': {e}", path.display()))
        })?;
        records.push(record);
    }

    info!(source = %path.display(), records = records.len(), "loaded discharge records");
    Ok(records)
}
