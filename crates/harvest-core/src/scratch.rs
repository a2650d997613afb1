//! Per-run scratch directory with diagnostic snapshots.
//!
//! Nothing is ever read back from here. The directory and its contents are
//! removed when the [`ScratchDir`] is dropped.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::AppError;
use crate::models::{BasicRecord, DetailRecord, RowPosition, union_columns};

pub const SCRATCH_PREFIX: &str = "harvest_";
pub const BASIC_FILE: &str = "basic_data.csv";
pub const DETAILS_DIR: &str = "details";
/// Extra column carrying each basic record's original row position.
pub const POSITION_COLUMN: &str = "row_position";

#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>) -> Result<Self, AppError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        tracing::debug!(path = %dir.path().display(), "Created scratch directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Snapshot the (filtered) basic records as CSV.
    ///
    /// The header is `row_position` followed by the union of all record
    /// columns in first-seen order.
    pub fn write_basic(&self, records: &[BasicRecord]) -> Result<PathBuf, AppError> {
        let header = union_columns(records);
        let path = self.path().join(BASIC_FILE);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(std::iter::once(POSITION_COLUMN).chain(header.iter().copied()))?;
        for record in records {
            let position = record.position.to_string();
            let row = header
                .iter()
                .map(|column| {
                    record
                        .columns()
                        .find(|(c, _)| c == column)
                        .map(|(_, v)| v)
                        .unwrap_or_default()
                });
            writer.write_record(std::iter::once(position.as_str()).chain(row))?;
        }
        writer.flush()?;
        Ok(path)
    }

    /// Snapshot one detail record as pretty JSON at `details/detail_<pos>.json`.
    pub fn write_detail(
        &self,
        position: RowPosition,
        detail: &DetailRecord,
    ) -> Result<PathBuf, AppError> {
        let dir = self.path().join(DETAILS_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("detail_{position}.json"));
        fs::write(&path, serde_json::to_string_pretty(detail)?)?;
        Ok(path)
    }
}
