use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::constants::export::{CELL_ID_DELIMITER, CSV_SEPARATOR};
use crate::data::{CellChange, CellChanges};
use crate::errors::VioGenError;

/// Writes cell changes as `<oid>.<attribute>,<new value>,<original value>` lines.
///
/// No header, UTF-8, one change per line. Separators inside values are not
/// escaped.
#[derive(Clone, Copy, Debug, Default)]
pub struct CellChangesCsvExporter;

impl CellChangesCsvExporter {
    /// Export `changes` to `path`, resolving relative paths against `base_path`.
    pub fn export(
        &self,
        changes: &CellChanges,
        path: impl AsRef<Path>,
        base_path: impl AsRef<Path>,
    ) -> Result<PathBuf, VioGenError> {
        let path = expand_path(base_path.as_ref(), path.as_ref());
        debug!(path = %path.display(), changes = changes.len(), "exporting cell changes");
        write_changes(changes, &path).map_err(|source| {
            error!(path = %path.display(), error = %source, "unable to export cell changes");
            VioGenError::DataAccess {
                path: path.clone(),
                source,
            }
        })?;
        Ok(path)
    }
}

/// One CSV line (without the trailing newline).
pub fn change_to_csv(change: &CellChange) -> String {
    let cell = &change.cell;
    format!(
        "{}{}{}{}{}{}{}",
        cell.oid,
        CELL_ID_DELIMITER,
        cell.attribute,
        CSV_SEPARATOR,
        change.new_value,
        CSV_SEPARATOR,
        cell.value
    )
}

fn expand_path(base_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_path.join(path)
    }
}

fn write_changes(changes: &CellChanges, path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(File::create(path)?);
    for change in changes {
        out.write_all(change_to_csv(change).as_bytes())?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
