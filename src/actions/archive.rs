//! `EXTRACT_ZIP`: unpack a zip archive.

use std::fs::{self, File};
use std::path::Path;
use zip::ZipArchive;

use crate::error::{CommanderError, Result};
use crate::script::{ExtractZipArgs, OperationKind};

/// Extract every entry of `args.source` under `args.destination`.
/// Returns the number of entries in the archive.
pub fn extract_zip(args: &ExtractZipArgs) -> Result<usize> {
    let fail = |message: String| CommanderError::action(OperationKind::ExtractZip.as_ref(), message);
    let source = Path::new(&args.source);
    let destination = Path::new(&args.destination);

    let file = File::open(source)
        .map_err(|e| fail(format!("could not open archive {}: {e}", source.display())))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| fail(format!("invalid archive {}: {e}", source.display())))?;

    fs::create_dir_all(destination).map_err(|e| {
        fail(format!(
            "could not create directory {}: {e}",
            destination.display()
        ))
    })?;

    let entries = archive.len();
    archive
        .extract(destination)
        .map_err(|e| fail(format!("could not extract {}: {e}", source.display())))?;

    tracing::debug!(
        "Extracted {} entries from {} into {}",
        entries,
        source.display(),
        destination.display()
    );
    Ok(entries)
}
