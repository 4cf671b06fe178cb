//! Certificate staging into the install's SSL directory

use certctl_config::InstallLayout;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Copy `source` into the layout's SSL certificate directory
///
/// The copy keeps the source's file name, permission bits and modification
/// time, and replaces any file already there. Returns the staged path.
pub fn stage(layout: &InstallLayout, source: &Path) -> io::Result<PathBuf> {
    let file_name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} has no file name", source.display()),
        )
    })?;
    let destination = layout.ssl_cert_dir().join(file_name);

    let metadata = fs::metadata(source)?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", source.display()),
        ));
    }

    if is_same_file(source, &destination) {
        debug!(path = %destination.display(), "Certificate already in place, skipping copy");
        return Ok(destination);
    }

    // Renaming over the old copy also replaces read-only leftovers
    let mut reader = File::open(source)?;
    let mut tmp = NamedTempFile::new_in(layout.ssl_cert_dir())?;
    io::copy(&mut reader, tmp.as_file_mut())?;

    let file = tmp.as_file();
    file.set_permissions(metadata.permissions())?;
    file.set_modified(metadata.modified()?)?;
    file.sync_all()?;

    tmp.persist(&destination).map_err(|e| e.error)?;

    info!(
        source = %source.display(),
        destination = %destination.display(),
        "Certificate staged"
    );
    Ok(destination)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
