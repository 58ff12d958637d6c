//! Raw upload retention on local disk.

use std::io;
use std::path::{Path, PathBuf};

/// File name an upload is kept under: `<file_id>_<original base name>`.
///
/// Only the final path component of the client-supplied name is used.
pub fn stored_file_name(file_id: &str, original: &str) -> String {
    let base = original
        .rsplit(['/', '\\'])
        .next()
        .filter(|b| !b.is_empty())
        .unwrap_or("upload");
    format!("{file_id}_{base}")
}

/// Writes the uploaded bytes under `dir`, creating it if needed.
///
/// # Errors
///
/// Returns the underlying `io::Error` if the directory or file cannot be written.
pub async fn save_upload(dir: &Path, file_id: &str, original: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(stored_file_name(file_id, original));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}
