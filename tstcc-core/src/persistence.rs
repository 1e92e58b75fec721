//! Shared persistence utilities: atomic publish, JSON load/save, digests.
//!
//! Every artifact a stage produces goes through [`atomic_write`]: the bytes land
//! in a uniquely named temporary file inside the destination directory, get
//! flushed to disk, and are renamed over the final path. Readers see either the
//! previous file or the complete new one, never a prefix.

use sha2::{Digest, Sha256};
use std::io::{self, Write};
use std::path::Path;

/// Atomically write JSON data to a file.
///
/// Serializes `data` to compact JSON and publishes it with [`atomic_write`].
/// Creates parent directories if they don't exist.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_vec(data).map_err(io::Error::other)?;
    atomic_write(path, &json)
}

/// Atomically write raw bytes to a file.
///
/// The temporary file is created next to `path` so the final rename never
/// crosses a filesystem boundary. Two writers racing on the same path each get
/// their own temporary file; the last rename wins and both results are whole.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".publish-")
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;

    tracing::debug!(path = %path.display(), bytes = data.len(), "Published artifact");
    Ok(())
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
/// Returns `Err` on I/O errors or deserialization failures.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    let value =
        serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
