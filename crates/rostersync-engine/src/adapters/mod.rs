//! Reference adapters
//!
//! File-backed implementations of the adapter contracts. They make the
//! engine runnable end to end and double as templates for real system
//! clients.

pub mod json_directory;
pub mod yaml_roster;

use rostersync_core::errors::{ExError, ExErrorKind, Result};
use std::path::Path;

/// Replace `path` with `contents` through a sibling temp file and rename.
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Read a file that may legitimately be absent.
pub(crate) async fn read_optional(path: &Path, kind: ExErrorKind, op: &str) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ExError::new(kind)
            .with_op(op)
            .with_message(format!("cannot read {}", path.display()))
            .with_source(e.into())),
    }
}
