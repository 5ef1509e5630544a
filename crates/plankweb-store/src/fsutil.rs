//! Small filesystem helpers: atomic replace and create-if-absent.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn tmp_path(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

async fn ensure_parent(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Write via temp file + rename so readers see either the old or the new file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    ensure_parent(path).await?;
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Create `path` with `bytes` unless it already exists. Returns whether it wrote.
///
/// The file is fully written under a temp name and hard-linked into place, so
/// concurrent writers never observe a partial file and exactly one of them wins.
pub async fn write_if_absent(path: &Path, bytes: &[u8]) -> io::Result<bool> {
    if fs::try_exists(path).await? {
        return Ok(false);
    }
    ensure_parent(path).await?;
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).await?;
    let linked = fs::hard_link(&tmp, path).await;
    let _ = fs::remove_file(&tmp).await;
    match linked {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// `Ok(None)` when the file does not exist.
pub async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_if_absent_keeps_first_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/chains.json");
        assert!(write_if_absent(&path, b"first").await.unwrap());
        assert!(!write_if_absent(&path, b"second").await.unwrap());
        assert_eq!(fs::read(&path).await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        write_atomic(&path, b"one").await.unwrap();
        write_atomic(&path, b"two").await.unwrap();
        assert_eq!(fs::read(&path).await.unwrap(), b"two");

        let mut entries = fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["status.json"]);
    }

    #[tokio::test]
    async fn test_read_optional_missing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope")).await.unwrap().is_none());
    }
}
