//! Filesystem utility functions
//!
//! Every document ccswap persists goes through [`write_private_atomic`]:
//! write a temp file next to the target, check it, then rename over the
//! target. A reader never sees a half-written file.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AccountError;

/// Create a directory (and parents) readable only by the owner
pub fn ensure_private_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    set_mode(path, 0o700)
}

/// Restrict a path to owner access. No-op off unix.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

/// Unix permission bits of a path, if the platform has them
pub fn mode_of(path: &Path) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

/// Atomically replace `path` with `content`, owner read/write only.
///
/// `validate` runs against the bytes read back from the temp file; if it
/// rejects them the temp file is removed and the target is left untouched.
pub fn write_private_atomic<F>(path: &Path, content: &[u8], validate: F) -> Result<()>
where
    F: FnOnce(&[u8]) -> std::result::Result<(), String>,
{
    write_atomic_with_mode(path, content, 0o600, validate)
}

/// Like [`write_private_atomic`], for files the user owns (a shell startup
/// file): a symlink is followed so its target is rewritten in place, and
/// the target keeps its current permissions.
pub fn write_user_file_atomic<F>(path: &Path, content: &[u8], validate: F) -> Result<()>
where
    F: FnOnce(&[u8]) -> std::result::Result<(), String>,
{
    let is_symlink = fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink());
    let target = if is_symlink {
        fs::canonicalize(path)
            .with_context(|| format!("Failed to resolve symlink: {}", path.display()))?
    } else {
        path.to_path_buf()
    };
    let mode = mode_of(&target).unwrap_or(0o644);
    write_atomic_with_mode(&target, content, mode, validate)
}

fn write_atomic_with_mode<F>(path: &Path, content: &[u8], mode: u32, validate: F) -> Result<()>
where
    F: FnOnce(&[u8]) -> std::result::Result<(), String>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let temp_path = temp_path_for(path);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
        set_mode(&temp_path, mode)?;
        file.write_all(content)
            .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("Failed to sync temp file: {}", temp_path.display()))?;
    }

    let written = fs::read(&temp_path)
        .with_context(|| format!("Failed to read back temp file: {}", temp_path.display()))?;
    if let Err(reason) = validate(&written) {
        let _ = fs::remove_file(&temp_path);
        return Err(AccountError::Persistence {
            path: path.to_path_buf(),
            reason,
        }
        .into());
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} -> {}",
            temp_path.display(),
            path.display()
        )
    })
}

/// Serialize `value` as pretty JSON and write it atomically.
///
/// The read-back must parse as `T` again and pass `check`, otherwise the
/// write is refused with a persistence error.
pub fn write_json_atomic<T, C>(path: &Path, value: &T, check: C) -> Result<()>
where
    T: Serialize + DeserializeOwned,
    C: FnOnce(&T) -> std::result::Result<(), String>,
{
    let mut content = serde_json::to_vec_pretty(value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    content.push(b'\n');

    write_private_atomic(path, &content, |bytes| {
        let parsed: T = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        check(&parsed)
    })
}

/// Read and parse a JSON document, `None` if the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(None);
    }
    let value = serde_json::from_str(&content).map_err(|e| AccountError::Persistence {
        path: path.to_path_buf(),
        reason: format!("existing document is not valid: {e}"),
    })?;
    Ok(Some(value))
}

/// Remove a file, treating "already gone" as success
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, kind_of};
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn test_write_json_atomic_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/doc.json");

        write_json_atomic(&path, &Doc { value: 3 }, |_| Ok(())).unwrap();

        let read: Option<Doc> = read_json(&path).unwrap();
        assert_eq!(read, Some(Doc { value: 3 }));
        #[cfg(unix)]
        assert_eq!(mode_of(&path), Some(0o600));
    }

    #[test]
    fn test_rejected_write_keeps_previous_document() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");
        write_json_atomic(&path, &Doc { value: 1 }, |_| Ok(())).unwrap();

        let err = write_json_atomic(&path, &Doc { value: 2 }, |d| {
            if d.value == 2 { Err("two is not allowed".into()) } else { Ok(()) }
        })
        .unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Persistence));

        let read: Option<Doc> = read_json(&path).unwrap();
        assert_eq!(read, Some(Doc { value: 1 }));

        // no temp files left behind
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_read_json_corrupt_is_persistence_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.json");
        fs::write(&path, "{\"value\": ").unwrap();

        let err = read_json::<Doc>(&path).unwrap_err();
        assert_eq!(kind_of(&err), Some(ErrorKind::Persistence));
    }

    #[cfg(unix)]
    #[test]
    fn test_user_file_keeps_mode_and_symlink() {
        let temp_dir = TempDir::new().unwrap();
        let real = temp_dir.path().join("dotfiles/zshrc");
        fs::create_dir_all(real.parent().unwrap()).unwrap();
        fs::write(&real, "old\n").unwrap();
        set_mode(&real, 0o644).unwrap();
        let link = temp_dir.path().join(".zshrc");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        write_user_file_atomic(&link, b"new\n", |_| Ok(())).unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&real).unwrap(), "new\n");
        assert_eq!(mode_of(&real), Some(0o644));
    }

    #[test]
    fn test_remove_if_exists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone");
        assert!(!remove_if_exists(&path).unwrap());
        fs::write(&path, "x").unwrap();
        assert!(remove_if_exists(&path).unwrap());
    }
}
