//! File helpers shared by the file store and config persistence.

use std::path::Path;

use gcli_types::StorageError;

/// Write via a sibling temp file and rename, so readers never see a partial file.
pub async fn atomic_write(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StorageError::from_io_error(&e))?;
    }

    let mut temp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    tokio::fs::write(&temp_path, content).await.map_err(|e| StorageError::Backend {
        message: format!("Failed to write temp file: {}", e),
    })?;

    tokio::fs::rename(&temp_path, path).await.map_err(|e| StorageError::Backend {
        message: format!("Failed to rename file: {}", e),
    })?;

    Ok(())
}

pub fn truncate_reason(reason: &str, max_len: usize) -> String {
    if reason.chars().count() <= max_len {
        return reason.to_string();
    }
    let mut s: String = reason.chars().take(max_len).collect();
    s.push('…');
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_reason_counts_chars() {
        assert_eq!(truncate_reason("short", 10), "short");
        assert_eq!(truncate_reason("héllo wörld", 5), "héllo…");
    }

    #[tokio::test]
    async fn test_atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/file.json");
        atomic_write(&path, b"{\"ok\":true}").await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "{\"ok\":true}");
        assert!(!dir.path().join("nested/deeper/file.json.tmp").exists());
    }
}
