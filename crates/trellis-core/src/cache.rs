//! On-disk cache of analysis snapshots

use std::path::{Path, PathBuf};

use crate::snapshot::{AnalysisSnapshot, SNAPSHOT_FORMAT_VERSION, content_hash};

/// Cache directory: .trellis/
pub const CACHE_DIR: &str = ".trellis";

/// Snapshot subdirectory
pub const SNAPSHOT_DIR: &str = "snapshots";

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Snapshot file for a cache key
pub fn snapshot_path(root: &Path, key: &str) -> PathBuf {
    root.join(CACHE_DIR).join(SNAPSHOT_DIR).join(format!("{}.json", key))
}

/// Ensure cache directory exists
pub fn ensure_cache_dir(root: &Path) -> std::io::Result<()> {
    let dir = cache_dir(root).join(SNAPSHOT_DIR);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(())
}

/// Cache key for one document analysed under one schema and rule catalog.
/// `run_settings` fingerprints everything else that shapes the result
/// (split limits, classifier identity).
pub fn cache_key(
    document_hash: &str,
    platform: &str,
    schema_version: &str,
    catalog_version: &str,
    run_settings: &str,
) -> String {
    content_hash(
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            SNAPSHOT_FORMAT_VERSION, document_hash, platform, schema_version, catalog_version, run_settings
        )
        .as_bytes(),
    )
}

/// Write a complete snapshot to the cache. Partial snapshots are not cached.
pub fn save_snapshot(snapshot: &AnalysisSnapshot, root: &Path, key: &str) -> anyhow::Result<Option<PathBuf>> {
    if !snapshot.complete {
        tracing::debug!("Skipping cache write for incomplete snapshot");
        return Ok(None);
    }
    ensure_cache_dir(root)?;
    let path = snapshot_path(root, key);
    std::fs::write(&path, serde_json::to_string_pretty(snapshot)?)?;

    tracing::debug!("Snapshot cached: {}", path.display());
    Ok(Some(path))
}

/// Load a cached snapshot, ignoring entries written by another format version.
pub fn load_snapshot(root: &Path, key: &str) -> anyhow::Result<Option<AnalysisSnapshot>> {
    let path = snapshot_path(root, key);
    if !path.exists() {
        return Ok(None);
    }

    let json_str = std::fs::read_to_string(&path)?;
    let snapshot: AnalysisSnapshot = match serde_json::from_str(&json_str) {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Discarding unreadable cache entry {}: {}", path.display(), e);
            return Ok(None);
        }
    };
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        tracing::debug!("Ignoring cache entry with format {}", snapshot.format_version);
        return Ok(None);
    }

    tracing::debug!("Snapshot loaded from cache: {}", path.display());
    Ok(Some(snapshot))
}

/// Clear cache directory
pub fn clear_cache(root: &Path) -> std::io::Result<()> {
    let cache = cache_dir(root);
    if cache.exists() {
        std::fs::remove_dir_all(&cache)?;
    }
    Ok(())
}
