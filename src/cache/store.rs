//! Snapshot persistence: an in-memory copy plus three disk encodings.
//!
//! Encodings written on every successful refresh:
//!
//! - `projects.json` — full records wrapped with refresh and write
//!   timestamps; the authoritative encoding reads fall back to.
//! - `projects_by_date.json` — bare date-sorted array.
//! - `projects/<id>.json` — one file per record, so by-id reads never load
//!   the whole collection.
//!
//! Each file is written to a temporary sibling and renamed into place, so a
//! single encoding is never observed half-written. Writes across the three
//! encodings are not transactional; readers tolerate an older snapshot.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs;
use tracing::warn;

use crate::application::filters::sort_by_date;
use crate::domain::projects::{CacheSnapshot, ProjectRecord};

const METADATA_FILE: &str = "projects.json";
const SORTED_FILE: &str = "projects_by_date.json";
const BY_ID_DIR: &str = "projects";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("cache encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Wrapper for the metadata encoding.
#[derive(Debug, Serialize, Deserialize)]
struct MetadataFile {
    #[serde(with = "time::serde::rfc3339")]
    last_update: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    written_at: OffsetDateTime,
    projects: Vec<ProjectRecord>,
}

/// Owns the snapshot representations. Single-writer discipline is enforced
/// upstream by the staleness controller; readers never block on a refresh.
pub struct CacheStore {
    root: PathBuf,
    snapshot: RwLock<Option<CacheSnapshot>>,
}

impl CacheStore {
    /// Open a store rooted at `root`, creating the directory tree if absent.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(root.join(BY_ID_DIR))?;
        Ok(Self {
            root,
            snapshot: RwLock::new(None),
        })
    }

    /// The current snapshot: in-memory copy first, metadata file second
    /// (hydrating memory on the way). `None` on a true cold start.
    pub async fn read_snapshot(&self) -> Option<CacheSnapshot> {
        let cached = self.peek().clone();
        if let Some(snapshot) = cached {
            return Some(snapshot);
        }

        match self.load_metadata().await {
            Ok(Some(snapshot)) => {
                *self.peek_mut() = Some(snapshot.clone());
                Some(snapshot)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(
                    target = "cache::store",
                    error = %err,
                    "Metadata encoding unreadable; treating cache as cold"
                );
                None
            }
        }
    }

    /// Replace the snapshot wholesale: write all three encodings, prune
    /// per-id files for removed projects, then swap the in-memory copy.
    pub async fn write_snapshot(
        &self,
        projects: Vec<ProjectRecord>,
        now: OffsetDateTime,
    ) -> Result<CacheSnapshot, CacheError> {
        let snapshot = CacheSnapshot {
            projects,
            last_update: now,
        };

        let metadata = MetadataFile {
            last_update: snapshot.last_update,
            written_at: now,
            projects: snapshot.projects.clone(),
        };
        self.write_atomic(&self.root.join(METADATA_FILE), serde_json::to_vec(&metadata)?)
            .await?;

        let sorted = sort_by_date(&snapshot.projects);
        self.write_atomic(&self.root.join(SORTED_FILE), serde_json::to_vec(&sorted)?)
            .await?;

        let by_id = self.root.join(BY_ID_DIR);
        fs::create_dir_all(&by_id).await?;
        for project in &snapshot.projects {
            let Some(path) = per_id_path(&by_id, &project.id) else {
                warn!(
                    target = "cache::store",
                    id = %project.id,
                    "Project id is not a safe filename; skipping per-id encoding"
                );
                continue;
            };
            self.write_atomic(&path, serde_json::to_vec(project)?).await?;
        }

        self.prune_orphans(&by_id, &snapshot.projects).await;

        *self.peek_mut() = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Look up one record. Prefers the per-id encoding so by-id reads skip
    /// the full collection; falls back to scanning the snapshot.
    pub async fn read_by_id(&self, id: &str) -> Option<ProjectRecord> {
        if let Some(path) = per_id_path(&self.root.join(BY_ID_DIR), id) {
            match fs::read(&path).await {
                Ok(raw) => match serde_json::from_slice(&raw) {
                    Ok(record) => return Some(record),
                    Err(err) => {
                        warn!(
                            target = "cache::store",
                            id,
                            error = %err,
                            "Per-id encoding corrupt; falling back to snapshot scan"
                        );
                    }
                },
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        target = "cache::store",
                        id,
                        error = %err,
                        "Per-id encoding unreadable; falling back to snapshot scan"
                    );
                }
            }
        }

        self.read_snapshot()
            .await?
            .projects
            .into_iter()
            .find(|project| project.id == id)
    }

    /// Refresh timestamp of the in-memory snapshot, if any.
    pub fn last_update(&self) -> Option<OffsetDateTime> {
        self.peek().as_ref().map(|snapshot| snapshot.last_update)
    }

    /// Record count of the in-memory snapshot, if any.
    pub fn project_count(&self) -> Option<usize> {
        self.peek().as_ref().map(|snapshot| snapshot.projects.len())
    }

    async fn load_metadata(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        let raw = match fs::read(self.root.join(METADATA_FILE)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let metadata: MetadataFile = serde_json::from_slice(&raw)?;
        Ok(Some(CacheSnapshot {
            projects: metadata.projects,
            last_update: metadata.last_update,
        }))
    }

    async fn write_atomic(&self, path: &Path, bytes: Vec<u8>) -> Result<(), CacheError> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Delete per-id files whose project is no longer in the snapshot.
    async fn prune_orphans(&self, by_id: &Path, projects: &[ProjectRecord]) {
        let keep: HashSet<String> = projects
            .iter()
            .map(|project| format!("{}.json", project.id))
            .collect();

        let mut entries = match fs::read_dir(by_id).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    target = "cache::store",
                    error = %err,
                    "Could not list per-id encodings for pruning"
                );
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.ends_with(".json") || keep.contains(name) {
                continue;
            }
            if let Err(err) = fs::remove_file(entry.path()).await {
                warn!(
                    target = "cache::store",
                    file = name,
                    error = %err,
                    "Could not prune orphaned per-id encoding"
                );
            }
        }
    }

    fn peek(&self) -> RwLockReadGuard<'_, Option<CacheSnapshot>> {
        self.snapshot.read().unwrap_or_else(|poisoned| {
            warn!(
                target = "cache::store",
                "Snapshot lock poisoned; recovering last-known state"
            );
            poisoned.into_inner()
        })
    }

    fn peek_mut(&self) -> RwLockWriteGuard<'_, Option<CacheSnapshot>> {
        self.snapshot.write().unwrap_or_else(|poisoned| {
            warn!(
                target = "cache::store",
                "Snapshot lock poisoned; recovering last-known state"
            );
            poisoned.into_inner()
        })
    }
}

/// Per-id encoding path, or `None` when the id cannot safely name a file.
fn per_id_path(by_id: &Path, id: &str) -> Option<PathBuf> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
    {
        return None;
    }
    Some(by_id.join(format!("{id}.json")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, date: Option<&str>) -> ProjectRecord {
        ProjectRecord {
            id: id.to_string(),
            title: Some(format!("Project {id}")),
            description: None,
            tags: vec!["studio".to_string()],
            credits: Vec::new(),
            date: date.map(|d| d.to_string()),
            media: Vec::new(),
            primary_image: None,
            extra: Default::default(),
        }
    }

    fn store(dir: &TempDir) -> CacheStore {
        CacheStore::new(dir.path().to_path_buf()).expect("store opens")
    }

    #[tokio::test]
    async fn roundtrip_by_id_is_deep_equal() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);

        let records = vec![record("alpha", Some("2023-01-01")), record("beta", None)];
        store
            .write_snapshot(records.clone(), OffsetDateTime::UNIX_EPOCH)
            .await
            .expect("write succeeds");

        for expected in &records {
            let found = store.read_by_id(&expected.id).await.expect("record exists");
            assert_eq!(&found, expected);
        }
    }

    #[tokio::test]
    async fn cold_read_falls_back_to_the_metadata_file() {
        let dir = TempDir::new().expect("temp dir");
        {
            let writer = store(&dir);
            writer
                .write_snapshot(vec![record("alpha", None)], OffsetDateTime::UNIX_EPOCH)
                .await
                .expect("write succeeds");
        }

        // Fresh store instance: memory is empty, disk is not.
        let reader = store(&dir);
        let snapshot = reader.read_snapshot().await.expect("disk snapshot");
        assert_eq!(snapshot.projects.len(), 1);
        assert_eq!(snapshot.last_update, OffsetDateTime::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn sorted_encoding_is_a_bare_date_sorted_array() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);

        store
            .write_snapshot(
                vec![
                    record("old", Some("2019-01-01")),
                    record("new", Some("2024-01-01")),
                ],
                OffsetDateTime::UNIX_EPOCH,
            )
            .await
            .expect("write succeeds");

        let raw = std::fs::read(dir.path().join(SORTED_FILE)).expect("sorted file exists");
        let parsed: Vec<ProjectRecord> = serde_json::from_slice(&raw).expect("bare array");
        let ids: Vec<&str> = parsed.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[tokio::test]
    async fn replaced_snapshot_prunes_orphaned_per_id_files() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);

        store
            .write_snapshot(
                vec![record("alpha", None), record("beta", None)],
                OffsetDateTime::UNIX_EPOCH,
            )
            .await
            .expect("first write");
        store
            .write_snapshot(vec![record("alpha", None)], OffsetDateTime::UNIX_EPOCH)
            .await
            .expect("second write");

        let by_id = dir.path().join(BY_ID_DIR);
        assert!(by_id.join("alpha.json").exists());
        assert!(!by_id.join("beta.json").exists());

        // The fallback scan must not resurrect the removed record either.
        assert!(store.read_by_id("beta").await.is_none());
    }

    #[tokio::test]
    async fn unsafe_ids_never_touch_the_filesystem() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);

        store
            .write_snapshot(vec![record("../escape", None)], OffsetDateTime::UNIX_EPOCH)
            .await
            .expect("write succeeds");

        assert!(!dir.path().join("escape.json").exists());
        // Still reachable through the snapshot scan.
        assert!(store.read_by_id("../escape").await.is_some());
    }

    #[tokio::test]
    async fn missing_everything_reads_as_cold() {
        let dir = TempDir::new().expect("temp dir");
        let store = store(&dir);
        assert!(store.read_snapshot().await.is_none());
        assert!(store.read_by_id("anything").await.is_none());
        assert!(store.last_update().is_none());
    }
}
