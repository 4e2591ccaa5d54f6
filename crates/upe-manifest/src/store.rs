//! Write-once manifest persistence

use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fs;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use upe_utils::atomic_write::{Overwrite, WriteOutcome, write_file_atomic};
use upe_utils::canonicalization::emit_jcs;
use upe_utils::error::StoreError;

use crate::model::RunManifest;

/// Append-only manifest storage keyed by run id.
pub trait ManifestStore: Send + Sync {
    /// Persist a manifest.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if a manifest with the same run id
    /// was stored before; the stored record is left untouched.
    fn put(&self, manifest: &RunManifest) -> Result<(), StoreError>;

    /// Fetch a manifest by run id.
    fn get(&self, run_id: &str) -> Result<Option<RunManifest>, StoreError>;

    /// All manifests ordered by creation time, then run id.
    fn list(&self) -> Result<Vec<RunManifest>, StoreError>;
}

fn sort_manifests(manifests: &mut [RunManifest]) {
    manifests.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
}

/// In-process store, used by tests and by the CLI when no manifest
/// directory is configured.
#[derive(Debug, Default)]
pub struct InMemoryManifestStore {
    manifests: Mutex<BTreeMap<String, RunManifest>>,
}

impl InMemoryManifestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ManifestStore for InMemoryManifestStore {
    fn put(&self, manifest: &RunManifest) -> Result<(), StoreError> {
        let mut manifests = self.manifests.lock().unwrap_or_else(PoisonError::into_inner);
        if manifests.contains_key(&manifest.run_id) {
            return Err(StoreError::AlreadyExists {
                run_id: manifest.run_id.clone(),
            });
        }
        manifests.insert(manifest.run_id.clone(), manifest.clone());
        Ok(())
    }

    fn get(&self, run_id: &str) -> Result<Option<RunManifest>, StoreError> {
        let manifests = self.manifests.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(manifests.get(run_id).cloned())
    }

    fn list(&self) -> Result<Vec<RunManifest>, StoreError> {
        let mut all: Vec<_> = self
            .manifests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        sort_manifests(&mut all);
        Ok(all)
    }
}

/// Filesystem store writing `<dir>/<run_id>.json` as canonical JSON.
///
/// Writes go through temp file + fsync + no-clobber rename, so a record is
/// either fully present or absent and is never replaced.
#[derive(Debug, Clone)]
pub struct FsManifestStore {
    dir: Utf8PathBuf,
}

impl FsManifestStore {
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// Path for a run id. Ids that could escape the directory are rejected.
    fn path_for(&self, run_id: &str) -> Option<Utf8PathBuf> {
        let safe = !run_id.is_empty()
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        safe.then(|| self.dir.join(format!("{run_id}.json")))
    }

    fn read(path: &Utf8Path, run_id: &str) -> Result<RunManifest, StoreError> {
        let content = fs::read_to_string(path).map_err(|e| StoreError::ReadFailed {
            run_id: run_id.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| StoreError::ReadFailed {
            run_id: run_id.to_string(),
            reason: e.to_string(),
        })
    }
}

impl ManifestStore for FsManifestStore {
    fn put(&self, manifest: &RunManifest) -> Result<(), StoreError> {
        let path = self
            .path_for(&manifest.run_id)
            .ok_or_else(|| StoreError::WriteFailed {
                path: self.dir.to_string(),
                reason: format!("invalid run id '{}'", manifest.run_id),
            })?;

        let content = emit_jcs(manifest).map_err(|e| StoreError::WriteFailed {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

        match write_file_atomic(&path, &content, Overwrite::Deny) {
            Ok(WriteOutcome::Written) => {
                debug!(run_id = %manifest.run_id, path = %path, "wrote run manifest");
                Ok(())
            }
            Ok(WriteOutcome::AlreadyExists) => Err(StoreError::AlreadyExists {
                run_id: manifest.run_id.clone(),
            }),
            Err(e) => Err(StoreError::WriteFailed {
                path: path.to_string(),
                reason: format!("{e:#}"),
            }),
        }
    }

    fn get(&self, run_id: &str) -> Result<Option<RunManifest>, StoreError> {
        let Some(path) = self.path_for(run_id) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        Self::read(&path, run_id).map(Some)
    }

    fn list(&self) -> Result<Vec<RunManifest>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::ReadFailed {
            run_id: "*".to_string(),
            reason: e.to_string(),
        })?;

        let mut manifests = Vec::new();
        for entry in entries.flatten() {
            let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
                continue;
            };
            if path.extension() != Some("json") {
                continue;
            }
            let run_id = path.file_stem().unwrap_or_default().to_string();
            manifests.push(Self::read(&path, &run_id)?);
        }
        sort_manifests(&mut manifests);
        Ok(manifests)
    }
}
