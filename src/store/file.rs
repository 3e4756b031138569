//! PT-013: Store persisted as a YAML snapshot, saved atomically after every write.

use super::memory::MemoryStore;
use super::{Entity, RemoteError, RemoteStore, Scope};
use crate::core::types::{DataDict, EntityType};
use crate::ledger::eventlog::now_iso8601;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// On-disk form of a [`FileStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema: String,
    pub generator: String,
    pub updated_at: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// Path of the snapshot inside a state directory.
pub fn store_path(state_dir: &Path) -> PathBuf {
    state_dir.join("store.yaml")
}

/// A [`MemoryStore`] mirrored to `{state_dir}/store.yaml`.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    inner: MemoryStore,
}

impl FileStore {
    /// Open the store in `state_dir`, starting empty when no snapshot exists.
    pub fn open(state_dir: &Path) -> crate::Result<Self> {
        let path = store_path(state_dir);
        let inner = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let snapshot: StoreSnapshot = serde_yaml_ng::from_str(&content).map_err(|e| {
                crate::Error::Serialize(format!("invalid store {}: {}", path.display(), e))
            })?;
            MemoryStore::from_entities(snapshot.entities)
        } else {
            MemoryStore::new()
        };
        tracing::debug!(path = %path.display(), entities = inner.len(), "opened file store");
        Ok(Self {
            dir: state_dir.to_path_buf(),
            inner,
        })
    }

    pub fn exists(state_dir: &Path) -> bool {
        store_path(state_dir).exists()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Write the snapshot (temp file + rename).
    pub fn save(&self) -> crate::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let snapshot = StoreSnapshot {
            schema: "1.0".to_string(),
            generator: format!("prodtree {}", env!("CARGO_PKG_VERSION")),
            updated_at: now_iso8601(),
            entities: self.inner.entities().cloned().collect(),
        };
        let yaml = serde_yaml_ng::to_string(&snapshot)?;
        let path = store_path(&self.dir);
        let tmp_path = path.with_extension("yaml.tmp");
        std::fs::write(&tmp_path, &yaml)?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    fn persist(&self, result: Result<Entity, RemoteError>) -> Result<Entity, RemoteError> {
        let entity = result?;
        self.save()
            .map_err(|e| RemoteError(format!("cannot persist store: {}", e)))?;
        Ok(entity)
    }
}

impl RemoteStore for FileStore {
    fn get_by_name(
        &self,
        kind: EntityType,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Entity>, RemoteError> {
        self.inner.get_by_name(kind, scope, name)
    }

    fn get(&self, id: &str) -> Result<Option<Entity>, RemoteError> {
        self.inner.get(id)
    }

    fn list(&self, kind: EntityType, scope: &Scope) -> Result<Vec<Entity>, RemoteError> {
        self.inner.list(kind, scope)
    }

    fn create(
        &mut self,
        kind: EntityType,
        scope: &Scope,
        name: &str,
        fields: &DataDict,
    ) -> Result<Entity, RemoteError> {
        let result = self.inner.create(kind, scope, name, fields);
        self.persist(result)
    }

    fn update_fields(&mut self, id: &str, fields: &DataDict) -> Result<Entity, RemoteError> {
        let result = self.inner.update_fields(id, fields);
        self.persist(result)
    }

    fn update_data(&mut self, id: &str, data: &DataDict) -> Result<Entity, RemoteError> {
        let result = self.inner.update_data(id, data);
        self.persist(result)
    }

    fn ensure_task(&mut self, id: &str, task_type: &str) -> Result<bool, RemoteError> {
        let added = self.inner.ensure_task(id, task_type)?;
        if added {
            self.save()
                .map_err(|e| RemoteError(format!("cannot persist store: {}", e)))?;
        }
        Ok(added)
    }
}
