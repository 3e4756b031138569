//! PT-012: In-process store.

use super::{Entity, EntityId, RemoteError, RemoteStore, Scope};
use crate::core::types::{DataDict, EntityType};
use crate::ledger::hasher;
use indexmap::IndexMap;
use rustc_hash::FxHashSet;

/// Store kept entirely in memory, in insertion order.
///
/// Names registered with [`MemoryStore::fail_on`] make every write touching
/// that entity fail, which is how tests exercise per-step error recovery.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entities: IndexMap<EntityId, Entity>,
    failing: FxHashSet<String>,
    unreachable: bool,
    creates: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: Vec<Entity>) -> Self {
        Self {
            entities: entities.into_iter().map(|e| (e.id.clone(), e)).collect(),
            ..Self::default()
        }
    }

    /// Reject writes to entities with this name.
    pub fn fail_on(&mut self, name: &str) {
        self.failing.insert(name.to_string());
    }

    /// Make every call fail as if the store could not be reached.
    pub fn set_unreachable(&mut self, unreachable: bool) {
        self.unreachable = unreachable;
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of successful `create` calls since construction.
    pub fn create_count(&self) -> u32 {
        self.creates
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    fn reachable(&self) -> Result<(), RemoteError> {
        if self.unreachable {
            return Err(RemoteError("store unreachable".to_string()));
        }
        Ok(())
    }

    fn guard(&self, op: &str, name: &str) -> Result<(), RemoteError> {
        self.reachable()?;
        if self.failing.contains(name) {
            return Err(RemoteError(format!("{} rejected for '{}'", op, name)));
        }
        Ok(())
    }

    fn writable(&mut self, op: &str, id: &str) -> Result<&mut Entity, RemoteError> {
        let name = self
            .entities
            .get(id)
            .map(|e| e.name.clone())
            .ok_or_else(|| RemoteError(format!("{}: no entity with id {}", op, id)))?;
        self.guard(op, &name)?;
        self.entities
            .get_mut(id)
            .ok_or_else(|| RemoteError(format!("{}: no entity with id {}", op, id)))
    }
}

impl RemoteStore for MemoryStore {
    fn get_by_name(
        &self,
        kind: EntityType,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Entity>, RemoteError> {
        self.reachable()?;
        Ok(self
            .entities
            .values()
            .find(|e| e.kind == kind && e.name == name && scope.matches(e))
            .cloned())
    }

    fn get(&self, id: &str) -> Result<Option<Entity>, RemoteError> {
        self.reachable()?;
        Ok(self.entities.get(id).cloned())
    }

    fn list(&self, kind: EntityType, scope: &Scope) -> Result<Vec<Entity>, RemoteError> {
        self.reachable()?;
        Ok(self
            .entities
            .values()
            .filter(|e| e.kind == kind && scope.matches(e))
            .cloned()
            .collect())
    }

    fn create(
        &mut self,
        kind: EntityType,
        scope: &Scope,
        name: &str,
        fields: &DataDict,
    ) -> Result<Entity, RemoteError> {
        self.guard("create", name)?;
        let id = hasher::entity_id(kind, scope, name);
        if self.entities.contains_key(&id) {
            return Err(RemoteError(format!("{} '{}' already exists", kind, name)));
        }
        let entity = Entity {
            id: id.clone(),
            kind,
            name: name.to_string(),
            project_id: scope.project.clone(),
            parent_id: scope.parent.clone(),
            fields: fields.clone(),
            data: DataDict::new(),
            tasks: Vec::new(),
        };
        tracing::debug!(%id, %kind, name, "store: create");
        self.entities.insert(id, entity.clone());
        self.creates += 1;
        Ok(entity)
    }

    fn update_fields(&mut self, id: &str, fields: &DataDict) -> Result<Entity, RemoteError> {
        let entity = self.writable("update_fields", id)?;
        for (k, v) in fields {
            entity.fields.insert(k.clone(), v.clone());
        }
        Ok(entity.clone())
    }

    fn update_data(&mut self, id: &str, data: &DataDict) -> Result<Entity, RemoteError> {
        let entity = self.writable("update_data", id)?;
        for (k, v) in data {
            entity.data.insert(k.clone(), v.clone());
        }
        Ok(entity.clone())
    }

    fn ensure_task(&mut self, id: &str, task_type: &str) -> Result<bool, RemoteError> {
        let entity = self.writable("ensure_task", id)?;
        if entity.tasks.iter().any(|t| t == task_type) {
            return Ok(false);
        }
        entity.tasks.push(task_type.to_string());
        Ok(true)
    }
}
