//! PT-012: Production-tracking store abstraction.
//!
//! The compiler only ever talks to a [`RemoteStore`]. Two implementations ship
//! with the crate: [`memory::MemoryStore`] (in-process, failure injection) and
//! [`file::FileStore`] (the memory store persisted as YAML).

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::core::types::{DataDict, EntityType};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type EntityId = String;

/// A store call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct RemoteError(pub String);

/// An entity as the store holds it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    pub kind: EntityType,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<EntityId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,

    /// Core fields (code, description, production_type, frame_in, ...)
    #[serde(default)]
    pub fields: DataDict,

    /// Free-form metadata, merged on update
    #[serde(default)]
    pub data: DataDict,

    /// Task types attached to the entity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,
}

impl Entity {
    pub fn code(&self) -> Option<&str> {
        self.field_str("code")
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Integer field, looked up in `fields` first and then in `data`.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.fields
            .get(key)
            .or_else(|| self.data.get(key))
            .and_then(Value::as_i64)
    }
}

/// Lookup scope: the project and direct parent an entity lives under.
///
/// `None` components match anything, so a project-level scope also finds
/// sequences that sit under an episode of that project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub project: Option<EntityId>,
    pub parent: Option<EntityId>,
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn project(project: &Entity) -> Self {
        Self {
            project: Some(project.id.clone()),
            parent: None,
        }
    }

    pub fn child(project: &Entity, parent: &Entity) -> Self {
        Self {
            project: Some(project.id.clone()),
            parent: Some(parent.id.clone()),
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        let project_ok = self
            .project
            .as_ref()
            .is_none_or(|p| entity.project_id.as_ref() == Some(p));
        let parent_ok = self
            .parent
            .as_ref()
            .is_none_or(|p| entity.parent_id.as_ref() == Some(p));
        project_ok && parent_ok
    }
}

/// The remote production-tracking store.
pub trait RemoteStore {
    /// Find an entity by name within a scope.
    fn get_by_name(
        &self,
        kind: EntityType,
        scope: &Scope,
        name: &str,
    ) -> Result<Option<Entity>, RemoteError>;

    /// Re-read an entity by id.
    fn get(&self, id: &str) -> Result<Option<Entity>, RemoteError>;

    /// All entities of a type within a scope.
    fn list(&self, kind: EntityType, scope: &Scope) -> Result<Vec<Entity>, RemoteError>;

    fn all_projects(&self) -> Result<Vec<Entity>, RemoteError> {
        self.list(EntityType::Project, &Scope::global())
    }

    /// Create an entity with its mandatory fields.
    fn create(
        &mut self,
        kind: EntityType,
        scope: &Scope,
        name: &str,
        fields: &DataDict,
    ) -> Result<Entity, RemoteError>;

    /// Overwrite the given core fields.
    fn update_fields(&mut self, id: &str, fields: &DataDict) -> Result<Entity, RemoteError>;

    /// Merge keys into the entity's data dict.
    fn update_data(&mut self, id: &str, data: &DataDict) -> Result<Entity, RemoteError>;

    /// Attach a task type to the entity. Returns true when it was newly added.
    fn ensure_task(&mut self, id: &str, task_type: &str) -> Result<bool, RemoteError>;
}
