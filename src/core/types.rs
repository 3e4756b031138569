//! PT-001: Core types - entity kinds, authored trees, plans, reports, commit events.
//!
//! Everything the builder, recalculator and executor pass between each other.
//! All types derive Serialize/Deserialize so plans and hierarchy files roundtrip
//! through YAML and JSON.

use crate::store::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Structured per-type metadata (paths, directory templates, inherited identifiers).
pub type DataDict = serde_json::Map<String, Value>;

// ============================================================================
// Entity types
// ============================================================================

/// The six kinds of production entity a tree can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Project,
    Episode,
    Sequence,
    Shot,
    AssetType,
    Asset,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Project,
        Self::Episode,
        Self::Sequence,
        Self::Shot,
        Self::AssetType,
        Self::Asset,
    ];

    /// Capitalized label for log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Project => "Project",
            Self::Episode => "Episode",
            Self::Sequence => "Sequence",
            Self::Shot => "Shot",
            Self::AssetType => "Asset type",
            Self::Asset => "Asset",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Project => write!(f, "project"),
            Self::Episode => write!(f, "episode"),
            Self::Sequence => write!(f, "sequence"),
            Self::Shot => write!(f, "shot"),
            Self::AssetType => write!(f, "asset_type"),
            Self::Asset => write!(f, "asset"),
        }
    }
}

/// Production type of a project; selects its directory schema and rule template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionType {
    #[default]
    Film,
    Tv,
    ShotsOnly,
    AssetsOnly,
    Custom,
}

impl ProductionType {
    /// Parse a production type as written in a node's properties.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "film" => Some(Self::Film),
            "tv" => Some(Self::Tv),
            "shots_only" => Some(Self::ShotsOnly),
            "assets_only" => Some(Self::AssetsOnly),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

impl fmt::Display for ProductionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Film => write!(f, "film"),
            Self::Tv => write!(f, "tv"),
            Self::ShotsOnly => write!(f, "shots_only"),
            Self::AssetsOnly => write!(f, "assets_only"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

// ============================================================================
// Authored tree
// ============================================================================

/// A node of the authored hierarchy. Read-only to the compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoredNode {
    /// Entity type
    #[serde(rename = "type")]
    pub kind: EntityType,

    /// Display name
    pub name: String,

    /// Free-form property bag (production_type, frame_in, tasks, custom_data, ...)
    #[serde(default)]
    pub properties: DataDict,

    /// Ordered children
    #[serde(default)]
    pub children: Vec<AuthoredNode>,
}

impl AuthoredNode {
    pub fn new(kind: EntityType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            properties: DataDict::new(),
            children: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn with_child(mut self, child: AuthoredNode) -> Self {
        self.children.push(child);
        self
    }

    /// A non-blank string property.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Number of nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(AuthoredNode::count).sum::<usize>()
    }
}

// ============================================================================
// hierarchy.yaml
// ============================================================================

/// Root of a hierarchy file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HierarchyFile {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Compiler settings
    #[serde(default)]
    pub settings: Settings,

    /// The authored tree
    pub root: AuthoredNode,
}

/// Compiler settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Root used when the project node carries no `root_path` property
    #[serde(default = "default_root_path")]
    pub root_path: String,

    /// Production style passed to project creation
    #[serde(default = "default_production_style")]
    pub production_style: String,

    /// Production type when the project node does not name one
    #[serde(default)]
    pub default_production_type: ProductionType,

    /// Task types attached to every shot without its own `tasks` property
    #[serde(default = "default_shot_tasks")]
    pub shot_tasks: Vec<String>,

    /// Append commit events next to the file store
    #[serde(default = "default_true")]
    pub event_log: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_path: default_root_path(),
            production_style: default_production_style(),
            default_production_type: ProductionType::default(),
            shot_tasks: default_shot_tasks(),
            event_log: true,
        }
    }
}

fn default_root_path() -> String {
    "/mnt/nas/projects".to_string()
}

fn default_production_style() -> String {
    "2d3d".to_string()
}

fn default_shot_tasks() -> Vec<String> {
    vec!["Compositing".to_string()]
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Plan
// ============================================================================

/// Why a step is in the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepRole {
    /// Root of a hierarchy build
    Context,
    /// Descendant of the root
    Child,
    /// Root of a selected-only build
    Selected,
}

impl fmt::Display for StepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => write!(f, "Context"),
            Self::Child => write!(f, "Child"),
            Self::Selected => write!(f, "Selected"),
        }
    }
}

/// Resolved parameters of a step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepParams {
    pub name: String,

    /// Remote-facing short code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Mandatory fields passed to `create`
    #[serde(default, skip_serializing_if = "DataDict::is_empty")]
    pub create_fields: DataDict,

    /// Optional fields patched after create/get
    #[serde(default, skip_serializing_if = "DataDict::is_empty")]
    pub fields: DataDict,

    /// Task types to ensure on the entity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<String>,

    /// Derived data dict
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DataDict>,
}

impl StepParams {
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.as_ref()?.get(key)?.as_str()
    }
}

/// One compiled operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    #[serde(rename = "type")]
    pub kind: EntityType,

    pub name: String,

    pub role: StepRole,

    /// Index of the parent step in the same plan
    #[serde(default)]
    pub parent: Option<usize>,

    pub params: StepParams,

    /// Live entity re-read after commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_data: Option<Entity>,

    /// Entity handle returned by the store during commit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_entity: Option<Entity>,
}

/// Root-first, pre-order arena of steps with explicit parent indices.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PlanStep> {
        self.steps.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanStep> {
        self.steps.iter()
    }

    /// Append a step, returning its index.
    pub(crate) fn push(&mut self, step: PlanStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    /// Direct children of a step, in plan order.
    pub fn children(&self, index: usize) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .skip(index + 1)
            .filter(|(_, s)| s.parent == Some(index))
            .map(|(i, _)| i)
            .collect()
    }

    /// Ancestors of a step, nearest first.
    ///
    /// Stops at the first parent index that does not precede its child.
    pub fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut below = index;
        let mut current = self.steps.get(index).and_then(|s| s.parent);
        while let Some(i) = current.filter(|&i| i < below) {
            out.push(i);
            below = i;
            current = self.steps[i].parent;
        }
        out
    }

    /// Nearest ancestor of the given type.
    pub fn nearest_ancestor(&self, index: usize, kind: EntityType) -> Option<usize> {
        self.ancestors(index)
            .into_iter()
            .find(|&i| self.steps[i].kind == kind)
    }

    pub fn depth(&self, index: usize) -> usize {
        self.ancestors(index).len()
    }

    /// First project step, if any.
    pub fn project_step(&self) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.kind == EntityType::Project)
    }

    /// Indices of steps with the given name.
    pub fn positions_by_name(&self, name: &str) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.name == name)
            .map(|(i, _)| i)
            .collect()
    }

    /// Count of steps per type.
    pub fn count_of(&self, kind: EntityType) -> usize {
        self.steps.iter().filter(|s| s.kind == kind).count()
    }
}

// ============================================================================
// Execution results
// ============================================================================

/// Summary of one `execute` run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub total: u32,
    pub created: u32,
    pub reused: u32,
    pub skipped: u32,
    pub failed: u32,
    pub duration_seconds: f64,

    /// Fingerprint of the plan as committed
    pub fingerprint: String,

    #[serde(default)]
    pub verification: Option<VerificationSummary>,
}

impl ExecutionReport {
    pub fn succeeded(&self) -> u32 {
        self.created + self.reused
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Post-commit readback of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub project: String,
    pub project_id: String,
    pub production_type: Option<String>,
    pub production_style: Option<String>,
    pub episodes: usize,
    pub sequences: Vec<SequenceSummary>,
    pub assets: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceSummary {
    pub name: String,
    pub shots: Vec<ShotSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShotSummary {
    pub name: String,
    pub frame_in: Option<i64>,
    pub frame_out: Option<i64>,
}

// ============================================================================
// Commit events
// ============================================================================

/// Commit event for the JSONL event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CommitEvent {
    CommitStarted {
        run_id: String,
        root: String,
        fingerprint: String,
        steps: u32,
        prodtree_version: String,
    },
    StepCommitted {
        run_id: String,
        kind: EntityType,
        name: String,
        entity_id: String,
        created: bool,
    },
    StepSkipped {
        run_id: String,
        kind: EntityType,
        name: String,
        reason: String,
    },
    StepFailed {
        run_id: String,
        kind: EntityType,
        name: String,
        error: String,
    },
    CommitCompleted {
        run_id: String,
        created: u32,
        reused: u32,
        skipped: u32,
        failed: u32,
        total_seconds: f64,
    },
    VerificationFailed {
        run_id: String,
        project: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: CommitEvent,
}

// ============================================================================
// Tests
// ============================================================================
