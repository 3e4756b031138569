//! PT-004: Context frames - inherited paths, codes and counters.
//!
//! A frame is built once per tree level and handed to the children of that
//! level by value. Descending never mutates the parent's frame.

use super::codegen::slugify;
use super::types::{EntityType, Plan, PlanStep, ProductionType};
use std::sync::Arc;

/// Codes already present in the store for the project being built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingCodes {
    pub episodes: Vec<String>,
    pub sequences: Vec<String>,
    /// Codes already issued to named episodes and sequences
    pub issued: Vec<IssuedCode>,
}

/// A code the store already holds for a named entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCode {
    pub kind: EntityType,
    /// Lowercased name of the enclosing episode, for sequences under one
    pub episode: Option<String>,
    pub name: String,
    pub code: String,
}

impl ExistingCodes {
    /// Code previously issued to `name` under the same episode (or none).
    pub fn issued(&self, kind: EntityType, episode: Option<&str>, name: &str) -> Option<&str> {
        self.issued
            .iter()
            .find(|c| c.kind == kind && c.name == name && c.episode.as_deref() == episode)
            .map(|c| c.code.as_str())
    }
}

/// State inherited from ancestors while compiling or recalculating a subtree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextFrame {
    /// Shots already numbered under the current sequence
    pub shot_counter: u32,

    /// Read-only cache shared by every frame of a build pass
    pub existing: Arc<ExistingCodes>,

    pub parent_type: Option<EntityType>,
    pub parent_code: Option<String>,
    pub parent_path: Option<String>,

    pub root_path: String,
    pub production_type: ProductionType,

    pub project_code: Option<String>,
    pub project_path: Option<String>,

    pub episode_code: Option<String>,
    pub episode_path: Option<String>,

    /// Data code of the enclosing sequence (its lowercased name)
    pub sequence_code: Option<String>,
    pub sequence_path: Option<String>,
    /// Remote code issued to the enclosing sequence, used to number shots
    pub sequence_issued_code: Option<String>,

    pub asset_type_name: Option<String>,
    pub asset_type_path: Option<String>,
}

impl ContextFrame {
    /// Frame for the root of a build.
    pub fn seeded(root_path: &str, production_type: ProductionType) -> Self {
        Self {
            root_path: normalize_path(root_path),
            production_type,
            ..Self::default()
        }
    }

    pub fn with_existing(mut self, existing: ExistingCodes) -> Self {
        self.existing = Arc::new(existing);
        self
    }

    /// The frame a step's children inherit.
    pub fn descend(&self, step: &PlanStep) -> Self {
        let mut next = self.clone();
        let data = |key: &str| step.params.data_str(key).map(str::to_string);
        match step.kind {
            EntityType::Project => {
                if let Some(root) = data("root_path") {
                    next.root_path = normalize_path(&root);
                }
                if let Some(pt) = data("production_type").and_then(|s| ProductionType::parse(&s)) {
                    next.production_type = pt;
                }
                next.project_code = data("project_code");
                next.project_path = data("project_path");
                next.episode_code = None;
                next.episode_path = None;
                next.sequence_code = None;
                next.sequence_path = None;
                next.sequence_issued_code = None;
                next.asset_type_name = None;
                next.asset_type_path = None;
                next.parent_code = next.project_code.clone();
                next.parent_path = next.project_path.clone();
            }
            EntityType::Episode => {
                next.episode_code = data("episode_code");
                next.episode_path = data("episode_path");
                next.parent_code = next.episode_code.clone();
                next.parent_path = next.episode_path.clone();
            }
            EntityType::Sequence => {
                next.sequence_code = data("sequence_code");
                next.sequence_path = data("sequence_path");
                next.sequence_issued_code = step.params.code.clone();
                next.shot_counter = 0;
                next.parent_code = next.sequence_code.clone();
                next.parent_path = next.sequence_path.clone();
            }
            EntityType::AssetType => {
                let slug = slugify(&step.name);
                let path = join_path(
                    &join_path(next.project_path.as_deref().unwrap_or(""), "assets"),
                    &slug,
                );
                next.asset_type_name = Some(step.name.clone());
                next.asset_type_path = Some(path.clone());
                next.parent_code = Some(slug);
                next.parent_path = Some(path);
            }
            EntityType::Shot | EntityType::Asset => {
                let (code_key, path_key) = if step.kind == EntityType::Shot {
                    ("shot_code", "shot_path")
                } else {
                    ("asset_code", "asset_path")
                };
                next.parent_code = data(code_key);
                next.parent_path = data(path_key);
            }
        }
        next.parent_type = Some(step.kind);
        next
    }

    /// Sibling frame for the next shot of the current sequence.
    pub fn next_shot(&self) -> Self {
        Self {
            shot_counter: self.shot_counter + 1,
            ..self.clone()
        }
    }

    /// Frame in effect for `index`, folded from its ancestors root-first.
    ///
    /// Shot numbering is not reconstructed; callers that need it keep the
    /// issued codes already on the steps.
    pub fn for_step(plan: &Plan, index: usize, seed: &ContextFrame) -> Self {
        let mut frame = seed.clone();
        for i in plan.ancestors(index).into_iter().rev() {
            if let Some(step) = plan.get(i) {
                frame = frame.descend(step);
            }
        }
        frame
    }
}

/// Forward slashes only, no trailing slash.
pub fn normalize_path(path: &str) -> String {
    let p = path.trim().replace('\\', "/");
    if p.len() > 1 {
        p.trim_end_matches('/').to_string()
    } else {
        p
    }
}

/// `{parent}/{segment}`, or the bare segment when the parent is empty.
pub fn join_path(parent: &str, segment: &str) -> String {
    let parent = parent.trim_end_matches('/');
    if parent.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", parent, segment)
    }
}
