//! PT-005: Per-type derivation of step data dicts.
//!
//! One function per entity type, selected in [`derive_data`]. Both the plan
//! builder and the recalculator go through this table, so a freshly built
//! step and a renamed one always carry the same keys.

use super::codegen::slugify;
use super::context::{join_path, ContextFrame};
use super::types::{DataDict, EntityType, ProductionType};
use serde_json::{json, Value};

/// Keys this table owns for `kind`. Everything else in a data dict is custom
/// data and survives a rename.
pub fn derived_keys(kind: EntityType) -> &'static [&'static str] {
    match kind {
        EntityType::Project => &[
            "root_path",
            "project_code",
            "project_path",
            "production_type",
            "project_tree",
        ],
        EntityType::Episode => &[
            "project_code",
            "project_path",
            "production_type",
            "parent_type",
            "parent_code",
            "parent_path",
            "episode_code",
            "episode_name",
            "episode_path",
            "episode_tree",
        ],
        EntityType::Sequence => &[
            "project_code",
            "project_path",
            "production_type",
            "parent_type",
            "parent_code",
            "parent_path",
            "sequence_code",
            "sequence_name",
            "sequence_path",
            "sequence_tree",
        ],
        EntityType::Shot => &[
            "project_code",
            "project_path",
            "production_type",
            "sequence_code",
            "sequence_path",
            "parent_type",
            "shot_code",
            "shot_name",
            "shot_path",
            "shot_tree",
        ],
        EntityType::AssetType => &[],
        EntityType::Asset => &[
            "project_code",
            "project_path",
            "production_type",
            "asset_type",
            "asset_type_path",
            "parent_type",
            "asset_code",
            "asset_name",
            "asset_path",
            "asset_tree",
        ],
    }
}

/// Derived data for a step. `code` is the step's issued remote code; only
/// projects read it. Asset types carry no data.
pub fn derive_data(
    kind: EntityType,
    name: &str,
    code: Option<&str>,
    frame: &ContextFrame,
) -> Option<DataDict> {
    match kind {
        EntityType::Project => Some(project(name, code, frame)),
        EntityType::Episode => Some(episode(name, frame)),
        EntityType::Sequence => Some(sequence(name, frame)),
        EntityType::Shot => Some(shot(name, frame)),
        EntityType::AssetType => None,
        EntityType::Asset => Some(asset(name, frame)),
    }
}

fn task_leaf() -> Value {
    json!({"{task_type}": {"work": {}, "publish": {}}})
}

fn shots_of_sequence() -> Value {
    json!({"{shot}": task_leaf()})
}

fn sequences_with_shots() -> Value {
    json!({"{sequence}": shots_of_sequence()})
}

fn assets_tree() -> Value {
    json!({"{asset_type}": {"{asset_name}": task_leaf()}})
}

/// Directory schema of a project, per production type.
pub fn project_tree(production_type: ProductionType) -> Value {
    let mut tree = match production_type {
        ProductionType::Film => json!({
            "film": sequences_with_shots(),
            "assets": assets_tree(),
        }),
        ProductionType::Tv => json!({
            "{episode}": sequences_with_shots(),
            "assets": assets_tree(),
        }),
        ProductionType::ShotsOnly => json!({
            "shots": {"{shot}": task_leaf()},
        }),
        ProductionType::AssetsOnly => json!({
            "assets": assets_tree(),
        }),
        ProductionType::Custom => json!({
            "{episode}": sequences_with_shots(),
            "film": sequences_with_shots(),
            "assets": assets_tree(),
        }),
    };
    if let Some(obj) = tree.as_object_mut() {
        obj.insert(
            "shared".to_string(),
            json!({"lut": {}, "docs": {}, "reference": {}}),
        );
    }
    tree
}

fn insert(data: &mut DataDict, key: &str, value: impl Into<Value>) {
    data.insert(key.to_string(), value.into());
}

fn opt(value: &Option<String>) -> Value {
    value.as_deref().map_or(Value::Null, Value::from)
}

/// Project-level keys every descendant inherits.
fn inherited(frame: &ContextFrame) -> DataDict {
    let mut data = DataDict::new();
    insert(&mut data, "project_code", opt(&frame.project_code));
    insert(&mut data, "project_path", opt(&frame.project_path));
    insert(&mut data, "production_type", frame.production_type.to_string());
    data
}

fn project(name: &str, code: Option<&str>, frame: &ContextFrame) -> DataDict {
    let code = code
        .map(str::to_lowercase)
        .unwrap_or_else(|| name.to_lowercase());
    let mut data = DataDict::new();
    insert(&mut data, "root_path", frame.root_path.clone());
    insert(&mut data, "project_code", code.clone());
    insert(&mut data, "project_path", join_path(&frame.root_path, &code));
    insert(&mut data, "production_type", frame.production_type.to_string());
    insert(&mut data, "project_tree", project_tree(frame.production_type));
    data
}

fn parent_keys(data: &mut DataDict, frame: &ContextFrame) {
    insert(
        data,
        "parent_type",
        frame.parent_type.map_or(Value::Null, |t| Value::from(t.to_string())),
    );
    insert(data, "parent_code", opt(&frame.parent_code));
    insert(data, "parent_path", opt(&frame.parent_path));
}

fn episode(name: &str, frame: &ContextFrame) -> DataDict {
    let code = name.to_lowercase();
    let mut data = inherited(frame);
    parent_keys(&mut data, frame);
    let path = join_path(frame.parent_path.as_deref().unwrap_or(""), &code);
    insert(&mut data, "episode_code", code);
    insert(&mut data, "episode_name", name);
    insert(&mut data, "episode_path", path);
    insert(&mut data, "episode_tree", sequences_with_shots());
    data
}

fn sequence(name: &str, frame: &ContextFrame) -> DataDict {
    let code = name.to_lowercase();
    let mut data = inherited(frame);
    parent_keys(&mut data, frame);
    let parent = frame.parent_path.as_deref().unwrap_or("");
    let under_film_project = frame.parent_type == Some(EntityType::Project)
        && frame.production_type == ProductionType::Film;
    let path = if under_film_project {
        join_path(&join_path(parent, "film"), &code)
    } else {
        join_path(parent, &code)
    };
    insert(&mut data, "sequence_code", code);
    insert(&mut data, "sequence_name", name);
    insert(&mut data, "sequence_path", path);
    insert(&mut data, "sequence_tree", shots_of_sequence());
    data
}

fn shot(name: &str, frame: &ContextFrame) -> DataDict {
    let code = name.to_lowercase();
    let mut data = inherited(frame);
    let sequence_path = frame.sequence_path.clone().unwrap_or_default();
    insert(&mut data, "sequence_code", opt(&frame.sequence_code));
    insert(&mut data, "sequence_path", sequence_path.clone());
    insert(&mut data, "parent_type", EntityType::Sequence.to_string());
    insert(&mut data, "shot_code", code.clone());
    insert(&mut data, "shot_name", name);
    insert(&mut data, "shot_path", join_path(&sequence_path, &code));
    insert(&mut data, "shot_tree", task_leaf());
    data
}

fn asset(name: &str, frame: &ContextFrame) -> DataDict {
    let code = name.to_lowercase();
    let mut data = inherited(frame);
    let type_path = frame.asset_type_path.clone().unwrap_or_else(|| {
        join_path(
            &join_path(frame.project_path.as_deref().unwrap_or(""), "assets"),
            &slugify(frame.asset_type_name.as_deref().unwrap_or("")),
        )
    });
    insert(&mut data, "asset_type", opt(&frame.asset_type_name));
    insert(&mut data, "asset_type_path", type_path.clone());
    insert(&mut data, "parent_type", EntityType::AssetType.to_string());
    insert(&mut data, "asset_code", code.clone());
    insert(&mut data, "asset_name", name);
    insert(&mut data, "asset_path", join_path(&type_path, &code));
    insert(&mut data, "asset_tree", task_leaf());
    data
}

/// Merge a node's `custom_data` property into `data`, unwrapping
/// `{"value": x}` entries to `x`.
pub fn merge_custom_data(data: &mut DataDict, custom: &Value) {
    let Some(obj) = custom.as_object() else {
        return;
    };
    for (k, v) in obj {
        let value = match v.as_object().and_then(|o| o.get("value")) {
            Some(inner) => inner.clone(),
            None => v.clone(),
        };
        data.insert(k.clone(), value);
    }
}
