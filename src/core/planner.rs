//! PT-006: Plan building - authored tree to an ordered commit plan.

use super::codegen::{self, Generated};
use super::context::{ContextFrame, ExistingCodes, IssuedCode};
use super::formula;
use super::rules::{self, Template};
use super::sink::{LogLevel, LogSink};
use super::types::*;
use crate::store::{RemoteStore, Scope};
use crate::Error;
use serde_json::Value;

/// Project property keys copied into optional fields.
const PROJECT_FIELDS: &[&str] = &[
    "fps",
    "ratio",
    "resolution",
    "start_date",
    "end_date",
    "file_tree",
];

/// Shot property keys passed through to `create`.
const SHOT_CREATE_FIELDS: &[&str] = &["frame_in", "frame_out", "nb_frames"];

/// Episode and sequence numbers handed out during one build pass.
#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    episode: u32,
    sequence: u32,
}

/// Compiles an authored tree into a [`Plan`].
pub struct PlanBuilder<'a> {
    settings: &'a Settings,
    store: Option<&'a dyn RemoteStore>,
    sink: &'a dyn LogSink,
    counters: Counters,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(settings: &'a Settings, sink: &'a dyn LogSink) -> Self {
        Self {
            settings,
            store: None,
            sink,
            counters: Counters::default(),
        }
    }

    /// Pre-fetch existing episode/sequence codes from this store.
    pub fn with_store(mut self, store: &'a dyn RemoteStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Build a plan rooted at `root`. With `include_descendants` false the
    /// plan holds the root alone.
    pub fn build(&mut self, root: &AuthoredNode, include_descendants: bool) -> Plan {
        self.counters = Counters::default();

        let production_type = self.production_type_of(root);
        let template = if root.kind == EntityType::Project {
            Template::for_production(production_type)
        } else {
            Template::Custom
        };
        let root_path = root
            .property_str("root_path")
            .unwrap_or(&self.settings.root_path);
        let seed = ContextFrame::seeded(root_path, production_type)
            .with_existing(self.prefetch(root));

        let role = if include_descendants {
            StepRole::Context
        } else {
            StepRole::Selected
        };
        let root_frame = if root.kind == EntityType::Shot {
            seed.next_shot()
        } else {
            seed
        };

        let mut plan = Plan::new();
        let step = self.resolve(root, &root_frame, role, None);
        let index = plan.push(step);
        if include_descendants {
            let frame = root_frame.descend(&plan.steps[index]);
            self.collect_children(root, index, &frame, template, &mut plan);
        }
        plan
    }

    fn collect_children(
        &mut self,
        node: &AuthoredNode,
        parent: usize,
        frame: &ContextFrame,
        template: Template,
        plan: &mut Plan,
    ) {
        let mut shot_cursor = frame.clone();
        for child in &node.children {
            if !rules::allows_child(template, node.kind, child.kind) {
                let err = Error::Context(format!(
                    "{} '{}' is not allowed under {} '{}' ({}), skipping subtree",
                    child.kind, child.name, node.kind, node.name, template
                ));
                self.sink.log(LogLevel::Error, &err.to_string());
                continue;
            }

            let child_frame = if child.kind == EntityType::Shot {
                shot_cursor = shot_cursor.next_shot();
                shot_cursor.clone()
            } else {
                frame.clone()
            };
            let step = self.resolve(child, &child_frame, StepRole::Child, Some(parent));
            let index = plan.push(step);
            let next = child_frame.descend(&plan.steps[index]);
            self.collect_children(child, index, &next, template, plan);
        }
    }

    fn resolve(
        &mut self,
        node: &AuthoredNode,
        frame: &ContextFrame,
        role: StepRole,
        parent: Option<usize>,
    ) -> PlanStep {
        self.sink.log(
            LogLevel::Debug,
            &format!("Resolving params for {}: {}", node.kind, node.name),
        );

        let code = self.issue_code(node, frame);
        let mut data = formula::derive_data(node.kind, &node.name, code.as_deref(), frame);
        if let (Some(data), Some(custom)) = (data.as_mut(), node.properties.get("custom_data")) {
            formula::merge_custom_data(data, custom);
        }

        let description = match (node.kind, &code) {
            (EntityType::Project, _) => node.property_str("description").map(str::to_string),
            (_, Some(code)) => Some(format!("{} and {}", node.name, code)),
            (_, None) => None,
        };

        let mut params = StepParams {
            name: node.name.clone(),
            code,
            description,
            ..StepParams::default()
        };
        match node.kind {
            EntityType::Project => {
                params.create_fields.insert(
                    "production_type".into(),
                    Value::from(frame.production_type.to_string()),
                );
                let style = node
                    .property_str("production_style")
                    .unwrap_or(&self.settings.production_style);
                params
                    .create_fields
                    .insert("production_style".into(), Value::from(style));
                copy_properties(node, PROJECT_FIELDS, &mut params.fields);
            }
            EntityType::Shot => {
                copy_properties(node, SHOT_CREATE_FIELDS, &mut params.create_fields);
                params.tasks =
                    task_list(node).unwrap_or_else(|| self.settings.shot_tasks.clone());
            }
            EntityType::Asset => {
                params.tasks = task_list(node).unwrap_or_default();
            }
            EntityType::Episode | EntityType::Sequence | EntityType::AssetType => {}
        }

        if data.is_some() {
            self.sink.log(
                LogLevel::Info,
                &format!("Generated data for {} '{}'", node.kind.label(), node.name),
            );
        } else {
            self.sink.log(
                LogLevel::Info,
                &format!("Processed {} '{}' (no data)", node.kind.label(), node.name),
            );
        }
        params.data = data;

        PlanStep {
            kind: node.kind,
            name: node.name.clone(),
            role,
            parent,
            params,
            fetched_data: None,
            created_entity: None,
        }
    }

    fn issue_code(&mut self, node: &AuthoredNode, frame: &ContextFrame) -> Option<String> {
        let generated = match node.kind {
            EntityType::Project => codegen::derive_project_code(&node.name),
            EntityType::Episode => {
                if let Some(code) = frame.existing.issued(EntityType::Episode, None, &node.name) {
                    return Some(code.to_string());
                }
                let g = codegen::derive_incremental_code(
                    "ep",
                    &frame.existing.episodes,
                    self.counters.episode,
                );
                self.counters.episode += 1;
                g
            }
            EntityType::Sequence => {
                let episode = frame.episode_code.as_deref();
                if let Some(code) = frame.existing.issued(EntityType::Sequence, episode, &node.name) {
                    return Some(code.to_string());
                }
                let g = codegen::derive_incremental_code(
                    "seq",
                    &frame.existing.sequences,
                    self.counters.sequence,
                );
                self.counters.sequence += 1;
                g
            }
            EntityType::Shot => codegen::derive_shot_code(
                frame.sequence_issued_code.as_deref().unwrap_or(""),
                frame.shot_counter,
            ),
            EntityType::AssetType => return None,
            EntityType::Asset => codegen::derive_asset_code(
                frame.asset_type_name.as_deref().unwrap_or(""),
                &node.name,
            ),
        };
        Some(self.take(generated))
    }

    fn take(&self, generated: Generated) -> String {
        if let Some(w) = &generated.warning {
            self.sink.log(LogLevel::Warning, w);
        }
        generated.code
    }

    fn production_type_of(&self, root: &AuthoredNode) -> ProductionType {
        if root.kind != EntityType::Project {
            return self.settings.default_production_type;
        }
        match root.property_str("production_type") {
            None => self.settings.default_production_type,
            Some(raw) => ProductionType::parse(raw).unwrap_or_else(|| {
                self.sink.log(
                    LogLevel::Warning,
                    &format!(
                        "Unknown production type '{}' for project '{}', using custom",
                        raw, root.name
                    ),
                );
                ProductionType::Custom
            }),
        }
    }

    /// Existing episode/sequence codes of the root project, if it is already
    /// in the store.
    fn prefetch(&self, root: &AuthoredNode) -> ExistingCodes {
        let (Some(store), EntityType::Project) = (self.store, root.kind) else {
            return ExistingCodes::default();
        };
        match fetch_existing(store, &root.name) {
            Ok(existing) => {
                self.sink.log(
                    LogLevel::Debug,
                    &format!(
                        "Existing codes for '{}': {} episodes, {} sequences",
                        root.name,
                        existing.episodes.len(),
                        existing.sequences.len()
                    ),
                );
                existing
            }
            Err(e) => {
                self.sink.log(
                    LogLevel::Warning,
                    &format!("Could not fetch existing codes for '{}': {}", root.name, e),
                );
                ExistingCodes::default()
            }
        }
    }
}

fn fetch_existing(store: &dyn RemoteStore, project: &str) -> crate::Result<ExistingCodes> {
    let Some(project) = store.get_by_name(EntityType::Project, &Scope::global(), project)? else {
        return Ok(ExistingCodes::default());
    };
    let scope = Scope::project(&project);
    let episodes = store.list(EntityType::Episode, &scope)?;
    let sequences = store.list(EntityType::Sequence, &scope)?;

    let mut existing = ExistingCodes::default();
    for ep in &episodes {
        let Some(code) = ep.code() else { continue };
        existing.episodes.push(code.to_string());
        existing.issued.push(IssuedCode {
            kind: EntityType::Episode,
            episode: None,
            name: ep.name.clone(),
            code: code.to_string(),
        });
    }
    for seq in &sequences {
        let Some(code) = seq.code() else { continue };
        let episode = episodes
            .iter()
            .find(|ep| seq.parent_id.as_ref() == Some(&ep.id))
            .map(|ep| ep.name.to_lowercase());
        existing.sequences.push(code.to_string());
        existing.issued.push(IssuedCode {
            kind: EntityType::Sequence,
            episode,
            name: seq.name.clone(),
            code: code.to_string(),
        });
    }
    Ok(existing)
}

fn copy_properties(node: &AuthoredNode, keys: &[&str], into: &mut DataDict) {
    for key in keys {
        if let Some(v) = node.properties.get(*key).filter(|v| !v.is_null()) {
            into.insert((*key).to_string(), v.clone());
        }
    }
}

fn task_list(node: &AuthoredNode) -> Option<Vec<String>> {
    let tasks = node.properties.get("tasks")?.as_array()?;
    Some(
        tasks
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sink::MemorySink;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn feature() -> AuthoredNode {
        AuthoredNode::new(EntityType::Project, "Feature")
            .with_property("production_type", "film")
            .with_property("root_path", "/mnt/shows")
            .with_child(
                AuthoredNode::new(EntityType::Sequence, "SQ10")
                    .with_child(AuthoredNode::new(EntityType::Shot, "SH10")),
            )
    }

    fn build(root: &AuthoredNode, sink: &MemorySink) -> Plan {
        let settings = Settings::default();
        PlanBuilder::new(&settings, sink).build(root, true)
    }

    fn codes(plan: &Plan, kind: EntityType) -> Vec<String> {
        plan.iter()
            .filter(|s| s.kind == kind)
            .filter_map(|s| s.params.code.clone())
            .collect()
    }

    #[test]
    fn test_pt006_feature_sequence_shot() {
        let sink = MemorySink::new();
        let plan = build(&feature(), &sink);
        let kinds: Vec<EntityType> = plan.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![EntityType::Project, EntityType::Sequence, EntityType::Shot]
        );
        let project_path = plan.steps[0].params.data_str("project_path").unwrap();
        assert_eq!(project_path, "/mnt/shows/fea");
        assert_eq!(
            plan.steps[2].params.data_str("shot_path").unwrap(),
            format!("{}/film/sq10/sh10", project_path)
        );
        assert_eq!(plan.steps[0].role, StepRole::Context);
        assert_eq!(plan.steps[2].role, StepRole::Child);
        assert_eq!(plan.steps[2].parent, Some(1));
        assert_eq!(plan.steps[1].params.code.as_deref(), Some("seq01"));
        assert_eq!(plan.steps[2].params.code.as_deref(), Some("seq01_sh01"));
        assert_eq!(
            plan.steps[2].params.description.as_deref(),
            Some("SH10 and seq01_sh01")
        );
    }

    #[test]
    fn test_pt006_selected_only() {
        let sink = MemorySink::new();
        let settings = Settings::default();
        let plan = PlanBuilder::new(&settings, &sink).build(&feature(), false);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].role, StepRole::Selected);
    }

    #[test]
    fn test_pt006_parent_indices_precede_children() {
        let sink = MemorySink::new();
        let plan = build(&feature(), &sink);
        for (i, step) in plan.iter().enumerate() {
            if let Some(p) = step.parent {
                assert!(p < i);
            }
        }
    }

    #[test]
    fn test_pt006_sequence_codes_global_across_episodes() {
        let root = AuthoredNode::new(EntityType::Project, "Series")
            .with_property("production_type", "tv")
            .with_child(
                AuthoredNode::new(EntityType::Episode, "EP1")
                    .with_child(AuthoredNode::new(EntityType::Sequence, "A"))
                    .with_child(AuthoredNode::new(EntityType::Sequence, "B")),
            )
            .with_child(
                AuthoredNode::new(EntityType::Episode, "EP2")
                    .with_child(AuthoredNode::new(EntityType::Sequence, "C")),
            );
        let sink = MemorySink::new();
        let plan = build(&root, &sink);
        assert_eq!(codes(&plan, EntityType::Episode), vec!["ep01", "ep02"]);
        assert_eq!(
            codes(&plan, EntityType::Sequence),
            vec!["seq01", "seq02", "seq03"]
        );
        let c = plan.positions_by_name("C")[0];
        assert!(plan.steps[c]
            .params
            .data_str("sequence_path")
            .unwrap()
            .ends_with("/ep2/c"));
    }

    #[test]
    fn test_pt006_shot_numbering_restarts_per_sequence() {
        let root = AuthoredNode::new(EntityType::Project, "Feature")
            .with_child(
                AuthoredNode::new(EntityType::Sequence, "S1")
                    .with_child(AuthoredNode::new(EntityType::Shot, "A"))
                    .with_child(AuthoredNode::new(EntityType::Shot, "B")),
            )
            .with_child(
                AuthoredNode::new(EntityType::Sequence, "S2")
                    .with_child(AuthoredNode::new(EntityType::Shot, "C")),
            );
        let sink = MemorySink::new();
        let plan = build(&root, &sink);
        assert_eq!(
            codes(&plan, EntityType::Shot),
            vec!["seq01_sh01", "seq01_sh02", "seq02_sh01"]
        );
    }

    #[test]
    fn test_pt006_disallowed_child_skipped() {
        let root = AuthoredNode::new(EntityType::Project, "Feature")
            .with_property("production_type", "film")
            .with_child(
                AuthoredNode::new(EntityType::Episode, "EP1")
                    .with_child(AuthoredNode::new(EntityType::Sequence, "Inner")),
            )
            .with_child(AuthoredNode::new(EntityType::Sequence, "SQ1"));
        let sink = MemorySink::new();
        let plan = build(&root, &sink);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.steps[1].name, "SQ1");
        assert!(sink.contains(LogLevel::Error, "episode 'EP1' is not allowed"));
        assert_eq!(plan.steps[1].params.code.as_deref(), Some("seq01"));
    }

    #[test]
    fn test_pt006_prefetched_codes() {
        let mut store = MemoryStore::new();
        let p = store
            .create(EntityType::Project, &Scope::global(), "Feature", &DataDict::new())
            .unwrap();
        let mut fields = DataDict::new();
        fields.insert("code".into(), json!("seq05"));
        store
            .create(EntityType::Sequence, &Scope::project(&p), "Old", &fields)
            .unwrap();

        let sink = MemorySink::new();
        let settings = Settings::default();
        let plan = PlanBuilder::new(&settings, &sink)
            .with_store(&store)
            .build(&feature(), true);
        assert_eq!(plan.steps[1].params.code.as_deref(), Some("seq06"));
        assert_eq!(plan.steps[2].params.code.as_deref(), Some("seq06_sh01"));
    }

    #[test]
    fn test_pt006_rebuild_keeps_issued_codes() {
        let mut store = MemoryStore::new();
        let root = AuthoredNode::new(EntityType::Project, "Show")
            .with_property("production_type", "tv")
            .with_child(
                AuthoredNode::new(EntityType::Episode, "EP1")
                    .with_child(AuthoredNode::new(EntityType::Sequence, "SQ10")),
            )
            .with_child(
                AuthoredNode::new(EntityType::Episode, "EP2")
                    .with_child(AuthoredNode::new(EntityType::Sequence, "SQ10")),
            );
        let p = store
            .create(EntityType::Project, &Scope::global(), "Show", &DataDict::new())
            .unwrap();
        let code = |c: &str| {
            let mut fields = DataDict::new();
            fields.insert("code".into(), json!(c));
            fields
        };
        let ep1 = store
            .create(EntityType::Episode, &Scope::project(&p), "EP1", &code("ep01"))
            .unwrap();
        store
            .create(EntityType::Sequence, &Scope::child(&p, &ep1), "SQ10", &code("seq01"))
            .unwrap();

        let sink = MemorySink::new();
        let settings = Settings::default();
        let plan = PlanBuilder::new(&settings, &sink)
            .with_store(&store)
            .build(&root, true);
        assert_eq!(codes(&plan, EntityType::Episode), vec!["ep01", "ep02"]);
        // SQ10 under EP2 is a different sequence and gets a fresh number
        assert_eq!(codes(&plan, EntityType::Sequence), vec!["seq01", "seq02"]);
    }

    #[test]
    fn test_pt006_store_failure_is_warning() {
        let mut store = MemoryStore::new();
        store.set_unreachable(true);
        let sink = MemorySink::new();
        let settings = Settings::default();
        let plan = PlanBuilder::new(&settings, &sink)
            .with_store(&store)
            .build(&feature(), true);
        assert_eq!(plan.len(), 3);
        assert!(sink.contains(LogLevel::Warning, "Could not fetch existing codes"));
        assert_eq!(plan.steps[1].params.code.as_deref(), Some("seq01"));
    }

    #[test]
    fn test_pt006_unknown_production_type() {
        let root = AuthoredNode::new(EntityType::Project, "Short")
            .with_property("production_type", "short")
            .with_child(AuthoredNode::new(EntityType::Episode, "EP1"));
        let sink = MemorySink::new();
        let plan = build(&root, &sink);
        assert!(sink.contains(LogLevel::Warning, "Unknown production type 'short'"));
        assert_eq!(plan.steps[0].params.data_str("production_type"), Some("custom"));
        assert_eq!(plan.len(), 2);
    }

    #[test]
    fn test_pt006_default_production_type_from_settings() {
        let root = AuthoredNode::new(EntityType::Project, "Series")
            .with_child(AuthoredNode::new(EntityType::Episode, "EP1"));
        let settings = Settings {
            default_production_type: ProductionType::Tv,
            ..Settings::default()
        };
        let sink = MemorySink::new();
        let plan = PlanBuilder::new(&settings, &sink).build(&root, true);
        assert_eq!(plan.len(), 2);
        assert_eq!(
            plan.steps[0].params.create_fields["production_type"],
            json!("tv")
        );
        assert_eq!(
            plan.steps[0].params.data_str("project_path"),
            Some("/mnt/nas/projects/ser")
        );
    }

    #[test]
    fn test_pt006_assets() {
        let root = AuthoredNode::new(EntityType::Project, "Feature")
            .with_property("root_path", "/mnt/shows")
            .with_child(
                AuthoredNode::new(EntityType::AssetType, "Character").with_child(
                    AuthoredNode::new(EntityType::Asset, "Hero Boy")
                        .with_property("tasks", json!(["Modeling", "Rigging"])),
                ),
            );
        let sink = MemorySink::new();
        let plan = build(&root, &sink);
        let at = &plan.steps[1];
        assert!(at.params.data.is_none());
        assert!(at.params.code.is_none());
        assert!(at.params.description.is_none());
        let asset = &plan.steps[2];
        assert_eq!(asset.params.code.as_deref(), Some("character_hero_boy"));
        assert_eq!(
            asset.params.data_str("asset_path"),
            Some("/mnt/shows/fea/assets/character/hero boy")
        );
        assert_eq!(asset.params.tasks, vec!["Modeling", "Rigging"]);
        assert!(sink.contains(LogLevel::Info, "Processed Asset type 'Character' (no data)"));
    }

    #[test]
    fn test_pt006_project_fields_and_shot_properties() {
        let root = AuthoredNode::new(EntityType::Project, "Feature")
            .with_property("fps", 24)
            .with_property("resolution", "1920x1080")
            .with_property("description", "A film")
            .with_child(
                AuthoredNode::new(EntityType::Sequence, "SQ1").with_child(
                    AuthoredNode::new(EntityType::Shot, "SH1")
                        .with_property("frame_in", 1001)
                        .with_property("frame_out", 1100)
                        .with_property("custom_data", json!({"lens": {"value": "35mm"}})),
                ),
            );
        let sink = MemorySink::new();
        let plan = build(&root, &sink);
        let project = &plan.steps[0];
        assert_eq!(project.params.fields["fps"], json!(24));
        assert_eq!(project.params.fields["resolution"], json!("1920x1080"));
        assert_eq!(project.params.description.as_deref(), Some("A film"));
        assert_eq!(
            project.params.create_fields["production_style"],
            json!("2d3d")
        );
        let shot = &plan.steps[2];
        assert_eq!(shot.params.create_fields["frame_in"], json!(1001));
        assert_eq!(shot.params.create_fields["frame_out"], json!(1100));
        assert!(!shot.params.create_fields.contains_key("nb_frames"));
        assert_eq!(shot.params.tasks, vec!["Compositing"]);
        assert_eq!(shot.params.data_str("lens"), Some("35mm"));
    }

    #[test]
    fn test_pt006_log_lines() {
        let sink = MemorySink::new();
        build(&feature(), &sink);
        assert!(sink.contains(LogLevel::Debug, "Resolving params for sequence: SQ10"));
        assert!(sink.contains(LogLevel::Info, "Generated data for Shot 'SH10'"));
        assert_eq!(sink.count(LogLevel::Warning), 0);
    }

    #[test]
    fn test_pt006_counters_reset_between_builds() {
        let sink = MemorySink::new();
        let settings = Settings::default();
        let mut builder = PlanBuilder::new(&settings, &sink);
        let first = builder.build(&feature(), true);
        let second = builder.build(&feature(), true);
        assert_eq!(first, second);
    }
}
