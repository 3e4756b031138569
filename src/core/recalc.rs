//! PT-007: Rename cascade - re-derive a step and its descendants in place.
//!
//! Only a project's remote code is regenerated on rename. Every other step
//! keeps the code it was issued; its description, paths and inherited project
//! fields follow the new names above it.

use super::codegen;
use super::context::ContextFrame;
use super::formula;
use super::sink::{LogLevel, LogSink};
use super::types::{EntityType, Plan, ProductionType};
use crate::{Error, Result};

/// Rename step `index` and recalculate it and everything below it.
/// Returns the number of steps recalculated.
pub fn rename(plan: &mut Plan, index: usize, new_name: &str, sink: &dyn LogSink) -> Result<usize> {
    let step = plan
        .get_mut(index)
        .ok_or_else(|| Error::Context(format!("no step at index {} to rename", index)))?;
    sink.log(
        LogLevel::Info,
        &format!(
            "Renaming {} '{}' to '{}'",
            step.kind.label(),
            step.name,
            new_name
        ),
    );
    step.name = new_name.to_string();
    step.params.name = new_name.to_string();

    let seed = seed_frame(plan, index);
    let mut count = 0;
    recalc_subtree(plan, index, &seed, sink, &mut count);
    Ok(count)
}

/// Rename every step currently named `old`. Returns the total recalculated.
pub fn rename_by_name(plan: &mut Plan, old: &str, new_name: &str, sink: &dyn LogSink) -> Result<usize> {
    let positions = plan.positions_by_name(old);
    if positions.is_empty() {
        return Err(Error::Context(format!("no step named '{}' to rename", old)));
    }
    let mut total = 0;
    for index in positions {
        total += rename(plan, index, new_name, sink)?;
    }
    Ok(total)
}

/// Root-level frame for the tree containing `index`, taken from the top
/// step's own data so production type and root path survive recalculation.
fn seed_frame(plan: &Plan, index: usize) -> ContextFrame {
    let top = plan.ancestors(index).last().copied().unwrap_or(index);
    let Some(step) = plan.get(top) else {
        return ContextFrame::default();
    };
    let production_type = step
        .params
        .data_str("production_type")
        .and_then(ProductionType::parse)
        .unwrap_or_default();
    let root_path = if step.kind == EntityType::Project {
        step.params.data_str("root_path").unwrap_or("")
    } else {
        ""
    };
    ContextFrame::seeded(root_path, production_type)
}

fn recalc_subtree(
    plan: &mut Plan,
    index: usize,
    seed: &ContextFrame,
    sink: &dyn LogSink,
    count: &mut usize,
) {
    recalc_step(plan, index, seed, sink);
    *count += 1;
    for child in plan.children(index) {
        recalc_subtree(plan, child, seed, sink, count);
    }
}

fn recalc_step(plan: &mut Plan, index: usize, seed: &ContextFrame, sink: &dyn LogSink) {
    let frame = ContextFrame::for_step(plan, index, seed);
    let Some(step) = plan.get_mut(index) else {
        return;
    };

    if step.kind == EntityType::Project {
        let generated = codegen::derive_project_code(&step.name);
        if let Some(w) = &generated.warning {
            sink.log(LogLevel::Warning, w);
        }
        step.params.code = Some(generated.code);
    } else if let Some(code) = &step.params.code {
        step.params.description = Some(format!("{} and {}", step.name, code));
    }

    if let Some(derived) =
        formula::derive_data(step.kind, &step.name, step.params.code.as_deref(), &frame)
    {
        let data = step.params.data.get_or_insert_with(Default::default);
        for (k, v) in derived {
            data.insert(k, v);
        }
    }
    sink.log(
        LogLevel::Debug,
        &format!("Recalculated {} '{}'", step.kind.label(), step.name),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::PlanBuilder;
    use crate::core::sink::MemorySink;
    use crate::core::types::{AuthoredNode, Settings};
    use serde_json::json;

    fn tree(project: &str) -> AuthoredNode {
        AuthoredNode::new(EntityType::Project, project)
            .with_property("root_path", "/mnt/shows")
            .with_child(
                AuthoredNode::new(EntityType::Sequence, "SQ1")
                    .with_child(AuthoredNode::new(EntityType::Shot, "SH1"))
                    .with_child(AuthoredNode::new(EntityType::Shot, "SH2")),
            )
            .with_child(
                AuthoredNode::new(EntityType::AssetType, "Character")
                    .with_child(AuthoredNode::new(EntityType::Asset, "Hero"))
                    .with_child(AuthoredNode::new(EntityType::Asset, "Villain")),
            )
    }

    fn build(project: &str) -> Plan {
        let settings = Settings::default();
        let sink = MemorySink::new();
        PlanBuilder::new(&settings, &sink).build(&tree(project), true)
    }

    #[test]
    fn test_pt007_project_rename_cascades() {
        let mut plan = build("Old");
        let before = plan.clone();
        let sink = MemorySink::new();
        let n = rename(&mut plan, 0, "New", &sink).unwrap();
        assert_eq!(n, plan.len());

        let project = &plan.steps[0];
        assert_eq!(project.name, "New");
        assert_eq!(project.params.code.as_deref(), Some("NEW"));
        assert_eq!(project.params.data_str("project_path"), Some("/mnt/shows/new"));
        assert_eq!(project.params.data_str("root_path"), Some("/mnt/shows"));

        for (i, step) in plan.iter().enumerate().skip(1) {
            assert_eq!(step.params.code, before.steps[i].params.code, "{}", step.name);
            if step.params.data.is_some() {
                assert_eq!(step.params.data_str("project_code"), Some("new"));
                assert_eq!(step.params.data_str("project_path"), Some("/mnt/shows/new"));
            }
        }
        let sh1 = plan.positions_by_name("SH1")[0];
        assert_eq!(
            plan.steps[sh1].params.data_str("shot_path"),
            Some("/mnt/shows/new/film/sq1/sh1")
        );
        assert_eq!(plan.steps[sh1].params.code.as_deref(), Some("seq01_sh01"));
    }

    #[test]
    fn test_pt007_asset_type_rename_cascades() {
        let mut plan = build("Feature");
        let at = plan.positions_by_name("Character")[0];
        let sink = MemorySink::new();
        let n = rename(&mut plan, at, "Hero Props", &sink).unwrap();
        assert_eq!(n, 3);
        for name in ["Hero", "Villain"] {
            let i = plan.positions_by_name(name)[0];
            let step = &plan.steps[i];
            assert_eq!(
                step.params.data_str("asset_type_path"),
                Some("/mnt/shows/fea/assets/hero_props")
            );
            assert_eq!(
                step.params.data_str("asset_path").unwrap(),
                format!("/mnt/shows/fea/assets/hero_props/{}", name.to_lowercase())
            );
            assert_eq!(step.params.data_str("asset_type"), Some("Hero Props"));
        }
        let hero = plan.positions_by_name("Hero")[0];
        assert_eq!(
            plan.steps[hero].params.code.as_deref(),
            Some("character_hero")
        );
    }

    #[test]
    fn test_pt007_sequence_rename_keeps_codes() {
        let mut plan = build("Feature");
        let sink = MemorySink::new();
        rename(&mut plan, 1, "Opening", &sink).unwrap();
        let seq = &plan.steps[1];
        assert_eq!(seq.params.code.as_deref(), Some("seq01"));
        assert_eq!(seq.params.description.as_deref(), Some("Opening and seq01"));
        assert_eq!(
            seq.params.data_str("sequence_path"),
            Some("/mnt/shows/fea/film/opening")
        );
        let sh2 = plan.positions_by_name("SH2")[0];
        assert_eq!(
            plan.steps[sh2].params.data_str("shot_path"),
            Some("/mnt/shows/fea/film/opening/sh2")
        );
        assert_eq!(
            plan.steps[sh2].params.data_str("sequence_code"),
            Some("opening")
        );
        assert_eq!(plan.steps[sh2].params.code.as_deref(), Some("seq01_sh02"));
    }

    #[test]
    fn test_pt007_siblings_untouched() {
        let mut plan = build("Feature");
        let before = plan.clone();
        let sink = MemorySink::new();
        rename(&mut plan, 1, "Opening", &sink).unwrap();
        let at = plan.positions_by_name("Character")[0];
        for i in at..plan.len() {
            assert_eq!(plan.steps[i], before.steps[i]);
        }
    }

    #[test]
    fn test_pt007_custom_keys_preserved() {
        let mut plan = build("Feature");
        plan.steps[1]
            .params
            .data
            .as_mut()
            .unwrap()
            .insert("client".into(), json!("ACME"));
        let sink = MemorySink::new();
        rename(&mut plan, 1, "Opening", &sink).unwrap();
        assert_eq!(plan.steps[1].params.data_str("client"), Some("ACME"));
    }

    #[test]
    fn test_pt007_unknown_index() {
        let mut plan = build("Feature");
        let sink = MemorySink::new();
        let err = rename(&mut plan, 99, "X", &sink).unwrap_err();
        assert!(matches!(err, Error::Context(_)));
    }

    #[test]
    fn test_pt007_rename_by_name() {
        let mut plan = build("Feature");
        let sink = MemorySink::new();
        assert_eq!(rename_by_name(&mut plan, "SH1", "Intro", &sink).unwrap(), 1);
        assert_eq!(plan.positions_by_name("Intro").len(), 1);
        assert!(rename_by_name(&mut plan, "Missing", "X", &sink).is_err());
    }

    #[test]
    fn test_pt007_rename_matches_fresh_build() {
        let mut plan = build("Old");
        let sink = MemorySink::new();
        rename(&mut plan, 0, "Brand New Film", &sink).unwrap();
        let fresh = build("Brand New Film");
        for (a, b) in plan.iter().zip(fresh.iter()) {
            assert_eq!(a.params.data, b.params.data, "{}", a.name);
            assert_eq!(a.params.code, b.params.code, "{}", a.name);
        }
    }
}
