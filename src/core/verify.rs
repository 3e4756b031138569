//! PT-009: Post-commit verification and live re-fetch.

use super::sink::{section, LogLevel, LogSink};
use super::types::{EntityType, Plan, SequenceSummary, ShotSummary, VerificationSummary};
use crate::store::{RemoteStore, Scope};
use crate::{Error, Result};
use serde_json::Value;

/// Project fields echoed in the verification summary.
const SUMMARY_FIELDS: &[&str] = &["resolution", "fps", "ratio", "start_date", "end_date"];

/// Read a project back from the store and report what it holds.
pub fn verify_project<S: RemoteStore + ?Sized>(
    store: &S,
    name: &str,
    sink: &dyn LogSink,
) -> Result<VerificationSummary> {
    section(sink, "Verifying Project Data");
    let project = store
        .get_by_name(EntityType::Project, &Scope::global(), name)?
        .ok_or_else(|| Error::Verification(format!("project '{}' not found", name)))?;

    sink.log(
        LogLevel::Success,
        &format!("PROJECT FOUND: {} ({})", project.name, project.id),
    );
    let production_type = project.field_str("production_type").map(str::to_string);
    let production_style = project.field_str("production_style").map(str::to_string);
    sink.log(
        LogLevel::Info,
        &format!(
            "Type: {} | Style: {}",
            production_type.as_deref().unwrap_or("-"),
            production_style.as_deref().unwrap_or("-")
        ),
    );

    let params: serde_json::Map<String, Value> = SUMMARY_FIELDS
        .iter()
        .map(|k| {
            let v = project
                .fields
                .get(*k)
                .or_else(|| project.data.get(*k))
                .cloned()
                .unwrap_or(Value::Null);
            ((*k).to_string(), v)
        })
        .collect();
    sink.log(
        LogLevel::Info,
        &format!("Parameters: {}", serde_json::to_string_pretty(&params)?),
    );

    let scope = Scope::project(&project);
    let episodes = store.list(EntityType::Episode, &scope)?;
    sink.log(LogLevel::Info, &format!("Episodes: {}", episodes.len()));

    let mut sequences = Vec::new();
    for seq in store.list(EntityType::Sequence, &scope)? {
        sink.log(LogLevel::Info, &format!("Sequence: {}", seq.name));
        let shots = store
            .list(EntityType::Shot, &Scope::child(&project, &seq))?
            .into_iter()
            .map(|shot| {
                let summary = ShotSummary {
                    frame_in: shot.int_field("frame_in"),
                    frame_out: shot.int_field("frame_out"),
                    name: shot.name,
                };
                sink.log(
                    LogLevel::Info,
                    &format!(
                        "  Shot: {} [Frames: {}-{}]",
                        summary.name,
                        frame_label(summary.frame_in),
                        frame_label(summary.frame_out)
                    ),
                );
                summary
            })
            .collect();
        sequences.push(SequenceSummary {
            name: seq.name,
            shots,
        });
    }

    let assets = store.list(EntityType::Asset, &scope)?;
    sink.log(LogLevel::Info, &format!("Assets: {}", assets.len()));

    Ok(VerificationSummary {
        project: project.name.clone(),
        project_id: project.id.clone(),
        production_type,
        production_style,
        episodes: episodes.len(),
        sequences,
        assets: assets.len(),
    })
}

fn frame_label(frame: Option<i64>) -> String {
    frame.map_or_else(|| "?".to_string(), |f| f.to_string())
}

/// Re-read every committed step into `fetched_data`. Returns how many were
/// refreshed; read failures are logged and skipped.
pub fn refresh_fetched<S: RemoteStore + ?Sized>(
    plan: &mut Plan,
    store: &S,
    sink: &dyn LogSink,
) -> usize {
    let mut refreshed = 0;
    for step in plan.steps.iter_mut() {
        let Some(id) = step.created_entity.as_ref().map(|e| e.id.clone()) else {
            continue;
        };
        match store.get(&id) {
            Ok(Some(entity)) => {
                step.fetched_data = Some(entity);
                refreshed += 1;
            }
            Ok(None) => sink.log(
                LogLevel::Warning,
                &format!("{} '{}' vanished from the store", step.kind.label(), step.name),
            ),
            Err(e) => sink.log(
                LogLevel::Warning,
                &format!("Could not re-fetch {} '{}': {}", step.kind.label(), step.name, e),
            ),
        }
    }
    refreshed
}
