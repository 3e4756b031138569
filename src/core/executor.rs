//! PT-008: Executor - idempotent reconciliation of a plan against a store.
//!
//! For each step in plan order: scope → get-by-name → create or reuse →
//! patch fields → merge data → ensure tasks. Failures stay with their step;
//! descendants of a failed step are skipped for missing context and every
//! other step is still attempted.

use super::sink::{section, LogLevel, LogSink};
use super::types::*;
use super::verify;
use crate::ledger::{eventlog, hasher};
use crate::store::{Entity, RemoteStore, Scope};
use crate::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Progress notification, sent before each step is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub index: usize,
    pub total: usize,
    pub kind: EntityType,
    pub name: String,
}

/// Outcome of committing a single step.
enum StepOutcome {
    Created(Entity),
    Reused(Entity),
    /// Required parent context missing.
    Skipped(String),
    Failed(String),
}

/// Commits plans to a store.
pub struct PlanExecutor<'a, S: RemoteStore + ?Sized> {
    store: &'a mut S,
    sink: &'a dyn LogSink,
    event_log: Option<PathBuf>,
    progress: Option<&'a (dyn Fn(&Progress) + Sync)>,
    run_id: String,
}

impl<'a, S: RemoteStore + ?Sized> PlanExecutor<'a, S> {
    pub fn new(store: &'a mut S, sink: &'a dyn LogSink) -> Self {
        Self {
            store,
            sink,
            event_log: None,
            progress: None,
            run_id: String::new(),
        }
    }

    /// Append commit events to `{state_dir}/events.jsonl`.
    pub fn with_event_log(mut self, state_dir: &Path) -> Self {
        self.event_log = Some(state_dir.to_path_buf());
        self
    }

    pub fn with_progress(mut self, progress: &'a (dyn Fn(&Progress) + Sync)) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Commit every step of `plan`, then verify the project if the plan has one.
    ///
    /// Step failures are reported in the [`ExecutionReport`]; only a failed
    /// post-commit verification returns `Err`.
    pub fn execute(&mut self, plan: &mut Plan) -> Result<ExecutionReport> {
        let start = Instant::now();
        self.run_id = eventlog::generate_run_id();
        let fingerprint = hasher::plan_fingerprint(plan);
        let total = plan.len();
        // handles from an earlier run must not stand in for this run's parents
        for step in plan.steps.iter_mut() {
            step.created_entity = None;
            step.fetched_data = None;
        }

        section(self.sink, "Executing Plan");
        self.record(CommitEvent::CommitStarted {
            run_id: self.run_id.clone(),
            root: plan.get(0).map(|s| s.name.clone()).unwrap_or_default(),
            fingerprint: fingerprint.clone(),
            steps: total as u32,
            prodtree_version: env!("CARGO_PKG_VERSION").to_string(),
        });

        let mut report = ExecutionReport {
            total: total as u32,
            fingerprint,
            ..ExecutionReport::default()
        };

        for index in 0..total {
            let step = &plan.steps[index];
            let (kind, name) = (step.kind, step.name.clone());
            if let Some(progress) = self.progress {
                progress(&Progress {
                    index,
                    total,
                    kind,
                    name: name.clone(),
                });
            }

            match self.commit_step(plan, index) {
                StepOutcome::Created(entity) => {
                    report.created += 1;
                    self.committed(plan, index, entity, true);
                }
                StepOutcome::Reused(entity) => {
                    report.reused += 1;
                    self.committed(plan, index, entity, false);
                }
                StepOutcome::Skipped(reason) => {
                    report.skipped += 1;
                    self.sink.log(
                        LogLevel::Error,
                        &format!("Skipping {} '{}': {}", kind.label(), name, reason),
                    );
                    self.record(CommitEvent::StepSkipped {
                        run_id: self.run_id.clone(),
                        kind,
                        name,
                        reason,
                    });
                }
                StepOutcome::Failed(error) => {
                    report.failed += 1;
                    self.sink.log(
                        LogLevel::Error,
                        &format!("✗ Failed: {} '{}': {}", kind.label(), name, error),
                    );
                    self.record(CommitEvent::StepFailed {
                        run_id: self.run_id.clone(),
                        kind,
                        name,
                        error,
                    });
                }
            }
        }

        report.duration_seconds = start.elapsed().as_secs_f64();
        self.record(CommitEvent::CommitCompleted {
            run_id: self.run_id.clone(),
            created: report.created,
            reused: report.reused,
            skipped: report.skipped,
            failed: report.failed,
            total_seconds: report.duration_seconds,
        });
        self.sink.log(
            LogLevel::Info,
            &format!(
                "Committed {}/{} steps ({} created, {} reused, {} skipped, {} failed) in {:.2}s",
                report.succeeded(),
                report.total,
                report.created,
                report.reused,
                report.skipped,
                report.failed,
                report.duration_seconds
            ),
        );

        if let Some(project) = plan.project_step().map(|s| s.name.clone()) {
            match verify::verify_project(&*self.store, &project, self.sink) {
                Ok(summary) => report.verification = Some(summary),
                Err(e) => {
                    self.record(CommitEvent::VerificationFailed {
                        run_id: self.run_id.clone(),
                        project: project.clone(),
                    });
                    return Err(match e {
                        Error::Verification(_) => e,
                        other => Error::Verification(format!(
                            "project '{}' could not be read back: {}",
                            project, other
                        )),
                    });
                }
            }
        }

        Ok(report)
    }

    fn committed(&mut self, plan: &mut Plan, index: usize, entity: Entity, created: bool) {
        let step = &mut plan.steps[index];
        self.sink.log(
            LogLevel::Success,
            &format!("✓ Processed: {} '{}'", step.kind.label(), step.name),
        );
        self.record(CommitEvent::StepCommitted {
            run_id: self.run_id.clone(),
            kind: step.kind,
            name: step.name.clone(),
            entity_id: entity.id.clone(),
            created,
        });
        step.created_entity = Some(entity);
    }

    fn commit_step(&mut self, plan: &Plan, index: usize) -> StepOutcome {
        let scope = match resolve_scope(plan, index) {
            Ok(scope) => scope,
            Err(e) => return StepOutcome::Skipped(e.to_string()),
        };
        match self.reconcile(&plan.steps[index], &scope) {
            Ok((entity, true)) => StepOutcome::Created(entity),
            Ok((entity, false)) => StepOutcome::Reused(entity),
            Err(e) => StepOutcome::Failed(e.to_string()),
        }
    }

    /// Get-or-create, then patch. Returns the entity and whether it was created.
    fn reconcile(&mut self, step: &PlanStep, scope: &Scope) -> Result<(Entity, bool)> {
        let label = step.kind.label();
        let (mut entity, created) = match self.store.get_by_name(step.kind, scope, &step.name)? {
            Some(existing) => {
                self.sink
                    .log(LogLevel::Info, &format!("Found {}: {}", label, step.name));
                (existing, false)
            }
            None => {
                let entity =
                    self.store
                        .create(step.kind, scope, &step.name, &step.params.create_fields)?;
                self.sink
                    .log(LogLevel::Info, &format!("Created {}: {}", label, step.name));
                (entity, true)
            }
        };

        let mut patch = step.params.fields.clone();
        match (&step.params.code, entity.code().filter(|c| !c.is_empty())) {
            (Some(planned), Some(issued)) if !created && planned != issued => {
                self.sink.log(
                    LogLevel::Debug,
                    &format!("Keeping code {} on {} '{}' (planned {})", issued, label, step.name, planned),
                );
            }
            (Some(code), _) => {
                patch.insert("code".into(), Value::from(code.as_str()));
            }
            (None, _) => {}
        }
        if let Some(description) = &step.params.description {
            patch.insert("description".into(), Value::from(description.as_str()));
        }
        if !patch.is_empty() {
            entity = self.store.update_fields(&entity.id, &patch)?;
        }

        if let Some(data) = step.params.data.as_ref().filter(|d| !d.is_empty()) {
            entity = self.store.update_data(&entity.id, data)?;
        }

        for task in &step.params.tasks {
            let verb = if self.store.ensure_task(&entity.id, task)? {
                "created"
            } else {
                "exists"
            };
            self.sink.log(
                LogLevel::Info,
                &format!("  Task {}: {} on {}", verb, task, step.name),
            );
        }
        if !step.params.tasks.is_empty() {
            entity = self.store.get(&entity.id)?.unwrap_or(entity);
        }

        Ok((entity, created))
    }

    fn record(&self, event: CommitEvent) {
        let Some(dir) = &self.event_log else {
            return;
        };
        if let Err(e) = eventlog::append_event(dir, event) {
            tracing::warn!(error = %e, "cannot append commit event");
        }
    }
}

/// Store scope for step `index`, from its committed ancestors.
fn resolve_scope(plan: &Plan, index: usize) -> Result<Scope> {
    let step = &plan.steps[index];
    let ancestor = |kind: EntityType| -> Result<Option<&Entity>> {
        match plan.nearest_ancestor(index, kind) {
            None => Ok(None),
            Some(i) => plan.steps[i].created_entity.as_ref().map(Some).ok_or_else(|| {
                Error::Context(format!(
                    "{} '{}' was not committed",
                    kind, plan.steps[i].name
                ))
            }),
        }
    };
    let required = |kind: EntityType| -> Result<&Entity> {
        ancestor(kind)?.ok_or_else(|| {
            Error::Context(format!(
                "{} '{}' has no {} in the plan",
                step.kind, step.name, kind
            ))
        })
    };

    Ok(match step.kind {
        EntityType::Project | EntityType::AssetType => Scope::global(),
        EntityType::Episode => Scope::project(required(EntityType::Project)?),
        EntityType::Sequence => {
            let project = required(EntityType::Project)?;
            match ancestor(EntityType::Episode)? {
                Some(episode) => Scope::child(project, episode),
                None => Scope::project(project),
            }
        }
        EntityType::Shot => Scope::child(
            required(EntityType::Project)?,
            required(EntityType::Sequence)?,
        ),
        EntityType::Asset => Scope::child(
            required(EntityType::Project)?,
            required(EntityType::AssetType)?,
        ),
    })
}

/// Commit-time name check on the plan's project.
///
/// The project name must not be blank; unless `allow_existing` is set the
/// project must not already be in the store.
pub fn preflight<S: RemoteStore + ?Sized>(
    plan: &Plan,
    store: &S,
    allow_existing: bool,
) -> Result<()> {
    let Some(project) = plan.project_step() else {
        return Ok(());
    };
    if project.name.trim().is_empty() {
        return Err(Error::Input("project name is blank".to_string()));
    }
    if !allow_existing
        && store
            .get_by_name(EntityType::Project, &Scope::global(), &project.name)?
            .is_some()
    {
        return Err(Error::Input(format!(
            "project '{}' already exists in the store",
            project.name
        )));
    }
    Ok(())
}
