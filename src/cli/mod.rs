//! PT-017: CLI subcommands - init, validate, plan, apply, status, history.

use crate::core::executor::{self, PlanExecutor};
use crate::core::sink::{LogSink, TracingSink};
use crate::core::types::{
    CommitEvent, EntityType, ExecutionReport, HierarchyFile, Plan, VerificationSummary,
};
use crate::core::worker::{self, CommitOptions, WorkerEvent};
use crate::core::{parser, planner::PlanBuilder, recalc, verify};
use crate::ledger::{eventlog, hasher};
use crate::store::{FileStore, RemoteError, RemoteStore};
use crate::{Error, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new hierarchy file and state directory
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate a hierarchy file without touching the store
    Validate {
        /// Path to hierarchy.yaml
        #[arg(short, long, default_value = "hierarchy.yaml")]
        file: PathBuf,
    },

    /// Compile the hierarchy and show the commit plan
    Plan {
        /// Path to hierarchy.yaml
        #[arg(short, long, default_value = "hierarchy.yaml")]
        file: PathBuf,

        /// Plan the root node only, without descendants
        #[arg(long)]
        selected: bool,

        /// Rename a node before committing (OLD=NEW, repeatable)
        #[arg(long, value_name = "OLD=NEW")]
        rename: Vec<String>,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,

        /// State directory to pre-fetch existing codes from
        #[arg(long)]
        state_dir: Option<PathBuf>,
    },

    /// Commit the plan to the store
    Apply {
        /// Path to hierarchy.yaml
        #[arg(short, long, default_value = "hierarchy.yaml")]
        file: PathBuf,

        /// State directory holding the store and event log
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Commit the root node only, without descendants
        #[arg(long)]
        selected: bool,

        /// Rename a node before committing (OLD=NEW, repeatable)
        #[arg(long, value_name = "OLD=NEW")]
        rename: Vec<String>,

        /// Update a project that already exists in the store
        #[arg(long)]
        reuse_existing: bool,

        /// Run the commit on a background worker
        #[arg(long)]
        background: bool,
    },

    /// Verify projects held in the store
    Status {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,

        /// Only this project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Show the commit event log
    History {
        /// State directory
        #[arg(long, default_value = "state")]
        state_dir: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Plan {
            file,
            selected,
            rename,
            json,
            state_dir,
        } => cmd_plan(&file, state_dir.as_deref(), selected, &rename, json),
        Commands::Apply {
            file,
            state_dir,
            selected,
            rename,
            reuse_existing,
            background,
        } => cmd_apply(
            &file,
            &state_dir,
            &ApplyFlags {
                selected,
                renames: rename,
                reuse_existing,
                background,
            },
        ),
        Commands::Status { state_dir, project } => cmd_status(&state_dir, project.as_deref()),
        Commands::History { state_dir } => cmd_history(&state_dir),
    }
}

const STARTER_HIERARCHY: &str = r#"version: "1.0"

settings:
  root_path: /mnt/nas/projects
  production_style: 2d3d
  default_production_type: film
  shot_tasks: [Compositing]

root:
  type: project
  name: My Feature
  properties:
    production_type: film
    fps: 24
    resolution: 1920x1080
  children:
    - type: sequence
      name: SQ010
      children:
        - type: shot
          name: SH010
          properties: {frame_in: 1001, frame_out: 1100}
    - type: asset_type
      name: Character
      children:
        - type: asset
          name: Hero
          properties:
            tasks: [Modeling, Rigging]
"#;

fn cmd_init(path: &Path) -> Result<()> {
    let hierarchy_path = path.join("hierarchy.yaml");
    if hierarchy_path.exists() {
        return Err(Error::Input(format!(
            "{} already exists",
            hierarchy_path.display()
        )));
    }

    let state_dir = path.join("state");
    std::fs::create_dir_all(&state_dir)?;
    std::fs::write(&hierarchy_path, STARTER_HIERARCHY)?;

    println!("Initialized prodtree project at {}", path.display());
    println!("  Created: {}", hierarchy_path.display());
    println!("  Created: {}/", state_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<()> {
    let hierarchy = parser::parse_hierarchy_file(file)?;
    let errors = parser::validate_hierarchy(&hierarchy);

    if errors.is_empty() {
        println!(
            "OK: {} ({} nodes, {} template)",
            hierarchy.root.name,
            hierarchy.root.count(),
            parser::template_for(&hierarchy)
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(Error::Input(format!("{} validation error(s)", errors.len())))
    }
}

/// Split `OLD=NEW`.
fn parse_rename(arg: &str) -> Result<(String, String)> {
    match arg.split_once('=') {
        Some((old, new)) if !old.trim().is_empty() && !new.trim().is_empty() => {
            Ok((old.trim().to_string(), new.trim().to_string()))
        }
        _ => Err(Error::Input(format!(
            "rename must look like OLD=NEW, got '{}'",
            arg
        ))),
    }
}

/// Load, validate, build and apply renames.
fn compile(
    file: &Path,
    store: Option<&dyn RemoteStore>,
    selected: bool,
    renames: &[String],
    sink: &dyn LogSink,
) -> Result<(HierarchyFile, Plan)> {
    let hierarchy = parser::load_hierarchy(file)?;
    let mut builder = PlanBuilder::new(&hierarchy.settings, sink);
    if let Some(store) = store {
        builder = builder.with_store(store);
    }
    let mut plan = builder.build(&hierarchy.root, !selected);
    for arg in renames {
        let (old, new) = parse_rename(arg)?;
        recalc::rename_by_name(&mut plan, &old, &new, sink)?;
    }
    Ok((hierarchy, plan))
}

fn cmd_plan(
    file: &Path,
    state_dir: Option<&Path>,
    selected: bool,
    renames: &[String],
    json: bool,
) -> Result<()> {
    let sink = TracingSink;
    let store = match state_dir {
        Some(dir) if FileStore::exists(dir) => Some(FileStore::open(dir)?),
        _ => None,
    };
    let (_, plan) = compile(
        file,
        store.as_ref().map(|s| s as &dyn RemoteStore),
        selected,
        renames,
        &sink,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(())
}

/// Display a plan as an indented tree.
fn print_plan(plan: &Plan) {
    let root = plan.get(0).map(|s| s.name.as_str()).unwrap_or("-");
    println!("Planning: {} ({} steps)", root, plan.len());
    println!();
    for (index, step) in plan.iter().enumerate() {
        let indent = "  ".repeat(plan.depth(index) + 1);
        let code = step
            .params
            .code
            .as_deref()
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();
        let path = step
            .params
            .data_str(&format!("{}_path", step.kind))
            .map(|p| format!("  {}", p))
            .unwrap_or_default();
        println!("{}+ {} {}{}{}", indent, step.kind, step.name, code, path);
    }
    println!();
    println!("Totals: {}", plan_totals(plan));
    println!("Fingerprint: {}", hasher::plan_fingerprint(plan));
}

/// Per-type step counts, e.g. `1 project, 2 sequence, 5 shot`.
fn plan_totals(plan: &Plan) -> String {
    let parts: Vec<String> = EntityType::ALL
        .iter()
        .map(|&kind| (kind, plan.count_of(kind)))
        .filter(|&(_, n)| n > 0)
        .map(|(kind, n)| format!("{} {}", n, kind))
        .collect();
    if parts.is_empty() {
        "empty".to_string()
    } else {
        parts.join(", ")
    }
}

struct ApplyFlags {
    selected: bool,
    renames: Vec<String>,
    reuse_existing: bool,
    background: bool,
}

fn cmd_apply(file: &Path, state_dir: &Path, flags: &ApplyFlags) -> Result<()> {
    let sink = TracingSink;
    std::fs::create_dir_all(state_dir)?;
    let mut store = FileStore::open(state_dir)?;
    let (hierarchy, mut plan) = compile(
        file,
        Some(&store as &dyn RemoteStore),
        flags.selected,
        &flags.renames,
        &sink,
    )?;
    executor::preflight(&plan, &store, flags.reuse_existing)?;

    let event_log = hierarchy.settings.event_log.then(|| state_dir.to_path_buf());
    let report = if flags.background {
        run_background(plan, store, event_log)?
    } else {
        let mut executor = PlanExecutor::new(&mut store, &sink);
        if let Some(dir) = &event_log {
            executor = executor.with_event_log(dir);
        }
        let report = executor.execute(&mut plan)?;
        verify::refresh_fetched(&mut plan, &store, &sink);
        report
    };

    print_report(&report);
    if report.failed > 0 {
        return Err(Error::Remote(RemoteError(format!(
            "{} step(s) failed",
            report.failed
        ))));
    }
    if report.skipped > 0 {
        return Err(Error::Context(format!(
            "{} step(s) skipped for missing parent context",
            report.skipped
        )));
    }
    Ok(())
}

fn run_background(
    plan: Plan,
    store: FileStore,
    event_log: Option<PathBuf>,
) -> Result<ExecutionReport> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async move {
        let options = CommitOptions {
            event_log,
            refresh: true,
        };
        let mut handle = worker::spawn_commit(plan, store, options);
        let sink = TracingSink;
        let mut outcome = Err(Error::Worker("worker ended without a result".to_string()));
        while let Some(event) = handle.next_event().await {
            match event {
                WorkerEvent::Progress {
                    index,
                    total,
                    message,
                } => println!("[{}/{}] {}", index + 1, total, message),
                WorkerEvent::Log { level, message } => sink.log(level, &message),
                WorkerEvent::Finished { report, .. } => outcome = Ok(report),
                WorkerEvent::Failed(message) => outcome = Err(Error::Verification(message)),
            }
        }
        handle.join().await?;
        outcome
    })
}

fn print_report(report: &ExecutionReport) {
    println!();
    println!(
        "Commit {}: {} created, {} reused, {} skipped, {} failed ({:.2}s)",
        if report.is_success() {
            "complete"
        } else {
            "completed with errors"
        },
        report.created,
        report.reused,
        report.skipped,
        report.failed,
        report.duration_seconds
    );
    if let Some(summary) = &report.verification {
        print_summary(summary);
    }
}

fn print_summary(summary: &VerificationSummary) {
    println!(
        "Project: {} ({}) type={} style={}",
        summary.project,
        summary.project_id,
        summary.production_type.as_deref().unwrap_or("-"),
        summary.production_style.as_deref().unwrap_or("-")
    );
    println!("  Episodes: {}", summary.episodes);
    for seq in &summary.sequences {
        println!("  Sequence {} ({} shots)", seq.name, seq.shots.len());
    }
    println!("  Assets: {}", summary.assets);
}

fn cmd_status(state_dir: &Path, project: Option<&str>) -> Result<()> {
    if !FileStore::exists(state_dir) {
        return Err(Error::Input(format!(
            "no store in {} (run apply first)",
            state_dir.display()
        )));
    }
    let store = FileStore::open(state_dir)?;
    let sink = TracingSink;
    let names: Vec<String> = match project {
        Some(name) => vec![name.to_string()],
        None => store.all_projects()?.into_iter().map(|p| p.name).collect(),
    };
    if names.is_empty() {
        println!("No projects in {}", state_dir.display());
    }
    for name in names {
        let summary = verify::verify_project(&store, &name, &sink)?;
        print_summary(&summary);
    }
    Ok(())
}

fn cmd_history(state_dir: &Path) -> Result<()> {
    let events = eventlog::read_events(state_dir)?;
    if events.is_empty() {
        println!("No commit events in {}", state_dir.display());
        return Ok(());
    }
    for te in &events {
        println!("{} {}", te.ts, describe_event(&te.event));
    }
    Ok(())
}

fn describe_event(event: &CommitEvent) -> String {
    match event {
        CommitEvent::CommitStarted {
            run_id,
            root,
            steps,
            ..
        } => format!("{} started: {} ({} steps)", run_id, root, steps),
        CommitEvent::StepCommitted {
            run_id,
            kind,
            name,
            created,
            ..
        } => format!(
            "{} {} {} '{}'",
            run_id,
            if *created { "created" } else { "reused" },
            kind,
            name
        ),
        CommitEvent::StepSkipped {
            run_id,
            kind,
            name,
            reason,
        } => format!("{} skipped {} '{}': {}", run_id, kind, name, reason),
        CommitEvent::StepFailed {
            run_id,
            kind,
            name,
            error,
        } => format!("{} FAILED {} '{}': {}", run_id, kind, name, error),
        CommitEvent::CommitCompleted {
            run_id,
            created,
            reused,
            skipped,
            failed,
            total_seconds,
        } => format!(
            "{} completed: {} created, {} reused, {} skipped, {} failed ({:.2}s)",
            run_id, created, reused, skipped, failed, total_seconds
        ),
        CommitEvent::VerificationFailed { run_id, project } => {
            format!("{} verification FAILED for '{}'", run_id, project)
        }
    }
}
