//! `conductor run`: reconcile one application against in-memory stores.
//!
//! Step controllers are external; `--complete-steps` stands in for them by
//! reporting success for every dispatched step at its applied generation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

use conductor_core::controller::{
    Reconcile, ReconcileAction, Reconciler, WorkQueue, WorkerPool, resync,
};
use conductor_core::event::EventBus;
use conductor_core::repository::{ApplicationRepository, ObjectReader, ObjectStore};
use conductor_core::workflow::TypedStepRenderer;
use conductor_infra::applier::ObjectStoreApplier;
use conductor_infra::config::{load_controller_config, load_controller_config_from_dir};
use conductor_infra::store::{
    InMemoryApplicationRepository, InMemoryObjectStore, InMemoryRevisionRepository,
};
use conductor_types::application::Application;
use conductor_types::condition::{Condition, ConditionStatus};
use conductor_types::event::ControllerEvent;
use conductor_types::labels::{CONDITION_WORKFLOW_FINISH, REASON_SUCCEEDED};
use conductor_types::object::{ObjectKey, TypedReference};
use conductor_types::workflow::{WorkflowStepPhase, WorkflowStepStatus};

use super::{SourceArgs, load_source};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Controller configuration (TOML). Defaults to ./conductor.toml.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Maximum number of reconciliation passes.
    #[arg(long, default_value_t = 10)]
    pub passes: usize,

    /// Report success for every dispatched workflow step.
    #[arg(long)]
    pub complete_steps: bool,

    /// Keep reconciling with the worker pool until Ctrl+C.
    #[arg(long)]
    pub watch: bool,
}

/// Build the stores and reconciler, then run passes or the worker pool.
pub async fn run(args: RunArgs, json: bool) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_controller_config(path).await,
        None => load_controller_config_from_dir(&std::env::current_dir()?).await,
    };
    let (app, renderer) = load_source(&args.source).await?;

    let store = InMemoryObjectStore::new();
    let apps = InMemoryApplicationRepository::new();
    let key = apps.upsert(&app).key();
    let events = EventBus::default();
    let mut rx = events.subscribe();

    let reconciler = Arc::new(Reconciler::new(
        &config,
        store.clone(),
        InMemoryRevisionRepository::new(),
        apps.clone(),
        renderer,
        ObjectStoreApplier::new(store.clone()),
        TypedStepRenderer::new(config.workflow.clone()),
        events,
    ));

    if args.watch {
        let queue = WorkQueue::new();
        let pool = Arc::new(WorkerPool::new(
            reconciler,
            queue.clone(),
            config.workers,
            config.conflict_backoff(),
        ));
        let cancel = CancellationToken::new();
        let runner = {
            let pool = pool.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { pool.run(cancel).await })
        };
        let resyncer = config.resync_interval().map(|period| {
            tokio::spawn(resync(apps.clone(), queue.clone(), period, cancel.clone()))
        });
        queue.add(key.clone());
        if !json {
            println!(
                "  {} Watching '{}'",
                style("⚡").bold(),
                style(&key).cyan()
            );
            println!("  {}", style("Press Ctrl+C to stop").dim());
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                received = rx.recv() => match received {
                    Ok(event) => {
                        print_event(&event, json)?;
                        if !args.complete_steps {
                            continue;
                        }
                        if let ControllerEvent::StepApplied { target, generation, .. } = &event {
                            report_success(&store, &key.namespace, target, *generation).await?;
                            queue.add(key.clone());
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event output fell behind");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        cancel.cancel();
        runner.await?;
        if let Some(resyncer) = resyncer {
            resyncer.await?;
        }
    } else {
        for pass in 1..=args.passes {
            let action = reconciler.reconcile(&key).await?;
            while let Ok(event) = rx.try_recv() {
                print_event(&event, json)?;
            }
            if !json {
                let next = match action {
                    ReconcileAction::Done => "done".to_string(),
                    ReconcileAction::RequeueAfter(delay) => {
                        format!("requeue after {}s", delay.as_secs())
                    }
                };
                println!("  {} pass {pass}: {next}", style("→").dim());
            }
            if action == ReconcileAction::Done {
                break;
            }
            if args.complete_steps {
                let app = apps.get(&key).await?;
                complete_running_steps(&store, &app).await?;
            }
        }
    }

    let app = apps.get(&key).await?;
    print_status(&app, json)?;
    Ok(())
}

/// Play the step controllers: mark every running step succeeded.
async fn complete_running_steps(store: &InMemoryObjectStore, app: &Application) -> Result<()> {
    let Some(workflow) = &app.status.workflow else {
        return Ok(());
    };
    for step in &workflow.steps {
        if step.phase != WorkflowStepPhase::Running {
            continue;
        }
        if let (Some(target), Some(generation)) = (&step.resource_ref, step.applied_generation) {
            report_success(store, app.namespace(), target, generation).await?;
        }
    }
    Ok(())
}

async fn report_success(
    store: &InMemoryObjectStore,
    namespace: &str,
    target: &TypedReference,
    generation: i64,
) -> Result<()> {
    let key = ObjectKey::new(&target.api_version, &target.kind, namespace, &target.name);
    let mut live = store.get(&key).await?;
    let condition = Condition::new(
        CONDITION_WORKFLOW_FINISH,
        ConditionStatus::True,
        REASON_SUCCEEDED,
        serde_json::json!({ "observedGeneration": generation }).to_string(),
    );
    live.set_path("status.conditions", serde_json::json!([condition]))?;
    store.update(&live).await?;
    tracing::debug!(target_ref = %target, generation, "reported step success");
    Ok(())
}

fn print_event(event: &ControllerEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    let line = match event {
        ControllerEvent::RevisionCreated { revision_name, .. } => {
            format!("revision {} created", style(revision_name).cyan())
        }
        ControllerEvent::StepApplied {
            index,
            step_type,
            generation,
            ..
        } => format!("step {index} ({step_type}) applied at generation {generation}"),
        ControllerEvent::StepPhaseChanged { index, phase, .. } => {
            format!("step {index} is now {}", phase_label(*phase))
        }
        ControllerEvent::WorkflowFinished { state, .. } => {
            format!("workflow finished: {}", style(state).bold())
        }
        ControllerEvent::AssemblyFailed {
            component, error, ..
        } => format!("{} {component}: {error}", style("✗").red()),
    };
    println!("  {} {line}", style("•").dim());
    Ok(())
}

fn print_status(app: &Application, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&app.status)?);
        return Ok(());
    }

    println!();
    let revision = app
        .status
        .latest_revision
        .as_ref()
        .map_or("-", |r| r.name.as_str());
    println!(
        "  Application '{}' at revision {}",
        style(app.key()).cyan(),
        style(revision).bold()
    );

    let Some(workflow) = &app.status.workflow else {
        for condition in &app.status.conditions {
            println!(
                "  {}: {} ({})",
                condition.condition_type,
                condition.status.as_str(),
                condition.reason
            );
        }
        println!();
        return Ok(());
    };
    println!("  Workflow: {}", style(workflow.state).bold());
    println!();

    let declared = app.spec.workflow.as_ref().map(|w| w.steps.as_slice());
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("#").fg(Color::White),
        Cell::new("Step").fg(Color::White),
        Cell::new("Type").fg(Color::White),
        Cell::new("Phase").fg(Color::White),
        Cell::new("Generation").fg(Color::White),
        Cell::new("Message").fg(Color::White),
    ]);
    for step in &workflow.steps {
        let name = declared
            .and_then(|steps| steps.get(step.index))
            .map(|s| s.name.clone())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(step.index),
            Cell::new(name).fg(Color::Cyan),
            Cell::new(&step.step_type),
            phase_cell(step),
            Cell::new(
                step.applied_generation
                    .map_or_else(|| "-".to_string(), |g| g.to_string()),
            ),
            Cell::new(step.message.as_deref().unwrap_or("")).fg(Color::DarkGrey),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

fn phase_label(phase: WorkflowStepPhase) -> &'static str {
    match phase {
        WorkflowStepPhase::Running => "running",
        WorkflowStepPhase::Succeeded => "succeeded",
        WorkflowStepPhase::Failed => "failed",
        WorkflowStepPhase::Stopped => "stopped",
    }
}

fn phase_cell(step: &WorkflowStepStatus) -> Cell {
    let color = match step.phase {
        WorkflowStepPhase::Running => Color::Yellow,
        WorkflowStepPhase::Succeeded => Color::Green,
        WorkflowStepPhase::Failed => Color::Red,
        WorkflowStepPhase::Stopped => Color::DarkGrey,
    };
    Cell::new(phase_label(step.phase)).fg(color)
}
