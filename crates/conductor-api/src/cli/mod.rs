//! CLI command definitions for the `conductor` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod assemble;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use conductor_core::revision::RevisionTracker;
use conductor_infra::loader::{load_application, load_bundle, load_revision};
use conductor_infra::renderer::StaticComponentRenderer;
use conductor_infra::store::{InMemoryApplicationRepository, InMemoryRevisionRepository};
use conductor_types::application::Application;
use conductor_types::revision::ApplicationRevision;

/// Assemble application resources and drive their workflows.
#[derive(Parser)]
#[command(name = "conductor", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true, env = "CONDUCTOR_OTEL")]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assemble the resources of a revision and print them.
    Assemble(assemble::AssembleArgs),

    /// Reconcile an application against an in-memory store.
    Run(run::RunArgs),
}

/// Where the application and its rendered components come from.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Application manifest (YAML or JSON).
    #[arg(long)]
    pub app: PathBuf,

    /// Rendered component bundle for the application (YAML or JSON).
    #[arg(long)]
    pub bundle: PathBuf,
}

/// Load an application and the renderer serving its bundle.
pub async fn load_source(source: &SourceArgs) -> Result<(Application, StaticComponentRenderer)> {
    let app = load_application(&source.app).await?;
    let bundle = load_bundle(&source.bundle).await?;
    Ok((app, StaticComponentRenderer::from_bundle(bundle)))
}

/// Record the first revision of an application from its source files.
pub async fn revision_from_source(source: &SourceArgs) -> Result<ApplicationRevision> {
    let (app, renderer) = load_source(source).await?;
    let app = InMemoryApplicationRepository::new().upsert(&app);
    let tracker = RevisionTracker::new(InMemoryRevisionRepository::new(), renderer);
    let (revision, _) = tracker
        .ensure_current(&app)
        .await
        .with_context(|| format!("cannot record a revision for '{}'", app.key()))?;
    Ok(revision)
}

pub async fn revision_from_file(path: &Path) -> Result<ApplicationRevision> {
    Ok(load_revision(path).await?)
}
