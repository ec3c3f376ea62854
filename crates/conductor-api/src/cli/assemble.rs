//! `conductor assemble`: run the Resource Assembler over one revision.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use conductor_core::assemble::Assembler;
use conductor_core::assemble::options::option_chain;
use conductor_infra::config::load_controller_config;
use conductor_infra::store::InMemoryObjectStore;
use conductor_types::config::ControllerConfig;
use conductor_types::labels::{LABEL_APP_COMPONENT, LABEL_RESOURCE_TYPE};

use super::{SourceArgs, revision_from_file, revision_from_source};

#[derive(Args, Debug)]
pub struct AssembleArgs {
    /// Recorded revision (YAML or JSON). Mutually exclusive with --app/--bundle.
    #[arg(conflicts_with_all = ["app", "bundle"], required_unless_present = "app")]
    pub revision: Option<PathBuf>,

    /// Application manifest; a first revision is recorded from it.
    #[arg(long, requires = "bundle")]
    pub app: Option<PathBuf>,

    /// Rendered component bundle for --app.
    #[arg(long, requires = "app")]
    pub bundle: Option<PathBuf>,

    /// Controller configuration (TOML). Defaults apply when omitted.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Assemble and print the resources. Fails when any component failed.
pub async fn assemble(args: AssembleArgs, json: bool) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_controller_config(path).await,
        None => ControllerConfig::default(),
    };
    let revision = match (&args.revision, &args.app, &args.bundle) {
        (Some(path), _, _) => revision_from_file(path).await?,
        (None, Some(app), Some(bundle)) => {
            let source = SourceArgs {
                app: app.clone(),
                bundle: bundle.clone(),
            };
            revision_from_source(&source).await?
        }
        _ => bail!("either a revision file or --app with --bundle is required"),
    };

    // Offline: external releases are never found in an empty store.
    let assembler = Assembler::new(option_chain(&config.assemble, InMemoryObjectStore::new()));
    let manifests = assembler.assemble(&revision).await;
    let resources = manifests.assembled_manifests();
    let failures = manifests.failures();

    if json {
        let scopes: serde_json::Map<String, serde_json::Value> = manifests
            .grouped()
            .scopes
            .iter()
            .map(|(workload, scopes)| {
                let names = scopes.iter().map(|s| serde_json::Value::String(s.to_string())).collect();
                (workload.to_string(), serde_json::Value::Array(names))
            })
            .collect();
        let output = serde_json::json!({
            "revision": revision.name,
            "resources": resources,
            "scopes": scopes,
            "failures": failures
                .iter()
                .map(|(component, e)| serde_json::json!({
                    "component": component,
                    "error": e.to_string(),
                    "retryable": e.is_retryable(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        println!(
            "  Revision '{}' ({} resources)",
            style(&revision.name).cyan(),
            resources.len()
        );
        println!();

        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Component").fg(Color::White),
            Cell::new("Role").fg(Color::White),
            Cell::new("Kind").fg(Color::White),
            Cell::new("Name").fg(Color::White),
        ]);
        for resource in &resources {
            let labels = resource.labels();
            let label = |key: &str| labels.get(key).cloned().unwrap_or_default();
            table.add_row(vec![
                Cell::new(label(LABEL_APP_COMPONENT)).fg(Color::Cyan),
                Cell::new(label(LABEL_RESOURCE_TYPE)).fg(Color::DarkGrey),
                Cell::new(format!("{}/{}", resource.api_version(), resource.kind())),
                Cell::new(resource.name()),
            ]);
        }
        println!("{table}");

        for (component, error) in &failures {
            println!(
                "  {} {}: {}",
                style("✗").red(),
                style(component).bold(),
                error
            );
        }
        println!();
    }

    if !failures.is_empty() {
        bail!("{} component(s) failed to assemble", failures.len());
    }
    Ok(())
}
