use std::sync::Arc;
use std::time::Duration;

use activity_tracker::TrackerConfig;
use anyhow::{Context, Result};
use brain::{Brain, UnitInput};
use brain_testkit::{build_workflow, Harness};
use clap::{Arg, Command};
use serde::Deserialize;
use serde_json::json;
use state_store::StateStore;
use tokio::signal;
use tracing::{info, Level};

/// Process-level knobs that aren't part of a `Workflow` definition (spec.md
/// §9's distinction between per-workflow config and process config),
/// loaded from an optional TOML file alongside the CLI's own flags.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DemoConfig {
    units: Option<usize>,
    controller_id: Option<String>,
}

fn load_demo_config(path: &str) -> Result<DemoConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read demo config file '{path}'"))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse demo config file '{path}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let matches = Command::new("Workflow Brain demo runner")
        .version("0.1.0")
        .author("Workflow Brain Team")
        .about("Runs the sample access-point provisioning workflow end to end")
        .arg(
            Arg::new("units")
                .short('u')
                .long("units")
                .help("Number of access points to provision")
                .default_value("3"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a TOML file overriding process-level defaults"),
        )
        .get_matches();

    let file_config = match matches.get_one::<String>("config") {
        Some(path) => load_demo_config(path)?,
        None => DemoConfig::default(),
    };

    let units: usize = file_config
        .units
        .or_else(|| matches.get_one::<String>("units").and_then(|s| s.parse().ok()))
        .unwrap_or(3);
    let controller_id = file_config.controller_id.unwrap_or_else(|| "demo-controller".to_string());

    let tracker_config = TrackerConfig::load("activity-tracker")
        .context("failed to load activity-tracker configuration")?;
    info!(?tracker_config, "resolved activity tracker configuration");

    let harness = Harness::new();
    let brain = Brain::new(
        harness.state.clone(),
        harness.registry.clone(),
        harness.tracker.clone(),
        harness.events.clone(),
        "demo-worker",
    );
    brain
        .register_workflow(build_workflow())
        .context("sample workflow failed validation against the phase registry")?;

    let unit_inputs = (0..units)
        .map(|i| UnitInput { unit_id: format!("ap-{i}"), unit_number: i.to_string(), input_config: json!({}) })
        .collect();

    let job_id = brain
        .start_job(
            "provision_access_points",
            unit_inputs,
            "demo-user".into(),
            controller_id,
            "demo-venue".into(),
            "demo-tenant".into(),
            json!({}),
        )
        .await
        .context("failed to start the demo job")?;

    info!(%job_id, units, "demo job started, press Ctrl+C to cancel");

    tokio::select! {
        _ = wait_for_terminal(&brain, harness.state.clone(), job_id) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for ctrl-c")?;
            info!(%job_id, "received shutdown signal, cancelling job");
            brain.cancel_job(job_id).await.context("failed to cancel job")?;
        }
    }

    let job = harness
        .state
        .get_job(job_id)
        .await
        .context("failed to read final job state")?
        .context("job vanished from the state store")?;
    info!(%job_id, status = ?job.status, "demo job finished");
    Ok(())
}

async fn wait_for_terminal(_brain: &Arc<Brain>, state: Arc<state_store::InMemoryStateStore>, job_id: uuid::Uuid) {
    loop {
        if let Ok(Some(job)) = state.get_job(job_id).await {
            if job.status.is_terminal() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
