use anyhow::{Context, Result};
use oxpilot_engine::{LogEventSink, PolicyController};
use oxpilot_metrics::MetricsProvider;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::EnvFilter;

mod cluster;
mod config;
mod policy_seed;

use cluster::ClusterApiClient;
use config::ServerConfig;
use oxpilot_common::types::PolicyEvent;

#[allow(clippy::print_stderr)]
fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  oxpilot-server [config.toml]                 Start the autoscaler");
    eprintln!("  oxpilot-server check-policy <policy.json>    Validate a policy document");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("check-policy") => {
            let path = args.get(2).ok_or_else(|| {
                print_usage();
                anyhow::anyhow!("check-policy requires a <policy.json> argument")
            })?;
            run_check_policy(path)
        }
        Some("--help" | "-h") => {
            print_usage();
            Ok(())
        }
        _ => {
            let config_path = args
                .get(1)
                .map(|s| s.as_str())
                .unwrap_or("config/server.toml");
            run_server(config_path).await
        }
    }
}

async fn run_server(config_path: &str) -> Result<()> {
    let config = ServerConfig::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    oxpilot_metrics::providers::register_all();

    let mut providers: Vec<Arc<dyn MetricsProvider>> = Vec::new();
    for entry in &config.providers {
        let provider = oxpilot_metrics::new_provider(&entry.provider_type, &entry.params)
            .with_context(|| format!("building metrics provider '{}'", entry.name))?;
        tracing::info!(
            name = %entry.name,
            provider_type = %entry.provider_type,
            "metrics provider configured"
        );
        providers.push(Arc::from(provider));
    }
    if providers.is_empty() {
        tracing::warn!("no metrics providers configured; policies will never trigger");
    }

    let cluster = Arc::new(ClusterApiClient::new(
        &config.cluster.api_url,
        Duration::from_secs(config.cluster.connect_timeout_secs),
    )?);

    let controller = Arc::new(PolicyController::new(
        cluster.clone(),
        cluster,
        Arc::new(LogEventSink),
        Duration::from_secs(config.cooldown_secs),
    ));

    for policy in policy_seed::load_policy_dir(Path::new(&config.policy_dir))? {
        controller.handle_policy_event(PolicyEvent::Added(policy));
    }

    tracing::info!(
        policies = controller.policy_count(),
        tick_secs = config.tick_secs,
        "starting policy controller"
    );
    controller.start(providers, Duration::from_secs(config.tick_secs))?;

    signal::ctrl_c().await?;
    tracing::info!("shutting down");
    controller.stop().await;
    Ok(())
}

#[allow(clippy::print_stdout)]
fn run_check_policy(path: &str) -> Result<()> {
    let policy = policy_seed::load_policy_file(Path::new(path))?;
    println!(
        "policy '{}' is valid: targets {}, {} condition(s), action {}",
        policy.name,
        policy.object.object_type,
        policy.conditions.len(),
        policy.action.name
    );
    Ok(())
}
