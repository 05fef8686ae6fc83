//! Screenguard host shell
//!
//! Stands in for the application shell: reads commands and lifecycle
//! notifications from stdin, forwards them through the bridge, and prints
//! JSON responses.

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use enforcer::{EnforcerConfig, ScreenEnforcer, SimulatedEnforcer, create_enforcer};
use protection::{ProtectionConfig, ProtectionManager, ScreenProtectionBridge};

const HELP: &str = "commands: enable | disable | status | info | reconcile | \
                    foreground | background | display | help | quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("screenguard_cli=debug".parse()?)
                .add_directive("protection=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Screenguard host shell");

    let config = ProtectionConfig::from_env().context("invalid SCREENGUARD_* configuration")?;
    let enforcer: Arc<dyn ScreenEnforcer> = match create_enforcer(&EnforcerConfig::default()) {
        Ok(enforcer) => Arc::from(enforcer),
        Err(e) => {
            warn!("Native enforcer unavailable ({}); using simulated enforcer", e);
            Arc::new(SimulatedEnforcer::new())
        }
    };

    let manager = Arc::new(ProtectionManager::new(enforcer, config)?);
    let bridge = ScreenProtectionBridge::new(manager.clone());

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match event.generation() {
                    Some(generation) => info!(generation, "event: {}", json!(event)),
                    None => info!("event: {}", json!(event)),
                },
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {} protection events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let response = match command {
            "enable" => {
                bridge.enable_screen_protection();
                json!(bridge.status())
            }
            "disable" => {
                bridge.disable_screen_protection();
                json!(bridge.status())
            }
            "status" => {
                let status = bridge.status();
                json!({
                    "enabled": bridge.is_screen_protection_enabled(),
                    "settled": status.phase.is_settled(),
                    "status": status,
                })
            }
            "info" => json!(bridge.platform_info()),
            "reconcile" => match manager.reconcile() {
                Ok(()) => json!({ "ok": true }),
                Err(e) => json!({ "error": e.to_string() }),
            },
            "help" => json!(HELP),
            "quit" | "exit" => break,
            other => match bridge.notify_lifecycle(other) {
                Ok(()) => json!({ "ok": true }),
                Err(e) => json!({ "error": e }),
            },
        };
        println!("{}", response);
    }

    manager.shutdown().await;
    info!("Screenguard host shell stopped");
    Ok(())
}
