// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Runs scenario commands as short-lived `sh -c` processes.

use futures::future::join_all;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{CommandResult, ScenarioAction, ScenarioCatalog};
use crate::errors::ScenarioError;

#[derive(Clone)]
pub struct ScenarioRunner {
    catalog: Arc<ScenarioCatalog>,
    timeout: Duration,
}

impl ScenarioRunner {
    pub fn new(catalog: ScenarioCatalog, timeout: Duration) -> Self {
        Self {
            catalog: Arc::new(catalog),
            timeout,
        }
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.catalog
    }

    /// Run one action of one scenario. Only an unknown scenario id is an
    /// error; everything that happens to the process lands in the result.
    pub async fn execute(
        &self,
        scenario_id: &str,
        action: ScenarioAction,
    ) -> Result<CommandResult, ScenarioError> {
        let command = self
            .catalog
            .command(scenario_id, action)
            .ok_or_else(|| ScenarioError::UnknownScenario(scenario_id.to_string()))?;

        info!("Executing {} for scenario {}", action, scenario_id);
        let result = run_command(command, self.timeout).await;
        info!(
            target: "perf",
            "scenario={} action={} exit_code={} duration_ms={}",
            scenario_id, action, result.exit_code, result.duration_ms
        );
        Ok(result)
    }

    /// Run `action` on every scenario at once.
    pub async fn execute_all(&self, action: ScenarioAction) -> Vec<(String, CommandResult)> {
        let runs = self.catalog.iter().map(|scenario| async move {
            let result = run_command(scenario.commands.get(action), self.timeout).await;
            (scenario.id.clone(), result)
        });
        let results = join_all(runs).await;

        let failed = results.iter().filter(|(_, r)| !r.success).count();
        info!(
            "Bulk {} finished: {} scenarios, {} failed",
            action,
            results.len(),
            failed
        );
        results
    }
}

/// Execute `command` through `sh -c` with a wall-clock limit.
///
/// Never fails: a timeout yields exit code 124, a spawn or wait error yields
/// exit code -1 with the error text in stderr.
pub async fn run_command(command: &str, limit: Duration) -> CommandResult {
    let started = Instant::now();
    debug!("Running command: {}", command);

    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) => {
            warn!("Failed to spawn '{}': {}", command, e);
            return CommandResult::failed(e.to_string(), elapsed_ms(started));
        }
    };

    // Dropping the wait future on timeout drops the child, which kills it.
    match timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandResult::from_output(&output, elapsed_ms(started)),
        Ok(Err(e)) => {
            warn!("Failed to wait for '{}': {}", command, e);
            CommandResult::failed(e.to_string(), elapsed_ms(started))
        }
        Err(_) => {
            warn!("Command timed out after {:?}: {}", limit, command);
            CommandResult::timed_out(limit.as_secs())
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
