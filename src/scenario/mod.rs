// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Training scenarios: the fixed command set per scenario and the runner
//! that executes them.

mod catalog;
mod runner;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::ScenarioError;

pub use catalog::{ScenarioCatalog, ScenarioCommands, ScenarioDef};
pub use runner::{run_command, ScenarioRunner};

/// Exit code reported when a command exceeds its time budget (as `timeout(1)` does).
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when a command could not be run or was killed by a signal.
pub const FAILURE_EXIT_CODE: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioAction {
    Start,
    Stop,
    Status,
    Reset,
}

impl ScenarioAction {
    pub const ALL: [ScenarioAction; 4] = [
        ScenarioAction::Start,
        ScenarioAction::Stop,
        ScenarioAction::Status,
        ScenarioAction::Reset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioAction::Start => "start",
            ScenarioAction::Stop => "stop",
            ScenarioAction::Status => "status",
            ScenarioAction::Reset => "reset",
        }
    }
}

impl FromStr for ScenarioAction {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "start" => Ok(ScenarioAction::Start),
            "stop" => Ok(ScenarioAction::Stop),
            "status" => Ok(ScenarioAction::Status),
            "reset" => Ok(ScenarioAction::Reset),
            _ => Err(ScenarioError::UnknownAction(s.to_string())),
        }
    }
}

impl std::fmt::Display for ScenarioAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one external command invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
}

impl CommandResult {
    pub fn from_output(output: &std::process::Output, duration_ms: u64) -> Self {
        let exit_code = output.status.code().unwrap_or(FAILURE_EXIT_CODE);
        Self {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
            timestamp: Utc::now(),
            duration_ms,
        }
    }

    pub fn timed_out(timeout_secs: u64) -> Self {
        Self {
            exit_code: TIMEOUT_EXIT_CODE,
            stdout: String::new(),
            stderr: format!("Command timed out after {}s", timeout_secs),
            success: false,
            timestamp: Utc::now(),
            duration_ms: timeout_secs.saturating_mul(1000),
        }
    }

    pub fn failed(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            exit_code: FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: message.into(),
            success: false,
            timestamp: Utc::now(),
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!("start".parse::<ScenarioAction>().unwrap(), ScenarioAction::Start);
        assert_eq!("RESET".parse::<ScenarioAction>().unwrap(), ScenarioAction::Reset);
        assert!(matches!(
            "launch".parse::<ScenarioAction>(),
            Err(ScenarioError::UnknownAction(_))
        ));
        for action in ScenarioAction::ALL {
            assert_eq!(action.to_string().parse::<ScenarioAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_timed_out_result() {
        let result = CommandResult::timed_out(30);
        assert_eq!(result.exit_code, 124);
        assert!(!result.success);
        assert!(result.stderr.contains("30s"));
    }
}
