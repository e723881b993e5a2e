// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//! Scenario and VM launch error types

#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("Unknown action '{0}', expected one of start, stop, status, reset")]
    UnknownAction(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("A VM start is already being launched")]
    Busy,

    #[error("Failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
