// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//! Error types shared across components

mod gateway;
mod lab;

pub use gateway::GatewayError;
pub use lab::{LaunchError, ScenarioError};
