// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Configuration type definitions
//! All configuration structs and enums used throughout the application.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub gateway: GatewayConfig,
    pub scenario: ScenarioConfig,
    pub vm: VmConfig,
    pub cors: CorsConfig,
    pub observability: ObservabilityConfig,
}

/// Server binding configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub listen_addr: SocketAddr,
    pub environment: Environment,
    pub graceful_shutdown_timeout_secs: u64,
    pub max_body_bytes: usize,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Staging,
    Development,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "staging" | "stage" => Ok(Environment::Staging),
            "development" | "dev" | "" => Ok(Environment::Development),
            _ => Err(format!("Unknown environment: {}", s)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Staging => write!(f, "staging"),
            Environment::Development => write!(f, "development"),
        }
    }
}

/// Browser session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub cookie_name: String,
    pub cookie_secure: bool,
}

/// Remote desktop gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL including the context path, e.g. `http://host:8080/guacamole`
    pub base_url: String,
    pub default_data_source: String,
    pub auth_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub invalidate_timeout_secs: u64,
    pub roles: Vec<RoleConfig>,
}

/// A role the lab exposes, mapped to gateway credentials.
#[derive(Clone)]
pub struct RoleConfig {
    pub name: String,
    pub username: String,
    pub password: String,
    /// Explicit connection identifier; resolution is skipped when set.
    pub connection_id: Option<String>,
    pub display_name: String,
    pub description: String,
    pub color_theme: String,
}

impl std::fmt::Debug for RoleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleConfig")
            .field("name", &self.name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connection_id", &self.connection_id)
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Scenario script configuration
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    pub scripts_root: PathBuf,
    pub command_timeout_secs: u64,
    /// Optional JSON catalog replacing the built-in scenario set
    pub catalog_file: Option<PathBuf>,
}

/// VM lifecycle trigger configuration
#[derive(Debug, Clone)]
pub struct VmConfig {
    pub workdir: PathBuf,
    pub up_command: String,
    pub halt_command: String,
    pub log_path: PathBuf,
    pub log_poll_interval_ms: u64,
}

/// Cross-origin configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }
}

/// Observability configuration
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub debug_routes: bool,
}
