// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//! Configuration loading from environment variables

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};
use super::error::ConfigError;
use super::types::*;

/// Source of configuration values, keyed by variable name.
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

struct BuiltinRole {
    name: &'static str,
    username: &'static str,
    password: &'static str,
    connection_id: &'static str,
    display_name: &'static str,
    description: &'static str,
    color_theme: &'static str,
}

const BUILTIN_ROLES: &[BuiltinRole] = &[
    BuiltinRole {
        name: "victim",
        username: "victim",
        password: "victim",
        connection_id: "2",
        display_name: "Victim Machine",
        description: "Target system for security testing",
        color_theme: "#3498db",
    },
    BuiltinRole {
        name: "attacker",
        username: "attacker",
        password: "attacker",
        connection_id: "4",
        display_name: "Attacker Machine",
        description: "Penetration testing platform",
        color_theme: "#e74c3c",
    },
];

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                info!("No .env file found, using environment variables only");
            } else {
                warn!("Error loading .env file: {}", e);
            }
        }

        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    pub fn from_lookup(vars: Lookup<'_>) -> Result<Self, ConfigError> {
        let host = var_or(vars, "LABGATE_HOST", "127.0.0.1");
        let port = var_parse(vars, "LABGATE_PORT", 5000u16)?;
        let listen_addr = format!("{}:{}", host, port)
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                key: "LABGATE_HOST/PORT".to_string(),
                value: format!("{}:{}", host, port),
                reason: format!("Invalid socket address: {}", e),
            })?;

        let environment = var_parse(vars, "LABGATE_ENVIRONMENT", Environment::Development)?;
        let scripts_root = PathBuf::from(var_or(vars, "LABGATE_SCRIPTS_ROOT", "scripts"));
        let vm_workdir = PathBuf::from(var_or(vars, "LABGATE_VM_WORKDIR", "phishing_email_scenario"));

        Ok(Config {
            server: ServerConfig {
                host: host.clone(),
                port,
                listen_addr,
                environment,
                graceful_shutdown_timeout_secs: var_parse(vars, "LABGATE_SHUTDOWN_TIMEOUT", 30u64)?,
                max_body_bytes: var_parse(vars, "LABGATE_MAX_BODY_BYTES", 64 * 1024usize)?,
            },
            session: SessionConfig {
                idle_timeout_secs: var_parse(vars, "LABGATE_SESSION_IDLE_TIMEOUT", 3600u64)?,
                sweep_interval_secs: var_parse(vars, "LABGATE_SESSION_SWEEP_INTERVAL", 300u64)?,
                cookie_name: var_or(vars, "LABGATE_SESSION_COOKIE", "labgate_session"),
                cookie_secure: var_parse(vars, "LABGATE_SESSION_COOKIE_SECURE", false)?,
            },
            gateway: GatewayConfig {
                base_url: var_or(vars, "LABGATE_GUAC_BASE", "http://127.0.0.1:8080/guacamole"),
                default_data_source: var_or(vars, "LABGATE_GUAC_DATA_SOURCE", "mysql"),
                auth_timeout_secs: var_parse(vars, "LABGATE_GUAC_AUTH_TIMEOUT", 30u64)?,
                request_timeout_secs: var_parse(vars, "LABGATE_GUAC_REQUEST_TIMEOUT", 10u64)?,
                invalidate_timeout_secs: var_parse(vars, "LABGATE_GUAC_INVALIDATE_TIMEOUT", 5u64)?,
                roles: load_roles(vars)?,
            },
            scenario: ScenarioConfig {
                scripts_root,
                command_timeout_secs: var_parse(vars, "LABGATE_SCENARIO_TIMEOUT", 300u64)?,
                catalog_file: var_opt(vars, "LABGATE_SCENARIOS_FILE").map(PathBuf::from),
            },
            vm: VmConfig {
                up_command: var_or(vars, "LABGATE_VM_UP_COMMAND", "vagrant up"),
                halt_command: var_or(vars, "LABGATE_VM_HALT_COMMAND", "vagrant halt"),
                log_path: var_opt(vars, "LABGATE_VM_LOG_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs").join("vm.log")),
                log_poll_interval_ms: var_parse(vars, "LABGATE_VM_LOG_POLL_MS", 500u64)?,
                workdir: vm_workdir,
            },
            cors: CorsConfig {
                allowed_origins: var_list(
                    vars,
                    "LABGATE_ALLOWED_ORIGINS",
                    &["http://localhost:4200", "http://127.0.0.1:4200"],
                ),
            },
            observability: ObservabilityConfig {
                log_level: var_or(vars, "LABGATE_LOG_LEVEL", "info"),
                json_logs: var_parse(vars, "LABGATE_JSON_LOGS", false)?,
                debug_routes: var_parse(
                    vars,
                    "LABGATE_DEBUG_ROUTES",
                    environment == Environment::Development,
                )?,
            },
        })
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session.idle_timeout_secs)
    }

    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.session.sweep_interval_secs)
    }

    pub fn scenario_timeout(&self) -> Duration {
        Duration::from_secs(self.scenario.command_timeout_secs)
    }

    pub fn role(&self, name: &str) -> Option<&RoleConfig> {
        self.gateway.roles.iter().find(|r| r.name == name)
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }

    pub fn is_development(&self) -> bool {
        self.server.environment == Environment::Development
    }
}

fn load_roles(vars: Lookup<'_>) -> Result<Vec<RoleConfig>, ConfigError> {
    var_list(vars, "LABGATE_ROLES", &["victim", "attacker"])
        .into_iter()
        .map(|name| load_role(vars, name))
        .collect()
}

fn load_role(vars: Lookup<'_>, name: String) -> Result<RoleConfig, ConfigError> {
    let prefix = format!("LABGATE_ROLE_{}", env_key(&name));
    let builtin = BUILTIN_ROLES.iter().find(|b| b.name == name);
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);

    let password_key = key("PASSWORD");
    let password = var_opt(vars, &password_key)
        .or_else(|| builtin.map(|b| b.password.to_string()))
        .ok_or(ConfigError::MissingRequired { key: password_key })?;

    Ok(RoleConfig {
        username: var_opt(vars, &key("USERNAME"))
            .or_else(|| builtin.map(|b| b.username.to_string()))
            .unwrap_or_else(|| name.clone()),
        password,
        // Present but blank means "resolve from the listing".
        connection_id: match vars(&key("CONNECTION_ID")) {
            Some(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
            None => builtin.map(|b| b.connection_id.to_string()),
        },
        display_name: var_opt(vars, &key("DISPLAY_NAME"))
            .or_else(|| builtin.map(|b| b.display_name.to_string()))
            .unwrap_or_else(|| name.clone()),
        description: var_opt(vars, &key("DESCRIPTION"))
            .or_else(|| builtin.map(|b| b.description.to_string()))
            .unwrap_or_default(),
        color_theme: var_opt(vars, &key("COLOR"))
            .or_else(|| builtin.map(|b| b.color_theme.to_string()))
            .unwrap_or_else(|| "#7f8c8d".to_string()),
        name,
    })
}

/// `red-team` -> `RED_TEAM`
fn env_key(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

pub fn var_or(vars: Lookup<'_>, key: &str, default: &str) -> String {
    vars(key).unwrap_or_else(|| default.to_string())
}

/// Present and non-blank, trimmed.
pub fn var_opt(vars: Lookup<'_>, key: &str) -> Option<String> {
    vars(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn var_parse<T>(vars: Lookup<'_>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match vars(key) {
        Some(value) => value.trim().parse().map_err(|e| ConfigError::ParseError {
            key: key.to_string(),
            message: format!("{}", e),
        }),
        None => Ok(default),
    }
}

pub fn var_list(vars: Lookup<'_>, key: &str, default: &[&str]) -> Vec<String> {
    match vars(key) {
        Some(value) => value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}
