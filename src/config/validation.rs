// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Configuration validation

use std::collections::HashSet;
use tracing::warn;

use super::error::ConfigError;
use super::types::{Config, Environment};
use crate::security::validate_identifier;

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "LABGATE_PORT".to_string(),
                value: "0".to_string(),
                reason: "Port cannot be 0".to_string(),
            });
        }

        for (key, value) in [
            ("LABGATE_SESSION_IDLE_TIMEOUT", self.session.idle_timeout_secs),
            ("LABGATE_SESSION_SWEEP_INTERVAL", self.session.sweep_interval_secs),
            ("LABGATE_GUAC_AUTH_TIMEOUT", self.gateway.auth_timeout_secs),
            ("LABGATE_GUAC_REQUEST_TIMEOUT", self.gateway.request_timeout_secs),
            ("LABGATE_GUAC_INVALIDATE_TIMEOUT", self.gateway.invalidate_timeout_secs),
            ("LABGATE_SCENARIO_TIMEOUT", self.scenario.command_timeout_secs),
            ("LABGATE_VM_LOG_POLL_MS", self.vm.log_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: "0".to_string(),
                    reason: "Must be greater than zero".to_string(),
                });
            }
        }

        match url::Url::parse(&self.gateway.base_url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => {
                return Err(ConfigError::InvalidValue {
                    key: "LABGATE_GUAC_BASE".to_string(),
                    value: self.gateway.base_url.clone(),
                    reason: format!("Unsupported scheme '{}'", parsed.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidValue {
                    key: "LABGATE_GUAC_BASE".to_string(),
                    value: self.gateway.base_url.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if self.gateway.roles.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "LABGATE_ROLES".to_string(),
                value: "[]".to_string(),
                reason: "At least one role must be configured".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for role in &self.gateway.roles {
            if !validate_identifier(&role.name) {
                return Err(ConfigError::InvalidValue {
                    key: "LABGATE_ROLES".to_string(),
                    value: role.name.clone(),
                    reason: "Role names must be alphanumeric with '-' or '_'".to_string(),
                });
            }
            if !seen.insert(role.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "LABGATE_ROLES".to_string(),
                    value: role.name.clone(),
                    reason: "Duplicate role name".to_string(),
                });
            }
        }

        if self.server.environment == Environment::Production {
            if !self.session.cookie_secure {
                warn!("Session cookie is not marked Secure in production");
            }
            if self.cors.allows_any() {
                warn!("CORS allows any origin in production");
            }
            if self.observability.debug_routes {
                warn!("Debug routes are enabled in production");
            }
        }

        Ok(())
    }
}
