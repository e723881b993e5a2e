// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! LABGATE Configuration Module
//! All configuration values are loaded from LABGATE_* environment variables.

mod error;
mod loader;
mod types;
mod validation;

pub use error::ConfigError;
pub use loader::{var_list, var_opt, var_or, var_parse, Lookup};
pub use types::{
    Config, CorsConfig, Environment, GatewayConfig, ObservabilityConfig, RoleConfig,
    ScenarioConfig, ServerConfig, SessionConfig, VmConfig,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(&|key: &str| vars.get(key).cloned())
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "development".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!(
            "dev".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.session.idle_timeout_secs, 3600);
        assert_eq!(config.gateway.default_data_source, "mysql");
        assert!(config.observability.debug_routes);
        config.validate().unwrap();

        let names: Vec<&str> = config.gateway.roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["victim", "attacker"]);
        let victim = config.role("victim").unwrap();
        assert_eq!(victim.connection_id.as_deref(), Some("2"));
        assert_eq!(victim.display_name, "Victim Machine");
    }

    #[test]
    fn test_role_overrides() {
        let config = load(&[
            ("LABGATE_ROLES", "victim, red-team"),
            ("LABGATE_ROLE_VICTIM_CONNECTION_ID", " "),
            ("LABGATE_ROLE_RED_TEAM_PASSWORD", "s3cret"),
            ("LABGATE_ROLE_RED_TEAM_CONNECTION_ID", "9"),
        ])
        .unwrap();

        // A blank id clears the built-in one.
        assert_eq!(config.role("victim").unwrap().connection_id, None);

        let red = config.role("red-team").unwrap();
        assert_eq!(red.username, "red-team");
        assert_eq!(red.password, "s3cret");
        assert_eq!(red.connection_id.as_deref(), Some("9"));
        assert!(!format!("{:?}", red).contains("s3cret"));
    }

    #[test]
    fn test_unset_connection_id_keeps_builtin() {
        let config = load(&[("LABGATE_ROLE_ATTACKER_USERNAME", "kali")]).unwrap();
        let attacker = config.role("attacker").unwrap();
        assert_eq!(attacker.username, "kali");
        assert_eq!(attacker.connection_id.as_deref(), Some("4"));
    }

    #[test]
    fn test_custom_role_requires_password() {
        let err = load(&[("LABGATE_ROLES", "analyst")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingRequired { ref key } if key == "LABGATE_ROLE_ANALYST_PASSWORD"
        ));
    }

    #[test]
    fn test_parse_error() {
        let err = load(&[("LABGATE_PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = load(&[("LABGATE_SESSION_IDLE_TIMEOUT", "0")]).unwrap();
        assert!(config.validate().is_err());

        let config = load(&[("LABGATE_GUAC_BASE", "ftp://gateway/guacamole")]).unwrap();
        assert!(config.validate().is_err());

        let config = load(&[("LABGATE_ROLES", "victim,victim")]).unwrap();
        assert!(config.validate().is_err());

        let config = load(&[
            ("LABGATE_ROLES", "bad role"),
            ("LABGATE_ROLE_BAD_ROLE_PASSWORD", "x"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_routes_follow_environment() {
        let config = load(&[("LABGATE_ENVIRONMENT", "production")]).unwrap();
        assert!(config.is_production());
        assert!(!config.observability.debug_routes);
    }
}
