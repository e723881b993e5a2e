// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Connection identifier resolution and client URL construction.

use tracing::{debug, error, info};

use super::{ConnectionListing, Gateway};
use crate::config::RoleConfig;
use crate::errors::GatewayError;
use crate::session::UpstreamToken;

/// Find the connection a role should open.
///
/// Order: configured id, then the only visible connection, then a
/// connection whose name equals the role's username or role name
/// (case-insensitive). Anything else is ambiguous.
pub async fn resolve_connection_id(
    gateway: &dyn Gateway,
    role: &RoleConfig,
    token: &UpstreamToken,
) -> Result<String, GatewayError> {
    if let Some(id) = configured_id(role) {
        info!("Using configured connection ID {} for {}", id, role.name);
        return Ok(id.to_string());
    }

    let listing = gateway.list_connections(token).await?;
    pick_connection(role, &listing)
}

/// Pick from an already fetched listing.
pub fn pick_connection(
    role: &RoleConfig,
    listing: &ConnectionListing,
) -> Result<String, GatewayError> {
    if let Some(id) = configured_id(role) {
        return Ok(id.to_string());
    }

    debug!(
        "Available connection IDs for {}: {:?}",
        role.name,
        listing.keys().collect::<Vec<_>>()
    );

    if listing.len() == 1 {
        if let Some(id) = listing.keys().next() {
            info!("Using single available connection ID {} for {}", id, role.name);
            return Ok(id.clone());
        }
    }

    let username = role.username.to_lowercase();
    let role_name = role.name.to_lowercase();
    let matched = listing.iter().find(|(_, info)| {
        let name = info.name.to_lowercase();
        name == username || name == role_name
    });
    if let Some((id, _)) = matched {
        info!("Matched connection ID {} by name for {}", id, role.name);
        return Ok(id.clone());
    }

    let candidates: Vec<String> = listing.values().map(|info| info.name.clone()).collect();
    let err = GatewayError::AmbiguousConnection {
        role: role.name.clone(),
        candidates,
    };
    error!("{}", err);
    Err(err)
}

fn configured_id(role: &RoleConfig) -> Option<&str> {
    role.connection_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

/// `{base}/#/client/{data_source}/{connection_id}?token=..&embed=true&resize=scale`
pub fn build_connection_url(
    base_url: &str,
    data_source: &str,
    connection_id: &str,
    token: &str,
) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("token", token)
        .append_pair("embed", "true")
        .append_pair("resize", "scale")
        .finish();
    format!(
        "{}/#/client/{}/{}?{}",
        base_url.trim_end_matches('/'),
        data_source.trim(),
        connection_id.trim(),
        query
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ConnectionInfo;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ListingGateway {
        listing: ConnectionListing,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Gateway for ListingGateway {
        async fn authenticate(&self, _role: &RoleConfig) -> Result<UpstreamToken, GatewayError> {
            Ok(UpstreamToken::new("t", "mysql"))
        }

        async fn validate(&self, _token: &UpstreamToken) -> bool {
            true
        }

        async fn list_connections(
            &self,
            _token: &UpstreamToken,
        ) -> Result<ConnectionListing, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.listing.clone())
        }

        async fn invalidate(&self, _token: &UpstreamToken) {}

        fn base_url(&self) -> &str {
            "http://gw/guacamole"
        }
    }

    fn role(connection_id: Option<&str>) -> RoleConfig {
        RoleConfig {
            name: "victim".to_string(),
            username: "Victim-User".to_string(),
            password: "pw".to_string(),
            connection_id: connection_id.map(str::to_string),
            display_name: "Victim".to_string(),
            description: String::new(),
            color_theme: String::new(),
        }
    }

    fn listing(entries: &[(&str, &str)]) -> ConnectionListing {
        entries
            .iter()
            .map(|(id, name)| {
                (
                    id.to_string(),
                    ConnectionInfo {
                        name: name.to_string(),
                        identifier: Some(id.to_string()),
                        protocol: Some("rdp".to_string()),
                    },
                )
            })
            .collect()
    }

    fn gateway(entries: &[(&str, &str)]) -> ListingGateway {
        ListingGateway {
            listing: listing(entries),
            calls: AtomicUsize::new(0),
        }
    }

    #[tokio::test]
    async fn test_configured_id_wins() {
        let gw = gateway(&[("1", "victim-user"), ("2", "other")]);
        let token = UpstreamToken::new("t", "mysql");
        let id = resolve_connection_id(&gw, &role(Some(" 9 ")), &token)
            .await
            .unwrap();
        assert_eq!(id, "9");
        assert_eq!(gw.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_connection() {
        let gw = gateway(&[("7", "anything")]);
        let token = UpstreamToken::new("t", "mysql");
        let id = resolve_connection_id(&gw, &role(None), &token).await.unwrap();
        assert_eq!(id, "7");
    }

    #[test]
    fn test_blank_configured_id_is_ignored() {
        let id = pick_connection(&role(Some("  ")), &listing(&[("3", "x")])).unwrap();
        assert_eq!(id, "3");
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let entries = listing(&[("1", "attacker"), ("2", "VICTIM-USER")]);
        assert_eq!(pick_connection(&role(None), &entries).unwrap(), "2");

        let by_role_name = listing(&[("1", "attacker"), ("5", "Victim")]);
        assert_eq!(pick_connection(&role(None), &by_role_name).unwrap(), "5");
    }

    #[test]
    fn test_ambiguous_lists_every_name() {
        let entries = listing(&[("1", "kali"), ("2", "win10"), ("3", "ubuntu")]);
        match pick_connection(&role(None), &entries) {
            Err(GatewayError::AmbiguousConnection { role, candidates }) => {
                assert_eq!(role, "victim");
                assert_eq!(candidates, vec!["kali", "win10", "ubuntu"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_listing_is_ambiguous() {
        let result = pick_connection(&role(None), &ConnectionListing::new());
        assert!(matches!(
            result,
            Err(GatewayError::AmbiguousConnection { candidates, .. }) if candidates.is_empty()
        ));
    }

    #[test]
    fn test_build_connection_url() {
        let url = build_connection_url("http://gw:8080/guacamole/", "mysql", "2", "a+b/c");
        assert_eq!(
            url,
            "http://gw:8080/guacamole/#/client/mysql/2?token=a%2Bb%2Fc&embed=true&resize=scale"
        );
    }
}
