// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! HTTP client for the Guacamole REST API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ConnectionListing, Gateway};
use crate::config::{GatewayConfig, RoleConfig};
use crate::errors::GatewayError;
use crate::session::UpstreamToken;

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(rename = "authToken")]
    auth_token: Option<String>,
    #[serde(rename = "dataSource")]
    data_source: Option<String>,
}

#[derive(Clone)]
pub struct GuacamoleClient {
    http: Client,
    base: Url,
    base_url: String,
    default_data_source: String,
    auth_timeout: Duration,
    request_timeout: Duration,
    invalidate_timeout: Duration,
}

impl GuacamoleClient {
    pub fn new(config: &GatewayConfig) -> anyhow::Result<Self> {
        let base = Url::parse(&config.base_url)?;
        let http = Client::builder()
            .user_agent(concat!("labgate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_data_source: config.default_data_source.clone(),
            auth_timeout: Duration::from_secs(config.auth_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            invalidate_timeout: Duration::from_secs(config.invalidate_timeout_secs),
        })
    }

    /// `{base}/api/<segments..>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| GatewayError::Unreachable(format!("invalid base URL {}", self.base)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// Startup connectivity check against `GET /api/languages`.
    pub async fn probe(&self) -> Result<StatusCode, GatewayError> {
        let url = self.endpoint(&["languages"])?;
        let response = self
            .http
            .get(url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, "connectivity probe"))?;
        Ok(response.status())
    }
}

#[async_trait]
impl Gateway for GuacamoleClient {
    async fn authenticate(&self, role: &RoleConfig) -> Result<UpstreamToken, GatewayError> {
        let url = self.endpoint(&["tokens"])?;
        debug!("Authenticating {} with Guacamole API at {}", role.name, url);

        let response = self
            .http
            .post(url)
            .form(&[
                ("username", role.username.as_str()),
                ("password", role.password.as_str()),
            ])
            .timeout(self.auth_timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, &role.name))?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(target: "security", "AUTH_FAILED: role={}, status={}", role.name, status.as_u16());
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: format!(
                    "Guacamole authentication failed for {}: HTTP {}",
                    role.name,
                    status.as_u16()
                ),
            });
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;

        let token = match body.auth_token.filter(|t| !t.is_empty()) {
            Some(token) => token,
            None => {
                warn!(target: "security", "TOKEN_MISSING: role={}", role.name);
                return Err(GatewayError::MalformedResponse(format!(
                    "No authToken received for {}",
                    role.name
                )));
            }
        };
        let data_source = body
            .data_source
            .filter(|ds| !ds.is_empty())
            .unwrap_or_else(|| self.default_data_source.clone());

        info!("Successfully obtained token for {}", role.name);
        info!(target: "security", "TOKEN_OBTAINED: role={}, datasource={}", role.name, data_source);
        Ok(UpstreamToken::new(token, data_source))
    }

    async fn validate(&self, token: &UpstreamToken) -> bool {
        match self.list_connections(token).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Token validation failed: {}", e);
                false
            }
        }
    }

    async fn list_connections(
        &self,
        token: &UpstreamToken,
    ) -> Result<ConnectionListing, GatewayError> {
        let url = self.endpoint(&["session", "data", &token.data_source, "connections"])?;
        debug!("Fetching connections for datasource: {}", token.data_source);

        let response = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("token", token.token.as_str())])
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| transport_error(e, "connection listing"))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            error!("Failed to get connections: HTTP {}: {}", status.as_u16(), text);
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message: text,
            });
        }

        let listing: ConnectionListing = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        info!("Retrieved {} connections from Guacamole", listing.len());
        Ok(listing)
    }

    async fn invalidate(&self, token: &UpstreamToken) {
        let url = match self.endpoint(&["tokens", &token.token]) {
            Ok(url) => url,
            Err(e) => {
                error!("Error invalidating token: {}", e);
                return;
            }
        };

        match self
            .http
            .delete(url)
            .timeout(self.invalidate_timeout)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                info!("Token successfully invalidated");
            }
            Ok(response) => {
                warn!(
                    "Token invalidation returned status: {}",
                    response.status().as_u16()
                );
            }
            Err(e) => error!("Error invalidating token: {}", transport_error(e, "invalidate")),
        }
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn transport_error(err: reqwest::Error, context: &str) -> GatewayError {
    if err.is_timeout() {
        error!("Timeout connecting to Guacamole ({})", context);
        GatewayError::Timeout(format!("Timeout connecting to Guacamole for {}", context))
    } else if err.is_decode() {
        GatewayError::MalformedResponse(err.to_string())
    } else {
        error!("Connection error to Guacamole ({}): {}", context, err);
        GatewayError::Unreachable(format!("Connection error to Guacamole for {}", context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::StatusCode as AxumStatus,
        routing::{delete, get, post},
        Form, Json, Router,
    };
    use std::collections::HashMap;

    async fn issue_token(Form(form): Form<HashMap<String, String>>) -> axum::response::Response {
        use axum::response::IntoResponse;
        match (form.get("username").map(String::as_str), form.get("password").map(String::as_str)) {
            (Some("victim"), Some("victim")) => Json(serde_json::json!({
                "authToken": "TOKEN123",
                "dataSource": "postgresql",
                "availableDataSources": ["postgresql"]
            }))
            .into_response(),
            (Some("empty"), _) => Json(serde_json::json!({ "dataSource": "mysql" })).into_response(),
            _ => (AxumStatus::FORBIDDEN, "denied").into_response(),
        }
    }

    async fn connections(
        Path(ds): Path<String>,
        Query(q): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        use axum::response::IntoResponse;
        if q.get("token").map(String::as_str) != Some("TOKEN123") {
            return (AxumStatus::FORBIDDEN, "bad token").into_response();
        }
        Json(serde_json::json!({
            "2": { "name": format!("victim-{}", ds), "identifier": "2", "protocol": "rdp", "activeConnections": 0 },
            "4": { "name": "attacker", "identifier": "4", "protocol": "vnc" }
        }))
        .into_response()
    }

    async fn spawn_fake_gateway() -> String {
        let app = Router::new()
            .route("/guacamole/api/tokens", post(issue_token))
            .route("/guacamole/api/tokens/:token", delete(|| async { AxumStatus::NO_CONTENT }))
            .route("/guacamole/api/session/data/:ds/connections", get(connections))
            .route("/guacamole/api/languages", get(|| async { Json(serde_json::json!({"en": "English"})) }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/guacamole", addr)
    }

    fn client(base_url: &str) -> GuacamoleClient {
        GuacamoleClient::new(&GatewayConfig {
            base_url: base_url.to_string(),
            default_data_source: "mysql".to_string(),
            auth_timeout_secs: 2,
            request_timeout_secs: 2,
            invalidate_timeout_secs: 2,
            roles: Vec::new(),
        })
        .unwrap()
    }

    fn role(username: &str, password: &str) -> RoleConfig {
        RoleConfig {
            name: "victim".to_string(),
            username: username.to_string(),
            password: password.to_string(),
            connection_id: None,
            display_name: "Victim".to_string(),
            description: String::new(),
            color_theme: String::new(),
        }
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let c = client("http://gw:8080/guacamole/");
        let url = c.endpoint(&["tokens", "a/b c"]).unwrap();
        assert_eq!(url.as_str(), "http://gw:8080/guacamole/api/tokens/a%2Fb%20c");
        assert_eq!(c.base_url(), "http://gw:8080/guacamole");
    }

    #[tokio::test]
    async fn test_authenticate_and_list() {
        let c = client(&spawn_fake_gateway().await);

        let token = c.authenticate(&role("victim", "victim")).await.unwrap();
        assert_eq!(token.token, "TOKEN123");
        assert_eq!(token.data_source, "postgresql");

        let listing = c.list_connections(&token).await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing["2"].name, "victim-postgresql");
        assert!(c.validate(&token).await);
        assert!(!c.validate(&UpstreamToken::new("nope", "mysql")).await);

        c.invalidate(&token).await;
        assert!(c.probe().await.unwrap().is_success());
    }

    #[tokio::test]
    async fn test_rejected_credentials_keep_status() {
        let c = client(&spawn_fake_gateway().await);
        let err = c.authenticate(&role("victim", "wrong")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_missing_token_is_malformed() {
        let c = client(&spawn_fake_gateway().await);
        let err = c.authenticate(&role("empty", "x")).await.unwrap_err();
        assert!(matches!(err, GatewayError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_gateway() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = client(&format!("http://{}/guacamole", addr));
        let err = c.authenticate(&role("victim", "victim")).await.unwrap_err();
        assert!(matches!(err, GatewayError::Unreachable(_)));
        assert!(!c.validate(&UpstreamToken::new("t", "mysql")).await);
        c.invalidate(&UpstreamToken::new("t", "mysql")).await;
    }
}
