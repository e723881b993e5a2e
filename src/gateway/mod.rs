// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Remote desktop gateway access.
//!
//! The [`Gateway`] trait is the seam between request handling and the
//! upstream REST API; [`GuacamoleClient`] is the HTTP implementation.

mod client;
mod resolve;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::RoleConfig;
use crate::errors::GatewayError;
use crate::session::UpstreamToken;

pub use client::GuacamoleClient;
pub use resolve::{build_connection_url, pick_connection, resolve_connection_id};

/// One entry of the upstream connection listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// Connections visible to a token, keyed by connection identifier.
pub type ConnectionListing = BTreeMap<String, ConnectionInfo>;

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Exchange the role's credentials for a token.
    async fn authenticate(&self, role: &RoleConfig) -> Result<UpstreamToken, GatewayError>;

    /// Whether the token is still accepted. Transport errors count as invalid.
    async fn validate(&self, token: &UpstreamToken) -> bool;

    async fn list_connections(
        &self,
        token: &UpstreamToken,
    ) -> Result<ConnectionListing, GatewayError>;

    /// Revoke the token upstream. Failures are logged, never returned.
    async fn invalidate(&self, token: &UpstreamToken);

    /// Public base URL used when building client links.
    fn base_url(&self) -> &str;
}
