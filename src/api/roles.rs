// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Role connection endpoints and session state.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{ApiResult, AppState, SessionId};
use crate::errors::GatewayError;
use crate::events::LabEvent;
use crate::gateway::{build_connection_url, resolve_connection_id};
use crate::security::short_id;

#[derive(Debug, Serialize)]
pub struct RoleView {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub color_theme: String,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct RolesResponse {
    pub roles: Vec<RoleView>,
    pub count: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ConnectRequest {
    #[serde(default)]
    pub force_new: bool,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub role: String,
    pub connection_id: String,
    pub data_source: String,
    pub url: String,
    pub reused_token: bool,
}

pub async fn list_roles(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> ApiResult<RolesResponse> {
    let active: BTreeSet<String> = state
        .sessions
        .active_connections(&session_id)
        .into_iter()
        .collect();

    let roles: Vec<RoleView> = state
        .config
        .gateway
        .roles
        .iter()
        .map(|role| RoleView {
            name: role.name.clone(),
            display_name: role.display_name.clone(),
            description: role.description.clone(),
            color_theme: role.color_theme.clone(),
            connected: active.contains(&role.name),
        })
        .collect();

    Ok(Json(RolesResponse {
        count: roles.len(),
        roles,
    }))
}

/// Obtain (or reuse) a token for the role and return the tokenized client URL.
pub async fn connect_role(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(role): Path<String>,
    body: Option<Json<ConnectRequest>>,
) -> ApiResult<ConnectResponse> {
    let role_config = state
        .config
        .role(&role)
        .ok_or_else(|| GatewayError::UnknownRole(role.clone()))?;
    let force_new = body.map(|Json(req)| req.force_new).unwrap_or(false);
    info!(
        "Requesting Guacamole token for {} (force_new={}, session={}...)",
        role,
        force_new,
        short_id(&session_id)
    );

    let existing = state.sessions.get_token(&session_id, &role);
    let still_valid = match (&existing, force_new) {
        (Some(token), false) => state.gateway.validate(token).await,
        _ => false,
    };

    let (token, reused_token) = match existing {
        Some(token) if still_valid => {
            debug!("Reusing valid token for {}", role);
            (token, true)
        }
        previous => {
            if let Some(old) = previous {
                state.sessions.remove_token(&session_id, &role);
                state.gateway.invalidate(&old).await;
            }
            let fresh = state.gateway.authenticate(role_config).await?;
            // A concurrent connect for the same role may have stored first.
            let replaced = state.sessions.store_token(&session_id, &role, fresh.clone());
            if let Some(replaced) = replaced.filter(|old| old.token != fresh.token) {
                state.gateway.invalidate(&replaced).await;
            }
            (fresh, false)
        }
    };

    let connection_id = resolve_connection_id(state.gateway.as_ref(), role_config, &token).await?;
    let url = build_connection_url(
        state.gateway.base_url(),
        &token.data_source,
        &connection_id,
        &token.token,
    );

    state.sessions.add_connection(&session_id, &role);
    state.events.to_session(
        &session_id,
        LabEvent::ConnectionEstablished {
            role: role.clone(),
            connection_id: connection_id.clone(),
        },
    );

    Ok(Json(ConnectResponse {
        role,
        connection_id,
        data_source: token.data_source,
        url,
        reused_token,
    }))
}

/// Drop the role's token and connection. Succeeds even when there is nothing
/// to drop; upstream invalidation is best effort.
pub async fn disconnect_role(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(role): Path<String>,
) -> ApiResult<serde_json::Value> {
    let was_connected = disconnect(&state, &session_id, &role).await;
    Ok(Json(serde_json::json!({
        "status": "disconnected",
        "role": role,
        "was_connected": was_connected,
    })))
}

pub async fn disconnect_all(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> ApiResult<serde_json::Value> {
    let mut roles: BTreeSet<String> = state
        .config
        .gateway
        .roles
        .iter()
        .map(|r| r.name.clone())
        .collect();
    roles.extend(state.sessions.active_connections(&session_id));

    let mut disconnected = Vec::new();
    for role in roles {
        if disconnect(&state, &session_id, &role).await {
            disconnected.push(role);
        }
    }
    info!(
        "Disconnected {} roles for session {}...",
        disconnected.len(),
        short_id(&session_id)
    );

    Ok(Json(serde_json::json!({
        "status": "disconnected",
        "roles": disconnected,
    })))
}

async fn disconnect(state: &AppState, session_id: &str, role: &str) -> bool {
    let token = state.sessions.remove_token(session_id, role);
    let was_connected = state.sessions.remove_connection(session_id, role);

    if let Some(token) = &token {
        state.gateway.invalidate(token).await;
    }
    if token.is_some() || was_connected {
        state.events.to_session(
            session_id,
            LabEvent::ConnectionClosed {
                role: role.to_string(),
            },
        );
    }
    was_connected
}

pub async fn session_info(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> ApiResult<serde_json::Value> {
    Ok(Json(serde_json::json!({
        "session": state.sessions.get(&session_id),
        "idle_timeout_secs": state.config.session.idle_timeout_secs,
    })))
}

/// Clear tokens, connections and cached results, revoking tokens upstream.
pub async fn reset_session(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
) -> ApiResult<serde_json::Value> {
    let tokens = state.sessions.reset(&session_id);
    for (_, token) in &tokens {
        state.gateway.invalidate(token).await;
    }
    info!(
        "Session {}... reset, {} tokens invalidated",
        short_id(&session_id),
        tokens.len()
    );

    state.events.to_session(
        &session_id,
        LabEvent::SessionReset {
            invalidated_tokens: tokens.len(),
        },
    );
    Ok(Json(serde_json::json!({
        "status": "reset",
        "invalidated_tokens": tokens.len(),
    })))
}
