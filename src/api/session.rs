// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Session cookie middleware.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::net::SocketAddr;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AppState;
use crate::security::{cookie_value, extract_client_ip, parse_session_id, short_id};

/// Session id resolved for the current request.
#[derive(Debug, Clone)]
pub struct SessionId(pub String);

/// Resolve the browser session, creating one when needed, and refresh the cookie.
///
/// A missing or malformed cookie gets a new id. A well-formed id the store
/// no longer knows (expired, or issued before a restart) is recreated under
/// the same id so the browser keeps its cookie.
pub async fn session_cookie(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_name = state.config.session.cookie_name.as_str();
    let presented = request
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| cookie_value(value, cookie_name))
        .and_then(parse_session_id);

    let session_id = match presented {
        Some(id) if state.sessions.touch(&id) => id,
        Some(id) => {
            debug!("Session {}... unknown or expired, recreating", short_id(&id));
            state.sessions.create(&id);
            id
        }
        None => {
            let id = Uuid::new_v4().to_string();
            state.sessions.create(&id);
            id
        }
    };

    let headers = request.headers();
    let client_ip = extract_client_ip(
        headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()),
        headers.get("x-real-ip").and_then(|v| v.to_str().ok()),
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .as_deref(),
    );
    debug!(
        "REQUEST: {} {} {} session={}...",
        client_ip.as_deref().unwrap_or("unknown"),
        request.method(),
        request.uri().path(),
        short_id(&session_id)
    );

    request.extensions_mut().insert(SessionId(session_id.clone()));
    let mut response = next.run(request).await;

    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        cookie_name, session_id, state.config.session.idle_timeout_secs
    );
    if state.config.session.cookie_secure {
        cookie.push_str("; Secure");
    }
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
        Err(e) => warn!("Could not build session cookie: {}", e),
    }
    response
}

/// Live sessions, for local debugging only.
pub async fn debug_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.list();
    Json(serde_json::json!({
        "count": sessions.len(),
        "idle_timeout_secs": state.config.session.idle_timeout_secs,
        "sessions": sessions,
    }))
}
