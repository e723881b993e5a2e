// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! HTTP and WebSocket surface.

mod error;
mod roles;
mod scenarios;
mod session;
mod vm;
mod ws;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::warn;

use crate::config::Config;
use crate::events::EventBus;
use crate::gateway::Gateway;
use crate::scenario::ScenarioRunner;
use crate::session::SessionManager;
use crate::vm::VmTrigger;

pub use error::{ApiError, ApiResult};
pub use session::SessionId;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<SessionManager>,
    pub gateway: Arc<dyn Gateway>,
    pub scenarios: ScenarioRunner,
    pub vm: Arc<VmTrigger>,
    pub events: EventBus,
}

pub fn build_router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/api/roles", get(roles::list_roles))
        .route("/api/roles/:role/connect", post(roles::connect_role))
        .route("/api/roles/:role/disconnect", post(roles::disconnect_role))
        .route("/api/disconnect-all", post(roles::disconnect_all))
        .route("/api/session", get(roles::session_info))
        .route("/api/session/reset", post(roles::reset_session))
        .route("/api/scenarios", get(scenarios::list_scenarios))
        .route("/api/scenarios/all/:action", post(scenarios::run_bulk))
        .route("/api/scenarios/:id/results", get(scenarios::scenario_results))
        .route("/api/scenarios/:id/:action", post(scenarios::run_scenario))
        .route("/api/vm/start", post(vm::start_vm))
        .route("/api/vm/stop", post(vm::stop_vm))
        .route("/api/vm/status", get(vm::vm_status))
        .route("/api/vm/guide", get(vm::vm_guide))
        .route("/ws/events", get(ws::events_ws))
        .route("/ws/vm/logs", get(ws::vm_logs_ws));

    if state.config.observability.debug_routes {
        warn!("Debug routes enabled: /api/debug/sessions exposes live session state");
        api = api.route("/api/debug/sessions", get(session::debug_sessions));
    }

    let api = api.route_layer(middleware::from_fn_with_state(
        state.clone(),
        session::session_cookie,
    ));

    let mut app = Router::new()
        .route("/", get(landing_page))
        .route("/health", get(health_check))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(state.config.server.max_body_bytes))
                .layer(cors_layer(&state.config)),
        );

    if !state.config.is_development() {
        app = app
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("1; mode=block"),
            ));
    }

    app.with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors.allows_any() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

async fn landing_page() -> impl IntoResponse {
    Html(
        "<h1>🧪 LABGATE Backend</h1>\
         <p>Lab gateway online. See <a href=\"/api/vm/guide\">the scenario guide</a>.</p>",
    )
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "labgate",
        "version": crate::VERSION,
        "build_time": env!("BUILD_TIME"),
        "git_hash": env!("GIT_HASH"),
        "environment": state.config.server.environment.to_string(),
        "active_sessions": state.sessions.len(),
        "event_listeners": state.events.listener_count(),
        "timestamp": chrono::Utc::now(),
    }))
}
