// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Lab VM start/stop endpoints and the scenario guide.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use std::io::ErrorKind;
use tracing::error;

use super::{ApiError, AppState};

/// Launch the VM `up` command. Returns once the process is spawned.
pub async fn start_vm(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.vm.start()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "starting",
            "launch": handle.snapshot(),
        })),
    ))
}

pub async fn stop_vm(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let handle = state.vm.stop()?;
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "status": "stopping",
            "launch": handle.snapshot(),
        })),
    ))
}

pub async fn vm_status(State(state): State<AppState>) -> impl IntoResponse {
    let launch = state.vm.last_launch();
    let status = match &launch {
        None => "idle",
        Some(snapshot) if snapshot.status.is_finished() => "finished",
        Some(_) => "running",
    };
    Json(serde_json::json!({
        "status": status,
        "launch": launch,
    }))
}

pub async fn vm_guide(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    match state.vm.guide_html().await {
        Ok(html) => Ok(Html(html)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ApiError::NotFound("guide".to_string())),
        Err(e) => {
            error!("Failed to read scenario guide: {}", e);
            Ok(Html(format!(
                "<pre>Guide unavailable: {}</pre>",
                crate::security::escape_html(&e.to_string())
            )))
        }
    }
}
