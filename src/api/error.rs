// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Mapping of component errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{GatewayError, LaunchError, ScenarioError};

pub type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Gateway(GatewayError),
    Scenario(ScenarioError),
    Launch(LaunchError),
    NotFound(String),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<&'a [String]>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Gateway(err) => match err {
                GatewayError::UnknownRole(_) => StatusCode::NOT_FOUND,
                GatewayError::Rejected { status, .. } => StatusCode::from_u16(*status)
                    .ok()
                    .filter(|s| s.is_client_error() || s.is_server_error())
                    .unwrap_or(StatusCode::BAD_GATEWAY),
                GatewayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
                GatewayError::Unreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
                GatewayError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
                GatewayError::AmbiguousConnection { .. } => StatusCode::CONFLICT,
            },
            ApiError::Scenario(ScenarioError::UnknownScenario(_)) => StatusCode::NOT_FOUND,
            ApiError::Scenario(ScenarioError::UnknownAction(_)) => StatusCode::BAD_REQUEST,
            ApiError::Launch(LaunchError::Busy) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Launch(LaunchError::Spawn { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Gateway(err) => err.code(),
            ApiError::Scenario(ScenarioError::UnknownScenario(_)) => "unknown_scenario",
            ApiError::Scenario(ScenarioError::UnknownAction(_)) => "unknown_action",
            ApiError::Launch(LaunchError::Busy) => "busy",
            ApiError::Launch(LaunchError::Spawn { .. }) => "launch_failed",
            ApiError::NotFound(_) => "not_found",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Gateway(err) => err.to_string(),
            ApiError::Scenario(err) => err.to_string(),
            ApiError::Launch(err) => err.to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
        };
        let candidates = match &self {
            ApiError::Gateway(GatewayError::AmbiguousConnection { candidates, .. }) => {
                Some(candidates.as_slice())
            }
            _ => None,
        };

        (
            self.status(),
            Json(ApiErrorBody {
                error: self.code(),
                message,
                candidates,
            }),
        )
            .into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError::Gateway(err)
    }
}

impl From<ScenarioError> for ApiError {
    fn from(err: ScenarioError) -> Self {
        ApiError::Scenario(err)
    }
}

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        ApiError::Launch(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::from(GatewayError::Timeout("x".into())), 408),
            (ApiError::from(GatewayError::Unreachable("x".into())), 503),
            (ApiError::from(GatewayError::MalformedResponse("x".into())), 502),
            (
                ApiError::from(GatewayError::Rejected {
                    status: 403,
                    message: "no".into(),
                }),
                403,
            ),
            (
                ApiError::from(GatewayError::Rejected {
                    status: 302,
                    message: "moved".into(),
                }),
                502,
            ),
            (ApiError::from(GatewayError::UnknownRole("x".into())), 404),
            (ApiError::from(ScenarioError::UnknownAction("x".into())), 400),
            (ApiError::from(LaunchError::Busy), 429),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status().as_u16(), expected, "{:?}", err);
        }
    }
}
