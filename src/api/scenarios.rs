// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Scenario catalog and command execution endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use super::{ApiError, ApiResult, AppState, SessionId};
use crate::errors::ScenarioError;
use crate::events::LabEvent;
use crate::scenario::{CommandResult, ScenarioAction, ScenarioDef};

#[derive(Debug, Serialize)]
pub struct ScenarioList<'a> {
    pub scenarios: Vec<&'a ScenarioDef>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub scenario: String,
    pub action: ScenarioAction,
    pub result: CommandResult,
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub action: ScenarioAction,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: BTreeMap<String, CommandResult>,
}

pub async fn list_scenarios(State(state): State<AppState>) -> ApiResult<serde_json::Value> {
    let catalog = state.scenarios.catalog();
    let list = ScenarioList {
        scenarios: catalog.iter().collect(),
        count: catalog.len(),
    };
    Ok(Json(serde_json::json!(list)))
}

pub async fn run_scenario(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path((scenario, action)): Path<(String, String)>,
) -> ApiResult<ActionResponse> {
    let action: ScenarioAction = action.parse()?;
    let result = state.scenarios.execute(&scenario, action).await?;

    state
        .sessions
        .record_result(&session_id, &scenario, action, result.clone());
    state.events.to_session(
        &session_id,
        LabEvent::ScenarioCompleted {
            scenario: scenario.clone(),
            action,
            result: result.clone(),
        },
    );

    Ok(Json(ActionResponse {
        scenario,
        action,
        result,
    }))
}

/// Latest cached result of each action for one scenario in this session.
pub async fn scenario_results(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(scenario): Path<String>,
) -> ApiResult<serde_json::Value> {
    if state.scenarios.catalog().get(&scenario).is_none() {
        return Err(ScenarioError::UnknownScenario(scenario).into());
    }
    let results = state
        .sessions
        .get(&session_id)
        .and_then(|mut session| session.scenario_results.remove(&scenario))
        .unwrap_or_default();

    Ok(Json(serde_json::json!({
        "scenario": scenario,
        "results": results,
    })))
}

pub async fn run_bulk(
    State(state): State<AppState>,
    Extension(SessionId(session_id)): Extension<SessionId>,
    Path(action): Path<String>,
) -> ApiResult<BulkResponse> {
    let action: ScenarioAction = action.parse()?;
    if state.scenarios.catalog().is_empty() {
        return Err(ApiError::NotFound("scenarios".to_string()));
    }

    let outcomes = state.scenarios.execute_all(action).await;
    let total = outcomes.len();
    let succeeded = outcomes.iter().filter(|(_, r)| r.success).count();
    let failed = total - succeeded;

    let mut results = BTreeMap::new();
    for (scenario, result) in outcomes {
        state
            .sessions
            .record_result(&session_id, &scenario, action, result.clone());
        results.insert(scenario, result);
    }

    info!(
        "Bulk {} finished: {}/{} succeeded",
        action, succeeded, total
    );
    state.events.to_session(
        &session_id,
        LabEvent::BulkCompleted {
            action,
            total,
            succeeded,
            failed,
        },
    );

    Ok(Json(BulkResponse {
        action,
        total,
        succeeded,
        failed,
        results,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{json_body, send, session_cookie, test_app};
    use crate::events::LabEvent;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_list_hides_commands() {
        let app = test_app(&[]);
        let response = send(&app, "GET", "/api/scenarios", None, None).await;
        let json = json_body(response).await;
        assert_eq!(json["count"], 2);
        assert_eq!(json["scenarios"][0]["id"], "alpha");
        assert!(json["scenarios"][0].get("commands").is_none());
    }

    #[tokio::test]
    async fn test_run_records_result_and_notifies() {
        let app = test_app(&[]);
        let mut events = app.state.events.subscribe();

        let response = send(&app, "POST", "/api/scenarios/alpha/START", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let sid = session_cookie(&response);
        let json = json_body(response).await;
        assert_eq!(json["action"], "start");
        assert_eq!(json["result"]["exit_code"], 0);
        assert_eq!(json["result"]["stdout"], "started\n");
        assert_eq!(json["result"]["success"], true);

        let envelope = events.recv().await.unwrap();
        assert!(envelope.visible_to(&sid));
        assert!(matches!(envelope.event, LabEvent::ScenarioCompleted { .. }));

        let response = send(&app, "GET", "/api/scenarios/alpha/results", Some(&sid), None).await;
        let json = json_body(response).await;
        assert_eq!(json["results"]["start"]["stdout"], "started\n");
    }

    #[tokio::test]
    async fn test_failing_command_is_not_an_http_error() {
        let app = test_app(&[]);
        let response = send(&app, "POST", "/api/scenarios/alpha/reset", None, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["result"]["exit_code"], 1);
        assert_eq!(json["result"]["success"], false);
    }

    #[tokio::test]
    async fn test_timeout_reports_124() {
        let app = test_app(&[]);
        let response = send(&app, "POST", "/api/scenarios/beta/start", None, None).await;
        let json = json_body(response).await;
        assert_eq!(json["result"]["exit_code"], 124);
        assert_eq!(json["result"]["success"], false);
    }

    #[tokio::test]
    async fn test_bad_action_and_unknown_scenario() {
        let app = test_app(&[]);
        let response = send(&app, "POST", "/api/scenarios/alpha/explode", None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "unknown_action");

        let response = send(&app, "POST", "/api/scenarios/gamma/start", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(&app, "GET", "/api/scenarios/gamma/results", None, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bulk_counts() {
        let app = test_app(&[]);
        let response = send(&app, "POST", "/api/scenarios/all/stop", None, None).await;
        let json = json_body(response).await;
        assert_eq!(json["total"], 2);
        assert_eq!(json["succeeded"], 2);
        assert_eq!(json["failed"], 0);
        assert_eq!(json["results"]["beta"]["stdout"], "stopped\n");

        let response = send(&app, "POST", "/api/scenarios/all/reset", None, None).await;
        let json = json_body(response).await;
        assert_eq!(json["failed"], 2);
    }
}
