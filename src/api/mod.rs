//! HTTP API server for dslflow.
//!
//! JSON endpoints start and inspect workflow instances; a small HTML form at
//! `/` lets a person answer pending approvals.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::dsl::{coerce_value, parse_workflow, parse_workflow_value, WorkflowDefinition};
use crate::engine::WorkflowRuntime;
use crate::error::{Error, Result};

/// Create a sanitized error response for external consumers.
///
/// The full error is logged; clients only get the code and a safe message.
fn external_error_response(e: Error) -> (StatusCode, Json<Value>) {
    error!("API error: {:?}", e);

    let status =
        StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(e.to_external_json()))
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub runtime: WorkflowRuntime,
}

impl AppState {
    pub fn new(runtime: WorkflowRuntime) -> Self {
        Self { runtime }
    }
}

/// Create the API router (without state applied).
pub fn create_api_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(approval_form))
        .route("/decision", post(submit_decision))
        .route("/api/health", get(health_check))
        .route("/api/workflows", get(list_instances).post(start_workflow))
        .route("/api/workflows/{id}", get(get_instance))
        .route("/api/workflows/{id}/signal", post(signal_instance))
}

/// Create the complete router with state, request limit and tracing.
pub fn create_router(state: AppState, max_concurrency: usize) -> Router {
    create_api_routes()
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrency.max(1)))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Workflow Endpoints
// ============================================================================

#[derive(Debug, Deserialize)]
struct StartRequest {
    /// Document as a JSON object, or JSON/YAML text
    workflow: Value,
    #[serde(default)]
    overrides: Map<String, Value>,
}

fn definition_from_request(request: StartRequest) -> Result<WorkflowDefinition> {
    let mut definition = match request.workflow {
        Value::String(text) => parse_workflow(&text)?,
        other => parse_workflow_value(other)?,
    };

    // String overrides follow the CLI's key=value coercion
    let overrides = request
        .overrides
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(raw) => (key, coerce_value(&raw)),
            other => (key, other),
        })
        .collect();
    definition.merge_input_values(overrides);
    Ok(definition)
}

async fn start_workflow(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> impl IntoResponse {
    let definition = match definition_from_request(request) {
        Ok(d) => d,
        Err(e) => return external_error_response(e).into_response(),
    };
    let name = definition.name.clone();

    match state.runtime.start(definition).await {
        Ok(instance_id) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "instance_id": instance_id,
                "workflow_name": name,
            })),
        )
            .into_response(),
        Err(e) => external_error_response(e).into_response(),
    }
}

async fn list_instances(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "instances": state.runtime.list().await }))
}

async fn get_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.runtime.status(&id).await {
        Ok(snapshot) => Json(json!(snapshot)).into_response(),
        Err(e) => external_error_response(e).into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct SignalRequest {
    decision: String,
}

async fn signal_instance(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SignalRequest>,
) -> impl IntoResponse {
    match state.runtime.deliver_signal(&id, &request.decision).await {
        Ok(()) => Json(json!({
            "instance_id": id,
            "decision": request.decision.trim(),
        }))
        .into_response(),
        Err(e) => external_error_response(e).into_response(),
    }
}

// ============================================================================
// Approval Form
// ============================================================================

const APPROVAL_FORM: &str = r#"<!DOCTYPE html>
<html>
<head><title>dslflow approvals</title></head>
<body>
  <h1>Workflow approval</h1>
  <form method="post" action="/decision">
    <label>Workflow ID <input type="text" name="workflow_id" required></label><br>
    <label>Decision
      <select name="decision">
        <option value="APPROVED">APPROVED</option>
        <option value="REJECTED">REJECTED</option>
      </select>
    </label><br>
    <button type="submit">Submit</button>
  </form>
</body>
</html>
"#;

async fn approval_form() -> Html<&'static str> {
    Html(APPROVAL_FORM)
}

#[derive(Debug, Deserialize)]
struct DecisionForm {
    workflow_id: String,
    decision: String,
}

async fn submit_decision(
    State(state): State<AppState>,
    Form(form): Form<DecisionForm>,
) -> impl IntoResponse {
    let workflow_id = form.workflow_id.trim();
    match state.runtime.deliver_signal(workflow_id, &form.decision).await {
        Ok(()) => {
            info!("Approval form answered {} for {}", form.decision.trim(), workflow_id);
            Html(format!(
                "<p>Decision <b>{}</b> sent to workflow <b>{}</b>.</p><p><a href=\"/\">Back</a></p>",
                escape_html(form.decision.trim()),
                escape_html(workflow_id)
            ))
            .into_response()
        }
        Err(e) => {
            error!("Approval form error: {:?}", e);
            let status =
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
            (
                status,
                Html(format!(
                    "<p>Could not deliver decision: {}</p><p><a href=\"/\">Back</a></p>",
                    escape_html(&e.external_message())
                )),
            )
                .into_response()
        }
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
