//! HTTP routes: tenant listing, per-tenant streams and command intake.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tracing::{info, instrument};

use tenantmux_core::{Message, SessionError, SessionRegistry, TenantDirectory, TenantRecord};

use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::stream;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub directory: TenantDirectory,
    pub registry: SessionRegistry,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(directory: TenantDirectory, registry: SessionRegistry) -> Self {
        Self {
            directory,
            registry,
            dispatcher: Arc::new(Dispatcher::default()),
        }
    }

    async fn tenant(&self, tenant_id: &str) -> Result<TenantRecord, ApiError> {
        self.directory
            .lookup(tenant_id)
            .await
            .ok_or_else(|| ApiError::tenant_not_found(tenant_id))
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tenants", get(list_tenants).post(add_tenant))
        .route("/tenants/{tenant_id}", delete(remove_tenant))
        .route("/{tenant_id}", get(tenant_info))
        .route(
            "/{tenant_id}/mcp",
            get(open_stream).post(post_command).delete(close_stream),
        )
        .route("/{tenant_id}/execute", post(execute))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[allow(clippy::cast_possible_wrap)]
fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": unix_timestamp(),
        "openStreams": state.registry.session_count().await,
    }))
}

/// `GET /tenants`
pub async fn list_tenants(State(state): State<AppState>) -> Json<Value> {
    let tenants: Vec<Value> = state
        .directory
        .list()
        .await
        .into_iter()
        .map(|t| json!({ "id": t.id, "name": t.name }))
        .collect();
    Json(json!({
        "tenants": tenants,
        "message": "Use /{tenant_id} to access a specific tenant",
    }))
}

/// `POST /tenants`: Upsert a tenant record.
#[instrument(skip(state, record), fields(tenant_id = %record.id))]
pub async fn add_tenant(
    State(state): State<AppState>,
    Json(record): Json<TenantRecord>,
) -> Result<Response, ApiError> {
    if !record.has_valid_id() {
        return Err(ApiError::BadRequest(format!(
            "Invalid tenant id {:?}",
            record.id
        )));
    }
    state.directory.add(record.clone()).await;
    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// `DELETE /tenants/{tenant_id}`: Remove a tenant and close its stream.
#[instrument(skip(state))]
pub async fn remove_tenant(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if !state.directory.remove(&tenant_id).await {
        return Err(ApiError::tenant_not_found(&tenant_id));
    }
    state.registry.close_session(&tenant_id).await;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /{tenant_id}`: Tenant details and where to open its stream.
pub async fn tenant_info(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Response {
    let Some(tenant) = state.directory.lookup(&tenant_id).await else {
        let err = SessionError::TenantNotFound { tenant_id };
        return (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": err.to_string(),
                "availableTenants": state.directory.ids().await,
            })),
        )
            .into_response();
    };

    Json(json!({
        "tenant": { "id": tenant.id, "name": tenant.name },
        "streamOpen": state.registry.get_session(&tenant.id).await.is_some(),
        "mcpEndpoint": format!("/{}/mcp", tenant.id),
        "message": "Open the stream at mcpEndpoint, then POST commands to the same path",
    }))
    .into_response()
}

/// `GET /{tenant_id}/mcp`: Open the tenant's SSE stream.
#[instrument(skip(state))]
pub async fn open_stream(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<Response, ApiError> {
    let tenant = state.tenant(&tenant_id).await?;
    let heartbeat = state.registry.config().heartbeat_interval();
    let sse = stream::open(&state.registry, &tenant.id, heartbeat).await;
    Ok(sse.into_response())
}

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// `POST /{tenant_id}/mcp`: A command correlated to the open stream.
///
/// The reply, if any, travels back over the stream; this call only
/// acknowledges delivery.
#[instrument(skip(state, query, body))]
pub async fn post_command(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<CommandQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let tenant = state.tenant(&tenant_id).await?;
    let message: Message = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid message: {e}")))?;

    let session = state
        .registry
        .get_session(&tenant.id)
        .await
        .ok_or_else(|| SessionError::NoOpenStream {
            tenant_id: tenant.id.clone(),
        })?;
    if let Some(expected) = query.session_id.as_deref()
        && expected != session.session_id()
    {
        return Err(SessionError::StreamReplaced {
            tenant_id: tenant.id.clone(),
        }
        .into());
    }

    if let Some(reply) = state.dispatcher.handle(&tenant, &message) {
        state.registry.route_command(&tenant.id, reply).await?;
    }
    Ok((StatusCode::ACCEPTED, "Accepted").into_response())
}

/// `DELETE /{tenant_id}/mcp`: Close the tenant's stream.
#[instrument(skip(state))]
pub async fn close_stream(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tenant = state.tenant(&tenant_id).await?;
    if state.registry.close_session(&tenant.id).await {
        info!(tenant_id = %tenant.id, "Stream closed on request");
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
}

/// `POST /{tenant_id}/execute`: Run a tool directly, outside any stream.
#[instrument(skip(state, request), fields(tool = %request.tool))]
pub async fn execute(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Response, ApiError> {
    let tenant = state.tenant(&tenant_id).await?;
    let tools = state.dispatcher.tools();

    let Some(tool) = tools.get(&request.tool) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": format!("Unsupported tool: {}", request.tool),
                "supportedTools": tools.names(),
            })),
        )
            .into_response());
    };

    let output = tool.call(&tenant, &request.arguments);
    Ok(Json(json!({
        "tenant": tenant.id,
        "tool": request.tool,
        "result": output.text,
        "isError": output.is_error,
        "timestamp": unix_timestamp(),
    }))
    .into_response())
}
