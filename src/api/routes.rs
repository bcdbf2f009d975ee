use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::access::AccessReport;
use crate::api::AuditApi;
use crate::audit::{EntryFilter, LogEntry, VerifyReport};
use crate::error::AuditError;
use crate::export::ExportArtifact;

pub const API_KEY_HEADER: &str = "x-api-key";

pub fn router(api: AuditApi) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/log/write", post(write_entry))
        .route("/log/list", get(list_entries))
        .route("/export/logs", post(export_logs))
        .route("/verify/chain", get(verify_chain))
        .route("/reports/access", get(access_report))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .into_inner(),
        )
        .with_state(api)
}

/// Error response: status plus `{"error": ...}` body
pub struct ApiError(StatusCode, String);

impl From<AuditError> for ApiError {
    fn from(err: AuditError) -> Self {
        let status = match &err {
            AuditError::AuthorizationError => StatusCode::FORBIDDEN,
            AuditError::WriteError(_) | AuditError::Sealed(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuditError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AuditError::ConfigError(_) | AuditError::DatabaseError(_) => {
                error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        ApiError(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

/// The caller's API key, provided it resolves to a principal
fn credential<'a>(api: &AuditApi, headers: &'a HeaderMap) -> Result<&'a str, ApiError> {
    let unauthenticated = || ApiError(StatusCode::UNAUTHORIZED, "missing or invalid API key".to_string());

    let key = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|k| !k.is_empty())
        .ok_or_else(unauthenticated)?;
    api.principal(key).ok_or_else(unauthenticated)?;
    Ok(key)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "audit-chain",
        "timestamp": Utc::now()
    }))
}

#[derive(Debug, Deserialize)]
pub struct WriteRequest {
    pub case_id: String,
    pub action: String,
    #[serde(default)]
    pub details: Map<String, Value>,
}

async fn write_entry(
    State(api): State<AuditApi>,
    headers: HeaderMap,
    Json(request): Json<WriteRequest>,
) -> Result<Json<LogEntry>, ApiError> {
    let key = credential(&api, &headers)?;
    let entry = api
        .write(key, &request.case_id, &request.action, request.details)
        .await?;

    Ok(Json(entry))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub case_id: Option<String>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl From<ListQuery> for EntryFilter {
    fn from(query: ListQuery) -> Self {
        EntryFilter {
            case_id: query.case_id,
            action: query.action,
            since: query.since,
            until: query.until,
        }
    }
}

async fn list_entries(
    State(api): State<AuditApi>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let key = credential(&api, &headers)?;
    let filter = EntryFilter::from(query);
    let entries = api.list(key, Some(&filter)).await?;

    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_mask")]
    pub mask: bool,
    #[serde(default = "default_format")]
    pub format: String,
}

fn default_mask() -> bool {
    true
}

fn default_format() -> String {
    "json".to_string()
}

async fn export_logs(
    State(api): State<AuditApi>,
    headers: HeaderMap,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportArtifact>, ApiError> {
    let key = credential(&api, &headers)?;
    let artifact = api.export(key, request.mask, &request.format).await?;

    Ok(Json(artifact))
}

async fn verify_chain(
    State(api): State<AuditApi>,
    headers: HeaderMap,
) -> Result<Json<VerifyReport>, ApiError> {
    let key = credential(&api, &headers)?;
    Ok(Json(api.verify(key).await?))
}

async fn access_report(
    State(api): State<AuditApi>,
    headers: HeaderMap,
) -> Result<Json<AccessReport>, ApiError> {
    let key = credential(&api, &headers)?;
    Ok(Json(api.access_report(key).await?))
}
