use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::ApiError;
use crate::io::{Library, StoreError};
use crate::model::backup::PlanFile;
use crate::model::plan::PlanStatus;
use crate::model::settings::SettingsUpdate;
use crate::model::view::{CreateViewRequest, UpdateViewRequest};
use crate::ops::export::{ExportFormat, ExportOptions};
use crate::ops::search::DEFAULT_LIMIT;
use crate::ops::subtask_ops::SubtaskAction;

type AppState = State<Arc<Library>>;
type ApiResult = Result<Json<Value>, ApiError>;

const MAX_SEARCH_LIMIT: usize = 100;

pub(super) fn api(lib: Arc<Library>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/bulk-delete", post(bulk_delete))
        .route("/api/plans/bulk-status", post(bulk_status))
        .route(
            "/api/plans/:filename",
            get(get_plan).put(update_plan).delete(delete_plan),
        )
        .route("/api/plans/:filename/rename", post(rename_plan))
        .route("/api/plans/:filename/status", patch(update_status))
        .route("/api/plans/:filename/frontmatter", patch(update_frontmatter))
        .route("/api/plans/:filename/subtasks", patch(subtask))
        .route("/api/plans/:filename/transitions", get(transitions))
        .route("/api/plans/:filename/conflict", get(check_conflict))
        .route("/api/plans/:filename/dependencies", get(plan_dependencies))
        .route("/api/search", get(search))
        .route("/api/dependencies", get(dependency_graph))
        .route("/api/archive", get(list_archived))
        .route("/api/archive/cleanup", post(cleanup_archive))
        .route("/api/archive/:filename", axum::routing::delete(delete_archived))
        .route("/api/archive/:filename/restore", post(restore_archived))
        .route("/api/notifications", get(notifications))
        .route("/api/notifications/mark-all-read", post(mark_all_read))
        .route("/api/notifications/:id/read", patch(mark_read))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/views", get(list_views).post(create_view))
        .route(
            "/api/views/:id",
            get(get_view).put(update_view).delete(delete_view),
        )
        .route("/api/check", get(check))
        .route("/api/export", get(export))
        .route("/api/import/markdown", post(import_markdown))
        .route("/api/backup", post(create_backup))
        .route("/api/backups", get(list_backups))
        .route("/api/backup/:id/restore", post(restore_backup))
        .with_state(lib)
}

/// Run a library call on the blocking pool.
async fn blocking<T, F>(lib: &Arc<Library>, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Library) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let lib = Arc::clone(lib);
    tokio::task::spawn_blocking(move || f(&lib))
        .await
        .map_err(ApiError::internal)?
        .map_err(ApiError::from)
}

fn to_json<T: serde::Serialize>(value: T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(ApiError::internal)
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(v)| v)
        .map_err(|e| ApiError::bad_request("Invalid request").with_details(json!(e.body_text())))
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    params
        .map(|Query(v)| v)
        .map_err(|e| ApiError::bad_request("Invalid query").with_details(json!(e.body_text())))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
    }))
}

// Plans

async fn list_plans(State(lib): AppState) -> ApiResult {
    let plans = blocking(&lib, |lib| Ok(lib.list_plans())).await?;
    Ok(Json(json!({ "total": plans.len(), "plans": plans })))
}

#[derive(Deserialize)]
struct CreateBody {
    content: String,
    #[serde(default)]
    filename: Option<String>,
}

async fn create_plan(
    State(lib): AppState,
    payload: Result<Json<CreateBody>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let req = body(payload)?;
    let meta = blocking(&lib, move |lib| lib.create_plan(&req.content, req.filename.as_deref())).await?;
    Ok((StatusCode::CREATED, to_json(meta)?))
}

async fn get_plan(State(lib): AppState, Path(filename): Path<String>) -> ApiResult {
    to_json(blocking(&lib, move |lib| lib.get_plan(&filename)).await?)
}

#[derive(Deserialize)]
struct UpdateBody {
    content: String,
}

async fn update_plan(
    State(lib): AppState,
    Path(filename): Path<String>,
    payload: Result<Json<UpdateBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    to_json(blocking(&lib, move |lib| lib.update_plan(&filename, &req.content)).await?)
}

#[derive(Deserialize, Default)]
struct DeleteParams {
    #[serde(default)]
    permanent: Option<String>,
}

impl DeleteParams {
    fn permanent(&self) -> bool {
        self.permanent.as_deref() == Some("true")
    }
}

/// Archives unless `?permanent=true`.
async fn delete_plan(
    State(lib): AppState,
    Path(filename): Path<String>,
    params: Result<Query<DeleteParams>, QueryRejection>,
) -> ApiResult {
    let permanent = query(params)?.permanent();
    blocking(&lib, move |lib| lib.delete_plan(&filename, !permanent)).await?;
    let message = if permanent { "Plan deleted" } else { "Plan archived" };
    Ok(Json(json!({ "success": true, "message": message })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameBody {
    new_filename: String,
}

async fn rename_plan(
    State(lib): AppState,
    Path(filename): Path<String>,
    payload: Result<Json<RenameBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    to_json(blocking(&lib, move |lib| lib.rename_plan(&filename, &req.new_filename)).await?)
}

#[derive(Deserialize)]
struct StatusBody {
    status: PlanStatus,
}

async fn update_status(
    State(lib): AppState,
    Path(filename): Path<String>,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    to_json(blocking(&lib, move |lib| lib.update_status(&filename, req.status)).await?)
}

#[derive(Deserialize)]
struct FrontmatterBody {
    field: String,
    #[serde(default)]
    value: Value,
}

async fn update_frontmatter(
    State(lib): AppState,
    Path(filename): Path<String>,
    payload: Result<Json<FrontmatterBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    to_json(
        blocking(&lib, move |lib| {
            lib.update_frontmatter_field(&filename, &req.field, req.value)
        })
        .await?,
    )
}

async fn subtask(
    State(lib): AppState,
    Path(filename): Path<String>,
    payload: Result<Json<SubtaskAction>, JsonRejection>,
) -> ApiResult {
    let action = body(payload)?;
    to_json(blocking(&lib, move |lib| lib.apply_subtask(&filename, action)).await?)
}

async fn transitions(State(lib): AppState, Path(filename): Path<String>) -> ApiResult {
    let available = blocking(&lib, move |lib| lib.available_transitions(&filename)).await?;
    Ok(Json(json!({ "transitions": available })))
}

async fn check_conflict(State(lib): AppState, Path(filename): Path<String>) -> ApiResult {
    to_json(blocking(&lib, move |lib| lib.check_conflict(&filename)).await?)
}

async fn plan_dependencies(State(lib): AppState, Path(filename): Path<String>) -> ApiResult {
    to_json(blocking(&lib, move |lib| lib.plan_dependencies(&filename)).await?)
}

#[derive(Deserialize)]
struct BulkDeleteBody {
    filenames: Vec<String>,
}

async fn bulk_delete(
    State(lib): AppState,
    params: Result<Query<DeleteParams>, QueryRejection>,
    payload: Result<Json<BulkDeleteBody>, JsonRejection>,
) -> ApiResult {
    let permanent = query(params)?.permanent();
    let req = body(payload)?;
    to_json(blocking(&lib, move |lib| Ok(lib.bulk_delete(&req.filenames, !permanent))).await?)
}

#[derive(Deserialize)]
struct BulkStatusBody {
    filenames: Vec<String>,
    status: PlanStatus,
}

async fn bulk_status(
    State(lib): AppState,
    payload: Result<Json<BulkStatusBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    to_json(blocking(&lib, move |lib| Ok(lib.bulk_status(&req.filenames, req.status))).await?)
}

// Search and dependencies

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search(State(lib): AppState, params: Result<Query<SearchParams>, QueryRejection>) -> ApiResult {
    let params = query(params)?;
    if params.q.trim().is_empty() {
        return Err(ApiError::bad_request("Invalid query").with_details(json!("q is required")));
    }
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(ApiError::bad_request("Invalid query")
            .with_details(json!(format!("limit must be between 1 and {}", MAX_SEARCH_LIMIT))));
    }
    let q = params.q.clone();
    let results = blocking(&lib, move |lib| Ok(lib.search(&q, limit))).await?;
    Ok(Json(json!({
        "total": results.len(),
        "query": params.q,
        "results": results,
    })))
}

async fn dependency_graph(State(lib): AppState) -> ApiResult {
    to_json(blocking(&lib, |lib| Ok(lib.dependency_graph())).await?)
}

// Archive

async fn list_archived(State(lib): AppState) -> ApiResult {
    let archived = blocking(&lib, |lib| Ok(lib.archived())).await?;
    Ok(Json(json!({ "total": archived.len(), "archived": archived })))
}

async fn restore_archived(State(lib): AppState, Path(filename): Path<String>) -> ApiResult {
    let name = filename.clone();
    blocking(&lib, move |lib| lib.restore_archived(&name)).await?;
    Ok(Json(json!({ "success": true, "filename": filename })))
}

async fn delete_archived(State(lib): AppState, Path(filename): Path<String>) -> ApiResult {
    blocking(&lib, move |lib| lib.delete_archived(&filename)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn cleanup_archive(State(lib): AppState) -> ApiResult {
    let deleted = blocking(&lib, |lib| lib.cleanup_archive()).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

// Notifications

async fn notifications(State(lib): AppState) -> ApiResult {
    to_json(blocking(&lib, |lib| Ok(lib.notifications())).await?)
}

async fn mark_read(State(lib): AppState, Path(id): Path<String>) -> ApiResult {
    blocking(&lib, move |lib| lib.mark_read(&id)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn mark_all_read(State(lib): AppState) -> ApiResult {
    let marked = blocking(&lib, |lib| lib.mark_all_read()).await?;
    Ok(Json(json!({ "success": true, "marked": marked })))
}

// Settings

async fn get_settings(State(lib): AppState) -> ApiResult {
    to_json(blocking(&lib, |lib| Ok(lib.settings().get())).await?)
}

async fn update_settings(
    State(lib): AppState,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> ApiResult {
    let update = body(payload)?;
    to_json(blocking(&lib, move |lib| lib.settings().update(update)).await?)
}

// Views

async fn list_views(State(lib): AppState) -> ApiResult {
    let views = blocking(&lib, |lib| Ok(lib.views().list())).await?;
    Ok(Json(json!({ "views": views })))
}

async fn get_view(State(lib): AppState, Path(id): Path<String>) -> ApiResult {
    to_json(blocking(&lib, move |lib| lib.views().get(&id)).await?)
}

async fn create_view(
    State(lib): AppState,
    payload: Result<Json<CreateViewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request = body(payload)?;
    let view = blocking(&lib, move |lib| lib.views().create(request)).await?;
    Ok((StatusCode::CREATED, to_json(view)?))
}

async fn update_view(
    State(lib): AppState,
    Path(id): Path<String>,
    payload: Result<Json<UpdateViewRequest>, JsonRejection>,
) -> ApiResult {
    let update = body(payload)?;
    to_json(blocking(&lib, move |lib| lib.views().update(&id, update)).await?)
}

async fn delete_view(State(lib): AppState, Path(id): Path<String>) -> ApiResult {
    blocking(&lib, move |lib| lib.views().delete(&id)).await?;
    Ok(Json(json!({ "success": true })))
}

async fn check(State(lib): AppState) -> ApiResult {
    to_json(blocking(&lib, |lib| Ok(lib.check())).await?)
}

// Import, export and backups

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ExportParams {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    filter_status: Option<String>,
    /// Comma separated
    #[serde(default)]
    filter_tags: Option<String>,
    #[serde(default)]
    include_archived: Option<String>,
}

impl ExportParams {
    fn parse(self) -> Result<(ExportFormat, ExportOptions), ApiError> {
        let format = match self.format.as_deref() {
            None => ExportFormat::Json,
            Some(f) => ExportFormat::parse(f)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown export format: {}", f)))?,
        };
        let filter_status = self
            .filter_status
            .map(|s| PlanStatus::parse(&s).ok_or_else(|| ApiError::bad_request(format!("Invalid status: {}", s))))
            .transpose()?;
        let filter_tags = self
            .filter_tags
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let options = ExportOptions {
            include_archived: self.include_archived.as_deref() == Some("true"),
            filter_status,
            filter_tags,
        };
        Ok((format, options))
    }
}

/// The export as a download.
async fn export(
    State(lib): AppState,
    params: Result<Query<ExportParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let (format, options) = query(params)?.parse()?;
    let bytes = blocking(&lib, move |lib| lib.export(format, &options)).await?;
    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", format.file_name()),
        ),
    ];
    Ok((headers, bytes).into_response())
}

#[derive(Deserialize)]
struct ImportBody {
    files: Vec<PlanFile>,
}

async fn import_markdown(
    State(lib): AppState,
    payload: Result<Json<ImportBody>, JsonRejection>,
) -> ApiResult {
    let req = body(payload)?;
    if req.files.is_empty() {
        return Err(ApiError::bad_request("Invalid request")
            .with_details(json!("at least one file is required")));
    }
    to_json(blocking(&lib, move |lib| Ok(lib.import_markdown(req.files))).await?)
}

async fn create_backup(State(lib): AppState) -> Result<(StatusCode, Json<Value>), ApiError> {
    let info = blocking(&lib, |lib| lib.create_backup()).await?;
    Ok((StatusCode::CREATED, to_json(info)?))
}

async fn list_backups(State(lib): AppState) -> ApiResult {
    let backups = blocking(&lib, |lib| Ok(lib.list_backups())).await?;
    Ok(Json(json!({ "backups": backups })))
}

async fn restore_backup(State(lib): AppState, Path(id): Path<String>) -> ApiResult {
    to_json(blocking(&lib, move |lib| lib.restore_backup(&id)).await?)
}
