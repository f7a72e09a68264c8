//! Route handlers.
//!
//! Bucket calls block, so each one runs on the blocking thread pool.

use crate::AppState;
use crate::auth::Owner;
use crate::error::{HttpError, Result};
use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use objst::{Action, CONTENT_TYPE, ObjectId, ObjectModel, OpContext, Operation, Query, QueryResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> objst_common::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| HttpError::internal(format!("blocking task failed: {e}")))?
        .map_err(HttpError::from)
}

fn parse_id(raw: &str) -> Result<ObjectId> {
    raw.parse().map_err(HttpError::from)
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /objst
///
/// Body is an [`ObjectModel`]; `id` is ignored and `owner` is replaced by
/// the authenticated owner.
pub async fn create_object(
    State(state): State<Arc<AppState>>,
    axum::Extension(owner): axum::Extension<Owner>,
    Json(mut model): Json<ObjectModel>,
) -> Result<impl IntoResponse> {
    model.owner = owner.0;
    let bucket = Arc::clone(&state.bucket);
    let created = run_blocking(move || {
        let mut obj = model.into_object()?;
        bucket.create(&mut obj)?;
        Ok(obj.to_model().without_payload())
    })
    .await?;

    debug!("Created object {} via JSON", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

/// POST /objst/upload
///
/// Multipart form: the file part under the configured form key, an
/// optional `contentType` field (the part's own content type is used
/// otherwise) and an optional `name` field (defaults to the file name).
pub async fn upload_object(
    State(state): State<Arc<AppState>>,
    axum::Extension(owner): axum::Extension<Owner>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut file: Option<(Option<String>, Option<String>, Vec<u8>)> = None;
    let mut content_type = None;
    let mut name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| HttpError::bad_request(format!("invalid multipart body: {e}")))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        if field_name == state.form_key {
            let file_name = field.file_name().map(ToString::to_string);
            let part_type = field.content_type().map(ToString::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| HttpError::bad_request(format!("failed to read upload: {e}")))?;
            file = Some((file_name, part_type, data.to_vec()));
        } else if field_name == CONTENT_TYPE || field_name == "name" {
            let value = field
                .text()
                .await
                .map_err(|e| HttpError::bad_request(format!("invalid form field: {e}")))?;
            if field_name == CONTENT_TYPE {
                content_type = Some(value);
            } else {
                name = Some(value);
            }
        }
    }

    let (file_name, part_type, data) = file.ok_or_else(|| {
        HttpError::bad_request(format!("missing form field `{}`", state.form_key))
    })?;
    let name = name
        .or(file_name)
        .ok_or_else(|| HttpError::bad_request("upload has no file name"))?;
    let content_type = content_type.or(part_type);

    let bucket = Arc::clone(&state.bucket);
    let created = run_blocking(move || {
        let mut obj = objst::Object::new(name, owner.0)?;
        if let Some(ct) = content_type {
            obj.set_meta_key(CONTENT_TYPE, ct);
        }
        obj.write_payload(&data)?;
        bucket.create(&mut obj)?;
        Ok(obj.to_model().without_payload())
    })
    .await?;

    debug!("Uploaded object {} ({})", created.id, created.name);
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /objst/{id}
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    axum::Extension(owner): axum::Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Json<ObjectModel>> {
    let id = parse_id(&id)?;
    let bucket = Arc::clone(&state.bucket);
    let obj = run_blocking(move || bucket.is_authorized(owner.as_str(), &id)).await?;
    Ok(Json(obj.to_model()))
}

/// GET /objst/read/{id}
///
/// Raw payload with the stored content type.
pub async fn read_object(
    State(state): State<Arc<AppState>>,
    axum::Extension(owner): axum::Extension<Owner>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id)?;
    let bucket = Arc::clone(&state.bucket);
    let obj = run_blocking(move || bucket.is_authorized(owner.as_str(), &id)).await?;

    let content_type = obj
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    Ok(([(header::CONTENT_TYPE, content_type)], obj.payload().to_vec()).into_response())
}

/// DELETE /objst/{id}
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    axum::Extension(owner): axum::Extension<Owner>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    let bucket = Arc::clone(&state.bucket);
    run_blocking(move || {
        bucket.is_authorized(owner.as_str(), &id)?;
        bucket.delete_by_id(&id)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Body of POST /objst/query
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub params: BTreeMap<String, String>,
    pub action: Action,
    pub operation: Operation,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryResponse {
    Objects(Vec<ObjectModel>),
    Deleted(usize),
}

/// POST /objst/query
///
/// Always scoped to the authenticated owner. Returned objects carry no
/// payload; fetch it through `/objst/read/{id}`. Dropping the request
/// cancels a running scan.
pub async fn query_objects(
    State(state): State<Arc<AppState>>,
    axum::Extension(owner): axum::Extension<Owner>,
    Json(req): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let mut query = Query::new().action(req.action).operation(req.operation);
    for (key, value) in req.params {
        query = query.param(key, value);
    }
    if let Some(id) = req.id {
        query = query.id(id);
    }
    if let Some(name) = req.name {
        query = query.name(name);
    }
    // Last, so an `owner` param cannot widen the scope
    query = query.owner(owner.0);

    let token = CancellationToken::new();
    let _cancel_on_drop = token.clone().drop_guard();
    let ctx = OpContext::from_token(token);

    let bucket = Arc::clone(&state.bucket);
    let result = run_blocking(move || bucket.execute(&ctx, &query)).await?;
    Ok(Json(match result {
        QueryResult::Objects(objs) => QueryResponse::Objects(
            objs.iter()
                .map(|o| o.to_model().without_payload())
                .collect(),
        ),
        QueryResult::Deleted(n) => QueryResponse::Deleted(n),
    }))
}
