use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::db::store::{CatalogStore, QueueStore};
use crate::models::{NewQueueItem, ParsingFailure, QueueItem, QueueStats};
use crate::service::customer_resolver::BranchOverlap;
use crate::service::extractor::TextExtractor;
use crate::service::pipeline::{BatchReport, ExportReport, Pipeline};

/// 统一响应体
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FailureQuery {
    #[serde(default)]
    pub include_resolved: bool,
    #[serde(default = "default_failure_limit")]
    pub limit: i64,
}

fn default_failure_limit() -> i64 {
    100
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecoverResponse {
    pub recovered: u64,
}

/// 构建路由
pub fn router<S, E>(pipeline: Pipeline<S, E>) -> Router
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    Router::new()
        .route("/health", get(health_check))
        .route("/api/pipeline/stats", get(pipeline_stats::<S, E>))
        .route("/api/pipeline/process", post(process_batch::<S, E>))
        .route("/api/pipeline/export", post(export_batch::<S, E>))
        .route("/api/pipeline/recover-stale", post(recover_stale::<S, E>))
        .route("/api/queue", post(enqueue::<S, E>))
        .route("/api/queue/:id", get(get_queue_item::<S, E>))
        .route("/api/queue/:id/resubmit", post(resubmit::<S, E>))
        .route("/api/parsing-failures", get(list_failures::<S, E>))
        .route("/api/parsing-failures/:id/resolve", post(resolve_failure::<S, E>))
        .route("/api/customers/:id/branch-overlaps", get(branch_overlaps::<S, E>))
        .with_state(pipeline)
}

/// 健康检查
pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn pipeline_stats<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
) -> Result<Json<ApiResponse<QueueStats>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let stats = pipeline.stats().await?;
    Ok(ApiResponse::ok("queue statistics", stats))
}

/// 立即处理一批 pending 项
pub async fn process_batch<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
) -> Result<Json<ApiResponse<BatchReport>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let report = pipeline.run_batch().await?;
    Ok(ApiResponse::ok(
        format!(
            "{} completed, {} failed, {} skipped",
            report.completed, report.failed, report.skipped
        ),
        report,
    ))
}

pub async fn export_batch<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
) -> Result<Json<ApiResponse<ExportReport>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let report = pipeline.export_batch().await?;
    Ok(ApiResponse::ok(
        format!("exported {} item(s)", report.exported),
        report,
    ))
}

pub async fn recover_stale<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
) -> Result<Json<ApiResponse<RecoverResponse>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let recovered = pipeline.recover_stale().await?;
    Ok(ApiResponse::ok(
        format!("requeued {} item(s)", recovered),
        RecoverResponse { recovered },
    ))
}

pub async fn enqueue<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
    Json(req): Json<NewQueueItem>,
) -> Result<Response, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    if req.filename.trim().is_empty() || req.file_path.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "filename and file_path are required".to_string(),
        ));
    }
    let item = pipeline.enqueue(req).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(format!("queued item {}", item.id), item),
    )
        .into_response())
}

pub async fn get_queue_item<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<QueueItem>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let item = pipeline.get_item(id).await?;
    Ok(ApiResponse::ok(item.status.to_string(), item))
}

pub async fn resubmit<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let item = pipeline.resubmit(id).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(format!("item {} resubmitted as {}", id, item.id), item),
    )
        .into_response())
}

pub async fn list_failures<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
    Query(query): Query<FailureQuery>,
) -> Result<Json<ApiResponse<Vec<ParsingFailure>>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    if query.limit <= 0 {
        return Err(ApiError::BadRequest("limit must be positive".to_string()));
    }
    let failures = pipeline
        .list_failures(query.include_resolved, query.limit)
        .await?;
    Ok(ApiResponse::ok(
        format!("{} failure(s)", failures.len()),
        failures,
    ))
}

pub async fn resolve_failure<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
    Path(id): Path<i64>,
    body: Option<Json<ResolveRequest>>,
) -> Result<Json<ApiResponse<ParsingFailure>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let notes = body.and_then(|Json(req)| req.notes);
    let failure = pipeline.resolve_failure(id, notes).await?;
    Ok(ApiResponse::ok(format!("failure {} resolved", id), failure))
}

/// 分店识别串配置检查
pub async fn branch_overlaps<S, E>(
    State(pipeline): State<Pipeline<S, E>>,
    Path(customer_id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<BranchOverlap>>>, ApiError>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    let overlaps = pipeline.branch_overlaps(customer_id).await?;
    Ok(ApiResponse::ok(
        format!("{} overlapping pair(s)", overlaps.len()),
        overlaps,
    ))
}
