use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use crate::db::store::{CatalogStore, QueueStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    BranchIdentifier, Customer, ExportStatus, FailureType, NewParsingFailure, NewQueueItem,
    ParsingFailure, ProductMapping, QueueItem, QueueSource, QueueStats, QueueStatus,
};

macro_rules! queue_columns {
    () => {
        "id, source, source_id, filename, file_path, sender_email, customer_override,
         customer_id, status, parse_result, export_status, export_path, error_message,
         resubmitted_from, created_at, processing_started_at, completed_at, exported_at,
         updated_at"
    };
}

macro_rules! failure_columns {
    () => {
        "id, queue_item_id, filename, customer_email, error_type, error_message, debug_info,
         extracted_text, unmapped_products, resolved, resolution_notes, created_at, resolved_at"
    };
}

/// invoice_queue 行 (状态列为 TEXT)
#[derive(Debug, FromRow)]
struct QueueItemRow {
    id: i64,
    source: String,
    source_id: Option<String>,
    filename: String,
    file_path: String,
    sender_email: Option<String>,
    customer_override: Option<i64>,
    customer_id: Option<i64>,
    status: String,
    parse_result: Option<String>,
    export_status: Option<String>,
    export_path: Option<String>,
    error_message: Option<String>,
    resubmitted_from: Option<i64>,
    created_at: DateTime<Utc>,
    processing_started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    exported_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<QueueItemRow> for QueueItem {
    type Error = StoreError;

    fn try_from(row: QueueItemRow) -> Result<Self, Self::Error> {
        Ok(QueueItem {
            id: row.id,
            source: row.source.parse::<QueueSource>().map_err(StoreError::Corrupt)?,
            source_id: row.source_id,
            filename: row.filename,
            file_path: row.file_path,
            sender_email: row.sender_email,
            customer_override: row.customer_override,
            customer_id: row.customer_id,
            status: row.status.parse::<QueueStatus>().map_err(StoreError::Corrupt)?,
            parse_result: row.parse_result,
            export_status: row
                .export_status
                .map(|s| s.parse::<ExportStatus>())
                .transpose()
                .map_err(StoreError::Corrupt)?,
            export_path: row.export_path,
            error_message: row.error_message,
            resubmitted_from: row.resubmitted_from,
            created_at: row.created_at,
            processing_started_at: row.processing_started_at,
            completed_at: row.completed_at,
            exported_at: row.exported_at,
            updated_at: row.updated_at,
        })
    }
}

/// parsing_failures 行 (JSON 以 TEXT 存储)
#[derive(Debug, FromRow)]
struct FailureRow {
    id: i64,
    queue_item_id: Option<i64>,
    filename: String,
    customer_email: Option<String>,
    error_type: String,
    error_message: String,
    debug_info: String,
    extracted_text: String,
    unmapped_products: String,
    resolved: bool,
    resolution_notes: Option<String>,
    created_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<FailureRow> for ParsingFailure {
    type Error = StoreError;

    fn try_from(row: FailureRow) -> Result<Self, Self::Error> {
        Ok(ParsingFailure {
            id: row.id,
            queue_item_id: row.queue_item_id,
            filename: row.filename,
            customer_email: row.customer_email,
            error_type: row.error_type.parse::<FailureType>().map_err(StoreError::Corrupt)?,
            error_message: row.error_message,
            debug_info: serde_json::from_str(&row.debug_info)?,
            extracted_text: row.extracted_text,
            unmapped_products: serde_json::from_str(&row.unmapped_products)?,
            resolved: row.resolved,
            resolution_notes: row.resolution_notes,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
        })
    }
}

/// 查询启用的客户 (邮箱已归一化为小写)
pub async fn get_customer_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<Customer>, sqlx::Error> {
    sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, email, unique_alias, customer_name, currency,
               vat_rate, vat_inclusive, payment_terms, delivery_calendar, active
        FROM customers
        WHERE lower(email) = $1 AND active
        "#
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn get_customer(pool: &PgPool, id: i64) -> Result<Option<Customer>, sqlx::Error> {
    sqlx::query_as::<_, Customer>(
        r#"
        SELECT id, email, unique_alias, customer_name, currency,
               vat_rate, vat_inclusive, payment_terms, delivery_calendar, active
        FROM customers
        WHERE id = $1 AND active
        "#
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// 分店识别串 (按配置顺序)
pub async fn list_branches(
    pool: &PgPool,
    customer_id: i64,
) -> Result<Vec<BranchIdentifier>, sqlx::Error> {
    sqlx::query_as::<_, BranchIdentifier>(
        r#"
        SELECT id, customer_id, branch_identifier, branch_name, delivery_address
        FROM branch_identifiers
        WHERE customer_id = $1
        ORDER BY id ASC
        "#
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

pub async fn list_active_mappings(
    pool: &PgPool,
    customer_id: i64,
) -> Result<Vec<ProductMapping>, sqlx::Error> {
    sqlx::query_as::<_, ProductMapping>(
        r#"
        SELECT id, customer_id, lpo_product_name, system_product_name,
               unit_price, unit, vat_rate, currency, active
        FROM product_mappings
        WHERE customer_id = $1 AND active
        ORDER BY id ASC
        "#
    )
    .bind(customer_id)
    .fetch_all(pool)
    .await
}

pub async fn insert_queue_item(
    pool: &PgPool,
    item: &NewQueueItem,
    now: DateTime<Utc>,
) -> StoreResult<QueueItem> {
    let row = sqlx::query_as::<_, QueueItemRow>(concat!(
        "INSERT INTO invoice_queue (
            source, source_id, filename, file_path, sender_email,
            customer_override, status, resubmitted_from, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8, $8)
        RETURNING ",
        queue_columns!()
    ))
    .bind(item.source.as_str())
    .bind(&item.source_id)
    .bind(&item.filename)
    .bind(&item.file_path)
    .bind(&item.sender_email)
    .bind(item.customer_override)
    .bind(item.resubmitted_from)
    .bind(now)
    .fetch_one(pool)
    .await?;
    row.try_into()
}

pub async fn get_queue_item(pool: &PgPool, id: i64) -> StoreResult<Option<QueueItem>> {
    let row = sqlx::query_as::<_, QueueItemRow>(concat!(
        "SELECT ",
        queue_columns!(),
        " FROM invoice_queue WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(QueueItem::try_from).transpose()
}

/// 待处理队列项 (按入队时间升序)
pub async fn list_pending_ids(pool: &PgPool, limit: i64) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT id FROM invoice_queue
        WHERE status = 'pending'
        ORDER BY created_at ASC, id ASC
        LIMIT $1
        "#
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// 原子认领: 只有当前状态仍为 pending 的一方能更新成功
pub async fn claim_pending(
    pool: &PgPool,
    id: i64,
    now: DateTime<Utc>,
) -> StoreResult<Option<QueueItem>> {
    let row = sqlx::query_as::<_, QueueItemRow>(concat!(
        "UPDATE invoice_queue
         SET status = 'processing', processing_started_at = $2, updated_at = $2
         WHERE id = $1 AND status = 'pending'
         RETURNING ",
        queue_columns!()
    ))
    .bind(id)
    .bind(now)
    .fetch_optional(pool)
    .await?;
    row.map(QueueItem::try_from).transpose()
}

pub async fn complete_item(
    pool: &PgPool,
    id: i64,
    customer_id: i64,
    parse_result: &str,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_queue
        SET status = 'completed', customer_id = $2, parse_result = $3,
            export_status = 'pending', error_message = NULL,
            completed_at = $4, updated_at = $4
        WHERE id = $1 AND status = 'processing'
        "#
    )
    .bind(id)
    .bind(customer_id)
    .bind(parse_result)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// 标记失败并写入失败记录 (同一事务)
pub async fn fail_item(
    pool: &PgPool,
    id: i64,
    customer_id: Option<i64>,
    failure: &NewParsingFailure,
    now: DateTime<Utc>,
) -> StoreResult<Option<i64>> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE invoice_queue
        SET status = 'failed', customer_id = $2, error_message = $3, updated_at = $4
        WHERE id = $1 AND status = 'processing'
        "#
    )
    .bind(id)
    .bind(customer_id)
    .bind(&failure.error_message)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(None);
    }

    let failure_id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO parsing_failures (
            queue_item_id, filename, customer_email, error_type, error_message,
            debug_info, extracted_text, unmapped_products, resolved, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9)
        RETURNING id
        "#
    )
    .bind(failure.queue_item_id)
    .bind(&failure.filename)
    .bind(&failure.customer_email)
    .bind(failure.error_type.as_str())
    .bind(&failure.error_message)
    .bind(serde_json::to_string(&failure.debug_info)?)
    .bind(&failure.extracted_text)
    .bind(serde_json::to_string(&failure.unmapped_products)?)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(failure_id))
}

pub async fn requeue_stale(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE invoice_queue
        SET status = 'pending', processing_started_at = NULL, updated_at = $2
        WHERE status = 'processing' AND processing_started_at < $1
        "#
    )
    .bind(cutoff)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_exportable(pool: &PgPool, limit: i64) -> StoreResult<Vec<QueueItem>> {
    let rows = sqlx::query_as::<_, QueueItemRow>(concat!(
        "SELECT ",
        queue_columns!(),
        " FROM invoice_queue
          WHERE status = 'completed' AND export_status IS DISTINCT FROM 'exported'
          ORDER BY completed_at ASC, id ASC
          LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(QueueItem::try_from).collect()
}

/// 整批标记已导出: 影响行数与请求不一致时回滚
pub async fn mark_exported(
    pool: &PgPool,
    ids: &[i64],
    export_path: &str,
    now: DateTime<Utc>,
) -> StoreResult<u64> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        UPDATE invoice_queue
        SET status = 'exported', export_status = 'exported', export_path = $2,
            exported_at = $3, updated_at = $3
        WHERE id = ANY($1)
          AND status = 'completed'
          AND export_status IS DISTINCT FROM 'exported'
        "#
    )
    .bind(ids)
    .bind(export_path)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() != ids.len() as u64 {
        tx.rollback().await?;
        return Err(StoreError::InvalidState(format!(
            "{} of {} items were no longer exportable",
            ids.len() as u64 - result.rows_affected(),
            ids.len()
        )));
    }

    tx.commit().await?;
    Ok(result.rows_affected())
}

pub async fn get_failure(pool: &PgPool, id: i64) -> StoreResult<Option<ParsingFailure>> {
    let row = sqlx::query_as::<_, FailureRow>(concat!(
        "SELECT ",
        failure_columns!(),
        " FROM parsing_failures WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.map(ParsingFailure::try_from).transpose()
}

pub async fn list_failures(
    pool: &PgPool,
    include_resolved: bool,
    limit: i64,
) -> StoreResult<Vec<ParsingFailure>> {
    let rows = sqlx::query_as::<_, FailureRow>(concat!(
        "SELECT ",
        failure_columns!(),
        " FROM parsing_failures
          WHERE ($1 OR NOT resolved)
          ORDER BY created_at DESC, id DESC
          LIMIT $2"
    ))
    .bind(include_resolved)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(ParsingFailure::try_from).collect()
}

pub async fn resolve_failure(
    pool: &PgPool,
    id: i64,
    notes: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE parsing_failures
        SET resolved = TRUE, resolved_at = $2, resolution_notes = $3
        WHERE id = $1 AND NOT resolved
        "#
    )
    .bind(id)
    .bind(now)
    .bind(notes)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn queue_stats(pool: &PgPool) -> Result<QueueStats, sqlx::Error> {
    let counts = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT status, count(*) FROM invoice_queue GROUP BY status
        "#
    )
    .fetch_all(pool)
    .await?;

    let ready_for_export = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT count(*) FROM invoice_queue
        WHERE status = 'completed' AND export_status IS DISTINCT FROM 'exported'
        "#
    )
    .fetch_one(pool)
    .await?;

    let unresolved_failures = sqlx::query_scalar::<_, i64>(
        "SELECT count(*) FROM parsing_failures WHERE NOT resolved",
    )
    .fetch_one(pool)
    .await?;

    let mut stats = QueueStats {
        ready_for_export,
        unresolved_failures,
        ..QueueStats::default()
    };
    for (status, count) in counts {
        stats.total += count;
        match status.as_str() {
            "pending" => stats.pending = count,
            "processing" => stats.processing = count,
            "completed" => stats.completed = count,
            "failed" => stats.failed = count,
            "exported" => stats.exported = count,
            other => tracing::warn!("Unknown queue status '{}' in stats", other),
        }
    }
    Ok(stats)
}

/// PostgreSQL 实现
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl CatalogStore for PgStore {
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        Ok(get_customer_by_email(&self.pool, email).await?)
    }

    async fn find_customer_by_id(&self, id: i64) -> StoreResult<Option<Customer>> {
        Ok(get_customer(&self.pool, id).await?)
    }

    async fn list_branch_identifiers(&self, customer_id: i64) -> StoreResult<Vec<BranchIdentifier>> {
        Ok(list_branches(&self.pool, customer_id).await?)
    }

    async fn list_active_mappings(&self, customer_id: i64) -> StoreResult<Vec<ProductMapping>> {
        Ok(list_active_mappings(&self.pool, customer_id).await?)
    }
}

impl QueueStore for PgStore {
    async fn insert_queue_item(&self, item: NewQueueItem, now: DateTime<Utc>) -> StoreResult<QueueItem> {
        insert_queue_item(&self.pool, &item, now).await
    }

    async fn get_queue_item(&self, id: i64) -> StoreResult<Option<QueueItem>> {
        get_queue_item(&self.pool, id).await
    }

    async fn list_pending_ids(&self, limit: i64) -> StoreResult<Vec<i64>> {
        Ok(list_pending_ids(&self.pool, limit).await?)
    }

    async fn claim_pending(&self, id: i64, now: DateTime<Utc>) -> StoreResult<Option<QueueItem>> {
        claim_pending(&self.pool, id, now).await
    }

    async fn complete_item(
        &self,
        id: i64,
        customer_id: i64,
        parse_result: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(complete_item(&self.pool, id, customer_id, parse_result, now).await?)
    }

    async fn fail_item(
        &self,
        id: i64,
        customer_id: Option<i64>,
        failure: NewParsingFailure,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        fail_item(&self.pool, id, customer_id, &failure, now).await
    }

    async fn requeue_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<u64> {
        Ok(requeue_stale(&self.pool, cutoff, now).await?)
    }

    async fn list_exportable(&self, limit: i64) -> StoreResult<Vec<QueueItem>> {
        list_exportable(&self.pool, limit).await
    }

    async fn mark_exported(&self, ids: &[i64], export_path: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        mark_exported(&self.pool, ids, export_path, now).await
    }

    async fn get_failure(&self, id: i64) -> StoreResult<Option<ParsingFailure>> {
        get_failure(&self.pool, id).await
    }

    async fn list_failures(&self, include_resolved: bool, limit: i64) -> StoreResult<Vec<ParsingFailure>> {
        list_failures(&self.pool, include_resolved, limit).await
    }

    async fn resolve_failure(
        &self,
        id: i64,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        Ok(resolve_failure(&self.pool, id, notes.as_deref(), now).await?)
    }

    async fn queue_stats(&self) -> StoreResult<QueueStats> {
        Ok(queue_stats(&self.pool).await?)
    }
}
