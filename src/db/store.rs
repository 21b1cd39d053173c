use chrono::{DateTime, Utc};
use std::future::Future;

use crate::error::StoreResult;
use crate::models::{
    BranchIdentifier, Customer, NewParsingFailure, NewQueueItem, ParsingFailure, ProductMapping,
    QueueItem, QueueStats,
};

/// 客户/映射/分店的只读访问 (由管理端维护, 流水线从不修改)
pub trait CatalogStore: Send + Sync + 'static {
    /// 按邮箱精确查找启用的客户
    fn find_customer_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send;

    fn find_customer_by_id(
        &self,
        id: i64,
    ) -> impl Future<Output = StoreResult<Option<Customer>>> + Send;

    /// 按 id 升序返回
    fn list_branch_identifiers(
        &self,
        customer_id: i64,
    ) -> impl Future<Output = StoreResult<Vec<BranchIdentifier>>> + Send;

    fn list_active_mappings(
        &self,
        customer_id: i64,
    ) -> impl Future<Output = StoreResult<Vec<ProductMapping>>> + Send;
}

/// 处理队列与失败记录
pub trait QueueStore: Send + Sync + 'static {
    fn insert_queue_item(
        &self,
        item: NewQueueItem,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<QueueItem>> + Send;

    fn get_queue_item(
        &self,
        id: i64,
    ) -> impl Future<Output = StoreResult<Option<QueueItem>>> + Send;

    /// 最早入队的 pending 项
    fn list_pending_ids(&self, limit: i64) -> impl Future<Output = StoreResult<Vec<i64>>> + Send;

    /// 条件更新 pending → processing; 被其他运行抢先时返回 None
    fn claim_pending(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<QueueItem>>> + Send;

    /// processing → completed; 状态已不是 processing 时返回 false
    fn complete_item(
        &self,
        id: i64,
        customer_id: i64,
        parse_result: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// processing → failed, 同一事务内写入失败记录; 返回失败记录 id
    fn fail_item(
        &self,
        id: i64,
        customer_id: Option<i64>,
        failure: NewParsingFailure,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<Option<i64>>> + Send;

    /// processing 且开始时间早于 cutoff 的项退回 pending
    fn requeue_stale(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// status = completed 且未导出
    fn list_exportable(
        &self,
        limit: i64,
    ) -> impl Future<Output = StoreResult<Vec<QueueItem>>> + Send;

    /// 整批标记为已导出; 任一项不符合条件则整批不变并返回错误
    fn mark_exported(
        &self,
        ids: &[i64],
        export_path: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    fn get_failure(
        &self,
        id: i64,
    ) -> impl Future<Output = StoreResult<Option<ParsingFailure>>> + Send;

    fn list_failures(
        &self,
        include_resolved: bool,
        limit: i64,
    ) -> impl Future<Output = StoreResult<Vec<ParsingFailure>>> + Send;

    /// 人工处理; 已处理过的记录返回 false
    fn resolve_failure(
        &self,
        id: i64,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn queue_stats(&self) -> impl Future<Output = StoreResult<QueueStats>> + Send;
}
