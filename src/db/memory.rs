use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use crate::db::store::{CatalogStore, QueueStore};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    BranchIdentifier, Customer, ExportStatus, NewParsingFailure, NewQueueItem, ParsingFailure,
    ProductMapping, QueueItem, QueueStats, QueueStatus,
};

/// 进程内存储, 用于测试和 memory:// 模式
///
/// 队列项的状态转换在 DashMap 条目锁内完成, 与 PgStore 的条件更新等价。
#[derive(Debug, Default)]
pub struct MemoryStore {
    customers: DashMap<i64, Customer>,
    branches: DashMap<i64, BranchIdentifier>,
    mappings: DashMap<i64, ProductMapping>,
    queue: DashMap<i64, QueueItem>,
    failures: DashMap<i64, ParsingFailure>,
    next_queue_id: AtomicI64,
    next_failure_id: AtomicI64,
    // 整批导出标记需要跨条目的原子性
    export_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_customer(&self, customer: Customer) {
        self.customers.insert(customer.id, customer);
    }

    pub fn insert_branch(&self, branch: BranchIdentifier) {
        self.branches.insert(branch.id, branch);
    }

    pub fn insert_mapping(&self, mapping: ProductMapping) {
        self.mappings.insert(mapping.id, mapping);
    }

    /// 直接修改队列项, 测试中用于构造过期或异常状态
    pub fn update_queue_item<F: FnOnce(&mut QueueItem)>(&self, id: i64, f: F) -> bool {
        match self.queue.get_mut(&id) {
            Some(mut item) => {
                f(&mut item);
                true
            }
            None => false,
        }
    }

    fn next_id(counter: &AtomicI64) -> i64 {
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl CatalogStore for MemoryStore {
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        let mut found: Vec<Customer> = self
            .customers
            .iter()
            .filter(|c| c.active && c.email.to_ascii_lowercase() == email)
            .map(|c| c.value().clone())
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found.into_iter().next())
    }

    async fn find_customer_by_id(&self, id: i64) -> StoreResult<Option<Customer>> {
        Ok(self
            .customers
            .get(&id)
            .filter(|c| c.active)
            .map(|c| c.value().clone()))
    }

    async fn list_branch_identifiers(&self, customer_id: i64) -> StoreResult<Vec<BranchIdentifier>> {
        let mut branches: Vec<BranchIdentifier> = self
            .branches
            .iter()
            .filter(|b| b.customer_id == customer_id)
            .map(|b| b.value().clone())
            .collect();
        branches.sort_by_key(|b| b.id);
        Ok(branches)
    }

    async fn list_active_mappings(&self, customer_id: i64) -> StoreResult<Vec<ProductMapping>> {
        let mut mappings: Vec<ProductMapping> = self
            .mappings
            .iter()
            .filter(|m| m.customer_id == customer_id && m.active)
            .map(|m| m.value().clone())
            .collect();
        mappings.sort_by_key(|m| m.id);
        Ok(mappings)
    }
}

impl QueueStore for MemoryStore {
    async fn insert_queue_item(&self, item: NewQueueItem, now: DateTime<Utc>) -> StoreResult<QueueItem> {
        let id = Self::next_id(&self.next_queue_id);
        let queued = QueueItem {
            id,
            source: item.source,
            source_id: item.source_id,
            filename: item.filename,
            file_path: item.file_path,
            sender_email: item.sender_email,
            customer_override: item.customer_override,
            customer_id: None,
            status: QueueStatus::Pending,
            parse_result: None,
            export_status: None,
            export_path: None,
            error_message: None,
            resubmitted_from: item.resubmitted_from,
            created_at: now,
            processing_started_at: None,
            completed_at: None,
            exported_at: None,
            updated_at: now,
        };
        self.queue.insert(id, queued.clone());
        Ok(queued)
    }

    async fn get_queue_item(&self, id: i64) -> StoreResult<Option<QueueItem>> {
        Ok(self.queue.get(&id).map(|item| item.value().clone()))
    }

    async fn list_pending_ids(&self, limit: i64) -> StoreResult<Vec<i64>> {
        let mut pending: Vec<(DateTime<Utc>, i64)> = self
            .queue
            .iter()
            .filter(|item| item.status == QueueStatus::Pending)
            .map(|item| (item.created_at, item.id))
            .collect();
        pending.sort();
        Ok(pending
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }

    async fn claim_pending(&self, id: i64, now: DateTime<Utc>) -> StoreResult<Option<QueueItem>> {
        let Some(mut item) = self.queue.get_mut(&id) else {
            return Ok(None);
        };
        if item.status != QueueStatus::Pending {
            return Ok(None);
        }
        item.status = QueueStatus::Processing;
        item.processing_started_at = Some(now);
        item.updated_at = now;
        Ok(Some(item.clone()))
    }

    async fn complete_item(
        &self,
        id: i64,
        customer_id: i64,
        parse_result: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut item) = self.queue.get_mut(&id) else {
            return Ok(false);
        };
        if item.status != QueueStatus::Processing {
            return Ok(false);
        }
        item.status = QueueStatus::Completed;
        item.customer_id = Some(customer_id);
        item.parse_result = Some(parse_result.to_string());
        item.export_status = Some(ExportStatus::Pending);
        item.error_message = None;
        item.completed_at = Some(now);
        item.updated_at = now;
        Ok(true)
    }

    async fn fail_item(
        &self,
        id: i64,
        customer_id: Option<i64>,
        failure: NewParsingFailure,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let Some(mut item) = self.queue.get_mut(&id) else {
            return Ok(None);
        };
        if item.status != QueueStatus::Processing {
            return Ok(None);
        }
        item.status = QueueStatus::Failed;
        item.customer_id = customer_id;
        item.error_message = Some(failure.error_message.clone());
        item.updated_at = now;

        let failure_id = Self::next_id(&self.next_failure_id);
        self.failures.insert(
            failure_id,
            ParsingFailure {
                id: failure_id,
                queue_item_id: failure.queue_item_id,
                filename: failure.filename,
                customer_email: failure.customer_email,
                error_type: failure.error_type,
                error_message: failure.error_message,
                debug_info: failure.debug_info,
                extracted_text: failure.extracted_text,
                unmapped_products: failure.unmapped_products,
                resolved: false,
                resolution_notes: None,
                created_at: now,
                resolved_at: None,
            },
        );
        Ok(Some(failure_id))
    }

    async fn requeue_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut count = 0;
        for mut item in self.queue.iter_mut() {
            let stale = item.status == QueueStatus::Processing
                && item.processing_started_at.is_some_and(|started| started < cutoff);
            if stale {
                item.status = QueueStatus::Pending;
                item.processing_started_at = None;
                item.updated_at = now;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_exportable(&self, limit: i64) -> StoreResult<Vec<QueueItem>> {
        let mut items: Vec<QueueItem> = self
            .queue
            .iter()
            .filter(|item| {
                item.status == QueueStatus::Completed
                    && item.export_status != Some(ExportStatus::Exported)
            })
            .map(|item| item.value().clone())
            .collect();
        items.sort_by_key(|item| (item.completed_at, item.id));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }

    async fn mark_exported(&self, ids: &[i64], export_path: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        let _guard = self
            .export_lock
            .lock()
            .map_err(|_| StoreError::InvalidState("export lock poisoned".to_string()))?;

        for id in ids {
            let exportable = self.queue.get(id).is_some_and(|item| {
                item.status == QueueStatus::Completed
                    && item.export_status != Some(ExportStatus::Exported)
            });
            if !exportable {
                return Err(StoreError::InvalidState(format!(
                    "queue item {} is no longer exportable",
                    id
                )));
            }
        }

        for id in ids {
            if let Some(mut item) = self.queue.get_mut(id) {
                item.status = QueueStatus::Exported;
                item.export_status = Some(ExportStatus::Exported);
                item.export_path = Some(export_path.to_string());
                item.exported_at = Some(now);
                item.updated_at = now;
            }
        }
        Ok(ids.len() as u64)
    }

    async fn get_failure(&self, id: i64) -> StoreResult<Option<ParsingFailure>> {
        Ok(self.failures.get(&id).map(|f| f.value().clone()))
    }

    async fn list_failures(&self, include_resolved: bool, limit: i64) -> StoreResult<Vec<ParsingFailure>> {
        let mut failures: Vec<ParsingFailure> = self
            .failures
            .iter()
            .filter(|f| include_resolved || !f.resolved)
            .map(|f| f.value().clone())
            .collect();
        failures.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        failures.truncate(limit.max(0) as usize);
        Ok(failures)
    }

    async fn resolve_failure(
        &self,
        id: i64,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let Some(mut failure) = self.failures.get_mut(&id) else {
            return Ok(false);
        };
        if failure.resolved {
            return Ok(false);
        }
        failure.resolved = true;
        failure.resolution_notes = notes;
        failure.resolved_at = Some(now);
        Ok(true)
    }

    async fn queue_stats(&self) -> StoreResult<QueueStats> {
        let mut stats = QueueStats::default();
        for item in self.queue.iter() {
            stats.total += 1;
            match item.status {
                QueueStatus::Pending => stats.pending += 1,
                QueueStatus::Processing => stats.processing += 1,
                QueueStatus::Completed => {
                    stats.completed += 1;
                    if item.export_status != Some(ExportStatus::Exported) {
                        stats.ready_for_export += 1;
                    }
                }
                QueueStatus::Failed => stats.failed += 1,
                QueueStatus::Exported => stats.exported += 1,
            }
        }
        stats.unresolved_failures = self.failures.iter().filter(|f| !f.resolved).count() as i64;
        Ok(stats)
    }
}
