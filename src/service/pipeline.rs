//! 队列处理流水线
//!
//! pending → processing (条件认领) → completed / failed → exported (导出步骤)。
//! 单个队列项的失败只影响该项, 批次中其他项照常处理。

use chrono::{DateTime, Local, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::db::store::{CatalogStore, QueueStore};
use crate::error::{PipelineError, ProcessingError, StoreError};
use crate::models::{
    BranchSummary, DeliveryCalendar, ExtractedLine, NewParsingFailure, NewQueueItem, ParseResult,
    ParsingFailure, QueueItem, QueueStats, QueueStatus, PARSE_RESULT_VERSION,
};
use crate::service::customer_resolver::{
    find_overlapping_identifiers, resolve_customer, BranchOverlap, CustomerResolution,
};
use crate::service::export::{ExportRecord, ExportSink};
use crate::service::extractor::TextExtractor;
use crate::service::mapping_index::MappingIndex;
use crate::service::matcher::{MatcherConfig, ReverseLookupMatcher};
use crate::service::normalizer::{extract_po_number, full_text, normalize_document};
use crate::service::{pricing, quality};

/// 单份文档的解析结论
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(ParseResult),
    Failed(DocumentFailure),
}

/// 解析失败及写入失败记录所需的上下文
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFailure {
    pub error: ProcessingError,
    pub customer_id: Option<i64>,
    pub customer_email: Option<String>,
    pub extracted_text: String,
    pub debug_info: serde_json::Value,
}

/// 单个队列项的处理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Completed { queue_id: i64, customer_id: i64, items: usize },
    Failed { queue_id: i64, failure_id: i64, error_type: String },
    /// 已被其他运行认领或状态已变化
    Skipped { queue_id: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub claimed: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportReport {
    pub exported: u64,
    pub rejected: Vec<i64>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub recovered: u64,
    pub batch: BatchReport,
    pub export: Option<ExportReport>,
}

pub struct Pipeline<S, E> {
    store: Arc<S>,
    extractor: Arc<E>,
    exporter: Arc<dyn ExportSink>,
    config: PipelineConfig,
    matcher: MatcherConfig,
}

impl<S, E> Clone for Pipeline<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            extractor: Arc::clone(&self.extractor),
            exporter: Arc::clone(&self.exporter),
            config: self.config.clone(),
            matcher: self.matcher.clone(),
        }
    }
}

impl<S, E> Pipeline<S, E>
where
    S: CatalogStore + QueueStore,
    E: TextExtractor,
{
    pub fn new(
        store: Arc<S>,
        extractor: Arc<E>,
        exporter: Arc<dyn ExportSink>,
        config: PipelineConfig,
        matcher: MatcherConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            exporter,
            config,
            matcher,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 入队一个新文档
    pub async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, PipelineError> {
        let queued = self.store.insert_queue_item(item, Utc::now()).await?;
        info!("Queued item {} ({})", queued.id, queued.filename);
        Ok(queued)
    }

    pub async fn get_item(&self, id: i64) -> Result<QueueItem, PipelineError> {
        self.store
            .get_queue_item(id)
            .await?
            .ok_or(PipelineError::QueueItemNotFound(id))
    }

    /// 处理一批 pending 项, 并发度受 pipeline.concurrency 限制
    pub async fn run_batch(&self) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        let ids = self.store.list_pending_ids(self.config.batch_size).await?;
        if ids.is_empty() {
            debug!("No pending items");
            return Ok(BatchReport::default());
        }
        info!("Processing batch of {} pending item(s)", ids.len());

        let results: Vec<(i64, Result<ItemOutcome, PipelineError>)> = stream::iter(ids)
            .map(|id| {
                let pipeline = self.clone();
                async move { (id, pipeline.process_item(id).await) }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (id, result) in results {
            match result {
                Ok(ItemOutcome::Completed { .. }) => {
                    report.claimed += 1;
                    report.completed += 1;
                }
                Ok(ItemOutcome::Failed { .. }) => {
                    report.claimed += 1;
                    report.failed += 1;
                }
                Ok(ItemOutcome::Skipped { .. }) => report.skipped += 1,
                Err(e) => {
                    error!("Queue item {} could not be processed: {}", id, e);
                    report.errors += 1;
                }
            }
        }
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        info!(
            "Batch done: {} completed, {} failed, {} skipped, {} error(s) in {} ms",
            report.completed, report.failed, report.skipped, report.errors, report.elapsed_ms
        );
        Ok(report)
    }

    /// 认领并处理单个队列项
    pub async fn process_item(&self, id: i64) -> Result<ItemOutcome, PipelineError> {
        let Some(item) = self.store.claim_pending(id, Utc::now()).await? else {
            debug!("Queue item {} already claimed or not pending", id);
            return Ok(ItemOutcome::Skipped { queue_id: id });
        };
        info!("Claimed queue item {} ({})", item.id, item.filename);

        let outcome = match self.parse_document(&item).await {
            Ok(outcome) => outcome,
            Err(e) => return self.abandon(&item, e).await,
        };
        match outcome {
            ParseOutcome::Parsed(result) => {
                let completed = match serde_json::to_string(&result) {
                    Ok(payload) => {
                        self.store
                            .complete_item(item.id, result.customer_id, &payload, Utc::now())
                            .await
                    }
                    Err(e) => Err(StoreError::from(e)),
                };
                let updated = match completed {
                    Ok(updated) => updated,
                    Err(e) => return self.abandon(&item, e.into()).await,
                };
                if !updated {
                    warn!("Queue item {} left processing before completion, result discarded", item.id);
                    return Ok(ItemOutcome::Skipped { queue_id: item.id });
                }
                info!(
                    "Queue item {} completed: customer {}, {} item(s), total {} {}",
                    item.id,
                    result.customer_id,
                    result.items.len(),
                    result.totals.grand_total,
                    result.totals.currency
                );
                Ok(ItemOutcome::Completed {
                    queue_id: item.id,
                    customer_id: result.customer_id,
                    items: result.items.len(),
                })
            }
            ParseOutcome::Failed(failure) => self.record_failure(&item, failure).await,
        }
    }

    /// 已认领的项遇到存储/序列化错误: 尽量记为 parse_error, 记录不了则留给过期回收
    async fn abandon(&self, item: &QueueItem, cause: PipelineError) -> Result<ItemOutcome, PipelineError> {
        error!("Queue item {} aborted: {}", item.id, cause);
        let failure = DocumentFailure {
            error: ProcessingError::ParseError(format!("internal error: {}", cause)),
            customer_id: None,
            customer_email: item.sender_email.clone(),
            extracted_text: String::new(),
            debug_info: json!({
                "cause": "internal_error",
                "error": cause.to_string(),
                "file_path": item.file_path,
            }),
        };
        match self.record_failure(item, failure).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                warn!(
                    "Queue item {} left in processing for stale recovery (after {}s): {}",
                    item.id, self.config.stale_after_secs, e
                );
                Err(cause)
            }
        }
    }

    async fn record_failure(
        &self,
        item: &QueueItem,
        failure: DocumentFailure,
    ) -> Result<ItemOutcome, PipelineError> {
        let error_type = failure.error.failure_type();
        let unmapped_products = match &failure.error {
            ProcessingError::UnmappedProducts { products } => products.clone(),
            _ => Vec::new(),
        };
        let record = NewParsingFailure {
            queue_item_id: Some(item.id),
            filename: item.filename.clone(),
            customer_email: failure.customer_email.clone(),
            error_type,
            error_message: failure.error.to_string(),
            debug_info: failure.debug_info,
            extracted_text: failure.extracted_text,
            unmapped_products,
        };

        match self
            .store
            .fail_item(item.id, failure.customer_id, record, Utc::now())
            .await?
        {
            Some(failure_id) => {
                warn!(
                    "Queue item {} failed ({}): {}",
                    item.id,
                    error_type.as_str(),
                    failure.error
                );
                Ok(ItemOutcome::Failed {
                    queue_id: item.id,
                    failure_id,
                    error_type: error_type.as_str().to_string(),
                })
            }
            None => {
                warn!("Queue item {} left processing before failure was recorded", item.id);
                Ok(ItemOutcome::Skipped { queue_id: item.id })
            }
        }
    }

    /// 解析文档, 不修改队列状态; 相同输入与相同目录数据得到相同结果
    pub async fn parse_document(&self, item: &QueueItem) -> Result<ParseOutcome, PipelineError> {
        let elements = match self.extract(&item.file_path).await {
            Ok(elements) => elements,
            Err(error) => {
                return Ok(ParseOutcome::Failed(DocumentFailure {
                    debug_info: json!({
                        "cause": error.cause(),
                        "file_path": item.file_path,
                    }),
                    error,
                    customer_id: None,
                    customer_email: item.sender_email.clone(),
                    extracted_text: String::new(),
                }))
            }
        };

        let lines = normalize_document(elements);
        let text = full_text(&lines);
        if lines.is_empty() {
            let error = ProcessingError::NoExtraction("document contains no text".to_string());
            return Ok(ParseOutcome::Failed(DocumentFailure {
                debug_info: json!({ "cause": error.cause(), "total_lines": 0 }),
                error,
                customer_id: None,
                customer_email: item.sender_email.clone(),
                extracted_text: text,
            }));
        }

        let resolution = resolve_customer(
            self.store.as_ref(),
            item.sender_email.as_deref(),
            item.customer_override,
            &lines,
        )
        .await?;
        let (customer, branch, lookup_email) = match resolution {
            CustomerResolution::Resolved {
                customer,
                branch,
                lookup_email,
            } => (customer, branch, lookup_email),
            CustomerResolution::Unresolved {
                reason,
                lookup_email,
            } => {
                let error = ProcessingError::CustomerUnresolved { reason };
                return Ok(ParseOutcome::Failed(DocumentFailure {
                    debug_info: json!({
                        "cause": error.cause(),
                        "lookup_email": lookup_email,
                        "customer_override": item.customer_override,
                        "total_lines": lines.len(),
                    }),
                    error,
                    customer_id: None,
                    customer_email: lookup_email.or_else(|| item.sender_email.clone()),
                    extracted_text: text,
                }));
            }
        };

        let mappings = self.store.list_active_mappings(customer.id).await?;
        let index = MappingIndex::build(customer.id, mappings);
        let outcome = ReverseLookupMatcher::new(&index, &self.matcher).match_lines(&lines);
        debug!(
            "Queue item {}: {} of {} line(s) matched against {} mapping(s)",
            item.id,
            outcome.matches.len(),
            lines.len(),
            index.len()
        );

        let customer_email = lookup_email.unwrap_or_else(|| customer.email.clone());
        let failure_debug = |cause: &str| {
            json!({
                "cause": cause,
                "customer_id": customer.id,
                "total_lines": lines.len(),
                "matched_lines": outcome.matches.len(),
                "unmapped_lines": outcome.unmapped_text.len(),
                "mappings_available": index.len(),
            })
        };

        if outcome.matches.is_empty() {
            let error = ProcessingError::NoExtraction(if index.is_empty() {
                format!("customer {} has no active product mappings", customer.id)
            } else {
                "no product mapping matched the document".to_string()
            });
            return Ok(ParseOutcome::Failed(DocumentFailure {
                debug_info: failure_debug(error.cause()),
                error,
                customer_id: Some(customer.id),
                customer_email: Some(customer_email),
                extracted_text: text,
            }));
        }

        let priced = pricing::price_matches(&outcome.matches, &customer.vat_config());
        let quantityless: Vec<String> = priced
            .items
            .iter()
            .filter(|i| i.needs_mapping)
            .map(|i| i.lpo_product_name.clone())
            .collect();

        if !priced.items.iter().any(|i| i.is_priced()) {
            let error = ProcessingError::UnmappedProducts {
                products: quantityless,
            };
            return Ok(ParseOutcome::Failed(DocumentFailure {
                debug_info: failure_debug(error.cause()),
                error,
                customer_id: Some(customer.id),
                customer_email: Some(customer_email),
                extracted_text: text,
            }));
        }

        let mut warnings = priced.warnings;
        for item in priced.items.iter().filter(|i| i.needs_mapping) {
            warnings.push(format!(
                "line {}:{} '{}' has no quantity",
                item.page, item.line_index, item.lpo_product_name
            ));
        }
        let delivery_calendar = customer.calendar().unwrap_or_else(|e| {
            warn!("Customer {} has an invalid delivery calendar: {}", customer.id, e);
            warnings.push("invalid delivery calendar, weekdays assumed".to_string());
            DeliveryCalendar::default()
        });
        if customer.is_multi_branch() && branch.is_none() {
            warnings.push("multi-branch customer but no branch identifier found".to_string());
        }
        if !outcome.unmapped_text.is_empty() {
            warnings.push(format!("{} line(s) not matched", outcome.unmapped_text.len()));
        }

        let extraction_quality = quality::score(&priced.items, lines.len(), index.len());

        Ok(ParseOutcome::Parsed(ParseResult {
            version: PARSE_RESULT_VERSION,
            customer_id: customer.id,
            customer_email,
            customer_name: customer.customer_name.clone(),
            payment_terms_days: customer.payment_terms,
            delivery_calendar,
            branch: branch.map(|b| BranchSummary {
                branch_identifier: b.branch_identifier,
                branch_name: b.branch_name,
                delivery_address: b.delivery_address,
            }),
            po_number: extract_po_number(&lines),
            items: priced.items,
            unmapped_text: outcome.unmapped_text,
            mappings_used: outcome.mappings_used,
            extraction_quality,
            totals: priced.totals,
            warnings,
        }))
    }

    /// 在阻塞线程池中调用提取器; 超时、错误和 panic 都归为 parse_error
    async fn extract(&self, file_path: &str) -> Result<Vec<ExtractedLine>, ProcessingError> {
        let extractor = Arc::clone(&self.extractor);
        let path = PathBuf::from(file_path);
        let task = tokio::task::spawn_blocking(move || extractor.extract(&path));

        match tokio::time::timeout(self.config.extractor_timeout(), task).await {
            Err(_) => Err(ProcessingError::ParseError(format!(
                "extractor timed out after {} ms",
                self.config.extractor_timeout_ms
            ))),
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(ProcessingError::ParseError("extractor panicked".to_string()))
            }
            Ok(Err(join_error)) => Err(ProcessingError::ParseError(join_error.to_string())),
            Ok(Ok(Err(e))) => Err(ProcessingError::ParseError(e.to_string())),
            Ok(Ok(Ok(lines))) => Ok(lines),
        }
    }

    /// 把超时未完成的 processing 项退回 pending
    pub async fn recover_stale(&self) -> Result<u64, PipelineError> {
        let now = Utc::now();
        let cutoff: DateTime<Utc> = now - chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let recovered = self.store.requeue_stale(cutoff, now).await?;
        if recovered > 0 {
            warn!("Requeued {} stale processing item(s)", recovered);
        }
        Ok(recovered)
    }

    /// 重新提交失败项: 新建 pending 项并指向原项
    pub async fn resubmit(&self, id: i64) -> Result<QueueItem, PipelineError> {
        let original = self.get_item(id).await?;
        if original.status != QueueStatus::Failed {
            return Err(PipelineError::InvalidTransition {
                id,
                status: original.status.to_string(),
                expected: "failed",
            });
        }

        let item = NewQueueItem {
            source: original.source,
            source_id: original.source_id,
            filename: original.filename,
            file_path: original.file_path,
            sender_email: original.sender_email,
            customer_override: original.customer_override,
            resubmitted_from: Some(id),
        };
        let queued = self.store.insert_queue_item(item, Utc::now()).await?;
        info!("Queue item {} resubmitted as {}", id, queued.id);
        Ok(queued)
    }

    /// 导出已完成项; 写入成功后才整批标记为 exported
    pub async fn export_batch(&self) -> Result<ExportReport, PipelineError> {
        let items = self.store.list_exportable(self.config.export_batch_limit).await?;
        let mut report = ExportReport::default();
        let mut records = Vec::with_capacity(items.len());

        for item in items {
            let parsed = item
                .parse_result
                .as_deref()
                .ok_or_else(|| "missing parse_result".to_string())
                .and_then(|raw| serde_json::from_str::<ParseResult>(raw).map_err(|e| e.to_string()))
                .and_then(|result| result.validate().map(|_| result));
            match parsed {
                Ok(result) => records.push(ExportRecord {
                    queue_id: item.id,
                    filename: item.filename,
                    result,
                }),
                Err(reason) => {
                    error!("Queue item {} rejected at export: {}", item.id, reason);
                    report.rejected.push(item.id);
                }
            }
        }

        if records.is_empty() {
            debug!("Nothing to export");
            return Ok(report);
        }

        let location = self
            .exporter
            .write_batch(&records, Local::now().date_naive())
            .map_err(|e| {
                error!("Export of {} item(s) failed, nothing marked: {}", records.len(), e);
                e
            })?;

        let ids: Vec<i64> = records.iter().map(|r| r.queue_id).collect();
        report.exported = self.store.mark_exported(&ids, &location, Utc::now()).await?;
        report.location = Some(location);
        info!("Marked {} item(s) exported", report.exported);
        Ok(report)
    }

    /// 客户分店识别串中互相包含的配置对
    pub async fn branch_overlaps(&self, customer_id: i64) -> Result<Vec<BranchOverlap>, PipelineError> {
        let identifiers = self.store.list_branch_identifiers(customer_id).await?;
        let overlaps = find_overlapping_identifiers(&identifiers);
        if !overlaps.is_empty() {
            warn!(
                "Customer {} has {} overlapping branch identifier pair(s)",
                customer_id,
                overlaps.len()
            );
        }
        Ok(overlaps)
    }

    pub async fn stats(&self) -> Result<QueueStats, PipelineError> {
        Ok(self.store.queue_stats().await?)
    }

    pub async fn list_failures(
        &self,
        include_resolved: bool,
        limit: i64,
    ) -> Result<Vec<ParsingFailure>, PipelineError> {
        Ok(self.store.list_failures(include_resolved, limit).await?)
    }

    /// 人工处理失败记录; 已处理的记录原样返回
    pub async fn resolve_failure(
        &self,
        id: i64,
        notes: Option<String>,
    ) -> Result<ParsingFailure, PipelineError> {
        if !self.store.resolve_failure(id, notes, Utc::now()).await? {
            debug!("Parsing failure {} already resolved or missing", id);
        }
        self.store
            .get_failure(id)
            .await?
            .ok_or(PipelineError::FailureNotFound(id))
    }

    /// 一个完整周期: 回收过期认领 → 处理批次 → 导出
    pub async fn run_cycle(&self) -> Result<CycleReport, PipelineError> {
        let recovered = self.recover_stale().await?;
        let batch = self.run_batch().await?;
        let export = if self.config.auto_export {
            Some(self.export_batch().await?)
        } else {
            None
        };
        Ok(CycleReport {
            recovered,
            batch,
            export,
        })
    }

    /// 按 poll_interval 循环运行, 直到 shutdown 变为 true
    pub async fn run_continuous(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Pipeline loop started (interval {}s, batch {}, concurrency {})",
            self.config.poll_interval_secs, self.config.batch_size, self.config.concurrency
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Err(e) = self.run_cycle().await {
                error!("Pipeline cycle failed: {}", e);
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Pipeline loop stopped");
    }
}
