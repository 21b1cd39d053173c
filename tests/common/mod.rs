#![allow(dead_code)]

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lpo_invoice_engine::config::PipelineConfig;
use lpo_invoice_engine::db::{CatalogStore, QueueStore};
use lpo_invoice_engine::error::{ExportError, ExtractError, StoreError, StoreResult};
use lpo_invoice_engine::models::{
    BranchIdentifier, Customer, ExtractedLine, NewParsingFailure, NewQueueItem, ParsingFailure,
    ProductMapping, QueueItem, QueueSource, QueueStats,
};
use lpo_invoice_engine::service::{ExportRecord, ExportSink, MatcherConfig, TextExtractor};
use lpo_invoice_engine::{MemoryStore, Pipeline};

pub const ACME_EMAIL: &str = "orders@acme.ae";

/// 按文件路径预设的提取行为
#[derive(Debug, Clone)]
pub enum Script {
    Lines(Vec<String>),
    Fail(String),
    Panic,
    Sleep(u64),
}

#[derive(Debug, Default)]
pub struct ScriptedExtractor {
    scripts: DashMap<String, Script>,
}

impl ScriptedExtractor {
    pub fn script(&self, path: &str, script: Script) {
        self.scripts.insert(path.to_string(), script);
    }
}

impl TextExtractor for ScriptedExtractor {
    fn extract(&self, path: &Path) -> Result<Vec<ExtractedLine>, ExtractError> {
        let key = path.to_string_lossy().to_string();
        let script = self
            .scripts
            .get(&key)
            .map(|s| s.value().clone())
            .ok_or_else(|| ExtractError::Failed(format!("no script for {}", key)))?;
        match script {
            Script::Lines(lines) => Ok(lines
                .iter()
                .enumerate()
                .map(|(i, text)| ExtractedLine::new(1, i as u32, text.as_str()))
                .collect()),
            Script::Fail(msg) => Err(ExtractError::Failed(msg)),
            Script::Panic => panic!("scripted extractor panic"),
            Script::Sleep(ms) => {
                std::thread::sleep(Duration::from_millis(ms));
                Ok(vec![])
            }
        }
    }
}

/// 始终失败的导出目标
#[derive(Debug, Default)]
pub struct FailingSink;

impl ExportSink for FailingSink {
    fn write_batch(
        &self,
        _records: &[ExportRecord],
        _export_date: chrono::NaiveDate,
    ) -> Result<String, ExportError> {
        Err(ExportError::Sink("disk full".to_string()))
    }
}

pub fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

pub fn customer(id: i64, email: &str) -> Customer {
    Customer {
        id,
        email: email.to_string(),
        unique_alias: None,
        customer_name: format!("Customer {}", id),
        currency: "AED".to_string(),
        vat_rate: dec("5"),
        vat_inclusive: false,
        payment_terms: 30,
        delivery_calendar: None,
        active: true,
    }
}

pub fn mapping(id: i64, customer_id: i64, lpo: &str, price: &str, unit: &str) -> ProductMapping {
    ProductMapping {
        id,
        customer_id,
        lpo_product_name: lpo.to_string(),
        system_product_name: format!("{} (system)", lpo),
        unit_price: dec(price),
        unit: unit.to_string(),
        vat_rate: None,
        currency: None,
        active: true,
    }
}

pub fn branch(id: i64, customer_id: i64, ident: &str) -> BranchIdentifier {
    BranchIdentifier {
        id,
        customer_id,
        branch_identifier: ident.to_string(),
        branch_name: format!("{} Branch", ident),
        delivery_address: None,
    }
}

/// Acme: 5% 不含税, 两个映射
pub fn seeded_memory() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_customer(customer(1, ACME_EMAIL));
    store.insert_mapping(mapping(1, 1, "SUNFLOWER OIL 5L", "85.00", "TIN"));
    store.insert_mapping(mapping(2, 1, "BASMATI RICE 10KG", "120.00", "BAG"));
    store
}

pub fn seeded_store() -> Arc<MemoryStore> {
    Arc::new(seeded_memory())
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        extractor_timeout_ms: 2_000,
        ..PipelineConfig::default()
    }
}

pub fn pipeline_with(
    store: Arc<MemoryStore>,
    extractor: Arc<ScriptedExtractor>,
    sink: Arc<dyn ExportSink>,
    config: PipelineConfig,
) -> Pipeline<MemoryStore, ScriptedExtractor> {
    Pipeline::new(store, extractor, sink, config, MatcherConfig::default())
}

pub fn new_item(path: &str, sender: Option<&str>) -> NewQueueItem {
    NewQueueItem {
        source: QueueSource::Email,
        source_id: None,
        filename: path.rsplit('/').next().unwrap_or(path).to_string(),
        file_path: path.to_string(),
        sender_email: sender.map(str::to_string),
        customer_override: None,
        resubmitted_from: None,
    }
}

pub fn lines(texts: &[&str]) -> Script {
    Script::Lines(texts.iter().map(|t| t.to_string()).collect())
}

pub fn scenario_lines() -> Script {
    lines(&[
        "LOCAL PURCHASE ORDER",
        "Order No: LPO-4521",
        "SUNFLOWER OIL 5L 10 TIN",
        "Please deliver before Thursday",
    ])
}

/// 包装内存存储, 可按开关让映射读取或失败记录写入出错
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_mappings: AtomicBool,
    pub fail_failure_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn set_fail_mappings(&self, fail: bool) {
        self.fail_mappings.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_failure_writes(&self, fail: bool) {
        self.fail_failure_writes.store(fail, Ordering::SeqCst);
    }
}

impl CatalogStore for FlakyStore {
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>> {
        self.inner.find_customer_by_email(email).await
    }

    async fn find_customer_by_id(&self, id: i64) -> StoreResult<Option<Customer>> {
        self.inner.find_customer_by_id(id).await
    }

    async fn list_branch_identifiers(&self, customer_id: i64) -> StoreResult<Vec<BranchIdentifier>> {
        self.inner.list_branch_identifiers(customer_id).await
    }

    async fn list_active_mappings(&self, customer_id: i64) -> StoreResult<Vec<ProductMapping>> {
        if self.fail_mappings.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("product_mappings unreadable".to_string()));
        }
        self.inner.list_active_mappings(customer_id).await
    }
}

impl QueueStore for FlakyStore {
    async fn insert_queue_item(&self, item: NewQueueItem, now: DateTime<Utc>) -> StoreResult<QueueItem> {
        self.inner.insert_queue_item(item, now).await
    }

    async fn get_queue_item(&self, id: i64) -> StoreResult<Option<QueueItem>> {
        self.inner.get_queue_item(id).await
    }

    async fn list_pending_ids(&self, limit: i64) -> StoreResult<Vec<i64>> {
        self.inner.list_pending_ids(limit).await
    }

    async fn claim_pending(&self, id: i64, now: DateTime<Utc>) -> StoreResult<Option<QueueItem>> {
        self.inner.claim_pending(id, now).await
    }

    async fn complete_item(
        &self,
        id: i64,
        customer_id: i64,
        parse_result: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.complete_item(id, customer_id, parse_result, now).await
    }

    async fn fail_item(
        &self,
        id: i64,
        customer_id: Option<i64>,
        failure: NewParsingFailure,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        if self.fail_failure_writes.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidState("parsing_failures unavailable".to_string()));
        }
        self.inner.fail_item(id, customer_id, failure, now).await
    }

    async fn requeue_stale(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.requeue_stale(cutoff, now).await
    }

    async fn list_exportable(&self, limit: i64) -> StoreResult<Vec<QueueItem>> {
        self.inner.list_exportable(limit).await
    }

    async fn mark_exported(&self, ids: &[i64], export_path: &str, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.mark_exported(ids, export_path, now).await
    }

    async fn get_failure(&self, id: i64) -> StoreResult<Option<ParsingFailure>> {
        self.inner.get_failure(id).await
    }

    async fn list_failures(&self, include_resolved: bool, limit: i64) -> StoreResult<Vec<ParsingFailure>> {
        self.inner.list_failures(include_resolved, limit).await
    }

    async fn resolve_failure(
        &self,
        id: i64,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.resolve_failure(id, notes, now).await
    }

    async fn queue_stats(&self) -> StoreResult<QueueStats> {
        self.inner.queue_stats().await
    }
}
