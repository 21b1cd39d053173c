use indexmap::IndexMap;
use tracing::warn;

use crate::models::ProductMapping;
use crate::service::normalizer::{normalize_text, tokenize};

/// 索引中的单个映射键
#[derive(Debug, Clone)]
pub struct IndexedMapping {
    pub mapping: ProductMapping,
    pub key: String,            // 归一化后的 lpo_product_name
    pub key_tokens: Vec<String>,
    pub unit: String,           // 归一化后的单位
}

/// 单次调用内的客户映射快照, 每次处理重新构建, 不做全局缓存
#[derive(Debug, Clone)]
pub struct MappingIndex {
    entries: IndexMap<String, IndexedMapping>,
}

impl MappingIndex {
    /// 从客户的映射行构建索引; 只保留启用的映射, 归一化后重复的键保留 id 最小者
    pub fn build(customer_id: i64, mut mappings: Vec<ProductMapping>) -> Self {
        mappings.sort_by_key(|m| m.id);

        let mut entries: IndexMap<String, IndexedMapping> = IndexMap::new();
        for mapping in mappings {
            if !mapping.active || mapping.customer_id != customer_id {
                continue;
            }
            let key_tokens: Vec<String> = tokenize(&mapping.lpo_product_name)
                .into_iter()
                .map(|t| t.norm)
                .collect();
            if key_tokens.is_empty() {
                warn!("Mapping {} has an empty product name, skipping", mapping.id);
                continue;
            }
            let key = key_tokens.join(" ");
            if let Some(existing) = entries.get(&key) {
                warn!(
                    "Mapping {} duplicates key '{}', keeping mapping {}",
                    mapping.id, key, existing.mapping.id
                );
                continue;
            }
            let unit = normalize_text(&mapping.unit);
            entries.insert(
                key.clone(),
                IndexedMapping {
                    mapping,
                    key,
                    key_tokens,
                    unit,
                },
            );
        }

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&IndexedMapping> {
        self.entries.get(key)
    }

    /// 按映射 id 升序遍历
    pub fn iter(&self) -> impl Iterator<Item = &IndexedMapping> {
        self.entries.values()
    }
}
