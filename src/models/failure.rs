use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// 失败分类 (parsing_failures.error_type)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    NoExtraction,
    UnmappedProducts,
    ParseError,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::NoExtraction => "no_extraction",
            FailureType::UnmappedProducts => "unmapped_products",
            FailureType::ParseError => "parse_error",
        }
    }
}

impl FromStr for FailureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_extraction" => Ok(FailureType::NoExtraction),
            "unmapped_products" => Ok(FailureType::UnmappedProducts),
            "parse_error" => Ok(FailureType::ParseError),
            other => Err(format!("unknown failure type '{}'", other)),
        }
    }
}

/// 解析失败记录, 供人工处理; 与队列项生命周期独立
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsingFailure {
    pub id: i64,
    pub queue_item_id: Option<i64>,
    pub filename: String,
    pub customer_email: Option<String>,
    pub error_type: FailureType,
    pub error_message: String,
    pub debug_info: serde_json::Value,
    pub extracted_text: String,       // 完整文本, 不截断
    pub unmapped_products: Vec<String>,
    pub resolved: bool,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// 新失败记录 (由流水线在失败时写入)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewParsingFailure {
    pub queue_item_id: Option<i64>,
    pub filename: String,
    pub customer_email: Option<String>,
    pub error_type: FailureType,
    pub error_message: String,
    pub debug_info: serde_json::Value,
    pub extracted_text: String,
    pub unmapped_products: Vec<String>,
}
