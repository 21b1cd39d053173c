use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 队列项来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueSource {
    Email,
    Manual,
}

impl QueueSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueSource::Email => "email",
            QueueSource::Manual => "manual",
        }
    }
}

impl FromStr for QueueSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(QueueSource::Email),
            "manual" => Ok(QueueSource::Manual),
            other => Err(format!("unknown queue source '{}'", other)),
        }
    }
}

/// 队列项状态: pending → processing → completed/failed → exported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Exported,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
            QueueStatus::Exported => "exported",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Failed | QueueStatus::Exported)
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "completed" => Ok(QueueStatus::Completed),
            "failed" => Ok(QueueStatus::Failed),
            "exported" => Ok(QueueStatus::Exported),
            other => Err(format!("unknown queue status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Pending,
    Exported,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Pending => "pending",
            ExportStatus::Exported => "exported",
        }
    }
}

impl FromStr for ExportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExportStatus::Pending),
            "exported" => Ok(ExportStatus::Exported),
            other => Err(format!("unknown export status '{}'", other)),
        }
    }
}

/// 处理队列 (invoice_queue)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueItem {
    pub id: i64,
    pub source: QueueSource,
    pub source_id: Option<String>,    // 邮件 Message-ID 等
    pub filename: String,
    pub file_path: String,
    pub sender_email: Option<String>,
    pub customer_override: Option<i64>,
    pub customer_id: Option<i64>,     // 解析成功后回填
    pub status: QueueStatus,
    pub parse_result: Option<String>, // ParseResult JSON
    pub export_status: Option<ExportStatus>,
    pub export_path: Option<String>,
    pub error_message: Option<String>,
    pub resubmitted_from: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exported_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// 入队请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub source: QueueSource,
    #[serde(default)]
    pub source_id: Option<String>,
    pub filename: String,
    pub file_path: String,
    #[serde(default)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub customer_override: Option<i64>,
    /// 仅由重新提交设置
    #[serde(skip_deserializing, default)]
    pub resubmitted_from: Option<i64>,
}

/// 队列统计
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub exported: i64,
    pub ready_for_export: i64,
    pub unresolved_failures: i64,
}
