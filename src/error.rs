use thiserror::Error;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 条件更新未命中 (状态已被其他运行修改)
    #[error("invalid state transition: {0}")]
    InvalidState(String),

    /// 数据库中的值无法映射为领域类型
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// 文本提取器错误
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported document type: {0}")]
    Unsupported(String),

    #[error("extraction failed: {0}")]
    Failed(String),
}

/// 单个队列项的处理失败分类
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProcessingError {
    #[error("customer unresolved: {reason}")]
    CustomerUnresolved { reason: String },

    #[error("no extraction: {0}")]
    NoExtraction(String),

    #[error("no priced items, {} product(s) missing a quantity", .products.len())]
    UnmappedProducts { products: Vec<String> },

    #[error("parse error: {0}")]
    ParseError(String),
}

impl ProcessingError {
    /// 写入 parsing_failures.error_type 的分类
    pub fn failure_type(&self) -> crate::models::FailureType {
        use crate::models::FailureType;
        match self {
            ProcessingError::CustomerUnresolved { .. } | ProcessingError::NoExtraction(_) => {
                FailureType::NoExtraction
            }
            ProcessingError::UnmappedProducts { .. } => FailureType::UnmappedProducts,
            ProcessingError::ParseError(_) => FailureType::ParseError,
        }
    }

    /// 细分原因, 写入 debug_info.cause
    pub fn cause(&self) -> &'static str {
        match self {
            ProcessingError::CustomerUnresolved { .. } => "customer_unresolved",
            ProcessingError::NoExtraction(_) => "no_extraction",
            ProcessingError::UnmappedProducts { .. } => "unmapped_products",
            ProcessingError::ParseError(_) => "parse_error",
        }
    }
}

/// 导出错误
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("export sink failed: {0}")]
    Sink(String),
}

/// 流水线操作错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("queue item {0} not found")]
    QueueItemNotFound(i64),

    #[error("parsing failure {0} not found")]
    FailureNotFound(i64),

    #[error("queue item {id} is {status}, expected {expected}")]
    InvalidTransition {
        id: i64,
        status: String,
        expected: &'static str,
    },
}
