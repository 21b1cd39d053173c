use serde::{Deserialize, Serialize};

/// 外部提取器输出的文本元素, 可能包含多行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedLine {
    pub text: String,
    pub page: u32,
    pub line_index: u32,
}

impl ExtractedLine {
    pub fn new(page: u32, line_index: u32, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            page,
            line_index,
        }
    }
}

/// 归一化后的文档行, (page, line_index) 在一份文档内唯一且有序
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawLine {
    pub text: String,
    pub page: u32,
    pub line_index: u32,
}
