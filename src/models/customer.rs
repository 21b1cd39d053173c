use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::calendar::DeliveryCalendar;

/// 客户主表 (customers)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub email: String,              // 唯一键
    pub unique_alias: Option<String>, // 非空表示多分店账户
    pub customer_name: String,
    pub currency: String,
    pub vat_rate: BigDecimal,       // 百分比, 如 5.0
    pub vat_inclusive: bool,
    pub payment_terms: i32,         // 天数
    pub delivery_calendar: Option<String>, // JSON, 为空时按工作日
    pub active: bool,
}

impl Customer {
    pub fn is_multi_branch(&self) -> bool {
        self.unique_alias
            .as_deref()
            .is_some_and(|alias| !alias.trim().is_empty())
    }

    /// 解析送货日历; 未配置时为默认工作日
    pub fn calendar(&self) -> Result<DeliveryCalendar, serde_json::Error> {
        match self.delivery_calendar.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw),
            _ => Ok(DeliveryCalendar::default()),
        }
    }

    pub fn vat_config(&self) -> VatConfig {
        VatConfig {
            rate: self.vat_rate.clone(),
            inclusive: self.vat_inclusive,
            currency: self.currency.clone(),
        }
    }
}

/// 客户的税务配置快照
#[derive(Debug, Clone, PartialEq)]
pub struct VatConfig {
    pub rate: BigDecimal,
    pub inclusive: bool,
    pub currency: String,
}

/// 分店识别表 (branch_identifiers)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct BranchIdentifier {
    pub id: i64,
    pub customer_id: i64,
    pub branch_identifier: String,  // LPO 文本中出现的识别串
    pub branch_name: String,
    pub delivery_address: Option<String>,
}
