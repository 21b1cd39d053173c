use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 产品映射表 (product_mappings), (customer_id, lpo_product_name) 唯一
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct ProductMapping {
    pub id: i64,
    pub customer_id: i64,
    pub lpo_product_name: String,     // LPO 中的写法
    pub system_product_name: String,  // 系统产品名
    pub unit_price: BigDecimal,       // 唯一价格来源
    pub unit: String,
    pub vat_rate: Option<BigDecimal>, // 覆盖客户税率
    pub currency: Option<String>,     // 覆盖客户币种
    pub active: bool,
}
