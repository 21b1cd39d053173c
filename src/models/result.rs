use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

use super::calendar::DeliveryCalendar;
use super::document::RawLine;

/// 当前 parse_result 结构版本
pub const PARSE_RESULT_VERSION: u32 = 1;

/// 价格来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// 价格取自客户产品映射
    CustomerPricing,
    /// 缺少数量, 未计价
    Unpriced,
}

/// 数量所在位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantitySource {
    SameLine,
    NextLine,
    PreviousLine,
}

/// 发票明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub raw_text: String,
    pub page: u32,
    pub line_index: u32,
    pub mapping_id: i64,
    pub lpo_product_name: String,
    pub system_product_name: String,
    pub quantity: Option<BigDecimal>,
    pub quantity_source: Option<QuantitySource>,
    pub unit: String,
    pub unit_price: BigDecimal,
    pub price_source: PriceSource,
    pub vat_rate: BigDecimal,
    pub currency: String,
    pub confidence: f64,
    pub needs_mapping: bool,
    pub line_net: Option<BigDecimal>,
    pub line_vat: Option<BigDecimal>,
    pub line_gross: Option<BigDecimal>,
}

impl LineItem {
    pub fn is_priced(&self) -> bool {
        self.price_source == PriceSource::CustomerPricing && self.line_gross.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchSummary {
    pub branch_identifier: String,
    pub branch_name: String,
    pub delivery_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub currency: String,
    pub subtotal: BigDecimal,
    pub vat_amount: BigDecimal,
    pub grand_total: BigDecimal,
    pub priced_items: usize,
}

/// 提取质量诊断 (不影响成功判定)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionQuality {
    pub overall_score: f64,
    pub coverage: f64,
    pub line_match_ratio: f64,
    pub quantity_ratio: f64,
    pub mean_confidence: f64,
    pub total_lines: usize,
    pub matched_lines: usize,
    pub mappings_available: usize,
}

/// 单份 LPO 的解析结果, 以 JSON 存入 invoice_queue.parse_result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub version: u32,
    pub customer_id: i64,
    pub customer_email: String,
    pub customer_name: String,
    pub payment_terms_days: i32,
    /// 导出时据此确定发票日期
    #[serde(default)]
    pub delivery_calendar: DeliveryCalendar,
    pub branch: Option<BranchSummary>,
    pub po_number: Option<String>,
    pub items: Vec<LineItem>,
    pub unmapped_text: Vec<RawLine>,
    pub mappings_used: usize,
    pub extraction_quality: ExtractionQuality,
    pub totals: Totals,
    pub warnings: Vec<String>,
}

impl ParseResult {
    pub fn priced_items(&self) -> impl Iterator<Item = &LineItem> {
        self.items.iter().filter(|item| item.is_priced())
    }

    /// 导出边界校验, 返回第一个不满足的约束
    pub fn validate(&self) -> Result<(), String> {
        if self.version != PARSE_RESULT_VERSION {
            return Err(format!(
                "unsupported parse_result version {} (expected {})",
                self.version, PARSE_RESULT_VERSION
            ));
        }
        if self.customer_email.trim().is_empty() {
            return Err("missing customer email".to_string());
        }
        if self.priced_items().next().is_none() {
            return Err("no priced items".to_string());
        }
        for item in &self.items {
            match item.price_source {
                PriceSource::CustomerPricing => {
                    let Some(quantity) = &item.quantity else {
                        return Err(format!(
                            "line {}:{} priced without a quantity",
                            item.page, item.line_index
                        ));
                    };
                    if *quantity <= BigDecimal::zero() {
                        return Err(format!(
                            "line {}:{} has non-positive quantity",
                            item.page, item.line_index
                        ));
                    }
                }
                PriceSource::Unpriced => {
                    if item.line_gross.is_some() {
                        return Err(format!(
                            "line {}:{} is unpriced but carries amounts",
                            item.page, item.line_index
                        ));
                    }
                }
            }
        }
        let gross = &self.totals.subtotal + &self.totals.vat_amount;
        if gross != self.totals.grand_total {
            return Err("totals do not add up".to_string());
        }
        Ok(())
    }
}
