use bigdecimal::{BigDecimal, Zero};
use tracing::warn;

use crate::models::{LineItem, PriceSource, Totals, VatConfig};
use crate::service::matcher::LineMatch;

/// 计价结果
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLines {
    pub items: Vec<LineItem>,
    pub totals: Totals,
    pub warnings: Vec<String>,
}

/// 金额保留两位小数, 四舍五入 (远离零)
pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.round(2).with_scale(2)
}

/// 按行计价并汇总
///
/// 单价永远来自客户映射, 文档中出现的价格不参与计算。
pub fn price_matches(matches: &[LineMatch], vat: &VatConfig) -> PricedLines {
    let items: Vec<LineItem> = matches.iter().map(|m| price_line(m, vat)).collect();
    let (totals, warnings) = compute_totals(&items, &vat.currency);
    PricedLines {
        items,
        totals,
        warnings,
    }
}

pub fn price_line(m: &LineMatch, vat: &VatConfig) -> LineItem {
    let mapping = &m.mapping;
    let vat_rate = mapping.vat_rate.clone().unwrap_or_else(|| vat.rate.clone());
    let currency = mapping
        .currency
        .clone()
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| vat.currency.clone());

    let (price_source, amounts) = match &m.quantity {
        Some(quantity) => (
            PriceSource::CustomerPricing,
            Some(line_amounts(
                quantity,
                &mapping.unit_price,
                &vat_rate,
                vat.inclusive,
            )),
        ),
        None => (PriceSource::Unpriced, None),
    };
    let (line_net, line_vat, line_gross) = match amounts {
        Some((net, tax, gross)) => (Some(net), Some(tax), Some(gross)),
        None => (None, None, None),
    };

    LineItem {
        raw_text: m.line.text.clone(),
        page: m.line.page,
        line_index: m.line.line_index,
        mapping_id: mapping.id,
        lpo_product_name: mapping.lpo_product_name.clone(),
        system_product_name: mapping.system_product_name.clone(),
        quantity: m.quantity.clone(),
        quantity_source: m.quantity_source,
        unit: mapping.unit.clone(),
        unit_price: mapping.unit_price.clone(),
        price_source,
        vat_rate,
        currency,
        confidence: m.confidence,
        needs_mapping: m.quantity.is_none(),
        line_net,
        line_vat,
        line_gross,
    }
}

/// (net, tax, gross), 各自两位小数, tax = gross - net
///
/// 含税价: net = gross / (1 + rate/100); 不含税价: gross = net × (1 + rate/100)。
pub fn line_amounts(
    quantity: &BigDecimal,
    unit_price: &BigDecimal,
    vat_rate: &BigDecimal,
    inclusive: bool,
) -> (BigDecimal, BigDecimal, BigDecimal) {
    let factor = BigDecimal::from(1) + vat_rate / &BigDecimal::from(100);
    let extended = quantity * unit_price;

    let (net, gross) = if inclusive {
        let net = round_money(&(&extended / &factor));
        (net, round_money(&extended))
    } else {
        let net = round_money(&extended);
        (net, round_money(&(&extended * &factor)))
    };
    let tax = &gross - &net;
    (net, tax, gross)
}

/// 发票合计: 已计价行的舍入后金额之和; 币种不一致的行不计入
pub fn compute_totals(items: &[LineItem], currency: &str) -> (Totals, Vec<String>) {
    let mut subtotal = BigDecimal::zero();
    let mut vat_amount = BigDecimal::zero();
    let mut grand_total = BigDecimal::zero();
    let mut priced_items = 0;
    let mut warnings = Vec::new();

    for item in items.iter().filter(|i| i.is_priced()) {
        if item.currency != currency {
            warn!(
                "Line {}:{} priced in {} but invoice currency is {}, excluded from totals",
                item.page, item.line_index, item.currency, currency
            );
            warnings.push(format!(
                "line {}:{} '{}' is priced in {}, excluded from {} totals",
                item.page, item.line_index, item.lpo_product_name, item.currency, currency
            ));
            continue;
        }
        if let (Some(net), Some(tax), Some(gross)) = (&item.line_net, &item.line_vat, &item.line_gross) {
            subtotal += net;
            vat_amount += tax;
            grand_total += gross;
            priced_items += 1;
        }
    }

    (
        Totals {
            currency: currency.to_string(),
            subtotal: subtotal.with_scale(2),
            vat_amount: vat_amount.with_scale(2),
            grand_total: grand_total.with_scale(2),
            priced_items,
        },
        warnings,
    )
}
