use std::collections::BTreeSet;

use crate::models::{ExtractionQuality, LineItem};

const QUANTITY_WEIGHT: f64 = 0.4;
const CONFIDENCE_WEIGHT: f64 = 0.3;
const COVERAGE_WEIGHT: f64 = 0.2;
const LINE_MATCH_WEIGHT: f64 = 0.1;

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// 提取质量评分, 仅作诊断
///
/// overall = 100 × (0.4·数量比例 + 0.3·平均置信度 + 0.2·映射覆盖率 + 0.1·行匹配率), 一位小数
pub fn score(items: &[LineItem], total_lines: usize, mappings_available: usize) -> ExtractionQuality {
    let matched_lines = items
        .iter()
        .map(|i| (i.page, i.line_index))
        .collect::<BTreeSet<_>>()
        .len();
    let distinct_mappings = items.iter().map(|i| i.mapping_id).collect::<BTreeSet<_>>().len();
    let with_quantity = items.iter().filter(|i| i.quantity.is_some()).count();

    let line_match_ratio = ratio(matched_lines, total_lines);
    let quantity_ratio = ratio(with_quantity, items.len());
    let coverage = ratio(distinct_mappings, mappings_available);
    let mean_confidence = if items.is_empty() {
        0.0
    } else {
        items.iter().map(|i| i.confidence).sum::<f64>() / items.len() as f64
    };

    let overall = 100.0
        * (QUANTITY_WEIGHT * quantity_ratio
            + CONFIDENCE_WEIGHT * mean_confidence
            + COVERAGE_WEIGHT * coverage
            + LINE_MATCH_WEIGHT * line_match_ratio);

    ExtractionQuality {
        overall_score: round_to(overall.clamp(0.0, 100.0), 1),
        coverage: round_to(coverage, 4),
        line_match_ratio: round_to(line_match_ratio, 4),
        quantity_ratio: round_to(quantity_ratio, 4),
        mean_confidence: round_to(mean_confidence, 4),
        total_lines,
        matched_lines,
        mappings_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PriceSource;
    use bigdecimal::BigDecimal;

    fn item(line_index: u32, mapping_id: i64, quantity: Option<i64>, confidence: f64) -> LineItem {
        LineItem {
            raw_text: String::new(),
            page: 1,
            line_index,
            mapping_id,
            lpo_product_name: String::new(),
            system_product_name: String::new(),
            quantity: quantity.map(BigDecimal::from),
            quantity_source: None,
            unit: "PCS".to_string(),
            unit_price: BigDecimal::from(1),
            price_source: if quantity.is_some() {
                PriceSource::CustomerPricing
            } else {
                PriceSource::Unpriced
            },
            vat_rate: BigDecimal::from(5),
            currency: "AED".to_string(),
            confidence,
            needs_mapping: quantity.is_none(),
            line_net: None,
            line_vat: None,
            line_gross: None,
        }
    }

    #[test]
    fn test_perfect_document_scores_100() {
        let q = score(&[item(0, 1, Some(2), 1.0)], 1, 1);
        assert_eq!(q.overall_score, 100.0);
        assert_eq!(q.matched_lines, 1);
    }

    #[test]
    fn test_weighted_components() {
        // quantity 0.5, confidence 0.8, coverage 0.5, line match 0.2
        let items = [item(0, 1, Some(1), 0.8), item(1, 2, None, 0.8)];
        let q = score(&items, 10, 4);
        assert_eq!(q.quantity_ratio, 0.5);
        assert_eq!(q.coverage, 0.5);
        assert_eq!(q.line_match_ratio, 0.2);
        // 100 × (0.2 + 0.24 + 0.1 + 0.02) = 56.0
        assert_eq!(q.overall_score, 56.0);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        let q = score(&[], 0, 0);
        assert_eq!(q.overall_score, 0.0);
        assert_eq!(q.mean_confidence, 0.0);
    }
}
