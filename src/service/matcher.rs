//! 反向查找匹配: 在文档行中搜索客户已知的产品映射键, 而不是解析表格结构.
//!
//! 每一行最多产出一个明细; 没有被匹配消费的行原样进入 `unmapped_text`.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;
use tracing::debug;

use crate::models::{ProductMapping, QuantitySource, RawLine};
use crate::service::mapping_index::{IndexedMapping, MappingIndex};
use crate::service::normalizer::{parse_quantity, tokenize, Token};

/// 单位同义词组, 组内互相给部分分
const UNIT_GROUPS: &[&[&str]] = &[
    &["EACH", "EA", "PCS", "PC", "PIECE", "PIECES", "NOS", "UNIT", "UNITS"],
    &["TIN", "TINS", "CAN", "CANS"],
    &["CASE", "CASES", "CS", "CTN", "CTNS", "CARTON", "CARTONS"],
    &["BOX", "BOXES", "BX"],
    &["PKT", "PKTS", "PACK", "PACKS", "PACKET", "PACKETS", "PK"],
    &["BTL", "BTLS", "BOTTLE", "BOTTLES"],
    &["KG", "KGS", "KILO", "KILOS"],
    &["LTR", "LTRS", "LITRE", "LITRES", "LITER", "LITERS", "LT"],
    &["BAG", "BAGS"],
    &["JAR", "JARS"],
    &["DRUM", "DRUMS"],
];

const EXACT_SIMILARITY: f64 = 1.0;
const SUBSTRING_SIMILARITY: f64 = 0.9;
const UNIT_BASE_WEIGHT: f64 = 0.6;
const UNIT_MISSING_WEIGHT: f64 = 0.5;
const UNIT_SYNONYM_WEIGHT: f64 = 0.8;
const ADJACENT_LINE_PENALTY: f64 = 0.9;
/// 不带小数与千分位的长整数是货号/条码, 不参与数量判断
const ITEM_CODE_MIN_DIGITS: usize = 6;

fn default_acceptance_threshold() -> f64 {
    0.5
}

fn default_fuzzy_floor() -> f64 {
    0.8
}

fn default_max_quantity() -> u32 {
    1000
}

fn default_search_adjacent_lines() -> bool {
    true
}

/// 匹配参数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatcherConfig {
    /// 低于该置信度的候选不计为匹配
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    /// 模糊匹配的最低文本相似度
    #[serde(default = "default_fuzzy_floor")]
    pub fuzzy_floor: f64,
    /// 大于该值的数字视为价格/编码而不是数量
    #[serde(default = "default_max_quantity")]
    pub max_quantity: u32,
    #[serde(default = "default_search_adjacent_lines")]
    pub search_adjacent_lines: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: default_acceptance_threshold(),
            fuzzy_floor: default_fuzzy_floor(),
            max_quantity: default_max_quantity(),
            search_adjacent_lines: default_search_adjacent_lines(),
        }
    }
}

/// 已匹配的行 (尚未计价)
#[derive(Debug, Clone, PartialEq)]
pub struct LineMatch {
    pub line: RawLine,
    pub mapping: ProductMapping,
    pub quantity: Option<BigDecimal>,
    pub quantity_source: Option<QuantitySource>,
    pub unit_found: Option<String>,
    pub similarity: f64,
    pub confidence: f64,
}

/// 匹配输出: 每一行恰好出现在 matches 或 unmapped_text 之一
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub matches: Vec<LineMatch>,
    pub unmapped_text: Vec<RawLine>,
    pub mappings_used: usize,
}

/// 映射键在某一行中的命中位置
#[derive(Debug, Clone)]
struct KeyHit<'a> {
    entry: &'a IndexedMapping,
    span: Range<usize>,
    similarity: f64,
}

#[derive(Debug, Clone)]
struct Scored<'a> {
    hit: KeyHit<'a>,
    quantity: Option<BigDecimal>,
    quantity_source: Option<QuantitySource>,
    /// 借出数量的相邻行
    lender: Option<usize>,
    unit_found: Option<String>,
    confidence: f64,
}

/// 一行中数量的查找结果
#[derive(Debug, Clone, PartialEq)]
enum QuantityScan {
    Found(usize, BigDecimal),
    /// 最近的数字超出数量范围, 不再继续查找
    OutOfRange(usize),
    Absent,
}

pub struct ReverseLookupMatcher<'a> {
    index: &'a MappingIndex,
    config: &'a MatcherConfig,
}

impl<'a> ReverseLookupMatcher<'a> {
    pub fn new(index: &'a MappingIndex, config: &'a MatcherConfig) -> Self {
        Self { index, config }
    }

    pub fn match_lines(&self, lines: &[RawLine]) -> MatchOutcome {
        let tokens: Vec<Vec<Token>> = lines.iter().map(|l| tokenize(&l.text)).collect();

        // 第一遍: 找出每行的键命中, 用于判断相邻行是否可以借用数量
        let hits: Vec<Vec<KeyHit<'_>>> = tokens.iter().map(|t| self.find_hits(t)).collect();

        let mut matches = Vec::new();
        let mut unmapped_text = Vec::new();
        let mut used: BTreeSet<i64> = BTreeSet::new();
        // 已借出数量的行, 每行只借给第一个认领的产品
        let mut lent: BTreeSet<usize> = BTreeSet::new();

        for (idx, line) in lines.iter().enumerate() {
            let winner = hits[idx]
                .iter()
                .map(|hit| self.score(hit.clone(), idx, &tokens, &hits, &lent))
                .fold(None::<Scored<'_>>, |best, candidate| match best {
                    Some(best) if !beats(&candidate, &best) => Some(best),
                    _ => Some(candidate),
                });

            match winner {
                Some(scored) if scored.confidence >= self.config.acceptance_threshold => {
                    debug!(
                        "Line {}:{} matched '{}' (confidence {:.3})",
                        line.page, line.line_index, scored.hit.entry.key, scored.confidence
                    );
                    used.insert(scored.hit.entry.mapping.id);
                    if let Some(lender) = scored.lender {
                        lent.insert(lender);
                    }
                    matches.push(LineMatch {
                        line: line.clone(),
                        mapping: scored.hit.entry.mapping.clone(),
                        quantity: scored.quantity,
                        quantity_source: scored.quantity_source,
                        unit_found: scored.unit_found,
                        similarity: scored.hit.similarity,
                        confidence: scored.confidence,
                    });
                }
                Some(scored) => {
                    debug!(
                        "Line {}:{} best candidate '{}' below threshold ({:.3})",
                        line.page, line.line_index, scored.hit.entry.key, scored.confidence
                    );
                    unmapped_text.push(line.clone());
                }
                None => unmapped_text.push(line.clone()),
            }
        }

        MatchOutcome {
            matches,
            unmapped_text,
            mappings_used: used.len(),
        }
    }

    fn find_hits(&self, tokens: &[Token]) -> Vec<KeyHit<'a>> {
        if tokens.is_empty() {
            return Vec::new();
        }
        self.index
            .iter()
            .filter_map(|entry| {
                locate_key(tokens, &entry.key_tokens, self.config.fuzzy_floor).map(
                    |(span, similarity)| KeyHit {
                        entry,
                        span,
                        similarity,
                    },
                )
            })
            .collect()
    }

    fn score(
        &self,
        hit: KeyHit<'a>,
        idx: usize,
        tokens: &[Vec<Token>],
        hits: &[Vec<KeyHit<'_>>],
        lent: &BTreeSet<usize>,
    ) -> Scored<'a> {
        let line_tokens = &tokens[idx];
        let max = self.config.max_quantity;

        let mut quantity = None;
        match find_quantity(line_tokens, &hit.span, max) {
            QuantityScan::Found(pos, qty) => {
                quantity = Some((pos, qty, QuantitySource::SameLine, idx));
            }
            QuantityScan::OutOfRange(pos) => {
                debug!(
                    "'{}': number '{}' is outside the quantity range, left without quantity",
                    hit.entry.key, line_tokens[pos].raw
                );
            }
            QuantityScan::Absent if self.config.search_adjacent_lines => {
                let neighbours = [
                    (idx + 1, QuantitySource::NextLine),
                    (idx.wrapping_sub(1), QuantitySource::PreviousLine),
                ];
                quantity = neighbours
                    .into_iter()
                    .filter(|(n, _)| *n < tokens.len() && hits[*n].is_empty() && !lent.contains(n))
                    .find_map(|(n, source)| match find_quantity(&tokens[n], &(0..0), max) {
                        QuantityScan::Found(pos, qty) => Some((pos, qty, source, n)),
                        _ => None,
                    });
            }
            QuantityScan::Absent => {}
        }

        let lender = quantity
            .as_ref()
            .map(|(_, _, _, line_idx)| *line_idx)
            .filter(|line_idx| *line_idx != idx);
        let (unit_found, quantity_source, quantity) = match quantity {
            Some((pos, qty, source, line_idx)) => {
                let span = if line_idx == idx { hit.span.clone() } else { 0..0 };
                let unit = find_unit(&tokens[line_idx], &span, Some(pos), &hit.entry.unit);
                (unit, Some(source), Some(qty))
            }
            None => (find_unit(line_tokens, &hit.span, None, &hit.entry.unit), None, None),
        };

        let weight = unit_weight(unit_found.as_deref(), &hit.entry.unit);
        let mut confidence =
            hit.similarity * (UNIT_BASE_WEIGHT + (1.0 - UNIT_BASE_WEIGHT) * weight);
        if matches!(
            quantity_source,
            Some(QuantitySource::NextLine | QuantitySource::PreviousLine)
        ) {
            confidence *= ADJACENT_LINE_PENALTY;
        }

        Scored {
            hit,
            quantity,
            quantity_source,
            lender,
            unit_found,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// 候选比较: 置信度高者胜, 相同时匹配键更长者胜, 再相同取映射 id 小者
fn beats(candidate: &Scored<'_>, best: &Scored<'_>) -> bool {
    if candidate.confidence != best.confidence {
        return candidate.confidence > best.confidence;
    }
    let (a, b) = (candidate.hit.entry.key.len(), best.hit.entry.key.len());
    if a != b {
        return a > b;
    }
    candidate.hit.entry.mapping.id < best.hit.entry.mapping.id
}

/// 在行分词中定位映射键, 返回命中的分词区间与文本相似度
fn locate_key(tokens: &[Token], key: &[String], fuzzy_floor: f64) -> Option<(Range<usize>, f64)> {
    let k = key.len();
    if k == 0 {
        return None;
    }

    if k <= tokens.len() {
        if let Some(start) = (0..=tokens.len() - k)
            .find(|&s| tokens[s..s + k].iter().zip(key).all(|(t, kt)| &t.norm == kt))
        {
            return Some((start..start + k, EXACT_SIMILARITY));
        }
    }

    // 归一化文本中的字符级包含, 如 "XSUNFLOWER OIL" 包含 "SUNFLOWER OIL"
    let key_text = key.join(" ");
    let mut joined = String::new();
    let mut offsets = Vec::with_capacity(tokens.len());
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            joined.push(' ');
        }
        let start = joined.len();
        joined.push_str(&token.norm);
        offsets.push(start..joined.len());
    }
    if let Some(pos) = joined.find(&key_text) {
        let end = pos + key_text.len();
        let first = offsets.iter().position(|r| r.end > pos)?;
        let last = offsets.iter().rposition(|r| r.start < end)?;
        return Some((first..last + 1, SUBSTRING_SIMILARITY));
    }

    let mut best: Option<(Range<usize>, f64)> = None;
    for width in k.saturating_sub(1).max(1)..=(k + 1).min(tokens.len()) {
        for start in 0..=tokens.len() - width {
            let window = tokens[start..start + width]
                .iter()
                .map(|t| t.norm.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let similarity = strsim::normalized_levenshtein(&window, &key_text);
            if similarity >= fuzzy_floor && best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                best = Some((start..start + width, similarity));
            }
        }
    }
    best
}

/// 区间外最近的数字: 先向后查找, 再向前 (由近及远).
///
/// 货号/条码跳过; 最近的数字超出 `(0, max]` 时停止, 不退而取更远的数字 (多半是单价)。
fn find_quantity(tokens: &[Token], span: &Range<usize>, max: u32) -> QuantityScan {
    let max = BigDecimal::from(max);
    let after = span.end..tokens.len();
    let before = (0..span.start).rev();
    for pos in after.chain(before) {
        let raw = tokens[pos].raw.as_str();
        if is_item_code(raw) {
            continue;
        }
        match parse_quantity(raw) {
            Some(qty) if qty <= max => return QuantityScan::Found(pos, qty),
            Some(_) => return QuantityScan::OutOfRange(pos),
            None => {}
        }
    }
    QuantityScan::Absent
}

fn is_item_code(raw: &str) -> bool {
    let raw = raw.trim_end_matches('.');
    raw.len() >= ITEM_CODE_MIN_DIGITS && raw.chars().all(|c| c.is_ascii_digit())
}

/// 单位分词: 优先紧邻数量的分词, 其次区间外任意单位分词
fn find_unit(tokens: &[Token], span: &Range<usize>, near: Option<usize>, expected: &str) -> Option<String> {
    let outside = |pos: &usize| !span.contains(pos);
    let is_unit = |pos: &usize| {
        let norm = tokens[*pos].norm.as_str();
        norm == expected || unit_group(norm).is_some()
    };

    if let Some(q) = near {
        let adjacent = [q + 1, q.wrapping_sub(1)];
        if let Some(pos) = adjacent
            .into_iter()
            .filter(|p| *p < tokens.len())
            .find(|p| outside(p) && is_unit(p))
        {
            return Some(tokens[pos].norm.clone());
        }
    }

    (0..tokens.len())
        .filter(outside)
        .find(is_unit)
        .map(|pos| tokens[pos].norm.clone())
}

fn unit_group(unit: &str) -> Option<usize> {
    UNIT_GROUPS.iter().position(|group| group.contains(&unit))
}

/// 单位相容权重: 相同 1.0, 同义 0.8, 缺失 0.5, 冲突 0.0
pub fn unit_weight(found: Option<&str>, expected: &str) -> f64 {
    match found {
        None => UNIT_MISSING_WEIGHT,
        Some(unit) if unit == expected => 1.0,
        Some(unit) => match (unit_group(unit), unit_group(expected)) {
            (Some(a), Some(b)) if a == b => UNIT_SYNONYM_WEIGHT,
            _ => 0.0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn mapping(id: i64, name: &str, unit: &str, price: &str) -> ProductMapping {
        ProductMapping {
            id,
            customer_id: 1,
            lpo_product_name: name.to_string(),
            system_product_name: format!("System {}", name),
            unit_price: BigDecimal::from_str(price).unwrap(),
            unit: unit.to_string(),
            vat_rate: None,
            currency: None,
            active: true,
        }
    }

    fn lines(texts: &[&str]) -> Vec<RawLine> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| RawLine {
                text: t.to_string(),
                page: 1,
                line_index: i as u32,
            })
            .collect()
    }

    fn run(mappings: Vec<ProductMapping>, texts: &[&str]) -> MatchOutcome {
        let index = MappingIndex::build(1, mappings);
        let config = MatcherConfig::default();
        ReverseLookupMatcher::new(&index, &config).match_lines(&lines(texts))
    }

    #[test]
    fn test_scenario_line_with_quantity_and_unit() {
        let outcome = run(
            vec![mapping(1, "SUNFLOWER OIL 5L TIN", "TIN", "85.00")],
            &["SUNFLOWER OIL 5L TIN   10   TIN"],
        );
        assert_eq!(outcome.matches.len(), 1);
        let m = &outcome.matches[0];
        assert_eq!(m.quantity, Some(BigDecimal::from(10)));
        assert_eq!(m.quantity_source, Some(QuantitySource::SameLine));
        assert_eq!(m.unit_found.as_deref(), Some("TIN"));
        assert!((m.confidence - 1.0).abs() < 1e-9);
        assert!(outcome.unmapped_text.is_empty());
        assert_eq!(outcome.mappings_used, 1);
    }

    #[test]
    fn test_every_mapping_key_matches_above_threshold() {
        let names = [
            "Oil Cuisine Bunge Pro 10L",
            "FRYING OIL BUNGE PRO F10 1x10LTR",
            "SUNFLOWER OIL TIN 05LT",
            "Olive-Oil (Pomace)",
            "CANOLA OIL",
        ];
        let mappings: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(i, n)| mapping(i as i64 + 1, n, "CAN", "1"))
            .collect();
        let config = MatcherConfig::default();

        for name in names {
            let outcome = run(mappings.clone(), &[&format!("  12 | {} | PCS", name)]);
            assert_eq!(outcome.matches.len(), 1, "no match for {}", name);
            let m = &outcome.matches[0];
            assert_eq!(m.mapping.lpo_product_name, name);
            assert!(m.confidence >= config.acceptance_threshold, "{} scored {}", name, m.confidence);
        }
    }

    #[test]
    fn test_substring_inside_token_still_matches() {
        let outcome = run(vec![mapping(1, "SUNFLOWER OIL", "TIN", "1")], &["XSUNFLOWER OIL 4 TIN"]);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].similarity, SUBSTRING_SIMILARITY);
        assert_eq!(outcome.matches[0].quantity, Some(BigDecimal::from(4)));
    }

    #[test]
    fn test_fuzzy_match_tolerates_typo() {
        let outcome = run(
            vec![mapping(1, "RAPESEED OIL BUNGE PRO CUISINE", "CASE", "80")],
            &["RAPSEED OIL BUNGE PRO CUISINE 3 CASE"],
        );
        assert_eq!(outcome.matches.len(), 1);
        let m = &outcome.matches[0];
        assert!(m.similarity < 1.0 && m.similarity >= 0.8);
        assert_eq!(m.quantity, Some(BigDecimal::from(3)));
    }

    #[test]
    fn test_most_specific_key_wins() {
        let outcome = run(
            vec![
                mapping(1, "OIL", "TIN", "1"),
                mapping(2, "SUNFLOWER OIL", "TIN", "2"),
            ],
            &["SUNFLOWER OIL 2 TIN"],
        );
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].mapping.id, 2);
    }

    #[test]
    fn test_unit_compatibility_breaks_ties() {
        let outcome = run(
            vec![
                mapping(1, "CANOLA OIL", "BOX", "1"),
                mapping(2, "CANOLA OIL 20L", "TIN", "2"),
            ],
            &["CANOLA OIL 20L 5 CAN"],
        );
        // mapping 2 覆盖更多文本且单位同义
        assert_eq!(outcome.matches[0].mapping.id, 2);
        assert!((outcome.matches[0].confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn test_missing_quantity_is_kept() {
        let outcome = run(
            vec![mapping(1, "OLIVE OIL POMACE", "TIN", "120")],
            &["OLIVE OIL POMACE", "Delivery to DIFC Gate Village"],
        );
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].quantity, None);
        assert_eq!(outcome.unmapped_text.len(), 1);
    }

    #[test]
    fn test_quantity_from_next_line() {
        let outcome = run(
            vec![mapping(1, "CANOLA OIL", "CAN", "95")],
            &["CANOLA OIL", "CAN 6"],
        );
        let m = &outcome.matches[0];
        assert_eq!(m.quantity, Some(BigDecimal::from(6)));
        assert_eq!(m.quantity_source, Some(QuantitySource::NextLine));
        assert!((m.confidence - 0.9).abs() < 1e-9);
        // 借用数量的行仍留在未匹配文本中
        assert_eq!(outcome.unmapped_text[0].text, "CAN 6");
    }

    #[test]
    fn test_neighbour_with_its_own_product_is_not_borrowed() {
        let outcome = run(
            vec![
                mapping(1, "CANOLA OIL", "CAN", "95"),
                mapping(2, "OLIVE OIL POMACE", "TIN", "120"),
            ],
            &["CANOLA OIL", "OLIVE OIL POMACE 4 TIN"],
        );
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].quantity, None);
        assert_eq!(outcome.matches[1].quantity, Some(BigDecimal::from(4)));
    }

    #[test]
    fn test_large_numbers_are_not_quantities() {
        let outcome = run(
            vec![mapping(1, "CANOLA OIL", "CAN", "95")],
            &["CANOLA OIL 25081751 CAN 8 95.00 760.00"],
        );
        assert_eq!(outcome.matches[0].quantity, Some(BigDecimal::from(8)));
    }

    #[test]
    fn test_thousands_separated_quantity() {
        let index = MappingIndex::build(1, vec![mapping(1, "SUNFLOWER OIL 5L", "TIN", "85")]);
        let config = MatcherConfig {
            max_quantity: 5000,
            ..MatcherConfig::default()
        };
        let outcome = ReverseLookupMatcher::new(&index, &config)
            .match_lines(&lines(&["SUNFLOWER OIL 5L 1,000 TIN", "SUNFLOWER OIL 5L 2,400 TIN"]));
        assert_eq!(outcome.matches[0].quantity, Some(BigDecimal::from(1000)));
        assert_eq!(outcome.matches[1].quantity, Some(BigDecimal::from(2400)));
        assert_eq!(outcome.matches[1].unit_found.as_deref(), Some("TIN"));
    }

    #[test]
    fn test_out_of_range_quantity_does_not_fall_through_to_price() {
        let outcome = run(
            vec![mapping(1, "SUGAR", "BAG", "12.50")],
            &["SUGAR 1500 BAG 12.50", "8"],
        );
        assert_eq!(outcome.matches.len(), 1);
        let m = &outcome.matches[0];
        assert_eq!(m.quantity, None);
        assert_eq!(m.quantity_source, None);
        // 相邻行的数字也不借用
        assert_eq!(outcome.unmapped_text.len(), 1);

        let grouped = run(vec![mapping(1, "SUGAR", "BAG", "12.50")], &["SUGAR 1,500 BAG 12.50"]);
        assert_eq!(grouped.matches[0].quantity, None);
    }

    #[test]
    fn test_quantity_line_is_lent_once() {
        let outcome = run(
            vec![
                mapping(1, "CANOLA OIL", "CAN", "95"),
                mapping(2, "OLIVE OIL POMACE", "TIN", "120"),
            ],
            &["CANOLA OIL", "6", "OLIVE OIL POMACE"],
        );
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.matches[0].quantity, Some(BigDecimal::from(6)));
        assert_eq!(outcome.matches[0].quantity_source, Some(QuantitySource::NextLine));
        assert_eq!(outcome.matches[1].quantity, None);
        assert_eq!(outcome.matches[1].quantity_source, None);
        assert_eq!(outcome.unmapped_text[0].text, "6");
    }

    #[test]
    fn test_second_claimant_borrows_its_other_neighbour() {
        let outcome = run(
            vec![
                mapping(1, "CANOLA OIL", "CAN", "95"),
                mapping(2, "OLIVE OIL POMACE", "TIN", "120"),
            ],
            &["CANOLA OIL", "6", "OLIVE OIL POMACE", "4 TIN"],
        );
        assert_eq!(outcome.matches[1].quantity, Some(BigDecimal::from(4)));
        assert_eq!(outcome.matches[1].quantity_source, Some(QuantitySource::NextLine));
    }

    #[test]
    fn test_repeated_product_lines_stay_separate() {
        let outcome = run(
            vec![mapping(1, "CANOLA OIL", "CAN", "95")],
            &["CANOLA OIL 2 CAN", "CANOLA OIL 3 CAN"],
        );
        assert_eq!(outcome.matches.len(), 2);
        assert_eq!(outcome.mappings_used, 1);
    }

    #[test]
    fn test_conflicting_unit_below_threshold_goes_to_residue() {
        let index = MappingIndex::build(1, vec![mapping(1, "RAPESEED OIL BUNGE", "CASE", "80")]);
        let config = MatcherConfig {
            acceptance_threshold: 0.6,
            ..MatcherConfig::default()
        };
        let outcome =
            ReverseLookupMatcher::new(&index, &config).match_lines(&lines(&["RAPSEED OIL BUNGE 3 KG"]));
        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmapped_text.len(), 1);
    }

    #[test]
    fn test_unit_weight() {
        assert_eq!(unit_weight(Some("TIN"), "TIN"), 1.0);
        assert_eq!(unit_weight(Some("CAN"), "TIN"), 0.8);
        assert_eq!(unit_weight(Some("KG"), "TIN"), 0.0);
        assert_eq!(unit_weight(None, "TIN"), 0.5);
    }
}
