//! 文档归一化: 把提取器输出整理成稳定有序的文本行, 并提供匹配用的分词规则.

use bigdecimal::{BigDecimal, Zero};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::{ExtractedLine, RawLine};

lazy_static! {
    static ref NUMBER: Regex =
        Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").unwrap();
    static ref GROUPED_PREFIX: Regex = Regex::new(r"^\d{1,3}(?:,\d{3})*$").unwrap();
    static ref EMAIL: Regex =
        Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap();
    static ref PO_NUMBER: Vec<Regex> = vec![
        Regex::new(r"(?i)Order\s*No[:.]?\s*([A-Z0-9\-/]+)").unwrap(),
        Regex::new(r"(?i)Order\s*Number[:.]?\s*([A-Z0-9\-/]+)").unwrap(),
        Regex::new(r"(?i)PO\s*No[:.]?\s*([A-Z0-9\-/]+)").unwrap(),
        Regex::new(r"(?i)PO\s*Number[:.]?\s*([A-Z0-9\-/]+)").unwrap(),
        Regex::new(r"(?i)P\.O\.\s*([A-Z0-9\-/]+)").unwrap(),
    ];
}

const SKIPPED_SENDERS: [&str; 3] = ["noreply", "donotreply", "system"];

/// 单个分词: 原文片段 + 归一化形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub raw: String,
    pub norm: String,
}

/// 按页、行号稳定排序, 拆分多行元素, 去掉空行, 每页重新编号
pub fn normalize_document(mut elements: Vec<ExtractedLine>) -> Vec<RawLine> {
    elements.sort_by_key(|e| (e.page, e.line_index));

    let mut next_index: BTreeMap<u32, u32> = BTreeMap::new();
    let mut lines = Vec::with_capacity(elements.len());
    for element in elements {
        for part in element.text.lines() {
            let text = part.trim_end();
            if text.trim().is_empty() {
                continue;
            }
            let index = next_index.entry(element.page).or_insert(0);
            lines.push(RawLine {
                text: text.to_string(),
                page: element.page,
                line_index: *index,
            });
            *index += 1;
        }
    }
    lines
}

/// 分词: 字母数字保留并转大写; `.` 与撇号只保留在原文中; 其余符号和空白都是分隔符.
///
/// 千分位数字 (如 `1,000` 或 `12,500.75`) 是一个分词, 逗号只保留在原文中。
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut raw = String::new();
    let mut norm = String::new();

    let mut flush = |raw: &mut String, norm: &mut String| {
        if !norm.is_empty() {
            tokens.push(Token {
                raw: std::mem::take(raw),
                norm: std::mem::take(norm),
            });
        } else {
            raw.clear();
        }
    };

    for (i, &c) in chars.iter().enumerate() {
        if c.is_alphanumeric() {
            raw.push(c);
            norm.extend(c.to_uppercase());
        } else if matches!(c, '.' | '\'' | '\u{2019}') {
            raw.push(c);
        } else if c == ',' && is_thousands_separator(&raw, &chars[i + 1..]) {
            raw.push(c);
        } else {
            flush(&mut raw, &mut norm);
        }
    }
    flush(&mut raw, &mut norm);
    tokens
}

/// `raw` 是一段千分位数字, 且逗号后恰好跟三位数字
fn is_thousands_separator(raw: &str, rest: &[char]) -> bool {
    GROUPED_PREFIX.is_match(raw)
        && rest.len() >= 3
        && rest[..3].iter().all(|c| c.is_ascii_digit())
        && !rest.get(3).is_some_and(|c| c.is_alphanumeric())
}

/// 归一化文本: 大写、去标点、压缩空白
pub fn normalize_text(text: &str) -> String {
    tokenize(text)
        .into_iter()
        .map(|t| t.norm)
        .collect::<Vec<_>>()
        .join(" ")
}

/// 解析独立数字分词 (允许千分位) 为正数
pub fn parse_quantity(raw: &str) -> Option<BigDecimal> {
    let raw = raw.trim_end_matches('.');
    if !NUMBER.is_match(raw) {
        return None;
    }
    let value = BigDecimal::from_str(&raw.replace(',', "")).ok()?;
    if value <= BigDecimal::zero() {
        return None;
    }
    Some(value)
}

/// 完整文本, 失败记录与日志使用
pub fn full_text(lines: &[RawLine]) -> String {
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 文档中第一个可用的发件邮箱 (小写)
pub fn extract_email(lines: &[RawLine]) -> Option<String> {
    lines
        .iter()
        .flat_map(|line| EMAIL.find_iter(&line.text))
        .map(|m| m.as_str().to_ascii_lowercase())
        .find(|email| !SKIPPED_SENDERS.iter().any(|skip| email.contains(skip)))
}

/// 订单号 (Order No / PO Number / P.O.)
pub fn extract_po_number(lines: &[RawLine]) -> Option<String> {
    let text = full_text(lines);
    PO_NUMBER
        .iter()
        .find_map(|re| re.captures(&text))
        .map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_document_orders_and_splits() {
        let elements = vec![
            ExtractedLine::new(2, 0, "page two"),
            ExtractedLine::new(1, 1, "second\nthird\n\n"),
            ExtractedLine::new(1, 0, "first   "),
            ExtractedLine::new(1, 2, "   "),
        ];

        let lines = normalize_document(elements);
        let got: Vec<(u32, u32, &str)> = lines
            .iter()
            .map(|l| (l.page, l.line_index, l.text.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (1, 0, "first"),
                (1, 1, "second"),
                (1, 2, "third"),
                (2, 0, "page two"),
            ]
        );
    }

    #[test]
    fn test_normalize_text_strips_punctuation() {
        assert_eq!(normalize_text("  Sunflower-Oil, 5L   tin. "), "SUNFLOWER OIL 5L TIN");
        assert_eq!(normalize_text("O'Brien's  (1x10LTR)"), "OBRIENS 1X10LTR");
    }

    #[test]
    fn test_tokenize_keeps_decimal_in_raw() {
        let tokens = tokenize("qty 10.50, price 85.00");
        assert_eq!(tokens[1].raw, "10.50");
        assert_eq!(tokens[1].norm, "1050");
        assert_eq!(tokens.len(), 4);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("10"), Some(BigDecimal::from(10)));
        assert_eq!(parse_quantity("2.5."), Some(BigDecimal::from_str("2.5").unwrap()));
        assert_eq!(parse_quantity("0"), None);
        assert_eq!(parse_quantity("5L"), None);
        assert_eq!(parse_quantity("1x10"), None);
        assert_eq!(parse_quantity("1,000"), Some(BigDecimal::from(1000)));
        assert_eq!(parse_quantity("12,500.75"), Some(BigDecimal::from_str("12500.75").unwrap()));
        assert_eq!(parse_quantity("1,00"), None);
    }

    #[test]
    fn test_tokenize_keeps_thousands_groups_together() {
        let tokens = tokenize("SUNFLOWER OIL 1,000 TIN, 12,500.75 AED");
        let raws: Vec<&str> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["SUNFLOWER", "OIL", "1,000", "TIN", "12,500.75", "AED"]);
        assert_eq!(tokens[2].norm, "1000");

        // 列表中的逗号仍是分隔符
        let list: Vec<String> = tokenize("2,3,4").into_iter().map(|t| t.raw).collect();
        assert_eq!(list, vec!["2", "3", "4"]);
        let short: Vec<String> = tokenize("5,12 CAN").into_iter().map(|t| t.raw).collect();
        assert_eq!(short, vec!["5", "12", "CAN"]);
    }

    #[test]
    fn test_extract_email_skips_system_senders() {
        let lines = normalize_document(vec![
            ExtractedLine::new(1, 0, "From: noreply@erp.example.com"),
            ExtractedLine::new(1, 1, "Contact: Purchasing@Cipriani.AE for queries"),
        ]);
        assert_eq!(extract_email(&lines), Some("purchasing@cipriani.ae".to_string()));
    }

    #[test]
    fn test_extract_po_number() {
        let lines = normalize_document(vec![
            ExtractedLine::new(1, 0, "LOCAL PURCHASE ORDER"),
            ExtractedLine::new(1, 1, "PO Number: LPO-2508501751"),
        ]);
        assert_eq!(extract_po_number(&lines), Some("LPO-2508501751".to_string()));

        let none = normalize_document(vec![ExtractedLine::new(1, 0, "nothing here")]);
        assert_eq!(extract_po_number(&none), None);
    }
}
