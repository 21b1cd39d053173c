use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::store::CatalogStore;
use crate::error::StoreResult;
use crate::models::{BranchIdentifier, Customer, RawLine};
use crate::service::normalizer::extract_email;

/// 客户识别结果
#[derive(Debug, Clone, PartialEq)]
pub enum CustomerResolution {
    Resolved {
        customer: Customer,
        branch: Option<BranchIdentifier>,
        /// 实际用于查找的邮箱 (发件人或文中提取)
        lookup_email: Option<String>,
    },
    Unresolved {
        reason: String,
        lookup_email: Option<String>,
    },
}

/// 邮箱规范化: 去空白, ASCII 小写
pub fn canonical_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// 空白折叠 + 大写, 分店识别串和正文使用同一规则
fn collapse(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// 识别客户和分店
///
/// 指定的 customer_override 优先; 否则用发件人邮箱精确匹配, 发件人为空时退回到正文中的第一个邮箱。
/// 只做精确匹配, 找不到即返回 Unresolved。
pub async fn resolve_customer<S: CatalogStore>(
    store: &S,
    sender_email: Option<&str>,
    customer_override: Option<i64>,
    lines: &[RawLine],
) -> StoreResult<CustomerResolution> {
    let lookup_email = sender_email
        .map(canonical_email)
        .filter(|e| !e.is_empty())
        .or_else(|| extract_email(lines));

    let customer = if let Some(id) = customer_override {
        match store.find_customer_by_id(id).await? {
            Some(customer) => customer,
            None => {
                return Ok(CustomerResolution::Unresolved {
                    reason: format!("customer override {} does not exist or is inactive", id),
                    lookup_email,
                })
            }
        }
    } else {
        let Some(email) = lookup_email.as_deref() else {
            return Ok(CustomerResolution::Unresolved {
                reason: "no sender email and no email address in document".to_string(),
                lookup_email: None,
            });
        };
        match store.find_customer_by_email(email).await? {
            Some(customer) => customer,
            None => {
                return Ok(CustomerResolution::Unresolved {
                    reason: format!("no active customer for email {}", email),
                    lookup_email,
                })
            }
        }
    };

    let branch = if customer.is_multi_branch() {
        let identifiers = store.list_branch_identifiers(customer.id).await?;
        let branch = identify_branch(&identifiers, lines).cloned();
        match &branch {
            Some(b) => debug!("Customer {} branch resolved to '{}'", customer.id, b.branch_name),
            None => warn!(
                "Customer {} is multi-branch but no identifier matched ({} configured)",
                customer.id,
                identifiers.len()
            ),
        }
        branch
    } else {
        None
    };

    info!("Resolved customer {} ({})", customer.id, customer.customer_name);
    Ok(CustomerResolution::Resolved {
        customer,
        branch,
        lookup_email,
    })
}

/// 按配置顺序 (id 升序) 返回第一个出现在正文中的识别串
///
/// 识别串互相包含时 (如 "Dubai" 与 "Dubai Mall"), 先配置的胜出。
pub fn identify_branch<'a>(
    identifiers: &'a [BranchIdentifier],
    lines: &[RawLine],
) -> Option<&'a BranchIdentifier> {
    let text = collapse(
        &lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join(" "),
    );

    let mut ordered: Vec<&BranchIdentifier> = identifiers.iter().collect();
    ordered.sort_by_key(|b| b.id);
    ordered.into_iter().find(|b| {
        let needle = collapse(&b.branch_identifier);
        !needle.is_empty() && text.contains(&needle)
    })
}

/// 互相包含的两个识别串; 运行时 `first` (先配置) 胜出
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchOverlap {
    pub first: BranchIdentifier,
    pub second: BranchIdentifier,
}

/// 管理端校验: 一个识别串包含另一个的配置对 (id 小者在前)
pub fn find_overlapping_identifiers(identifiers: &[BranchIdentifier]) -> Vec<BranchOverlap> {
    let mut ordered: Vec<&BranchIdentifier> = identifiers.iter().collect();
    ordered.sort_by_key(|b| b.id);

    let mut pairs = Vec::new();
    for (i, a) in ordered.iter().enumerate() {
        let na = collapse(&a.branch_identifier);
        for b in &ordered[i + 1..] {
            let nb = collapse(&b.branch_identifier);
            if na.contains(&nb) || nb.contains(&na) {
                pairs.push(BranchOverlap {
                    first: (*a).clone(),
                    second: (*b).clone(),
                });
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use bigdecimal::BigDecimal;

    fn customer(id: i64, email: &str, alias: Option<&str>) -> Customer {
        Customer {
            id,
            email: email.to_string(),
            unique_alias: alias.map(str::to_string),
            customer_name: format!("Customer {}", id),
            currency: "AED".to_string(),
            vat_rate: BigDecimal::from(5),
            vat_inclusive: false,
            payment_terms: 30,
            delivery_calendar: None,
            active: true,
        }
    }

    fn branch(id: i64, customer_id: i64, ident: &str) -> BranchIdentifier {
        BranchIdentifier {
            id,
            customer_id,
            branch_identifier: ident.to_string(),
            branch_name: format!("{} Branch", ident),
            delivery_address: None,
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

    #[tokio::test]
    async fn test_exact_email_match_is_case_insensitive() {
        let store = MemoryStore::new();
        store.insert_customer(customer(1, "orders@acme.ae", None));

        let res = resolve_customer(&store, Some("  Orders@ACME.ae "), None, &[])
            .await
            .unwrap();
        assert!(matches!(res, CustomerResolution::Resolved { ref customer, .. } if customer.id == 1));
    }

    #[tokio::test]
    async fn test_unknown_sender_fails_closed() {
        let store = MemoryStore::new();
        store.insert_customer(customer(1, "orders@acme.ae", None));

        let res = resolve_customer(&store, Some("order@acme.ae"), None, &[])
            .await
            .unwrap();
        assert!(matches!(res, CustomerResolution::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_inactive_customer_is_not_resolved() {
        let store = MemoryStore::new();
        let mut c = customer(1, "orders@acme.ae", None);
        c.active = false;
        store.insert_customer(c);

        let res = resolve_customer(&store, Some("orders@acme.ae"), None, &[])
            .await
            .unwrap();
        assert!(matches!(res, CustomerResolution::Unresolved { .. }));
    }

    #[tokio::test]
    async fn test_override_wins_over_sender() {
        let store = MemoryStore::new();
        store.insert_customer(customer(1, "orders@acme.ae", None));
        store.insert_customer(customer(2, "buyer@other.ae", None));

        let res = resolve_customer(&store, Some("orders@acme.ae"), Some(2), &[])
            .await
            .unwrap();
        assert!(matches!(res, CustomerResolution::Resolved { ref customer, .. } if customer.id == 2));
    }

    #[tokio::test]
    async fn test_falls_back_to_email_in_text() {
        let store = MemoryStore::new();
        store.insert_customer(customer(1, "orders@acme.ae", None));

        let doc = lines(&["From: noreply@mailer.com", "Contact: Orders@Acme.ae"]);
        let res = resolve_customer(&store, None, None, &doc).await.unwrap();
        match res {
            CustomerResolution::Resolved { customer, lookup_email, .. } => {
                assert_eq!(customer.id, 1);
                assert_eq!(lookup_email.as_deref(), Some("orders@acme.ae"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multi_branch_resolves_branch() {
        let store = MemoryStore::new();
        store.insert_customer(customer(1, "orders@chain.ae", Some("CHAIN")));
        store.insert_branch(branch(10, 1, "Al Quoz"));
        store.insert_branch(branch(11, 1, "Marina"));

        let doc = lines(&["Deliver to:", "DUBAI   marina  store"]);
        let res = resolve_customer(&store, Some("orders@chain.ae"), None, &doc)
            .await
            .unwrap();
        match res {
            CustomerResolution::Resolved { branch, .. } => {
                assert_eq!(branch.unwrap().id, 11);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_identifiers_first_configured_wins() {
        let ids = vec![branch(2, 1, "Dubai Mall"), branch(1, 1, "Dubai")];
        let doc = lines(&["Deliver to Dubai Mall, Ground Floor"]);

        // id 1 ("Dubai") 先配置, 即使 "Dubai Mall" 更具体也是它胜出
        assert_eq!(identify_branch(&ids, &doc).unwrap().id, 1);

        let only_mall = vec![branch(2, 1, "Dubai Mall")];
        assert_eq!(identify_branch(&only_mall, &doc).unwrap().id, 2);
    }

    #[test]
    fn test_find_overlapping_identifiers() {
        let ids = vec![
            branch(1, 1, "Dubai"),
            branch(2, 1, "Dubai  Mall"),
            branch(3, 1, "Sharjah"),
        ];
        let pairs = find_overlapping_identifiers(&ids);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].first.id, pairs[0].second.id), (1, 2));
    }

    #[test]
    fn test_no_branch_identifier_in_text() {
        let ids = vec![branch(1, 1, "Dubai")];
        assert!(identify_branch(&ids, &lines(&["Abu Dhabi"])).is_none());
    }
}
