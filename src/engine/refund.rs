//! Refund pairing: cancel a transaction against its reversal
//!
//! Greedy, single-use matching with a deterministic tie-break. This is
//! deliberately not an optimal assignment: determinism and per-bucket
//! near-linear cost win over globally minimal pairings, and changing the
//! algorithm changes which records get reported as canceled.

use std::collections::BTreeMap;

use bigdecimal::BigDecimal;
use tracing::debug;

use crate::engine::core::{ReconcileConfig, RefundGrouping};
use crate::traits::RemarkSimilarity;
use crate::types::{Sheet, SkipReason, StandardRecord};
use crate::utils::normalize::normalize_remark;

/// Mark expense/income pairs that cancel each other out via refund.
///
/// Only pending records on the expense and income sheets participate.
/// A record's effective signed amount is `sheet_sign * amount` (expense
/// negative, income positive), so a positive expense cancels against an
/// equal income, and a signed reversal cancels within its own sheet.
pub fn apply_refund_pairs(
    records: &mut [StandardRecord],
    config: &ReconcileConfig,
    matcher: &dyn RemarkSimilarity,
) {
    let window = config.refund_window();
    let marker = normalize_remark(&config.refund_marker);
    let zero = BigDecimal::from(0);

    // Bucket on (grouping key, magnitude) before any pairwise work, split by
    // effective sign.
    let mut buckets: BTreeMap<(String, String), (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        if !record.is_pending() {
            continue;
        }
        let sheet_sign = match record.sheet() {
            Sheet::Expense => -1,
            Sheet::Income => 1,
            _ => continue,
        };
        if record.amount() == &zero {
            continue;
        }
        let group = match config.refund_grouping {
            RefundGrouping::Account => record.account.clone(),
            RefundGrouping::Channel => record.channel.to_string(),
        };
        let key = (group, record.magnitude().to_string());
        let entry = buckets.entry(key).or_default();
        let effective_negative = (sheet_sign < 0) == (record.amount() > &zero);
        if effective_negative {
            entry.0.push(index);
        } else {
            entry.1.push(index);
        }
    }

    let mut consumed = vec![false; records.len()];
    let mut pairs = 0usize;
    for (_, (mut negatives, mut positives)) in buckets {
        if negatives.is_empty() || positives.is_empty() {
            continue;
        }
        let order =
            |records: &[StandardRecord], a: &usize, b: &usize| -> std::cmp::Ordering {
                records[*a]
                    .timestamp
                    .cmp(&records[*b].timestamp)
                    .then_with(|| records[*a].remark().cmp(records[*b].remark()))
                    .then(a.cmp(b))
            };
        negatives.sort_by(|a, b| order(records, a, b));
        positives.sort_by(|a, b| order(records, a, b));

        // Walk the whole bucket in timestamp order so the earliest record
        // claims its best counterpart first.
        let mut all: Vec<usize> = negatives.iter().chain(positives.iter()).copied().collect();
        all.sort_by(|a, b| order(records, a, b));

        for index in all {
            if consumed[index] {
                continue;
            }
            let opposite = if negatives.contains(&index) {
                &positives
            } else {
                &negatives
            };
            let record = &records[index];
            let mut best: Option<(chrono::Duration, String, usize)> = None;
            for &candidate_index in opposite {
                if consumed[candidate_index] || candidate_index == index {
                    continue;
                }
                let candidate = &records[candidate_index];
                let delta = (record.timestamp - candidate.timestamp).abs();
                if delta > window {
                    continue;
                }
                if !remarks_compatible(record, candidate, matcher, &marker) {
                    continue;
                }
                let key = (delta, candidate.remark().to_string(), candidate_index);
                let better = match &best {
                    None => true,
                    Some(current) => {
                        (key.0, key.1.as_str(), key.2) < (current.0, current.1.as_str(), current.2)
                    }
                };
                if better {
                    best = Some(key);
                }
            }
            if let Some((_, _, mate)) = best {
                consumed[index] = true;
                consumed[mate] = true;
                records[index].mark_canceled(SkipReason::RefundMatched);
                records[mate].mark_canceled(SkipReason::RefundMatched);
                pairs += 1;
            }
        }
    }
    debug!(pairs, "refund pairs matched");
}

/// A pair needs compatible remarks: equal parser matching keys, a similarity
/// hit on the normalized forms, or the refund marker on both sides.
fn remarks_compatible(
    a: &StandardRecord,
    b: &StandardRecord,
    matcher: &dyn RemarkSimilarity,
    marker: &str,
) -> bool {
    if let (Some(key_a), Some(key_b)) = (&a.meta.matching_key, &b.meta.matching_key) {
        if !key_a.is_empty() && key_a == key_b {
            return true;
        }
    }
    if matcher.is_similar(a.normalized_remark(), b.normalized_remark()) {
        return true;
    }
    !marker.is_empty()
        && a.normalized_remark().contains(marker)
        && b.normalized_remark().contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TokenOverlapSimilarity;
    use crate::types::{Channel, RecordStatus, SheetDetails};
    use chrono::{NaiveDate, NaiveDateTime};
    use std::str::FromStr;

    fn ts(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn run(records: &mut [StandardRecord]) {
        apply_refund_pairs(
            records,
            &ReconcileConfig::default(),
            &TokenOverlapSimilarity::default(),
        );
    }

    #[test]
    fn test_expense_income_pair_cancels() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from_str("100.00").unwrap(),
                ts(1, 12),
                "订单退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from_str("100.00").unwrap(),
                ts(4, 12),
                "商家退款",
                Channel::Wechat,
            ),
        ];
        run(&mut records);
        for record in &records {
            assert_eq!(record.status(), RecordStatus::Canceled);
            assert_eq!(record.skip_reason(), Some(SkipReason::RefundMatched));
        }
    }

    #[test]
    fn test_signed_reversal_cancels_within_sheet() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from_str("100.00").unwrap(),
                ts(1, 12),
                "会员费退款",
                Channel::Wechat,
            ),
            StandardRecord::expense(
                "微信",
                BigDecimal::from_str("-100.00").unwrap(),
                ts(3, 12),
                "会员费退款",
                Channel::Wechat,
            ),
        ];
        run(&mut records);
        assert_eq!(records[0].status(), RecordStatus::Canceled);
        assert_eq!(records[1].status(), RecordStatus::Canceled);
    }

    #[test]
    fn test_window_exceeded_stays_pending() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(50),
                ts(1, 12),
                "订单退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from(50),
                NaiveDate::from_ymd_opt(2024, 5, 15)
                    .unwrap()
                    .and_hms_opt(12, 0, 0)
                    .unwrap(),
                "订单退款",
                Channel::Wechat,
            ),
        ];
        run(&mut records);
        assert!(records[0].is_pending());
        assert!(records[1].is_pending());
    }

    #[test]
    fn test_closest_candidate_wins() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(30),
                ts(10, 12),
                "外卖退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from(30),
                ts(13, 12),
                "外卖退款远",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from(30),
                ts(11, 12),
                "外卖退款近",
                Channel::Wechat,
            ),
        ];
        run(&mut records);
        assert_eq!(records[0].status(), RecordStatus::Canceled);
        assert_eq!(records[2].status(), RecordStatus::Canceled);
        assert!(records[1].is_pending(), "farther candidate must survive");
    }

    #[test]
    fn test_record_consumed_at_most_once() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(20),
                ts(5, 12),
                "退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from(20),
                ts(6, 12),
                "退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from(20),
                ts(7, 12),
                "退款",
                Channel::Wechat,
            ),
        ];
        run(&mut records);
        let canceled = records
            .iter()
            .filter(|r| r.status() == RecordStatus::Canceled)
            .count();
        assert_eq!(canceled, 2);
        assert!(records[2].is_pending());
    }

    #[test]
    fn test_different_accounts_never_pair() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(20),
                ts(5, 12),
                "退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "支付宝",
                BigDecimal::from(20),
                ts(6, 12),
                "退款",
                Channel::Alipay,
            ),
        ];
        run(&mut records);
        assert!(records[0].is_pending());
        assert!(records[1].is_pending());
    }

    #[test]
    fn test_matching_key_equality_pairs_dissimilar_remarks() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(60),
                ts(5, 12),
                "商户订单1234",
                Channel::Wechat,
            )
            .with_matching_key("order-1234"),
            StandardRecord::income(
                "微信",
                BigDecimal::from(60),
                ts(6, 12),
                "已原路退回",
                Channel::Wechat,
            )
            .with_matching_key("order-1234"),
        ];
        run(&mut records);
        assert_eq!(records[0].status(), RecordStatus::Canceled);
        assert_eq!(records[1].status(), RecordStatus::Canceled);
    }

    #[test]
    fn test_transfer_sheet_excluded() {
        let details = SheetDetails::Transfer {
            from_account: "微信".to_string(),
            to_account: "招商银行".to_string(),
            out_amount: BigDecimal::from(100),
            in_amount: BigDecimal::from(100),
        };
        let mut records = vec![
            StandardRecord::new(
                details,
                "微信",
                BigDecimal::from(100),
                ts(1, 12),
                "退款",
                Channel::Wechat,
            ),
            StandardRecord::income(
                "微信",
                BigDecimal::from(100),
                ts(2, 12),
                "退款",
                Channel::Wechat,
            ),
        ];
        run(&mut records);
        assert!(records[0].is_pending());
        assert!(records[1].is_pending());
    }
}
