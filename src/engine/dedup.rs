//! Duplicate detection: cross-channel overlap and baseline dedup
//!
//! Two distinct rules with two distinct reasons. A wallet and a card
//! statement showing the same physical purchase is channel overlap
//! (`ChannelDuplicate`); a record already present in the baseline workbook
//! is a prior-run duplicate (`DuplicateBaseline`). The report keeps them
//! apart so a human can review each class on its own terms.
//!
//! Known limitation, preserved on purpose: the baseline key is
//! (sheet, account, amount) with a time window, so two genuinely distinct
//! same-amount transactions on the same day can over-match. Every skip is
//! surfaced in the report for recovery; no extra heuristics are layered on.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::engine::core::ReconcileConfig;
use crate::schema;
use crate::traits::RemarkSimilarity;
use crate::types::{BaselineFrames, ChannelKind, Sheet, SkipReason, StandardRecord};
use crate::utils::normalize::{normalize_remark, normalize_text, parse_amount, parse_datetime};

/// Lookup over baseline rows keyed by (sheet, account, amount).
///
/// Built once per run and read-only during matching: new records only ever
/// join the *output*, never the index used for this run's decisions.
pub struct BaselineIndex {
    entries: HashMap<(Sheet, String, String), Vec<(NaiveDateTime, String)>>,
}

impl BaselineIndex {
    /// One pass over the baseline frames. Rows with unparsable dates or
    /// amounts are logged and skipped; an empty index is valid.
    pub fn from_frames(frames: &BaselineFrames) -> Self {
        let mut entries: HashMap<(Sheet, String, String), Vec<(NaiveDateTime, String)>> =
            HashMap::new();
        for (sheet, frame) in frames.iter() {
            if frame.is_empty() {
                continue;
            }
            let date_column = schema::date_column(sheet);
            let account_column = schema::account_column(sheet);
            for row in 0..frame.len() {
                let cell = frame.value(row, date_column).unwrap_or("");
                let Some(timestamp) = parse_datetime(cell) else {
                    if !cell.trim().is_empty() {
                        warn!(sheet = %sheet, row, cell, "baseline row has unparsable date; skipping");
                    }
                    continue;
                };
                let account = normalize_text(frame.value(row, account_column).unwrap_or(""));
                let remark =
                    normalize_remark(frame.value(row, schema::REMARK_COLUMN).unwrap_or(""));
                for amount_column in schema::amount_columns(sheet) {
                    let Some(amount) =
                        frame.value(row, amount_column).and_then(parse_amount)
                    else {
                        continue;
                    };
                    entries
                        .entry((sheet, account.clone(), amount.to_string()))
                        .or_default()
                        .push((timestamp, remark.clone()));
                }
            }
        }
        for bucket in entries.values_mut() {
            bucket.sort_by_key(|(timestamp, _)| *timestamp);
        }
        debug!(buckets = entries.len(), "baseline index built");
        Self { entries }
    }

    /// Whether the baseline already holds a row matching this record under
    /// the configured tolerances.
    pub fn matches(
        &self,
        record: &StandardRecord,
        config: &ReconcileConfig,
        matcher: &dyn RemarkSimilarity,
    ) -> bool {
        let key = (
            record.sheet(),
            normalize_text(&record.account),
            record.amount().to_string(),
        );
        let Some(bucket) = self.entries.get(&key) else {
            return false;
        };
        let tolerance = config.date_tolerance();
        for (timestamp, remark) in bucket {
            // Time window first to discard irrelevant history cheaply.
            if (*timestamp - record.timestamp).abs() > tolerance {
                continue;
            }
            if config.compare_remarks
                && !remark.is_empty()
                && !record.normalized_remark().is_empty()
                && !matcher.is_similar(record.normalized_remark(), remark)
            {
                continue;
            }
            return true;
        }
        false
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Skip pending records the baseline already contains.
pub fn apply_baseline_dedup(
    records: &mut [StandardRecord],
    index: &BaselineIndex,
    config: &ReconcileConfig,
    matcher: &dyn RemarkSimilarity,
) {
    if index.is_empty() {
        return;
    }
    for record in records.iter_mut() {
        if !record.is_pending() {
            continue;
        }
        if index.matches(record, config, matcher) {
            record.mark_skipped(SkipReason::DuplicateBaseline);
        }
    }
}

/// Detect the same physical purchase seen through both a wallet and a card
/// channel: equal magnitude, settlement dates at most
/// `channel_overlap_days` apart. The later-dated record is skipped as
/// `ChannelDuplicate` (tie: the card record, being the derived posting);
/// the other side is untouched, so a pair never loses both records.
pub fn apply_channel_duplicates(records: &mut [StandardRecord], config: &ReconcileConfig) {
    let mut buckets: BTreeMap<(Sheet, String), (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (index, record) in records.iter().enumerate() {
        if !record.is_pending() {
            continue;
        }
        let key = (record.sheet(), record.magnitude().to_string());
        let entry = buckets.entry(key).or_default();
        match record.channel.kind() {
            ChannelKind::Wallet => entry.0.push(index),
            ChannelKind::CreditCard => entry.1.push(index),
        }
    }

    let mut marked = 0usize;
    for (_, (mut wallets, cards)) in buckets {
        if wallets.is_empty() || cards.is_empty() {
            continue;
        }
        for card_index in cards {
            let card_ts = records[card_index].timestamp;
            let mut best: Option<(i64, chrono::Duration, usize)> = None;
            for (slot, &wallet_index) in wallets.iter().enumerate() {
                let wallet_ts = records[wallet_index].timestamp;
                let day_gap = (card_ts.date() - wallet_ts.date()).num_days().abs();
                if day_gap > config.channel_overlap_days {
                    continue;
                }
                let delta = (card_ts - wallet_ts).abs();
                if best.is_none()
                    || (day_gap, delta, slot) < (best.unwrap().0, best.unwrap().1, best.unwrap().2)
                {
                    best = Some((day_gap, delta, slot));
                }
            }
            let Some((_, _, slot)) = best else {
                continue;
            };
            let wallet_index = wallets.remove(slot);
            // Later-dated record is the duplicate; the card loses ties.
            let (loser, keeper) = if records[wallet_index].timestamp > card_ts {
                (wallet_index, card_index)
            } else {
                (card_index, wallet_index)
            };
            let keeper_id = records[keeper].id.to_string();
            records[loser].mark_skipped(SkipReason::ChannelDuplicate);
            records[loser].meta.duplicate_with = Some(keeper_id);
            marked += 1;
        }
    }
    debug!(marked, "channel duplicates marked");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TokenOverlapSimilarity;
    use crate::types::{Channel, RecordStatus, SheetFrame};
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn baseline_with_expense(account: &str, amount: &str, date: &str, remark: &str) -> BaselineFrames {
        let mut frame = SheetFrame::with_template(Sheet::Expense);
        let mut cells = vec![String::new(); frame.columns().len()];
        cells[frame.column_index("账户").unwrap()] = account.to_string();
        cells[frame.column_index("消费日期").unwrap()] = date.to_string();
        cells[frame.column_index("消费金额").unwrap()] = amount.to_string();
        cells[frame.column_index("备注").unwrap()] = remark.to_string();
        frame.push_row(cells);
        let mut frames = BaselineFrames::new();
        frames.insert(Sheet::Expense, frame);
        frames
    }

    fn tolerance_config(hours: i64) -> ReconcileConfig {
        ReconcileConfig {
            date_tolerance_hours: hours,
            ..ReconcileConfig::default()
        }
    }

    #[test]
    fn test_duplicate_within_window_and_similar_remark() {
        let frames = baseline_with_expense("acc1", "50.00", "2024-02-01 00:00:00", "taxi");
        let index = BaselineIndex::from_frames(&frames);
        let config = tolerance_config(24);
        let matcher = TokenOverlapSimilarity::default();

        let mut records = vec![StandardRecord::expense(
            "acc1",
            BigDecimal::from_str("50.00").unwrap(),
            ts(2024, 2, 1, 23),
            "taxi ride",
            Channel::Wechat,
        )];
        apply_baseline_dedup(&mut records, &index, &config, &matcher);
        assert_eq!(records[0].status(), RecordStatus::Skipped);
        assert_eq!(
            records[0].skip_reason(),
            Some(SkipReason::DuplicateBaseline)
        );
    }

    #[test]
    fn test_out_of_window_is_not_duplicate() {
        let frames = baseline_with_expense("acc1", "50.00", "2024-02-01 00:00:00", "taxi");
        let index = BaselineIndex::from_frames(&frames);
        let config = tolerance_config(24);
        let matcher = TokenOverlapSimilarity::default();

        let mut records = vec![StandardRecord::expense(
            "acc1",
            BigDecimal::from_str("50.00").unwrap(),
            ts(2024, 2, 5, 0),
            "taxi",
            Channel::Wechat,
        )];
        apply_baseline_dedup(&mut records, &index, &config, &matcher);
        assert!(records[0].is_pending());
    }

    #[test]
    fn test_dissimilar_remark_blocks_match_unless_disabled() {
        let frames = baseline_with_expense("acc1", "50.00", "2024-02-01 00:00:00", "groceries");
        let index = BaselineIndex::from_frames(&frames);
        let matcher = TokenOverlapSimilarity::default();

        let record = StandardRecord::expense(
            "acc1",
            BigDecimal::from_str("50.00").unwrap(),
            ts(2024, 2, 1, 12),
            "cinema",
            Channel::Wechat,
        );

        let mut records = vec![record.clone()];
        apply_baseline_dedup(&mut records, &index, &tolerance_config(24), &matcher);
        assert!(records[0].is_pending());

        let config = ReconcileConfig {
            compare_remarks: false,
            ..tolerance_config(24)
        };
        let mut records = vec![record];
        apply_baseline_dedup(&mut records, &index, &config, &matcher);
        assert_eq!(records[0].status(), RecordStatus::Skipped);
    }

    #[test]
    fn test_empty_baseline_remark_matches_anything() {
        let frames = baseline_with_expense("acc1", "10.00", "2024-02-01 12:00:00", "");
        let index = BaselineIndex::from_frames(&frames);
        let matcher = TokenOverlapSimilarity::default();

        let mut records = vec![StandardRecord::expense(
            "acc1",
            BigDecimal::from(10),
            ts(2024, 2, 1, 13),
            "任意备注",
            Channel::Wechat,
        )];
        apply_baseline_dedup(&mut records, &index, &tolerance_config(48), &matcher);
        assert_eq!(records[0].status(), RecordStatus::Skipped);
    }

    #[test]
    fn test_unparsable_baseline_rows_are_skipped() {
        let frames = baseline_with_expense("acc1", "not-a-number", "junk", "taxi");
        let index = BaselineIndex::from_frames(&frames);
        assert!(index.is_empty());
    }

    #[test]
    fn test_channel_duplicate_marks_exactly_one() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from_str("30.00").unwrap(),
                ts(2024, 3, 1, 10),
                "超市购物",
                Channel::Wechat,
            ),
            StandardRecord::expense(
                "招商银行信用卡(1129)",
                BigDecimal::from_str("30.00").unwrap(),
                ts(2024, 3, 1, 10),
                "超市购物",
                Channel::CmbCard,
            ),
        ];
        apply_channel_duplicates(&mut records, &ReconcileConfig::default());

        // Equal timestamps: the card posting is the derived copy.
        assert!(records[0].is_pending());
        assert_eq!(records[1].status(), RecordStatus::Skipped);
        assert_eq!(records[1].skip_reason(), Some(SkipReason::ChannelDuplicate));
        assert_eq!(
            records[1].meta.duplicate_with.as_deref(),
            Some(records[0].id.to_string().as_str())
        );
    }

    #[test]
    fn test_channel_duplicate_marks_later_dated_side() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(88),
                ts(2024, 3, 2, 9),
                "餐厅",
                Channel::Alipay,
            ),
            StandardRecord::expense(
                "中信银行信用卡(5678)",
                BigDecimal::from(88),
                ts(2024, 3, 1, 20),
                "餐厅",
                Channel::CiticCard,
            ),
        ];
        apply_channel_duplicates(&mut records, &ReconcileConfig::default());

        assert_eq!(records[0].status(), RecordStatus::Skipped);
        assert_eq!(records[0].skip_reason(), Some(SkipReason::ChannelDuplicate));
        assert!(records[1].is_pending());
    }

    #[test]
    fn test_distant_dates_are_not_channel_duplicates() {
        let mut records = vec![
            StandardRecord::expense(
                "微信",
                BigDecimal::from(30),
                ts(2024, 3, 1, 10),
                "超市",
                Channel::Wechat,
            ),
            StandardRecord::expense(
                "招商银行信用卡(1129)",
                BigDecimal::from(30),
                ts(2024, 3, 8, 10),
                "超市",
                Channel::CmbCard,
            ),
        ];
        apply_channel_duplicates(&mut records, &ReconcileConfig::default());
        assert!(records[0].is_pending());
        assert!(records[1].is_pending());
    }
}
