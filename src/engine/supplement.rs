//! Cross-channel remark supplementation
//!
//! Card statement rows are terse ("财付通-休闲娱乐"); the wallet export for
//! the same purchase knows the merchant, the order, and whether the payment
//! was later refunded. This pass copies that context onto the card record's
//! remark. Purely enrichment: status is never touched.

use std::collections::HashMap;

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use tracing::debug;

use crate::engine::core::ReconcileConfig;
use crate::types::{Channel, ChannelKind, RecordStatus, Sheet, SkipReason, StandardRecord};
use crate::utils::normalize::account_root;

const PAY_METHOD_EXTRA: &str = "支付方式";
const STATUS_EXTRA: &str = "状态";
const REFUND_KEYWORDS: [&str; 3] = ["退款", "关闭", "退回"];
const ANNOTATION_PREFIX: &str = "来源补充";

struct WalletContext {
    timestamp: NaiveDateTime,
    amount: BigDecimal,
    sheet: Sheet,
    channel: Channel,
    label: String,
    pay_method: String,
    supplement: String,
    has_refund_hint: bool,
}

/// Enrich card-channel records with matching wallet-channel context.
///
/// Wallet sources include records already skipped (a card-funded wallet row
/// is skipped as `NonWalletPayment` precisely so its context can be borrowed
/// here), but never canceled or context-only ones. Card targets are pending
/// records plus channel-duplicate skips. Among candidate sources the closest
/// timestamp wins; re-runs detect the existing annotation and append nothing.
pub fn supplement_card_remarks(records: &mut [StandardRecord], config: &ReconcileConfig) {
    let window = config.supplement_window();

    let mut contexts: Vec<WalletContext> = Vec::new();
    let mut by_remark: HashMap<String, Vec<usize>> = HashMap::new();
    for record in records.iter() {
        if record.channel.kind() != ChannelKind::Wallet
            || record.status() == RecordStatus::Canceled
            || record.meta.supplement_only
        {
            continue;
        }
        let Some(base_remark) = record
            .meta
            .base_remark
            .clone()
            .filter(|r| !r.is_empty())
            .or_else(|| Some(record.remark().to_string()).filter(|r| !r.is_empty()))
        else {
            continue;
        };
        let status_text = record
            .meta
            .source_extras
            .get(STATUS_EXTRA)
            .cloned()
            .unwrap_or_default();
        let mut parts: Vec<String> = Vec::new();
        for part in base_remark
            .split(';')
            .map(str::trim)
            .filter(|part| !part.is_empty() && !part.eq_ignore_ascii_case("nan"))
        {
            if !parts.iter().any(|seen| seen == part) {
                parts.push(part.to_string());
            }
        }
        if !status_text.is_empty() {
            let status_part = format!("{STATUS_EXTRA}: {status_text}");
            if !parts.contains(&status_part) {
                parts.push(status_part);
            }
        }
        let supplement = parts.join("; ");
        let has_refund_hint = REFUND_KEYWORDS
            .iter()
            .any(|k| supplement.contains(k) || status_text.contains(k));
        let index = contexts.len();
        contexts.push(WalletContext {
            timestamp: record.timestamp,
            amount: record.amount().clone(),
            sheet: record.sheet(),
            channel: record.channel,
            label: record
                .meta
                .channel_label
                .clone()
                .unwrap_or_else(|| record.channel.label().to_string()),
            pay_method: record
                .meta
                .source_extras
                .get(PAY_METHOD_EXTRA)
                .cloned()
                .unwrap_or_default(),
            supplement,
            has_refund_hint,
        });
        by_remark.entry(base_remark).or_default().push(index);
    }

    let mut supplemented = 0usize;
    for record in records.iter_mut() {
        if record.channel.kind() != ChannelKind::CreditCard {
            continue;
        }
        match (record.status(), record.skip_reason()) {
            (RecordStatus::Pending, _) => {}
            (RecordStatus::Skipped, Some(SkipReason::ChannelDuplicate)) => {}
            _ => continue,
        }
        let base_remark = record
            .meta
            .base_remark
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| record.remark().to_string());
        if base_remark.is_empty() {
            continue;
        }
        let Some(candidates) = by_remark.get(&base_remark) else {
            continue;
        };
        let card_account = record.account.clone();
        let card_root = account_root(&card_account).to_string();

        let mut best: Option<(chrono::Duration, usize)> = None;
        for &context_index in candidates {
            let context = &contexts[context_index];
            // The wallet row must name this card as its funding method.
            if !card_account.is_empty() && !context.pay_method.contains(&card_account) {
                if card_root.is_empty() || !context.pay_method.contains(&card_root) {
                    continue;
                }
            }
            let direction_match = record.sheet() == context.sheet;
            let refund_match = record.sheet() == Sheet::Income
                && context.sheet == Sheet::Expense
                && context.has_refund_hint;
            if !direction_match && !refund_match {
                continue;
            }
            let delta = (context.timestamp - record.timestamp).abs();
            if delta > window {
                continue;
            }
            if &context.amount != record.amount() {
                continue;
            }
            if context.supplement.is_empty() {
                continue;
            }
            if best.is_none() || delta < best.unwrap().0 {
                best = Some((delta, context_index));
            }
        }
        let Some((_, context_index)) = best else {
            continue;
        };
        let context = &contexts[context_index];
        if record.remark().contains(&context.supplement)
            && record.remark().contains(ANNOTATION_PREFIX)
        {
            continue;
        }
        record.append_remark(&format!(
            "{ANNOTATION_PREFIX}({}): {}",
            context.label, context.supplement
        ));
        record.meta.supplemented_from = Some(context.channel);
        supplemented += 1;
    }
    debug!(supplemented, "card remarks supplemented");
}
