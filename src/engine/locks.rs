//! Account lock resolution and application
//!
//! Manual corrections in the baseline (balance-adjustment write-offs,
//! retroactively entered "missed income") mean the account's history up to
//! the correction date is already represented. Incoming records at or before
//! that date must not be re-imported.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::engine::core::ReconcileConfig;
use crate::schema;
use crate::types::{BaselineFrames, SkipReason, StandardRecord};
use crate::utils::normalize::{account_root, normalize_text, parse_datetime};

/// Per-account lock timestamps, keyed by suffix-stripped account root.
/// Built once per run from the baseline; read-only afterward.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountLocks {
    locks: BTreeMap<String, NaiveDateTime>,
}

impl AccountLocks {
    /// No locks; used when lock resolution is disabled.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scan every baseline row for lock markers and keep the latest
    /// qualifying timestamp per account.
    ///
    /// The result depends only on baseline content (max is commutative), and
    /// the scan never fails: rows with unparsable dates are logged and
    /// skipped, so the worst case is an empty lock map.
    pub fn from_baseline(frames: &BaselineFrames, config: &ReconcileConfig) -> Self {
        let mut locks: BTreeMap<String, NaiveDateTime> = BTreeMap::new();
        for (sheet, frame) in frames.iter() {
            if frame.is_empty() {
                continue;
            }
            let date_column = schema::date_column(sheet);
            let account_column = schema::account_column(sheet);
            let category_column = schema::category_column(sheet);
            for row in 0..frame.len() {
                let remark = normalize_text(frame.value(row, schema::REMARK_COLUMN).unwrap_or(""));
                let category = category_column
                    .and_then(|column| frame.value(row, column))
                    .map(normalize_text)
                    .unwrap_or_default();
                let is_marker = config.lock_remarks.iter().any(|r| r == &remark)
                    || (!category.is_empty()
                        && config.missed_income_categories.iter().any(|c| c == &category));
                if !is_marker {
                    continue;
                }
                let cell = frame.value(row, date_column).unwrap_or("");
                let Some(timestamp) = parse_datetime(cell) else {
                    warn!(sheet = %sheet, row, cell, "lock marker row has unparsable date; skipping");
                    continue;
                };
                let account = normalize_text(frame.value(row, account_column).unwrap_or(""));
                if account.is_empty() {
                    continue;
                }
                let root = account_root(&account).to_string();
                locks
                    .entry(root)
                    .and_modify(|current| {
                        if timestamp > *current {
                            *current = timestamp;
                        }
                    })
                    .or_insert(timestamp);
            }
        }
        debug!(accounts = locks.len(), "account locks resolved");
        Self { locks }
    }

    /// Lock timestamp for an account, looked up by its suffix-stripped root.
    pub fn get(&self, account: &str) -> Option<NaiveDateTime> {
        self.locks.get(account_root(account)).copied()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Skip every pending record dated at or before its account's lock.
    ///
    /// Runs before refund pairing and dedup so locked records never enter a
    /// matching pool. Idempotent for a fixed baseline.
    pub fn apply(&self, records: &mut [StandardRecord]) {
        if self.is_empty() {
            return;
        }
        for record in records.iter_mut().filter(|r| r.is_pending()) {
            if let Some(lock) = self.get(&record.account) {
                if record.timestamp <= lock {
                    record.mark_skipped(SkipReason::AccountLocked);
                }
            }
        }
    }
}
