//! Reconciliation orchestrator: configuration, stage sequencing, outcome

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::dedup::{apply_baseline_dedup, apply_channel_duplicates, BaselineIndex};
use crate::engine::locks::AccountLocks;
use crate::engine::merge::{self, ReconcileSummary, ReportRow};
use crate::engine::refund::apply_refund_pairs;
use crate::engine::supplement::supplement_card_remarks;
use crate::schema;
use crate::traits::{
    AutoConfirm, BaselineSource, ConfirmDecision, ConfirmGate, RemarkSimilarity,
    TokenOverlapSimilarity,
};
use crate::types::{
    BaselineFrames, ReconcileError, ReconcileResult, RecordStatus, SkipReason, StandardRecord,
};

/// How refund candidates are grouped before pairwise comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefundGrouping {
    /// Pair within the same account (a wallet refund lands on the wallet).
    #[default]
    Account,
    /// Pair within the same channel, for exports whose account naming is
    /// too inconsistent to group on.
    Channel,
}

/// Recognized engine options. Serde-friendly so a config-file collaborator
/// can deserialize straight into it; every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Baseline dedup time window, in hours.
    pub date_tolerance_hours: i64,
    /// Refund pairing window, in days.
    pub refund_window_days: i64,
    /// Card-posting lag allowed when borrowing wallet context, in hours.
    pub supplement_window_hours: i64,
    /// Max calendar-day gap for wallet/card overlap detection.
    pub channel_overlap_days: i64,
    pub account_lock_enabled: bool,
    /// Emit only newly accepted records instead of merging the baseline.
    pub incremental_only: bool,
    /// When false, baseline dedup matches on (sheet, account, amount, date)
    /// alone.
    pub compare_remarks: bool,
    /// Threshold handed to the default similarity strategy, in `[0, 1]`.
    pub remark_similarity_threshold: f64,
    pub refund_grouping: RefundGrouping,
    /// Remark texts that mark a baseline row as a balance-adjustment
    /// write-off.
    pub lock_remarks: Vec<String>,
    /// Categories that mark a baseline row as retroactively entered income.
    pub missed_income_categories: Vec<String>,
    /// Token identifying refund remarks on both sides of a pair.
    pub refund_marker: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            date_tolerance_hours: 48,
            refund_window_days: 30,
            supplement_window_hours: 48,
            channel_overlap_days: 1,
            account_lock_enabled: true,
            incremental_only: false,
            compare_remarks: true,
            remark_similarity_threshold: 0.5,
            refund_grouping: RefundGrouping::Account,
            lock_remarks: vec![schema::DEFAULT_LOCK_REMARK.to_string()],
            missed_income_categories: vec![schema::DEFAULT_MISSED_INCOME_CATEGORY.to_string()],
            refund_marker: schema::DEFAULT_REFUND_MARKER.to_string(),
        }
    }
}

impl ReconcileConfig {
    /// Reject invalid tolerances before any stage runs.
    pub fn validate(&self) -> ReconcileResult<()> {
        if self.date_tolerance_hours < 0 {
            return Err(ReconcileError::Configuration(format!(
                "date_tolerance_hours must be non-negative, got {}",
                self.date_tolerance_hours
            )));
        }
        if self.refund_window_days < 0 {
            return Err(ReconcileError::Configuration(format!(
                "refund_window_days must be non-negative, got {}",
                self.refund_window_days
            )));
        }
        if self.supplement_window_hours < 0 {
            return Err(ReconcileError::Configuration(format!(
                "supplement_window_hours must be non-negative, got {}",
                self.supplement_window_hours
            )));
        }
        if self.channel_overlap_days < 0 {
            return Err(ReconcileError::Configuration(format!(
                "channel_overlap_days must be non-negative, got {}",
                self.channel_overlap_days
            )));
        }
        if !(0.0..=1.0).contains(&self.remark_similarity_threshold) {
            return Err(ReconcileError::Configuration(format!(
                "remark_similarity_threshold must be within [0, 1], got {}",
                self.remark_similarity_threshold
            )));
        }
        Ok(())
    }

    pub fn date_tolerance(&self) -> Duration {
        Duration::hours(self.date_tolerance_hours)
    }

    pub fn refund_window(&self) -> Duration {
        Duration::days(self.refund_window_days)
    }

    pub fn supplement_window(&self) -> Duration {
        Duration::hours(self.supplement_window_hours)
    }
}

/// Everything a run produces: output frames, the audit report, counts, and
/// the records in their final states.
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Merged baseline or incremental frames, per `incremental_only`.
    pub frames: BaselineFrames,
    /// One row per input record; the audit trail.
    pub report: Vec<ReportRow>,
    pub summary: ReconcileSummary,
    pub records: Vec<StandardRecord>,
}

/// The reconciliation engine.
///
/// Holds configuration and the remark-similarity strategy; both are fixed
/// for the engine's lifetime, so repeated runs against the same inputs make
/// the same decisions. All stage state (locks, baseline index) is scoped to
/// a single `run` call and never escapes it.
pub struct ReconcileEngine {
    config: ReconcileConfig,
    matcher: Box<dyn RemarkSimilarity>,
}

impl ReconcileEngine {
    /// Engine with the default token-overlap similarity strategy.
    pub fn new(config: ReconcileConfig) -> ReconcileResult<Self> {
        let threshold = config.remark_similarity_threshold;
        Self::with_matcher(config, Box::new(TokenOverlapSimilarity::new(threshold)))
    }

    /// Engine with a custom similarity strategy.
    pub fn with_matcher(
        config: ReconcileConfig,
        matcher: Box<dyn RemarkSimilarity>,
    ) -> ReconcileResult<Self> {
        config.validate()?;
        Ok(Self { config, matcher })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Pure per-record decision: terminal records report their status, a
    /// pending record is proposed for acceptance. The orchestrator calls
    /// this eagerly under auto-confirm or behind the confirm gate.
    pub fn evaluate(record: &StandardRecord) -> RecordStatus {
        if record.is_pending() {
            RecordStatus::Accepted
        } else {
            record.status()
        }
    }

    /// Run the full pipeline, accepting every surviving record.
    pub fn run(
        &self,
        records: Vec<StandardRecord>,
        baseline: BaselineFrames,
    ) -> ReconcileResult<ReconcileOutcome> {
        self.run_gated(records, baseline, &mut AutoConfirm)
    }

    /// Load the baseline from a collaborator, then run.
    pub async fn run_with_source<S: BaselineSource>(
        &self,
        records: Vec<StandardRecord>,
        source: &S,
    ) -> ReconcileResult<ReconcileOutcome> {
        let baseline = source.load_baseline().await?;
        self.run(records, baseline)
    }

    /// Run the full pipeline with an interactive confirm gate.
    ///
    /// Stage order is a correctness requirement: locks exclude records from
    /// every matching pool, refund pairing runs before dedup so a refunded
    /// pair never also competes for duplicate-baseline status, and
    /// supplementation sees final statuses. Each stage runs to completion
    /// before the next begins.
    pub fn run_gated(
        &self,
        mut records: Vec<StandardRecord>,
        baseline: BaselineFrames,
        gate: &mut dyn ConfirmGate,
    ) -> ReconcileResult<ReconcileOutcome> {
        self.check_parser_contract(&records)?;
        info!(records = records.len(), "reconciliation run started");

        let locks = if self.config.account_lock_enabled {
            AccountLocks::from_baseline(&baseline, &self.config)
        } else {
            AccountLocks::empty()
        };
        locks.apply(&mut records);

        apply_refund_pairs(&mut records, &self.config, self.matcher.as_ref());

        let index = BaselineIndex::from_frames(&baseline);
        apply_channel_duplicates(&mut records, &self.config);
        apply_baseline_dedup(&mut records, &index, &self.config, self.matcher.as_ref());

        supplement_card_remarks(&mut records, &self.config);

        self.confirm(&mut records, gate);

        let frames = if self.config.incremental_only {
            merge::incremental_frames(&records)
        } else {
            merge::merge_into_baseline(baseline, &records)
        };
        let report = merge::build_report(&records);
        let summary = merge::summarize(&records);
        info!(
            accepted = summary.accepted,
            skipped = summary.skipped,
            canceled = summary.canceled,
            pending = summary.pending,
            "reconciliation run finished"
        );
        Ok(ReconcileOutcome {
            frames,
            report,
            summary,
            records,
        })
    }

    /// Drive the confirm gate over records the engine proposes to accept,
    /// strictly in input order. After an abort, remaining records stay
    /// pending and surface in `summary.pending`.
    fn confirm(&self, records: &mut [StandardRecord], gate: &mut dyn ConfirmGate) {
        let mut accept_all = false;
        let mut decline_all = false;
        for record in records.iter_mut() {
            if !record.is_actionable() || Self::evaluate(record) != RecordStatus::Accepted {
                continue;
            }
            let decision = if accept_all {
                ConfirmDecision::Accept
            } else if decline_all {
                ConfirmDecision::Decline
            } else {
                gate.decide(record)
            };
            match decision {
                ConfirmDecision::Accept => record.mark_accepted(),
                ConfirmDecision::Decline => record.mark_skipped(SkipReason::UserDeclined),
                ConfirmDecision::AcceptAll => {
                    accept_all = true;
                    record.mark_accepted();
                }
                ConfirmDecision::DeclineAll => {
                    decline_all = true;
                    record.mark_skipped(SkipReason::UserDeclined);
                }
                ConfirmDecision::Abort => break,
            }
        }
    }

    /// Records reaching the engine must honor the parser contract; a broken
    /// one fails the whole invocation with its origin named.
    fn check_parser_contract(&self, records: &[StandardRecord]) -> ReconcileResult<()> {
        for record in records {
            if record.account.trim().is_empty() {
                return Err(ReconcileError::MalformedRecord {
                    channel: record.channel.to_string(),
                    detail: format!(
                        "empty account on {} record at {}",
                        record.sheet(),
                        record.timestamp
                    ),
                });
            }
        }
        Ok(())
    }
}
