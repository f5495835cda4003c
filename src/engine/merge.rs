//! Output assembly: merged/incremental frames, audit report, summary counts
//!
//! The report is the only place skipped and canceled records remain visible
//! after a run; nothing silently vanishes between input and report.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::info;

use crate::schema;
use crate::types::{
    BaselineFrames, Channel, RecordStatus, Sheet, SkipReason, StandardRecord,
};

/// One audit row per processed record, whatever its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub sheet: Sheet,
    pub account: String,
    pub amount: BigDecimal,
    pub timestamp: NaiveDateTime,
    pub channel: Channel,
    pub status: RecordStatus,
    pub skip_reason: Option<SkipReason>,
    pub remark: String,
}

/// Outcome counts returned to the orchestrator's summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub accepted: usize,
    pub skipped: usize,
    pub canceled: usize,
    /// Records never resolved, e.g. a gated run that was aborted.
    pub pending: usize,
}

/// Build the audit report, one row per record in input order.
pub fn build_report(records: &[StandardRecord]) -> Vec<ReportRow> {
    records
        .iter()
        .map(|record| ReportRow {
            sheet: record.sheet(),
            account: record.account.clone(),
            amount: record.amount().clone(),
            timestamp: record.timestamp,
            channel: record.channel,
            status: record.status(),
            skip_reason: record.skip_reason(),
            remark: record.remark().to_string(),
        })
        .collect()
}

/// Count record outcomes.
pub fn summarize(records: &[StandardRecord]) -> ReconcileSummary {
    let mut summary = ReconcileSummary::default();
    for record in records {
        match record.status() {
            RecordStatus::Accepted => summary.accepted += 1,
            RecordStatus::Skipped => summary.skipped += 1,
            RecordStatus::Canceled => summary.canceled += 1,
            RecordStatus::Pending => summary.pending += 1,
        }
    }
    summary
}

/// Standalone frames holding only accepted records, template columns.
pub fn incremental_frames(records: &[StandardRecord]) -> BaselineFrames {
    let mut frames = BaselineFrames::new();
    append_accepted(&mut frames, records);
    sort_frames(&mut frames);
    frames
}

/// Concatenate accepted records onto the baseline, preserving the baseline's
/// own column schema per sheet, then sort ascending by date.
pub fn merge_into_baseline(
    mut baseline: BaselineFrames,
    records: &[StandardRecord],
) -> BaselineFrames {
    append_accepted(&mut baseline, records);
    sort_frames(&mut baseline);
    baseline
}

fn append_accepted(frames: &mut BaselineFrames, records: &[StandardRecord]) {
    let mut appended = 0usize;
    for record in records {
        if record.status() != RecordStatus::Accepted || record.meta.supplement_only {
            continue;
        }
        let sheet = record.sheet();
        frames.get_mut(sheet).push_mapped_row(sheet, &record.to_row());
        appended += 1;
    }
    info!(appended, "accepted records written to output frames");
}

fn sort_frames(frames: &mut BaselineFrames) {
    for sheet in Sheet::ALL {
        let column = schema::date_column(sheet);
        frames.get_mut(sheet).sort_rows_by_datetime(column);
    }
}
