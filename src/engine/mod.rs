//! Reconciliation engine: locks, refund pairing, dedup, supplementation,
//! merge, and the orchestrator that sequences them

pub mod core;
pub mod dedup;
pub mod locks;
pub mod merge;
pub mod refund;
pub mod supplement;

pub use self::core::{ReconcileConfig, ReconcileEngine, ReconcileOutcome, RefundGrouping};
pub use self::dedup::BaselineIndex;
pub use self::locks::AccountLocks;
pub use self::merge::{ReconcileSummary, ReportRow};
