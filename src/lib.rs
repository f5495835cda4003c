//! # Reconcile Core
//!
//! A reconciliation engine for multi-channel transaction imports: takes
//! normalized records from wallet and credit-card statement parsers plus a
//! baseline ledger snapshot, and decides, per record, whether it is a
//! duplicate, a matched refund, a locked-account transaction, or a genuinely
//! new entry to merge.
//!
//! ## Features
//!
//! - **Account locks**: balance-adjustment markers in the baseline freeze an
//!   account's history so corrected periods are never re-imported
//! - **Refund pairing**: opposite-amount records within a time window cancel
//!   each other, greedily and deterministically
//! - **Baseline dedup**: tolerance-based duplicate detection against the
//!   existing ledger, keyed by (sheet, account, amount)
//! - **Cross-channel handling**: wallet/card double-entries are detected and
//!   card remarks are enriched with wallet context
//! - **Audit report**: every record surfaces in the report with a
//!   machine-readable status and skip reason
//!
//! ## Quick Start
//!
//! ```rust
//! use bigdecimal::BigDecimal;
//! use chrono::NaiveDate;
//! use reconcile_core::{
//!     BaselineFrames, Channel, ReconcileConfig, ReconcileEngine, StandardRecord,
//! };
//!
//! let engine = ReconcileEngine::new(ReconcileConfig::default()).unwrap();
//! let records = vec![StandardRecord::expense(
//!     "微信",
//!     BigDecimal::from(25),
//!     NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(12, 0, 0).unwrap(),
//!     "午餐",
//!     Channel::Wechat,
//! )];
//! let outcome = engine.run(records, BaselineFrames::new()).unwrap();
//! assert_eq!(outcome.summary.accepted, 1);
//! ```

pub mod engine;
pub mod schema;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use engine::*;
pub use traits::*;
pub use types::*;

// Re-export the in-memory baseline source for convenience
pub use utils::MemoryBaselineSource;
