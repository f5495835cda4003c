//! Core types and data structures for the reconciliation engine

use std::collections::BTreeMap;
use std::fmt;

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema;
use crate::utils::normalize::{normalize_remark, parse_datetime, quantize};

/// Timestamp format used in ledger cells.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The five semantic ledger categories a record can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Sheet {
    Expense,
    Income,
    Transfer,
    Loan,
    Repayment,
}

impl Sheet {
    /// Every sheet, in workbook order.
    pub const ALL: [Sheet; 5] = [
        Sheet::Expense,
        Sheet::Income,
        Sheet::Transfer,
        Sheet::Loan,
        Sheet::Repayment,
    ];

    /// Sheet name as it appears in the ledger workbook.
    pub fn title(&self) -> &'static str {
        match self {
            Sheet::Expense => "支出",
            Sheet::Income => "收入",
            Sheet::Transfer => "转账",
            Sheet::Loan => "借入借出",
            Sheet::Repayment => "收款还款",
        }
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sheet::Expense => write!(f, "expense"),
            Sheet::Income => write!(f, "income"),
            Sheet::Transfer => write!(f, "transfer"),
            Sheet::Loan => write!(f, "loan"),
            Sheet::Repayment => write!(f, "repayment"),
        }
    }
}

/// Broad grouping of channels; engine rules branch on this, never on the
/// concrete channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// Wallet apps whose exports carry the authoritative debit time.
    Wallet,
    /// Card issuer statements; postings may lag the wallet debit.
    CreditCard,
}

/// The originating payment/statement source of a record.
///
/// Extensible: adding a variant only requires a `kind()` and `label()` arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    Wechat,
    Alipay,
    CmbCard,
    CiticCard,
}

impl Channel {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Channel::Wechat | Channel::Alipay => ChannelKind::Wallet,
            Channel::CmbCard | Channel::CiticCard => ChannelKind::CreditCard,
        }
    }

    /// Human-readable source label used in report output and supplement
    /// annotations.
    pub fn label(&self) -> &'static str {
        match self {
            Channel::Wechat => "微信支付",
            Channel::Alipay => "支付宝",
            Channel::CmbCard => "招商银行信用卡",
            Channel::CiticCard => "中信银行信用卡",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Wechat => write!(f, "wechat"),
            Channel::Alipay => write!(f, "alipay"),
            Channel::CmbCard => write!(f, "cmb-card"),
            Channel::CiticCard => write!(f, "citic-card"),
        }
    }
}

/// Lifecycle state of a record. Terminal states are never reverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordStatus {
    Pending,
    Accepted,
    Skipped,
    Canceled,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordStatus::Pending => write!(f, "pending"),
            RecordStatus::Accepted => write!(f, "accepted"),
            RecordStatus::Skipped => write!(f, "skipped"),
            RecordStatus::Canceled => write!(f, "canceled"),
        }
    }
}

/// Why a record was skipped or canceled. Set exactly when the record enters
/// a skipped/canceled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Parser-level: a wallet row actually funded by a card, kept only so
    /// the card statement can borrow its context.
    NonWalletPayment,
    /// Predates the account's lock timestamp.
    AccountLocked,
    /// Matched an existing baseline row.
    DuplicateBaseline,
    /// Same purchase seen through both a wallet and a card channel.
    ChannelDuplicate,
    /// Consumed by a refund pair.
    RefundMatched,
    /// Declined in the interactive confirm loop.
    UserDeclined,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NonWalletPayment => write!(f, "non-wallet-payment"),
            SkipReason::AccountLocked => write!(f, "account-locked"),
            SkipReason::DuplicateBaseline => write!(f, "duplicate-baseline"),
            SkipReason::ChannelDuplicate => write!(f, "channel-duplicate"),
            SkipReason::RefundMatched => write!(f, "refund-matched"),
            SkipReason::UserDeclined => write!(f, "user-declined"),
        }
    }
}

/// Sheet-specific ledger fields. The variant determines the record's sheet,
/// so sheet and details can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SheetDetails {
    Expense {
        category_main: String,
        category_sub: String,
        merchant: Option<String>,
    },
    Income {
        category: String,
        payer: Option<String>,
    },
    Transfer {
        from_account: String,
        to_account: String,
        out_amount: BigDecimal,
        in_amount: BigDecimal,
    },
    Loan {
        loan_type: String,
        loan_account: String,
        counterparty_account: String,
    },
    Repayment {
        loan_type: String,
        loan_account: String,
        counterparty_account: String,
        interest: String,
    },
}

impl SheetDetails {
    /// Expense details with the ledger's "uncategorized" placeholders.
    pub fn expense() -> Self {
        SheetDetails::Expense {
            category_main: "待分类".to_string(),
            category_sub: "待分类".to_string(),
            merchant: None,
        }
    }

    /// Income details with the ledger's "uncategorized" placeholder.
    pub fn income() -> Self {
        SheetDetails::Income {
            category: "待分类".to_string(),
            payer: None,
        }
    }

    pub fn sheet(&self) -> Sheet {
        match self {
            SheetDetails::Expense { .. } => Sheet::Expense,
            SheetDetails::Income { .. } => Sheet::Income,
            SheetDetails::Transfer { .. } => Sheet::Transfer,
            SheetDetails::Loan { .. } => Sheet::Loan,
            SheetDetails::Repayment { .. } => Sheet::Repayment,
        }
    }
}

/// Structured metadata attached to a record by parsers and engine passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Remark text before any engine annotation; the supplement join key.
    pub base_remark: Option<String>,
    /// Normalized merchant/payer name.
    pub merchant: Option<String>,
    /// Parser-provided grouping key for refund pairing and dedup.
    pub matching_key: Option<String>,
    /// Opaque channel-specific fields (支付方式, 状态, card suffix, ...),
    /// carried through but never interpreted beyond the supplement pass.
    pub source_extras: BTreeMap<String, String>,
    /// Human-readable channel label, if the parser attached one.
    pub channel_label: Option<String>,
    /// Context-only record: never enters output frames or the confirm loop.
    pub supplement_only: bool,
    /// Id of the retained record this one duplicates.
    pub duplicate_with: Option<String>,
    /// Channel whose context was appended to this record's remark.
    pub supplemented_from: Option<Channel>,
}

/// One normalized transaction, channel-agnostic, ready for reconciliation.
///
/// Status and skip reason are private: they move only through the monotonic
/// `mark_*` methods, so a terminal decision is never reverted and
/// `skip_reason` is populated exactly for skipped/canceled records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardRecord {
    /// Unique identifier for the record within this run.
    pub id: Uuid,
    /// Paying/receiving account name.
    pub account: String,
    amount: BigDecimal,
    /// Timezone-normalized timestamp (parsers convert to the canonical zone).
    pub timestamp: NaiveDateTime,
    remark: String,
    normalized_remark: String,
    /// Originating channel.
    pub channel: Channel,
    /// Sheet-specific ledger fields; also determines the sheet.
    pub details: SheetDetails,
    /// Parser/engine metadata.
    pub meta: RecordMeta,
    status: RecordStatus,
    skip_reason: Option<SkipReason>,
}

impl StandardRecord {
    /// Create a pending record. The amount is quantized to 2 decimal places
    /// and the remark's normalized form is cached.
    pub fn new(
        details: SheetDetails,
        account: impl Into<String>,
        amount: BigDecimal,
        timestamp: NaiveDateTime,
        remark: impl Into<String>,
        channel: Channel,
    ) -> Self {
        let remark = remark.into();
        let normalized_remark = normalize_remark(&remark);
        let meta = RecordMeta {
            base_remark: Some(remark.clone()),
            channel_label: Some(channel.label().to_string()),
            ..RecordMeta::default()
        };
        Self {
            id: Uuid::new_v4(),
            account: account.into(),
            amount: quantize(&amount),
            timestamp,
            remark,
            normalized_remark,
            channel,
            details,
            meta,
            status: RecordStatus::Pending,
            skip_reason: None,
        }
    }

    /// Convenience constructor for an expense record.
    pub fn expense(
        account: impl Into<String>,
        amount: BigDecimal,
        timestamp: NaiveDateTime,
        remark: impl Into<String>,
        channel: Channel,
    ) -> Self {
        Self::new(
            SheetDetails::expense(),
            account,
            amount,
            timestamp,
            remark,
            channel,
        )
    }

    /// Convenience constructor for an income record.
    pub fn income(
        account: impl Into<String>,
        amount: BigDecimal,
        timestamp: NaiveDateTime,
        remark: impl Into<String>,
        channel: Channel,
    ) -> Self {
        Self::new(
            SheetDetails::income(),
            account,
            amount,
            timestamp,
            remark,
            channel,
        )
    }

    /// Attach a parser grouping key.
    pub fn with_matching_key(mut self, key: impl Into<String>) -> Self {
        self.meta.matching_key = Some(key.into());
        self
    }

    /// Attach a channel-specific supplementary field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.source_extras.insert(key.into(), value.into());
        self
    }

    pub fn sheet(&self) -> Sheet {
        self.details.sheet()
    }

    /// Quantized amount as parsed (magnitude for most channels; some carry
    /// signed reversals).
    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    /// Amount magnitude, the refund/dedup bucketing key.
    pub fn magnitude(&self) -> BigDecimal {
        self.amount.abs()
    }

    pub fn remark(&self) -> &str {
        &self.remark
    }

    /// Cached whitespace/punctuation-insensitive remark form.
    pub fn normalized_remark(&self) -> &str {
        &self.normalized_remark
    }

    /// Append an annotation to the remark, keeping the cached normalized
    /// form in sync. The base remark in `meta` is untouched.
    pub fn append_remark(&mut self, addition: &str) {
        if self.remark.is_empty() {
            self.remark = addition.to_string();
        } else {
            self.remark = format!("{}; {}", self.remark, addition);
        }
        self.normalized_remark = normalize_remark(&self.remark);
    }

    pub fn status(&self) -> RecordStatus {
        self.status
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    pub fn is_pending(&self) -> bool {
        self.status == RecordStatus::Pending
    }

    /// Pending and eligible for the confirm loop and output frames.
    pub fn is_actionable(&self) -> bool {
        self.is_pending() && !self.meta.supplement_only
    }

    /// Transition to skipped. No-op once a terminal state is reached.
    pub fn mark_skipped(&mut self, reason: SkipReason) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RecordStatus::Skipped;
        self.skip_reason = Some(reason);
    }

    /// Transition to canceled. No-op once a terminal state is reached.
    pub fn mark_canceled(&mut self, reason: SkipReason) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RecordStatus::Canceled;
        self.skip_reason = Some(reason);
    }

    /// Transition to accepted. No-op once a terminal state is reached.
    pub fn mark_accepted(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = RecordStatus::Accepted;
    }

    /// Render the record as ledger cells keyed by template column name.
    /// Columns the record does not fill are absent; frame appends resolve
    /// them against per-sheet defaults.
    pub fn to_row(&self) -> BTreeMap<&'static str, String> {
        let mut row: BTreeMap<&'static str, String> = BTreeMap::new();
        let timestamp = self.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let amount = self.amount.to_string();
        match &self.details {
            SheetDetails::Expense {
                category_main,
                category_sub,
                merchant,
            } => {
                row.insert("支出大类", category_main.clone());
                row.insert("支出小类", category_sub.clone());
                row.insert("账户", self.account.clone());
                row.insert("消费日期", timestamp);
                row.insert("消费金额", amount);
                row.insert("备注", self.remark.clone());
                if let Some(merchant) = merchant {
                    row.insert("商家", merchant.clone());
                }
            }
            SheetDetails::Income { category, payer } => {
                row.insert("收入大类", category.clone());
                row.insert("账户", self.account.clone());
                row.insert("收入日期", timestamp);
                row.insert("收入金额", amount);
                row.insert("备注", self.remark.clone());
                if let Some(payer) = payer {
                    row.insert("付款方", payer.clone());
                }
            }
            SheetDetails::Transfer {
                from_account,
                to_account,
                out_amount,
                in_amount,
            } => {
                let from = if from_account.is_empty() {
                    self.account.clone()
                } else {
                    from_account.clone()
                };
                row.insert("转出账户", from);
                row.insert("转出金额", quantize(out_amount).to_string());
                row.insert("转入账户", to_account.clone());
                row.insert("转入金额", quantize(in_amount).to_string());
                row.insert("转账时间", timestamp);
                row.insert("备注", self.remark.clone());
            }
            SheetDetails::Loan {
                loan_type,
                loan_account,
                counterparty_account,
            } => {
                row.insert("借贷类型", loan_type.clone());
                row.insert("借贷时间", timestamp);
                row.insert("借贷账户", loan_account.clone());
                row.insert("账户", counterparty_account.clone());
                row.insert("金额", amount);
                row.insert("备注", self.remark.clone());
            }
            SheetDetails::Repayment {
                loan_type,
                loan_account,
                counterparty_account,
                interest,
            } => {
                row.insert("借贷类型", loan_type.clone());
                row.insert("借贷时间", timestamp);
                row.insert("借贷账户", loan_account.clone());
                row.insert("账户", counterparty_account.clone());
                row.insert("金额", amount);
                row.insert("利息", interest.clone());
                row.insert("备注", self.remark.clone());
            }
        }
        row
    }
}

/// Per-sheet table of ledger rows: ordered columns, string cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetFrame {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl SheetFrame {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Empty frame with the sheet's canonical template columns.
    pub fn with_template(sheet: Sheet) -> Self {
        Self::new(
            schema::template_columns(sheet)
                .iter()
                .map(|c| c.to_string())
                .collect(),
        )
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell value at (row, column name); `None` when the column is absent.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }

    /// Append raw cells, padding or truncating to the column count.
    pub fn push_row(&mut self, mut cells: Vec<String>) {
        cells.resize(self.columns.len(), String::new());
        self.rows.push(cells);
    }

    /// Append a record's cells in this frame's own column order, resolving
    /// missing cells against the sheet's defaults. This is what keeps merge
    /// output column-schema-identical to the baseline.
    pub fn push_mapped_row(&mut self, sheet: Sheet, row: &BTreeMap<&'static str, String>) {
        let defaults = schema::default_values(sheet);
        let cells = self
            .columns
            .iter()
            .map(|column| {
                row.get(column.as_str()).cloned().unwrap_or_else(|| {
                    defaults
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, value)| value.to_string())
                        .unwrap_or_default()
                })
            })
            .collect();
        self.rows.push(cells);
    }

    /// Stable-sort rows ascending by a datetime column; rows whose cell does
    /// not parse sort last in their original order.
    pub fn sort_rows_by_datetime(&mut self, column: &str) {
        let Some(index) = self.column_index(column) else {
            return;
        };
        self.rows.sort_by_key(|row| {
            row.get(index)
                .and_then(|cell| parse_datetime(cell))
                .map_or((true, NaiveDateTime::MIN), |dt| (false, dt))
        });
    }
}

/// One frame per sheet; all five sheets always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineFrames {
    frames: BTreeMap<Sheet, SheetFrame>,
}

impl BaselineFrames {
    /// Empty frames with template columns for every sheet.
    pub fn new() -> Self {
        let frames = Sheet::ALL
            .into_iter()
            .map(|sheet| (sheet, SheetFrame::with_template(sheet)))
            .collect();
        Self { frames }
    }

    /// Wrap loaded frames, materializing any missing sheet as an empty
    /// template frame.
    pub fn from_map(mut loaded: BTreeMap<Sheet, SheetFrame>) -> Self {
        for sheet in Sheet::ALL {
            loaded
                .entry(sheet)
                .or_insert_with(|| SheetFrame::with_template(sheet));
        }
        Self { frames: loaded }
    }

    pub fn get(&self, sheet: Sheet) -> &SheetFrame {
        &self.frames[&sheet]
    }

    pub fn get_mut(&mut self, sheet: Sheet) -> &mut SheetFrame {
        self.frames.get_mut(&sheet).expect("all sheets present")
    }

    pub fn insert(&mut self, sheet: Sheet, frame: SheetFrame) {
        self.frames.insert(sheet, frame);
    }

    pub fn iter(&self) -> impl Iterator<Item = (Sheet, &SheetFrame)> {
        self.frames.iter().map(|(sheet, frame)| (*sheet, frame))
    }
}

impl Default for BaselineFrames {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during a reconciliation run.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// A record violating the parser contract reached the engine; fatal for
    /// the invocation.
    #[error("Malformed record from {channel}: {detail}")]
    MalformedRecord { channel: String, detail: String },
    /// Invalid tolerance/window values; rejected before any stage runs.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// The baseline-loading collaborator failed.
    #[error("Baseline source error: {0}")]
    Baseline(String),
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
