//! Ledger workbook template: sheet columns, key columns, and default cells
//!
//! The column layout mirrors the ledger template the baseline workbook is
//! exported from. Merge output must reproduce the baseline schema exactly
//! (same names, same order), so everything that touches frames goes through
//! this module instead of hard-coding column names.

use crate::types::Sheet;

/// Remark column shared by every sheet.
pub const REMARK_COLUMN: &str = "备注";

/// Remark text written by manual balance-adjustment corrections; a baseline
/// row carrying it freezes the account's history up to that row's date.
pub const DEFAULT_LOCK_REMARK: &str = "余额调整产生的烂账";

/// Category assigned to income entered retroactively during a correction.
pub const DEFAULT_MISSED_INCOME_CATEGORY: &str = "漏记款";

/// Token that tags a record (and its reversal) as part of a refund.
pub const DEFAULT_REFUND_MARKER: &str = "退款";

/// Canonical column set per sheet, in template order.
pub fn template_columns(sheet: Sheet) -> &'static [&'static str] {
    match sheet {
        Sheet::Expense => &[
            "支出大类",
            "支出小类",
            "账户",
            "币种",
            "项目",
            "商家",
            "报销",
            "消费日期",
            "消费金额",
            "成员金额",
            "备注",
            "账本",
        ],
        Sheet::Income => &[
            "收入大类",
            "账户",
            "币种",
            "项目",
            "付款方",
            "收入日期",
            "收入金额",
            "成员金额",
            "备注",
            "账本",
        ],
        Sheet::Transfer => &[
            "转出账户",
            "币种",
            "转出金额",
            "转入账户",
            "币种.1",
            "转入金额",
            "转账时间",
            "备注",
            "账本",
        ],
        Sheet::Loan => &[
            "借贷类型",
            "借贷时间",
            "借贷账户",
            "账户",
            "金额",
            "备注",
            "账本",
        ],
        Sheet::Repayment => &[
            "借贷类型",
            "借贷时间",
            "借贷账户",
            "账户",
            "金额",
            "利息",
            "备注",
            "账本",
        ],
    }
}

/// The date column used for lock scans, dedup, and output sorting.
pub fn date_column(sheet: Sheet) -> &'static str {
    match sheet {
        Sheet::Expense => "消费日期",
        Sheet::Income => "收入日期",
        Sheet::Transfer => "转账时间",
        Sheet::Loan | Sheet::Repayment => "借贷时间",
    }
}

/// Amount columns indexed for dedup. Transfers carry two.
pub fn amount_columns(sheet: Sheet) -> &'static [&'static str] {
    match sheet {
        Sheet::Expense => &["消费金额"],
        Sheet::Income => &["收入金额"],
        Sheet::Transfer => &["转出金额", "转入金额"],
        Sheet::Loan | Sheet::Repayment => &["金额"],
    }
}

/// Account column; transfers key on the outgoing side.
pub fn account_column(sheet: Sheet) -> &'static str {
    match sheet {
        Sheet::Transfer => "转出账户",
        _ => "账户",
    }
}

/// Category column, where the sheet has one (missed-income lock markers).
pub fn category_column(sheet: Sheet) -> Option<&'static str> {
    match sheet {
        Sheet::Expense => Some("支出大类"),
        Sheet::Income => Some("收入大类"),
        _ => None,
    }
}

/// Default cell values filled when a record row leaves a column blank.
pub fn default_values(sheet: Sheet) -> &'static [(&'static str, &'static str)] {
    match sheet {
        Sheet::Expense => &[
            ("项目", "日常"),
            ("报销", "非报销"),
            ("币种", "人民币"),
            ("账本", "日常账本"),
        ],
        Sheet::Income => &[("项目", "日常"), ("币种", "人民币"), ("账本", "日常账本")],
        Sheet::Transfer => &[
            ("币种", "人民币"),
            ("币种.1", "人民币"),
            ("账本", "日常账本"),
        ],
        Sheet::Loan => &[("账本", "日常账本")],
        Sheet::Repayment => &[("账本", "日常账本"), ("利息", "0")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_sheet_has_date_and_remark_columns() {
        for sheet in Sheet::ALL {
            let columns = template_columns(sheet);
            assert!(columns.contains(&date_column(sheet)));
            assert!(columns.contains(&REMARK_COLUMN));
            assert!(columns.contains(&account_column(sheet)));
            for amount_col in amount_columns(sheet) {
                assert!(columns.contains(amount_col));
            }
        }
    }

    #[test]
    fn test_defaults_reference_real_columns() {
        for sheet in Sheet::ALL {
            let columns = template_columns(sheet);
            for (column, _) in default_values(sheet) {
                assert!(columns.contains(column), "{column} missing on {sheet:?}");
            }
        }
    }
}
