//! Basic reconciliation usage example

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use std::str::FromStr;

use reconcile_core::{
    BaselineFrames, Channel, MemoryBaselineSource, ReconcileConfig, ReconcileEngine, Sheet,
    SheetFrame, StandardRecord,
};

fn ts(y: i32, m: u32, d: u32, h: u32) -> chrono::NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 Reconcile Core - Basic Example\n");

    // 1. Build a baseline: one reconciled taxi ride and one balance
    //    adjustment freezing the wallet's history up to Jan 10.
    println!("📚 Building baseline ledger...");
    let mut expense = SheetFrame::with_template(Sheet::Expense);
    for (date, amount, remark) in [
        ("2024-02-01 08:00:00", "50.00", "打车"),
        ("2024-01-10 00:00:00", "0.00", "余额调整产生的烂账"),
    ] {
        let mut cells = vec![String::new(); expense.columns().len()];
        cells[expense.column_index("账户").unwrap()] = "微信".to_string();
        cells[expense.column_index("消费日期").unwrap()] = date.to_string();
        cells[expense.column_index("消费金额").unwrap()] = amount.to_string();
        cells[expense.column_index("备注").unwrap()] = remark.to_string();
        expense.push_row(cells);
    }
    let mut baseline = BaselineFrames::new();
    baseline.insert(Sheet::Expense, expense);
    let source = MemoryBaselineSource::with_frames(baseline);
    println!("  ✓ Baseline holds 2 expense rows\n");

    // 2. Normalized records, as a wallet parser would emit them.
    println!("💳 Incoming records...");
    let records = vec![
        // Predates the account lock.
        StandardRecord::expense(
            "微信",
            BigDecimal::from(8),
            ts(2024, 1, 5, 9),
            "早餐",
            Channel::Wechat,
        ),
        // Refund pair: both sides cancel out.
        StandardRecord::expense(
            "微信",
            BigDecimal::from_str("120.00")?,
            ts(2024, 2, 10, 10),
            "网购订单退款",
            Channel::Wechat,
        ),
        StandardRecord::income(
            "微信",
            BigDecimal::from_str("120.00")?,
            ts(2024, 2, 12, 15),
            "网购订单退款",
            Channel::Wechat,
        ),
        // Duplicate of the baseline taxi row.
        StandardRecord::expense(
            "微信",
            BigDecimal::from_str("50.00")?,
            ts(2024, 2, 1, 9),
            "打车",
            Channel::Wechat,
        ),
        // Genuinely new.
        StandardRecord::expense(
            "微信",
            BigDecimal::from_str("32.50")?,
            ts(2024, 2, 20, 12),
            "午餐",
            Channel::Wechat,
        ),
    ];
    println!("  ✓ {} records parsed\n", records.len());

    // 3. Reconcile.
    println!("⚖️  Reconciling...");
    let engine = ReconcileEngine::new(ReconcileConfig::default())?;
    let outcome = engine.run_with_source(records, &source).await?;

    println!(
        "  ✓ accepted {}, skipped {}, canceled {}, pending {}\n",
        outcome.summary.accepted,
        outcome.summary.skipped,
        outcome.summary.canceled,
        outcome.summary.pending
    );

    // 4. The audit report keeps every record visible.
    println!("📋 Report:");
    for row in &outcome.report {
        let reason = row
            .skip_reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {} | {} | {} | {} | {} | {}",
            row.sheet, row.account, row.amount, row.timestamp, row.status, reason
        );
    }

    println!(
        "\n📊 Merged expense sheet now holds {} rows",
        outcome.frames.get(Sheet::Expense).len()
    );
    Ok(())
}
