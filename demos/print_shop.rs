//! 印刷廠接單示例
//!
//! 執行：`RUST_LOG=debug cargo run --example print_shop`

use anyhow::Context;
use chrono::{NaiveDate, NaiveTime};
use printhouse::{
    logging, Catalog, Employee, FinishingOption, Inventory, JsonLinesSink, LineItem, Machine,
    Order, PaperStock, PayrollRules, PrintHouse, ShiftHours, StaffRole, WorkCalendar,
};
use rust_decimal::Decimal;
use std::sync::Arc;

const PRICING_JSON: &str = r#"{
    "machines": [],
    "pricing": {
        "paper_prices": { "A4": "0.45", "A3": "0.85", "GLOSSY": "1.20" },
        "finishing_surcharges": { "Binding": "0.15", "Lamination": "0.30" },
        "rush_window_hours": 48,
        "rush_surcharge_pct": "30",
        "bulk_discount": { "threshold": 1000, "percentage": "5" }
    }
}"#;

fn main() -> anyhow::Result<()> {
    logging::init();

    println!("=== 印刷廠接單示例 ===\n");

    // 工作日曆：週一到週五，08:00-18:00
    let monday = NaiveDate::from_ymd_opt(2025, 11, 3).context("無效日期")?;
    let shift = ShiftHours::new(
        NaiveTime::from_hms_opt(8, 0, 0).context("無效時間")?,
        NaiveTime::from_hms_opt(18, 0, 0).context("無效時間")?,
    );
    let calendar = WorkCalendar::new("FACTORY".to_string());

    let pricing = Catalog::from_json_str(PRICING_JSON)?.pricing;
    let catalog = Catalog::new(pricing)
        .with_machine(
            Machine::new("DIGITAL-1".to_string(), 60)
                .with_paper_types(["A4", "A3"])
                .with_max_job_sheets(2_000)
                .with_work_calendar(&calendar, monday, 7, shift),
        )
        .with_machine(
            Machine::new("OFFSET-1".to_string(), 250)
                .with_paper_types(["A4", "A3", "GLOSSY"])
                .with_colour(true)
                .with_work_calendar(&calendar, monday, 7, shift),
        )
        .with_employee(
            Employee::operator("OP-01".to_string(), "DIGITAL-1".to_string())
                .with_work_calendar(&calendar, monday, 7, shift),
        )
        .with_employee(
            Employee::operator("OP-02".to_string(), "OFFSET-1".to_string())
                .with_work_calendar(&calendar, monday, 7, shift),
        )
        .with_employee(Employee::manager("MGR-01".to_string()))
        .with_payroll(PayrollRules::new(Decimal::new(1200, 0)).with_increment(
            Decimal::new(5, 0),
            Decimal::new(1000, 0),
            [StaffRole::Manager],
        ));
    catalog.validate()?;

    let inventory = Inventory::from_stocks([
        PaperStock::new("A4".to_string(), 5_000, 1_000),
        PaperStock::new("A3".to_string(), 800, 200),
        PaperStock::new("GLOSSY".to_string(), 300, 100),
    ]);

    let house = PrintHouse::new(Arc::new(catalog), Arc::new(inventory));
    let received = monday.and_hms_opt(8, 0, 0).context("無效時間")?;
    let deadline = |day: u32, hour: u32| {
        NaiveDate::from_ymd_opt(2025, 11, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .context("無效交期")
    };

    let orders = vec![
        Order::new(
            "ORD-001".to_string(),
            "BOOKSHOP".to_string(),
            vec![LineItem::new("A4".to_string(), 1_500).with_finishing(FinishingOption::Binding)],
            deadline(7, 18)?,
        ),
        Order::new(
            "ORD-002".to_string(),
            "AGENCY".to_string(),
            vec![
                LineItem::new("GLOSSY".to_string(), 250).with_finishing(FinishingOption::Lamination),
                LineItem::new("A3".to_string(), 100),
            ],
            deadline(4, 12)?,
        )
        .with_colour(true)
        .with_priority(2),
        Order::new(
            "ORD-003".to_string(),
            "CAFE".to_string(),
            vec![LineItem::new("GLOSSY".to_string(), 200)],
            deadline(5, 18)?,
        )
        .with_colour(true),
    ];

    for order in orders {
        let order = order.with_received_at(received);
        println!("收單: {} ({} 張)", order.id, order.total_sheets());
        house.submit(order)?;
    }

    let report = house.process(received)?;

    println!("\n排程結果:");
    for allocation in &report.schedule.scheduled {
        println!(
            "  - {} → {} [{} ~ {}]",
            allocation.order_id, allocation.machine_id, allocation.slot.start, allocation.slot.end
        );
    }
    for (order_id, reason) in &report.schedule.rejected {
        println!("  - {} 拒絕: {}", order_id, reason);
    }
    for warning in &report.schedule.warnings {
        println!("  ! {}: {}", warning.subject, warning.message);
    }

    println!("\n發票:");
    for invoice in &report.invoices {
        println!(
            "  - {} 基本 {} 加工 {} 急件 {} 折扣 {} 合計 {}",
            invoice.order_id,
            invoice.cost.base,
            invoice.cost.finishing,
            invoice.cost.rush_surcharge,
            invoice.cost.discount,
            invoice.total()
        );
    }

    println!("\n匯出 (JSON Lines):");
    {
        let mut sink = JsonLinesSink::new(std::io::stdout().lock());
        house.export_invoices(&mut sink)?;
    }

    let summary = house.ledger_summary()?;
    println!(
        "\n營收: {}，人事成本: {}，毛利: {}，發票 {} 張",
        summary.revenue, summary.salary_expense, summary.profit, summary.issued
    );
    for (paper_type, stock) in house.inventory().levels()? {
        println!("  庫存 {}: {}", paper_type, stock.on_hand);
    }

    Ok(())
}
