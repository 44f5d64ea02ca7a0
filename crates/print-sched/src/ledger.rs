//! 發票帳本與匯出

use chrono::NaiveDateTime;
use print_core::{
    Allocation, CostBreakdown, Inventory, Invoice, Order, OrderStatus, PrintError, Result,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::Arc;

/// 發票狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InvoiceStatus {
    /// 已開立，尚未匯出
    Issued,
    /// 已匯出（不可再作廢）
    Exported,
    /// 已作廢
    Voided,
}

/// 帳本項目
#[derive(Debug, Clone)]
struct InvoiceEntry {
    invoice: Arc<Invoice>,
    status: InvoiceStatus,
    /// 開立時的分配（作廢時依此釋放庫存）
    allocation: Allocation,
}

/// 發票匯出端
pub trait InvoiceSink {
    /// 寫出一張發票
    fn write_invoice(&mut self, invoice: &Invoice) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

impl InvoiceSink for Vec<Invoice> {
    fn write_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        self.push(invoice.clone());
        Ok(())
    }
}

/// JSON Lines 匯出：每張發票一行 JSON
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    /// 已寫出張數
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> InvoiceSink for JsonLinesSink<W> {
    fn write_invoice(&mut self, invoice: &Invoice) -> Result<()> {
        serde_json::to_writer(&mut self.writer, invoice)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// 帳本摘要
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    /// 開立張數（含作廢）
    pub issued: usize,
    pub exported: usize,
    pub voided: usize,
    /// 有效發票營收
    pub revenue: Decimal,
    /// 有效發票的紙張用量
    pub paper_consumed: BTreeMap<String, u64>,
    /// 人事成本
    pub salary_expense: Decimal,
    /// 營收扣除人事成本
    pub profit: Decimal,
}

impl LedgerSummary {
    /// 計入人事成本並重算毛利
    pub fn with_salary_expense(mut self, salary_expense: Decimal) -> Self {
        self.salary_expense = salary_expense;
        self.profit = self.revenue - salary_expense;
        self
    }
}

/// 發票帳本（依開立順序）
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Vec<InvoiceEntry>,
    index: HashMap<String, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 開立發票，每筆訂單只能一次
    pub fn finalize(
        &mut self,
        order: &Order,
        allocation: &Allocation,
        cost: CostBreakdown,
        issued_at: NaiveDateTime,
    ) -> Result<Arc<Invoice>> {
        if self.index.contains_key(&order.id) {
            return Err(PrintError::InvalidStateTransition {
                order_id: order.id.clone(),
                from: OrderStatus::Fulfilled,
                action: "finalize",
            });
        }

        let invoice = Arc::new(Invoice::issue(order, allocation, cost, issued_at));
        tracing::info!("開立發票 {}：訂單 {}，金額 {}", invoice.id, order.id, cost.total);

        self.index.insert(order.id.clone(), self.entries.len());
        self.entries.push(InvoiceEntry {
            invoice: Arc::clone(&invoice),
            status: InvoiceStatus::Issued,
            allocation: allocation.clone(),
        });
        Ok(invoice)
    }

    /// 作廢發票並釋放庫存，僅限尚未匯出的發票
    pub fn void_invoice(&mut self, order_id: &str, inventory: &Inventory) -> Result<Arc<Invoice>> {
        let index = *self
            .index
            .get(order_id)
            .ok_or_else(|| PrintError::OrderNotFound(order_id.to_string()))?;
        let entry = &mut self.entries[index];

        if entry.status != InvoiceStatus::Issued {
            return Err(PrintError::InvalidStateTransition {
                order_id: order_id.to_string(),
                from: OrderStatus::Fulfilled,
                action: "void",
            });
        }

        inventory.release_all(&entry.allocation.reservations)?;
        entry.status = InvoiceStatus::Voided;
        tracing::info!("發票 {} 已作廢，訂單 {} 庫存已釋放", entry.invoice.id, order_id);
        Ok(Arc::clone(&entry.invoice))
    }

    /// 匯出所有尚未匯出的有效發票，回傳匯出張數
    ///
    /// 寫出並 flush 成功後才標記為已匯出；任何一步失敗時整批維持已開立，
    /// 可再次匯出或作廢。
    pub fn export(&mut self, sink: &mut dyn InvoiceSink) -> Result<usize> {
        let pending: Vec<usize> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.status == InvoiceStatus::Issued)
            .map(|(i, _)| i)
            .collect();

        for &i in &pending {
            sink.write_invoice(&self.entries[i].invoice)?;
        }
        if let Err(e) = sink.flush() {
            tracing::error!("發票匯出失敗，{} 張維持已開立：{}", pending.len(), e);
            return Err(e);
        }

        for &i in &pending {
            self.entries[i].status = InvoiceStatus::Exported;
        }
        tracing::info!("匯出發票 {} 張", pending.len());
        Ok(pending.len())
    }

    pub fn invoice(&self, order_id: &str) -> Option<Arc<Invoice>> {
        self.entry(order_id).map(|e| Arc::clone(&e.invoice))
    }

    pub fn status(&self, order_id: &str) -> Option<InvoiceStatus> {
        self.entry(order_id).map(|e| e.status)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 帳本摘要
    pub fn summary(&self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            issued: self.entries.len(),
            ..LedgerSummary::default()
        };

        for entry in &self.entries {
            match entry.status {
                InvoiceStatus::Voided => {
                    summary.voided += 1;
                    continue;
                }
                InvoiceStatus::Exported => summary.exported += 1,
                InvoiceStatus::Issued => {}
            }
            summary.revenue += entry.invoice.total();
            for line in &entry.invoice.lines {
                *summary
                    .paper_consumed
                    .entry(line.paper_type.clone())
                    .or_insert(0) += line.quantity;
            }
        }
        summary.profit = summary.revenue;
        summary
    }

    fn entry(&self, order_id: &str) -> Option<&InvoiceEntry> {
        self.index.get(order_id).map(|&i| &self.entries[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use print_core::{LineItem, PaperStock, TimeWindow};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn fixture(id: &str, quantity: u64) -> (Order, Allocation, CostBreakdown) {
        let order = Order::new(
            id.to_string(),
            "CLIENT".to_string(),
            vec![LineItem::new("A4".to_string(), quantity)],
            at(10, 12),
        );
        let allocation = Allocation::new(
            order.id.clone(),
            "PRESS-1".to_string(),
            TimeWindow::new(at(3, 8), at(3, 9)),
            order.reservations(),
        );
        let total = Decimal::new(50, 2) * Decimal::from(quantity);
        let cost = CostBreakdown {
            base: total,
            total,
            ..CostBreakdown::default()
        };
        (order, allocation, cost)
    }

    #[test]
    fn test_finalize_once() {
        let mut ledger = Ledger::new();
        let (order, allocation, cost) = fixture("ORD-1", 20);

        let invoice = ledger.finalize(&order, &allocation, cost, at(3, 10)).unwrap();
        assert_eq!(invoice.order_id, "ORD-1");
        assert_eq!(invoice.total(), Decimal::new(1000, 2));
        assert_eq!(invoice.lines.len(), 1);

        let second = ledger.finalize(&order, &allocation, cost, at(3, 11));
        assert!(matches!(
            second,
            Err(PrintError::InvalidStateTransition { action: "finalize", .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_void_releases_stock() {
        let inventory = Inventory::from_stocks([PaperStock::new("A4".to_string(), 30, 0)]);
        let mut ledger = Ledger::new();
        let (order, allocation, cost) = fixture("ORD-1", 20);
        ledger.finalize(&order, &allocation, cost, at(3, 10)).unwrap();

        ledger.void_invoice("ORD-1", &inventory).unwrap();

        assert_eq!(inventory.available("A4").unwrap(), 50);
        assert_eq!(ledger.status("ORD-1"), Some(InvoiceStatus::Voided));
        // 重複作廢不會再釋放
        assert!(ledger.void_invoice("ORD-1", &inventory).is_err());
        assert_eq!(inventory.available("A4").unwrap(), 50);
        assert!(matches!(
            ledger.void_invoice("NOPE", &inventory),
            Err(PrintError::OrderNotFound(_))
        ));
    }

    #[test]
    fn test_exported_invoice_cannot_be_voided() {
        let inventory = Inventory::from_stocks([PaperStock::new("A4".to_string(), 30, 0)]);
        let mut ledger = Ledger::new();
        let (order, allocation, cost) = fixture("ORD-1", 20);
        ledger.finalize(&order, &allocation, cost, at(3, 10)).unwrap();

        let mut sink: Vec<Invoice> = Vec::new();
        assert_eq!(ledger.export(&mut sink).unwrap(), 1);
        assert_eq!(sink.len(), 1);

        let result = ledger.void_invoice("ORD-1", &inventory);
        assert!(matches!(
            result,
            Err(PrintError::InvalidStateTransition { from: OrderStatus::Fulfilled, .. })
        ));
        assert_eq!(inventory.available("A4").unwrap(), 30);

        // 已匯出者不會重複匯出
        assert_eq!(ledger.export(&mut sink).unwrap(), 0);
    }

    /// 寫入成功但 flush 失敗的寫出端
    struct FlushFails;

    impl Write for FlushFails {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }
    }

    #[test]
    fn test_failed_flush_keeps_invoices_issued() {
        let inventory = Inventory::from_stocks([PaperStock::new("A4".to_string(), 30, 0)]);
        let mut ledger = Ledger::new();
        for (id, qty) in [("ORD-1", 20), ("ORD-2", 40)] {
            let (order, allocation, cost) = fixture(id, qty);
            ledger.finalize(&order, &allocation, cost, at(3, 10)).unwrap();
        }

        let result = ledger.export(&mut JsonLinesSink::new(FlushFails));
        assert!(matches!(result, Err(PrintError::Io(_))));
        assert_eq!(ledger.status("ORD-1"), Some(InvoiceStatus::Issued));
        assert_eq!(ledger.summary().exported, 0);

        // 仍可作廢，其餘的可再次匯出
        ledger.void_invoice("ORD-1", &inventory).unwrap();
        let mut sink: Vec<Invoice> = Vec::new();
        assert_eq!(ledger.export(&mut sink).unwrap(), 1);
        assert_eq!(sink[0].order_id, "ORD-2");
        assert_eq!(ledger.status("ORD-2"), Some(InvoiceStatus::Exported));
    }

    #[test]
    fn test_json_lines_export() {
        let mut ledger = Ledger::new();
        for (id, qty) in [("ORD-1", 20), ("ORD-2", 40)] {
            let (order, allocation, cost) = fixture(id, qty);
            ledger.finalize(&order, &allocation, cost, at(3, 10)).unwrap();
        }

        let mut sink = JsonLinesSink::new(Vec::new());
        ledger.export(&mut sink).unwrap();
        assert_eq!(sink.written(), 2);

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Invoice = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.order_id, "ORD-1");
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["order_id"], "ORD-2");
    }

    #[test]
    fn test_summary_excludes_voided() {
        let inventory = Inventory::from_stocks([PaperStock::new("A4".to_string(), 0, 0)]);
        let mut ledger = Ledger::new();
        for (id, qty) in [("ORD-1", 20), ("ORD-2", 40), ("ORD-3", 10)] {
            let (order, allocation, cost) = fixture(id, qty);
            ledger.finalize(&order, &allocation, cost, at(3, 10)).unwrap();
        }
        ledger.void_invoice("ORD-2", &inventory).unwrap();
        ledger.export(&mut Vec::<Invoice>::new()).unwrap();

        let summary = ledger.summary();
        assert_eq!(summary.issued, 3);
        assert_eq!(summary.voided, 1);
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.revenue, Decimal::new(1500, 2));
        assert_eq!(summary.paper_consumed.get("A4"), Some(&30));
        assert_eq!(summary.salary_expense, Decimal::ZERO);

        let summary = summary.with_salary_expense(Decimal::new(10, 0));
        assert_eq!(summary.profit, Decimal::new(500, 2));
    }
}
