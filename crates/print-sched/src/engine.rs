//! 印刷廠接單台
//!
//! 將收單、排程、計價、開票與作廢串成一個可跨執行緒共享的入口。
//! 可變狀態（訂單紀錄、排程器、帳本）全部放在同一把鎖之後，
//! 庫存各紙張另有自己的鎖。

use chrono::NaiveDateTime;
use print_core::{
    Allocation, Catalog, Inventory, Invoice, Order, OrderRecord, OrderStatus, PrintError, Result,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::ledger::{InvoiceSink, InvoiceStatus, Ledger, LedgerSummary};
use crate::pricing::Pricing;
use crate::scheduler::Scheduler;
use crate::ScheduleResult;

/// 一輪處理（排程 + 開票）的結果
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub schedule: ScheduleResult,
    pub invoices: Vec<Arc<Invoice>>,
}

struct Desk {
    records: HashMap<String, OrderRecord>,
    next_sequence: u64,
    scheduler: Scheduler,
    ledger: Ledger,
}

/// 印刷廠
pub struct PrintHouse {
    catalog: Arc<Catalog>,
    inventory: Arc<Inventory>,
    pricing: Pricing,
    desk: Mutex<Desk>,
}

impl PrintHouse {
    /// 創建印刷廠
    pub fn new(catalog: Arc<Catalog>, inventory: Arc<Inventory>) -> Self {
        tracing::info!("印刷廠啟動：機台 {} 台", catalog.machines.len());
        Self {
            pricing: Pricing::new(Arc::clone(&catalog)),
            desk: Mutex::new(Desk {
                records: HashMap::new(),
                next_sequence: 0,
                scheduler: Scheduler::new(Arc::clone(&catalog)),
                ledger: Ledger::new(),
            }),
            catalog,
            inventory,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn inventory(&self) -> &Arc<Inventory> {
        &self.inventory
    }

    /// 收單（以訂單ID冪等）
    ///
    /// 重複的訂單ID回傳 `DuplicateOrder` 且不產生任何副作用。
    pub fn submit(&self, order: Order) -> Result<()> {
        for item in &order.line_items {
            self.catalog.pricing.unit_price(&item.paper_type)?;
        }

        let mut desk = self.lock_desk()?;
        if desk.records.contains_key(&order.id) {
            tracing::warn!("重複收單: {}", order.id);
            return Err(PrintError::DuplicateOrder(order.id));
        }

        let sequence = desk.next_sequence;
        desk.next_sequence += 1;
        let record = OrderRecord::new(order, sequence);
        desk.scheduler.enqueue(&record);
        tracing::info!("收單 {}（序號 {}）", record.id(), sequence);
        desk.records.insert(record.id().to_string(), record);
        Ok(())
    }

    /// 執行排程
    pub fn run_scheduling(&self, now: NaiveDateTime) -> Result<ScheduleResult> {
        let mut desk = self.lock_desk()?;
        let Desk {
            records, scheduler, ..
        } = &mut *desk;
        scheduler.run(records, &self.inventory, now)
    }

    /// 完成單筆已排程訂單並開立發票
    pub fn fulfil(&self, order_id: &str, at: NaiveDateTime) -> Result<Arc<Invoice>> {
        let mut desk = self.lock_desk()?;
        let Desk {
            records, ledger, ..
        } = &mut *desk;

        let record = records
            .get_mut(order_id)
            .ok_or_else(|| PrintError::OrderNotFound(order_id.to_string()))?;
        record.expect_status(OrderStatus::Scheduled, "fulfil")?;
        let allocation = scheduled_allocation(record)?;

        let cost = self.pricing.quote(&record.order, &allocation)?;
        let invoice = ledger.finalize(&record.order, &allocation, cost, at)?;
        record.mark_fulfilled()?;
        Ok(invoice)
    }

    /// 完成所有已排程訂單（依收單順序，並行計價）
    pub fn fulfil_all(&self, at: NaiveDateTime) -> Result<Vec<Arc<Invoice>>> {
        let mut desk = self.lock_desk()?;
        let Desk {
            records, ledger, ..
        } = &mut *desk;

        let mut pending: Vec<&OrderRecord> = records
            .values()
            .filter(|r| r.status == OrderStatus::Scheduled && r.allocation.is_some())
            .collect();
        pending.sort_by_key(|r| r.sequence);

        let jobs: Vec<(&Order, &Allocation)> = pending
            .iter()
            .filter_map(|r| r.allocation.as_ref().map(|a| (&r.order, a)))
            .collect();
        let quotes = self.pricing.quote_batch(&jobs);

        let priced: Vec<(String, Result<_>)> = jobs
            .iter()
            .map(|(order, _)| order.id.clone())
            .zip(quotes)
            .collect();

        let mut invoices = Vec::with_capacity(priced.len());
        for (order_id, quote) in priced {
            let cost = match quote {
                Ok(cost) => cost,
                Err(e) => {
                    tracing::warn!("訂單 {} 計價失敗，保留為已排程：{}", order_id, e);
                    continue;
                }
            };
            let Some(record) = records.get_mut(&order_id) else {
                continue;
            };
            let allocation = scheduled_allocation(record)?;
            invoices.push(ledger.finalize(&record.order, &allocation, cost, at)?);
            record.mark_fulfilled()?;
        }

        tracing::info!("完成訂單 {} 筆", invoices.len());
        Ok(invoices)
    }

    /// 排程後完成所有已排程訂單
    pub fn process(&self, now: NaiveDateTime) -> Result<ProcessReport> {
        let schedule = self.run_scheduling(now)?;
        let invoices = self.fulfil_all(now)?;
        Ok(ProcessReport { schedule, invoices })
    }

    /// 取消已排程訂單：釋放庫存與機台時段
    pub fn cancel(&self, order_id: &str) -> Result<()> {
        let mut desk = self.lock_desk()?;
        let Desk {
            records, scheduler, ..
        } = &mut *desk;

        let record = records
            .get_mut(order_id)
            .ok_or_else(|| PrintError::OrderNotFound(order_id.to_string()))?;
        record.expect_status(OrderStatus::Scheduled, "cancel")?;
        let allocation = scheduled_allocation(record)?;

        self.inventory.release_all(&allocation.reservations)?;
        scheduler.release_slot(&allocation);
        record.mark_cancelled()?;
        tracing::info!("訂單 {} 已取消", order_id);
        Ok(())
    }

    /// 作廢已完成訂單的發票（匯出前）並釋放庫存，訂單維持已完成
    pub fn void_invoice(&self, order_id: &str) -> Result<Arc<Invoice>> {
        let mut desk = self.lock_desk()?;
        let Desk {
            records, ledger, ..
        } = &mut *desk;

        let record = records
            .get(order_id)
            .ok_or_else(|| PrintError::OrderNotFound(order_id.to_string()))?;
        record.expect_status(OrderStatus::Fulfilled, "void")?;

        ledger.void_invoice(order_id, &self.inventory)
    }

    /// 查詢發票狀態
    pub fn invoice_status(&self, order_id: &str) -> Result<Option<InvoiceStatus>> {
        Ok(self.lock_desk()?.ledger.status(order_id))
    }

    /// 匯出尚未匯出的發票
    pub fn export_invoices(&self, sink: &mut dyn InvoiceSink) -> Result<usize> {
        self.lock_desk()?.ledger.export(sink)
    }

    /// 查詢訂單狀態
    pub fn status(&self, order_id: &str) -> Result<OrderStatus> {
        self.record(order_id).map(|r| r.status)
    }

    /// 查詢訂單紀錄（快照）
    pub fn record(&self, order_id: &str) -> Result<OrderRecord> {
        self.lock_desk()?
            .records
            .get(order_id)
            .cloned()
            .ok_or_else(|| PrintError::OrderNotFound(order_id.to_string()))
    }

    /// 查詢訂單發票
    pub fn invoice(&self, order_id: &str) -> Result<Option<Arc<Invoice>>> {
        Ok(self.lock_desk()?.ledger.invoice(order_id))
    }

    /// 待排程訂單數
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock_desk()?.scheduler.pending())
    }

    /// 帳本摘要，含依型錄薪資規則計算的人事成本與毛利
    pub fn ledger_summary(&self) -> Result<LedgerSummary> {
        let summary = self.lock_desk()?.ledger.summary();
        let salary_expense = self.catalog.salary_expense(summary.revenue);
        Ok(summary.with_salary_expense(salary_expense))
    }

    fn lock_desk(&self) -> Result<MutexGuard<'_, Desk>> {
        self.desk
            .lock()
            .map_err(|_| PrintError::LockPoisoned("desk".to_string()))
    }
}

fn scheduled_allocation(record: &OrderRecord) -> Result<Allocation> {
    record
        .allocation
        .clone()
        .ok_or_else(|| PrintError::InvalidStateTransition {
            order_id: record.order.id.clone(),
            from: record.status,
            action: "allocation",
        })
}
