//! 排程器

use chrono::NaiveDateTime;
use print_core::{
    Allocation, Catalog, Inventory, MachineCalendar, Order, OrderRecord, OrderStatus,
    PrintError, RejectionReason,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::queue::{OrderQueue, QueueEntry};
use crate::{ScheduleResult, ScheduleWarning};

/// 單次分配嘗試失敗的原因
#[derive(Debug)]
enum AttemptFailure {
    NoCapableMachine,
    DeadlineUnreachable,
    InsufficientStock {
        paper_type: String,
        requested: u64,
        available: u64,
    },
}

/// 排程器
///
/// 持有唯讀型錄、每台機台的排程日曆與待排程佇列。
pub struct Scheduler {
    catalog: Arc<Catalog>,

    /// 機台日曆（依型錄順序）
    calendars: Vec<MachineCalendar>,

    queue: OrderQueue,
}

impl Scheduler {
    /// 創建新的排程器
    pub fn new(catalog: Arc<Catalog>) -> Self {
        let calendars = catalog
            .machines
            .iter()
            .map(|machine| catalog.booking_calendar(machine))
            .collect();
        Self {
            catalog,
            calendars,
            queue: OrderQueue::new(),
        }
    }

    /// 查詢機台日曆
    pub fn calendar(&self, machine_id: &str) -> Option<&MachineCalendar> {
        self.calendars.iter().find(|c| c.machine_id == machine_id)
    }

    /// 待排程訂單數
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// 將訂單加入佇列
    pub fn enqueue(&mut self, record: &OrderRecord) {
        tracing::debug!(
            "訂單 {} 入列（優先級 {}，序號 {}）",
            record.order.id,
            record.order.priority,
            record.sequence
        );
        self.queue.push(QueueEntry::from_record(record));
    }

    /// 執行一輪排程，直到佇列清空
    ///
    /// 出列與分配視為同一交易：庫存不足時全部回滾，未重試過的訂單降級重新排隊。
    pub fn run(
        &mut self,
        records: &mut HashMap<String, OrderRecord>,
        inventory: &Inventory,
        now: NaiveDateTime,
    ) -> print_core::Result<ScheduleResult> {
        tracing::info!("開始排程：待排程訂單 {} 筆，基準時間 {}", self.queue.len(), now);
        let start_time = std::time::Instant::now();

        let mut result = ScheduleResult::empty();
        let mut touched_paper: BTreeSet<String> = BTreeSet::new();

        while let Some(entry) = self.queue.pop() {
            let Some(record) = records.get_mut(&entry.order_id) else {
                tracing::warn!("佇列中的訂單 {} 不存在，略過", entry.order_id);
                continue;
            };
            if record.status != OrderStatus::Intake {
                tracing::debug!("訂單 {} 狀態為 {:?}，略過", entry.order_id, record.status);
                continue;
            }

            tracing::debug!("嘗試排程訂單 {}（優先級 {}）", entry.order_id, entry.priority);
            result.attempts.push(entry.order_id.clone());

            match self.try_allocate(&record.order, inventory, now)? {
                Ok(allocation) => {
                    touched_paper.extend(allocation.reservations.iter().map(|r| r.paper_type.clone()));
                    tracing::info!(
                        "訂單 {} 排入機台 {}：{} ~ {}",
                        allocation.order_id,
                        allocation.machine_id,
                        allocation.slot.start,
                        allocation.slot.end
                    );
                    record.mark_scheduled(allocation.clone())?;
                    result.scheduled.push(allocation);
                }
                Err(AttemptFailure::InsufficientStock {
                    paper_type,
                    requested,
                    available,
                }) if record.can_retry() => {
                    tracing::warn!(
                        "訂單 {} 紙張 {} 不足（需要 {}, 可用 {}），降級重試",
                        entry.order_id,
                        paper_type,
                        requested,
                        available
                    );
                    record.record_retry();
                    result.add_warning(ScheduleWarning::info(
                        entry.order_id.clone(),
                        format!("紙張 {} 不足，降級重試", paper_type),
                    ));
                    self.queue.requeue(entry);
                }
                Err(failure) => {
                    let reason = match failure {
                        AttemptFailure::NoCapableMachine => RejectionReason::NoCapableMachine,
                        AttemptFailure::DeadlineUnreachable => RejectionReason::DeadlineUnreachable,
                        AttemptFailure::InsufficientStock {
                            paper_type,
                            requested,
                            available,
                        } => RejectionReason::InsufficientStock {
                            paper_type,
                            requested,
                            available,
                        },
                    };
                    tracing::warn!("訂單 {} 被拒絕：{}", entry.order_id, reason);
                    record.mark_rejected(reason.clone())?;
                    result.rejected.push((entry.order_id, reason));
                }
            }
        }

        for stock in inventory.below_reorder()? {
            if touched_paper.contains(&stock.paper_type) {
                tracing::warn!(
                    "紙張 {} 庫存 {} 已達再訂購點 {}",
                    stock.paper_type,
                    stock.on_hand,
                    stock.reorder_threshold
                );
                result.add_warning(ScheduleWarning::warning(
                    stock.paper_type.clone(),
                    format!(
                        "庫存 {} 已達再訂購點 {}",
                        stock.on_hand, stock.reorder_threshold
                    ),
                ));
            }
        }

        result.calculation_time_ms = Some(start_time.elapsed().as_millis());
        tracing::info!(
            "排程完成，耗時 {:?}：排入 {} 筆，拒絕 {} 筆",
            start_time.elapsed(),
            result.scheduled.len(),
            result.rejected.len()
        );

        Ok(result)
    }

    /// 釋放分配佔用的機台時段
    pub fn release_slot(&mut self, allocation: &Allocation) -> bool {
        let released = self
            .calendars
            .iter_mut()
            .find(|c| c.machine_id == allocation.machine_id)
            .is_some_and(|calendar| calendar.release(&allocation.slot));
        if released {
            tracing::debug!(
                "釋放機台 {} 時段 {} ~ {}",
                allocation.machine_id,
                allocation.slot.start,
                allocation.slot.end
            );
        }
        released
    }

    /// 依型錄順序尋找第一台可排入的機台並預留庫存
    ///
    /// 外層錯誤為基礎設施錯誤（鎖中毒），內層為分配結果。
    fn try_allocate(
        &mut self,
        order: &Order,
        inventory: &Inventory,
        now: NaiveDateTime,
    ) -> print_core::Result<std::result::Result<Allocation, AttemptFailure>> {
        let sheets = order.total_sheets();
        let reservations = order.reservations();
        let mut any_capable = false;

        for (machine, calendar) in self.catalog.machines.iter().zip(self.calendars.iter_mut()) {
            if !machine.can_print(order) {
                continue;
            }
            any_capable = true;

            let duration = machine.run_time(sheets);
            let Some(slot) = calendar.find_slot(duration, now, order.deadline) else {
                tracing::debug!("機台 {} 在交期前無空檔", machine.id);
                continue;
            };

            match inventory.reserve_all(&reservations) {
                Ok(()) => {}
                Err(PrintError::InsufficientStock {
                    paper_type,
                    requested,
                    available,
                }) => {
                    return Ok(Err(AttemptFailure::InsufficientStock {
                        paper_type,
                        requested,
                        available,
                    }));
                }
                Err(PrintError::UnknownPaperType(paper_type)) => {
                    let requested = reservations
                        .iter()
                        .find(|r| r.paper_type == paper_type)
                        .map(|r| r.quantity)
                        .unwrap_or(0);
                    return Ok(Err(AttemptFailure::InsufficientStock {
                        paper_type,
                        requested,
                        available: 0,
                    }));
                }
                Err(e) => return Err(e),
            }

            if !calendar.book(slot) {
                inventory.release_all(&reservations)?;
                tracing::warn!("機台 {} 時段預訂失敗，已回滾庫存", machine.id);
                continue;
            }

            return Ok(Ok(Allocation::new(
                order.id.clone(),
                machine.id.clone(),
                slot,
                reservations,
            )));
        }

        if any_capable {
            Ok(Err(AttemptFailure::DeadlineUnreachable))
        } else {
            Ok(Err(AttemptFailure::NoCapableMachine))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use print_core::{Employee, LineItem, Machine, PaperStock, PricingRules, TimeWindow};

    fn at(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn catalog() -> Arc<Catalog> {
        let shift = vec![TimeWindow::new(at(3, 8), at(3, 16))];
        Arc::new(
            Catalog::new(PricingRules::new())
                .with_machine(
                    Machine::new("MONO".to_string(), 10)
                        .with_paper_types(["A4"])
                        .with_availability(shift.clone()),
                )
                .with_machine(
                    Machine::new("COLOUR".to_string(), 10)
                        .with_paper_types(["A4", "A3"])
                        .with_colour(true)
                        .with_availability(shift),
                ),
        )
    }

    fn inventory(a4: u64, a3: u64) -> Inventory {
        Inventory::from_stocks([
            PaperStock::new("A4".to_string(), a4, 10),
            PaperStock::new("A3".to_string(), a3, 10),
        ])
    }

    fn submit(
        scheduler: &mut Scheduler,
        records: &mut HashMap<String, OrderRecord>,
        order: Order,
    ) {
        let record = OrderRecord::new(order, records.len() as u64);
        scheduler.enqueue(&record);
        records.insert(record.order.id.clone(), record);
    }

    fn order(id: &str, items: Vec<LineItem>, deadline: NaiveDateTime) -> Order {
        Order::new(id.to_string(), "CLIENT".to_string(), items, deadline).with_received_at(at(1, 9))
    }

    #[test]
    fn test_schedule_first_capable_machine() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(500, 500);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order("ORD-1", vec![LineItem::new("A4".to_string(), 100)], at(3, 16)),
        );
        submit(
            &mut scheduler,
            &mut records,
            order("ORD-2", vec![LineItem::new("A3".to_string(), 50)], at(3, 16)),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();

        assert_eq!(result.scheduled.len(), 2);
        let first = &records["ORD-1"];
        assert_eq!(first.status, OrderStatus::Scheduled);
        let allocation = first.allocation.as_ref().unwrap();
        assert_eq!(allocation.machine_id, "MONO");
        assert_eq!(allocation.slot, TimeWindow::new(at(3, 8), at(3, 8) + Duration::minutes(10)));

        // A3 只有彩色機支援
        assert_eq!(records["ORD-2"].allocation.as_ref().unwrap().machine_id, "COLOUR");
        assert_eq!(inventory.available("A4").unwrap(), 400);
        assert_eq!(inventory.available("A3").unwrap(), 450);
        assert_eq!(scheduler.calendar("MONO").unwrap().booked().len(), 1);
    }

    #[test]
    fn test_priority_order_of_attempts() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(500, 500);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order("A", vec![LineItem::new("A4".to_string(), 10)], at(3, 15)).with_priority(2),
        );
        submit(
            &mut scheduler,
            &mut records,
            order("B", vec![LineItem::new("A4".to_string(), 10)], at(3, 12)).with_priority(1),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();
        assert_eq!(result.attempts, vec!["B", "A"]);
    }

    #[test]
    fn test_insufficient_stock_retries_once_then_rejects() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(50, 500);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order("BIG", vec![LineItem::new("A4".to_string(), 100)], at(3, 16)),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();

        assert_eq!(result.attempts, vec!["BIG", "BIG"]);
        assert_eq!(
            result.warnings[0],
            ScheduleWarning::info("BIG".to_string(), "紙張 A4 不足，降級重試".to_string())
        );
        assert_eq!(records["BIG"].status, OrderStatus::Rejected);
        assert_eq!(records["BIG"].retries, 1);
        assert_eq!(
            result.rejection_of("BIG"),
            Some(&RejectionReason::InsufficientStock {
                paper_type: "A4".to_string(),
                requested: 100,
                available: 50,
            })
        );
        assert_eq!(inventory.available("A4").unwrap(), 50);
        assert!(scheduler.calendar("MONO").unwrap().booked().is_empty());
    }

    #[test]
    fn test_partial_stock_rolls_back_all_lines() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(500, 5);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order(
                "MIXED",
                vec![
                    LineItem::new("A4".to_string(), 100),
                    LineItem::new("A3".to_string(), 50),
                ],
                at(3, 16),
            ),
        );

        scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();

        assert_eq!(records["MIXED"].status, OrderStatus::Rejected);
        assert_eq!(inventory.available("A4").unwrap(), 500);
        assert_eq!(inventory.available("A3").unwrap(), 5);
    }

    #[test]
    fn test_deadline_unreachable() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(5_000, 500);
        let mut records = HashMap::new();

        // 3000 張 / 10 ppm = 300 分鐘，但 12:00 前只有 4 小時
        submit(
            &mut scheduler,
            &mut records,
            order("SLOW", vec![LineItem::new("A4".to_string(), 3_000)], at(3, 12)),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();

        assert_eq!(result.rejection_of("SLOW"), Some(&RejectionReason::DeadlineUnreachable));
        assert_eq!(inventory.available("A4").unwrap(), 5_000);
    }

    #[test]
    fn test_no_capable_machine() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(500, 500);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order("GLOSS", vec![LineItem::new("GLOSSY".to_string(), 10)], at(3, 16)),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();
        assert_eq!(result.rejection_of("GLOSS"), Some(&RejectionReason::NoCapableMachine));
    }

    #[test]
    fn test_busy_machine_falls_through_to_next() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(10_000, 500);
        let mut records = HashMap::new();

        // 各佔用 6 小時，第二筆只能排到彩色機
        submit(
            &mut scheduler,
            &mut records,
            order("FIRST", vec![LineItem::new("A4".to_string(), 3_600)], at(3, 16)),
        );
        submit(
            &mut scheduler,
            &mut records,
            order("SECOND", vec![LineItem::new("A4".to_string(), 3_600)], at(3, 16)),
        );

        scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();

        assert_eq!(records["FIRST"].allocation.as_ref().unwrap().machine_id, "MONO");
        assert_eq!(records["SECOND"].allocation.as_ref().unwrap().machine_id, "COLOUR");
    }

    #[test]
    fn test_operator_shift_limits_slots() {
        // MONO 只有 12:00 起有人值班，COLOUR 沒有操作員
        let catalog = Arc::new(
            (*catalog()).clone().with_employee(
                Employee::operator("OP-1".to_string(), "MONO".to_string())
                    .with_shifts(vec![TimeWindow::new(at(3, 12), at(3, 20))]),
            ),
        );
        let mut scheduler = Scheduler::new(catalog);
        let inventory = inventory(500, 500);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order("EARLY", vec![LineItem::new("A4".to_string(), 10)], at(3, 11)),
        );
        submit(
            &mut scheduler,
            &mut records,
            order("NOON", vec![LineItem::new("A4".to_string(), 10)], at(3, 16)),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();

        assert_eq!(result.rejection_of("EARLY"), Some(&RejectionReason::DeadlineUnreachable));
        let allocation = records["NOON"].allocation.as_ref().unwrap();
        assert_eq!(allocation.machine_id, "MONO");
        assert_eq!(allocation.slot.start, at(3, 12));
        assert!(scheduler.calendar("COLOUR").unwrap().open_windows().is_empty());
        assert_eq!(inventory.available("A4").unwrap(), 490);
    }

    #[test]
    fn test_reorder_warning_and_release_slot() {
        let mut scheduler = Scheduler::new(catalog());
        let inventory = inventory(30, 500);
        let mut records = HashMap::new();

        submit(
            &mut scheduler,
            &mut records,
            order("ORD", vec![LineItem::new("A4".to_string(), 25)], at(3, 16)),
        );

        let result = scheduler.run(&mut records, &inventory, at(3, 8)).unwrap();
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].subject, "A4");

        let allocation = result.scheduled[0].clone();
        assert!(scheduler.release_slot(&allocation));
        assert!(!scheduler.release_slot(&allocation));
        assert!(scheduler.calendar("MONO").unwrap().booked().is_empty());
    }
}
