//! 排程佇列
//!
//! 出列順序：優先級（1 最先）、交期（早到晚）、收單序號（小到大）。

use chrono::NaiveDateTime;
use print_core::{Order, OrderRecord};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// 佇列項目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub order_id: String,
    pub priority: u8,
    pub deadline: NaiveDateTime,
    /// 收單序號，重新排隊時保留
    pub sequence: u64,
}

impl QueueEntry {
    pub fn from_record(record: &OrderRecord) -> Self {
        Self {
            order_id: record.order.id.clone(),
            priority: record.order.priority,
            deadline: record.order.deadline,
            sequence: record.sequence,
        }
    }

    /// 降一級優先級（數字加一，最低到 `Order::LOWEST_PRIORITY`）
    pub fn demoted(mut self) -> Self {
        self.priority = self
            .priority
            .saturating_add(1)
            .min(Order::LOWEST_PRIORITY);
        self
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap 為最大堆：越「大」越先出列
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.deadline.cmp(&self.deadline))
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.order_id.cmp(&self.order_id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// 訂單優先佇列
#[derive(Debug, Clone, Default)]
pub struct OrderQueue {
    heap: BinaryHeap<QueueEntry>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(entry);
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.heap.pop()
    }

    /// 以降低一級的優先級重新排隊
    pub fn requeue(&mut self, entry: QueueEntry) {
        let entry = entry.demoted();
        tracing::debug!(
            "訂單 {} 重新排隊，優先級降為 {}",
            entry.order_id,
            entry.priority
        );
        self.heap.push(entry);
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
