//! 分配模型（排程結果）

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::TimeWindow;

/// 庫存預留
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reservation {
    /// 紙張類型
    pub paper_type: String,

    /// 預留數量
    pub quantity: u64,
}

impl Reservation {
    pub fn new(paper_type: String, quantity: u64) -> Self {
        Self {
            paper_type,
            quantity,
        }
    }
}

/// 分配：訂單綁定到機台與時段，並持有庫存預留
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// 分配ID
    pub id: Uuid,

    /// 訂單ID
    pub order_id: String,

    /// 機台ID
    pub machine_id: String,

    /// 印製時段
    pub slot: TimeWindow,

    /// 庫存預留（依紙張類型彙總）
    pub reservations: Vec<Reservation>,
}

impl Allocation {
    /// 創建新的分配
    pub fn new(
        order_id: String,
        machine_id: String,
        slot: TimeWindow,
        reservations: Vec<Reservation>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            machine_id,
            slot,
            reservations,
        }
    }

    /// 某紙張類型的預留數量
    pub fn reserved_quantity(&self, paper_type: &str) -> u64 {
        self.reservations
            .iter()
            .filter(|r| r.paper_type == paper_type)
            .map(|r| r.quantity)
            .sum()
    }

    /// 總預留張數
    pub fn total_sheets(&self) -> u64 {
        self.reservations.iter().map(|r| r.quantity).sum()
    }

    /// 機台佔用時間
    pub fn run_time(&self) -> Duration {
        self.slot.duration()
    }
}
