//! 發票模型

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::allocation::Allocation;
use crate::calendar::TimeWindow;
use crate::order::{FinishingOption, Order};

/// 費用明細
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CostBreakdown {
    /// 紙張基本費用
    pub base: Decimal,
    /// 後加工附加費
    pub finishing: Decimal,
    /// 急件加價
    pub rush_surcharge: Decimal,
    /// 大量折扣
    pub discount: Decimal,
    /// 總計
    pub total: Decimal,
}

impl CostBreakdown {
    pub fn is_rush(&self) -> bool {
        self.rush_surcharge > Decimal::ZERO
    }
}

/// 發票明細行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub paper_type: String,
    pub quantity: u64,
    pub finishing: Vec<FinishingOption>,
}

/// 發票（開立後不可變更）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// 發票ID
    pub id: Uuid,

    /// 訂單ID
    pub order_id: String,

    /// 客戶
    pub client_ref: String,

    /// 印製機台
    pub machine_id: String,

    /// 印製時段
    pub slot: TimeWindow,

    /// 明細
    pub lines: Vec<InvoiceLine>,

    /// 費用
    pub cost: CostBreakdown,

    /// 開立時間
    pub issued_at: NaiveDateTime,
}

impl Invoice {
    /// 由訂單、分配與費用開立發票
    pub fn issue(
        order: &Order,
        allocation: &Allocation,
        cost: CostBreakdown,
        issued_at: NaiveDateTime,
    ) -> Self {
        let lines = order
            .line_items
            .iter()
            .map(|item| InvoiceLine {
                paper_type: item.paper_type.clone(),
                quantity: item.quantity,
                finishing: item.finishing.clone(),
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            order_id: order.id.clone(),
            client_ref: order.client_ref.clone(),
            machine_id: allocation.machine_id.clone(),
            slot: allocation.slot,
            lines,
            cost,
            issued_at,
        }
    }

    pub fn total(&self) -> Decimal {
        self.cost.total
    }
}
