//! 訂單模型與狀態機

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::allocation::{Allocation, Reservation};
use crate::{PrintError, Result};

/// 後加工選項
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FinishingOption {
    /// 裝訂
    Binding,
    /// 上膜
    Lamination,
    /// 裁切
    Cutting,
    /// 摺頁
    Folding,
    /// 騎馬釘
    Stapling,
}

/// 訂單明細
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// 紙張類型
    pub paper_type: String,

    /// 數量（張）
    pub quantity: u64,

    /// 後加工選項
    #[serde(default)]
    pub finishing: Vec<FinishingOption>,
}

impl LineItem {
    /// 創建新的訂單明細
    pub fn new(paper_type: String, quantity: u64) -> Self {
        Self {
            paper_type,
            quantity,
            finishing: Vec::new(),
        }
    }

    /// 建構器模式：添加後加工
    pub fn with_finishing(mut self, option: FinishingOption) -> Self {
        if !self.finishing.contains(&option) {
            self.finishing.push(option);
        }
        self
    }
}

/// 印刷訂單（收單後不可變更）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// 訂單ID（冪等收單的鍵值）
    pub id: String,

    /// 客戶
    pub client_ref: String,

    /// 訂單明細（依序）
    pub line_items: Vec<LineItem>,

    /// 交期
    pub deadline: NaiveDateTime,

    /// 優先級（1-10，1 最緊急）
    pub priority: u8,

    /// 收單時間
    pub received_at: NaiveDateTime,

    /// 是否需要彩色印刷
    pub requires_colour: bool,
}

impl Order {
    /// 最緊急的優先級
    pub const HIGHEST_PRIORITY: u8 = 1;

    /// 最不緊急的優先級
    pub const LOWEST_PRIORITY: u8 = 10;

    /// 創建新的訂單
    pub fn new(
        id: String,
        client_ref: String,
        line_items: Vec<LineItem>,
        deadline: NaiveDateTime,
    ) -> Self {
        Self {
            id,
            client_ref,
            line_items,
            deadline,
            priority: 5,
            received_at: Utc::now().naive_utc(),
            requires_colour: false,
        }
    }

    /// 建構器模式：設置優先級
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(Self::HIGHEST_PRIORITY, Self::LOWEST_PRIORITY);
        self
    }

    /// 建構器模式：設置收單時間
    pub fn with_received_at(mut self, received_at: NaiveDateTime) -> Self {
        self.received_at = received_at;
        self
    }

    /// 建構器模式：設置彩色需求
    pub fn with_colour(mut self, requires_colour: bool) -> Self {
        self.requires_colour = requires_colour;
        self
    }

    /// 總張數
    pub fn total_sheets(&self) -> u64 {
        self.line_items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(item.quantity))
    }

    /// 依紙張類型彙總的庫存預留需求（依紙張類型排序）
    pub fn reservations(&self) -> Vec<Reservation> {
        let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
        for item in &self.line_items {
            let entry = totals.entry(item.paper_type.as_str()).or_insert(0);
            *entry = entry.saturating_add(item.quantity);
        }
        totals
            .into_iter()
            .map(|(paper_type, quantity)| Reservation::new(paper_type.to_string(), quantity))
            .collect()
    }
}

/// 訂單狀態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// 已收單
    Intake,
    /// 已排程
    Scheduled,
    /// 已完成
    Fulfilled,
    /// 已拒絕
    Rejected,
    /// 已取消
    Cancelled,
}

impl OrderStatus {
    /// 是否為終止狀態
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Fulfilled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// 狀態轉換是否合法
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (*self, next),
            (Intake, Scheduled)
                | (Intake, Rejected)
                | (Scheduled, Fulfilled)
                | (Scheduled, Cancelled)
        )
    }
}

/// 拒單原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// 交期前無可用時段
    DeadlineUnreachable,
    /// 重試後仍庫存不足
    InsufficientStock {
        paper_type: String,
        requested: u64,
        available: u64,
    },
    /// 型錄中沒有任何機台具備所需能力
    NoCapableMachine,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::DeadlineUnreachable => write!(f, "交期前無可用時段"),
            RejectionReason::InsufficientStock {
                paper_type,
                requested,
                available,
            } => write!(
                f,
                "紙張 {} 庫存不足：需要 {}, 可用 {}",
                paper_type, requested, available
            ),
            RejectionReason::NoCapableMachine => write!(f, "沒有具備所需能力的機台"),
        }
    }
}

/// 訂單紀錄：訂單本身加上生命週期狀態
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order: Order,

    pub status: OrderStatus,

    /// 收單序號（同優先級、同交期時的排序依據）
    pub sequence: u64,

    /// 已重試次數
    pub retries: u8,

    pub rejection: Option<RejectionReason>,

    /// 目前有效的分配
    pub allocation: Option<Allocation>,
}

impl OrderRecord {
    /// 庫存不足時最多重試次數
    pub const MAX_RETRIES: u8 = 1;

    pub fn new(order: Order, sequence: u64) -> Self {
        Self {
            order,
            status: OrderStatus::Intake,
            sequence,
            retries: 0,
            rejection: None,
            allocation: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.order.id
    }

    /// 是否還能重試
    pub fn can_retry(&self) -> bool {
        self.retries < Self::MAX_RETRIES
    }

    /// 記錄一次重試
    pub fn record_retry(&mut self) {
        self.retries = self.retries.saturating_add(1);
    }

    /// 排程成功
    pub fn mark_scheduled(&mut self, allocation: Allocation) -> Result<()> {
        self.transition(OrderStatus::Scheduled, "schedule")?;
        self.allocation = Some(allocation);
        Ok(())
    }

    /// 拒單
    pub fn mark_rejected(&mut self, reason: RejectionReason) -> Result<()> {
        self.transition(OrderStatus::Rejected, "reject")?;
        self.rejection = Some(reason);
        Ok(())
    }

    /// 完成
    pub fn mark_fulfilled(&mut self) -> Result<()> {
        self.transition(OrderStatus::Fulfilled, "fulfil")
    }

    /// 取消已排程訂單，回傳失效的分配
    pub fn mark_cancelled(&mut self) -> Result<Option<Allocation>> {
        self.expect_status(OrderStatus::Scheduled, "cancel")?;
        self.transition(OrderStatus::Cancelled, "cancel")?;
        Ok(self.allocation.take())
    }

    /// 檢查目前狀態
    pub fn expect_status(&self, expected: OrderStatus, action: &'static str) -> Result<()> {
        if self.status != expected {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn transition(&mut self, next: OrderStatus, action: &'static str) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(self.invalid(action));
        }
        tracing::debug!("訂單 {} 狀態 {:?} → {:?}", self.order.id, self.status, next);
        self.status = next;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> PrintError {
        PrintError::InvalidStateTransition {
            order_id: self.order.id.clone(),
            from: self.status,
            action,
        }
    }
}
