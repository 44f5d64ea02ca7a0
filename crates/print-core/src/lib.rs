//! # PrintHouse Core
//!
//! 印刷廠核心資料模型與類型定義

pub mod allocation;
pub mod calendar;
pub mod catalog;
pub mod inventory;
pub mod invoice;
pub mod order;
pub mod staff;

// Re-export 主要類型
pub use allocation::{Allocation, Reservation};
pub use calendar::{MachineCalendar, ShiftHours, TimeWindow, WorkCalendar};
pub use catalog::{BulkDiscount, Catalog, Machine, PricingRules};
pub use inventory::{Inventory, PaperStock};
pub use invoice::{CostBreakdown, Invoice, InvoiceLine};
pub use order::{FinishingOption, LineItem, Order, OrderRecord, OrderStatus, RejectionReason};
pub use staff::{Employee, PayrollRules, StaffRole};

/// 印刷廠錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum PrintError {
    #[error("紙張庫存不足: {paper_type}（需要 {requested}, 可用 {available}）")]
    InsufficientStock {
        paper_type: String,
        requested: u64,
        available: u64,
    },

    #[error("訂單 {0} 無法在交期前排入任何機台")]
    DeadlineUnreachable(String),

    #[error("訂單重複: {0}")]
    DuplicateOrder(String),

    #[error("訂單 {order_id} 狀態 {from:?} 不允許執行 {action}")]
    InvalidStateTransition {
        order_id: String,
        from: OrderStatus,
        action: &'static str,
    },

    #[error("未知的紙張類型: {0}")]
    UnknownPaperType(String),

    #[error("找不到訂單: {0}")]
    OrderNotFound(String),

    #[error("找不到紙張價格規則: {0}")]
    PriceRuleNotFound(String),

    #[error("無效的型錄配置: {0}")]
    InvalidCatalog(String),

    #[error("JSON 錯誤: {0}")]
    Json(#[from] serde_json::Error),

    #[error("讀寫錯誤: {0}")]
    Io(#[from] std::io::Error),

    #[error("鎖已中毒: {0}")]
    LockPoisoned(String),
}

pub type Result<T> = std::result::Result<T, PrintError>;
