//! # PrintHouse Scheduling Engine
//!
//! 排程、計價與發票帳本

pub mod engine;
pub mod ledger;
pub mod pricing;
pub mod queue;
pub mod scheduler;

// Re-export 主要類型
pub use engine::{PrintHouse, ProcessReport};
pub use ledger::{InvoiceSink, InvoiceStatus, JsonLinesSink, Ledger, LedgerSummary};
pub use pricing::Pricing;
pub use queue::{OrderQueue, QueueEntry};
pub use scheduler::Scheduler;

use print_core::{Allocation, RejectionReason};

/// 排程結果
#[derive(Debug, Clone, Default)]
pub struct ScheduleResult {
    /// 本次成功排程的分配
    pub scheduled: Vec<Allocation>,

    /// 本次拒絕的訂單與原因
    pub rejected: Vec<(String, RejectionReason)>,

    /// 嘗試順序（含重試）
    pub attempts: Vec<String>,

    /// 警告信息
    pub warnings: Vec<ScheduleWarning>,

    /// 計算耗時（毫秒）
    pub calculation_time_ms: Option<u128>,
}

impl ScheduleResult {
    /// 創建空的排程結果
    pub fn empty() -> Self {
        Self::default()
    }

    /// 添加警告
    pub fn add_warning(&mut self, warning: ScheduleWarning) {
        self.warnings.push(warning);
    }

    /// 查詢訂單的拒絕原因
    pub fn rejection_of(&self, order_id: &str) -> Option<&RejectionReason> {
        self.rejected
            .iter()
            .find(|(id, _)| id == order_id)
            .map(|(_, reason)| reason)
    }
}

/// 排程警告
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleWarning {
    /// 相關對象（紙張類型或訂單ID）
    pub subject: String,
    pub message: String,
    pub severity: WarningSeverity,
}

impl ScheduleWarning {
    pub fn new(subject: String, message: String, severity: WarningSeverity) -> Self {
        Self {
            subject,
            message,
            severity,
        }
    }

    pub fn info(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Info)
    }

    pub fn warning(subject: String, message: String) -> Self {
        Self::new(subject, message, WarningSeverity::Warning)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Info,
    Warning,
}
