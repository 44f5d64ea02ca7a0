//! # PrintHouse
//!
//! 印刷廠接單與資源分配引擎：收單、排程、計價、開票。
//!
//! ```no_run
//! use printhouse::{logging, Catalog, Inventory, PrintHouse};
//! use std::sync::Arc;
//!
//! logging::init();
//! let catalog = Catalog::from_json_file("catalog.json").unwrap();
//! let house = PrintHouse::new(Arc::new(catalog), Arc::new(Inventory::new()));
//! # let _ = house;
//! ```

pub mod logging;

pub use print_core;
pub use print_sched;

// Re-export 主要類型
pub use print_core::{
    Allocation, Catalog, CostBreakdown, Employee, FinishingOption, Inventory, Invoice, LineItem,
    Machine, Order, OrderRecord, OrderStatus, PaperStock, PayrollRules, PricingRules, PrintError,
    RejectionReason, Reservation, Result, ShiftHours, StaffRole, TimeWindow, WorkCalendar,
};
pub use print_sched::{
    InvoiceSink, InvoiceStatus, JsonLinesSink, LedgerSummary, Pricing, PrintHouse, ProcessReport,
    ScheduleResult, ScheduleWarning, Scheduler,
};
