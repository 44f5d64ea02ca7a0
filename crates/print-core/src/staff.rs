//! 人員與薪資
//!
//! 操作員指派到單一機台，其值班時段決定機台可排程的時間；
//! 薪資規則用於帳本摘要的人事成本與毛利。

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::calendar::{ShiftHours, TimeWindow, WorkCalendar};

/// 職務
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StaffRole {
    /// 印刷機操作員
    Operator,
    /// 經理
    Manager,
}

/// 員工
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// 員工ID
    pub id: String,

    pub role: StaffRole,

    /// 負責的機台（僅操作員）
    #[serde(default)]
    pub machine_id: Option<String>,

    /// 值班時段
    #[serde(default)]
    pub shifts: Vec<TimeWindow>,
}

impl Employee {
    /// 創建操作員並指派機台
    pub fn operator(id: String, machine_id: String) -> Self {
        Self {
            id,
            role: StaffRole::Operator,
            machine_id: Some(machine_id),
            shifts: Vec::new(),
        }
    }

    /// 創建經理
    pub fn manager(id: String) -> Self {
        Self {
            id,
            role: StaffRole::Manager,
            machine_id: None,
            shifts: Vec::new(),
        }
    }

    /// 建構器模式：設置值班時段
    pub fn with_shifts(mut self, shifts: Vec<TimeWindow>) -> Self {
        self.shifts = shifts;
        self
    }

    /// 建構器模式：依工作日曆與班次展開值班時段
    pub fn with_work_calendar(
        mut self,
        calendar: &WorkCalendar,
        start: NaiveDate,
        days: u32,
        shift: ShiftHours,
    ) -> Self {
        self.shifts.extend(calendar.open_windows(start, days, shift));
        self
    }

    /// 是否為此機台的操作員
    pub fn operates(&self, machine_id: &str) -> bool {
        self.role == StaffRole::Operator && self.machine_id.as_deref() == Some(machine_id)
    }
}

/// 薪資規則
///
/// 每人領基本薪資；營收達標時，符合資格的職務加薪 `increment_pct`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollRules {
    /// 基本薪資
    pub base_salary: Decimal,

    /// 加薪百分比（0-100）
    #[serde(default)]
    pub increment_pct: Decimal,

    /// 營收目標
    #[serde(default)]
    pub revenue_target: Option<Decimal>,

    /// 可加薪的職務
    #[serde(default)]
    pub increment_roles: BTreeSet<StaffRole>,
}

impl PayrollRules {
    pub fn new(base_salary: Decimal) -> Self {
        Self {
            base_salary,
            ..Self::default()
        }
    }

    /// 建構器模式：設置達標加薪
    pub fn with_increment<I>(mut self, increment_pct: Decimal, revenue_target: Decimal, roles: I) -> Self
    where
        I: IntoIterator<Item = StaffRole>,
    {
        self.increment_pct = increment_pct;
        self.revenue_target = Some(revenue_target);
        self.increment_roles = roles.into_iter().collect();
        self
    }

    /// 營收是否達標
    pub fn target_met(&self, revenue: Decimal) -> bool {
        self.revenue_target.is_some_and(|target| revenue >= target)
    }

    /// 單一員工的薪資
    pub fn salary_of(&self, employee: &Employee, revenue: Decimal) -> Decimal {
        if self.target_met(revenue) && self.increment_roles.contains(&employee.role) {
            let raised = self.base_salary * (Decimal::ONE + self.increment_pct / Decimal::ONE_HUNDRED);
            raised.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        } else {
            self.base_salary
        }
    }

    /// 全體薪資總額
    pub fn total_salaries(&self, staff: &[Employee], revenue: Decimal) -> Decimal {
        staff
            .iter()
            .map(|employee| self.salary_of(employee, revenue))
            .sum()
    }
}
