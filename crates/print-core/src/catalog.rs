//! 型錄：機台能力、價格規則與人員配置
//!
//! 型錄在程序啟動時載入一次，之後以 `Arc<Catalog>` 傳給排程器與計價器，
//! 排程執行期間不可變更。

use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::calendar::{MachineCalendar, ShiftHours, TimeWindow, WorkCalendar};
use crate::order::{FinishingOption, Order};
use crate::staff::{Employee, PayrollRules, StaffRole};
use crate::{PrintError, Result};

/// 印刷機台
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    /// 機台ID
    pub id: String,

    /// 支援的紙張類型
    pub supported_paper_types: BTreeSet<String>,

    /// 產能（每分鐘張數）
    pub pages_per_minute: u32,

    /// 是否可彩色印刷
    #[serde(default)]
    pub colour: bool,

    /// 單一工單最大進紙量
    #[serde(default)]
    pub max_job_sheets: Option<u64>,

    /// 可用時段
    #[serde(default)]
    pub availability: Vec<TimeWindow>,
}

impl Machine {
    /// 創建新的機台
    pub fn new(id: String, pages_per_minute: u32) -> Self {
        Self {
            id,
            supported_paper_types: BTreeSet::new(),
            pages_per_minute,
            colour: false,
            max_job_sheets: None,
            availability: Vec::new(),
        }
    }

    /// 建構器模式：設置支援的紙張類型
    pub fn with_paper_types<I, S>(mut self, paper_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_paper_types
            .extend(paper_types.into_iter().map(Into::into));
        self
    }

    /// 建構器模式：設置彩色能力
    pub fn with_colour(mut self, colour: bool) -> Self {
        self.colour = colour;
        self
    }

    /// 建構器模式：設置單一工單最大進紙量
    pub fn with_max_job_sheets(mut self, sheets: u64) -> Self {
        self.max_job_sheets = Some(sheets);
        self
    }

    /// 建構器模式：設置可用時段
    pub fn with_availability(mut self, windows: Vec<TimeWindow>) -> Self {
        self.availability = windows;
        self
    }

    /// 建構器模式：依工作日曆與班次展開可用時段
    pub fn with_work_calendar(
        mut self,
        calendar: &WorkCalendar,
        start: NaiveDate,
        days: u32,
        shift: ShiftHours,
    ) -> Self {
        self.availability.extend(calendar.open_windows(start, days, shift));
        self
    }

    /// 檢查是否支援紙張類型
    pub fn supports_paper(&self, paper_type: &str) -> bool {
        self.supported_paper_types.contains(paper_type)
    }

    /// 能力檢查：紙張類型、彩色、進紙量
    pub fn can_print(&self, order: &Order) -> bool {
        if order.requires_colour && !self.colour {
            return false;
        }
        if let Some(limit) = self.max_job_sheets {
            if order.total_sheets() > limit {
                return false;
            }
        }
        order
            .line_items
            .iter()
            .all(|item| self.supports_paper(&item.paper_type))
    }

    /// 印製指定張數所需時間（分鐘，向上取整）
    pub fn run_time(&self, sheets: u64) -> Duration {
        let ppm = u64::from(self.pages_per_minute.max(1));
        let minutes = i64::try_from(sheets.div_ceil(ppm)).unwrap_or(i64::MAX);
        Duration::minutes(minutes.min(i64::MAX / 60_000))
    }
}

/// 大量印製折扣（單行數量超過門檻時適用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDiscount {
    /// 數量門檻
    pub threshold: u64,
    /// 折扣百分比（0-100）
    pub percentage: Decimal,
}

/// 價格規則
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PricingRules {
    /// 紙張單價
    pub paper_prices: BTreeMap<String, Decimal>,

    /// 後加工每單位附加費
    #[serde(default)]
    pub finishing_surcharges: BTreeMap<FinishingOption, Decimal>,

    /// 急件時窗（小時）：交期距收單不超過此時數視為急件
    #[serde(default)]
    pub rush_window_hours: u32,

    /// 急件加價百分比（0-100）
    #[serde(default)]
    pub rush_surcharge_pct: Decimal,

    /// 大量折扣
    #[serde(default)]
    pub bulk_discount: Option<BulkDiscount>,
}

impl PricingRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// 建構器模式：設置紙張單價
    pub fn with_paper_price(mut self, paper_type: impl Into<String>, unit_price: Decimal) -> Self {
        self.paper_prices.insert(paper_type.into(), unit_price);
        self
    }

    /// 建構器模式：設置後加工附加費
    pub fn with_finishing_surcharge(mut self, option: FinishingOption, per_unit: Decimal) -> Self {
        self.finishing_surcharges.insert(option, per_unit);
        self
    }

    /// 建構器模式：設置急件規則
    pub fn with_rush(mut self, window_hours: u32, surcharge_pct: Decimal) -> Self {
        self.rush_window_hours = window_hours;
        self.rush_surcharge_pct = surcharge_pct;
        self
    }

    /// 建構器模式：設置大量折扣
    pub fn with_bulk_discount(mut self, threshold: u64, percentage: Decimal) -> Self {
        self.bulk_discount = Some(BulkDiscount {
            threshold,
            percentage,
        });
        self
    }

    /// 建構器模式：依紙張尺寸由小到大設置遞增單價
    ///
    /// 第一個尺寸為 `base_price`，其後每一級比前一級貴 `increment_pct`%。
    pub fn with_size_ladder<I, S>(mut self, sizes: I, base_price: Decimal, increment_pct: Decimal) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let step = Decimal::ONE + increment_pct / Decimal::ONE_HUNDRED;
        let mut price = base_price;
        for (i, size) in sizes.into_iter().enumerate() {
            if i > 0 {
                price *= step;
            }
            self.paper_prices.insert(size.into(), price);
        }
        self
    }

    /// 急件時窗
    pub fn rush_window(&self) -> Duration {
        Duration::hours(i64::from(self.rush_window_hours))
    }

    /// 查詢紙張單價
    pub fn unit_price(&self, paper_type: &str) -> Result<Decimal> {
        self.paper_prices
            .get(paper_type)
            .copied()
            .ok_or_else(|| PrintError::PriceRuleNotFound(paper_type.to_string()))
    }

    /// 查詢後加工附加費，未設定視為零
    pub fn finishing_surcharge(&self, option: FinishingOption) -> Decimal {
        self.finishing_surcharges
            .get(&option)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// 印刷廠型錄
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// 機台（依型錄順序嘗試排程）
    pub machines: Vec<Machine>,

    /// 價格規則
    pub pricing: PricingRules,

    /// 人員
    #[serde(default)]
    pub staff: Vec<Employee>,

    /// 薪資規則
    #[serde(default)]
    pub payroll: Option<PayrollRules>,
}

impl Catalog {
    /// 創建新的型錄
    pub fn new(pricing: PricingRules) -> Self {
        Self {
            machines: Vec::new(),
            pricing,
            staff: Vec::new(),
            payroll: None,
        }
    }

    /// 建構器模式：添加機台
    pub fn with_machine(mut self, machine: Machine) -> Self {
        self.machines.push(machine);
        self
    }

    /// 建構器模式：添加員工
    pub fn with_employee(mut self, employee: Employee) -> Self {
        self.staff.push(employee);
        self
    }

    /// 建構器模式：設置薪資規則
    pub fn with_payroll(mut self, payroll: PayrollRules) -> Self {
        self.payroll = Some(payroll);
        self
    }

    /// 依ID查詢機台
    pub fn machine(&self, machine_id: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.id == machine_id)
    }

    /// 是否配置了操作員；未配置時機台視為無人值守
    pub fn is_staffed(&self) -> bool {
        self.staff.iter().any(|e| e.role == StaffRole::Operator)
    }

    /// 機台可排程時段：開機時段與操作員值班時段的交集
    ///
    /// 有配置操作員時，沒有操作員的機台不會有任何可排程時段。
    pub fn crewed_windows(&self, machine: &Machine) -> Vec<TimeWindow> {
        if !self.is_staffed() {
            return machine.availability.clone();
        }
        let shifts: Vec<TimeWindow> = self
            .staff
            .iter()
            .filter(|e| e.operates(&machine.id))
            .flat_map(|e| e.shifts.iter().copied())
            .collect();
        machine
            .availability
            .iter()
            .flat_map(|open| shifts.iter().filter_map(move |shift| open.intersection(shift)))
            .collect()
    }

    /// 建立考慮操作員值班的機台排程日曆
    pub fn booking_calendar(&self, machine: &Machine) -> MachineCalendar {
        MachineCalendar::new(machine.id.clone(), &self.crewed_windows(machine))
    }

    /// 依營收計算人事成本，未設薪資規則時為零
    pub fn salary_expense(&self, revenue: Decimal) -> Decimal {
        self.payroll
            .as_ref()
            .map(|payroll| payroll.total_salaries(&self.staff, revenue))
            .unwrap_or(Decimal::ZERO)
    }

    /// 從 JSON 字串載入並驗證
    pub fn from_json_str(json: &str) -> Result<Self> {
        let catalog: Catalog = serde_json::from_str(json)?;
        catalog.validate()?;
        tracing::info!(
            "型錄載入完成：機台 {} 台，紙張價格 {} 筆",
            catalog.machines.len(),
            catalog.pricing.paper_prices.len()
        );
        Ok(catalog)
    }

    /// 從 JSON 檔案載入並驗證
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("讀取型錄檔案: {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// 驗證型錄配置
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for machine in &self.machines {
            if machine.id.trim().is_empty() {
                return Err(PrintError::InvalidCatalog("機台ID不可為空".to_string()));
            }
            if !seen.insert(machine.id.as_str()) {
                return Err(PrintError::InvalidCatalog(format!(
                    "機台ID重複: {}",
                    machine.id
                )));
            }
            if machine.pages_per_minute == 0 {
                return Err(PrintError::InvalidCatalog(format!(
                    "機台 {} 產能必須大於零",
                    machine.id
                )));
            }
            if machine.availability.iter().any(|w| w.is_empty()) {
                return Err(PrintError::InvalidCatalog(format!(
                    "機台 {} 含有無效時段",
                    machine.id
                )));
            }
        }

        self.validate_staff()?;

        let pricing = &self.pricing;
        if let Some((paper_type, _)) = pricing
            .paper_prices
            .iter()
            .find(|(_, price)| price.is_sign_negative())
        {
            return Err(PrintError::InvalidCatalog(format!(
                "紙張 {} 單價不可為負",
                paper_type
            )));
        }
        if pricing
            .finishing_surcharges
            .values()
            .any(|price| price.is_sign_negative())
        {
            return Err(PrintError::InvalidCatalog("後加工附加費不可為負".to_string()));
        }
        if !is_percentage(pricing.rush_surcharge_pct) {
            return Err(PrintError::InvalidCatalog(format!(
                "急件加價百分比超出範圍: {}",
                pricing.rush_surcharge_pct
            )));
        }
        if let Some(discount) = pricing.bulk_discount {
            if !is_percentage(discount.percentage) {
                return Err(PrintError::InvalidCatalog(format!(
                    "折扣百分比超出範圍: {}",
                    discount.percentage
                )));
            }
        }

        Ok(())
    }

    fn validate_staff(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for employee in &self.staff {
            if employee.id.trim().is_empty() {
                return Err(PrintError::InvalidCatalog("員工ID不可為空".to_string()));
            }
            if !seen.insert(employee.id.as_str()) {
                return Err(PrintError::InvalidCatalog(format!(
                    "員工ID重複: {}",
                    employee.id
                )));
            }
            if employee.role == StaffRole::Operator {
                let assigned = employee
                    .machine_id
                    .as_deref()
                    .is_some_and(|id| self.machine(id).is_some());
                if !assigned {
                    return Err(PrintError::InvalidCatalog(format!(
                        "操作員 {} 未指派到型錄中的機台",
                        employee.id
                    )));
                }
            }
            if employee.shifts.iter().any(|w| w.is_empty()) {
                return Err(PrintError::InvalidCatalog(format!(
                    "員工 {} 含有無效值班時段",
                    employee.id
                )));
            }
        }

        if let Some(payroll) = &self.payroll {
            if payroll.base_salary <= Decimal::ZERO {
                return Err(PrintError::InvalidCatalog("基本薪資必須大於零".to_string()));
            }
            if !is_percentage(payroll.increment_pct) {
                return Err(PrintError::InvalidCatalog(format!(
                    "加薪百分比超出範圍: {}",
                    payroll.increment_pct
                )));
            }
            if payroll.revenue_target.is_some_and(|t| t <= Decimal::ZERO) {
                return Err(PrintError::InvalidCatalog("營收目標必須大於零".to_string()));
            }
        }
        Ok(())
    }
}

fn is_percentage(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE_HUNDRED
}
