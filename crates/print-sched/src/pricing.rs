//! 計價
//!
//! 純函數：相同的（訂單、分配、價格規則）永遠得到相同的費用。

use print_core::{Allocation, Catalog, CostBreakdown, Order, PricingRules, Result};
use rayon::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

/// 計價器
#[derive(Debug, Clone)]
pub struct Pricing {
    catalog: Arc<Catalog>,
}

impl Pricing {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    /// 計算單筆訂單費用
    pub fn quote(&self, order: &Order, allocation: &Allocation) -> Result<CostBreakdown> {
        quote(&self.catalog.pricing, order, allocation)
    }

    /// 並行計算多筆訂單費用（結果順序與輸入一致）
    pub fn quote_batch(&self, jobs: &[(&Order, &Allocation)]) -> Vec<Result<CostBreakdown>> {
        tracing::debug!("批次計價 {} 筆", jobs.len());
        jobs.par_iter()
            .map(|(order, allocation)| self.quote(order, allocation))
            .collect()
    }
}

/// 計算費用
///
/// - 基本費用：各紙張單價 × 預留數量
/// - 後加工：各明細的後加工附加費 × 數量
/// - 急件：交期距收單不超過急件時窗時，基本費用 × 急件百分比
/// - 大量折扣：單行數量超過門檻時，該行紙張費用 × 折扣百分比
///
/// 各項皆四捨五入至小數兩位後再加總。
pub fn quote(rules: &PricingRules, order: &Order, allocation: &Allocation) -> Result<CostBreakdown> {
    let mut base = Decimal::ZERO;
    for reservation in &allocation.reservations {
        base += rules.unit_price(&reservation.paper_type)? * Decimal::from(reservation.quantity);
    }

    let mut finishing = Decimal::ZERO;
    let mut discount = Decimal::ZERO;
    for item in &order.line_items {
        let quantity = Decimal::from(item.quantity);
        let per_unit: Decimal = item
            .finishing
            .iter()
            .map(|option| rules.finishing_surcharge(*option))
            .sum();
        finishing += per_unit * quantity;

        if let Some(bulk) = rules.bulk_discount {
            if item.quantity > bulk.threshold {
                discount += rules.unit_price(&item.paper_type)? * quantity * bulk.percentage
                    / Decimal::ONE_HUNDRED;
            }
        }
    }

    let rush_surcharge = if order.deadline - order.received_at <= rules.rush_window() {
        base * rules.rush_surcharge_pct / Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    let base = round_money(base);
    let finishing = round_money(finishing);
    let rush_surcharge = round_money(rush_surcharge);
    let discount = round_money(discount);

    Ok(CostBreakdown {
        base,
        finishing,
        rush_surcharge,
        discount,
        total: base + finishing + rush_surcharge - discount,
    })
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
