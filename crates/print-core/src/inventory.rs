//! 紙張庫存模型

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, RwLock};

use crate::allocation::Reservation;
use crate::{PrintError, Result};

/// 紙張庫存
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperStock {
    /// 紙張類型
    pub paper_type: String,

    /// 現有庫存（張）
    pub on_hand: u64,

    /// 再訂購點
    pub reorder_threshold: u64,
}

impl PaperStock {
    /// 創建新的庫存記錄
    pub fn new(paper_type: String, on_hand: u64, reorder_threshold: u64) -> Self {
        Self {
            paper_type,
            on_hand,
            reorder_threshold,
        }
    }

    /// 檢查庫存是否已達再訂購點
    pub fn needs_reorder(&self) -> bool {
        self.on_hand <= self.reorder_threshold
    }

    /// 扣減庫存，不足時不做任何修改
    pub fn debit(&mut self, quantity: u64) -> Result<()> {
        if quantity > self.on_hand {
            return Err(PrintError::InsufficientStock {
                paper_type: self.paper_type.clone(),
                requested: quantity,
                available: self.on_hand,
            });
        }
        self.on_hand -= quantity;
        Ok(())
    }

    /// 回補庫存
    pub fn credit(&mut self, quantity: u64) {
        self.on_hand = self.on_hand.saturating_add(quantity);
    }
}

/// 紙張庫存帳
///
/// 每種紙張各有一把鎖，同一紙張的預留與釋放互斥；
/// 多紙張的預留依紙張類型排序加鎖，全部成功或全部不變。
#[derive(Debug, Default)]
pub struct Inventory {
    stocks: RwLock<BTreeMap<String, Mutex<PaperStock>>>,
}

impl Inventory {
    /// 創建空的庫存帳
    pub fn new() -> Self {
        Self::default()
    }

    /// 由庫存記錄建立
    pub fn from_stocks(stocks: impl IntoIterator<Item = PaperStock>) -> Self {
        let map = stocks
            .into_iter()
            .map(|stock| (stock.paper_type.clone(), Mutex::new(stock)))
            .collect();
        Self {
            stocks: RwLock::new(map),
        }
    }

    /// 建構器模式：添加庫存記錄
    pub fn with_stock(self, stock: PaperStock) -> Self {
        match self.stocks.write() {
            Ok(mut stocks) => {
                stocks.insert(stock.paper_type.clone(), Mutex::new(stock));
            }
            Err(poisoned) => {
                poisoned
                    .into_inner()
                    .insert(stock.paper_type.clone(), Mutex::new(stock));
            }
        }
        self
    }

    /// 預留單一紙張
    pub fn reserve(&self, paper_type: &str, quantity: u64) -> Result<()> {
        let stocks = self.read_stocks()?;
        let entry = stocks
            .get(paper_type)
            .ok_or_else(|| PrintError::UnknownPaperType(paper_type.to_string()))?;
        let mut stock = lock_entry(paper_type, entry)?;
        stock.debit(quantity)?;
        tracing::debug!("預留紙張 {} x {}，剩餘 {}", paper_type, quantity, stock.on_hand);
        Ok(())
    }

    /// 釋放單一紙張
    pub fn release(&self, paper_type: &str, quantity: u64) -> Result<()> {
        let stocks = self.read_stocks()?;
        let entry = stocks
            .get(paper_type)
            .ok_or_else(|| PrintError::UnknownPaperType(paper_type.to_string()))?;
        let mut stock = lock_entry(paper_type, entry)?;
        stock.credit(quantity);
        tracing::debug!("釋放紙張 {} x {}，現有 {}", paper_type, quantity, stock.on_hand);
        Ok(())
    }

    /// 一次預留多種紙張（全部成功或全部不變）
    pub fn reserve_all(&self, reservations: &[Reservation]) -> Result<()> {
        let totals = aggregate(reservations);
        let stocks = self.read_stocks()?;
        let mut guards = lock_all(&stocks, &totals)?;

        for (guard, (_, quantity)) in guards.iter().zip(&totals) {
            if *quantity > guard.on_hand {
                return Err(PrintError::InsufficientStock {
                    paper_type: guard.paper_type.clone(),
                    requested: *quantity,
                    available: guard.on_hand,
                });
            }
        }

        for (guard, (_, quantity)) in guards.iter_mut().zip(&totals) {
            guard.debit(*quantity)?;
        }
        tracing::debug!("預留紙張 {} 種", totals.len());
        Ok(())
    }

    /// 一次釋放多種紙張
    pub fn release_all(&self, reservations: &[Reservation]) -> Result<()> {
        let totals = aggregate(reservations);
        let stocks = self.read_stocks()?;
        let mut guards = lock_all(&stocks, &totals)?;

        for (guard, (_, quantity)) in guards.iter_mut().zip(&totals) {
            guard.credit(*quantity);
        }
        tracing::debug!("釋放紙張 {} 種", totals.len());
        Ok(())
    }

    /// 進貨補充，新紙張類型會建立新記錄
    pub fn restock(&self, paper_type: &str, quantity: u64) -> Result<()> {
        {
            let stocks = self.read_stocks()?;
            if let Some(entry) = stocks.get(paper_type) {
                lock_entry(paper_type, entry)?.credit(quantity);
                tracing::info!("紙張 {} 進貨 {}", paper_type, quantity);
                return Ok(());
            }
        }

        let mut stocks = self
            .stocks
            .write()
            .map_err(|_| PrintError::LockPoisoned("inventory".to_string()))?;
        let entry = stocks
            .entry(paper_type.to_string())
            .or_insert_with(|| Mutex::new(PaperStock::new(paper_type.to_string(), 0, 0)));
        lock_entry(paper_type, entry)?.credit(quantity);
        tracing::info!("新增紙張 {} 並進貨 {}", paper_type, quantity);
        Ok(())
    }

    /// 查詢可用數量
    pub fn available(&self, paper_type: &str) -> Result<u64> {
        let stocks = self.read_stocks()?;
        let entry = stocks
            .get(paper_type)
            .ok_or_else(|| PrintError::UnknownPaperType(paper_type.to_string()))?;
        let on_hand = lock_entry(paper_type, entry)?.on_hand;
        Ok(on_hand)
    }

    /// 是否有此紙張類型的庫存記錄
    pub fn contains(&self, paper_type: &str) -> bool {
        self.read_stocks()
            .map(|stocks| stocks.contains_key(paper_type))
            .unwrap_or(false)
    }

    /// 庫存快照（唯讀）
    pub fn levels(&self) -> Result<BTreeMap<String, PaperStock>> {
        let stocks = self.read_stocks()?;
        let mut snapshot = BTreeMap::new();
        for (paper_type, entry) in stocks.iter() {
            snapshot.insert(paper_type.clone(), lock_entry(paper_type, entry)?.clone());
        }
        Ok(snapshot)
    }

    /// 已達再訂購點的紙張
    pub fn below_reorder(&self) -> Result<Vec<PaperStock>> {
        Ok(self
            .levels()?
            .into_values()
            .filter(PaperStock::needs_reorder)
            .collect())
    }

    fn read_stocks(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<String, Mutex<PaperStock>>>> {
        self.stocks
            .read()
            .map_err(|_| PrintError::LockPoisoned("inventory".to_string()))
    }
}

fn lock_entry<'a>(
    paper_type: &str,
    entry: &'a Mutex<PaperStock>,
) -> Result<MutexGuard<'a, PaperStock>> {
    entry
        .lock()
        .map_err(|_| PrintError::LockPoisoned(paper_type.to_string()))
}

/// 依紙張類型彙總（排序即加鎖順序）
fn aggregate(reservations: &[Reservation]) -> BTreeMap<&str, u64> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for reservation in reservations {
        let entry = totals.entry(reservation.paper_type.as_str()).or_insert(0);
        *entry = entry.saturating_add(reservation.quantity);
    }
    totals
}

fn lock_all<'a>(
    stocks: &'a BTreeMap<String, Mutex<PaperStock>>,
    totals: &BTreeMap<&str, u64>,
) -> Result<Vec<MutexGuard<'a, PaperStock>>> {
    totals
        .keys()
        .map(|paper_type| {
            let entry = stocks
                .get(*paper_type)
                .ok_or_else(|| PrintError::UnknownPaperType(paper_type.to_string()))?;
            lock_entry(paper_type, entry)
        })
        .collect()
}
