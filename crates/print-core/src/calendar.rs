//! 工作日曆與機台排程日曆

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// 工作日曆
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCalendar {
    /// 工作日（週一到週日，true表示工作日）
    /// 索引 0 = 週一, 1 = 週二, ..., 6 = 週日
    pub working_days: [bool; 7],

    /// 節假日列表
    pub holidays: Vec<NaiveDate>,

    /// 日曆ID
    pub calendar_id: String,
}

impl WorkCalendar {
    /// 創建新的工作日曆（預設週一到週五為工作日）
    pub fn new(calendar_id: String) -> Self {
        Self {
            working_days: [true, true, true, true, true, false, false], // 週一到週五
            calendar_id,
            holidays: Vec::new(),
        }
    }

    /// 創建 24/7 日曆（所有日子都是工作日）
    pub fn new_24_7(calendar_id: String) -> Self {
        Self {
            working_days: [true; 7],
            calendar_id,
            holidays: Vec::new(),
        }
    }

    /// 建構器模式：設置工作日
    pub fn with_working_days(mut self, working_days: [bool; 7]) -> Self {
        self.working_days = working_days;
        self
    }

    /// 建構器模式：設置節假日
    pub fn with_holidays(mut self, holidays: Vec<NaiveDate>) -> Self {
        self.holidays = holidays;
        self
    }

    /// 添加節假日
    pub fn add_holiday(&mut self, date: NaiveDate) {
        if !self.holidays.contains(&date) {
            self.holidays.push(date);
            self.holidays.sort();
        }
    }

    /// 檢查是否為工作日
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        if self.holidays.contains(&date) {
            return false;
        }

        let weekday_index = date.weekday().num_days_from_monday() as usize;
        self.working_days[weekday_index]
    }

    /// 展開 `start` 起 `days` 天內的可用班次時段
    ///
    /// 夜班（結束時間不晚於開始時間）會延伸到隔天。
    pub fn open_windows(&self, start: NaiveDate, days: u32, shift: ShiftHours) -> Vec<TimeWindow> {
        start
            .iter_days()
            .take(days as usize)
            .filter(|date| self.is_working_day(*date))
            .map(|date| shift.window_on(date))
            .collect()
    }
}

impl Default for WorkCalendar {
    fn default() -> Self {
        Self::new("DEFAULT".to_string())
    }
}

/// 每日班次時間
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ShiftHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// 全天班（00:00 到隔天 00:00）
    pub fn full_day() -> Self {
        Self::new(NaiveTime::MIN, NaiveTime::MIN)
    }

    fn window_on(&self, date: NaiveDate) -> TimeWindow {
        let start = date.and_time(self.start);
        let mut end = date.and_time(self.end);
        if end <= start {
            end += Duration::days(1);
        }
        TimeWindow::new(start, end)
    }
}

/// 半開時段 `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// 時段長度
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// 是否與另一時段重疊
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// 是否完整包含另一時段
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// 兩時段的交集
    pub fn intersection(&self, other: &TimeWindow) -> Option<TimeWindow> {
        let window = TimeWindow::new(self.start.max(other.start), self.end.min(other.end));
        (!window.is_empty()).then_some(window)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// 機台排程日曆：開放時段 + 已預訂時段
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineCalendar {
    /// 機台ID
    pub machine_id: String,

    /// 開放時段（已排序、已合併）
    open: Vec<TimeWindow>,

    /// 已預訂時段（按開始時間排序）
    booked: Vec<TimeWindow>,
}

impl MachineCalendar {
    /// 創建機台日曆，相鄰或重疊的開放時段會被合併
    pub fn new(machine_id: String, windows: &[TimeWindow]) -> Self {
        let mut sorted: Vec<TimeWindow> = windows.iter().copied().filter(|w| !w.is_empty()).collect();
        sorted.sort();

        let mut open: Vec<TimeWindow> = Vec::with_capacity(sorted.len());
        for window in sorted {
            match open.last_mut() {
                Some(last) if window.start <= last.end => {
                    last.end = last.end.max(window.end);
                }
                _ => open.push(window),
            }
        }

        Self {
            machine_id,
            open,
            booked: Vec::new(),
        }
    }

    pub fn open_windows(&self) -> &[TimeWindow] {
        &self.open
    }

    pub fn booked(&self) -> &[TimeWindow] {
        &self.booked
    }

    /// 尋找最早的連續空檔
    ///
    /// 空檔開始不早於 `earliest`，結束不晚於 `deadline`，且完整落在單一開放時段內。
    pub fn find_slot(
        &self,
        duration: Duration,
        earliest: NaiveDateTime,
        deadline: NaiveDateTime,
    ) -> Option<TimeWindow> {
        if duration <= Duration::zero() {
            return None;
        }

        for window in &self.open {
            if window.end <= earliest {
                continue;
            }

            let mut cursor = window.start.max(earliest);
            if cursor + duration > deadline {
                // 後續時段只會更晚
                return None;
            }

            for busy in &self.booked {
                if busy.end <= cursor || busy.start >= window.end {
                    continue;
                }
                if cursor + duration <= busy.start {
                    break;
                }
                cursor = busy.end;
            }

            let end = cursor + duration;
            if end > deadline {
                return None;
            }
            if end <= window.end {
                return Some(TimeWindow::new(cursor, end));
            }
        }

        None
    }

    /// 預訂時段，與既有預訂衝突或超出開放時段時回傳 false
    pub fn book(&mut self, slot: TimeWindow) -> bool {
        if slot.is_empty()
            || !self.open.iter().any(|w| w.contains(&slot))
            || self.booked.iter().any(|b| b.overlaps(&slot))
        {
            return false;
        }
        let index = self.booked.partition_point(|b| b.start < slot.start);
        self.booked.insert(index, slot);
        true
    }

    /// 釋放已預訂時段
    pub fn release(&mut self, slot: &TimeWindow) -> bool {
        match self.booked.iter().position(|b| b == slot) {
            Some(index) => {
                self.booked.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn day_shift() -> ShiftHours {
        ShiftHours::new(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(16, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_create_calendar() {
        let calendar = WorkCalendar::new("TEST".to_string());
        assert_eq!(calendar.calendar_id, "TEST");

        // 2025-10-06 是週一
        let monday = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        assert!(calendar.is_working_day(monday));
    }

    #[test]
    fn test_holidays() {
        let mut calendar = WorkCalendar::new("TEST".to_string());

        let holiday = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap(); // 國慶日
        calendar.add_holiday(holiday);

        assert!(!calendar.is_working_day(holiday));
    }

    #[test]
    fn test_24_7_calendar() {
        let calendar = WorkCalendar::new_24_7("24/7".to_string());

        let saturday = NaiveDate::from_ymd_opt(2025, 10, 11).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2025, 10, 12).unwrap();

        assert!(calendar.is_working_day(saturday));
        assert!(calendar.is_working_day(sunday));
    }

    #[test]
    fn test_open_windows_skip_weekend() {
        let calendar = WorkCalendar::new("TEST".to_string());
        let monday = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();

        let windows = calendar.open_windows(monday, 7, day_shift());

        assert_eq!(windows.len(), 5);
        assert_eq!(windows[0], TimeWindow::new(at(6, 8, 0), at(6, 16, 0)));
        assert_eq!(windows[4], TimeWindow::new(at(10, 8, 0), at(10, 16, 0)));
    }

    #[test]
    fn test_full_day_windows_merge() {
        let calendar = WorkCalendar::new_24_7("24/7".to_string());
        let start = NaiveDate::from_ymd_opt(2025, 10, 6).unwrap();
        let windows = calendar.open_windows(start, 3, ShiftHours::full_day());

        let machine = MachineCalendar::new("PRESS-1".to_string(), &windows);

        assert_eq!(machine.open_windows().len(), 1);
        assert_eq!(machine.open_windows()[0], TimeWindow::new(at(6, 0, 0), at(9, 0, 0)));
    }

    #[rstest]
    #[case::fits_at_window_start(at(6, 0, 0), 60, Some((at(6, 8, 0), at(6, 9, 0))))]
    #[case::starts_at_earliest(at(6, 10, 30), 30, Some((at(6, 10, 30), at(6, 11, 0))))]
    #[case::rolls_to_next_day(at(6, 15, 30), 60, Some((at(7, 8, 0), at(7, 9, 0))))]
    #[case::longer_than_any_window(at(6, 0, 0), 9 * 60, None)]
    fn test_find_slot_in_empty_calendar(
        #[case] earliest: NaiveDateTime,
        #[case] minutes: i64,
        #[case] expected: Option<(NaiveDateTime, NaiveDateTime)>,
    ) {
        let calendar = WorkCalendar::new("TEST".to_string());
        let windows = calendar.open_windows(NaiveDate::from_ymd_opt(2025, 10, 6).unwrap(), 5, day_shift());
        let machine = MachineCalendar::new("PRESS-1".to_string(), &windows);

        let slot = machine.find_slot(Duration::minutes(minutes), earliest, at(20, 0, 0));

        assert_eq!(slot, expected.map(|(s, e)| TimeWindow::new(s, e)));
    }

    #[test]
    fn test_find_slot_skips_bookings() {
        let windows = vec![TimeWindow::new(at(6, 8, 0), at(6, 16, 0))];
        let mut machine = MachineCalendar::new("PRESS-1".to_string(), &windows);

        assert!(machine.book(TimeWindow::new(at(6, 8, 0), at(6, 10, 0))));
        assert!(machine.book(TimeWindow::new(at(6, 10, 30), at(6, 12, 0))));

        // 10:00-10:30 的空檔放不下 1 小時
        let slot = machine.find_slot(Duration::minutes(60), at(6, 0, 0), at(6, 16, 0));
        assert_eq!(slot, Some(TimeWindow::new(at(6, 12, 0), at(6, 13, 0))));

        // 30 分鐘剛好放進空檔
        let slot = machine.find_slot(Duration::minutes(30), at(6, 0, 0), at(6, 16, 0));
        assert_eq!(slot, Some(TimeWindow::new(at(6, 10, 0), at(6, 10, 30))));
    }

    #[test]
    fn test_find_slot_respects_deadline() {
        let windows = vec![TimeWindow::new(at(6, 8, 0), at(6, 16, 0))];
        let mut machine = MachineCalendar::new("PRESS-1".to_string(), &windows);
        assert!(machine.book(TimeWindow::new(at(6, 8, 0), at(6, 12, 0))));

        assert_eq!(
            machine.find_slot(Duration::minutes(60), at(6, 0, 0), at(6, 12, 30)),
            None
        );
        assert_eq!(
            machine.find_slot(Duration::minutes(60), at(6, 0, 0), at(6, 13, 0)),
            Some(TimeWindow::new(at(6, 12, 0), at(6, 13, 0)))
        );
    }

    #[test]
    fn test_window_intersection() {
        let shift = TimeWindow::new(at(6, 8, 0), at(6, 16, 0));

        assert_eq!(
            shift.intersection(&TimeWindow::new(at(6, 12, 0), at(6, 20, 0))),
            Some(TimeWindow::new(at(6, 12, 0), at(6, 16, 0)))
        );
        assert_eq!(shift.intersection(&TimeWindow::new(at(6, 16, 0), at(6, 18, 0))), None);
    }

    #[test]
    fn test_book_rejects_conflicts_and_release() {
        let windows = vec![TimeWindow::new(at(6, 8, 0), at(6, 16, 0))];
        let mut machine = MachineCalendar::new("PRESS-1".to_string(), &windows);
        let slot = TimeWindow::new(at(6, 9, 0), at(6, 10, 0));

        assert!(machine.book(slot));
        assert!(!machine.book(TimeWindow::new(at(6, 9, 30), at(6, 10, 30))));
        // 超出開放時段
        assert!(!machine.book(TimeWindow::new(at(6, 15, 30), at(6, 16, 30))));

        assert!(machine.release(&slot));
        assert!(!machine.release(&slot));
        assert!(machine.booked().is_empty());
    }
}
