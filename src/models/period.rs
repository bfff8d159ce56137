use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use serde::{Serialize, Serializer};

/// A calendar month targeted by one sync run.
///
/// Only constructible through `new` or `containing`, so `start` is always
/// the first day of a real month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyncPeriod {
    first_day: NaiveDate,
}

impl SyncPeriod {
    /// Returns `None` for a month outside 1..=12 or an unrepresentable year.
    pub fn new(month: u32, year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|first_day| Self { first_day })
    }

    /// The month containing `now`.
    pub fn containing(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            first_day: today - Days::new(u64::from(today.day0())),
        }
    }

    pub fn current() -> Self {
        Self::containing(Utc::now())
    }

    pub fn month(&self) -> u32 {
        self.first_day.month()
    }

    pub fn year(&self) -> i32 {
        self.first_day.year()
    }

    /// First day of the month.
    pub fn start(&self) -> NaiveDate {
        self.first_day
    }

    /// First day of the following month (exclusive upper bound).
    pub fn next_start(&self) -> NaiveDate {
        self.next().start()
    }

    /// Saturates at the last representable month.
    pub fn next(&self) -> Self {
        Self {
            first_day: self.first_day.checked_add_months(Months::new(1)).unwrap_or(self.first_day),
        }
    }

    /// Saturates at the first representable month.
    pub fn previous(&self) -> Self {
        Self {
            first_day: self.first_day.checked_sub_months(Months::new(1)).unwrap_or(self.first_day),
        }
    }

    /// The `count` months ending with (and including) this one, oldest first.
    pub fn trailing(&self, count: u32) -> Vec<Self> {
        let mut periods = Vec::with_capacity(count as usize);
        let mut cursor = *self;
        for _ in 0..count {
            periods.push(cursor);
            cursor = cursor.previous();
        }
        periods.reverse();
        periods
    }
}

impl std::fmt::Display for SyncPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year(), self.month())
    }
}

/// Serialized as `YYYY-MM`.
impl Serialize for SyncPeriod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
