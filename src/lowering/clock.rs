//! The compile-time clock.
//!
//! Semantic temporal operators (LAST_MONTH, LAST_N_DAYS, THIS_YEAR)
//! resolve against an injected clock rather than the process clock, so a
//! given IR compiles to the same SQL today and in a test run next year.

use chrono::{Datelike, Days, NaiveDate, Utc};

/// The date the compiler treats as "today".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryClock {
    today: NaiveDate,
}

impl QueryClock {
    /// A clock pinned to a fixed date.
    pub fn fixed(today: NaiveDate) -> Self {
        Self { today }
    }

    /// A clock reading the current UTC date.
    pub fn system() -> Self {
        Self {
            today: Utc::now().date_naive(),
        }
    }

    /// The clock's date.
    pub fn today(&self) -> NaiveDate {
        self.today
    }

    /// First and last day of the month before the clock month.
    pub fn last_month(&self) -> (NaiveDate, NaiveDate) {
        let first_of_current = self
            .today
            .with_day(1)
            .expect("day 1 exists in every month");
        let last_of_previous = first_of_current
            .pred_opt()
            .expect("date is not the minimum representable date");
        let first_of_previous = last_of_previous
            .with_day(1)
            .expect("day 1 exists in every month");
        (first_of_previous, last_of_previous)
    }

    /// January 1 through December 31 of the clock year.
    pub fn this_year(&self) -> (NaiveDate, NaiveDate) {
        let year = self.today.year();
        (
            NaiveDate::from_ymd_opt(year, 1, 1).expect("January 1 is valid"),
            NaiveDate::from_ymd_opt(year, 12, 31).expect("December 31 is valid"),
        )
    }

    /// The n-day window ending on the clock date, inclusive.
    pub fn last_n_days(&self, n: u64) -> (NaiveDate, NaiveDate) {
        let start = self
            .today
            .checked_sub_days(Days::new(n.saturating_sub(1)))
            .expect("window start is representable");
        (start, self.today)
    }
}

impl Default for QueryClock {
    fn default() -> Self {
        Self::system()
    }
}
