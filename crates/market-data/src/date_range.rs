use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::MarketDataError;

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    first: NaiveDate,
    last: NaiveDate,
}

impl DateRange {
    pub fn new(first: NaiveDate, last: NaiveDate) -> Result<Self, MarketDataError> {
        if first > last {
            return Err(MarketDataError::InvalidDateRange(format!(
                "first date {first} is after last date {last}"
            )));
        }
        Ok(DateRange { first, last })
    }

    pub fn first_date(&self) -> NaiveDate {
        self.first
    }

    pub fn last_date(&self) -> NaiveDate {
        self.last
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(DateRange::new(date(2021, 5, 1), date(2021, 4, 1)).is_err());
    }

    #[test]
    fn contains_is_inclusive() {
        let r = DateRange::new(date(2021, 1, 4), date(2021, 1, 8)).unwrap();
        assert!(r.contains(date(2021, 1, 4)));
        assert!(r.contains(date(2021, 1, 8)));
        assert!(!r.contains(date(2021, 1, 9)));
    }
}
