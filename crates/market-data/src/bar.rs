use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MarketDataError;

/// Bar duration of a time series. All bars in one series share a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeFrame {
    Intraday,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl TimeFrame {
    pub fn name(&self) -> &'static str {
        match self {
            TimeFrame::Intraday => "intraday",
            TimeFrame::Daily => "daily",
            TimeFrame::Weekly => "weekly",
            TimeFrame::Monthly => "monthly",
            TimeFrame::Quarterly => "quarterly",
            TimeFrame::Yearly => "yearly",
        }
    }

    pub fn is_end_of_day(&self) -> bool {
        !matches!(self, TimeFrame::Intraday)
    }
}

/// Units the volume column is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeUnit {
    Shares,
    Contracts,
}

/// A single OHLC bar.
///
/// Construction enforces the price invariants; a bar that exists is valid:
/// all prices positive, `high >= max(open, close, low)`,
/// `low <= min(open, close, high)`, volume non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OhlcBar {
    timestamp: NaiveDateTime,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    time_frame: TimeFrame,
}

impl OhlcBar {
    pub fn new(
        timestamp: NaiveDateTime,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        time_frame: TimeFrame,
    ) -> Result<Self, MarketDataError> {
        let bad = |what: String| MarketDataError::InvalidBar(timestamp, what);

        if open <= Decimal::ZERO || high <= Decimal::ZERO || low <= Decimal::ZERO || close <= Decimal::ZERO {
            return Err(bad(format!(
                "prices must be positive (O={open} H={high} L={low} C={close})"
            )));
        }
        if high < open || high < close || high < low {
            return Err(bad(format!(
                "high {high} below open {open}, close {close}, or low {low}"
            )));
        }
        if low > open || low > close {
            return Err(bad(format!("low {low} above open {open} or close {close}")));
        }
        if volume < Decimal::ZERO {
            return Err(bad(format!("negative volume {volume}")));
        }

        Ok(OhlcBar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            time_frame,
        })
    }

    /// Daily (and coarser) bars are keyed at midnight.
    pub fn from_date(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
        time_frame: TimeFrame,
    ) -> Result<Self, MarketDataError> {
        Self::new(
            date.and_hms_opt(0, 0, 0).expect("midnight is always valid"),
            open,
            high,
            low,
            close,
            volume,
            time_frame,
        )
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn open(&self) -> Decimal {
        self.open
    }

    pub fn high(&self) -> Decimal {
        self.high
    }

    pub fn low(&self) -> Decimal {
        self.low
    }

    pub fn close(&self) -> Decimal {
        self.close
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn time_frame(&self) -> TimeFrame {
        self.time_frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn accepts_a_valid_bar() {
        let bar = OhlcBar::from_date(
            date(2021, 3, 1),
            dec!(100),
            dec!(103),
            dec!(99),
            dec!(101),
            dec!(1000),
            TimeFrame::Daily,
        )
        .unwrap();
        assert_eq!(bar.close(), dec!(101));
        assert_eq!(bar.date(), date(2021, 3, 1));
    }

    #[test]
    fn rejects_high_below_close() {
        let err = OhlcBar::from_date(
            date(2021, 3, 1),
            dec!(100),
            dec!(100.5),
            dec!(99),
            dec!(101),
            dec!(0),
            TimeFrame::Daily,
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_low_above_open() {
        let err = OhlcBar::from_date(
            date(2021, 3, 1),
            dec!(100),
            dec!(103),
            dec!(100.5),
            dec!(101),
            dec!(0),
            TimeFrame::Daily,
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_positive_prices() {
        let err = OhlcBar::from_date(
            date(2021, 3, 1),
            dec!(0),
            dec!(103),
            dec!(99),
            dec!(101),
            dec!(0),
            TimeFrame::Daily,
        );
        assert!(err.is_err());
    }
}
