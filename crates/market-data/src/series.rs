//! Vector-backed OHLC time series with binary-search lookup.
//!
//! Bars are stored sorted by timestamp. Lookup is `O(log n)`, random access
//! by index with an "n bars ago" offset is `O(1)`.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::bar::{OhlcBar, TimeFrame, VolumeUnit};
use crate::date_range::DateRange;
use crate::error::MarketDataError;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcSeries {
    time_frame: TimeFrame,
    volume_unit: VolumeUnit,
    bars: Vec<OhlcBar>,
}

impl OhlcSeries {
    pub fn new(time_frame: TimeFrame, volume_unit: VolumeUnit) -> Self {
        OhlcSeries {
            time_frame,
            volume_unit,
            bars: Vec::new(),
        }
    }

    pub fn with_capacity(time_frame: TimeFrame, volume_unit: VolumeUnit, capacity: usize) -> Self {
        OhlcSeries {
            time_frame,
            volume_unit,
            bars: Vec::with_capacity(capacity),
        }
    }

    /// Bulk-load path for callers that guarantee ascending timestamps, e.g.
    /// the synthetic series builder. Ordering and frame uniformity are still
    /// verified once; duplicates fail.
    pub fn from_sorted_bars(
        time_frame: TimeFrame,
        volume_unit: VolumeUnit,
        bars: Vec<OhlcBar>,
    ) -> Result<Self, MarketDataError> {
        for pair in bars.windows(2) {
            if pair[1].timestamp() <= pair[0].timestamp() {
                return Err(MarketDataError::OutOfOrder(pair[1].timestamp()));
            }
        }
        for bar in &bars {
            if bar.time_frame() != time_frame {
                return Err(MarketDataError::TimeFrameMismatch {
                    series: time_frame.name().to_string(),
                    entry: bar.time_frame().name().to_string(),
                });
            }
        }
        Ok(OhlcSeries {
            time_frame,
            volume_unit,
            bars,
        })
    }

    /// Insert a bar, keeping the series sorted. Duplicate timestamps and
    /// time-frame mismatches are rejected.
    pub fn add_bar(&mut self, bar: OhlcBar) -> Result<(), MarketDataError> {
        if bar.time_frame() != self.time_frame {
            return Err(MarketDataError::TimeFrameMismatch {
                series: self.time_frame.name().to_string(),
                entry: bar.time_frame().name().to_string(),
            });
        }
        match self
            .bars
            .binary_search_by_key(&bar.timestamp(), |b| b.timestamp())
        {
            Ok(_) => Err(MarketDataError::DuplicateTimestamp(bar.timestamp())),
            Err(pos) => {
                self.bars.insert(pos, bar);
                Ok(())
            }
        }
    }

    pub fn time_frame(&self) -> TimeFrame {
        self.time_frame
    }

    pub fn volume_unit(&self) -> VolumeUnit {
        self.volume_unit
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn bars(&self) -> &[OhlcBar] {
        &self.bars
    }

    pub fn first_bar(&self) -> Option<&OhlcBar> {
        self.bars.first()
    }

    pub fn last_bar(&self) -> Option<&OhlcBar> {
        self.bars.last()
    }

    pub fn bar(&self, index: usize) -> Option<&OhlcBar> {
        self.bars.get(index)
    }

    /// Binary search by exact timestamp.
    pub fn index_of(&self, timestamp: NaiveDateTime) -> Option<usize> {
        self.bars
            .binary_search_by_key(&timestamp, |b| b.timestamp())
            .ok()
    }

    /// Lookup for end-of-day series keyed at midnight.
    pub fn index_of_date(&self, date: NaiveDate) -> Option<usize> {
        self.index_of(date.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
    }

    /// The bar `offset` bars before `index`. `offset == 0` is the bar at
    /// `index` itself; reaching before the start of the series fails.
    pub fn bar_at_offset(&self, index: usize, offset: usize) -> Result<&OhlcBar, MarketDataError> {
        if offset > index || index >= self.bars.len() {
            return Err(MarketDataError::OffsetOutOfRange { index, offset });
        }
        Ok(&self.bars[index - offset])
    }

    pub fn open_at(&self, index: usize, offset: usize) -> Result<Decimal, MarketDataError> {
        self.bar_at_offset(index, offset).map(|b| b.open())
    }

    pub fn high_at(&self, index: usize, offset: usize) -> Result<Decimal, MarketDataError> {
        self.bar_at_offset(index, offset).map(|b| b.high())
    }

    pub fn low_at(&self, index: usize, offset: usize) -> Result<Decimal, MarketDataError> {
        self.bar_at_offset(index, offset).map(|b| b.low())
    }

    pub fn close_at(&self, index: usize, offset: usize) -> Result<Decimal, MarketDataError> {
        self.bar_at_offset(index, offset).map(|b| b.close())
    }

    pub fn volume_at(&self, index: usize, offset: usize) -> Result<Decimal, MarketDataError> {
        self.bar_at_offset(index, offset).map(|b| b.volume())
    }

    fn component_series(&self, pick: impl Fn(&OhlcBar) -> Decimal) -> NumericSeries {
        let mut out = NumericSeries::with_capacity(self.time_frame, self.bars.len());
        for bar in &self.bars {
            out.entries.push((bar.timestamp(), pick(bar)));
        }
        out
    }

    pub fn open_series(&self) -> NumericSeries {
        self.component_series(|b| b.open())
    }

    pub fn high_series(&self) -> NumericSeries {
        self.component_series(|b| b.high())
    }

    pub fn low_series(&self) -> NumericSeries {
        self.component_series(|b| b.low())
    }

    pub fn close_series(&self) -> NumericSeries {
        self.component_series(|b| b.close())
    }

    /// New series restricted to bars whose dates fall inside `range`
    /// (inclusive). A range reaching before the first bar is a caller error.
    pub fn filter(&self, range: &DateRange) -> Result<OhlcSeries, MarketDataError> {
        let first = self.first_bar().ok_or(MarketDataError::EmptySeries)?;
        if range.first_date() < first.date() {
            return Err(MarketDataError::FilterBeforeSeriesStart {
                requested: range.first_date().to_string(),
                first: first.date().to_string(),
            });
        }
        let bars: Vec<OhlcBar> = self
            .bars
            .iter()
            .filter(|b| range.contains(b.date()))
            .cloned()
            .collect();
        Ok(OhlcSeries {
            time_frame: self.time_frame,
            volume_unit: self.volume_unit,
            bars,
        })
    }
}

/// Single-valued series sharing timestamps with the OHLC series it was
/// derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSeries {
    time_frame: TimeFrame,
    entries: Vec<(NaiveDateTime, Decimal)>,
}

impl NumericSeries {
    pub fn new(time_frame: TimeFrame) -> Self {
        NumericSeries {
            time_frame,
            entries: Vec::new(),
        }
    }

    pub fn with_capacity(time_frame: TimeFrame, capacity: usize) -> Self {
        NumericSeries {
            time_frame,
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, timestamp: NaiveDateTime, value: Decimal) -> Result<(), MarketDataError> {
        if let Some((last, _)) = self.entries.last() {
            if timestamp <= *last {
                return Err(MarketDataError::OutOfOrder(timestamp));
            }
        }
        self.entries.push((timestamp, value));
        Ok(())
    }

    pub fn time_frame(&self) -> TimeFrame {
        self.time_frame
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(NaiveDateTime, Decimal)] {
        &self.entries
    }

    pub fn timestamp(&self, index: usize) -> Option<NaiveDateTime> {
        self.entries.get(index).map(|(t, _)| *t)
    }

    pub fn value(&self, index: usize) -> Option<Decimal> {
        self.entries.get(index).map(|(_, v)| *v)
    }

    pub fn values(&self) -> Vec<Decimal> {
        self.entries.iter().map(|(_, v)| *v).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day_bar(d: u32, close: Decimal) -> OhlcBar {
        OhlcBar::from_date(
            NaiveDate::from_ymd_opt(2021, 1, d).unwrap(),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            dec!(0),
            TimeFrame::Daily,
        )
        .unwrap()
    }

    fn sample_series() -> OhlcSeries {
        let mut s = OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares);
        for (d, c) in [(4, dec!(100)), (5, dec!(101)), (6, dec!(102)), (7, dec!(103))] {
            s.add_bar(day_bar(d, c)).unwrap();
        }
        s
    }

    #[test]
    fn add_keeps_sorted_order() {
        use chrono::Datelike;

        let mut s = OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares);
        s.add_bar(day_bar(6, dec!(102))).unwrap();
        s.add_bar(day_bar(4, dec!(100))).unwrap();
        s.add_bar(day_bar(5, dec!(101))).unwrap();
        let dates: Vec<u32> = s.bars().iter().map(|b| b.date().day()).collect();
        assert_eq!(dates, vec![4, 5, 6]);
    }

    #[test]
    fn add_rejects_duplicate_timestamp() {
        let mut s = sample_series();
        assert!(matches!(
            s.add_bar(day_bar(5, dec!(200))),
            Err(MarketDataError::DuplicateTimestamp(_))
        ));
    }

    #[test]
    fn add_rejects_time_frame_mismatch() {
        let mut s = sample_series();
        let weekly = OhlcBar::from_date(
            NaiveDate::from_ymd_opt(2021, 2, 1).unwrap(),
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100),
            dec!(0),
            TimeFrame::Weekly,
        )
        .unwrap();
        assert!(matches!(
            s.add_bar(weekly),
            Err(MarketDataError::TimeFrameMismatch { .. })
        ));
    }

    #[test]
    fn offset_walks_backwards() {
        let s = sample_series();
        let idx = s.index_of_date(NaiveDate::from_ymd_opt(2021, 1, 7).unwrap()).unwrap();
        assert_eq!(s.close_at(idx, 0).unwrap(), dec!(103));
        assert_eq!(s.close_at(idx, 2).unwrap(), dec!(101));
        assert!(s.close_at(idx, 4).is_err());
    }

    #[test]
    fn filter_requires_range_inside_series() {
        let s = sample_series();
        let ok = DateRange::new(
            NaiveDate::from_ymd_opt(2021, 1, 5).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 6).unwrap(),
        )
        .unwrap();
        assert_eq!(s.filter(&ok).unwrap().len(), 2);

        let before = DateRange::new(
            NaiveDate::from_ymd_opt(2020, 12, 1).unwrap(),
            NaiveDate::from_ymd_opt(2021, 1, 6).unwrap(),
        )
        .unwrap();
        assert!(s.filter(&before).is_err());
    }

    #[test]
    fn derived_series_share_timestamps() {
        let s = sample_series();
        let closes = s.close_series();
        assert_eq!(closes.len(), s.len());
        assert_eq!(closes.timestamp(0), Some(s.bar(0).unwrap().timestamp()));
        assert_eq!(closes.value(3), Some(dec!(103)));
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(sample_series(), sample_series());
        let mut other = sample_series();
        other.add_bar(day_bar(8, dec!(104))).unwrap();
        assert_ne!(sample_series(), other);
    }
}
