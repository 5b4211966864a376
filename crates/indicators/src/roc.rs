use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use market_data::{NumericSeries, OhlcSeries};

use crate::error::IndicatorError;

/// Percent rate of change over `period` bars:
/// `roc[i] = (s[i] / s[i - period] - 1) * 100`. Output is shorter than the
/// input by `period` and keeps the later timestamps.
pub fn roc_series(series: &NumericSeries, period: usize) -> Result<NumericSeries, IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::InvalidParameter("ROC period must be >= 1".into()));
    }
    let entries = series.entries();
    let mut out = NumericSeries::with_capacity(series.time_frame(), entries.len().saturating_sub(period));
    for i in period..entries.len() {
        let (timestamp, value) = entries[i];
        let (_, base) = entries[i - period];
        if base.is_zero() {
            return Err(IndicatorError::DivisionByZero("roc_series"));
        }
        let roc = (value / base - Decimal::ONE) * dec!(100);
        out.push(timestamp, roc)
            .expect("input timestamps are strictly increasing");
    }
    Ok(out)
}

/// Internal bar strength: `(close - low) / (high - low)`, zero on a
/// degenerate bar with no range. Same length as the input.
pub fn ibs_series(series: &OhlcSeries) -> NumericSeries {
    let mut out = NumericSeries::with_capacity(series.time_frame(), series.len());
    for bar in series.bars() {
        let range = bar.high() - bar.low();
        let ibs = if range.is_zero() {
            Decimal::ZERO
        } else {
            (bar.close() - bar.low()) / range
        };
        out.push(bar.timestamp(), ibs)
            .expect("input timestamps are strictly increasing");
    }
    out
}
