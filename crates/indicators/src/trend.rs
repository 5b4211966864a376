//! Trend-strength helpers: rolling R-squared against a time index and
//! rolling percent rank.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use market_data::num::to_f64;
use market_data::{NumericSeries, TimeFrame};

use crate::error::IndicatorError;

/// Rolling R-squared of the series values regressed on x = 1..L for each
/// window of length `lookback` ending at the output timestamp.
///
/// Rolling sums of y, y-squared, and x*y are maintained in O(1) per step
/// after the initial seed; the x-side sums are closed-form.
pub fn rolling_r_squared_series(
    series: &NumericSeries,
    lookback: usize,
) -> Result<NumericSeries, IndicatorError> {
    if lookback < 2 {
        return Err(IndicatorError::InvalidParameter(
            "rolling R-squared lookback must be >= 2".into(),
        ));
    }

    let entries = series.entries();
    let n = entries.len();
    let mut out = NumericSeries::with_capacity(
        series.time_frame(),
        if n >= lookback { n - lookback + 1 } else { 0 },
    );
    if n < lookback {
        return Ok(out);
    }

    let y: Vec<f64> = entries.iter().map(|(_, v)| to_f64(*v)).collect();

    let l = lookback as f64;
    let sum_x = l * (l + 1.0) / 2.0;
    let sum_x2 = l * (l + 1.0) * (2.0 * l + 1.0) / 6.0;
    let den_x = l * sum_x2 - sum_x * sum_x;

    // Seed sums over the first window.
    let mut sum_y = 0.0;
    let mut sum_y2 = 0.0;
    let mut sum_xy = 0.0;
    for (k, &value) in y.iter().take(lookback).enumerate() {
        sum_y += value;
        sum_y2 += value * value;
        sum_xy += (k as f64 + 1.0) * value;
    }

    let r2_of = |s_y: f64, s_y2: f64, s_xy: f64| -> f64 {
        let den_y = l * s_y2 - s_y * s_y;
        if den_x <= 0.0 || den_y <= 0.0 {
            return 0.0;
        }
        let corr = (l * s_xy - sum_x * s_y) / (den_x * den_y).sqrt();
        (corr * corr).clamp(0.0, 1.0)
    };

    for i in lookback - 1..n {
        let r2 = r2_of(sum_y, sum_y2, sum_xy);
        out.push(entries[i].0, Decimal::from_f64(r2).unwrap_or_default())
            .expect("input timestamps are strictly increasing");

        if i + 1 < n {
            let y_old = y[i + 1 - lookback];
            let y_new = y[i + 1];
            let prev_sum_y = sum_y;
            sum_y = sum_y - y_old + y_new;
            sum_y2 = sum_y2 - y_old * y_old + y_new * y_new;
            // Dropping the oldest point shifts every x label down by one.
            sum_xy = (sum_xy - prev_sum_y) + l * y_new;
        }
    }

    Ok(out)
}

/// Rolling percent rank: the fraction of values in the trailing window
/// (current bar included) at or below the current value, in [1/W, 1].
pub fn percent_rank_series(
    series: &NumericSeries,
    window: usize,
) -> Result<NumericSeries, IndicatorError> {
    if window < 2 {
        return Err(IndicatorError::InvalidParameter(
            "percent rank window must be >= 2".into(),
        ));
    }

    let entries = series.entries();
    let n = entries.len();
    let mut out = NumericSeries::with_capacity(
        series.time_frame(),
        if n >= window { n - window + 1 } else { 0 },
    );
    if n < window {
        return Ok(out);
    }

    for i in window - 1..n {
        let (timestamp, value) = entries[i];
        let at_or_below = entries[i + 1 - window..=i]
            .iter()
            .filter(|(_, v)| *v <= value)
            .count();
        let rank = at_or_below as f64 / window as f64;
        out.push(timestamp, Decimal::from_f64(rank).unwrap_or_default())
            .expect("input timestamps are strictly increasing");
    }

    Ok(out)
}

/// Conventional percent-rank window per bar duration: one trading year for
/// daily and intraday data, 52 weeks, 36 periods for monthly and coarser.
pub fn standard_percent_rank_period(time_frame: TimeFrame) -> u32 {
    match time_frame {
        TimeFrame::Daily | TimeFrame::Intraday => 252,
        TimeFrame::Weekly => 52,
        TimeFrame::Monthly | TimeFrame::Quarterly | TimeFrame::Yearly => 36,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn series_of(values: &[f64]) -> NumericSeries {
        let mut s = NumericSeries::new(TimeFrame::Daily);
        for (i, &v) in values.iter().enumerate() {
            let ts = NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap()
                .checked_add_days(chrono::Days::new(i as u64))
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            s.push(ts, Decimal::from_f64(v).unwrap()).unwrap();
        }
        s
    }

    #[test]
    fn perfect_trend_has_unit_r_squared() {
        let s = series_of(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let r2 = rolling_r_squared_series(&s, 4).unwrap();
        assert_eq!(r2.len(), 3);
        for (_, v) in r2.entries() {
            assert!((to_f64(*v) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn flat_series_has_zero_r_squared() {
        let s = series_of(&[5.0; 6]);
        let r2 = rolling_r_squared_series(&s, 3).unwrap();
        for (_, v) in r2.entries() {
            assert_eq!(*v, Decimal::ZERO);
        }
    }

    #[test]
    fn rolling_matches_fresh_computation() {
        // Values chosen so each window has a different fit quality; the
        // incremental sums must agree with recomputing from scratch.
        let values = [3.0, 1.0, 4.0, 1.5, 5.0, 9.0, 2.0, 6.0];
        let s = series_of(&values);
        let rolled = rolling_r_squared_series(&s, 4).unwrap();
        for (i, (_, got)) in rolled.entries().iter().enumerate() {
            let window = series_of(&values[i..i + 4]);
            let fresh = rolling_r_squared_series(&window, 4).unwrap();
            let want = to_f64(fresh.value(0).unwrap());
            assert!((to_f64(*got) - want).abs() < 1e-9, "window {i}");
        }
    }

    #[test]
    fn percent_rank_counts_at_or_below() {
        let s = series_of(&[1.0, 2.0, 3.0, 2.5]);
        let pr = percent_rank_series(&s, 4).unwrap();
        assert_eq!(pr.len(), 1);
        // 3 of 4 values are <= 2.5
        assert_eq!(pr.value(0).unwrap(), dec!(0.75));
    }

    #[test]
    fn standard_windows() {
        assert_eq!(standard_percent_rank_period(TimeFrame::Daily), 252);
        assert_eq!(standard_percent_rank_period(TimeFrame::Weekly), 52);
        assert_eq!(standard_percent_rank_period(TimeFrame::Monthly), 36);
    }
}
