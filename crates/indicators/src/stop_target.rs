//! Profit-target and stop widths estimated from the in-sample return
//! distribution.
//!
//! The "typical day" construction measures both widths from the same center
//! (the median of n-period ROC) out to central quantiles, so a skewed tape
//! produces asymmetric widths from data rather than from a hand-picked
//! parameter. The calibrated variants grid-search the quantile level so the
//! upside width matches a legacy baseline built from positive returns.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use market_data::OhlcSeries;

use crate::error::IndicatorError;
use crate::robust::{medcouple_skew, qn_scale};
use crate::roc::roc_series;
use crate::stats::{linear_interpolation_quantile, median, winsorize};

const WINSOR_TAIL: f64 = 0.01;
const FIXED_ALPHA: f64 = 0.10;
const MIN_SAMPLE: usize = 20;
const ALPHA_GRID_LO: f64 = 0.06;
const ALPHA_GRID_HI: f64 = 0.16;
const ALPHA_GRID_STEPS: usize = 25;

/// Positive percent-width pair: distance from the median up to the target
/// quantile and down to the stop quantile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopTargetWidths {
    pub profit_width: Decimal,
    pub stop_width: Decimal,
}

/// Width selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopTargetMethod {
    /// Fixed central quantiles at alpha = 0.10.
    TypicalDayFixedAlpha,
    /// One alpha calibrated so the upside width matches the legacy target.
    #[default]
    TypicalDayCalibratedAlpha,
    /// Separate alphas calibrated for the upside and downside widths.
    TypicalDayCalibratedAsymmetric,
}

fn roc_values(series: &OhlcSeries, period: usize) -> Result<Vec<Decimal>, IndicatorError> {
    if series.len() < 3 {
        return Err(IndicatorError::TooFewValues {
            needed: 3,
            got: series.len(),
        });
    }
    let roc = roc_series(&series.close_series(), period)?;
    let values = roc.values();
    if values.len() < 3 {
        return Err(IndicatorError::TooFewValues {
            needed: 3,
            got: values.len(),
        });
    }
    Ok(values)
}

/// Up/down widths from the median at quantile level `alpha` on an already
/// winsorized vector.
pub fn widths_for_alpha(
    winsorized: &[Decimal],
    center: Decimal,
    alpha: f64,
) -> Result<(Decimal, Decimal), IndicatorError> {
    let q_lo = linear_interpolation_quantile(winsorized, alpha)?;
    let q_hi = linear_interpolation_quantile(winsorized, 1.0 - alpha)?;
    Ok((q_hi - center, center - q_lo))
}

fn calibrate_alpha(
    winsorized: &[Decimal],
    center: Decimal,
    legacy_width: Decimal,
    pick_upside: bool,
) -> Result<f64, IndicatorError> {
    let width_at = |alpha: f64| -> Result<Decimal, IndicatorError> {
        let (up, down) = widths_for_alpha(winsorized, center, alpha)?;
        Ok(if pick_upside { up } else { down })
    };

    let mut best_alpha = ALPHA_GRID_LO;
    let mut best_err = (width_at(ALPHA_GRID_LO)? - legacy_width).abs();
    for i in 1..=ALPHA_GRID_STEPS {
        let alpha = ALPHA_GRID_LO + (ALPHA_GRID_HI - ALPHA_GRID_LO) * (i as f64 / ALPHA_GRID_STEPS as f64);
        let err = (width_at(alpha)? - legacy_width).abs();
        if err < best_err {
            best_err = err;
            best_alpha = alpha;
        }
    }
    Ok(best_alpha)
}

/// Legacy baseline widths for the long side: target from the positive
/// returns (median + Qn), stop from the loss-quantile of the negative
/// returns; central-quantile fallbacks when either side is thin.
pub fn legacy_baseline_long_widths(
    series: &OhlcSeries,
    period: usize,
) -> Result<StopTargetWidths, IndicatorError> {
    const STOP_QUANTILE: f64 = 0.15;
    const MIN_PARTITION: usize = 10;
    let eps = dec!(0.000001);

    let roc = roc_values(series, period)?;
    let pos: Vec<Decimal> = roc.iter().copied().filter(|r| *r > Decimal::ZERO).collect();
    let neg: Vec<Decimal> = roc.iter().copied().filter(|r| *r < Decimal::ZERO).collect();

    let mut target = if pos.len() >= MIN_PARTITION {
        median(&pos)? + qn_scale(&pos)
    } else {
        (linear_interpolation_quantile(&roc, 0.75)? - median(&roc)?).abs()
    };

    let mut stop = if neg.len() >= MIN_PARTITION {
        -linear_interpolation_quantile(&neg, STOP_QUANTILE)?
    } else {
        let q = linear_interpolation_quantile(&roc, STOP_QUANTILE)?;
        q.abs()
    };

    if target <= Decimal::ZERO {
        target = eps;
    }
    if stop <= Decimal::ZERO {
        stop = eps;
    }
    Ok(StopTargetWidths {
        profit_width: target,
        stop_width: stop,
    })
}

/// Typical-day widths at a fixed central-quantile level, winsorizing lightly
/// once the sample is large enough for stable tails.
pub fn quantile_stop_and_target(
    series: &OhlcSeries,
    period: usize,
) -> Result<StopTargetWidths, IndicatorError> {
    let roc = roc_values(series, period)?;
    let center = median(&roc)?;
    let wv = if roc.len() >= MIN_SAMPLE {
        winsorize(&roc, WINSOR_TAIL)
    } else {
        roc.clone()
    };

    let (up, down) = if roc.len() >= MIN_SAMPLE {
        widths_for_alpha(&wv, center, FIXED_ALPHA)?
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    };

    let profit_width = up.max(Decimal::ZERO);
    let stop_width = down.max(Decimal::ZERO);

    if profit_width.is_zero() && stop_width.is_zero() {
        let eps = dec!(0.000001);
        return Ok(StopTargetWidths {
            profit_width: eps,
            stop_width: eps,
        });
    }
    Ok(StopTargetWidths {
        profit_width,
        stop_width,
    })
}

/// Robust asymmetric widths from Qn scale and medcouple skew:
/// `target = median + Qn + Qn * skew`, `stop = -(median - Qn + Qn * skew)`,
/// with the skew clamped to [-0.5, 0.5]. A negative skew (fatter left tail)
/// widens the stop. Optional anchors cap the target and floor the stop at
/// the empirical tails.
pub fn robust_stop_and_target(
    series: &OhlcSeries,
    period: usize,
    use_anchors: bool,
) -> Result<StopTargetWidths, IndicatorError> {
    let roc = roc_values(series, period)?;
    let center = median(&roc)?;
    let qn = qn_scale(&roc);
    let skew = medcouple_skew(&roc)?.clamp(dec!(-0.5), dec!(0.5));

    let raw_target = center + qn + qn * skew;
    let raw_stop = center - qn + qn * skew;

    let mut profit_width = raw_target;
    let mut stop_width = -raw_stop;

    if profit_width <= Decimal::ZERO {
        profit_width = center + qn;
    }
    if stop_width <= Decimal::ZERO {
        stop_width = center + qn;
    }

    if use_anchors && roc.len() >= MIN_SAMPLE {
        let wv = winsorize(&roc, WINSOR_TAIL);
        let q_lo = linear_interpolation_quantile(&wv, FIXED_ALPHA)?;
        let q_hi = linear_interpolation_quantile(&wv, 1.0 - FIXED_ALPHA)?;
        let target_cap = (q_hi - center).max(Decimal::ZERO);
        let stop_floor = (center - q_lo).max(Decimal::ZERO);

        if !target_cap.is_zero() && profit_width > target_cap {
            profit_width = target_cap;
        }
        if stop_width < stop_floor {
            stop_width = stop_floor;
        }
    }

    Ok(StopTargetWidths {
        profit_width,
        stop_width,
    })
}

/// Long-side widths under the chosen method.
pub fn long_stop_and_target(
    series: &OhlcSeries,
    period: usize,
    method: StopTargetMethod,
) -> Result<StopTargetWidths, IndicatorError> {
    let roc = roc_values(series, period)?;
    let center = median(&roc)?;
    let wv = if roc.len() >= MIN_SAMPLE {
        winsorize(&roc, WINSOR_TAIL)
    } else {
        roc.clone()
    };

    let eps = dec!(0.00000001);
    let (mut profit_width, mut stop_width) = match method {
        StopTargetMethod::TypicalDayFixedAlpha => widths_for_alpha(&wv, center, FIXED_ALPHA)?,
        StopTargetMethod::TypicalDayCalibratedAlpha => {
            let legacy = legacy_baseline_long_widths(series, period)?;
            let alpha = calibrate_alpha(&wv, center, legacy.profit_width, true)?;
            tracing::debug!(alpha, "calibrated typical-day quantile level");
            let (up, down) = widths_for_alpha(&wv, center, alpha)?;
            (up.min(legacy.profit_width), down)
        }
        StopTargetMethod::TypicalDayCalibratedAsymmetric => {
            let legacy = legacy_baseline_long_widths(series, period)?;
            let alpha_up = calibrate_alpha(&wv, center, legacy.profit_width, true)?;
            let alpha_down = calibrate_alpha(&wv, center, legacy.stop_width, false)?;
            let up = widths_for_alpha(&wv, center, alpha_up)?.0;
            let down = widths_for_alpha(&wv, center, alpha_down)?.1;
            (up.min(legacy.profit_width), down)
        }
    };

    if profit_width <= Decimal::ZERO {
        profit_width = eps;
    }
    if stop_width <= Decimal::ZERO {
        stop_width = eps;
    }
    Ok(StopTargetWidths {
        profit_width,
        stop_width,
    })
}

/// Short-side widths: the same central band with directions flipped, so the
/// profit is a typical down move, the stop a typical upside wiggle. The
/// short stop (mirror of the long target) is capped at the legacy width in
/// the calibrated modes.
pub fn short_stop_and_target(
    series: &OhlcSeries,
    period: usize,
    method: StopTargetMethod,
) -> Result<StopTargetWidths, IndicatorError> {
    let roc = roc_values(series, period)?;
    let center = median(&roc)?;
    let wv = if roc.len() >= MIN_SAMPLE {
        winsorize(&roc, WINSOR_TAIL)
    } else {
        roc.clone()
    };

    let eps = dec!(0.00000001);
    let (mut profit_width, mut stop_width) = match method {
        StopTargetMethod::TypicalDayFixedAlpha => {
            let (up, down) = widths_for_alpha(&wv, center, FIXED_ALPHA)?;
            (down, up)
        }
        StopTargetMethod::TypicalDayCalibratedAlpha => {
            let legacy = legacy_baseline_long_widths(series, period)?;
            let alpha = calibrate_alpha(&wv, center, legacy.profit_width, true)?;
            let (up, down) = widths_for_alpha(&wv, center, alpha)?;
            (down, up.min(legacy.profit_width))
        }
        StopTargetMethod::TypicalDayCalibratedAsymmetric => {
            let legacy = legacy_baseline_long_widths(series, period)?;
            let alpha_up = calibrate_alpha(&wv, center, legacy.profit_width, true)?;
            let alpha_down = calibrate_alpha(&wv, center, legacy.stop_width, false)?;
            let up = widths_for_alpha(&wv, center, alpha_up)?.0;
            let down = widths_for_alpha(&wv, center, alpha_down)?.1;
            (down, up.min(legacy.profit_width))
        }
    };

    if profit_width <= Decimal::ZERO {
        profit_width = eps;
    }
    if stop_width <= Decimal::ZERO {
        stop_width = eps;
    }
    Ok(StopTargetWidths {
        profit_width,
        stop_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_data::{OhlcBar, TimeFrame, VolumeUnit};
    use rust_decimal::prelude::FromPrimitive;

    /// Closes that alternate small up and down moves with occasional larger
    /// down days, so the distribution is left-skewed.
    fn sample_series() -> OhlcSeries {
        let mut closes = vec![100.0_f64];
        for i in 1..60 {
            let last = closes[i - 1];
            let step = match i % 7 {
                0 => -2.2,
                1 | 2 => 0.9,
                3 => -0.4,
                4 => 1.1,
                5 => -0.7,
                _ => 0.5,
            };
            closes.push(last + step);
        }

        let mut s = OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares);
        for (i, &c) in closes.iter().enumerate() {
            let date = NaiveDate::from_ymd_opt(2021, 1, 1)
                .unwrap()
                .checked_add_days(chrono::Days::new(i as u64))
                .unwrap();
            let c = Decimal::from_f64(c).unwrap();
            s.add_bar(
                OhlcBar::from_date(date, c, c + dec!(1), c - dec!(1), c, dec!(0), TimeFrame::Daily).unwrap(),
            )
            .unwrap();
        }
        s
    }

    #[test]
    fn typical_day_widths_are_positive() {
        let widths = quantile_stop_and_target(&sample_series(), 1).unwrap();
        assert!(widths.profit_width > Decimal::ZERO);
        assert!(widths.stop_width > Decimal::ZERO);
    }

    #[test]
    fn downside_skew_widens_the_long_stop() {
        let widths = quantile_stop_and_target(&sample_series(), 1).unwrap();
        // The fixture's left tail is fatter, so the stop side must be wider.
        assert!(widths.stop_width > widths.profit_width);
    }

    #[test]
    fn short_mirrors_long_at_fixed_alpha() {
        let series = sample_series();
        let long = long_stop_and_target(&series, 1, StopTargetMethod::TypicalDayFixedAlpha).unwrap();
        let short = short_stop_and_target(&series, 1, StopTargetMethod::TypicalDayFixedAlpha).unwrap();
        assert_eq!(long.profit_width, short.stop_width);
        assert_eq!(long.stop_width, short.profit_width);
    }

    #[test]
    fn calibrated_target_never_exceeds_legacy() {
        let series = sample_series();
        let legacy = legacy_baseline_long_widths(&series, 1).unwrap();
        let calibrated =
            long_stop_and_target(&series, 1, StopTargetMethod::TypicalDayCalibratedAlpha).unwrap();
        assert!(calibrated.profit_width <= legacy.profit_width);
    }

    #[test]
    fn robust_widths_finite_and_positive() {
        let widths = robust_stop_and_target(&sample_series(), 1, true).unwrap();
        assert!(widths.profit_width > Decimal::ZERO);
        assert!(widths.stop_width > Decimal::ZERO);
    }

    #[test]
    fn tiny_series_is_rejected() {
        let mut s = OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares);
        s.add_bar(
            OhlcBar::from_date(
                NaiveDate::from_ymd_opt(2021, 1, 4).unwrap(),
                dec!(100),
                dec!(101),
                dec!(99),
                dec!(100),
                dec!(0),
                TimeFrame::Daily,
            )
            .unwrap(),
        )
        .unwrap();
        assert!(quantile_stop_and_target(&s, 1).is_err());
    }
}
