//! Adaptive annualized volatility.
//!
//! A per-bar variance stream (chosen by policy) is exponentially averaged
//! with a smoothing factor that adapts to trend strength: strong trends
//! (high rolling R-squared) track new variance quickly, choppy tape smooths
//! harder.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use market_data::num::to_f64;
use market_data::{NumericSeries, OhlcBar, OhlcSeries};

use crate::error::IndicatorError;
use crate::trend::{percent_rank_series, rolling_r_squared_series};

/// Source of the per-bar variance contribution. Implementations return the
/// variance (not sigma) for one bar given the previous close.
pub trait VariancePolicy {
    fn daily_variance(bar: &OhlcBar, previous_close: Decimal) -> Result<Decimal, IndicatorError>;
}

/// Squared simple close-to-close return.
pub struct CloseToCloseVariance;

impl VariancePolicy for CloseToCloseVariance {
    fn daily_variance(bar: &OhlcBar, previous_close: Decimal) -> Result<Decimal, IndicatorError> {
        if previous_close.is_zero() {
            return Err(IndicatorError::DivisionByZero("close-to-close variance"));
        }
        let simple_return = bar.close() / previous_close - Decimal::ONE;
        Ok(simple_return * simple_return)
    }
}

/// Garman-Klass style range estimator anchored on the prior close:
/// `0.5 * ln(max(H, Cp)/min(L, Cp))^2 - (2 ln 2 - 1) * ln(C/Cp)^2`.
///
/// With this anchoring the range term dominates the close term, so the
/// expression is nonnegative for clean quotes; negative outputs indicate bad
/// data and are passed through for the caller to judge.
pub struct SimonsHlcVariance;

impl VariancePolicy for SimonsHlcVariance {
    fn daily_variance(bar: &OhlcBar, previous_close: Decimal) -> Result<Decimal, IndicatorError> {
        if previous_close <= Decimal::ZERO {
            return Err(IndicatorError::DivisionByZero("Simons HLC variance"));
        }
        let up = bar.high().max(previous_close);
        let down = bar.low().min(previous_close);

        let r_range = (to_f64(up) / to_f64(down)).ln();
        let r_close = (to_f64(bar.close()) / to_f64(previous_close)).ln();
        let variance = 0.5 * r_range * r_range - (2.0 * std::f64::consts::LN_2 - 1.0) * r_close * r_close;
        Ok(Decimal::from_f64(variance).unwrap_or_default())
    }
}

/// Annualized adaptive volatility series.
///
/// Per output bar: alpha = clamp(exp(-10 * (1 - r2)), 0.05, 0.5) from the
/// rolling R-squared of closes; the variance EMA is seeded with the first
/// window's variance; output is `sqrt(max(0, ema) * annualization)`.
pub fn adaptive_volatility_annualized_series<P: VariancePolicy>(
    series: &OhlcSeries,
    r_squared_period: usize,
    annualization_factor: f64,
) -> Result<NumericSeries, IndicatorError> {
    if r_squared_period < 2 {
        return Err(IndicatorError::InvalidParameter(
            "adaptive volatility r-squared period must be >= 2".into(),
        ));
    }

    let bars = series.bars();
    if bars.len() < r_squared_period {
        return Ok(NumericSeries::new(series.time_frame()));
    }

    let r_squared = rolling_r_squared_series(&series.close_series(), r_squared_period)?;
    let mut out = NumericSeries::with_capacity(series.time_frame(), r_squared.len());

    let base_index = r_squared_period - 1;
    let mut ema_variance = Decimal::ZERO;

    for (j, (timestamp, r2_value)) in r_squared.entries().iter().enumerate() {
        let i = base_index + j;
        let r2 = to_f64(*r2_value).clamp(0.0, 1.0);

        let alpha_raw = (-10.0 * (1.0 - r2)).exp().clamp(0.05, 0.5);
        let alpha = Decimal::from_f64(alpha_raw).unwrap_or_default();

        let variance_today = P::daily_variance(&bars[i], bars[i - 1].close())?;
        ema_variance = if j == 0 {
            variance_today
        } else {
            alpha * variance_today + (Decimal::ONE - alpha) * ema_variance
        };

        let annualized_sigma = (to_f64(ema_variance).max(0.0) * annualization_factor).sqrt();
        out.push(*timestamp, Decimal::from_f64(annualized_sigma).unwrap_or_default())
            .expect("r-squared timestamps are strictly increasing");
    }

    Ok(out)
}

/// Percent rank of the adaptive annualized volatility.
pub fn adaptive_volatility_percent_rank_series<P: VariancePolicy>(
    series: &OhlcSeries,
    r_squared_period: usize,
    percent_rank_period: usize,
    annualization_factor: f64,
) -> Result<NumericSeries, IndicatorError> {
    let vol = adaptive_volatility_annualized_series::<P>(series, r_squared_period, annualization_factor)?;
    percent_rank_series(&vol, percent_rank_period)
}
