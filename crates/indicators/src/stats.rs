//! Order statistics over decimal vectors: medians, quantiles, winsorization,
//! dispersion. All functions are pure; inputs are borrowed and never mutated.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use market_data::num::to_f64;

use crate::error::IndicatorError;

/// Median of a vector. Even lengths average the middle pair.
pub fn median(values: &[Decimal]) -> Result<Decimal, IndicatorError> {
    if values.is_empty() {
        return Err(IndicatorError::EmptyInput);
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 1 {
        Ok(sorted[n / 2])
    } else {
        Ok((sorted[n / 2 - 1] + sorted[n / 2]) / dec!(2))
    }
}

/// Median of an already sorted slice.
pub(crate) fn median_of_sorted(sorted: &[Decimal]) -> Result<Decimal, IndicatorError> {
    if sorted.is_empty() {
        return Err(IndicatorError::EmptyInput);
    }
    let n = sorted.len();
    if n % 2 == 1 {
        Ok(sorted[n / 2])
    } else {
        Ok((sorted[n / 2 - 1] + sorted[n / 2]) / dec!(2))
    }
}

/// Quantile with linear interpolation between the two neighboring order
/// statistics at rank `q * (n - 1)`. Selection-based; no full sort.
pub fn linear_interpolation_quantile(values: &[Decimal], q: f64) -> Result<Decimal, IndicatorError> {
    if values.is_empty() {
        return Err(IndicatorError::EmptyInput);
    }
    let q = q.clamp(0.0, 1.0);
    let n = values.len();
    let rank = q * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;

    let mut work = values.to_vec();
    let (_, lo_value, rest) = work.select_nth_unstable(lo);
    let lo_value = *lo_value;
    if hi == lo {
        return Ok(lo_value);
    }
    // The hi-th order statistic is the minimum of the partition above lo.
    let hi_value = rest
        .iter()
        .min()
        .copied()
        .ok_or(IndicatorError::EmptyInput)?;

    let frac = Decimal::from_f64(rank - lo as f64).unwrap_or_default();
    Ok(lo_value + (hi_value - lo_value) * frac)
}

/// Winsorize a copy: values below the tau-quantile are raised to it, values
/// above the (1-tau)-quantile lowered to it. Tail cutpoints use nearest rank
/// on `(n - 1) * p`. `tau` is clamped to [0, 0.25]; zero is the identity.
pub fn winsorize(values: &[Decimal], tau: f64) -> Vec<Decimal> {
    let tau = tau.clamp(0.0, 0.25);
    if values.is_empty() || tau == 0.0 {
        return values.to_vec();
    }
    let n = values.len();

    let kth_value = |p: f64| -> Decimal {
        let rank = (p * (n - 1) as f64).round() as usize;
        let rank = rank.min(n - 1);
        let mut work = values.to_vec();
        let (_, value, _) = work.select_nth_unstable(rank);
        *value
    };

    let lo = kth_value(tau);
    let hi = kth_value(1.0 - tau);

    values
        .iter()
        .map(|&x| {
            if x < lo {
                lo
            } else if x > hi {
                hi
            } else {
                x
            }
        })
        .collect()
}

/// Population standard deviation. Empty input yields zero.
pub fn standard_deviation(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    let n = values.len() as f64;
    let as_f64: Vec<f64> = values.iter().map(|&v| to_f64(v)).collect();
    let mean = as_f64.iter().sum::<f64>() / n;
    let variance = as_f64.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Decimal::from_f64(variance.sqrt()).unwrap_or_default()
}

/// Median absolute deviation scaled by 1.4826 for consistency with sigma
/// under normality.
pub fn median_absolute_deviation(values: &[Decimal]) -> Result<Decimal, IndicatorError> {
    let center = median(values)?;
    let deviations: Vec<Decimal> = values.iter().map(|&v| (v - center).abs()).collect();
    Ok(dec!(1.4826) * median(&deviations)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_of(values: &[f64]) -> Vec<Decimal> {
        values.iter().map(|&v| Decimal::from_f64(v).unwrap()).collect()
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&vec_of(&[3.0, 1.0, 2.0])).unwrap(), dec!(2));
        assert_eq!(median(&vec_of(&[4.0, 1.0, 2.0, 3.0])).unwrap(), dec!(2.5));
        assert!(median(&[]).is_err());
    }

    #[test]
    fn quantile_is_sort_invariant() {
        let sorted = vec_of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let shuffled = vec_of(&[5.0, 1.0, 4.0, 2.0, 3.0]);
        for q in [0.0, 0.1, 0.25, 0.5, 0.77, 1.0] {
            assert_eq!(
                linear_interpolation_quantile(&sorted, q).unwrap(),
                linear_interpolation_quantile(&shuffled, q).unwrap(),
                "q = {q}"
            );
        }
    }

    #[test]
    fn quantile_endpoints_are_min_and_max() {
        let v = vec_of(&[9.0, 2.0, 7.0, 4.0]);
        assert_eq!(linear_interpolation_quantile(&v, 0.0).unwrap(), dec!(2));
        assert_eq!(linear_interpolation_quantile(&v, 1.0).unwrap(), dec!(9));
    }

    #[test]
    fn quantile_interpolates_between_ranks() {
        let v = vec_of(&[1.0, 2.0, 3.0, 4.0]);
        // rank = 0.5 * 3 = 1.5 → halfway between 2 and 3
        assert_eq!(linear_interpolation_quantile(&v, 0.5).unwrap(), dec!(2.5));
    }

    #[test]
    fn winsorize_caps_tails() {
        let v = vec_of(&[
            -50.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0,
            16.0, 17.0, 18.0, 100.0,
        ]);
        let w = winsorize(&v, 0.10);
        let lo = linear_interpolation_quantile(&v, 0.10).unwrap();
        let hi = linear_interpolation_quantile(&v, 0.90).unwrap();
        assert!(w.iter().min().unwrap() >= &lo);
        assert!(w.iter().max().unwrap() <= &hi);
    }

    #[test]
    fn winsorize_zero_tau_is_identity() {
        let v = vec_of(&[5.0, 1.0, 3.0]);
        assert_eq!(winsorize(&v, 0.0), v);
    }

    #[test]
    fn winsorize_clamps_tau() {
        let v = vec_of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // tau beyond 0.25 behaves like 0.25
        assert_eq!(winsorize(&v, 0.9), winsorize(&v, 0.25));
    }

    #[test]
    fn standard_deviation_population() {
        let v = vec_of(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let sigma = to_f64(standard_deviation(&v));
        assert!((sigma - 2.0).abs() < 1e-9);
        assert_eq!(standard_deviation(&[]), Decimal::ZERO);
    }

    #[test]
    fn mad_of_symmetric_data() {
        let v = vec_of(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        // median = 3, deviations = [2,1,0,1,2], median = 1
        assert_eq!(median_absolute_deviation(&v).unwrap(), dec!(1.4826));
    }
}
