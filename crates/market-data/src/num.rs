//! Decimal helpers shared by the whole workspace: rounding policies, tick
//! rounding, scale conversion, and checked arithmetic that reports overflow
//! instead of wrapping.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::MarketDataError;

/// Commonly used decimal constants.
pub mod constants {
    use super::*;

    pub const ZERO: Decimal = Decimal::ZERO;
    pub const ONE: Decimal = Decimal::ONE;
    pub const TWO: Decimal = Decimal::TWO;
    pub const ONE_HUNDRED: Decimal = Decimal::ONE_HUNDRED;

    /// Default false discovery rate for Benjamini-Hochberg style corrections.
    pub const DEFAULT_FDR: Decimal = dec!(0.20);

    /// Significance threshold used by the permutation tests.
    pub const SIGNIFICANT_P_VALUE: Decimal = dec!(0.05);

    /// Minimum price increment for equities.
    pub const EQUITY_TICK: Decimal = dec!(0.01);
}

/// How to resolve a value exactly halfway between two representable results.
///
/// Half-up and half-down are stated for the positive operands this crate
/// works with (prices and their ratios), where they coincide with
/// away-from-zero and toward-zero midpoint handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingPolicy {
    #[default]
    HalfAwayFromZero,
    HalfEven,
    HalfUp,
    HalfDown,
    Floor,
    Ceiling,
    Truncate,
}

impl RoundingPolicy {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingPolicy::HalfAwayFromZero => RoundingStrategy::MidpointAwayFromZero,
            RoundingPolicy::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingPolicy::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            RoundingPolicy::HalfDown => RoundingStrategy::MidpointTowardZero,
            RoundingPolicy::Floor => RoundingStrategy::ToNegativeInfinity,
            RoundingPolicy::Ceiling => RoundingStrategy::ToPositiveInfinity,
            RoundingPolicy::Truncate => RoundingStrategy::ToZero,
        }
    }
}

/// Round `value` to `scale` fractional digits under the given policy.
pub fn rescale(value: Decimal, scale: u32, policy: RoundingPolicy) -> Decimal {
    value.round_dp_with_strategy(scale, policy.strategy())
}

/// Round a price to the nearest multiple of `tick`.
///
/// `tick_div2` must be `tick / 2`; securities cache it so the hot path does
/// no division. The remainder below the lower tick boundary decides the
/// direction: below the midpoint rounds down, at or above rounds up.
pub fn round_to_tick(price: Decimal, tick: Decimal, tick_div2: Decimal) -> Decimal {
    if tick.is_zero() {
        return price;
    }
    let rem = price % tick;
    if rem < tick_div2 {
        price - rem
    } else {
        price - rem + tick
    }
}

/// Two-argument variant that computes `tick / 2` itself.
pub fn round_to_tick_simple(price: Decimal, tick: Decimal) -> Decimal {
    round_to_tick(price, tick, tick / constants::TWO)
}

/// Addition that surfaces overflow of the 96-bit mantissa as an error.
pub fn checked_add(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MarketDataError> {
    a.checked_add(b).ok_or(MarketDataError::Overflow(context))
}

pub fn checked_mul(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MarketDataError> {
    a.checked_mul(b).ok_or(MarketDataError::Overflow(context))
}

/// Division; zero divisor and overflow both fail.
pub fn checked_div(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MarketDataError> {
    if b.is_zero() {
        return Err(MarketDataError::DivisionByZero(context));
    }
    a.checked_div(b).ok_or(MarketDataError::Overflow(context))
}

/// Remainder; fails on a zero divisor.
pub fn checked_rem(a: Decimal, b: Decimal, context: &'static str) -> Result<Decimal, MarketDataError> {
    if b.is_zero() {
        return Err(MarketDataError::DivisionByZero(context));
    }
    a.checked_rem(b).ok_or(MarketDataError::Overflow(context))
}

/// Lossless parse of a plain decimal string (no exponent shenanigans).
pub fn parse_decimal(s: &str) -> Result<Decimal, MarketDataError> {
    Decimal::from_str_exact(s.trim()).map_err(|_| MarketDataError::DecimalParse(s.to_string()))
}

/// Lossy conversion for statistics code that works in f64.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Integer conversion under a rounding policy.
pub fn to_i64(value: Decimal, policy: RoundingPolicy) -> Result<i64, MarketDataError> {
    rescale(value, 0, policy)
        .to_i64()
        .ok_or(MarketDataError::Overflow("to_i64"))
}
