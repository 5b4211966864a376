//! Test-statistic extraction policies.
//!
//! Each policy turns a completed single-strategy backtest into one scalar.
//! A synthetic realization with fewer than the minimum closed trades scores
//! the lowest representable value: under the null it simply shows no effect,
//! and treating that as data rather than an error keeps a sweep alive.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use backtest_engine::BackTester;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestStatisticPolicy {
    /// Total compounded return across closed trades.
    CumulativeReturn,
    /// Median PAL profitability over a bootstrap of trade outcomes.
    PalProfitability,
    /// Win side shrunk and loss side inflated by one standard error each.
    PessimisticReturnRatio,
    /// Cumulative return scaled by sqrt(opportunities / bars-in-market).
    NormalizedReturn,
}

impl TestStatisticPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            TestStatisticPolicy::CumulativeReturn => "cumulative-return",
            TestStatisticPolicy::PalProfitability => "pal-profitability",
            TestStatisticPolicy::PessimisticReturnRatio => "pessimistic-return-ratio",
            TestStatisticPolicy::NormalizedReturn => "normalized-return",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cumulative-return" => Some(TestStatisticPolicy::CumulativeReturn),
            "pal-profitability" => Some(TestStatisticPolicy::PalProfitability),
            "pessimistic-return-ratio" => Some(TestStatisticPolicy::PessimisticReturnRatio),
            "normalized-return" => Some(TestStatisticPolicy::NormalizedReturn),
            _ => None,
        }
    }

    /// Closed trades a realization needs before its statistic means anything.
    pub fn min_trades(&self) -> usize {
        3
    }

    /// "No effect" score for under-traded null realizations.
    pub fn worst_case(&self) -> Decimal {
        Decimal::MIN
    }

    /// Extract the statistic from a completed backtest. The backtest must
    /// hold exactly one strategy.
    pub fn statistic(&self, backtester: &BackTester) -> Result<Decimal, ValidationError> {
        if backtester.num_strategies() != 1 {
            return Err(ValidationError::NotSingleStrategy(backtester.num_strategies()));
        }
        let history = backtester.closed_trades()?;

        match self {
            TestStatisticPolicy::CumulativeReturn => Ok(history.cumulative_return()),
            TestStatisticPolicy::PalProfitability => Ok(history.median_pal_profitability()?),
            TestStatisticPolicy::PessimisticReturnRatio => Ok(history.pessimistic_return_ratio()?),
            TestStatisticPolicy::NormalizedReturn => {
                let bars_in_market = history.num_bars_in_market();
                if bars_in_market == 0 {
                    return Err(ValidationError::InvalidStatistic(
                        "time in market is zero".into(),
                    ));
                }
                let opportunities = backtester.trading_opportunities() as f64;
                let ratio = opportunities.sqrt() / (bars_in_market as f64).sqrt();
                Ok(history.cumulative_return() * Decimal::from_f64(ratio).unwrap_or_default())
            }
        }
    }

    /// The statistic with the minimum-trade guard applied.
    pub fn guarded_statistic(&self, backtester: &BackTester) -> Result<Decimal, ValidationError> {
        if backtester.num_closed_trades() < self.min_trades() {
            return Ok(self.worst_case());
        }
        self.statistic(backtester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for policy in [
            TestStatisticPolicy::CumulativeReturn,
            TestStatisticPolicy::PalProfitability,
            TestStatisticPolicy::PessimisticReturnRatio,
            TestStatisticPolicy::NormalizedReturn,
        ] {
            assert_eq!(TestStatisticPolicy::from_name(policy.name()), Some(policy));
        }
        assert_eq!(TestStatisticPolicy::from_name("sharpe"), None);
    }

    #[test]
    fn every_policy_requires_three_trades() {
        assert_eq!(TestStatisticPolicy::CumulativeReturn.min_trades(), 3);
        assert_eq!(TestStatisticPolicy::NormalizedReturn.min_trades(), 3);
    }

    #[test]
    fn worst_case_sorts_below_everything() {
        let worst = TestStatisticPolicy::CumulativeReturn.worst_case();
        assert!(worst < Decimal::ZERO);
        assert!(worst < to_f64_roundtrip(-1000.0));
    }

    fn to_f64_roundtrip(v: f64) -> Decimal {
        Decimal::from_f64(v).unwrap()
    }
}
