use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::MarketDataError;
use crate::num::constants;
use crate::series::OhlcSeries;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityKind {
    Equity,
    Futures,
}

/// A tradable instrument: its series plus contract properties.
///
/// The series is shared immutably; permutation workers clone the `Security`
/// and swap in synthetic series without touching the original data.
#[derive(Debug, Clone)]
pub struct Security {
    symbol: String,
    name: String,
    kind: SecurityKind,
    big_point_value: Decimal,
    tick: Decimal,
    tick_div2: Decimal,
    series: Arc<OhlcSeries>,
}

impl Security {
    /// Equities trade in pennies with a contract multiplier of one.
    pub fn equity(symbol: impl Into<String>, name: impl Into<String>, series: Arc<OhlcSeries>) -> Self {
        let tick = constants::EQUITY_TICK;
        Security {
            symbol: symbol.into(),
            name: name.into(),
            kind: SecurityKind::Equity,
            big_point_value: constants::ONE,
            tick,
            tick_div2: tick / constants::TWO,
            series,
        }
    }

    pub fn futures(
        symbol: impl Into<String>,
        name: impl Into<String>,
        big_point_value: Decimal,
        tick: Decimal,
        series: Arc<OhlcSeries>,
    ) -> Self {
        Security {
            symbol: symbol.into(),
            name: name.into(),
            kind: SecurityKind::Futures,
            big_point_value,
            tick,
            tick_div2: tick / constants::TWO,
            series,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SecurityKind {
        self.kind
    }

    pub fn is_equity(&self) -> bool {
        self.kind == SecurityKind::Equity
    }

    pub fn big_point_value(&self) -> Decimal {
        self.big_point_value
    }

    pub fn tick(&self) -> Decimal {
        self.tick
    }

    /// Cached `tick / 2` for the rounding hot path.
    pub fn tick_div2(&self) -> Decimal {
        self.tick_div2
    }

    pub fn series(&self) -> &Arc<OhlcSeries> {
        &self.series
    }

    /// Same instrument, different data. Used for out-of-sample filtering and
    /// synthetic substitution.
    pub fn with_series(&self, series: Arc<OhlcSeries>) -> Security {
        let mut clone = self.clone();
        clone.series = series;
        clone
    }

    pub fn replace_series(&mut self, series: Arc<OhlcSeries>) {
        self.series = series;
    }
}

/// Symbol-keyed collection of securities. Each permutation worker owns a
/// cheap clone referencing shared series data.
#[derive(Debug, Clone, Default)]
pub struct Portfolio {
    name: String,
    securities: BTreeMap<String, Arc<Security>>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>) -> Self {
        Portfolio {
            name: name.into(),
            securities: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_security(&mut self, security: Security) -> Result<(), MarketDataError> {
        let symbol = security.symbol().to_string();
        if self.securities.contains_key(&symbol) {
            return Err(MarketDataError::DuplicateSymbol(symbol));
        }
        self.securities.insert(symbol, Arc::new(security));
        Ok(())
    }

    pub fn find(&self, symbol: &str) -> Option<&Arc<Security>> {
        self.securities.get(symbol)
    }

    pub fn len(&self) -> usize {
        self.securities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }

    pub fn securities(&self) -> impl Iterator<Item = &Arc<Security>> {
        self.securities.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.securities.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::{TimeFrame, VolumeUnit};
    use rust_decimal_macros::dec;

    fn empty_series() -> Arc<OhlcSeries> {
        Arc::new(OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares))
    }

    #[test]
    fn equity_defaults() {
        let sec = Security::equity("AAPL", "Apple Inc", empty_series());
        assert_eq!(sec.tick(), dec!(0.01));
        assert_eq!(sec.tick_div2(), dec!(0.005));
        assert_eq!(sec.big_point_value(), dec!(1));
        assert!(sec.is_equity());
    }

    #[test]
    fn futures_carry_explicit_values() {
        let sec = Security::futures("@ES", "E-mini S&P", dec!(50), dec!(0.25), empty_series());
        assert_eq!(sec.tick_div2(), dec!(0.125));
        assert_eq!(sec.kind(), SecurityKind::Futures);
    }

    #[test]
    fn portfolio_rejects_duplicate_symbol() {
        let mut p = Portfolio::new("test");
        p.add_security(Security::equity("MSFT", "Microsoft", empty_series()))
            .unwrap();
        let err = p.add_security(Security::equity("MSFT", "Microsoft again", empty_series()));
        assert!(matches!(err, Err(MarketDataError::DuplicateSymbol(_))));
        assert_eq!(p.len(), 1);
    }
}
