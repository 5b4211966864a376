//! Trading strategies.
//!
//! A strategy is the small surface the backtester drives each bar: place
//! entry orders, re-issue exit orders for open units, size orders, and clone
//! itself for a permutation worker. `PatternStrategy` trades a set of
//! compiled price patterns, long and/or short.

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use market_data::Security;

use crate::broker::StrategyBroker;
use crate::error::BacktestError;
use crate::pattern::{PricePattern, TradeDirection};

#[derive(Debug, Clone, Copy)]
pub struct StrategyOptions {
    pub pyramiding_enabled: bool,
    pub max_pyramid_units: u32,
}

impl Default for StrategyOptions {
    fn default() -> Self {
        StrategyOptions {
            pyramiding_enabled: false,
            max_pyramid_units: 1,
        }
    }
}

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Called once per bar with data. `bar_number` is the count of processed
    /// bars for this security, used to gate patterns that look further back
    /// than the available history.
    fn on_entry(
        &self,
        broker: &mut StrategyBroker,
        security: &Security,
        bar_number: u32,
        date: NaiveDate,
    ) -> Result<(), BacktestError>;

    /// Called when the position is not flat; re-issues the one-shot exit
    /// orders for each open unit.
    fn on_exit(
        &self,
        broker: &mut StrategyBroker,
        security: &Security,
        date: NaiveDate,
    ) -> Result<(), BacktestError>;

    fn size_for_order(&self, security: &Security) -> Decimal;

    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Trades compiled price patterns: the first pattern that fires on a bar
/// places a market-on-open entry carrying its own target and stop
/// percentages. When pyramiding is enabled, additional same-direction
/// entries may stack up to the configured unit limit, each with independent
/// exits.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    name: String,
    patterns: Vec<Arc<PricePattern>>,
    options: StrategyOptions,
}

impl PatternStrategy {
    pub fn new(name: impl Into<String>, patterns: Vec<Arc<PricePattern>>, options: StrategyOptions) -> Self {
        PatternStrategy {
            name: name.into(),
            patterns,
            options,
        }
    }

    pub fn single(name: impl Into<String>, pattern: Arc<PricePattern>) -> Self {
        PatternStrategy::new(name, vec![pattern], StrategyOptions::default())
    }

    pub fn patterns(&self) -> &[Arc<PricePattern>] {
        &self.patterns
    }

    pub fn options(&self) -> StrategyOptions {
        self.options
    }

    pub fn max_bars_back(&self) -> usize {
        self.patterns.iter().map(|p| p.max_bars_back()).max().unwrap_or(0)
    }

    fn place_entry(
        &self,
        broker: &mut StrategyBroker,
        security: &Security,
        pattern: &PricePattern,
        date: NaiveDate,
    ) {
        let size = self.size_for_order(security);
        match pattern.direction() {
            TradeDirection::Long => broker.enter_long_on_open(
                security.symbol(),
                date,
                size,
                pattern.profit_target_pct(),
                pattern.stop_loss_pct(),
            ),
            TradeDirection::Short => broker.enter_short_on_open(
                security.symbol(),
                date,
                size,
                pattern.profit_target_pct(),
                pattern.stop_loss_pct(),
            ),
        }
    }
}

impl Strategy for PatternStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_entry(
        &self,
        broker: &mut StrategyBroker,
        security: &Security,
        bar_number: u32,
        date: NaiveDate,
    ) -> Result<(), BacktestError> {
        let symbol = security.symbol();

        // Entry gates by position state: flat trades anything, an open
        // position only stacks same-direction patterns and only while
        // pyramiding allows another unit.
        let direction_filter = if broker.is_flat(symbol) {
            None
        } else {
            let units = broker.open_units(symbol).len() as u32;
            if !self.options.pyramiding_enabled || units >= self.options.max_pyramid_units {
                return Ok(());
            }
            Some(if broker.is_long(symbol) {
                TradeDirection::Long
            } else {
                TradeDirection::Short
            })
        };

        let Some(index) = security.series().index_of_date(date) else {
            return Ok(());
        };

        for pattern in &self.patterns {
            if let Some(direction) = direction_filter {
                if pattern.direction() != direction {
                    continue;
                }
            }
            if bar_number <= pattern.max_bars_back() as u32 {
                continue;
            }
            if pattern.evaluate(security.series(), index) {
                self.place_entry(broker, security, pattern, date);
                break;
            }
        }
        Ok(())
    }

    fn on_exit(
        &self,
        broker: &mut StrategyBroker,
        security: &Security,
        date: NaiveDate,
    ) -> Result<(), BacktestError> {
        let symbol = security.symbol();
        let exits: Vec<(usize, Decimal, Decimal)> = broker
            .open_units(symbol)
            .iter()
            .enumerate()
            .map(|(unit, p)| (unit, p.profit_target_price(), p.stop_price()))
            .collect();

        for (unit, target, stop) in exits {
            broker.exit_unit_at_limit(symbol, date, unit, target);
            broker.exit_unit_at_stop(symbol, date, unit, stop);
        }
        Ok(())
    }

    /// One share for equities, one contract for futures.
    fn size_for_order(&self, _security: &Security) -> Decimal {
        Decimal::ONE
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
