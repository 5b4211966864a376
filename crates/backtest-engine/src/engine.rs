//! The backtest loop.
//!
//! Time moves forward one bar at a time under a `TimeStepper`. Each step
//! processes the previous bar as the order date and fills at the current
//! bar, so signals always execute at the next bar's open. With several date
//! ranges, every non-final range force-exits all positions on its last bar.

use std::collections::BTreeMap;

use chrono::{Datelike, Days, NaiveDate, Weekday};
use rust_decimal::Decimal;

use market_data::{DateRange, Portfolio, Security, TimeFrame};

use crate::broker::StrategyBroker;
use crate::error::BacktestError;
use crate::position::ClosedTradeHistory;
use crate::strategy::Strategy;

/// Calendar stepping for the simulation clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeStepper {
    /// Weekdays only.
    Daily,
    /// Calendar weeks, anchored on Monday.
    Weekly,
    /// Calendar months, anchored on the first.
    Monthly,
}

fn next_weekday(mut d: NaiveDate) -> NaiveDate {
    loop {
        d = d.succ_opt().expect("date arithmetic in range");
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            return d;
        }
    }
}

fn previous_weekday(mut d: NaiveDate) -> NaiveDate {
    loop {
        d = d.pred_opt().expect("date arithmetic in range");
        if !matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            return d;
        }
    }
}

fn first_of_week(d: NaiveDate) -> NaiveDate {
    d - Days::new(d.weekday().num_days_from_monday() as u64)
}

fn first_of_month(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).expect("first of month is valid")
}

fn next_month(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is valid")
}

fn previous_month(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 1 {
        (d.year() - 1, 12)
    } else {
        (d.year(), d.month() - 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of month is valid")
}

impl TimeStepper {
    pub fn from_time_frame(time_frame: TimeFrame) -> Result<Self, BacktestError> {
        match time_frame {
            TimeFrame::Daily => Ok(TimeStepper::Daily),
            TimeFrame::Weekly => Ok(TimeStepper::Weekly),
            TimeFrame::Monthly => Ok(TimeStepper::Monthly),
            other => Err(BacktestError::UnsupportedTimeFrame(other.name().to_string())),
        }
    }

    pub fn next_date(&self, d: NaiveDate) -> NaiveDate {
        match self {
            TimeStepper::Daily => next_weekday(d),
            TimeStepper::Weekly => d + Days::new(7),
            TimeStepper::Monthly => next_month(d),
        }
    }

    pub fn previous_date(&self, d: NaiveDate) -> NaiveDate {
        match self {
            TimeStepper::Daily => previous_weekday(d),
            TimeStepper::Weekly => d - Days::new(7),
            TimeStepper::Monthly => previous_month(d),
        }
    }

    /// Snap a raw range onto the stepper's grid: daily ranges move weekend
    /// endpoints inward, weekly and monthly ranges anchor both ends.
    fn align(&self, range: &DateRange) -> Result<DateRange, BacktestError> {
        let (first, last) = match self {
            TimeStepper::Daily => {
                let mut first = range.first_date();
                let mut last = range.last_date();
                if matches!(first.weekday(), Weekday::Sat | Weekday::Sun) {
                    first = next_weekday(first);
                }
                if matches!(last.weekday(), Weekday::Sat | Weekday::Sun) {
                    last = previous_weekday(last);
                }
                (first, last)
            }
            TimeStepper::Weekly => (first_of_week(range.first_date()), first_of_week(range.last_date())),
            TimeStepper::Monthly => (first_of_month(range.first_date()), first_of_month(range.last_date())),
        };
        Ok(DateRange::new(first, last)?)
    }
}

struct StrategyInstance {
    strategy: Box<dyn Strategy>,
    broker: StrategyBroker,
    bar_numbers: BTreeMap<String, u32>,
}

/// Drives strategies over one or more date ranges.
pub struct BackTester {
    stepper: TimeStepper,
    ranges: Vec<DateRange>,
    strategies: Vec<StrategyInstance>,
}

impl BackTester {
    pub fn new(stepper: TimeStepper, range: DateRange) -> Result<Self, BacktestError> {
        let mut bt = BackTester {
            stepper,
            ranges: Vec::new(),
            strategies: Vec::new(),
        };
        bt.add_date_range(range)?;
        Ok(bt)
    }

    pub fn add_date_range(&mut self, range: DateRange) -> Result<(), BacktestError> {
        self.ranges.push(self.stepper.align(&range)?);
        Ok(())
    }

    pub fn stepper(&self) -> TimeStepper {
        self.stepper
    }

    pub fn ranges(&self) -> &[DateRange] {
        &self.ranges
    }

    /// Date configuration only; strategies are populated by each worker.
    pub fn clone_template(&self) -> BackTester {
        BackTester {
            stepper: self.stepper,
            ranges: self.ranges.clone(),
            strategies: Vec::new(),
        }
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>, portfolio: Portfolio) {
        self.strategies.push(StrategyInstance {
            strategy,
            broker: StrategyBroker::new(portfolio),
            bar_numbers: BTreeMap::new(),
        });
    }

    pub fn num_strategies(&self) -> usize {
        self.strategies.len()
    }

    /// Closed trades of the first strategy; the permutation policies run
    /// single-strategy backtests.
    pub fn closed_trades(&self) -> Result<&ClosedTradeHistory, BacktestError> {
        self.strategies
            .first()
            .map(|s| s.broker.closed_trades())
            .ok_or(BacktestError::NoStrategies)
    }

    pub fn num_closed_trades(&self) -> usize {
        self.strategies
            .first()
            .map_or(0, |s| s.broker.closed_trades().num_trades())
    }

    /// Bars the first strategy had a chance to act on, summed over its
    /// securities. The normalized-return statistic scales by this.
    pub fn trading_opportunities(&self) -> u32 {
        self.strategies
            .first()
            .map_or(0, |s| s.bar_numbers.values().sum())
    }

    pub fn run(&mut self) -> Result<(), BacktestError> {
        if self.strategies.is_empty() {
            return Err(BacktestError::NoStrategies);
        }

        tracing::trace!(
            strategies = self.strategies.len(),
            ranges = self.ranges.len(),
            "starting backtest"
        );
        let multiple_ranges = self.ranges.len() > 1;
        let ranges = self.ranges.clone();

        for (range_index, range) in ranges.iter().enumerate() {
            let mut dates = Vec::new();
            let mut d = range.first_date();
            loop {
                dates.push(d);
                if d >= range.last_date() {
                    break;
                }
                d = self.stepper.next_date(d);
            }

            let bar_before_end = self.stepper.previous_date(range.last_date());
            let force_exit_range = multiple_ranges && range_index + 1 < ranges.len();

            for i in 1..dates.len() {
                let current = dates[i];
                let order_date = dates[i - 1];

                for instance in &mut self.strategies {
                    let securities: Vec<Security> = instance
                        .broker
                        .portfolio()
                        .securities()
                        .map(|s| (**s).clone())
                        .collect();

                    for security in &securities {
                        if force_exit_range && current == bar_before_end {
                            Self::close_all_positions(instance, security, order_date);
                        } else {
                            Self::process_strategy_bar(instance, security, order_date)?;
                        }
                        instance.broker.process_pending_orders(current)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn process_strategy_bar(
        instance: &mut StrategyInstance,
        security: &Security,
        order_date: NaiveDate,
    ) -> Result<(), BacktestError> {
        // No bar today is benign; the clock just moves on.
        if security.series().index_of_date(order_date).is_none() {
            return Ok(());
        }

        let symbol = security.symbol().to_string();
        let bar_number = {
            let counter = instance.bar_numbers.entry(symbol.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        if !instance.broker.is_flat(&symbol) {
            instance.strategy.on_exit(&mut instance.broker, security, order_date)?;
        }
        instance
            .strategy
            .on_entry(&mut instance.broker, security, bar_number, order_date)
    }

    fn close_all_positions(instance: &mut StrategyInstance, security: &Security, order_date: NaiveDate) {
        let symbol = security.symbol().to_string();
        if security.series().index_of_date(order_date).is_some() {
            let counter = instance.bar_numbers.entry(symbol.clone()).or_insert(0);
            *counter += 1;
        }
        instance.broker.exit_all_at_market(&symbol, order_date);
    }

    /// Total volume currently committed, summed over open units of the
    /// first strategy. Zero means flat everywhere.
    pub fn open_volume(&self) -> Decimal {
        self.strategies.first().map_or(Decimal::ZERO, |instance| {
            instance
                .broker
                .portfolio()
                .symbols()
                .map(|sym| {
                    instance
                        .broker
                        .open_units(sym)
                        .iter()
                        .map(|p| p.volume())
                        .sum::<Decimal>()
                })
                .sum()
        })
    }
}
