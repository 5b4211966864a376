//! Order manager and position ledger.
//!
//! The broker owns the worker's portfolio clone, an order arena, the open
//! position units, and the closed-trade history. `process_pending_orders`
//! advances one bar: it fills or cancels the one-shot orders placed on the
//! previous bar and returns the fills as events.
//!
//! Fill rules: entries fill at the bar's open. Exits compare the bar range
//! against the unit's trigger prices; a bar that crosses both the target and
//! the stop fills the stop (conservative).

use std::collections::BTreeSet;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use market_data::num::round_to_tick;
use market_data::{OhlcBar, Portfolio, Security};

use crate::error::BacktestError;
use crate::orders::{OrderKind, OrderState, TradingOrder};
use crate::pattern::TradeDirection;
use crate::position::{ClosedTradeHistory, Position};

/// One executed fill, reported to the caller each processed bar.
#[derive(Debug, Clone, PartialEq)]
pub struct FillEvent {
    pub symbol: String,
    pub date: NaiveDate,
    pub price: Decimal,
    pub side: TradeDirection,
    pub is_entry: bool,
}

#[derive(Debug, Clone)]
pub struct StrategyBroker {
    portfolio: Portfolio,
    orders: Vec<TradingOrder>,
    pending: Vec<usize>,
    open_units: std::collections::BTreeMap<String, Vec<Position>>,
    closed: ClosedTradeHistory,
}

impl StrategyBroker {
    pub fn new(portfolio: Portfolio) -> Self {
        StrategyBroker {
            portfolio,
            orders: Vec::new(),
            pending: Vec::new(),
            open_units: std::collections::BTreeMap::new(),
            closed: ClosedTradeHistory::new(),
        }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn closed_trades(&self) -> &ClosedTradeHistory {
        &self.closed
    }

    pub fn is_flat(&self, symbol: &str) -> bool {
        self.open_units.get(symbol).map_or(true, |u| u.is_empty())
    }

    pub fn is_long(&self, symbol: &str) -> bool {
        self.open_units
            .get(symbol)
            .and_then(|u| u.first())
            .map_or(false, |p| p.direction() == TradeDirection::Long)
    }

    pub fn is_short(&self, symbol: &str) -> bool {
        self.open_units
            .get(symbol)
            .and_then(|u| u.first())
            .map_or(false, |p| p.direction() == TradeDirection::Short)
    }

    pub fn open_units(&self, symbol: &str) -> &[Position] {
        self.open_units.get(symbol).map_or(&[], |u| u.as_slice())
    }

    fn submit(&mut self, order: TradingOrder) {
        self.orders.push(order);
        self.pending.push(self.orders.len() - 1);
    }

    pub fn enter_long_on_open(
        &mut self,
        symbol: &str,
        order_date: NaiveDate,
        volume: Decimal,
        profit_target_pct: Decimal,
        stop_loss_pct: Decimal,
    ) {
        self.submit(TradingOrder {
            symbol: symbol.to_string(),
            side: TradeDirection::Long,
            kind: OrderKind::MarketOnOpen {
                profit_target_pct,
                stop_loss_pct,
            },
            volume,
            order_date,
            state: OrderState::Pending,
            unit: None,
        });
    }

    pub fn enter_short_on_open(
        &mut self,
        symbol: &str,
        order_date: NaiveDate,
        volume: Decimal,
        profit_target_pct: Decimal,
        stop_loss_pct: Decimal,
    ) {
        self.submit(TradingOrder {
            symbol: symbol.to_string(),
            side: TradeDirection::Short,
            kind: OrderKind::MarketOnOpen {
                profit_target_pct,
                stop_loss_pct,
            },
            volume,
            order_date,
            state: OrderState::Pending,
            unit: None,
        });
    }

    /// Profit-target exit for one open unit at its limit price.
    pub fn exit_unit_at_limit(&mut self, symbol: &str, order_date: NaiveDate, unit: usize, trigger: Decimal) {
        if let Some(position) = self.open_units.get(symbol).and_then(|u| u.get(unit)) {
            self.submit(TradingOrder {
                symbol: symbol.to_string(),
                side: position.direction(),
                kind: OrderKind::LimitExit { trigger },
                volume: position.volume(),
                order_date,
                state: OrderState::Pending,
                unit: Some(unit),
            });
        }
    }

    /// Protective stop exit for one open unit.
    pub fn exit_unit_at_stop(&mut self, symbol: &str, order_date: NaiveDate, unit: usize, trigger: Decimal) {
        if let Some(position) = self.open_units.get(symbol).and_then(|u| u.get(unit)) {
            self.submit(TradingOrder {
                symbol: symbol.to_string(),
                side: position.direction(),
                kind: OrderKind::StopExit { trigger },
                volume: position.volume(),
                order_date,
                state: OrderState::Pending,
                unit: Some(unit),
            });
        }
    }

    /// Force-exit every open unit of a symbol at the next open.
    pub fn exit_all_at_market(&mut self, symbol: &str, order_date: NaiveDate) {
        if let Some(position) = self.open_units.get(symbol).and_then(|u| u.first()) {
            self.submit(TradingOrder {
                symbol: symbol.to_string(),
                side: position.direction(),
                kind: OrderKind::MarketExit,
                volume: position.volume(),
                order_date,
                state: OrderState::Pending,
                unit: None,
            });
        }
    }

    /// Advance one bar: count time-in-market, fill entries at the open,
    /// evaluate exits against the bar range, cancel unfilled one-shot
    /// exits, and move closed units into the trade history.
    ///
    /// A date the security has no bar for is benign: pending orders wait
    /// for the next bar with data.
    pub fn process_pending_orders(&mut self, date: NaiveDate) -> Result<Vec<FillEvent>, BacktestError> {
        let mut events = Vec::new();

        let mut symbols: BTreeSet<String> = self
            .pending
            .iter()
            .map(|&i| self.orders[i].symbol.clone())
            .collect();
        symbols.extend(self.open_units.keys().cloned());

        for symbol in symbols {
            let security: Security = match self.portfolio.find(&symbol) {
                Some(s) => (**s).clone(),
                None => return Err(BacktestError::UnknownSymbol(symbol)),
            };
            let Some(bar_index) = security.series().index_of_date(date) else {
                continue;
            };
            let bar = security
                .series()
                .bar(bar_index)
                .expect("index came from lookup")
                .clone();

            if let Some(units) = self.open_units.get_mut(&symbol) {
                for unit in units.iter_mut() {
                    unit.record_bar();
                }
            }

            self.fill_entries(&symbol, &security, &bar, date, &mut events);
            self.fill_market_exits(&symbol, &bar, date, &mut events);
            self.fill_target_and_stop_exits(&symbol, &bar, date, &mut events);
            self.cancel_stale_exits(&symbol);

            if let Some(units) = self.open_units.get_mut(&symbol) {
                for unit in drain_closed(units) {
                    self.closed.push(unit);
                }
            }
        }

        self.pending.retain(|&i| self.orders[i].is_pending());
        Ok(events)
    }

    fn fill_entries(
        &mut self,
        symbol: &str,
        security: &Security,
        bar: &OhlcBar,
        date: NaiveDate,
        events: &mut Vec<FillEvent>,
    ) {
        let hundred = dec!(100);
        for &order_index in &self.pending.clone() {
            let order = &self.orders[order_index];
            if order.symbol != symbol || !order.is_pending() {
                continue;
            }
            let OrderKind::MarketOnOpen {
                profit_target_pct,
                stop_loss_pct,
            } = order.kind
            else {
                continue;
            };

            let fill = bar.open();
            let (target, stop) = match order.side {
                TradeDirection::Long => (
                    fill * (Decimal::ONE + profit_target_pct / hundred),
                    fill * (Decimal::ONE - stop_loss_pct / hundred),
                ),
                TradeDirection::Short => (
                    fill * (Decimal::ONE - profit_target_pct / hundred),
                    fill * (Decimal::ONE + stop_loss_pct / hundred),
                ),
            };
            let target = round_to_tick(target, security.tick(), security.tick_div2());
            let stop = round_to_tick(stop, security.tick(), security.tick_div2());

            let position = Position::open(symbol, order.side, date, fill, order.volume, target, stop);
            self.open_units.entry(symbol.to_string()).or_default().push(position);

            events.push(FillEvent {
                symbol: symbol.to_string(),
                date,
                price: fill,
                side: order.side,
                is_entry: true,
            });
            self.orders[order_index].state = OrderState::Filled;
        }
    }

    fn fill_market_exits(
        &mut self,
        symbol: &str,
        bar: &OhlcBar,
        date: NaiveDate,
        events: &mut Vec<FillEvent>,
    ) {
        for &order_index in &self.pending.clone() {
            let order = &self.orders[order_index];
            if order.symbol != symbol || !order.is_pending() || order.kind != OrderKind::MarketExit {
                continue;
            }
            let side = order.side;
            if let Some(units) = self.open_units.get_mut(symbol) {
                for unit in units.iter_mut().filter(|u| !u.is_closed()) {
                    unit.close(date, bar.open());
                    events.push(FillEvent {
                        symbol: symbol.to_string(),
                        date,
                        price: bar.open(),
                        side,
                        is_entry: false,
                    });
                }
            }
            self.orders[order_index].state = OrderState::Filled;
        }
    }

    fn fill_target_and_stop_exits(
        &mut self,
        symbol: &str,
        bar: &OhlcBar,
        date: NaiveDate,
        events: &mut Vec<FillEvent>,
    ) {
        // Pair this bar's limit/stop orders by the unit they cover.
        let mut per_unit: std::collections::BTreeMap<usize, (Option<usize>, Option<usize>)> =
            std::collections::BTreeMap::new();
        for &order_index in &self.pending {
            let order = &self.orders[order_index];
            if order.symbol != symbol || !order.is_pending() {
                continue;
            }
            match (order.kind, order.unit) {
                (OrderKind::LimitExit { .. }, Some(unit)) => {
                    per_unit.entry(unit).or_default().0 = Some(order_index);
                }
                (OrderKind::StopExit { .. }, Some(unit)) => {
                    per_unit.entry(unit).or_default().1 = Some(order_index);
                }
                _ => {}
            }
        }

        for (unit, (limit_order, stop_order)) in per_unit {
            let Some(position) = self.open_units.get_mut(symbol).and_then(|u| u.get_mut(unit)) else {
                continue;
            };
            if position.is_closed() {
                continue;
            }

            let limit_trigger = limit_order.and_then(|i| match self.orders[i].kind {
                OrderKind::LimitExit { trigger } => Some(trigger),
                _ => None,
            });
            let stop_trigger = stop_order.and_then(|i| match self.orders[i].kind {
                OrderKind::StopExit { trigger } => Some(trigger),
                _ => None,
            });

            let (hit_target, hit_stop) = match position.direction() {
                TradeDirection::Long => (
                    limit_trigger.map_or(false, |t| bar.high() >= t),
                    stop_trigger.map_or(false, |t| bar.low() <= t),
                ),
                TradeDirection::Short => (
                    limit_trigger.map_or(false, |t| bar.low() <= t),
                    stop_trigger.map_or(false, |t| bar.high() >= t),
                ),
            };

            // A bar that crosses both fills the stop.
            let fill = if hit_stop {
                stop_order.map(|i| (i, stop_trigger.expect("stop order has a trigger")))
            } else if hit_target {
                limit_order.map(|i| (i, limit_trigger.expect("limit order has a trigger")))
            } else {
                None
            };

            if let Some((order_index, price)) = fill {
                let side = position.direction();
                position.close(date, price);
                self.orders[order_index].state = OrderState::Filled;
                events.push(FillEvent {
                    symbol: symbol.to_string(),
                    date,
                    price,
                    side,
                    is_entry: false,
                });
            }
        }
    }

    /// Exit orders are one-shot: anything still pending for this symbol
    /// after its bar was evaluated is dead. The strategy re-issues exits
    /// from current position state on the next bar.
    fn cancel_stale_exits(&mut self, symbol: &str) {
        for &order_index in &self.pending {
            let order = &mut self.orders[order_index];
            if order.symbol == symbol && order.is_pending() && order.is_exit() {
                order.state = OrderState::Canceled;
            }
        }
    }
}

fn drain_closed(units: &mut Vec<Position>) -> Vec<Position> {
    let mut closed = Vec::new();
    let mut i = 0;
    while i < units.len() {
        if units[i].is_closed() {
            closed.push(units.remove(i));
        } else {
            i += 1;
        }
    }
    closed
}
