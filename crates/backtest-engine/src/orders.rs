//! Trading orders.
//!
//! Orders live in an arena owned by the broker; cross-references (which
//! position an exit belongs to) are stable indices, not pointers. Every
//! order is one-shot: placed on its order date, eligible against the next
//! bar with data, then filled or canceled.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::pattern::TradeDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Filled,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderKind {
    /// Entry at the next bar's open.
    MarketOnOpen {
        profit_target_pct: Decimal,
        stop_loss_pct: Decimal,
    },
    /// Exit all covered units at the open of the next bar (forced exits).
    MarketExit,
    /// Profit-target exit at a limit price.
    LimitExit { trigger: Decimal },
    /// Protective stop exit.
    StopExit { trigger: Decimal },
}

#[derive(Debug, Clone)]
pub struct TradingOrder {
    pub symbol: String,
    pub side: TradeDirection,
    pub kind: OrderKind,
    pub volume: Decimal,
    pub order_date: NaiveDate,
    pub state: OrderState,
    /// Position unit an exit order covers; `None` for entries and
    /// exit-everything orders.
    pub unit: Option<usize>,
}

impl TradingOrder {
    pub fn is_entry(&self) -> bool {
        matches!(self.kind, OrderKind::MarketOnOpen { .. })
    }

    pub fn is_exit(&self) -> bool {
        !self.is_entry()
    }

    pub fn is_pending(&self) -> bool {
        self.state == OrderState::Pending
    }
}
