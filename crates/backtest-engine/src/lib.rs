pub mod broker;
pub mod engine;
pub mod error;
pub mod orders;
pub mod pattern;
pub mod position;
pub mod strategy;


pub use broker::{FillEvent, StrategyBroker};
pub use engine::{BackTester, TimeStepper};
pub use error::BacktestError;
pub use orders::{OrderKind, OrderState, TradingOrder};
pub use pattern::{BarRef, PatternExpr, PriceField, PricePattern, TradeDirection};
pub use position::{ClosedTradeHistory, Position};
pub use strategy::{PatternStrategy, Strategy, StrategyOptions};
