use thiserror::Error;

use market_data::MarketDataError;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("No strategies have been added to the backtester")]
    NoStrategies,

    #[error("Unsupported time frame for backtesting: {0}")]
    UnsupportedTimeFrame(String),

    #[error("Pattern '{name}' references {offset} bars back with only {available} bars processed")]
    OffsetBeyondHistory {
        name: String,
        offset: usize,
        available: u32,
    },

    #[error("Symbol {0} not found in the strategy portfolio")]
    UnknownSymbol(String),

    #[error("No closed-trade statistic is defined for an empty trade history")]
    EmptyTradeHistory,

    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}
