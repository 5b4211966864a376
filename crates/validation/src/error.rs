use thiserror::Error;

use backtest_engine::BacktestError;
use market_data::MarketDataError;
use resampling::ResamplingError;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Number of permutations cannot be zero")]
    ZeroPermutations,

    #[error("No strategies supplied for validation")]
    NoStrategies,

    #[error("Statistic requires a single-strategy backtest, found {0}")]
    NotSingleStrategy(usize),

    #[error("Cannot compute statistic: {0}")]
    InvalidStatistic(String),

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),

    #[error(transparent)]
    Backtest(#[from] BacktestError),

    #[error(transparent)]
    Resampling(#[from] ResamplingError),

    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}
