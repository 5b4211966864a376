use thiserror::Error;

use market_data::MarketDataError;

#[derive(Error, Debug)]
pub enum ResamplingError {
    #[error("Series too short for resampling: {0}")]
    SeriesTooShort(String),

    #[error("Labels length {labels} does not match data length {data}")]
    LabelSizeMismatch { labels: usize, data: usize },

    #[error("Empty regime labels")]
    EmptyLabels,

    #[error("Expected {expected} regime weights, got {got}")]
    WeightCountMismatch { expected: usize, got: usize },

    #[error("Negative regime weight {0}")]
    NegativeWeight(f64),

    #[error("Regime weights sum to zero")]
    ZeroWeightSum,

    #[error("Vectors of mismatched length in joint shuffle")]
    JointShuffleMismatch,

    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}
