use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndicatorError {
    #[error("Empty input where values are required")]
    EmptyInput,

    #[error("Need at least {needed} values, got {got}")]
    TooFewValues { needed: usize, got: usize },

    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}
