use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("Invalid bar on {0}: {1}")]
    InvalidBar(NaiveDateTime, String),

    #[error("Duplicate timestamp {0} in series")]
    DuplicateTimestamp(NaiveDateTime),

    #[error("Time frame mismatch: series is {series}, entry is {entry}")]
    TimeFrameMismatch { series: String, entry: String },

    #[error("Bars not in ascending timestamp order at {0}")]
    OutOfOrder(NaiveDateTime),

    #[error("Offset {offset} out of range at index {index}")]
    OffsetOutOfRange { index: usize, offset: usize },

    #[error("Empty series where a non-empty series is required")]
    EmptySeries,

    #[error("Filter range starts {requested} before first series date {first}")]
    FilterBeforeSeriesStart { requested: String, first: String },

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("Decimal overflow in {0}")]
    Overflow(&'static str),

    #[error("Division by zero in {0}")]
    DivisionByZero(&'static str),

    #[error("Cannot parse decimal from '{0}'")]
    DecimalParse(String),

    #[error("Symbol {0} already present in portfolio")]
    DuplicateSymbol(String),

    #[error("Symbol {0} not found")]
    UnknownSymbol(String),

    #[error("Unsupported time frame for this format: {0}")]
    UnsupportedTimeFrame(String),

    #[error("Malformed record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
