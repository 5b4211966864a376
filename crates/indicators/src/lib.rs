pub mod error;
pub mod robust;
pub mod roc;
pub mod stats;
pub mod stop_target;
pub mod trend;
pub mod volatility;

pub use error::IndicatorError;
pub use robust::{medcouple_skew, qn_scale};
pub use roc::{ibs_series, roc_series};
pub use stats::{
    linear_interpolation_quantile, median, median_absolute_deviation, standard_deviation, winsorize,
};
pub use stop_target::{
    legacy_baseline_long_widths, long_stop_and_target, quantile_stop_and_target,
    robust_stop_and_target, short_stop_and_target, StopTargetMethod, StopTargetWidths,
};
pub use trend::{percent_rank_series, rolling_r_squared_series, standard_percent_rank_period};
pub use volatility::{
    adaptive_volatility_annualized_series, adaptive_volatility_percent_rank_series,
    CloseToCloseVariance, SimonsHlcVariance, VariancePolicy,
};
