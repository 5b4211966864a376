pub mod cache;
pub mod error;
pub mod relative;
pub mod shuffle;
pub mod stationary;
pub mod synthetic;

pub use cache::SyntheticCache;
pub use error::ResamplingError;
pub use relative::RelativeFactors;
pub use shuffle::{inplace_shuffle, joint_shuffle3};
pub use stationary::{delete_block_jackknife, RegimeMixStationaryResampler, StationaryBootstrap};
pub use synthetic::{SyntheticModel, SyntheticSeriesBuilder};
