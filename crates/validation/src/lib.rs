pub mod corrections;
pub mod error;
pub mod executor;
pub mod masters;
pub mod permutation;
pub mod policy;

#[cfg(test)]
mod tests;

pub use corrections::{
    AdaptiveBenjaminiHochberg, BenjaminiHochbergFdr, CorrectionEntry, HolmRomanoWolf,
    RomanoWolfStepdown, UnadjustedPValueSelection,
};
pub use error::ValidationError;
pub use executor::Executor;
pub use masters::{MastersResult, MastersValidation};
pub use permutation::{
    prepare_strategy_contexts, run_permutation_test, PValueMode, PermutationTestResult,
    StrategyContext,
};
pub use policy::TestStatisticPolicy;
