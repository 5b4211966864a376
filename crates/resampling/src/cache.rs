use std::sync::Arc;

use rand::Rng;

use market_data::Security;

use crate::error::ResamplingError;
use crate::synthetic::{SyntheticModel, SyntheticSeriesBuilder};

/// Per-worker scratch state for cheap synthetic-portfolio generation.
///
/// Holds the factor vectors and one reusable `Security` whose series pointer
/// is swapped on every permutation, so a permutation sweep allocates one
/// series per draw and nothing else. Keep one instance per worker; the type
/// is deliberately not `Sync`-shared.
#[derive(Debug, Clone)]
pub struct SyntheticCache {
    builder: SyntheticSeriesBuilder,
    security: Security,
}

impl SyntheticCache {
    /// End-of-day series use the standard two-shuffle model; intraday series
    /// keep whole-bar tuples together.
    pub fn new(base: &Security) -> Result<Self, ResamplingError> {
        let model = if base.series().time_frame().is_end_of_day() {
            SyntheticModel::Standard
        } else {
            SyntheticModel::PairedDay
        };
        Self::with_model(base, model)
    }

    pub fn with_model(base: &Security, model: SyntheticModel) -> Result<Self, ResamplingError> {
        let builder = SyntheticSeriesBuilder::new(base.series(), base.tick(), base.tick_div2(), model)?;
        Ok(SyntheticCache {
            builder,
            security: base.clone(),
        })
    }

    /// Shuffle factors, rebuild the series, and swap it into the reusable
    /// security. The returned reference is valid until the next call.
    pub fn permute(&mut self, rng: &mut impl Rng) -> Result<&Security, ResamplingError> {
        self.builder.shuffle(rng)?;
        let series = self.builder.build()?;
        self.security.replace_series(Arc::new(series));
        Ok(&self.security)
    }

    pub fn security(&self) -> &Security {
        &self.security
    }
}
