//! Synthetic OHLC series built by reordering a source series' relative
//! price changes.
//!
//! The shuffles destroy temporal structure while preserving the marginal
//! distribution of per-bar changes; the cumulative product of the factors is
//! permutation-invariant, so the final synthetic close matches the original.

use rand::Rng;
use rust_decimal::Decimal;

use market_data::num::round_to_tick;
use market_data::{OhlcBar, OhlcSeries};

use crate::error::ResamplingError;
use crate::relative::RelativeFactors;
use crate::shuffle::{inplace_shuffle, joint_shuffle3};

/// Null-hypothesis construction to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticModel {
    /// Two independent shuffles: overnight gaps on their own, intraday
    /// high/low/close factors jointly.
    Standard,
    /// One shuffle of whole-day tuples `(gap, H/O, L/O, C/O)`; a day's
    /// internal geometry is never broken apart.
    PairedDay,
}

/// Reusable builder: extract factors once, then shuffle-and-integrate per
/// permutation.
///
/// Each shuffle restarts from the source ordering, so a realization is a
/// pure function of the RNG stream handed in. That is what makes
/// permutation sweeps reproducible regardless of how permutation indices
/// are scheduled across workers.
#[derive(Debug, Clone)]
pub struct SyntheticSeriesBuilder {
    source: RelativeFactors,
    working: RelativeFactors,
    model: SyntheticModel,
    tick: Decimal,
    tick_div2: Decimal,
}

impl SyntheticSeriesBuilder {
    pub fn new(
        series: &OhlcSeries,
        tick: Decimal,
        tick_div2: Decimal,
        model: SyntheticModel,
    ) -> Result<Self, ResamplingError> {
        let source = RelativeFactors::from_series(series)?;
        Ok(SyntheticSeriesBuilder {
            working: source.clone(),
            source,
            model,
            tick,
            tick_div2,
        })
    }

    pub fn model(&self) -> SyntheticModel {
        self.model
    }

    /// Factor vectors of the current realization.
    pub fn factors(&self) -> &RelativeFactors {
        &self.working
    }

    /// Permute the factor vectors for the next realization, starting from
    /// the source ordering.
    pub fn shuffle(&mut self, rng: &mut impl Rng) -> Result<(), ResamplingError> {
        self.working.clone_from(&self.source);
        let f = &mut self.working;
        match self.model {
            SyntheticModel::Standard => {
                inplace_shuffle(&mut f.r_open, rng);
                joint_shuffle3(&mut f.r_high, &mut f.r_low, &mut f.r_close, rng)?;
            }
            SyntheticModel::PairedDay => {
                // One permutation across all four vectors keeps each day's
                // tuple indivisible.
                let n = f.r_open.len();
                if n > 1 {
                    for i in (1..n).rev() {
                        let j = rng.gen_range(0..=i);
                        f.r_open.swap(i, j);
                        f.r_high.swap(i, j);
                        f.r_low.swap(i, j);
                        f.r_close.swap(i, j);
                    }
                }
            }
        }
        Ok(())
    }

    /// Integrate the current factor ordering into a full OHLC series.
    ///
    /// The running price product stays unrounded; each materialized price is
    /// rounded to the tick. Original timestamps and time frame are kept. A
    /// bar that violates OHLC invariants after rounding fails the build.
    pub fn build(&self) -> Result<OhlcSeries, ResamplingError> {
        let f = &self.working;
        let n = f.r_open.len();
        let mut bars = Vec::with_capacity(n);

        let mut price = f.first_open;
        for i in 0..n {
            price *= f.r_open[i];
            let open = price;
            price *= f.r_close[i];
            let close = price;

            let bar = OhlcBar::new(
                f.timestamps[i],
                round_to_tick(open, self.tick, self.tick_div2),
                round_to_tick(open * f.r_high[i], self.tick, self.tick_div2),
                round_to_tick(open * f.r_low[i], self.tick, self.tick_div2),
                round_to_tick(close, self.tick, self.tick_div2),
                Decimal::ZERO,
                f.time_frame,
            )?;
            bars.push(bar);
        }

        Ok(OhlcSeries::from_sorted_bars(f.time_frame, f.volume_unit, bars)?)
    }
}
