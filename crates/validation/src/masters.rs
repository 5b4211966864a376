//! Masters stepwise permutation tests.
//!
//! Strategies are tested in descending order of baseline performance. At
//! each step the null distribution is the maximum statistic over the still
//! active strategies, so the null narrows as strategies are confirmed and
//! weaker-but-real ones keep a chance (Romano-Wolf style step-down with
//! strong FWER control). Exceedance counters start at one: the unpermuted
//! arrangement is itself a permutation, so `p = count / (B + 1)`.
//!
//! The fast variant computes every strategy's statistic once per permutation
//! in a single parallel sweep, cutting work by the number of steps; its
//! counts use the maximum over all strategies, which matches the stepwise
//! null whenever the strategies rejected earlier do not dominate later
//! nulls.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;

use backtest_engine::{BackTester, PricePattern};
use market_data::num::constants::SIGNIFICANT_P_VALUE;
use market_data::Security;
use resampling::SyntheticCache;

use crate::error::ValidationError;
use crate::executor::Executor;
use crate::permutation::{run_pattern_backtest, stream_seed, StrategyContext};
use crate::policy::TestStatisticPolicy;

#[derive(Debug, Clone)]
pub struct MastersResult {
    /// Adjusted p-value per pattern, in descending-baseline order.
    pub adjusted_p_values: Vec<(Arc<PricePattern>, Decimal)>,
    /// Patterns whose adjusted p-value stayed at or below the significance
    /// level.
    pub survivors: Vec<Arc<PricePattern>>,
}

pub struct MastersValidation {
    num_permutations: u32,
    significance: Decimal,
    policy: TestStatisticPolicy,
    seed: u64,
}

impl MastersValidation {
    pub fn new(num_permutations: u32, policy: TestStatisticPolicy, seed: u64) -> Result<Self, ValidationError> {
        if num_permutations == 0 {
            return Err(ValidationError::ZeroPermutations);
        }
        Ok(MastersValidation {
            num_permutations,
            significance: SIGNIFICANT_P_VALUE,
            policy,
            seed,
        })
    }

    pub fn with_significance(mut self, significance: Decimal) -> Self {
        self.significance = significance;
        self
    }

    /// Original stepwise algorithm: one full permutation sweep per step,
    /// max taken over the currently active set.
    pub fn run_slow(
        &self,
        contexts: &[StrategyContext],
        template: &BackTester,
        security: &Security,
        executor: &Executor,
    ) -> Result<MastersResult, ValidationError> {
        if contexts.is_empty() {
            return Err(ValidationError::NoStrategies);
        }

        let denominator = Decimal::from(self.num_permutations + 1);
        let mut active: Vec<bool> = vec![true; contexts.len()];
        let mut adjusted = Vec::with_capacity(contexts.len());
        let mut last_adjusted = Decimal::ZERO;

        for k in 0..contexts.len() {
            let active_patterns: Vec<Arc<PricePattern>> = contexts
                .iter()
                .zip(&active)
                .filter(|(_, keep)| **keep)
                .map(|(ctx, _)| Arc::clone(&ctx.pattern))
                .collect();

            let count = self.max_exceedance_count(
                contexts[k].baseline,
                &active_patterns,
                template,
                security,
                executor,
            )?;

            let p_value = Decimal::from(count) / denominator;
            let step_adjusted = p_value.max(last_adjusted);
            adjusted.push((Arc::clone(&contexts[k].pattern), step_adjusted));

            if step_adjusted <= self.significance {
                last_adjusted = step_adjusted;
                active[k] = false;
            } else {
                // First failure: this p-value sticks to every weaker pattern.
                for ctx in &contexts[k + 1..] {
                    adjusted.push((Arc::clone(&ctx.pattern), step_adjusted));
                }
                break;
            }
        }

        Ok(self.finish(adjusted))
    }

    /// Fast single-sweep variant: per permutation, one synthetic series and
    /// one statistic per strategy; counters for every strategy beaten by the
    /// permutation maximum.
    pub fn run_fast(
        &self,
        contexts: &[StrategyContext],
        template: &BackTester,
        security: &Security,
        executor: &Executor,
    ) -> Result<MastersResult, ValidationError> {
        if contexts.is_empty() {
            return Err(ValidationError::NoStrategies);
        }

        let probe = SyntheticCache::new(security)?;
        let counts: Vec<AtomicU32> = contexts.iter().map(|_| AtomicU32::new(1)).collect();

        executor.parallel_for_init(
            self.num_permutations,
            || probe.clone(),
            |cache, index| {
                let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(self.seed, index));
                let mut max_statistic = self.policy.worst_case();
                match cache.permute(&mut rng) {
                    Ok(synthetic) => {
                        let synthetic = synthetic.clone();
                        for ctx in contexts {
                            let backtester = run_pattern_backtest(template, &ctx.pattern, &synthetic)?;
                            let statistic = self.policy.guarded_statistic(&backtester)?;
                            max_statistic = max_statistic.max(statistic);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, permutation = index, "synthetic build failed");
                    }
                }

                for (i, ctx) in contexts.iter().enumerate() {
                    if max_statistic >= ctx.baseline {
                        counts[i].fetch_add(1, Ordering::Relaxed);
                    }
                }
                Ok(())
            },
        )?;

        let denominator = Decimal::from(self.num_permutations + 1);
        let mut adjusted = Vec::with_capacity(contexts.len());
        let mut last_adjusted = Decimal::ZERO;

        for (k, ctx) in contexts.iter().enumerate() {
            let p_value = Decimal::from(counts[k].load(Ordering::Relaxed)) / denominator;
            let step_adjusted = p_value.max(last_adjusted);
            adjusted.push((Arc::clone(&ctx.pattern), step_adjusted));

            if step_adjusted <= self.significance {
                last_adjusted = step_adjusted;
            } else {
                for later in &contexts[k + 1..] {
                    adjusted.push((Arc::clone(&later.pattern), step_adjusted));
                }
                break;
            }
        }

        Ok(self.finish(adjusted))
    }

    /// One stepwise sweep: count permutations whose maximum statistic over
    /// the active strategies reaches the step baseline.
    fn max_exceedance_count(
        &self,
        baseline: Decimal,
        active_patterns: &[Arc<PricePattern>],
        template: &BackTester,
        security: &Security,
        executor: &Executor,
    ) -> Result<u32, ValidationError> {
        if active_patterns.is_empty() {
            tracing::warn!("no active strategies left in step-down sweep");
            return Ok(1);
        }

        let probe = SyntheticCache::new(security)?;
        let count = AtomicU32::new(1);

        executor.parallel_for_init(
            self.num_permutations,
            || probe.clone(),
            |cache, index| {
                let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(self.seed, index));
                let mut max_statistic = self.policy.worst_case();
                match cache.permute(&mut rng) {
                    Ok(synthetic) => {
                        let synthetic = synthetic.clone();
                        for pattern in active_patterns {
                            let backtester = run_pattern_backtest(template, pattern, &synthetic)?;
                            let statistic = self.policy.guarded_statistic(&backtester)?;
                            max_statistic = max_statistic.max(statistic);
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, permutation = index, "synthetic build failed");
                    }
                }
                if max_statistic >= baseline {
                    count.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            },
        )?;

        Ok(count.load(Ordering::Relaxed))
    }

    fn finish(&self, adjusted: Vec<(Arc<PricePattern>, Decimal)>) -> MastersResult {
        let survivors = adjusted
            .iter()
            .filter(|(_, p)| *p <= self.significance)
            .map(|(pattern, _)| Arc::clone(pattern))
            .collect();
        MastersResult {
            adjusted_p_values: adjusted,
            survivors,
        }
    }
}
