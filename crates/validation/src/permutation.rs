//! Baseline preparation and the per-pattern permutation driver.
//!
//! Reproducibility: every permutation index derives its own RNG stream from
//! the caller's root seed, so results are identical for any worker count.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;

use backtest_engine::{BackTester, PatternStrategy, PricePattern};
use market_data::num::constants::SIGNIFICANT_P_VALUE;
use market_data::{Portfolio, Security};
use resampling::SyntheticCache;

use crate::error::ValidationError;
use crate::executor::Executor;
use crate::policy::TestStatisticPolicy;

/// One candidate pattern with its baseline statistic on the real series.
#[derive(Debug, Clone)]
pub struct StrategyContext {
    pub pattern: Arc<PricePattern>,
    pub baseline: Decimal,
}

/// Per-permutation RNG stream derived from the root seed.
pub(crate) fn stream_seed(root: u64, index: u32) -> u64 {
    root ^ (u64::from(index).wrapping_add(1)).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Run one pattern over one security inside a fresh clone of the template
/// backtester, returning the completed backtester.
pub(crate) fn run_pattern_backtest(
    template: &BackTester,
    pattern: &Arc<PricePattern>,
    security: &Security,
) -> Result<BackTester, ValidationError> {
    let mut portfolio = Portfolio::new(format!("{} portfolio", security.symbol()));
    portfolio.add_security(security.clone())?;

    let mut backtester = template.clone_template();
    backtester.add_strategy(
        Box::new(PatternStrategy::single(pattern.name().to_string(), Arc::clone(pattern))),
        portfolio,
    );
    backtester.run()?;
    Ok(backtester)
}

/// Backtest every candidate on the real (out-of-sample) series to get its
/// baseline statistic, in parallel, and sort descending by baseline.
pub fn prepare_strategy_contexts(
    patterns: &[Arc<PricePattern>],
    security: &Security,
    template: &BackTester,
    policy: TestStatisticPolicy,
    executor: &Executor,
) -> Result<Vec<StrategyContext>, ValidationError> {
    if patterns.is_empty() {
        return Err(ValidationError::NoStrategies);
    }

    let results: Mutex<Vec<StrategyContext>> = Mutex::new(Vec::with_capacity(patterns.len()));
    executor.parallel_for(patterns.len() as u32, |index| {
        let pattern = &patterns[index as usize];
        let backtester = run_pattern_backtest(template, pattern, security)?;
        let baseline = policy.guarded_statistic(&backtester)?;
        results
            .lock()
            .expect("baseline result lock poisoned")
            .push(StrategyContext {
                pattern: Arc::clone(pattern),
                baseline,
            });
        Ok(())
    })?;

    let mut contexts = results.into_inner().expect("baseline result lock poisoned");
    contexts.sort_by(|a, b| b.baseline.cmp(&a.baseline));
    tracing::debug!(candidates = contexts.len(), "prepared baseline statistics");
    Ok(contexts)
}

/// Whether the driver may trade p-value accuracy for an early exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PValueMode {
    Exact,
    /// Once the exceedance count passes `0.05 * B`, stop early and report
    /// the conservative 0.05 bound.
    Approximate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PermutationTestResult {
    pub p_value: Decimal,
    /// Largest permuted statistic seen; feeds the Romano-Wolf empirical null.
    pub max_statistic: Decimal,
}

/// Per-pattern permutation test: B synthetic backtests, counting how many
/// score at least the baseline. `p = count / B`.
#[allow(clippy::too_many_arguments)]
pub fn run_permutation_test(
    template: &BackTester,
    pattern: &Arc<PricePattern>,
    security: &Security,
    baseline: Decimal,
    num_permutations: u32,
    policy: TestStatisticPolicy,
    mode: PValueMode,
    seed: u64,
    executor: &Executor,
) -> Result<PermutationTestResult, ValidationError> {
    if num_permutations == 0 {
        return Err(ValidationError::ZeroPermutations);
    }

    // Validate the synthetic construction once, then hand each worker a
    // clone as reusable scratch.
    let probe = SyntheticCache::new(security)?;

    let count = AtomicU32::new(0);
    let stopped = AtomicBool::new(false);
    let max_statistic = Mutex::new(policy.worst_case());
    let early_exit_threshold = (f64::from(num_permutations) * 0.05) as u32;

    executor.parallel_for_init(
        num_permutations,
        || probe.clone(),
        |cache, index| {
            if mode == PValueMode::Approximate && stopped.load(Ordering::Relaxed) {
                return Ok(());
            }

            let mut rng = ChaCha8Rng::seed_from_u64(stream_seed(seed, index));
            // A synthetic that fails to build contributes the worst case
            // instead of poisoning the sweep; contract violations inside the
            // backtest itself still abort.
            let statistic = match cache.permute(&mut rng) {
                Ok(synthetic) => {
                    let synthetic = synthetic.clone();
                    let backtester = run_pattern_backtest(template, pattern, &synthetic)?;
                    policy.guarded_statistic(&backtester)?
                }
                Err(error) => {
                    tracing::warn!(%error, permutation = index, "synthetic build failed");
                    policy.worst_case()
                }
            };

            {
                let mut max = max_statistic.lock().expect("max statistic lock poisoned");
                if statistic > *max {
                    *max = statistic;
                }
            }

            if statistic >= baseline {
                let seen = count.fetch_add(1, Ordering::Relaxed) + 1;
                if mode == PValueMode::Approximate && seen + 1 > early_exit_threshold {
                    stopped.store(true, Ordering::Relaxed);
                }
            }
            Ok(())
        },
    )?;

    let max_statistic = *max_statistic.lock().expect("max statistic lock poisoned");
    if mode == PValueMode::Approximate && stopped.load(Ordering::Relaxed) {
        return Ok(PermutationTestResult {
            p_value: SIGNIFICANT_P_VALUE,
            max_statistic,
        });
    }

    let p_value = Decimal::from(count.load(Ordering::Relaxed)) / Decimal::from(num_permutations);
    Ok(PermutationTestResult {
        p_value,
        max_statistic,
    })
}
