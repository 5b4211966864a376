//! Stationary (geometric-length) block bootstrap, its regime-aware variant,
//! and the delete-block jackknife.
//!
//! Block lengths follow `1 + Geometric(p)` with `p = 1/L`, which makes the
//! resampled series stationary in expectation (Politis & Romano). The source
//! is treated as circular for both data and labels.

use rand::distributions::Distribution;
use rand::Rng;
use statrs::distribution::Geometric;

use crate::error::ResamplingError;

/// Draw one stationary block length: at least 1, mean `L`.
fn draw_block_len(geometric: &Geometric, rng: &mut impl Rng) -> usize {
    // statrs' geometric counts trials to first success, support {1, 2, ...}.
    geometric.sample(rng).max(1.0) as usize
}

fn copy_with_wrap<T: Clone>(source: &[T], start: usize, count: usize, out: &mut Vec<T>) {
    let n = source.len();
    let tail = count.min(n - start);
    out.extend_from_slice(&source[start..start + tail]);
    if count > tail {
        out.extend_from_slice(&source[..count - tail]);
    }
}

/// Plain stationary bootstrap.
#[derive(Debug, Clone)]
pub struct StationaryBootstrap {
    mean_block_len: usize,
}

impl StationaryBootstrap {
    /// Mean block length is coerced to at least 2.
    pub fn new(mean_block_len: usize) -> Self {
        StationaryBootstrap {
            mean_block_len: mean_block_len.max(2),
        }
    }

    pub fn mean_block_len(&self) -> usize {
        self.mean_block_len
    }

    /// Resample `output_len` observations by appending circular blocks of
    /// geometric length, truncating the final block.
    pub fn resample<T: Clone>(
        &self,
        data: &[T],
        output_len: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<T>, ResamplingError> {
        if data.len() < 2 || output_len < 1 {
            return Err(ResamplingError::SeriesTooShort(format!(
                "stationary bootstrap needs >= 2 observations and a positive output length \
                 (got {} and {})",
                data.len(),
                output_len
            )));
        }

        let p = 1.0 / self.mean_block_len as f64;
        let geometric = Geometric::new(p).expect("0 < p <= 1 by construction");

        let mut out = Vec::with_capacity(output_len);
        while out.len() < output_len {
            let start = rng.gen_range(0..data.len());
            let len = draw_block_len(&geometric, rng).min(output_len - out.len());
            copy_with_wrap(data, start, len, &mut out);
        }
        Ok(out)
    }
}

/// Regime-aware stationary bootstrap: each observation carries a regime
/// label, target weights become per-regime bar quotas, and every copied
/// block stays inside a single regime.
#[derive(Debug, Clone)]
pub struct RegimeMixStationaryResampler {
    mean_block_len: usize,
    labels: Vec<usize>,
    weights: Vec<f64>,
    min_bars_per_regime: usize,
}

impl RegimeMixStationaryResampler {
    pub fn new(
        mean_block_len: usize,
        labels: Vec<usize>,
        target_weights: &[f64],
        min_bars_per_regime: usize,
    ) -> Result<Self, ResamplingError> {
        if labels.is_empty() {
            return Err(ResamplingError::EmptyLabels);
        }
        let regimes = labels.iter().max().copied().unwrap_or(0) + 1;
        if target_weights.len() != regimes {
            return Err(ResamplingError::WeightCountMismatch {
                expected: regimes,
                got: target_weights.len(),
            });
        }
        let mut sum = 0.0;
        for &w in target_weights {
            if w < 0.0 {
                return Err(ResamplingError::NegativeWeight(w));
            }
            sum += w;
        }
        if sum <= 0.0 {
            return Err(ResamplingError::ZeroWeightSum);
        }
        let weights = target_weights.iter().map(|w| w / sum).collect();

        Ok(RegimeMixStationaryResampler {
            mean_block_len: mean_block_len.max(2),
            labels,
            weights,
            min_bars_per_regime,
        })
    }

    pub fn mean_block_len(&self) -> usize {
        self.mean_block_len
    }

    fn regime_count(&self) -> usize {
        self.weights.len()
    }

    /// Longest run starting at `idx` (with wrap) that stays in regime `s`.
    fn same_regime_run_len(&self, idx: usize, s: usize) -> usize {
        let n = self.labels.len();
        let mut len = 0;
        while len < n {
            if self.labels[(idx + len) % n] != s {
                break;
            }
            len += 1;
        }
        len.max(1)
    }

    pub fn resample<T: Clone>(
        &self,
        data: &[T],
        output_len: usize,
        rng: &mut impl Rng,
    ) -> Result<Vec<T>, ResamplingError> {
        if data.len() < 2 || output_len < 2 {
            return Err(ResamplingError::SeriesTooShort(
                "regime-mix resampler needs >= 2 observations in and out".into(),
            ));
        }
        if data.len() != self.labels.len() {
            return Err(ResamplingError::LabelSizeMismatch {
                labels: self.labels.len(),
                data: data.len(),
            });
        }

        let n = output_len;
        let regimes = self.regime_count();

        // Start pools per regime. Homogeneity is enforced during the copy by
        // truncating to the same-regime run length, not up front.
        let mut pools: Vec<Vec<usize>> = vec![Vec::new(); regimes];
        for (t, &label) in self.labels.iter().enumerate() {
            pools[label].push(t);
        }
        for (s, pool) in pools.iter().enumerate() {
            if pool.len() < self.min_bars_per_regime && self.weights[s] > 0.0 {
                tracing::debug!(regime = s, bars = pool.len(), "regime below minimum bar count");
            }
        }

        // Quotas from the normalized weights, rounding drift fixed round-robin.
        let mut quota: Vec<usize> = self
            .weights
            .iter()
            .map(|w| (w * n as f64).round() as usize)
            .collect();
        let mut assigned: usize = quota.iter().sum();
        while assigned < n {
            let s = assigned % regimes;
            quota[s] += 1;
            assigned += 1;
        }
        let mut drain = assigned % regimes;
        while assigned > n {
            if quota[drain] > 0 {
                quota[drain] -= 1;
                assigned -= 1;
            }
            drain = (drain + 1) % regimes;
        }

        let p = 1.0 / self.mean_block_len as f64;
        let geometric = Geometric::new(p).expect("0 < p <= 1 by construction");

        let mut out: Vec<T> = Vec::with_capacity(n);
        let mut s = 0;
        let mut safety = 0;

        // Round-robin over regimes, skipping exhausted or empty ones.
        while out.len() < n && safety < 10 * n {
            if quota[s] == 0 || pools[s].is_empty() {
                s = (s + 1) % regimes;
                safety += 1;
                continue;
            }

            let pool = &pools[s];
            let start = pool[rng.gen_range(0..pool.len())];

            let proposed = draw_block_len(&geometric, rng);
            let run_len = self.same_regime_run_len(start, s);
            let remaining = n - out.len();
            let k = proposed.min(run_len).min(remaining).min(quota[s]);
            if k == 0 {
                s = (s + 1) % regimes;
                safety += 1;
                continue;
            }

            copy_with_wrap(data, start, k, &mut out);
            quota[s] -= k;
            s = (s + 1) % regimes;
            safety += 1;
        }

        // Scarcity fallback: pad from anywhere, still never crossing a
        // regime boundary within one block.
        while out.len() < n {
            let remaining = n - out.len();
            let start = rng.gen_range(0..data.len());
            let run_len = self.same_regime_run_len(start, self.labels[start]);
            let k = draw_block_len(&geometric, rng).min(run_len).min(remaining).max(1);
            copy_with_wrap(data, start, k, &mut out);
        }

        Ok(out)
    }

    /// Delete-block jackknife using the sampler's mean block length.
    pub fn jackknife<T: Clone, F>(&self, data: &[T], stat: F) -> Result<Vec<f64>, ResamplingError>
    where
        F: Fn(&[T]) -> f64,
    {
        delete_block_jackknife(data, self.mean_block_len, stat)
    }
}

/// Delete-block jackknife: for every circular start position, drop
/// `block_len` contiguous entries and evaluate the statistic on the kept
/// remainder. Returns one replicate per start.
pub fn delete_block_jackknife<T: Clone, F>(
    data: &[T],
    block_len: usize,
    stat: F,
) -> Result<Vec<f64>, ResamplingError>
where
    F: Fn(&[T]) -> f64,
{
    let n = data.len();
    if n < 2 {
        return Err(ResamplingError::SeriesTooShort(
            "jackknife needs at least 2 observations".into(),
        ));
    }
    let effective = block_len.min(n - 1);
    let keep = n - effective;

    let mut replicates = Vec::with_capacity(n);
    let mut kept: Vec<T> = Vec::with_capacity(keep);
    for start in 0..n {
        kept.clear();
        let keep_start = (start + effective) % n;
        copy_with_wrap(data, keep_start, keep, &mut kept);
        replicates.push(stat(&kept));
    }
    Ok(replicates)
}
