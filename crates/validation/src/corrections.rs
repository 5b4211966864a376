//! Multiple-testing corrections over `(p-value, max-statistic, pattern)`
//! entries.
//!
//! References:
//! - Benjamini, Y. & Hochberg, Y. (1995). Controlling the false discovery
//!   rate. JRSS-B 57(1).
//! - Benjamini, Y. & Hochberg, Y. (2000). On the adaptive control of the
//!   false discovery rate with independent statistics.
//! - Romano, J. P. & Wolf, M. (2005). Exact and approximate stepdown methods
//!   for multiple hypothesis testing. JASA 100(469).
//! - Holm, S. (1979). A simple sequentially rejective multiple test
//!   procedure. Scand. J. Statist. 6(2).

use std::sync::Arc;

use rust_decimal::Decimal;

use backtest_engine::PricePattern;
use market_data::num::constants::{DEFAULT_FDR, SIGNIFICANT_P_VALUE};

/// One tested pattern: its permutation p-value, the largest statistic seen
/// in its permutation sweep, and the pattern itself. Corrections write the
/// adjusted p-value back into `p_value`.
#[derive(Debug, Clone)]
pub struct CorrectionEntry {
    pub p_value: Decimal,
    pub max_statistic: Decimal,
    pub pattern: Arc<PricePattern>,
}

impl CorrectionEntry {
    pub fn new(p_value: Decimal, max_statistic: Decimal, pattern: Arc<PricePattern>) -> Self {
        CorrectionEntry {
            p_value,
            max_statistic,
            pattern,
        }
    }
}

/// Sorted empirical null: a supplied synthetic distribution when available,
/// otherwise the per-entry max statistics.
fn sorted_empirical_null(entries: &[CorrectionEntry], synthetic: Option<&[Decimal]>) -> Vec<Decimal> {
    let mut null: Vec<Decimal> = match synthetic {
        Some(values) => values.to_vec(),
        None => entries.iter().map(|e| e.max_statistic).collect(),
    };
    null.sort_unstable();
    null
}

/// Fraction of the sorted null at or above the observed statistic.
fn empirical_p(null: &[Decimal], observed: Decimal) -> Decimal {
    let below = null.partition_point(|v| *v < observed);
    Decimal::from(null.len() - below) / Decimal::from(null.len())
}

// ---------------------------------------------------------------------------
// Benjamini-Hochberg
// ---------------------------------------------------------------------------

/// Step-up FDR control: sort ascending, find the largest rank r with
/// `p(r) <= (r/m) * FDR`, keep ranks 1..=r.
pub struct BenjaminiHochbergFdr {
    fdr: Decimal,
    entries: Vec<(Decimal, Arc<PricePattern>)>,
    survivors: Vec<Arc<PricePattern>>,
}

impl Default for BenjaminiHochbergFdr {
    fn default() -> Self {
        Self::new()
    }
}

impl BenjaminiHochbergFdr {
    pub fn new() -> Self {
        Self::with_fdr(DEFAULT_FDR)
    }

    pub fn with_fdr(fdr: Decimal) -> Self {
        BenjaminiHochbergFdr {
            fdr,
            entries: Vec::new(),
            survivors: Vec::new(),
        }
    }

    pub fn add_strategy(&mut self, p_value: Decimal, pattern: Arc<PricePattern>) {
        self.entries.push((p_value, pattern));
    }

    pub fn num_strategies(&self) -> usize {
        self.entries.len()
    }

    pub fn correct_for_multiple_tests(&mut self) {
        self.survivors.clear();
        if self.entries.is_empty() {
            return;
        }
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        let m = Decimal::from(self.entries.len());

        let mut cutoff = None;
        for (index, (p_value, _)) in self.entries.iter().enumerate().rev() {
            let rank = Decimal::from(index + 1);
            let critical = rank / m * self.fdr;
            if *p_value <= critical {
                cutoff = Some(index);
                break;
            }
        }

        if let Some(cutoff) = cutoff {
            self.survivors = self.entries[..=cutoff]
                .iter()
                .map(|(_, pattern)| Arc::clone(pattern))
                .collect();
        }
    }

    pub fn survivors(&self) -> &[Arc<PricePattern>] {
        &self.survivors
    }
}

// ---------------------------------------------------------------------------
// Adaptive Benjamini-Hochberg (year-2000 estimator)
// ---------------------------------------------------------------------------

/// BH with the number of true nulls estimated from the p-value slopes:
/// `s_i = (1 - p_i) / (m + 1 - i)`; at the first decrease,
/// `m' = min(m, ceil(1/s_i) + 1)` replaces m in the critical values.
pub struct AdaptiveBenjaminiHochberg {
    fdr: Decimal,
    entries: Vec<(Decimal, Arc<PricePattern>)>,
    survivors: Vec<Arc<PricePattern>>,
}

impl Default for AdaptiveBenjaminiHochberg {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveBenjaminiHochberg {
    pub fn new() -> Self {
        Self::with_fdr(DEFAULT_FDR)
    }

    pub fn with_fdr(fdr: Decimal) -> Self {
        AdaptiveBenjaminiHochberg {
            fdr,
            entries: Vec::new(),
            survivors: Vec::new(),
        }
    }

    pub fn add_strategy(&mut self, p_value: Decimal, pattern: Arc<PricePattern>) {
        self.entries.push((p_value, pattern));
    }

    pub fn num_strategies(&self) -> usize {
        self.entries.len()
    }

    fn estimate_m_prime(&self) -> Decimal {
        let m = Decimal::from(self.entries.len());
        let mut slopes = Vec::with_capacity(self.entries.len());
        for (index, (p_value, _)) in self.entries.iter().enumerate() {
            let denominator = m + Decimal::ONE - Decimal::from(index + 1);
            slopes.push((Decimal::ONE - p_value) / denominator);
        }
        for i in 1..slopes.len() {
            if slopes[i] < slopes[i - 1] {
                let estimate = (Decimal::ONE / slopes[i]).ceil() + Decimal::ONE;
                return estimate.min(m);
            }
        }
        m
    }

    pub fn correct_for_multiple_tests(&mut self) {
        self.survivors.clear();
        if self.entries.is_empty() {
            return;
        }
        self.entries.sort_by(|a, b| a.0.cmp(&b.0));
        let m_prime = self.estimate_m_prime();

        let mut cutoff = None;
        for (index, (p_value, _)) in self.entries.iter().enumerate().rev() {
            let rank = Decimal::from(index + 1);
            let critical = rank / m_prime * self.fdr;
            if *p_value <= critical {
                cutoff = Some(index);
                break;
            }
        }

        if let Some(cutoff) = cutoff {
            self.survivors = self.entries[..=cutoff]
                .iter()
                .map(|(_, pattern)| Arc::clone(pattern))
                .collect();
        }
    }

    pub fn survivors(&self) -> &[Arc<PricePattern>] {
        &self.survivors
    }
}

// ---------------------------------------------------------------------------
// Unadjusted selection
// ---------------------------------------------------------------------------

/// Keep everything with a raw p-value below the significance threshold.
pub struct UnadjustedPValueSelection {
    threshold: Decimal,
    entries: Vec<(Decimal, Arc<PricePattern>)>,
    survivors: Vec<Arc<PricePattern>>,
}

impl Default for UnadjustedPValueSelection {
    fn default() -> Self {
        Self::new()
    }
}

impl UnadjustedPValueSelection {
    pub fn new() -> Self {
        UnadjustedPValueSelection {
            threshold: SIGNIFICANT_P_VALUE,
            entries: Vec::new(),
            survivors: Vec::new(),
        }
    }

    pub fn add_strategy(&mut self, p_value: Decimal, pattern: Arc<PricePattern>) {
        self.entries.push((p_value, pattern));
    }

    pub fn correct_for_multiple_tests(&mut self) {
        self.survivors = self
            .entries
            .iter()
            .filter(|(p, _)| *p < self.threshold)
            .map(|(_, pattern)| Arc::clone(pattern))
            .collect();
    }

    pub fn survivors(&self) -> &[Arc<PricePattern>] {
        &self.survivors
    }
}

// ---------------------------------------------------------------------------
// Romano-Wolf step-down
// ---------------------------------------------------------------------------

/// Resampling-based step-down adjustment. Entries are sorted ascending by
/// original p-value; the adjustment walks from the weakest entry backwards,
/// each candidate `emp_p * m / (i + 1)` clipped to stay monotone
/// non-increasing toward the strongest entry.
pub struct RomanoWolfStepdown {
    entries: Vec<CorrectionEntry>,
    synthetic_null: Option<Vec<Decimal>>,
    survivors: Vec<Arc<PricePattern>>,
}

impl Default for RomanoWolfStepdown {
    fn default() -> Self {
        Self::new()
    }
}

impl RomanoWolfStepdown {
    pub fn new() -> Self {
        RomanoWolfStepdown {
            entries: Vec::new(),
            synthetic_null: None,
            survivors: Vec::new(),
        }
    }

    pub fn add_strategy(&mut self, entry: CorrectionEntry) {
        self.entries.push(entry);
    }

    /// Use a full synthetic null distribution instead of the per-entry
    /// max statistics.
    pub fn set_synthetic_null_distribution(&mut self, null: Vec<Decimal>) {
        self.synthetic_null = Some(null);
    }

    pub fn num_strategies(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[CorrectionEntry] {
        &self.entries
    }

    pub fn correct_for_multiple_tests(&mut self) {
        self.survivors.clear();
        if self.entries.is_empty() {
            tracing::warn!("Romano-Wolf correction on an empty container");
            return;
        }

        self.entries.sort_by(|a, b| a.p_value.cmp(&b.p_value));
        let null = sorted_empirical_null(&self.entries, self.synthetic_null.as_deref());
        if null.is_empty() {
            return;
        }

        let m = Decimal::from(self.entries.len());
        let mut previous = Decimal::ONE;
        for index in (0..self.entries.len()).rev() {
            let emp_p = empirical_p(&null, self.entries[index].max_statistic);
            let candidate = emp_p * m / Decimal::from(index + 1);
            let adjusted = if index == self.entries.len() - 1 {
                candidate
            } else {
                previous.min(candidate)
            };
            previous = adjusted;
            self.entries[index].p_value = adjusted;
        }

        self.survivors = self
            .entries
            .iter()
            .filter(|e| e.p_value < SIGNIFICANT_P_VALUE)
            .map(|e| Arc::clone(&e.pattern))
            .collect();
    }

    pub fn survivors(&self) -> &[Arc<PricePattern>] {
        &self.survivors
    }
}

// ---------------------------------------------------------------------------
// Holm-Romano-Wolf
// ---------------------------------------------------------------------------

/// Holm's sequential schedule over Romano-Wolf empirical p-values: forward
/// walk, candidate `emp_p * (m - i)`, adjusted p-values monotone
/// non-decreasing.
pub struct HolmRomanoWolf {
    entries: Vec<CorrectionEntry>,
    synthetic_null: Option<Vec<Decimal>>,
    survivors: Vec<Arc<PricePattern>>,
}

impl Default for HolmRomanoWolf {
    fn default() -> Self {
        Self::new()
    }
}

impl HolmRomanoWolf {
    pub fn new() -> Self {
        HolmRomanoWolf {
            entries: Vec::new(),
            synthetic_null: None,
            survivors: Vec::new(),
        }
    }

    pub fn add_strategy(&mut self, entry: CorrectionEntry) {
        self.entries.push(entry);
    }

    pub fn set_synthetic_null_distribution(&mut self, null: Vec<Decimal>) {
        self.synthetic_null = Some(null);
    }

    pub fn num_strategies(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[CorrectionEntry] {
        &self.entries
    }

    pub fn correct_for_multiple_tests(&mut self) {
        self.survivors.clear();
        if self.entries.is_empty() {
            tracing::warn!("Holm-Romano-Wolf correction on an empty container");
            return;
        }

        self.entries.sort_by(|a, b| a.p_value.cmp(&b.p_value));
        let null = sorted_empirical_null(&self.entries, self.synthetic_null.as_deref());
        if null.is_empty() {
            return;
        }

        let m = self.entries.len();
        let mut previous = Decimal::ZERO;
        for index in 0..m {
            let emp_p = empirical_p(&null, self.entries[index].max_statistic);
            let candidate = emp_p * Decimal::from(m - index);
            let adjusted = if index == 0 { candidate } else { previous.max(candidate) };
            previous = adjusted;
            self.entries[index].p_value = adjusted;
        }

        self.survivors = self
            .entries
            .iter()
            .filter(|e| e.p_value < SIGNIFICANT_P_VALUE)
            .map(|e| Arc::clone(&e.pattern))
            .collect();
    }

    pub fn survivors(&self) -> &[Arc<PricePattern>] {
        &self.survivors
    }
}
