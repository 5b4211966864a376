use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use backtest_engine::{
    BackTester, BarRef, PatternExpr, PriceField, PricePattern, TimeStepper, TradeDirection,
};
use market_data::{DateRange, OhlcBar, OhlcSeries, Security, TimeFrame, VolumeUnit};

use crate::corrections::{
    AdaptiveBenjaminiHochberg, BenjaminiHochbergFdr, CorrectionEntry, HolmRomanoWolf,
    RomanoWolfStepdown, UnadjustedPValueSelection,
};
use crate::executor::Executor;
use crate::masters::MastersValidation;
use crate::permutation::{prepare_strategy_contexts, run_permutation_test, PValueMode};
use crate::policy::TestStatisticPolicy;

// =============================================================================
// Fixtures
// =============================================================================

/// Helper: a deterministic 120-bar daily series with alternating up and down
/// stretches, noisy enough that synthetic permutations differ from the
/// original.
fn fixture_security() -> Security {
    use rust_decimal::prelude::FromPrimitive;

    let steps = [
        0.8, -0.4, 1.1, 0.3, -0.9, 0.6, 1.4, -0.2, 0.5, -1.2, 0.9, 0.2, -0.6, 1.0, -0.3, 0.7, -0.8,
        0.4, 1.2, -0.5,
    ];

    let mut series = OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares);
    let mut close = 100.0_f64;
    let mut d = NaiveDate::from_ymd_opt(2020, 1, 6).unwrap();
    for i in 0..120 {
        let step = steps[i % steps.len()];
        let open = close + step * 0.25;
        close = (close + step).max(20.0);
        let high = open.max(close) + 0.6;
        let low = open.min(close) - 0.6;

        series
            .add_bar(
                OhlcBar::from_date(
                    d,
                    Decimal::from_f64(open).unwrap().round_dp(2),
                    Decimal::from_f64(high).unwrap().round_dp(2),
                    Decimal::from_f64(low).unwrap().round_dp(2),
                    Decimal::from_f64(close).unwrap().round_dp(2),
                    dec!(0),
                    TimeFrame::Daily,
                )
                .unwrap(),
            )
            .unwrap();

        d = d.succ_opt().unwrap();
        while matches!(d.weekday(), Weekday::Sat | Weekday::Sun) {
            d = d.succ_opt().unwrap();
        }
    }
    Security::equity("FIX", "Fixture Equity", Arc::new(series))
}

fn close(offset: usize) -> BarRef {
    BarRef::new(PriceField::Close, offset)
}

/// Helper: a pattern that fires on every bar.
fn always_fire_pattern(name: &str, target: Decimal, stop: Decimal) -> Arc<PricePattern> {
    Arc::new(PricePattern::new(
        name,
        TradeDirection::Long,
        PatternExpr::gt(BarRef::new(PriceField::High, 0), BarRef::new(PriceField::Low, 0)),
        target,
        stop,
    ))
}

fn fixture_template(security: &Security) -> BackTester {
    let first = security.series().first_bar().unwrap().date();
    let last = security.series().last_bar().unwrap().date();
    BackTester::new(TimeStepper::Daily, DateRange::new(first, last).unwrap()).unwrap()
}

fn dummy_pattern(name: &str) -> Arc<PricePattern> {
    Arc::new(PricePattern::new(
        name,
        TradeDirection::Long,
        PatternExpr::gt(close(0), close(1)),
        dec!(2),
        dec!(1),
    ))
}

// =============================================================================
// Baseline preparation
// =============================================================================

#[test]
fn baselines_are_sorted_descending() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let executor = Executor::new(2).unwrap();

    let patterns = vec![
        always_fire_pattern("tight", dec!(0.5), dec!(0.5)),
        always_fire_pattern("wide", dec!(3.0), dec!(1.5)),
        always_fire_pattern("medium", dec!(1.5), dec!(1.0)),
    ];
    let contexts = prepare_strategy_contexts(
        &patterns,
        &security,
        &template,
        TestStatisticPolicy::CumulativeReturn,
        &executor,
    )
    .unwrap();

    assert_eq!(contexts.len(), 3);
    for pair in contexts.windows(2) {
        assert!(pair[0].baseline >= pair[1].baseline);
    }
}

// =============================================================================
// Per-pattern permutation driver
// =============================================================================

#[test]
fn permutation_p_value_is_reproducible_across_thread_counts() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let pattern = always_fire_pattern("driver pattern", dec!(2.0), dec!(1.0));

    let single = Executor::new(1).unwrap();
    let multi = Executor::new(4).unwrap();

    let run = |executor: &Executor| {
        let baseline = {
            let bt = crate::permutation::run_pattern_backtest(&template, &pattern, &security).unwrap();
            TestStatisticPolicy::CumulativeReturn.guarded_statistic(&bt).unwrap()
        };
        run_permutation_test(
            &template,
            &pattern,
            &security,
            baseline,
            200,
            TestStatisticPolicy::CumulativeReturn,
            PValueMode::Exact,
            424242,
            executor,
        )
        .unwrap()
    };

    let a = run(&single);
    let b = run(&multi);
    assert_eq!(a.p_value, b.p_value);
    assert_eq!(a.max_statistic, b.max_statistic);
    assert!(a.p_value >= Decimal::ZERO && a.p_value <= Decimal::ONE);
}

#[test]
fn different_seeds_are_independent_streams() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let pattern = always_fire_pattern("seeded pattern", dec!(2.0), dec!(1.0));
    let executor = Executor::new(2).unwrap();

    let run = |seed: u64| {
        run_permutation_test(
            &template,
            &pattern,
            &security,
            dec!(0.015),
            100,
            TestStatisticPolicy::CumulativeReturn,
            PValueMode::Exact,
            seed,
            &executor,
        )
        .unwrap()
    };

    let a = run(7);
    let b = run(7);
    assert_eq!(a.p_value, b.p_value);
    // A different seed is allowed to coincide on p but the max statistic of
    // two hundred continuous-valued backtests virtually never matches.
    let c = run(8);
    assert!(a.max_statistic != c.max_statistic || a.p_value != c.p_value);
}

#[test]
fn approximate_mode_caps_the_p_value_for_hopeless_baselines() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let pattern = always_fire_pattern("hopeless", dec!(2.0), dec!(1.0));
    let executor = Executor::new(2).unwrap();

    // A baseline below the worst case is beaten by every permutation, so
    // the approximate driver must bail out at the conservative bound.
    let result = run_permutation_test(
        &template,
        &pattern,
        &security,
        Decimal::MIN,
        200,
        TestStatisticPolicy::CumulativeReturn,
        PValueMode::Approximate,
        11,
        &executor,
    )
    .unwrap();
    assert_eq!(result.p_value, dec!(0.05));
}

#[test]
fn zero_permutations_is_rejected() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let pattern = always_fire_pattern("zero", dec!(2.0), dec!(1.0));
    let executor = Executor::new(1).unwrap();

    assert!(run_permutation_test(
        &template,
        &pattern,
        &security,
        dec!(0),
        0,
        TestStatisticPolicy::CumulativeReturn,
        PValueMode::Exact,
        1,
        &executor,
    )
    .is_err());
}

// =============================================================================
// Masters step-down
// =============================================================================

#[test]
fn masters_fast_is_deterministic() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let executor = Executor::new(3).unwrap();

    let patterns = vec![
        always_fire_pattern("a", dec!(2.0), dec!(1.0)),
        always_fire_pattern("b", dec!(1.0), dec!(0.8)),
        always_fire_pattern("c", dec!(3.0), dec!(1.2)),
    ];
    let contexts = prepare_strategy_contexts(
        &patterns,
        &security,
        &template,
        TestStatisticPolicy::CumulativeReturn,
        &executor,
    )
    .unwrap();

    let validation = MastersValidation::new(60, TestStatisticPolicy::CumulativeReturn, 99).unwrap();
    let first = validation.run_fast(&contexts, &template, &security, &executor).unwrap();
    let second = validation.run_fast(&contexts, &template, &security, &executor).unwrap();

    assert_eq!(first.adjusted_p_values.len(), second.adjusted_p_values.len());
    for (a, b) in first.adjusted_p_values.iter().zip(&second.adjusted_p_values) {
        assert_eq!(a.0.name(), b.0.name());
        assert_eq!(a.1, b.1);
    }
}

#[test]
fn masters_adjusted_p_values_are_monotone_non_decreasing() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let executor = Executor::new(3).unwrap();

    let patterns = vec![
        always_fire_pattern("a", dec!(2.0), dec!(1.0)),
        always_fire_pattern("b", dec!(1.0), dec!(0.8)),
        always_fire_pattern("c", dec!(3.0), dec!(1.2)),
        always_fire_pattern("d", dec!(0.6), dec!(0.6)),
    ];
    let contexts = prepare_strategy_contexts(
        &patterns,
        &security,
        &template,
        TestStatisticPolicy::CumulativeReturn,
        &executor,
    )
    .unwrap();

    let validation = MastersValidation::new(50, TestStatisticPolicy::CumulativeReturn, 5).unwrap();
    for result in [
        validation.run_fast(&contexts, &template, &security, &executor).unwrap(),
        validation.run_slow(&contexts, &template, &security, &executor).unwrap(),
    ] {
        assert_eq!(result.adjusted_p_values.len(), contexts.len());
        for pair in result.adjusted_p_values.windows(2) {
            assert!(pair[0].1 <= pair[1].1, "step-down p-values must not decrease");
        }
    }
}

#[test]
fn masters_fast_and_slow_agree_on_the_top_pattern_and_fast_is_conservative() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let executor = Executor::new(2).unwrap();

    let patterns = vec![
        always_fire_pattern("a", dec!(2.0), dec!(1.0)),
        always_fire_pattern("b", dec!(1.2), dec!(0.9)),
        always_fire_pattern("c", dec!(2.8), dec!(1.4)),
    ];
    let contexts = prepare_strategy_contexts(
        &patterns,
        &security,
        &template,
        TestStatisticPolicy::CumulativeReturn,
        &executor,
    )
    .unwrap();

    let validation = MastersValidation::new(40, TestStatisticPolicy::CumulativeReturn, 77).unwrap();
    let fast = validation.run_fast(&contexts, &template, &security, &executor).unwrap();
    let slow = validation.run_slow(&contexts, &template, &security, &executor).unwrap();

    // The first step tests against the full active set in both variants, so
    // the top pattern's adjusted p-value matches exactly.
    assert_eq!(fast.adjusted_p_values[0].1, slow.adjusted_p_values[0].1);

    // The fast sweep counts against the global maximum, which can only be
    // larger than the shrinking active-set maximum, so anything the fast
    // variant accepts the slow variant must accept as well.
    let slow_names: Vec<&str> = slow.survivors.iter().map(|p| p.name()).collect();
    for survivor in &fast.survivors {
        assert!(slow_names.contains(&survivor.name()));
    }
}

#[test]
fn masters_single_pattern_fast_equals_slow_exactly() {
    let security = fixture_security();
    let template = fixture_template(&security);
    let executor = Executor::new(2).unwrap();

    let patterns = vec![always_fire_pattern("solo", dec!(2.0), dec!(1.0))];
    let contexts = prepare_strategy_contexts(
        &patterns,
        &security,
        &template,
        TestStatisticPolicy::CumulativeReturn,
        &executor,
    )
    .unwrap();

    let validation = MastersValidation::new(80, TestStatisticPolicy::CumulativeReturn, 3).unwrap();
    let fast = validation.run_fast(&contexts, &template, &security, &executor).unwrap();
    let slow = validation.run_slow(&contexts, &template, &security, &executor).unwrap();

    assert_eq!(fast.adjusted_p_values[0].1, slow.adjusted_p_values[0].1);
    assert_eq!(fast.survivors.len(), slow.survivors.len());
}

// =============================================================================
// Benjamini-Hochberg and friends on literal inputs
// =============================================================================

const LITERAL_P_VALUES: [&str; 12] = [
    "0.001", "0.008", "0.039", "0.041", "0.042", "0.06", "0.074", "0.205", "0.212", "0.216",
    "0.222", "0.447",
];

fn literal_entries() -> Vec<(Decimal, Arc<PricePattern>)> {
    LITERAL_P_VALUES
        .iter()
        .enumerate()
        .map(|(i, p)| {
            (
                p.parse::<Decimal>().unwrap(),
                dummy_pattern(&format!("literal {i}")),
            )
        })
        .collect()
}

#[test]
fn benjamini_hochberg_on_the_literal_inputs() {
    // Largest rank r with p(r) <= (r/12) * 0.25 is r = 11
    // (0.222 <= 11/12 * 0.25 = 0.22917).
    let mut bh = BenjaminiHochbergFdr::with_fdr(dec!(0.25));
    for (p, pattern) in literal_entries() {
        bh.add_strategy(p, pattern);
    }
    bh.correct_for_multiple_tests();
    assert_eq!(bh.survivors().len(), 11);

    // At the conventional 0.05 rate only the two smallest survive
    // (0.008 <= 2/12 * 0.05).
    let mut strict = BenjaminiHochbergFdr::with_fdr(dec!(0.05));
    for (p, pattern) in literal_entries() {
        strict.add_strategy(p, pattern);
    }
    strict.correct_for_multiple_tests();
    assert_eq!(strict.survivors().len(), 2);
}

#[test]
fn unadjusted_selection_keeps_the_first_five_literal_inputs() {
    let mut selection = UnadjustedPValueSelection::new();
    for (p, pattern) in literal_entries() {
        selection.add_strategy(p, pattern);
    }
    selection.correct_for_multiple_tests();
    // p < 0.05 admits exactly 0.001 through 0.042.
    assert_eq!(selection.survivors().len(), 5);
}

#[test]
fn benjamini_hochberg_empty_container_is_a_no_op() {
    let mut bh = BenjaminiHochbergFdr::new();
    bh.correct_for_multiple_tests();
    assert!(bh.survivors().is_empty());
}

#[test]
fn adaptive_bh_relaxes_critical_values_when_slopes_break() {
    // Eleven small-to-moderate p-values followed by one large one: the
    // slope sequence rises until the last entry, where s = 0.3 gives
    // m' = ceil(1/0.3) + 1 = 5.
    let p_values = [
        "0.01", "0.02", "0.03", "0.04", "0.05", "0.06", "0.07", "0.08", "0.09", "0.15", "0.2",
        "0.7",
    ];
    let build = |adaptive: bool| -> usize {
        if adaptive {
            let mut c = AdaptiveBenjaminiHochberg::with_fdr(dec!(0.20));
            for (i, p) in p_values.iter().enumerate() {
                c.add_strategy(p.parse().unwrap(), dummy_pattern(&format!("adaptive {i}")));
            }
            c.correct_for_multiple_tests();
            c.survivors().len()
        } else {
            let mut c = BenjaminiHochbergFdr::with_fdr(dec!(0.20));
            for (i, p) in p_values.iter().enumerate() {
                c.add_strategy(p.parse().unwrap(), dummy_pattern(&format!("plain {i}")));
            }
            c.correct_for_multiple_tests();
            c.survivors().len()
        }
    };

    // With m' = 5 the critical value at rank 11 is 11/5 * 0.20 = 0.44, so
    // p = 0.2 clears it; plain BH stops at rank 10.
    assert_eq!(build(true), 11);
    assert_eq!(build(false), 10);
}

// =============================================================================
// Romano-Wolf and Holm-Romano-Wolf
// =============================================================================

fn romano_wolf_fixture() -> (Vec<CorrectionEntry>, Vec<Decimal>) {
    let entries = vec![
        CorrectionEntry::new(dec!(0.01), dec!(9.5), dummy_pattern("strong")),
        CorrectionEntry::new(dec!(0.02), dec!(7.5), dummy_pattern("middle")),
        CorrectionEntry::new(dec!(0.03), dec!(2.5), dummy_pattern("weak")),
    ];
    let null: Vec<Decimal> = (1..=10).map(Decimal::from).collect();
    (entries, null)
}

#[test]
fn romano_wolf_adjusted_values_match_hand_computation() {
    let (entries, null) = romano_wolf_fixture();
    let mut correction = RomanoWolfStepdown::new();
    for e in entries {
        correction.add_strategy(e);
    }
    correction.set_synthetic_null_distribution(null);
    correction.correct_for_multiple_tests();

    // emp-p values against the null 1..10 are 0.1, 0.3, 0.8; candidates
    // 0.1*3/1, 0.3*3/2, 0.8*3/3 → 0.3, 0.45, 0.8 after the min-monotone
    // backward walk.
    let adjusted: Vec<Decimal> = correction.entries().iter().map(|e| e.p_value).collect();
    assert_eq!(adjusted, vec![dec!(0.3), dec!(0.45), dec!(0.8)]);

    // Step-down monotonicity: non-decreasing in ascending original-p order.
    for pair in adjusted.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    assert!(correction.survivors().is_empty());
}

#[test]
fn holm_romano_wolf_adjusted_values_match_hand_computation() {
    let (entries, null) = romano_wolf_fixture();
    let mut correction = HolmRomanoWolf::new();
    for e in entries {
        correction.add_strategy(e);
    }
    correction.set_synthetic_null_distribution(null);
    correction.correct_for_multiple_tests();

    // Forward walk: candidates 0.1*3, 0.3*2, 0.8*1 → 0.3, 0.6, 0.8 under
    // the max-monotone rule.
    let adjusted: Vec<Decimal> = correction.entries().iter().map(|e| e.p_value).collect();
    assert_eq!(adjusted, vec![dec!(0.3), dec!(0.6), dec!(0.8)]);

    for pair in adjusted.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn romano_wolf_survivors_emerge_with_a_weak_null() {
    // Null far below the observed statistics: every empirical p-value is
    // zero and everything survives.
    let mut correction = RomanoWolfStepdown::new();
    correction.add_strategy(CorrectionEntry::new(dec!(0.01), dec!(9.5), dummy_pattern("a")));
    correction.add_strategy(CorrectionEntry::new(dec!(0.02), dec!(7.5), dummy_pattern("b")));
    correction.set_synthetic_null_distribution(vec![dec!(0.1), dec!(0.2), dec!(0.3)]);
    correction.correct_for_multiple_tests();
    assert_eq!(correction.survivors().len(), 2);
}

#[test]
fn romano_wolf_defaults_to_max_statistics_as_null() {
    let mut correction = RomanoWolfStepdown::new();
    correction.add_strategy(CorrectionEntry::new(dec!(0.01), dec!(5), dummy_pattern("a")));
    correction.add_strategy(CorrectionEntry::new(dec!(0.02), dec!(4), dummy_pattern("b")));
    correction.correct_for_multiple_tests();
    // With the entries' own max statistics as the null, the weakest entry
    // always has empirical p-value 1 and cannot survive.
    assert!(correction.entries().last().unwrap().p_value >= Decimal::ONE);
}
