//! Candidate pattern universe.
//!
//! A fixed grammar of momentum and mean-reversion comparisons over lagged
//! closes, long and short, with profit-target and stop widths calibrated on
//! the in-sample return distribution. These are the hypotheses the Monte
//! Carlo machinery then tries to explain away as chance.

use std::sync::Arc;

use backtest_engine::{BarRef, PatternExpr, PriceField, PricePattern, TradeDirection};
use indicators::{long_stop_and_target, short_stop_and_target, IndicatorError, StopTargetMethod};
use market_data::OhlcSeries;

fn close(offset: usize) -> BarRef {
    BarRef::new(PriceField::Close, offset)
}

/// Build the candidate set from the in-sample series.
pub fn candidate_patterns(insample: &OhlcSeries) -> Result<Vec<Arc<PricePattern>>, IndicatorError> {
    let method = StopTargetMethod::TypicalDayCalibratedAlpha;
    let long_widths = long_stop_and_target(insample, 1, method)?;
    let short_widths = short_stop_and_target(insample, 1, method)?;

    let mut patterns = Vec::new();

    for lag in 1..=3usize {
        // Momentum: close above the lagged close trades with the move.
        patterns.push(Arc::new(PricePattern::new(
            format!("long momentum {lag}"),
            TradeDirection::Long,
            PatternExpr::gt(close(0), close(lag)),
            long_widths.profit_width,
            long_widths.stop_width,
        )));
        patterns.push(Arc::new(PricePattern::new(
            format!("short momentum {lag}"),
            TradeDirection::Short,
            PatternExpr::gt(close(lag), close(0)),
            short_widths.profit_width,
            short_widths.stop_width,
        )));

        // Mean reversion: fade the same comparison.
        patterns.push(Arc::new(PricePattern::new(
            format!("long reversal {lag}"),
            TradeDirection::Long,
            PatternExpr::gt(close(lag), close(0)),
            long_widths.profit_width,
            long_widths.stop_width,
        )));
        patterns.push(Arc::new(PricePattern::new(
            format!("short reversal {lag}"),
            TradeDirection::Short,
            PatternExpr::gt(close(0), close(lag)),
            short_widths.profit_width,
            short_widths.stop_width,
        )));
    }

    // Two-bar runs in both directions.
    patterns.push(Arc::new(PricePattern::new(
        "long two-bar run",
        TradeDirection::Long,
        PatternExpr::and(
            PatternExpr::gt(close(0), close(1)),
            PatternExpr::gt(close(1), close(2)),
        ),
        long_widths.profit_width,
        long_widths.stop_width,
    )));
    patterns.push(Arc::new(PricePattern::new(
        "short two-bar run",
        TradeDirection::Short,
        PatternExpr::and(
            PatternExpr::gt(close(1), close(0)),
            PatternExpr::gt(close(2), close(1)),
        ),
        short_widths.profit_width,
        short_widths.stop_width,
    )));

    Ok(patterns)
}
