//! Compiled price patterns.
//!
//! A pattern is a boolean expression over lagged OHLC bar fields, reduced to
//! greater-than comparisons joined by logical AND. The expression tree is
//! compiled once into a closure; evaluation at a bar does no tree walking
//! and no allocation. All comparisons use decimal semantics.

use std::sync::Arc;

use rust_decimal::Decimal;

use market_data::OhlcSeries;

/// Which field of a bar a leaf reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

/// A leaf: one field of the bar `offset` bars ago.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarRef {
    pub field: PriceField,
    pub offset: usize,
}

impl BarRef {
    pub fn new(field: PriceField, offset: usize) -> Self {
        BarRef { field, offset }
    }
}

/// Pattern expression tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternExpr {
    Gt(BarRef, BarRef),
    And(Box<PatternExpr>, Box<PatternExpr>),
}

impl PatternExpr {
    /// Convenience constructor for `lhs > rhs`.
    pub fn gt(lhs: BarRef, rhs: BarRef) -> Self {
        PatternExpr::Gt(lhs, rhs)
    }

    pub fn and(lhs: PatternExpr, rhs: PatternExpr) -> Self {
        PatternExpr::And(Box::new(lhs), Box::new(rhs))
    }

    /// Largest bar offset referenced anywhere in the tree.
    pub fn max_bars_back(&self) -> usize {
        match self {
            PatternExpr::Gt(a, b) => a.offset.max(b.offset),
            PatternExpr::And(l, r) => l.max_bars_back().max(r.max_bars_back()),
        }
    }
}

type Evaluator = Arc<dyn Fn(&OhlcSeries, usize) -> bool + Send + Sync>;
type Leaf = Arc<dyn Fn(&OhlcSeries, usize) -> Option<Decimal> + Send + Sync>;

fn compile_leaf(bar_ref: BarRef) -> Leaf {
    let BarRef { field, offset } = bar_ref;
    match field {
        PriceField::Open => Arc::new(move |s, i| s.open_at(i, offset).ok()),
        PriceField::High => Arc::new(move |s, i| s.high_at(i, offset).ok()),
        PriceField::Low => Arc::new(move |s, i| s.low_at(i, offset).ok()),
        PriceField::Close => Arc::new(move |s, i| s.close_at(i, offset).ok()),
        PriceField::Volume => Arc::new(move |s, i| s.volume_at(i, offset).ok()),
    }
}

fn compile(expr: &PatternExpr) -> Evaluator {
    match expr {
        PatternExpr::Gt(lhs, rhs) => {
            let left = compile_leaf(*lhs);
            let right = compile_leaf(*rhs);
            Arc::new(move |series, index| match (left(series, index), right(series, index)) {
                (Some(l), Some(r)) => l > r,
                _ => false,
            })
        }
        PatternExpr::And(lhs, rhs) => {
            let left = compile(lhs);
            let right = compile(rhs);
            Arc::new(move |series, index| left(series, index) && right(series, index))
        }
    }
}

/// Side a pattern trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    pub fn name(&self) -> &'static str {
        match self {
            TradeDirection::Long => "long",
            TradeDirection::Short => "short",
        }
    }
}

/// A compiled trading pattern: the entry condition plus its exit geometry.
///
/// Profit target and stop loss are percentages of the entry fill (2.5 means
/// 2.5%). Patterns are immutable and shared read-only across permutation
/// workers.
#[derive(Clone)]
pub struct PricePattern {
    name: String,
    direction: TradeDirection,
    expr: PatternExpr,
    profit_target_pct: Decimal,
    stop_loss_pct: Decimal,
    max_bars_back: usize,
    evaluator: Evaluator,
}

impl PricePattern {
    pub fn new(
        name: impl Into<String>,
        direction: TradeDirection,
        expr: PatternExpr,
        profit_target_pct: Decimal,
        stop_loss_pct: Decimal,
    ) -> Self {
        let max_bars_back = expr.max_bars_back();
        let evaluator = compile(&expr);
        PricePattern {
            name: name.into(),
            direction,
            expr,
            profit_target_pct,
            stop_loss_pct,
            max_bars_back,
            evaluator,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> TradeDirection {
        self.direction
    }

    pub fn is_long(&self) -> bool {
        self.direction == TradeDirection::Long
    }

    pub fn expr(&self) -> &PatternExpr {
        &self.expr
    }

    pub fn profit_target_pct(&self) -> Decimal {
        self.profit_target_pct
    }

    pub fn stop_loss_pct(&self) -> Decimal {
        self.stop_loss_pct
    }

    pub fn max_bars_back(&self) -> usize {
        self.max_bars_back
    }

    /// Evaluate at the bar `index`. Bars reaching before the start of the
    /// series make the pattern false; the backtester additionally gates on
    /// processed-bar count so warm-up bars never fire.
    pub fn evaluate(&self, series: &OhlcSeries, index: usize) -> bool {
        (self.evaluator)(series, index)
    }
}

impl std::fmt::Debug for PricePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PricePattern")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("expr", &self.expr)
            .field("profit_target_pct", &self.profit_target_pct)
            .field("stop_loss_pct", &self.stop_loss_pct)
            .field("max_bars_back", &self.max_bars_back)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use market_data::{OhlcBar, TimeFrame, VolumeUnit};
    use rust_decimal_macros::dec;

    fn series(closes: &[(u32, f64, f64, f64, f64)]) -> OhlcSeries {
        use rust_decimal::prelude::FromPrimitive;
        let mut s = OhlcSeries::new(TimeFrame::Daily, VolumeUnit::Shares);
        for &(d, o, h, l, c) in closes {
            s.add_bar(
                OhlcBar::from_date(
                    NaiveDate::from_ymd_opt(2021, 1, d).unwrap(),
                    Decimal::from_f64(o).unwrap(),
                    Decimal::from_f64(h).unwrap(),
                    Decimal::from_f64(l).unwrap(),
                    Decimal::from_f64(c).unwrap(),
                    dec!(0),
                    TimeFrame::Daily,
                )
                .unwrap(),
            )
            .unwrap();
        }
        s
    }

    fn close(offset: usize) -> BarRef {
        BarRef::new(PriceField::Close, offset)
    }

    #[test]
    fn gt_compares_lagged_closes() {
        let s = series(&[
            (4, 100.0, 101.0, 99.0, 100.0),
            (5, 100.0, 102.0, 99.5, 101.0),
            (6, 101.0, 103.0, 100.0, 102.0),
        ]);
        let up = PricePattern::new(
            "close rising",
            TradeDirection::Long,
            PatternExpr::gt(close(0), close(1)),
            dec!(2),
            dec!(1),
        );
        assert!(up.evaluate(&s, 2));
        assert!(up.evaluate(&s, 1));
        // Offset walks before the series start: never fires.
        assert!(!up.evaluate(&s, 0));
    }

    #[test]
    fn and_requires_both_sides() {
        let s = series(&[
            (4, 100.0, 101.0, 99.0, 100.0),
            (5, 100.0, 102.0, 99.5, 101.0),
            (6, 101.0, 103.0, 100.0, 100.5),
        ]);
        // Close up vs yesterday AND close up vs two days ago.
        let expr = PatternExpr::and(
            PatternExpr::gt(close(0), close(1)),
            PatternExpr::gt(close(0), close(2)),
        );
        let p = PricePattern::new("two-bar momentum", TradeDirection::Long, expr, dec!(2), dec!(1));
        // Day 6: close 100.5 < 101 → first clause false.
        assert!(!p.evaluate(&s, 2));
    }

    #[test]
    fn max_bars_back_is_the_deepest_offset() {
        let expr = PatternExpr::and(
            PatternExpr::gt(close(1), close(4)),
            PatternExpr::gt(BarRef::new(PriceField::High, 0), BarRef::new(PriceField::Low, 7)),
        );
        assert_eq!(expr.max_bars_back(), 7);
    }
}
