//! Positions and the closed-trade ledger.

use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use market_data::num::to_f64;

use crate::error::BacktestError;
use crate::pattern::TradeDirection;

/// One position unit: exactly one entry fill, at most one exit fill.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    symbol: String,
    direction: TradeDirection,
    entry_date: NaiveDate,
    entry_price: Decimal,
    volume: Decimal,
    profit_target_price: Decimal,
    stop_price: Decimal,
    /// Stop distance from entry in price units (the "R" of an R-multiple).
    r_multiple_stop: Decimal,
    bars_in_position: u32,
    exit: Option<(NaiveDate, Decimal)>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: impl Into<String>,
        direction: TradeDirection,
        entry_date: NaiveDate,
        entry_price: Decimal,
        volume: Decimal,
        profit_target_price: Decimal,
        stop_price: Decimal,
    ) -> Self {
        let r_multiple_stop = (entry_price - stop_price).abs();
        Position {
            symbol: symbol.into(),
            direction,
            entry_date,
            entry_price,
            volume,
            profit_target_price,
            stop_price,
            r_multiple_stop,
            bars_in_position: 1,
            exit: None,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn direction(&self) -> TradeDirection {
        self.direction
    }

    pub fn entry_date(&self) -> NaiveDate {
        self.entry_date
    }

    pub fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    pub fn volume(&self) -> Decimal {
        self.volume
    }

    pub fn profit_target_price(&self) -> Decimal {
        self.profit_target_price
    }

    pub fn stop_price(&self) -> Decimal {
        self.stop_price
    }

    pub fn r_multiple_stop(&self) -> Decimal {
        self.r_multiple_stop
    }

    pub fn bars_in_position(&self) -> u32 {
        self.bars_in_position
    }

    pub fn record_bar(&mut self) {
        self.bars_in_position += 1;
    }

    pub fn close(&mut self, exit_date: NaiveDate, exit_price: Decimal) {
        self.exit = Some((exit_date, exit_price));
    }

    pub fn is_closed(&self) -> bool {
        self.exit.is_some()
    }

    pub fn exit_date(&self) -> Option<NaiveDate> {
        self.exit.map(|(d, _)| d)
    }

    pub fn exit_price(&self) -> Option<Decimal> {
        self.exit.map(|(_, p)| p)
    }

    /// A closed position wins if the exit favors its direction beyond entry.
    pub fn is_winner(&self) -> bool {
        match (self.exit, self.direction) {
            (Some((_, exit)), TradeDirection::Long) => exit > self.entry_price,
            (Some((_, exit)), TradeDirection::Short) => exit < self.entry_price,
            (None, _) => false,
        }
    }

    /// Fractional return of the closed trade, sign-adjusted for shorts.
    pub fn fractional_return(&self) -> Decimal {
        match (self.exit, self.direction) {
            (Some((_, exit)), TradeDirection::Long) => (exit - self.entry_price) / self.entry_price,
            (Some((_, exit)), TradeDirection::Short) => (self.entry_price - exit) / self.entry_price,
            (None, _) => Decimal::ZERO,
        }
    }

    /// Profit in units of the risk taken: `(exit - entry) / (entry - stop)`
    /// for longs, sign-adjusted for shorts. Zero when the position carried
    /// no stop distance.
    pub fn r_multiple(&self) -> Decimal {
        if self.r_multiple_stop.is_zero() {
            return Decimal::ZERO;
        }
        match (self.exit, self.direction) {
            (Some((_, exit)), TradeDirection::Long) => (exit - self.entry_price) / self.r_multiple_stop,
            (Some((_, exit)), TradeDirection::Short) => (self.entry_price - exit) / self.r_multiple_stop,
            (None, _) => Decimal::ZERO,
        }
    }
}

/// Append-only ledger of closed positions plus the derived statistics the
/// permutation policies consume.
#[derive(Debug, Clone, Default)]
pub struct ClosedTradeHistory {
    trades: Vec<Position>,
}

impl ClosedTradeHistory {
    pub fn new() -> Self {
        ClosedTradeHistory::default()
    }

    pub fn push(&mut self, position: Position) {
        debug_assert!(position.is_closed());
        self.trades.push(position);
    }

    pub fn trades(&self) -> &[Position] {
        &self.trades
    }

    pub fn num_trades(&self) -> usize {
        self.trades.len()
    }

    pub fn num_winners(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }

    pub fn num_losers(&self) -> usize {
        self.num_trades() - self.num_winners()
    }

    /// Winners over winners-plus-losers.
    pub fn pal_profitability(&self) -> Result<Decimal, BacktestError> {
        if self.trades.is_empty() {
            return Err(BacktestError::EmptyTradeHistory);
        }
        Ok(Decimal::from(self.num_winners()) / Decimal::from(self.num_trades()))
    }

    /// Compounded return across closed trades.
    pub fn cumulative_return(&self) -> Decimal {
        let mut compounded = Decimal::ONE;
        for trade in &self.trades {
            compounded *= Decimal::ONE + trade.fractional_return();
        }
        compounded - Decimal::ONE
    }

    /// Gross winning return over gross losing return.
    pub fn profit_factor(&self) -> Result<Decimal, BacktestError> {
        if self.trades.is_empty() {
            return Err(BacktestError::EmptyTradeHistory);
        }
        let gross_wins: Decimal = self
            .trades
            .iter()
            .map(|t| t.fractional_return())
            .filter(|r| *r > Decimal::ZERO)
            .sum();
        let gross_losses: Decimal = self
            .trades
            .iter()
            .map(|t| t.fractional_return())
            .filter(|r| *r < Decimal::ZERO)
            .map(|r| -r)
            .sum();
        if gross_losses.is_zero() {
            return Ok(Decimal::MAX);
        }
        Ok(gross_wins / gross_losses)
    }

    /// Average win over average loss.
    pub fn payoff_ratio(&self) -> Result<Decimal, BacktestError> {
        if self.trades.is_empty() {
            return Err(BacktestError::EmptyTradeHistory);
        }
        let wins: Vec<Decimal> = self
            .trades
            .iter()
            .map(|t| t.fractional_return())
            .filter(|r| *r > Decimal::ZERO)
            .collect();
        let losses: Vec<Decimal> = self
            .trades
            .iter()
            .map(|t| t.fractional_return())
            .filter(|r| *r < Decimal::ZERO)
            .map(|r| -r)
            .collect();
        if losses.is_empty() || wins.is_empty() {
            return Ok(if wins.is_empty() { Decimal::ZERO } else { Decimal::MAX });
        }
        let avg_win: Decimal = wins.iter().sum::<Decimal>() / Decimal::from(wins.len());
        let avg_loss: Decimal = losses.iter().sum::<Decimal>() / Decimal::from(losses.len());
        Ok(avg_win / avg_loss)
    }

    /// Pessimistic return ratio: shrink the win side and inflate the loss
    /// side by one standard error each before taking the ratio.
    /// `(W·avg_win - sqrt(W)·sd_win) / (L·avg_loss + sqrt(L)·sd_loss)`.
    pub fn pessimistic_return_ratio(&self) -> Result<Decimal, BacktestError> {
        if self.trades.is_empty() {
            return Err(BacktestError::EmptyTradeHistory);
        }
        let wins: Vec<f64> = self
            .trades
            .iter()
            .map(|t| to_f64(t.fractional_return()))
            .filter(|r| *r > 0.0)
            .collect();
        let losses: Vec<f64> = self
            .trades
            .iter()
            .map(|t| to_f64(t.fractional_return()))
            .filter(|r| *r < 0.0)
            .map(f64::abs)
            .collect();

        let moments = |v: &[f64]| -> (f64, f64, f64) {
            if v.is_empty() {
                return (0.0, 0.0, 0.0);
            }
            let n = v.len() as f64;
            let mean = v.iter().sum::<f64>() / n;
            let var = v.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
            (n, mean, var.sqrt())
        };

        let (w, avg_win, sd_win) = moments(&wins);
        let (l, avg_loss, sd_loss) = moments(&losses);

        let numerator = (w * avg_win - w.sqrt() * sd_win).max(0.0);
        let denominator = l * avg_loss + l.sqrt() * sd_loss;
        if denominator == 0.0 {
            return Ok(Decimal::MAX);
        }
        Ok(Decimal::from_f64(numerator / denominator).unwrap_or_default())
    }

    /// Total bars spent in the market across closed trades.
    pub fn num_bars_in_market(&self) -> u32 {
        self.trades.iter().map(|t| t.bars_in_position()).sum()
    }

    /// Mean R-multiple over closed trades.
    pub fn r_multiple_expectancy(&self) -> Result<Decimal, BacktestError> {
        if self.trades.is_empty() {
            return Err(BacktestError::EmptyTradeHistory);
        }
        let total: Decimal = self.trades.iter().map(|t| t.r_multiple()).sum();
        Ok(total / Decimal::from(self.trades.len()))
    }

    /// Median profitability over a bootstrap of the win/loss outcomes.
    ///
    /// 201 resamples with replacement under a fixed seed, so the statistic
    /// is a pure function of the trade ledger.
    pub fn median_pal_profitability(&self) -> Result<Decimal, BacktestError> {
        const REPLICATES: usize = 201;

        if self.trades.is_empty() {
            return Err(BacktestError::EmptyTradeHistory);
        }
        let outcomes: Vec<bool> = self.trades.iter().map(|t| t.is_winner()).collect();
        let n = outcomes.len();

        let mut rng = ChaCha8Rng::seed_from_u64(0x9E37_79B9 ^ n as u64);
        let mut profitabilities: Vec<f64> = (0..REPLICATES)
            .map(|_| {
                let winners = (0..n).filter(|_| outcomes[rng.gen_range(0..n)]).count();
                winners as f64 / n as f64
            })
            .collect();
        profitabilities.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(Decimal::from_f64(profitabilities[REPLICATES / 2]).unwrap_or_default())
    }
}
