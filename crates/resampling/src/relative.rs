use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use market_data::{OhlcSeries, TimeFrame, VolumeUnit};

use crate::error::ResamplingError;

/// Per-bar relative price factors of a series.
///
/// For bar t: `r_open[t] = O_t / C_{t-1}` (the overnight gap, 1 for the first
/// bar) and `r_high/r_low/r_close[t] = H_t/O_t, L_t/O_t, C_t/O_t` (intraday
/// geometry). The first bar's intraday factors are taken against its own
/// open, so integrating the unshuffled factors reproduces the source series.
#[derive(Debug, Clone)]
pub struct RelativeFactors {
    pub(crate) first_open: Decimal,
    pub(crate) r_open: Vec<Decimal>,
    pub(crate) r_high: Vec<Decimal>,
    pub(crate) r_low: Vec<Decimal>,
    pub(crate) r_close: Vec<Decimal>,
    pub(crate) timestamps: Vec<NaiveDateTime>,
    pub(crate) time_frame: TimeFrame,
    pub(crate) volume_unit: VolumeUnit,
}

impl RelativeFactors {
    pub fn from_series(series: &OhlcSeries) -> Result<Self, ResamplingError> {
        let bars = series.bars();
        if bars.is_empty() {
            return Err(ResamplingError::SeriesTooShort(
                "relative factors need at least one bar".into(),
            ));
        }

        let n = bars.len();
        let mut r_open = Vec::with_capacity(n);
        let mut r_high = Vec::with_capacity(n);
        let mut r_low = Vec::with_capacity(n);
        let mut r_close = Vec::with_capacity(n);
        let mut timestamps = Vec::with_capacity(n);

        let first = &bars[0];
        let first_open = first.open();
        r_open.push(Decimal::ONE);
        r_high.push(first.high() / first_open);
        r_low.push(first.low() / first_open);
        r_close.push(first.close() / first_open);
        timestamps.push(first.timestamp());

        for window in bars.windows(2) {
            let (prev, bar) = (&window[0], &window[1]);
            let open = bar.open();
            r_open.push(open / prev.close());
            r_high.push(bar.high() / open);
            r_low.push(bar.low() / open);
            r_close.push(bar.close() / open);
            timestamps.push(bar.timestamp());
        }

        Ok(RelativeFactors {
            first_open,
            r_open,
            r_high,
            r_low,
            r_close,
            timestamps,
            time_frame: series.time_frame(),
            volume_unit: series.volume_unit(),
        })
    }

    pub fn len(&self) -> usize {
        self.r_open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.r_open.is_empty()
    }

    pub fn first_open(&self) -> Decimal {
        self.first_open
    }

    pub fn relative_open(&self) -> &[Decimal] {
        &self.r_open
    }

    pub fn relative_high(&self) -> &[Decimal] {
        &self.r_high
    }

    pub fn relative_low(&self) -> &[Decimal] {
        &self.r_low
    }

    pub fn relative_close(&self) -> &[Decimal] {
        &self.r_close
    }
}
