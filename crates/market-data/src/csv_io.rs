//! Readers and writers for the historical-data CSV dialects the validator
//! accepts: PAL end-of-day / intraday / volume-for-close, TradeStation
//! end-of-day / intraday, CSI extended futures, and Wealth-Lab.
//!
//! Prices are rounded to the security's tick as they are loaded, so every
//! downstream computation sees tradable prices.

use std::io::Write;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::bar::{OhlcBar, TimeFrame, VolumeUnit};
use crate::error::MarketDataError;
use crate::num::{parse_decimal, round_to_tick};
use crate::series::OhlcSeries;

/// Line terminator for the writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// First sequence number in PAL intraday files.
const PAL_INTRADAY_FIRST_SEQ: i64 = 10_000_001;

/// Anchor timestamp used to give PAL intraday sequence numbers a timeline.
fn pal_intraday_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2000, 1, 3)
        .expect("fixed epoch date")
        .and_hms_opt(9, 0, 0)
        .expect("fixed epoch time")
}

fn reject_intraday(time_frame: TimeFrame, format: &str) -> Result<(), MarketDataError> {
    if time_frame == TimeFrame::Intraday {
        return Err(MarketDataError::UnsupportedTimeFrame(format!(
            "{format} files carry end-of-day data, not intraday"
        )));
    }
    Ok(())
}

fn parse_price(field: &str, tick: Decimal, tick_div2: Decimal) -> Result<Decimal, MarketDataError> {
    Ok(round_to_tick(parse_decimal(field)?, tick, tick_div2))
}

fn field<'a>(record: &'a csv::StringRecord, idx: usize, line: u64) -> Result<&'a str, MarketDataError> {
    record.get(idx).ok_or(MarketDataError::MalformedRecord {
        line,
        reason: format!("missing column {idx}"),
    })
}

fn parse_compact_date(s: &str, line: u64) -> Result<NaiveDate, MarketDataError> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").map_err(|_| MarketDataError::MalformedRecord {
        line,
        reason: format!("bad YYYYMMDD date '{s}'"),
    })
}

fn parse_us_date(s: &str, line: u64) -> Result<NaiveDate, MarketDataError> {
    NaiveDate::parse_from_str(s.trim(), "%m/%d/%Y").map_err(|_| MarketDataError::MalformedRecord {
        line,
        reason: format!("bad MM/dd/yyyy date '{s}'"),
    })
}

// ---------------------------------------------------------------------------
// PAL formats
// ---------------------------------------------------------------------------

/// PAL EOD: `YYYYMMDD,open,high,low,close`, no header, no volume column.
pub fn read_pal_eod(
    path: impl AsRef<Path>,
    time_frame: TimeFrame,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    reject_intraday(time_frame, "PAL EOD")?;
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut series = OhlcSeries::new(time_frame, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 1;
        let date = parse_compact_date(field(&record, 0, line)?, line)?;
        let bar = OhlcBar::from_date(
            date,
            parse_price(field(&record, 1, line)?, tick, tick_div2)?,
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            parse_price(field(&record, 4, line)?, tick, tick_div2)?,
            Decimal::ZERO,
            time_frame,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

/// PAL intraday: `seq open high low close`, space separated, sequence counter
/// starting at 10,000,001. Sequence numbers are mapped onto a fixed minute
/// timeline so bars stay strictly ordered.
pub fn read_pal_intraday(
    path: impl AsRef<Path>,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut series = OhlcSeries::new(TimeFrame::Intraday, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 1;
        let seq: i64 = field(&record, 0, line)?
            .parse()
            .map_err(|_| MarketDataError::MalformedRecord {
                line,
                reason: "bad sequence number".into(),
            })?;
        if seq < PAL_INTRADAY_FIRST_SEQ {
            return Err(MarketDataError::MalformedRecord {
                line,
                reason: format!("sequence {seq} below {PAL_INTRADAY_FIRST_SEQ}"),
            });
        }
        let timestamp = pal_intraday_epoch() + chrono::Duration::minutes(seq - PAL_INTRADAY_FIRST_SEQ);
        let bar = OhlcBar::new(
            timestamp,
            parse_price(field(&record, 1, line)?, tick, tick_div2)?,
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            parse_price(field(&record, 4, line)?, tick, tick_div2)?,
            Decimal::ZERO,
            TimeFrame::Intraday,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

/// PAL volume-for-close: `YYYYMMDD,open,high,low,volume`. The close slot of
/// the file carries volume; the format has no close price, so bars reuse the
/// open there and keep the parsed volume in the volume field.
pub fn read_pal_volume_for_close(
    path: impl AsRef<Path>,
    time_frame: TimeFrame,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    reject_intraday(time_frame, "PAL volume-for-close")?;
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut series = OhlcSeries::new(time_frame, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 1;
        let date = parse_compact_date(field(&record, 0, line)?, line)?;
        let open = parse_price(field(&record, 1, line)?, tick, tick_div2)?;
        let bar = OhlcBar::from_date(
            date,
            open,
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            open,
            parse_decimal(field(&record, 4, line)?)?,
            time_frame,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

// ---------------------------------------------------------------------------
// TradeStation formats
// ---------------------------------------------------------------------------

fn check_header(
    record: &csv::StringRecord,
    expected: &[&str],
) -> Result<(), MarketDataError> {
    for (idx, want) in expected.iter().enumerate() {
        let got = record.get(idx).unwrap_or("");
        if !got.eq_ignore_ascii_case(want) {
            return Err(MarketDataError::MalformedRecord {
                line: 1,
                reason: format!("expected header column '{want}', found '{got}'"),
            });
        }
    }
    Ok(())
}

/// TradeStation EOD: quoted header
/// `"Date","Time","Open","High","Low","Close","Vol","OI"`, date MM/dd/yyyy.
pub fn read_tradestation_eod(
    path: impl AsRef<Path>,
    time_frame: TimeFrame,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    reject_intraday(time_frame, "TradeStation EOD")?;
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;
    check_header(reader.headers()?, &["Date", "Time", "Open", "High", "Low", "Close", "Vol", "OI"])?;

    let mut series = OhlcSeries::new(time_frame, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 2;
        let date = parse_us_date(field(&record, 0, line)?, line)?;
        let bar = OhlcBar::from_date(
            date,
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            parse_price(field(&record, 4, line)?, tick, tick_div2)?,
            parse_price(field(&record, 5, line)?, tick, tick_div2)?,
            parse_decimal(field(&record, 6, line)?)?,
            time_frame,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

/// TradeStation intraday: header carries `"Up","Down"` instead of
/// `"Vol","OI"` and the time column is meaningful (`HH:MM`).
pub fn read_tradestation_intraday(
    path: impl AsRef<Path>,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;
    check_header(reader.headers()?, &["Date", "Time", "Open", "High", "Low", "Close", "Up", "Down"])?;

    let mut series = OhlcSeries::new(TimeFrame::Intraday, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 2;
        let date = parse_us_date(field(&record, 0, line)?, line)?;
        let time = chrono::NaiveTime::parse_from_str(field(&record, 1, line)?, "%H:%M").map_err(|_| {
            MarketDataError::MalformedRecord {
                line,
                reason: format!("bad HH:MM time '{}'", field(&record, 1, line).unwrap_or("")),
            }
        })?;
        let bar = OhlcBar::new(
            date.and_time(time),
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            parse_price(field(&record, 4, line)?, tick, tick_div2)?,
            parse_price(field(&record, 5, line)?, tick, tick_div2)?,
            Decimal::ZERO,
            TimeFrame::Intraday,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

// ---------------------------------------------------------------------------
// CSI and Wealth-Lab formats
// ---------------------------------------------------------------------------

/// CSI extended futures:
/// `Date,Open,High,Low,Close,Vol,OI,RollDate,UnAdjClose`, no header, date
/// YYYYMMDD. Roll date and unadjusted close are carried by the file but not
/// by the bar model, so they are skipped.
pub fn read_csi_extended(
    path: impl AsRef<Path>,
    time_frame: TimeFrame,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    reject_intraday(time_frame, "CSI extended futures")?;
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;

    let mut series = OhlcSeries::new(time_frame, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 1;
        let date = parse_compact_date(field(&record, 0, line)?, line)?;
        let bar = OhlcBar::from_date(
            date,
            parse_price(field(&record, 1, line)?, tick, tick_div2)?,
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            parse_price(field(&record, 4, line)?, tick, tick_div2)?,
            parse_decimal(field(&record, 5, line)?)?,
            time_frame,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

/// Wealth-Lab export: header `Date/Time,Open,High,Low,Close,Volume`,
/// US-style `M/D/YYYY` dates with an optional `HH:MM[:SS]` time part.
pub fn read_wealth_lab(
    path: impl AsRef<Path>,
    time_frame: TimeFrame,
    volume_unit: VolumeUnit,
    tick: Decimal,
) -> Result<OhlcSeries, MarketDataError> {
    let tick_div2 = tick / Decimal::TWO;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path.as_ref())?;
    check_header(reader.headers()?, &["Date/Time", "Open", "High", "Low", "Close", "Volume"])?;

    let parse_timestamp = |s: &str, line: u64| -> Result<NaiveDateTime, MarketDataError> {
        for fmt in ["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
                return Ok(ts);
            }
        }
        parse_us_date(s, line).map(|d| d.and_hms_opt(0, 0, 0).expect("midnight is always valid"))
    };

    let mut series = OhlcSeries::new(time_frame, volume_unit);
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let line = i as u64 + 2;
        let timestamp = parse_timestamp(field(&record, 0, line)?, line)?;
        let bar = OhlcBar::new(
            timestamp,
            parse_price(field(&record, 1, line)?, tick, tick_div2)?,
            parse_price(field(&record, 2, line)?, tick, tick_div2)?,
            parse_price(field(&record, 3, line)?, tick, tick_div2)?,
            parse_price(field(&record, 4, line)?, tick, tick_div2)?,
            parse_decimal(field(&record, 5, line)?)?,
            time_frame,
        )?;
        series.add_bar(bar)?;
    }
    if series.is_empty() {
        return Err(MarketDataError::EmptySeries);
    }
    Ok(series)
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// PAL EOD writer: `YYYYMMDD,open,high,low,close`, no header.
pub fn write_pal_eod(
    out: &mut impl Write,
    series: &OhlcSeries,
    line_ending: LineEnding,
) -> Result<(), MarketDataError> {
    let eol = line_ending.as_str();
    for bar in series.bars() {
        write!(
            out,
            "{},{},{},{},{}{eol}",
            bar.date().format("%Y%m%d"),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close()
        )?;
    }
    Ok(())
}

/// PAL volume-for-close writer: volume in place of the close column.
pub fn write_pal_volume_for_close(
    out: &mut impl Write,
    series: &OhlcSeries,
    line_ending: LineEnding,
) -> Result<(), MarketDataError> {
    let eol = line_ending.as_str();
    for bar in series.bars() {
        write!(
            out,
            "{},{},{},{},{}{eol}",
            bar.date().format("%Y%m%d"),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.volume()
        )?;
    }
    Ok(())
}

/// PAL intraday writer: sequence counter from 10,000,001, space separated.
pub fn write_pal_intraday(
    out: &mut impl Write,
    series: &OhlcSeries,
    line_ending: LineEnding,
) -> Result<(), MarketDataError> {
    let eol = line_ending.as_str();
    for (i, bar) in series.bars().iter().enumerate() {
        write!(
            out,
            "{} {} {} {} {}{eol}",
            PAL_INTRADAY_FIRST_SEQ + i as i64,
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close()
        )?;
    }
    Ok(())
}

/// TradeStation EOD writer: quoted header, MM/dd/yyyy dates, 00:00 time,
/// open interest pinned to zero.
pub fn write_tradestation_eod(
    out: &mut impl Write,
    series: &OhlcSeries,
    line_ending: LineEnding,
) -> Result<(), MarketDataError> {
    let eol = line_ending.as_str();
    write!(out, "\"Date\",\"Time\",\"Open\",\"High\",\"Low\",\"Close\",\"Vol\",\"OI\"{eol}")?;
    for bar in series.bars() {
        write!(
            out,
            "{},00:00,{},{},{},{},{},0{eol}",
            bar.date().format("%m/%d/%Y"),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close(),
            bar.volume()
        )?;
    }
    Ok(())
}

/// TradeStation intraday writer: `Up`/`Down` columns pinned to zero, bar time
/// taken from the timestamp.
pub fn write_tradestation_intraday(
    out: &mut impl Write,
    series: &OhlcSeries,
    line_ending: LineEnding,
) -> Result<(), MarketDataError> {
    let eol = line_ending.as_str();
    write!(out, "\"Date\",\"Time\",\"Open\",\"High\",\"Low\",\"Close\",\"Up\",\"Down\"{eol}")?;
    for bar in series.bars() {
        write!(
            out,
            "{},{},{},{},{},{},0,0{eol}",
            bar.date().format("%m/%d/%Y"),
            bar.timestamp().format("%H:%M"),
            bar.open(),
            bar.high(),
            bar.low(),
            bar.close()
        )?;
    }
    Ok(())
}
