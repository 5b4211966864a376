//! Run configuration: a small `key=value` file naming the security, its
//! data file, the in-sample and out-of-sample ranges, and the Monte Carlo
//! settings.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use market_data::num::constants;
use market_data::DateRange;
use validation::TestStatisticPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataFormat {
    PalEod,
    TradeStationEod,
    CsiExtended,
    WealthLab,
}

impl DataFormat {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "pal-eod" => Some(DataFormat::PalEod),
            "tradestation-eod" => Some(DataFormat::TradeStationEod),
            "csi-extended" => Some(DataFormat::CsiExtended),
            "wealth-lab" => Some(DataFormat::WealthLab),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub symbol: String,
    pub data_file: PathBuf,
    pub data_format: DataFormat,
    pub is_futures: bool,
    pub tick: Decimal,
    pub big_point_value: Decimal,
    pub insample: DateRange,
    pub oos: DateRange,
    pub permutations: u32,
    pub policy: TestStatisticPolicy,
    pub seed: u64,
    pub output: Option<PathBuf>,
}

fn parse_date(fields: &BTreeMap<String, String>, key: &str) -> Result<NaiveDate, String> {
    let raw = fields.get(key).ok_or_else(|| format!("missing key '{key}'"))?;
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("bad date for '{key}': {raw}"))
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
        Self::from_str_contents(&text)
    }

    pub fn from_str_contents(text: &str) -> Result<Self, String> {
        let mut fields = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| format!("line {}: expected key=value, got '{line}'", number + 1))?;
            fields.insert(key.trim().to_string(), value.trim().to_string());
        }

        let get = |key: &str| -> Result<&String, String> {
            fields.get(key).ok_or_else(|| format!("missing key '{key}'"))
        };

        let symbol = get("symbol")?.clone();
        let data_file = PathBuf::from(get("data_file")?);
        let data_format = match fields.get("data_format") {
            Some(name) => {
                DataFormat::from_name(name).ok_or_else(|| format!("unknown data_format '{name}'"))?
            }
            None => DataFormat::PalEod,
        };

        let is_futures = match fields.get("futures").map(String::as_str) {
            Some("true") => true,
            Some("false") | None => false,
            Some(other) => return Err(format!("bad boolean for 'futures': {other}")),
        };
        let tick = match fields.get("tick") {
            Some(raw) => raw.parse().map_err(|_| format!("bad decimal for 'tick': {raw}"))?,
            None => constants::EQUITY_TICK,
        };
        let big_point_value = match fields.get("big_point_value") {
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("bad decimal for 'big_point_value': {raw}"))?,
            None => constants::ONE,
        };

        let insample = DateRange::new(
            parse_date(&fields, "insample_start")?,
            parse_date(&fields, "insample_end")?,
        )
        .map_err(|e| e.to_string())?;
        let oos = DateRange::new(parse_date(&fields, "oos_start")?, parse_date(&fields, "oos_end")?)
            .map_err(|e| e.to_string())?;

        let permutations: u32 = match fields.get("permutations") {
            Some(raw) => raw
                .parse()
                .map_err(|_| format!("bad integer for 'permutations': {raw}"))?,
            None => 500,
        };
        if permutations == 0 {
            return Err("'permutations' must be positive".into());
        }

        let policy = match fields.get("policy") {
            Some(name) => TestStatisticPolicy::from_name(name)
                .ok_or_else(|| format!("unknown policy '{name}'"))?,
            None => TestStatisticPolicy::CumulativeReturn,
        };

        let seed: u64 = match fields.get("seed") {
            Some(raw) => raw.parse().map_err(|_| format!("bad integer for 'seed': {raw}"))?,
            None => 19937,
        };

        let output = fields.get("output").map(PathBuf::from);

        Ok(RunConfig {
            symbol,
            data_file,
            data_format,
            is_futures,
            tick,
            big_point_value,
            insample,
            oos,
            permutations,
            policy,
            seed,
            output,
        })
    }
}
