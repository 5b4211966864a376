//! validator-cli: validate candidate trading patterns against chance.
//!
//! Reads a key=value run configuration, loads the price file, builds the
//! candidate pattern universe from the in-sample window, and runs the
//! Masters stepwise permutation test out of sample. Survivors and their
//! adjusted p-values go to stdout and, when configured, a CSV file.
//!
//! Usage:
//!   validator-cli <config.txt>
//!
//! Exit codes: 0 success, 1 configuration error, 2 I/O error,
//! 3 validation failure.

mod candidates;
mod config;

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use backtest_engine::{BackTester, TimeStepper};
use market_data::csv_io;
use market_data::{OhlcSeries, Security, TimeFrame, VolumeUnit};
use validation::{prepare_strategy_contexts, Executor, MastersValidation};

use crate::config::{DataFormat, RunConfig};

/// Marker attached to the error chain so `main` can map a failure back to
/// its exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    Config,
    Io,
    Validation,
}

impl FailureClass {
    fn exit_code(self) -> u8 {
        match self {
            FailureClass::Config => 1,
            FailureClass::Io => 2,
            FailureClass::Validation => 3,
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Config => write!(f, "configuration error"),
            FailureClass::Io => write!(f, "I/O error"),
            FailureClass::Validation => write!(f, "validation failure"),
        }
    }
}

fn load_series(config: &RunConfig) -> anyhow::Result<OhlcSeries> {
    let volume_unit = if config.is_futures {
        VolumeUnit::Contracts
    } else {
        VolumeUnit::Shares
    };
    let series = match config.data_format {
        DataFormat::PalEod => {
            csv_io::read_pal_eod(&config.data_file, TimeFrame::Daily, volume_unit, config.tick)
        }
        DataFormat::TradeStationEod => {
            csv_io::read_tradestation_eod(&config.data_file, TimeFrame::Daily, volume_unit, config.tick)
        }
        DataFormat::CsiExtended => {
            csv_io::read_csi_extended(&config.data_file, TimeFrame::Daily, volume_unit, config.tick)
        }
        DataFormat::WealthLab => {
            csv_io::read_wealth_lab(&config.data_file, TimeFrame::Daily, volume_unit, config.tick)
        }
    };
    series
        .with_context(|| format!("loading {}", config.data_file.display()))
        .context(FailureClass::Io)
}

fn write_survivor_csv(path: &Path, survivors: &[(String, String, String)]) -> anyhow::Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))
        .context(FailureClass::Io)?;
    writeln!(file, "pattern,direction,adjusted_p_value").context(FailureClass::Io)?;
    for (name, direction, p_value) in survivors {
        writeln!(file, "{name},{direction},{p_value}").context(FailureClass::Io)?;
    }
    Ok(())
}

fn run(config_path: &Path) -> anyhow::Result<()> {
    let config = RunConfig::from_file(config_path)
        .map_err(anyhow::Error::msg)
        .context(FailureClass::Config)?;

    let series = Arc::new(load_series(&config)?);
    let security = if config.is_futures {
        Security::futures(
            config.symbol.clone(),
            config.symbol.clone(),
            config.big_point_value,
            config.tick,
            series,
        )
    } else {
        Security::equity(config.symbol.clone(), config.symbol.clone(), series)
    };

    // Candidate patterns come from the in-sample window only; the
    // permutation test never sees that data again.
    let insample_series = security
        .series()
        .filter(&config.insample)
        .context("in-sample range")
        .context(FailureClass::Config)?;
    let patterns = candidates::candidate_patterns(&insample_series)
        .context("candidate generation")
        .context(FailureClass::Validation)?;
    tracing::info!(candidates = patterns.len(), "generated candidate patterns");

    let oos_series = security
        .series()
        .filter(&config.oos)
        .context("out-of-sample range")
        .context(FailureClass::Config)?;
    let oos_security = security.with_series(Arc::new(oos_series));

    let template = BackTester::new(TimeStepper::Daily, config.oos)
        .context("backtest range")
        .context(FailureClass::Config)?;

    let outer = Executor::outer_default().context(FailureClass::Validation)?;
    let inner = Executor::masters_default().context(FailureClass::Validation)?;

    let contexts = prepare_strategy_contexts(
        &patterns,
        &oos_security,
        &template,
        config.policy,
        &outer,
    )
    .context("baseline preparation")
    .context(FailureClass::Validation)?;

    let masters = MastersValidation::new(config.permutations, config.policy, config.seed)
        .context(FailureClass::Validation)?;
    let result = masters
        .run_fast(&contexts, &template, &oos_security, &inner)
        .context("permutation sweep")
        .context(FailureClass::Validation)?;

    println!(
        "{} candidates, {} permutations, policy {}",
        contexts.len(),
        config.permutations,
        config.policy.name()
    );
    println!("{:<24} {:>8} {:>14}", "pattern", "side", "adjusted p");
    for (pattern, p_value) in &result.adjusted_p_values {
        println!("{:<24} {:>8} {:>14}", pattern.name(), pattern.direction().name(), p_value);
    }
    println!("surviving patterns: {}", result.survivors.len());

    if let Some(output) = &config.output {
        let rows: Vec<(String, String, String)> = result
            .adjusted_p_values
            .iter()
            .filter(|(pattern, _)| result.survivors.iter().any(|s| s.name() == pattern.name()))
            .map(|(pattern, p)| {
                (
                    pattern.name().to_string(),
                    pattern.direction().name().to_string(),
                    p.to_string(),
                )
            })
            .collect();
        write_survivor_csv(output, &rows)?;
        tracing::info!(path = %output.display(), rows = rows.len(), "wrote survivor file");
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next() else {
        eprintln!("usage: validator-cli <config.txt>");
        return ExitCode::from(1);
    };

    match run(Path::new(&config_path)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("validator-cli: {error:#}");
            let code = error
                .downcast_ref::<FailureClass>()
                .map_or(3, |class| class.exit_code());
            ExitCode::from(code)
        }
    }
}
