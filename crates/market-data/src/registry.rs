//! Security configuration registry.
//!
//! A plain value owned by the caller, loaded from the six-field security
//! configuration CSV. Replaces the process-global factory the problem domain
//! tends to accumulate: nothing here is a singleton.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::MarketDataError;
use crate::security::Security;
use crate::series::OhlcSeries;

/// One row of the security configuration file:
/// `symbol,big-point-value,tick,file-name,file-path,is-futures`.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub symbol: String,
    pub big_point_value: Decimal,
    pub tick: Decimal,
    pub file_name: String,
    pub file_path: String,
    pub is_futures: bool,
}

impl SecurityConfig {
    /// Instantiate the configured security over a loaded series.
    pub fn build_security(&self, series: Arc<OhlcSeries>) -> Security {
        if self.is_futures {
            Security::futures(
                self.symbol.clone(),
                self.file_name.clone(),
                self.big_point_value,
                self.tick,
                series,
            )
        } else {
            Security::equity(self.symbol.clone(), self.file_name.clone(), series)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SecurityRegistry {
    configs: BTreeMap<String, SecurityConfig>,
}

impl SecurityRegistry {
    pub fn new() -> Self {
        SecurityRegistry::default()
    }

    /// Load from the header-less six-field CSV.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self, MarketDataError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;

        let mut registry = SecurityRegistry::new();
        for (line, record) in reader.deserialize::<SecurityConfig>().enumerate() {
            let config = record.map_err(|e| MarketDataError::MalformedRecord {
                line: line as u64 + 1,
                reason: e.to_string(),
            })?;
            registry.add(config)?;
        }
        tracing::debug!(entries = registry.len(), "loaded security registry");
        Ok(registry)
    }

    pub fn add(&mut self, config: SecurityConfig) -> Result<(), MarketDataError> {
        if self.configs.contains_key(&config.symbol) {
            return Err(MarketDataError::DuplicateSymbol(config.symbol));
        }
        self.configs.insert(config.symbol.clone(), config);
        Ok(())
    }

    pub fn find(&self, symbol: &str) -> Result<&SecurityConfig, MarketDataError> {
        self.configs
            .get(symbol)
            .ok_or_else(|| MarketDataError::UnknownSymbol(symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}
