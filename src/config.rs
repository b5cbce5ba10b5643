//! Simulation configuration: the flat `key=value` file and its constraints.
//!
//! The file holds one `key=value` pair per line; lines starting with `//`
//! are comments. Keys are the short names used by the operators of the
//! original simulation (`K`, `KS`, `C`, ...), mapped here onto named
//! fields. Every key is mandatory, duplicates are rejected, and all values
//! must satisfy the constraints listed next to each field.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

const COMMENT: &str = "//";

/// All recognised configuration keys.
const KEYS: [&str; 11] = [
    "K", "KS", "C", "E", "T", "P", "S", "S1", "S2", "NP", "TD",
];

/// Errors produced while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file: {0}")]
    Io(#[from] io::Error),
    #[error("line {line}: expected `key=value`")]
    Malformed { line: usize },
    #[error("line {line}: unknown parameter `{key}`")]
    UnknownKey { line: usize, key: String },
    #[error("line {line}: `{key}` was already defined, duplicates are not allowed")]
    Duplicate { line: usize, key: String },
    #[error("line {line}: `{key}` requires an integer value")]
    BadValue { line: usize, key: String },
    #[error("parameter `{0}` is missing")]
    Missing(&'static str),
    #[error("constraint {0} not satisfied")]
    Constraint(&'static str),
}

/// Validated simulation parameters, immutable once loaded.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// `K` — number of cash desks in the pay area. {K >= 1}
    pub max_desks: usize,
    /// `KS` — desks open when the market opens. {0 < KS <= K}
    pub open_at_boot: usize,
    /// `C` — customer population kept inside the market. {C >= 1}
    pub customers: usize,
    /// `E` — customers that must exit before the next batch is admitted. {0 < E <= C}
    pub batch_size: usize,
    /// `T` — upper bound for one shopping pass, in ms. {T > 10}
    pub max_shopping_ms: u64,
    /// `P` — maximum products in one cart. {P > 0}
    pub max_products: u64,
    /// `S` — voluntary re-queue evaluation interval, in ms. {S > 0}
    ///
    /// Loaded and validated, but the voluntary queue-change policy it
    /// belongs to is not part of the current simulation.
    pub requeue_interval_ms: u64,
    /// `S1` — close a desk when at least this many open desks have at most
    /// one customer waiting. {0 < S1 <= K}
    pub close_threshold: usize,
    /// `S2` — open a desk when any single desk has at least this many
    /// customers waiting. {0 < S2 <= C}
    pub open_threshold: usize,
    /// `NP` — service time per product, in ms. {NP > 0}
    pub ms_per_product: u64,
    /// `TD` — interval between desk status notifications, in ms. {TD > 0}
    pub notify_interval_ms: u64,
}

impl SimConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse `key=value` lines from any reader, then validate.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ConfigError> {
        let mut values: HashMap<&'static str, i64> = HashMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(COMMENT) {
                continue;
            }
            let (key, value) = line
                .split_once('=')
                .ok_or(ConfigError::Malformed { line: line_no })?;
            let key = key.trim();
            let value = value.trim();

            let known = KEYS
                .iter()
                .copied()
                .find(|k| *k == key)
                .ok_or_else(|| ConfigError::UnknownKey {
                    line: line_no,
                    key: key.to_string(),
                })?;
            if values.contains_key(known) {
                return Err(ConfigError::Duplicate {
                    line: line_no,
                    key: key.to_string(),
                });
            }
            let parsed: i64 = value.parse().map_err(|_| ConfigError::BadValue {
                line: line_no,
                key: key.to_string(),
            })?;
            values.insert(known, parsed);
        }

        let mut get = |key: &'static str| -> Result<i64, ConfigError> {
            values.remove(key).ok_or(ConfigError::Missing(key))
        };

        let config = SimConfig {
            max_desks: get("K")?.max(0) as usize,
            open_at_boot: get("KS")?.max(0) as usize,
            customers: get("C")?.max(0) as usize,
            batch_size: get("E")?.max(0) as usize,
            max_shopping_ms: get("T")?.max(0) as u64,
            max_products: get("P")?.max(0) as u64,
            requeue_interval_ms: get("S")?.max(0) as u64,
            close_threshold: get("S1")?.max(0) as usize,
            open_threshold: get("S2")?.max(0) as usize,
            ms_per_product: get("NP")?.max(0) as u64,
            notify_interval_ms: get("TD")?.max(0) as u64,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every range constraint. Negative raw values were clamped to 0
    /// during parsing, so they fail the corresponding `> 0` check here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_desks < 1 {
            return Err(ConfigError::Constraint("{K>=1}"));
        }
        if self.open_at_boot < 1 || self.open_at_boot > self.max_desks {
            return Err(ConfigError::Constraint("{0<KS<=K}"));
        }
        if self.customers < 1 {
            return Err(ConfigError::Constraint("{C>=1}"));
        }
        if self.batch_size < 1 || self.batch_size > self.customers {
            return Err(ConfigError::Constraint("{0<E<=C}"));
        }
        if self.max_shopping_ms <= 10 {
            return Err(ConfigError::Constraint("{T>10}"));
        }
        if self.max_products < 1 {
            return Err(ConfigError::Constraint("{P>0}"));
        }
        if self.requeue_interval_ms < 1 {
            return Err(ConfigError::Constraint("{S>0}"));
        }
        if self.close_threshold < 1 || self.close_threshold > self.max_desks {
            return Err(ConfigError::Constraint("{0<S1<=K}"));
        }
        if self.open_threshold < 1 || self.open_threshold > self.customers {
            return Err(ConfigError::Constraint("{0<S2<=C}"));
        }
        if self.ms_per_product < 1 {
            return Err(ConfigError::Constraint("{NP>0}"));
        }
        if self.notify_interval_ms < 1 {
            return Err(ConfigError::Constraint("{TD>0}"));
        }
        Ok(())
    }
}
