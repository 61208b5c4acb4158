//! Kernel configuration
//!
//! Defaults are tuned for small training batches. Every field can be
//! overridden from the environment:
//!
//! | variable | field |
//! |---|---|
//! | `BLOCKSPARSE_BACKEND` | [`KernelConfig::backend`] (`auto`, `sequential`, `parallel`) |
//! | `BLOCKSPARSE_NUM_THREADS` | [`KernelConfig::num_threads`] |
//! | `BLOCKSPARSE_PARALLEL_THRESHOLD` | [`KernelConfig::parallel_threshold`] |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::{ConfigError, Result};

pub const ENV_BACKEND: &str = "BLOCKSPARSE_BACKEND";
pub const ENV_NUM_THREADS: &str = "BLOCKSPARSE_NUM_THREADS";
pub const ENV_PARALLEL_THRESHOLD: &str = "BLOCKSPARSE_PARALLEL_THRESHOLD";

/// Which provider the kernel manager should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Best available provider.
    #[default]
    Auto,
    /// Single-threaded fallback kernel.
    Sequential,
    /// Rayon-backed kernel.
    Parallel,
}

impl FromStr for BackendPreference {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "sequential" | "seq" | "cpu" => Ok(Self::Sequential),
            "parallel" | "rayon" => Ok(Self::Parallel),
            _ => Err(ConfigError::InvalidValue {
                key: ENV_BACKEND,
                value: s.to_string(),
                reason: "expected one of auto, sequential, parallel".to_string(),
            }),
        }
    }
}

/// Block-sparse kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub backend: BackendPreference,
    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
    /// Minimum multiply-add count before work is split across threads.
    pub parallel_threshold: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self { backend: BackendPreference::Auto, num_threads: None, parallel_threshold: 16_384 }
    }
}

fn parse_count(key: &'static str, value: &str) -> std::result::Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

impl KernelConfig {
    /// Read overrides from the environment, rejecting malformed values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending variable.
    pub fn try_from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(v) = env::var(ENV_BACKEND) {
            config.backend = v.parse()?;
        }
        if let Ok(v) = env::var(ENV_NUM_THREADS) {
            let n = parse_count(ENV_NUM_THREADS, &v)?;
            if n == 0 {
                return Err(ConfigError::InvalidValue {
                    key: ENV_NUM_THREADS,
                    value: v,
                    reason: "thread count must be at least 1".to_string(),
                }
                .into());
            }
            config.num_threads = Some(n);
        }
        if let Ok(v) = env::var(ENV_PARALLEL_THRESHOLD) {
            config.parallel_threshold = parse_count(ENV_PARALLEL_THRESHOLD, &v)?;
        }
        Ok(config)
    }

    /// Like [`KernelConfig::try_from_env`] but falls back to defaults.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|e| {
            log::warn!("ignoring block-sparse environment overrides: {e}");
            Self::default()
        })
    }
}
