//! Runtime configuration for the controller and the driver installer

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Default number of concurrent reconciliation workers
pub const DEFAULT_THREADINESS: usize = 5;

/// Configuration of a generic resource controller
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Number of keys reconciled concurrently
    pub threadiness: usize,
    /// Per-key backoff after a handler failure
    pub backoff: RetryConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threadiness: DEFAULT_THREADINESS,
            backoff: RetryConfig::default(),
        }
    }
}

impl ControllerConfig {
    /// Set the worker count
    pub fn threadiness(mut self, threadiness: usize) -> Self {
        self.threadiness = threadiness;
        self
    }
}

/// Configuration of the driver binary installer
#[derive(Clone, Debug, PartialEq)]
pub struct InstallerConfig {
    /// Directory driver binaries are written to
    pub install_dir: PathBuf,
    /// How long to wait for a started driver to accept connections
    pub readiness: RetryConfig,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            install_dir: std::env::temp_dir().join("kontainer-drivers"),
            readiness: RetryConfig {
                max_attempts: 30,
                initial_delay: Duration::from_millis(100),
                max_delay: Duration::from_secs(2),
                backoff_multiplier: 2.0,
            },
        }
    }
}

impl InstallerConfig {
    /// Install binaries under `dir`
    pub fn install_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.install_dir = dir.into();
        self
    }
}
