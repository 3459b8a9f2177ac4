//! Configuration for DOM sessions.
//!
//! Timing knobs for the execution coordinator and change tracker, the
//! origin exposed to guest scripts, and optional external tooling. Values
//! can be loaded from environment variables or constructed programmatically.
//! Startup inputs (seed markup and scripts) are loaded by [`SeedDocument`].

use crate::error::SessionError;
use core::time::Duration;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default per-call evaluation bound before the runtime is interrupted.
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 60_000;
/// Default silence window after which a batch of mutations is settled.
pub const DEFAULT_QUIESCENCE_MS: u64 = 1_000;
/// Default origin reported to guest scripts.
pub const DEFAULT_ORIGIN: &str = "https://example.com";

/// Runtime configuration for one DOM session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Per-call evaluation bound in milliseconds (minimum 1ms)
    pub exec_timeout_ms: u64,
    /// Quiescence window in milliseconds (minimum 1ms)
    pub quiescence_ms: u64,
    /// Origin string exposed through the host object
    pub origin: String,
    /// Optional external command that rewrites follow-up scripts (stdin to stdout)
    pub transpiler: Option<String>,
    /// Optional directory serving the DOM shim library to `require()`
    pub library_dir: Option<PathBuf>,
}

impl SessionConfig {
    /// Construct a new `SessionConfig` with explicit timings and defaults elsewhere.
    ///
    /// # Arguments
    ///
    /// * `exec_timeout_ms` - Per-call evaluation bound in milliseconds (minimum 1ms)
    /// * `quiescence_ms` - Settlement window in milliseconds (minimum 1ms)
    #[inline]
    #[must_use]
    pub fn new(exec_timeout_ms: u64, quiescence_ms: u64) -> Self {
        Self {
            exec_timeout_ms: exec_timeout_ms.max(1),
            quiescence_ms: quiescence_ms.max(1),
            origin: String::from(DEFAULT_ORIGIN),
            transpiler: None,
            library_dir: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `DOMFS_EXEC_TIMEOUT_MS`: evaluation bound in milliseconds (default: 60000)
    /// - `DOMFS_QUIESCENCE_MS`: settlement window in milliseconds (default: 1000)
    /// - `DOMFS_ORIGIN`: origin exposed to scripts (default: `https://example.com`)
    /// - `DOMFS_TRANSPILER`: command used to rewrite follow-up scripts
    /// - `DOMFS_LIB_DIR`: directory holding the DOM shim library
    #[inline]
    #[must_use]
    pub fn from_env() -> Self {
        let millis = |name: &str, default: u64| {
            env::var(name)
                .ok()
                .and_then(|val| val.parse::<u64>().ok())
                .unwrap_or(default)
                .max(1)
        };
        let non_empty = |name: &str| env::var(name).ok().filter(|val| !val.trim().is_empty());
        Self {
            exec_timeout_ms: millis("DOMFS_EXEC_TIMEOUT_MS", DEFAULT_EXEC_TIMEOUT_MS),
            quiescence_ms: millis("DOMFS_QUIESCENCE_MS", DEFAULT_QUIESCENCE_MS),
            origin: non_empty("DOMFS_ORIGIN").unwrap_or_else(|| String::from(DEFAULT_ORIGIN)),
            transpiler: non_empty("DOMFS_TRANSPILER"),
            library_dir: non_empty("DOMFS_LIB_DIR").map(PathBuf::from),
        }
    }

    /// Get the evaluation bound as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn exec_timeout(&self) -> Duration {
        Duration::from_millis(self.exec_timeout_ms)
    }

    /// Get the quiescence window as a `Duration`.
    #[inline]
    #[must_use]
    pub const fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_EXEC_TIMEOUT_MS, DEFAULT_QUIESCENCE_MS)
    }
}

/// Seed markup plus the ordered scripts a session boots with.
#[derive(Clone, Debug, Default)]
pub struct SeedDocument {
    pub html: String,
    pub scripts: Vec<String>,
}

impl SeedDocument {
    /// Read the seed markup (optional) and scripts from disk.
    ///
    /// # Errors
    /// Returns [`SessionError::Configuration`] naming the first unreadable file.
    pub fn load<P: AsRef<Path>>(html: Option<&Path>, scripts: &[P]) -> Result<Self, SessionError> {
        let read = |path: &Path| {
            fs::read_to_string(path).map_err(|error| {
                SessionError::Configuration(format!("read {}: {error}", path.display()))
            })
        };
        let html = html.map(read).transpose()?.unwrap_or_default();
        let scripts = scripts
            .iter()
            .map(|path| read(path.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { html, scripts })
    }
}
