//! Process-wide configuration.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. TOML source (file or inline string), if any
//! 3. Environment variables (`COURIER_*`)
//!
//! Each layer overrides the previous. Loading happens once, when the channels
//! facade is constructed; the resulting [`Settings`] are read-only.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Default time allowed for a channel to open.
pub const DEFAULT_OPEN_TIMEOUT_MS: u64 = 10_000;

/// Default size of the shared worker pool.
pub const DEFAULT_WORKER_THREADS: usize = 3;

/// Default per-URI buffer of the in-process provider.
pub const DEFAULT_MEM_CAPACITY: usize = 1024;

/// Default connect timeout for socket providers.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
enum Source {
    Defaults,
    File(PathBuf),
    Inline(String),
}

/// Where configuration comes from, and how to load it.
///
/// # Example
///
/// ```
/// use courier_core::Configuration;
///
/// let settings = Configuration::from_toml_str("[channels]\nworker_threads = 2")
///     .skip_env_vars()
///     .load()
///     .unwrap();
/// assert_eq!(settings.channels.worker_threads, 2);
/// ```
#[derive(Debug, Clone)]
pub struct Configuration {
    source: Source,
    skip_env: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            source: Source::Defaults,
            skip_env: false,
        }
    }
}

impl Configuration {
    /// Load from a TOML file; a missing file is an error.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        Self {
            source: Source::File(path.as_ref().to_path_buf()),
            skip_env: false,
        }
    }

    pub fn from_toml_str(toml: impl Into<String>) -> Self {
        Self {
            source: Source::Inline(toml.into()),
            skip_env: false,
        }
    }

    /// Skips environment variable overrides.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    pub fn load(&self) -> Result<Settings> {
        let mut settings = match &self.source {
            Source::Defaults => Settings::default(),
            Source::File(path) => {
                debug!(path = %path.display(), "loading configuration file");
                let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&raw)?
            }
            Source::Inline(raw) => toml::from_str(raw)?,
        };

        if !self.skip_env {
            settings.apply_env()?;
        }

        settings.validate()?;
        Ok(settings)
    }
}

/// Loaded, read-only configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub channels: ChannelSettings,
    pub mem: MemSettings,
    pub tcp: SocketSettings,
    pub unix: SocketSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub open_timeout_ms: u64,
    pub worker_threads: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            open_timeout_ms: DEFAULT_OPEN_TIMEOUT_MS,
            worker_threads: DEFAULT_WORKER_THREADS,
        }
    }
}

impl ChannelSettings {
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemSettings {
    pub capacity: usize,
}

impl Default for MemSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_MEM_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SocketSettings {
    pub connect_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub receive_timeout_ms: Option<u64>,
}

impl Default for SocketSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: Some(DEFAULT_CONNECT_TIMEOUT_MS),
            send_timeout_ms: None,
            receive_timeout_ms: None,
        }
    }
}

impl SocketSettings {
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }
}

impl Settings {
    fn apply_env(&mut self) -> Result<()> {
        if let Some(value) = env_number("COURIER_OPEN_TIMEOUT_MS")? {
            self.channels.open_timeout_ms = value;
        }
        if let Some(value) = env_number("COURIER_WORKER_THREADS")? {
            self.channels.worker_threads = value as usize;
        }
        if let Some(value) = env_number("COURIER_MEM_CAPACITY")? {
            self.mem.capacity = value as usize;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.channels.worker_threads == 0 {
            return Err(Error::custom("channels.worker_threads must be at least 1"));
        }
        if self.mem.capacity == 0 {
            return Err(Error::custom("mem.capacity must be at least 1"));
        }
        Ok(())
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::invalid_env_var(name, "expected a non-negative integer")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_constants() {
        let settings = Configuration::default().skip_env_vars().load().unwrap();
        assert_eq!(settings.channels.open_timeout(), Duration::from_secs(10));
        assert_eq!(settings.channels.worker_threads, 3);
        assert_eq!(settings.mem.capacity, DEFAULT_MEM_CAPACITY);
        assert_eq!(
            settings.tcp.connect_timeout(),
            Some(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS))
        );
        assert_eq!(settings.tcp.receive_timeout(), None);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let settings = Configuration::from_toml_str("[channels]\nopen_timeout_ms = 250\n")
            .skip_env_vars()
            .load()
            .unwrap();
        assert_eq!(settings.channels.open_timeout_ms, 250);
        assert_eq!(settings.channels.worker_threads, DEFAULT_WORKER_THREADS);
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[mem]\ncapacity = 8\n\n[tcp]\nreceive_timeout_ms = 100").unwrap();

        let settings = Configuration::from_file(file.path())
            .skip_env_vars()
            .load()
            .unwrap();
        assert_eq!(settings.mem.capacity, 8);
        assert_eq!(settings.tcp.receive_timeout(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = Configuration::from_file("/nonexistent/courier.toml")
            .skip_env_vars()
            .load();
        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let result = Configuration::from_toml_str("[channels\nbroken")
            .skip_env_vars()
            .load();
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn zero_workers_rejected() {
        let result = Configuration::from_toml_str("[channels]\nworker_threads = 0")
            .skip_env_vars()
            .load();
        assert!(matches!(result, Err(Error::Custom(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        std::env::set_var("COURIER_MEM_CAPACITY", "16");
        let settings = Configuration::from_toml_str("[mem]\ncapacity = 4").load();
        std::env::remove_var("COURIER_MEM_CAPACITY");
        assert_eq!(settings.unwrap().mem.capacity, 16);
    }
}
