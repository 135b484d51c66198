use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FETCH_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MAX_FILE_BYTES: u64 = 2_000_000;
const DEFAULT_MAX_FETCH_BYTES: usize = 5 * 1024 * 1024;

/// Limits applied by the reference backends and builtin tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on a single shell command. `None` leaves termination to the caller contract.
    pub shell_timeout: Option<Duration>,
    pub fetch_timeout: Duration,
    /// Files larger than this are refused by `read_file` and skipped by `grep`.
    pub max_file_bytes: u64,
    pub max_fetch_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shell_timeout: None,
            fetch_timeout: Duration::from_millis(DEFAULT_FETCH_TIMEOUT_MS),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_fetch_bytes: DEFAULT_MAX_FETCH_BYTES,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `TOOLHOST_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `TOOLHOST_*` name.
    /// Blank or unparsable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(ms) = lookup_number::<u64>(&lookup, "TOOLHOST_SHELL_TIMEOUT_MS") {
            config.shell_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(ms) = lookup_number::<u64>(&lookup, "TOOLHOST_FETCH_TIMEOUT_MS") {
            config.fetch_timeout = Duration::from_millis(ms.max(1));
        }
        if let Some(bytes) = lookup_number::<u64>(&lookup, "TOOLHOST_MAX_FILE_BYTES") {
            config.max_file_bytes = bytes.max(1);
        }
        if let Some(bytes) = lookup_number::<usize>(&lookup, "TOOLHOST_MAX_FETCH_BYTES") {
            config.max_fetch_bytes = bytes.max(1);
        }
        config
    }
}

fn lookup_number<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    lookup(name).and_then(|raw| parse_number(name, &raw))
}

fn parse_number<T: FromStr>(name: &str, raw: &str) -> Option<T> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring {name}={raw:?}: not a valid number");
            None
        }
    }
}
