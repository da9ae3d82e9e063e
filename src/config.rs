use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("error reading file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// INI-style configuration: `key = value` pairs, optionally grouped under
/// `[Section]` headers. Lines starting with `#` are comments.
#[derive(Debug, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut globals = HashMap::new();
        let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                let name = &line[1..line.len() - 1];
                current_section = Some(name.trim().to_string());
                continue;
            }

            if let Some(pos) = line.find('=') {
                let key = line[..pos].trim().to_string();
                let value = line[pos + 1..].trim().trim_matches('"').to_string();

                match &current_section {
                    None => {
                        globals.insert(key, value);
                    }
                    Some(sec) => {
                        sections.entry(sec.clone()).or_default().insert(key, value);
                    }
                }
            }
        }
        Config { globals, sections }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(|s| s.as_str())
    }

    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get(section, key)
            .or_else(|| self.get_global(key))
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_non_empty_or_default<'a>(
        &'a self,
        section: &str,
        key: &str,
        default: &'a str,
    ) -> &'a str {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
            .unwrap_or(default)
    }

    /// Parses `[section] key` with `FromStr`. Missing or empty keys yield
    /// `Ok(None)`; present but unparsable values are an error.
    pub fn parse_value<T: std::str::FromStr>(
        &self,
        section: &str,
        key: &str,
    ) -> Result<Option<T>, ConfigError> {
        match self.get_non_empty(section, key) {
            None => Ok(None),
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    section: section.to_string(),
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
        }
    }
}

const DEFAULT_POLL_INTERVAL_MS: u64 = 1;
const DEFAULT_STUN_INTERVAL_MS: u64 = 300;
const DEFAULT_DTLS_MAX_DELAY_MS: u64 = 20_000;
const DEFAULT_DTLS_RECEIVE_WAIT_MS: u64 = 100;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:0";
const DEFAULT_CONGESTION_LOSS_THRESHOLD: f32 = 0.1;

/// Typed view of the settings the transport core consumes.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Number of readiness multiplexers in the pool.
    pub pool_size: usize,
    pub poll_interval: Duration,
    pub stun_interval: Duration,
    /// Hard deadline for a whole DTLS handshake.
    pub dtls_max_delay: Duration,
    /// How long one adapter `receive` waits for a flight before yielding.
    pub dtls_receive_wait: Duration,
    pub dtls_cert_path: Option<String>,
    pub dtls_key_path: Option<String>,
    /// Local address new channel sockets bind to; port 0 picks a free one.
    pub bind_address: SocketAddr,
    /// Fraction lost (0.0..=1.0) above which a congestion signal is raised.
    pub congestion_loss_threshold: f32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            stun_interval: Duration::from_millis(DEFAULT_STUN_INTERVAL_MS),
            dtls_max_delay: Duration::from_millis(DEFAULT_DTLS_MAX_DELAY_MS),
            dtls_receive_wait: Duration::from_millis(DEFAULT_DTLS_RECEIVE_WAIT_MS),
            dtls_cert_path: None,
            dtls_key_path: None,
            bind_address: SocketAddr::from(([0, 0, 0, 0], 0)),
            congestion_loss_threshold: DEFAULT_CONGESTION_LOSS_THRESHOLD,
        }
    }
}

impl GatewayConfig {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let ms = |section: &str, key: &str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(config
                .parse_value::<u64>(section, key)?
                .map_or(default, Duration::from_millis))
        };

        let bind_raw = config.get_non_empty_or_default("Network", "bind_address", DEFAULT_BIND_ADDRESS);
        let bind_address = bind_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                section: "Network".into(),
                key: "bind_address".into(),
                value: bind_raw.to_string(),
            })?;

        let pool_size = config
            .parse_value::<usize>("Multiplexer", "pool_size")?
            .filter(|n| *n > 0)
            .unwrap_or(defaults.pool_size);

        Ok(Self {
            pool_size,
            poll_interval: ms("Multiplexer", "poll_interval_ms", defaults.poll_interval)?,
            stun_interval: ms("ICE", "stun_interval_ms", defaults.stun_interval)?,
            dtls_max_delay: ms("DTLS", "max_delay_ms", defaults.dtls_max_delay)?,
            dtls_receive_wait: ms("DTLS", "receive_wait_ms", defaults.dtls_receive_wait)?,
            dtls_cert_path: config.get_non_empty("TLS", "dtls_cert").map(str::to_string),
            dtls_key_path: config.get_non_empty("TLS", "dtls_key").map(str::to_string),
            bind_address,
            congestion_loss_threshold: config
                .parse_value::<f32>("RTCP", "congestion_loss_threshold")?
                .unwrap_or(defaults.congestion_loss_threshold),
        })
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
