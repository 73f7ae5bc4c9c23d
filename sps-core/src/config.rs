use std::{str::FromStr, time::Duration};

use rand::Rng;
use serde::Deserialize;
use sps_types::{utils::validate_name, Endpoint};

use crate::error::ConfigError;

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Bounds of a random delay, in milliseconds, applied before connecting and added to the rebirth debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct StartupDelay {
    low: u64,
    high: u64,
}

impl StartupDelay {
    pub fn new(low: u64, high: u64) -> Result<Self, ConfigError> {
        if low > high {
            return Err(ConfigError::InvalidStartupDelay(format!(
                "lower bound {low} is greater than upper bound {high}"
            )));
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> Duration {
        Duration::from_millis(self.low)
    }

    pub fn high(&self) -> Duration {
        Duration::from_millis(self.high)
    }

    /// Pick a delay uniformly from the bounds
    pub fn sample(&self) -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(self.low..=self.high))
    }
}

/// Parses the `min-max` form, e.g. `500-2000`
impl FromStr for StartupDelay {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidStartupDelay(format!("expected min-max, got {s}"));
        let (low, high) = s.trim().split_once('-').ok_or_else(invalid)?;
        let low = low.trim().parse::<u64>().map_err(|_| invalid())?;
        let high = high.trim().parse::<u64>().map_err(|_| invalid())?;
        Self::new(low, high)
    }
}

impl TryFrom<String> for StartupDelay {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(30)
}

fn default_rebirth_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_rebirth_debounce() -> Duration {
    Duration::from_secs(5)
}

fn default_host_response_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Session configuration shared by edge nodes and host applications.
///
/// Can be built with the setter methods or deserialized from JSON, in which case durations are
/// given in milliseconds:
///
/// ```
/// use sps_core::config::SessionConfig;
///
/// let config = SessionConfig::from_json(r#"{
///     "endpoints": [{"host": "localhost", "port": 1883}],
///     "primary_host_id": "scada",
///     "keep_alive": 10000,
///     "startup_delay": "0-500"
/// }"#).unwrap();
/// assert_eq!(config.keep_alive.as_secs(), 10);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Transport endpoints tried in round robin order
    pub endpoints: Vec<Endpoint>,
    /// The host application whose liveness gates data publication
    pub primary_host_id: Option<String>,
    #[serde(with = "duration_ms")]
    pub keep_alive: Duration,
    /// How long a sequence gap may persist before a rebirth is requested
    #[serde(with = "duration_ms")]
    pub rebirth_timeout: Duration,
    /// Minimum time between rebirths
    #[serde(with = "duration_ms")]
    pub rebirth_debounce: Duration,
    /// How long an edge node waits for the primary host to come online
    #[serde(with = "duration_ms")]
    pub host_response_timeout: Duration,
    pub startup_delay: Option<StartupDelay>,
    pub use_aliases: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            primary_host_id: None,
            keep_alive: default_keep_alive(),
            rebirth_timeout: default_rebirth_timeout(),
            rebirth_debounce: default_rebirth_debounce(),
            host_response_timeout: default_host_response_timeout(),
            startup_delay: None,
            use_aliases: false,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    pub fn with_primary_host<S: Into<String>>(mut self, host_id: S) -> Self {
        self.primary_host_id = Some(host_id.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_rebirth_timeout(mut self, timeout: Duration) -> Self {
        self.rebirth_timeout = timeout;
        self
    }

    pub fn with_rebirth_debounce(mut self, debounce: Duration) -> Self {
        self.rebirth_debounce = debounce;
        self
    }

    pub fn with_host_response_timeout(mut self, timeout: Duration) -> Self {
        self.host_response_timeout = timeout;
        self
    }

    pub fn with_startup_delay(mut self, delay: StartupDelay) -> Self {
        self.startup_delay = Some(delay);
        self
    }

    pub fn with_aliases(mut self, use_aliases: bool) -> Self {
        self.use_aliases = use_aliases;
        self
    }

    /// How long to wait for a connection before moving on to the next endpoint
    pub fn connect_timeout(&self) -> Duration {
        self.keep_alive * 3 / 2
    }

    /// A random delay drawn from the startup delay bounds, zero if none are set
    pub fn sample_startup_delay(&self) -> Duration {
        self.startup_delay
            .map(|delay| delay.sample())
            .unwrap_or(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(host_id) = &self.primary_host_id {
            validate_name(host_id).map_err(ConfigError::InvalidName)?;
        }
        for endpoint in &self.endpoints {
            if endpoint.host.is_empty() || endpoint.port == 0 {
                return Err(ConfigError::InvalidEndpoint(endpoint.to_string()));
            }
        }
        if self.keep_alive.is_zero() {
            return Err(ConfigError::Invalid("keep alive must be non zero".into()));
        }
        if self.rebirth_timeout.is_zero() {
            return Err(ConfigError::Invalid("rebirth timeout must be non zero".into()));
        }
        Ok(())
    }
}
