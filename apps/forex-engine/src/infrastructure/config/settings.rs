//! Engine Configuration Settings
//!
//! Configuration types for the forex engine, loaded from `FOREX_ENGINE_*`
//! environment variables. Unset or unparsable values fall back to defaults;
//! values that parse but make no sense together are a [`ConfigError`].

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::application::services::{GatewayConfig, RandomFillConfig, SimulationConfig};
use crate::domain::account::MarginPolicy;
use crate::infrastructure::websocket::{BroadcasterConfig, DEFAULT_QUEUE_CAPACITY};

/// Which simulated market to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FillPolicyKind {
    /// Seeded random rejects, waits, partial and full fills.
    #[default]
    Random,
    /// Fill everything on the first tick.
    Immediate,
}

impl FillPolicyKind {
    /// Parse a policy name.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "random" => Some(Self::Random),
            "immediate" => Some(Self::Immediate),
            _ => None,
        }
    }

    /// Policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::Immediate => "immediate",
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerSettings {
    /// Address to bind.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if `host` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self.host.parse().map_err(|_| ConfigError::InvalidValue {
            key: "FOREX_ENGINE_HOST".to_string(),
            message: format!("'{}' is not an IP address", self.host),
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketSettings {
    /// Outbound queue capacity per connection.
    pub queue_capacity: usize,
    /// Dropped updates tolerated before disconnecting (0 = never).
    pub max_dropped: u64,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_dropped: 0,
        }
    }
}

/// Simulated market settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSettings {
    /// Fill policy.
    pub policy: FillPolicyKind,
    /// RNG seed for the random policy.
    pub seed: Option<u64>,
    /// Delay between fill ticks.
    pub tick_interval: Duration,
    /// Chance a pending order is rejected on a tick.
    pub reject_probability: f64,
    /// Chance a tick does nothing.
    pub wait_probability: f64,
    /// Chance a tick fills the whole remainder.
    pub full_fill_probability: f64,
    /// Smallest partial fill, as a fraction of the remainder.
    pub partial_fraction_min: f64,
    /// Largest partial fill, as a fraction of the remainder.
    pub partial_fraction_max: f64,
    /// Ticks after which an unfinished order rests.
    pub max_ticks: u32,
    /// Version-conflict retries before a command fails.
    pub commit_retries: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        let random = RandomFillConfig::default();
        let engine = SimulationConfig::default();
        Self {
            policy: FillPolicyKind::default(),
            seed: None,
            tick_interval: Duration::from_millis(500),
            reject_probability: random.reject_probability,
            wait_probability: random.wait_probability,
            full_fill_probability: random.full_fill_probability,
            partial_fraction_min: random.partial_fraction_min,
            partial_fraction_max: random.partial_fraction_max,
            max_ticks: engine.max_ticks,
            commit_retries: engine.commit_retries,
        }
    }
}

/// Account and margin settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSettings {
    /// Balance of an account on first use.
    pub default_balance: Decimal,
    /// Fraction of notional held as margin.
    pub margin_rate: Decimal,
    /// Price assumed for market orders.
    pub reference_price: Decimal,
}

impl Default for AccountSettings {
    fn default() -> Self {
        let margin = MarginPolicy::default();
        Self {
            default_balance: GatewayConfig::default().default_balance,
            margin_rate: margin.margin_rate,
            reference_price: margin.reference_price,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    /// HTTP listener.
    pub server: ServerSettings,
    /// WebSocket connections.
    pub websocket: WebSocketSettings,
    /// Simulated market.
    pub simulation: SimulationSettings,
    /// Accounts and margin.
    pub accounts: AccountSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is invalid; see [`EngineConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from any key/value source.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is invalid; see [`EngineConfig::validate`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let server_defaults = ServerSettings::default();
        let server = ServerSettings {
            host: env.string("FOREX_ENGINE_HOST", server_defaults.host),
            port: env.parse("FOREX_ENGINE_PORT", server_defaults.port),
        };

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            queue_capacity: env.parse("FOREX_ENGINE_WS_QUEUE_CAPACITY", ws_defaults.queue_capacity),
            max_dropped: env.parse("FOREX_ENGINE_WS_MAX_DROPPED", ws_defaults.max_dropped),
        };

        let sim = SimulationSettings::default();
        let policy = match env.get("FOREX_ENGINE_FILL_POLICY") {
            None => sim.policy,
            Some(raw) => FillPolicyKind::from_str_case_insensitive(&raw).ok_or_else(|| {
                ConfigError::InvalidValue {
                    key: "FOREX_ENGINE_FILL_POLICY".to_string(),
                    message: format!("unknown policy '{raw}', expected random or immediate"),
                }
            })?,
        };
        let simulation = SimulationSettings {
            policy,
            seed: env.parse_optional("FOREX_ENGINE_SEED"),
            tick_interval: env.duration_millis("FOREX_ENGINE_TICK_INTERVAL_MS", sim.tick_interval),
            reject_probability: env
                .parse("FOREX_ENGINE_REJECT_PROBABILITY", sim.reject_probability),
            wait_probability: env.parse("FOREX_ENGINE_WAIT_PROBABILITY", sim.wait_probability),
            full_fill_probability: env
                .parse("FOREX_ENGINE_FULL_FILL_PROBABILITY", sim.full_fill_probability),
            partial_fraction_min: env
                .parse("FOREX_ENGINE_PARTIAL_FRACTION_MIN", sim.partial_fraction_min),
            partial_fraction_max: env
                .parse("FOREX_ENGINE_PARTIAL_FRACTION_MAX", sim.partial_fraction_max),
            max_ticks: env.parse("FOREX_ENGINE_MAX_TICKS", sim.max_ticks),
            commit_retries: env.parse("FOREX_ENGINE_COMMIT_RETRIES", sim.commit_retries),
        };

        let acc = AccountSettings::default();
        let accounts = AccountSettings {
            default_balance: env.parse("FOREX_ENGINE_DEFAULT_BALANCE", acc.default_balance),
            margin_rate: env.parse("FOREX_ENGINE_MARGIN_RATE", acc.margin_rate),
            reference_price: env.parse("FOREX_ENGINE_REFERENCE_PRICE", acc.reference_price),
        };

        let config = Self {
            server,
            websocket,
            simulation,
            accounts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check values that parse but cannot work.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;

        if self.websocket.queue_capacity == 0 {
            return Err(invalid("FOREX_ENGINE_WS_QUEUE_CAPACITY", "must be at least 1"));
        }

        let sim = &self.simulation;
        for (key, value) in [
            ("FOREX_ENGINE_REJECT_PROBABILITY", sim.reject_probability),
            ("FOREX_ENGINE_WAIT_PROBABILITY", sim.wait_probability),
            ("FOREX_ENGINE_FULL_FILL_PROBABILITY", sim.full_fill_probability),
            ("FOREX_ENGINE_PARTIAL_FRACTION_MIN", sim.partial_fraction_min),
            ("FOREX_ENGINE_PARTIAL_FRACTION_MAX", sim.partial_fraction_max),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, format!("{value} is outside [0, 1]")));
            }
        }
        let total = sim.reject_probability + sim.wait_probability + sim.full_fill_probability;
        if total > 1.0 {
            return Err(invalid(
                "FOREX_ENGINE_FULL_FILL_PROBABILITY",
                format!("reject + wait + full fill probabilities sum to {total}, above 1"),
            ));
        }
        if sim.partial_fraction_min > sim.partial_fraction_max {
            return Err(invalid(
                "FOREX_ENGINE_PARTIAL_FRACTION_MIN",
                "must not exceed FOREX_ENGINE_PARTIAL_FRACTION_MAX",
            ));
        }
        if sim.max_ticks == 0 {
            return Err(invalid("FOREX_ENGINE_MAX_TICKS", "must be at least 1"));
        }

        let acc = &self.accounts;
        if acc.default_balance < Decimal::ZERO {
            return Err(invalid("FOREX_ENGINE_DEFAULT_BALANCE", "must not be negative"));
        }
        if acc.margin_rate < Decimal::ZERO || acc.margin_rate > Decimal::ONE {
            return Err(invalid("FOREX_ENGINE_MARGIN_RATE", "must be within [0, 1]"));
        }
        if acc.reference_price <= Decimal::ZERO {
            return Err(invalid("FOREX_ENGINE_REFERENCE_PRICE", "must be positive"));
        }
        Ok(())
    }

    /// Matching engine settings.
    #[must_use]
    pub const fn simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            max_ticks: self.simulation.max_ticks,
            commit_retries: self.simulation.commit_retries,
            margin: MarginPolicy {
                margin_rate: self.accounts.margin_rate,
                reference_price: self.accounts.reference_price,
            },
        }
    }

    /// Gateway settings.
    #[must_use]
    pub const fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            default_balance: self.accounts.default_balance,
            commit_retries: self.simulation.commit_retries,
        }
    }

    /// Random fill policy settings.
    #[must_use]
    pub const fn random_fill_config(&self) -> RandomFillConfig {
        RandomFillConfig {
            reject_probability: self.simulation.reject_probability,
            wait_probability: self.simulation.wait_probability,
            full_fill_probability: self.simulation.full_fill_probability,
            partial_fraction_min: self.simulation.partial_fraction_min,
            partial_fraction_max: self.simulation.partial_fraction_max,
            seed: self.simulation.seed,
        }
    }

    /// WebSocket broadcaster settings.
    #[must_use]
    pub const fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            queue_capacity: self.websocket.queue_capacity,
            max_dropped: self.websocket.max_dropped,
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A setting has a value the engine cannot run with.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// What is wrong with it.
        message: String,
    },
}

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

// =============================================================================
// Lookup Helpers
// =============================================================================

struct Env<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: String) -> String {
        self.get(key).unwrap_or(default)
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.parse_optional(key).unwrap_or(default)
    }

    fn parse_optional<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        raw.parse().map_or_else(
            |_| {
                tracing::warn!(key, value = %raw, "Ignoring unparsable setting, using default");
                None
            },
            Some,
        )
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse_optional::<u64>(key)
            .map_or(default, Duration::from_millis)
    }
}
