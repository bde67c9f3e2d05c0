//! Configuration for checkpointing and stats reporting.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt as _, Snafu};

fn default_service() -> String {
    "unnamed-rust-service".to_string()
}

fn default_agent_host() -> String {
    "localhost".to_string()
}

const fn default_agent_port() -> u16 {
    8126
}

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// Configuration could not be read from the environment.
    #[snafu(display("Failed to load configuration from the environment."))]
    FromEnvironment {
        /// Error source.
        source: figment::Error,
    },
}

/// Settings controlling checkpointing and stats reporting.
///
/// Typically loaded from `DD_`-prefixed environment variables via [`Config::from_env`]; tests
/// and embedded hosts can construct it directly.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Service name fed into every node hash.
    #[serde(default = "default_service")]
    pub service: String,

    /// Deployment environment fed into every node hash.
    #[serde(default)]
    pub env: String,

    /// Primary tag of this deployment (e.g. `datacenter:us1`), fed into every node hash.
    #[serde(default)]
    pub primary_tag: String,

    /// Whether stats are reported to the agent.
    ///
    /// When false, no aggregator is started and every reporting call succeeds as a no-op.
    #[serde(default)]
    pub agent_enabled: bool,

    /// Hostname of the agent receiving pipeline stats.
    #[serde(default = "default_agent_host")]
    pub agent_host: String,

    /// Port of the agent receiving pipeline stats.
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,
}

impl Config {
    /// Loads configuration from `DD_`-prefixed environment variables, e.g. `DD_SERVICE`,
    /// `DD_AGENT_ENABLED` or `DD_AGENT_HOST`. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed("DD_"))
            .extract()
            .context(FromEnvironment)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: default_service(),
            env: String::new(),
            primary_tag: String::new(),
            agent_enabled: false,
            agent_host: default_agent_host(),
            agent_port: default_agent_port(),
        }
    }
}
