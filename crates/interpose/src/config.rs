//! Relay configuration with command-line and environment priority
//!
//! Each setting is resolved in this order (first found wins):
//! 1. Command-line flags
//! 2. Environment variables (INTERPOSE_*)
//! 3. Config file (interpose.toml)
//! 4. Default values (where applicable)

use std::env;
use std::path::Path;

use serde::Deserialize;

use interpose::Network;

/// Environment variable prefix
const ENV_PREFIX: &str = "INTERPOSE";

/// Default listen endpoint
const DEFAULT_LISTEN: &str = "localhost:9997";

/// Relay configuration (parsed from TOML)
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Network family: "tcp", "tcp4" or "tcp6"
    pub network: Option<String>,

    /// Address to accept connections on (host:port)
    #[serde(alias = "local")]
    pub listen: Option<String>,

    /// Address every connection is relayed to (host:port)
    #[serde(alias = "remote")]
    pub forward: Option<String>,

    /// Log the contents of every relayed chunk
    pub dump_payload: Option<bool>,
}

/// Values given on the command line
#[derive(Debug, Default)]
pub struct Overrides {
    pub network: Option<String>,
    pub listen: Option<String>,
    pub forward: Option<String>,
    pub dump_payload: bool,
}

/// Fully resolved settings
#[derive(Debug)]
pub struct ResolvedRelayConfig {
    pub network: Network,
    pub listen: String,
    pub forward: String,
    pub dump_payload: bool,
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{}_{}", ENV_PREFIX, name)).ok()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file. A missing file is not an error.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if !Path::new(path).exists() {
            tracing::debug!("No config file at {}", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        tracing::info!("Loaded config from {}", path);
        Ok(config)
    }

    /// Merge command line, environment and file values
    pub fn resolve(self, overrides: Overrides) -> anyhow::Result<ResolvedRelayConfig> {
        self.resolve_with(overrides, get_env)
    }

    fn resolve_with(
        self,
        overrides: Overrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<ResolvedRelayConfig> {
        // Network: CLI > ENV > config > default tcp
        let network: Network = overrides
            .network
            .or_else(|| env("NETWORK"))
            .or(self.network)
            .unwrap_or_default()
            .parse()?;

        // Listen: CLI > ENV > config > default
        let listen = overrides
            .listen
            .or_else(|| env("LISTEN"))
            .or(self.listen)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());

        // Forward: CLI > ENV > config > required
        let forward = overrides
            .forward
            .or_else(|| env("FORWARD"))
            .or(self.forward)
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Forward address required. Pass --remote, set {}_FORWARD, or set forward in config",
                    ENV_PREFIX
                )
            })?;

        // Payload dump: CLI flag > ENV > config > off
        let dump_payload = overrides.dump_payload
            || env("DUMP_PAYLOAD")
                .and_then(|v| parse_bool(&v))
                .or(self.dump_payload)
                .unwrap_or(false);

        Ok(ResolvedRelayConfig {
            network,
            listen,
            forward,
            dump_payload,
        })
    }
}
