//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files.

use serde::{Deserialize, Serialize};

use crate::dispatch::Origin;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Connection target and pipelining.
    pub connection: ConnectionConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Simulated collaborator settings used by the CLI.
    pub simulation: SimulationConfig,
}

/// Per-connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Target origin, e.g. `https://api.example.com`.
    pub origin: String,

    /// Maximum written-but-unsettled requests (1 disables pipelining).
    pub pipelining: usize,
}

impl ConnectionConfig {
    pub fn origin(&self) -> Result<Origin, url::ParseError> {
        Origin::parse(&self.origin)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:8080".to_string(),
            pipelining: 1,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

/// Latencies and limits for the simulated writer and manager.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Time to establish a writer in milliseconds.
    pub connect_latency_ms: u64,

    /// Time from write to settled response in milliseconds.
    pub response_latency_ms: u64,

    /// Upper bound of random jitter added to every latency, in milliseconds.
    pub jitter_ms: u64,

    /// Unflushed bytes above which the writer reports busy.
    pub high_water_bytes: usize,

    /// Servernames whose establishment always fails.
    #[serde(default)]
    pub failing_servernames: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            connect_latency_ms: 20,
            response_latency_ms: 10,
            jitter_ms: 5,
            high_water_bytes: 16 * 1024,
            failing_servernames: Vec::new(),
        }
    }
}
