//! Command-line and environment configuration.

use std::{path::Path, time::Duration};

use clap::{Parser, ValueEnum};
use maelstrom_mesh::CasRetryPolicy;
use maelstrom_protocol::kv::LIN_KV;
use thiserror::Error;

use crate::{
    logging::{LogFormat, LoggingConfig},
    node::NodeOptions,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    /// Gossip broadcast with dedup
    Broadcast,
    /// Grow-only counter over a KV service
    Counter,
    /// Globally unique id generation
    UniqueIds,
}

impl Workload {
    /// Infer the workload from an executable path such as
    /// `/usr/local/bin/maelstrom-counter`.
    pub fn from_program_name(program: &str) -> Option<Self> {
        let name = Path::new(program).file_stem()?.to_str()?;
        match name.strip_prefix("maelstrom-")? {
            "broadcast" => Some(Workload::Broadcast),
            "counter" => Some(Workload::Counter),
            "unique-ids" => Some(Workload::UniqueIds),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No workload given and none can be inferred from program name {0:?}")]
    UnknownWorkload(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "maelstrom-node",
    version,
    about = "Maelstrom workload node speaking line-delimited JSON on stdin/stdout"
)]
pub struct NodeConfig {
    /// Workload to serve; inferred from the program name when omitted
    #[arg(long, env = "MAELSTROM_WORKLOAD", value_enum)]
    pub workload: Option<Workload>,

    /// Key-value service used by the counter
    #[arg(long, env = "MAELSTROM_KV_SERVICE", default_value = LIN_KV)]
    pub kv_service: String,

    /// Deadline for synchronous RPCs, in milliseconds
    #[arg(long, env = "MAELSTROM_RPC_TIMEOUT_MS", default_value_t = 1000)]
    pub rpc_timeout_ms: u64,

    /// Compare-and-swap attempts per counter add; unbounded when omitted
    #[arg(long, env = "MAELSTROM_CAS_MAX_ATTEMPTS")]
    pub cas_max_attempts: Option<u32>,

    /// Initial delay between compare-and-swap retries, in milliseconds
    #[arg(long, env = "MAELSTROM_CAS_BACKOFF_BASE_MS", default_value_t = 0)]
    pub cas_backoff_base_ms: u64,

    /// Upper bound on the delay between retries, in milliseconds
    #[arg(long, env = "MAELSTROM_CAS_BACKOFF_MAX_MS", default_value_t = 100)]
    pub cas_backoff_max_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "MAELSTROM_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "MAELSTROM_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            workload: None,
            kv_service: LIN_KV.to_string(),
            rpc_timeout_ms: 1000,
            cas_max_attempts: None,
            cas_backoff_base_ms: 0,
            cas_backoff_max_ms: 100,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rpc-timeout-ms must be greater than zero".to_string(),
            ));
        }
        if self.cas_max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "cas-max-attempts must be at least 1".to_string(),
            ));
        }
        if self.cas_backoff_base_ms > self.cas_backoff_max_ms {
            return Err(ConfigError::Invalid(format!(
                "cas-backoff-base-ms ({}) exceeds cas-backoff-max-ms ({})",
                self.cas_backoff_base_ms, self.cas_backoff_max_ms
            )));
        }
        if self.kv_service.trim().is_empty() {
            return Err(ConfigError::Invalid("kv-service must not be empty".to_string()));
        }
        Ok(())
    }

    /// The explicit workload, or the one named by `program`.
    pub fn resolve_workload(&self, program: Option<&str>) -> Result<Workload, ConfigError> {
        if let Some(workload) = self.workload {
            return Ok(workload);
        }
        let program = program.unwrap_or_default();
        Workload::from_program_name(program)
            .ok_or_else(|| ConfigError::UnknownWorkload(program.to_string()))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn node_options(&self) -> NodeOptions {
        NodeOptions {
            rpc_timeout: self.rpc_timeout(),
        }
    }

    pub fn cas_retry_policy(&self) -> CasRetryPolicy {
        let policy = CasRetryPolicy::unbounded().with_backoff(
            Duration::from_millis(self.cas_backoff_base_ms),
            Duration::from_millis(self.cas_backoff_max_ms),
        );
        match self.cas_max_attempts {
            Some(max) => policy.with_max_attempts(max),
            None => policy,
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}
