//! Configuration loading for the vigil service.
//!
//! Configuration comes from a TOML file; values may reference environment
//! variables with `${VAR_NAME}` syntax, which keeps secrets such as the
//! submitter key out of the file itself.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vigil_core::Address;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Contract addresses
    pub contracts: ContractsConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Submitter configuration
    #[serde(default)]
    pub submitter: SubmitterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Ethereum RPC URL
    pub rpc_url: String,

    /// Chain ID (e.g., 11155111 for Sepolia)
    pub chain_id: u64,
}

/// Contract addresses configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// EvidenceRegistry contract address
    pub evidence_registry: Address,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://vigil.db")
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// Submitter configuration.
///
/// Without a private key the service runs read-only: verification and
/// enumeration work, recording is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitterConfig {
    /// Private key for the submitting account (hex string, 0x prefix optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Seconds to wait for transaction confirmation before giving up
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_submit_timeout_secs() -> u64 {
    120
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            submit_timeout_secs: default_submit_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, expanding `${VAR}` references
    /// from the environment first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.network.rpc_url.is_empty() {
            anyhow::bail!("Network RPC URL cannot be empty");
        }
        if self.network.chain_id == 0 {
            anyhow::bail!("Chain ID must be non-zero");
        }

        if self.contracts.evidence_registry.is_zero() {
            anyhow::bail!("Contracts evidence_registry must be a non-zero address");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be > 0");
        }
        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot exceed max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if let Some(key) = &self.submitter.private_key {
            let key = key.trim_start_matches("0x");
            if key.len() != 64 {
                anyhow::bail!(
                    "Submitter private_key must be 64 hex characters (got {})",
                    key.len()
                );
            }
            if !key.chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!("Submitter private_key must be a valid hex string");
            }
        }
        if self.submitter.submit_timeout_secs == 0 {
            anyhow::bail!("Submitter submit_timeout_secs must be > 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }

    /// Submitter private key normalized to a 0x-prefixed hex string.
    pub fn submitter_private_key_with_prefix(&self) -> Option<String> {
        self.submitter
            .private_key
            .as_ref()
            .map(|key| format!("0x{}", key.trim_start_matches("0x")))
    }
}

/// Expand `${VAR_NAME}` placeholders from the environment.
///
/// Placeholders inside TOML comments are left alone, so example lines like
/// `# private_key = "${SUBMITTER_KEY}"` do not require the variable to be
/// set. The comment detection tracks basic single-line string state, which
/// covers the TOML this service actually ships.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        let comment_start = find_comment_start(line);
        let (code, comment) = match comment_start {
            Some(idx) => line.split_at(idx),
            None => (line, ""),
        };

        let mut rest = code;
        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find('}')
                .context("Unclosed environment variable placeholder")?;
            let var_name = &after[..end];
            if var_name.is_empty() {
                anyhow::bail!("Empty environment variable name");
            }
            let value = std::env::var(var_name)
                .with_context(|| format!("Environment variable '{}' is not set", var_name))?;
            result.push_str(&value);
            rest = &after[end + 1..];
        }
        result.push_str(rest);
        result.push_str(comment);
    }

    Ok(result)
}

/// Byte offset of the first `#` that starts a comment, ignoring `#` inside
/// quoted strings.
fn find_comment_start(line: &str) -> Option<usize> {
    let mut in_double = false;
    let mut in_single = false;
    let mut escape = false;

    for (idx, ch) in line.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_double => escape = true,
            '"' if !in_single => in_double = !in_double,
            '\'' if !in_double => in_single = !in_single,
            '#' if !in_double && !in_single => return Some(idx),
            _ => {}
        }
    }
    None
}
