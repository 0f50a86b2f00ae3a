//! Node configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! command-line flags.

use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::proof::{ProofOfWork, DEFAULT_DIFFICULTY, DEFAULT_TARGET};

/// SHA-256 hex digests have 64 digits.
const MAX_DIFFICULTY: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    /// Number of leading target digits a proof digest needs
    pub difficulty: usize,
    /// Hex digit the proof digest must start with
    pub target: char,
    pub mining_reward: u64,
    pub peer_timeout_ms: u64,
    /// Peers registered at startup
    pub peers: Vec<String>,
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            difficulty: DEFAULT_DIFFICULTY,
            target: DEFAULT_TARGET,
            mining_reward: 1,
            peer_timeout_ms: 5000,
            peers: Vec::new(),
            log_level: "info".to_string(),
        }
    }
}

/// Command-line flags.
#[derive(Debug, Default, Parser)]
#[command(name = "powledger", about = "Proof-of-work ledger node")]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Address to listen on
    #[arg(long)]
    pub host: Option<String>,
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,
    /// Leading zero digits required by the proof-of-work
    #[arg(short, long)]
    pub difficulty: Option<usize>,
    /// Peer to register at startup (repeatable)
    #[arg(long = "peer")]
    pub peers: Vec<String>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

impl NodeConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file named by `--config` (if any) and apply the other flags.
    pub fn load(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.clone(),
                    source,
                })?;
                toml::from_str(&text)?
            }
            None => NodeConfig::default(),
        };

        if let Some(host) = &args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(difficulty) = args.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(level) = &args.log_level {
            config.log_level = level.clone();
        }
        config.peers.extend(args.peers.iter().cloned());

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.difficulty == 0 || self.difficulty > MAX_DIFFICULTY {
            return Err(ConfigError::Invalid(format!(
                "difficulty must be between 1 and {}, got {}",
                MAX_DIFFICULTY, self.difficulty
            )));
        }
        if !self.target.is_ascii_hexdigit() || self.target.is_ascii_uppercase() {
            return Err(ConfigError::Invalid(format!(
                "target must be a lowercase hex digit, got {:?}",
                self.target
            )));
        }
        if self.peer_timeout_ms == 0 {
            return Err(ConfigError::Invalid("peer_timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn proof_of_work(&self) -> ProofOfWork {
        ProofOfWork::new(self.difficulty, self.target)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::default();
        assert_eq!(config.difficulty, 4);
        assert_eq!(config.target, '0');
        assert_eq!(config.listen_addr(), "0.0.0.0:5000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = NodeConfig::from_toml(
            r#"
            port = 6001
            difficulty = 3
            peers = ["http://127.0.0.1:6002"]
            "#,
        )
        .unwrap();
        assert_eq!(config.port, 6001);
        assert_eq!(config.difficulty, 3);
        assert_eq!(config.peers, vec!["http://127.0.0.1:6002".to_string()]);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.mining_reward, 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            NodeConfig::from_toml("difficulty = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml("difficulty = 65"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml("target = 'z'"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            NodeConfig::from_toml("port = 'abc'"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_cli_flags_override_defaults() {
        let args = CliArgs::parse_from([
            "powledger",
            "--port",
            "7000",
            "--difficulty",
            "2",
            "--peer",
            "127.0.0.1:7001",
            "--peer",
            "127.0.0.1:7002",
        ]);
        let config = NodeConfig::load(&args).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.peers.len(), 2);
    }

    #[test]
    fn test_missing_config_file_is_reported() {
        let args = CliArgs {
            config: Some(PathBuf::from("/nonexistent/powledger.toml")),
            ..Default::default()
        };
        assert!(matches!(NodeConfig::load(&args), Err(ConfigError::Io { .. })));
    }
}
