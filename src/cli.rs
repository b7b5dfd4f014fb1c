//! Command-line interface definitions
//!
//! Defines all CLI commands and arguments using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// logcask - an append-only log-structured key-value store
#[derive(Parser, Debug)]
#[command(name = "logcask")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start logcask's HTTP façade over a database directory
    Serve {
        /// Data directory holding the active segment and sealed segments
        #[arg(long, default_value = "./data")]
        data_dir: PathBuf,

        /// Address to bind the HTTP façade on
        #[arg(long, short = 'b', default_value = "127.0.0.1:8080")]
        bind: String,

        /// Active-segment rotation threshold, in bytes
        #[arg(long)]
        rotation_threshold: Option<u64>,

        /// Background merge-worker interval, in seconds
        #[arg(long)]
        merge_interval_secs: Option<u64>,

        /// Configuration file (TOML or JSON)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Run the round-robin load balancer in front of a pool of `serve` instances
    Balance {
        /// Address to bind the balancer on
        #[arg(long, short = 'b', default_value = "127.0.0.1:8090")]
        bind: String,

        /// Backend façade addresses to balance across, e.g. 127.0.0.1:8080
        #[arg(long = "backend", required = true)]
        backends: Vec<String>,

        /// Per-request timeout, in seconds
        #[arg(long, default_value = "3")]
        timeout_secs: u64,

        /// Health-check poll interval, in seconds
        #[arg(long, default_value = "10")]
        health_interval_secs: u64,
    },

    /// Client commands (get, put) against a running façade
    Client {
        /// Façade address (host:port)
        #[arg(long, short = 'a', default_value = "127.0.0.1:8080")]
        addr: String,

        #[command(subcommand)]
        command: ClientCommand,
    },
}

/// Client subcommands
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Put a key-value pair
    Put {
        /// Key to store
        key: String,

        /// Value to store
        value: String,
    },

    /// Get a value by key
    Get {
        /// Key to retrieve
        key: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_serve_command() {
        let cli = Cli::parse_from([
            "logcask",
            "serve",
            "--data-dir",
            "/data/server",
            "--bind",
            "0.0.0.0:9000",
        ]);

        match cli.command {
            Commands::Serve { data_dir, bind, .. } => {
                assert_eq!(data_dir, PathBuf::from("/data/server"));
                assert_eq!(bind, "0.0.0.0:9000");
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_parse_client_put() {
        let cli = Cli::parse_from(["logcask", "client", "put", "test.key", "test_value"]);

        match cli.command {
            Commands::Client { command, .. } => match command {
                ClientCommand::Put { key, value } => {
                    assert_eq!(key, "test.key");
                    assert_eq!(value, "test_value");
                }
                _ => panic!("Expected Put command"),
            },
            _ => panic!("Expected Client command"),
        }
    }

    #[test]
    fn test_parse_client_get() {
        let cli = Cli::parse_from([
            "logcask",
            "client",
            "--addr",
            "192.168.1.1:8080",
            "get",
            "my.key",
        ]);

        match cli.command {
            Commands::Client { addr, command } => {
                assert_eq!(addr, "192.168.1.1:8080");
                match command {
                    ClientCommand::Get { key } => {
                        assert_eq!(key, "my.key");
                    }
                    _ => panic!("Expected Get command"),
                }
            }
            _ => panic!("Expected Client command"),
        }
    }

    #[test]
    fn test_parse_balance_command() {
        let cli = Cli::parse_from([
            "logcask",
            "balance",
            "--backend",
            "127.0.0.1:8080",
            "--backend",
            "127.0.0.1:8081",
        ]);

        match cli.command {
            Commands::Balance { backends, bind, .. } => {
                assert_eq!(backends, vec!["127.0.0.1:8080", "127.0.0.1:8081"]);
                assert_eq!(bind, "127.0.0.1:8090");
            }
            _ => panic!("Expected Balance command"),
        }
    }

    #[test]
    fn test_default_values() {
        let cli = Cli::parse_from(["logcask", "serve"]);

        match cli.command {
            Commands::Serve { bind, data_dir, .. } => {
                assert_eq!(bind, "127.0.0.1:8080");
                assert_eq!(data_dir, PathBuf::from("./data"));
            }
            _ => panic!("Expected Serve command"),
        }
    }
}
