//! Command-line interface definitions.
//!
//! This module defines the CLI structure for the server and client binaries
//! using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{Config, EvictionStrategy};

/// echo-kv server.
///
/// Serves the RESP protocol over TCP from an in-memory keyspace.
#[derive(Parser, Debug)]
#[command(name = "echo-kv-server")]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Address to bind to.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 7379)]
    pub port: u16,

    /// Maximum number of keys; 0 means unlimited.
    #[arg(long, default_value_t = 100)]
    pub keys_limit: usize,

    /// Which keys to drop when the limit is reached.
    #[arg(long, value_enum, default_value_t = EvictionStrategy::AllKeysLru)]
    pub eviction_strategy: EvictionStrategy,

    /// Fraction of the key limit evicted per pass.
    #[arg(long, default_value_t = 0.40)]
    pub eviction_ratio: f64,

    /// Snapshot file written by BGREWRITEAOF and on shutdown.
    #[arg(long, default_value = "./echo-master.aof")]
    pub aof_file: PathBuf,

    /// Replay the snapshot file before accepting connections.
    #[arg(long)]
    pub load_aof: bool,
}

impl ServerArgs {
    pub fn to_config(&self) -> Config {
        Config::new()
            .host(self.host.clone())
            .port(self.port)
            .keys_limit(self.keys_limit)
            .eviction_strategy(self.eviction_strategy)
            .eviction_ratio(self.eviction_ratio)
            .aof_file(self.aof_file.clone())
            .build()
    }
}

/// echo-kv client.
///
/// A CLI tool for sending single commands to a running echo-kv server.
#[derive(Parser, Debug)]
#[command(name = "echo-kv-client")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Server host.
    #[arg(long, default_value = "127.0.0.1", global = true)]
    pub host: String,

    /// Server port.
    #[arg(short, long, default_value_t = 7379, global = true)]
    pub port: u16,

    /// The command to execute.
    #[clap(subcommand)]
    pub command: ClientCommand,
}

/// Available client commands.
#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// Get the value stored at a key.
    Get {
        /// The key to look up.
        key: String,
    },

    /// Set a key to a value.
    Set {
        /// The key to store the value under.
        key: String,
        /// The value to store.
        value: String,
        /// Expire the key after this many seconds.
        #[arg(long)]
        ex: Option<i64>,
    },

    /// Delete one or more keys.
    Del {
        /// The keys to delete.
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Show the remaining lifetime of a key in seconds.
    Ttl {
        key: String,
    },

    /// Expire a key after a number of seconds.
    Expire {
        key: String,
        seconds: i64,
    },

    /// Increment the integer stored at a key.
    Incr {
        key: String,
    },

    /// Check that the server is responsive.
    Ping {
        /// Optional message to echo back.
        message: Option<String>,
    },

    /// Show keyspace statistics.
    Info,

    /// Rewrite the server's snapshot file.
    #[command(name = "bgrewriteaof")]
    BgRewriteAof,
}

impl ClientCommand {
    /// The command line to send, name first.
    pub fn to_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        match self {
            ClientCommand::Get { key } => tokens.extend(["GET".into(), key.clone()]),
            ClientCommand::Set { key, value, ex } => {
                tokens.extend(["SET".into(), key.clone(), value.clone()]);
                if let Some(secs) = ex {
                    tokens.extend(["EX".into(), secs.to_string()]);
                }
            }
            ClientCommand::Del { keys } => {
                tokens.push("DEL".into());
                tokens.extend(keys.iter().cloned());
            }
            ClientCommand::Ttl { key } => tokens.extend(["TTL".into(), key.clone()]),
            ClientCommand::Expire { key, seconds } => {
                tokens.extend(["EXPIRE".into(), key.clone(), seconds.to_string()])
            }
            ClientCommand::Incr { key } => tokens.extend(["INCR".into(), key.clone()]),
            ClientCommand::Ping { message } => {
                tokens.push("PING".into());
                tokens.extend(message.iter().cloned());
            }
            ClientCommand::Info => tokens.push("INFO".into()),
            ClientCommand::BgRewriteAof => tokens.push("BGREWRITEAOF".into()),
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        let cli = Cli::parse_from(["test", "get", "mykey"]);
        match cli.command {
            ClientCommand::Get { key } => assert_eq!(key, "mykey"),
            _ => panic!("Expected Get command"),
        }
        assert_eq!(cli.port, 7379);
    }

    #[test]
    fn test_parse_set_with_ex() {
        let cli = Cli::parse_from(["test", "set", "mykey", "myvalue", "--ex", "10"]);
        assert_eq!(
            cli.command.to_tokens(),
            vec!["SET", "mykey", "myvalue", "EX", "10"]
        );
    }

    #[test]
    fn test_parse_del_many() {
        let cli = Cli::parse_from(["test", "del", "a", "b"]);
        assert_eq!(cli.command.to_tokens(), vec!["DEL", "a", "b"]);
    }

    #[test]
    fn test_parse_ping() {
        let cli = Cli::parse_from(["test", "ping"]);
        assert_eq!(cli.command.to_tokens(), vec!["PING"]);
    }

    #[test]
    fn test_parse_bgrewriteaof() {
        let cli = Cli::parse_from(["test", "--port", "6400", "bgrewriteaof"]);
        assert!(matches!(cli.command, ClientCommand::BgRewriteAof));
        assert_eq!(cli.port, 6400);
    }

    #[test]
    fn test_server_args_defaults() {
        let args = ServerArgs::parse_from(["server"]);
        let config = args.to_config();
        assert_eq!(config.listen_addr(), "0.0.0.0:7379");
        assert_eq!(config.get_keys_limit(), Some(100));
        assert_eq!(config.get_eviction_strategy(), EvictionStrategy::AllKeysLru);
        assert!(!args.load_aof);
    }

    #[test]
    fn test_server_args_overrides() {
        let args = ServerArgs::parse_from([
            "server",
            "--keys-limit",
            "0",
            "--eviction-strategy",
            "allkeys-random",
            "--load-aof",
        ]);
        let config = args.to_config();
        assert_eq!(config.get_keys_limit(), None);
        assert_eq!(config.get_eviction_strategy(), EvictionStrategy::AllKeysRandom);
        assert!(args.load_aof);
    }
}
