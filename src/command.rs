//! Command names and decoded command lines.
//!
//! This module defines the commands the server understands and the
//! [`ParsedCommand`] the evaluator consumes.

use crate::error::{EngineError, EngineResult};
use crate::resp::{self, RespValue};

/// Commands understood by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Health check, or echo of a single argument.
    Ping,
    /// Read a key.
    Get,
    /// Write a key, optionally with `EX <seconds>`.
    Set,
    /// Remaining lifetime of a key in seconds.
    Ttl,
    /// Delete keys.
    Del,
    /// Give a key a lifetime in seconds.
    Expire,
    /// Increment an integer value.
    Incr,
    /// Rewrite the snapshot file.
    BgRewriteAof,
    /// Keyspace summary and counters.
    Info,
    /// Accepted for client compatibility; does nothing.
    Client,
    /// Accepted for client compatibility; does nothing.
    Latency,
    /// Run an LRU eviction pass now.
    Lru,
    /// Start queuing commands.
    Multi,
    /// Run the queued commands.
    Exec,
    /// Drop the queued commands.
    Discard,
}

impl Command {
    /// Look up a command by name, case-insensitively.
    ///
    /// Returns `None` for names the server does not know.
    pub fn lookup(name: &str) -> Option<Command> {
        let cmd = match name.to_ascii_uppercase().as_str() {
            "PING" => Command::Ping,
            "GET" => Command::Get,
            "SET" => Command::Set,
            "TTL" => Command::Ttl,
            "DEL" => Command::Del,
            "EXPIRE" => Command::Expire,
            "INCR" => Command::Incr,
            "BGREWRITEAOF" => Command::BgRewriteAof,
            "INFO" => Command::Info,
            "CLIENT" => Command::Client,
            "LATENCY" => Command::Latency,
            "LRU" => Command::Lru,
            "MULTI" => Command::Multi,
            "EXEC" => Command::Exec,
            "DISCARD" => Command::Discard,
            _ => return None,
        };
        Some(cmd)
    }

    /// Resolve a command name for dispatch.
    ///
    /// Unknown names are handled as PING.
    pub fn get(name: &str) -> Command {
        Self::lookup(name).unwrap_or_else(|| {
            tracing::warn!(command = name, "unknown command, answering as PING");
            Command::Ping
        })
    }

    /// Commands that drive the transaction state instead of being queued.
    pub fn is_transaction_control(&self) -> bool {
        matches!(self, Command::Multi | Command::Exec | Command::Discard)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::Get => "get",
            Command::Set => "set",
            Command::Ttl => "ttl",
            Command::Del => "del",
            Command::Expire => "expire",
            Command::Incr => "incr",
            Command::BgRewriteAof => "bgrewriteaof",
            Command::Info => "info",
            Command::Client => "client",
            Command::Latency => "latency",
            Command::Lru => "lru",
            Command::Multi => "multi",
            Command::Exec => "exec",
            Command::Discard => "discard",
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One command line: upper-cased name plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

impl ParsedCommand {
    pub fn new<I, S>(name: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_ascii_uppercase(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a command from its tokens; the first token is the name.
    pub fn from_tokens(tokens: Vec<String>) -> EngineResult<Self> {
        let mut tokens = tokens.into_iter();
        let name = tokens
            .next()
            .ok_or_else(|| EngineError::Protocol("empty command".to_string()))?;
        Ok(Self::new(&name, tokens))
    }

    /// Build a command from a decoded RESP array of strings.
    pub fn from_value(value: RespValue) -> EngineResult<Self> {
        Self::from_tokens(resp::to_array_string(value)?)
    }

    /// The command this line dispatches to.
    pub fn command(&self) -> Command {
        Command::get(&self.name)
    }

    /// Name followed by the arguments, as sent on the wire.
    pub fn tokens(&self) -> Vec<String> {
        std::iter::once(self.name.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}
