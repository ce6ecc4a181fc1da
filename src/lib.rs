//! # echo-kv
//!
//! A small in-memory key-value server speaking a Redis-style wire protocol
//! (RESP), with TTLs, approximate LRU eviction and a snapshot file.
//!
//! ## Features
//!
//! - **RESP codec**: simple strings, errors, integers, bulk strings, arrays
//! - **TTL support**: lazy expiry on read plus a sampling background sweep
//! - **Eviction**: `simple-first`, `allkeys-random` or sampled `allkeys-lru`
//!   once the key limit is reached
//! - **Transactions**: MULTI / EXEC / DISCARD per connection
//! - **Snapshot file**: BGREWRITEAOF, rewrite on shutdown, replay on startup
//!
//! ## Quick Start
//!
//! ```rust
//! use echo_kv::{eval_and_respond, Config, ParsedCommand, Session, Store};
//!
//! let config = Config::new().keys_limit(1_000).build();
//! let mut store = Store::new(config);
//! let mut session = Session::new();
//!
//! let batch = [
//!     ParsedCommand::new("SET", ["greeting", "hello"]),
//!     ParsedCommand::new("GET", ["greeting"]),
//! ];
//! let reply = eval_and_respond(&batch, &mut session, &mut store);
//! assert_eq!(&reply[..], b"+OK\r\n$5\r\nhello\r\n");
//! ```
//!
//! ## Time
//!
//! The store reads time through a [`Clock`]. Tests hand it a [`ManualClock`]
//! and move time forward explicitly:
//!
//! ```rust
//! use std::sync::Arc;
//! use echo_kv::{Config, ManualClock, Obj, Store};
//!
//! let clock = ManualClock::new(0);
//! let mut store = Store::with_clock(Config::default(), Arc::new(clock.clone()));
//!
//! store.put("session", Obj::from_string("abc"));
//! store.set_expiry("session", 1_000);
//! clock.advance_secs(2);
//! assert!(store.get("session").is_none());
//! ```

pub mod aof;
pub mod cli;
pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod eval;
pub mod eviction;
pub mod expire;
pub mod object;
pub mod resp;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use command::{Command, ParsedCommand};
pub use config::{Config, EvictionStrategy};
pub use error::{EngineError, EngineResult};
pub use eval::eval_and_respond;
pub use object::{Obj, ObjId, Value};
pub use resp::RespValue;
pub use session::{Session, TxnState};
pub use stats::{KeyspaceStats, StatsSnapshot};
pub use store::{Store, Ttl};
