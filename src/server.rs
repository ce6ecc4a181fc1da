//! TCP front end.
//!
//! Each connection gets its own task, read buffer and [`Session`]. All
//! connections share one [`Store`] behind a mutex; a batch of commands is
//! evaluated to completion while holding it, and the lock is never held
//! across an `.await`. A timer task runs the active expiration sweep.
//!
//! A malformed frame is answered with an error reply after the commands that
//! preceded it in the same read; the rest of the buffer is dropped. A client
//! whose unfinished request grows past [`MAX_PENDING_BYTES`] is disconnected.
//!
//! On shutdown the server waits for any in-flight batch, marks the engine as
//! shutting down, and rewrites the snapshot file.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;

use crate::aof;
use crate::command::ParsedCommand;
use crate::error::{EngineError, EngineResult};
use crate::eval;
use crate::expire;
use crate::resp;
use crate::session::Session;
use crate::store::Store;

/// Most unparsed bytes a connection may hold while waiting for a frame to
/// complete.
pub const MAX_PENDING_BYTES: usize = resp::MAX_FRAME_LEN + 64 * 1024;

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineStatus {
    /// Idle, ready for the next batch.
    Waiting = 1 << 1,
    /// Evaluating a batch or a sweep.
    Busy = 1 << 2,
    /// No more work is accepted.
    ShuttingDown = 1 << 3,
}

impl EngineStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            v if v == EngineStatus::Busy as u8 => EngineStatus::Busy,
            v if v == EngineStatus::ShuttingDown as u8 => EngineStatus::ShuttingDown,
            _ => EngineStatus::Waiting,
        }
    }
}

/// State shared by every connection task and the sweeper.
#[derive(Debug)]
struct Shared {
    store: Mutex<Store>,
    status: AtomicU8,
}

impl Shared {
    fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
            status: AtomicU8::new(EngineStatus::Waiting as u8),
        }
    }

    fn status(&self) -> EngineStatus {
        EngineStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    /// Run `f` against the store with the engine marked Busy.
    ///
    /// Returns `None` once the engine is shutting down.
    fn with_engine<T>(&self, f: impl FnOnce(&mut Store) -> T) -> Option<T> {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        if self
            .status
            .compare_exchange(
                EngineStatus::Waiting as u8,
                EngineStatus::Busy as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return None;
        }

        let out = f(&mut store);
        self.status
            .store(EngineStatus::Waiting as u8, Ordering::SeqCst);
        Some(out)
    }

    /// Wait for the engine to go idle, then stop it.
    async fn shut_down(&self) {
        loop {
            let swapped = self.status.compare_exchange(
                EngineStatus::Waiting as u8,
                EngineStatus::ShuttingDown as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            );
            match swapped {
                Ok(_) => return,
                Err(v) if EngineStatus::from_u8(v) == EngineStatus::ShuttingDown => return,
                Err(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            }
        }
    }
}

/// Bind to the store's configured address and serve until Ctrl-C.
pub async fn run(store: Store) -> EngineResult<()> {
    let addr = store.config().listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, store, async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
        }
    })
    .await
}

/// Serve connections from `listener` until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    store: Store,
    shutdown: impl Future<Output = ()>,
) -> EngineResult<()> {
    let local_addr = listener.local_addr()?;
    let cron_frequency = store.config().get_cron_frequency();
    tracing::info!(
        addr = %local_addr,
        keys_limit = ?store.config().get_keys_limit(),
        strategy = %store.config().get_eviction_strategy(),
        "echo-kv listening"
    );

    let shared = Arc::new(Shared::new(store));
    let sweeper = tokio::spawn(run_sweeper(Arc::clone(&shared), cron_frequency));

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    tracing::debug!(%peer, "connection accepted");
                    let shared = Arc::clone(&shared);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(socket, peer, shared).await {
                            tracing::error!(%peer, error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            },
            _ = &mut shutdown => break,
        }
    }

    tracing::info!("shutting down");
    shared.shut_down().await;
    sweeper.abort();

    let store = shared.store.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = aof::dump_all_aof(&store) {
        tracing::error!(error = %e, "AOF rewrite on shutdown failed");
    }
    tracing::info!(keys = store.len(), "echo-kv stopped");
    Ok(())
}

async fn run_sweeper(shared: Arc<Shared>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if shared.status() == EngineStatus::ShuttingDown {
            return;
        }
        shared.with_engine(expire::delete_expired_keys);
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    peer: SocketAddr,
    shared: Arc<Shared>,
) -> EngineResult<()> {
    let mut buf = BytesMut::with_capacity(4096);
    let mut session = Session::new();

    loop {
        let n = socket.read_buf(&mut buf).await?;
        if n == 0 {
            tracing::debug!(%peer, "connection closed");
            return Ok(());
        }

        let batch = decode_batch(&mut buf);
        if batch.commands.is_empty() && batch.error.is_none() {
            if buf.len() > MAX_PENDING_BYTES {
                tracing::warn!(%peer, pending = buf.len(), "request too large, closing");
                let e = EngineError::Protocol("request too large".to_string());
                socket.write_all(&resp::encode(&e, false)).await?;
                return Ok(());
            }
            continue;
        }

        let mut reply = BytesMut::new();
        if !batch.commands.is_empty() {
            let evaluated = shared
                .with_engine(|store| eval::eval_and_respond(&batch.commands, &mut session, store));
            match evaluated {
                Some(out) => reply.extend_from_slice(&out),
                None => return Ok(()),
            }
        }
        if let Some(e) = batch.error {
            tracing::warn!(%peer, error = %e, "malformed request, discarding buffer");
            reply.extend_from_slice(&resp::encode(&e, false));
        }

        socket.write_all(&reply).await?;
    }
}

/// Commands taken off the front of a connection buffer.
#[derive(Debug, Default)]
struct Batch {
    commands: Vec<ParsedCommand>,
    /// Set when a malformed frame cut the batch short.
    error: Option<EngineError>,
}

/// Take every complete command off the front of `buf`.
///
/// A trailing partial frame stays in the buffer. Commands before a malformed
/// frame are kept; the malformed frame and everything after it are dropped.
fn decode_batch(buf: &mut BytesMut) -> Batch {
    let prefix = resp::decode_prefix(buf);
    let mut batch = Batch {
        commands: Vec::with_capacity(prefix.values.len()),
        error: prefix.error,
    };
    for value in prefix.values {
        match ParsedCommand::from_value(value) {
            Ok(cmd) => batch.commands.push(cmd),
            Err(e) => {
                batch.error = Some(e);
                break;
            }
        }
    }

    if batch.error.is_some() {
        buf.clear();
    } else {
        buf.advance(prefix.consumed);
    }
    batch
}
