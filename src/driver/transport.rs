//! TCP transport to the proxy
//!
//! A session multiplexes calls over one stream: a reader task resolves
//! pending calls by correlation id, and a keep-alive task pings the peer
//! while the link is idle.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::{CodecError, Packet, PacketDecoder, PacketEncoder, Request, Response};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("session closed")]
    Closed,

    #[error("circuit breaker is open")]
    CircuitOpen,

    #[error("too many requests")]
    TooManyRequests,
}

/// Blocking request/reply primitive the call layer runs on
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `packet` and waits for the reply carrying the same correlation id.
    async fn call(&self, packet: Packet<Request>) -> Result<Packet<Response>, TransportError>;

    fn is_connected(&self) -> bool;

    fn local_addr(&self) -> Option<SocketAddr>;

    fn remote_addr(&self) -> Option<SocketAddr>;

    async fn close(&self);
}

/// Socket-level settings for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Zero disables the timeout
    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    /// Quiet period after which the peer is pinged
    pub idle_interval: Duration,
    /// Unanswered pings tolerated before the peer is declared dead
    pub max_idle_pings: u32,
    pub strict_magic: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            idle_interval: Duration::from_secs(30),
            max_idle_pings: 2,
            strict_magic: false,
        }
    }
}

async fn with_timeout<F, T>(limit: Duration, fut: F) -> Result<T, TransportError>
where
    F: std::future::Future<Output = T>,
{
    if limit.is_zero() {
        return Ok(fut.await);
    }
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TransportError::Timeout(limit))
}

type PendingMap = HashMap<u32, oneshot::Sender<Packet<Response>>>;

struct WriteState {
    half: OwnedWriteHalf,
    encoder: PacketEncoder,
}

struct SessionInner {
    conn_id: u64,
    remote_addr: SocketAddr,
    connected: AtomicBool,
    pending: Mutex<PendingMap>,
    writer: tokio::sync::Mutex<WriteState>,
    write_timeout: Duration,
    last_read: Mutex<Instant>,
    idle_count: AtomicU32,
}

impl SessionInner {
    async fn send(&self, packet: &Packet<Request>) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        let WriteState { half, encoder } = &mut *writer;
        with_timeout(self.write_timeout, encoder.write(half, packet)).await??;
        Ok(())
    }

    /// Marks the session dead and fails every pending call.
    fn shutdown(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(conn_id = self.conn_id, server_addr = %self.remote_addr, "disconnected");
        }
        // Dropping the senders wakes each waiter with `Closed`.
        self.pending.lock().clear();
    }
}

pub struct TcpSession {
    inner: Arc<SessionInner>,
    local_addr: SocketAddr,
    read_timeout: Duration,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TcpSession {
    pub async fn connect(addr: &str, conn_id: u64, config: &SessionConfig) -> std::io::Result<Self> {
        let stream = if config.dial_timeout.is_zero() {
            TcpStream::connect(addr).await?
        } else {
            tokio::time::timeout(config.dial_timeout, TcpStream::connect(addr))
                .await
                .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "dial timed out"))??
        };
        stream.set_nodelay(true)?;

        let local_addr = stream.local_addr()?;
        let remote_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let inner = Arc::new(SessionInner {
            conn_id,
            remote_addr,
            connected: AtomicBool::new(true),
            pending: Mutex::new(HashMap::new()),
            writer: tokio::sync::Mutex::new(WriteState {
                half: write_half,
                encoder: PacketEncoder::new(),
            }),
            write_timeout: config.write_timeout,
            last_read: Mutex::new(Instant::now()),
            idle_count: AtomicU32::new(0),
        });

        let reader = tokio::spawn(read_loop(
            inner.clone(),
            read_half,
            PacketDecoder::new(config.strict_magic),
        ));
        let mut tasks = vec![reader];
        if !config.idle_interval.is_zero() {
            tasks.push(tokio::spawn(keep_alive_loop(
                inner.clone(),
                config.idle_interval,
                config.max_idle_pings,
            )));
        }

        debug!(conn_id, %local_addr, %remote_addr, "session established");

        Ok(Self {
            inner,
            local_addr,
            read_timeout: config.read_timeout,
            tasks: Mutex::new(tasks),
        })
    }

    /// Number of keep-alive pings sent since the last inbound packet
    pub fn idle_count(&self) -> u32 {
        self.inner.idle_count.load(Ordering::SeqCst)
    }
}

async fn read_loop(inner: Arc<SessionInner>, mut half: OwnedReadHalf, mut decoder: PacketDecoder) {
    loop {
        match decoder.decode::<_, Response>(&mut half).await {
            Ok(packet) => {
                *inner.last_read.lock() = Instant::now();
                inner.idle_count.store(0, Ordering::SeqCst);

                let waiter = inner.pending.lock().remove(&packet.header.id());
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(packet);
                    }
                    // keep-alive echoes land here
                    None if packet.is_ping() => {}
                    None => debug!(
                        conn_id = inner.conn_id,
                        id = packet.header.id(),
                        "dropping reply with no pending call"
                    ),
                }
            }
            Err(e) => {
                if inner.connected.load(Ordering::SeqCst) {
                    warn!(
                        conn_id = inner.conn_id,
                        server_addr = %inner.remote_addr,
                        error = %e,
                        "connection error"
                    );
                }
                inner.shutdown();
                return;
            }
        }
    }
}

async fn keep_alive_loop(inner: Arc<SessionInner>, interval: Duration, max_idle_pings: u32) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !inner.connected.load(Ordering::SeqCst) {
            return;
        }
        if inner.last_read.lock().elapsed() < interval {
            continue;
        }

        let idle = inner.idle_count.fetch_add(1, Ordering::SeqCst) + 1;
        if idle > max_idle_pings {
            warn!(
                conn_id = inner.conn_id,
                server_addr = %inner.remote_addr,
                idle_pings = idle - 1,
                "peer dead"
            );
            inner.shutdown();
            return;
        }

        if let Err(e) = inner.send(&Packet::ping()).await {
            warn!(conn_id = inner.conn_id, error = %e, "failed to send keep-alive ping");
            inner.shutdown();
            return;
        }
    }
}

#[async_trait]
impl Transport for TcpSession {
    async fn call(&self, packet: Packet<Request>) -> Result<Packet<Response>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let id = packet.header.id();
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        // The reader may have died between the check above and the insert.
        if !self.is_connected() {
            self.inner.pending.lock().remove(&id);
            return Err(TransportError::Closed);
        }

        if let Err(e) = self.inner.send(&packet).await {
            self.inner.pending.lock().remove(&id);
            return Err(e);
        }

        match with_timeout(self.read_timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(e) => {
                self.inner.pending.lock().remove(&id);
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        Some(self.local_addr)
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        Some(self.inner.remote_addr)
    }

    async fn close(&self) {
        self.inner.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        let mut writer = self.inner.writer.lock().await;
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut writer.half).await;
    }
}

impl Drop for TcpSession {
    fn drop(&mut self) {
        self.inner.shutdown();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }
}
