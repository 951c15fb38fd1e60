//! Driver factory, connections and the call layer

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::breaker::{BreakerRegistry, BreakerSettings, BreakerTransport};
use super::executor::{self, TransferExecutor};
use super::protocol::{Header, Packet, Request, Response, TransferCommand, CMD_PING};
use super::stmt::Statement;
use super::transport::{SessionConfig, TcpSession, Transport};
use super::tx::Transaction;
use crate::config::{parse_dsn, Config, DEFAULT_ADDR};
use crate::error::{ContractViolation, DriverError, DriverResult};
use crate::route::{Context, Route};

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(0);
static NEXT_REQUEST_ID: AtomicU32 = AtomicU32::new(0);

fn next_conn_id() -> u64 {
    NEXT_CONN_ID.fetch_add(1, Ordering::SeqCst) + 1
}

/// Process-wide correlation id; 0 is reserved for unsolicited pings.
pub(crate) fn next_request_id() -> u32 {
    loop {
        let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        if id != 0 {
            return id;
        }
    }
}

/// Settings that apply to every connection a driver opens
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Quiet period after which a keep-alive ping is sent
    pub idle_interval: Duration,
    /// Unanswered pings tolerated before the peer is declared dead
    pub max_idle_pings: u32,
    /// Reject reply frames whose magic constant is wrong
    pub strict_magic: bool,
    pub breaker: BreakerSettings,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(30),
            max_idle_pings: 2,
            strict_magic: false,
            breaker: BreakerSettings::default(),
        }
    }
}

/// Opens connections and owns the per-address breaker registry they share.
#[derive(Debug, Default)]
pub struct Driver {
    options: DriverOptions,
    breakers: Arc<BreakerRegistry>,
}

impl Driver {
    pub fn new(options: DriverOptions) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(options.breaker.clone()));
        Self { options, breakers }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    pub async fn open(&self, dsn: &str) -> DriverResult<Conn> {
        let config = parse_dsn(dsn)?;
        self.open_config(config).await
    }

    /// Dials the first address of `config`.
    pub async fn open_config(&self, config: Config) -> DriverResult<Conn> {
        let addr = config
            .addrs()
            .into_iter()
            .next()
            .unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let conn_id = next_conn_id();

        let session_config = SessionConfig {
            dial_timeout: config.timeout,
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            idle_interval: self.options.idle_interval,
            max_idle_pings: self.options.max_idle_pings,
            strict_magic: self.options.strict_magic,
        };

        let session = TcpSession::connect(&addr, conn_id, &session_config)
            .await
            .map_err(|source| {
                error!(conn_id, server_addr = %addr, error = %source, "failed to connect");
                DriverError::Dial {
                    addr: addr.clone(),
                    source,
                }
            })?;

        let transport: Box<dyn Transport> = if config.enable_circuit_breaker {
            Box::new(BreakerTransport::new(session, self.breakers.get(&addr)))
        } else {
            Box::new(session)
        };

        info!(conn_id, server_addr = %addr, db_name = %config.db_name, "connected");
        Ok(Conn::new(conn_id, config.with_addr(&addr), transport))
    }
}

/// One connection to the proxy.
///
/// Calls on a connection are strictly sequential. While a transaction is
/// open the connection carries its pinned context, which statements fall
/// back to when their own context has no route.
pub struct Conn {
    id: u64,
    config: Config,
    transport: Box<dyn Transport>,
    pinned: Option<Context>,
    broken: bool,
    created_at: Instant,
}

impl std::fmt::Debug for Conn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("id", &self.id)
            .field("addr", &self.config.addr)
            .field("pinned", &self.pinned)
            .field("broken", &self.broken)
            .finish()
    }
}

impl Conn {
    fn new(id: u64, config: Config, transport: Box<dyn Transport>) -> Self {
        Self {
            id,
            config,
            transport,
            pinned: None,
            broken: false,
            created_at: Instant::now(),
        }
    }

    /// Wraps an already established transport.
    pub fn with_transport(config: Config, transport: impl Transport + 'static) -> Self {
        Self::new(next_conn_id(), config, Box::new(transport))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Time since the connection was established
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn is_connected(&self) -> bool {
        !self.broken && self.transport.is_connected()
    }

    /// Context pinned by an open transaction
    pub fn pinned_context(&self) -> Option<&Context> {
        self.pinned.as_ref()
    }

    pub async fn ping(&self, _ctx: &Context) -> DriverResult<()> {
        if !self.is_connected() {
            return Err(DriverError::BadConnection);
        }

        let packet = Packet::<Request> {
            header: Header::new(CMD_PING, next_request_id()),
            body: None,
        };
        self.transport.call(packet).await.map_err(|e| {
            warn!(conn_id = self.id, server_addr = %self.config.addr, error = %e, "ping failed");
            DriverError::BadConnection
        })?;
        Ok(())
    }

    pub async fn close(&self) {
        debug!(conn_id = self.id, "close connection");
        self.transport.close().await;
    }

    pub async fn prepare(&self, ctx: &Context, query: &str) -> DriverResult<Statement<'_>> {
        if !self.is_connected() {
            return Err(DriverError::BadConnection);
        }

        let route = self.resolve_route(ctx)?;
        Ok(Statement::new(self, ctx.clone().with_route(route), query))
    }

    /// Preparing without a context is not supported.
    pub fn prepare_legacy(&self, _query: &str) -> DriverResult<Statement<'_>> {
        Err(ContractViolation::Deprecated.into())
    }

    /// Starts a transaction routed by `ctx`, pinning it on this connection.
    pub async fn begin(&mut self, ctx: &Context) -> DriverResult<Transaction<'_>> {
        let route = self.begin_pinned(ctx).await?;
        Ok(Transaction::new(self, route))
    }

    /// Beginning without a context is not supported.
    pub fn begin_legacy(&mut self) -> DriverResult<Transaction<'_>> {
        Err(ContractViolation::Deprecated.into())
    }

    pub(crate) async fn begin_pinned(&mut self, ctx: &Context) -> DriverResult<Route> {
        if !self.is_connected() {
            return Err(DriverError::BadConnection);
        }

        // A transaction never inherits the route of another one.
        let route = match ctx.route() {
            Some(route) => route.resolve(&self.config.db_name),
            None => {
                error!(conn_id = self.id, "begin without route info");
                return Err(ContractViolation::MissingRouteInfo.into());
            }
        };

        executor::run(self, &route, TransferExecutor::new(TransferCommand::Begin)).await?;
        self.pinned = Some(ctx.clone().with_route(route.clone()));
        Ok(route)
    }

    /// Commits or rolls back, unpinning the context whatever the outcome.
    pub(crate) async fn finish_transaction(
        &mut self,
        command: TransferCommand,
        route: &Route,
    ) -> DriverResult<()> {
        let result = executor::run(self, route, TransferExecutor::new(command)).await;
        self.pinned = None;
        result
    }

    /// Unpins after a transaction was dropped unfinished. The remote side
    /// still holds it open, so the connection must not be reused.
    pub(crate) fn abandon_transaction(&mut self) {
        self.pinned = None;
        self.broken = true;
    }

    /// Route from `ctx`, else from the pinned transaction context.
    pub(crate) fn resolve_route(&self, ctx: &Context) -> DriverResult<Route> {
        ctx.route()
            .or_else(|| self.pinned.as_ref().and_then(Context::route))
            .map(|route| route.resolve(&self.config.db_name))
            .ok_or_else(|| {
                error!(conn_id = self.id, "missing route info");
                ContractViolation::MissingRouteInfo.into()
            })
    }

    /// Issues one request and waits for its response.
    pub(crate) async fn call(&self, mut request: Request) -> DriverResult<Response> {
        let seq = next_request_id();
        request.logid = format!("{}.{}", request.logid, seq);

        if !self.is_connected() {
            error!(
                conn_id = self.id,
                server_addr = %self.config.addr,
                log_id = %request.logid,
                "server not connected"
            );
            return Err(DriverError::BadConnection);
        }

        let local_addr = self.transport.local_addr();
        let log_id = request.logid.clone();
        debug!(
            conn_id = self.id,
            local_addr = ?local_addr,
            remote_addr = ?self.transport.remote_addr(),
            log_id = %log_id,
            "conn.call begin"
        );

        let reply = match self.transport.call(Packet::query(seq, request)).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    conn_id = self.id,
                    local_addr = ?local_addr,
                    server_addr = %self.config.addr,
                    log_id = %log_id,
                    error = %e,
                    "conn.call"
                );
                return Err(DriverError::BadConnection);
            }
        };

        match reply.body {
            Some(response) => {
                debug!(conn_id = self.id, log_id = %log_id, "conn.call end");
                Ok(response)
            }
            None => {
                error!(
                    conn_id = self.id,
                    local_addr = ?local_addr,
                    server_addr = %self.config.addr,
                    log_id = %log_id,
                    command = reply.header.command,
                    "conn.call: reply is not a response"
                );
                Err(DriverError::BadConnection)
            }
        }
    }
}
