//! Multi-address client: one connection pool per proxy address
//!
//! `Cluster::db` binds a route to a pool picked uniformly at random. There is
//! no shard-to-pool affinity, so consecutive calls for the same shard may land
//! on different proxies.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::config::{parse_dsn, Config, DsnError};
use crate::driver::protocol::TransferCommand;
use crate::driver::{Conn, Driver, ExecResult, Rows, Value};
use crate::error::{DriverError, DriverResult};
use crate::route::{set_route, Context, Route};

/// Idle connections kept per pool unless configured otherwise
pub const DEFAULT_MAX_IDLE_CONNS: usize = 2;

/// Connections to a single proxy address
///
/// `max_open` caps connections checked out plus idle, with 0 meaning no cap.
/// Callers over the cap wait until a connection is returned or discarded.
/// Connections older than `max_lifetime` are closed instead of reused, with
/// a zero lifetime meaning they never expire.
pub struct Pool {
    driver: Arc<Driver>,
    config: Config,
    idle: Mutex<Vec<Conn>>,
    max_idle: AtomicUsize,
    max_open: AtomicUsize,
    max_lifetime: Mutex<Duration>,
    open: AtomicUsize,
    available: Notify,
    closed: AtomicBool,
}

impl Pool {
    pub fn new(driver: Arc<Driver>, config: Config) -> Self {
        Self {
            driver,
            config,
            idle: Mutex::new(Vec::new()),
            max_idle: AtomicUsize::new(DEFAULT_MAX_IDLE_CONNS),
            max_open: AtomicUsize::new(0),
            max_lifetime: Mutex::new(Duration::ZERO),
            open: AtomicUsize::new(0),
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Connections owned by the pool, checked out or idle.
    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }

    pub fn set_max_idle_conns(&self, n: usize) {
        let max_open = self.max_open.load(Ordering::SeqCst);
        let n = if max_open > 0 { n.min(max_open) } else { n };
        self.max_idle.store(n, Ordering::SeqCst);
        let excess: Vec<Conn> = {
            let mut idle = self.idle.lock();
            let keep = idle.len().min(n);
            idle.drain(keep..).collect()
        };
        for conn in excess {
            drop(conn);
            self.release_slot();
        }
    }

    /// Caps open connections. Lowering the cap below the idle limit lowers
    /// the idle limit too.
    pub fn set_max_open_conns(&self, n: usize) {
        self.max_open.store(n, Ordering::SeqCst);
        if n > 0 && self.max_idle.load(Ordering::SeqCst) > n {
            self.set_max_idle_conns(n);
        }
        self.available.notify_waiters();
    }

    pub fn set_conn_max_lifetime(&self, lifetime: Duration) {
        *self.max_lifetime.lock() = lifetime;
    }

    fn expired(&self, conn: &Conn) -> bool {
        let lifetime = *self.max_lifetime.lock();
        !lifetime.is_zero() && conn.age() >= lifetime
    }

    fn try_reserve(&self) -> bool {
        let max = self.max_open.load(Ordering::SeqCst);
        self.open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .is_ok()
    }

    /// Gives back the slot of a connection that left the pool for good.
    fn release_slot(&self) {
        let _ = self
            .open
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.available.notify_one();
    }

    async fn discard(&self, conn: Conn) {
        conn.close().await;
        self.release_slot();
    }

    /// Checks out an idle connection, dialing a new one when none is usable
    /// and the open cap allows it. Otherwise waits for a returned connection.
    pub async fn get(&self) -> DriverResult<Conn> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(DriverError::BadConnection);
            }

            let candidate = self.idle.lock().pop();
            match candidate {
                Some(conn) if conn.is_connected() && !self.expired(&conn) => return Ok(conn),
                Some(conn) => {
                    debug!(conn_id = conn.id(), server_addr = %self.config.addr, "discarding stale idle connection");
                    self.discard(conn).await;
                    continue;
                }
                None => {}
            }

            if self.try_reserve() {
                return match self.driver.open_config(self.config.clone()).await {
                    Ok(conn) => Ok(conn),
                    Err(e) => {
                        self.release_slot();
                        Err(e)
                    }
                };
            }

            debug!(server_addr = %self.config.addr, open = self.open_count(), "waiting for a free connection");
            self.available.notified().await;
        }
    }

    /// Returns a connection after use. Connections that failed with a bad
    /// connection error, outlived the lifetime, or no longer fit in the idle
    /// list are closed.
    pub async fn put(&self, conn: Conn, bad: bool) {
        if bad || !conn.is_connected() || self.closed.load(Ordering::SeqCst) || self.expired(&conn) {
            debug!(conn_id = conn.id(), server_addr = %self.config.addr, "discarding connection");
            self.discard(conn).await;
            return;
        }

        let rejected = {
            let mut idle = self.idle.lock();
            if idle.len() < self.max_idle.load(Ordering::SeqCst) {
                idle.push(conn);
                None
            } else {
                Some(conn)
            }
        };
        match rejected {
            Some(conn) => self.discard(conn).await,
            None => self.available.notify_one(),
        }
    }

    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let idle: Vec<Conn> = self.idle.lock().drain(..).collect();
        for conn in idle {
            self.discard(conn).await;
        }
        self.available.notify_waiters();
    }
}

/// Pools for every address of a multi-address connection string.
pub struct Cluster {
    pools: Vec<Arc<Pool>>,
}

impl Cluster {
    pub fn new(driver: Arc<Driver>, dsn: &str) -> DriverResult<Self> {
        let config = parse_dsn(dsn)?;
        Self::from_config(driver, config)
    }

    pub fn from_config(driver: Arc<Driver>, config: Config) -> DriverResult<Self> {
        let addrs = config.addrs();
        if addrs.is_empty() {
            return Err(DsnError::NoAddress.into());
        }

        let pools = addrs
            .iter()
            .map(|addr| Arc::new(Pool::new(driver.clone(), config.with_addr(addr))))
            .collect();
        info!(addrs = ?addrs, db_name = %config.db_name, "cluster created");

        Ok(Self { pools })
    }

    pub fn pools(&self) -> &[Arc<Pool>] {
        &self.pools
    }

    pub fn set_max_idle_conns(&self, n: usize) {
        for pool in &self.pools {
            pool.set_max_idle_conns(n);
        }
    }

    /// Caps open connections per pool, 0 for no cap.
    pub fn set_max_open_conns(&self, n: usize) {
        for pool in &self.pools {
            pool.set_max_open_conns(n);
        }
    }

    /// Maximum age of a reused connection per pool, zero for no limit.
    pub fn set_conn_max_lifetime(&self, lifetime: Duration) {
        for pool in &self.pools {
            pool.set_conn_max_lifetime(lifetime);
        }
    }

    /// A handle routed to `db_name`/`shard_key` on a randomly chosen pool.
    pub fn db(&self, ctx: &Context, db_name: &str, shard_key: u64, offline: bool) -> Db {
        let idx = rand::thread_rng().gen_range(0..self.pools.len());
        Db {
            pool: self.pools[idx].clone(),
            ctx: set_route(ctx, db_name, shard_key, offline),
        }
    }

    pub async fn close(&self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }
}

/// A pool bound to one route.
#[derive(Clone)]
pub struct Db {
    pool: Arc<Pool>,
    ctx: Context,
}

impl Db {
    pub fn new(pool: Arc<Pool>, ctx: Context) -> Self {
        Self { pool, ctx }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    pub async fn exec(&self, query: &str, args: &[Value]) -> DriverResult<ExecResult> {
        let conn = self.pool.get().await?;
        let result = exec_on(&conn, &self.ctx, query, args).await;
        self.release(conn, &result).await;
        result
    }

    pub async fn query(&self, query: &str, args: &[Value]) -> DriverResult<Rows> {
        let conn = self.pool.get().await?;
        let result = query_on(&conn, &self.ctx, query, args).await;
        self.release(conn, &result).await;
        result
    }

    pub async fn ping(&self) -> DriverResult<()> {
        let conn = self.pool.get().await?;
        let result = conn.ping(&self.ctx).await;
        self.release(conn, &result).await;
        result
    }

    /// Starts a transaction on a connection held until commit or rollback.
    pub async fn begin(&self) -> DriverResult<DbTx> {
        let mut conn = self.pool.get().await?;
        match conn.begin_pinned(&self.ctx).await {
            Ok(route) => Ok(DbTx {
                pool: self.pool.clone(),
                conn: Some(conn),
                route,
            }),
            Err(e) => {
                self.pool.put(conn, e.is_bad_connection()).await;
                Err(e)
            }
        }
    }

    async fn release<T>(&self, conn: Conn, result: &DriverResult<T>) {
        let bad = matches!(result, Err(e) if e.is_bad_connection());
        self.pool.put(conn, bad).await;
    }
}

async fn exec_on(conn: &Conn, ctx: &Context, query: &str, args: &[Value]) -> DriverResult<ExecResult> {
    let stmt = conn.prepare(ctx, query).await?;
    stmt.exec(ctx, args).await
}

async fn query_on(conn: &Conn, ctx: &Context, query: &str, args: &[Value]) -> DriverResult<Rows> {
    let stmt = conn.prepare(ctx, query).await?;
    stmt.query(ctx, args).await
}

/// A transaction owning its checked-out connection.
pub struct DbTx {
    pool: Arc<Pool>,
    conn: Option<Conn>,
    route: Route,
}

impl DbTx {
    pub fn route(&self) -> &Route {
        &self.route
    }

    fn conn(&self) -> DriverResult<&Conn> {
        self.conn.as_ref().ok_or(DriverError::BadConnection)
    }

    /// Statements resolve their route from the pinned transaction context.
    pub async fn exec(&self, query: &str, args: &[Value]) -> DriverResult<ExecResult> {
        exec_on(self.conn()?, &Context::background(), query, args).await
    }

    pub async fn query(&self, query: &str, args: &[Value]) -> DriverResult<Rows> {
        query_on(self.conn()?, &Context::background(), query, args).await
    }

    pub async fn commit(mut self) -> DriverResult<()> {
        self.finish(TransferCommand::Commit).await
    }

    pub async fn rollback(mut self) -> DriverResult<()> {
        self.finish(TransferCommand::Rollback).await
    }

    async fn finish(&mut self, command: TransferCommand) -> DriverResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(DriverError::BadConnection);
        };
        let result = conn.finish_transaction(command, &self.route).await;
        let bad = matches!(&result, Err(e) if e.is_bad_connection());
        self.pool.put(conn, bad).await;
        result
    }
}

impl Drop for DbTx {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            warn!(
                conn_id = conn.id(),
                db_name = %self.route.db_name,
                shard_key = self.route.shard_key,
                "transaction dropped without commit or rollback"
            );
            conn.abandon_transaction();
            drop(conn);
            self.pool.release_slot();
        }
    }
}
