//! Prepared statements: argument interpolation and verb dispatch

use std::fmt::Write;

use tracing::{debug, warn};

use super::conn::Conn;
use super::executor::{self, DeleteExecutor, InsertExecutor, SelectExecutor, UpdateExecutor};
use super::rows::{ExecResult, Rows};
use super::value::Value;
use crate::error::{ContractViolation, DriverError, DriverResult};
use crate::route::Context;
use crate::sql::{self, escape_string_into, SqlStatement};

/// A query template bound to a connection.
///
/// Nothing is sent to the proxy until `exec` or `query`; the template is
/// interpolated into literal SQL on every execution.
#[derive(Debug)]
pub struct Statement<'c> {
    conn: &'c Conn,
    ctx: Context,
    query: String,
    param_count: usize,
}

impl<'c> Statement<'c> {
    pub(crate) fn new(conn: &'c Conn, ctx: Context, query: &str) -> Self {
        Self {
            conn,
            ctx,
            param_count: query.matches('?').count(),
            query: query.to_string(),
        }
    }

    /// Number of `?` placeholders in the template
    pub fn num_input(&self) -> usize {
        self.param_count
    }

    pub fn query_text(&self) -> &str {
        &self.query
    }

    /// Context captured when the statement was prepared
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn close(self) -> DriverResult<()> {
        if !self.conn.is_connected() {
            return Err(DriverError::BadConnection);
        }
        Ok(())
    }

    /// Runs an insert, update or delete.
    pub async fn exec(&self, ctx: &Context, args: &[Value]) -> DriverResult<ExecResult> {
        let route = self.conn.resolve_route(ctx)?;
        let statement = self.parse(args)?;

        match &statement {
            SqlStatement::Insert(ast) => {
                executor::run(self.conn, &route, InsertExecutor::new(ast)).await
            }
            SqlStatement::Update(ast) => {
                executor::run(self.conn, &route, UpdateExecutor::new(ast)).await
            }
            SqlStatement::Delete(ast) => {
                executor::run(self.conn, &route, DeleteExecutor::new(ast)).await
            }
            other => Err(self.not_supported(other)),
        }
    }

    /// Runs a select.
    pub async fn query(&self, ctx: &Context, args: &[Value]) -> DriverResult<Rows> {
        let route = self.conn.resolve_route(ctx)?;
        let statement = self.parse(args)?;

        match &statement {
            SqlStatement::Select(ast) => {
                executor::run(self.conn, &route, SelectExecutor::new(ast)).await
            }
            other => Err(self.not_supported(other)),
        }
    }

    pub async fn exec_default(&self, args: &[Value]) -> DriverResult<ExecResult> {
        self.exec(&self.ctx, args).await
    }

    pub async fn query_default(&self, args: &[Value]) -> DriverResult<Rows> {
        self.query(&self.ctx, args).await
    }

    fn parse(&self, args: &[Value]) -> DriverResult<SqlStatement> {
        let sql = interpolate(&self.query, args, self.conn.config().max_allowed_packet)?;
        debug!(conn_id = self.conn.id(), sql = %sql, "interpolated");
        sql::parse(&sql)
    }

    fn not_supported(&self, statement: &SqlStatement) -> DriverError {
        warn!(conn_id = self.conn.id(), statement = %statement, "sql not supported");
        ContractViolation::SqlNotSupported.into()
    }
}

/// Replaces each `?` in `query` with the literal form of the next argument.
///
/// Fails with `Skip` when the counts disagree or an argument has no literal
/// form, and with `SqlTooLarge` once the text outgrows `max_allowed_packet`
/// (0 means unlimited).
pub fn interpolate(query: &str, args: &[Value], max_allowed_packet: usize) -> DriverResult<String> {
    if query.matches('?').count() != args.len() {
        return Err(DriverError::Skip);
    }

    let mut buf = String::with_capacity(query.len() + args.len() * 8);
    let mut pieces = query.split('?');
    if let Some(head) = pieces.next() {
        buf.push_str(head);
    }

    for (piece, arg) in pieces.zip(args) {
        match arg {
            Value::Null => buf.push_str("NULL"),
            Value::Int(v) => {
                let _ = write!(buf, "{}", v);
            }
            Value::UInt(v) => {
                let _ = write!(buf, "{}", v);
            }
            Value::Float(v) if v.is_finite() => {
                let _ = write!(buf, "{}", v);
            }
            Value::Bool(v) => buf.push(if *v { '1' } else { '0' }),
            Value::Text(v) => {
                buf.push('\'');
                escape_string_into(&mut buf, v);
                buf.push('\'');
            }
            Value::Float(_) | Value::Bytes(_) | Value::Timestamp(_) => {
                return Err(DriverError::Skip)
            }
        }

        if max_allowed_packet > 0 && buf.len() > max_allowed_packet {
            return Err(DriverError::SqlTooLarge);
        }
        buf.push_str(piece);
    }

    Ok(buf)
}
