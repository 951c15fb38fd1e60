//! Per-verb translation of parsed statements into proxy requests
//!
//! Every executor follows the same pipeline: validate the statement shape,
//! build the request payload, issue the call, then map the verb-specific
//! response payload into a driver result. `run` drives that pipeline and owns
//! the failure normalization shared by all verbs.

mod delete;
mod insert;
mod select;
mod transfer;
mod update;

pub(crate) use delete::DeleteExecutor;
pub(crate) use insert::InsertExecutor;
pub(crate) use select::SelectExecutor;
pub(crate) use transfer::TransferExecutor;
pub(crate) use update::UpdateExecutor;

use tracing::error;

use super::conn::Conn;
use super::protocol::{CommandName, Request, RequestBody, ResponseBody};
use crate::error::{DbError, DriverError, DriverResult, SqlInfo};
use crate::route::Route;

pub(crate) trait Executor {
    type Output;

    /// Last segment of the log id, e.g. `select` or `begin`
    fn verb(&self) -> &'static str;

    /// Middle segment of the log id
    fn table(&self) -> String;

    fn command(&self) -> CommandName;

    /// Rejects unsupported statement shapes before any I/O.
    fn validate(&self, _route: &Route) -> DriverResult<()> {
        Ok(())
    }

    fn build_request(&self, route: &Route) -> RequestBody;

    /// Whether the request targets the offline replica
    fn offline(&self, _route: &Route) -> bool {
        false
    }

    /// SQL text reported when the proxy sends no diagnostic payload
    fn sql_text(&self) -> String;

    /// `None` when the payload is not the one this verb expects.
    fn map_response(&self, route: &Route, body: ResponseBody) -> Option<Self::Output>;
}

pub(crate) async fn run<E: Executor>(conn: &Conn, route: &Route, exr: E) -> DriverResult<E::Output> {
    exr.validate(route)?;

    let logid = format!("{}.{}.{}", route.db_name, exr.table(), exr.verb());
    let request = Request::new(
        logid.clone(),
        exr.command(),
        route.shard_key,
        exr.build_request(route),
    )
    .offline(exr.offline(route));

    let response = conn.call(request).await?;

    if !response.is_success() {
        let sql_info = response
            .sql_info
            .unwrap_or_else(|| SqlInfo::synthesize(exr.sql_text(), route.shard_key, &route.db_name));
        let err = DbError::new(response.error, response.err_msg, Some(sql_info));
        error!(
            logid = %logid,
            shard_key = route.shard_key,
            conn_id = conn.id(),
            server_addr = %conn.config().addr,
            error = %err,
            "db.{}",
            exr.verb()
        );
        return Err(err.into());
    }

    let mapped = response.resp.and_then(|body| exr.map_response(route, body));
    mapped.ok_or_else(|| {
        error!(
            logid = %logid,
            shard_key = route.shard_key,
            conn_id = conn.id(),
            server_addr = %conn.config().addr,
            "db.{}: no {} response",
            exr.verb(),
            exr.verb()
        );
        DriverError::BadConnection
    })
}
