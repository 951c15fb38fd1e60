use tracing::warn;

use super::conn::Conn;
use super::protocol::TransferCommand;
use super::rows::{ExecResult, Rows};
use super::stmt::Statement;
use super::value::Value;
use crate::error::DriverResult;
use crate::route::{Context, Route};

/// An open transaction, holding its connection exclusively.
///
/// `commit` and `rollback` always unpin the connection, even when the remote
/// call fails. Dropping an unfinished transaction unpins it and marks the
/// connection broken, since the proxy still holds the transaction open.
#[derive(Debug)]
pub struct Transaction<'c> {
    conn: &'c mut Conn,
    route: Route,
    ctx: Context,
    done: bool,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(conn: &'c mut Conn, route: Route) -> Self {
        let ctx = Context::background().with_route(route.clone());
        Self {
            conn,
            route,
            ctx,
            done: false,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub async fn prepare(&self, query: &str) -> DriverResult<Statement<'_>> {
        self.conn.prepare(&self.ctx, query).await
    }

    pub async fn exec(&self, query: &str, args: &[Value]) -> DriverResult<ExecResult> {
        let stmt = self.prepare(query).await?;
        stmt.exec(&self.ctx, args).await
    }

    pub async fn query(&self, query: &str, args: &[Value]) -> DriverResult<Rows> {
        let stmt = self.prepare(query).await?;
        stmt.query(&self.ctx, args).await
    }

    pub async fn commit(mut self) -> DriverResult<()> {
        self.finish(TransferCommand::Commit).await
    }

    pub async fn rollback(mut self) -> DriverResult<()> {
        self.finish(TransferCommand::Rollback).await
    }

    async fn finish(&mut self, command: TransferCommand) -> DriverResult<()> {
        self.done = true;
        self.conn.finish_transaction(command, &self.route).await
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.done {
            warn!(
                conn_id = self.conn.id(),
                db_name = %self.route.db_name,
                shard_key = self.route.shard_key,
                "transaction dropped without commit or rollback"
            );
            self.conn.abandon_transaction();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::config::parse_dsn;
    use crate::driver::protocol::{
        InsertResponse, RequestBody, Response, ResponseBody, TransferResponse,
    };
    use crate::driver::testing::MockTransport;
    use crate::route::set_route;

    fn ok_transfer() -> Response {
        Response::ok(ResponseBody::TransferResp(TransferResponse {}))
    }

    fn conn_with(mock: &MockTransport) -> Conn {
        Conn::with_transport(parse_dsn("tcp(127.0.0.1:9123)/orders").unwrap(), mock.clone())
    }

    fn transfer_commands(mock: &MockTransport) -> Vec<TransferCommand> {
        mock.requests()
            .into_iter()
            .filter_map(|r| match r.req {
                RequestBody::TransferReq(t) => Some(t.command),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_commit_unpins() {
        let mock = MockTransport::new();
        mock.push_response(ok_transfer());
        mock.push_response(Response::ok(ResponseBody::InsertResp(InsertResponse {
            affect_rows: 1,
            last_insertid: 10,
        })));
        mock.push_response(ok_transfer());
        let mut conn = conn_with(&mock);

        let ctx = set_route(&Context::background(), "orders", 77, false);
        let tx = conn.begin(&ctx).await.unwrap();
        assert_eq!(tx.route().shard_key, 77);

        let result = tx
            .exec("insert into t(id) values (?)", &args![10])
            .await
            .unwrap();
        assert_eq!(result.last_insert_id, 10);

        tx.commit().await.unwrap();
        assert!(conn.pinned_context().is_none());
        assert!(conn.is_connected());
        assert_eq!(
            transfer_commands(&mock),
            vec![TransferCommand::Begin, TransferCommand::Commit]
        );
    }

    #[tokio::test]
    async fn test_statements_fall_back_to_pinned_route() {
        let mock = MockTransport::new();
        mock.push_response(ok_transfer());
        mock.push_response(Response::ok(ResponseBody::InsertResp(InsertResponse {
            affect_rows: 1,
            last_insertid: 0,
        })));
        mock.push_response(ok_transfer());
        let mut conn = conn_with(&mock);

        let tx = conn
            .begin(&set_route(&Context::background(), "orders", 5, false))
            .await
            .unwrap();
        let stmt = tx.prepare("insert into t(id) values (1)").await.unwrap();
        // a route-less context resolves through the pinned transaction
        let result = stmt.exec(&Context::background(), &[]).await.unwrap();
        assert_eq!(result.last_insert_id, 5);
        drop(stmt);
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_commit_and_rollback_still_unpin() {
        let mock = MockTransport::new();
        mock.push_response(ok_transfer());
        mock.push_response(Response::error(9, "commit failed", None));
        let mut conn = conn_with(&mock);
        let ctx = set_route(&Context::background(), "orders", 1, false);

        let tx = conn.begin(&ctx).await.unwrap();
        let err = tx.commit().await.unwrap_err();
        assert_eq!(err.as_db_error().unwrap().sql_info.as_ref().unwrap().sql, "commit");
        assert!(conn.pinned_context().is_none());

        mock.push_response(ok_transfer());
        mock.push_transport_error();
        let tx = conn.begin(&ctx).await.unwrap();
        assert!(tx.rollback().await.unwrap_err().is_bad_connection());
        assert!(conn.pinned_context().is_none());
    }

    #[tokio::test]
    async fn test_dropped_transaction_breaks_connection() {
        let mock = MockTransport::new();
        mock.push_response(ok_transfer());
        let mut conn = conn_with(&mock);

        let tx = conn
            .begin(&set_route(&Context::background(), "orders", 1, false))
            .await
            .unwrap();
        drop(tx);

        assert!(conn.pinned_context().is_none());
        assert!(!conn.is_connected());
    }
}
