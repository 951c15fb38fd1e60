use super::Executor;
use crate::driver::protocol::{CommandName, InsertRequest, RequestBody, ResponseBody};
use crate::driver::rows::ExecResult;
use crate::route::Route;
use crate::sql::InsertStatement;

pub(crate) struct InsertExecutor<'a> {
    ast: &'a InsertStatement,
}

impl<'a> InsertExecutor<'a> {
    pub(crate) fn new(ast: &'a InsertStatement) -> Self {
        Self { ast }
    }
}

impl Executor for InsertExecutor<'_> {
    type Output = ExecResult;

    fn verb(&self) -> &'static str {
        "insert"
    }

    fn table(&self) -> String {
        self.ast.table.clone()
    }

    fn command(&self) -> CommandName {
        CommandName::OriInsert
    }

    fn build_request(&self, route: &Route) -> RequestBody {
        RequestBody::OriInsertReq(InsertRequest {
            dbname: route.db_name.clone(),
            table: self.ast.table.clone(),
            columns: self.ast.columns_text(),
            values: self.ast.values_text(),
        })
    }

    fn sql_text(&self) -> String {
        self.ast.to_string()
    }

    fn map_response(&self, route: &Route, body: ResponseBody) -> Option<ExecResult> {
        let ResponseBody::InsertResp(resp) = body else {
            return None;
        };

        // Tables keyed by the shard key itself report no generated id.
        let last_insert_id = if resp.last_insertid == 0 {
            route.shard_key
        } else {
            resp.last_insertid
        };

        Some(ExecResult {
            last_insert_id,
            rows_affected: resp.affect_rows,
        })
    }
}
