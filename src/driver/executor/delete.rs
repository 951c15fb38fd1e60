use super::Executor;
use crate::driver::protocol::{CommandName, DeleteRequest, RequestBody, ResponseBody};
use crate::driver::rows::ExecResult;
use crate::error::{DriverError, DriverResult};
use crate::route::Route;
use crate::sql::{DeleteStatement, FilterKind};

pub(crate) struct DeleteExecutor<'a> {
    ast: &'a DeleteStatement,
}

impl<'a> DeleteExecutor<'a> {
    pub(crate) fn new(ast: &'a DeleteStatement) -> Self {
        Self { ast }
    }
}

impl Executor for DeleteExecutor<'_> {
    type Output = ExecResult;

    fn verb(&self) -> &'static str {
        "delete"
    }

    fn table(&self) -> String {
        self.ast.table.clone()
    }

    fn command(&self) -> CommandName {
        CommandName::OriDelete
    }

    fn validate(&self, _route: &Route) -> DriverResult<()> {
        match &self.ast.where_clause {
            None => {
                return Err(DriverError::SqlInvalid(
                    "must have `where` conditions".to_string(),
                ))
            }
            Some(filter) if filter.kind != FilterKind::Where => {
                return Err(DriverError::SqlInvalid(format!(
                    "filters `{}` not supported",
                    filter.kind
                )))
            }
            Some(_) => {}
        }
        if self.ast.limit.is_some() {
            return Err(DriverError::SqlInvalid("`limit` not supported".to_string()));
        }
        if !self.ast.order_by.is_empty() {
            return Err(DriverError::SqlInvalid("`order by` not supported".to_string()));
        }
        Ok(())
    }

    fn build_request(&self, route: &Route) -> RequestBody {
        RequestBody::OriDeleteReq(DeleteRequest {
            dbname: route.db_name.clone(),
            table: self.ast.table.clone(),
            complex_filter: self
                .ast
                .where_clause
                .as_ref()
                .map(|w| w.to_string())
                .unwrap_or_default(),
        })
    }

    fn sql_text(&self) -> String {
        self.ast.to_string()
    }

    fn map_response(&self, _route: &Route, body: ResponseBody) -> Option<ExecResult> {
        match body {
            ResponseBody::DeleteResp(resp) => Some(ExecResult {
                last_insert_id: 0,
                rows_affected: resp.affect_rows,
            }),
            _ => None,
        }
    }
}
