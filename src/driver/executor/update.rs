use super::Executor;
use crate::driver::protocol::{CommandName, RequestBody, ResponseBody, UpdateRequest};
use crate::driver::rows::ExecResult;
use crate::error::{DriverError, DriverResult};
use crate::route::Route;
use crate::sql::{comma_list, FilterKind, UpdateStatement};

/// Whole-table updates are allowed; a WHERE clause, when present, must be a
/// plain filter.
pub(crate) struct UpdateExecutor<'a> {
    ast: &'a UpdateStatement,
}

impl<'a> UpdateExecutor<'a> {
    pub(crate) fn new(ast: &'a UpdateStatement) -> Self {
        Self { ast }
    }
}

impl Executor for UpdateExecutor<'_> {
    type Output = ExecResult;

    fn verb(&self) -> &'static str {
        "update"
    }

    fn table(&self) -> String {
        self.ast.table.to_string()
    }

    fn command(&self) -> CommandName {
        CommandName::OriUpdate
    }

    fn validate(&self, _route: &Route) -> DriverResult<()> {
        if let Some(filter) = &self.ast.where_clause {
            if filter.kind != FilterKind::Where {
                return Err(DriverError::SqlInvalid(format!(
                    "filters `{}` not supported",
                    filter.kind
                )));
            }
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
        RequestBody::OriUpdateReq(UpdateRequest {
            dbname: route.db_name.clone(),
            table: self.table(),
            set: comma_list(&self.ast.assignments),
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
            ResponseBody::UpdateResp(resp) => Some(ExecResult {
                last_insert_id: 0,
                rows_affected: resp.affect_rows,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{parse, SqlStatement};

    fn update(sql: &str) -> UpdateStatement {
        match parse(sql).unwrap() {
            SqlStatement::Update(s) => s,
            other => panic!("not an update: {:?}", other),
        }
    }

    #[test]
    fn test_update_request_fields() {
        let ast = update("update user set name = 'bob', age = age + 1 where id = 3");
        let route = Route::new("users", 3, false);
        let exr = UpdateExecutor::new(&ast);
        exr.validate(&route).unwrap();
        match exr.build_request(&route) {
            RequestBody::OriUpdateReq(req) => {
                assert_eq!(req.table, "user");
                assert_eq!(req.set, "name = 'bob', age = age + 1");
                assert_eq!(req.complex_filter, "id = 3");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_update_without_where_is_allowed() {
        let ast = update("update user set flag = 0");
        assert!(UpdateExecutor::new(&ast).validate(&Route::new("users", 1, false)).is_ok());
    }

    #[test]
    fn test_update_limit_is_rejected() {
        let ast = update("update user set flag = 0 where id > 1 limit 5");
        let err = UpdateExecutor::new(&ast)
            .validate(&Route::new("users", 1, false))
            .unwrap_err();
        assert!(matches!(err, DriverError::SqlInvalid(_)));
    }
}
