use std::fmt::Write;

use super::Executor;
use crate::driver::protocol::{CommandName, RequestBody, ResponseBody, SelectRequest};
use crate::driver::rows::Rows;
use crate::error::{DriverError, DriverResult};
use crate::route::Route;
use crate::sql::{comma_list, FilterKind, LockClause, SelectStatement};

pub(crate) struct SelectExecutor<'a> {
    ast: &'a SelectStatement,
}

impl<'a> SelectExecutor<'a> {
    pub(crate) fn new(ast: &'a SelectStatement) -> Self {
        Self { ast }
    }

    /// WHERE expression followed by any group by / having text
    fn filters(&self) -> String {
        let mut out = self
            .ast
            .where_clause
            .as_ref()
            .map(|w| w.to_string())
            .unwrap_or_default();
        if !self.ast.group_by.is_empty() {
            let _ = write!(out, " group by {}", comma_list(&self.ast.group_by));
        }
        if let Some(having) = &self.ast.having {
            let _ = write!(out, " having {}", having);
        }
        out
    }
}

impl Executor for SelectExecutor<'_> {
    type Output = Rows;

    fn verb(&self) -> &'static str {
        "select"
    }

    fn table(&self) -> String {
        self.ast.from.to_string()
    }

    fn command(&self) -> CommandName {
        CommandName::OriSelect
    }

    fn validate(&self, route: &Route) -> DriverResult<()> {
        if let Some(lock) = self.ast.lock {
            if lock != LockClause::ForUpdate {
                return Err(DriverError::SqlInvalid(format!(
                    "lock type `{}` not supported",
                    lock
                )));
            }
        }

        if !self.ast.group_by.is_empty() && !route.offline {
            return Err(DriverError::SqlInvalid(
                "`group by` is only supported for offline db".to_string(),
            ));
        }

        if self.ast.having.is_some() && !route.offline {
            return Err(DriverError::SqlInvalid(
                "`having` is only supported for offline db".to_string(),
            ));
        }

        match &self.ast.where_clause {
            None => Err(DriverError::SqlInvalid("missing `where`".to_string())),
            Some(filter) if filter.kind != FilterKind::Where => Err(DriverError::SqlInvalid(
                format!("filters `{}` not supported", filter.kind),
            )),
            Some(_) => Ok(()),
        }
    }

    fn build_request(&self, route: &Route) -> RequestBody {
        RequestBody::OriSelectReq(SelectRequest {
            dbname: route.db_name.clone(),
            table: self.table(),
            columns: self.ast.columns_text(),
            complex_filter: self.filters(),
            orderby: comma_list(&self.ast.order_by),
            limit: self
                .ast
                .limit
                .as_ref()
                .map(|l| l.to_string())
                .unwrap_or_default(),
            forupdate: self.ast.lock == Some(LockClause::ForUpdate),
        })
    }

    fn offline(&self, route: &Route) -> bool {
        route.offline
    }

    fn sql_text(&self) -> String {
        self.ast.to_string()
    }

    fn map_response(&self, _route: &Route, body: ResponseBody) -> Option<Rows> {
        match body {
            ResponseBody::SelectResp(resp) => Some(Rows::new(resp.records)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{parse, SqlStatement};

    fn select(sql: &str) -> SelectStatement {
        match parse(sql).unwrap() {
            SqlStatement::Select(s) => s,
            other => panic!("not a select: {:?}", other),
        }
    }

    fn request(sql: &str, route: &Route) -> SelectRequest {
        let ast = select(sql);
        let exr = SelectExecutor::new(&ast);
        exr.validate(route).unwrap();
        match exr.build_request(route) {
            RequestBody::OriSelectReq(req) => req,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_select_request_fields() {
        let route = Route::new("users", 42, false);
        let req = request(
            "SELECT DISTINCT id, name FROM user WHERE age > 18 ORDER BY id DESC LIMIT 10, 20 FOR UPDATE",
            &route,
        );
        assert_eq!(req.dbname, "users");
        assert_eq!(req.table, "user");
        assert_eq!(req.columns, "distinct id, name");
        assert_eq!(req.complex_filter, "age > 18");
        assert_eq!(req.orderby, "id desc");
        assert_eq!(req.limit, "10, 20");
        assert!(req.forupdate);
    }

    #[test]
    fn test_group_by_and_having_on_offline_route() {
        let route = Route::new("users", 42, true);
        let req = request(
            "select city, count(*) from user where age > 18 group by city having count(*) > 2",
            &route,
        );
        assert_eq!(req.complex_filter, "age > 18 group by city having count(*) > 2");
    }

    #[test]
    fn test_rejections() {
        let online = Route::new("users", 1, false);
        let cases = [
            ("select * from user", "missing `where`"),
            ("select * from user where id = 1 group by id", "`group by` is only supported"),
            ("select * from user where id = 1 having id > 1", "`having` is only supported"),
            ("select * from user where id = 1 lock in share mode", "lock type"),
        ];

        for (sql, expected) in cases {
            let ast = select(sql);
            let err = SelectExecutor::new(&ast).validate(&online).unwrap_err();
            assert!(
                err.to_string().contains(expected),
                "{} -> {}",
                sql,
                err
            );
        }
    }
}
