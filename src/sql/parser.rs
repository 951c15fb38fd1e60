use super::ast::*;
use super::lexer::{SqlLexer, Token};
use crate::error::{DriverError, DriverResult};

/// Recursive-descent parser for the single-table MySQL subset the proxy
/// understands.
pub struct SqlParser {
    tokens: Vec<Token>,
    position: usize,
}

impl SqlParser {
    pub fn new(input: &str) -> DriverResult<Self> {
        let mut lexer = SqlLexer::new(input);
        let tokens = lexer.tokenize()?;

        Ok(Self {
            tokens,
            position: 0,
        })
    }

    fn current_token(&self) -> &Token {
        self.tokens.get(self.position).unwrap_or(&Token::Eof)
    }

    fn peek_token(&self, offset: usize) -> &Token {
        self.tokens.get(self.position + offset).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.position < self.tokens.len() {
            self.position += 1;
        }
    }

    /// Consumes the current token if it equals `token`.
    fn eat(&mut self, token: Token) -> bool {
        if *self.current_token() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> DriverResult<()> {
        if *self.current_token() == expected {
            self.advance();
            Ok(())
        } else {
            Err(DriverError::Parse(format!(
                "Expected {:?}, found {:?}",
                expected,
                self.current_token()
            )))
        }
    }

    /// Name carried by the current token, if it can stand for an identifier
    fn current_name(&self) -> Option<String> {
        match self.current_token() {
            Token::Identifier(name) => Some(name.clone()),
            other => other.non_reserved_word().map(str::to_string),
        }
    }

    fn expect_identifier(&mut self) -> DriverResult<String> {
        match self.current_name() {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => Err(DriverError::Parse(format!(
                "Expected identifier, found {:?}",
                self.current_token()
            ))),
        }
    }

    /// `db.table` collapses to `table`; routing picks the database.
    fn parse_table_name(&mut self) -> DriverResult<String> {
        let name = self.expect_identifier()?;
        if self.eat(Token::Dot) {
            return self.expect_identifier();
        }
        Ok(name)
    }

    pub fn parse(&mut self) -> DriverResult<SqlStatement> {
        let stmt = match self.current_token() {
            Token::Select => self.parse_select()?,
            Token::Insert => self.parse_insert()?,
            Token::Update => self.parse_update()?,
            Token::Delete => self.parse_delete()?,
            Token::Create
            | Token::Drop
            | Token::Alter
            | Token::Set
            | Token::Show
            | Token::Begin
            | Token::Commit
            | Token::Rollback
            | Token::Truncate
            | Token::Replace => {
                let verb = format!("{:?}", self.current_token()).to_lowercase();
                // The rest of the statement is never inspected.
                self.position = self.tokens.len();
                return Ok(SqlStatement::Other(verb));
            }
            other => {
                return Err(DriverError::Parse(format!(
                    "Unexpected token at start of statement: {:?}",
                    other
                )));
            }
        };

        // Optional semicolon at end
        self.eat(Token::Semicolon);

        if *self.current_token() != Token::Eof {
            return Err(DriverError::Parse(format!(
                "Unexpected trailing token: {:?}",
                self.current_token()
            )));
        }

        Ok(stmt)
    }

    fn parse_select(&mut self) -> DriverResult<SqlStatement> {
        self.expect(Token::Select)?;

        let distinct = self.eat(Token::Distinct);
        let columns = self.parse_select_columns()?;

        self.expect(Token::From)?;
        let name = self.parse_table_name()?;
        let alias = self.parse_optional_alias()?;
        let from = TableRef { name, alias };

        let where_clause = self.parse_filter(Token::Where, FilterKind::Where)?;

        let group_by = if self.eat(Token::Group) {
            self.expect(Token::By)?;
            self.parse_expression_list()?
        } else {
            Vec::new()
        };

        let having = self.parse_filter(Token::Having, FilterKind::Having)?;
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        let lock = if self.eat(Token::For) {
            self.expect(Token::Update)?;
            Some(LockClause::ForUpdate)
        } else if self.eat(Token::Lock) {
            self.expect(Token::In)?;
            self.expect(Token::Share)?;
            self.expect(Token::Mode)?;
            Some(LockClause::ShareMode)
        } else {
            None
        };

        Ok(SqlStatement::Select(SelectStatement {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            lock,
        }))
    }

    fn parse_filter(&mut self, keyword: Token, kind: FilterKind) -> DriverResult<Option<Filter>> {
        if !self.eat(keyword) {
            return Ok(None);
        }
        let expr = self.parse_expression()?;
        Ok(Some(Filter { kind, expr }))
    }

    fn parse_order_by(&mut self) -> DriverResult<Vec<OrderByItem>> {
        if !self.eat(Token::Order) {
            return Ok(Vec::new());
        }
        self.expect(Token::By)?;

        let mut items = Vec::new();
        loop {
            let expr = self.parse_additive_expression()?;

            let descending = if self.eat(Token::Desc) {
                true
            } else {
                self.eat(Token::Asc);
                false
            };

            items.push(OrderByItem { expr, descending });

            if !self.eat(Token::Comma) {
                break;
            }
        }

        Ok(items)
    }

    /// `limit n`, `limit offset, n` or `limit n offset offset`
    fn parse_limit(&mut self) -> DriverResult<Option<Limit>> {
        if !self.eat(Token::Limit) {
            return Ok(None);
        }

        let first = self.parse_limit_value()?;
        let limit = if self.eat(Token::Comma) {
            Limit {
                offset: Some(first),
                rowcount: self.parse_limit_value()?,
            }
        } else if self.eat(Token::Offset) {
            Limit {
                offset: Some(self.parse_limit_value()?),
                rowcount: first,
            }
        } else {
            Limit {
                offset: None,
                rowcount: first,
            }
        };

        Ok(Some(limit))
    }

    fn parse_limit_value(&mut self) -> DriverResult<SqlExpr> {
        match self.current_token().clone() {
            Token::Number(n) if !n.contains(['.', 'e', 'E']) => {
                self.advance();
                Ok(SqlExpr::Number(n))
            }
            other => Err(DriverError::Parse(format!(
                "Expected integer after LIMIT, found {:?}",
                other
            ))),
        }
    }

    fn parse_select_columns(&mut self) -> DriverResult<Vec<SelectColumn>> {
        let mut columns = Vec::new();

        loop {
            let col = self.parse_select_column()?;
            columns.push(col);

            if !self.eat(Token::Comma) {
                break;
            }
        }

        Ok(columns)
    }

    fn parse_select_column(&mut self) -> DriverResult<SelectColumn> {
        if self.eat(Token::Star) {
            return Ok(SelectColumn::Star);
        }

        let expr = self.parse_expression()?;
        let alias = self.parse_optional_alias()?;

        Ok(SelectColumn::Expression { expr, alias })
    }

    fn parse_optional_alias(&mut self) -> DriverResult<Option<String>> {
        if self.eat(Token::As) {
            return Ok(Some(self.expect_identifier()?));
        }
        // Keywords never lex as identifiers, so a bare identifier here is an alias.
        if let Token::Identifier(name) = self.current_token() {
            let alias = name.clone();
            self.advance();
            return Ok(Some(alias));
        }
        Ok(None)
    }

    fn parse_identifier_list(&mut self) -> DriverResult<Vec<String>> {
        let mut list = Vec::new();

        loop {
            list.push(self.expect_identifier()?);

            if !self.eat(Token::Comma) {
                break;
            }
        }

        Ok(list)
    }

    fn parse_assignments(&mut self) -> DriverResult<Vec<Assignment>> {
        let mut assignments = Vec::new();

        loop {
            let mut column = self.expect_identifier()?;
            if self.eat(Token::Dot) {
                column = self.expect_identifier()?;
            }
            self.expect(Token::Equal)?;
            let value = self.parse_expression()?;
            assignments.push(Assignment { column, value });

            if !self.eat(Token::Comma) {
                break;
            }
        }

        Ok(assignments)
    }

    fn parse_expression_list(&mut self) -> DriverResult<Vec<SqlExpr>> {
        let mut exprs = Vec::new();

        loop {
            exprs.push(self.parse_expression()?);

            if !self.eat(Token::Comma) {
                break;
            }
        }

        Ok(exprs)
    }

    fn parse_expression(&mut self) -> DriverResult<SqlExpr> {
        self.parse_or_expression()
    }

    fn parse_or_expression(&mut self) -> DriverResult<SqlExpr> {
        let mut left = self.parse_and_expression()?;

        while self.eat(Token::Or) {
            let right = self.parse_and_expression()?;
            left = SqlExpr::BinaryOp {
                left: Box::new(left),
                op: BinaryOp::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_and_expression(&mut self) -> DriverResult<SqlExpr> {
        let mut left = self.parse_not_expression()?;

        while self.eat(Token::And) {
            let right = self.parse_not_expression()?;
            left = SqlExpr::BinaryOp {
                left: Box::new(left),
                op: BinaryOp::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_not_expression(&mut self) -> DriverResult<SqlExpr> {
        if self.eat(Token::Not) {
            let expr = self.parse_not_expression()?;
            return Ok(SqlExpr::Not(Box::new(expr)));
        }

        self.parse_comparison_expression()
    }

    fn parse_comparison_expression(&mut self) -> DriverResult<SqlExpr> {
        let left = self.parse_additive_expression()?;

        // IS NULL / IS NOT NULL
        if self.eat(Token::Is) {
            if self.eat(Token::Not) {
                self.expect(Token::Null)?;
                return Ok(SqlExpr::IsNotNull(Box::new(left)));
            }
            self.expect(Token::Null)?;
            return Ok(SqlExpr::IsNull(Box::new(left)));
        }

        // NOT BETWEEN / NOT IN / NOT LIKE
        let negated = matches!(
            (self.current_token(), self.peek_token(1)),
            (Token::Not, Token::Between | Token::In | Token::Like)
        );
        if negated {
            self.advance();
        }

        if self.eat(Token::Between) {
            let low = self.parse_additive_expression()?;
            self.expect(Token::And)?;
            let high = self.parse_additive_expression()?;
            return Ok(SqlExpr::Between {
                expr: Box::new(left),
                negated,
                low: Box::new(low),
                high: Box::new(high),
            });
        }

        if self.eat(Token::In) {
            self.expect(Token::LeftParen)?;
            let list = self.parse_expression_list()?;
            self.expect(Token::RightParen)?;
            return Ok(SqlExpr::InList {
                expr: Box::new(left),
                negated,
                list,
            });
        }

        if self.eat(Token::Like) {
            let right = self.parse_additive_expression()?;
            return Ok(SqlExpr::BinaryOp {
                left: Box::new(left),
                op: if negated { BinaryOp::NotLike } else { BinaryOp::Like },
                right: Box::new(right),
            });
        }

        let op = match self.current_token() {
            Token::Equal => Some(BinaryOp::Eq),
            Token::NotEqual => Some(BinaryOp::NotEq),
            Token::LessThan => Some(BinaryOp::Lt),
            Token::LessThanEq => Some(BinaryOp::LtEq),
            Token::GreaterThan => Some(BinaryOp::Gt),
            Token::GreaterThanEq => Some(BinaryOp::GtEq),
            _ => None,
        };

        if let Some(op) = op {
            self.advance();
            let right = self.parse_additive_expression()?;
            return Ok(SqlExpr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn parse_additive_expression(&mut self) -> DriverResult<SqlExpr> {
        let mut left = self.parse_multiplicative_expression()?;

        loop {
            let op = match self.current_token() {
                Token::Plus => BinaryOp::Plus,
                Token::Minus => BinaryOp::Minus,
                _ => break,
            };

            self.advance();
            let right = self.parse_multiplicative_expression()?;
            left = SqlExpr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> DriverResult<SqlExpr> {
        let mut left = self.parse_unary_expression()?;

        loop {
            let op = match self.current_token() {
                Token::Star => BinaryOp::Multiply,
                Token::Slash => BinaryOp::Divide,
                Token::Percent => BinaryOp::Modulo,
                _ => break,
            };

            self.advance();
            let right = self.parse_unary_expression()?;
            left = SqlExpr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> DriverResult<SqlExpr> {
        if self.eat(Token::Minus) {
            // Fold into the literal so `-5` renders without a gap.
            return match self.parse_unary_expression()? {
                SqlExpr::Number(n) => Ok(SqlExpr::Number(format!("-{}", n))),
                expr => Ok(SqlExpr::Negative(Box::new(expr))),
            };
        }
        if self.eat(Token::Plus) {
            return self.parse_unary_expression();
        }
        self.parse_primary_expression()
    }

    fn parse_primary_expression(&mut self) -> DriverResult<SqlExpr> {
        match self.current_token().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(SqlExpr::Number(n))
            }
            Token::String(s) => {
                self.advance();
                Ok(SqlExpr::String(s))
            }
            Token::True => {
                self.advance();
                Ok(SqlExpr::Boolean(true))
            }
            Token::False => {
                self.advance();
                Ok(SqlExpr::Boolean(false))
            }
            Token::Null => {
                self.advance();
                Ok(SqlExpr::Null)
            }
            Token::LeftParen => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(Token::RightParen)?;
                Ok(SqlExpr::Nested(Box::new(expr)))
            }
            // `values(col)` inside on duplicate key update
            Token::Values if *self.peek_token(1) == Token::LeftParen => {
                self.advance();
                self.parse_function_call("values".to_string())
            }
            other => match self.current_name() {
                Some(name) => {
                    self.advance();
                    self.parse_named_expression(name)
                }
                None => Err(DriverError::Parse(format!(
                    "Unexpected token in expression: {:?}",
                    other
                ))),
            },
        }
    }

    /// Column, qualified column or function call starting with `name`
    fn parse_named_expression(&mut self, name: String) -> DriverResult<SqlExpr> {
        if *self.current_token() == Token::LeftParen {
            return self.parse_function_call(name);
        }

        if self.eat(Token::Dot) {
            let column = self.expect_identifier()?;
            return Ok(SqlExpr::QualifiedColumn {
                table: name,
                column,
            });
        }

        Ok(SqlExpr::Column(name))
    }

    fn parse_function_call(&mut self, name: String) -> DriverResult<SqlExpr> {
        self.expect(Token::LeftParen)?;

        let distinct = self.eat(Token::Distinct);
        let args = if self.eat(Token::Star) {
            vec![SqlExpr::Star]
        } else if *self.current_token() == Token::RightParen {
            Vec::new()
        } else {
            self.parse_expression_list()?
        };
        self.expect(Token::RightParen)?;

        Ok(SqlExpr::Function {
            name,
            distinct,
            args,
        })
    }

    fn parse_insert(&mut self) -> DriverResult<SqlStatement> {
        self.expect(Token::Insert)?;
        self.expect(Token::Into)?;

        let table = self.parse_table_name()?;

        let columns = if self.eat(Token::LeftParen) {
            let cols = self.parse_identifier_list()?;
            self.expect(Token::RightParen)?;
            cols
        } else {
            Vec::new()
        };

        self.expect(Token::Values)?;

        let mut rows = Vec::new();
        loop {
            self.expect(Token::LeftParen)?;
            let row = self.parse_expression_list()?;
            self.expect(Token::RightParen)?;
            rows.push(row);

            if !self.eat(Token::Comma) {
                break;
            }
        }

        let on_duplicate = if self.eat(Token::On) {
            self.expect(Token::Duplicate)?;
            self.expect(Token::Key)?;
            self.expect(Token::Update)?;
            self.parse_assignments()?
        } else {
            Vec::new()
        };

        Ok(SqlStatement::Insert(InsertStatement {
            table,
            columns,
            rows,
            on_duplicate,
        }))
    }

    fn parse_update(&mut self) -> DriverResult<SqlStatement> {
        self.expect(Token::Update)?;

        let name = self.parse_table_name()?;
        let alias = self.parse_optional_alias()?;

        self.expect(Token::Set)?;
        let assignments = self.parse_assignments()?;

        let where_clause = self.parse_filter(Token::Where, FilterKind::Where)?;
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        Ok(SqlStatement::Update(UpdateStatement {
            table: TableRef { name, alias },
            assignments,
            where_clause,
            order_by,
            limit,
        }))
    }

    fn parse_delete(&mut self) -> DriverResult<SqlStatement> {
        self.expect(Token::Delete)?;
        self.expect(Token::From)?;

        let table = self.parse_table_name()?;

        let where_clause = self.parse_filter(Token::Where, FilterKind::Where)?;
        let order_by = self.parse_order_by()?;
        let limit = self.parse_limit()?;

        Ok(SqlStatement::Delete(DeleteStatement {
            table,
            where_clause,
            order_by,
            limit,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> SqlStatement {
        SqlParser::new(input).unwrap().parse().unwrap()
    }

    fn select(input: &str) -> SelectStatement {
        match parse(input) {
            SqlStatement::Select(s) => s,
            other => panic!("Expected SELECT statement, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_select() {
        let s = select("SELECT * FROM users WHERE id = 1");
        assert_eq!(s.columns, vec![SelectColumn::Star]);
        assert_eq!(s.from.name, "users");
        assert_eq!(s.where_clause.unwrap().kind, FilterKind::Where);
    }

    #[test]
    fn test_select_canonical_rendering() {
        let s = select(
            "SELECT DISTINCT name, COUNT(*) AS n FROM users u WHERE age > 18 AND (a = 1 OR b = 'x') \
             GROUP BY name HAVING COUNT(*) > 2 ORDER BY name DESC, age LIMIT 5, 10 FOR UPDATE",
        );
        assert!(s.distinct);
        assert_eq!(s.from.alias.as_deref(), Some("u"));
        assert_eq!(s.columns_text(), "distinct name, count(*) as n");
        assert_eq!(s.lock, Some(LockClause::ForUpdate));
        assert_eq!(
            s.to_string(),
            "select distinct name, count(*) as n from users as u where age > 18 and (a = 1 or b = 'x') \
             group by name having count(*) > 2 order by name desc, age asc limit 5, 10 for update"
        );
    }

    #[test]
    fn test_limit_forms() {
        let s = select("SELECT * FROM t WHERE a = 1 LIMIT 10");
        assert_eq!(s.limit.unwrap().to_string(), "10");

        let s = select("SELECT * FROM t WHERE a = 1 LIMIT 10 OFFSET 5");
        assert_eq!(s.limit.unwrap().to_string(), "5, 10");

        assert!(SqlParser::new("SELECT * FROM t LIMIT 1.5").unwrap().parse().is_err());
    }

    #[test]
    fn test_share_mode_lock() {
        let s = select("select a from t where a = 1 lock in share mode");
        assert_eq!(s.lock, Some(LockClause::ShareMode));
    }

    #[test]
    fn test_negated_predicates() {
        let s = select("select a from t where a not in (1, 2) and b not like 'x%' and c not between 1 and 3");
        assert_eq!(
            s.where_clause.unwrap().to_string(),
            "a not in (1, 2) and b not like 'x%' and c not between 1 and 3"
        );
    }

    #[test]
    fn test_negative_numbers() {
        let s = select("select a from t where a = -5 and b = -c");
        assert_eq!(s.where_clause.unwrap().to_string(), "a = -5 and b = -c");
    }

    #[test]
    fn test_bind_markers_are_parse_errors() {
        assert!(SqlParser::new("select a from t where b = :name").is_err());
        assert!(SqlParser::new("select a from t where b = ?").is_err());
    }

    #[test]
    fn test_non_reserved_words_as_columns() {
        let s = select("select mode from t where id = 1");
        assert_eq!(s.columns_text(), "`mode`");

        let s = select("select id, offset from t where offset = 1 and t.share > 0 order by mode");
        assert_eq!(
            s.to_string(),
            "select id, `offset` from t where `offset` = 1 and t.`share` > 0 order by `mode` asc"
        );

        let stmt = parse("update t set share = 1 where id = 1");
        if let SqlStatement::Update(s) = stmt {
            assert_eq!(comma_list(&s.assignments), "`share` = 1");
        } else {
            panic!("Expected UPDATE statement");
        }

        let stmt = parse("insert into t(begin, commit) values (1, 2)");
        if let SqlStatement::Insert(s) = stmt {
            assert_eq!(s.columns_text(), "`begin`, `commit`");
        } else {
            panic!("Expected INSERT statement");
        }
    }

    #[test]
    fn test_keywords_keep_their_clause_meaning() {
        let s = select("select a from t where a = 1 limit 10 offset 5");
        assert_eq!(s.limit.unwrap().to_string(), "5, 10");

        let s = select("select a from t where a = 1 lock in share mode");
        assert_eq!(s.lock, Some(LockClause::ShareMode));
    }

    #[test]
    fn test_insert() {
        let stmt = parse("INSERT INTO users (id, name) VALUES (1, 'Alice'), (2, 'Bob')");
        if let SqlStatement::Insert(s) = stmt {
            assert_eq!(s.table, "users");
            assert_eq!(s.columns, vec!["id".to_string(), "name".to_string()]);
            assert_eq!(s.rows.len(), 2);
            assert_eq!(s.values_text(), "1, 'Alice'), (2, 'Bob'");
        } else {
            panic!("Expected INSERT statement");
        }
    }

    #[test]
    fn test_insert_on_duplicate_key_update() {
        let stmt = parse("insert into t(id, n) values (1, 1) on duplicate key update n = n + values(n)");
        if let SqlStatement::Insert(s) = stmt {
            assert_eq!(s.values_text(), "1, 1 on duplicate key update n = n + values(n)");
        } else {
            panic!("Expected INSERT statement");
        }
    }

    #[test]
    fn test_update() {
        let stmt = parse("UPDATE users SET age = 31, name = 'A' WHERE id = 7");
        if let SqlStatement::Update(s) = stmt {
            assert_eq!(s.table.name, "users");
            assert_eq!(s.assignments.len(), 2);
            assert_eq!(comma_list(&s.assignments), "age = 31, name = 'A'");
            assert!(s.where_clause.is_some());
        } else {
            panic!("Expected UPDATE statement");
        }
    }

    #[test]
    fn test_delete_keeps_order_and_limit() {
        let stmt = parse("DELETE FROM users WHERE age < 18 ORDER BY id LIMIT 3");
        if let SqlStatement::Delete(s) = stmt {
            assert_eq!(s.table, "users");
            assert!(s.where_clause.is_some());
            assert_eq!(s.order_by.len(), 1);
            assert!(s.limit.is_some());
        } else {
            panic!("Expected DELETE statement");
        }
    }

    #[test]
    fn test_other_statements() {
        assert_eq!(parse("CREATE TABLE t (id int)"), SqlStatement::Other("create".to_string()));
        assert_eq!(parse("begin"), SqlStatement::Other("begin".to_string()));
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        assert!(SqlParser::new("select a from t where a = 1 )").unwrap().parse().is_err());
        assert!(SqlParser::new("explain select 1").unwrap().parse().is_err());
    }

    #[test]
    fn test_escaped_strings_render_back() {
        let s = select(r"select a from t where name = 'O\'Brien'");
        assert_eq!(s.where_clause.unwrap().to_string(), r"name = 'O\'Brien'");
    }
}
