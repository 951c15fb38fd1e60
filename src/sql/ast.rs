//! SQL abstract syntax tree
//!
//! Every node renders back to canonical MySQL text through `Display`:
//! lower-case keywords, `, ` separators and backslash-escaped string
//! literals. The rendered fragments are what goes on the wire.

use std::fmt::{self, Display, Write};

use super::lexer::keyword;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlStatement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    /// A statement this driver does not translate, by leading verb
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: TableRef,
    pub where_clause: Option<Filter>,
    pub group_by: Vec<SqlExpr>,
    pub having: Option<Filter>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
    pub lock: Option<LockClause>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    Star,
    Expression { expr: SqlExpr, alias: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Where,
    Having,
}

/// A boolean condition attached to a statement
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub kind: FilterKind,
    pub expr: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: SqlExpr,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub offset: Option<SqlExpr>,
    pub rowcount: SqlExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockClause {
    ForUpdate,
    ShareMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub value: SqlExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlExpr>>,
    pub on_duplicate: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableRef,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Filter>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: String,
    pub where_clause: Option<Filter>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Limit>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    Column(String),
    QualifiedColumn { table: String, column: String },
    Number(String),
    String(String),
    Boolean(bool),
    Null,
    /// `*` inside a function call such as `count(*)`
    Star,

    BinaryOp {
        left: Box<SqlExpr>,
        op: BinaryOp,
        right: Box<SqlExpr>,
    },

    Negative(Box<SqlExpr>),
    Not(Box<SqlExpr>),
    IsNull(Box<SqlExpr>),
    IsNotNull(Box<SqlExpr>),

    Between {
        expr: Box<SqlExpr>,
        negated: bool,
        low: Box<SqlExpr>,
        high: Box<SqlExpr>,
    },
    InList {
        expr: Box<SqlExpr>,
        negated: bool,
        list: Vec<SqlExpr>,
    },

    Function {
        name: String,
        distinct: bool,
        args: Vec<SqlExpr>,
    },

    /// Parenthesized expression, kept so precedence survives re-rendering
    Nested(Box<SqlExpr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Like,
    NotLike,
}

/// Appends `value` with MySQL backslash escaping (no surrounding quotes).
pub fn escape_string_into(buf: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\0' => buf.push_str("\\0"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\x1a' => buf.push_str("\\Z"),
            '\'' => buf.push_str("\\'"),
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            _ => buf.push(ch),
        }
    }
}

/// Renders items separated by `, `
pub fn comma_list<T: Display>(items: &[T]) -> String {
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{}", item);
    }
    out
}

struct Ident<'a>(&'a str);

impl Display for Ident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.0;
        let plain = !name.is_empty()
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$')
            && keyword(name).is_none();
        if plain {
            f.write_str(name)
        } else {
            write!(f, "`{}`", name.replace('`', "``"))
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Like => "like",
            BinaryOp::NotLike => "not like",
        };
        f.write_str(op)
    }
}

impl Display for SqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlExpr::Column(name) => write!(f, "{}", Ident(name)),
            SqlExpr::QualifiedColumn { table, column } => {
                write!(f, "{}.{}", Ident(table), Ident(column))
            }
            SqlExpr::Number(text) => f.write_str(text),
            SqlExpr::String(value) => {
                let mut buf = String::with_capacity(value.len() + 2);
                buf.push('\'');
                escape_string_into(&mut buf, value);
                buf.push('\'');
                f.write_str(&buf)
            }
            SqlExpr::Boolean(true) => f.write_str("true"),
            SqlExpr::Boolean(false) => f.write_str("false"),
            SqlExpr::Null => f.write_str("null"),
            SqlExpr::Star => f.write_str("*"),
            SqlExpr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
            SqlExpr::Negative(expr) => write!(f, "-{}", expr),
            SqlExpr::Not(expr) => write!(f, "not {}", expr),
            SqlExpr::IsNull(expr) => write!(f, "{} is null", expr),
            SqlExpr::IsNotNull(expr) => write!(f, "{} is not null", expr),
            SqlExpr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let not = if *negated { "not " } else { "" };
                write!(f, "{} {}between {} and {}", expr, not, low, high)
            }
            SqlExpr::InList {
                expr,
                negated,
                list,
            } => {
                let not = if *negated { "not " } else { "" };
                write!(f, "{} {}in ({})", expr, not, comma_list(list))
            }
            SqlExpr::Function {
                name,
                distinct,
                args,
            } => {
                let distinct = if *distinct { "distinct " } else { "" };
                write!(f, "{}({}{})", name.to_lowercase(), distinct, comma_list(args))
            }
            SqlExpr::Nested(expr) => write!(f, "({})", expr),
        }
    }
}

impl Display for SelectColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectColumn::Star => f.write_str("*"),
            SelectColumn::Expression { expr, alias: None } => write!(f, "{}", expr),
            SelectColumn::Expression {
                expr,
                alias: Some(alias),
            } => write!(f, "{} as {}", expr, Ident(alias)),
        }
    }
}

impl Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Ident(&self.name))?;
        if let Some(alias) = &self.alias {
            write!(f, " as {}", Ident(alias))?;
        }
        Ok(())
    }
}

impl Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterKind::Where => f.write_str("where"),
            FilterKind::Having => f.write_str("having"),
        }
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl Display for OrderByItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "desc" } else { "asc" };
        write!(f, "{} {}", self.expr, dir)
    }
}

impl Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.offset {
            Some(offset) => write!(f, "{}, {}", offset, self.rowcount),
            None => write!(f, "{}", self.rowcount),
        }
    }
}

impl Display for LockClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockClause::ForUpdate => f.write_str("for update"),
            LockClause::ShareMode => f.write_str("lock in share mode"),
        }
    }
}

impl Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", Ident(&self.column), self.value)
    }
}

fn write_tail(
    f: &mut fmt::Formatter<'_>,
    where_clause: &Option<Filter>,
    order_by: &[OrderByItem],
    limit: &Option<Limit>,
) -> fmt::Result {
    if let Some(filter) = where_clause {
        write!(f, " {} {}", filter.kind, filter)?;
    }
    if !order_by.is_empty() {
        write!(f, " order by {}", comma_list(order_by))?;
    }
    if let Some(limit) = limit {
        write!(f, " limit {}", limit)?;
    }
    Ok(())
}

impl SelectStatement {
    /// Projection text, prefixed with `distinct ` when requested
    pub fn columns_text(&self) -> String {
        let columns = comma_list(&self.columns);
        if self.distinct {
            format!("distinct {}", columns)
        } else {
            columns
        }
    }
}

impl InsertStatement {
    pub fn columns_text(&self) -> String {
        let columns: Vec<Ident<'_>> = self.columns.iter().map(|c| Ident(c)).collect();
        comma_list(&columns)
    }

    /// Value tuples without their outer parentheses: `1, 'x'` for a single
    /// row, `1, 'x'), (2, 'y'` for several, followed by any
    /// `on duplicate key update` clause.
    pub fn values_text(&self) -> String {
        let rows: Vec<String> = self.rows.iter().map(|row| comma_list(row)).collect();
        let mut out = rows.join("), (");
        if !self.on_duplicate.is_empty() {
            let _ = write!(out, " on duplicate key update {}", comma_list(&self.on_duplicate));
        }
        out
    }
}

impl Display for SelectStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select {} from {}", self.columns_text(), self.from)?;
        if let Some(filter) = &self.where_clause {
            write!(f, " {} {}", filter.kind, filter)?;
        }
        if !self.group_by.is_empty() {
            write!(f, " group by {}", comma_list(&self.group_by))?;
        }
        if let Some(having) = &self.having {
            write!(f, " {} {}", having.kind, having)?;
        }
        write_tail(f, &None, &self.order_by, &self.limit)?;
        if let Some(lock) = self.lock {
            write!(f, " {}", lock)?;
        }
        Ok(())
    }
}

impl Display for InsertStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insert into {}", Ident(&self.table))?;
        if !self.columns.is_empty() {
            write!(f, "({})", self.columns_text())?;
        }
        let rows: Vec<String> = self
            .rows
            .iter()
            .map(|row| format!("({})", comma_list(row)))
            .collect();
        write!(f, " values {}", rows.join(", "))?;
        if !self.on_duplicate.is_empty() {
            write!(f, " on duplicate key update {}", comma_list(&self.on_duplicate))?;
        }
        Ok(())
    }
}

impl Display for UpdateStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "update {} set {}", self.table, comma_list(&self.assignments))?;
        write_tail(f, &self.where_clause, &self.order_by, &self.limit)
    }
}

impl Display for DeleteStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delete from {}", Ident(&self.table))?;
        write_tail(f, &self.where_clause, &self.order_by, &self.limit)
    }
}

impl Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlStatement::Select(s) => write!(f, "{}", s),
            SqlStatement::Insert(s) => write!(f, "{}", s),
            SqlStatement::Update(s) => write!(f, "{}", s),
            SqlStatement::Delete(s) => write!(f, "{}", s),
            SqlStatement::Other(verb) => f.write_str(verb),
        }
    }
}
