//! Restricted MySQL dialect: lexer, AST with canonical rendering, parser.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::*;
pub use parser::SqlParser;

use crate::error::DriverResult;

/// Parses a single statement.
pub fn parse(sql: &str) -> DriverResult<SqlStatement> {
    SqlParser::new(sql)?.parse()
}
