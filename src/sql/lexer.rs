use crate::error::{DriverError, DriverResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Statement verbs
    Select,
    Insert,
    Update,
    Delete,

    // Verbs recognized only to be rejected
    Create,
    Drop,
    Alter,
    Show,
    Begin,
    Commit,
    Rollback,
    Truncate,
    Replace,

    // Clauses
    From,
    Where,
    Into,
    Values,
    Set,
    Distinct,
    Order,
    By,
    Group,
    Having,
    Limit,
    Offset,
    As,
    On,
    Duplicate,
    Key,

    // Locking
    For,
    Lock,
    Share,
    Mode,

    // Logical
    And,
    Or,
    Not,

    // Comparison
    Is,
    Null,
    Between,
    Like,
    In,

    // Boolean
    True,
    False,

    // Sort direction
    Asc,
    Desc,

    // Literals and identifiers
    Identifier(String),
    /// Numeric literal kept as written so it re-renders exactly
    Number(String),
    String(String),

    // Operators
    Equal,         // =
    NotEqual,      // != or <>
    LessThan,      // <
    LessThanEq,    // <=
    GreaterThan,   // >
    GreaterThanEq, // >=
    Plus,          // +
    Minus,         // -
    Star,          // *
    Slash,         // /
    Percent,       // %

    // Delimiters
    Comma,      // ,
    Dot,        // .
    LeftParen,  // (
    RightParen, // )
    Semicolon,  // ;

    Eof,
}

/// Keyword token for a bare word, matched case-insensitively.
/// Statement arguments are interpolated before lexing, so `?` and `:name`
/// are not part of the token set.
pub fn keyword(word: &str) -> Option<Token> {
    let token = match word.to_ascii_uppercase().as_str() {
        "SELECT" => Token::Select,
        "INSERT" => Token::Insert,
        "UPDATE" => Token::Update,
        "DELETE" => Token::Delete,
        "CREATE" => Token::Create,
        "DROP" => Token::Drop,
        "ALTER" => Token::Alter,
        "SHOW" => Token::Show,
        "BEGIN" => Token::Begin,
        "COMMIT" => Token::Commit,
        "ROLLBACK" => Token::Rollback,
        "TRUNCATE" => Token::Truncate,
        "REPLACE" => Token::Replace,
        "FROM" => Token::From,
        "WHERE" => Token::Where,
        "INTO" => Token::Into,
        "VALUES" => Token::Values,
        "SET" => Token::Set,
        "DISTINCT" => Token::Distinct,
        "ORDER" => Token::Order,
        "BY" => Token::By,
        "GROUP" => Token::Group,
        "HAVING" => Token::Having,
        "LIMIT" => Token::Limit,
        "OFFSET" => Token::Offset,
        "AS" => Token::As,
        "ON" => Token::On,
        "DUPLICATE" => Token::Duplicate,
        "KEY" => Token::Key,
        "FOR" => Token::For,
        "LOCK" => Token::Lock,
        "SHARE" => Token::Share,
        "MODE" => Token::Mode,
        "AND" => Token::And,
        "OR" => Token::Or,
        "NOT" => Token::Not,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "BETWEEN" => Token::Between,
        "LIKE" => Token::Like,
        "IN" => Token::In,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "ASC" => Token::Asc,
        "DESC" => Token::Desc,
        _ => return None,
    };
    Some(token)
}

impl Token {
    /// Keywords MySQL does not reserve. They still name columns and tables
    /// wherever an identifier is expected.
    pub fn non_reserved_word(&self) -> Option<&'static str> {
        let word = match self {
            Token::Begin => "begin",
            Token::Commit => "commit",
            Token::Rollback => "rollback",
            Token::Show => "show",
            Token::Truncate => "truncate",
            Token::Offset => "offset",
            Token::Duplicate => "duplicate",
            Token::Share => "share",
            Token::Mode => "mode",
            _ => return None,
        };
        Some(word)
    }
}

pub struct SqlLexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl SqlLexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.current_char {
            self.advance();
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_block_comment(&mut self) {
        self.advance(); // skip /
        self.advance(); // skip *
        while let Some(ch) = self.current_char {
            if ch == '*' && self.peek() == Some('/') {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn read_number(&mut self) -> Token {
        let mut num_str = String::new();
        let mut has_dot = false;

        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                num_str.push(ch);
                self.advance();
            } else if ch == '.' && !has_dot && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                has_dot = true;
                num_str.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E') && self.exponent_follows() {
                // 1e+21 as produced by float formatting
                num_str.push(ch);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.current_char {
                    num_str.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        Token::Number(num_str)
    }

    fn exponent_follows(&self) -> bool {
        match self.peek() {
            Some(c) if c.is_ascii_digit() => true,
            Some('+') | Some('-') => self
                .input
                .get(self.position + 2)
                .is_some_and(|c| c.is_ascii_digit()),
            _ => false,
        }
    }

    fn read_string(&mut self) -> DriverResult<Token> {
        let Some(quote) = self.current_char else {
            return Err(DriverError::Parse("Unterminated string".to_string()));
        };
        self.advance(); // Skip opening quote

        let mut string = String::new();

        while let Some(ch) = self.current_char {
            if ch == quote {
                // Check for escaped quote (doubled)
                if self.peek() == Some(quote) {
                    string.push(quote);
                    self.advance();
                    self.advance();
                } else {
                    self.advance(); // Skip closing quote
                    return Ok(Token::String(string));
                }
            } else if ch == '\\' {
                self.advance();
                if let Some(escaped) = self.current_char {
                    string.push(match escaped {
                        '0' => '\0',
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        'Z' => '\x1a',
                        _ => escaped,
                    });
                    self.advance();
                }
            } else {
                string.push(ch);
                self.advance();
            }
        }

        Err(DriverError::Parse("Unterminated string".to_string()))
    }

    fn read_identifier(&mut self) -> Token {
        let mut ident = String::new();

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        keyword(&ident).unwrap_or(Token::Identifier(ident))
    }

    fn read_quoted_identifier(&mut self) -> DriverResult<Token> {
        self.advance(); // Skip opening backtick

        let mut ident = String::new();

        while let Some(ch) = self.current_char {
            if ch == '`' {
                if self.peek() == Some('`') {
                    ident.push('`');
                    self.advance();
                    self.advance();
                    continue;
                }
                self.advance();
                return Ok(Token::Identifier(ident));
            }
            ident.push(ch);
            self.advance();
        }

        Err(DriverError::Parse("Unterminated quoted identifier".to_string()))
    }

    pub fn next_token(&mut self) -> DriverResult<Token> {
        loop {
            self.skip_whitespace();

            match self.current_char {
                Some('-') if self.peek() == Some('-') => self.skip_line_comment(),
                Some('#') => self.skip_line_comment(),
                Some('/') if self.peek() == Some('*') => self.skip_block_comment(),
                _ => break,
            }
        }

        let token = match self.current_char {
            None => Token::Eof,

            Some(ch) if ch.is_ascii_digit() => return Ok(self.read_number()),

            Some('\'') | Some('"') => return self.read_string(),

            Some('`') => return self.read_quoted_identifier(),

            Some(ch) if ch.is_alphabetic() || ch == '_' => return Ok(self.read_identifier()),

            Some('=') => {
                self.advance();
                Token::Equal
            }

            Some('!') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::NotEqual
                } else {
                    Token::Not
                }
            }

            Some('<') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::LessThanEq
                } else if self.current_char == Some('>') {
                    self.advance();
                    Token::NotEqual // <>
                } else {
                    Token::LessThan
                }
            }

            Some('>') => {
                self.advance();
                if self.current_char == Some('=') {
                    self.advance();
                    Token::GreaterThanEq
                } else {
                    Token::GreaterThan
                }
            }

            Some(ch) => {
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    '(' => Token::LeftParen,
                    ')' => Token::RightParen,
                    ';' => Token::Semicolon,
                    _ => return Err(DriverError::Parse(format!("Unexpected character: {}", ch))),
                };
                self.advance();
                token
            }
        };

        Ok(token)
    }

    pub fn tokenize(&mut self) -> DriverResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(input: &str) -> Vec<Token> {
        SqlLexer::new(input).tokenize().unwrap()
    }

    #[test]
    fn test_select_keywords() {
        let tokens = tokenize("SELECT DISTINCT FROM WHERE");
        assert_eq!(tokens[0], Token::Select);
        assert_eq!(tokens[1], Token::Distinct);
        assert_eq!(tokens[2], Token::From);
        assert_eq!(tokens[3], Token::Where);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(tokenize("select")[0], Token::Select);
        assert_eq!(tokenize("Select")[0], Token::Select);
        assert_eq!(tokenize("for UPDATE")[1], Token::Update);
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(tokenize("users")[0], Token::Identifier("users".to_string()));
        assert_eq!(tokenize("`order`")[0], Token::Identifier("order".to_string()));
        assert_eq!(tokenize("`a``b`")[0], Token::Identifier("a`b".to_string()));
    }

    #[test]
    fn test_strings_and_escapes() {
        assert_eq!(tokenize("'hello'")[0], Token::String("hello".to_string()));
        assert_eq!(tokenize(r"'O\'Brien'")[0], Token::String("O'Brien".to_string()));
        assert_eq!(tokenize(r"'a\0b\Z'")[0], Token::String("a\0b\x1a".to_string()));
        assert_eq!(tokenize("'it''s'")[0], Token::String("it's".to_string()));
        assert!(SqlLexer::new("'open").tokenize().is_err());
    }

    #[test]
    fn test_numbers_keep_their_text() {
        assert_eq!(tokenize("123")[0], Token::Number("123".to_string()));
        assert_eq!(tokenize("3.14")[0], Token::Number("3.14".to_string()));
        assert_eq!(tokenize("1e+21")[0], Token::Number("1e+21".to_string()));
        assert_eq!(
            tokenize("18446744073709551615")[0],
            Token::Number("18446744073709551615".to_string())
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(tokenize("=")[0], Token::Equal);
        assert_eq!(tokenize("!=")[0], Token::NotEqual);
        assert_eq!(tokenize("<>")[0], Token::NotEqual);
        assert_eq!(tokenize("<=")[0], Token::LessThanEq);
        assert_eq!(tokenize(">=")[0], Token::GreaterThanEq);
    }

    #[test]
    fn test_bind_markers_are_rejected() {
        assert!(SqlLexer::new("a = ?").tokenize().is_err());
        assert!(SqlLexer::new("a = :name").tokenize().is_err());
    }

    #[test]
    fn test_non_reserved_words() {
        assert_eq!(tokenize("mode")[0].non_reserved_word(), Some("mode"));
        assert_eq!(tokenize("OFFSET")[0].non_reserved_word(), Some("offset"));
        assert_eq!(tokenize("select")[0].non_reserved_word(), None);
        assert_eq!(tokenize("key")[0].non_reserved_word(), None);
    }

    #[test]
    fn test_comments() {
        let tokens = tokenize("SELECT -- this is a comment\n* /* block */ FROM users # tail");
        assert_eq!(tokens[0], Token::Select);
        assert_eq!(tokens[1], Token::Star);
        assert_eq!(tokens[2], Token::From);
        assert_eq!(tokens[3], Token::Identifier("users".to_string()));
        assert_eq!(tokens[4], Token::Eof);
    }
}
