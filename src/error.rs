use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DsnError;

/// Result code the proxy reports for a successful call
pub const RC_SUCCESS: i32 = 0;

/// Symbolic name for a remote result code
pub fn result_code_name(code: i32) -> &'static str {
    match code {
        RC_SUCCESS => "RC_SUCCESS",
        _ => "unknown",
    }
}

/// Diagnostic payload attached to a remote failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlInfo {
    /// Reconstructed SQL text
    #[serde(default)]
    pub sql: String,
    /// Shard key the statement was routed with
    #[serde(default)]
    pub shard: u64,
    #[serde(default)]
    pub dbname: String,
    /// Address of the backing MySQL instance
    #[serde(default)]
    pub mysql_ip: String,
    #[serde(default)]
    pub mysql_port: u32,
    /// Native MySQL error number, 0 if none
    #[serde(default)]
    pub mysql_errno: u32,
}

impl SqlInfo {
    /// Builds the diagnostic payload locally when the proxy did not send one.
    pub fn synthesize(sql: impl Into<String>, shard: u64, dbname: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            shard,
            dbname: dbname.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for SqlInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "shard:{}, ip:{}, port:{}, dbname:{}, sql:{}, errno:{}",
            self.shard, self.mysql_ip, self.mysql_port, self.dbname, self.sql, self.mysql_errno
        )
    }
}

/// A business failure reported by the proxy (non-success result code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    pub code: i32,
    pub message: String,
    pub sql_info: Option<SqlInfo>,
}

impl DbError {
    pub fn new(code: i32, message: impl Into<String>, sql_info: Option<SqlInfo>) -> Self {
        Self {
            code,
            message: message.into(),
            sql_info,
        }
    }

    /// Passthrough MySQL error number, e.g. 1062 for a duplicate key.
    pub fn native_errno(&self) -> u32 {
        if self.code == RC_SUCCESS {
            return 0;
        }
        self.sql_info.as_ref().map_or(0, |info| info.mysql_errno)
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ErrCode: {}({}), ErrMsg: {}, SqlInfo: <",
            self.code,
            result_code_name(self.code),
            self.message
        )?;
        if let Some(info) = &self.sql_info {
            write!(f, "{}", info)?;
        }
        write!(f, ">")
    }
}

impl std::error::Error for DbError {}

/// Misuse by the integrating pool or application. Never retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("missing route info")]
    MissingRouteInfo,

    #[error("interface deprecated")]
    Deprecated,

    #[error("sql not supported")]
    SqlNotSupported,
}

#[derive(Error, Debug)]
pub enum DriverError {
    /// The connection is unusable and should be discarded by the pool
    #[error("driver: bad connection")]
    BadConnection,

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("sql invalid: {0}")]
    SqlInvalid(String),

    /// Argument binding can't be done here; retry through a generic path
    #[error("driver: skip fast-path; continue as if unimplemented")]
    Skip,

    #[error("sql too large")]
    SqlTooLarge,

    #[error("sql parse error: {0}")]
    Parse(String),

    #[error("contract violation: {0}")]
    Contract(#[from] ContractViolation),

    #[error(transparent)]
    InvalidDsn(#[from] DsnError),

    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

impl DriverError {
    pub fn is_bad_connection(&self) -> bool {
        matches!(self, DriverError::BadConnection)
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, DriverError::Contract(_))
    }

    /// The remote error, if this is a business failure
    pub fn as_db_error(&self) -> Option<&DbError> {
        match self {
            DriverError::Database(err) => Some(err),
            _ => None,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
