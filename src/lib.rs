pub mod cluster;
pub mod config;
pub mod driver;
pub mod error;
pub mod route;
pub mod sql;

pub use cluster::{Cluster, Db, DbTx, Pool};
pub use config::{parse_dsn, Config, DsnError};
pub use driver::{
    Conn, Driver, DriverOptions, ExecResult, Row, Rows, Statement, Transaction, Value,
};
pub use error::{ContractViolation, DbError, DriverError, DriverResult, SqlInfo};
pub use route::{get_route, set_route, Context, Route};
