//! Statement translation and RPC execution against the proxy

pub mod breaker;
pub mod conn;
mod executor;
pub mod protocol;
pub mod rows;
pub mod stmt;
pub mod transport;
pub mod tx;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

pub use breaker::{BreakerRegistry, BreakerSettings, BreakerTransport, CircuitBreaker, CircuitState};
pub use conn::{Conn, Driver, DriverOptions};
pub use rows::{ExecResult, Row, Rows};
pub use stmt::{interpolate, Statement};
pub use transport::{SessionConfig, TcpSession, Transport, TransportError};
pub use tx::Transaction;
pub use value::Value;
