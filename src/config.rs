//! Connection-string configuration
//!
//! Grammar: `[net[(addr[,addr...])]]/dbname[?param=value&...]`, e.g.
//! `tcp(127.0.0.1:9123)/users?timeout=10s&readTimeout=30s`.

use std::fmt::Write;
use std::time::Duration;

use thiserror::Error;

/// Address used when the connection string names none
pub const DEFAULT_ADDR: &str = "127.0.0.1:9123";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DsnError {
    #[error("invalid DSN: did you forget to escape a param value?")]
    Unescaped,

    #[error("invalid DSN: network address not terminated (missing closing brace)")]
    AddrNotTerminated,

    #[error("invalid DSN: missing the slash separating the database name")]
    NoSlash,

    #[error("invalid DSN: no network address")]
    NoAddress,

    #[error("invalid DSN: bad value {value:?} for param {key}: {reason}")]
    InvalidParam {
        key: String,
        value: String,
        reason: String,
    },
}

/// Per-connection configuration parsed from a connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Protocol, "tcp"
    pub net: String,
    /// Network address, possibly a comma-separated list
    pub addr: String,
    pub db_name: String,
    /// Max size of an interpolated statement, 0 for unlimited
    pub max_allowed_packet: usize,
    /// Dial timeout
    pub timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub enable_circuit_breaker: bool,
}

impl Config {
    pub fn format_dsn(&self) -> String {
        let mut buf = String::new();

        if !self.net.is_empty() {
            buf.push_str(&self.net);
            if !self.addr.is_empty() {
                let _ = write!(buf, "({})", self.addr);
            }
        }

        buf.push('/');
        buf.push_str(&self.db_name);

        let mut params: Vec<(&str, String)> = Vec::new();
        if !self.timeout.is_zero() {
            params.push(("timeout", format_duration(self.timeout)));
        }
        if !self.read_timeout.is_zero() {
            params.push(("readTimeout", format_duration(self.read_timeout)));
        }
        if !self.write_timeout.is_zero() {
            params.push(("writeTimeout", format_duration(self.write_timeout)));
        }
        if self.max_allowed_packet > 0 {
            params.push(("maxAllowedPacket", self.max_allowed_packet.to_string()));
        }
        if self.enable_circuit_breaker {
            params.push(("enableCircuitBreaker", "true".to_string()));
        }

        for (i, (key, value)) in params.iter().enumerate() {
            buf.push(if i == 0 { '?' } else { '&' });
            let _ = write!(buf, "{}={}", key, value);
        }

        buf
    }

    /// Individual addresses of a multi-address configuration
    pub fn addrs(&self) -> Vec<String> {
        self.addr
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Same configuration pinned to a single address
    pub fn with_addr(&self, addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            ..self.clone()
        }
    }
}

pub fn parse_dsn(dsn: &str) -> Result<Config, DsnError> {
    let mut cfg = Config::default();

    // The last '/' separates the database name; the address may contain one.
    match dsn.rfind('/') {
        Some(slash) => {
            if slash > 0 {
                let left = &dsn[..slash];
                match left.find('(') {
                    Some(open) => {
                        if !left.ends_with(')') {
                            if left[open + 1..].contains(')') {
                                return Err(DsnError::Unescaped);
                            }
                            return Err(DsnError::AddrNotTerminated);
                        }
                        cfg.addr = left[open + 1..left.len() - 1].to_string();
                        cfg.net = left[..open].to_string();
                    }
                    None => cfg.net = left.to_string(),
                }
            }

            let right = &dsn[slash + 1..];
            match right.find('?') {
                Some(q) => {
                    parse_params(&mut cfg, &right[q + 1..])?;
                    cfg.db_name = right[..q].to_string();
                }
                None => cfg.db_name = right.to_string(),
            }
        }
        None if !dsn.is_empty() => return Err(DsnError::NoSlash),
        None => {}
    }

    if cfg.addr.is_empty() {
        cfg.addr = DEFAULT_ADDR.to_string();
    }

    Ok(cfg)
}

fn parse_params(cfg: &mut Config, params: &str) -> Result<(), DsnError> {
    // A parameter without `=` is malformed and skipped.
    let params = params
        .split('&')
        .filter(|param| param.contains('='))
        .collect::<Vec<_>>()
        .join("&");

    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&params).map_err(|e| {
        DsnError::InvalidParam {
            key: String::new(),
            value: params.clone(),
            reason: e.to_string(),
        }
    })?;

    for (key, value) in pairs {
        let invalid = |reason: String| DsnError::InvalidParam {
            key: key.clone(),
            value: value.clone(),
            reason,
        };

        match key.as_str() {
            "timeout" => cfg.timeout = parse_duration(&value).map_err(invalid)?,
            "readTimeout" => cfg.read_timeout = parse_duration(&value).map_err(invalid)?,
            "writeTimeout" => cfg.write_timeout = parse_duration(&value).map_err(invalid)?,
            "maxAllowedPacket" => {
                cfg.max_allowed_packet = value.parse().map_err(|e| invalid(format!("{}", e)))?
            }
            "enableCircuitBreaker" => cfg.enable_circuit_breaker = parse_bool(&value).map_err(invalid)?,
            _ => {}
        }
    }

    Ok(())
}

/// Parses a Go-style duration such as `10s`, `1m30s` or `500ms`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    if value == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(value).map_err(|e| e.to_string())
}

/// Formats a duration so that `parse_duration` reads it back unchanged.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }

    let nanos = d.as_nanos();
    if nanos % 1_000_000_000 == 0 {
        let secs = d.as_secs();
        let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
        if h > 0 {
            format!("{}h{}m{}s", h, m, s)
        } else if m > 0 {
            format!("{}m{}s", m, s)
        } else {
            format!("{}s", s)
        }
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
fn parse_bool(value: &str) -> Result<bool, String> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err("invalid syntax".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dsn() {
        let dsn = "tcp(127.0.0.1:9123)/users?timeout=10s&readTimeout=30s&writeTimeout=60s&maxAllowedPacket=1024";
        let cfg = parse_dsn(dsn).unwrap();

        assert_eq!(cfg.net, "tcp");
        assert_eq!(cfg.addr, "127.0.0.1:9123");
        assert_eq!(cfg.db_name, "users");
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.read_timeout, Duration::from_secs(30));
        assert_eq!(cfg.write_timeout, Duration::from_secs(60));
        assert_eq!(cfg.max_allowed_packet, 1024);
        assert!(!cfg.enable_circuit_breaker);
    }

    #[test]
    fn test_format_parse_round_trip() {
        let cfg = Config {
            net: "tcp".to_string(),
            addr: "10.0.0.7:9123".to_string(),
            db_name: "orders".to_string(),
            max_allowed_packet: 4 << 20,
            timeout: Duration::from_millis(1500),
            read_timeout: Duration::from_secs(90),
            write_timeout: Duration::from_secs(3600 + 5),
            enable_circuit_breaker: true,
        };

        let dsn = cfg.format_dsn();
        assert_eq!(parse_dsn(&dsn).unwrap(), cfg);
    }

    #[test]
    fn test_format_omits_zero_values() {
        let cfg = Config {
            net: "tcp".to_string(),
            addr: "h:1".to_string(),
            db_name: "db".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.format_dsn(), "tcp(h:1)/db");
    }

    #[test]
    fn test_missing_slash() {
        assert_eq!(parse_dsn("tcp(127.0.0.1:9123)"), Err(DsnError::NoSlash));
    }

    #[test]
    fn test_unterminated_address() {
        assert_eq!(parse_dsn("tcp(127.0.0.1:9123/db"), Err(DsnError::AddrNotTerminated));
        assert_eq!(parse_dsn("tcp(127.0.0.1:9123)x/db"), Err(DsnError::Unescaped));
    }

    #[test]
    fn test_default_address() {
        let cfg = parse_dsn("/test").unwrap();
        assert_eq!(cfg.addr, DEFAULT_ADDR);
        assert_eq!(cfg.db_name, "test");
        assert!(cfg.net.is_empty());
    }

    #[test]
    fn test_multiple_addresses() {
        let cfg = parse_dsn("tcp(10.0.0.1:9123, 10.0.0.2:9123,)/orders").unwrap();
        assert_eq!(cfg.addrs(), vec!["10.0.0.1:9123", "10.0.0.2:9123"]);
        assert_eq!(cfg.with_addr("10.0.0.2:9123").format_dsn(), "tcp(10.0.0.2:9123)/orders");
    }

    #[test]
    fn test_circuit_breaker_flag() {
        let cfg = parse_dsn("tcp(h:1)/db?enableCircuitBreaker=1").unwrap();
        assert!(cfg.enable_circuit_breaker);

        let err = parse_dsn("tcp(h:1)/db?enableCircuitBreaker=maybe").unwrap_err();
        assert!(matches!(err, DsnError::InvalidParam { ref key, .. } if key == "enableCircuitBreaker"));
    }

    #[test]
    fn test_invalid_duration_and_unknown_params() {
        assert!(parse_dsn("tcp(h:1)/db?timeout=soon").is_err());

        let cfg = parse_dsn("tcp(h:1)/db?charset=utf8&timeout=2s").unwrap();
        assert_eq!(cfg.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_params_without_value_separator_are_skipped() {
        let cfg = parse_dsn("tcp(h:1)/db?timeout&readTimeout=1s").unwrap();
        assert!(cfg.timeout.is_zero());
        assert_eq!(cfg.read_timeout, Duration::from_secs(1));

        let cfg = parse_dsn("tcp(h:1)/db?enableCircuitBreaker&&maxAllowedPacket=8").unwrap();
        assert!(!cfg.enable_circuit_breaker);
        assert_eq!(cfg.max_allowed_packet, 8);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(10)), "10s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }
}
