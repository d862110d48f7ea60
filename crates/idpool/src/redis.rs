use redis::{Commands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

use crate::{Error, QueueStore, Result};

/// Port used when the address does not name one.
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// A [`QueueStore`] backed by a Redis list, over a blocking connection.
///
/// Commands map one-to-one: `LLEN`, `RPUSH`, `LRANGE` and `LTRIM`. Timeouts
/// are whatever the Redis client enforces.
pub struct RedisQueue {
    connection: redis::Connection,
}

impl RedisQueue {
    /// Connects to `addr` (`host:port`) on database 0.
    ///
    /// An empty `password` is treated as no password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a malformed address, or the client error
    /// if the connection cannot be established.
    pub fn connect(addr: &str, password: Option<&str>) -> Result<Self> {
        let (host, port) = parse_addr(addr)?;
        let info = ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                password: password.filter(|p| !p.is_empty()).map(str::to_owned),
                ..RedisConnectionInfo::default()
            },
        };
        let client = redis::Client::open(info)?;
        let connection = client.get_connection()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Connected to redis at {addr}");
        Ok(Self { connection })
    }

    /// Verifies the server answers `PING`.
    ///
    /// # Errors
    ///
    /// Returns the client error, or [`Error::Queue`] on an unexpected reply.
    pub fn ping(&mut self) -> Result<()> {
        let reply: String = redis::cmd("PING").query(&mut self.connection)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(Error::Queue {
                context: format!("unexpected PING reply: {reply}"),
            })
        }
    }
}

impl QueueStore for RedisQueue {
    fn length(&mut self, key: &str) -> Result<u64> {
        Ok(self.connection.llen(key)?)
    }

    fn push(&mut self, key: &str, values: &[String]) -> Result<()> {
        let _: u64 = self.connection.rpush(key, values)?;
        Ok(())
    }

    fn range(&mut self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        Ok(self
            .connection
            .lrange(key, to_isize(start)?, to_isize(stop)?)?)
    }

    fn truncate(&mut self, key: &str, start: i64, stop: i64) -> Result<()> {
        let _: () = self
            .connection
            .ltrim(key, to_isize(start)?, to_isize(stop)?)?;
        Ok(())
    }
}

/// Splits `host:port`, defaulting the port to [`DEFAULT_REDIS_PORT`].
/// Bracketed IPv6 hosts (`[::1]:6379`) are accepted.
pub fn parse_addr(addr: &str) -> Result<(String, u16)> {
    let invalid = |reason: &str| Error::Config {
        reason: format!("invalid redis address {addr:?}: {reason}"),
    };

    let (host, port) = match addr.rsplit_once(':') {
        Some((host, port)) if !host.ends_with(':') => {
            let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;
            (host, port)
        }
        _ => (addr, DEFAULT_REDIS_PORT),
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok((host.to_owned(), port))
}

fn to_isize(index: i64) -> Result<isize> {
    isize::try_from(index).map_err(|_| Error::Queue {
        context: format!("list index {index} out of range"),
    })
}
