//! Memcached Server
//!
//! One physical server: a lazily opened blocking TCP connection with
//! per-server timeouts, reused across requests and dropped on failure.

use parking_lot::Mutex;
use std::io::BufReader;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use super::protocol::{self, ProtocolError, ProtocolResult, StoredValue};
use crate::error::{Error, Result};

/// Connection state guarded per server
struct ServerState {
    connection: Option<BufReader<TcpStream>>,
    failed_at: Option<Instant>,
}

/// A single memcached server inside a group
pub struct Server {
    address: String,
    weight: u32,
    timeout: Duration,
    retry_interval: Duration,
    state: Mutex<ServerState>,
}

impl Server {
    /// Create a server handle; no connection is opened until first use
    pub fn new(address: String, weight: u32, timeout: Duration, retry_interval: Duration) -> Self {
        Self {
            address,
            weight,
            timeout,
            retry_interval,
            state: Mutex::new(ServerState {
                connection: None,
                failed_at: None,
            }),
        }
    }

    /// `host:port` of this server
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Relative share of the group's keys
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Whether the server may be tried (not inside its failure back-off)
    pub fn is_available(&self) -> bool {
        match self.state.lock().failed_at {
            Some(at) => at.elapsed() >= self.retry_interval,
            None => true,
        }
    }

    /// Fetch the value under `key`
    pub fn get(&self, key: &str) -> Result<Option<StoredValue>> {
        self.check_key(key)?;
        self.request(|conn| {
            protocol::write_get(conn.get_mut(), key)?;
            protocol::read_get(conn, key)
        })
    }

    /// Store `data` under `key`
    pub fn set(&self, key: &str, flags: u32, exptime: u32, data: &[u8]) -> Result<()> {
        self.check_key(key)?;
        self.request(|conn| {
            protocol::write_set(conn.get_mut(), key, flags, exptime, data)?;
            protocol::read_set(conn)
        })
    }

    /// Ask the server for its version, used as a liveness probe
    pub fn version(&self) -> Result<String> {
        self.request(|conn| {
            protocol::write_version(conn.get_mut())?;
            protocol::read_version(conn)
        })
    }

    /// Reject keys the protocol cannot carry without touching the connection
    fn check_key(&self, key: &str) -> Result<()> {
        protocol::validate_key(key).map_err(|e| self.map_error(e))
    }

    /// Run one request/response exchange on the (possibly new) connection.
    ///
    /// A pooled connection the server closed while idle is replaced and
    /// the exchange retried once before the server counts as failed.
    fn request<T>(
        &self,
        exchange: impl Fn(&mut BufReader<TcpStream>) -> ProtocolResult<T>,
    ) -> Result<T> {
        let mut state = self.state.lock();

        let mut reused = state.connection.is_some();
        loop {
            if state.connection.is_none() {
                match self.connect() {
                    Ok(stream) => state.connection = Some(BufReader::new(stream)),
                    Err(e) => {
                        state.failed_at = Some(Instant::now());
                        return Err(e);
                    }
                }
            }

            let result = match state.connection.as_mut() {
                Some(conn) => exchange(conn),
                None => return Err(Error::NoServerAvailable(self.address.clone())),
            };

            match result {
                Ok(value) => {
                    state.failed_at = None;
                    return Ok(value);
                }
                Err(e) => {
                    // The stream may hold a partial reply; never reuse it.
                    state.connection = None;
                    if reused && is_stale_connection(&e) {
                        tracing::debug!("Reconnecting to {} after idle close", self.address);
                        reused = false;
                        continue;
                    }
                    if matches!(e, ProtocolError::Io(_) | ProtocolError::Malformed(_)) {
                        state.failed_at = Some(Instant::now());
                    }
                    return Err(self.map_error(e));
                }
            }
        }
    }

    /// Open a connection, trying every resolved address
    fn connect(&self) -> Result<TcpStream> {
        let addrs = self
            .address
            .to_socket_addrs()
            .map_err(|e| Error::ConnectionFailed {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(self.timeout))?;
                    stream.set_write_timeout(Some(self.timeout))?;
                    stream.set_nodelay(true)?;
                    tracing::debug!("Connected to memcached at {}", self.address);
                    return Ok(stream);
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(match last_error {
            Some(e) if is_timeout(&e) => Error::ConnectionTimeout(self.address.clone()),
            Some(e) => Error::ConnectionFailed {
                address: self.address.clone(),
                reason: e.to_string(),
            },
            None => Error::ConnectionFailed {
                address: self.address.clone(),
                reason: "address resolved to nothing".into(),
            },
        })
    }

    fn map_error(&self, e: ProtocolError) -> Error {
        let address = self.address.clone();
        match e {
            ProtocolError::Io(e) if is_timeout(&e) => Error::ConnectionTimeout(address),
            ProtocolError::Io(e) => Error::ConnectionFailed {
                address,
                reason: e.to_string(),
            },
            ProtocolError::Malformed(reason) => Error::Protocol { address, reason },
            ProtocolError::InvalidKey(reason) => Error::InvalidKey(reason),
            ProtocolError::Server(message) => Error::ServerError { address, message },
            ProtocolError::NotStored => Error::NotStored(address),
        }
    }
}

/// Errors a peer closing an idle connection produces on the next request
fn is_stale_connection(e: &ProtocolError) -> bool {
    match e {
        ProtocolError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memcache::fake::FakeMemcached;

    fn server_for(address: String) -> Server {
        Server::new(
            address,
            1,
            Duration::from_secs(1),
            Duration::from_secs(60),
        )
    }

    #[test]
    fn test_set_get_version() {
        let fake = FakeMemcached::start();
        let server = server_for(fake.address());

        assert!(server.get("sess01").unwrap().is_none());
        server.set("sess01", 0, 0, b"payload").unwrap();

        let value = server.get("sess01").unwrap().unwrap();
        assert_eq!(value.data, b"payload");
        assert_eq!(value.flags, 0);
        assert!(server.version().unwrap().starts_with("fake"));
        assert!(server.is_available());
    }

    #[test]
    fn test_connection_refused_marks_server_down() {
        let address = FakeMemcached::unused_address();
        let server = server_for(address);

        let err = server.get("sess01").unwrap_err();
        assert!(err.is_transient());
        assert!(!server.is_available());
    }

    #[test]
    fn test_invalid_key_leaves_server_available() {
        let fake = FakeMemcached::start();
        let server = server_for(fake.address());
        server.set("sess01", 0, 0, b"payload").unwrap();

        let err = server.get(&"a".repeat(251)).unwrap_err();
        assert!(matches!(err, Error::InvalidKey(_)));
        assert!(server.is_available());
        assert_eq!(server.get("sess01").unwrap().unwrap().data, b"payload");
    }

    #[test]
    fn test_reconnects_after_idle_close() {
        let fake = FakeMemcached::start();
        let server = server_for(fake.address());
        server.set("sess01", 0, 0, b"payload").unwrap();

        fake.close_connections();

        let value = server.get("sess01").unwrap().unwrap();
        assert_eq!(value.data, b"payload");
        assert!(server.is_available());
    }

    #[test]
    fn test_retry_interval_elapsed() {
        let address = FakeMemcached::unused_address();
        let server = Server::new(address, 1, Duration::from_secs(1), Duration::ZERO);

        assert!(server.get("sess01").is_err());
        assert!(server.is_available());
    }
}
