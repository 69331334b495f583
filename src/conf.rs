use crate::{info::ServerInfo, registry, transport::TransportKind, GspErr};
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, SocketAddr, ToSocketAddrs},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

/// Default TCP and UDP deadline, in milliseconds.
pub const DEFAULT_SOCKET_TIMEOUT_MS: u32 = 5_000;
/// Default HTTP global deadline, in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u32 = 10_000;

/// TCP timeout configuration. `0` means use the built-in default.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TcpTimeout {
    /// Connection timeout.
    pub connect_ms: u32,
    /// Read timeout, shared by every round of a query.
    pub read_ms: u32,
    /// Write timeout, shared by every round of a query.
    pub write_ms: u32,
}

/// UDP timeout configuration. `0` means use the built-in default.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct UdpTimeout {
    /// Receive timeout, shared by every round of a query.
    pub read_ms: u32,
    /// Send timeout, shared by every round of a query.
    pub write_ms: u32,
}

/// HTTP timeout configuration. `0` means use the built-in default.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct HttpTimeout {
    /// Global deadline covering every request of a query.
    pub global_ms: u32,
}

/// Timeout configuration for all supported transports.
///
/// Every field may be overridden independently, the rest keep their
/// defaults ([DEFAULT_SOCKET_TIMEOUT_MS], [DEFAULT_HTTP_TIMEOUT_MS]).
///
/// # Examples
///
/// ```
/// # use gsp::TimeoutConfig;
/// # use std::time::Duration;
/// #
/// let conf = TimeoutConfig::default().with_udp_read_ms(250);
/// let resolved = conf.resolve();
/// #
/// # assert_eq!(resolved.udp.read, Duration::from_millis(250));
/// # assert_eq!(resolved.udp.write, Duration::from_secs(5));
/// ```
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub tcp: TcpTimeout,
    pub udp: UdpTimeout,
    pub http: HttpTimeout,
}

/// TCP deadlines after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpDeadlines {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
}

/// UDP deadlines after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpDeadlines {
    pub read: Duration,
    pub write: Duration,
}

/// HTTP deadline after defaults have been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDeadlines {
    pub global: Duration,
}

/// Every timeout resolved to a positive [Duration].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTimeouts {
    pub tcp: TcpDeadlines,
    pub udp: UdpDeadlines,
    pub http: HttpDeadlines,
}

impl ResolvedTimeouts {
    /// Deadline for the host name lookup, the first deadline of `kind`.
    pub fn lookup(&self, kind: TransportKind) -> Duration {
        match kind {
            TransportKind::Tcp => self.tcp.connect,
            TransportKind::Udp => self.udp.read,
            TransportKind::Http => self.http.global,
        }
    }
}

fn or_default(ms: u32, default_ms: u32) -> Duration {
    match ms {
        0 => Duration::from_millis(default_ms as u64),
        ms => Duration::from_millis(ms as u64),
    }
}

impl TimeoutConfig {
    /// Load a (possibly partial) configuration from JSON.
    ///
    /// # Example
    ///
    /// ```
    /// # use gsp::{GspErr, TimeoutConfig};
    /// #
    /// # fn main() -> Result<(), GspErr> {
    ///     let conf = TimeoutConfig::from_json(r#"{ "tcp": { "read_ms": 50 } }"#)?;
    /// #
    /// #   assert_eq!(conf.tcp.read_ms, 50);
    /// #   assert_eq!(conf.tcp.connect_ms, 0);
    /// #   Ok(())
    /// # }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, GspErr> {
        serde_json::from_str(json).map_err(|err| GspErr::parse("timeout config", err.to_string()))
    }

    pub fn with_tcp_connect_ms(mut self, ms: u32) -> Self {
        self.tcp.connect_ms = ms;
        self
    }

    pub fn with_tcp_read_ms(mut self, ms: u32) -> Self {
        self.tcp.read_ms = ms;
        self
    }

    pub fn with_tcp_write_ms(mut self, ms: u32) -> Self {
        self.tcp.write_ms = ms;
        self
    }

    pub fn with_udp_read_ms(mut self, ms: u32) -> Self {
        self.udp.read_ms = ms;
        self
    }

    pub fn with_udp_write_ms(mut self, ms: u32) -> Self {
        self.udp.write_ms = ms;
        self
    }

    pub fn with_http_global_ms(mut self, ms: u32) -> Self {
        self.http.global_ms = ms;
        self
    }

    /// Merge the configuration over the built-in defaults.
    pub fn resolve(&self) -> ResolvedTimeouts {
        ResolvedTimeouts {
            tcp: TcpDeadlines {
                connect: or_default(self.tcp.connect_ms, DEFAULT_SOCKET_TIMEOUT_MS),
                read: or_default(self.tcp.read_ms, DEFAULT_SOCKET_TIMEOUT_MS),
                write: or_default(self.tcp.write_ms, DEFAULT_SOCKET_TIMEOUT_MS),
            },
            udp: UdpDeadlines {
                read: or_default(self.udp.read_ms, DEFAULT_SOCKET_TIMEOUT_MS),
                write: or_default(self.udp.write_ms, DEFAULT_SOCKET_TIMEOUT_MS),
            },
            http: HttpDeadlines {
                global: or_default(self.http.global_ms, DEFAULT_HTTP_TIMEOUT_MS),
            },
        }
    }
}

/// A parsed, not yet resolved, server address.
///
/// Accepted forms are `host`, `host:port`, `[v6]`, `[v6]:port` and a bare
/// IPv6 literal. Without a port the game's default port is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub host: String,
    pub port: Option<u16>,
}

impl Address {
    pub fn parse(addr: &str) -> Result<Self, GspErr> {
        let trimmed = addr.trim();

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| GspErr::address(addr, "missing closing bracket"))?;

            match tail {
                "" => (host, None),
                tail => match tail.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => {
                        return Err(GspErr::address(
                            addr,
                            format!("unexpected characters after bracket: {}", tail),
                        ));
                    }
                },
            }
        } else if trimmed.parse::<IpAddr>().is_ok() {
            (trimmed, None)
        } else {
            match trimmed.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (trimmed, None),
            }
        };

        if host.is_empty() {
            return Err(GspErr::address(addr, "empty host"));
        }

        if host.contains(':') && host.parse::<IpAddr>().is_err() {
            return Err(GspErr::address(addr, format!("invalid host: {}", host)));
        }

        let port = match port {
            None => None,
            Some(port) => match port.trim().parse::<u16>() {
                Ok(0) | Err(_) => {
                    return Err(GspErr::address(addr, format!("Invalid port: {}", port)));
                }
                Ok(port) => Some(port),
            },
        };

        Ok(Self {
            host: host.into(),
            port,
        })
    }

    /// Resolve to a socket address, filling in `default_port` if needed.
    ///
    /// IP literals resolve in place. Host names go through the system
    /// resolver on a helper thread and the caller waits at most `limit`;
    /// a lookup still running after that is left to finish on its own.
    pub fn resolve(&self, default_port: u16, limit: Duration) -> Result<SocketAddr, GspErr> {
        let port = self.port.unwrap_or(default_port);

        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(SocketAddr::new(ip, port));
        }

        let display = format!("{}:{}", self.host, port);
        let host = self.host.clone();
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let addrs = (host.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            // The caller may have given up already.
            let _ = tx.send(addrs);
        });

        let addrs = match rx.recv_timeout(limit) {
            Ok(addrs) => addrs.map_err(|err| GspErr::address(&display, err.to_string()))?,
            Err(RecvTimeoutError::Timeout) => {
                return Err(GspErr::TimeoutErr {
                    phase: "resolve",
                    budget: limit,
                });
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(GspErr::address(&display, "resolver thread failed"));
            }
        };

        addrs
            .into_iter()
            .next()
            .ok_or_else(|| GspErr::address(&display, "host resolved to no addresses"))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.host.contains(':'), self.port) {
            (true, Some(port)) => write!(f, "[{}]:{}", self.host, port),
            (false, Some(port)) => write!(f, "{}:{}", self.host, port),
            (_, None) => write!(f, "{}", self.host),
        }
    }
}

/// Main struct describing one query.
///
/// Immutable once constructed; create a new request to change anything.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    game_id: String,
    address: Address,
    timeout: TimeoutConfig,
}

impl QueryRequest {
    /// Create a request with default timeouts.
    ///
    /// The address syntax is checked here, the host is only resolved when
    /// the query runs.
    ///
    /// # Example
    ///
    /// ```
    /// # use gsp::{GspErr, QueryRequest};
    /// #
    /// # fn main() -> Result<(), GspErr> {
    ///     let req = QueryRequest::create("minecraft", "www.example.com:25565")?;
    /// #
    /// #   assert_eq!(req.game_id(), "minecraft");
    /// #   assert_eq!(req.address().port, Some(25565));
    /// #   assert!(QueryRequest::create("minecraft", "www.example.com:-1").is_err());
    /// #   Ok(())
    /// # }
    /// ```
    pub fn create(game_id: &str, address: &str) -> Result<Self, GspErr> {
        Ok(Self {
            game_id: game_id.into(),
            address: Address::parse(address)?,
            timeout: TimeoutConfig::default(),
        })
    }

    /// Return a copy of the request using `timeout`.
    pub fn with_timeout(self, timeout: TimeoutConfig) -> Self {
        Self { timeout, ..self }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn timeout(&self) -> &TimeoutConfig {
        &self.timeout
    }

    /// Run the query.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use gsp::{GspErr, QueryRequest};
    ///
    /// fn main() -> Result<(), GspErr> {
    ///     let info = QueryRequest::create("tf2", "www.example.com")?.query()?;
    ///
    ///     println!("{}", info);
    ///     Ok(())
    /// }
    /// ```
    pub fn query(&self) -> Result<ServerInfo, GspErr> {
        let descriptor = registry::resolve(&self.game_id)?;

        crate::run_query(descriptor, &self.address, &self.timeout)
    }
}
