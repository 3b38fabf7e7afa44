//! Transport Module
//!
//! Maps the `-proto` name onto tokio sockets and produces split connection
//! halves for the controllers.

pub mod udp;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{lookup_host, TcpListener, TcpStream, UdpSocket};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info};

use crate::error::RelayError;
pub use udp::UdpStream;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport protocol selected with `-proto`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Transport {
    #[default]
    Tcp,
    Tcp4,
    Tcp6,
    Udp,
    Udp4,
    Udp6,
    #[cfg(unix)]
    Unix,
}

impl Transport {
    pub fn name(&self) -> &'static str {
        match self {
            Transport::Tcp => "tcp",
            Transport::Tcp4 => "tcp4",
            Transport::Tcp6 => "tcp6",
            Transport::Udp => "udp",
            Transport::Udp4 => "udp4",
            Transport::Udp6 => "udp6",
            #[cfg(unix)]
            Transport::Unix => "unix",
        }
    }

    /// Whether the transport is connection-oriented and can accept peers
    pub fn is_stream(&self) -> bool {
        !matches!(self, Transport::Udp | Transport::Udp4 | Transport::Udp6)
    }

    fn accepts(&self, addr: &SocketAddr) -> bool {
        match self {
            Transport::Tcp4 | Transport::Udp4 => addr.is_ipv4(),
            Transport::Tcp6 | Transport::Udp6 => addr.is_ipv6(),
            _ => true,
        }
    }

    /// Fill in the host of a `:port` address. Listeners get the unspecified
    /// address, dialers get loopback.
    fn complete_host(&self, addr: &str, listening: bool) -> String {
        if !addr.starts_with(':') {
            return addr.to_string();
        }
        let host = match (self, listening) {
            (Transport::Tcp6 | Transport::Udp6, true) => "[::]",
            (Transport::Tcp6 | Transport::Udp6, false) => "[::1]",
            (_, true) => "0.0.0.0",
            (_, false) => "127.0.0.1",
        };
        format!("{}{}", host, addr)
    }

    /// Resolve `addr` to the socket addresses this transport may use
    async fn resolve(&self, addr: &str, listening: bool) -> io::Result<Vec<SocketAddr>> {
        let target = self.complete_host(addr, listening);
        let candidates: Vec<SocketAddr> = lookup_host(target.as_str())
            .await?
            .filter(|candidate| self.accepts(candidate))
            .collect();

        if candidates.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {} address found for {}", self, addr),
            ));
        }
        debug!("Resolved {} to {:?}", target, candidates);
        Ok(candidates)
    }

    /// Bind a listener. Only stream transports can be listened on.
    pub async fn bind(self, addr: &str) -> Result<TransportListener, RelayError> {
        let bind_error = |source| RelayError::Bind {
            transport: self,
            addr: addr.to_string(),
            source,
        };

        match self {
            Transport::Tcp | Transport::Tcp4 | Transport::Tcp6 => {
                let candidates = self.resolve(addr, true).await.map_err(bind_error)?;
                let mut last_error = None;
                for candidate in candidates {
                    match TcpListener::bind(candidate).await {
                        Ok(listener) => {
                            info!("Listening on {} {}", self, candidate);
                            return Ok(TransportListener::Tcp(listener));
                        }
                        Err(e) => {
                            debug!("Failed to bind {}: {}", candidate, e);
                            last_error = Some(e);
                        }
                    }
                }
                Err(bind_error(last_error.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to bind")
                })))
            }
            #[cfg(unix)]
            Transport::Unix => {
                let listener = UnixListener::bind(addr).map_err(bind_error)?;
                info!("Listening on unix socket {}", addr);
                Ok(TransportListener::Unix {
                    listener,
                    path: addr.to_string(),
                    accepted: 0,
                })
            }
            Transport::Udp | Transport::Udp4 | Transport::Udp6 => Err(bind_error(io::Error::new(
                io::ErrorKind::Unsupported,
                "connectionless transport cannot accept connections",
            ))),
        }
    }

    /// Dial a single remote peer
    pub async fn dial(self, addr: &str) -> Result<Connection, RelayError> {
        let connect_error = |source| RelayError::Connect {
            transport: self,
            addr: addr.to_string(),
            source,
        };

        match self {
            #[cfg(unix)]
            Transport::Unix => {
                let stream = UnixStream::connect(addr).await.map_err(connect_error)?;
                let (reader, writer) = stream.into_split();
                return Ok(Connection::new(addr, reader, writer));
            }
            _ => {}
        }

        let candidates = self.resolve(addr, false).await.map_err(connect_error)?;
        let mut last_error = None;
        for candidate in candidates {
            match self.dial_candidate(candidate).await {
                Ok(connection) => {
                    info!("Connected to {} {}", self, connection.peer);
                    return Ok(connection);
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", candidate, e);
                    last_error = Some(e);
                }
            }
        }
        Err(connect_error(last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to dial")
        })))
    }

    async fn dial_candidate(&self, candidate: SocketAddr) -> io::Result<Connection> {
        if self.is_stream() {
            let stream = TcpStream::connect(candidate).await?;
            let peer = stream.peer_addr().unwrap_or(candidate).to_string();
            let (reader, writer) = stream.into_split();
            return Ok(Connection::new(peer, reader, writer));
        }

        let local = if candidate.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = UdpSocket::bind(local).await?;
        socket.connect(candidate).await?;
        let stream = UdpStream::new(socket);
        let peer = stream.peer_addr().unwrap_or(candidate).to_string();
        Ok(Connection::new(peer, stream.clone(), stream))
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Transport {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Transport::Tcp),
            "tcp4" => Ok(Transport::Tcp4),
            "tcp6" => Ok(Transport::Tcp6),
            "udp" => Ok(Transport::Udp),
            "udp4" => Ok(Transport::Udp4),
            "udp6" => Ok(Transport::Udp6),
            #[cfg(unix)]
            "unix" => Ok(Transport::Unix),
            _ => Err(RelayError::UnsupportedTransport(s.to_string())),
        }
    }
}

/// A connection split into independently owned halves
pub struct Connection {
    /// Remote address string the connection is identified by
    pub peer: String,
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Connection {
    pub fn new<R, W>(peer: impl Into<String>, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer: peer.into(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("peer", &self.peer).finish()
    }
}

/// Bound listener for a stream transport
#[derive(Debug)]
pub enum TransportListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix {
        listener: UnixListener,
        path: String,
        accepted: u64,
    },
}

/// Source of accepted peer connections for the listener controller
#[async_trait]
pub trait Acceptor: Send {
    /// Wait for the next peer
    async fn accept(&mut self) -> io::Result<Connection>;

    /// Address being listened on, as a dialable string
    fn local_addr(&self) -> io::Result<String>;
}

#[async_trait]
impl Acceptor for TransportListener {
    async fn accept(&mut self) -> io::Result<Connection> {
        match self {
            TransportListener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                let (reader, writer) = stream.into_split();
                Ok(Connection::new(peer.to_string(), reader, writer))
            }
            #[cfg(unix)]
            TransportListener::Unix {
                listener,
                path,
                accepted,
            } => {
                let (stream, _) = listener.accept().await?;
                // Accepted unix peers are unnamed; number them so they stay
                // distinct in the registry.
                *accepted += 1;
                let peer = format!("{}#{}", path, accepted);
                let (reader, writer) = stream.into_split();
                Ok(Connection::new(peer, reader, writer))
            }
        }
    }

    fn local_addr(&self) -> io::Result<String> {
        match self {
            TransportListener::Tcp(listener) => listener.local_addr().map(|a| a.to_string()),
            #[cfg(unix)]
            TransportListener::Unix { path, .. } => Ok(path.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_names() {
        assert_eq!("tcp".parse::<Transport>().unwrap(), Transport::Tcp);
        assert_eq!("TCP6".parse::<Transport>().unwrap(), Transport::Tcp6);
        assert_eq!("udp4".parse::<Transport>().unwrap(), Transport::Udp4);
        assert!(matches!(
            "sctp".parse::<Transport>(),
            Err(RelayError::UnsupportedTransport(name)) if name == "sctp"
        ));
        assert_eq!(Transport::default(), Transport::Tcp);
    }

    #[test]
    fn test_stream_transports() {
        assert!(Transport::Tcp.is_stream());
        assert!(Transport::Tcp4.is_stream());
        assert!(!Transport::Udp.is_stream());
        assert!(!Transport::Udp6.is_stream());
    }

    #[test]
    fn test_complete_host_for_port_only_addresses() {
        assert_eq!(Transport::Tcp.complete_host(":8080", true), "0.0.0.0:8080");
        assert_eq!(Transport::Tcp.complete_host(":8080", false), "127.0.0.1:8080");
        assert_eq!(Transport::Tcp6.complete_host(":8080", true), "[::]:8080");
        assert_eq!(
            Transport::Tcp.complete_host("example.org:80", false),
            "example.org:80"
        );
    }

    #[tokio::test]
    async fn test_bind_and_accept_tcp() {
        let mut listener = Transport::Tcp.bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();

        let client = TcpStream::connect(local.as_str()).await.unwrap();
        let accepted = listener.accept().await.unwrap();

        assert_eq!(accepted.peer, client.local_addr().unwrap().to_string());
    }

    #[tokio::test]
    async fn test_udp_cannot_listen() {
        let err = Transport::Udp.bind("127.0.0.1:0").await.unwrap_err();
        match err {
            RelayError::Bind { source, .. } => {
                assert_eq!(source.kind(), io::ErrorKind::Unsupported)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_family_mismatch_is_rejected() {
        let err = Transport::Tcp6.bind("127.0.0.1:0").await.unwrap_err();
        assert!(matches!(err, RelayError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_dial_refused_is_connect_error() {
        // Grab a free port, then close it so nothing is listening there.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = Transport::Tcp
            .dial(&format!("127.0.0.1:{}", port))
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Connect { .. }));
    }
}
