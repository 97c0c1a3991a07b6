//! Socket factories
//!
//! Client and server factories come in a plain and a TLS variant. Callers
//! only ever see boxed async streams, so switching TLS on or off is purely a
//! configuration change.

use rustls::pki_types::ServerName;
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::config::TlsSettings;
use crate::error::TransportError;

use super::tls;

/// Bidirectional byte stream, plain or TLS
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Stream for T {}

pub type BoxedStream = Box<dyn Stream>;

// ============================================================================
// CLIENT
// ============================================================================

/// Opens connections to a server
#[derive(Clone)]
pub enum ClientSocketFactory {
	Plain,
	Tls(TlsConnector),
}

impl ClientSocketFactory {
	pub fn from_settings(settings: &TlsSettings) -> Result<Self, TransportError> {
		if settings.enabled {
			Ok(ClientSocketFactory::Tls(TlsConnector::from(tls::client_config(settings)?)))
		} else {
			Ok(ClientSocketFactory::Plain)
		}
	}

	pub fn is_tls(&self) -> bool {
		matches!(self, ClientSocketFactory::Tls(_))
	}

	/// Resolve, connect and (for TLS) handshake, all within `limit`
	pub async fn connect(
		&self,
		host: &str,
		port: u16,
		limit: Duration,
	) -> Result<BoxedStream, TransportError> {
		let addrs: Vec<SocketAddr> = timeout(limit, tokio::net::lookup_host((host, port)))
			.await
			.map_err(|_| TransportError::Timeout { host: host.to_string(), port, after: limit })?
			.map_err(|source| TransportError::UnresolvedHost { host: host.to_string(), port, source })?
			.collect();
		if addrs.is_empty() {
			return Err(TransportError::UnresolvedHost {
				host: host.to_string(),
				port,
				source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
			});
		}

		let tcp = timeout(limit, TcpStream::connect(&addrs[..]))
			.await
			.map_err(|_| TransportError::Timeout { host: host.to_string(), port, after: limit })?
			.map_err(|e| TransportError::Connect {
				host: host.to_string(),
				port,
				source: Box::new(e),
			})?;
		tcp.set_nodelay(true).ok();

		match self {
			ClientSocketFactory::Plain => Ok(Box::new(tcp) as BoxedStream),
			ClientSocketFactory::Tls(connector) => {
				let server_name = ServerName::try_from(host.to_string())
					.map_err(|e| TransportError::Tls(format!("invalid server name {}: {}", host, e)))?;
				let stream = timeout(limit, connector.connect(server_name, tcp))
					.await
					.map_err(|_| TransportError::Timeout { host: host.to_string(), port, after: limit })?
					.map_err(|e| TransportError::Tls(format!("handshake with {}:{}: {}", host, port, e)))?;
				Ok(Box::new(stream) as BoxedStream)
			}
		}
	}
}

// ============================================================================
// SERVER
// ============================================================================

/// Accepts connections from clients
#[derive(Clone)]
pub enum ServerSocketFactory {
	Plain,
	Tls(TlsAcceptor),
}

impl ServerSocketFactory {
	pub fn from_settings(settings: &TlsSettings) -> Result<Self, TransportError> {
		if settings.enabled {
			Ok(ServerSocketFactory::Tls(TlsAcceptor::from(tls::server_config(settings)?)))
		} else {
			Ok(ServerSocketFactory::Plain)
		}
	}

	pub fn is_tls(&self) -> bool {
		matches!(self, ServerSocketFactory::Tls(_))
	}

	/// Bind a listening socket on `host:port`
	pub async fn bind(&self, host: &str, port: u16) -> Result<ServerSocket, TransportError> {
		let addr = format!("{}:{}", host, port);
		let listener = TcpListener::bind(&addr)
			.await
			.map_err(|source| TransportError::Bind { addr: addr.clone(), source })?;
		let local_addr =
			listener.local_addr().map_err(|source| TransportError::Bind { addr, source })?;
		Ok(ServerSocket { listener, local_addr, factory: self.clone() })
	}

	/// Wrap an accepted connection, running the TLS handshake if needed
	pub async fn upgrade(&self, tcp: TcpStream, limit: Duration) -> Result<BoxedStream, TransportError> {
		match self {
			ServerSocketFactory::Plain => Ok(Box::new(tcp) as BoxedStream),
			ServerSocketFactory::Tls(acceptor) => {
				let peer = tcp.peer_addr().map(|a| a.to_string()).unwrap_or_default();
				let stream = timeout(limit, acceptor.accept(tcp))
					.await
					.map_err(|_| TransportError::Tls(format!("handshake with {} timed out", peer)))?
					.map_err(|e| TransportError::Tls(format!("handshake with {}: {}", peer, e)))?;
				Ok(Box::new(stream) as BoxedStream)
			}
		}
	}
}

/// A bound listener together with the factory that wraps its connections
pub struct ServerSocket {
	listener: TcpListener,
	local_addr: SocketAddr,
	factory: ServerSocketFactory,
}

impl ServerSocket {
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	pub fn factory(&self) -> &ServerSocketFactory {
		&self.factory
	}

	/// Accept the next TCP connection; the handshake is left to [`ServerSocketFactory::upgrade`]
	pub async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
		self.listener.accept().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	#[tokio::test]
	async fn test_plain_round_trip() {
		let server = ServerSocketFactory::Plain.bind("127.0.0.1", 0).await.unwrap();
		let port = server.local_addr().port();

		let accept = tokio::spawn(async move {
			let (tcp, _) = server.accept().await.unwrap();
			let mut stream = server.factory().upgrade(tcp, Duration::from_secs(1)).await.unwrap();
			let mut buf = [0u8; 4];
			stream.read_exact(&mut buf).await.unwrap();
			stream.write_all(&buf).await.unwrap();
		});

		let mut client = ClientSocketFactory::Plain
			.connect("127.0.0.1", port, Duration::from_secs(1))
			.await
			.unwrap();
		client.write_all(b"ping").await.unwrap();
		let mut buf = [0u8; 4];
		client.read_exact(&mut buf).await.unwrap();
		assert_eq!(&buf, b"ping");
		accept.await.unwrap();
	}

	#[tokio::test]
	async fn test_connection_refused() {
		// grab a free port, then close it again
		let port = {
			let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
			listener.local_addr().unwrap().port()
		};
		let result =
			ClientSocketFactory::Plain.connect("127.0.0.1", port, Duration::from_secs(1)).await;
		match result {
			Err(e) => assert!(e.is_unreachable(), "unexpected error {}", e),
			Ok(_) => panic!("connect to a closed port must fail"),
		}
	}

	#[tokio::test]
	async fn test_unresolvable_host() {
		let result = ClientSocketFactory::Plain
			.connect("no-such-host.invalid", 9777, Duration::from_secs(2))
			.await;
		match result {
			Err(e) => assert!(e.is_unreachable(), "unexpected error {}", e),
			Ok(_) => panic!("an .invalid host must not resolve"),
		}
	}

	#[test]
	fn test_plain_from_settings() {
		let settings = TlsSettings::default();
		assert!(!ClientSocketFactory::from_settings(&settings).unwrap().is_tls());
		assert!(!ServerSocketFactory::from_settings(&settings).unwrap().is_tls());
	}
}

// vim: ts=4
