//! Error types for cmdlink operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocol::ProtocolError;
use crate::validation::ValidationError;

/// Errors raised while moving a command between the two ends
///
/// Every variant that refers to a peer carries its `host:port` so that log
/// lines and error chains can be traced back to the failing endpoint.
#[derive(Debug)]
pub enum TransportError {
	/// Host name could not be resolved to any address
	UnresolvedHost { host: String, port: u16, source: io::Error },

	/// Connection could not be established (refused, reset, unreachable)
	Connect { host: String, port: u16, source: Box<dyn Error + Send + Sync> },

	/// An I/O call did not complete within the resolved timeout
	Timeout { host: String, port: u16, after: Duration },

	/// I/O failure in the middle of an exchange
	Io { host: String, port: u16, source: io::Error },

	/// TLS material or handshake failure
	Tls(String),

	/// HTTP client failure that is not a connect error or a timeout
	Http { url: String, message: String },

	/// Tunnel endpoint answered with something other than 200/204
	HttpStatus { url: String, status: u16 },

	/// Answer could not be decoded
	Protocol(ProtocolError),

	/// Local file could not be read, hashed or written
	LocalFile { path: PathBuf, source: io::Error },

	/// Listening socket could not be bound
	Bind { addr: String, source: io::Error },
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransportError::UnresolvedHost { host, port, source } => {
				write!(f, "Unknown host {}:{}: {}", host, port, source)
			}
			TransportError::Connect { host, port, source } => {
				write!(f, "Cannot connect to {}:{}: {}", host, port, source)
			}
			TransportError::Timeout { host, port, after } => {
				write!(f, "Timeout talking to {}:{} after {} ms", host, port, after.as_millis())
			}
			TransportError::Io { host, port, source } => {
				write!(f, "I/O error talking to {}:{}: {}", host, port, source)
			}
			TransportError::Tls(msg) => write!(f, "TLS error: {}", msg),
			TransportError::Http { url, message } => write!(f, "HTTP error for {}: {}", url, message),
			TransportError::HttpStatus { url, status } => {
				write!(f, "HTTP status {} from {}", status, url)
			}
			TransportError::Protocol(e) => write!(f, "Protocol error: {}", e),
			TransportError::LocalFile { path, source } => {
				write!(f, "Local file {}: {}", path.display(), source)
			}
			TransportError::Bind { addr, source } => write!(f, "Cannot bind {}: {}", addr, source),
		}
	}
}

impl Error for TransportError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			TransportError::UnresolvedHost { source, .. } => Some(source),
			TransportError::Connect { source, .. } => Some(source.as_ref()),
			TransportError::Io { source, .. } => Some(source),
			TransportError::Protocol(e) => Some(e),
			TransportError::LocalFile { source, .. } => Some(source),
			TransportError::Bind { source, .. } => Some(source),
			_ => None,
		}
	}
}

impl From<ProtocolError> for TransportError {
	fn from(e: ProtocolError) -> Self {
		TransportError::Protocol(e)
	}
}

impl TransportError {
	/// Wrap an I/O error raised while talking to `host:port`
	///
	/// Timeouts surfaced as `io::ErrorKind::TimedOut` by the chunked copy
	/// helpers are mapped onto [`TransportError::Timeout`].
	pub fn io(host: &str, port: u16, source: io::Error, timeout: Duration) -> Self {
		if source.kind() == io::ErrorKind::TimedOut {
			TransportError::Timeout { host: host.to_string(), port, after: timeout }
		} else {
			TransportError::Io { host: host.to_string(), port, source }
		}
	}

	/// Wrap a protocol error raised while talking to `host:port`
	pub fn protocol(host: &str, port: u16, e: ProtocolError, timeout: Duration) -> Self {
		match e {
			ProtocolError::Io(source) => TransportError::io(host, port, source, timeout),
			other => TransportError::Protocol(other),
		}
	}

	/// True for failures that mean the peer could not be reached at all
	pub fn is_unreachable(&self) -> bool {
		matches!(
			self,
			TransportError::UnresolvedHost { .. }
				| TransportError::Connect { .. }
				| TransportError::Timeout { .. }
		)
	}
}

/// File storage backend errors
#[derive(Debug)]
pub enum StorageError {
	/// I/O failure in the backend
	Io(io::Error),

	/// File name or id that cannot be mapped onto the backend
	InvalidName(String),
}

impl fmt::Display for StorageError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StorageError::Io(e) => write!(f, "Storage I/O error: {}", e),
			StorageError::InvalidName(name) => write!(f, "Invalid file name: {:?}", name),
		}
	}
}

impl Error for StorageError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			StorageError::Io(e) => Some(e),
			StorageError::InvalidName(_) => None,
		}
	}
}

impl From<io::Error> for StorageError {
	fn from(e: io::Error) -> Self {
		StorageError::Io(e)
	}
}

impl From<tempfile::PathPersistError> for StorageError {
	fn from(e: tempfile::PathPersistError) -> Self {
		StorageError::Io(e.error)
	}
}

/// Configuration loading and startup errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: PathBuf, source: io::Error },

	/// Config file could not be parsed
	Parse { path: PathBuf, message: String },

	/// A value failed validation
	Invalid(String),

	/// TLS material could not be loaded
	Tls(String),

	/// No dispatcher constructor is registered under this name
	UnknownDispatcher(String),

	/// No storage constructor is registered under this name
	UnknownStorage(String),
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "Cannot read config {}: {}", path.display(), source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Cannot parse config {}: {}", path.display(), message)
			}
			ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
			ConfigError::Tls(msg) => write!(f, "TLS configuration error: {}", msg),
			ConfigError::UnknownDispatcher(name) => write!(f, "Unknown dispatcher: {}", name),
			ConfigError::UnknownStorage(name) => write!(f, "Unknown file storage: {}", name),
		}
	}
}

impl Error for ConfigError {}

impl From<ValidationError> for ConfigError {
	fn from(e: ValidationError) -> Self {
		ConfigError::Invalid(e.to_string())
	}
}

impl From<TransportError> for ConfigError {
	fn from(e: TransportError) -> Self {
		ConfigError::Tls(e.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_transport_error_mentions_endpoint() {
		let err = TransportError::Connect {
			host: "backend.local".to_string(),
			port: 9777,
			source: Box::new(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
		};
		let msg = err.to_string();
		assert!(msg.contains("backend.local:9777"));
		assert!(err.is_unreachable());
	}

	#[test]
	fn test_timed_out_io_maps_to_timeout() {
		let err = TransportError::io(
			"h",
			1,
			io::Error::new(io::ErrorKind::TimedOut, "slow"),
			Duration::from_millis(250),
		);
		assert!(matches!(err, TransportError::Timeout { .. }));
		assert!(err.to_string().contains("250 ms"));
	}

	#[test]
	fn test_protocol_io_is_unwrapped() {
		let err = TransportError::protocol(
			"h",
			1,
			ProtocolError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone")),
			Duration::from_secs(1),
		);
		assert!(matches!(err, TransportError::Io { .. }));
	}

	#[test]
	fn test_validation_error_converts() {
		let err: ConfigError = ValidationError::ConfigError("port".to_string()).into();
		assert!(err.to_string().contains("port"));
	}
}

// vim: ts=4
