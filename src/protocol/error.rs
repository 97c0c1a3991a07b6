//! Protocol error types
//!
//! Raised while framing, encoding or decoding commands and answers. Server
//! side these never escape a connection handler; they are turned into typed
//! failure answers instead.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error from async operations
	Io(io::Error),
	/// JSON encoding or decoding error
	Json(String),
	/// Base64 decoding error
	Base64(String),
	/// Frame length prefix exceeds the configured limit
	MessageTooLarge { size: usize, max: usize },
	/// Frame body was not followed by a line break
	MissingTerminator,
	/// Payload does not have the expected shape
	Malformed(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Json(msg) => write!(f, "JSON error: {}", msg),
			ProtocolError::Base64(msg) => write!(f, "Base64 decode error: {}", msg),
			ProtocolError::MessageTooLarge { size, max } => {
				write!(f, "Message of {} bytes exceeds the limit of {} bytes", size, max)
			}
			ProtocolError::MissingTerminator => write!(f, "Frame is not terminated by a line break"),
			ProtocolError::Malformed(msg) => write!(f, "Malformed message: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ProtocolError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<base64::DecodeError> for ProtocolError {
	fn from(e: base64::DecodeError) -> Self {
		ProtocolError::Base64(e.to_string())
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Json(e.to_string())
	}
}

impl From<std::string::FromUtf8Error> for ProtocolError {
	fn from(e: std::string::FromUtf8Error) -> Self {
		ProtocolError::Malformed(format!("invalid UTF-8: {}", e))
	}
}

impl ProtocolError {
	/// True when the peer closed the stream before a complete frame arrived
	pub fn is_eof(&self) -> bool {
		matches!(self, ProtocolError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
	}
}

// vim: ts=4
