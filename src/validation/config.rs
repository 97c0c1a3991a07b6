//! Configuration validation functions

use super::ValidationError;
use crate::config::TlsSettings;
use crate::protocol::MSG_PART_SEPARATOR;

/// Validate timeout in seconds
pub fn validate_timeout_secs(timeout_secs: u64) -> Result<(), ValidationError> {
	if timeout_secs == 0 {
		return Err(ValidationError::ConfigError("Timeout must be greater than 0".to_string()));
	}
	if timeout_secs > 3600 {
		return Err(ValidationError::ConfigError(format!(
			"Timeout too large: {} seconds (max 3600)",
			timeout_secs
		)));
	}
	Ok(())
}

/// Validate the server name stamped on commands
///
/// It travels as a field of the transfer line, so it must not contain the
/// field separator or a line break.
pub fn validate_server_name(name: &str) -> Result<(), ValidationError> {
	if name.is_empty() {
		return Err(ValidationError::ConfigError("Server name must not be empty".to_string()));
	}
	if name.contains(MSG_PART_SEPARATOR) || name.contains('\n') {
		return Err(ValidationError::ConfigError(format!("Server name {:?} is not encodable", name)));
	}
	Ok(())
}

/// Validate the transfer line size limit
pub fn validate_max_message_size(size: usize) -> Result<(), ValidationError> {
	if size < 1024 {
		return Err(ValidationError::ConfigError(format!(
			"maxMessageSize must be at least 1024 bytes, got {}",
			size
		)));
	}
	if size > u32::MAX as usize {
		return Err(ValidationError::ConfigError(format!(
			"maxMessageSize does not fit the 4-byte length prefix: {}",
			size
		)));
	}
	Ok(())
}

/// Validate the tunnel endpoint path segment
pub fn validate_endpoint(endpoint: &str) -> Result<(), ValidationError> {
	if endpoint.is_empty() {
		return Err(ValidationError::ConfigError("Tunnel endpoint must not be empty".to_string()));
	}
	if endpoint.starts_with('/') || endpoint.contains('?') || endpoint.contains(char::is_whitespace)
	{
		return Err(ValidationError::ConfigError(format!(
			"Tunnel endpoint {:?} must be a bare path without leading slash or query",
			endpoint
		)));
	}
	Ok(())
}

/// Validate that TLS material is present when TLS or HTTPS is on
pub fn validate_tls(tls: &TlsSettings, https: bool) -> Result<(), ValidationError> {
	if !tls.enabled && !https {
		return Ok(());
	}
	let paths = [("certPath", &tls.cert_path), ("keyPath", &tls.key_path), ("caPath", &tls.ca_path)];
	for (key, path) in paths.iter() {
		match path {
			None => {
				return Err(ValidationError::ConfigError(format!(
					"tls.{} is required when TLS or HTTPS is enabled",
					key
				)))
			}
			Some(path) if !path.exists() => {
				return Err(ValidationError::PathError(format!(
					"tls.{} does not exist: {}",
					key,
					path.display()
				)))
			}
			Some(_) => {}
		}
	}
	for protocol in &tls.protocols {
		match protocol.as_str() {
			"TLSv1.2" | "TLSv1.3" => {}
			other => {
				return Err(ValidationError::ConfigError(format!(
					"Unsupported TLS protocol {:?} (expected TLSv1.2 or TLSv1.3)",
					other
				)))
			}
		}
	}
	Ok(())
}


// vim: ts=4
