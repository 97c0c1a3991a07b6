//! Unified configuration for both ends of the link
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, or `.json`/`.json5`)
//! 3. Environment variables (CMDLINK_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)
//!
//! The same file configures the server (what to bind, which dispatchers and
//! storage to load) and the client (where to send commands and how).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::protocol::framing::{DEFAULT_BUFFER_SIZE, DEFAULT_MAX_MESSAGE_SIZE};
use crate::protocol::{Command, TransportMode, DEFAULT_TIMEOUT_MS};
use crate::secret;
use crate::validation;

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "CMDLINK_";

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// IDENTITY & ENDPOINTS
	// ========================================================================
	/// Name stamped on every command; the server ignores commands for other names
	pub server_name: String,

	/// Host the client talks to (and the server binds)
	pub host: String,

	/// Port of the admin socket
	pub admin_port: u16,

	/// Port of the HTTP tunnel
	pub web_port: u16,

	// ========================================================================
	// TRANSPORT
	// ========================================================================
	/// Preferred wire path for module commands
	pub mode: TransportMode,

	/// Route every command through the HTTP tunnel
	pub web_override: bool,

	/// Default per-command timeout in seconds
	pub connection_timeout_secs: u64,

	/// Global client timeout in seconds, overriding the per-command timeout
	pub client_timeout_secs: Option<u64>,

	/// Read timeout for a server-side connection
	pub server_timeout_secs: u64,

	/// Largest accepted transfer line in bytes
	pub max_message_size: usize,

	/// TLS for the admin socket
	pub tls: TlsSettings,

	/// Use HTTPS for the tunnel (same certificate material as `tls`)
	pub https: bool,

	/// HTTP tunnel endpoint and credentials
	pub tunnel: TunnelSettings,

	/// Application secret that encrypted config values are sealed with
	#[serde(skip_serializing)]
	pub secret_key: String,

	// ========================================================================
	// SERVER MODULES
	// ========================================================================
	/// Dispatcher names to register at startup
	pub dispatchers: Vec<String>,

	/// File server and its storage backend
	pub file_server: FileServerSettings,

	/// Log records kept in memory for the log dispatcher
	pub log_buffer_capacity: usize,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			server_name: "cmdlink".to_string(),
			host: "localhost".to_string(),
			admin_port: 9777,
			web_port: 8080,

			mode: TransportMode::Sockets,
			web_override: false,
			connection_timeout_secs: DEFAULT_TIMEOUT_MS / 1000,
			client_timeout_secs: None,
			server_timeout_secs: 30,
			max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
			tls: TlsSettings::default(),
			https: false,
			tunnel: TunnelSettings::default(),
			secret_key: String::new(),

			dispatchers: vec!["log".to_string()],
			file_server: FileServerSettings::default(),
			log_buffer_capacity: 1000,
		}
	}
}

// ============================================================================
// NESTED CONFIGURATION STRUCTS
// ============================================================================

/// Certificate material for the admin socket and HTTPS tunnel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TlsSettings {
	pub enabled: bool,

	/// PEM certificate chain presented by the server
	pub cert_path: Option<PathBuf>,

	/// PEM private key of the server
	pub key_path: Option<PathBuf>,

	/// PEM trust anchors the client verifies the server against
	pub ca_path: Option<PathBuf>,

	/// Explicit protocol list (`TLSv1.2`, `TLSv1.3`); empty means all supported
	pub protocols: Vec<String>,
}

impl Default for TlsSettings {
	fn default() -> Self {
		TlsSettings { enabled: false, cert_path: None, key_path: None, ca_path: None, protocols: vec![] }
	}
}

/// HTTP tunnel endpoint and API key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TunnelSettings {
	/// Serve the tunnel endpoint on the server side
	pub enabled: bool,

	/// Path segment of the endpoint, without leading slash
	pub endpoint: String,

	/// Query parameter carrying the API key
	pub api_key_name: String,

	pub api_key: String,

	/// `api_key` is stored encrypted with the application `secretKey`
	pub api_key_encoded: bool,
}

impl Default for TunnelSettings {
	fn default() -> Self {
		TunnelSettings {
			enabled: false,
			endpoint: "srvcmd".to_string(),
			api_key_name: "apiKey".to_string(),
			api_key: String::new(),
			api_key_encoded: false,
		}
	}
}

/// Server-side file transfer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FileServerSettings {
	pub enabled: bool,

	/// Registered storage backend name
	pub storage: String,

	/// Root directory of the storage backend
	pub location: PathBuf,

	/// Chunk size of raw file streams in KiB
	pub buffer_size_kb: usize,
}

impl Default for FileServerSettings {
	fn default() -> Self {
		FileServerSettings {
			enabled: true,
			storage: "filesystem".to_string(),
			location: PathBuf::from("files"),
			buffer_size_kb: DEFAULT_BUFFER_SIZE / 1024,
		}
	}
}

impl FileServerSettings {
	pub fn buffer_size(&self) -> usize {
		self.buffer_size_kb.max(1) * 1024
	}
}

// ============================================================================
// LOADING
// ============================================================================

impl Config {
	/// Defaults, then `path` if given, then environment overrides, then validation
	pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
		let mut config = match path {
			Some(path) => Config::from_file(path)?,
			None => Config::default(),
		};
		config.apply_env_overrides(std::env::vars())?;
		config.validate()?;
		Ok(config)
	}

	/// Parse a TOML or JSON5 file; missing keys keep their defaults
	pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
		let content = std::fs::read_to_string(path)
			.map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
		let parse_error =
			|message: String| ConfigError::Parse { path: path.to_path_buf(), message };

		match path.extension().and_then(|e| e.to_str()) {
			Some("json") | Some("json5") => {
				json5::from_str(&content).map_err(|e| parse_error(e.to_string()))
			}
			_ => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
		}
	}

	/// Apply `CMDLINK_*` variables from `vars`
	pub fn apply_env_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
	where
		I: IntoIterator<Item = (String, String)>,
	{
		for (key, value) in vars {
			let name = match key.strip_prefix(ENV_PREFIX) {
				Some(name) => name,
				None => continue,
			};
			match name {
				"SERVER_NAME" => self.server_name = value,
				"HOST" => self.host = value,
				"ADMIN_PORT" => self.admin_port = parse_env(&key, &value)?,
				"WEB_PORT" => self.web_port = parse_env(&key, &value)?,
				"MODE" => {
					self.mode = match value.to_ascii_lowercase().as_str() {
						"web" => TransportMode::Web,
						"sockets" => TransportMode::Sockets,
						_ => return Err(ConfigError::Invalid(format!("{}={}", key, value))),
					}
				}
				"WEB_OVERRIDE" => self.web_override = parse_env(&key, &value)?,
				"CLIENT_TIMEOUT" => self.client_timeout_secs = Some(parse_env(&key, &value)?),
				"TLS" => self.tls.enabled = parse_env(&key, &value)?,
				"HTTPS" => self.https = parse_env(&key, &value)?,
				"API_KEY" => self.tunnel.api_key = value,
				"SECRET_KEY" => self.secret_key = value,
				"STORAGE_LOCATION" => self.file_server.location = PathBuf::from(value),
				_ => {}
			}
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		validation::validate_server_name(&self.server_name)?;
		validation::validate_timeout_secs(self.connection_timeout_secs)?;
		if let Some(secs) = self.client_timeout_secs {
			validation::validate_timeout_secs(secs)?;
		}
		validation::validate_timeout_secs(self.server_timeout_secs)?;
		validation::validate_max_message_size(self.max_message_size)?;
		validation::validate_endpoint(&self.tunnel.endpoint)?;
		validation::validate_tls(&self.tls, self.https)?;
		self.resolved_api_key()?;
		Ok(())
	}

	/// Plain tunnel API key, decrypted when stored encrypted
	pub fn resolved_api_key(&self) -> Result<String, ConfigError> {
		if !self.tunnel.api_key_encoded {
			return Ok(self.tunnel.api_key.clone());
		}
		secret::decrypt_value(&self.tunnel.api_key, &self.secret_key)
	}

	/// Default per-command timeout in milliseconds
	pub fn default_timeout_ms(&self) -> u64 {
		self.connection_timeout_secs.saturating_mul(1000)
	}

	/// New command stamped with this configuration's server name and endpoint
	pub fn new_command(&self, dispatcher_id: &str, name: &str) -> Command {
		Command::new(dispatcher_id, name)
			.with_server_name(self.server_name.clone())
			.routed_to(self.host.clone(), self.admin_port, self.mode)
			.with_timeout_ms(self.default_timeout_ms())
	}
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
	value
		.trim()
		.parse()
		.map_err(|_| ConfigError::Invalid(format!("cannot parse {}={}", key, value)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_config_default() {
		let config = Config::default();
		assert_eq!(config.admin_port, 9777);
		assert_eq!(config.connection_timeout_secs, 5);
		assert_eq!(config.max_message_size, 512 * 1024);
		assert_eq!(config.tunnel.endpoint, "srvcmd");
		assert_eq!(config.file_server.buffer_size(), 32 * 1024);
		assert!(config.client_timeout_secs.is_none());
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_config_serialization() {
		let config = Config::default();
		let json = serde_json::to_string(&config).expect("Failed to serialize");
		assert!(json.contains("\"adminPort\":9777"));
		let deserialized: Config = serde_json::from_str(&json).expect("Failed to deserialize");
		assert_eq!(config.server_name, deserialized.server_name);
		assert_eq!(config.tunnel, deserialized.tunnel);
	}

	#[test]
	fn test_env_overrides() {
		let mut config = Config::default();
		let vars = vec![
			("CMDLINK_HOST".to_string(), "backend.internal".to_string()),
			("CMDLINK_ADMIN_PORT".to_string(), "9900".to_string()),
			("CMDLINK_MODE".to_string(), "web".to_string()),
			("CMDLINK_CLIENT_TIMEOUT".to_string(), "12".to_string()),
			("UNRELATED".to_string(), "x".to_string()),
		];
		config.apply_env_overrides(vars).unwrap();
		assert_eq!(config.host, "backend.internal");
		assert_eq!(config.admin_port, 9900);
		assert_eq!(config.mode, TransportMode::Web);
		assert_eq!(config.client_timeout_secs, Some(12));
	}

	#[test]
	fn test_env_override_bad_value() {
		let mut config = Config::default();
		let vars = vec![("CMDLINK_ADMIN_PORT".to_string(), "not-a-port".to_string())];
		assert!(config.apply_env_overrides(vars).is_err());
	}

	#[test]
	fn test_encrypted_api_key() {
		let mut config = Config { secret_key: "app-key".into(), ..Config::default() };
		config.tunnel.api_key = secret::encrypt_value("s3cret", "app-key").unwrap();
		config.tunnel.api_key_encoded = true;
		assert_eq!(config.resolved_api_key().unwrap(), "s3cret");

		let wrong_key = Config { secret_key: "other".into(), ..config.clone() };
		assert!(wrong_key.resolved_api_key().is_err());

		let no_key = Config { secret_key: String::new(), ..config.clone() };
		assert!(matches!(no_key.validate(), Err(ConfigError::Invalid(_))));
	}

	#[test]
	fn test_secret_key_from_env_is_not_serialized() {
		let mut config = Config::default();
		let vars = vec![("CMDLINK_SECRET_KEY".to_string(), "app-key".to_string())];
		config.apply_env_overrides(vars).unwrap();
		assert_eq!(config.secret_key, "app-key");
		let json = serde_json::to_string(&config).unwrap();
		assert!(!json.contains("app-key"));
	}

	#[test]
	fn test_new_command_is_stamped() {
		let config = Config { server_name: "backend".into(), admin_port: 9901, ..Config::default() };
		let cmd = config.new_command("log", "LOG");
		assert_eq!(cmd.server_name, "backend");
		assert_eq!(cmd.port, 9901);
		assert_eq!(cmd.timeout_ms, 5000);
	}
}

// vim: ts=4
