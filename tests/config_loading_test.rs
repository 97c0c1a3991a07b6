/// Integration tests for configuration loading
/// Config files (TOML and JSON5) merged over the defaults, then validated
use std::fs;
use tempfile::TempDir;

use cmdlink::config::Config;
use cmdlink::error::ConfigError;
use cmdlink::logging::LogBuffer;
use cmdlink::protocol::TransportMode;
use cmdlink::secret::encrypt_value;
use cmdlink::server::Server;

#[test]
fn test_toml_config_overrides_defaults() {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let config_path = temp_dir.path().join("cmdlink.toml");
	let sealed_key = encrypt_value("s3cret", "app-key").expect("Failed to encrypt API key");
	fs::write(
		&config_path,
		format!(
			r#"
serverName = "backend-1"
host = "backend.internal"
adminPort = 9900
mode = "web"
clientTimeoutSecs = 12
dispatchers = ["log"]
secretKey = "app-key"

[tunnel]
endpoint = "api/srvcmd"
apiKey = "{}"
apiKeyEncoded = true

[fileServer]
location = "/var/lib/cmdlink"
bufferSizeKb = 64
"#,
			sealed_key
		),
	)
	.expect("Failed to write config file");

	let config = Config::from_file(&config_path).expect("Failed to parse TOML config");
	assert_eq!(config.server_name, "backend-1");
	assert_eq!(config.host, "backend.internal");
	assert_eq!(config.admin_port, 9900);
	assert_eq!(config.mode, TransportMode::Web);
	assert_eq!(config.client_timeout_secs, Some(12));
	assert_eq!(config.resolved_api_key().expect("Bad API key"), "s3cret");
	assert_eq!(config.file_server.buffer_size(), 64 * 1024);

	// untouched keys keep their defaults
	assert_eq!(config.web_port, 8080);
	assert_eq!(config.connection_timeout_secs, 5);
	assert!(config.validate().is_ok());
}

#[test]
fn test_json5_config() {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let config_path = temp_dir.path().join("cmdlink.json5");
	fs::write(
		&config_path,
		r#"{
		// comments are allowed
		serverName: "backend-2",
		webOverride: true,
		fileServer: { enabled: false },
	}"#,
	)
	.expect("Failed to write config file");

	let config = Config::from_file(&config_path).expect("Failed to parse JSON5 config");
	assert_eq!(config.server_name, "backend-2");
	assert!(config.web_override);
	assert!(!config.file_server.enabled);
}

#[test]
fn test_unparsable_config_names_the_file() {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let config_path = temp_dir.path().join("broken.toml");
	fs::write(&config_path, "adminPort = \"not a number\"").expect("Failed to write config file");

	match Config::from_file(&config_path) {
		Err(ConfigError::Parse { path, .. }) => assert_eq!(path, config_path),
		other => panic!("expected parse error, got {:?}", other.map(|c| c.admin_port)),
	}
}

#[test]
fn test_missing_config_file() {
	let result = Config::load(Some(std::path::Path::new("/nonexistent/cmdlink.toml")));
	assert!(matches!(result, Err(ConfigError::Read { .. })));
}

#[test]
fn test_encrypted_api_key_needs_secret_key() {
	let sealed_key = encrypt_value("s3cret", "app-key").expect("Failed to encrypt API key");
	let mut config = Config::default();
	config.tunnel.api_key = sealed_key;
	config.tunnel.api_key_encoded = true;
	assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

	config.secret_key = "app-key".to_string();
	assert!(config.validate().is_ok());
}

#[test]
fn test_tls_without_material_is_rejected() {
	let mut config = Config::default();
	config.tls.enabled = true;
	assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_unknown_dispatcher_fails_at_startup() {
	let temp_dir = TempDir::new().expect("Failed to create temp dir");
	let mut config = Config { dispatchers: vec!["log".to_string(), "crm".to_string()], ..Config::default() };
	config.file_server.location = temp_dir.path().join("store");

	match Server::from_config(config, LogBuffer::new(10)) {
		Err(ConfigError::UnknownDispatcher(name)) => assert_eq!(name, "crm"),
		Err(other) => panic!("unexpected error {}", other),
		Ok(_) => panic!("unknown dispatcher must fail"),
	}
}

#[test]
fn test_unknown_storage_fails_at_startup() {
	let mut config = Config::default();
	config.file_server.storage = "s3".to_string();

	match Server::from_config(config, LogBuffer::new(10)) {
		Err(ConfigError::UnknownStorage(name)) => assert_eq!(name, "s3"),
		Err(other) => panic!("unexpected error {}", other),
		Ok(_) => panic!("unknown storage must fail"),
	}
}

// vim: ts=4
