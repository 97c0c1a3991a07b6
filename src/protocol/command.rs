//! Command envelope sent from the client to the server

use serde::{Deserialize, Serialize};

use super::error::ProtocolError;
use super::line::{self, join_fields, optional, parse_u64, split_fields};

/// Dispatcher id reserved for built-in commands
pub const DISPATCHER_ID_INTERNAL: &str = "cmdlink-internal";

/// Request server shutdown
pub const CMD_STOP: &str = "STOP";
/// Liveness probe
pub const CMD_HEALTH: &str = "HEALTH";
/// Upload: the command is followed by `dataLength` raw bytes
pub const CMD_FILE_RECEIVE_REQUEST: &str = "FILE_RECEIVE_REQUEST";
/// Download: the answer is followed by `dataLength` raw bytes
pub const CMD_FILE_REQUEST: &str = "FILE_REQUEST";
/// Delete a stored file
pub const CMD_FILE_DELETE: &str = "FILE_DELETE";

/// Default per-command timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

/// Number of fixed fields in a command transfer line
const COMMAND_FIELDS: usize = 7;

/// Wire path a command prefers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransportMode {
	/// Length-prefixed line protocol over a (TLS) socket
	#[default]
	Sockets,
	/// JSON over an HTTP/HTTPS POST
	Web,
}

/// One request from the client to a server-side dispatcher
///
/// The routing fields (`host`, `port`, `mode`, `force_sockets`, `timeout_ms`)
/// only matter on the sending side and never travel over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
	/// Name of the server this command is meant for
	#[serde(default)]
	pub server_name: String,

	/// Target dispatcher, or [`DISPATCHER_ID_INTERNAL`]
	pub dispatcher_id: String,

	/// Command verb
	pub name: String,

	/// Single string payload slot
	#[serde(default)]
	pub entity: String,

	/// Length of the raw byte stream following the command (uploads)
	#[serde(default)]
	pub data_length: u64,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_id: Option<String>,

	/// File namespace; `None` means the default domain
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,

	/// Optional auxiliary value (e.g. the acting user)
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object: Option<serde_json::Value>,

	#[serde(skip)]
	pub host: String,

	#[serde(skip)]
	pub port: u16,

	#[serde(skip)]
	pub mode: TransportMode,

	#[serde(skip)]
	pub force_sockets: bool,

	#[serde(skip)]
	pub timeout_ms: u64,
}

impl Command {
	pub fn new(dispatcher_id: impl Into<String>, name: impl Into<String>) -> Self {
		Command {
			server_name: String::new(),
			dispatcher_id: dispatcher_id.into(),
			name: name.into(),
			entity: String::new(),
			data_length: 0,
			file_id: None,
			domain: None,
			object: None,
			host: String::new(),
			port: 0,
			mode: TransportMode::Sockets,
			force_sockets: false,
			timeout_ms: DEFAULT_TIMEOUT_MS,
		}
	}

	/// Built-in command handled without a registered dispatcher
	pub fn internal(name: impl Into<String>) -> Self {
		Command::new(DISPATCHER_ID_INTERNAL, name)
	}

	pub fn stop() -> Self {
		Command::internal(CMD_STOP)
	}

	pub fn health() -> Self {
		Command::internal(CMD_HEALTH)
	}

	pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
		self.entity = entity.into();
		self
	}

	pub fn with_data_length(mut self, data_length: u64) -> Self {
		self.data_length = data_length;
		self
	}

	pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
		self.file_id = Some(file_id.into());
		self
	}

	pub fn with_domain(mut self, domain: Option<String>) -> Self {
		self.domain = domain;
		self
	}

	pub fn with_object(mut self, object: serde_json::Value) -> Self {
		self.object = Some(object);
		self
	}

	pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
		self.server_name = server_name.into();
		self
	}

	/// Set where and how the command is sent
	pub fn routed_to(mut self, host: impl Into<String>, port: u16, mode: TransportMode) -> Self {
		self.host = host.into();
		self.port = port;
		self.mode = mode;
		self
	}

	pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
		self.timeout_ms = timeout_ms;
		self
	}

	/// Keep this command on the socket path even if its mode is `web`
	pub fn force_sockets(mut self) -> Self {
		self.force_sockets = true;
		self
	}

	pub fn is_internal(&self) -> bool {
		self.dispatcher_id == DISPATCHER_ID_INTERNAL
	}

	pub fn is_stop(&self) -> bool {
		self.is_internal() && self.name == CMD_STOP
	}

	pub fn is_health(&self) -> bool {
		self.is_internal() && self.name == CMD_HEALTH
	}

	/// Commands whose payload travels as a raw stream next to the frame
	pub fn is_file_stream(&self) -> bool {
		self.is_internal() && (self.name == CMD_FILE_RECEIVE_REQUEST || self.name == CMD_FILE_REQUEST)
	}

	/// Value of `key` when the verb is a `key=value|key=value` message
	pub fn message_value(&self, key: &str) -> Option<&str> {
		line::message_value(&self.name, key)
	}

	/// Encode as a delimited transfer line (without the line break)
	pub fn to_transfer_line(&self) -> Result<String, ProtocolError> {
		let data_length = self.data_length.to_string();
		join_fields(
			&[
				&self.server_name,
				&self.dispatcher_id,
				&self.name,
				&self.entity,
				&data_length,
				self.file_id.as_deref().unwrap_or(""),
				self.domain.as_deref().unwrap_or(""),
			],
			self.object.as_ref(),
		)
	}

	/// Decode a delimited transfer line
	pub fn parse_transfer_line(line: &str) -> Result<Command, ProtocolError> {
		let (fields, object) = split_fields(line, COMMAND_FIELDS)?;
		if fields[1].is_empty() || fields[2].is_empty() {
			return Err(ProtocolError::Malformed("command without dispatcher id or name".into()));
		}

		let mut cmd = Command::new(fields[1], fields[2])
			.with_server_name(fields[0])
			.with_entity(fields[3])
			.with_data_length(parse_u64(fields[4], "data length")?)
			.with_domain(optional(fields[6]));
		cmd.file_id = optional(fields[5]);
		cmd.object = object;
		Ok(cmd)
	}

	/// Encode as the JSON body of a tunnel request
	pub fn to_json(&self) -> Result<String, ProtocolError> {
		Ok(serde_json::to_string(self)?)
	}

	/// Decode the JSON body of a tunnel request
	pub fn from_json(json: &str) -> Result<Command, ProtocolError> {
		let mut cmd: Command = serde_json::from_str(json)?;
		cmd.timeout_ms = DEFAULT_TIMEOUT_MS;
		Ok(cmd)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_transfer_line_layout() {
		let cmd = Command::new("log", "LOG")
			.with_server_name("backend")
			.with_entity("all")
			.with_domain(Some("acme".into()));
		assert_eq!(cmd.to_transfer_line().unwrap(), "backend#|#log#|#LOG#|#all#|#0#|##|#acme");
	}

	#[test]
	fn test_transfer_line_keeps_wire_fields() {
		let cmd = Command::internal(CMD_FILE_RECEIVE_REQUEST)
			.with_server_name("backend")
			.with_entity("report.pdf:0f343b0931126a20f133d67c2b018a3b")
			.with_data_length(1024)
			.with_domain(Some("acme".into()))
			.with_object(json!("alice"))
			.routed_to("localhost", 9777, TransportMode::Sockets);

		let parsed = Command::parse_transfer_line(&cmd.to_transfer_line().unwrap()).unwrap();
		assert_eq!(parsed.entity, cmd.entity);
		assert_eq!(parsed.data_length, 1024);
		assert_eq!(parsed.domain.as_deref(), Some("acme"));
		assert_eq!(parsed.object, Some(json!("alice")));
		assert!(parsed.file_id.is_none());
		// routing never travels
		assert_eq!(parsed.host, "");
		assert_eq!(parsed.port, 0);
	}

	#[test]
	fn test_parse_rejects_missing_name() {
		assert!(Command::parse_transfer_line("backend#|#log#|##|##|#0#|##|#").is_err());
		assert!(Command::parse_transfer_line("garbage").is_err());
	}

	#[test]
	fn test_json_uses_camel_case_and_skips_routing() {
		let cmd = Command::internal(CMD_HEALTH)
			.with_server_name("backend")
			.routed_to("example.org", 8080, TransportMode::Web);
		let json = cmd.to_json().unwrap();
		assert!(json.contains("\"dispatcherId\":\"cmdlink-internal\""));
		assert!(json.contains("\"serverName\":\"backend\""));
		assert!(!json.contains("example.org"));

		let back = Command::from_json(&json).unwrap();
		assert!(back.is_health());
		assert_eq!(back.mode, TransportMode::Sockets);
	}

	#[test]
	fn test_classification() {
		assert!(Command::stop().is_stop());
		assert!(!Command::new("log", CMD_STOP).is_stop());
		assert!(Command::internal(CMD_FILE_REQUEST).is_file_stream());
		assert!(!Command::internal(CMD_FILE_DELETE).is_file_stream());
	}

	#[test]
	fn test_message_value_reads_verb() {
		let cmd = Command::new("log", "limit=5|level=warn");
		assert_eq!(cmd.message_value("limit"), Some("5"));
	}
}

// vim: ts=4
