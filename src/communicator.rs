//! Client-side command transport
//!
//! A [`Communicator`] sends each command over one of two wire paths picked
//! by [`select_route`]:
//!
//! - a socket (plain or TLS) carrying length-prefixed transfer lines
//! - an HTTP/HTTPS POST carrying the command as JSON
//!
//! Transport settings live in an immutable [`ClientSettings`] snapshot that
//! [`Communicator::reload`] replaces as a whole. Every call captures the
//! snapshot once at its start and uses it until it returns.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{ConfigError, TransportError};
use crate::files::{Delete, Download, Upload};
use crate::logging::*;
use crate::protocol::framing;
use crate::protocol::{Answer, AnswerStatus, Command, ProtocolError, TransportMode, DEFAULT_TIMEOUT_MS};
use crate::transport::{tls, BoxedStream, ClientSocketFactory};

/// User agent of tunnel requests
pub const USER_AGENT: &str = "cmdlink-client";

/// Content type of tunnel request bodies
pub const CONTENT_TYPE_JSON_UTF8: &str = "application/json; charset=UTF-8";

// ============================================================================
// ROUTING
// ============================================================================

/// Wire path of one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
	Socket,
	Tunnel,
}

impl Route {
	/// Port the command is actually sent to on this route
	pub fn port(self, cmd: &Command, settings: &ClientSettings) -> u16 {
		match self {
			Route::Socket => cmd.port,
			Route::Tunnel => settings.web_port,
		}
	}
}

/// Pick the wire path for `cmd`
///
/// With `web_override` every command goes through the tunnel. Otherwise
/// only module commands in `web` mode that are not forced onto sockets do.
pub fn select_route(cmd: &Command, web_override: bool) -> Route {
	if web_override {
		return Route::Tunnel;
	}
	if !cmd.is_internal() && cmd.mode == TransportMode::Web && !cmd.force_sockets {
		Route::Tunnel
	} else {
		Route::Socket
	}
}

/// Timeout of one call, identical for both wire paths
///
/// A global client timeout (seconds) wins over the command's own timeout
/// (milliseconds).
pub fn resolve_timeout(cmd: &Command, client_timeout_secs: Option<u64>) -> Duration {
	match client_timeout_secs {
		Some(secs) => Duration::from_millis(secs.saturating_mul(1000)),
		None if cmd.timeout_ms > 0 => Duration::from_millis(cmd.timeout_ms),
		None => Duration::from_millis(DEFAULT_TIMEOUT_MS),
	}
}

// ============================================================================
// SETTINGS SNAPSHOT
// ============================================================================

/// Everything a call needs to reach the server, built once per (re)load
pub struct ClientSettings {
	pub server_name: String,
	pub host: String,
	pub admin_port: u16,
	pub web_port: u16,
	pub mode: TransportMode,
	pub default_timeout_ms: u64,
	pub client_timeout_secs: Option<u64>,
	pub web_override: bool,
	pub max_message_size: usize,
	pub buffer_size: usize,
	pub socket_factory: ClientSocketFactory,
	pub https: bool,
	pub tunnel_endpoint: String,
	pub api_key_name: String,
	pub api_key: String,
	pub http: reqwest::Client,
}

impl ClientSettings {
	pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
		let socket_factory = ClientSocketFactory::from_settings(&config.tls)?;

		let mut http = reqwest::Client::builder()
			.use_rustls_tls()
			.user_agent(USER_AGENT)
			.connect_timeout(Duration::from_millis(config.default_timeout_ms()));
		if config.https {
			let pem = tls::load_ca_pem(&config.tls)?;
			let cert = reqwest::Certificate::from_pem(&pem)
				.map_err(|e| ConfigError::Tls(format!("invalid CA certificate: {}", e)))?;
			http = http.add_root_certificate(cert);
		}
		let http = http
			.build()
			.map_err(|e| ConfigError::Tls(format!("cannot build HTTP client: {}", e)))?;

		Ok(ClientSettings {
			server_name: config.server_name.clone(),
			host: config.host.clone(),
			admin_port: config.admin_port,
			web_port: config.web_port,
			mode: config.mode,
			default_timeout_ms: config.default_timeout_ms(),
			client_timeout_secs: config.client_timeout_secs,
			web_override: config.web_override,
			max_message_size: config.max_message_size,
			buffer_size: config.file_server.buffer_size(),
			socket_factory,
			https: config.https,
			tunnel_endpoint: config.tunnel.endpoint.clone(),
			api_key_name: config.tunnel.api_key_name.clone(),
			api_key: config.resolved_api_key()?,
			http,
		})
	}

	/// Fill in routing fields the caller left empty
	pub fn stamp(&self, mut cmd: Command) -> Command {
		if cmd.server_name.is_empty() {
			cmd.server_name = self.server_name.clone();
		}
		if cmd.host.is_empty() {
			cmd.host = self.host.clone();
			cmd.mode = self.mode;
		}
		if cmd.port == 0 {
			cmd.port = self.admin_port;
		}
		if cmd.timeout_ms == 0 {
			cmd.timeout_ms = self.default_timeout_ms;
		}
		cmd
	}

	/// `http(s)://host:webPort/endpoint`
	pub fn tunnel_url(&self, host: &str) -> String {
		let scheme = if self.https { "https" } else { "http" };
		format!("{}://{}:{}/{}", scheme, host, self.web_port, self.tunnel_endpoint)
	}
}

// ============================================================================
// TRANSPORTS
// ============================================================================

/// One wire path
#[async_trait]
pub trait Transport: Send + Sync {
	async fn send(&self, cmd: &Command, settings: &ClientSettings) -> Result<Answer, TransportError>;
}

async fn with_limit<T, F>(host: &str, port: u16, limit: Duration, fut: F) -> Result<T, TransportError>
where
	F: Future<Output = Result<T, ProtocolError>>,
{
	match timeout(limit, fut).await {
		Ok(result) => result.map_err(|e| TransportError::protocol(host, port, e, limit)),
		Err(_) => Err(TransportError::Timeout { host: host.to_string(), port, after: limit }),
	}
}

/// Length-prefixed transfer lines over a plain or TLS socket
pub struct SocketTransport;

impl SocketTransport {
	async fn open(
		cmd: &Command,
		settings: &ClientSettings,
		limit: Duration,
	) -> Result<BoxedStream, TransportError> {
		let mut stream = settings.socket_factory.connect(&cmd.host, cmd.port, limit).await?;
		with_limit(&cmd.host, cmd.port, limit, framing::write_command(&mut stream, cmd)).await?;
		Ok(stream)
	}
}

#[async_trait]
impl Transport for SocketTransport {
	async fn send(&self, cmd: &Command, settings: &ClientSettings) -> Result<Answer, TransportError> {
		let limit = resolve_timeout(cmd, settings.client_timeout_secs);
		let mut stream = SocketTransport::open(cmd, settings, limit).await?;

		// the server may already be gone by the time an answer could be written
		if cmd.is_stop() {
			return Ok(Answer::stop());
		}
		if cmd.is_health() {
			let reply = timeout(limit, framing::read_answer(&mut stream, settings.max_message_size)).await;
			return Ok(match reply {
				Ok(Ok(answer)) if answer.status == AnswerStatus::Health => answer,
				_ => Answer::health(),
			});
		}

		let answer = with_limit(
			&cmd.host,
			cmd.port,
			limit,
			framing::read_answer(&mut stream, settings.max_message_size),
		)
		.await?;
		let _ = stream.shutdown().await;
		Ok(answer)
	}
}

/// JSON commands POSTed to the tunnel endpoint
pub struct HttpTunnelTransport;

fn http_error(
	host: &str,
	port: u16,
	url: &str,
	e: reqwest::Error,
	limit: Duration,
) -> TransportError {
	if e.is_timeout() {
		TransportError::Timeout { host: host.to_string(), port, after: limit }
	} else if e.is_connect() {
		TransportError::Connect { host: host.to_string(), port, source: Box::new(e) }
	} else {
		TransportError::Http { url: url.to_string(), message: e.to_string() }
	}
}

#[async_trait]
impl Transport for HttpTunnelTransport {
	async fn send(&self, cmd: &Command, settings: &ClientSettings) -> Result<Answer, TransportError> {
		let limit = resolve_timeout(cmd, settings.client_timeout_secs);
		let port = settings.web_port;
		let url = settings.tunnel_url(&cmd.host);
		let body = cmd.to_json()?;

		let response = settings
			.http
			.post(&url)
			.query(&[(settings.api_key_name.as_str(), settings.api_key.as_str())])
			.header(ACCEPT, "application/json")
			.header(CONTENT_TYPE, CONTENT_TYPE_JSON_UTF8)
			.timeout(limit)
			.body(body)
			.send()
			.await
			.map_err(|e| http_error(&cmd.host, port, &url, e, limit))?;

		let status = response.status();
		if status != StatusCode::OK && status != StatusCode::NO_CONTENT {
			return Err(TransportError::HttpStatus { url, status: status.as_u16() });
		}

		if cmd.is_stop() {
			return Ok(Answer::stop());
		}
		if cmd.is_health() {
			let answer = match response.text().await {
				Ok(text) => Answer::from_json(&text).ok().filter(|a| a.status == AnswerStatus::Health),
				Err(_) => None,
			};
			return Ok(answer.unwrap_or_else(Answer::health));
		}

		let text = response.text().await.map_err(|e| http_error(&cmd.host, port, &url, e, limit))?;
		Ok(Answer::from_json(&text)?)
	}
}

// ============================================================================
// COMMUNICATOR
// ============================================================================

/// Sends commands and files to the server
pub struct Communicator {
	settings: RwLock<Arc<ClientSettings>>,
	socket: Arc<dyn Transport>,
	tunnel: Arc<dyn Transport>,
}

impl Communicator {
	pub fn new(config: &Config) -> Result<Self, ConfigError> {
		Ok(Communicator::with_transports(
			ClientSettings::from_config(config)?,
			Arc::new(SocketTransport),
			Arc::new(HttpTunnelTransport),
		))
	}

	/// Communicator with custom wire paths
	pub fn with_transports(
		settings: ClientSettings,
		socket: Arc<dyn Transport>,
		tunnel: Arc<dyn Transport>,
	) -> Self {
		Communicator { settings: RwLock::new(Arc::new(settings)), socket, tunnel }
	}

	/// Current settings snapshot
	pub fn settings(&self) -> Arc<ClientSettings> {
		match self.settings.read() {
			Ok(guard) => Arc::clone(&guard),
			Err(poisoned) => Arc::clone(&poisoned.into_inner()),
		}
	}

	/// Replace the transport settings
	///
	/// The new snapshot is fully built before it is swapped in, so a failed
	/// reload leaves the previous settings active. Calls already in flight
	/// finish with the snapshot they started with.
	pub fn reload(&self, config: &Config) -> Result<(), ConfigError> {
		config.validate()?;
		let next = Arc::new(ClientSettings::from_config(config)?);
		let (tls, https) = (next.socket_factory.is_tls(), next.https);

		let mut guard = match self.settings.write() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		*guard = next;
		drop(guard);

		info!("Transport configuration reloaded (tls: {}, https: {})", tls, https);
		Ok(())
	}

	/// Send `cmd` and return the server's answer
	///
	/// STOP always yields a stop answer, even when the server cannot be
	/// reached. Other transport failures are logged and returned.
	pub async fn send_command(&self, cmd: &Command) -> Result<Answer, TransportError> {
		let settings = self.settings();
		let cmd = settings.stamp(cmd.clone());
		let route = select_route(&cmd, settings.web_override);
		let transport = match route {
			Route::Socket => &self.socket,
			Route::Tunnel => &self.tunnel,
		};
		let port = route.port(&cmd, &settings);
		debug!("Sending {} to {}:{} via {:?}", cmd.name, cmd.host, port, route);

		match transport.send(&cmd, &settings).await {
			Ok(answer) => Ok(answer),
			Err(e) if cmd.is_stop() => {
				warn!("Stop request to {}:{} not delivered: {}", cmd.host, port, e);
				Ok(Answer::stop().with_entity(format!("server unreachable: {}", e)))
			}
			Err(e) => {
				error!("Command {} to {}:{} failed: {}", cmd.name, cmd.host, port, e);
				Err(e)
			}
		}
	}

	pub async fn stop(&self) -> Result<Answer, TransportError> {
		self.send_command(&Command::stop()).await
	}

	pub async fn health(&self) -> Result<Answer, TransportError> {
		self.send_command(&Command::health()).await
	}

	/// Stream a local file to the server's file storage
	pub async fn upload(&self, upload: &Upload) -> Result<Answer, TransportError> {
		let settings = self.settings();
		let cmd = settings.stamp(upload.to_command());
		let limit = resolve_timeout(&cmd, settings.client_timeout_secs);

		let source = upload.source().ok_or_else(|| TransportError::LocalFile {
			path: PathBuf::from(upload.file_name()),
			source: io::Error::new(io::ErrorKind::InvalidInput, "upload has no source file"),
		})?;
		let mut file = tokio::fs::File::open(source)
			.await
			.map_err(|e| TransportError::LocalFile { path: source.to_path_buf(), source: e })?;

		let result: Result<Answer, TransportError> = async {
			let mut stream = SocketTransport::open(&cmd, &settings, limit).await?;
			framing::copy_exact(&mut file, &mut stream, upload.size(), settings.buffer_size, limit)
				.await
				.map_err(|e| match e.kind() {
					io::ErrorKind::UnexpectedEof => {
						TransportError::LocalFile { path: source.to_path_buf(), source: e }
					}
					_ => TransportError::io(&cmd.host, cmd.port, e, limit),
				})?;
			with_limit(
				&cmd.host,
				cmd.port,
				limit,
				framing::read_answer(&mut stream, settings.max_message_size),
			)
			.await
		}
		.await;

		match &result {
			Ok(answer) if answer.is_success() => {
				info!("Uploaded {} ({} bytes) as {:?}", upload.file_name(), upload.size(), answer.file_id())
			}
			Ok(answer) => warn!("Upload of {} refused: {:?} {}", upload.file_name(), answer.failure, answer.entity),
			Err(e) => error!("Upload of {} to {}:{} failed: {}", upload.file_name(), cmd.host, cmd.port, e),
		}
		result
	}

	/// Fetch a stored file into `dest`
	///
	/// `dest` is only created once every byte has arrived. A `FileNok`
	/// answer (e.g. not found) is returned as is and leaves `dest` untouched.
	pub async fn download(
		&self,
		file_id: &str,
		domain: Option<String>,
		dest: &Path,
	) -> Result<Answer, TransportError> {
		let settings = self.settings();
		let cmd = settings.stamp(Download::request(file_id, domain));
		let limit = resolve_timeout(&cmd, settings.client_timeout_secs);
		let local_err = |source: io::Error| TransportError::LocalFile { path: dest.to_path_buf(), source };

		let result: Result<Answer, TransportError> = async {
			let mut stream = SocketTransport::open(&cmd, &settings, limit).await?;
			let answer = with_limit(
				&cmd.host,
				cmd.port,
				limit,
				framing::read_answer(&mut stream, settings.max_message_size),
			)
			.await?;
			if answer.status != AnswerStatus::FileOk {
				return Ok(answer);
			}

			let dir = match dest.parent() {
				Some(parent) if !parent.as_os_str().is_empty() => parent,
				_ => Path::new("."),
			};
			let temp = tempfile::Builder::new()
				.prefix(".cmdlink-")
				.tempfile_in(dir)
				.map_err(local_err)?
				.into_temp_path();
			let mut file = tokio::fs::File::create(&temp).await.map_err(local_err)?;
			framing::copy_exact(&mut stream, &mut file, answer.data_length, settings.buffer_size, limit)
				.await
				.map_err(|e| TransportError::io(&cmd.host, cmd.port, e, limit))?;
			drop(file);
			temp.persist(dest).map_err(|e| local_err(e.error))?;
			Ok(answer)
		}
		.await;

		if let Err(e) = &result {
			error!("Download of {} from {}:{} failed: {}", file_id, cmd.host, cmd.port, e);
		}
		result
	}

	/// Remove a stored file; the answer is successful when something was removed
	pub async fn delete(&self, file_id: &str, domain: Option<String>) -> Result<Answer, TransportError> {
		self.send_command(&Delete::new(file_id, domain).to_command()).await
	}
}


// vim: ts=4
