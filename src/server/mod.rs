//! Backend side of the link
//!
//! A [`Server`] owns the dispatcher registry and the file storage, binds
//! the admin socket (and the HTTP tunnel when enabled) and serves both
//! until a STOP command or a signal triggers shutdown.
//!
//! # Example Usage
//!
//! ```ignore
//! use cmdlink::config::Config;
//! use cmdlink::logging::LogBuffer;
//! use cmdlink::server::Server;
//!
//! let server = Server::from_config(Config::load(None)?, LogBuffer::new(1000))?;
//! let running = server.bind().await?;
//! running.wait().await;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::{Config, TlsSettings};
use crate::error::{ConfigError, TransportError};
use crate::logging::*;
use crate::storage::{FileStorage, StorageRegistry};
use crate::transport::ServerSocketFactory;

pub mod dispatcher;
pub mod handler;
pub mod listener;
pub mod log_dispatcher;
pub mod shutdown;
pub mod tunnel;

pub use dispatcher::{
	Dispatcher, DispatcherContext, DispatcherFactory, DispatcherRegistry, ModuleExecutor,
};
pub use handler::ServerContext;
pub use log_dispatcher::LogDispatcher;
pub use shutdown::Shutdown;

/// A configured, not yet listening server
pub struct Server {
	config: Config,
	api_key: String,
	ctx: Arc<ServerContext>,
}

impl Server {
	/// Server with an explicit registry and storage (`None` disables the file server)
	pub fn new(
		config: Config,
		registry: Arc<DispatcherRegistry>,
		storage: Option<Arc<dyn FileStorage>>,
	) -> Result<Self, ConfigError> {
		config.validate()?;
		let api_key = config.resolved_api_key()?;
		let ctx = Arc::new(ServerContext {
			server_name: config.server_name.clone(),
			registry,
			storage,
			shutdown: Shutdown::new(),
			max_message_size: config.max_message_size,
			buffer_size: config.file_server.buffer_size(),
			read_timeout: Duration::from_secs(config.server_timeout_secs),
		});
		Ok(Server { config, api_key, ctx })
	}

	/// Server whose dispatchers and storage are built from their configured names
	pub fn from_config(config: Config, log_buffer: LogBuffer) -> Result<Self, ConfigError> {
		let dispatcher_ctx =
			DispatcherContext { server_name: config.server_name.clone(), log_buffer };
		let registry =
			DispatcherFactory::default().build_registry(&config.dispatchers, &dispatcher_ctx)?;

		let storage = if config.file_server.enabled {
			let settings = &config.file_server;
			Some(StorageRegistry::default().build(&settings.storage, settings)?)
		} else {
			None
		};
		Server::new(config, Arc::new(registry), storage)
	}

	pub fn context(&self) -> &Arc<ServerContext> {
		&self.ctx
	}

	/// Handle that stops the server once triggered
	pub fn shutdown_handle(&self) -> Shutdown {
		self.ctx.shutdown.clone()
	}

	/// Bind the listening sockets and start serving
	///
	/// Failing to bind or to load TLS material is fatal.
	pub async fn bind(self) -> Result<RunningServer, TransportError> {
		let config = &self.config;

		let admin = ServerSocketFactory::from_settings(&config.tls)?
			.bind(&config.host, config.admin_port)
			.await?;
		let admin_addr = admin.local_addr();
		info!(
			"Admin socket listening on {} (tls: {}, file server: {}, dispatchers: {:?})",
			admin_addr,
			admin.factory().is_tls(),
			self.ctx.storage.is_some(),
			self.ctx.registry.ids()
		);

		let tunnel = if config.tunnel.enabled {
			let https = TlsSettings { enabled: config.https, ..config.tls.clone() };
			let socket = ServerSocketFactory::from_settings(&https)?.bind(&config.host, config.web_port).await?;
			info!(
				"Tunnel listening on {}/{} (https: {})",
				socket.local_addr(),
				config.tunnel.endpoint,
				config.https
			);
			Some(socket)
		} else {
			None
		};

		let tunnel_addr = tunnel.as_ref().map(|socket| socket.local_addr());
		let tunnel_task = tunnel.map(|socket| {
			let router = tunnel::router(
				Arc::clone(&self.ctx),
				&config.tunnel.endpoint,
				&config.tunnel.api_key_name,
				&self.api_key,
			);
			tokio::spawn(listener::serve_tunnel(
				socket,
				router,
				self.ctx.shutdown.clone(),
				self.ctx.read_timeout,
			))
		});
		let admin_task = tokio::spawn(listener::serve_admin(admin, Arc::clone(&self.ctx)));

		Ok(RunningServer {
			admin_addr,
			tunnel_addr,
			shutdown: self.ctx.shutdown.clone(),
			admin_task,
			tunnel_task,
		})
	}
}

/// A server accepting connections
pub struct RunningServer {
	admin_addr: SocketAddr,
	tunnel_addr: Option<SocketAddr>,
	shutdown: Shutdown,
	admin_task: JoinHandle<()>,
	tunnel_task: Option<JoinHandle<()>>,
}

impl RunningServer {
	pub fn admin_addr(&self) -> SocketAddr {
		self.admin_addr
	}

	pub fn tunnel_addr(&self) -> Option<SocketAddr> {
		self.tunnel_addr
	}

	pub fn shutdown(&self) -> &Shutdown {
		&self.shutdown
	}

	/// Wait until both listeners have stopped and drained
	pub async fn wait(self) {
		if let Err(e) = self.admin_task.await {
			error!("Admin listener failed: {}", e);
		}
		if let Some(task) = self.tunnel_task {
			if let Err(e) = task.await {
				error!("Tunnel listener failed: {}", e);
			}
		}
		info!("Server stopped");
	}
}

// vim: ts=4
