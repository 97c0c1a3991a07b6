//! Accept loops of the admin socket and the HTTP tunnel
//!
//! Each accepted connection runs in its own task. Once shutdown is
//! triggered the loops stop accepting and give in-flight connections
//! [`SHUTDOWN_GRACE`] to finish before aborting them.

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::timeout;

use super::handler::{handle_connection, ServerContext};
use super::shutdown::Shutdown;
use crate::logging::*;
use crate::transport::ServerSocket;

/// Time in-flight connections get to finish after shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

async fn drain(name: &str, mut tasks: JoinSet<()>) {
	if !tasks.is_empty() {
		info!("{}: waiting for {} connections to finish", name, tasks.len());
	}
	let finished = timeout(SHUTDOWN_GRACE, async {
		while let Some(result) = tasks.join_next().await {
			if let Err(e) = result {
				warn!("{}: connection task failed: {}", name, e);
			}
		}
	})
	.await;
	if finished.is_err() {
		warn!("{}: aborting {} connections after {:?}", name, tasks.len(), SHUTDOWN_GRACE);
		tasks.abort_all();
	}
}

/// Serve admin connections on `socket` until shutdown
pub async fn serve_admin(socket: ServerSocket, ctx: Arc<ServerContext>) {
	let addr = socket.local_addr();
	let mut tasks = JoinSet::new();

	loop {
		tokio::select! {
			_ = ctx.shutdown.wait() => break,
			accepted = socket.accept() => match accepted {
				Ok((tcp, peer)) => {
					let ctx = Arc::clone(&ctx);
					let factory = socket.factory().clone();
					tasks.spawn(async move {
						let peer = peer.to_string();
						match factory.upgrade(tcp, ctx.read_timeout).await {
							Ok(stream) => handle_connection(&ctx, stream, &peer).await,
							Err(e) => warn!("Rejected connection from {}: {}", peer, e),
						}
					});
				}
				Err(e) => {
					warn!("Accept on {} failed: {}", addr, e);
					tokio::time::sleep(ACCEPT_BACKOFF).await;
				}
			},
			Some(result) = tasks.join_next(), if !tasks.is_empty() => {
				if let Err(e) = result {
					warn!("Connection task failed: {}", e);
				}
			}
		}
	}

	info!("Admin socket {} stopped accepting", addr);
	drain("admin", tasks).await;
}

/// Serve the tunnel `router` over `socket` until shutdown
///
/// Connections are upgraded through the socket's factory, so the tunnel is
/// HTTPS exactly when that factory is TLS.
pub async fn serve_tunnel(socket: ServerSocket, router: Router, shutdown: Shutdown, limit: Duration) {
	let addr = socket.local_addr();
	let mut tasks = JoinSet::new();

	loop {
		tokio::select! {
			_ = shutdown.wait() => break,
			accepted = socket.accept() => match accepted {
				Ok((tcp, peer)) => {
					let factory = socket.factory().clone();
					let service = TowerToHyperService::new(router.clone());
					let shutdown = shutdown.clone();
					tasks.spawn(async move {
						let stream = match factory.upgrade(tcp, limit).await {
							Ok(stream) => stream,
							Err(e) => {
								warn!("Rejected tunnel connection from {}: {}", peer, e);
								return;
							}
						};
						let builder = auto::Builder::new(TokioExecutor::new());
						let conn = builder.serve_connection(TokioIo::new(stream), service);
						tokio::pin!(conn);
						let result = tokio::select! {
							result = conn.as_mut() => result,
							_ = shutdown.wait() => {
								conn.as_mut().graceful_shutdown();
								conn.as_mut().await
							}
						};
						if let Err(e) = result {
							debug!("Tunnel connection from {} ended: {}", peer, e);
						}
					});
				}
				Err(e) => {
					warn!("Accept on {} failed: {}", addr, e);
					tokio::time::sleep(ACCEPT_BACKOFF).await;
				}
			},
			Some(result) = tasks.join_next(), if !tasks.is_empty() => {
				if let Err(e) = result {
					warn!("Tunnel task failed: {}", e);
				}
			}
		}
	}

	info!("Tunnel {} stopped accepting", addr);
	drain("tunnel", tasks).await;
}

// vim: ts=4
