use crate::logging::*;
use crate::server::Shutdown;

/// Trigger `shutdown` on SIGTERM or SIGINT
///
/// The listeners then stop accepting and let in-flight connections finish.
pub fn setup_signal_handlers(shutdown: Shutdown) {
	tokio::spawn(async move {
		use tokio::signal;

		let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Server will not stop on SIGTERM.", e);
				return;
			}
		};

		let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Server will not stop on SIGINT.", e);
				return;
			}
		};

		tokio::select! {
			_ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
			_ = sigint.recv() => info!("Received SIGINT, shutting down..."),
			_ = shutdown.wait() => return,
		}
		shutdown.trigger();
	});
}

// vim: ts=4
