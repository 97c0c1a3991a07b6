//! Shutdown signal shared by the listeners

use tokio::sync::watch;

/// Cloneable one-shot shutdown trigger
///
/// Triggering is idempotent; every clone and every waiter observes it.
#[derive(Debug, Clone)]
pub struct Shutdown {
	sender: watch::Sender<bool>,
}

impl Shutdown {
	pub fn new() -> Self {
		let (sender, _) = watch::channel(false);
		Shutdown { sender }
	}

	pub fn trigger(&self) {
		self.sender.send_replace(true);
	}

	pub fn is_triggered(&self) -> bool {
		*self.sender.borrow()
	}

	/// Resolve once shutdown has been triggered
	pub async fn wait(&self) {
		let mut receiver = self.sender.subscribe();
		// the sender lives in `self`, so the channel cannot close while waiting
		let _ = receiver.wait_for(|triggered| *triggered).await;
	}
}

impl Default for Shutdown {
	fn default() -> Self {
		Shutdown::new()
	}
}


// vim: ts=4
