//! Server-side command dispatch
//!
//! A [`DispatcherRegistry`] maps dispatcher ids onto [`Dispatcher`]
//! handlers. It is filled once at startup through a [`DispatcherFactory`]
//! and is only read while commands are served; the registry lock is never
//! held while a handler runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::communicator::Communicator;
use crate::error::{ConfigError, TransportError};
use crate::logging::*;
use crate::protocol::{Answer, Command, FailureType};

use super::log_dispatcher;

/// A server module executing commands addressed to its id
#[async_trait]
pub trait Dispatcher: Send + Sync {
	fn id(&self) -> &str;

	/// Execute `cmd`; failures are reported as failure answers
	async fn dispatch(&self, cmd: &Command) -> Answer;
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Default)]
pub struct DispatcherRegistry {
	handlers: RwLock<HashMap<String, Arc<dyn Dispatcher>>>,
}

impl DispatcherRegistry {
	pub fn new() -> Self {
		DispatcherRegistry::default()
	}

	/// Register `handler` under `id`, replacing any earlier registration
	pub fn register(&self, id: &str, handler: Arc<dyn Dispatcher>) {
		let mut handlers = match self.handlers.write() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		if handlers.insert(id.to_string(), handler).is_some() {
			info!("Dispatcher {} re-registered", id);
		} else {
			debug!("Dispatcher {} registered", id);
		}
	}

	/// Register `handler` under its own id
	pub fn register_dispatcher(&self, handler: Arc<dyn Dispatcher>) {
		let id = handler.id().to_string();
		self.register(&id, handler);
	}

	pub fn resolve(&self, id: &str) -> Option<Arc<dyn Dispatcher>> {
		let handlers = match self.handlers.read() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		handlers.get(id).cloned()
	}

	/// Run `cmd` on the dispatcher named by its `dispatcher_id`
	///
	/// An unknown id yields an `UnknownDispatcher` failure answer.
	pub async fn dispatch(&self, cmd: &Command) -> Answer {
		match self.resolve(&cmd.dispatcher_id) {
			Some(handler) => handler.dispatch(cmd).await,
			None => {
				warn!("No dispatcher registered for {:?} (command {})", cmd.dispatcher_id, cmd.name);
				Answer::error(
					FailureType::UnknownDispatcher,
					format!("unknown dispatcher {}", cmd.dispatcher_id),
				)
			}
		}
	}

	/// Registered ids, sorted
	pub fn ids(&self) -> Vec<String> {
		let handlers = match self.handlers.read() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		};
		let mut ids: Vec<String> = handlers.keys().cloned().collect();
		ids.sort();
		ids
	}
}

// ============================================================================
// FACTORY
// ============================================================================

/// What dispatcher constructors may draw on
#[derive(Debug, Clone)]
pub struct DispatcherContext {
	pub server_name: String,
	pub log_buffer: LogBuffer,
}

pub type DispatcherConstructor = fn(&DispatcherContext) -> Arc<dyn Dispatcher>;

/// Named dispatcher constructors, resolved from the configured names
pub struct DispatcherFactory {
	constructors: HashMap<String, DispatcherConstructor>,
}

impl DispatcherFactory {
	pub fn new() -> Self {
		DispatcherFactory { constructors: HashMap::new() }
	}

	/// Factory knowing the built-in `log` dispatcher
	pub fn with_builtin() -> Self {
		let mut factory = DispatcherFactory::new();
		factory.register(log_dispatcher::DISPATCHER_ID, log_dispatcher::construct);
		factory
	}

	pub fn register(&mut self, name: &str, constructor: DispatcherConstructor) {
		self.constructors.insert(name.to_string(), constructor);
	}

	/// Build a registry holding one dispatcher per name; unknown names fail
	pub fn build_registry(
		&self,
		names: &[String],
		ctx: &DispatcherContext,
	) -> Result<DispatcherRegistry, ConfigError> {
		let registry = DispatcherRegistry::new();
		for name in names {
			let constructor = self
				.constructors
				.get(name)
				.ok_or_else(|| ConfigError::UnknownDispatcher(name.clone()))?;
			registry.register(name, constructor(ctx));
		}
		Ok(registry)
	}
}

impl Default for DispatcherFactory {
	fn default() -> Self {
		DispatcherFactory::with_builtin()
	}
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Where module commands run: in this process, or on a remote server
#[derive(Clone)]
pub enum ModuleExecutor {
	Local(Arc<DispatcherRegistry>),
	Remote(Arc<Communicator>),
}

impl ModuleExecutor {
	pub async fn execute(&self, cmd: &Command) -> Result<Answer, TransportError> {
		match self {
			ModuleExecutor::Local(registry) => Ok(registry.dispatch(cmd).await),
			ModuleExecutor::Remote(communicator) => communicator.send_command(cmd).await,
		}
	}

	pub fn is_local(&self) -> bool {
		matches!(self, ModuleExecutor::Local(_))
	}
}


// vim: ts=4
