//! Logging prelude module for convenient access to tracing macros.
//!
//! This module provides convenient re-exports of common tracing macros
//! to reduce verbosity and maintain consistency across the codebase, plus
//! an in-memory [`LogBuffer`] layer that keeps the most recent events for
//! the log dispatcher.
//!
//! # Usage
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("This is an info message");
//! warn!("This is a warning");
//! error!("An error occurred");
//! debug!("Debug information");
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// By default, logs at INFO level and above are displayed. Control the log level
/// with the `RUST_LOG` environment variable:
///
/// ```bash
/// RUST_LOG=debug cmdlink serve
/// RUST_LOG=cmdlink::server=trace cmdlink serve
/// ```
pub fn init_tracing() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();
}

/// Like [`init_tracing`], additionally recording events into `buffer`
pub fn init_tracing_with_buffer(buffer: LogBuffer) {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
		.with(buffer)
		.init();
}

/// One captured log event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
	/// Milliseconds since the Unix epoch
	pub timestamp: u64,
	pub level: String,
	pub target: String,
	pub message: String,
}

impl fmt::Display for LogRecord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} {:>5} {}: {}", self.timestamp, self.level, self.target, self.message)
	}
}

/// Bounded, shared ring of recent log records
///
/// Cloning shares the same ring. Once `capacity` records are held, the
/// oldest is dropped for every new one.
#[derive(Clone)]
pub struct LogBuffer {
	records: Arc<Mutex<VecDeque<LogRecord>>>,
	capacity: usize,
}

impl LogBuffer {
	pub fn new(capacity: usize) -> Self {
		LogBuffer {
			records: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(4096)))),
			capacity: capacity.max(1),
		}
	}

	fn lock(&self) -> MutexGuard<'_, VecDeque<LogRecord>> {
		match self.records.lock() {
			Ok(guard) => guard,
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	pub fn push(&self, record: LogRecord) {
		let mut records = self.lock();
		if records.len() >= self.capacity {
			records.pop_front();
		}
		records.push_back(record);
	}

	/// The newest `limit` records (all when `None`), oldest first
	pub fn snapshot(&self, limit: Option<usize>) -> Vec<LogRecord> {
		let records = self.lock();
		let skip = limit.map(|l| records.len().saturating_sub(l)).unwrap_or(0);
		records.iter().skip(skip).cloned().collect()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl fmt::Debug for LogBuffer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LogBuffer").field("capacity", &self.capacity).finish()
	}
}

#[derive(Default)]
struct MessageVisitor {
	message: String,
	fields: Vec<String>,
}

impl Visit for MessageVisitor {
	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.message = value.to_string();
		} else {
			self.fields.push(format!("{}={}", field.name(), value));
		}
	}

	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		if field.name() == "message" {
			self.message = format!("{:?}", value);
		} else {
			self.fields.push(format!("{}={:?}", field.name(), value));
		}
	}
}

impl<S: Subscriber> Layer<S> for LogBuffer {
	fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
		let mut visitor = MessageVisitor::default();
		event.record(&mut visitor);

		let mut message = visitor.message;
		if !visitor.fields.is_empty() {
			if !message.is_empty() {
				message.push(' ');
			}
			message.push_str(&visitor.fields.join(" "));
		}

		let timestamp =
			SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0);
		self.push(LogRecord {
			timestamp,
			level: event.metadata().level().to_string(),
			target: event.metadata().target().to_string(),
			message,
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn record(message: &str) -> LogRecord {
		LogRecord {
			timestamp: 0,
			level: "INFO".into(),
			target: "test".into(),
			message: message.into(),
		}
	}

	#[test]
	fn test_buffer_drops_oldest() {
		let buffer = LogBuffer::new(2);
		buffer.push(record("one"));
		buffer.push(record("two"));
		buffer.push(record("three"));
		let messages: Vec<_> = buffer.snapshot(None).into_iter().map(|r| r.message).collect();
		assert_eq!(messages, vec!["two", "three"]);
		assert_eq!(buffer.len(), 2);
	}

	#[test]
	fn test_len_counts_records() {
		let buffer = LogBuffer::new(10);
		assert!(buffer.is_empty());
		buffer.push(record("one"));
		buffer.push(record("two"));
		assert_eq!(buffer.len(), 2);
		assert!(!buffer.is_empty());
	}

	#[test]
	fn test_snapshot_limit_keeps_newest() {
		let buffer = LogBuffer::new(10);
		for i in 0..5 {
			buffer.push(record(&i.to_string()));
		}
		let messages: Vec<_> = buffer.snapshot(Some(2)).into_iter().map(|r| r.message).collect();
		assert_eq!(messages, vec!["3", "4"]);
	}

	#[test]
	fn test_layer_captures_events() {
		let buffer = LogBuffer::new(10);
		let subscriber = tracing_subscriber::registry().with(buffer.clone());
		tracing::subscriber::with_default(subscriber, || {
			tracing::warn!(port = 9777, "listener restarted");
		});

		let records = buffer.snapshot(None);
		assert_eq!(records.len(), 1);
		assert_eq!(records[0].level, "WARN");
		assert_eq!(records[0].message, "listener restarted port=9777");
	}
}
