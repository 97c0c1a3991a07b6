//! Log retrieval dispatcher
//!
//! Answers with the server's most recent log records. The command verb may
//! carry `limit=<n>` and `level=<level>` as `key=value|key=value` pairs;
//! the records travel in the answer object and a one-line summary in the
//! entity.

use async_trait::async_trait;
use std::sync::Arc;

use super::dispatcher::{Dispatcher, DispatcherContext};
use crate::logging::{LogBuffer, LogRecord};
use crate::protocol::{Answer, Command, FailureType};

/// Id under which the log dispatcher is registered
pub const DISPATCHER_ID: &str = "log";

/// Records returned when the command sets no limit
pub const DEFAULT_LIMIT: usize = 100;

pub(super) fn construct(ctx: &DispatcherContext) -> Arc<dyn Dispatcher> {
	Arc::new(LogDispatcher::new(ctx.log_buffer.clone()))
}

pub struct LogDispatcher {
	buffer: LogBuffer,
}

impl LogDispatcher {
	pub fn new(buffer: LogBuffer) -> Self {
		LogDispatcher { buffer }
	}

	fn summary(records: &[LogRecord]) -> String {
		let warnings = records.iter().filter(|r| r.level == "WARN").count();
		let errors = records.iter().filter(|r| r.level == "ERROR").count();
		format!("{} log records ({} warn, {} error)", records.len(), warnings, errors)
	}
}

#[async_trait]
impl Dispatcher for LogDispatcher {
	fn id(&self) -> &str {
		DISPATCHER_ID
	}

	async fn dispatch(&self, cmd: &Command) -> Answer {
		let limit = match cmd.message_value("limit") {
			Some(value) => match value.parse::<usize>() {
				Ok(limit) => limit,
				Err(_) => {
					return Answer::error(FailureType::Malformed, format!("invalid limit {:?}", value))
				}
			},
			None => DEFAULT_LIMIT,
		};
		let level = cmd.message_value("level").map(str::to_ascii_uppercase);

		let records: Vec<LogRecord> = match &level {
			// filter first, so the limit counts matching records only
			Some(level) => {
				let mut matching: Vec<LogRecord> =
					self.buffer.snapshot(None).into_iter().filter(|r| &r.level == level).collect();
				let skip = matching.len().saturating_sub(limit);
				matching.drain(..skip);
				matching
			}
			None => self.buffer.snapshot(Some(limit)),
		};

		let summary = LogDispatcher::summary(&records);
		match serde_json::to_value(&records) {
			Ok(object) => Answer::ok(summary).with_object(object),
			Err(e) => Answer::error(FailureType::Dispatch, format!("cannot encode log records: {}", e)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::AnswerStatus;

	fn buffer_with(levels: &[&str]) -> LogBuffer {
		let buffer = LogBuffer::new(100);
		for (i, level) in levels.iter().enumerate() {
			buffer.push(LogRecord {
				timestamp: i as u64,
				level: level.to_string(),
				target: "cmdlink::server".into(),
				message: format!("event {}", i),
			});
		}
		buffer
	}

	#[tokio::test]
	async fn test_returns_records_and_summary() {
		let dispatcher = LogDispatcher::new(buffer_with(&["INFO", "WARN", "ERROR", "INFO"]));
		let answer = dispatcher.dispatch(&Command::new(DISPATCHER_ID, "LOG")).await;

		assert_eq!(answer.status, AnswerStatus::Ok);
		assert_eq!(answer.entity, "4 log records (1 warn, 1 error)");
		let records: Vec<LogRecord> = serde_json::from_value(answer.object.unwrap()).unwrap();
		assert_eq!(records.len(), 4);
		assert_eq!(records[0].message, "event 0");
	}

	#[tokio::test]
	async fn test_limit_and_level() {
		let dispatcher = LogDispatcher::new(buffer_with(&["INFO", "WARN", "INFO", "WARN", "WARN"]));

		let answer = dispatcher.dispatch(&Command::new(DISPATCHER_ID, "limit=2")).await;
		let records: Vec<LogRecord> = serde_json::from_value(answer.object.unwrap()).unwrap();
		assert_eq!(records.iter().map(|r| r.timestamp).collect::<Vec<_>>(), vec![3, 4]);

		let answer = dispatcher.dispatch(&Command::new(DISPATCHER_ID, "limit=10|level=info")).await;
		assert_eq!(answer.entity, "2 log records (0 warn, 0 error)");
	}

	#[tokio::test]
	async fn test_bad_limit() {
		let dispatcher = LogDispatcher::new(LogBuffer::new(1));
		let answer = dispatcher.dispatch(&Command::new(DISPATCHER_ID, "limit=many")).await;
		assert_eq!(answer.failure, Some(FailureType::Malformed));
	}
}

// vim: ts=4
