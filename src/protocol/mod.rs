//! Wire protocol
//!
//! Envelopes exchanged between the two ends and their two encodings:
//!
//! - a delimited transfer line carried in length-prefixed socket frames
//! - JSON carried in HTTP tunnel requests and responses
//!
//! # Example Usage
//!
//! ```ignore
//! use cmdlink::protocol::{framing, Command};
//!
//! let cmd = Command::new("log", "limit=20");
//! framing::write_command(&mut stream, &cmd).await?;
//! let answer = framing::read_answer(&mut stream, framing::DEFAULT_MAX_MESSAGE_SIZE).await?;
//! ```

pub mod answer;
pub mod command;
pub mod error;
pub mod framing;
pub mod line;

// Re-export public API
pub use answer::{Answer, AnswerStatus, FailureType};
pub use command::{
	Command, TransportMode, CMD_FILE_DELETE, CMD_FILE_RECEIVE_REQUEST, CMD_FILE_REQUEST,
	CMD_HEALTH, CMD_STOP, DEFAULT_TIMEOUT_MS, DISPATCHER_ID_INTERNAL,
};
pub use error::ProtocolError;
pub use line::MSG_PART_SEPARATOR;

// vim: ts=4
