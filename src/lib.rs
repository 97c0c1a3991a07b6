//! # cmdlink - Command and File-Transfer Link
//!
//! cmdlink connects a front-end process (typically a web tier) with a
//! backend server. The front end sends named commands, the backend runs
//! them on pluggable dispatchers and answers. Files move between the two
//! ends with MD5 verification.
//!
//! Commands travel either as length-prefixed lines over a plain or TLS
//! socket, or as JSON over an HTTP/HTTPS tunnel.
//!
//! ## Sending Commands
//!
//! ```rust,ignore
//! use cmdlink::{Communicator, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load(None)?;
//!     let communicator = Communicator::new(&config)?;
//!     let answer = communicator.send_command(&config.new_command("log", "limit=20")).await?;
//!     println!("{}", answer.entity);
//!     Ok(())
//! }
//! ```
//!
//! ## Transferring Files
//!
//! ```rust,ignore
//! use cmdlink::files::Upload;
//!
//! let upload = Upload::from_file(Path::new("report.pdf"), Some("alice".into()), None).await?;
//! let answer = communicator.upload(&upload).await?;
//! let file_id = answer.file_id().unwrap_or_default();
//! communicator.download(file_id, None, Path::new("copy.pdf")).await?;
//! ```

pub mod communicator;
pub mod config;
pub mod error;
pub mod files;
pub mod logging;
pub mod protocol;
pub mod secret;
pub mod server;
pub mod signals;
pub mod storage;
pub mod transport;
pub mod validation;

// Re-export commonly used types and functions
pub use communicator::{Communicator, Route, Transport};
pub use config::Config;
pub use error::{ConfigError, StorageError, TransportError};
pub use protocol::{Answer, AnswerStatus, Command, FailureType, ProtocolError, TransportMode};
pub use server::{Dispatcher, DispatcherRegistry, Server};

// vim: ts=4
