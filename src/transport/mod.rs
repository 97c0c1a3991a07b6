//! Socket transport: plain or TLS client and server sockets

pub mod socket;
pub mod tls;

pub use socket::{BoxedStream, ClientSocketFactory, ServerSocket, ServerSocketFactory, Stream};

// vim: ts=4
