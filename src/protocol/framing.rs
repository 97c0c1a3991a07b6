//! Socket framing
//!
//! A frame is a 4-byte big-endian length followed by that many bytes of a
//! transfer line and a terminating `\n`. File payloads follow a frame as a
//! raw stream whose length was declared in the frame itself.

use std::convert::TryFrom;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::answer::Answer;
use super::command::Command;
use super::error::ProtocolError;

/// Largest transfer line accepted by default
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// Default chunk size for raw file streams
pub const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

/// Write one frame and flush
pub async fn write_frame<W>(writer: &mut W, line: &str) -> Result<(), ProtocolError>
where
	W: AsyncWrite + Unpin + ?Sized,
{
	let len = u32::try_from(line.len()).map_err(|_| ProtocolError::MessageTooLarge {
		size: line.len(),
		max: u32::MAX as usize,
	})?;
	writer.write_u32(len).await?;
	writer.write_all(line.as_bytes()).await?;
	writer.write_all(b"\n").await?;
	writer.flush().await?;
	Ok(())
}

/// Read one frame, rejecting bodies larger than `max_size` before allocating
pub async fn read_frame<R>(reader: &mut R, max_size: usize) -> Result<String, ProtocolError>
where
	R: AsyncRead + Unpin + ?Sized,
{
	let len = reader.read_u32().await? as usize;
	if len > max_size {
		return Err(ProtocolError::MessageTooLarge { size: len, max: max_size });
	}

	let mut body = vec![0u8; len];
	reader.read_exact(&mut body).await?;
	if reader.read_u8().await? != b'\n' {
		return Err(ProtocolError::MissingTerminator);
	}
	Ok(String::from_utf8(body)?)
}

pub async fn write_command<W>(writer: &mut W, cmd: &Command) -> Result<(), ProtocolError>
where
	W: AsyncWrite + Unpin + ?Sized,
{
	write_frame(writer, &cmd.to_transfer_line()?).await
}

pub async fn read_command<R>(reader: &mut R, max_size: usize) -> Result<Command, ProtocolError>
where
	R: AsyncRead + Unpin + ?Sized,
{
	Command::parse_transfer_line(&read_frame(reader, max_size).await?)
}

pub async fn write_answer<W>(writer: &mut W, answer: &Answer) -> Result<(), ProtocolError>
where
	W: AsyncWrite + Unpin + ?Sized,
{
	write_frame(writer, &answer.to_transfer_line()?).await
}

pub async fn read_answer<R>(reader: &mut R, max_size: usize) -> Result<Answer, ProtocolError>
where
	R: AsyncRead + Unpin + ?Sized,
{
	Answer::parse_transfer_line(&read_frame(reader, max_size).await?)
}

/// Copy exactly `len` bytes from `reader` to `writer` in `buf_size` chunks
///
/// Each read and each write is bounded by `step_timeout`; an expired step
/// fails with `io::ErrorKind::TimedOut`. A reader that ends early fails
/// with `io::ErrorKind::UnexpectedEof`.
pub async fn copy_exact<R, W>(
	reader: &mut R,
	writer: &mut W,
	len: u64,
	buf_size: usize,
	step_timeout: Duration,
) -> io::Result<u64>
where
	R: AsyncRead + Unpin + ?Sized,
	W: AsyncWrite + Unpin + ?Sized,
{
	let mut buffer = vec![0u8; buf_size.max(1)];
	let mut remaining = len;

	while remaining > 0 {
		let want = remaining.min(buffer.len() as u64) as usize;
		let n = timeout(step_timeout, reader.read(&mut buffer[..want]))
			.await
			.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))??;
		if n == 0 {
			return Err(io::Error::new(
				io::ErrorKind::UnexpectedEof,
				format!("stream ended {} bytes short of {}", remaining, len),
			));
		}
		timeout(step_timeout, writer.write_all(&buffer[..n]))
			.await
			.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "write timed out"))??;
		remaining -= n as u64;
	}

	timeout(step_timeout, writer.flush())
		.await
		.map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "flush timed out"))??;
	Ok(len)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_frame_layout() {
		let mut buf = Vec::new();
		write_frame(&mut buf, "abc").await.unwrap();
		assert_eq!(buf, vec![0, 0, 0, 3, b'a', b'b', b'c', b'\n']);

		let mut reader = &buf[..];
		assert_eq!(read_frame(&mut reader, 16).await.unwrap(), "abc");
	}

	#[tokio::test]
	async fn test_oversized_frame_is_rejected() {
		let mut buf = Vec::new();
		write_frame(&mut buf, "0123456789").await.unwrap();

		let mut reader = &buf[..];
		match read_frame(&mut reader, 4).await {
			Err(ProtocolError::MessageTooLarge { size, max }) => {
				assert_eq!(size, 10);
				assert_eq!(max, 4);
			}
			other => panic!("expected MessageTooLarge, got {:?}", other),
		}
	}

	#[tokio::test]
	async fn test_missing_terminator() {
		let buf = vec![0, 0, 0, 2, b'o', b'k', b'x'];
		let mut reader = &buf[..];
		assert!(matches!(read_frame(&mut reader, 16).await, Err(ProtocolError::MissingTerminator)));
	}

	#[tokio::test]
	async fn test_truncated_frame_is_eof() {
		let buf = vec![0, 0, 0, 9, b'o'];
		let mut reader = &buf[..];
		let err = read_frame(&mut reader, 16).await.unwrap_err();
		assert!(err.is_eof());
	}

	#[tokio::test]
	async fn test_copy_exact_stops_at_len() {
		let data = vec![7u8; 100];
		let mut reader = &data[..];
		let mut out = Vec::new();
		let n = copy_exact(&mut reader, &mut out, 60, 16, Duration::from_secs(1)).await.unwrap();
		assert_eq!(n, 60);
		assert_eq!(out.len(), 60);
		assert_eq!(reader.len(), 40);
	}

	#[tokio::test]
	async fn test_copy_exact_short_stream() {
		let data = vec![1u8; 10];
		let mut reader = &data[..];
		let mut out = Vec::new();
		let err = copy_exact(&mut reader, &mut out, 20, 8, Duration::from_secs(1)).await.unwrap_err();
		assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
	}
}

// vim: ts=4
