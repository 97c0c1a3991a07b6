//! File transfer value objects
//!
//! [`Upload`], [`Download`] and [`Delete`] describe one file action each and
//! know how to turn themselves into the internal command that carries them.
//! A file command's entity is `<sanitized name>:<hex md5>`.

use md5::{Digest, Md5};
use serde_json::Value;
use std::hash::{Hash, Hasher};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWrite};

use crate::protocol::framing::{self, DEFAULT_BUFFER_SIZE};
use crate::protocol::{Command, CMD_FILE_DELETE, CMD_FILE_RECEIVE_REQUEST, CMD_FILE_REQUEST};

/// Separates the file name from the checksum in a file entity
pub const ENTITY_DIVIDER: char = ':';

/// Domain used when a file action names none
pub const DEFAULT_DOMAIN: &str = "default";

/// Map every character outside `[A-Za-z0-9._-]` to `_`
pub fn sanitize_file_name(name: &str) -> String {
	name.chars()
		.map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
		.collect()
}

/// `<sanitized name>:<checksum>`
pub fn encode_file_entity(file_name: &str, checksum: &str) -> String {
	format!("{}{}{}", sanitize_file_name(file_name), ENTITY_DIVIDER, checksum)
}

/// Split a file entity into name and checksum
pub fn decode_file_entity(entity: &str) -> Option<(&str, &str)> {
	let (name, checksum) = entity.split_once(ENTITY_DIVIDER)?;
	if name.is_empty() {
		return None;
	}
	Some((name, checksum))
}

/// Hex MD5 of an in-memory buffer
pub fn checksum_bytes(data: &[u8]) -> String {
	hex::encode(Md5::digest(data))
}

/// Size and hex MD5 of a file, read in chunks
pub async fn file_checksum(path: &Path) -> io::Result<(u64, String)> {
	let mut file = tokio::fs::File::open(path).await?;
	let mut hasher = Md5::new();
	let mut buffer = vec![0u8; DEFAULT_BUFFER_SIZE];
	let mut size = 0u64;

	loop {
		let n = file.read(&mut buffer).await?;
		if n == 0 {
			break;
		}
		hasher.update(&buffer[..n]);
		size += n as u64;
	}
	Ok((size, hex::encode(hasher.finalize())))
}

// ============================================================================
// UPLOAD
// ============================================================================

/// A file going from the client to the server
///
/// Two uploads are equal when their size and checksum are equal, whatever
/// their names.
#[derive(Debug, Clone)]
pub struct Upload {
	file_name: String,
	domain: Option<String>,
	user: Option<String>,
	size: u64,
	checksum: String,
	source: Option<PathBuf>,
}

impl Upload {
	/// Describe a local file, hashing its full content up front
	pub async fn from_file(
		path: &Path,
		user: Option<String>,
		domain: Option<String>,
	) -> io::Result<Self> {
		let (size, checksum) = file_checksum(path).await?;
		let file_name = path
			.file_name()
			.map(|n| n.to_string_lossy().into_owned())
			.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;

		Ok(Upload {
			file_name: sanitize_file_name(&file_name),
			domain,
			user,
			size,
			checksum,
			source: Some(path.to_path_buf()),
		})
	}

	/// Describe an upload announced by a received command
	pub fn from_command(cmd: &Command) -> Option<Self> {
		let (name, checksum) = decode_file_entity(&cmd.entity)?;
		Some(Upload {
			file_name: name.to_string(),
			domain: cmd.domain.clone(),
			user: cmd.object.as_ref().and_then(Value::as_str).map(str::to_string),
			size: cmd.data_length,
			checksum: checksum.to_string(),
			source: None,
		})
	}

	/// Use a different file name than the source file's
	pub fn renamed(mut self, file_name: &str) -> Self {
		self.file_name = sanitize_file_name(file_name);
		self
	}

	pub fn file_name(&self) -> &str {
		&self.file_name
	}

	pub fn domain(&self) -> Option<&str> {
		self.domain.as_deref()
	}

	pub fn user(&self) -> Option<&str> {
		self.user.as_deref()
	}

	pub fn size(&self) -> u64 {
		self.size
	}

	pub fn checksum(&self) -> &str {
		&self.checksum
	}

	/// Local file the bytes are streamed from (client side only)
	pub fn source(&self) -> Option<&Path> {
		self.source.as_deref()
	}

	pub fn to_command(&self) -> Command {
		let mut cmd = Command::internal(CMD_FILE_RECEIVE_REQUEST)
			.with_entity(encode_file_entity(&self.file_name, &self.checksum))
			.with_data_length(self.size)
			.with_domain(self.domain.clone());
		if let Some(user) = &self.user {
			cmd = cmd.with_object(Value::String(user.clone()));
		}
		cmd
	}
}

impl PartialEq for Upload {
	fn eq(&self, other: &Self) -> bool {
		self.size == other.size && self.checksum == other.checksum
	}
}

impl Eq for Upload {}

impl Hash for Upload {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.size.hash(state);
		self.checksum.hash(state);
	}
}

// ============================================================================
// DOWNLOAD
// ============================================================================

/// A stored file materialized as a temporary copy, ready to be streamed
///
/// The backing file is removed when the download is streamed or dropped,
/// whichever comes first. Two downloads are equal when their file ids are.
#[derive(Debug)]
pub struct Download {
	file_id: String,
	file_name: String,
	domain: Option<String>,
	temp: TempPath,
}

impl Download {
	pub fn new(
		file_id: impl Into<String>,
		file_name: impl Into<String>,
		domain: Option<String>,
		temp: TempPath,
	) -> Self {
		Download { file_id: file_id.into(), file_name: file_name.into(), domain, temp }
	}

	/// Command asking the server for `file_id`
	pub fn request(file_id: &str, domain: Option<String>) -> Command {
		Command::internal(CMD_FILE_REQUEST)
			.with_entity(sanitize_file_name(file_id))
			.with_file_id(file_id)
			.with_domain(domain)
	}

	pub fn file_id(&self) -> &str {
		&self.file_id
	}

	pub fn file_name(&self) -> &str {
		&self.file_name
	}

	pub fn domain(&self) -> Option<&str> {
		self.domain.as_deref()
	}

	/// Path of the temporary copy
	pub fn path(&self) -> &Path {
		&self.temp
	}

	pub async fn len(&self) -> io::Result<u64> {
		Ok(tokio::fs::metadata(&self.temp).await?.len())
	}

	/// Stream `len` bytes of the temporary copy to `writer`, then delete it
	///
	/// The temporary file is removed whether or not the copy succeeds.
	pub async fn stream_to<W>(
		self,
		writer: &mut W,
		len: u64,
		buf_size: usize,
		step_timeout: Duration,
	) -> io::Result<u64>
	where
		W: AsyncWrite + Unpin + ?Sized,
	{
		let sent = match tokio::fs::File::open(&self.temp).await {
			Ok(mut file) => framing::copy_exact(&mut file, writer, len, buf_size, step_timeout).await,
			Err(e) => Err(e),
		};
		let removed = self.temp.close();
		let sent = sent?;
		removed?;
		Ok(sent)
	}
}

impl PartialEq for Download {
	fn eq(&self, other: &Self) -> bool {
		self.file_id == other.file_id
	}
}

impl Eq for Download {}

// ============================================================================
// DELETE
// ============================================================================

/// Removal of a stored file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
	file_id: String,
	domain: Option<String>,
}

impl Delete {
	pub fn new(file_id: impl Into<String>, domain: Option<String>) -> Self {
		Delete { file_id: file_id.into(), domain }
	}

	pub fn from_command(cmd: &Command) -> Self {
		let file_id = cmd.file_id.clone().unwrap_or_else(|| cmd.entity.clone());
		Delete { file_id, domain: cmd.domain.clone() }
	}

	pub fn file_id(&self) -> &str {
		&self.file_id
	}

	pub fn domain(&self) -> Option<&str> {
		self.domain.as_deref()
	}

	pub fn to_command(&self) -> Command {
		Command::internal(CMD_FILE_DELETE)
			.with_entity(sanitize_file_name(&self.file_id))
			.with_file_id(self.file_id.clone())
			.with_domain(self.domain.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;
	use tempfile::TempDir;

	#[test]
	fn test_sanitize_file_name() {
		assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
		assert_eq!(sanitize_file_name("my report (1).pdf"), "my_report__1_.pdf");
		assert_eq!(sanitize_file_name("a:b/c"), "a_b_c");
		assert!(!sanitize_file_name("x:y:z").contains(ENTITY_DIVIDER));
	}

	#[test]
	fn test_file_entity() {
		let entity = encode_file_entity("q3 report.pdf", "abcd");
		assert_eq!(entity, "q3_report.pdf:abcd");
		assert_eq!(decode_file_entity(&entity), Some(("q3_report.pdf", "abcd")));
		assert_eq!(decode_file_entity("no-divider"), None);
		assert_eq!(decode_file_entity(":abcd"), None);
	}

	#[test]
	fn test_checksum_is_full_hex_md5() {
		assert_eq!(checksum_bytes(b""), "d41d8cd98f00b204e9800998ecf8427e");
		assert_eq!(checksum_bytes(b"hello"), "5d41402abc4b2a76b9719d911017c592");
	}

	#[tokio::test]
	async fn test_upload_from_file() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("hello world.txt");
		std::fs::write(&path, b"hello").unwrap();

		let upload = Upload::from_file(&path, Some("alice".into()), Some("acme".into())).await.unwrap();
		assert_eq!(upload.file_name(), "hello_world.txt");
		assert_eq!(upload.size(), 5);
		assert_eq!(upload.checksum(), "5d41402abc4b2a76b9719d911017c592");

		let cmd = upload.to_command();
		assert!(cmd.is_internal());
		assert_eq!(cmd.name, CMD_FILE_RECEIVE_REQUEST);
		assert_eq!(cmd.entity, "hello_world.txt:5d41402abc4b2a76b9719d911017c592");
		assert_eq!(cmd.data_length, 5);
		assert_eq!(cmd.object, Some(Value::String("alice".into())));

		let received = Upload::from_command(&cmd).unwrap();
		assert_eq!(received.user(), Some("alice"));
		assert_eq!(received.domain(), Some("acme"));
		assert_eq!(received, upload);
	}

	#[tokio::test]
	async fn test_upload_of_missing_file_fails() {
		let dir = TempDir::new().unwrap();
		assert!(Upload::from_file(&dir.path().join("nope"), None, None).await.is_err());
	}

	#[tokio::test]
	async fn test_uploads_equal_by_content() {
		let dir = TempDir::new().unwrap();
		let a = dir.path().join("a.txt");
		let b = dir.path().join("b.txt");
		std::fs::write(&a, b"same bytes").unwrap();
		std::fs::write(&b, b"same bytes").unwrap();

		let ua = Upload::from_file(&a, None, None).await.unwrap();
		let ub = Upload::from_file(&b, Some("bob".into()), None).await.unwrap();
		assert_ne!(ua.file_name(), ub.file_name());
		assert_eq!(ua, ub);

		let set: HashSet<Upload> = vec![ua, ub].into_iter().collect();
		assert_eq!(set.len(), 1);
	}

	#[tokio::test]
	async fn test_download_removes_temp_after_stream() {
		let temp = tempfile::NamedTempFile::new().unwrap().into_temp_path();
		std::fs::write(&temp, b"payload").unwrap();
		let path = temp.to_path_buf();

		let download = Download::new("f", "f", None, temp);
		assert_eq!(download.len().await.unwrap(), 7);

		let mut out = Vec::new();
		download.stream_to(&mut out, 7, 4, Duration::from_secs(1)).await.unwrap();
		assert_eq!(out, b"payload");
		assert!(!path.exists());
	}

	#[test]
	fn test_downloads_equal_by_id() {
		let a = Download::new("x", "a", None, tempfile::NamedTempFile::new().unwrap().into_temp_path());
		let b = Download::new("x", "b", None, tempfile::NamedTempFile::new().unwrap().into_temp_path());
		assert_eq!(a, b);
	}

	#[test]
	fn test_delete_command() {
		let cmd = Delete::new("report.pdf", Some("acme".into())).to_command();
		assert_eq!(cmd.name, CMD_FILE_DELETE);
		let back = Delete::from_command(&cmd);
		assert_eq!(back.file_id(), "report.pdf");
		assert_eq!(back.domain(), Some("acme"));
	}
}

// vim: ts=4
