//! Per-connection command processing
//!
//! Every admin connection carries exactly one command. Built-in commands
//! are handled here, everything else goes to the dispatcher registry.
//! Nothing in this module returns an error to its caller: failures become
//! failure answers or log lines.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use super::dispatcher::DispatcherRegistry;
use super::shutdown::Shutdown;
use crate::files::{file_checksum, Delete, Upload};
use crate::logging::*;
use crate::protocol::framing;
use crate::protocol::{
	Answer, Command, FailureType, CMD_FILE_DELETE, CMD_FILE_RECEIVE_REQUEST, CMD_FILE_REQUEST,
	CMD_HEALTH, CMD_STOP,
};
use crate::storage::FileStorage;

/// State shared by all connection handlers of one server
pub struct ServerContext {
	pub server_name: String,
	pub registry: Arc<DispatcherRegistry>,
	/// `None` when the file server is disabled
	pub storage: Option<Arc<dyn FileStorage>>,
	pub shutdown: Shutdown,
	pub max_message_size: usize,
	pub buffer_size: usize,
	/// Bound on every single read or write of a connection
	pub read_timeout: Duration,
}

fn wrong_server(ctx: &ServerContext, cmd: &Command) -> Option<Answer> {
	if cmd.server_name.is_empty() || cmd.server_name == ctx.server_name {
		return None;
	}
	warn!(
		"Ignoring {} for server {:?}, this is {:?}",
		cmd.name, cmd.server_name, ctx.server_name
	);
	Some(Answer::error(
		FailureType::WrongServer,
		format!("command addressed to {}", cmd.server_name),
	))
}

/// Execute a command that carries no raw byte stream
///
/// Used by both the admin socket and the HTTP tunnel. File stream commands
/// are refused here since they need the socket path.
pub async fn process(ctx: &ServerContext, cmd: &Command) -> Answer {
	if let Some(answer) = wrong_server(ctx, cmd) {
		return answer;
	}
	if !cmd.is_internal() {
		return ctx.registry.dispatch(cmd).await;
	}

	match cmd.name.as_str() {
		CMD_STOP => {
			info!("Stop requested");
			ctx.shutdown.trigger();
			Answer::stop()
		}
		CMD_HEALTH => Answer::health(),
		CMD_FILE_DELETE => delete_file(ctx, cmd).await,
		CMD_FILE_RECEIVE_REQUEST | CMD_FILE_REQUEST => {
			Answer::file_nok(FailureType::Malformed, format!("{} needs the socket transport", cmd.name))
		}
		other => Answer::error(FailureType::Malformed, format!("unknown internal command {}", other)),
	}
}

async fn delete_file(ctx: &ServerContext, cmd: &Command) -> Answer {
	let storage = match &ctx.storage {
		Some(storage) => storage,
		None => return Answer::file_nok(FailureType::FileServerDisabled, "file server is disabled"),
	};
	let delete = Delete::from_command(cmd);
	match storage.delete(delete.file_id(), delete.domain()).await {
		Ok(true) => {
			info!("Deleted {} from domain {:?}", delete.file_id(), delete.domain());
			Answer::file_ok(delete.file_id())
		}
		Ok(false) => {
			Answer::file_nok(FailureType::NotFound, format!("file {} not found", delete.file_id()))
		}
		Err(e) => {
			error!("Deleting {} failed: {}", delete.file_id(), e);
			Answer::file_nok(FailureType::Storage, e.to_string())
		}
	}
}

async fn reply<S>(ctx: &ServerContext, stream: &mut S, peer: &str, answer: &Answer)
where
	S: AsyncWrite + Unpin + ?Sized,
{
	match timeout(ctx.read_timeout, framing::write_answer(stream, answer)).await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => warn!("Cannot answer {}: {}", peer, e),
		Err(_) => warn!("Answering {} timed out", peer),
	}
}

/// Read one command from `stream`, execute it and answer
pub async fn handle_connection<S>(ctx: &ServerContext, mut stream: S, peer: &str)
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	let cmd = match timeout(ctx.read_timeout, framing::read_command(&mut stream, ctx.max_message_size)).await
	{
		Ok(Ok(cmd)) => cmd,
		Ok(Err(e)) if e.is_eof() => {
			debug!("{} closed the connection without a command", peer);
			return;
		}
		Ok(Err(e)) => {
			warn!("Malformed command from {}: {}", peer, e);
			reply(ctx, &mut stream, peer, &Answer::error(FailureType::Malformed, e.to_string())).await;
			return;
		}
		Err(_) => {
			debug!("No command from {} within {:?}", peer, ctx.read_timeout);
			return;
		}
	};
	debug!("{} sent {}/{}", peer, cmd.dispatcher_id, cmd.name);

	let answer = if cmd.is_internal() && cmd.name == CMD_FILE_RECEIVE_REQUEST {
		Some(receive_upload(ctx, &cmd, &mut stream, peer).await)
	} else if cmd.is_internal() && cmd.name == CMD_FILE_REQUEST {
		send_download(ctx, &cmd, &mut stream, peer).await;
		None
	} else if cmd.is_stop() {
		// the client does not wait for an answer to STOP
		let answer = process(ctx, &cmd).await;
		if !answer.is_success() {
			debug!("Stop from {} refused: {}", peer, answer.entity);
		}
		None
	} else {
		Some(process(ctx, &cmd).await)
	};

	if let Some(answer) = answer {
		reply(ctx, &mut stream, peer, &answer).await;
	}
	let _ = stream.shutdown().await;
}

/// Consume an upload's bytes that will not be stored, then return `answer`
async fn refuse_upload<S>(ctx: &ServerContext, stream: &mut S, len: u64, answer: Answer) -> Answer
where
	S: AsyncRead + Unpin + ?Sized,
{
	let mut sink = tokio::io::sink();
	if let Err(e) = framing::copy_exact(stream, &mut sink, len, ctx.buffer_size, ctx.read_timeout).await
	{
		debug!("Discarding refused upload stopped early: {}", e);
	}
	answer
}

async fn receive_upload<S>(ctx: &ServerContext, cmd: &Command, stream: &mut S, peer: &str) -> Answer
where
	S: AsyncRead + Unpin + ?Sized,
{
	let len = cmd.data_length;
	if let Some(answer) = wrong_server(ctx, cmd) {
		return refuse_upload(ctx, stream, len, answer).await;
	}
	let storage = match &ctx.storage {
		Some(storage) => storage,
		None => {
			let answer = Answer::file_nok(FailureType::FileServerDisabled, "file server is disabled");
			return refuse_upload(ctx, stream, len, answer).await;
		}
	};
	let upload = match Upload::from_command(cmd) {
		Some(upload) => upload,
		None => {
			let answer =
				Answer::file_nok(FailureType::Malformed, format!("bad file entity {:?}", cmd.entity));
			return refuse_upload(ctx, stream, len, answer).await;
		}
	};

	let temp = match tempfile::Builder::new().prefix("cmdlink-upload-").tempfile() {
		Ok(file) => file.into_temp_path(),
		Err(e) => {
			error!("Cannot create temporary file for {}: {}", upload.file_name(), e);
			let answer = Answer::file_nok(FailureType::Storage, e.to_string());
			return refuse_upload(ctx, stream, len, answer).await;
		}
	};
	let mut file = match tokio::fs::File::create(&temp).await {
		Ok(file) => file,
		Err(e) => {
			error!("Cannot open temporary file for {}: {}", upload.file_name(), e);
			let answer = Answer::file_nok(FailureType::Storage, e.to_string());
			return refuse_upload(ctx, stream, len, answer).await;
		}
	};

	if let Err(e) = framing::copy_exact(stream, &mut file, len, ctx.buffer_size, ctx.read_timeout).await {
		warn!("Upload of {} from {} broke off: {}", upload.file_name(), peer, e);
		let failure = match e.kind() {
			std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::TimedOut => FailureType::LengthMismatch,
			_ => FailureType::Storage,
		};
		return Answer::file_nok(failure, e.to_string());
	}
	drop(file);

	let checksum = match file_checksum(&temp).await {
		Ok((size, _)) if size != len => {
			return Answer::file_nok(
				FailureType::LengthMismatch,
				format!("received {} bytes, expected {}", size, len),
			)
		}
		Ok((_, checksum)) => checksum,
		Err(e) => return Answer::file_nok(FailureType::Storage, e.to_string()),
	};
	if !checksum.eq_ignore_ascii_case(upload.checksum()) {
		warn!(
			"Checksum mismatch for {} from {}: expected {}, got {}",
			upload.file_name(),
			peer,
			upload.checksum(),
			checksum
		);
		return Answer::file_nok(
			FailureType::ChecksumMismatch,
			format!("checksum {} does not match {}", checksum, upload.checksum()),
		);
	}

	match storage.store(&temp, upload.file_name(), upload.user(), upload.domain()).await {
		Ok(file_id) => {
			info!("Stored {} ({} bytes) from {} as {}", upload.file_name(), len, peer, file_id);
			Answer::file_ok(file_id)
		}
		Err(e) => {
			error!("Storing {} failed: {}", upload.file_name(), e);
			Answer::file_nok(FailureType::Storage, e.to_string())
		}
	}
}

async fn send_download<S>(ctx: &ServerContext, cmd: &Command, stream: &mut S, peer: &str)
where
	S: AsyncWrite + Unpin + ?Sized,
{
	if let Some(answer) = wrong_server(ctx, cmd) {
		return reply(ctx, stream, peer, &answer).await;
	}
	let storage = match &ctx.storage {
		Some(storage) => storage,
		None => {
			let answer = Answer::file_nok(FailureType::FileServerDisabled, "file server is disabled");
			return reply(ctx, stream, peer, &answer).await;
		}
	};

	let file_id = cmd.file_id.clone().unwrap_or_else(|| cmd.entity.clone());
	let download = match storage.find_file(&file_id, cmd.domain.as_deref()).await {
		Ok(Some(download)) => download,
		Ok(None) => {
			let answer = Answer::file_nok(FailureType::NotFound, format!("file {} not found", file_id));
			return reply(ctx, stream, peer, &answer).await;
		}
		Err(e) => {
			error!("Looking up {} failed: {}", file_id, e);
			return reply(ctx, stream, peer, &Answer::file_nok(FailureType::Storage, e.to_string())).await;
		}
	};
	let len = match download.len().await {
		Ok(len) => len,
		Err(e) => {
			error!("Temporary copy of {} vanished: {}", file_id, e);
			return reply(ctx, stream, peer, &Answer::file_nok(FailureType::Storage, e.to_string())).await;
		}
	};

	let answer = Answer::file_ok(download.file_id()).with_data_length(len);
	match timeout(ctx.read_timeout, framing::write_answer(stream, &answer)).await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => {
			warn!("Cannot announce {} to {}: {}", file_id, peer, e);
			return;
		}
		Err(_) => {
			warn!("Announcing {} to {} timed out", file_id, peer);
			return;
		}
	}
	match download.stream_to(stream, len, ctx.buffer_size, ctx.read_timeout).await {
		Ok(sent) => info!("Sent {} ({} bytes) to {}", file_id, sent, peer),
		Err(e) => warn!("Sending {} to {} failed: {}", file_id, peer, e),
	}
}


// vim: ts=4
