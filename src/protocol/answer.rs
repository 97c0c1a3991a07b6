//! Answer envelope returned from the server to the client

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;
use std::str::FromStr;

use super::error::ProtocolError;
use super::line::{join_fields, optional, parse_u64, split_fields};

/// Number of fixed fields in an answer transfer line
const ANSWER_FIELDS: usize = 5;

/// Outcome discriminator of an [`Answer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum AnswerStatus {
	Ok,
	FileOk,
	FileNok,
	Error,
	Stop,
	Health,
}

impl AnswerStatus {
	pub fn code(self) -> i32 {
		match self {
			AnswerStatus::Ok => 1,
			AnswerStatus::FileOk => 2,
			AnswerStatus::FileNok => -2,
			AnswerStatus::Error => -1,
			AnswerStatus::Stop => 10,
			AnswerStatus::Health => 11,
		}
	}

	pub fn from_code(code: i32) -> Option<Self> {
		match code {
			1 => Some(AnswerStatus::Ok),
			2 => Some(AnswerStatus::FileOk),
			-2 => Some(AnswerStatus::FileNok),
			-1 => Some(AnswerStatus::Error),
			10 => Some(AnswerStatus::Stop),
			11 => Some(AnswerStatus::Health),
			_ => None,
		}
	}

	pub fn is_failure(self) -> bool {
		matches!(self, AnswerStatus::Error | AnswerStatus::FileNok)
	}
}

impl From<AnswerStatus> for i32 {
	fn from(status: AnswerStatus) -> i32 {
		status.code()
	}
}

impl TryFrom<i32> for AnswerStatus {
	type Error = String;

	fn try_from(code: i32) -> Result<Self, String> {
		AnswerStatus::from_code(code).ok_or_else(|| format!("unknown answer status {}", code))
	}
}

/// Why a command failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureType {
	NotFound,
	ChecksumMismatch,
	LengthMismatch,
	Storage,
	UnknownDispatcher,
	Malformed,
	WrongServer,
	FileServerDisabled,
	Dispatch,
}

impl FailureType {
	pub fn as_str(self) -> &'static str {
		match self {
			FailureType::NotFound => "not-found",
			FailureType::ChecksumMismatch => "checksum-mismatch",
			FailureType::LengthMismatch => "length-mismatch",
			FailureType::Storage => "storage",
			FailureType::UnknownDispatcher => "unknown-dispatcher",
			FailureType::Malformed => "malformed",
			FailureType::WrongServer => "wrong-server",
			FailureType::FileServerDisabled => "file-server-disabled",
			FailureType::Dispatch => "dispatch",
		}
	}
}

impl fmt::Display for FailureType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for FailureType {
	type Err = ProtocolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let failure = match s {
			"not-found" => FailureType::NotFound,
			"checksum-mismatch" => FailureType::ChecksumMismatch,
			"length-mismatch" => FailureType::LengthMismatch,
			"storage" => FailureType::Storage,
			"unknown-dispatcher" => FailureType::UnknownDispatcher,
			"malformed" => FailureType::Malformed,
			"wrong-server" => FailureType::WrongServer,
			"file-server-disabled" => FailureType::FileServerDisabled,
			"dispatch" => FailureType::Dispatch,
			other => return Err(ProtocolError::Malformed(format!("unknown failure type {:?}", other))),
		};
		Ok(failure)
	}
}

/// Server's reply to one [`Command`](super::Command)
///
/// `failure` is only ever set on `Error` and `FileNok` answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
	pub status: AnswerStatus,

	#[serde(default)]
	pub entity: String,

	/// Length of the raw byte stream following the answer (downloads)
	#[serde(default)]
	pub data_length: u64,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_id: Option<String>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure: Option<FailureType>,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object: Option<serde_json::Value>,
}

impl Answer {
	fn with_status(status: AnswerStatus, entity: impl Into<String>) -> Self {
		Answer {
			status,
			entity: entity.into(),
			data_length: 0,
			file_id: None,
			failure: None,
			object: None,
		}
	}

	pub fn ok(entity: impl Into<String>) -> Self {
		Answer::with_status(AnswerStatus::Ok, entity)
	}

	pub fn error(failure: FailureType, entity: impl Into<String>) -> Self {
		let mut answer = Answer::with_status(AnswerStatus::Error, entity);
		answer.failure = Some(failure);
		answer
	}

	/// Successful file operation; the file id is also attached as the object
	pub fn file_ok(file_id: impl Into<String>) -> Self {
		let file_id = file_id.into();
		let mut answer = Answer::with_status(AnswerStatus::FileOk, file_id.clone());
		answer.object = Some(serde_json::Value::String(file_id.clone()));
		answer.file_id = Some(file_id);
		answer
	}

	pub fn file_nok(failure: FailureType, entity: impl Into<String>) -> Self {
		let mut answer = Answer::with_status(AnswerStatus::FileNok, entity);
		answer.failure = Some(failure);
		answer
	}

	/// Acknowledgement for a stop request
	pub fn stop() -> Self {
		Answer::with_status(AnswerStatus::Stop, "stop requested")
	}

	/// Acknowledgement for a liveness probe
	pub fn health() -> Self {
		Answer::with_status(AnswerStatus::Health, "alive")
	}

	pub fn with_object(mut self, object: serde_json::Value) -> Self {
		self.object = Some(object);
		self
	}

	pub fn with_data_length(mut self, data_length: u64) -> Self {
		self.data_length = data_length;
		self
	}

	pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
		self.entity = entity.into();
		self
	}

	pub fn is_success(&self) -> bool {
		!self.status.is_failure()
	}

	pub fn file_id(&self) -> Option<&str> {
		self.file_id.as_deref()
	}

	/// Encode as a delimited transfer line (without the line break)
	pub fn to_transfer_line(&self) -> Result<String, ProtocolError> {
		let status = self.status.code().to_string();
		let data_length = self.data_length.to_string();
		join_fields(
			&[
				&status,
				&self.entity,
				&data_length,
				self.file_id.as_deref().unwrap_or(""),
				self.failure.map(FailureType::as_str).unwrap_or(""),
			],
			self.object.as_ref(),
		)
	}

	/// Decode a delimited transfer line
	pub fn parse_transfer_line(line: &str) -> Result<Answer, ProtocolError> {
		let (fields, object) = split_fields(line, ANSWER_FIELDS)?;
		let code: i32 = fields[0]
			.parse()
			.map_err(|_| ProtocolError::Malformed(format!("bad answer status {:?}", fields[0])))?;
		let status = AnswerStatus::try_from(code).map_err(ProtocolError::Malformed)?;

		let failure = match fields[4] {
			"" => None,
			s => Some(s.parse::<FailureType>()?),
		};
		if failure.is_some() && !status.is_failure() {
			return Err(ProtocolError::Malformed("failure type on a successful answer".into()));
		}

		Ok(Answer {
			status,
			entity: fields[1].to_string(),
			data_length: parse_u64(fields[2], "data length")?,
			file_id: optional(fields[3]),
			failure,
			object,
		})
	}

	pub fn to_json(&self) -> Result<String, ProtocolError> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(json: &str) -> Result<Answer, ProtocolError> {
		Ok(serde_json::from_str(json)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_status_codes() {
		assert_eq!(AnswerStatus::Ok.code(), 1);
		assert_eq!(AnswerStatus::FileOk.code(), 2);
		assert_eq!(AnswerStatus::FileNok.code(), -2);
		assert_eq!(AnswerStatus::Error.code(), -1);
		assert_eq!(AnswerStatus::from_code(11), Some(AnswerStatus::Health));
		assert_eq!(AnswerStatus::from_code(3), None);
	}

	#[test]
	fn test_file_ok_carries_id_in_object() {
		let answer = Answer::file_ok("report.pdf");
		assert_eq!(answer.file_id(), Some("report.pdf"));
		assert_eq!(answer.object, Some(json!("report.pdf")));
		assert!(answer.is_success());
		assert!(answer.failure.is_none());
	}

	#[test]
	fn test_failure_line() {
		let answer = Answer::file_nok(FailureType::ChecksumMismatch, "report.pdf");
		let line = answer.to_transfer_line().unwrap();
		assert_eq!(line, "-2#|#report.pdf#|#0#|##|#checksum-mismatch");
		assert_eq!(Answer::parse_transfer_line(&line).unwrap(), answer);
	}

	#[test]
	fn test_failure_on_success_is_malformed() {
		assert!(Answer::parse_transfer_line("1#|#x#|#0#|##|#storage").is_err());
	}

	#[test]
	fn test_unknown_status_is_malformed() {
		assert!(Answer::parse_transfer_line("7#|#x#|#0#|##|#").is_err());
	}

	#[test]
	fn test_json_status_is_numeric() {
		let json = Answer::health().to_json().unwrap();
		assert!(json.contains("\"status\":11"));
		let back = Answer::from_json(&json).unwrap();
		assert_eq!(back.status, AnswerStatus::Health);
		assert!(Answer::from_json("{\"status\":42}").is_err());
	}
}

// vim: ts=4
