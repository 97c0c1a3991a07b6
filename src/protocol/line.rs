//! Delimited line encoding shared by commands and answers
//!
//! A transfer line is a fixed sequence of string fields joined by
//! [`MSG_PART_SEPARATOR`], optionally followed by one more field holding the
//! attached object as base64-encoded JSON. Absent optional values are empty
//! fields.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use super::error::ProtocolError;

/// Separator between the fields of a transfer line
pub const MSG_PART_SEPARATOR: &str = "#|#";

/// Separator between `key=value` pairs inside a command verb
pub const INTERNAL_MSG_PART_SEPARATOR: char = '|';

/// Join `fields` (plus the optional object) into one transfer line
pub(crate) fn join_fields(
	fields: &[&str],
	object: Option<&serde_json::Value>,
) -> Result<String, ProtocolError> {
	for field in fields {
		if field.contains(MSG_PART_SEPARATOR) {
			return Err(ProtocolError::Malformed(format!(
				"field {:?} contains the separator {:?}",
				field, MSG_PART_SEPARATOR
			)));
		}
		if field.contains('\n') || field.contains('\r') {
			return Err(ProtocolError::Malformed(format!("field {:?} contains a line break", field)));
		}
	}

	let mut line = fields.join(MSG_PART_SEPARATOR);
	if let Some(object) = object {
		let json = serde_json::to_vec(object)?;
		line.push_str(MSG_PART_SEPARATOR);
		line.push_str(&BASE64.encode(json));
	}
	Ok(line)
}

/// Split a transfer line into exactly `count` fields plus the optional object
pub(crate) fn split_fields(
	line: &str,
	count: usize,
) -> Result<(Vec<&str>, Option<serde_json::Value>), ProtocolError> {
	let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
	let mut fields: Vec<&str> = line.split(MSG_PART_SEPARATOR).collect();

	let object = match fields.len() {
		n if n == count => None,
		n if n == count + 1 => {
			let encoded = fields.pop().unwrap_or_default();
			decode_object(encoded)?
		}
		n => {
			return Err(ProtocolError::Malformed(format!(
				"expected {} or {} fields, got {}",
				count,
				count + 1,
				n
			)))
		}
	};
	Ok((fields, object))
}

fn decode_object(encoded: &str) -> Result<Option<serde_json::Value>, ProtocolError> {
	if encoded.is_empty() {
		return Ok(None);
	}
	let json = BASE64.decode(encoded)?;
	Ok(Some(serde_json::from_slice(&json)?))
}

/// Empty field → `None`
pub(crate) fn optional(field: &str) -> Option<String> {
	if field.is_empty() {
		None
	} else {
		Some(field.to_string())
	}
}

pub(crate) fn parse_u64(field: &str, what: &str) -> Result<u64, ProtocolError> {
	if field.is_empty() {
		return Ok(0);
	}
	field
		.parse()
		.map_err(|_| ProtocolError::Malformed(format!("{} is not a number: {:?}", what, field)))
}

/// Look up `key` in a `key=value|key=value` message
pub fn message_value<'a>(message: &'a str, key: &str) -> Option<&'a str> {
	message
		.split(INTERNAL_MSG_PART_SEPARATOR)
		.filter_map(|pair| pair.split_once('='))
		.find(|(k, _)| k.trim() == key)
		.map(|(_, v)| v.trim())
}


// vim: ts=4
