//! Encrypted configuration values
//!
//! Secrets such as the tunnel API key may be kept encrypted in the config
//! file. The stored form is `base64(nonce || ciphertext)`, sealed with
//! AES-256-GCM under the SHA-256 digest of the configured `secretKey`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;

/// AES-GCM nonce length in bytes
const NONCE_LEN: usize = 12;

fn cipher(secret_key: &str) -> Result<Aes256Gcm, ConfigError> {
	if secret_key.is_empty() {
		return Err(ConfigError::Invalid("secretKey is required for encrypted values".to_string()));
	}
	let digest = Sha256::digest(secret_key.as_bytes());
	Ok(Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(digest.as_slice())))
}

/// Seal `plain` for storage in a config file
pub fn encrypt_value(plain: &str, secret_key: &str) -> Result<String, ConfigError> {
	let cipher = cipher(secret_key)?;
	let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
	let sealed = cipher
		.encrypt(&nonce, plain.as_bytes())
		.map_err(|_| ConfigError::Invalid("cannot encrypt value".to_string()))?;

	let mut bytes = nonce.to_vec();
	bytes.extend_from_slice(&sealed);
	Ok(BASE64.encode(bytes))
}

/// Open a value produced by [`encrypt_value`]
pub fn decrypt_value(encoded: &str, secret_key: &str) -> Result<String, ConfigError> {
	let cipher = cipher(secret_key)?;
	let bytes = BASE64
		.decode(encoded.trim())
		.map_err(|e| ConfigError::Invalid(format!("encrypted value is not valid base64: {}", e)))?;
	if bytes.len() <= NONCE_LEN {
		return Err(ConfigError::Invalid("encrypted value is too short".to_string()));
	}

	let (nonce, sealed) = bytes.split_at(NONCE_LEN);
	let plain = cipher.decrypt(Nonce::from_slice(nonce), sealed).map_err(|_| {
		ConfigError::Invalid("cannot decrypt value: wrong secretKey or corrupted data".to_string())
	})?;
	String::from_utf8(plain)
		.map_err(|_| ConfigError::Invalid("decrypted value is not UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_sealed_value_opens_with_same_key() {
		let sealed = encrypt_value("s3cret", "app-key").unwrap();
		assert_ne!(sealed, BASE64.encode("s3cret"));
		assert_eq!(decrypt_value(&sealed, "app-key").unwrap(), "s3cret");

		// fresh nonce per seal
		assert_ne!(encrypt_value("s3cret", "app-key").unwrap(), sealed);
	}

	#[test]
	fn test_wrong_key_is_rejected() {
		let sealed = encrypt_value("s3cret", "app-key").unwrap();
		assert!(decrypt_value(&sealed, "other-key").is_err());
		assert!(decrypt_value(&sealed, "").is_err());
	}

	#[test]
	fn test_plain_base64_is_not_accepted() {
		assert!(decrypt_value(&BASE64.encode("s3cret"), "app-key").is_err());
		assert!(decrypt_value("%%%", "app-key").is_err());
	}

	#[test]
	fn test_tampered_value_is_rejected() {
		let sealed = encrypt_value("s3cret", "app-key").unwrap();
		let mut bytes = BASE64.decode(&sealed).unwrap();
		let last = bytes.len() - 1;
		bytes[last] ^= 0x01;
		assert!(decrypt_value(&BASE64.encode(bytes), "app-key").is_err());
	}
}

// vim: ts=4
