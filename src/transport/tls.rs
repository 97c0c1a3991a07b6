//! TLS material loading
//!
//! Builds rustls client and server configurations from PEM files. The
//! server authenticates itself only: client certificates are neither
//! required nor requested.

use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig, SupportedProtocolVersion};
use std::path::Path;
use std::sync::Arc;

use crate::config::TlsSettings;
use crate::error::TransportError;

fn provider() -> Arc<CryptoProvider> {
	Arc::new(rustls::crypto::ring::default_provider())
}

/// Map configured protocol names onto rustls versions; empty means all supported
pub fn protocol_versions(
	names: &[String],
) -> Result<Vec<&'static SupportedProtocolVersion>, TransportError> {
	if names.is_empty() {
		return Ok(rustls::ALL_VERSIONS.to_vec());
	}
	names
		.iter()
		.map(|name| match name.as_str() {
			"TLSv1.2" => Ok(&rustls::version::TLS12),
			"TLSv1.3" => Ok(&rustls::version::TLS13),
			other => Err(TransportError::Tls(format!("unsupported protocol {:?}", other))),
		})
		.collect()
}

fn read_pem(path: Option<&Path>, what: &str) -> Result<Vec<u8>, TransportError> {
	let path = path.ok_or_else(|| TransportError::Tls(format!("{} path not configured", what)))?;
	std::fs::read(path)
		.map_err(|e| TransportError::Tls(format!("cannot read {} {}: {}", what, path.display(), e)))
}

/// Parse PEM-encoded certificates
pub fn parse_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, TransportError> {
	let certs = CertificateDer::pem_slice_iter(pem)
		.collect::<Result<Vec<_>, _>>()
		.map_err(|e| TransportError::Tls(format!("failed to parse certificates: {}", e)))?;
	if certs.is_empty() {
		return Err(TransportError::Tls("no certificates found".into()));
	}
	Ok(certs)
}

/// Parse a PEM-encoded private key
pub fn parse_private_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>, TransportError> {
	PrivateKeyDer::from_pem_slice(pem)
		.map_err(|e| TransportError::Tls(format!("failed to parse private key: {}", e)))
}

/// Trust anchors from `caPath`, PEM-encoded
pub fn load_ca_pem(settings: &TlsSettings) -> Result<Vec<u8>, TransportError> {
	read_pem(settings.ca_path.as_deref(), "CA certificate")
}

/// Client configuration verifying the server against `caPath`
pub fn client_config(settings: &TlsSettings) -> Result<Arc<ClientConfig>, TransportError> {
	let versions = protocol_versions(&settings.protocols)?;
	let mut roots = RootCertStore::empty();
	for cert in parse_certificates(&load_ca_pem(settings)?)? {
		roots
			.add(cert)
			.map_err(|e| TransportError::Tls(format!("failed to add CA certificate: {}", e)))?;
	}

	let config = ClientConfig::builder_with_provider(provider())
		.with_protocol_versions(&versions)
		.map_err(|e| TransportError::Tls(format!("client config error: {}", e)))?
		.with_root_certificates(roots)
		.with_no_client_auth();
	Ok(Arc::new(config))
}

/// Server configuration presenting `certPath`/`keyPath`, without client auth
pub fn server_config(settings: &TlsSettings) -> Result<Arc<ServerConfig>, TransportError> {
	let versions = protocol_versions(&settings.protocols)?;
	let certs = parse_certificates(&read_pem(settings.cert_path.as_deref(), "certificate")?)?;
	let key = parse_private_key(&read_pem(settings.key_path.as_deref(), "private key")?)?;

	let config = ServerConfig::builder_with_provider(provider())
		.with_protocol_versions(&versions)
		.map_err(|e| TransportError::Tls(format!("server config error: {}", e)))?
		.with_no_client_auth()
		.with_single_cert(certs, key)
		.map_err(|e| TransportError::Tls(format!("server config error: {}", e)))?;
	Ok(Arc::new(config))
}


// vim: ts=4
