//! TLS identity for the QUIC endpoint
//!
//! The certificate and key are read from disk when both files exist.
//! Otherwise a self-signed ECDSA P-256 certificate is generated in memory,
//! valid for 14 days: WebTransport clients pinning the certificate hash
//! reject anything longer-lived. The SHA-256 hash of the leaf certificate
//! (base64) is kept for the `/api/cert-hash` endpoint.

use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use wtransport::Identity;
use wtransport::tls::{Certificate, CertificateChain, PrivateKey};

use crate::config::Config;
use crate::error::{RelayError, Result};

/// Number of days a generated certificate stays valid
const SELF_SIGNED_VALIDITY_DAYS: i64 = 14;

/// Subject alternative names on generated certificates
const SELF_SIGNED_SANS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// TLS identity plus the pinnable hash of its leaf certificate
#[derive(Debug)]
pub struct ServerIdentity {
    identity: Identity,
    cert_hash: String,
}

impl ServerIdentity {
    /// Load the identity from the configured PEM files, or generate a
    /// self-signed one when neither file exists.
    ///
    /// A half-present pair (certificate without key or vice versa) is a
    /// configuration error: silently regenerating would change the pinned
    /// hash under a deployment that expected its own material.
    pub async fn load_or_generate(config: &Config) -> Result<Self> {
        let cert_exists = Path::new(&config.cert_file).exists();
        let key_exists = Path::new(&config.key_file).exists();

        match (cert_exists, key_exists) {
            (true, true) => {
                let identity = Identity::load_pemfiles(&config.cert_file, &config.key_file)
                    .await
                    .map_err(|e| {
                        RelayError::config(format!(
                            "cannot load TLS identity from {} / {}: {}",
                            config.cert_file, config.key_file, e
                        ))
                    })?;

                let cert_hash = match identity.certificate_chain().as_slice().first() {
                    Some(cert) => hash_der(cert.der()),
                    None => {
                        return Err(RelayError::config(format!(
                            "certificate file {} contains no certificate",
                            config.cert_file
                        )));
                    }
                };

                info!(cert = %config.cert_file, "loaded TLS identity");
                Ok(Self {
                    identity,
                    cert_hash,
                })
            }
            (false, false) => {
                warn!(
                    cert = %config.cert_file,
                    key = %config.key_file,
                    "TLS files not found, generating self-signed certificate"
                );
                Self::generate()
            }
            _ => Err(RelayError::config(format!(
                "incomplete TLS identity: found cert={} key={}",
                cert_exists, key_exists
            ))),
        }
    }

    /// Generate an in-memory self-signed identity
    fn generate() -> Result<Self> {
        let sans: Vec<String> = SELF_SIGNED_SANS.iter().map(|s| s.to_string()).collect();
        let mut params = rcgen::CertificateParams::new(sans)
            .map_err(|e| RelayError::config(format!("certificate params: {}", e)))?;

        let now = time::OffsetDateTime::now_utc();
        params.not_before = now;
        params.not_after = now + time::Duration::days(SELF_SIGNED_VALIDITY_DAYS);

        let key_pair = rcgen::KeyPair::generate()
            .map_err(|e| RelayError::config(format!("key generation: {}", e)))?;
        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| RelayError::config(format!("certificate generation: {}", e)))?;

        let cert_der = cert.der().to_vec();
        let cert_hash = hash_der(&cert_der);

        let certificate = Certificate::from_der(cert_der)
            .map_err(|e| RelayError::config(format!("generated certificate rejected: {}", e)))?;
        let identity = Identity::new(
            CertificateChain::single(certificate),
            PrivateKey::from_der_pkcs8(key_pair.serialize_der()),
        );

        info!(hash = %cert_hash, "generated self-signed TLS identity");
        Ok(Self {
            identity,
            cert_hash,
        })
    }

    /// Base64 SHA-256 of the leaf certificate (for pinning)
    pub fn cert_hash(&self) -> &str {
        &self.cert_hash
    }

    /// Split into the wtransport identity and the pinnable hash
    pub fn into_parts(self) -> (Identity, String) {
        (self.identity, self.cert_hash)
    }
}

fn hash_der(der: impl AsRef<[u8]>) -> String {
    BASE64.encode(Sha256::digest(der.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_der_known_vector() {
        // SHA-256 of the empty input, base64-encoded.
        assert_eq!(
            hash_der(b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
    }

    #[tokio::test]
    async fn test_generates_when_files_missing() {
        let config = Config {
            cert_file: "/nonexistent/atelier-test.pem".to_string(),
            key_file: "/nonexistent/atelier-test.key".to_string(),
            ..Config::default()
        };

        let identity = ServerIdentity::load_or_generate(&config).await.unwrap();
        // 32 hash bytes encode to 44 base64 characters.
        assert_eq!(identity.cert_hash().len(), 44);
    }

    #[tokio::test]
    async fn test_half_present_pair_is_fatal() {
        let dir = std::env::temp_dir();
        let cert_path = dir.join("atelier-test-cert-only.pem");
        std::fs::write(&cert_path, "not a real cert").unwrap();

        let config = Config {
            cert_file: cert_path.to_string_lossy().into_owned(),
            key_file: "/nonexistent/atelier-test.key".to_string(),
            ..Config::default()
        };

        let err = ServerIdentity::load_or_generate(&config).await.unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));

        std::fs::remove_file(&cert_path).unwrap();
    }
}
