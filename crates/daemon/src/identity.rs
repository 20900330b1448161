//! Ephemeral host identity.
//!
//! A fresh RSA host key is generated on every start and never written to
//! disk. The key is produced as a PKCS#1 PEM document and parsed back into
//! the transport's key type, so the serialized form is the single source of
//! truth for what the server advertises.

use rand::rngs::OsRng;
use rsa::pkcs1::{EncodeRsaPrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use russh::keys::{HashAlg, PrivateKey};
use thiserror::Error;

/// Modulus size of generated host keys.
pub const HOST_KEY_BITS: usize = 2048;

/// PEM label of the serialized host key.
pub const PEM_LABEL: &str = "RSA PRIVATE KEY";

/// Errors raised while provisioning the host identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The requested key size is below the accepted minimum.
    #[error("host keys must be at least {HOST_KEY_BITS} bits, got {0}")]
    KeyTooSmall(usize),

    /// Key generation failed.
    #[error("key generation failed: {0}")]
    Generate(#[from] rsa::Error),

    /// PEM encoding failed.
    #[error("key encoding failed: {0}")]
    Encode(#[from] rsa::pkcs1::Error),

    /// The PEM document could not be parsed as a host key.
    #[error("unable to parse private key: {0}")]
    Parse(#[from] russh::keys::Error),
}

/// Generates a new RSA private key and returns it PEM-encoded (PKCS#1).
pub fn generate_private_key_pem(bits: usize) -> Result<String, IdentityError> {
    if bits < HOST_KEY_BITS {
        return Err(IdentityError::KeyTooSmall(bits));
    }

    let key = RsaPrivateKey::new(&mut OsRng, bits)?;
    let pem = key.to_pkcs1_pem(LineEnding::LF)?;
    Ok(pem.to_string())
}

/// The server's host key, owned for the lifetime of the process.
#[derive(Clone)]
pub struct HostIdentity {
    key: PrivateKey,
}

impl HostIdentity {
    /// Generates a fresh host identity.
    pub fn generate() -> Result<Self, IdentityError> {
        let pem = generate_private_key_pem(HOST_KEY_BITS)?;
        Self::from_pem(&pem)
    }

    /// Parses a host identity from a PEM-encoded private key.
    pub fn from_pem(pem: &str) -> Result<Self, IdentityError> {
        let key = russh::keys::decode_secret_key(pem, None)?;
        Ok(Self { key })
    }

    /// Returns the private key handed to the transport.
    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }

    /// Returns the SHA-256 fingerprint of the public half.
    pub fn fingerprint(&self) -> String {
        self.key.public_key().fingerprint(HashAlg::Sha256).to_string()
    }
}

impl std::fmt::Debug for HostIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostIdentity")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}
