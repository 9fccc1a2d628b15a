pub mod certificates;
pub mod keys;
pub mod secure_rng;
pub mod signing;
pub mod validation;

#[cfg(test)]
mod signing_tests;

pub use certificates::{
    Certificate, CertificateBuilder, Classification, DeviceRecord, OperatorInfo,
    OperatorMetadata, SanitizationRecord, SignatureBlock, SignedCertificate, Timestamps,
    SIGNATURE_ALGORITHM, STANDARD_REFERENCE,
};
pub use keys::{key_fingerprint, SigningKey, VerifyingKey};
pub use secure_rng::{secure_random_bytes, SecureRng};
pub use signing::{SignatureCheck, SignatureService, VerificationReport};
pub use validation::validate_fields;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignatureError {
    #[error("Certificate is already signed")]
    AlreadySigned,

    #[error("Key rejected: {0}")]
    KeyRejected(String),

    #[error("RSA signing failed")]
    SigningFailed,

    #[error("Certificate serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid signature encoding: {0}")]
    InvalidSignature(String),

    #[error("Malformed certificate: {0}")]
    MalformedCertificate(String),

    #[error("No usable public key found for {0}")]
    KeyNotFound(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SignatureError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SignatureError::Io {
            path: path.into(),
            source,
        }
    }
}
