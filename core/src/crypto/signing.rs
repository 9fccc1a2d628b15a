// Certificate signing and verification
//
// Canonical bytes are the compact JSON of the certificate with
// `signatureBase64 = null` and everything else, `publicKeyId` included,
// populated. Sign and verify both go through `canonical_bytes`.

use crate::crypto::certificates::{Certificate, SignedCertificate};
use crate::crypto::keys::{SigningKey, VerifyingKey};
use crate::crypto::secure_rng::SecureRng;
use crate::crypto::validation::validate_fields;
use crate::crypto::SignatureError;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureCheck {
    Valid,
    Invalid,
    /// Key fingerprint differs from the certificate's `publicKeyId`
    KeyMismatch,
    Unsigned,
    Malformed,
    NoKeyFound,
}

impl SignatureCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureCheck::Valid)
    }
}

/// Outcome of verifying a certificate file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub signature_valid: bool,
    pub fields_valid: bool,
    pub public_key_used: Option<String>,
    pub outcome: SignatureCheck,
    pub field_errors: Vec<String>,
    /// `None` when no detached `.sig` file sits next to the certificate
    pub detached_signature_consistent: Option<bool>,
}

impl VerificationReport {
    pub fn is_trusted(&self) -> bool {
        self.signature_valid && self.fields_valid && self.detached_signature_consistent != Some(false)
    }

    /// 0 trusted, 1 untrusted
    pub fn exit_code(&self) -> i32 {
        if self.is_trusted() {
            0
        } else {
            1
        }
    }
}

pub struct SignatureService {
    rng: SecureRng,
    keys_dir: Option<PathBuf>,
}

impl SignatureService {
    /// `keys_dir` is the well-known directory searched for public keys
    pub fn new(keys_dir: Option<PathBuf>) -> Self {
        Self {
            rng: SecureRng::new(),
            keys_dir,
        }
    }

    pub fn keys_dir(&self) -> Option<&Path> {
        self.keys_dir.as_deref()
    }

    pub fn canonical_bytes(certificate: &Certificate) -> Result<Vec<u8>, SignatureError> {
        if certificate.signature.public_key_id.is_none() {
            return Err(SignatureError::MalformedCertificate(
                "publicKeyId must be set before canonicalization".to_string(),
            ));
        }
        let mut canonical = certificate.clone();
        canonical.signature.signature_base64 = None;
        Ok(serde_json::to_vec(&canonical)?)
    }

    pub fn sign(
        &self,
        mut certificate: Certificate,
        key: &SigningKey,
    ) -> Result<SignedCertificate, SignatureError> {
        if certificate.is_signed() {
            return Err(SignatureError::AlreadySigned);
        }
        certificate.signature.public_key_id = Some(key.key_id().to_string());
        let message = Self::canonical_bytes(&certificate)?;
        let signature = key.sign(self.rng.system(), &message)?;
        certificate.signature.signature_base64 = Some(general_purpose::STANDARD.encode(&signature));

        tracing::info!(
            certificate_id = %certificate.certificate_id,
            key_id = %key.key_id(),
            "certificate signed"
        );
        Ok(SignedCertificate::new(certificate, signature))
    }

    /// Check one certificate against one key. The fingerprint is compared
    /// first; a mismatch never reaches the RSA check.
    pub fn verify(certificate: &Certificate, key: &VerifyingKey) -> SignatureCheck {
        let Some(encoded) = certificate.signature.signature_base64.as_deref() else {
            return SignatureCheck::Unsigned;
        };
        let Some(key_id) = certificate.signature.public_key_id.as_deref() else {
            return SignatureCheck::Malformed;
        };
        if key_id != key.key_id() {
            return SignatureCheck::KeyMismatch;
        }
        let Ok(signature) = general_purpose::STANDARD.decode(encoded) else {
            return SignatureCheck::Malformed;
        };
        let Ok(message) = Self::canonical_bytes(certificate) else {
            return SignatureCheck::Malformed;
        };
        if key.verify(&message, &signature) {
            SignatureCheck::Valid
        } else {
            SignatureCheck::Invalid
        }
    }

    /// Verify a certificate file end to end.
    ///
    /// An explicit key is the only key tried. Without one, candidates are
    /// searched in order and a fingerprint mismatch moves on to the next.
    /// `Err` is reserved for I/O problems (unreadable certificate or key).
    pub fn verify_file(
        &self,
        cert_path: &Path,
        explicit_key: Option<&Path>,
    ) -> Result<VerificationReport, SignatureError> {
        let raw = fs::read(cert_path).map_err(|e| SignatureError::io(cert_path, e))?;

        let value: serde_json::Value = match serde_json::from_slice(&raw) {
            Ok(value) => value,
            Err(e) => return Ok(Self::malformed(vec![format!("not valid JSON: {}", e)])),
        };
        let field_errors = validate_fields(&value);
        let certificate: Certificate = match serde_json::from_value(value) {
            Ok(cert) => cert,
            Err(e) => {
                let mut errors = field_errors;
                errors.push(format!("schema: {}", e));
                return Ok(Self::malformed(errors));
            }
        };

        let mut report = VerificationReport {
            signature_valid: false,
            fields_valid: field_errors.is_empty(),
            public_key_used: None,
            outcome: SignatureCheck::NoKeyFound,
            field_errors,
            detached_signature_consistent: Self::detached_consistency(cert_path, &certificate),
        };

        if !certificate.is_signed() {
            report.outcome = SignatureCheck::Unsigned;
            return Ok(report);
        }

        match explicit_key {
            Some(path) => {
                let key = VerifyingKey::load(path)?;
                report.outcome = Self::verify(&certificate, &key);
                report.public_key_used = Some(path.display().to_string());
            }
            None => {
                let mut tried_any = false;
                for candidate in self.candidate_keys(cert_path, &certificate.certificate_id) {
                    let key = match VerifyingKey::load(&candidate) {
                        Ok(key) => key,
                        Err(e) => {
                            tracing::debug!(path = %candidate.display(), error = %e, "skipping key candidate");
                            continue;
                        }
                    };
                    tried_any = true;
                    let check = Self::verify(&certificate, &key);
                    if check == SignatureCheck::KeyMismatch {
                        tracing::debug!(path = %candidate.display(), "key fingerprint mismatch, trying next");
                        continue;
                    }
                    report.outcome = check;
                    report.public_key_used = Some(candidate.display().to_string());
                    break;
                }
                if report.public_key_used.is_none() && tried_any {
                    report.outcome = SignatureCheck::KeyMismatch;
                }
            }
        }

        report.signature_valid = report.outcome.is_valid();
        tracing::info!(
            certificate_id = %certificate.certificate_id,
            outcome = ?report.outcome,
            fields_valid = report.fields_valid,
            "certificate verification finished"
        );
        Ok(report)
    }

    /// Key files to try, in order: keys directory, the certificate's own
    /// directory, then files named after the certificate
    pub fn candidate_keys(&self, cert_path: &Path, certificate_id: &str) -> Vec<PathBuf> {
        let cert_dir = cert_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut candidates = Vec::new();
        if let Some(dir) = &self.keys_dir {
            candidates.extend(pem_files_in(dir));
        }
        candidates.extend(pem_files_in(cert_dir));

        let stem = cert_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| certificate_id.to_string());
        for name in [
            format!("{}.pub.pem", stem),
            format!("{}.pem", stem),
            format!("{}.pub.pem", certificate_id),
        ] {
            candidates.push(cert_dir.join(name));
        }

        let mut seen = std::collections::HashSet::new();
        candidates.retain(|p| p.exists() && seen.insert(p.clone()));
        candidates
    }

    fn detached_consistency(cert_path: &Path, certificate: &Certificate) -> Option<bool> {
        let dir = cert_path.parent()?;
        let sig_path = dir.join(format!("{}.sig", certificate.certificate_id));
        let detached = fs::read(&sig_path).ok()?;
        let embedded = certificate
            .signature
            .signature_base64
            .as_deref()
            .and_then(|s| general_purpose::STANDARD.decode(s).ok());
        Some(embedded.as_deref() == Some(detached.as_slice()))
    }

    fn malformed(field_errors: Vec<String>) -> VerificationReport {
        VerificationReport {
            signature_valid: false,
            fields_valid: false,
            public_key_used: None,
            outcome: SignatureCheck::Malformed,
            field_errors,
            detached_signature_consistent: None,
        }
    }
}

fn pem_files_in(dir: &Path) -> Vec<PathBuf> {
    let pattern = format!("{}/*.pem", glob::Pattern::escape(&dir.to_string_lossy()));
    match glob::glob(&pattern) {
        Ok(paths) => {
            let mut found: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
            found.sort();
            found
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "bad key directory pattern");
            Vec::new()
        }
    }
}
