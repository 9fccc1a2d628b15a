// RSA key material for certificate signing
//
// Private keys are PKCS#8 ("PRIVATE KEY"). Public keys may be
// SubjectPublicKeyInfo ("PUBLIC KEY") or PKCS#1 ("RSA PUBLIC KEY"). Either
// way the key id is computed over the SPKI DER so both forms of the same key
// share one fingerprint.

use crate::crypto::SignatureError;
use base64::{engine::general_purpose, Engine as _};
use ring::rand::SystemRandom;
use ring::signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::{FromDer, SubjectPublicKeyInfo};

const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";

/// AlgorithmIdentifier { rsaEncryption, NULL }
const RSA_ALGORITHM_ID: [u8; 15] = [
    0x30, 0x0D, 0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01, 0x05, 0x00,
];

/// `"sha256-" + base64(SHA-256(spki_der))`
pub fn key_fingerprint(spki_der: &[u8]) -> String {
    let digest = Sha256::digest(spki_der);
    format!("sha256-{}", general_purpose::STANDARD.encode(digest))
}

fn der_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes: Vec<u8> = len
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|&b| b == 0)
        .collect();
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(0x80 | bytes.len() as u8);
    out.extend(bytes);
    out
}

/// Wrap a PKCS#1 RSAPublicKey in a SubjectPublicKeyInfo
pub(crate) fn spki_from_pkcs1(pkcs1: &[u8]) -> Vec<u8> {
    let mut bit_string = vec![0x03];
    bit_string.extend(der_length(pkcs1.len() + 1));
    bit_string.push(0x00);
    bit_string.extend_from_slice(pkcs1);

    let mut spki = vec![0x30];
    spki.extend(der_length(RSA_ALGORITHM_ID.len() + bit_string.len()));
    spki.extend_from_slice(&RSA_ALGORITHM_ID);
    spki.extend(bit_string);
    spki
}

/// Decode a single PEM block, returning (label, DER contents)
fn decode_pem(pem: &[u8]) -> Result<(String, Vec<u8>), SignatureError> {
    let (_, block) =
        parse_x509_pem(pem).map_err(|e| SignatureError::KeyRejected(format!("bad PEM: {}", e)))?;
    Ok((block.label, block.contents))
}

fn read_file(path: &Path) -> Result<Vec<u8>, SignatureError> {
    fs::read(path).map_err(|e| SignatureError::io(path, e))
}

pub struct SigningKey {
    key_pair: RsaKeyPair,
    key_id: String,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, SignatureError> {
        let key_pair = RsaKeyPair::from_pkcs8(der)
            .map_err(|e| SignatureError::KeyRejected(e.to_string()))?;
        let spki = spki_from_pkcs1(key_pair.public_key().as_ref());
        Ok(Self {
            key_id: key_fingerprint(&spki),
            key_pair,
        })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, SignatureError> {
        let (label, der) = decode_pem(pem)?;
        if label != "PRIVATE KEY" {
            return Err(SignatureError::KeyRejected(format!(
                "expected a PKCS#8 PRIVATE KEY, found {}",
                label
            )));
        }
        Self::from_pkcs8_der(&der)
    }

    pub fn load(path: &Path) -> Result<Self, SignatureError> {
        Self::from_pem(&read_file(path)?)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from_pkcs1(self.key_pair.public_key().as_ref().to_vec(), None)
    }

    /// RSASSA-PKCS1-v1_5 with SHA-256
    pub(crate) fn sign(&self, rng: &SystemRandom, message: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&signature::RSA_PKCS1_SHA256, rng, message, &mut signature)
            .map_err(|_| SignatureError::SigningFailed)?;
        Ok(signature)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    pkcs1: Vec<u8>,
    key_id: String,
    source: Option<PathBuf>,
}

impl VerifyingKey {
    fn from_pkcs1(pkcs1: Vec<u8>, source: Option<PathBuf>) -> Self {
        let key_id = key_fingerprint(&spki_from_pkcs1(&pkcs1));
        Self {
            pkcs1,
            key_id,
            source,
        }
    }

    pub fn from_spki_der(der: &[u8]) -> Result<Self, SignatureError> {
        let (_, spki) = SubjectPublicKeyInfo::from_der(der)
            .map_err(|e| SignatureError::KeyRejected(format!("bad SubjectPublicKeyInfo: {}", e)))?;
        let oid = spki.algorithm.algorithm.to_id_string();
        if oid != RSA_ENCRYPTION_OID {
            return Err(SignatureError::KeyRejected(format!(
                "not an RSA key (algorithm {})",
                oid
            )));
        }
        Ok(Self::from_pkcs1(spki.subject_public_key.data.to_vec(), None))
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, SignatureError> {
        let (label, der) = decode_pem(pem)?;
        match label.as_str() {
            "PUBLIC KEY" => Self::from_spki_der(&der),
            "RSA PUBLIC KEY" => Ok(Self::from_pkcs1(der, None)),
            other => Err(SignatureError::KeyRejected(format!(
                "expected a public key, found {}",
                other
            ))),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SignatureError> {
        let mut key = Self::from_pem(&read_file(path)?)?;
        key.source = Some(path.to_path_buf());
        Ok(key)
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// File the key was loaded from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn verify(&self, message: &[u8], signature_bytes: &[u8]) -> bool {
        UnparsedPublicKey::new(&signature::RSA_PKCS1_2048_8192_SHA256, &self.pkcs1)
            .verify(message, signature_bytes)
            .is_ok()
    }
}
