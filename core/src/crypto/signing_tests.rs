// Signing and verification tests
//
// Tests cover: sign/verify round trip, single-field tamper detection, key
// mismatch, canonical bytes on disk, key resolution order and detached
// signature cross-checks.

use super::*;
use crate::algorithms::{MethodCategory, PatternKind, SanitizationMethod};
use crate::drives::InterfaceClass;
use crate::engine::PassRecord;
use crate::verification::{ByteRange, VerificationMethod, VerificationOutcome, VerificationResult};
use chrono::{TimeZone, Utc};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PRIVATE: &[u8] = include_bytes!("../../tests/fixtures/operator_private.pem");
const PUBLIC: &[u8] = include_bytes!("../../tests/fixtures/operator_public.pem");
const UNRELATED_PUBLIC: &[u8] = include_bytes!("../../tests/fixtures/unrelated_public.pem");

fn sample_certificate() -> Certificate {
    let start = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2026, 10, 19, 9, 45, 0).unwrap();
    Certificate {
        certificate_id: "0b7f5c7e-8a43-4d0b-9a8e-1f9f3c2d7e11".to_string(),
        tool_version: "1.0.0".to_string(),
        operation_id: "5d2a8c1e-0f44-4a6b-8f3e-7c9d2b1a0e55".to_string(),
        operator: OperatorInfo {
            name: "Dana Reyes".to_string(),
            id: "OP-7731".to_string(),
            title: Some("IT Asset Disposal".to_string()),
            phone: None,
            email: Some("dreyes@example.org".to_string()),
            organization: Some("Example Org".to_string()),
            location: None,
        },
        device: DeviceRecord {
            path: "/dev/sdb".to_string(),
            manufacturer: "Seagate".to_string(),
            model: "ST1000DM010".to_string(),
            serial: "Z9A1B2C3".to_string(),
            capacity_bytes: 1_000_204_886_016,
            media_type: "HDD".to_string(),
            interface: InterfaceClass::Sata,
        },
        classification: Classification {
            pre_level: Some("CONFIDENTIAL".to_string()),
            post_level: Some("UNCLASSIFIED".to_string()),
            post_destination: Some("Recycling".to_string()),
        },
        sanitization: SanitizationRecord {
            method_category: MethodCategory::Clear,
            method: SanitizationMethod::MultiPassOverwrite,
            fallback_from: None,
            technique: SanitizationMethod::MultiPassOverwrite.technique().to_string(),
            pass_records: vec![
                PassRecord {
                    pass_number: 1,
                    pattern_kind: PatternKind::Random,
                    start_time: start,
                    end_time: start + chrono::Duration::minutes(20),
                    bytes_written: 1_000_204_886_016,
                    throughput_bytes_per_sec: 833_504_072.0,
                },
                PassRecord {
                    pass_number: 2,
                    pattern_kind: PatternKind::Zeros,
                    start_time: start + chrono::Duration::minutes(20),
                    end_time: end,
                    bytes_written: 1_000_204_886_016,
                    throughput_bytes_per_sec: 666_803_257.0,
                },
            ],
            standard_reference: STANDARD_REFERENCE.to_string(),
            hidden_areas: Vec::new(),
        },
        verification: VerificationResult {
            method: VerificationMethod::Sampling,
            outcome: VerificationOutcome::Pass,
            notes: "Sampled byte ranges 0..1048576".to_string(),
            sampled_ranges: vec![ByteRange {
                offset: 0,
                length: 1_048_576,
            }],
        },
        timestamps: Timestamps { start, end },
        signature: SignatureBlock {
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            public_key_id: None,
            signature_base64: None,
        },
    }
}

fn service() -> SignatureService {
    SignatureService::new(None)
}

fn signing_key() -> SigningKey {
    SigningKey::from_pem(PRIVATE).unwrap()
}

fn write_key(dir: &Path, name: &str, pem: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, pem).unwrap();
    path
}

// ==================== ROUND TRIP ====================

#[test]
fn test_sign_then_verify_is_valid() {
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let cert = signed.certificate();
    assert!(cert.is_signed());
    assert_eq!(cert.signature.algorithm, "RSA-SHA256");
    assert_eq!(
        cert.signature.public_key_id.as_deref(),
        Some(signing_key().key_id())
    );

    let public = VerifyingKey::from_pem(PUBLIC).unwrap();
    assert_eq!(SignatureService::verify(cert, &public), SignatureCheck::Valid);
}

#[test]
fn test_single_field_tamper_is_invalid() {
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let public = VerifyingKey::from_pem(PUBLIC).unwrap();

    let mut tampered = signed.certificate().clone();
    tampered.device.serial = "Z9A1B2C4".to_string();
    assert_eq!(SignatureService::verify(&tampered, &public), SignatureCheck::Invalid);

    let mut tampered = signed.certificate().clone();
    tampered.sanitization.pass_records[1].bytes_written -= 1;
    assert_eq!(SignatureService::verify(&tampered, &public), SignatureCheck::Invalid);

    let mut tampered = signed.certificate().clone();
    tampered.classification.post_destination = None;
    assert_eq!(SignatureService::verify(&tampered, &public), SignatureCheck::Invalid);
}

#[test]
fn test_unrelated_key_is_mismatch_never_valid() {
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let unrelated = VerifyingKey::from_pem(UNRELATED_PUBLIC).unwrap();
    assert_eq!(
        SignatureService::verify(signed.certificate(), &unrelated),
        SignatureCheck::KeyMismatch
    );
}

#[test]
fn test_unsigned_and_double_signing() {
    let public = VerifyingKey::from_pem(PUBLIC).unwrap();
    assert_eq!(
        SignatureService::verify(&sample_certificate(), &public),
        SignatureCheck::Unsigned
    );

    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let err = service()
        .sign(signed.certificate().clone(), &signing_key())
        .unwrap_err();
    assert!(matches!(err, SignatureError::AlreadySigned));
}

#[test]
fn test_canonical_bytes_ignore_signature_value() {
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let canonical = SignatureService::canonical_bytes(signed.certificate()).unwrap();
    let text = String::from_utf8(canonical).unwrap();
    assert!(text.contains("\"signatureBase64\":null"));
    assert!(text.contains("\"publicKeyId\":\"sha256-"));
    assert!(text.contains("\"phone\":null"), "optional fields must serialize");
    assert!(!text.contains('\n'));
}

#[test]
fn test_unknown_field_rejected_on_parse() {
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let mut value = serde_json::to_value(signed.certificate()).unwrap();
    value["device"]["firmware"] = serde_json::json!("CC43");
    let bytes = serde_json::to_vec(&value).unwrap();
    assert!(Certificate::from_json(&bytes).is_err());
}

// ==================== FILES ON DISK ====================

#[test]
fn test_pretty_printed_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let (json_path, sig_path) = signed.write_to_dir(dir.path()).unwrap();

    assert!(fs::read_to_string(&json_path).unwrap().contains('\n'));
    assert_eq!(fs::read(&sig_path).unwrap(), signed.signature_bytes());

    let reloaded = Certificate::from_json(&fs::read(&json_path).unwrap()).unwrap();
    assert_eq!(
        SignatureService::canonical_bytes(&reloaded).unwrap(),
        SignatureService::canonical_bytes(signed.certificate()).unwrap()
    );

    let key = write_key(dir.path(), "operator_public.pem", PUBLIC);
    let report = service().verify_file(&json_path, Some(key.as_path())).unwrap();
    assert!(report.signature_valid);
    assert!(report.fields_valid, "{:?}", report.field_errors);
    assert_eq!(report.detached_signature_consistent, Some(true));
    assert!(report.is_trusted());
    assert_eq!(report.exit_code(), 0);
}

#[test]
fn test_explicit_unrelated_key_does_not_fall_through() {
    let dir = TempDir::new().unwrap();
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let (json_path, _) = signed.write_to_dir(dir.path()).unwrap();
    write_key(dir.path(), "operator_public.pem", PUBLIC);
    let other_dir = TempDir::new().unwrap();
    let unrelated = write_key(other_dir.path(), "unrelated.pem", UNRELATED_PUBLIC);

    let report = service().verify_file(&json_path, Some(unrelated.as_path())).unwrap();
    assert_eq!(report.outcome, SignatureCheck::KeyMismatch);
    assert!(!report.signature_valid);
    assert_eq!(report.exit_code(), 1);
}

#[test]
fn test_key_resolution_falls_through_mismatch() {
    let keys = TempDir::new().unwrap();
    write_key(keys.path(), "a_unrelated.pem", UNRELATED_PUBLIC);
    write_key(keys.path(), "b_operator.pem", PUBLIC);

    let certs = TempDir::new().unwrap();
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let (json_path, _) = signed.write_to_dir(certs.path()).unwrap();

    let svc = SignatureService::new(Some(keys.path().to_path_buf()));
    let report = svc.verify_file(&json_path, None).unwrap();
    assert_eq!(report.outcome, SignatureCheck::Valid);
    assert!(report.public_key_used.unwrap().ends_with("b_operator.pem"));
}

#[test]
fn test_key_found_next_to_certificate() {
    let certs = TempDir::new().unwrap();
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let (json_path, _) = signed.write_to_dir(certs.path()).unwrap();
    let stem = json_path.file_stem().unwrap().to_string_lossy().to_string();
    write_key(certs.path(), &format!("{}.pub.pem", stem), PUBLIC);

    let svc = SignatureService::new(Some(certs.path().join("no-such-keys-dir")));
    let report = svc.verify_file(&json_path, None).unwrap();
    assert_eq!(report.outcome, SignatureCheck::Valid);
}

#[test]
fn test_only_unrelated_keys_is_mismatch_and_none_is_no_key() {
    let certs = TempDir::new().unwrap();
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let (json_path, _) = signed.write_to_dir(certs.path()).unwrap();

    let report = service().verify_file(&json_path, None).unwrap();
    assert_eq!(report.outcome, SignatureCheck::NoKeyFound);

    write_key(certs.path(), "unrelated.pem", UNRELATED_PUBLIC);
    let report = service().verify_file(&json_path, None).unwrap();
    assert_eq!(report.outcome, SignatureCheck::KeyMismatch);
}

#[test]
fn test_tampered_file_fails_and_detached_sig_mismatch_detected() {
    let dir = TempDir::new().unwrap();
    let signed = service().sign(sample_certificate(), &signing_key()).unwrap();
    let (json_path, sig_path) = signed.write_to_dir(dir.path()).unwrap();
    let key = write_key(dir.path(), "operator_public.pem", PUBLIC);

    let text = fs::read_to_string(&json_path).unwrap();
    fs::write(&json_path, text.replace("Z9A1B2C3", "Z9A1B2C4")).unwrap();
    let report = service().verify_file(&json_path, Some(key.as_path())).unwrap();
    assert_eq!(report.outcome, SignatureCheck::Invalid);
    assert!(report.fields_valid);

    fs::write(&json_path, text).unwrap();
    fs::write(&sig_path, b"not the signature").unwrap();
    let report = service().verify_file(&json_path, Some(key.as_path())).unwrap();
    assert!(report.signature_valid);
    assert_eq!(report.detached_signature_consistent, Some(false));
    assert!(!report.is_trusted());
}

#[test]
fn test_garbage_file_is_malformed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, b"{ not json").unwrap();
    let report = service().verify_file(&path, None).unwrap();
    assert_eq!(report.outcome, SignatureCheck::Malformed);
    assert!(!report.fields_valid);

    assert!(service()
        .verify_file(&dir.path().join("missing.json"), None)
        .is_err());
}
