/// Command-line contract tests
///
/// Runs the built binary: `plan`, `sign` and `verify` exit codes and output.
/// `wipe` needs root and a confirmation prompt and is covered through the
/// library in pipeline.rs.
#[path = "common/mod.rs"]
mod common;

use common::mock_drive::MockDrive;
use common::mock_eraser::{MockEraser, Script};
use obliterator::engine::EngineConfig;
use obliterator::io::FileDeviceAccess;
use obliterator::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use tempfile::TempDir;

fn obliterator(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_obliterator"))
        .args(args)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("OBLITERATOR_CONFIG")
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary runs")
}

/// Run a 2-pass wipe through the library and return the certificate path
fn issued_certificate(out: &Path) -> PathBuf {
    let drive = MockDrive::create_hdd(16).unwrap();
    let engine = SanitizationEngine::new(
        EngineConfig {
            chunk_size: 4096,
            ..Default::default()
        },
        Arc::new(MockEraser::new(Script::Abort)),
        Arc::new(FileDeviceAccess),
        DeviceLockTable::new(),
    );
    let outcome = WipeOrchestrator::new(engine, common::operator(), out)
        .with_preflight(common::test_preflight())
        .with_pass_override(Some(2))
        .with_signing_key(common::signing_key())
        .execute(&drive.descriptor, &CancellationToken::new())
        .unwrap();
    outcome.certificate_path.unwrap()
}

fn report(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("report is JSON")
}

#[test]
fn test_verify_trusted_certificate_exits_zero() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cert = issued_certificate(out.path());
    let key = common::write_file(home.path(), "operator.pub.pem", common::OPERATOR_PUBLIC);

    let output = obliterator(
        home.path(),
        &["verify", cert.to_str().unwrap(), "--key", key.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(0));
    let report = report(&output);
    assert_eq!(report["signatureValid"], true);
    assert_eq!(report["fieldsValid"], true);
    assert_eq!(report["publicKeyUsed"], key.to_str().unwrap());
}

#[test]
fn test_verify_finds_key_in_keys_dir() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cert = issued_certificate(out.path());
    let keys = home.path().join("keys");
    std::fs::create_dir_all(&keys).unwrap();
    common::write_file(&keys, "a_unrelated.pem", common::UNRELATED_PUBLIC);
    common::write_file(&keys, "b_operator.pem", common::OPERATOR_PUBLIC);

    let output = obliterator(
        home.path(),
        &["verify", cert.to_str().unwrap(), "--keys-dir", keys.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(0));
    assert!(report(&output)["publicKeyUsed"]
        .as_str()
        .unwrap()
        .ends_with("b_operator.pem"));
}

#[test]
fn test_verify_with_wrong_key_exits_one() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cert = issued_certificate(out.path());
    let key = common::write_file(home.path(), "other.pem", common::UNRELATED_PUBLIC);

    let output = obliterator(
        home.path(),
        &["verify", cert.to_str().unwrap(), "--key", key.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(1));
    let report = report(&output);
    assert_eq!(report["signatureValid"], false);
    assert_eq!(report["outcome"], "KEY_MISMATCH");
}

#[test]
fn test_verify_tampered_certificate_exits_one() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cert = issued_certificate(out.path());
    let key = common::write_file(home.path(), "operator.pub.pem", common::OPERATOR_PUBLIC);

    let mut doc: Value = serde_json::from_slice(&std::fs::read(&cert).unwrap()).unwrap();
    doc["device"]["serial"] = Value::from("SWAPPED-SERIAL");
    std::fs::write(&cert, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let output = obliterator(
        home.path(),
        &["verify", cert.to_str().unwrap(), "--key", key.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(report(&output)["outcome"], "INVALID");
}

#[test]
fn test_verify_missing_certificate_exits_two() {
    let home = TempDir::new().unwrap();
    let output = obliterator(home.path(), &["verify", "/nonexistent/cert.json"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_sign_then_verify_round_trip() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let cert = issued_certificate(out.path());

    // Strip the signature to get the unsigned form an external builder would hand over
    let mut doc: Value = serde_json::from_slice(&std::fs::read(&cert).unwrap()).unwrap();
    doc["signature"]["publicKeyId"] = Value::Null;
    doc["signature"]["signatureBase64"] = Value::Null;
    let unsigned = common::write_file(
        home.path(),
        "unsigned.json",
        &serde_json::to_vec_pretty(&doc).unwrap(),
    );
    let private = common::write_file(home.path(), "operator.key", common::OPERATOR_PRIVATE);
    let signed_dir = home.path().join("signed");

    let output = obliterator(
        home.path(),
        &[
            "sign",
            unsigned.to_str().unwrap(),
            "--key",
            private.to_str().unwrap(),
            "--output-dir",
            signed_dir.to_str().unwrap(),
        ],
    );
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));

    let id = doc["certificateId"].as_str().unwrap();
    let signed = signed_dir.join(format!("{}.json", id));
    assert!(signed_dir.join(format!("{}.sig", id)).exists());

    let key = common::write_file(home.path(), "operator.pub.pem", common::OPERATOR_PUBLIC);
    let output = obliterator(
        home.path(),
        &["verify", signed.to_str().unwrap(), "--key", key.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_plan_prints_selected_method() {
    let home = TempDir::new().unwrap();
    let drive = MockDrive::create_nvme_crypto(16).unwrap();
    let descriptor = common::write_file(
        home.path(),
        "device.json",
        &serde_json::to_vec(&drive.descriptor).unwrap(),
    );

    let output = obliterator(home.path(), &["plan", descriptor.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("NVME_CRYPTO_ERASE"), "{}", stdout);
}

#[test]
fn test_plan_rejects_out_of_range_passes() {
    let home = TempDir::new().unwrap();
    let drive = MockDrive::create_hdd(16).unwrap();
    let descriptor = common::write_file(
        home.path(),
        "device.json",
        &serde_json::to_vec(&drive.descriptor).unwrap(),
    );

    let output = obliterator(
        home.path(),
        &["plan", descriptor.to_str().unwrap(), "--passes", "21"],
    );

    assert_eq!(output.status.code(), Some(2));
}
