/// Common test utilities and mock infrastructure
///
/// This module provides shared functionality for integration tests including:
/// - Mock drives backed by temp files
/// - A scriptable hardware eraser
/// - Key fixtures and preflight options suitable for unprivileged runs
pub mod mock_drive;
pub mod mock_eraser;

use obliterator::crypto::{OperatorMetadata, SigningKey};
use obliterator::drives::PreflightOptions;
use std::path::{Path, PathBuf};

pub const OPERATOR_PRIVATE: &[u8] = include_bytes!("../fixtures/operator_private.pem");
pub const OPERATOR_PUBLIC: &[u8] = include_bytes!("../fixtures/operator_public.pem");
#[allow(dead_code)]
pub const UNRELATED_PUBLIC: &[u8] = include_bytes!("../fixtures/unrelated_public.pem");

pub fn signing_key() -> SigningKey {
    SigningKey::from_pem(OPERATOR_PRIVATE).expect("fixture key parses")
}

/// Regular files accepted, no root, no mount table
pub fn test_preflight() -> PreflightOptions {
    PreflightOptions {
        allow_mounted: false,
        allow_regular_file: true,
        require_root: false,
        mounts_path: "/nonexistent/mounts".to_string(),
    }
}

pub fn operator() -> OperatorMetadata {
    OperatorMetadata {
        name: "Dana Reyes".to_string(),
        id: "OP-7731".to_string(),
        organization: Some("Northwind Recycling".to_string()),
        pre_classification: Some("Confidential".to_string()),
        post_classification: Some("Unclassified".to_string()),
        post_destination: Some("Resale".to_string()),
        ..Default::default()
    }
}

#[allow(dead_code)]
pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).expect("write fixture");
    path
}
