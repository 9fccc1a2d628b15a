// Field-level checks on a stored certificate, independent of the signature.
// Works on raw JSON so a certificate that fails schema parsing still gets a
// useful list of problems.

use crate::algorithms::SanitizationMethod;
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use uuid::Uuid;

lazy_static! {
    static ref SEMVER: Regex = Regex::new(
        r"^(0|[1-9]\d*)\.(0|[1-9]\d*)\.(0|[1-9]\d*)(?:-[0-9A-Za-z.-]+)?(?:\+[0-9A-Za-z.-]+)?$"
    )
    .expect("semver pattern is valid");
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

fn is_known_method(name: &str) -> bool {
    SanitizationMethod::ALL.iter().any(|m| m.as_str() == name)
}

/// Every problem found, empty when the certificate's fields are valid
pub fn validate_fields(cert: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    match str_at(cert, "/certificateId") {
        Some(id) if !id.trim().is_empty() => {
            if Uuid::parse_str(id).is_err() {
                errors.push(format!("certificateId {:?} is not a UUID", id));
            }
        }
        _ => errors.push("certificateId is missing or empty".to_string()),
    }

    match str_at(cert, "/toolVersion") {
        Some(v) if SEMVER.is_match(v) => {}
        Some(v) => errors.push(format!("toolVersion {:?} is not a semantic version", v)),
        None => errors.push("toolVersion is missing".to_string()),
    }

    if str_at(cert, "/device/path").map_or(true, |p| p.trim().is_empty()) {
        errors.push("device.path is missing or empty".to_string());
    }

    match cert.pointer("/sanitization/passRecords").and_then(Value::as_array) {
        Some(records) if !records.is_empty() => {}
        _ => errors.push("sanitization.passRecords must hold at least one pass".to_string()),
    }

    match str_at(cert, "/sanitization/method") {
        Some(m) if is_known_method(m) => {}
        Some(m) => errors.push(format!("sanitization.method {:?} is not a known method", m)),
        None => errors.push("sanitization.method is missing".to_string()),
    }

    if let Some(from) = cert.pointer("/sanitization/fallbackFrom") {
        if !from.is_null() && !from.as_str().is_some_and(is_known_method) {
            errors.push(format!("sanitization.fallbackFrom {} is not a known method", from));
        }
    }

    let start = str_at(cert, "/timestamps/start").map(DateTime::parse_from_rfc3339);
    let end = str_at(cert, "/timestamps/end").map(DateTime::parse_from_rfc3339);
    match (start, end) {
        (Some(Ok(start)), Some(Ok(end))) => {
            if start > end {
                errors.push(format!("timestamps.start {} is after end {}", start, end));
            }
        }
        _ => errors.push("timestamps.start and timestamps.end must be RFC 3339".to_string()),
    }

    errors
}
