use crate::algorithms::{MethodCategory, SanitizationMethod};
use crate::crypto::SignatureError;
use crate::drives::{DeviceDescriptor, HiddenAreaRecord, InterfaceClass};
use crate::engine::{JobState, PassRecord, SanitizationJob};
use crate::verification::VerificationResult;
use crate::{SanitizeError, SanitizeResult};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const SIGNATURE_ALGORITHM: &str = "RSA-SHA256";
pub const STANDARD_REFERENCE: &str = "NIST SP 800-88 Rev. 1";

/// Attestation of one completed sanitization job.
///
/// Field order here is the canonical serialization order used for signing,
/// so fields must not be reordered. Unknown fields are rejected on parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Certificate {
    pub certificate_id: String,
    pub tool_version: String,
    pub operation_id: String,
    pub operator: OperatorInfo,
    pub device: DeviceRecord,
    pub classification: Classification,
    pub sanitization: SanitizationRecord,
    pub verification: VerificationResult,
    pub timestamps: Timestamps,
    pub signature: SignatureBlock,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OperatorInfo {
    pub name: String,
    pub id: String,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DeviceRecord {
    pub path: String,
    pub manufacturer: String,
    pub model: String,
    pub serial: String,
    pub capacity_bytes: u64,
    pub media_type: String,
    pub interface: InterfaceClass,
}

/// Data classification before and after sanitization, and where the media goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Classification {
    pub pre_level: Option<String>,
    pub post_level: Option<String>,
    pub post_destination: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SanitizationRecord {
    pub method_category: MethodCategory,
    pub method: SanitizationMethod,
    pub fallback_from: Option<SanitizationMethod>,
    pub technique: String,
    pub pass_records: Vec<PassRecord>,
    pub standard_reference: String,
    /// HPA/DCO handling; omitted when the drive reported none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_areas: Vec<HiddenAreaRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Timestamps {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignatureBlock {
    pub algorithm: String,
    pub public_key_id: Option<String>,
    pub signature_base64: Option<String>,
}

impl Certificate {
    pub fn is_signed(&self) -> bool {
        self.signature.signature_base64.is_some()
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, SignatureError> {
        serde_json::from_slice(bytes)
            .map_err(|e| SignatureError::MalformedCertificate(e.to_string()))
    }
}

/// Operator-supplied details that end up on the certificate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorMetadata {
    pub name: String,
    pub id: String,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub organization: Option<String>,
    pub location: Option<String>,
    pub pre_classification: Option<String>,
    pub post_classification: Option<String>,
    pub post_destination: Option<String>,
}

pub struct CertificateBuilder {
    tool_version: String,
}

impl Default for CertificateBuilder {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}

impl CertificateBuilder {
    pub fn new(tool_version: impl Into<String>) -> Self {
        Self {
            tool_version: tool_version.into(),
        }
    }

    /// Assemble an unsigned certificate. Only COMPLETED jobs can be attested.
    pub fn build(
        &self,
        job: &SanitizationJob,
        device: &DeviceDescriptor,
        verification: &VerificationResult,
        operator: &OperatorMetadata,
    ) -> SanitizeResult<Certificate> {
        if job.state() != JobState::Completed {
            return Err(SanitizeError::Precondition(format!(
                "job {} is {:?}; only completed jobs can be certified",
                job.operation_id(),
                job.state()
            )));
        }
        if job.device_path() != device.path {
            return Err(SanitizeError::Precondition(format!(
                "job ran on {} but descriptor is for {}",
                job.device_path(),
                device.path
            )));
        }
        if operator.name.trim().is_empty() || operator.id.trim().is_empty() {
            return Err(SanitizeError::Precondition(
                "operator name and id are required".to_string(),
            ));
        }
        let end = job.end_time().ok_or_else(|| {
            SanitizeError::Precondition(format!("job {} has no end time", job.operation_id()))
        })?;

        let method = job.executed_method();
        Ok(Certificate {
            certificate_id: Uuid::new_v4().to_string(),
            tool_version: self.tool_version.clone(),
            operation_id: job.operation_id().to_string(),
            operator: OperatorInfo {
                name: operator.name.clone(),
                id: operator.id.clone(),
                title: operator.title.clone(),
                phone: operator.phone.clone(),
                email: operator.email.clone(),
                organization: operator.organization.clone(),
                location: operator.location.clone(),
            },
            device: DeviceRecord {
                path: device.path.clone(),
                manufacturer: device.manufacturer_or_unknown().to_string(),
                model: device.model.clone(),
                serial: device.serial.clone(),
                capacity_bytes: device.capacity_bytes,
                media_type: device.media_type().to_string(),
                interface: device.interface,
            },
            classification: Classification {
                pre_level: operator.pre_classification.clone(),
                post_level: operator.post_classification.clone(),
                post_destination: operator.post_destination.clone(),
            },
            sanitization: SanitizationRecord {
                method_category: method.category(),
                method,
                fallback_from: job.fallback_from(),
                technique: method.technique().to_string(),
                pass_records: job.pass_records().to_vec(),
                standard_reference: STANDARD_REFERENCE.to_string(),
                hidden_areas: job.hidden_areas().to_vec(),
            },
            verification: verification.clone(),
            timestamps: Timestamps {
                start: job.start_time(),
                end,
            },
            signature: SignatureBlock {
                algorithm: SIGNATURE_ALGORITHM.to_string(),
                public_key_id: None,
                signature_base64: None,
            },
        })
    }
}

/// A certificate whose signature has been populated. Read-only from here on.
#[derive(Debug, Clone)]
pub struct SignedCertificate {
    certificate: Certificate,
    signature: Vec<u8>,
}

impl SignedCertificate {
    pub(crate) fn new(certificate: Certificate, signature: Vec<u8>) -> Self {
        Self {
            certificate,
            signature,
        }
    }

    /// Rebuild from a stored certificate that carries a signature
    pub fn from_certificate(certificate: Certificate) -> Result<Self, SignatureError> {
        let encoded = certificate
            .signature
            .signature_base64
            .as_deref()
            .ok_or_else(|| SignatureError::MalformedCertificate("certificate is unsigned".into()))?;
        let signature = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| SignatureError::InvalidSignature(e.to_string()))?;
        Ok(Self::new(certificate, signature))
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    pub fn certificate_id(&self) -> &str {
        &self.certificate.certificate_id
    }

    /// Raw signature bytes, as written to the detached `.sig` file
    pub fn signature_bytes(&self) -> &[u8] {
        &self.signature
    }

    pub fn to_json_pretty(&self) -> Result<String, SignatureError> {
        Ok(serde_json::to_string_pretty(&self.certificate)?)
    }

    /// Write `<certificateId>.json` and `<certificateId>.sig` into `dir`
    pub fn write_to_dir(&self, dir: &Path) -> Result<(PathBuf, PathBuf), SignatureError> {
        fs::create_dir_all(dir).map_err(|e| SignatureError::io(dir, e))?;
        let json_path = dir.join(format!("{}.json", self.certificate_id()));
        let sig_path = dir.join(format!("{}.sig", self.certificate_id()));

        fs::write(&json_path, self.to_json_pretty()?)
            .map_err(|e| SignatureError::io(&json_path, e))?;
        fs::write(&sig_path, &self.signature).map_err(|e| SignatureError::io(&sig_path, e))?;

        tracing::info!(
            certificate_id = %self.certificate_id(),
            path = %json_path.display(),
            "certificate written"
        );
        Ok((json_path, sig_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{default_sequence, Confidence, PatternKind, SanitizationPlan};
    use crate::drives::DriveCapabilities;
    use crate::verification::{VerificationMethod, VerificationOutcome};
    use std::time::Duration;

    fn device() -> DeviceDescriptor {
        DeviceDescriptor {
            path: "/dev/sdc".to_string(),
            interface: InterfaceClass::Usb,
            rotational: false,
            capacity_bytes: 32_000_000_000,
            model: "Cruzer Blade".to_string(),
            serial: "4C530001".to_string(),
            manufacturer: Some("SanDisk".to_string()),
            removable: true,
            capabilities: DriveCapabilities::default(),
        }
    }

    fn verification() -> VerificationResult {
        VerificationResult {
            method: VerificationMethod::Sampling,
            outcome: VerificationOutcome::Pass,
            notes: "ok".to_string(),
            sampled_ranges: Vec::new(),
        }
    }

    fn operator() -> OperatorMetadata {
        OperatorMetadata {
            name: "Dana Reyes".to_string(),
            id: "OP-7731".to_string(),
            post_destination: Some("Resale".to_string()),
            ..Default::default()
        }
    }

    fn job(complete: bool) -> SanitizationJob {
        let plan = SanitizationPlan {
            method: SanitizationMethod::MultiPassOverwrite,
            pass_count: 1,
            confidence: Confidence::Low,
            rationale: "test".to_string(),
            patterns: default_sequence(1),
        };
        let mut job = SanitizationJob::new("op-9".to_string(), "/dev/sdc".to_string(), plan);
        job.transition(JobState::Running).unwrap();
        let now = Utc::now();
        job.push_pass(PassRecord::new(1, PatternKind::Random, now, now, 512, Duration::from_secs(1)))
            .unwrap();
        if complete {
            job.transition(JobState::Verifying).unwrap();
            job.set_verification(verification()).unwrap();
            job.transition(JobState::Completed).unwrap();
        }
        job
    }

    #[test]
    fn test_build_from_completed_job() {
        let cert = CertificateBuilder::new("1.0.0")
            .build(&job(true), &device(), &verification(), &operator())
            .unwrap();

        assert!(Uuid::parse_str(&cert.certificate_id).is_ok());
        assert_eq!(cert.operation_id, "op-9");
        assert_eq!(cert.device.media_type, "USB Flash");
        assert_eq!(cert.device.manufacturer, "SanDisk");
        assert_eq!(cert.sanitization.method_category, MethodCategory::Clear);
        assert_eq!(cert.sanitization.pass_records.len(), 1);
        assert_eq!(cert.sanitization.standard_reference, STANDARD_REFERENCE);
        assert_eq!(cert.classification.post_destination.as_deref(), Some("Resale"));
        assert!(cert.timestamps.start <= cert.timestamps.end);
        assert!(!cert.is_signed());
        assert!(cert.signature.public_key_id.is_none());
    }

    #[test]
    fn test_hidden_areas_only_serialized_when_present() {
        use crate::drives::{HiddenArea, HiddenAreaRecord};

        let builder = CertificateBuilder::new("1.0.0");
        let plain = builder
            .build(&job(true), &device(), &verification(), &operator())
            .unwrap();
        let json = serde_json::to_value(&plain).unwrap();
        assert!(json["sanitization"].get("hiddenAreas").is_none());

        let plan = job(true).plan().clone();
        let mut hpa_job = SanitizationJob::new("op-10".to_string(), "/dev/sdc".to_string(), plan);
        hpa_job.transition(JobState::Running).unwrap();
        hpa_job
            .record_hidden_area(HiddenAreaRecord::retained(HiddenArea::Hpa, "drive frozen"))
            .unwrap();
        let now = Utc::now();
        hpa_job
            .push_pass(PassRecord::new(1, PatternKind::Random, now, now, 512, Duration::from_secs(1)))
            .unwrap();
        hpa_job.transition(JobState::Verifying).unwrap();
        hpa_job.set_verification(verification()).unwrap();
        hpa_job.transition(JobState::Completed).unwrap();

        let cert = builder
            .build(&hpa_job, &device(), &verification(), &operator())
            .unwrap();
        let json = serde_json::to_value(&cert).unwrap();
        assert_eq!(json["sanitization"]["hiddenAreas"][0]["area"], "HPA");
        assert_eq!(json["sanitization"]["hiddenAreas"][0]["removed"], false);

        let parsed = Certificate::from_json(&serde_json::to_vec(&cert).unwrap()).unwrap();
        assert_eq!(parsed, cert);
    }

    #[test]
    fn test_each_build_gets_fresh_id() {
        let builder = CertificateBuilder::default();
        let a = builder
            .build(&job(true), &device(), &verification(), &operator())
            .unwrap();
        let b = builder
            .build(&job(true), &device(), &verification(), &operator())
            .unwrap();
        assert_ne!(a.certificate_id, b.certificate_id);
    }

    #[test]
    fn test_refuses_unfinished_job() {
        let err = CertificateBuilder::new("1.0.0")
            .build(&job(false), &device(), &verification(), &operator())
            .unwrap_err();
        assert!(matches!(err, SanitizeError::Precondition(_)));
    }

    #[test]
    fn test_requires_operator_identity() {
        let err = CertificateBuilder::new("1.0.0")
            .build(&job(true), &device(), &verification(), &OperatorMetadata::default())
            .unwrap_err();
        assert!(err.to_string().contains("operator"));
    }
}
