// Wipe Orchestrator - runs the whole pipeline for one device
//
// preflight -> method selection -> engine (passes + verification) ->
// certificate -> signature -> `<id>.json` + `<id>.sig` in the output directory.
//
// Everything the certificate needs (operator identity, signing key) is checked
// before the first byte is written, so a wipe never ends without attestation
// because of a missing setting. Once the engine has run, the job record is
// always returned, even if the certificate could not be produced.

use crate::algorithms::{MethodSelector, SanitizationPlan};
use crate::crypto::{
    Certificate, CertificateBuilder, OperatorMetadata, SignatureService, SignedCertificate,
    SigningKey,
};
use crate::drives::{validate_device, DeviceDescriptor, PreflightOptions};
use crate::engine::{CancellationToken, JobState, SanitizationEngine, SanitizationJob};
use crate::{SanitizeError, SanitizeResult};
use std::path::{Path, PathBuf};

/// Result of one orchestrated wipe
#[derive(Debug)]
pub struct WipeOutcome {
    pub job: SanitizationJob,
    /// Present only for COMPLETED jobs
    pub certificate: Option<SignedCertificate>,
    pub certificate_path: Option<PathBuf>,
    pub signature_path: Option<PathBuf>,
    /// Why a COMPLETED job ended up without a certificate on disk
    pub attestation_error: Option<SanitizeError>,
}

impl WipeOutcome {
    fn without_certificate(job: SanitizationJob, attestation_error: Option<SanitizeError>) -> Self {
        Self {
            job,
            certificate: None,
            certificate_path: None,
            signature_path: None,
            attestation_error,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.job.state() == JobState::Completed
    }

    /// Completed and the signed certificate was written
    pub fn is_attested(&self) -> bool {
        self.is_completed() && self.certificate_path.is_some()
    }
}

pub struct WipeOrchestrator {
    engine: SanitizationEngine,
    preflight: PreflightOptions,
    pass_override: Option<u32>,
    builder: CertificateBuilder,
    signer: SignatureService,
    signing_key: Option<SigningKey>,
    operator: OperatorMetadata,
    output_dir: PathBuf,
}

impl WipeOrchestrator {
    pub fn new(
        engine: SanitizationEngine,
        operator: OperatorMetadata,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            preflight: PreflightOptions::default(),
            pass_override: None,
            builder: CertificateBuilder::default(),
            signer: SignatureService::new(None),
            signing_key: None,
            operator,
            output_dir: output_dir.into(),
        }
    }

    pub fn with_preflight(mut self, options: PreflightOptions) -> Self {
        self.preflight = options;
        self
    }

    pub fn with_pass_override(mut self, passes: Option<u32>) -> Self {
        self.pass_override = passes;
        self
    }

    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    pub fn with_builder(mut self, builder: CertificateBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The plan `execute` would run for this device
    pub fn plan(&self, descriptor: &DeviceDescriptor) -> SanitizeResult<SanitizationPlan> {
        MethodSelector::select_with_passes(descriptor, self.pass_override)
    }

    /// Sanitize one device and, if the job completes, write its signed
    /// certificate. `Err` means nothing was written to the device; after the
    /// engine has run the outcome is always `Ok`, with `attestation_error` set
    /// when a completed job could not be certified.
    pub fn execute(
        &self,
        descriptor: &DeviceDescriptor,
        cancel: &CancellationToken,
    ) -> SanitizeResult<WipeOutcome> {
        let key = self.signing_key.as_ref().ok_or_else(|| {
            SanitizeError::Precondition("no signing key configured".to_string())
        })?;
        if self.operator.name.trim().is_empty() || self.operator.id.trim().is_empty() {
            return Err(SanitizeError::Precondition(
                "operator name and id are required".to_string(),
            ));
        }

        let device = validate_device(descriptor, &self.preflight)?;
        let plan = self.plan(descriptor)?;
        tracing::info!(
            device = %descriptor.path,
            method = %plan.method,
            confidence = ?plan.confidence,
            rationale = %plan.rationale,
            "plan selected"
        );

        let job = self.engine.run(&device, &plan, cancel)?;
        if job.state() != JobState::Completed {
            tracing::warn!(
                operation_id = %job.operation_id(),
                state = ?job.state(),
                "job did not complete, no certificate issued"
            );
            return Ok(WipeOutcome::without_certificate(job, None));
        }

        let certificate = match self.build_certificate(&job, descriptor) {
            Ok(certificate) => certificate,
            Err(err) => return Ok(self.unattested(job, err)),
        };
        let signed = match self.signer.sign(certificate, key) {
            Ok(signed) => signed,
            Err(err) => return Ok(self.unattested(job, err.into())),
        };
        match signed.write_to_dir(&self.output_dir) {
            Ok((json_path, sig_path)) => Ok(WipeOutcome {
                job,
                certificate: Some(signed),
                certificate_path: Some(json_path),
                signature_path: Some(sig_path),
                attestation_error: None,
            }),
            Err(err) => {
                let mut outcome = self.unattested(job, err.into());
                outcome.certificate = Some(signed);
                Ok(outcome)
            }
        }
    }

    fn build_certificate(
        &self,
        job: &SanitizationJob,
        descriptor: &DeviceDescriptor,
    ) -> SanitizeResult<Certificate> {
        let verification = job.verification().ok_or_else(|| {
            SanitizeError::Precondition(format!(
                "job {} completed without a verification result",
                job.operation_id()
            ))
        })?;
        self.builder
            .build(job, descriptor, verification, &self.operator)
    }

    fn unattested(&self, job: SanitizationJob, err: SanitizeError) -> WipeOutcome {
        tracing::error!(
            operation_id = %job.operation_id(),
            device = %job.device_path(),
            passes = job.pass_records().len(),
            output_dir = %self.output_dir.display(),
            error = %err,
            "device sanitized but no certificate was issued"
        );
        WipeOutcome::without_certificate(job, Some(err))
    }
}
