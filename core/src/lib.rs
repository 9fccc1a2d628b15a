// Allow uppercase acronyms for industry-standard terms like HDD, SSD, NVME, ATA
#![allow(clippy::upper_case_acronyms)]

pub mod algorithms;
pub mod config;
pub mod crypto;
pub mod drives;
pub mod engine;
pub mod error;
pub mod io;
pub mod ui;
pub mod verification;
pub mod wipe_orchestrator;

// Re-export the main pipeline pieces for convenience
pub use algorithms::{
    Confidence, MethodSelector, PatternKind, SanitizationMethod, SanitizationPlan,
};
pub use crypto::{
    Certificate, CertificateBuilder, OperatorMetadata, SignatureCheck, SignatureError,
    SignatureService, SignedCertificate,
};
pub use drives::{DeviceDescriptor, InterfaceClass, ValidatedDevice};
pub use engine::{
    CancellationToken, DeviceLockTable, JobState, PassRecord, SanitizationEngine,
    SanitizationJob,
};
pub use error::ErrorClass;
pub use verification::{VerificationOutcome, VerificationResult, VerificationSampler};
pub use wipe_orchestrator::WipeOrchestrator;

use thiserror::Error;

/// Errors raised by the sanitization core.
///
/// Precondition, configuration and busy errors are returned before a job
/// exists. Everything else is recorded on the job that hit it.
#[derive(Error, Debug)]
pub enum SanitizeError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("I/O failure during {context}: {source}")]
    IoFailure {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Hardware command failed: {0}")]
    HardwareCommandFailed(String),

    #[error("Hardware command timed out: {0}")]
    Timeout(String),

    #[error("Verification inconclusive: {0}")]
    VerificationInconclusive(String),

    #[error("Verification could not be performed: {0}")]
    VerificationUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device busy: {0}")]
    DeviceBusy(String),

    #[error("Invalid job state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Operation cancelled, device not sanitized")]
    Cancelled,

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl SanitizeError {
    /// Wrap an I/O error with the operation it interrupted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        SanitizeError::IoFailure {
            context: context.into(),
            source,
        }
    }
}

pub type SanitizeResult<T> = Result<T, SanitizeError>;
