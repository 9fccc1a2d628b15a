/// Error classification for the sanitization core
///
/// Every `SanitizeError` maps onto one class. The engine consults the class to
/// decide whether a failed hardware method may fall back to overwrite, and the
/// class is recorded on failed jobs so callers can tell a refused precondition
/// from a half-finished wipe.
use crate::SanitizeError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Abort the job; no fallback, no retry
    /// Examples: device missing or locked, mid-pass write failure
    Fatal,

    /// Fatal unless the caller enabled overwrite fallback
    /// Examples: vendor command failed, vendor command timed out
    FallbackEligible,

    /// Recorded on the job but does not fail it
    /// Examples: inconclusive hardware status read
    NonFatal,

    /// Cancellation requested at a pass boundary
    UserInterrupted,
}

impl ErrorClass {
    /// Get human-readable description of error class
    pub fn description(&self) -> &'static str {
        match self {
            ErrorClass::Fatal => "Unrecoverable error, job aborted",
            ErrorClass::FallbackEligible => "Hardware method failed, overwrite fallback possible",
            ErrorClass::NonFatal => "Recorded, job continues",
            ErrorClass::UserInterrupted => "Operation cancelled by operator",
        }
    }

    /// Whether the job may continue with MULTI_PASS_OVERWRITE given the caller's flag
    pub fn allows_fallback(&self, fallback_enabled: bool) -> bool {
        fallback_enabled && matches!(self, ErrorClass::FallbackEligible)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Fatal => write!(f, "Fatal"),
            ErrorClass::FallbackEligible => write!(f, "FallbackEligible"),
            ErrorClass::NonFatal => write!(f, "NonFatal"),
            ErrorClass::UserInterrupted => write!(f, "UserInterrupted"),
        }
    }
}

impl SanitizeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            SanitizeError::UnsupportedMethod(_)
            | SanitizeError::HardwareCommandFailed(_)
            | SanitizeError::Timeout(_) => ErrorClass::FallbackEligible,
            SanitizeError::VerificationInconclusive(_) | SanitizeError::Signature(_) => {
                ErrorClass::NonFatal
            }
            SanitizeError::Cancelled => ErrorClass::UserInterrupted,
            SanitizeError::Precondition(_)
            | SanitizeError::IoFailure { .. }
            | SanitizeError::VerificationUnavailable(_)
            | SanitizeError::Config(_)
            | SanitizeError::DeviceBusy(_)
            | SanitizeError::InvalidTransition { .. } => ErrorClass::Fatal,
        }
    }

    /// Stable taxonomy name, used in job failure records and logs
    pub fn kind(&self) -> &'static str {
        match self {
            SanitizeError::Precondition(_) => "PreconditionError",
            SanitizeError::UnsupportedMethod(_) => "UnsupportedMethodError",
            SanitizeError::IoFailure { .. } => "IOFailureError",
            SanitizeError::HardwareCommandFailed(_) => "HardwareCommandError",
            SanitizeError::Timeout(_) => "TimeoutError",
            SanitizeError::VerificationInconclusive(_) => "VerificationInconclusive",
            SanitizeError::VerificationUnavailable(_) => "VerificationUnavailable",
            SanitizeError::Config(_) => "ConfigError",
            SanitizeError::DeviceBusy(_) => "DeviceBusy",
            SanitizeError::InvalidTransition { .. } => "InvalidTransition",
            SanitizeError::Cancelled => "Cancelled",
            SanitizeError::Signature(_) => "SignatureError",
        }
    }
}
