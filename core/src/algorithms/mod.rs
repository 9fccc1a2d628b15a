pub mod patterns;
pub mod selector;


pub use patterns::{
    check_pass_count, default_pass_count, default_sequence, validate_sequence, PatternFiller,
};
pub use selector::MethodSelector;

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MIN_PASSES: u32 = 1;
pub const MAX_PASSES: u32 = 20;

/// The five sanitization techniques the engine knows how to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SanitizationMethod {
    NvmeCryptoErase,
    AtaSecureEraseEnhanced,
    AtaSecureErase,
    #[serde(rename = "BLKDISCARD")]
    BlkDiscard,
    MultiPassOverwrite,
}

impl SanitizationMethod {
    pub const ALL: [SanitizationMethod; 5] = [
        SanitizationMethod::NvmeCryptoErase,
        SanitizationMethod::AtaSecureEraseEnhanced,
        SanitizationMethod::AtaSecureErase,
        SanitizationMethod::BlkDiscard,
        SanitizationMethod::MultiPassOverwrite,
    ];

    /// Methods carried out by a single vendor command
    pub fn is_hardware(&self) -> bool {
        !matches!(self, SanitizationMethod::MultiPassOverwrite)
    }

    pub fn category(&self) -> MethodCategory {
        match self {
            SanitizationMethod::NvmeCryptoErase
            | SanitizationMethod::AtaSecureEraseEnhanced
            | SanitizationMethod::AtaSecureErase => MethodCategory::Purge,
            SanitizationMethod::BlkDiscard | SanitizationMethod::MultiPassOverwrite => {
                MethodCategory::Clear
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SanitizationMethod::NvmeCryptoErase => "NVME_CRYPTO_ERASE",
            SanitizationMethod::AtaSecureEraseEnhanced => "ATA_SECURE_ERASE_ENHANCED",
            SanitizationMethod::AtaSecureErase => "ATA_SECURE_ERASE",
            SanitizationMethod::BlkDiscard => "BLKDISCARD",
            SanitizationMethod::MultiPassOverwrite => "MULTI_PASS_OVERWRITE",
        }
    }

    /// Human-readable technique name for certificates
    pub fn technique(&self) -> &'static str {
        match self {
            SanitizationMethod::NvmeCryptoErase => "NVMe Sanitize (Crypto Erase)",
            SanitizationMethod::AtaSecureEraseEnhanced => "ATA Enhanced Secure Erase",
            SanitizationMethod::AtaSecureErase => "ATA Secure Erase",
            SanitizationMethod::BlkDiscard => "Block Discard (TRIM)",
            SanitizationMethod::MultiPassOverwrite => "Multi-Pass Overwrite",
        }
    }
}

impl fmt::Display for SanitizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NIST SP 800-88 sanitization category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodCategory {
    Clear,
    Purge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Data written during one pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum PatternKind {
    Zeros,
    Ones,
    FixedByte(u8),
    Random,
    /// Synthetic record for a vendor erase command
    VendorCommand(SanitizationMethod),
}

impl PatternKind {
    /// The byte every position holds after this pass, if the pattern is fixed
    pub fn fill_byte(&self) -> Option<u8> {
        match self {
            PatternKind::Zeros => Some(0x00),
            PatternKind::Ones => Some(0xFF),
            PatternKind::FixedByte(v) => Some(*v),
            PatternKind::Random | PatternKind::VendorCommand(_) => None,
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::Zeros => write!(f, "zeros"),
            PatternKind::Ones => write!(f, "ones (0xFF)"),
            PatternKind::FixedByte(v) => write!(f, "fixed byte 0x{:02X}", v),
            PatternKind::Random => write!(f, "random"),
            PatternKind::VendorCommand(m) => write!(f, "vendor command {}", m),
        }
    }
}

/// Outcome of method selection. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizationPlan {
    pub method: SanitizationMethod,
    pub pass_count: u32,
    pub confidence: Confidence,
    pub rationale: String,
    /// Pattern per pass; empty for hardware methods
    pub patterns: Vec<PatternKind>,
}

impl SanitizationPlan {
    /// Total progress steps the engine will report
    pub fn total_passes(&self) -> u32 {
        if self.method.is_hardware() {
            1
        } else {
            self.patterns.len() as u32
        }
    }

    /// Pattern of the last overwrite pass
    pub fn final_pattern(&self) -> Option<PatternKind> {
        self.patterns.last().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serialization_names() {
        for method in SanitizationMethod::ALL {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
    }

    #[test]
    fn test_pattern_kind_json_shape() {
        let json = serde_json::to_string(&PatternKind::FixedByte(0x55)).unwrap();
        assert_eq!(json, r#"{"kind":"fixedByte","value":85}"#);
        let json = serde_json::to_string(&PatternKind::Random).unwrap();
        assert_eq!(json, r#"{"kind":"random"}"#);
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            SanitizationMethod::NvmeCryptoErase.category(),
            MethodCategory::Purge
        );
        assert_eq!(
            SanitizationMethod::MultiPassOverwrite.category(),
            MethodCategory::Clear
        );
        assert!(!SanitizationMethod::MultiPassOverwrite.is_hardware());
        assert!(SanitizationMethod::BlkDiscard.is_hardware());
    }

    #[test]
    fn test_fill_bytes() {
        assert_eq!(PatternKind::Zeros.fill_byte(), Some(0));
        assert_eq!(PatternKind::Ones.fill_byte(), Some(0xFF));
        assert_eq!(PatternKind::FixedByte(0x55).fill_byte(), Some(0x55));
        assert_eq!(PatternKind::Random.fill_byte(), None);
    }
}
