// Method selection - maps a device snapshot to a sanitization plan
//
// Pure and deterministic: no I/O, no clock, no randomness. Hardware erase is
// preferred over overwrite; the first matching rule wins.

use crate::algorithms::patterns::{check_pass_count, default_pass_count, default_sequence};
use crate::algorithms::{Confidence, SanitizationMethod, SanitizationPlan};
use crate::drives::{DeviceDescriptor, InterfaceClass};
use crate::SanitizeResult;

pub struct MethodSelector;

impl MethodSelector {
    /// Select a plan using the default overwrite pass count
    pub fn select(device: &DeviceDescriptor) -> SanitizationPlan {
        Self::note_hidden_areas(device, Self::select_method(device))
    }

    fn select_method(device: &DeviceDescriptor) -> SanitizationPlan {
        let caps = &device.capabilities;
        let unlocked = !caps.ata_security_locked;

        if device.interface == InterfaceClass::Nvme && caps.nvme_crypto_erase_supported {
            return Self::hardware_plan(
                SanitizationMethod::NvmeCryptoErase,
                Confidence::High,
                "NVMe controller supports Sanitize crypto erase; the media encryption key is \
                 destroyed, covering every flash block including over-provisioned space",
            );
        }

        if !device.rotational && caps.ata_secure_erase_enhanced && unlocked {
            return Self::hardware_plan(
                SanitizationMethod::AtaSecureEraseEnhanced,
                Confidence::High,
                "SSD supports ATA enhanced secure erase; the controller erases all \
                 user-addressable and reallocated blocks",
            );
        }

        if device.rotational && caps.ata_secure_erase_supported && unlocked {
            return Self::hardware_plan(
                SanitizationMethod::AtaSecureErase,
                Confidence::High,
                "HDD supports ATA secure erase; the drive firmware overwrites every \
                 user-addressable sector",
            );
        }

        if !device.rotational && caps.discard_supported && !caps.has_secure_erase() {
            return Self::hardware_plan(
                SanitizationMethod::BlkDiscard,
                Confidence::Medium,
                "No secure erase command available; discarding all blocks. Limitation: \
                 discard alone is not a guaranteed purge on every controller",
            );
        }

        Self::base_overwrite_plan(device, default_pass_count(device), None)
    }

    /// Select a plan, applying a caller override to overwrite pass counts.
    /// Overrides outside [1, 20] are rejected rather than clamped.
    pub fn select_with_passes(
        device: &DeviceDescriptor,
        pass_override: Option<u32>,
    ) -> SanitizeResult<SanitizationPlan> {
        if let Some(passes) = pass_override {
            check_pass_count(passes)?;
        }

        let plan = Self::select(device);
        match (plan.method, pass_override) {
            (SanitizationMethod::MultiPassOverwrite, Some(passes)) => {
                Ok(Self::overwrite_plan(device, passes, None))
            }
            _ => Ok(plan),
        }
    }

    /// Overwrite plan for a device, also used when a hardware method falls back
    pub fn overwrite_plan(
        device: &DeviceDescriptor,
        pass_count: u32,
        fallback_from: Option<SanitizationMethod>,
    ) -> SanitizationPlan {
        Self::note_hidden_areas(device, Self::base_overwrite_plan(device, pass_count, fallback_from))
    }

    fn base_overwrite_plan(
        device: &DeviceDescriptor,
        pass_count: u32,
        fallback_from: Option<SanitizationMethod>,
    ) -> SanitizationPlan {
        let (confidence, mut rationale) = if device.rotational {
            (
                Confidence::High,
                format!(
                    "{}-pass overwrite of every addressable sector on rotational media",
                    pass_count
                ),
            )
        } else {
            (
                Confidence::Low,
                format!(
                    "{}-pass overwrite on flash media. Limitation: wear-leveling may retain \
                     data in remapped blocks that overwrite cannot reach",
                    pass_count
                ),
            )
        };

        if device.is_removable() {
            rationale.push_str("; pass count reduced for removable media");
        }
        if let Some(method) = fallback_from {
            rationale = format!("Fallback after {} failed. {}", method, rationale);
        }

        SanitizationPlan {
            method: SanitizationMethod::MultiPassOverwrite,
            pass_count,
            confidence,
            rationale,
            patterns: default_sequence(pass_count),
        }
    }

    /// Reported HPA/DCO regions are removed before sanitizing. Overwrite only
    /// reaches them if that succeeds, so it cannot claim high confidence.
    fn note_hidden_areas(device: &DeviceDescriptor, mut plan: SanitizationPlan) -> SanitizationPlan {
        let areas = device.hidden_areas();
        if areas.is_empty() {
            return plan;
        }
        let names: Vec<String> = areas.iter().map(|a| a.to_string()).collect();
        plan.rationale.push_str(&format!(
            "; {} reported: native capacity is restored before sanitizing, and sectors \
             behind it stay untouched if that fails",
            names.join("/")
        ));
        if plan.method == SanitizationMethod::MultiPassOverwrite && plan.confidence == Confidence::High {
            plan.confidence = Confidence::Medium;
        }
        plan
    }

    fn hardware_plan(
        method: SanitizationMethod,
        confidence: Confidence,
        rationale: &str,
    ) -> SanitizationPlan {
        SanitizationPlan {
            method,
            pass_count: 1,
            confidence,
            rationale: rationale.to_string(),
            patterns: Vec::new(),
        }
    }
}
