// Device description, preflight validation and vendor erase commands
//
// - DeviceDescriptor: what the probing collaborator hands us
// - preflight.rs: the precondition checks that gate a job
// - hardware.rs: HardwareEraser capability interface + command-line backend
// - hidden_areas.rs: HPA/DCO records and hdparm parsing

pub mod hardware;
pub mod hidden_areas;
pub mod preflight;

pub use hardware::{CommandEraser, HardwareEraser, HardwareStatus};
pub use hidden_areas::{HiddenArea, HiddenAreaRecord};
pub use preflight::{validate_device, PreflightOptions, ValidatedDevice};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceClass {
    Nvme,
    Sata,
    Usb,
    Unknown,
}

impl fmt::Display for InterfaceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceClass::Nvme => write!(f, "NVMe"),
            InterfaceClass::Sata => write!(f, "SATA"),
            InterfaceClass::Usb => write!(f, "USB"),
            InterfaceClass::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Security and erase capabilities reported by the probing collaborator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DriveCapabilities {
    pub ata_secure_erase_supported: bool,
    pub ata_secure_erase_enhanced: bool,
    pub ata_security_locked: bool,
    pub nvme_crypto_erase_supported: bool,
    pub discard_supported: bool,
    /// Native max sectors above the reported max
    pub hpa_present: bool,
    pub dco_present: bool,
}

impl DriveCapabilities {
    /// Any ATA or NVMe erase command the drive advertises
    pub fn has_secure_erase(&self) -> bool {
        self.ata_secure_erase_supported
            || self.ata_secure_erase_enhanced
            || self.nvme_crypto_erase_supported
    }
}

/// Snapshot of a device as captured by probing. Never mutated after capture.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub path: String,
    pub interface: InterfaceClass,
    pub rotational: bool,
    pub capacity_bytes: u64,
    pub model: String,
    pub serial: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub removable: bool,
    #[serde(flatten)]
    pub capabilities: DriveCapabilities,
}

impl DeviceDescriptor {
    /// USB devices count as removable even when probing did not say so
    pub fn is_removable(&self) -> bool {
        self.removable || self.interface == InterfaceClass::Usb
    }

    /// Hidden areas probing reported, in the order they are removed
    pub fn hidden_areas(&self) -> Vec<HiddenArea> {
        let mut areas = Vec::new();
        if self.capabilities.hpa_present {
            areas.push(HiddenArea::Hpa);
        }
        if self.capabilities.dco_present {
            areas.push(HiddenArea::Dco);
        }
        areas
    }

    pub fn manufacturer_or_unknown(&self) -> &str {
        self.manufacturer
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("Unknown")
    }

    /// Media type label used on certificates
    pub fn media_type(&self) -> &'static str {
        match (self.interface, self.rotational) {
            (InterfaceClass::Nvme, _) => "NVMe SSD",
            (InterfaceClass::Usb, true) => "USB HDD",
            (InterfaceClass::Usb, false) => "USB Flash",
            (_, true) => "HDD",
            (_, false) => "SSD",
        }
    }
}
