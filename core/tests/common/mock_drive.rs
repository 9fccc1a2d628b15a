/// Mock drives for integration tests
///
/// A temp file filled with a recognisable byte stands in for the block device,
/// paired with the `DeviceDescriptor` a probing collaborator would hand over.
use obliterator::drives::{DriveCapabilities, InterfaceClass};
use obliterator::DeviceDescriptor;
use std::io::Write;
use tempfile::NamedTempFile;

/// Byte the drive is filled with before sanitization
pub const RESIDUE: u8 = 0xAB;

#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(dead_code)]
pub enum MockDriveType {
    Hdd,
    SataSsd,
    Nvme,
    UsbFlash,
}

pub struct MockDrive {
    pub drive_type: MockDriveType,
    pub temp_file: NamedTempFile,
    pub descriptor: DeviceDescriptor,
}

impl MockDrive {
    pub fn new(
        drive_type: MockDriveType,
        size_kb: u64,
        capabilities: DriveCapabilities,
    ) -> std::io::Result<Self> {
        let mut temp_file = NamedTempFile::new()?;
        let size_bytes = size_kb * 1024;
        temp_file.write_all(&vec![RESIDUE; size_bytes as usize])?;
        temp_file.flush()?;

        let (interface, rotational, model) = match drive_type {
            MockDriveType::Hdd => (InterfaceClass::Sata, true, "ST2000DM008"),
            MockDriveType::SataSsd => (InterfaceClass::Sata, false, "Samsung SSD 870 EVO"),
            MockDriveType::Nvme => (InterfaceClass::Nvme, false, "WD_BLACK SN850X"),
            MockDriveType::UsbFlash => (InterfaceClass::Usb, false, "Cruzer Blade"),
        };
        let descriptor = DeviceDescriptor {
            path: temp_file
                .path()
                .to_str()
                .expect("temp path is UTF-8")
                .to_string(),
            interface,
            rotational,
            capacity_bytes: size_bytes,
            model: model.to_string(),
            serial: format!("MOCK-{:?}-{}", drive_type, size_kb).to_uppercase(),
            manufacturer: None,
            removable: drive_type == MockDriveType::UsbFlash,
            capabilities,
        };

        Ok(Self {
            drive_type,
            temp_file,
            descriptor,
        })
    }

    /// HDD without any secure erase support: plain overwrite
    pub fn create_hdd(size_kb: u64) -> std::io::Result<Self> {
        Self::new(MockDriveType::Hdd, size_kb, DriveCapabilities::default())
    }

    /// HDD that reports a Host Protected Area
    #[allow(dead_code)]
    pub fn create_hdd_with_hpa(size_kb: u64) -> std::io::Result<Self> {
        Self::new(
            MockDriveType::Hdd,
            size_kb,
            DriveCapabilities {
                hpa_present: true,
                ..Default::default()
            },
        )
    }

    #[allow(dead_code)]
    pub fn create_nvme_crypto(size_kb: u64) -> std::io::Result<Self> {
        Self::new(
            MockDriveType::Nvme,
            size_kb,
            DriveCapabilities {
                nvme_crypto_erase_supported: true,
                ..Default::default()
            },
        )
    }

    pub fn path(&self) -> &std::path::Path {
        self.temp_file.path()
    }

    pub fn contents(&self) -> Vec<u8> {
        std::fs::read(self.path()).expect("read mock drive")
    }

    #[allow(dead_code)]
    pub fn is_all(&self, byte: u8) -> bool {
        self.contents().iter().all(|&b| b == byte)
    }
}
