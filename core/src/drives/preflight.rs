// Preflight validation - the precondition contract for starting a job
//
// The engine only accepts a `ValidatedDevice`, which can only be produced here.

use crate::drives::DeviceDescriptor;
use crate::{SanitizeError, SanitizeResult};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PreflightOptions {
    /// Proceed even if a partition of the device is mounted
    pub allow_mounted: bool,
    /// Accept a regular file as the target (image files, tests)
    pub allow_regular_file: bool,
    /// Refuse to run unless the effective uid is 0
    pub require_root: bool,
    /// Mount table to consult
    pub mounts_path: String,
}

impl Default for PreflightOptions {
    fn default() -> Self {
        Self {
            allow_mounted: false,
            allow_regular_file: false,
            require_root: true,
            mounts_path: "/proc/mounts".to_string(),
        }
    }
}

/// Proof that a descriptor passed preflight checks
#[derive(Debug, Clone)]
pub struct ValidatedDevice {
    descriptor: DeviceDescriptor,
    validated_at: DateTime<Utc>,
}

impl ValidatedDevice {
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    pub fn path(&self) -> &str {
        &self.descriptor.path
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }
}

/// Run every precondition check; the first failure is returned
pub fn validate_device(
    descriptor: &DeviceDescriptor,
    options: &PreflightOptions,
) -> SanitizeResult<ValidatedDevice> {
    if options.require_root && !is_root() {
        return Err(SanitizeError::Precondition(
            "root privileges are required to sanitize block devices".to_string(),
        ));
    }

    let path = descriptor.path.as_str();
    if path.trim().is_empty() {
        return Err(SanitizeError::Precondition(
            "device path is empty".to_string(),
        ));
    }

    let metadata = fs::metadata(path)
        .map_err(|e| SanitizeError::Precondition(format!("device {} not found: {}", path, e)))?;
    let file_type = metadata.file_type();
    let acceptable = file_type.is_block_device()
        || (options.allow_regular_file && file_type.is_file());
    if !acceptable {
        return Err(SanitizeError::Precondition(format!(
            "{} is not a block device",
            path
        )));
    }

    if descriptor.capacity_bytes == 0 {
        return Err(SanitizeError::Precondition(format!(
            "{} reports zero capacity",
            path
        )));
    }

    if descriptor.capabilities.ata_security_locked {
        return Err(SanitizeError::Precondition(format!(
            "{} is ATA security locked",
            path
        )));
    }

    if !options.allow_mounted && is_mounted(path, &options.mounts_path)? {
        return Err(SanitizeError::Precondition(format!(
            "{} (or one of its partitions) is mounted",
            path
        )));
    }

    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            SanitizeError::Precondition(format!("{} is not readable/writable: {}", path, e))
        })?;

    tracing::debug!(device = %path, "preflight checks passed");

    Ok(ValidatedDevice {
        descriptor: descriptor.clone(),
        validated_at: Utc::now(),
    })
}

/// Check the mount table for the device or any of its partitions
pub fn is_mounted(device_path: &str, mounts_path: &str) -> SanitizeResult<bool> {
    if !Path::new(mounts_path).exists() {
        return Ok(false);
    }
    let mounts = fs::read_to_string(mounts_path)
        .map_err(|e| SanitizeError::io(format!("reading {}", mounts_path), e))?;

    Ok(mounts.lines().any(|line| {
        line.split_whitespace()
            .next()
            .map(|source| is_device_or_partition(source, device_path))
            .unwrap_or(false)
    }))
}

/// `/dev/sda` owns `/dev/sda1` but not `/dev/sdaa1`. Names ending in a digit
/// (`/dev/nvme0n1`, `/dev/mmcblk0`) number partitions after a `p`.
fn is_device_or_partition(source: &str, device_path: &str) -> bool {
    let Some(rest) = source.strip_prefix(device_path) else {
        return false;
    };
    if rest.is_empty() {
        return true;
    }
    let number = if device_path.ends_with(|c: char| c.is_ascii_digit()) {
        match rest.strip_prefix('p') {
            Some(n) => n,
            None => return false,
        }
    } else {
        rest
    };
    !number.is_empty() && number.chars().all(|c| c.is_ascii_digit())
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
