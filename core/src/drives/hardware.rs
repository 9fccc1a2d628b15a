// Vendor erase commands behind a capability interface
//
// The engine only talks to `HardwareEraser`. `CommandEraser` drives the usual
// Linux tools (hdparm, nvme-cli, blkdiscard); tests plug in doubles that
// simulate completion, failure or a hung command.

use crate::algorithms::SanitizationMethod;
use crate::drives::hidden_areas::{parse_max_sectors, HiddenArea};
use crate::drives::DeviceDescriptor;
use crate::{SanitizeError, SanitizeResult};
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// hdparm capacity changes return quickly or not at all
const HIDDEN_AREA_TIMEOUT: Duration = Duration::from_secs(30);

/// Erase/sanitize status as reported by the device after a vendor command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HardwareStatus {
    Complete,
    InProgress,
    Failed,
    Unknown,
}

pub trait HardwareEraser: Send + Sync {
    /// ATA SECURITY ERASE UNIT, normal or enhanced
    fn ata_secure_erase(
        &self,
        device: &DeviceDescriptor,
        enhanced: bool,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()>;

    /// NVMe sanitize with the crypto erase action
    fn nvme_crypto_erase(
        &self,
        device: &DeviceDescriptor,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()>;

    /// Discard every block on the device
    fn block_discard(
        &self,
        device: &DeviceDescriptor,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()>;

    /// Read back the erase status register for the given method
    fn erase_status(&self, device: &DeviceDescriptor, method: SanitizationMethod)
        -> HardwareStatus;

    /// Restore the native capacity hidden behind an HPA or DCO
    fn remove_hidden_area(&self, device: &DeviceDescriptor, area: HiddenArea)
        -> SanitizeResult<()>;
}

/// Runs vendor tools as child processes
pub struct CommandEraser {
    /// Temporary ATA user password set before SECURITY ERASE UNIT
    ata_password: String,
    poll_interval: Duration,
}

impl Default for CommandEraser {
    fn default() -> Self {
        Self::new("obliterator")
    }
}

impl CommandEraser {
    pub fn new(ata_password: impl Into<String>) -> Self {
        Self {
            ata_password: ata_password.into(),
            poll_interval: Duration::from_millis(200),
        }
    }

    /// Spawn a command and poll until it exits or the deadline passes.
    /// A command that outlives its deadline is killed.
    fn run_with_deadline(
        &self,
        cmd: &mut Command,
        label: &str,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        tracing::info!(command = label, ?deadline, "running vendor command");
        let started = Instant::now();
        let mut process = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SanitizeError::UnsupportedMethod(format!("{} could not be started: {}", label, e))
            })?;

        loop {
            match process.try_wait() {
                Ok(Some(status)) => {
                    if status.success() {
                        tracing::info!(
                            command = label,
                            elapsed = %humantime::format_duration(started.elapsed()),
                            "vendor command completed"
                        );
                        return Ok(());
                    }
                    let stderr = process
                        .wait_with_output()
                        .map(|o| String::from_utf8_lossy(&o.stderr).trim().to_string())
                        .unwrap_or_default();
                    return Err(SanitizeError::HardwareCommandFailed(format!(
                        "{} exited with {}: {}",
                        label, status, stderr
                    )));
                }
                Ok(None) => {
                    if let Some(limit) = deadline {
                        if started.elapsed() >= limit {
                            let _ = process.kill();
                            let _ = process.wait();
                            return Err(SanitizeError::Timeout(format!(
                                "{} exceeded {}",
                                label,
                                humantime::format_duration(limit)
                            )));
                        }
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    return Err(SanitizeError::HardwareCommandFailed(format!(
                        "{} could not be polled: {}",
                        label, e
                    )))
                }
            }
        }
    }

    /// Current and native max sectors of an ATA drive
    fn max_sectors(device: &DeviceDescriptor) -> SanitizeResult<(u64, u64)> {
        Self::command_output("hdparm", &["-N", &device.path])
            .and_then(|out| parse_max_sectors(&out))
            .ok_or_else(|| {
                SanitizeError::HardwareCommandFailed(format!(
                    "could not read max sectors of {}",
                    device.path
                ))
            })
    }

    fn command_output(program: &str, args: &[&str]) -> Option<String> {
        let output = Command::new(program).args(args).output().ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl HardwareEraser for CommandEraser {
    fn ata_secure_erase(
        &self,
        device: &DeviceDescriptor,
        enhanced: bool,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        let mut set_pass = Command::new("hdparm");
        set_pass.args([
            "--user-master",
            "u",
            "--security-set-pass",
            &self.ata_password,
            &device.path,
        ]);
        self.run_with_deadline(&mut set_pass, "hdparm --security-set-pass", deadline)?;

        let erase_flag = if enhanced {
            "--security-erase-enhanced"
        } else {
            "--security-erase"
        };
        let mut erase = Command::new("hdparm");
        erase.args(["--user-master", "u", erase_flag, &self.ata_password, &device.path]);
        self.run_with_deadline(&mut erase, "hdparm security erase", deadline)
    }

    fn nvme_crypto_erase(
        &self,
        device: &DeviceDescriptor,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        let mut cmd = Command::new("nvme");
        cmd.args(["sanitize", &device.path, "--sanact=4"]);
        self.run_with_deadline(&mut cmd, "nvme sanitize (crypto erase)", deadline)
    }

    fn block_discard(
        &self,
        device: &DeviceDescriptor,
        deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        let mut cmd = Command::new("blkdiscard");
        cmd.arg(&device.path);
        self.run_with_deadline(&mut cmd, "blkdiscard", deadline)
    }

    fn erase_status(
        &self,
        device: &DeviceDescriptor,
        method: SanitizationMethod,
    ) -> HardwareStatus {
        match method {
            SanitizationMethod::NvmeCryptoErase => {
                Self::command_output("nvme", &["sanitize-log", &device.path])
                    .map(|out| parse_nvme_sanitize_log(&out))
                    .unwrap_or(HardwareStatus::Unknown)
            }
            SanitizationMethod::AtaSecureErase | SanitizationMethod::AtaSecureEraseEnhanced => {
                Self::command_output("hdparm", &["-I", &device.path])
                    .map(|out| parse_hdparm_security(&out))
                    .unwrap_or(HardwareStatus::Unknown)
            }
            // blkdiscard has no completion register to read back
            SanitizationMethod::BlkDiscard | SanitizationMethod::MultiPassOverwrite => {
                HardwareStatus::Unknown
            }
        }
    }

    fn remove_hidden_area(&self, device: &DeviceDescriptor, area: HiddenArea) -> SanitizeResult<()> {
        match area {
            HiddenArea::Hpa => {
                let (current, native) = Self::max_sectors(device)?;
                if current >= native {
                    tracing::info!(device = %device.path, native, "no HPA to remove");
                    return Ok(());
                }
                tracing::info!(
                    device = %device.path,
                    current,
                    native,
                    hidden = native - current,
                    "removing HPA"
                );
                // `p` makes the new max address permanent across power cycles
                let mut cmd = Command::new("hdparm");
                cmd.args([
                    "--yes-i-know-what-i-am-doing",
                    "-N",
                    &format!("p{}", native),
                    &device.path,
                ]);
                self.run_with_deadline(&mut cmd, "hdparm -N", Some(HIDDEN_AREA_TIMEOUT))?;

                let (current, native) = Self::max_sectors(device)?;
                if current < native {
                    return Err(SanitizeError::HardwareCommandFailed(format!(
                        "HPA still present after hdparm -N: {}/{} sectors",
                        current, native
                    )));
                }
                Ok(())
            }
            HiddenArea::Dco => {
                tracing::warn!(device = %device.path, "restoring DCO factory configuration");
                let mut cmd = Command::new("hdparm");
                cmd.args(["--yes-i-know-what-i-am-doing", "--dco-restore", &device.path]);
                self.run_with_deadline(&mut cmd, "hdparm --dco-restore", Some(HIDDEN_AREA_TIMEOUT))
            }
        }
    }
}

/// Interpret the SSTAT field of `nvme sanitize-log`
pub(crate) fn parse_nvme_sanitize_log(output: &str) -> HardwareStatus {
    let sstat = output.lines().find_map(|line| {
        let line = line.trim();
        if !line.contains("SSTAT") {
            return None;
        }
        let value = line.rsplit(':').next()?.trim();
        let value = value.trim_start_matches("0x");
        u32::from_str_radix(value, 16).ok()
    });

    match sstat.map(|v| v & 0x7) {
        Some(0x1) => HardwareStatus::Complete,
        Some(0x2) => HardwareStatus::InProgress,
        Some(0x3) => HardwareStatus::Failed,
        _ => HardwareStatus::Unknown,
    }
}

/// After a successful SECURITY ERASE UNIT the drive drops back to
/// "not enabled" with the temporary password cleared.
pub(crate) fn parse_hdparm_security(output: &str) -> HardwareStatus {
    let Some(start) = output.find("Security:") else {
        return HardwareStatus::Unknown;
    };
    let section: Vec<String> = output[start..]
        .lines()
        .skip(1)
        .take_while(|l| l.starts_with('\t') || l.starts_with(' ') || l.trim().is_empty())
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect();

    let has = |needle: &str| section.iter().any(|l| l == needle);
    if has("not enabled") && has("not locked") {
        HardwareStatus::Complete
    } else if has("enabled") || has("locked") {
        HardwareStatus::Failed
    } else {
        HardwareStatus::Unknown
    }
}
