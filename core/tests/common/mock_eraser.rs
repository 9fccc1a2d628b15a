/// Scriptable stand-in for the vendor erase commands
use obliterator::drives::{HardwareEraser, HardwareStatus, HiddenArea};
use obliterator::{DeviceDescriptor, SanitizationMethod, SanitizeError, SanitizeResult};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Script {
    /// Command succeeds, status register reads `status`
    Complete(HardwareStatus),
    /// Command exits with an error
    Abort,
    /// Command blocks for the given time, then succeeds
    Stall(Duration),
}

pub struct MockEraser {
    script: Script,
    calls: AtomicU32,
}

#[allow(dead_code)]
impl MockEraser {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn run(&self) -> SanitizeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script {
            Script::Complete(_) => Ok(()),
            Script::Abort => Err(SanitizeError::HardwareCommandFailed(
                "sanitize command aborted by controller".to_string(),
            )),
            Script::Stall(d) => {
                std::thread::sleep(d);
                Ok(())
            }
        }
    }
}

impl HardwareEraser for MockEraser {
    fn ata_secure_erase(
        &self,
        _device: &DeviceDescriptor,
        _enhanced: bool,
        _deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        self.run()
    }

    fn nvme_crypto_erase(
        &self,
        _device: &DeviceDescriptor,
        _deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        self.run()
    }

    fn block_discard(
        &self,
        _device: &DeviceDescriptor,
        _deadline: Option<Duration>,
    ) -> SanitizeResult<()> {
        self.run()
    }

    fn erase_status(&self, _device: &DeviceDescriptor, _method: SanitizationMethod) -> HardwareStatus {
        match self.script {
            Script::Complete(status) => status,
            _ => HardwareStatus::Complete,
        }
    }

    /// Hidden areas follow the script too: an aborting drive refuses to drop them
    fn remove_hidden_area(&self, _device: &DeviceDescriptor, area: HiddenArea) -> SanitizeResult<()> {
        match self.script {
            Script::Abort => Err(SanitizeError::HardwareCommandFailed(format!(
                "{} removal rejected",
                area
            ))),
            _ => Ok(()),
        }
    }
}
