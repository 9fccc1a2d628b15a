// Post-sanitization sampling
//
// Only the first and last MiB are read back. This is a cost-bounded proxy,
// not proof that every sector was overwritten; `notes` always names the ranges.

use crate::algorithms::PatternKind;
use crate::drives::{DeviceDescriptor, HardwareEraser, HardwareStatus};
use crate::engine::SanitizationJob;
use crate::io::{BlockDevice, DeviceAccess};
use crate::verification::{ByteRange, VerificationMethod, VerificationOutcome, VerificationResult};
use crate::{SanitizeError, SanitizeResult};

pub const SAMPLE_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct VerificationSampler {
    sample_size: u64,
}

impl Default for VerificationSampler {
    fn default() -> Self {
        Self::new(SAMPLE_SIZE)
    }
}

impl VerificationSampler {
    pub fn new(sample_size: u64) -> Self {
        Self {
            sample_size: sample_size.max(1),
        }
    }

    /// Inspect a device after its job finished all passes.
    ///
    /// Returns `VerificationUnavailable` only when verification cannot be
    /// performed at all (device gone or unreadable); a failed or inconclusive
    /// check is a normal result.
    pub fn verify(
        &self,
        access: &dyn DeviceAccess,
        eraser: &dyn HardwareEraser,
        device: &DeviceDescriptor,
        job: &SanitizationJob,
    ) -> SanitizeResult<VerificationResult> {
        let method = job.executed_method();
        if method.is_hardware() {
            return self.verify_hardware(access, eraser, device, job);
        }

        let final_pattern = job.final_pattern().ok_or_else(|| {
            SanitizeError::VerificationUnavailable("no completed overwrite pass".to_string())
        })?;

        let mut dev = access.open(job.device_path()).map_err(|e| {
            SanitizeError::VerificationUnavailable(format!(
                "cannot open {}: {}",
                job.device_path(),
                e
            ))
        })?;
        self.verify_overwrite(dev.as_mut(), final_pattern)
    }

    fn verify_hardware(
        &self,
        access: &dyn DeviceAccess,
        eraser: &dyn HardwareEraser,
        device: &DeviceDescriptor,
        job: &SanitizationJob,
    ) -> SanitizeResult<VerificationResult> {
        if !access.is_present(job.device_path()) {
            return Err(SanitizeError::VerificationUnavailable(format!(
                "{} is no longer enumerable",
                job.device_path()
            )));
        }

        let method = job.executed_method();
        let status = eraser.erase_status(device, method);
        let (outcome, notes) = match status {
            HardwareStatus::Complete => (
                VerificationOutcome::Pass,
                format!("{} status register reports erase complete", method),
            ),
            other => {
                let inconclusive = SanitizeError::VerificationInconclusive(format!(
                    "{} status register read {:?}",
                    method, other
                ));
                tracing::warn!(device = %job.device_path(), error = %inconclusive, "hardware status not conclusive");
                (
                    VerificationOutcome::Unknown,
                    format!(
                        "{} status register reported {:?}; absence of a clean status read is not proof of failure",
                        method, other
                    ),
                )
            }
        };

        Ok(VerificationResult {
            method: VerificationMethod::HardwareStatus,
            outcome,
            notes,
            sampled_ranges: Vec::new(),
        })
    }

    /// Check the head and tail samples against the final pass's pattern
    pub fn verify_overwrite(
        &self,
        dev: &mut dyn BlockDevice,
        final_pattern: PatternKind,
    ) -> SanitizeResult<VerificationResult> {
        let capacity = dev.capacity();
        let ranges = self.sample_ranges(capacity);

        let mut findings = Vec::new();
        for range in &ranges {
            let mut buf = vec![0u8; range.length as usize];
            dev.read_at(range.offset, &mut buf).map_err(|e| {
                SanitizeError::VerificationUnavailable(format!(
                    "read of {} bytes at offset {} failed: {}",
                    range.length, range.offset, e
                ))
            })?;
            if let Some(problem) = Self::check_sample(&buf, final_pattern) {
                findings.push(format!("offset {}: {}", range.offset, problem));
            }
        }

        let checked = ranges
            .iter()
            .map(|r| format!("{}..{}", r.offset, r.offset + r.length))
            .collect::<Vec<_>>()
            .join(", ");
        let outcome = if findings.is_empty() {
            VerificationOutcome::Pass
        } else {
            VerificationOutcome::Fail
        };
        let mut notes = format!(
            "Sampled byte ranges {} of {} (partial check) against final pattern {}",
            checked, capacity, final_pattern
        );
        if !findings.is_empty() {
            notes.push_str("; ");
            notes.push_str(&findings.join("; "));
        }

        Ok(VerificationResult {
            method: VerificationMethod::Sampling,
            outcome,
            notes,
            sampled_ranges: ranges,
        })
    }

    /// First and last `sample_size` bytes, merged when they overlap
    pub fn sample_ranges(&self, capacity: u64) -> Vec<ByteRange> {
        if capacity == 0 {
            return Vec::new();
        }
        let size = self.sample_size.min(capacity);
        let head = ByteRange {
            offset: 0,
            length: size,
        };
        let tail_offset = capacity - size;
        if tail_offset <= size {
            return vec![ByteRange {
                offset: 0,
                length: capacity.min(2 * size),
            }];
        }
        vec![
            head,
            ByteRange {
                offset: tail_offset,
                length: size,
            },
        ]
    }

    fn check_sample(buf: &[u8], final_pattern: PatternKind) -> Option<String> {
        match final_pattern.fill_byte() {
            Some(expected) => buf
                .iter()
                .position(|&b| b != expected)
                .map(|pos| format!("byte {} is 0x{:02X}, expected 0x{:02X}", pos, buf[pos], expected)),
            // Random data that reads back as all zeros means the pass never landed
            None => buf
                .iter()
                .all(|&b| b == 0)
                .then(|| "sample is all zeros after a random final pass".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct MemDevice(Vec<u8>);

    impl BlockDevice for MemDevice {
        fn capacity(&self) -> u64 {
            self.0.len() as u64
        }
        fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
            let o = offset as usize;
            self.0[o..o + buf.len()].copy_from_slice(buf);
            Ok(())
        }
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
            let o = offset as usize;
            buf.copy_from_slice(&self.0[o..o + buf.len()]);
            Ok(())
        }
        fn flush_durable(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_sample_ranges_large_device() {
        let sampler = VerificationSampler::default();
        let ranges = sampler.sample_ranges(10 * SAMPLE_SIZE);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0], ByteRange { offset: 0, length: SAMPLE_SIZE });
        assert_eq!(
            ranges[1],
            ByteRange {
                offset: 9 * SAMPLE_SIZE,
                length: SAMPLE_SIZE
            }
        );
    }

    #[test]
    fn test_sample_ranges_small_device_covers_everything() {
        let sampler = VerificationSampler::default();
        let ranges = sampler.sample_ranges(SAMPLE_SIZE + 100);
        assert_eq!(ranges, vec![ByteRange { offset: 0, length: SAMPLE_SIZE + 100 }]);
        assert!(sampler.sample_ranges(0).is_empty());
    }

    #[test]
    fn test_zero_final_pass_detects_leftover_data() {
        let sampler = VerificationSampler::new(4096);
        let mut dev = MemDevice(vec![0u8; 64 * 1024]);
        let result = sampler.verify_overwrite(&mut dev, PatternKind::Zeros).unwrap();
        assert_eq!(result.outcome, VerificationOutcome::Pass);
        assert!(result.notes.contains("0..4096"));
        assert!(result.notes.contains("61440..65536"));

        dev.0[64 * 1024 - 1] = 0x7F;
        let result = sampler.verify_overwrite(&mut dev, PatternKind::Zeros).unwrap();
        assert_eq!(result.outcome, VerificationOutcome::Fail);
    }

    #[test]
    fn test_random_final_pass_fails_on_zeroed_sample() {
        let sampler = VerificationSampler::new(4096);
        let mut dev = MemDevice(vec![0u8; 64 * 1024]);
        let result = sampler.verify_overwrite(&mut dev, PatternKind::Random).unwrap();
        assert_eq!(result.outcome, VerificationOutcome::Fail);

        let noisy: Vec<u8> = (0..64 * 1024).map(|i| (i * 31 % 251) as u8).collect();
        let mut dev = MemDevice(noisy);
        let result = sampler.verify_overwrite(&mut dev, PatternKind::Random).unwrap();
        assert_eq!(result.outcome, VerificationOutcome::Pass);
    }

    #[test]
    fn test_fixed_byte_final_pass() {
        let sampler = VerificationSampler::new(1024);
        let mut dev = MemDevice(vec![0x55u8; 8192]);
        let result = sampler
            .verify_overwrite(&mut dev, PatternKind::FixedByte(0x55))
            .unwrap();
        assert_eq!(result.outcome, VerificationOutcome::Pass);
        let result = sampler.verify_overwrite(&mut dev, PatternKind::Zeros).unwrap();
        assert_eq!(result.outcome, VerificationOutcome::Fail);
    }
}
