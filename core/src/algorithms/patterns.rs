// Overwrite pattern sequences
//
// Pass 1 never matches the final pass (for two or more passes) and every
// sequence carries at least one cryptographically random pass.

use crate::algorithms::{PatternKind, MAX_PASSES, MIN_PASSES};
use crate::crypto::secure_rng::SecureRng;
use crate::drives::DeviceDescriptor;
use crate::{SanitizeError, SanitizeResult};

/// Overwrite pass count when the caller does not override it.
/// Flash and removable media get fewer passes to limit wear.
pub fn default_pass_count(device: &DeviceDescriptor) -> u32 {
    if device.rotational && !device.is_removable() {
        5
    } else {
        3
    }
}

pub fn check_pass_count(pass_count: u32) -> SanitizeResult<()> {
    if !(MIN_PASSES..=MAX_PASSES).contains(&pass_count) {
        return Err(SanitizeError::Config(format!(
            "pass count {} outside [{}, {}]",
            pass_count, MIN_PASSES, MAX_PASSES
        )));
    }
    Ok(())
}

/// Default sequence: random, ones, alternating random / 0x55, final zeros
pub fn default_sequence(pass_count: u32) -> Vec<PatternKind> {
    match pass_count {
        0 => Vec::new(),
        1 => vec![PatternKind::Random],
        2 => vec![PatternKind::Random, PatternKind::Zeros],
        n => {
            let mut seq = Vec::with_capacity(n as usize);
            seq.push(PatternKind::Random);
            seq.push(PatternKind::Ones);
            for i in 0..(n - 3) {
                if i % 2 == 0 {
                    seq.push(PatternKind::Random);
                } else {
                    seq.push(PatternKind::FixedByte(0x55));
                }
            }
            seq.push(PatternKind::Zeros);
            seq
        }
    }
}

/// Reject caller-supplied sequences that break the overwrite guarantees
pub fn validate_sequence(sequence: &[PatternKind]) -> SanitizeResult<()> {
    check_pass_count(sequence.len() as u32)?;

    if sequence
        .iter()
        .any(|p| matches!(p, PatternKind::VendorCommand(_)))
    {
        return Err(SanitizeError::Config(
            "vendor commands cannot appear in an overwrite sequence".to_string(),
        ));
    }

    if !sequence.contains(&PatternKind::Random) {
        return Err(SanitizeError::Config(
            "overwrite sequence needs at least one random pass".to_string(),
        ));
    }

    if sequence.len() >= 2 && sequence.first() == sequence.last() {
        return Err(SanitizeError::Config(format!(
            "first and final pass both use {}",
            sequence[0]
        )));
    }

    Ok(())
}

/// Fills write buffers with one pass's pattern
pub struct PatternFiller {
    kind: PatternKind,
    rng: Option<SecureRng>,
}

impl PatternFiller {
    pub fn new(kind: PatternKind) -> SanitizeResult<Self> {
        let rng = match kind {
            PatternKind::Random => Some(SecureRng::new()),
            PatternKind::VendorCommand(_) => {
                return Err(SanitizeError::Config(format!(
                    "{} is not an overwrite pattern",
                    kind
                )))
            }
            _ => None,
        };
        Ok(Self { kind, rng })
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn fill(&mut self, buffer: &mut [u8]) -> SanitizeResult<()> {
        match (&self.rng, self.kind.fill_byte()) {
            (Some(rng), _) => rng.fill_bytes(buffer),
            (None, Some(byte)) => {
                buffer.fill(byte);
                Ok(())
            }
            (None, None) => Err(SanitizeError::Config(format!(
                "no fill source for {}",
                self.kind
            ))),
        }
    }
}
