use crate::{SanitizeError, SanitizeResult};
use ring::rand::{SecureRandom, SystemRandom};

/// Largest request handed to the OS generator in one call
const MAX_REQUEST: usize = 64 * 1024;

/// Cryptographically secure random source for overwrite passes (OS CSPRNG via ring)
pub struct SecureRng {
    rng: SystemRandom,
}

impl Default for SecureRng {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureRng {
    pub fn new() -> Self {
        Self {
            rng: SystemRandom::new(),
        }
    }

    pub fn fill_bytes(&self, dest: &mut [u8]) -> SanitizeResult<()> {
        for chunk in dest.chunks_mut(MAX_REQUEST) {
            self.rng.fill(chunk).map_err(|_| {
                SanitizeError::io(
                    "random pattern generation",
                    std::io::Error::other("system random generator failed"),
                )
            })?;
        }
        Ok(())
    }

    pub(crate) fn system(&self) -> &SystemRandom {
        &self.rng
    }
}

/// Convenience helper returning `len` random bytes
pub fn secure_random_bytes(len: usize) -> SanitizeResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    SecureRng::new().fill_bytes(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_large_buffers() {
        let buf = secure_random_bytes(MAX_REQUEST * 3 + 17).unwrap();
        assert_eq!(buf.len(), MAX_REQUEST * 3 + 17);
        // The tail past the last full chunk must be filled too
        assert!(buf[MAX_REQUEST * 3..].iter().any(|&b| b != 0));
    }

    #[test]
    fn test_consecutive_draws_differ() {
        let a = secure_random_bytes(64).unwrap();
        let b = secure_random_bytes(64).unwrap();
        assert_ne!(a, b);
    }
}
