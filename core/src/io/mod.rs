// Device I/O abstraction
//
// The engine and the verification sampler only see `BlockDevice`. The file
// backend works for block nodes and image files alike; tests substitute
// devices that fail or vanish on cue.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::os::unix::fs::FileExt;
use std::path::Path;

pub trait BlockDevice: Send {
    /// Addressable size in bytes
    fn capacity(&self) -> u64;

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Commit all buffered writes to stable storage
    fn flush_durable(&mut self) -> io::Result<()>;
}

/// Opens devices by path
pub trait DeviceAccess: Send + Sync {
    fn open(&self, path: &str) -> io::Result<Box<dyn BlockDevice>>;

    /// Whether the device node is still enumerable
    fn is_present(&self, path: &str) -> bool;
}

pub struct FileDevice {
    file: File,
    capacity: u64,
}

impl FileDevice {
    pub fn open(path: &str) -> io::Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        // metadata().len() is 0 for block nodes; seeking to the end works for both
        let capacity = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        Ok(Self { file, capacity })
    }
}

impl BlockDevice for FileDevice {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.write_all_at(buf, offset)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact_at(buf, offset)
    }

    fn flush_durable(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileDeviceAccess;

impl DeviceAccess for FileDeviceAccess {
    fn open(&self, path: &str) -> io::Result<Box<dyn BlockDevice>> {
        Ok(Box::new(FileDevice::open(path)?))
    }

    fn is_present(&self, path: &str) -> bool {
        Path::new(path).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_capacity_and_positioned_io() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0xABu8; 8192]).unwrap();
        tmp.flush().unwrap();

        let mut dev = FileDeviceAccess
            .open(tmp.path().to_str().unwrap())
            .unwrap();
        assert_eq!(dev.capacity(), 8192);

        dev.write_at(4096, &[0u8; 512]).unwrap();
        dev.flush_durable().unwrap();

        let mut buf = [0xFFu8; 512];
        dev.read_at(4096, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
        dev.read_at(0, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_missing_device() {
        assert!(!FileDeviceAccess.is_present("/nonexistent/obliterator-dev"));
        assert!(FileDeviceAccess.open("/nonexistent/obliterator-dev").is_err());
    }
}
