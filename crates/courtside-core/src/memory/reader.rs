use crate::error::Result;
use crate::memory::MemoryRegion;

/// Read access to a remote address space.
///
/// Implementations must treat short reads as failures: field decoding
/// depends on getting exactly the requested span or an error.
pub trait ReadMemory: Sync {
    fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>>;

    /// Committed, readable, non-guard regions intersecting `[low, high)`.
    /// Lazy and finite; restartable by calling again.
    fn regions(&self, low: u64, high: u64) -> Box<dyn Iterator<Item = MemoryRegion> + '_>;

    /// Load base of the main module in the target process.
    fn base_address(&self) -> u64;

    /// Image size of the main module.
    fn module_size(&self) -> u64;

    fn read_u16(&self, addr: u64) -> Result<u16> {
        let bytes = self.read_bytes(addr, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&self, addr: u64) -> Result<u32> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_i32(&self, addr: u64) -> Result<i32> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&self, addr: u64) -> Result<u64> {
        let bytes = self.read_bytes(addr, 8)?;
        Ok(u64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    fn read_f32(&self, addr: u64) -> Result<f32> {
        let bytes = self.read_bytes(addr, 4)?;
        Ok(f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f64(&self, addr: u64) -> Result<f64> {
        let bytes = self.read_bytes(addr, 8)?;
        Ok(f64::from_le_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }
}

/// Write access to a remote address space. Partial writes are failures.
pub trait WriteMemory: ReadMemory {
    fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()>;
}

#[cfg(target_os = "windows")]
pub use os::MemoryReader;

#[cfg(target_os = "windows")]
mod os {
    use core::ffi::c_void;

    use windows::Win32::System::Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory};

    use super::{ReadMemory, WriteMemory};
    use crate::error::{Error, Result};
    use crate::memory::process::ProcessHandle;
    use crate::memory::regions::{MemoryRegion, os::RegionIter};

    /// `ReadMemory`/`WriteMemory` over an attached process handle.
    pub struct MemoryReader<'a> {
        process: &'a ProcessHandle,
    }

    impl<'a> MemoryReader<'a> {
        pub fn new(process: &'a ProcessHandle) -> Self {
            Self { process }
        }
    }

    impl ReadMemory for MemoryReader<'_> {
        fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>> {
            let mut buffer = vec![0u8; len];
            let mut read = 0usize;
            // SAFETY: buffer outlives the call and is exactly `len` bytes.
            let ok = unsafe {
                ReadProcessMemory(
                    self.process.raw(),
                    addr as *const c_void,
                    buffer.as_mut_ptr() as *mut c_void,
                    len,
                    Some(&mut read),
                )
            };
            if ok.is_err() || read != len {
                return Err(Error::MemoryReadFailed {
                    address: addr,
                    message: format!("read {}/{} bytes", read, len),
                });
            }
            Ok(buffer)
        }

        fn regions(&self, low: u64, high: u64) -> Box<dyn Iterator<Item = MemoryRegion> + '_> {
            Box::new(RegionIter::new(self.process.raw(), low, high))
        }

        fn base_address(&self) -> u64 {
            self.process.base_address
        }

        fn module_size(&self) -> u64 {
            self.process.module_size
        }
    }

    impl WriteMemory for MemoryReader<'_> {
        fn write_bytes(&self, addr: u64, data: &[u8]) -> Result<()> {
            let mut written = 0usize;
            // SAFETY: data is a valid slice for the duration of the call.
            let ok = unsafe {
                WriteProcessMemory(
                    self.process.raw(),
                    addr as *const c_void,
                    data.as_ptr() as *const c_void,
                    data.len(),
                    Some(&mut written),
                )
            };
            if ok.is_err() || written != data.len() {
                return Err(Error::MemoryWriteFailed {
                    address: addr,
                    message: format!("wrote {}/{} bytes", written, data.len()),
                });
            }
            Ok(())
        }
    }
}
