//! Memory region enumeration and slab walking.

/// One committed, readable region of the target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
    pub protect: u32,
}

impl MemoryRegion {
    pub fn end(&self) -> u64 {
        self.base + self.size
    }
}

/// Split a region into bounded `(addr, len)` spans of at most `slab_bytes`,
/// each extended by `overlap` bytes into the next span so a marker that
/// straddles a slab boundary is still found exactly once: a match is
/// attributed to the slab whose proper range contains its first byte.
pub fn slab_spans(region: &MemoryRegion, slab_bytes: usize, overlap: usize) -> Vec<(u64, usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0u64;
    while offset < region.size {
        let proper = ((region.size - offset) as usize).min(slab_bytes);
        let extended = proper + overlap.min((region.size - offset) as usize - proper);
        spans.push((region.base + offset, extended, proper));
        offset += proper as u64;
    }
    spans
}

#[cfg(target_os = "windows")]
pub(crate) mod os {
    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Memory::{
        MEM_COMMIT, MEMORY_BASIC_INFORMATION, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE,
        PAGE_EXECUTE_WRITECOPY, PAGE_GUARD, PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
        PAGE_WRITECOPY, VirtualQueryEx,
    };

    use super::MemoryRegion;

    const PAGE_STEP: u64 = 0x1000;

    /// Lazily walks `VirtualQueryEx` over `[low, high)`, yielding only
    /// committed regions with a standard readable protection and no guard
    /// bit. Restartable (construct a new one) and finite per call.
    pub struct RegionIter {
        handle: HANDLE,
        current: u64,
        end: u64,
    }

    impl RegionIter {
        pub fn new(handle: HANDLE, low: u64, high: u64) -> Self {
            Self {
                handle,
                current: low,
                end: high,
            }
        }
    }

    impl Iterator for RegionIter {
        type Item = MemoryRegion;

        fn next(&mut self) -> Option<MemoryRegion> {
            while self.current < self.end {
                let mut info = MEMORY_BASIC_INFORMATION::default();
                // SAFETY: the handle is open with PROCESS_QUERY_INFORMATION and
                // the info struct is sized by the caller.
                let written = unsafe {
                    VirtualQueryEx(
                        self.handle,
                        Some(self.current as *const core::ffi::c_void),
                        &mut info,
                        size_of::<MEMORY_BASIC_INFORMATION>(),
                    )
                };
                if written == 0 {
                    self.current += PAGE_STEP;
                    continue;
                }

                let base = info.BaseAddress as u64;
                let size = info.RegionSize as u64;
                if size == 0 {
                    self.current += PAGE_STEP;
                    continue;
                }
                let next = (base + size).max(self.current + PAGE_STEP);

                let readable = (info.Protect
                    & (PAGE_READONLY
                        | PAGE_READWRITE
                        | PAGE_WRITECOPY
                        | PAGE_EXECUTE_READ
                        | PAGE_EXECUTE_READWRITE
                        | PAGE_EXECUTE_WRITECOPY))
                    .0
                    != 0;
                let blocked = (info.Protect & (PAGE_GUARD | PAGE_NOACCESS)).0 != 0;

                if info.State == MEM_COMMIT && readable && !blocked {
                    let clipped = size.min(self.end - base);
                    self.current = next;
                    return Some(MemoryRegion {
                        base,
                        size: clipped,
                        protect: info.Protect.0,
                    });
                }
                self.current = next;
            }
            None
        }
    }
}
