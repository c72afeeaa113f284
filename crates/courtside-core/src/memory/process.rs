//! Process attach: executable-name lookup, handle ownership, module query.

use tracing::{debug, info};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, PROCESSENTRY32W,
    Process32FirstW, Process32NextW, TH32CS_SNAPMODULE, TH32CS_SNAPMODULE32, TH32CS_SNAPPROCESS,
};
use windows::Win32::System::Threading::{
    OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
    PROCESS_VM_WRITE,
};

use crate::error::{Error, Result};

/// A process visible in the system snapshot.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

fn wide_to_string(wide: &[u16]) -> String {
    let len = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..len])
}

/// Enumerate running processes via a Toolhelp snapshot.
pub fn list_processes() -> Result<Vec<ProcessInfo>> {
    // SAFETY: snapshot handle is closed before returning.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) }
        .map_err(|e| Error::ProcessOpenFailed(format!("snapshot failed: {e}")))?;

    let mut processes = Vec::new();
    let mut entry = PROCESSENTRY32W {
        dwSize: size_of::<PROCESSENTRY32W>() as u32,
        ..Default::default()
    };

    // SAFETY: entry.dwSize is initialized and the snapshot is valid.
    unsafe {
        if Process32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                processes.push(ProcessInfo {
                    pid: entry.th32ProcessID,
                    name: wide_to_string(&entry.szExeFile),
                });
                if Process32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
    }

    Ok(processes)
}

fn find_pid(exe_name: &str) -> Result<u32> {
    list_processes()?
        .into_iter()
        .find(|p| p.name.eq_ignore_ascii_case(exe_name))
        .map(|p| p.pid)
        .ok_or_else(|| Error::ProcessNotFound(exe_name.to_string()))
}

fn find_module(pid: u32, module_name: &str) -> Result<(u64, u64)> {
    // SAFETY: snapshot handle is closed before returning.
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, pid) }
        .map_err(|e| Error::ModuleNotFound(format!("{module_name}: snapshot failed: {e}")))?;

    let mut entry = MODULEENTRY32W {
        dwSize: size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };

    let mut found = None;
    // SAFETY: entry.dwSize is initialized and the snapshot is valid.
    unsafe {
        if Module32FirstW(snapshot, &mut entry).is_ok() {
            loop {
                let name = wide_to_string(&entry.szModule);
                if name.eq_ignore_ascii_case(module_name) {
                    found = Some((entry.modBaseAddr as u64, entry.modBaseSize as u64));
                    break;
                }
                if Module32NextW(snapshot, &mut entry).is_err() {
                    break;
                }
            }
        }
        let _ = CloseHandle(snapshot);
    }

    found.ok_or_else(|| Error::ModuleNotFound(module_name.to_string()))
}

/// Exclusive owner of an open process handle.
///
/// One handle per target pid; all reads and writes go through it, and it is
/// closed on drop. The module base and image size are queried once at attach
/// time — both are fixed for the lifetime of the process.
pub struct ProcessHandle {
    handle: HANDLE,
    pub pid: u32,
    pub base_address: u64,
    pub module_size: u64,
    pub writable: bool,
}

impl ProcessHandle {
    /// Find a process by executable name (case-insensitive) and open it.
    ///
    /// `writable` requests write access in addition to read; field encoding
    /// needs it, discovery does not.
    pub fn find_and_open(exe_name: &str, writable: bool) -> Result<Self> {
        let pid = find_pid(exe_name)?;
        debug!("Found {} with pid {}", exe_name, pid);
        Self::open_pid(pid, exe_name, writable)
    }

    /// Open a known pid. `module_name` is the main module whose base/size
    /// anchor RVA resolution (normally the executable itself).
    pub fn open_pid(pid: u32, module_name: &str, writable: bool) -> Result<Self> {
        let mut access = PROCESS_QUERY_INFORMATION | PROCESS_VM_READ;
        if writable {
            access |= PROCESS_VM_WRITE | PROCESS_VM_OPERATION;
        }

        // SAFETY: access rights are validated by the OS; the handle is owned
        // by the returned struct and closed on drop.
        let handle = unsafe { OpenProcess(access, false, pid) }.map_err(|e| {
            Error::ProcessOpenFailed(format!("pid {pid}: {e} (insufficient privilege?)"))
        })?;

        let (base_address, module_size) = match find_module(pid, module_name) {
            Ok(pair) => pair,
            Err(e) => {
                // SAFETY: handle was just opened by us.
                unsafe {
                    let _ = CloseHandle(handle);
                }
                return Err(e);
            }
        };

        info!(
            "Attached to {} (pid {}, base {:#x}, image {:#x} bytes, writable={})",
            module_name, pid, base_address, module_size, writable
        );

        Ok(Self {
            handle,
            pid,
            base_address,
            module_size,
            writable,
        })
    }

    pub(crate) fn raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // SAFETY: the handle is exclusively owned and not yet closed.
        unsafe {
            let _ = CloseHandle(self.handle);
        }
        debug!("Closed process handle for pid {}", self.pid);
    }
}

// The handle is only used for read/query syscalls, which the OS allows from
// any thread concurrently.
unsafe impl Send for ProcessHandle {}
unsafe impl Sync for ProcessHandle {}
