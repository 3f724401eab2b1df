//! Live Intel PT session controller: opens a PT event on a pid, mmaps the
//! header and aux rings, and on [`PtSession::stop`] freezes the event and
//! hands back a contiguous snapshot of the traced bytes.
//!
//! The decoder, COFI map, and bitmap live elsewhere; this module's job ends
//! at "here are the bytes the kernel captured."

use std::fs;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::PerfError;
use crate::sys::{
    self, PERF_EVENT_IOC_DISABLE, PERF_EVENT_IOC_ENABLE, PerfEventAttr, PerfEventMmapPage,
};

/// Size of the mmapped header region. One page is enough; we don't use the
/// regular (non-AUX) sample ring, so no extra data pages are requested.
const HEADER_MMAP_LEN: usize = 4096;

/// Default power-of-two AUX ring size (2 MiB), used unless the caller
/// supplies its own via [`PtSession::open_with_aux_size`].
pub const DEFAULT_AUX_SIZE: u64 = 2 * 1024 * 1024;

type SessionResult<T> = Result<T, PerfError>;

/// Read the PT perf type from platform metadata.
///
/// Per the external interface contract, failure to open or parse this file
/// is a fatal init error.
pub fn intel_pt_perf_type() -> SessionResult<u32> {
    let contents = fs::read_to_string(sys::INTEL_PT_TYPE_FILE).map_err(PerfError::PtUnsupported)?;
    contents
        .trim()
        .parse()
        .map_err(|_| PerfError::PtUnsupported(io::Error::new(io::ErrorKind::InvalidData, "non-numeric PT type")))
}

struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: the region is read through atomics or treated as an immutable
// snapshot; no `&mut` aliasing is exposed.
unsafe impl Send for MmapRegion {}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` came from a successful `mmap` of this exact length.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), self.len);
        }
    }
}

/// An open Intel PT trace session on a single pid.
///
/// Acquired on [`PtSession::open`], released on drop. Only one session per
/// pid may be open at a time; the kernel event is exclusive to this fd.
pub struct PtSession {
    fd: OwnedFd,
    header: MmapRegion,
    aux: MmapRegion,
}

impl PtSession {
    /// Open a PT perf event on `pid` with the default AUX ring size.
    ///
    /// The tracee is expected to enable tracing itself via `exec`
    /// (`enable_on_exec=1`); call [`Self::enable`] only if the pid is
    /// already past its exec point.
    pub fn open(pid: libc::pid_t) -> SessionResult<Self> {
        Self::open_with_aux_size(pid, DEFAULT_AUX_SIZE)
    }

    /// Open a PT perf event on `pid`, sizing the AUX ring to `aux_size`
    /// bytes (must be a power of two).
    pub fn open_with_aux_size(pid: libc::pid_t, aux_size: u64) -> SessionResult<Self> {
        debug_assert!(aux_size.is_power_of_two());
        let pt_type = intel_pt_perf_type()?;
        let attr = PerfEventAttr::intel_pt(pt_type);

        // SAFETY: `attr` is a fully initialized `PerfEventAttr`.
        let raw_fd = unsafe { sys::perf_event_open(&attr, pid, -1, -1, 0) };
        if raw_fd < 0 {
            return Err(PerfError::PerfEventOpen(io::Error::last_os_error()));
        }
        // SAFETY: `raw_fd` is a valid, freshly-owned fd from `perf_event_open`.
        let fd = unsafe { OwnedFd::from_raw_fd(raw_fd as RawFd) };

        let header = Self::mmap_region(&fd, HEADER_MMAP_LEN, 0, true)?;

        // SAFETY: `header` was just mmapped with length `HEADER_MMAP_LEN`,
        // large enough to hold `PerfEventMmapPage`.
        let header_page = header.ptr.as_ptr().cast::<PerfEventMmapPage>();
        let aux_offset = HEADER_MMAP_LEN as u64;
        unsafe {
            (*header_page).aux_offset = aux_offset;
            (*header_page).aux_size = aux_size;
        }

        let aux = Self::mmap_region(&fd, aux_size as usize, aux_offset as i64, false)?;

        log::debug!("opened PT session on pid {pid} (type {pt_type}, aux size {aux_size:#x})");
        Ok(Self { fd, header, aux })
    }

    fn mmap_region(fd: &OwnedFd, len: usize, offset: i64, writable: bool) -> SessionResult<MmapRegion> {
        let prot = if writable {
            libc::PROT_READ | libc::PROT_WRITE
        } else {
            libc::PROT_READ
        };
        // SAFETY: `fd` is open and `len`/`offset` describe a region the
        // kernel has sized for this perf event (header page or AUX area).
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                prot,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                offset,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(PerfError::Mmap(io::Error::last_os_error()));
        }
        Ok(MmapRegion {
            // SAFETY: `mmap` only returns null on failure, already handled above.
            ptr: NonNull::new(ptr.cast()).expect("mmap returned null pointer on success"),
            len,
        })
    }

    fn header_page(&self) -> &PerfEventMmapPage {
        // SAFETY: `header` was mmapped with enough length for this struct
        // and lives as long as `self`.
        unsafe { &*self.header.ptr.as_ptr().cast::<PerfEventMmapPage>() }
    }

    /// `PERF_EVENT_IOC_ENABLE`: start tracing immediately (as opposed to
    /// relying on `enable_on_exec`).
    pub fn enable(&self) -> SessionResult<()> {
        self.ioctl(PERF_EVENT_IOC_ENABLE)
    }

    /// `PERF_EVENT_IOC_DISABLE`: freeze the event. After this call the aux
    /// ring no longer advances and `aux_head`/`aux_tail` are stable.
    pub fn disable(&self) -> SessionResult<()> {
        self.ioctl(PERF_EVENT_IOC_DISABLE)
    }

    fn ioctl(&self, request: libc::c_ulong) -> SessionResult<()> {
        // SAFETY: `self.fd` is a valid perf_event fd; `request` is one of
        // the `PERF_EVENT_IOC_*` constants, which take no argument.
        let ret = unsafe { libc::ioctl(self.fd.as_raw_fd(), request, 0) };
        if ret < 0 {
            return Err(PerfError::Ioctl(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Disable the event, then copy out a contiguous snapshot of the bytes
    /// the kernel captured between `aux_tail` and `aux_head`.
    ///
    /// `aux_head`/`aux_tail` are read with sequentially consistent loads, as
    /// required when racing a kernel writer; by the time this is called the
    /// event is disabled so the snapshot is stable.
    pub fn stop(&self) -> SessionResult<Vec<u8>> {
        self.disable()?;

        let header = self.header_page();
        let head_ptr = std::ptr::addr_of!(header.aux_head).cast::<AtomicU64>();
        let tail_ptr = std::ptr::addr_of!(header.aux_tail).cast::<AtomicU64>();
        // SAFETY: both fields are plain `u64`s with no concurrent kernel
        // writer once the event is disabled; atomic access is for the
        // memory-ordering guarantee, not mutual exclusion.
        let head = unsafe { (*head_ptr).load(Ordering::SeqCst) };
        let tail = unsafe { (*tail_ptr).load(Ordering::SeqCst) };

        let aux_slice = self.aux_slice();
        let mask = aux_slice.len() as u64 - 1;
        debug_assert!(aux_slice.len().is_power_of_two());

        let available = head.saturating_sub(tail);
        let mut out = Vec::with_capacity(available as usize);
        let mut pos = tail;
        while pos < head {
            let idx = (pos & mask) as usize;
            out.push(aux_slice[idx]);
            pos += 1;
        }
        log::debug!("drained {} aux bytes (head {head:#x}, tail {tail:#x})", out.len());
        Ok(out)
    }

    fn aux_slice(&self) -> &[u8] {
        // SAFETY: `aux` was mmapped read-only with length `AUX_SIZE` and
        // lives as long as `self`.
        unsafe { std::slice::from_raw_parts(self.aux.ptr.as_ptr(), self.aux.len) }
    }
}

#[cfg(test)]
mod tests {
    // `PtSession::stop`'s wraparound extraction is pure arithmetic over a
    // mask and a byte slice; exercise it directly without a real mmap.
    fn drain(ring: &[u8], tail: u64, head: u64) -> Vec<u8> {
        let mask = ring.len() as u64 - 1;
        let mut out = Vec::with_capacity((head - tail) as usize);
        let mut pos = tail;
        while pos < head {
            out.push(ring[(pos & mask) as usize]);
            pos += 1;
        }
        out
    }

    #[test]
    fn drain_without_wrap() {
        let ring: Vec<u8> = (0..8).collect();
        assert_eq!(drain(&ring, 2, 5), vec![2, 3, 4]);
    }

    #[test]
    fn drain_wraps_around_ring_end() {
        let ring: Vec<u8> = (0..8).collect();
        // tail=6, head=11 -> indices 6,7,0,1,2 after masking by 7
        assert_eq!(drain(&ring, 6, 11), vec![6, 7, 0, 1, 2]);
    }
}
