//! Error type for both the offline `perf.data` reader and (with the
//! `session` feature) the live `perf_event_open` session controller.

use thiserror::Error;

/// Errors surfaced by this crate.
///
/// Variants are grouped by the two kinds this crate can hit: malformed
/// on-disk `perf.data` (a session-level condition — the caller skips the
/// file and moves on) and fatal live-session setup failures (PT
/// unsupported, `perf_event_open`/`mmap` failure), which abort the caller's
/// init step.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum PerfError {
    /// Malformed `PERFILE2` header or truncated record in a `perf.data` file.
    #[error("Invalid perf.data")]
    InvalidPerfData,
    /// A `perf.data` record or header ran past the end of the buffer.
    #[error("Unexpected EOF")]
    UnexpectedEof,
    /// Couldn't read or parse `/sys/bus/event_source/devices/intel_pt/type`.
    #[cfg(feature = "session")]
    #[error("Intel PT not supported on this platform: {0}")]
    PtUnsupported(std::io::Error),
    /// `perf_event_open` returned an error.
    #[cfg(feature = "session")]
    #[error("perf_event_open failed: {0}")]
    PerfEventOpen(std::io::Error),
    /// `mmap` returned an error.
    #[cfg(feature = "session")]
    #[error("mmap failed: {0}")]
    Mmap(std::io::Error),
    /// An `ioctl` on the perf event fd failed.
    #[cfg(feature = "session")]
    #[error("ioctl failed: {0}")]
    Ioctl(std::io::Error),
}

pub(crate) type ReaderResult<T> = core::result::Result<T, PerfError>;
