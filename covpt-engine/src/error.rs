//! Error type for the engine's `init`/`start`/`stop` surface.

use thiserror::Error;

/// Errors surfaced by [`crate::Engine`].
///
/// Decode-level conditions (unknown packet, out-of-range branch target) are
/// not represented here: per the session-error/walk-local-error policy they
/// are logged and end the current decode, not surfaced as a `Result::Err`.
/// Everything in this enum is a fatal-init or session-setup failure.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EngineError {
    /// The target image couldn't be read.
    #[error("failed to read target image: {0}")]
    Io(#[from] std::io::Error),
    /// A `covpt-perf` session operation failed (PT unsupported,
    /// `perf_event_open`/`mmap`/`ioctl` failure).
    #[error("perf session error: {0}")]
    Perf(#[source] covpt_perf::PerfError),
    /// The image file's length didn't match `max - base`.
    #[error("image size mismatch: expected {expected} bytes, got {actual}")]
    ImageSizeMismatch { expected: u64, actual: u64 },
    /// `stop` was called without a prior `start`.
    #[error("stop called without an active trace session")]
    NotStarted,
}
