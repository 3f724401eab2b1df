//! This module contains definition of errors made when analyzing with [`EdgeAnalyzer`][crate::EdgeAnalyzer].
//!
use perfect_derive::perfect_derive;
use thiserror::Error;

use crate::HandleControlFlow;

/// Error for edge analysis.
///
/// This only covers session-level errors that end the current decode.
/// Walk-local conditions (missing COFI record, out-of-range branch target)
/// are logged and terminate only the current walk; they do not surface here.
#[derive(Error)]
#[perfect_derive(Debug)]
#[non_exhaustive]
pub enum AnalyzerError<H: HandleControlFlow> {
    /// Control flow handler error
    #[error("Control flow handler error")]
    ControlFlowHandler(#[source] H::Error),
    /// Semantic-level invalid packet
    #[error("Invalid packet")]
    InvalidPacket,
}

pub(crate) type AnalyzerResult<T, H> = core::result::Result<T, AnalyzerError<H>>;
