//! Module handling diagnostic information.

use crate::{EdgeAnalyzer, HandleControlFlow};

/// Diagnostic information for [`EdgeAnalyzer`].
///
/// This struct can be retrieved from [`EdgeAnalyzer::diagnose`]
pub struct DiagnosticInformation {
    /// Size of the COFI map, i.e., number of branch-relevant instructions indexed
    pub cofi_map_size: usize,
    /// Number of outcomes currently pending in the TNT cache
    #[cfg(feature = "more_diagnose")]
    pub tnt_cache_pending: usize,
}

impl<'a, H: HandleControlFlow> EdgeAnalyzer<'a, H> {
    /// Get diagnostic information
    #[must_use]
    pub fn diagnose(&self) -> DiagnosticInformation {
        DiagnosticInformation {
            cofi_map_size: self.cofi_map.size(),
            #[cfg(feature = "more_diagnose")]
            tnt_cache_pending: self.tnt_cache.count(),
        }
    }
}
