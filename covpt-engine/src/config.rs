//! Init-time configuration for an [`crate::Engine`].

use std::path::PathBuf;

const DEFAULT_MAP_SIZE: usize = 1 << 16;

/// Collects the parameters an [`crate::Engine`] needs at `init` time.
///
/// There is no file-based configuration format in scope; callers construct
/// this directly (or via the C-ABI entry point, which builds one from its
/// arguments) and may override the size constants before calling
/// [`crate::Engine::init`].
pub struct EngineConfig {
    pub(crate) image_path: PathBuf,
    pub(crate) base: u64,
    pub(crate) max: u64,
    pub(crate) entry: u64,
    pub(crate) map_size: usize,
    pub(crate) aux_size: u64,
}

impl EngineConfig {
    /// Build a config with the default `map_size` (`2^16`) and `aux_size`
    /// (2 MiB, [`covpt_perf::DEFAULT_AUX_SIZE`]).
    pub fn new(image_path: impl Into<PathBuf>, base: u64, max: u64, entry: u64) -> Self {
        Self {
            image_path: image_path.into(),
            base,
            max,
            entry,
            map_size: DEFAULT_MAP_SIZE,
            aux_size: covpt_perf::DEFAULT_AUX_SIZE,
        }
    }

    /// Override the bitmap size. Must stay a sensible power of two for the
    /// AFL-style edge hash to spread evenly; not enforced here.
    pub fn map_size(&mut self, map_size: usize) -> &mut Self {
        self.map_size = map_size;
        self
    }

    /// Override the AUX ring size (must be a power of two, at least 1 MiB).
    pub fn aux_size(&mut self, aux_size: u64) -> &mut Self {
        self.aux_size = aux_size;
        self
    }
}
