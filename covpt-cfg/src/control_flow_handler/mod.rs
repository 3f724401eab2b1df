pub mod combined;
#[cfg(feature = "fuzz_bitmap")]
pub mod fuzz_bitmap;
#[cfg(feature = "log_control_flow_handler")]
pub mod log;

/// Kind of control flow transitions
#[derive(Debug, Clone, Copy)]
pub enum ControlFlowTransitionKind {
    /// Conditional Jcc
    ConditionalBranch,
    /// Direct JMP
    DirectJump,
    /// Direct CALL
    DirectCall,
    /// Indirect JMP
    IndirectJump,
    /// Indirect CALL
    IndirectCall,
    /// RET
    Return,
    /// Far transfers
    FarTransfer,
    /// New block
    ///
    /// The address the walker was armed at (by a decoded IP or a TIP
    /// packet), not reached via a COFI transition.
    NewBlock,
}

/// Control flow handler used for [`EdgeAnalyzer`][crate::EdgeAnalyzer]
pub trait HandleControlFlow {
    /// Error of control flow handler
    type Error: std::error::Error;

    /// Callback at begin of decoding.
    ///
    /// This is useful when using the same handler to process multiple Intel PT
    /// traces
    fn at_decode_begin(&mut self) -> Result<(), Self::Error>;

    /// Callback when the walker enters `block_addr`, whether by arming or by
    /// a COFI transition.
    ///
    /// Suggest marking `#[inline]` on the implementation
    fn on_new_block(
        &mut self,
        block_addr: u64,
        transition_kind: ControlFlowTransitionKind,
    ) -> Result<(), Self::Error>;

    /// Callback on a PSB packet.
    ///
    /// PSB resynchronizes the packet stream but does not drop pending TNT
    /// bits, so this must not reset anything the walker still needs. It
    /// exists purely for handlers that key off the last-seen block address
    /// (e.g. an edge-hash `prev_loc`), which PSB does invalidate.
    fn on_psb(&mut self) -> Result<(), Self::Error>;
}
