//! This module contains fuzz bitmap control flow handler logics.

use crate::{ControlFlowTransitionKind, HandleControlFlow};

/// [`HandleControlFlow`] implementor for maintaining fuzzing bitmap
pub struct FuzzBitmapControlFlowHandler<M: AsRef<[u8]> + AsMut<[u8]>> {
    /// The fuzzing bitmap needed to be maintained.
    fuzzing_bitmap: M,
    /// Previous location used to calculating fuzzing bitmap index.
    prev_loc: u64,
}

impl<M: AsRef<[u8]> + AsMut<[u8]>> FuzzBitmapControlFlowHandler<M> {
    /// Create a new fuzz bitmap control flow handler.
    ///
    /// You can pass things like `&mut [u8]`, `Vec<u8>`, `Box<[u8]>`, or even a mmaped structure.
    pub fn new(fuzzing_bitmap: M) -> Self {
        Self {
            fuzzing_bitmap,
            prev_loc: 0,
        }
    }

    /// Get fuzz bitmap size as a modulus for calculating bitmap index
    fn bitmap_size_modulus(&self) -> u64 {
        self.fuzzing_bitmap.as_ref().len() as u64
    }

    /// Update [`prev_loc`][FuzzBitmapControlFlowHandler::prev_loc] and calculate bitmap index
    #[expect(clippy::cast_possible_truncation)]
    fn on_new_loc(&mut self, new_loc: u64) -> usize {
        let bitmap_index = self.prev_loc ^ new_loc;
        self.set_new_loc(new_loc);
        (bitmap_index % self.bitmap_size_modulus()) as usize
    }

    /// Set [`prev_loc`][FuzzBitmapControlFlowHandler::prev_loc] without calculating bitmap index
    fn set_new_loc(&mut self, new_loc: u64) {
        self.prev_loc = new_loc >> 1;
    }

    /// Consume the handler and get the underlying bitmap back.
    pub fn into_inner(self) -> M {
        self.fuzzing_bitmap
    }

    /// Get shared access to the underlying bitmap.
    pub fn bitmap(&self) -> &[u8] {
        self.fuzzing_bitmap.as_ref()
    }
}

impl<M: AsRef<[u8]> + AsMut<[u8]>> HandleControlFlow for FuzzBitmapControlFlowHandler<M> {
    type Error = std::convert::Infallible;

    fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
        self.prev_loc = 0;
        Ok(())
    }

    #[inline]
    fn on_new_block(
        &mut self,
        block_addr: u64,
        transition_kind: ControlFlowTransitionKind,
    ) -> Result<(), Self::Error> {
        match transition_kind {
            ControlFlowTransitionKind::ConditionalBranch
            | ControlFlowTransitionKind::IndirectJump
            | ControlFlowTransitionKind::IndirectCall
            | ControlFlowTransitionKind::FarTransfer
            | ControlFlowTransitionKind::NewBlock
            | ControlFlowTransitionKind::DirectJump => {
                let bitmap_index = self.on_new_loc(block_addr);
                debug_assert!(
                    bitmap_index < self.fuzzing_bitmap.as_ref().len(),
                    "Unexpected OOB"
                );
                // SAFETY: bitmap_index is calculated by modulo against the bitmap's own length
                let count = unsafe { self.fuzzing_bitmap.as_mut().get_unchecked_mut(bitmap_index) };
                *count = count.saturating_add(1);
            }
            ControlFlowTransitionKind::Return | ControlFlowTransitionKind::DirectCall => {}
        }
        Ok(())
    }

    fn on_psb(&mut self) -> Result<(), Self::Error> {
        self.prev_loc = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conditional_branch_stamps_bitmap() {
        let mut handler = FuzzBitmapControlFlowHandler::new(vec![0u8; 64]);
        handler.on_new_block(0x1000, ControlFlowTransitionKind::NewBlock).unwrap();
        handler
            .on_new_block(0x1100, ControlFlowTransitionKind::ConditionalBranch)
            .unwrap();
        assert!(handler.bitmap().iter().any(|&count| count != 0));
    }

    #[test]
    fn direct_jump_stamps_bitmap() {
        let mut handler = FuzzBitmapControlFlowHandler::new(vec![0u8; 64]);
        handler.on_new_block(0x1000, ControlFlowTransitionKind::NewBlock).unwrap();
        handler
            .on_new_block(0x2000, ControlFlowTransitionKind::DirectJump)
            .unwrap();
        assert!(handler.bitmap().iter().any(|&count| count != 0));
    }

    #[test]
    fn psb_resets_prev_loc() {
        let mut handler = FuzzBitmapControlFlowHandler::new(vec![0u8; 64]);
        handler.on_new_block(0x1000, ControlFlowTransitionKind::NewBlock).unwrap();
        assert_ne!(handler.prev_loc, 0);
        handler.on_psb().unwrap();
        assert_eq!(handler.prev_loc, 0);
    }

    #[test]
    fn counts_saturate_instead_of_wrapping() {
        let mut handler = FuzzBitmapControlFlowHandler::new(vec![0u8; 64]);
        handler.at_decode_begin().unwrap();
        for _ in 0..300 {
            handler
                .on_new_block(0x1000, ControlFlowTransitionKind::ConditionalBranch)
                .unwrap();
        }
        assert!(handler.bitmap().iter().any(|&count| count == u8::MAX));
    }
}
