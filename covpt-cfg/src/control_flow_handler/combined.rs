//! This module contains combined control flow handler logics.

use crate::HandleControlFlow;

use perfect_derive::perfect_derive;
use thiserror::Error;

/// A [`HandleControlFlow`] instance for combining two sub handlers
pub struct CombinedControlFlowHandler<H1, H2>
where
    H1: HandleControlFlow,
    H2: HandleControlFlow,
{
    handler1: H1,
    handler2: H2,
}

impl<H1, H2> CombinedControlFlowHandler<H1, H2>
where
    H1: HandleControlFlow,
    H2: HandleControlFlow,
{
    /// Create a new [`CombinedControlFlowHandler`]
    #[must_use]
    pub fn new(handler1: H1, handler2: H2) -> Self {
        Self { handler1, handler2 }
    }

    /// Consume the handler and get the original two handler
    pub fn into_inner(self) -> (H1, H2) {
        (self.handler1, self.handler2)
    }

    /// Get shared reference to handler1
    pub fn handler1(&self) -> &H1 {
        &self.handler1
    }

    /// Get unique reference to handler1
    pub fn handler1_mut(&mut self) -> &mut H1 {
        &mut self.handler1
    }

    /// Get shared reference to handler2
    pub fn handler2(&self) -> &H2 {
        &self.handler2
    }

    /// Get unique reference to handler2
    pub fn handler2_mut(&mut self) -> &mut H2 {
        &mut self.handler2
    }
}

/// Error for [`CombinedControlFlowHandler`]
#[derive(Error)]
#[perfect_derive(Debug)]
pub enum CombinedError<H1, H2>
where
    H1: HandleControlFlow,
    H2: HandleControlFlow,
{
    /// Error of the first handler
    #[error(transparent)]
    H1Error(H1::Error),
    /// Error of the second handler
    #[error(transparent)]
    H2Error(H2::Error),
}

impl<H1, H2> HandleControlFlow for CombinedControlFlowHandler<H1, H2>
where
    H1: HandleControlFlow,
    H2: HandleControlFlow,
{
    type Error = CombinedError<H1, H2>;

    fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
        self.handler1
            .at_decode_begin()
            .map_err(CombinedError::H1Error)?;
        self.handler2
            .at_decode_begin()
            .map_err(CombinedError::H2Error)?;

        Ok(())
    }

    fn on_new_block(
        &mut self,
        block_addr: u64,
        transition_kind: super::ControlFlowTransitionKind,
    ) -> Result<(), Self::Error> {
        self.handler1
            .on_new_block(block_addr, transition_kind)
            .map_err(CombinedError::H1Error)?;
        self.handler2
            .on_new_block(block_addr, transition_kind)
            .map_err(CombinedError::H2Error)?;

        Ok(())
    }

    fn on_psb(&mut self) -> Result<(), Self::Error> {
        self.handler1.on_psb().map_err(CombinedError::H1Error)?;
        self.handler2.on_psb().map_err(CombinedError::H2Error)?;

        Ok(())
    }
}
