//! The CFG walker: a (mostly) pure function of `(ip, TNT cache, COFI map)`.
//!
//! The walker owns only a cursor. It never touches the packet stream
//! directly — the [`EdgeAnalyzer`][crate::EdgeAnalyzer] is responsible for
//! feeding it a start IP (from a decoded TIP) and keeping the TNT cache
//! topped up from TNT packets.

use crate::{
    HandleControlFlow,
    cofi_map::{CofiKind, CofiMap},
    control_flow_handler::ControlFlowTransitionKind,
    tnt_cache::{TntCache, TntPop},
};

/// Why the walker stopped advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeReason {
    /// A conditional branch was reached but the TNT cache is empty; the
    /// walker is parked at that branch and will continue once more TNT bits
    /// arrive.
    AwaitingTnt,
    /// An indirect branch, return, or far transfer was reached; the walker
    /// is disarmed until the next TIP packet supplies a target.
    AwaitingTip,
    /// The walk ended without anything left to resume: missing COFI record,
    /// out-of-range target, or a conditional branch whose not-taken edge has
    /// no further COFI.
    Terminated,
}

/// Virtual program counter walking the COFI map, one conditional branch at a
/// time.
#[derive(Default)]
pub struct CfgWalker {
    cur: Option<u64>,
}

impl CfgWalker {
    /// Create a disarmed walker.
    #[must_use]
    pub fn new() -> Self {
        Self { cur: None }
    }

    /// Whether the walker currently has a cursor.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.cur.is_some()
    }

    /// Disarm the walker without stamping anything, e.g. on a PSB resync.
    pub fn disarm(&mut self) {
        self.cur = None;
    }

    /// Arm the walker at `ip` (stamping it as a new block) and walk as far
    /// as the COFI map and TNT cache allow.
    ///
    /// Used both for the very first arming of a trace and for rearming after
    /// an [`ResumeReason::AwaitingTip`] once a TIP packet supplies the next IP.
    pub fn start<H: HandleControlFlow>(
        &mut self,
        ip: u64,
        cofi_map: &CofiMap,
        tnt_cache: &mut TntCache,
        handler: &mut H,
    ) -> Result<ResumeReason, H::Error> {
        self.arm(ip, handler, ControlFlowTransitionKind::NewBlock)?;
        self.walk(cofi_map, tnt_cache, handler)
    }

    /// Continue walking after more TNT bits have become available.
    ///
    /// A no-op returning [`ResumeReason::Terminated`] if the walker is
    /// currently disarmed.
    pub fn resume<H: HandleControlFlow>(
        &mut self,
        cofi_map: &CofiMap,
        tnt_cache: &mut TntCache,
        handler: &mut H,
    ) -> Result<ResumeReason, H::Error> {
        if self.cur.is_none() {
            return Ok(ResumeReason::Terminated);
        }
        self.walk(cofi_map, tnt_cache, handler)
    }

    fn arm<H: HandleControlFlow>(
        &mut self,
        ip: u64,
        handler: &mut H,
        transition_kind: ControlFlowTransitionKind,
    ) -> Result<(), H::Error> {
        self.cur = Some(ip);
        handler.on_new_block(ip, transition_kind)
    }

    fn walk<H: HandleControlFlow>(
        &mut self,
        cofi_map: &CofiMap,
        tnt_cache: &mut TntCache,
        handler: &mut H,
    ) -> Result<ResumeReason, H::Error> {
        loop {
            let Some(ip) = self.cur else {
                return Ok(ResumeReason::Terminated);
            };

            let Some(record) = cofi_map.lookup(ip) else {
                log::warn!("no COFI record at {ip:#x}, terminating walk");
                self.cur = None;
                return Ok(ResumeReason::Terminated);
            };

            match record.kind {
                CofiKind::ConditionalBranch => match tnt_cache.pop() {
                    TntPop::Empty => return Ok(ResumeReason::AwaitingTnt),
                    TntPop::Taken => {
                        let target = record
                            .target_addr
                            .expect("conditional branch always has a target");
                        if !cofi_map.in_range(target) {
                            log::warn!("branch target {target:#x} out of range, terminating walk");
                            self.cur = None;
                            return Ok(ResumeReason::Terminated);
                        }
                        self.arm(target, handler, ControlFlowTransitionKind::ConditionalBranch)?;
                    }
                    TntPop::NotTaken => match record.fallthrough_next {
                        Some(next) => {
                            self.arm(next, handler, ControlFlowTransitionKind::ConditionalBranch)?;
                        }
                        None => {
                            self.cur = None;
                            return Ok(ResumeReason::Terminated);
                        }
                    },
                },
                CofiKind::UnconditionalDirect => {
                    let target = record
                        .target_addr
                        .expect("unconditional direct branch always has a target");
                    if !cofi_map.in_range(target) {
                        log::warn!("branch target {target:#x} out of range, terminating walk");
                        self.cur = None;
                        return Ok(ResumeReason::Terminated);
                    }
                    self.arm(target, handler, ControlFlowTransitionKind::DirectJump)?;
                }
                CofiKind::IndirectBranch | CofiKind::NearRet | CofiKind::FarTransfer => {
                    self.cur = None;
                    return Ok(ResumeReason::AwaitingTip);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingHandler {
        blocks: Vec<u64>,
    }

    impl HandleControlFlow for RecordingHandler {
        type Error = std::convert::Infallible;

        fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
            self.blocks.clear();
            Ok(())
        }

        fn on_new_block(
            &mut self,
            block_addr: u64,
            _transition_kind: ControlFlowTransitionKind,
        ) -> Result<(), Self::Error> {
            self.blocks.push(block_addr);
            Ok(())
        }

        fn on_psb(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[test]
    fn single_conditional_taken() {
        // jz 0x1100 at 0x1000; 0x1100 holds an indirect jump so the walk
        // should run the taken edge and then await a TIP.
        let mut image = vec![0x0f, 0x84, 0xfa, 0x00, 0x00, 0x00];
        image.resize(0x100, 0x90);
        image.extend_from_slice(&[0xff, 0xe0]); // jmp rax at offset 0x100 (addr 0x1100)
        let cofi_map = CofiMap::build(&image, 0x1000, covpt_decoder::TraceeMode::Mode64);

        let mut tnt_cache = TntCache::new();
        tnt_cache.push_bit(true);
        let mut walker = CfgWalker::new();
        let mut handler = RecordingHandler::default();

        let reason = walker
            .start(0x1000, &cofi_map, &mut tnt_cache, &mut handler)
            .unwrap();
        assert_eq!(reason, ResumeReason::AwaitingTip);
        assert_eq!(handler.blocks, vec![0x1000, 0x1100]);
    }

    #[test]
    fn empty_tnt_awaits_more_bits() {
        let mut image = vec![0x0f, 0x84, 0xfa, 0x00, 0x00, 0x00, 0x90, 0x90];
        image.resize(0x108, 0x90);
        let cofi_map = CofiMap::build(&image, 0x1000, covpt_decoder::TraceeMode::Mode64);

        let mut tnt_cache = TntCache::new();
        let mut walker = CfgWalker::new();
        let mut handler = RecordingHandler::default();

        let reason = walker
            .start(0x1000, &cofi_map, &mut tnt_cache, &mut handler)
            .unwrap();
        assert_eq!(reason, ResumeReason::AwaitingTnt);
        assert!(walker.is_armed());
    }

    #[test]
    fn out_of_range_target_terminates() {
        // jz -0x2000 (out of the image's [base, max) range)
        let mut image = vec![0x0f, 0x84, 0x00, 0xe0, 0xff, 0xff, 0x90, 0x90];
        image.resize(0x108, 0x90);
        let cofi_map = CofiMap::build(&image, 0x1000, covpt_decoder::TraceeMode::Mode64);

        let mut tnt_cache = TntCache::new();
        tnt_cache.push_bit(true);
        let mut walker = CfgWalker::new();
        let mut handler = RecordingHandler::default();

        let reason = walker
            .start(0x1000, &cofi_map, &mut tnt_cache, &mut handler)
            .unwrap();
        assert_eq!(reason, ResumeReason::Terminated);
        assert!(!walker.is_armed());
    }

    #[test]
    fn indirect_branch_awaits_tip() {
        let image = [0xff, 0xe0]; // jmp rax
        let cofi_map = CofiMap::build(&image, 0x1000, covpt_decoder::TraceeMode::Mode64);

        let mut tnt_cache = TntCache::new();
        let mut walker = CfgWalker::new();
        let mut handler = RecordingHandler::default();

        let reason = walker
            .start(0x1000, &cofi_map, &mut tnt_cache, &mut handler)
            .unwrap();
        assert_eq!(reason, ResumeReason::AwaitingTip);

        let reason = walker
            .start(0x3000, &cofi_map, &mut tnt_cache, &mut handler)
            .unwrap();
        assert_eq!(reason, ResumeReason::AwaitingTip);
    }
}
