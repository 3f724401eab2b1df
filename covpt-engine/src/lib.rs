//! Ties the packet parser, CFG walker, and perf session controller into a
//! single `init` / `start` / `stop` surface for a fuzzer harness.
//!
//! This crate owns the three things that must survive across one fuzzing
//! target's lifetime: the COFI map (built once, read-only), the coverage
//! bitmap (zeroed per run), and the perf session (opened per run). Nothing
//! here re-implements parsing, walking, or ring-buffer handling; it just
//! wires `covpt-decoder`, `covpt-cfg`, and `covpt-perf` together.

mod config;
mod error;
mod ffi;

pub use crate::config::EngineConfig;
pub use crate::error::EngineError;

use covpt_cfg::{CofiMap, EdgeAnalyzer, FuzzBitmapControlFlowHandler};
use covpt_decoder::{DecodeOptions, TraceeMode};
use covpt_perf::PtSession;

/// Coverage-feedback engine for a single fuzzing target.
///
/// Acquired via [`Engine::init`]. One engine drives one target: the COFI map
/// is built once against the target's image, and `start`/`stop` are called
/// once per traced run.
pub struct Engine {
    cofi_map: CofiMap,
    bitmap: Vec<u8>,
    entry: u64,
    aux_size: u64,
    session: Option<PtSession>,
}

impl Engine {
    /// Size of the coverage bitmap this engine was built with.
    pub(crate) fn map_size(&self) -> usize {
        self.bitmap.len()
    }

    /// Read the target image, build the COFI map, and validate PT support.
    ///
    /// Fails if PT is unsupported on this platform or the image file can't
    /// be read or doesn't match `max - base` bytes. These are all fatal init
    /// errors: the caller is expected to abort rather than retry.
    pub fn init(config: EngineConfig) -> Result<Self, EngineError> {
        // Fail fast on unsupported platforms before touching the image.
        covpt_perf::intel_pt_perf_type().map_err(EngineError::Perf)?;

        let image = std::fs::read(&config.image_path)?;
        let expected_len = config.max.saturating_sub(config.base);
        if image.len() as u64 != expected_len {
            return Err(EngineError::ImageSizeMismatch {
                expected: expected_len,
                actual: image.len() as u64,
            });
        }
        debug_assert!(
            config.base <= config.entry && config.entry < config.max,
            "entry point outside [base, max)"
        );

        let cofi_map = CofiMap::build(&image, config.base, TraceeMode::Mode64);
        log::debug!(
            "built COFI map for {:?}: base={:#x} max={:#x} entry={:#x}",
            config.image_path,
            config.base,
            config.max,
            config.entry
        );

        Ok(Self {
            cofi_map,
            bitmap: vec![0u8; config.map_size],
            entry: config.entry,
            aux_size: config.aux_size,
            session: None,
        })
    }

    /// Open a PT perf event on `pid` and zero the bitmap for a new run.
    ///
    /// The tracee is expected to start itself via `exec`
    /// (`enable_on_exec=1`); the caller does not need to arm tracing itself.
    pub fn start(&mut self, pid: libc::pid_t) -> Result<(), EngineError> {
        let session = PtSession::open_with_aux_size(pid, self.aux_size).map_err(EngineError::Perf)?;
        self.bitmap.iter_mut().for_each(|cell| *cell = 0);
        self.session = Some(session);
        log::debug!("started PT trace on pid {pid} (entry {:#x})", self.entry);
        Ok(())
    }

    /// Disable the perf event, decode the captured trace, and copy the
    /// resulting bitmap into `out_bitmap`.
    ///
    /// Unknown packets or out-of-range branch targets end the decode early
    /// but are not returned as an error: the caller still gets whatever
    /// partial bitmap was accumulated, per the session-error/walk-local-error
    /// policy (fatal conditions are reserved for setup failures).
    pub fn stop(&mut self, out_bitmap: &mut [u8]) -> Result<(), EngineError> {
        let session = self.session.take().ok_or(EngineError::NotStarted)?;
        let aux_bytes = session.stop().map_err(EngineError::Perf)?;

        let mut handler = FuzzBitmapControlFlowHandler::new(std::mem::take(&mut self.bitmap));
        let mut analyzer = EdgeAnalyzer::new(&self.cofi_map, self.entry, &mut handler);
        let mut options = DecodeOptions::default();
        // The aux buffer begins wherever tracing was enabled, not embedded
        // in a larger recorded stream; it has no leading PSB to resync on.
        options.sync(false);
        if let Err(err) = covpt_decoder::decode(&aux_bytes, options, &mut analyzer) {
            log::warn!("trace decode ended early: {err}");
        }
        self.bitmap = handler.into_inner();

        let copy_len = out_bitmap.len().min(self.bitmap.len());
        out_bitmap[..copy_len].copy_from_slice(&self.bitmap[..copy_len]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covpt_cfg::{CombinedControlFlowHandler, ControlFlowTransitionKind, HandleControlFlow};
    use covpt_decoder::{DecoderContext, HandlePacket, IpReconstructionPattern};

    const MAP_SIZE: usize = 1 << 16;

    /// Counts transitions the walker reports as an actual branch taken
    /// (i.e. everything except the initial arming address), mirroring the
    /// `num_decoded_branch` metric used by the scenario expectations.
    #[derive(Default)]
    struct BranchCounter {
        count: u32,
    }

    impl HandleControlFlow for BranchCounter {
        type Error = std::convert::Infallible;

        fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
            self.count = 0;
            Ok(())
        }

        fn on_new_block(
            &mut self,
            _block_addr: u64,
            transition_kind: ControlFlowTransitionKind,
        ) -> Result<(), Self::Error> {
            if !matches!(transition_kind, ControlFlowTransitionKind::NewBlock) {
                self.count += 1;
            }
            Ok(())
        }

        fn on_psb(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn decode_scenario(image: &[u8], base: u64, packets: &[u8]) -> (Vec<u8>, u32) {
        let cofi_map = CofiMap::build(image, base, TraceeMode::Mode64);
        let bitmap = vec![0u8; MAP_SIZE];
        let mut handler =
            CombinedControlFlowHandler::new(FuzzBitmapControlFlowHandler::new(bitmap), BranchCounter::default());
        let mut analyzer = EdgeAnalyzer::new(&cofi_map, base, &mut handler);
        let mut options = DecodeOptions::default();
        options.sync(false);
        let _ = covpt_decoder::decode(packets, options, &mut analyzer);
        let (fuzz_handler, counter) = handler.into_inner();
        (fuzz_handler.into_inner(), counter.count)
    }

    fn conditional_image() -> Vec<u8> {
        // jz 0x1100 at 0x1000; 0x1100 holds `ret`.
        let mut image = vec![0x0f, 0x84, 0xfa, 0x00, 0x00, 0x00];
        image.resize(0x100, 0x90);
        image.push(0xc3);
        image
    }

    fn edge_hash(bitmap_len: usize, prev_loc: u64, addr: u64) -> usize {
        (((addr >> 1) ^ prev_loc) % bitmap_len as u64) as usize
    }

    #[test]
    fn s1_empty_trace_yields_zero_bitmap() {
        let image = conditional_image();
        let (bitmap, branches) = decode_scenario(&image, 0x1000, &[]);
        assert!(bitmap.iter().all(|&b| b == 0));
        assert_eq!(branches, 0);
    }

    #[test]
    fn s2_single_conditional_taken() {
        let image = conditional_image();
        // TIP.PGE (header 0xD1: IPBytes=0b110, full 8-byte payload) setting IP
        // to 0x1000, then a short TNT byte 0x06 (bit1=1 taken, bit2=1 stop):
        // one taken bit.
        let packets = [0xd1, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06];
        let (bitmap, branches) = decode_scenario(&image, 0x1000, &packets);

        let h_entry = edge_hash(bitmap.len(), 0, 0x1000);
        let h_target = edge_hash(bitmap.len(), 0x1000 >> 1, 0x1100);
        assert_ne!(bitmap[h_entry], 0);
        assert_ne!(bitmap[h_target], 0);
        assert_eq!(branches, 1);
    }

    #[test]
    fn s3_unknown_byte_terminates_cleanly() {
        let image = conditional_image();
        let (bitmap, _) = decode_scenario(&image, 0x1000, &[0xff]);
        assert!(bitmap.iter().all(|&b| b == 0));
    }

    #[test]
    fn s4_psb_resets_prev_loc() {
        let image = conditional_image();
        let cofi_map = CofiMap::build(&image, 0x1000, TraceeMode::Mode64);
        let bitmap = vec![0u8; MAP_SIZE];
        let mut handler = FuzzBitmapControlFlowHandler::new(bitmap);
        let mut analyzer = EdgeAnalyzer::new(&cofi_map, 0x1000, &mut handler);

        analyzer
            .on_tip_pge_packet(
                &DecoderContext::default(),
                IpReconstructionPattern::EightBytes(0x1000),
            )
            .unwrap();
        analyzer.on_psb_packet(&DecoderContext::default()).unwrap();
        analyzer
            .on_tip_pge_packet(
                &DecoderContext::default(),
                IpReconstructionPattern::EightBytes(0x2000),
            )
            .unwrap();

        let bitmap = handler.into_inner();
        // Second arming's edge hash is against prev_loc == 0, same as the
        // first arming's, not against 0x1000's post-shift value.
        let h_first = edge_hash(bitmap.len(), 0, 0x1000);
        let h_second = edge_hash(bitmap.len(), 0, 0x2000);
        assert_ne!(bitmap[h_first], 0);
        assert_ne!(bitmap[h_second], 0);
    }

    #[test]
    fn s5_out_of_range_target_stamps_entry_only() {
        // Conditional at 0x1000 whose taken target (base - 1) is out of range.
        // jz rel32=-7: next_ip (0x1006) + (-7) = 0xfff, one byte below base.
        let mut image = vec![0x0f, 0x84, 0xf9, 0xff, 0xff, 0xff];
        image.resize(0x10, 0x90);
        // TIP.PGE (header 0xD1, full 8-byte payload) to 0x1000, then a short
        // TNT byte 0x06: one taken bit.
        let packets = [0xd1, 0x00, 0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x06];
        let (bitmap, _) = decode_scenario(&image, 0x1000, &packets);

        let h_entry = edge_hash(bitmap.len(), 0, 0x1000);
        assert_ne!(bitmap[h_entry], 0);
        // The invalid target's would-be hash (computed against prev_loc after
        // stamping 0x1000) must not be the only nonzero cell stamped twice;
        // walking terminated instead of following the bad target.
        let nonzero = bitmap.iter().filter(|&&b| b != 0).count();
        assert_eq!(nonzero, 1);
    }

    #[test]
    fn s6_indirect_branch_waits_for_tip() {
        // `jmp rax` at 0x1000: indirect jump, no static target.
        let mut image = vec![0xff, 0xe0];
        image.resize(0x10, 0x90);
        let cofi_map = CofiMap::build(&image, 0x1000, TraceeMode::Mode64);
        let bitmap = vec![0u8; MAP_SIZE];
        let mut handler = FuzzBitmapControlFlowHandler::new(bitmap);
        let mut analyzer = EdgeAnalyzer::new(&cofi_map, 0x1000, &mut handler);

        analyzer
            .on_tip_pge_packet(
                &DecoderContext::default(),
                IpReconstructionPattern::EightBytes(0x1000),
            )
            .unwrap();
        let after_arm = handler.bitmap().to_vec();
        assert!(after_arm.iter().any(|&b| b != 0));

        analyzer
            .on_tip_packet(
                &DecoderContext::default(),
                IpReconstructionPattern::EightBytes(0x3000),
            )
            .unwrap();
        let bitmap = handler.into_inner();
        let h_second = edge_hash(bitmap.len(), 0x1000 >> 1, 0x3000);
        assert_ne!(bitmap[h_second], 0);
    }

    #[test]
    fn engine_config_defaults_map_and_aux_size() {
        let config = EngineConfig::new("/nonexistent", 0x1000, 0x2000, 0x1000);
        assert_eq!(config.map_size, 1 << 16);
        assert_eq!(config.aux_size, covpt_perf::DEFAULT_AUX_SIZE);
    }

    #[test]
    fn engine_init_rejects_missing_image() {
        let config = EngineConfig::new("/nonexistent/path/to/image", 0x1000, 0x2000, 0x1000);
        match Engine::init(config) {
            Err(EngineError::Io(_) | EngineError::Perf(_)) => {}
            other => panic!("expected a fatal init error, got {other:?}"),
        }
    }
}
