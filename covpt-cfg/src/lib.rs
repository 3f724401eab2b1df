//! Reconstructs control flow from a decoded Intel PT packet stream against a
//! static [`CofiMap`], and projects the walked edges onto a coverage bitmap
//! via a pluggable [`HandleControlFlow`] sink.

mod cofi_map;
mod control_flow_handler;
pub mod diagnose;
mod error;
mod tnt_cache;
mod walker;

pub use crate::{
    cofi_map::{CofiKind, CofiMap, CofiRecord},
    control_flow_handler::{
        ControlFlowTransitionKind, HandleControlFlow,
        combined::{CombinedControlFlowHandler, CombinedError},
    },
    error::AnalyzerError,
    tnt_cache::{TntCache, TntPop},
    walker::{CfgWalker, ResumeReason},
};
#[cfg(feature = "fuzz_bitmap")]
pub use crate::control_flow_handler::fuzz_bitmap::FuzzBitmapControlFlowHandler;

use covpt_decoder::{DecoderContext, HandlePacket, IpReconstructionPattern};

/// Glues the packet-level decoder to the [`CfgWalker`]: reconstructs IPs,
/// feeds TNT bits into the [`TntCache`], and (re)arms the walker from TIP
/// packets.
pub struct EdgeAnalyzer<'a, H: HandleControlFlow> {
    /// IP-reconstruction-specific field.
    ///
    /// This is not always the last IP in the packet. It has special
    /// semantics per the Intel PT specification. Do not use this field
    /// until you know what you are doing.
    last_ip: u64,
    /// Tracee entry address. The walker stays parked until a TIP.PGE
    /// reconstructs exactly this IP.
    entry_point: u64,
    /// Latched once the tracee has reached `entry_point`. TNT bits arriving
    /// before this is set are still enqueued (they keep the cache aligned
    /// with the packet stream) but never drive the walker.
    start_decode: bool,
    tnt_cache: TntCache,
    cofi_map: &'a CofiMap,
    walker: CfgWalker,
    handler: &'a mut H,
}

impl<'a, H: HandleControlFlow> EdgeAnalyzer<'a, H> {
    /// Create a new [`EdgeAnalyzer`] against an immutable, already-built COFI
    /// map. The walker stays disarmed until a TIP.PGE reconstructs IP ==
    /// `entry_point`.
    pub fn new(cofi_map: &'a CofiMap, entry_point: u64, handler: &'a mut H) -> Self {
        Self {
            last_ip: 0,
            entry_point,
            start_decode: false,
            tnt_cache: TntCache::new(),
            cofi_map,
            walker: CfgWalker::new(),
            handler,
        }
    }

    fn reconstruct_ip_and_update_last(
        &mut self,
        ip_reconstruction: IpReconstructionPattern,
    ) -> Option<u64> {
        use IpReconstructionPattern::{
            EightBytes, FourBytesWithLastIp, OutOfContext, SixBytesExtended,
            SixBytesWithLastIp, TwoBytesWithLastIp,
        };
        let ip = match ip_reconstruction {
            OutOfContext => {
                // `last_ip` is not updated
                return None;
            }
            TwoBytesWithLastIp(payload) => (self.last_ip & 0xFFFFFFFFFFFF0000) | (payload as u64),
            FourBytesWithLastIp(payload) => (self.last_ip & 0xFFFFFFFF00000000) | (payload as u64),
            SixBytesExtended(payload) => (((payload << 16) as i64) >> 16) as u64,
            SixBytesWithLastIp(payload) => (self.last_ip & 0xFFFF000000000000) | (payload as u64),
            EightBytes(payload) => payload,
        };
        self.last_ip = ip;

        Some(ip)
    }

    /// Arm (or rearm) the walker at `ip`, provided `start_decode` has been
    /// latched.
    ///
    /// `ip` is stamped as a new block even if it falls outside the COFI
    /// map's image range (e.g. an indirect branch into a shared library):
    /// the walk itself then terminates on the next step for lack of a COFI
    /// record, same as any other untracked address.
    fn arm_walker(&mut self, ip: u64) -> Result<(), AnalyzerError<H>> {
        if !self.start_decode {
            return Ok(());
        }
        self.walker
            .start(ip, self.cofi_map, &mut self.tnt_cache, self.handler)
            .map_err(AnalyzerError::ControlFlowHandler)?;
        Ok(())
    }

    /// Push new TNT bits and, if the walker was parked awaiting them, resume it.
    fn feed_tnt(&mut self, value: u64, count: u32) -> Result<(), AnalyzerError<H>> {
        self.tnt_cache.push_bits(value, count);
        if self.walker.is_armed() {
            self.walker
                .resume(self.cofi_map, &mut self.tnt_cache, self.handler)
                .map_err(AnalyzerError::ControlFlowHandler)?;
        }
        Ok(())
    }
}

impl<'a, H> HandlePacket for EdgeAnalyzer<'a, H>
where
    H: HandleControlFlow,
    AnalyzerError<H>: std::error::Error,
{
    type Error = AnalyzerError<H>;

    fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
        self.last_ip = 0;
        self.start_decode = false;
        self.tnt_cache.destroy();
        self.walker.disarm();
        self.handler
            .at_decode_begin()
            .map_err(AnalyzerError::ControlFlowHandler)?;
        Ok(())
    }

    fn on_short_tnt_packet(
        &mut self,
        _context: &DecoderContext,
        packet_byte: u8,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        self.feed_tnt(u64::from(packet_byte), highest_bit)
    }

    fn on_long_tnt_packet(
        &mut self,
        _context: &DecoderContext,
        packet_bytes: u64,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        self.feed_tnt(packet_bytes, highest_bit)
    }

    fn on_tip_pge_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        if let Some(ip) = self.reconstruct_ip_and_update_last(ip_reconstruction_pattern) {
            if ip == self.entry_point {
                self.start_decode = true;
            }
            self.arm_walker(ip)?;
        }
        Ok(())
    }

    fn on_tip_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        if let Some(ip) = self.reconstruct_ip_and_update_last(ip_reconstruction_pattern) {
            self.arm_walker(ip)?;
        }
        Ok(())
    }

    fn on_tip_pgd_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        // Tracing is disabling; keep last_ip bookkeeping consistent but
        // don't arm the walker on a packet that marks the end of tracing.
        let _ = self.reconstruct_ip_and_update_last(ip_reconstruction_pattern);
        self.walker.disarm();
        Ok(())
    }

    fn on_fup_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        // FUP is a synchronization packet, not a branch target: it only
        // keeps `last_ip` correct for later compressed TIPs.
        let _ = self.reconstruct_ip_and_update_last(ip_reconstruction_pattern);
        Ok(())
    }

    fn on_psb_packet(&mut self, _context: &DecoderContext) -> Result<(), Self::Error> {
        // PSB resynchronizes the packet stream: `last_ip` is no longer
        // trustworthy, but pending TNT bits are not dropped, they still
        // describe branches the tracee has actually taken.
        self.last_ip = 0;
        self.walker.disarm();
        self.handler
            .on_psb()
            .map_err(AnalyzerError::ControlFlowHandler)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covpt_decoder::{DecodeOptions, TraceeMode};

    #[derive(Default)]
    struct RecordingHandler {
        blocks: Vec<(u64, ControlFlowTransitionKind)>,
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
            transition_kind: ControlFlowTransitionKind,
        ) -> Result<(), Self::Error> {
            self.blocks.push((block_addr, transition_kind));
            Ok(())
        }

        fn on_psb(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn build_image() -> Vec<u8> {
        // jz 0x1100 at 0x1000; 0x1100 holds `ret`.
        let mut image = vec![0x0f, 0x84, 0xfa, 0x00, 0x00, 0x00];
        image.resize(0x100, 0x90);
        image.push(0xc3); // ret at 0x1100
        image
    }

    #[test]
    fn tip_pge_then_short_tnt_walks_one_branch() {
        let image = build_image();
        let cofi_map = CofiMap::build(&image, 0x1000, TraceeMode::Mode64);
        let mut handler = RecordingHandler::default();
        let mut analyzer = EdgeAnalyzer::new(&cofi_map, 0x1000, &mut handler);

        // TIP.PGE setting IP to 0x1000
        analyzer
            .on_tip_pge_packet(
                &DecoderContext::default(),
                IpReconstructionPattern::EightBytes(0x1000),
            )
            .unwrap();
        assert!(analyzer.walker.is_armed());

        // Short TNT: one taken bit (bit 0 = 1)
        analyzer
            .on_short_tnt_packet(&DecoderContext::default(), 0b0000_0001, 1)
            .unwrap();

        assert!(!analyzer.walker.is_armed());
        assert_eq!(
            handler.blocks,
            vec![
                (0x1000, ControlFlowTransitionKind::NewBlock),
                (0x1100, ControlFlowTransitionKind::ConditionalBranch),
            ]
        );
    }

    #[test]
    fn psb_disarms_walker_but_keeps_pending_tnt() {
        let image = build_image();
        let cofi_map = CofiMap::build(&image, 0x1000, TraceeMode::Mode64);
        let mut handler = RecordingHandler::default();
        let mut analyzer = EdgeAnalyzer::new(&cofi_map, 0x1000, &mut handler);

        analyzer
            .on_tip_pge_packet(
                &DecoderContext::default(),
                IpReconstructionPattern::EightBytes(0x1000),
            )
            .unwrap();
        assert!(analyzer.walker.is_armed());

        // A short TNT arrives but the walker is left parked on the branch
        // (no bit consumed yet in this test), so the bit stays pending
        // across the PSB.
        analyzer.tnt_cache.push_bit(true);

        analyzer.on_psb_packet(&DecoderContext::default()).unwrap();
        assert!(!analyzer.walker.is_armed());
        assert_eq!(analyzer.last_ip, 0);
        // PSB must not drop pending TNT bits.
        assert_eq!(analyzer.tnt_cache.count(), 1);
    }

    #[test]
    fn decode_options_default_is_usable() {
        let _ = DecodeOptions::default();
    }
}
