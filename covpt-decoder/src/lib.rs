#![no_std]

pub mod error;
mod raw_packet_handler;
pub mod utils;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "log_handler")]
pub mod packet_handler;

pub use raw_packet_handler::level1::IpReconstructionPattern;

use crate::error::{DecoderError, DecoderResult};

/// Packet handler trait for the packet forms this decoder recognizes.
///
/// The default implementations of all callbacks are nops, so a handler only
/// needs to override the packets it cares about. Packet forms outside this
/// set (cycle-accurate CYC packets, PTWRITE, event-trace extensions) are not
/// part of the recognized table; a byte stream containing them is treated as
/// an unknown packet and decoding stops.
pub trait HandlePacket {
    /// Custom error type
    type Error: core::error::Error;

    /// Called once before decoding a buffer begins.
    #[allow(unused)]
    fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a short TNT packet.
    ///
    /// `packet_byte` is the whole byte of the short TNT packet. `highest_bit`
    /// is the index of the highest bit that represents a valid
    /// Taken/Not-taken bit, guaranteed to be in range `0..=6`.
    ///
    /// If `highest_bit` is 0, there are no Taken/Not-taken bits in this
    /// packet.
    #[allow(unused)]
    fn on_short_tnt_packet(
        &mut self,
        context: &DecoderContext,
        packet_byte: u8,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a long TNT packet.
    ///
    /// `packet_bytes` holds the 47-bit payload of the long TNT packet in its
    /// low bits. `highest_bit` is the index of the highest bit that
    /// represents a valid Taken/Not-taken bit, guaranteed to be in range
    /// `0..=46`.
    #[allow(unused)]
    fn on_long_tnt_packet(
        &mut self,
        context: &DecoderContext,
        packet_bytes: u64,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a TIP packet.
    #[allow(unused)]
    fn on_tip_packet(
        &mut self,
        context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a TIP.PGD packet.
    #[allow(unused)]
    fn on_tip_pgd_packet(
        &mut self,
        context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a TIP.PGE packet.
    #[allow(unused)]
    fn on_tip_pge_packet(
        &mut self,
        context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a FUP packet.
    #[allow(unused)]
    fn on_fup_packet(
        &mut self,
        context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a PAD packet.
    #[allow(unused)]
    fn on_pad_packet(&mut self, context: &DecoderContext) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a MODE packet.
    ///
    /// `leaf_id` and `mode` are the leaf ID and mode of the MODE packet.
    #[allow(unused)]
    fn on_mode_packet(
        &mut self,
        context: &DecoderContext,
        leaf_id: u8,
        mode: u8,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a MTC packet.
    ///
    /// `ctc_payload` is the 8-bit CTC payload value. Its value is not
    /// meaningful outside of cycle-accurate timing reconstruction, which is
    /// out of scope here; the packet is recognized only so the cursor
    /// advances correctly.
    #[allow(unused)]
    fn on_mtc_packet(
        &mut self,
        context: &DecoderContext,
        ctc_payload: u8,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a TSC packet.
    ///
    /// `tsc_value` is the lower 7 bytes of the current TSC value.
    #[allow(unused)]
    fn on_tsc_packet(
        &mut self,
        context: &DecoderContext,
        tsc_value: u64,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a CBR packet.
    ///
    /// `core_bus_ratio` is the Core:Bus Ratio.
    #[allow(unused)]
    fn on_cbr_packet(
        &mut self,
        context: &DecoderContext,
        core_bus_ratio: u8,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a PIP packet.
    ///
    /// `cr3`'s bits `5..=51` are CR3`[51:5]` (other bits guaranteed cleared),
    /// `rsvd_nr` is RSVD/NR.
    #[allow(unused)]
    fn on_pip_packet(
        &mut self,
        context: &DecoderContext,
        cr3: u64,
        rsvd_nr: bool,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a PSB packet.
    #[allow(unused)]
    fn on_psb_packet(&mut self, context: &DecoderContext) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle a PSBEND packet.
    #[allow(unused)]
    fn on_psbend_packet(&mut self, context: &DecoderContext) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Handle one of the packets whose payload this decoder is not
    /// interested in (TraceStop, OVF, MNT, TMA, VMCS): the cursor still
    /// needs to advance by the packet's length, but nothing in the payload
    /// feeds the control-flow reconstruction.
    #[allow(unused)]
    fn on_ignored_packet(
        &mut self,
        context: &DecoderContext,
        kind: IgnoredPacketKind,
    ) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Kind of a recognized-but-payload-ignored packet. See
/// [`HandlePacket::on_ignored_packet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredPacketKind {
    /// TraceStop (`TS`)
    TraceStop,
    /// Overflow (`OVF`)
    Ovf,
    /// Maintenance packet (`MNT`)
    Mnt,
    /// Timing/Mode Auxiliary packet (`TMA`)
    Tma,
    /// VM-CS pointer packet (`VMCS`)
    Vmcs,
}

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceeMode {
    /// 16-bit mode
    Mode16 = 16,
    /// 32-bit mode
    Mode32 = 32,
    /// 64-bit mode
    Mode64 = 64,
}

impl Default for TraceeMode {
    fn default() -> Self {
        Self::Mode64
    }
}

impl TraceeMode {
    /// Get the bitness of current tracee mode
    #[must_use]
    pub fn bitness(&self) -> u32 {
        *self as u32
    }
}

/// Decoder context during decoding
#[derive(Default)]
pub struct DecoderContext {
    /// Next position in target buffer
    pos: usize,
    /// Current tracee mode (will be modified by MODE.exec packet)
    tracee_mode: TraceeMode,
}

impl DecoderContext {
    /// Get current tracee mode
    #[must_use]
    pub fn tracee_mode(&self) -> TraceeMode {
        self.tracee_mode
    }

    /// Current cursor position in the decoded buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.pos
    }
}

/// Options for [`decode`].
///
/// You can create default options via [`DecodeOptions::default`].
#[derive(Clone, Copy)]
pub struct DecodeOptions {
    tracee_mode: TraceeMode,
    no_sync: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            tracee_mode: TraceeMode::Mode64,
            no_sync: false,
        }
    }
}

impl DecodeOptions {
    /// Set default mode of tracee before encountering any valid MODE.exec packets.
    ///
    /// Default is [`TraceeMode::Mode64`]
    pub fn tracee_mode(&mut self, tracee_mode: TraceeMode) -> &mut Self {
        self.tracee_mode = tracee_mode;
        self
    }

    /// Set whether the decoder will firstly sync forward for a PSB packet instead of
    /// decoding at 0 offset.
    ///
    /// Default is `true`.
    pub fn sync(&mut self, sync: bool) -> &mut Self {
        self.no_sync = !sync;
        self
    }
}

const PSB_BYTES: [u8; 16] = [
    0x02, 0x82, 0x02, 0x82, 0x02, 0x82, 0x02, 0x82, 0x02, 0x82, 0x02, 0x82, 0x02, 0x82, 0x02, 0x82,
];

/// Decode the given Intel PT aux buffer.
///
/// The caller is expected to have already sliced the buffer to
/// `[aux_tail, aux_head - 1)`: the last byte of the ring is never consumed
/// here, since the caller owns the job of avoiding a partial trailing
/// packet.
///
/// # SAFETY
///
/// We assume that you can never construct a buf whose length can overflow a usize.
/// As a result, we do not check any arithmetic overflow when manipulating the postion
/// of buf cursor (unless you use a debug-build or enable `overflow-checks` in your
/// build profile).
pub fn decode<H: HandlePacket>(
    buf: &[u8],
    options: DecodeOptions,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let DecodeOptions {
        tracee_mode,
        no_sync,
    } = options;

    packet_handler
        .at_decode_begin()
        .map_err(DecoderError::PacketHandler)?;

    let start_pos = if no_sync {
        0
    } else {
        let Some(start_pos) = memchr::memmem::find(buf, &PSB_BYTES) else {
            return Err(DecoderError::NoPsb);
        };
        start_pos
    };

    let mut context = DecoderContext {
        pos: start_pos,
        tracee_mode,
    };

    raw_packet_handler::level1::decode(buf, &mut context, packet_handler)
}
