//! Handler for logging each packets
//!
//! The handler provided in this module is [`PacketHandlerRawLogger`], it logs every packet details.
//! This handler is extremely useful if you are debugging your own packet handler. You can use this
//! handler with [`CombinedPacketHandler`][super::combined::CombinedPacketHandler]:
//!
//! ```rust
//! # use covpt_decoder::packet_handler::{packet_counter::PacketCounter, combined::CombinedPacketHandler, log::PacketHandlerRawLogger};
//! # let custom_packet_handler = PacketCounter::default();
//! // let custom_packet_handler = ...
//! let handler1 = PacketHandlerRawLogger::default();
//! let handler2 = custom_packet_handler;
//! let handler = CombinedPacketHandler::new(handler1, handler2);
//! // Use handler1 ...
//! ```

use core::convert::Infallible;

use crate::{DecoderContext, HandlePacket, IgnoredPacketKind, IpReconstructionPattern};

/// Handler for logging each packets
#[derive(Default)]
pub struct PacketHandlerRawLogger {}

impl HandlePacket for PacketHandlerRawLogger {
    // This logger will never error
    type Error = Infallible;

    fn on_short_tnt_packet(
        &mut self,
        _context: &DecoderContext,
        packet_byte: u8,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        log::trace!(
            "[Short TNT packet]\tpacket byte: {packet_byte:#010b}\thighest bit: {highest_bit}"
        );
        Ok(())
    }

    fn on_long_tnt_packet(
        &mut self,
        _context: &DecoderContext,
        packet_bytes: u64,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        log::trace!(
            "[Long TNT packet]\tpacket bytes: {packet_bytes:#066b}\thighest bit: {highest_bit}"
        );
        Ok(())
    }

    fn on_tip_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        log::trace!("[TIP packet]\tip reconstruction: {ip_reconstruction_pattern}");
        Ok(())
    }

    fn on_tip_pgd_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        log::trace!("[TIP.PGD packet]\tip reconstruction: {ip_reconstruction_pattern}");
        Ok(())
    }

    fn on_tip_pge_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        log::trace!("[TIP.PGE packet]\tip reconstruction: {ip_reconstruction_pattern}");
        Ok(())
    }

    fn on_fup_packet(
        &mut self,
        _context: &DecoderContext,
        ip_reconstruction_pattern: IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        log::trace!("[FUP packet]\tip reconstruction: {ip_reconstruction_pattern}");
        Ok(())
    }

    fn on_pad_packet(&mut self, _context: &DecoderContext) -> Result<(), Self::Error> {
        log::trace!("[PAD packet]");
        Ok(())
    }

    fn on_mode_packet(
        &mut self,
        _context: &DecoderContext,
        leaf_id: u8,
        mode: u8,
    ) -> Result<(), Self::Error> {
        log::trace!("[MODE packet]\tLeaf ID: {leaf_id:#010b}\tmode:{mode:#010b}");
        Ok(())
    }

    fn on_mtc_packet(
        &mut self,
        _context: &DecoderContext,
        ctc_payload: u8,
    ) -> Result<(), Self::Error> {
        log::trace!("[MTC packet]\tCTC: {ctc_payload:#010b}");
        Ok(())
    }

    fn on_tsc_packet(
        &mut self,
        _context: &DecoderContext,
        tsc_value: u64,
    ) -> Result<(), Self::Error> {
        log::trace!("[TSC packet]\tTSC: {tsc_value:#066b}");
        Ok(())
    }

    fn on_cbr_packet(
        &mut self,
        _context: &DecoderContext,
        core_bus_ratio: u8,
    ) -> Result<(), Self::Error> {
        log::trace!("[CBR packet]\tCore:Bus Ratio: {core_bus_ratio:#010b}");
        Ok(())
    }

    fn on_pip_packet(
        &mut self,
        _context: &DecoderContext,
        cr3: u64,
        rsvd_nr: bool,
    ) -> Result<(), Self::Error> {
        log::trace!("[PIP packet]\tCR3: {cr3:#x}\tRSVD.NR: {rsvd_nr}");
        Ok(())
    }

    fn on_psb_packet(&mut self, _context: &DecoderContext) -> Result<(), Self::Error> {
        log::trace!("[PSB packet]");
        Ok(())
    }

    fn on_psbend_packet(&mut self, _context: &DecoderContext) -> Result<(), Self::Error> {
        log::trace!("[PSBEND packet]");
        Ok(())
    }

    fn on_ignored_packet(
        &mut self,
        _context: &DecoderContext,
        kind: IgnoredPacketKind,
    ) -> Result<(), Self::Error> {
        log::trace!("[ignored packet]\tkind: {kind:?}");
        Ok(())
    }
}
