#![no_main]

use covpt_decoder::{DecodeOptions, HandlePacket, IgnoredPacketKind};
use libfuzzer_sys::fuzz_target;

struct FuzzHandlePacket;

impl HandlePacket for FuzzHandlePacket {
    type Error = std::convert::Infallible;

    fn at_decode_begin(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn on_short_tnt_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        packet_byte: u8,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(packet_byte);
        let _ = std::hint::black_box(highest_bit);
        Ok(())
    }

    fn on_long_tnt_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        packet_bytes: u64,
        highest_bit: u32,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(packet_bytes);
        let _ = std::hint::black_box(highest_bit);
        Ok(())
    }

    fn on_tip_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        ip_reconstruction_pattern: covpt_decoder::IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(ip_reconstruction_pattern);
        Ok(())
    }

    fn on_tip_pgd_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        ip_reconstruction_pattern: covpt_decoder::IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(ip_reconstruction_pattern);
        Ok(())
    }

    fn on_tip_pge_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        ip_reconstruction_pattern: covpt_decoder::IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(ip_reconstruction_pattern);
        Ok(())
    }

    fn on_fup_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        ip_reconstruction_pattern: covpt_decoder::IpReconstructionPattern,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(ip_reconstruction_pattern);
        Ok(())
    }

    fn on_pad_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        Ok(())
    }

    fn on_mode_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        leaf_id: u8,
        mode: u8,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(leaf_id);
        let _ = std::hint::black_box(mode);
        Ok(())
    }

    fn on_mtc_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        ctc_payload: u8,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(ctc_payload);
        Ok(())
    }

    fn on_tsc_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        tsc_value: u64,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(tsc_value);
        Ok(())
    }

    fn on_cbr_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        core_bus_ratio: u8,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(core_bus_ratio);
        Ok(())
    }

    fn on_pip_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        cr3: u64,
        rsvd_nr: bool,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(cr3);
        let _ = std::hint::black_box(rsvd_nr);
        Ok(())
    }

    fn on_psb_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        Ok(())
    }

    fn on_psbend_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        Ok(())
    }

    fn on_ignored_packet(
        &mut self,
        context: &covpt_decoder::DecoderContext,
        kind: IgnoredPacketKind,
    ) -> Result<(), Self::Error> {
        let _ = std::hint::black_box(context);
        let _ = std::hint::black_box(kind);
        Ok(())
    }
}

fuzz_target!(|data: &[u8]| {
    let _ = covpt_decoder::decode(data, DecodeOptions::default(), &mut FuzzHandlePacket);
});
