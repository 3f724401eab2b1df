use core::hint::unreachable_unchecked;

use derive_more::Display;

use crate::{
    DecoderContext, HandlePacket, TraceeMode,
    error::{DecoderError, DecoderResult},
};

const TIP_MASK: u8 = 0b0001_1111;
const TIP_BYTE0: u8 = 0b0000_1101;
const TIP_PGE_BYTE0: u8 = 0b0001_0001;
const TIP_PGD_BYTE0: u8 = 0b0000_0001;
const TIP_FUP_BYTE0: u8 = 0b0001_1101;
const TSC_BYTE0: u8 = 0b0001_1001;
const MTC_BYTE0: u8 = 0b0101_1001;
const MODE_BYTE0: u8 = 0b1001_1001;
const GENERIC_BYTE0: u8 = 0b0000_0010;

fn handle_pad_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    loop {
        packet_handler
            .on_pad_packet(context)
            .map_err(DecoderError::PacketHandler)?;

        context.pos += 1;
        let Some(byte) = buf.get(context.pos) else {
            break;
        };
        if *byte != 0 {
            break;
        }
        // Fast path for a run of consecutive PAD bytes
    }

    Ok(())
}

fn handle_short_tnt_packet<H: HandlePacket>(
    byte: u8,
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    // The short TNT byte always ends with a terminal 1 bit below the stop
    // marker, and 0x00 is PAD, so the highest set bit is always in 1..=6.
    let highest_bit = 6 - byte.leading_zeros();
    // Bit 0 is the packet's discriminator (always 0 here), not data; shift
    // it out so bit 0 of the reported value is the first real TNT bit, the
    // same convention `handle_long_tnt_packet` uses for its 16-bit prefix.
    packet_handler
        .on_short_tnt_packet(context, byte >> 1, highest_bit)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += 1;

    Ok(())
}

/// Pattern for IP reconstruction, keyed off the IPBytes field (`byte0 >> 5`).
#[derive(Debug, Display, Clone, Copy)]
pub enum IpReconstructionPattern {
    /// None, IP is out of context
    OutOfContext,
    /// IP Payload\[15:0\]
    #[display("TwoBytesWithLastIp({_0:#x})")]
    TwoBytesWithLastIp(u16),
    /// IP Payload\[31:0\]
    #[display("FourBytesWithLastIp({_0:#x})")]
    FourBytesWithLastIp(u32),
    /// IP Payload\[47:0\], sign-extended from bit 47. The upper 2 bytes are
    /// guaranteed to be cleared.
    #[display("SixBytesExtended({_0:#x})")]
    SixBytesExtended(u64),
    /// IP Payload\[47:0\], the upper 2 bytes are guaranteed to be cleared
    #[display("SixBytesWithLastIp({_0:#x})")]
    SixBytesWithLastIp(u64),
    /// IP Payload\[63:0\]
    #[display("EightBytes({_0:#x})")]
    EightBytes(u64),
}

/// `pos` should point just past the packet header byte before calling this.
///
/// # SAFETY
///
/// `ip_bytes` must be no greater than `0b111`.
#[expect(clippy::manual_range_patterns)]
unsafe fn ip_reconstruction<H: HandlePacket>(
    buf: &[u8],
    ip_bytes: u8,
    context: &mut DecoderContext,
) -> DecoderResult<IpReconstructionPattern, H> {
    debug_assert!(ip_bytes <= 0b111, "Unexpected ip bytes.");
    let pattern = match ip_bytes {
        // Header only, no IP payload: out of context.
        0b000 => IpReconstructionPattern::OutOfContext,
        0b001 => {
            let Some(bytes) = buf
                .get(context.pos..)
                .and_then(|buf| buf.first_chunk::<2>())
            else {
                return Err(DecoderError::UnexpectedEOF);
            };
            let ip_payload = u16::from_le_bytes(*bytes);
            context.pos += 2;
            IpReconstructionPattern::TwoBytesWithLastIp(ip_payload)
        }
        0b010 => {
            let Some(bytes) = buf
                .get(context.pos..)
                .and_then(|buf| buf.first_chunk::<4>())
            else {
                return Err(DecoderError::UnexpectedEOF);
            };
            let ip_payload = u32::from_le_bytes(*bytes);
            context.pos += 4;
            IpReconstructionPattern::FourBytesWithLastIp(ip_payload)
        }
        0b011 if matches!(context.tracee_mode, TraceeMode::Mode64) => {
            let Some([b1, b2, b3, b4, b5, b6]) = buf
                .get(context.pos..)
                .and_then(|buf| buf.first_chunk::<6>())
            else {
                return Err(DecoderError::UnexpectedEOF);
            };
            let ip_payload = u64::from_le_bytes([*b1, *b2, *b3, *b4, *b5, *b6, 0, 0]);
            context.pos += 6;
            IpReconstructionPattern::SixBytesExtended(ip_payload)
        }
        0b100 if matches!(context.tracee_mode, TraceeMode::Mode64) => {
            let Some([b1, b2, b3, b4, b5, b6]) = buf
                .get(context.pos..)
                .and_then(|buf| buf.first_chunk::<6>())
            else {
                return Err(DecoderError::UnexpectedEOF);
            };
            let ip_payload = u64::from_le_bytes([*b1, *b2, *b3, *b4, *b5, *b6, 0, 0]);
            context.pos += 6;
            IpReconstructionPattern::SixBytesWithLastIp(ip_payload)
        }
        0b110 if matches!(context.tracee_mode, TraceeMode::Mode64) => {
            let Some(bytes) = buf
                .get(context.pos..)
                .and_then(|buf| buf.first_chunk::<8>())
            else {
                return Err(DecoderError::UnexpectedEOF);
            };
            let ip_payload = u64::from_le_bytes(*bytes);
            context.pos += 8;
            IpReconstructionPattern::EightBytes(ip_payload)
        }
        0b011 | 0b100 | 0b101 | 0b110 | 0b111 => {
            return Err(DecoderError::InvalidPacket);
        }
        _ => {
            // SAFETY: ip_bytes <= 0b111 per caller contract.
            unsafe { unreachable_unchecked() }
        }
    };

    Ok(pattern)
}

fn handle_tip_family<H: HandlePacket>(
    buf: &[u8],
    byte: u8,
    context: &mut DecoderContext,
    packet_handler: &mut H,
    call: impl FnOnce(&mut H, &DecoderContext, IpReconstructionPattern) -> Result<(), H::Error>,
) -> DecoderResult<(), H> {
    context.pos += 1; // header byte

    let ip_bytes = byte >> 5;
    // SAFETY: ip_bytes is the top 3 bits of a byte, so it is at most 0b111
    let pattern = unsafe { ip_reconstruction(buf, ip_bytes, context)? };

    call(packet_handler, context, pattern).map_err(DecoderError::PacketHandler)?;

    Ok(())
}

fn handle_tsc_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let Some([b1, b2, b3, b4, b5, b6, b7]) = buf
        .get((context.pos + 1)..)
        .and_then(|buf| buf.first_chunk::<7>())
    else {
        return Err(DecoderError::UnexpectedEOF);
    };
    let tsc_value = u64::from_le_bytes([*b1, *b2, *b3, *b4, *b5, *b6, *b7, 0]);

    packet_handler
        .on_tsc_packet(context, tsc_value)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += 8;

    Ok(())
}

fn handle_mtc_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let Some(byte) = buf.get(context.pos + 1) else {
        return Err(DecoderError::UnexpectedEOF);
    };

    packet_handler
        .on_mtc_packet(context, *byte)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += 2;

    Ok(())
}

fn handle_mode_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let Some(byte) = buf.get(context.pos + 1) else {
        return Err(DecoderError::UnexpectedEOF);
    };
    let byte = *byte;
    let leaf_id = (byte & 0b1110_0000) >> 5;
    let mode = byte & 0b0001_1111;

    if leaf_id == 0b000 {
        // MODE.exec packet
        match mode & 0b0000_0011 {
            0b00 => context.tracee_mode = TraceeMode::Mode16,
            0b01 => context.tracee_mode = TraceeMode::Mode64,
            0b10 => context.tracee_mode = TraceeMode::Mode32,
            _ => {}
        }
    }

    packet_handler
        .on_mode_packet(context, leaf_id, mode)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += 2;

    Ok(())
}

pub fn decode<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    loop {
        let Some(byte) = buf.get(context.pos).copied() else {
            break;
        };

        if byte == 0 {
            handle_pad_packet(buf, context, packet_handler)?;
            continue;
        }

        if byte == TSC_BYTE0 {
            handle_tsc_packet(buf, context, packet_handler)?;
            continue;
        }

        if byte == MTC_BYTE0 {
            handle_mtc_packet(buf, context, packet_handler)?;
            continue;
        }

        if byte & 1 == 0 && byte != GENERIC_BYTE0 {
            handle_short_tnt_packet(byte, context, packet_handler)?;
            continue;
        }

        if byte == MODE_BYTE0 {
            handle_mode_packet(buf, context, packet_handler)?;
            continue;
        }

        match byte & TIP_MASK {
            TIP_BYTE0 => {
                handle_tip_family(buf, byte, context, packet_handler, H::on_tip_packet)?;
                continue;
            }
            TIP_PGE_BYTE0 => {
                handle_tip_family(buf, byte, context, packet_handler, H::on_tip_pge_packet)?;
                continue;
            }
            TIP_PGD_BYTE0 => {
                handle_tip_family(buf, byte, context, packet_handler, H::on_tip_pgd_packet)?;
                continue;
            }
            TIP_FUP_BYTE0 => {
                handle_tip_family(buf, byte, context, packet_handler, H::on_fup_packet)?;
                continue;
            }
            _ => {}
        }

        if byte == GENERIC_BYTE0 {
            super::level2::decode(buf, context, packet_handler)?;
            continue;
        }

        log::warn!("unknown Intel PT packet byte {byte:#04x} at offset {}", context.pos);
        return Err(DecoderError::InvalidPacket);
    }

    Ok(())
}
