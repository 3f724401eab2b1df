use core::num::NonZero;

use crate::{
    DecoderContext, HandlePacket, IgnoredPacketKind,
    error::{DecoderError, DecoderResult},
};

#[inline]
fn handle_cbr_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let packet_length = 4;

    let Some(core_bus_ratio) = buf.get(context.pos + 2) else {
        return Err(DecoderError::UnexpectedEOF);
    };
    packet_handler
        .on_cbr_packet(context, *core_bus_ratio)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += packet_length;

    Ok(())
}

#[inline]
fn handle_pip_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let packet_length = 8;

    let Some([byte2, byte3, byte4, byte5, byte6, byte7]) = buf
        .get((context.pos + 2)..)
        .and_then(|buf| buf.first_chunk::<6>())
    else {
        return Err(DecoderError::UnexpectedEOF);
    };
    let rsvd_nr = (*byte2 % 2) != 0;
    let byte2 = *byte2 & 0b1111_1110; // clear the RSVD/NR bit
    let cr3 = u64::from_le_bytes([byte2, *byte3, *byte4, *byte5, *byte6, *byte7, 0, 0]) << 5;

    packet_handler
        .on_pip_packet(context, cr3, rsvd_nr)
        .map_err(DecoderError::PacketHandler)?;

    // Consume the full, documented 8-byte packet length.
    context.pos += packet_length;

    Ok(())
}

#[expect(clippy::unreadable_literal)]
const PSB: u128 = 0x82028202820282028202820282028202;

#[inline]
fn handle_psb_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let packet_length = 16;

    let Some(bytes) = buf
        .get(context.pos..)
        .and_then(|buf| buf.first_chunk::<16>())
    else {
        return Err(DecoderError::UnexpectedEOF);
    };
    if u128::from_le_bytes(*bytes) != PSB {
        return Err(DecoderError::InvalidPacket);
    }

    packet_handler
        .on_psb_packet(context)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += packet_length;

    Ok(())
}

#[inline]
fn handle_psbend_packet<H: HandlePacket>(
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let packet_length = 2;

    packet_handler
        .on_psbend_packet(context)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += packet_length;

    Ok(())
}

#[inline]
#[expect(clippy::int_plus_one)]
fn handle_long_tnt_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let packet_length = 8;

    let Some(bytes) = buf
        .get(context.pos..)
        .and_then(|buf| buf.first_chunk::<8>())
    else {
        return Err(DecoderError::UnexpectedEOF);
    };
    let packet = u64::from_le_bytes(*bytes);
    let leading_zeros = packet.leading_zeros();
    if leading_zeros == 64 - 16 {
        // There is no trailing 1
        return Err(DecoderError::InvalidPacket);
    }
    let packet_bytes = packet >> 16;
    // SAFETY: trailing 1 guarantees this is nonzero
    let packet_bytes = unsafe { NonZero::new_unchecked(packet_bytes) };

    debug_assert!(leading_zeros <= 64 - 16 - 1, "Unexpected");
    let highest_bit = 46u32.wrapping_sub(leading_zeros);
    debug_assert!(highest_bit <= 46 || highest_bit == u32::MAX, "Unexpected");

    packet_handler
        .on_long_tnt_packet(context, packet_bytes.get(), highest_bit)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += packet_length;

    Ok(())
}

#[inline]
fn handle_ignored_packet<H: HandlePacket>(
    context: &mut DecoderContext,
    packet_handler: &mut H,
    kind: IgnoredPacketKind,
    packet_length: usize,
) -> DecoderResult<(), H> {
    packet_handler
        .on_ignored_packet(context, kind)
        .map_err(DecoderError::PacketHandler)?;

    context.pos += packet_length;

    Ok(())
}

#[inline]
fn handle_mnt_packet<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    let Some(byte2) = buf.get(context.pos + 2) else {
        return Err(DecoderError::UnexpectedEOF);
    };
    if *byte2 != 0b1000_1000 {
        return Err(DecoderError::InvalidPacket);
    }

    handle_ignored_packet(context, packet_handler, IgnoredPacketKind::Mnt, 11)
}

#[inline]
pub fn decode<H: HandlePacket>(
    buf: &[u8],
    context: &mut DecoderContext,
    packet_handler: &mut H,
) -> DecoderResult<(), H> {
    // Here pos + 1 since pos is unchanged for the leading 0x02 byte on entry.
    let Some(byte1) = buf.get(context.pos + 1).copied() else {
        return Err(DecoderError::UnexpectedEOF);
    };

    match byte1 {
        0b0000_0011 => handle_cbr_packet(buf, context, packet_handler),
        0b0100_0011 => handle_pip_packet(buf, context, packet_handler),
        0b1000_0010 => handle_psb_packet(buf, context, packet_handler),
        0b0010_0011 => handle_psbend_packet(context, packet_handler),
        0b1010_0011 => handle_long_tnt_packet(buf, context, packet_handler),
        0b1000_0011 => {
            handle_ignored_packet(context, packet_handler, IgnoredPacketKind::TraceStop, 2)
        }
        0b1111_0011 => handle_ignored_packet(context, packet_handler, IgnoredPacketKind::Ovf, 2),
        0b1100_0011 => handle_mnt_packet(buf, context, packet_handler),
        0b0111_0011 => handle_ignored_packet(context, packet_handler, IgnoredPacketKind::Tma, 7),
        0b1100_1000 => handle_ignored_packet(context, packet_handler, IgnoredPacketKind::Vmcs, 7),
        _ => {
            log::warn!(
                "unknown Intel PT packet byte1 {byte1:#04x} at offset {}",
                context.pos
            );
            Err(DecoderError::InvalidPacket)
        }
    }
}
