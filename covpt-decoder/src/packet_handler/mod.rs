//! Ready-made [`HandlePacket`][crate::HandlePacket] implementations.

pub mod combined;
pub mod log;
pub mod packet_counter;
