// CLASSIFICATION: COMMUNITY
// Filename: decoder.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-17

//! Single-packet decoding for queue consumers.

use crashcat_wire::{decode_packet, Packet, PacketHeader};
use log::trace;

use crate::engine::LOG_TARGET;
use crate::error::CrashCatResult;

/// Stateless decoder for packets taken off the crash queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketDecoder;

impl PacketDecoder {
    /// Decode the packet at the start of `bytes`, returning it with the
    /// number of bytes it occupies.
    pub fn decode(bytes: &[u8]) -> CrashCatResult<(Packet, usize)> {
        let (packet, size) = decode_packet(bytes)?;
        trace!(
            target: LOG_TARGET,
            "decoded {:?} packet, {size} bytes",
            packet.packet_type()
        );
        Ok((packet, size))
    }

    /// Validate only the header and return the size of the packet it
    /// announces.
    pub fn peek_size(bytes: &[u8]) -> CrashCatResult<usize> {
        Ok(PacketHeader::decode(bytes)?.packet_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrashCatError;
    use crashcat_wire::{Io32Entry, Io32StateV1, IoAperture, WireError};

    #[test]
    fn decode_reports_consumed_size() {
        let packet = Packet::Io32State(Io32StateV1 {
            aperture: IoAperture::IntIo,
            entries: vec![
                Io32Entry {
                    offset: 0x10,
                    value: 1,
                },
                Io32Entry {
                    offset: 0x14,
                    value: 2,
                },
                Io32Entry {
                    offset: 0x18,
                    value: 3,
                },
            ],
        });
        let mut bytes = packet.encode().unwrap();
        bytes.extend_from_slice(&[0xFF; 5]);
        let (decoded, used) = PacketDecoder::decode(&bytes).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(used, 32);
        assert_eq!(PacketDecoder::peek_size(&bytes).unwrap(), 32);
    }

    #[test]
    fn bad_signature_is_invalid_data() {
        let bytes = [0u8; 16];
        assert!(matches!(
            PacketDecoder::decode(&bytes),
            Err(CrashCatError::InvalidData(WireError::BadSignature(0)))
        ));
    }
}
