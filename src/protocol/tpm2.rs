use thiserror::Error;

use crate::color::Color;

/// First byte of every packet; the firmware drives a single output
pub const CHANNEL_BYTE: u8 = 0x00;
pub const START_BYTE: u8 = 0xC9;
/// Packet type: data frame
pub const DATA_FRAME: u8 = 0xDA;
pub const END_BYTE: u8 = 0x36;

/// channel + start + type + 2 length bytes
pub const HEADER_LEN: usize = 5;

pub const DEFAULT_MAX_LEDS_PER_PACKET: usize = 300;

/// Largest chunk whose payload length still fits the 16-bit length field
pub const MAX_LEDS_PER_PACKET_LIMIT: usize = u16::MAX as usize / 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("flat color data length {len} is not divisible by 3")]
    InvalidPayloadLength { len: usize },
}

/// Splits LED data into TPM2 data packets
#[derive(Debug, Clone, Copy)]
pub struct PacketFramer {
    max_leds_per_packet: usize,
}

impl PacketFramer {
    pub fn new(max_leds_per_packet: usize) -> Self {
        assert!(
            (1..=MAX_LEDS_PER_PACKET_LIMIT).contains(&max_leds_per_packet),
            "max_leds_per_packet out of range: {}",
            max_leds_per_packet
        );
        PacketFramer { max_leds_per_packet }
    }

    pub fn max_leds_per_packet(&self) -> usize {
        self.max_leds_per_packet
    }

    /// Frame flat "Inline" data, 3 bytes per LED.
    ///
    /// The bytes of each LED are taken as the slots `(g, r, b)` and written
    /// to the wire as `(r, g, b)`, so the first two bytes of every LED are
    /// exchanged. The firmware on the reference board expects this order.
    pub fn frame_from_flat(&self, data: &[u8]) -> Result<Vec<Vec<u8>>, FrameError> {
        if data.len() % 3 != 0 {
            return Err(FrameError::InvalidPayloadLength { len: data.len() });
        }

        let triples: Vec<[u8; 3]> = data
            .chunks_exact(3)
            .map(|slots| {
                let (g, r, b) = (slots[0], slots[1], slots[2]);
                [r, g, b]
            })
            .collect();

        Ok(self.frame(&triples))
    }

    /// Frame structured colors, written as `(r, g, b)`
    pub fn frame_from_triples(&self, colors: &[Color]) -> Vec<Vec<u8>> {
        let triples: Vec<[u8; 3]> = colors.iter().map(|c| [c.r, c.g, c.b]).collect();
        self.frame(&triples)
    }

    fn frame(&self, triples: &[[u8; 3]]) -> Vec<Vec<u8>> {
        if triples.is_empty() {
            return vec![build_tpm2_packet(&[])];
        }

        triples
            .chunks(self.max_leds_per_packet)
            .map(build_tpm2_packet)
            .collect()
    }
}

impl Default for PacketFramer {
    fn default() -> Self {
        PacketFramer::new(DEFAULT_MAX_LEDS_PER_PACKET)
    }
}

/// Build one TPM2 data packet
pub fn build_tpm2_packet(triples: &[[u8; 3]]) -> Vec<u8> {
    let payload_size = triples.len() * 3;
    debug_assert!(payload_size <= u16::MAX as usize);

    let mut packet = Vec::with_capacity(HEADER_LEN + payload_size + 1);

    // Header
    packet.extend_from_slice(&[CHANNEL_BYTE, START_BYTE, DATA_FRAME]);
    packet.extend_from_slice(&(payload_size as u16).to_be_bytes());

    // Pixel data
    for triple in triples {
        packet.extend_from_slice(triple);
    }

    packet.push(END_BYTE);
    packet
}

/// Payload of a packet built by [`build_tpm2_packet`]
pub fn packet_payload(packet: &[u8]) -> &[u8] {
    &packet[HEADER_LEN..packet.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(packet: &[u8]) {
        assert_eq!(packet[0], CHANNEL_BYTE);
        assert_eq!(packet[1], START_BYTE);
        assert_eq!(packet[2], DATA_FRAME);
        assert_eq!(packet[packet.len() - 1], END_BYTE);

        let length = u16::from_be_bytes([packet[3], packet[4]]) as usize;
        assert_eq!(length, packet.len() - HEADER_LEN - 1);
        assert_eq!(length % 3, 0);
    }

    fn colors(n: usize) -> Vec<Color> {
        (0..n)
            .map(|i| Color::new(i as u8, (i * 7) as u8, (i * 13) as u8))
            .collect()
    }

    #[test]
    fn test_packet_layout() {
        let packet = build_tpm2_packet(&[[1, 2, 3], [4, 5, 6]]);
        assert_eq!(
            packet,
            vec![0x00, 0xC9, 0xDA, 0x00, 0x06, 1, 2, 3, 4, 5, 6, 0x36]
        );
    }

    #[test]
    fn test_empty_frame_emits_one_packet() {
        let framer = PacketFramer::default();
        let packets = framer.frame_from_triples(&[]);
        assert_eq!(packets, vec![vec![0x00, 0xC9, 0xDA, 0x00, 0x00, 0x36]]);

        let packets = framer.frame_from_flat(&[]).unwrap();
        assert_eq!(packets.len(), 1);
    }

    #[test]
    fn test_packet_count_and_payload_for_budget() {
        let framer = PacketFramer::new(DEFAULT_MAX_LEDS_PER_PACKET);

        for n in 0..=80 {
            let input = colors(n);
            let packets = framer.frame_from_triples(&input);
            assert_eq!(packets.len(), n.div_ceil(DEFAULT_MAX_LEDS_PER_PACKET).max(1));

            let expected: Vec<u8> = input.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
            let payload: Vec<u8> = packets
                .iter()
                .flat_map(|p| packet_payload(p).to_vec())
                .collect();
            assert_eq!(payload, expected);

            packets.iter().for_each(|p| assert_well_formed(p));
        }
    }

    #[test]
    fn test_small_packet_limit_splits_in_order() {
        let framer = PacketFramer::new(4);
        let input = colors(10);
        let packets = framer.frame_from_triples(&input);

        let sizes: Vec<usize> = packets.iter().map(|p| packet_payload(p).len() / 3).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let expected: Vec<u8> = input.iter().flat_map(|c| [c.r, c.g, c.b]).collect();
        let payload: Vec<u8> = packets
            .iter()
            .flat_map(|p| packet_payload(p).to_vec())
            .collect();
        assert_eq!(payload, expected);
    }

    #[test]
    fn test_305_leds_split_into_two_packets() {
        let framer = PacketFramer::new(300);
        let packets = framer.frame_from_triples(&colors(305));

        assert_eq!(packets.len(), 2);
        assert_eq!(&packets[0][3..5], &[0x03, 0x84]);
        assert_eq!(packets[0].len(), HEADER_LEN + 900 + 1);
        assert_eq!(&packets[1][3..5], &[0x00, 0x0F]);
        assert_eq!(packets[1].len(), HEADER_LEN + 15 + 1);
        packets.iter().for_each(|p| assert_well_formed(p));
    }

    #[test]
    fn test_flat_length_must_divide_by_three() {
        let framer = PacketFramer::default();
        for len in 0..20 {
            let result = framer.frame_from_flat(&vec![0xAB; len]);
            if len % 3 == 0 {
                assert!(result.is_ok(), "length {} should frame", len);
            } else {
                assert_eq!(result, Err(FrameError::InvalidPayloadLength { len }));
            }
        }
    }

    #[test]
    fn test_flat_slots_written_as_rgb() {
        let framer = PacketFramer::default();
        let packets = framer.frame_from_flat(&[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(packet_payload(&packets[0]), &[2, 1, 3, 5, 4, 6]);
    }

    #[test]
    fn test_flat_frame_splits_like_triples() {
        let framer = PacketFramer::new(2);
        let packets = framer.frame_from_flat(&[0; 15]).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(&packets[2][3..5], &[0x00, 0x03]);
    }

    #[test]
    #[should_panic]
    fn test_zero_packet_limit_rejected() {
        PacketFramer::new(0);
    }
}
