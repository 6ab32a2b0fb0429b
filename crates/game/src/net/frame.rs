use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const MAX_PACKET_SIZE: usize = 1200;
pub const PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_MAGIC: u32 = 0x4E53_594E;

const SEQUENCE_WRAP_THRESHOLD: u32 = u32::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(compare(PartialEq), derive(Debug))]
pub struct PacketHeader {
    pub magic: u32,
    pub version: u32,
    pub sequence: u32,
}

impl PacketHeader {
    pub fn new(sequence: u32) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            sequence,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.magic == PROTOCOL_MAGIC && self.version == PROTOCOL_VERSION
    }
}

#[inline]
pub fn sequence_greater_than(s1: u32, s2: u32) -> bool {
    ((s1 > s2) && (s1 - s2 <= SEQUENCE_WRAP_THRESHOLD))
        || ((s1 < s2) && (s2 - s1 > SEQUENCE_WRAP_THRESHOLD))
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum PacketType {
    ConnectionRequest { client_salt: u64 },
    ConnectionAccepted { client_salt: u64, peer_id: u32 },
    ConnectionDenied { reason: String },
    Payload(Vec<u8>),
    Disconnect,
}

#[derive(Debug, Clone, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: PacketType,
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl Packet {
    pub fn new(header: PacketHeader, payload: PacketType) -> Self {
        Self { header, payload }
    }

    pub fn serialize(&self) -> Result<Vec<u8>, PacketError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(PacketError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, PacketError> {
        // Receive buffers carry no alignment guarantee.
        let mut aligned = AlignedVec::<16>::with_capacity(data.len());
        aligned.extend_from_slice(data);
        rkyv::from_bytes::<Self, rancor::Error>(&aligned).map_err(PacketError::Deserialize)
    }
}

/// Accepts only frames newer than the last one seen from the same sender.
#[derive(Debug, Default)]
pub struct SequenceFilter {
    last_received: Option<u32>,
    rejected: u64,
}

impl SequenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&mut self, sequence: u32) -> bool {
        match self.last_received {
            Some(last) if !sequence_greater_than(sequence, last) => {
                self.rejected += 1;
                false
            }
            _ => {
                self.last_received = Some(sequence);
                true
            }
        }
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_comparison() {
        assert!(sequence_greater_than(2, 1));
        assert!(!sequence_greater_than(1, 2));
        assert!(sequence_greater_than(0, u32::MAX));
        assert!(!sequence_greater_than(u32::MAX, 0));
    }

    #[test]
    fn test_packet_serialization() {
        let packet = Packet::new(PacketHeader::new(5), PacketType::Payload(vec![1, 0, 9]));

        let serialized = packet.serialize().unwrap();
        let deserialized = Packet::deserialize(&serialized).unwrap();

        assert_eq!(packet.header, deserialized.header);
        assert_eq!(deserialized.payload, PacketType::Payload(vec![1, 0, 9]));
        assert!(deserialized.header.is_valid());
    }

    #[test]
    fn test_sequence_filter_drops_reordered_and_duplicates() {
        let mut filter = SequenceFilter::new();

        assert!(filter.accept(10));
        assert!(!filter.accept(10));
        assert!(!filter.accept(9));
        assert!(filter.accept(12));
        assert!(filter.accept(13));
        assert_eq!(filter.rejected(), 2);
    }

    #[test]
    fn test_sequence_filter_handles_wrap() {
        let mut filter = SequenceFilter::new();

        assert!(filter.accept(u32::MAX - 1));
        assert!(filter.accept(u32::MAX));
        assert!(filter.accept(0));
        assert!(!filter.accept(u32::MAX));
    }
}
