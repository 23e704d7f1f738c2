//! Transport framing
//!
//! Inbound records share one packed little-endian header:
//!
//! ```text
//! offset 0:  u8   type     (1 = misc, 2 = video, 3 = audio)
//! offset 1:  u8   flags    (bit 0 = keyframe)
//! offset 2:  u64  latency  (server-side, microseconds)
//! offset 10: u32  size     (payload length)
//! offset 14: payload
//! ```
//!
//! The only outbound record is the heartbeat: a packed
//! `{u32 0xFFFFFFFF, u64 timestamp}` the server echoes back as a misc
//! record carrying the original timestamp.

use byteorder::{ByteOrder, LittleEndian};
use enumflags2::{bitflags, BitFlags};

/// Framed record header size on the wire
pub const HEADER_SIZE: usize = 14;

/// Outbound heartbeat record size on the wire
pub const HEARTBEAT_SIZE: usize = 12;

/// Heartbeat marker in the type field
pub const HEARTBEAT_TYPE: u32 = 0xffff_ffff;

/// Record classes the server emits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Heartbeat echo: payload is the original u64 timestamp
    Misc,
    /// HEVC Annex-B access unit
    Video,
    /// Stream configuration (first record) or raw PCM
    Audio,
    /// Anything newer than this client; skipped whole
    Unknown(u8),
}

impl From<u8> for RecordType {
    fn from(raw: u8) -> Self {
        match raw {
            1 => Self::Misc,
            2 => Self::Video,
            3 => Self::Audio,
            other => Self::Unknown(other),
        }
    }
}

/// Per-record flag bits
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFlag {
    /// IDR picture for video; configuration record for audio
    Keyframe = 0b0000_0001,
}

/// Parsed record header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: RecordType,
    pub flags: BitFlags<RecordFlag>,
    /// Server-side capture-to-send latency in microseconds
    pub latency_us: u64,
    /// Payload length following the header
    pub payload_len: usize,
}

impl RecordHeader {
    /// Whether the keyframe flag is set
    #[must_use]
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(RecordFlag::Keyframe)
    }

    /// Total record size on the wire
    #[must_use]
    pub fn record_len(&self) -> usize {
        HEADER_SIZE + self.payload_len
    }
}

/// Parse a header from the front of the receive buffer
///
/// Returns `None` until a whole header is present. Completeness of the
/// payload is the caller's check, against [`RecordHeader::record_len`].
#[must_use]
pub fn parse_header(data: &[u8]) -> Option<RecordHeader> {
    if data.len() < HEADER_SIZE {
        return None;
    }
    Some(RecordHeader {
        kind: RecordType::from(data[0]),
        flags: BitFlags::from_bits_truncate(data[1]),
        latency_us: LittleEndian::read_u64(&data[2..10]),
        payload_len: LittleEndian::read_u32(&data[10..14]) as usize,
    })
}

/// Encode an outbound heartbeat carrying the emission timestamp
#[must_use]
pub fn encode_heartbeat(timestamp_us: u64) -> [u8; HEARTBEAT_SIZE] {
    let mut record = [0u8; HEARTBEAT_SIZE];
    LittleEndian::write_u32(&mut record[..4], HEARTBEAT_TYPE);
    LittleEndian::write_u64(&mut record[4..], timestamp_us);
    record
}

/// Decode a misc payload as the echoed heartbeat timestamp
#[must_use]
pub fn heartbeat_echo(payload: &[u8]) -> Option<u64> {
    if payload.len() < 8 {
        return None;
    }
    Some(LittleEndian::read_u64(&payload[..8]))
}
