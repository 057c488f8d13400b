//! Fixed-width event record codec
//!
//! One runtime event on the wire is exactly 16 bytes, big-endian:
//! `int32 dataId, int32 threadId, int64 rawValue`. The fixed width is
//! what makes `seek(eventId)` an O(1) file-select plus byte-offset
//! computation on the reader side.

use serde::{Deserialize, Serialize};

/// Size of one encoded event record in bytes
pub const EVENT_RECORD_BYTES: usize = 16;

/// A runtime event record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Instrumentation site id
    pub data_id: i32,
    /// Recording thread id
    pub thread_id: i32,
    /// Raw payload; reinterpreted via the site's descriptor
    pub raw_value: i64,
}

impl EventRecord {
    pub fn new(data_id: i32, thread_id: i32, raw_value: i64) -> Self {
        Self {
            data_id,
            thread_id,
            raw_value,
        }
    }

    /// Encode into the fixed 16-byte wire form
    pub fn encode(&self) -> [u8; EVENT_RECORD_BYTES] {
        let mut buf = [0u8; EVENT_RECORD_BYTES];
        buf[0..4].copy_from_slice(&self.data_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.thread_id.to_be_bytes());
        buf[8..16].copy_from_slice(&self.raw_value.to_be_bytes());
        buf
    }

    /// Decode from the fixed 16-byte wire form
    pub fn decode(buf: &[u8; EVENT_RECORD_BYTES]) -> Self {
        let data_id = i32::from_be_bytes(buf[0..4].try_into().expect("4-byte slice"));
        let thread_id = i32::from_be_bytes(buf[4..8].try_into().expect("4-byte slice"));
        let raw_value = i64::from_be_bytes(buf[8..16].try_into().expect("8-byte slice"));
        Self {
            data_id,
            thread_id,
            raw_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_round_trip() {
        let records = [
            EventRecord::new(0, 0, 0),
            EventRecord::new(1, 2, 3),
            EventRecord::new(i32::MAX, i32::MAX, i64::MAX),
            EventRecord::new(i32::MIN, -1, i64::MIN),
            EventRecord::new(42, 7, -123456789),
        ];
        for record in records {
            assert_eq!(EventRecord::decode(&record.encode()), record);
        }
    }

    #[test]
    fn test_wire_layout_is_big_endian() {
        let record = EventRecord::new(0x01020304, 0x05060708, 0x090A0B0C0D0E0F10);
        let buf = record.encode();
        assert_eq!(
            buf,
            [
                0x01, 0x02, 0x03, 0x04, // data_id
                0x05, 0x06, 0x07, 0x08, // thread_id
                0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10, // raw_value
            ]
        );
    }
}
