//! Binary event log record format
//!
//! ## File layout
//! ```text
//! record := time(f64 LE) + location_id(u64 LE) + duration(f64 LE)   = 24 bytes
//! ```
//!
//! No header, no record count, no checksum. The number of records is the file
//! size divided by [`RECORD_SIZE`]; a truncated trailing record is ignored.
//! `time` is seconds since the session started, `duration` is seconds.

/// Size of one encoded record in bytes
pub const RECORD_SIZE: usize = 24;

/// One completed scope
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventRecord {
    pub time: f64,
    pub location_id: u64,
    pub duration: f64,
}

impl EventRecord {
    pub fn new(time: f64, location_id: u64, duration: f64) -> Self {
        Self {
            time,
            location_id,
            duration,
        }
    }

    /// Encode to the fixed 24-byte wire layout
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..8].copy_from_slice(&self.time.to_le_bytes());
        buf[8..16].copy_from_slice(&self.location_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.duration.to_le_bytes());
        buf
    }

    /// Decode one record
    pub fn from_bytes(buf: &[u8; RECORD_SIZE]) -> Self {
        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[0..8]);
        let time = f64::from_le_bytes(word);
        word.copy_from_slice(&buf[8..16]);
        let location_id = u64::from_le_bytes(word);
        word.copy_from_slice(&buf[16..24]);
        let duration = f64::from_le_bytes(word);
        Self {
            time,
            location_id,
            duration,
        }
    }

    /// End of the scope, in seconds since session start
    pub fn end(&self) -> f64 {
        self.time + self.duration
    }
}

/// Iterate over the whole records contained in `bytes`
///
/// Trailing bytes that do not form a full record are skipped.
pub fn decode_records(bytes: &[u8]) -> impl Iterator<Item = EventRecord> + '_ {
    bytes.chunks_exact(RECORD_SIZE).map(|chunk| {
        let mut buf = [0u8; RECORD_SIZE];
        buf.copy_from_slice(chunk);
        EventRecord::from_bytes(&buf)
    })
}

/// Number of whole records in a log of `len` bytes
pub fn record_count(len: u64) -> u64 {
    len / RECORD_SIZE as u64
}
