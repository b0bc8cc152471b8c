//! Chunk wire format: header layout, validation, and message splitting.
//!
//! A chunk is the only unit written to the channel. Its header is:
//!
//! ```text
//! offset  size  field
//! 0       2     sentinel, both bytes NUL
//! 2       4     sender id, little endian, non-zero
//! 6       2     payload length, little endian, 1..=MAX_PAYLOAD
//! 8       1     flags: FINAL bit plus exactly one class bit
//! ```
//!
//! The sentinel NULs let the reassembler scan for a plausible frame boundary
//! after a torn or corrupted write. A logical message larger than
//! [`MAX_PAYLOAD`] spans several chunks; every chunk but the last clears the
//! FINAL bit.

use thiserror::Error;

/// Total size of one full chunk, analogous to an OS pipe's atomic write size.
pub const CHUNK_SIZE: usize = 512;

/// Size of the chunk header in bytes.
pub const HEADER_SIZE: usize = 9;

/// Maximum payload bytes carried by a single chunk.
pub const MAX_PAYLOAD: usize = CHUNK_SIZE - HEADER_SIZE;

/// Flag bit marking the last chunk of a message.
pub const FLAG_FINAL: u8 = 0x01;

const CLASS_LOGS: u8 = 0x10;
const CLASS_METRICS: u8 = 0x20;
const CLASS_TRACES: u8 = 0x40;
const CLASS_MASK: u8 = CLASS_LOGS | CLASS_METRICS | CLASS_TRACES;

/// Event class carried by a chunk. Exactly one class bit is set per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Logs,
    Metrics,
    Traces,
}

impl Signal {
    /// The class bit for this signal in the flags byte.
    pub fn class_bit(self) -> u8 {
        match self {
            Signal::Logs => CLASS_LOGS,
            Signal::Metrics => CLASS_METRICS,
            Signal::Traces => CLASS_TRACES,
        }
    }

    /// Extracts the signal from a flags byte, requiring exactly one class bit.
    pub fn from_flags(flags: u8) -> Option<Signal> {
        match flags & CLASS_MASK {
            CLASS_LOGS => Some(Signal::Logs),
            CLASS_METRICS => Some(Signal::Metrics),
            CLASS_TRACES => Some(Signal::Traces),
            _ => None,
        }
    }
}

/// Errors detected while validating a chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The two sentinel bytes were not NUL.
    #[error("missing frame sentinel")]
    Sentinel,
    /// The sender id field was zero.
    #[error("zero sender id")]
    ZeroSender,
    /// The payload length field was zero or above `MAX_PAYLOAD`.
    #[error("payload length {0} out of bounds")]
    Length(usize),
    /// The flags byte did not carry exactly one class bit.
    #[error("invalid flags byte {0:#04x}")]
    Flags(u8),
}

/// A validated chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Producer identity, non-zero.
    pub sender: u32,
    /// Payload bytes following the header, 1..=MAX_PAYLOAD.
    pub len: usize,
    /// Event class of the message this chunk belongs to.
    pub signal: Signal,
    /// Whether this chunk completes its message.
    pub last: bool,
}

impl ChunkHeader {
    /// Parses and validates a header from the first `HEADER_SIZE` bytes of `buf`.
    ///
    /// The caller must supply at least `HEADER_SIZE` bytes.
    pub fn parse(buf: &[u8]) -> Result<ChunkHeader, FrameError> {
        debug_assert!(buf.len() >= HEADER_SIZE);

        if buf[0] != 0 || buf[1] != 0 {
            return Err(FrameError::Sentinel);
        }

        let sender = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
        if sender == 0 {
            return Err(FrameError::ZeroSender);
        }

        let len = u16::from_le_bytes([buf[6], buf[7]]) as usize;
        if len == 0 || len > MAX_PAYLOAD {
            return Err(FrameError::Length(len));
        }

        let flags = buf[8];
        let signal = Signal::from_flags(flags).ok_or(FrameError::Flags(flags))?;

        Ok(ChunkHeader {
            sender,
            len,
            signal,
            last: flags & FLAG_FINAL != 0,
        })
    }

    fn write_into(self, out: &mut Vec<u8>) {
        out.push(0);
        out.push(0);
        out.extend_from_slice(&self.sender.to_le_bytes());
        out.extend_from_slice(&(self.len as u16).to_le_bytes());
        let mut flags = self.signal.class_bit();
        if self.last {
            flags |= FLAG_FINAL;
        }
        out.push(flags);
    }
}

/// Appends `message` to `out` as a sequence of framed chunks.
///
/// Every chunk but the last carries a cleared FINAL bit. Encoding never
/// fails: oversized messages simply become more chunks.
///
/// # Panics
///
/// Panics if `sender` is zero or `message` is empty — both are producer
/// programming errors, not runtime conditions.
pub fn write_message(out: &mut Vec<u8>, sender: u32, signal: Signal, message: &[u8]) {
    assert!(sender != 0, "sender id must be non-zero");
    assert!(!message.is_empty(), "message must not be empty");

    let mut rest = message;

    // All but the last chunk
    while rest.len() > MAX_PAYLOAD {
        ChunkHeader {
            sender,
            len: MAX_PAYLOAD,
            signal,
            last: false,
        }
        .write_into(out);
        out.extend_from_slice(&rest[..MAX_PAYLOAD]);
        rest = &rest[MAX_PAYLOAD..];
    }

    // The last chunk
    ChunkHeader {
        sender,
        len: rest.len(),
        signal,
        last: true,
    }
    .write_into(out);
    out.extend_from_slice(rest);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut buf = Vec::new();
        let header = ChunkHeader {
            sender: 0xDEAD_BEEF,
            len: 17,
            signal: Signal::Traces,
            last: true,
        };
        header.write_into(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(ChunkHeader::parse(&buf).unwrap(), header);
    }

    #[test]
    fn small_message_is_one_final_chunk() {
        let mut out = Vec::new();
        write_message(&mut out, 7, Signal::Logs, b"hello");
        assert_eq!(out.len(), HEADER_SIZE + 5);

        let header = ChunkHeader::parse(&out).unwrap();
        assert_eq!(header.sender, 7);
        assert_eq!(header.len, 5);
        assert!(header.last);
        assert_eq!(&out[HEADER_SIZE..], b"hello");
    }

    #[test]
    fn large_message_splits_and_marks_only_last_chunk_final() {
        let message = vec![0xAB; MAX_PAYLOAD * 2 + 3];
        let mut out = Vec::new();
        write_message(&mut out, 1, Signal::Traces, &message);

        let mut cursor = 0;
        let mut finals = Vec::new();
        let mut lens = Vec::new();
        while cursor < out.len() {
            let header = ChunkHeader::parse(&out[cursor..]).unwrap();
            finals.push(header.last);
            lens.push(header.len);
            cursor += HEADER_SIZE + header.len;
        }
        assert_eq!(finals, vec![false, false, true]);
        assert_eq!(lens, vec![MAX_PAYLOAD, MAX_PAYLOAD, 3]);
    }

    #[test]
    fn payload_boundary_is_a_single_chunk() {
        let message = vec![1; MAX_PAYLOAD];
        let mut out = Vec::new();
        write_message(&mut out, 1, Signal::Logs, &message);
        assert_eq!(out.len(), HEADER_SIZE + MAX_PAYLOAD);
        assert!(ChunkHeader::parse(&out).unwrap().last);
    }

    #[test]
    fn parse_rejects_bad_headers() {
        let mut good = Vec::new();
        ChunkHeader {
            sender: 3,
            len: 1,
            signal: Signal::Logs,
            last: true,
        }
        .write_into(&mut good);

        let mut bad = good.clone();
        bad[0] = b'x';
        assert_eq!(ChunkHeader::parse(&bad), Err(FrameError::Sentinel));

        let mut bad = good.clone();
        bad[2..6].copy_from_slice(&[0; 4]);
        assert_eq!(ChunkHeader::parse(&bad), Err(FrameError::ZeroSender));

        let mut bad = good.clone();
        bad[6..8].copy_from_slice(&(MAX_PAYLOAD as u16 + 1).to_le_bytes());
        assert_eq!(
            ChunkHeader::parse(&bad),
            Err(FrameError::Length(MAX_PAYLOAD + 1))
        );

        // Two class bits at once
        let mut bad = good.clone();
        bad[8] = 0x30;
        assert_eq!(ChunkHeader::parse(&bad), Err(FrameError::Flags(0x30)));

        // No class bit
        let mut bad = good;
        bad[8] = FLAG_FINAL;
        assert_eq!(ChunkHeader::parse(&bad), Err(FrameError::Flags(FLAG_FINAL)));
    }

    #[test]
    fn binary_payloads_survive_framing() {
        let message: Vec<u8> = (0..=255).cycle().take(1000).collect();
        let mut out = Vec::new();
        write_message(&mut out, 9, Signal::Metrics, &message);

        let mut rebuilt = Vec::new();
        let mut cursor = 0;
        while cursor < out.len() {
            let header = ChunkHeader::parse(&out[cursor..]).unwrap();
            cursor += HEADER_SIZE;
            rebuilt.extend_from_slice(&out[cursor..cursor + header.len]);
            cursor += header.len;
        }
        assert_eq!(rebuilt, message);
    }
}
