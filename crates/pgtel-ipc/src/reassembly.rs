//! Reassembly of interleaved chunk streams into complete payloads.

use crate::frame::{ChunkHeader, Signal, HEADER_SIZE};
use std::collections::HashMap;
use tracing::warn;

/// Demultiplexes framed chunks from many senders back into whole messages.
///
/// The reassembler owns its buffer and its partial-message table, so several
/// independent instances can coexist (one per pipeline, one per test). Feed
/// it raw bytes as they arrive with [`push`](Reassembler::push); it invokes
/// the dispatch callback once per completed message.
///
/// A corrupted or torn header does not desynchronize the stream permanently:
/// the reassembler logs a warning and scans forward to the next zero byte,
/// the only place a valid header can start, losing at most the damaged
/// message.
#[derive(Debug, Default)]
pub struct Reassembler {
    /// Unconsumed channel bytes, left-compacted after each push.
    buffer: Vec<u8>,
    /// Accumulated bytes of messages whose final chunk has not arrived.
    partial: HashMap<(u32, Signal), Vec<u8>>,
    /// Headers that failed validation since construction.
    rejected: u64,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `input` and dispatches every message completed by it.
    ///
    /// `dispatch` receives the event class and the reassembled payload.
    /// Payloads made of a single final chunk are dispatched straight out of
    /// the buffer without accumulation.
    pub fn push(&mut self, input: &[u8], mut dispatch: impl FnMut(Signal, &[u8])) {
        self.buffer.extend_from_slice(input);

        let mut cursor = 0;
        // A chunk is at least a header plus one payload byte.
        while self.buffer.len() - cursor > HEADER_SIZE {
            let header = match ChunkHeader::parse(&self.buffer[cursor..]) {
                Ok(header) => header,
                Err(err) => {
                    warn!(error = %err, "unexpected telemetry chunk header, resynchronizing");
                    self.rejected += 1;
                    cursor += self.scan_for_boundary(cursor);
                    continue;
                }
            };

            let chunk_len = HEADER_SIZE + header.len;

            // The buffer lacks the whole chunk; wait for more input.
            if self.buffer.len() - cursor < chunk_len {
                break;
            }

            let payload = &self.buffer[cursor + HEADER_SIZE..cursor + chunk_len];
            let key = (header.sender, header.signal);

            match self.partial.get_mut(&key) {
                // A lone final chunk is a complete message on its own.
                None if header.last => dispatch(header.signal, payload),
                None => {
                    self.partial.insert(key, payload.to_vec());
                }
                Some(accumulated) => {
                    accumulated.extend_from_slice(payload);
                    if header.last {
                        let message = self.partial.remove(&key).unwrap_or_default();
                        dispatch(header.signal, &message);
                    }
                }
            }

            cursor += chunk_len;
        }

        // Left-compact whatever remains for the next read.
        self.buffer.drain(..cursor);
    }

    /// Returns `true` when no buffered bytes or partial messages remain.
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.partial.is_empty()
    }

    /// Number of headers that failed validation since construction.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Distance from `cursor` to the next plausible frame boundary (a zero
    /// byte), or to the end of the buffer when none is found.
    fn scan_for_boundary(&self, cursor: usize) -> usize {
        let remaining = &self.buffer[cursor..];
        for (skip, &byte) in remaining.iter().enumerate().skip(1) {
            if byte == 0 {
                return skip;
            }
        }
        remaining.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{write_message, FLAG_FINAL, MAX_PAYLOAD};

    fn collect(reassembler: &mut Reassembler, input: &[u8]) -> Vec<(Signal, Vec<u8>)> {
        let mut out = Vec::new();
        reassembler.push(input, |signal, payload| {
            out.push((signal, payload.to_vec()));
        });
        out
    }

    #[test]
    fn single_chunk_message_dispatches_immediately() {
        let mut wire = Vec::new();
        write_message(&mut wire, 5, Signal::Logs, b"abc");

        let mut reassembler = Reassembler::new();
        let out = collect(&mut reassembler, &wire);
        assert_eq!(out, vec![(Signal::Logs, b"abc".to_vec())]);
        assert!(reassembler.is_idle());
    }

    #[test]
    fn multi_chunk_message_round_trips() {
        let message: Vec<u8> = (0..MAX_PAYLOAD * 3 + 11).map(|i| i as u8).collect();
        let mut wire = Vec::new();
        write_message(&mut wire, 5, Signal::Traces, &message);

        let mut reassembler = Reassembler::new();
        let out = collect(&mut reassembler, &wire);
        assert_eq!(out, vec![(Signal::Traces, message)]);
        assert!(reassembler.is_idle());
    }

    #[test]
    fn byte_by_byte_feed_reassembles_identically() {
        let message: Vec<u8> = (0..2000u32).map(|i| (i % 251) as u8).collect();
        let mut wire = Vec::new();
        write_message(&mut wire, 8, Signal::Logs, &message);

        let mut reassembler = Reassembler::new();
        let mut out = Vec::new();
        for byte in &wire {
            reassembler.push(std::slice::from_ref(byte), |_, payload| {
                out.push(payload.to_vec());
            });
        }
        assert_eq!(out, vec![message]);
    }

    #[test]
    fn interleaved_senders_are_never_cross_attributed() {
        // A1, B1, A2(final), B2(final): each sender's chunks reassemble
        // into its own message.
        let message_a: Vec<u8> = vec![b'a'; MAX_PAYLOAD + 4];
        let message_b: Vec<u8> = vec![b'b'; MAX_PAYLOAD + 9];

        let mut wire_a = Vec::new();
        write_message(&mut wire_a, 1, Signal::Logs, &message_a);
        let mut wire_b = Vec::new();
        write_message(&mut wire_b, 2, Signal::Logs, &message_b);

        let a_split = HEADER_SIZE + MAX_PAYLOAD;
        let b_split = HEADER_SIZE + MAX_PAYLOAD;

        let mut reassembler = Reassembler::new();
        let mut out = Vec::new();
        let mut feed = |bytes: &[u8], out: &mut Vec<(Signal, Vec<u8>)>| {
            reassembler.push(bytes, |signal, payload| {
                out.push((signal, payload.to_vec()));
            });
        };

        feed(&wire_a[..a_split], &mut out); // A1
        assert!(out.is_empty());
        feed(&wire_b[..b_split], &mut out); // B1
        assert!(out.is_empty());
        feed(&wire_a[a_split..], &mut out); // A2, final
        assert_eq!(out, vec![(Signal::Logs, message_a.clone())]);
        feed(&wire_b[b_split..], &mut out); // B2, final
        assert_eq!(
            out,
            vec![
                (Signal::Logs, message_a),
                (Signal::Logs, message_b),
            ]
        );
    }

    #[test]
    fn same_sender_distinct_classes_use_distinct_slots() {
        let mut first_log = Vec::new();
        write_message(&mut first_log, 3, Signal::Logs, &vec![1; MAX_PAYLOAD + 1]);
        let mut first_trace = Vec::new();
        write_message(&mut first_trace, 3, Signal::Traces, &vec![2; MAX_PAYLOAD + 1]);

        let split = HEADER_SIZE + MAX_PAYLOAD;
        let mut reassembler = Reassembler::new();
        let mut out = Vec::new();
        reassembler.push(&first_log[..split], |s, p| out.push((s, p.to_vec())));
        reassembler.push(&first_trace[..split], |s, p| out.push((s, p.to_vec())));
        reassembler.push(&first_log[split..], |s, p| out.push((s, p.to_vec())));
        reassembler.push(&first_trace[split..], |s, p| out.push((s, p.to_vec())));

        assert_eq!(
            out,
            vec![
                (Signal::Logs, vec![1; MAX_PAYLOAD + 1]),
                (Signal::Traces, vec![2; MAX_PAYLOAD + 1]),
            ]
        );
    }

    #[test]
    fn corrupted_header_resynchronizes_to_next_chunk() {
        let mut wire = Vec::new();
        write_message(&mut wire, 4, Signal::Logs, b"first");
        // Corrupt the first sentinel byte so the leading chunk is malformed.
        wire[0] = 0xFF;
        write_message(&mut wire, 4, Signal::Logs, b"second");

        let mut reassembler = Reassembler::new();
        let out = collect(&mut reassembler, &wire);
        // The damaged message is lost; the stream recovers on the next frame.
        assert_eq!(out, vec![(Signal::Logs, b"second".to_vec())]);
        assert!(reassembler.rejected() >= 1);
    }

    #[test]
    fn corrupted_flags_resynchronize_too() {
        let mut wire = Vec::new();
        write_message(&mut wire, 4, Signal::Logs, b"xyz");
        let flags_at = 8;
        wire[flags_at] = FLAG_FINAL; // no class bit
        write_message(&mut wire, 4, Signal::Traces, b"ok");

        let mut reassembler = Reassembler::new();
        let out = collect(&mut reassembler, &wire);
        assert_eq!(out, vec![(Signal::Traces, b"ok".to_vec())]);
    }

    #[test]
    fn partial_chunk_at_tail_waits_for_more_input() {
        let mut wire = Vec::new();
        write_message(&mut wire, 6, Signal::Logs, b"late bytes");

        let mut reassembler = Reassembler::new();
        let cut = wire.len() - 3;
        assert!(collect(&mut reassembler, &wire[..cut]).is_empty());
        assert!(!reassembler.is_idle());
        assert_eq!(
            collect(&mut reassembler, &wire[cut..]),
            vec![(Signal::Logs, b"late bytes".to_vec())]
        );
        assert!(reassembler.is_idle());
    }
}
