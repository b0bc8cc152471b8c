//! Chunked framing for telemetry payloads over a byte channel.
//!
//! Many concurrent producers write variable-length payloads (packed OTLP
//! records) into one byte-oriented channel — a pipe, socket, or in-process
//! buffer — read by a single consumer. Payloads are split into fixed-size
//! [`frame`] chunks small enough for the channel's atomic write size, and the
//! consumer's [`Reassembler`] demultiplexes the interleaved chunk streams
//! back into complete payloads.
//!
//! # Transport requirement
//!
//! The channel must preserve per-sender write order (true of pipes and
//! ordered in-process channels, not of datagram transports). Chunks from
//! *different* senders may interleave arbitrarily; the reassembler buckets
//! them by sender id and event class.
//!
//! # Example
//!
//! ```
//! use pgtel_ipc::{frame, Reassembler, Signal};
//!
//! let mut wire = Vec::new();
//! frame::write_message(&mut wire, 42, Signal::Logs, b"payload bytes");
//!
//! let mut reassembler = Reassembler::new();
//! let mut out = Vec::new();
//! reassembler.push(&wire, |signal, payload| {
//!     out.push((signal, payload.to_vec()));
//! });
//! assert_eq!(out, vec![(Signal::Logs, b"payload bytes".to_vec())]);
//! ```

pub mod frame;
mod reassembly;

pub use frame::{ChunkHeader, FrameError, Signal, CHUNK_SIZE, HEADER_SIZE, MAX_PAYLOAD};
pub use reassembly::Reassembler;
