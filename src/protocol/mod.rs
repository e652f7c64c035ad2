//! Protocol module - wire format, framing, fragmentation and reassembly.
//!
//! This module implements the link layer below the telemetry payloads:
//! - 16-byte frame header encoding/decoding
//! - Frame struct and the stateless frame codec
//! - Fragmenter splitting logical messages into MTU-sized frames
//! - Reassembler rebuilding logical messages from frames in any order

mod fragmenter;
mod frame;
mod message;
mod reassembler;
mod sequence;
mod wire_format;

pub use fragmenter::{Fragmenter, Fragments};
pub use frame::{checksum, decode_frame, encode_frame, max_data_len, Frame, FrameCodec, FrameError};
pub use message::LogicalMessage;
pub use reassembler::{
    CloseReason, ExpiredBuffer, Outcome, Reassembler, ReassemblyConfig, ReassemblyStats, SeqState,
    DEFAULT_CLOSED_HISTORY, DEFAULT_MAX_BUFFERS, DEFAULT_REASSEMBLY_TIMEOUT, DEFAULT_STALE_WINDOW,
};
pub use sequence::{seq_distance, seq_newer, SeqCounter};
pub use wire_format::{Header, MessageKind, DEFAULT_MTU, HEADER_SIZE, MAX_FRAGMENTS, MIN_MTU};
