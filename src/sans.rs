//! Internal finite-state machines for framing DCP messages.
//!
//! This module is intended for applications that need fine control over how
//! feed bytes reach the decoders. See [`crate::avec`] for implementations
//! driving them from sockets, readers and slices.
//!
//! # Architecture
//!
//! Both framings are recognised by a decoder that consumes exactly one byte
//! per call to [`FrameDecoder::advance`]. A call yields nothing while a
//! message is still being assembled, a [`Product`] once a message with an
//! accepted header is complete, or a [`Rejection`] when the bytes seen so far
//! were discarded. Rejections are never fatal: the decoder has already reset
//! itself to its initial state and keeps hunting for the next message. Only
//! byte values the protocol leaves undefined produce a [`ProtocolError`],
//! after which the connection cannot be trusted.
//!
//! Products carry the message body with its header removed. Converting a body
//! into a canonical record is a separate, stateless step shared by both
//! framings; see [`record::convert`].
//!
//! Nothing here reads clocks, sockets or files, or logs.

use either::Either;
use thiserror::Error;

pub mod buffer;
pub mod header;
pub mod pdi;
pub mod raw;
pub mod record;

use buffer::Overflow;
use header::HeaderError;
use pdi::PdiDecoder;
use raw::RawDecoder;

/// A decoder for either framing, selected at session start.
pub type Decoder = Either<RawDecoder, PdiDecoder>;

/// A byte-at-a-time framing state machine.
pub trait FrameDecoder {
    /// Consume one byte of the feed.
    ///
    /// Returns a completed product or a rejection when the byte ends a
    /// message, and nothing otherwise.
    fn advance(&mut self, byte: u8) -> Result<Option<Either<Product, Rejection>>, ProtocolError>;

    /// Discard any partial message and return to the initial state.
    fn reset(&mut self);

    /// Number of products emitted since construction.
    fn received(&self) -> u64;
}

impl<L: FrameDecoder, R: FrameDecoder> FrameDecoder for Either<L, R> {
    fn advance(&mut self, byte: u8) -> Result<Option<Either<Product, Rejection>>, ProtocolError> {
        either::for_both!(self, d => d.advance(byte))
    }

    fn reset(&mut self) {
        either::for_both!(self, d => d.reset())
    }

    fn received(&self) -> u64 {
        either::for_both!(self, d => d.received())
    }
}

/// A message body whose header was accepted, ready for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    /// Sequence number preceding the message, on sequenced feeds.
    pub sequence: Option<u32>,
    /// Bytes following the header, up to (not including) the terminator.
    pub body: Vec<u8>,
}

/// A reason bytes were discarded. The decoder has already resynchronised.
#[derive(Debug, Error)]
pub enum Rejection {
    /// The product header failed validation.
    #[error("Rejected header: {0}")]
    Header(#[from] HeaderError),
    /// The header grew past its bound.
    #[error("Header overflow: {0}")]
    HeaderOverflow(Overflow),
    /// The product grew past its bound.
    #[error("Product overflow: {0}")]
    ProductOverflow(Overflow),
    /// The message between header and terminator was below the length floor.
    #[error("Message too short ({len} bytes).")]
    MessageTooShort { len: usize },
    /// An unexpected byte appeared in a sequence number.
    #[error("Unexpected byte 0x{0:02x} in sequence number.")]
    SequenceNumber(u8),
    /// The sequence number does not fit in 32 bits.
    #[error("Sequence number overflow.")]
    SequenceOverflow,
    /// An unexpected byte appeared in a PDI frame length.
    #[error("Unexpected byte 0x{0:02x} in frame length.")]
    FrameLength(u8),
    /// The PDI sender flagged the product as unsupported.
    #[error("Unsupported product flagged ({discarded} bytes discarded).")]
    Unsupported { discarded: usize },
    /// The PDI sender aborted the product in progress.
    #[error("Product aborted ({discarded} bytes discarded).")]
    Aborted { discarded: usize },
}

/// A byte value with no defined meaning at this point of the protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Undefined PDI start flag.
    #[error("Undefined start flag ({0}).")]
    StartFlag(u8),
}
