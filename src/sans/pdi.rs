//! Decoder for the PDI packet encapsulation.
//!
//! The encapsulation carries each product as a series of packets, each
//! opening with a one-byte start flag:
//!
//! | Flag | Packet                                                        |
//! |------|---------------------------------------------------------------|
//! | `0`  | Data frame: four ASCII digits of length, then that many bytes |
//! | `1`  | Header frame: a method byte, then 256 ignored bytes            |
//! | `2`  | Tail: the product is complete                                 |
//! | `3`  | The sender cannot deliver this product                        |
//! | `4`  | Abort: discard the product in progress                        |
//!
//! A completed product holds its header, terminated by `RS`, followed by the
//! message body. There is no trailing `ETX`.

use either::Either::{self, Left, Right};
use zerocopy::{Immutable, IntoBytes, KnownLayout, TryFromBytes};

use super::{
    FrameDecoder, Product, ProtocolError, Rejection,
    buffer::BoundedBuffer,
    header::HeaderRules,
    raw::DEFAULT_PRODUCT_BOUND,
};

/// Digits in a data frame length.
pub const FRAME_LENGTH_DIGITS: u8 = 4;
/// Bytes following the method byte of a header frame.
pub const HEADER_BLOCK_BYTES: usize = 256;

/// Start flag of a PDI packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromBytes, IntoBytes, Immutable, KnownLayout)]
pub enum StartFlag {
    /// A length-prefixed chunk of the product.
    DataFrame = 0,
    /// A header block, opening a product.
    HeaderFrame = 1,
    /// End of the product.
    Tail = 2,
    /// The sender cannot deliver the product.
    Unsupported = 3,
    /// The sender abandoned the product.
    Abort = 4,
}

/// Position of a [`PdiDecoder`] within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdiState {
    /// Expecting the start flag of the next packet.
    AwaitingStartFlag,
    /// Reading the length of a data frame.
    ReadingFrameLength,
    /// Accumulating the bytes of a data frame.
    ReadingDataFrame,
    /// Reading the method byte of a header frame.
    ReadingMethodFlag,
    /// Discarding the block of a header frame.
    SkippingHeaderBlock,
}

/// Byte-at-a-time decoder for the PDI packet encapsulation.
#[derive(Debug, Clone)]
pub struct PdiDecoder {
    state: PdiState,
    rules: HeaderRules,
    digits: u8,
    frame_length: usize,
    frame: Vec<u8>,
    skipped: usize,
    product: BoundedBuffer,
    /// Set once the product in progress was rejected, until its end.
    discarding: bool,
    received: u64,
}

impl Default for PdiDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PdiDecoder {
    /// Create a decoder with the default header rules and product bound.
    pub fn new() -> Self {
        Self {
            state: PdiState::AwaitingStartFlag,
            rules: HeaderRules::default(),
            digits: 0,
            frame_length: 0,
            frame: Vec::new(),
            skipped: 0,
            product: BoundedBuffer::new(DEFAULT_PRODUCT_BOUND),
            discarding: false,
            received: 0,
        }
    }

    /// Validate product headers against `rules` instead of the defaults.
    pub fn with_rules(mut self, rules: HeaderRules) -> Self {
        self.rules = rules;
        self
    }

    /// Bound the size of a reassembled product.
    pub fn with_product_bound(mut self, bound: usize) -> Self {
        self.product = BoundedBuffer::new(bound);
        self
    }

    /// Current position within the stream.
    pub fn state(&self) -> PdiState {
        self.state
    }

    /// Bytes of the product reassembled so far.
    pub fn pending(&self) -> &[u8] {
        self.product.as_slice()
    }

    /// Discard the product in progress, returning the number of bytes lost.
    fn discard(&mut self) -> usize {
        let discarded = self.product.len();
        self.product.clear();
        self.frame.clear();
        self.state = PdiState::AwaitingStartFlag;
        discarded
    }

    /// Discard the product in progress and ignore the rest of it, up to its
    /// tail, abort or next header frame.
    fn reject(&mut self, rejection: Rejection) -> Option<Either<Product, Rejection>> {
        self.discard();
        self.discarding = true;
        Some(Right(rejection))
    }

    /// End a product already rejected. Returns true if there was one.
    fn end_discarding(&mut self) -> bool {
        std::mem::replace(&mut self.discarding, false)
    }

    /// Append a completed data frame to the product.
    fn append_frame(&mut self) -> Option<Either<Product, Rejection>> {
        let frame = std::mem::take(&mut self.frame);
        self.state = PdiState::AwaitingStartFlag;
        if self.discarding {
            return None;
        }
        match self.product.extend_from_slice(&frame) {
            Ok(()) => None,
            Err(e) => self.reject(Rejection::ProductOverflow(e)),
        }
    }

    /// Validate and strip the header of the completed product.
    fn complete(&mut self) -> Either<Product, Rejection> {
        let product = self.product.take();
        self.state = PdiState::AwaitingStartFlag;

        match self.rules.split_encapsulated(&product) {
            Ok(body) => {
                self.received += 1;
                Left(Product {
                    sequence: None,
                    body: body.to_vec(),
                })
            }
            Err(e) => Right(e.into()),
        }
    }
}

impl FrameDecoder for PdiDecoder {
    fn advance(&mut self, b: u8) -> Result<Option<Either<Product, Rejection>>, ProtocolError> {
        let event = match self.state {
            PdiState::AwaitingStartFlag => {
                let flag: StartFlag =
                    zerocopy::try_transmute!(b).map_err(|_| ProtocolError::StartFlag(b))?;

                match flag {
                    StartFlag::DataFrame => {
                        self.digits = 0;
                        self.frame_length = 0;
                        self.state = PdiState::ReadingFrameLength;
                        None
                    }
                    StartFlag::HeaderFrame => {
                        self.end_discarding();
                        self.state = PdiState::ReadingMethodFlag;
                        None
                    }
                    // The rejected product was already reported.
                    _ if self.end_discarding() => {
                        self.discard();
                        None
                    }
                    StartFlag::Tail => Some(self.complete()),
                    StartFlag::Unsupported => {
                        let discarded = self.discard();
                        Some(Right(Rejection::Unsupported { discarded }))
                    }
                    StartFlag::Abort => {
                        let discarded = self.discard();
                        Some(Right(Rejection::Aborted { discarded }))
                    }
                }
            }

            PdiState::ReadingFrameLength => {
                let digit = match b {
                    b' ' => Some(0),
                    b'0'..=b'9' => Some(usize::from(b - b'0')),
                    _ => None,
                };

                match digit {
                    Some(digit) => {
                        self.frame_length = self.frame_length * 10 + digit;
                        self.digits += 1;

                        if self.digits < FRAME_LENGTH_DIGITS {
                            None
                        } else if self.frame_length == 0 {
                            self.append_frame()
                        } else {
                            self.frame = Vec::with_capacity(self.frame_length);
                            self.state = PdiState::ReadingDataFrame;
                            None
                        }
                    }
                    None => self.reject(Rejection::FrameLength(b)),
                }
            }

            PdiState::ReadingDataFrame => {
                self.frame.push(b);
                if self.frame.len() == self.frame_length {
                    self.append_frame()
                } else {
                    None
                }
            }

            PdiState::ReadingMethodFlag => {
                self.skipped = 0;
                self.state = PdiState::SkippingHeaderBlock;
                None
            }

            PdiState::SkippingHeaderBlock => {
                self.skipped += 1;
                if self.skipped == HEADER_BLOCK_BYTES {
                    self.state = PdiState::AwaitingStartFlag;
                }
                None
            }
        };

        Ok(event)
    }

    fn reset(&mut self) {
        self.discard();
        self.discarding = false;
    }

    fn received(&self) -> u64 {
        self.received
    }
}
