//! Decoder for the native product stream.
//!
//! Products are delimited by control bytes:
//!
//! ```text
//! SOH [sequence WS] header RS body ETX
//! ```
//!
//! The sequence number is present only on sequenced feeds, which are those
//! this receiver initiates.

use either::Either::{self, Left, Right};

use super::{
    FrameDecoder, Product, ProtocolError, Rejection,
    buffer::BoundedBuffer,
    header::{ETX, HeaderRules, RS, SOH},
};

/// Default bound on header bytes.
pub const DEFAULT_HEADER_BOUND: usize = 256;
/// Default bound on product bytes.
pub const DEFAULT_PRODUCT_BOUND: usize = 32_768;
/// Shortest message body accepted between header and terminator.
pub const MIN_MESSAGE_BYTES: usize = 29;

/// Position of a [`RawDecoder`] within the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawState {
    /// Discarding bytes until a start of product.
    Hunting,
    /// Reading the decimal sequence number following a start of product.
    ReadingSequenceNumber,
    /// Accumulating header text.
    ReadingHeader,
    /// Accumulating the message body.
    ReadingMessage,
}

/// Byte-at-a-time decoder for the native product stream.
#[derive(Debug, Clone)]
pub struct RawDecoder {
    state: RawState,
    rules: HeaderRules,
    sequenced: bool,
    sequence: Option<u32>,
    header: BoundedBuffer,
    product: BoundedBuffer,
    received: u64,
}

impl RawDecoder {
    /// Create a decoder. Sequenced decoders expect a sequence number after
    /// every start of product.
    pub fn new(sequenced: bool) -> Self {
        Self {
            state: RawState::Hunting,
            rules: HeaderRules::default(),
            sequenced,
            sequence: None,
            header: BoundedBuffer::new(DEFAULT_HEADER_BOUND),
            product: BoundedBuffer::new(DEFAULT_PRODUCT_BOUND),
            received: 0,
        }
    }

    /// Validate product headers against `rules` instead of the defaults.
    pub fn with_rules(mut self, rules: HeaderRules) -> Self {
        self.rules = rules;
        self
    }

    /// Bound the sizes of the header and of the message body.
    pub fn with_bounds(mut self, header: usize, product: usize) -> Self {
        self.header = BoundedBuffer::new(header);
        self.product = BoundedBuffer::new(product);
        self
    }

    /// Current position within the stream.
    pub fn state(&self) -> RawState {
        self.state
    }

    /// Whether a sequence number is expected after each start of product.
    pub fn is_sequenced(&self) -> bool {
        self.sequenced
    }

    /// Enter the hunting state, forgetting the current sequence number.
    fn hunt(&mut self) {
        self.state = RawState::Hunting;
        self.sequence = None;
        self.header.clear();
        self.product.clear();
    }

    /// Resynchronise on a start of product seen mid-header or mid-message.
    fn restart_header(&mut self) {
        self.state = RawState::ReadingHeader;
        self.header.clear();
        self.product.clear();
    }

    fn reject(&mut self, rejection: Rejection) -> Option<Either<Product, Rejection>> {
        self.hunt();
        Some(Right(rejection))
    }
}

impl FrameDecoder for RawDecoder {
    fn advance(&mut self, b: u8) -> Result<Option<Either<Product, Rejection>>, ProtocolError> {
        let event = match self.state {
            RawState::Hunting => {
                if b == SOH {
                    self.hunt();
                    self.state = if self.sequenced {
                        RawState::ReadingSequenceNumber
                    } else {
                        RawState::ReadingHeader
                    };
                }
                None
            }

            RawState::ReadingSequenceNumber => {
                if b.is_ascii_digit() {
                    let digit = u32::from(b - b'0');
                    match self
                        .sequence
                        .unwrap_or(0)
                        .checked_mul(10)
                        .and_then(|n| n.checked_add(digit))
                    {
                        Some(n) => {
                            self.sequence = Some(n);
                            None
                        }
                        None => self.reject(Rejection::SequenceOverflow),
                    }
                } else if b.is_ascii_whitespace() {
                    if self.sequence.is_some() {
                        self.state = RawState::ReadingHeader;
                    }
                    None
                } else if b == SOH {
                    self.sequence = None;
                    None
                } else {
                    self.reject(Rejection::SequenceNumber(b))
                }
            }

            RawState::ReadingHeader => {
                if b == SOH {
                    self.restart_header();
                    None
                } else if b == RS {
                    match self.rules.validate(self.header.as_slice()) {
                        Ok(()) => {
                            self.product.clear();
                            self.state = RawState::ReadingMessage;
                            None
                        }
                        Err(e) => self.reject(e.into()),
                    }
                } else if self.header.is_empty() && b.is_ascii_whitespace() {
                    None
                } else {
                    match self.header.push(b) {
                        Ok(()) => None,
                        Err(e) => self.reject(Rejection::HeaderOverflow(e)),
                    }
                }
            }

            RawState::ReadingMessage => {
                if b == SOH {
                    self.restart_header();
                    None
                } else if b == ETX {
                    let len = self.product.len();
                    if len < MIN_MESSAGE_BYTES {
                        self.reject(Rejection::MessageTooShort { len })
                    } else {
                        let product = Product {
                            sequence: self.sequence,
                            body: self.product.take(),
                        };
                        self.received += 1;
                        self.hunt();
                        Some(Left(product))
                    }
                } else {
                    match self.product.push(b) {
                        Ok(()) => None,
                        Err(e) => self.reject(Rejection::ProductOverflow(e)),
                    }
                }
            }
        };

        Ok(event)
    }

    fn reset(&mut self) {
        self.hunt();
    }

    fn received(&self) -> u64 {
        self.received
    }
}
