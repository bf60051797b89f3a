//! Product header validation.
//!
//! Product headers open with a WMO abbreviated heading, such as
//! `SXUS70 KWAL 191200`. Only surface-data products (designator `S`) relayed
//! by the expected office are accepted.

use thiserror::Error;

/// Start of a product, or of a sequence number on sequenced feeds.
pub const SOH: u8 = 0x01;
/// End of a raw-framed product.
pub const ETX: u8 = 0x03;
/// End of a product header.
pub const RS: u8 = 0x1E;

/// Required leading designator of a product header.
pub const DESIGNATOR: u8 = b'S';
/// Office code of the relay whose products are archived.
pub const OFFICE_CODE: [u8; 4] = *b"KWAL";
/// Offset of the office code within a header.
pub const OFFICE_OFFSET: usize = 7;
/// Minimum header length, in bytes, within a PDI-encapsulated product.
pub const MIN_ENCAPSULATED_HEADER: usize = 18;

/// An error validating a product header.
#[derive(Debug, Error)]
pub enum HeaderError {
    /// No header bytes preceded the terminator.
    #[error("Empty header.")]
    Empty,
    /// The header does not start with the expected designator.
    #[error("Unexpected designator (0x{0:02x}).")]
    Designator(u8),
    /// The header is too short to hold an office code.
    #[error("Header too short ({len} bytes, need {min}).")]
    TooShort { len: usize, min: usize },
    /// The header was relayed by another office.
    #[error("Unexpected office code ({0}).")]
    Office(String),
    /// No header terminator in an encapsulated product.
    #[error("Missing header terminator.")]
    MissingTerminator,
}

/// Rules applied to product headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRules {
    pub designator: u8,
    pub office: [u8; 4],
    pub office_offset: usize,
    pub min_encapsulated: usize,
}

impl Default for HeaderRules {
    fn default() -> Self {
        Self {
            designator: DESIGNATOR,
            office: OFFICE_CODE,
            office_offset: OFFICE_OFFSET,
            min_encapsulated: MIN_ENCAPSULATED_HEADER,
        }
    }
}

impl HeaderRules {
    /// Validate the header of a raw-framed product, with its terminator
    /// removed.
    pub fn validate(&self, header: &[u8]) -> Result<(), HeaderError> {
        let Some(&first) = header.first() else {
            return Err(HeaderError::Empty);
        };

        if first != self.designator {
            Err(HeaderError::Designator(first))?;
        }

        let min = self.office_offset + self.office.len();
        if header.len() < min {
            Err(HeaderError::TooShort {
                len: header.len(),
                min,
            })?;
        }

        self.check_office(header)
    }

    /// Split a reassembled PDI product at its header terminator, validating
    /// the header.
    ///
    /// Returns the bytes following the terminator.
    pub fn split_encapsulated<'a>(&self, product: &'a [u8]) -> Result<&'a [u8], HeaderError> {
        let end = product
            .iter()
            .position(|&b| b == RS)
            .ok_or(HeaderError::MissingTerminator)?;

        let header = &product[..end];
        let min = self.min_encapsulated.max(self.office_offset + self.office.len());
        if header.len() < min {
            Err(HeaderError::TooShort {
                len: header.len(),
                min,
            })?;
        }

        if header[0] != self.designator {
            Err(HeaderError::Designator(header[0]))?;
        }

        self.check_office(header)?;

        Ok(&product[end + 1..])
    }

    /// Compare the office code. The header must be long enough to hold it.
    fn check_office(&self, header: &[u8]) -> Result<(), HeaderError> {
        let found = &header[self.office_offset..self.office_offset + self.office.len()];
        if found != self.office {
            Err(HeaderError::Office(String::from_utf8_lossy(found).into_owned()))?;
        }
        Ok(())
    }
}
