//! The canonical DCP record, and conversion of product bodies into it.
//!
//! A product body, once its header is stripped and trailing whitespace
//! trimmed, is laid out as follows:
//!
//! | Offset        | Size | Field                                    |
//! |---------------|------|------------------------------------------|
//! | 0             | 8    | DCP address (hexadecimal)                |
//! | 8             | 1    | `?` if the message failed, else ignored  |
//! | 9             | 9    | Day of year and time, `DDDHHMMSS`        |
//! | 18            | N    | Payload                                  |
//! | 18 + N        | 1    | Separator                                |
//! | 19 + N        | 2    | Signal strength                          |
//! | 21 + N        | 2    | Frequency offset                         |
//! | 23 + N        | 1    | Modulation index                         |
//! | 24 + N        | 1    | Data quality                             |
//! | 25 + N        | 1    | Separator                                |
//! | 26 + N        | 3    | GOES channel                             |
//! | 29 + N        | 1    | Spacecraft                               |

use chrono::{Datelike, NaiveDate};
use thiserror::Error;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Bytes of fixed fields preceding the payload.
pub const LEADING_BYTES: usize = 18;
/// Bytes of fixed fields following the payload.
pub const TRAILING_BYTES: usize = 12;
/// Source tag identifying records received over NOAAPORT.
pub const SOURCE_TAG: [u8; 2] = *b"NP";
/// Largest payload the five-digit length field can describe.
pub const MAX_PAYLOAD_BYTES: usize = 99_999;

const ADDRESS: usize = 0;
const FAIL_FLAG: usize = 8;
const DAY_TIME: usize = 9;

// Offsets within the trailing fields.
const SIGNAL_STRENGTH: usize = 1;
const FREQUENCY_OFFSET: usize = 3;
const MODULATION_INDEX: usize = 5;
const DATA_QUALITY: usize = 6;
const CHANNEL: usize = 8;
const SPACECRAFT: usize = 11;

/// Fail code of a message received intact.
pub const GOOD: u8 = b'G';
/// Fail code of a message flagged as failed.
pub const FAILED: u8 = b'?';

/// An error converting a product body into a record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The body cannot hold the fixed fields.
    #[error("Message truncated ({len} bytes).")]
    Truncated { len: usize },
    /// The DCP address is not hexadecimal.
    #[error("Invalid DCP address ({0}).")]
    Address(String),
    /// The day of year and time are not all digits.
    #[error("Invalid day and time ({0}).")]
    DayTime(String),
    /// The GOES channel is not numeric.
    #[error("Invalid channel ({0}).")]
    Channel(String),
    /// The payload cannot be described by the length field.
    #[error("Payload too large ({0} bytes).")]
    PayloadTooLarge(usize),
    /// A rendered record's length field is not numeric.
    #[error("Invalid data length ({0}).")]
    DataLength(String),
    /// A rendered record's length field disagrees with its payload.
    #[error("Length field ({declared}) does not match payload ({actual} bytes).")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Fixed-layout header of a canonical record. All fields are ASCII.
#[repr(C)]
#[derive(Debug, Clone, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct RecordHeader {
    pub address: [u8; 8],
    pub year: [u8; 2],
    pub day_time: [u8; 9],
    pub fail_code: u8,
    pub signal_strength: [u8; 2],
    pub frequency_offset: [u8; 2],
    pub modulation_index: u8,
    pub data_quality: u8,
    pub channel: [u8; 3],
    pub spacecraft: u8,
    pub source: [u8; 2],
    pub data_length: [u8; 5],
}

impl RecordHeader {
    /// Rendered size of the header, in bytes.
    pub const SIZE: usize = size_of::<Self>();

    /// GOES channel as a number.
    pub fn channel_number(&self) -> u16 {
        self.channel
            .iter()
            .fold(0, |acc, c| acc * 10 + u16::from(c.wrapping_sub(b'0') % 10))
    }
}

/// One DCP message in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRecord {
    header: RecordHeader,
    payload: Vec<u8>,
    sequence: Option<u32>,
}

impl CanonicalRecord {
    /// Fixed fields of the record.
    pub fn header(&self) -> &RecordHeader {
        &self.header
    }

    /// Message payload, as received.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Feed sequence number of the message, if the feed carries them.
    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn with_sequence(mut self, sequence: Option<u32>) -> Self {
        self.sequence = sequence;
        self
    }

    /// Render the record as header bytes followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RecordHeader::SIZE + self.payload.len());
        out.extend_from_slice(self.header.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Read back a rendered record.
    pub fn parse(r: &[u8]) -> Result<Self, RecordError> {
        let (header, payload) = RecordHeader::read_from_prefix(r)
            .map_err(|_| RecordError::Truncated { len: r.len() })?;

        let declared = header
            .data_length
            .iter()
            .try_fold(0usize, |acc, c| {
                c.is_ascii_digit()
                    .then(|| acc * 10 + usize::from(c - b'0'))
            })
            .ok_or_else(|| RecordError::DataLength(lossy(&header.data_length)))?;

        if declared != payload.len() {
            Err(RecordError::LengthMismatch {
                declared,
                actual: payload.len(),
            })?;
        }

        Ok(Self {
            header,
            payload: payload.to_vec(),
            sequence: None,
        })
    }
}

/// Convert a product body into a canonical record.
///
/// `today` is the current UTC date, used to infer the year: a day of year
/// later than today's belongs to the previous year.
pub fn convert(body: &[u8], today: NaiveDate) -> Result<CanonicalRecord, RecordError> {
    let body = body.trim_ascii_end();
    let len = body.len();

    let payload_len = len
        .checked_sub(LEADING_BYTES + TRAILING_BYTES)
        .ok_or(RecordError::Truncated { len })?;

    if payload_len > MAX_PAYLOAD_BYTES {
        Err(RecordError::PayloadTooLarge(payload_len))?;
    }

    let address: [u8; 8] = take(body, ADDRESS);
    if !address.iter().all(u8::is_ascii_hexdigit) {
        Err(RecordError::Address(lossy(&address)))?;
    }

    let fail_code = if body[FAIL_FLAG] == FAILED { FAILED } else { GOOD };

    let day_time: [u8; 9] = take(body, DAY_TIME);
    if !day_time.iter().all(u8::is_ascii_digit) {
        Err(RecordError::DayTime(lossy(&day_time)))?;
    }

    let day = day_time[..3]
        .iter()
        .fold(0u32, |acc, c| acc * 10 + u32::from(c - b'0'));
    let year = infer_year(day, today);

    let t = len - TRAILING_BYTES;

    let mut channel: [u8; 3] = take(body, t + CHANNEL);
    for c in channel.iter_mut() {
        match *c {
            b' ' => *c = b'0',
            b'0'..=b'9' => {}
            _ => Err(RecordError::Channel(lossy(&take::<3>(body, t + CHANNEL))))?,
        }
    }

    let header = RecordHeader {
        address,
        year: ascii_digits(year.rem_euclid(100) as usize),
        day_time,
        fail_code,
        signal_strength: take(body, t + SIGNAL_STRENGTH),
        frequency_offset: take(body, t + FREQUENCY_OFFSET),
        modulation_index: body[t + MODULATION_INDEX],
        data_quality: body[t + DATA_QUALITY],
        channel,
        spacecraft: body[t + SPACECRAFT],
        source: SOURCE_TAG,
        data_length: ascii_digits(payload_len),
    };

    Ok(CanonicalRecord {
        header,
        payload: body[LEADING_BYTES..t].to_vec(),
        sequence: None,
    })
}

/// Year of a message stamped with `day` of year, received on `today`.
pub fn infer_year(day: u32, today: NaiveDate) -> i32 {
    if day > today.ordinal() {
        today.year() - 1
    } else {
        today.year()
    }
}

/// Copy a fixed-size field out of a body long enough to hold it.
fn take<const N: usize>(r: &[u8], at: usize) -> [u8; N] {
    let mut out = [0; N];
    out.copy_from_slice(&r[at..at + N]);
    out
}

/// Render a value as zero-padded ASCII digits, keeping the low digits.
fn ascii_digits<const N: usize>(mut value: usize) -> [u8; N] {
    let mut out = [b'0'; N];
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
    out
}

fn lossy(r: &[u8]) -> String {
    String::from_utf8_lossy(r).into_owned()
}
