//! Slice-based feed decoding, used to replay captured feeds.

use crate::sans::FrameDecoder;

use super::{Error, Ingest};

/// Decode a feed held in a slice.
///
/// Bytes of a message still incomplete at the end of the slice remain in the
/// decoder, so a feed may be decoded across several slices.
///
/// This method is also re-exported as `noaaport::avec::decode_slice`.
pub fn decode<D: FrameDecoder>(r: &[u8], o: &mut Ingest<'_, D>) -> Result<(), Error> {
    o.feed(r)?;
    Ok(())
}
