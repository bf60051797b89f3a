//! Reader-based feed decoding.

use std::io::{ErrorKind, Read};

use crate::sans::FrameDecoder;

use super::{Error, Ingest, capture::CaptureSink};

/// Bytes requested from the reader per read call.
const READ_CHUNK: usize = 4096;

/// Decode a feed from a reader until it reports end of stream.
///
/// Raw bytes are copied to `capture`, if supplied, before decoding. A capture
/// that fails to write is disabled, and decoding continues.
///
/// This method is also re-exported as `noaaport::avec::decode_reader`.
pub fn decode<D: FrameDecoder>(
    r: &mut impl Read,
    o: &mut Ingest<'_, D>,
    capture: &mut Option<CaptureSink>,
) -> Result<(), Error> {
    let mut buf = [0; READ_CHUNK];

    loop {
        let n = match r.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => Err(e)?,
        };

        if let Some(sink) = capture {
            if !sink.write(&buf[..n]) {
                *capture = None;
            }
        }

        o.feed(&buf[..n])?;
    }
}
