//! Interfaces driving the decoders from sockets, readers and slices.
//!
//! Decoded records are published to an [`Archiver`], which also receives the
//! lifecycle status of the feed connection. The [`Ingest`] pipeline ties a
//! framing decoder to an archiver; [`server`] accepts feed connections and
//! runs one pipeline per session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, io};

use chrono::{NaiveDate, Utc};
use either::Either::{Left, Right};
use thiserror::Error;
use tracing::{debug, warn};

use crate::sans::{FrameDecoder, Product, ProtocolError, Rejection, record};

pub mod capture;
pub mod config;
pub mod reader;
pub mod server;
pub mod session;
pub mod slice;

pub use reader::decode as decode_reader;
pub use slice::decode as decode_slice;

/// Errors ending a feed session.
#[derive(Debug, Error)]
pub enum Error {
    /// An error from the feed connection or reader.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The feed sent a byte with no defined meaning.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Connection status of the feed, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// Waiting for a feed provider to connect.
    Listening,
    /// A feed connection was established.
    Connected,
    /// Bytes are arriving on the feed connection.
    Receiving,
    /// The feed connection ended.
    Disconnected,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Listening => "Listening",
            Self::Connected => "Connected",
            Self::Receiving => "Receiving",
            Self::Disconnected => "Disconnected",
        })
    }
}

/// Receive canonical records and feed status.
///
/// Implementations are shared between the accept loop and session threads.
/// The default implementation of [`Archiver::set_status`] ignores updates.
pub trait Archiver: Send + Sync {
    /// Take ownership of a decoded record.
    fn archive(&self, record: record::CanonicalRecord);

    /// Observe a change in connection status.
    fn set_status(&self, _status: LinkStatus) {}
}

/// Counters of feed quality, shared by a server and its sessions.
#[derive(Debug, Default)]
pub struct LinkStats {
    archived: AtomicU64,
    dropped: AtomicU64,
    sessions: AtomicU64,
}

impl LinkStats {
    /// Records delivered to the archiver.
    pub fn archived(&self) -> u64 {
        self.archived.load(Ordering::Relaxed)
    }

    /// Messages dropped by framing, validation or conversion.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Feed connections accepted or established.
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::Relaxed)
    }

    pub(crate) fn record_session(&self) {
        self.sessions.fetch_add(1, Ordering::Relaxed);
    }
}

/// Today's date in UTC.
pub fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// A pipeline from feed bytes to archived records.
pub struct Ingest<'a, D> {
    decoder: D,
    archiver: &'a dyn Archiver,
    stats: &'a LinkStats,
    clock: fn() -> NaiveDate,
    receiving: bool,
}

impl<'a, D: FrameDecoder> Ingest<'a, D> {
    pub fn new(decoder: D, archiver: &'a dyn Archiver, stats: &'a LinkStats) -> Self {
        Self {
            decoder,
            archiver,
            stats,
            clock: utc_today,
            receiving: false,
        }
    }

    /// Replace the clock used to infer message years.
    pub fn with_clock(mut self, clock: fn() -> NaiveDate) -> Self {
        self.clock = clock;
        self
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// Process feed bytes in order, archiving every completed record.
    pub fn feed(&mut self, r: &[u8]) -> Result<(), ProtocolError> {
        if !r.is_empty() && !self.receiving {
            self.receiving = true;
            self.archiver.set_status(LinkStatus::Receiving);
        }

        for &b in r {
            match self.decoder.advance(b)? {
                None => {}
                Some(Left(product)) => self.archive(product),
                Some(Right(rejection)) => self.drop_rejected(rejection),
            }
        }

        Ok(())
    }

    fn archive(&mut self, product: Product) {
        match record::convert(&product.body, (self.clock)()) {
            Ok(record) => {
                let record = record.with_sequence(product.sequence);
                debug!(
                    address = %String::from_utf8_lossy(&record.header().address),
                    sequence = ?record.sequence(),
                    len = record.payload().len(),
                    "archiving DCP message"
                );
                self.archiver.archive(record);
                self.stats.archived.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(error = %e, sequence = ?product.sequence, "dropped DCP message");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn drop_rejected(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::Aborted { discarded } => {
                debug!(discarded, "product aborted by sender");
            }
            rejection => {
                warn!(error = %rejection, "discarded feed bytes");
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
