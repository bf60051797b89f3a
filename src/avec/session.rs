//! Feed sessions, accepted or initiated.

use std::io;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::sans::{Decoder, FrameDecoder};

use super::{
    Archiver, Error, Ingest, LinkStats, LinkStatus,
    capture::CaptureSink,
    config::ReceiverConfig,
    reader,
    server::Shared,
};

/// Apply the configured socket options to a feed connection.
pub(crate) fn configure(stream: &TcpStream, config: &ReceiverConfig) -> io::Result<()> {
    let timeout = (config.read_timeout_secs > 0).then(|| config.read_timeout());
    stream.set_read_timeout(timeout)?;
    stream.set_nodelay(config.nodelay)?;
    Ok(())
}

/// One feed connection and the pipeline decoding it.
pub(crate) struct Session {
    pub(crate) id: u64,
    pub(crate) peer: SocketAddr,
    pub(crate) decoder: Decoder,
    pub(crate) capture: Option<PathBuf>,
    pub(crate) archiver: Arc<dyn Archiver>,
    pub(crate) stats: Arc<LinkStats>,
    /// The accepting server, absent for initiated sessions.
    pub(crate) server: Option<Arc<Shared>>,
}

impl Session {
    /// Decode the connection until it closes or fails.
    ///
    /// Reports the connection first. Cleanup runs exactly once on return,
    /// including by unwinding.
    pub(crate) fn run(self, mut stream: TcpStream) -> Result<(), Error> {
        self.archiver.set_status(LinkStatus::Connected);
        let _cleanup = Cleanup {
            id: self.id,
            archiver: self.archiver.clone(),
            server: self.server.clone(),
            stream: stream.try_clone().ok(),
        };

        let mut capture = self
            .capture
            .as_deref()
            .and_then(|template| CaptureSink::open_or_warn(template, Utc::now()));

        let mut ingest = Ingest::new(self.decoder, &*self.archiver, &self.stats);
        let result = reader::decode(&mut stream, &mut ingest, &mut capture);
        let received = ingest.decoder().received();

        match &result {
            Ok(()) => {
                info!(session = self.id, peer = %self.peer, received, "feed closed the connection")
            }
            Err(Error::Io(e)) => {
                warn!(session = self.id, peer = %self.peer, received, error = %e, "feed connection lost")
            }
            Err(e) => {
                error!(session = self.id, peer = %self.peer, received, error = %e, "disconnecting feed")
            }
        }

        result
    }
}

/// Ends a session: reports it, deregisters it, and releases its socket.
struct Cleanup {
    id: u64,
    archiver: Arc<dyn Archiver>,
    server: Option<Arc<Shared>>,
    stream: Option<TcpStream>,
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        self.archiver.set_status(LinkStatus::Disconnected);

        match &self.server {
            Some(server) => {
                if let Some(worker) = server.registry.remove(self.id) {
                    worker.release();
                }
                if !server.is_shutting_down() {
                    self.archiver.set_status(LinkStatus::Listening);
                }
            }
            None => {
                if let Some(stream) = &self.stream {
                    let _ = stream.shutdown(Shutdown::Both);
                }
            }
        }
    }
}

/// Connect to the configured feed provider and decode its feed until the
/// connection ends.
///
/// The initiating side receives sequence numbers with each product. The
/// connection is not re-established.
pub fn dial(
    config: &ReceiverConfig,
    archiver: Arc<dyn Archiver>,
    stats: Arc<LinkStats>,
) -> Result<(), Error> {
    let host = config.hostname.as_deref().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "no feed hostname configured")
    })?;

    let stream = TcpStream::connect((host, config.port))?;
    configure(&stream, config)?;
    let peer = stream.peer_addr()?;

    stats.record_session();
    info!(%peer, "connected to feed provider");

    let session = Session {
        id: 0,
        peer,
        decoder: config.decoder(true),
        capture: config.capture_file.clone(),
        archiver,
        stats,
        server: None,
    };

    session.run(stream)
}
