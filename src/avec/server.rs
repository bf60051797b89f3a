//! Listening server for feed connections.
//!
//! Only one feed provider is authoritative at a time: before a newly accepted
//! connection is served, every existing session is terminated, and its thread
//! joined. The registry of sessions is otherwise touched only when a session
//! ends and removes itself.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::sans::Decoder;

use super::{
    Archiver, LinkStats, LinkStatus,
    config::ReceiverConfig,
    session::{self, Session},
};

/// Time allowed for the connection waking a blocked accept on shutdown.
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds the decoder of each new session.
pub type DecoderFactory = Box<dyn Fn() -> Decoder + Send + Sync>;

/// A session registered with the server.
pub(crate) struct Worker {
    id: u64,
    peer: SocketAddr,
    stream: TcpStream,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Shut down the session's socket, failing its pending read.
    pub(crate) fn release(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(session = self.id, error = %e, "session socket already closed");
        }
    }

    /// Release the socket and wait for the session thread to finish.
    fn terminate(mut self) {
        self.release();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                warn!(session = self.id, "session thread panicked");
            }
        }
    }
}

/// Sessions currently running.
#[derive(Default)]
pub(crate) struct Registry {
    workers: Mutex<HashMap<u64, Worker>>,
    next_id: AtomicU64,
}

impl Registry {
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Worker>> {
        self.workers.lock()
    }

    /// Deregister a session. Whoever removes a worker releases its socket.
    pub(crate) fn remove(&self, id: u64) -> Option<Worker> {
        self.workers.lock().remove(&id)
    }

    fn drain(&self) -> Vec<Worker> {
        self.workers.lock().drain().map(|(_, w)| w).collect()
    }

    fn len(&self) -> usize {
        self.workers.lock().len()
    }
}

/// State shared by the accept loop, its sessions and shutdown handles.
pub(crate) struct Shared {
    pub(crate) registry: Registry,
    pub(crate) archiver: Arc<dyn Archiver>,
    shutdown: AtomicBool,
    wake_addr: SocketAddr,
}

impl Shared {
    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn terminate_all(&self) {
        for worker in self.registry.drain() {
            info!(session = worker.id, peer = %worker.peer, "terminating feed session");
            worker.terminate();
        }
    }
}

/// Stops a [`Server`] from another thread.
#[derive(Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    /// Stop accepting connections and terminate every session.
    ///
    /// Calling this more than once has no further effect.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down feed server");

        // Wake the accept loop, which checks the flag before serving.
        if let Err(e) = TcpStream::connect_timeout(&self.shared.wake_addr, WAKE_TIMEOUT) {
            debug!(error = %e, "cannot wake accept loop");
        }

        self.shared.terminate_all();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Number of sessions currently registered.
    pub fn active_sessions(&self) -> usize {
        self.shared.registry.len()
    }
}

/// Accepts feed connections, serving one at a time.
pub struct Server {
    listener: TcpListener,
    config: ReceiverConfig,
    factory: DecoderFactory,
    stats: Arc<LinkStats>,
    shared: Arc<Shared>,
}

impl Server {
    /// Bind the configured listening address.
    pub fn bind(config: ReceiverConfig, archiver: Arc<dyn Archiver>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr())?;
        Self::from_listener(listener, config, archiver)
    }

    /// Serve an already bound listener.
    pub fn from_listener(
        listener: TcpListener,
        config: ReceiverConfig,
        archiver: Arc<dyn Archiver>,
    ) -> io::Result<Self> {
        let local = listener.local_addr()?;
        let wake_addr = if local.ip().is_unspecified() {
            let loopback = match local.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            };
            SocketAddr::new(loopback, local.port())
        } else {
            local
        };

        let factory_config = config.clone();

        Ok(Self {
            listener,
            config,
            factory: Box::new(move || factory_config.decoder(false)),
            stats: Arc::new(LinkStats::default()),
            shared: Arc::new(Shared {
                registry: Registry::default(),
                archiver,
                shutdown: AtomicBool::new(false),
                wake_addr,
            }),
        })
    }

    /// Replace the builder of each session's decoder.
    pub fn with_decoder_factory(mut self, f: impl Fn() -> Decoder + Send + Sync + 'static) -> Self {
        self.factory = Box::new(f);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    /// Accept and serve connections until shut down.
    ///
    /// Returns an error if accepting fails for any reason other than
    /// shutdown. The listening socket is closed on return.
    pub fn listen(self) -> io::Result<()> {
        info!(addr = %self.listener.local_addr()?, "listening for feed connections");
        self.shared.archiver.set_status(LinkStatus::Listening);

        loop {
            let accepted = self.listener.accept();
            if self.shared.is_shutting_down() {
                debug!("accept loop stopped");
                return Ok(());
            }
            let (stream, peer) = accepted?;

            self.shared.terminate_all();

            if let Err(e) = self.start_session(stream, peer) {
                warn!(%peer, error = %e, "cannot start feed session");
            }
        }
    }

    fn start_session(&self, stream: TcpStream, peer: SocketAddr) -> io::Result<()> {
        session::configure(&stream, &self.config)?;
        let control = stream.try_clone()?;

        let id = self.shared.registry.next_id();
        self.stats.record_session();
        info!(session = id, %peer, "feed connection accepted");

        let session = Session {
            id,
            peer,
            decoder: (self.factory)(),
            capture: self.config.capture_file.clone(),
            archiver: self.shared.archiver.clone(),
            stats: self.stats.clone(),
            server: Some(self.shared.clone()),
        };

        // Registration happens under the lock, so the session cannot remove
        // itself before it is inserted.
        let mut workers = self.shared.registry.lock();
        if self.shared.is_shutting_down() {
            drop(workers);
            let _ = control.shutdown(Shutdown::Both);
            return Ok(());
        }

        let handle = thread::Builder::new()
            .name(format!("noaaport-session-{id}"))
            .spawn(move || {
                let _ = session.run(stream);
            })?;

        workers.insert(
            id,
            Worker {
                id,
                peer,
                stream: control,
                handle: Some(handle),
            },
        );

        Ok(())
    }
}
