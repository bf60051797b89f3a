//! Receiver configuration.
//!
//! Configuration is read from TOML. Every key is optional:
//!
//! ```toml
//! receiver_type = "pdi"
//! port = 18000
//! capture_file = "/var/lib/noaaport/capture"
//! ```

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use either::Either::{Left, Right};
use serde::Deserialize;
use thiserror::Error;

use crate::sans::{
    Decoder,
    pdi::PdiDecoder,
    raw::{DEFAULT_HEADER_BOUND, DEFAULT_PRODUCT_BOUND, RawDecoder},
};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 18000;
/// Default read timeout on a feed connection: thirty minutes.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30 * 60;

/// An error loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Framing used by the feed provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverType {
    /// The native product stream, historically named `marta`.
    #[default]
    #[serde(alias = "marta")]
    Raw,
    /// The PDI packet encapsulation.
    Pdi,
}

/// Settings of a feed receiver. Missing keys take their default values.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReceiverConfig {
    pub receiver_type: ReceiverType,
    /// Address to listen on.
    pub bind_address: IpAddr,
    /// Port to listen on, or to connect to.
    pub port: u16,
    /// When set, connect to the feed provider instead of listening.
    pub hostname: Option<String>,
    /// Template of the per-session capture file path.
    pub capture_file: Option<PathBuf>,
    /// Seconds without traffic before a session is dropped. Zero waits
    /// forever.
    pub read_timeout_secs: u64,
    /// Disable Nagle's algorithm on feed connections.
    pub nodelay: bool,
    /// Bound on raw product header bytes.
    pub max_header_bytes: usize,
    /// Bound on the bytes of one product.
    pub max_product_bytes: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            receiver_type: ReceiverType::Raw,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            hostname: None,
            capture_file: None,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            nodelay: true,
            max_header_bytes: DEFAULT_HEADER_BOUND,
            max_product_bytes: DEFAULT_PRODUCT_BOUND,
        }
    }
}

impl ReceiverConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&s)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Build a decoder for the configured framing.
    ///
    /// Sequence numbers are only expected of raw feeds, and only when this
    /// receiver initiated the connection.
    pub fn decoder(&self, sequenced: bool) -> Decoder {
        match self.receiver_type {
            ReceiverType::Raw => Left(
                RawDecoder::new(sequenced)
                    .with_bounds(self.max_header_bytes, self.max_product_bytes),
            ),
            ReceiverType::Pdi => {
                Right(PdiDecoder::new().with_product_bound(self.max_product_bytes))
            }
        }
    }
}
