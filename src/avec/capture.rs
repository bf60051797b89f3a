//! Capture of raw feed bytes, for diagnosing decoding problems.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Appends every received byte of a session to a file.
#[derive(Debug)]
pub struct CaptureSink {
    file: File,
    path: PathBuf,
}

impl CaptureSink {
    /// Path of the capture for a session started at `started`: the template
    /// with a `.YYYYMMDD-HHMMSS` extension appended.
    pub fn session_path(template: &Path, started: DateTime<Utc>) -> PathBuf {
        let mut name = OsString::from(template.as_os_str());
        name.push(started.format(".%Y%m%d-%H%M%S").to_string());
        PathBuf::from(name)
    }

    pub fn create(template: &Path, started: DateTime<Utc>) -> io::Result<Self> {
        let path = Self::session_path(template, started);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { file, path })
    }

    /// Open a capture, logging and returning nothing on failure.
    pub fn open_or_warn(template: &Path, started: DateTime<Utc>) -> Option<Self> {
        match Self::create(template, started) {
            Ok(sink) => {
                info!(path = %sink.path.display(), "capturing feed");
                Some(sink)
            }
            Err(e) => {
                warn!(
                    template = %template.display(),
                    error = %e,
                    "cannot open capture file; capture disabled"
                );
                None
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append bytes. Returns false, after logging, if the capture failed.
    pub fn write(&mut self, r: &[u8]) -> bool {
        match self.file.write_all(r) {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "capture write failed; capture disabled");
                false
            }
        }
    }
}
