//! A receiver for GOES DCP messages rebroadcast over NOAAPORT.
//!
//! The feed arrives as a continuous byte stream over a long-lived TCP
//! connection, in one of two framings: the native product stream, delimited
//! by control bytes, or a vendor (PDI) packet encapsulation of it. Each DCP
//! message is reassembled, its header checked against the relay office, and
//! the envelope reformatted into the canonical fixed-layout DCP record that
//! downstream archives store. Payloads are carried as opaque bytes.
//!
//! The crate is split in two. The [`sans`] module holds the byte-at-a-time
//! framing state machines and the record converter, free of any I/O. The
//! [`avec`] module drives them from sockets, readers and slices, and owns the
//! listening server, its single-session takeover policy, and the optional
//! capture of raw feed bytes.
//!
//! Most users should begin with [`avec::server::Server`] and an implementation
//! of [`avec::Archiver`].
//!
//! ## Cargo Features
//!
//! The following crate feature flags are available:
//!
//! - `cli`: build the `noaaport-recv` command-line receiver (default).

pub mod avec;
pub mod sans;
