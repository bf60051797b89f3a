#![allow(dead_code)]

use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;

use noaaport::avec::{Archiver, LinkStatus};
use noaaport::sans::record::CanonicalRecord;

pub const SOH: u8 = 0x01;
pub const ETX: u8 = 0x03;
pub const RS: u8 = 0x1E;

pub const HEADER: &[u8] = b"SXUS70 KWAL 191200\r\r\n";
pub const TRAILER: &[u8] = b" 39+0NN 059E";

pub const WAIT: Duration = Duration::from_secs(5);

/// 19 October 2026, day 292.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

/// A message body: address, fail flag, day and time, payload, trailer.
pub fn body(address: &[u8], day_time: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(address);
    out.push(b' ');
    out.extend_from_slice(day_time);
    out.extend_from_slice(payload);
    out.extend_from_slice(TRAILER);
    out
}

pub fn default_body() -> Vec<u8> {
    body(b"CE1234A6", b"291123045", b"B1@@Gt@Fq")
}

/// A raw-framed product, without sequence number.
pub fn raw_message(header: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = vec![SOH, b'\r', b'\r', b'\n'];
    out.extend_from_slice(header);
    out.push(RS);
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\r\n");
    out.push(ETX);
    out
}

/// A raw-framed product, preceded by a sequence number.
pub fn sequenced_message(sequence: u32, header: &[u8], body: &[u8]) -> Vec<u8> {
    let mut out = vec![SOH, b'\r', b'\r', b'\n'];
    out.extend_from_slice(sequence.to_string().as_bytes());
    out.extend_from_slice(b" \r\r\n");
    out.extend_from_slice(header);
    out.push(RS);
    out.extend_from_slice(body);
    out.push(ETX);
    out
}

/// A PDI data frame.
pub fn pdi_frame(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0];
    out.extend_from_slice(format!("{:04}", data.len()).as_bytes());
    out.extend_from_slice(data);
    out
}

/// A PDI header frame.
pub fn pdi_header_frame(fill: u8) -> Vec<u8> {
    let mut out = vec![1, b'A'];
    out.extend(std::iter::repeat_n(fill, 256));
    out
}

/// A complete PDI product, split into frames of at most `chunk` bytes.
pub fn pdi_product(header: &[u8], body: &[u8], chunk: usize) -> Vec<u8> {
    let mut product = header.to_vec();
    product.push(RS);
    product.extend_from_slice(body);

    let mut out = pdi_header_frame(0);
    for data in product.chunks(chunk) {
        out.extend(pdi_frame(data));
    }
    out.push(2);
    out
}

/// Collects everything an archiver is told, for tests across threads.
pub struct Collector {
    records: Mutex<Sender<CanonicalRecord>>,
    statuses: Mutex<Sender<LinkStatus>>,
}

pub struct Received {
    pub records: Receiver<CanonicalRecord>,
    pub statuses: Receiver<LinkStatus>,
}

impl Collector {
    pub fn new() -> (Self, Received) {
        let (record_tx, records) = channel();
        let (status_tx, statuses) = channel();
        let collector = Self {
            records: Mutex::new(record_tx),
            statuses: Mutex::new(status_tx),
        };
        (collector, Received { records, statuses })
    }
}

impl Archiver for Collector {
    fn archive(&self, record: CanonicalRecord) {
        let _ = self.records.lock().send(record);
    }

    fn set_status(&self, status: LinkStatus) {
        let _ = self.statuses.lock().send(status);
    }
}

impl Received {
    pub fn record(&self) -> CanonicalRecord {
        self.records.recv_timeout(WAIT).expect("no record archived")
    }

    pub fn status(&self) -> LinkStatus {
        self.statuses.recv_timeout(WAIT).expect("no status reported")
    }

    /// Records archived so far, without waiting.
    pub fn drain_records(&self) -> Vec<CanonicalRecord> {
        self.records.try_iter().collect()
    }
}
