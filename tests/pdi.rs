mod common;

use either::Either::{Left, Right};
use noaaport::avec::{Error, Ingest, LinkStats, decode_slice};
use noaaport::sans::{
    FrameDecoder, ProtocolError, Rejection,
    header::{HeaderError, HeaderRules},
    pdi::{PdiDecoder, PdiState},
};

use common::{
    Collector, HEADER, RS, body, default_body, pdi_frame, pdi_header_frame, pdi_product, today,
};

/// Feed bytes to a decoder, collecting every product body and rejection.
fn run(decoder: &mut PdiDecoder, r: &[u8]) -> (Vec<Vec<u8>>, Vec<Rejection>) {
    let mut products = vec![];
    let mut rejections = vec![];
    for &b in r {
        match decoder.advance(b).unwrap() {
            Some(Left(product)) => products.push(product.body),
            Some(Right(rejection)) => rejections.push(rejection),
            None => {}
        }
    }
    (products, rejections)
}

#[test]
fn frames_concatenate() {
    let mut feed = pdi_frame(b"abcde");
    feed.extend(pdi_frame(b"fghij"));

    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &feed);

    assert!(products.is_empty());
    assert!(rejections.is_empty());
    assert_eq!(decoder.pending(), b"abcdefghij");
    assert_eq!(decoder.state(), PdiState::AwaitingStartFlag);

    // No header terminator in the reassembled product.
    let (_, rejections) = run(&mut decoder, &[2]);
    assert!(matches!(
        rejections.as_slice(),
        [Rejection::Header(HeaderError::MissingTerminator)]
    ));
    assert!(decoder.pending().is_empty());
}

#[test]
fn single_product() {
    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &pdi_product(HEADER, &default_body(), 5));

    assert!(rejections.is_empty());
    assert_eq!(products, vec![default_body()]);
    assert_eq!(decoder.received(), 1);
}

#[test]
fn product_has_no_sequence() {
    let mut decoder = PdiDecoder::new();
    let feed = pdi_product(HEADER, &default_body(), 64);
    let product = feed
        .iter()
        .find_map(|&b| decoder.advance(b).unwrap().and_then(|e| e.left()))
        .unwrap();
    assert_eq!(product.sequence, None);
}

#[test]
fn header_frame_skipped() {
    // Fill bytes that would read as tail flags if not skipped.
    let mut feed = pdi_header_frame(2);
    let mut product = HEADER.to_vec();
    product.push(RS);
    product.extend_from_slice(&default_body());
    feed.extend(pdi_frame(&product));
    feed.push(2);

    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &feed);

    assert!(rejections.is_empty());
    assert_eq!(products, vec![default_body()]);
}

#[test]
fn abort_discards_product() {
    let mut feed = pdi_frame(b"SXUS70 KWAL");
    feed.push(4);
    feed.extend(pdi_product(HEADER, &default_body(), 16));

    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &feed);

    assert!(matches!(
        rejections.as_slice(),
        [Rejection::Aborted { discarded: 11 }]
    ));
    assert_eq!(products.len(), 1);
}

#[test]
fn unsupported_discards_product() {
    let mut feed = pdi_frame(b"SXUS");
    feed.push(3);
    feed.extend(pdi_product(HEADER, &default_body(), 16));

    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &feed);

    assert!(matches!(
        rejections.as_slice(),
        [Rejection::Unsupported { discarded: 4 }]
    ));
    assert_eq!(products.len(), 1);
}

#[test]
fn undefined_start_flag() {
    let mut decoder = PdiDecoder::new();
    assert!(matches!(
        decoder.advance(5),
        Err(ProtocolError::StartFlag(5))
    ));

    let mut decoder = PdiDecoder::new();
    run(&mut decoder, &pdi_frame(b"abc"));
    assert!(matches!(
        decoder.advance(b'S'),
        Err(ProtocolError::StartFlag(b'S'))
    ));
}

#[test]
fn length_digits_may_be_spaces() {
    let feed = [0, b' ', b' ', b' ', b'3', b'a', b'b', b'c'];

    let mut decoder = PdiDecoder::new();
    let (_, rejections) = run(&mut decoder, &feed);

    assert!(rejections.is_empty());
    assert_eq!(decoder.pending(), b"abc");
}

#[test]
fn zero_length_frame() {
    let mut decoder = PdiDecoder::new();
    let (_, rejections) = run(&mut decoder, &[0, b'0', b'0', b'0', b'0']);

    assert!(rejections.is_empty());
    assert!(decoder.pending().is_empty());
    assert_eq!(decoder.state(), PdiState::AwaitingStartFlag);
}

#[test]
fn bad_length_byte_discards_product() {
    let mut feed = pdi_frame(b"abc");
    feed.extend_from_slice(&[0, b'0', b'x']);

    let mut decoder = PdiDecoder::new();
    let (_, rejections) = run(&mut decoder, &feed);

    assert!(matches!(
        rejections.as_slice(),
        [Rejection::FrameLength(b'x')]
    ));
    assert!(decoder.pending().is_empty());
    assert_eq!(decoder.state(), PdiState::AwaitingStartFlag);
}

#[test]
fn short_header_rejected() {
    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &pdi_product(b"SXUS70 KWAL", &default_body(), 32));

    assert!(products.is_empty());
    assert!(matches!(
        rejections.as_slice(),
        [Rejection::Header(HeaderError::TooShort { len: 11, min: 18 })]
    ));
    assert_eq!(decoder.received(), 0);
}

#[test]
fn office_filter() {
    let mut feed = pdi_product(b"SXUS70 KWBC 191200\r\r\n", &default_body(), 32);
    feed.extend(pdi_product(b"TXUS70 KWAL 191200\r\r\n", &default_body(), 32));
    feed.extend(pdi_product(HEADER, &default_body(), 32));

    let mut decoder = PdiDecoder::new();
    let (products, rejections) = run(&mut decoder, &feed);

    assert_eq!(products.len(), 1);
    assert!(matches!(
        rejections.as_slice(),
        [
            Rejection::Header(HeaderError::Office(office)),
            Rejection::Header(HeaderError::Designator(b'T')),
        ] if office == "KWBC"
    ));
}

#[test]
fn product_overflow_resets() {
    let mut decoder = PdiDecoder::new().with_product_bound(16);
    let mut feed = pdi_frame(&[b'x'; 12]);
    feed.extend(pdi_frame(&[b'x'; 12]));

    let (_, rejections) = run(&mut decoder, &feed);

    assert!(matches!(
        rejections.as_slice(),
        [Rejection::ProductOverflow(overflow)] if overflow.limit == 16
    ));
    assert!(decoder.pending().is_empty());
    assert_eq!(decoder.state(), PdiState::AwaitingStartFlag);
}

#[test]
fn reset_discards_partial_frame() {
    let mut feed = pdi_frame(b"abc");
    feed.extend_from_slice(&[0, b'0', b'0', b'1', b'0', b'x']);

    let mut decoder = PdiDecoder::new();
    run(&mut decoder, &feed);
    assert_eq!(decoder.state(), PdiState::ReadingDataFrame);

    decoder.reset();
    assert_eq!(decoder.state(), PdiState::AwaitingStartFlag);
    assert!(decoder.pending().is_empty());
}

#[test]
fn ingest_archives_records() {
    let mut feed = pdi_product(HEADER, &default_body(), 7);
    feed.extend(pdi_frame(b"SXUS70"));
    feed.push(4);
    feed.extend(pdi_product(b"SXUS70 KWBC 191200\r\r\n", &default_body(), 7));
    feed.extend(pdi_product(HEADER, &default_body(), 100));

    let (collector, received) = Collector::new();
    let stats = LinkStats::default();
    let mut ingest = Ingest::new(PdiDecoder::new(), &collector, &stats).with_clock(today);
    decode_slice(&feed, &mut ingest).unwrap();

    let records = received.drain_records();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.payload() == b"B1@@Gt@Fq"));
    assert_eq!(stats.archived(), 2);
    // An abort is not a drop.
    assert_eq!(stats.dropped(), 1);
}

#[test]
fn ingest_stops_on_protocol_error() {
    let mut feed = pdi_product(HEADER, &default_body(), 7);
    feed.push(9);
    feed.extend(pdi_product(HEADER, &default_body(), 7));

    let (collector, received) = Collector::new();
    let stats = LinkStats::default();
    let mut ingest = Ingest::new(PdiDecoder::new(), &collector, &stats).with_clock(today);

    assert!(matches!(
        decode_slice(&feed, &mut ingest),
        Err(Error::Protocol(ProtocolError::StartFlag(9)))
    ));
    assert_eq!(received.drain_records().len(), 1);
}

#[test]
fn overflowed_product_ends_silently() {
    let long = body(b"CE1234A6", b"291123045", &[b'x'; 100]);
    let mut feed = pdi_product(HEADER, &long, 16);
    feed.extend(pdi_product(HEADER, &default_body(), 16));

    let mut decoder = PdiDecoder::new().with_product_bound(64);
    let (products, rejections) = run(&mut decoder, &feed);

    assert!(matches!(
        rejections.as_slice(),
        [Rejection::ProductOverflow(overflow)] if overflow.limit == 64
    ));
    assert_eq!(products, vec![default_body()]);
}

#[test]
fn overflowed_product_may_be_aborted() {
    let mut feed = pdi_frame(&[b'x'; 12]);
    feed.extend(pdi_frame(&[b'x'; 12]));
    feed.extend(pdi_frame(&[b'x'; 12]));
    feed.push(4);
    feed.extend(pdi_frame(b"abc"));

    let mut decoder = PdiDecoder::new().with_product_bound(16);
    let (_, rejections) = run(&mut decoder, &feed);

    assert_eq!(rejections.len(), 1);
    assert_eq!(decoder.pending(), b"abc");
}

#[test]
fn overflow_counted_once() {
    let long = body(b"CE1234A6", b"291123045", &[b'x'; 100]);
    let mut feed = pdi_product(HEADER, &long, 16);
    feed.extend(pdi_product(HEADER, &default_body(), 16));

    let (collector, received) = Collector::new();
    let stats = LinkStats::default();
    let decoder = PdiDecoder::new().with_product_bound(64);
    let mut ingest = Ingest::new(decoder, &collector, &stats).with_clock(today);
    decode_slice(&feed, &mut ingest).unwrap();

    assert_eq!(received.drain_records().len(), 1);
    assert_eq!(stats.archived(), 1);
    assert_eq!(stats.dropped(), 1);
}

#[test]
fn custom_office() {
    let rules = HeaderRules {
        office: *b"KWBC",
        ..HeaderRules::default()
    };
    let mut feed = pdi_product(b"SXUS70 KWBC 191200\r\r\n", &default_body(), 32);
    feed.extend(pdi_product(HEADER, &default_body(), 32));

    let mut decoder = PdiDecoder::new().with_rules(rules);
    let (products, rejections) = run(&mut decoder, &feed);

    assert_eq!(products, vec![default_body()]);
    assert!(matches!(
        rejections.as_slice(),
        [Rejection::Header(HeaderError::Office(office))] if office == "KWAL"
    ));
}
