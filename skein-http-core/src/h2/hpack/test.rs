use std::io::Cursor;

use bytes::BytesMut;
use http::{HeaderName, HeaderValue, Method};

use super::{Decoder, DecoderError, Encoder, Header};
use super::decoder::decode_int;
use super::encoder::encode_int;
use super::header::BytesStr;

fn field(name: &str, value: &str) -> Header {
    Header::Field {
        name: HeaderName::from_bytes(name.as_bytes()).unwrap(),
        value: HeaderValue::from_bytes(value.as_bytes()).unwrap(),
    }
}

fn roundtrip(headers: Vec<Header>) -> Vec<Header> {
    let mut encoder = Encoder::default();
    let mut decoder = Decoder::default();
    let mut buf = BytesMut::new();
    encoder.encode(headers, &mut buf);

    let mut decoded = Vec::new();
    decoder
        .decode(&mut Cursor::new(&mut buf), |h| decoded.push(h))
        .unwrap();
    decoded
}

#[test]
fn integer_roundtrip_all_prefixes() {
    for prefix in 1..=8u8 {
        for value in [
            0usize,
            1,
            (1 << prefix as usize) - 2,
            (1 << prefix as usize) - 1,
            (1 << prefix as usize),
            127,
            128,
            255,
            16_383,
            1_337_042,
            usize::MAX >> 1,
        ] {
            let mut buf = BytesMut::new();
            encode_int(value, prefix, 0, &mut buf);
            let got = decode_int(&mut Cursor::new(&mut buf), prefix).unwrap();
            assert_eq!(got, value, "prefix={prefix} value={value}");
        }
    }
}

#[test]
fn integer_at_prefix_boundary_has_zero_continuation() {
    // 2^N - 1 fills the prefix; the continuation must be a single zero.
    let mut buf = BytesMut::new();
    encode_int(31, 5, 0, &mut buf);
    assert_eq!(buf.as_ref(), &[0b0001_1111, 0]);
    assert_eq!(decode_int(&mut Cursor::new(&mut buf), 5).unwrap(), 31);
}

#[test]
fn integer_rfc_example() {
    // RFC 7541 C.1.2: 1337 with a 5-bit prefix.
    let mut buf = BytesMut::new();
    encode_int(1337, 5, 0, &mut buf);
    assert_eq!(buf.as_ref(), &[0b0001_1111, 0b1001_1010, 0b0000_1010]);
}

#[test]
fn integer_overflow_is_rejected() {
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0xff]);
    buf.extend_from_slice(&[0xff; 12]);
    buf.extend_from_slice(&[0x7f]);
    assert_eq!(
        decode_int(&mut Cursor::new(&mut buf), 7).unwrap_err(),
        DecoderError::IntegerOverflow
    );
}

#[test]
fn header_list_roundtrips_in_order() {
    let headers = vec![
        Header::Method(Method::GET),
        Header::Scheme(BytesStr::from("https")),
        Header::Path(BytesStr::from("/search?q=hpack")),
        Header::Authority(BytesStr::from("example.com")),
        field("accept", "text/html"),
        field("x-custom", "one"),
        field("x-custom", "two"),
    ];
    assert_eq!(roundtrip(headers.clone()), headers);
}

#[test]
fn static_indices_for_common_request() {
    // :method GET, :scheme https and :path / hit static entries 2, 7 and
    // 4; :authority needs a literal with incremental indexing.
    let headers = vec![
        Header::Method(Method::GET),
        Header::Scheme(BytesStr::from("https")),
        Header::Path(BytesStr::from("/")),
        Header::Authority(BytesStr::from("example.com")),
    ];
    let mut encoder = Encoder::default();
    let mut buf = BytesMut::new();
    encoder.encode(headers, &mut buf);

    assert_eq!(&buf[..3], &[0x82, 0x87, 0x84]);
    // Literal with incremental indexing, name index 1 (:authority).
    assert_eq!(buf[3], 0x41);
}

#[test]
fn second_occurrence_uses_dynamic_table() {
    let mut encoder = Encoder::default();
    let mut decoder = Decoder::default();

    let mut first = BytesMut::new();
    encoder.encode(vec![field("x-trace-id", "abc123")], &mut first);

    let mut second = BytesMut::new();
    encoder.encode(vec![field("x-trace-id", "abc123")], &mut second);

    // Once in the dynamic table the whole pair collapses to one index:
    // 62 == first dynamic entry.
    assert_eq!(second.as_ref(), &[0x80 | 62]);

    for mut buf in [first, second] {
        let mut seen = Vec::new();
        decoder
            .decode(&mut Cursor::new(&mut buf), |h| seen.push(h))
            .unwrap();
        assert_eq!(seen, vec![field("x-trace-id", "abc123")]);
    }
}

#[test]
fn decoder_table_stays_within_bound() {
    let mut encoder = Encoder::default();
    let mut decoder = Decoder::new(128);
    decoder.queue_size_update(128);

    for i in 0..64 {
        let mut buf = BytesMut::new();
        encoder.encode(
            vec![field("x-filler", &format!("value-{i:04}"))],
            &mut buf,
        );
        // The encoder table is 4096 wide so it keeps indexing; the decoder
        // is told 128: it must keep evicting, never exceeding its bound...
        match decoder.decode(&mut Cursor::new(&mut buf), |_| {}) {
            Ok(()) => assert!(decoder.table_size() <= 128),
            // ...or report the index gone, never read past the bound.
            Err(DecoderError::InvalidTableIndex) => return,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn size_update_instruction_is_bounded() {
    // 001xxxxx with a size above the announced maximum is an error.
    let mut decoder = Decoder::new(4096);
    let mut buf = BytesMut::new();
    encode_int(40_000, 5, 0b0010_0000, &mut buf);
    assert_eq!(
        decoder.decode(&mut Cursor::new(&mut buf), |_| {}).unwrap_err(),
        DecoderError::InvalidMaxDynamicSize
    );
}

#[test]
fn never_indexed_is_preserved_as_sensitive() {
    let mut value = HeaderValue::from_static("secret-token");
    value.set_sensitive(true);
    let header = Header::Field {
        name: HeaderName::from_static("authorization"),
        value,
    };

    let mut encoder = Encoder::default();
    let mut buf = BytesMut::new();
    encoder.encode(vec![header], &mut buf);

    // `0001xxxx` with name index 23 (authorization): the 4-bit prefix
    // saturates at 15 and continues with 23 - 15 = 8.
    assert_eq!(&buf[..2], &[0x1f, 0x08]);

    let mut decoder = Decoder::default();
    let mut seen = Vec::new();
    decoder
        .decode(&mut Cursor::new(&mut buf), |h| seen.push(h))
        .unwrap();
    match &seen[0] {
        Header::Field { value, .. } => assert!(value.is_sensitive()),
        other => panic!("unexpected header: {other:?}"),
    }
}

#[test]
fn index_zero_is_reserved() {
    let mut decoder = Decoder::default();
    let mut buf = BytesMut::from(&[0x80u8][..]);
    assert_eq!(
        decoder.decode(&mut Cursor::new(&mut buf), |_| {}).unwrap_err(),
        DecoderError::InvalidTableIndex
    );
}

#[test]
fn truncated_input_is_rejected() {
    // Literal with indexing announcing a 10-byte name, then nothing.
    let mut decoder = Decoder::default();
    let mut buf = BytesMut::from(&[0x40u8, 0x0a][..]);
    assert!(matches!(
        decoder.decode(&mut Cursor::new(&mut buf), |_| {}).unwrap_err(),
        DecoderError::NeedMore(_)
    ));
}

#[test]
fn rfc_appendix_c_request_sequence() {
    // C.3.1: first request, no Huffman.
    let wire = [
        0x82, 0x86, 0x84, 0x41, 0x0f, 0x77, 0x77, 0x77, 0x2e, 0x65, 0x78, 0x61, 0x6d, 0x70,
        0x6c, 0x65, 0x2e, 0x63, 0x6f, 0x6d,
    ];
    let mut decoder = Decoder::default();
    let mut buf = BytesMut::from(&wire[..]);
    let mut seen = Vec::new();
    decoder
        .decode(&mut Cursor::new(&mut buf), |h| seen.push(h))
        .unwrap();
    assert_eq!(
        seen,
        vec![
            Header::Method(Method::GET),
            Header::Scheme(BytesStr::from("http")),
            Header::Path(BytesStr::from("/")),
            Header::Authority(BytesStr::from("www.example.com")),
        ]
    );
    // The authority literal entered the dynamic table: 57 octets.
    assert_eq!(decoder.table_size(), 57);
}

#[test]
fn plain_string_when_huffman_is_not_shorter() {
    // A value of rare symbols would inflate under Huffman; the encoder
    // must fall back to the plain form.
    let headers = vec![field("x-bin", "\x01\x02\x03\x04")];
    assert_eq!(roundtrip(headers.clone()), headers);
}

#[test]
fn quickcheck_header_roundtrip() {
    fn prop(pairs: Vec<(u8, u8)>) -> bool {
        let headers: Vec<Header> = pairs
            .iter()
            .enumerate()
            .map(|(i, &(n, v))| {
                field(
                    &format!("x-k{}-{}", i % 4, n),
                    &format!("v-{v}"),
                )
            })
            .collect();
        roundtrip(headers.clone()) == headers
    }
    quickcheck::quickcheck(prop as fn(Vec<(u8, u8)>) -> bool);
}

#[test]
fn empty_value_static_entries_are_name_only() {
    // "accept" (static 19) has an empty RFC value; a header with a value
    // must come out as a literal with name index, not a full index.
    let mut encoder = Encoder::default();
    let mut buf = BytesMut::new();
    encoder.encode(vec![field("accept", "*/*")], &mut buf);
    assert_eq!(buf[0], 0x40 | 19);
}

#[test]
fn huffman_chosen_when_strictly_shorter() {
    let mut encoder = Encoder::default();
    let mut buf = BytesMut::new();
    // "www.example.com" huffman-encodes to 12 bytes < 15.
    encoder.encode(vec![Header::Authority(BytesStr::from("www.example.com"))], &mut buf);
    // name index 1, then huffman flag + length 12
    assert_eq!(buf[0], 0x41);
    assert_eq!(buf[1], 0x80 | 12);
}

#[test]
fn eos_in_huffman_string_is_rejected() {
    // Header value of four 0xff bytes: huffman flag set, decodes into EOS.
    let mut buf = BytesMut::new();
    buf.extend_from_slice(&[0x00, 0x01, b'x', 0x84, 0xff, 0xff, 0xff, 0xff]);
    let mut decoder = Decoder::default();
    assert_eq!(
        decoder.decode(&mut Cursor::new(&mut buf), |_| {}).unwrap_err(),
        DecoderError::InvalidHuffmanCode
    );
}
