//! ChunkedDecoder のプロパティテスト

use http11_exchange::{
    ChunkSizeParsing, ChunkedDecoder, ChunkedInput, ChunkedOutput, Error, Limits, ReadRequest,
};
use pbt::{encode_chunked, field_name, field_value};
use proptest::prelude::*;

#[derive(Debug, Default)]
struct Decoded {
    payloads: Vec<Vec<u8>>,
    trailers: Vec<(String, String)>,
    consumed: usize,
}

/// デコーダーの要求どおりにワイヤを切り出して投入する
fn drive(decoder: &mut ChunkedDecoder, wire: &[u8]) -> Result<Decoded, Error> {
    let mut decoded = Decoded::default();
    let mut rest = wire;

    while let Some(request) = decoder.next_request() {
        let (input, tail) = match request {
            ReadRequest::Line => {
                let Some(i) = rest.windows(2).position(|w| w == b"\r\n") else {
                    break;
                };
                let (line, tail) = rest.split_at(i + 2);
                (ChunkedInput::Line(line), tail)
            }
            ReadRequest::Exact(n) => {
                if rest.len() < n {
                    break;
                }
                let (block, tail) = rest.split_at(n);
                (ChunkedInput::Block(block), tail)
            }
        };
        decoded.consumed += rest.len() - tail.len();
        rest = tail;

        match decoder.feed(input)?.output {
            Some(ChunkedOutput::Payload(p)) => decoded.payloads.push(p),
            Some(ChunkedOutput::Trailer { name, value }) => decoded.trailers.push((name, value)),
            None => {}
        }
    }
    Ok(decoded)
}

fn chunks() -> impl Strategy<Value = Vec<Vec<u8>>> {
    proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..300), 0..8)
}

fn trailers() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((field_name(), field_value()), 0..4)
}

// ========================================
// デコード
// ========================================

proptest! {
    #[test]
    fn decodes_encoded_chunks(
        chunks in chunks(),
        trailers in trailers(),
        trailing in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let mut wire = encode_chunked(&chunks, &trailers);
        let encoded_len = wire.len();
        wire.extend_from_slice(&trailing);

        let mut decoder = ChunkedDecoder::new();
        let decoded = drive(&mut decoder, &wire).unwrap();

        prop_assert!(decoder.is_done());
        prop_assert_eq!(decoded.consumed, encoded_len);
        prop_assert_eq!(&decoded.payloads, &chunks);
        prop_assert_eq!(&decoded.trailers, &trailers);
        let total: usize = chunks.iter().map(Vec::len).sum();
        prop_assert_eq!(decoder.body_size(), total as u64);
    }

    #[test]
    fn truncated_wire_never_completes(
        chunks in chunks(),
        trailers in trailers(),
        cut in any::<usize>(),
    ) {
        let wire = encode_chunked(&chunks, &trailers);
        let cut = cut % wire.len();

        let mut decoder = ChunkedDecoder::new();
        drive(&mut decoder, &wire[..cut]).unwrap();
        prop_assert!(!decoder.is_done());
    }

    #[test]
    fn lenient_agrees_with_strict_on_valid_input(
        chunks in chunks(),
        trailers in trailers(),
    ) {
        let wire = encode_chunked(&chunks, &trailers);

        let mut strict = ChunkedDecoder::new();
        let mut lenient = ChunkedDecoder::new().size_parsing(ChunkSizeParsing::Lenient);
        let a = drive(&mut strict, &wire).unwrap();
        let b = drive(&mut lenient, &wire).unwrap();

        prop_assert_eq!(a.payloads, b.payloads);
        prop_assert_eq!(a.trailers, b.trailers);
        prop_assert!(strict.is_done() && lenient.is_done());
    }

    #[test]
    fn size_line_extensions_are_ignored(
        payload in proptest::collection::vec(any::<u8>(), 1..100),
        ext in "[a-z]{1,8}(=[a-z0-9]{1,8})?",
    ) {
        let mut wire = format!("{:X};{}\r\n", payload.len(), ext).into_bytes();
        wire.extend_from_slice(&payload);
        wire.extend_from_slice(b"\r\n0\r\n\r\n");

        let mut decoder = ChunkedDecoder::new();
        let decoded = drive(&mut decoder, &wire).unwrap();
        prop_assert!(decoder.is_done());
        prop_assert_eq!(decoded.payloads, vec![payload]);
    }
}

// ========================================
// 制限
// ========================================

proptest! {
    #[test]
    fn chunk_size_limit(
        chunks in chunks(),
        limit in 1u64..300,
    ) {
        let wire = encode_chunked(&chunks, &[]);
        let limits = Limits { max_chunk_size: limit, ..Limits::default() };
        let mut decoder = ChunkedDecoder::with_limits(limits);

        let too_large = chunks.iter().any(|c| c.len() as u64 > limit);
        match drive(&mut decoder, &wire) {
            Ok(_) => prop_assert!(!too_large && decoder.is_done()),
            Err(Error::ChunkTooLarge { size, limit: l }) => {
                prop_assert!(too_large);
                prop_assert!(size > l);
                prop_assert_eq!(l, limit);
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn body_size_limit(
        chunks in chunks(),
        limit in 0u64..1000,
    ) {
        let wire = encode_chunked(&chunks, &[]);
        let limits = Limits { max_body_size: limit, ..Limits::default() };
        let mut decoder = ChunkedDecoder::with_limits(limits);

        let total: u64 = chunks.iter().map(|c| c.len() as u64).sum();
        match drive(&mut decoder, &wire) {
            Ok(_) => prop_assert!(total <= limit),
            Err(Error::BodyTooLarge { size, .. }) => {
                prop_assert!(total > limit);
                prop_assert!(size > limit);
                prop_assert!(decoder.body_size() <= limit);
            }
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }

    #[test]
    fn trailer_count_limit(
        trailers in proptest::collection::vec((field_name(), field_value()), 0..8),
        limit in 0usize..6,
    ) {
        let wire = encode_chunked(&[], &trailers);
        let limits = Limits { max_trailer_count: limit, ..Limits::default() };
        let mut decoder = ChunkedDecoder::with_limits(limits);

        match drive(&mut decoder, &wire) {
            Ok(decoded) => {
                prop_assert!(trailers.len() <= limit);
                prop_assert_eq!(decoded.trailers.len(), trailers.len());
            }
            Err(Error::TooManyTrailers { .. }) => prop_assert!(trailers.len() > limit),
            Err(e) => prop_assert!(false, "unexpected error: {}", e),
        }
    }
}

#[test]
fn arbitrary_lines_never_panic() {
    proptest!(|(lines in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 0..10))| {
        let mut decoder = ChunkedDecoder::new().size_parsing(ChunkSizeParsing::Lenient);
        for line in &lines {
            let input = match decoder.next_request() {
                Some(ReadRequest::Line) => ChunkedInput::Line(line),
                Some(ReadRequest::Exact(_)) => ChunkedInput::Block(line),
                None => break,
            };
            if decoder.feed(input).is_err() {
                break;
            }
        }
    });
}
