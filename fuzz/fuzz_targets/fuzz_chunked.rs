#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use http11_exchange::{
    ChunkSizeParsing, ChunkedDecoder, ChunkedInput, ChunkedOutput, Limits, ReadRequest,
};

#[derive(Arbitrary, Debug)]
struct FuzzChunked {
    chunks: Vec<Vec<u8>>,
    raw: Vec<u8>,
    lenient: bool,
    small_limits: bool,
}

/// デコーダーの要求どおりにワイヤを切り出して投入する
///
/// 完了すればペイロードを連結して返す。
fn decode(decoder: &mut ChunkedDecoder, wire: &[u8]) -> Option<Vec<u8>> {
    let mut rest = wire;
    let mut body = Vec::new();

    while let Some(request) = decoder.next_request() {
        let input = match request {
            ReadRequest::Line => {
                let i = rest.windows(2).position(|w| w == b"\r\n")?;
                let (line, tail) = rest.split_at(i + 2);
                rest = tail;
                ChunkedInput::Line(line)
            }
            ReadRequest::Exact(n) => {
                if rest.len() < n {
                    return None;
                }
                let (block, tail) = rest.split_at(n);
                rest = tail;
                ChunkedInput::Block(block)
            }
        };
        let step = decoder.feed(input).ok()?;
        if let Some(ChunkedOutput::Payload(p)) = step.output {
            body.extend_from_slice(&p);
        }
        assert_eq!(step.next, decoder.next_request());
    }

    assert!(decoder.is_done());
    Some(body)
}

fuzz_target!(|input: FuzzChunked| {
    let parsing = if input.lenient {
        ChunkSizeParsing::Lenient
    } else {
        ChunkSizeParsing::Strict
    };
    let limits = if input.small_limits {
        Limits {
            max_chunk_size: 64,
            max_body_size: 256,
            max_chunk_line_size: 16,
            max_trailer_count: 2,
            ..Limits::default()
        }
    } else {
        Limits::default()
    };

    // 任意のバイト列
    let mut decoder = ChunkedDecoder::with_limits(limits.clone()).size_parsing(parsing);
    if decode(&mut decoder, &input.raw).is_some() {
        assert!(decoder.body_size() <= limits.max_body_size);
    }

    // 正しくエンコードしたもの
    let chunks: Vec<&Vec<u8>> = input.chunks.iter().filter(|c| !c.is_empty()).take(64).collect();
    let mut wire = Vec::new();
    for chunk in &chunks {
        wire.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        wire.extend_from_slice(chunk);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n\r\n");

    let mut decoder = ChunkedDecoder::with_limits(limits).size_parsing(parsing);
    if let Some(body) = decode(&mut decoder, &wire) {
        let expected: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(body, expected);
    } else {
        assert!(input.small_limits);
    }
});
