//! chunked デコーダーのテスト
//!
//! ワイヤ上のバイト列を、デコーダーの要求どおり 1 行ずつ / N バイトずつ切り出して投入する。
//! 要求された量のデータが揃わない場合 (接続切断) は `Done` に到達しないことも確認する。

use http11_exchange::{
    ChunkSizeParsing, ChunkedDecoder, ChunkedInput, ChunkedOutput, ChunkedStage, Error, Limits,
    ReadRequest,
};

/// 投入結果
#[derive(Debug, Default)]
struct Decoded {
    payloads: Vec<Vec<u8>>,
    trailers: Vec<(String, String)>,
    done: bool,
}

/// デコーダーの要求に従ってワイヤを消費する
///
/// データが尽きたらその時点で終了する。
fn drive(decoder: &mut ChunkedDecoder, wire: &[u8]) -> Result<Decoded, Error> {
    let mut decoded = Decoded::default();
    let mut rest = wire;

    while let Some(request) = decoder.next_request() {
        let step = match request {
            ReadRequest::Line => {
                let Some(i) = rest.windows(2).position(|w| w == b"\r\n") else {
                    break;
                };
                let (line, tail) = rest.split_at(i + 2);
                rest = tail;
                decoder.feed(ChunkedInput::Line(line))?
            }
            ReadRequest::Exact(n) => {
                if rest.len() < n {
                    break;
                }
                let (block, tail) = rest.split_at(n);
                rest = tail;
                decoder.feed(ChunkedInput::Block(block))?
            }
        };

        match step.output {
            Some(ChunkedOutput::Payload(p)) => decoded.payloads.push(p),
            Some(ChunkedOutput::Trailer { name, value }) => decoded.trailers.push((name, value)),
            None => {}
        }
    }

    decoded.done = decoder.is_done();
    Ok(decoded)
}

#[test]
fn wiki_pedia() {
    let mut decoder = ChunkedDecoder::new();
    let decoded = drive(&mut decoder, b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n").unwrap();
    assert_eq!(decoded.payloads, vec![b"Wiki".to_vec(), b"pedia".to_vec()]);
    assert!(decoded.trailers.is_empty());
    assert!(decoded.done);
    assert_eq!(decoder.body_size(), 9);
}

#[test]
fn trailer_only() {
    let mut decoder = ChunkedDecoder::new();
    let decoded = drive(&mut decoder, b"0\r\nX-Trailer: v\r\n\r\n").unwrap();
    assert!(decoded.payloads.is_empty());
    assert_eq!(
        decoded.trailers,
        vec![("X-Trailer".to_string(), "v".to_string())]
    );
    assert!(decoded.done);
}

#[test]
fn chunk_extensions_are_ignored() {
    let mut decoder = ChunkedDecoder::new();
    let decoded = drive(
        &mut decoder,
        b"5;name=value\r\nhello\r\n6 ; foo\r\n world\r\n0;last\r\n\r\n",
    )
    .unwrap();
    assert_eq!(decoded.payloads.concat(), b"hello world".to_vec());
    assert!(decoded.done);
}

#[test]
fn uppercase_hex_size() {
    let mut decoder = ChunkedDecoder::new();
    let body = vec![b'x'; 0x1A];
    let mut wire = b"1A\r\n".to_vec();
    wire.extend_from_slice(&body);
    wire.extend_from_slice(b"\r\n0\r\n\r\n");

    let decoded = drive(&mut decoder, &wire).unwrap();
    assert_eq!(decoded.payloads, vec![body]);
}

#[test]
fn incomplete_body_never_reaches_done() {
    for wire in [
        &b"4\r\nWiki\r\n"[..],
        b"4\r\nWi",
        b"4\r\nWiki\r\n0\r\n",
        b"4\r\nWiki\r\n0\r\nX-A: 1\r\n",
    ] {
        let mut decoder = ChunkedDecoder::new();
        let decoded = drive(&mut decoder, wire).unwrap();
        assert!(!decoded.done, "{:?}", String::from_utf8_lossy(wire));
        assert_ne!(decoder.stage(), ChunkedStage::Done);
    }
}

#[test]
fn strict_rejects_garbage_after_size() {
    let mut decoder = ChunkedDecoder::new();
    assert!(matches!(
        decoder.feed(ChunkedInput::Line(b"4x\r\n")),
        Err(Error::InvalidChunkSize(_))
    ));

    let mut decoder = ChunkedDecoder::new();
    assert!(matches!(
        decoder.feed(ChunkedInput::Line(b"\r\n")),
        Err(Error::InvalidChunkSize(_))
    ));
}

#[test]
fn lenient_reads_leading_hex_digits() {
    let mut decoder = ChunkedDecoder::new().size_parsing(ChunkSizeParsing::Lenient);
    let step = decoder.feed(ChunkedInput::Line(b"4x\r\n")).unwrap();
    assert_eq!(step.next, Some(ReadRequest::Exact(6)));

    // 数字がなければ 0 として扱う
    let mut decoder = ChunkedDecoder::new().size_parsing(ChunkSizeParsing::Lenient);
    decoder.feed(ChunkedInput::Line(b"zz\r\n")).unwrap();
    assert_eq!(decoder.stage(), ChunkedStage::AwaitingFooter);
}

#[test]
fn chunk_size_limit() {
    let limits = Limits {
        max_chunk_size: 8,
        ..Limits::default()
    };
    let mut decoder = ChunkedDecoder::with_limits(limits);
    assert!(matches!(
        decoder.feed(ChunkedInput::Line(b"9\r\n")),
        Err(Error::ChunkTooLarge { size: 9, limit: 8 })
    ));
}

#[test]
fn body_size_limit() {
    let limits = Limits {
        max_body_size: 6,
        ..Limits::default()
    };
    let mut decoder = ChunkedDecoder::with_limits(limits);
    let result = drive(&mut decoder, b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n");
    assert!(matches!(
        result,
        Err(Error::BodyTooLarge { size: 9, limit: 6 })
    ));
}

#[test]
fn trailer_count_limit() {
    let limits = Limits {
        max_trailer_count: 1,
        ..Limits::default()
    };
    let mut decoder = ChunkedDecoder::with_limits(limits);
    let result = drive(&mut decoder, b"0\r\nA: 1\r\nB: 2\r\n\r\n");
    assert!(matches!(result, Err(Error::TooManyTrailers { .. })));
}

#[test]
fn overflowing_size() {
    let mut decoder = ChunkedDecoder::with_limits(Limits::unlimited());
    assert!(matches!(
        decoder.feed(ChunkedInput::Line(b"10000000000000000\r\n")),
        Err(Error::ChunkTooLarge { .. })
    ));
}

#[test]
fn feed_after_done() {
    let mut decoder = ChunkedDecoder::new();
    drive(&mut decoder, b"0\r\n\r\n").unwrap();
    assert!(decoder.is_done());
    assert_eq!(decoder.next_request(), None);
    assert!(matches!(
        decoder.feed(ChunkedInput::Line(b"0\r\n")),
        Err(Error::InvalidState(_))
    ));
}
