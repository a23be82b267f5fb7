#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use http11_exchange::{MessageHeader, Role};

#[derive(Arbitrary, Debug)]
struct FuzzHeader {
    data: Vec<u8>,
    split_hint: u8,
    request: bool,
}

fn streaming(request: bool) -> MessageHeader {
    if request {
        MessageHeader::streaming_request()
    } else {
        MessageHeader::streaming_response()
    }
}

fuzz_target!(|input: FuzzHeader| {
    let split_size = (input.split_hint as usize % 32) + 1;

    let mut whole = streaming(input.request);
    let whole_taken = whole.append(&input.data);

    let mut pieces = streaming(input.request);
    let mut pieces_taken = 0;
    for part in input.data.chunks(split_size) {
        match pieces.append(part) {
            Ok(n) => pieces_taken += n,
            Err(_) => break,
        }
    }

    // 分割しても取り込まれる内容は変わらない
    if let Ok(n) = whole_taken {
        assert_eq!(n, pieces_taken);
        assert_eq!(whole.to_bytes(), pieces.to_bytes());
        assert_eq!(whole.is_complete(), pieces.is_complete());
    }

    let _ = whole.is_valid();
    let _ = whole.method();
    let _ = whole.request_target();
    let _ = whole.status_code();
    let _ = whole.status_text();
    let _ = whole.content_length();
    let _ = whole.is_chunked();
    let _ = whole.serialize();

    if whole.is_complete() {
        let cloned = match whole.role() {
            Role::Request => MessageHeader::clone_as_request(&whole),
            Role::Response => MessageHeader::clone_as_response(&whole),
        };
        // 構築済みヘッダーは再パースしても同じフィールドを持つ
        if let Some(cloned) = cloned {
            let mut reparsed = streaming(input.request);
            if reparsed.append(&cloned.to_bytes()).is_ok() {
                if let (Some(a), Some(b)) = (cloned.fields(), reparsed.fields()) {
                    for (name, _) in a.iter() {
                        assert!(b.contains(name));
                    }
                }
            }
        }
    }
});
