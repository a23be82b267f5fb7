//! PBT テスト共通ユーティリティ

use http11_exchange::{Action, Exchange, Notification, Outcome, TransportEvent};
use proptest::prelude::*;

// ========================================
// ヘッダー生成
// ========================================

fn token_char() -> impl Strategy<Value = char> {
    prop_oneof![
        prop::char::range('a', 'z'),
        prop::char::range('A', 'Z'),
        prop::char::range('0', '9'),
        Just('-'),
        Just('_'),
        Just('.'),
    ]
}

/// トークン (1-max_len 文字)
pub fn token(max_len: usize) -> impl Strategy<Value = String> {
    proptest::collection::vec(token_char(), 1..=max_len)
        .prop_map(|chars| chars.into_iter().collect())
}

pub fn field_name() -> impl Strategy<Value = String> {
    token(32)
}

/// フィールド値
///
/// 先頭の空白はパース時に取り除かれるので生成しない。
pub fn field_value() -> impl Strategy<Value = String> {
    prop_oneof![
        "[!-~][ -~]{0,63}".prop_map(|s| s),
        Just("text/plain; charset=utf-8".to_string()),
        Just("日本語の値".to_string()),
    ]
}

pub fn fields() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::vec((field_name(), field_value()), 0..10)
}

pub fn method() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("GET".to_string()),
        Just("POST".to_string()),
        Just("PUT".to_string()),
        Just("DELETE".to_string()),
        Just("HEAD".to_string()),
        token(8),
    ]
}

pub fn request_target() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("/".to_string()),
        "/[a-zA-Z0-9/_.?=&-]{1,64}".prop_map(|s| s),
    ]
}

pub fn status_code() -> impl Strategy<Value = u16> {
    prop_oneof![
        200u16..=206,
        300u16..=308,
        400u16..=451,
        500u16..=511,
    ]
}

/// ステータステキスト
///
/// 前後の空白は取り除かれるので生成しない。
pub fn status_text() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("OK".to_string()),
        Just("Not Found".to_string()),
        "[A-Za-z]([A-Za-z ]{0,30}[A-Za-z])?".prop_map(|s| s),
    ]
}

// ========================================
// 分割
// ========================================

/// `data` を `cuts` の位置 (data.len() で割った余り) で分割する
pub fn split_at_points<'a>(data: &'a [u8], cuts: &[usize]) -> Vec<&'a [u8]> {
    if data.is_empty() {
        return vec![data];
    }
    let mut points: Vec<usize> = cuts.iter().map(|c| c % data.len()).collect();
    points.sort_unstable();
    points.dedup();

    let mut pieces = Vec::new();
    let mut start = 0;
    for point in points {
        pieces.push(&data[start..point]);
        start = point;
    }
    pieces.push(&data[start..]);
    pieces
}

// ========================================
// chunked エンコード
// ========================================

/// チャンク列とトレーラーを chunked 形式のバイト列にする
///
/// 空のチャンクは終端と区別できないので含めない。
pub fn encode_chunked(chunks: &[Vec<u8>], trailers: &[(String, String)]) -> Vec<u8> {
    let mut wire = Vec::new();
    for chunk in chunks.iter().filter(|c| !c.is_empty()) {
        wire.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
        wire.extend_from_slice(chunk);
        wire.extend_from_slice(b"\r\n");
    }
    wire.extend_from_slice(b"0\r\n");
    for (name, value) in trailers {
        wire.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    wire.extend_from_slice(b"\r\n");
    wire
}

// ========================================
// エクスチェンジ駆動
// ========================================

/// エクスチェンジの実行結果
#[derive(Debug)]
pub struct ExchangeRun {
    pub actions: Vec<Action>,
    pub notifications: Vec<Notification>,
    pub outcome: Option<Outcome>,
}

impl ExchangeRun {
    /// ボディ断片をすべて連結したもの
    pub fn body(&self) -> Vec<u8> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::BodyFragment(b) => Some(b.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    pub fn trailers(&self) -> Vec<(String, String)> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                Notification::TrailerField { name, value } => {
                    Some((name.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

/// `incoming` を受信データとしてエクスチェンジを最後まで実行する
///
/// 行の読み取りは CRLF まで、固定長の読み取りは指定バイト数を切り出す。
/// データが足りなければ切断として扱う。
pub fn run_exchange(exchange: &mut Exchange, incoming: &[u8]) -> ExchangeRun {
    let mut actions = Vec::new();
    let mut notifications = Vec::new();
    let mut rest = incoming;

    exchange.start().unwrap();
    while let Some(action) = exchange.poll_action() {
        actions.push(action.clone());
        let event = match action {
            Action::Connect { port, .. } => TransportEvent::Connected {
                address: "127.0.0.1".to_string(),
                port,
            },
            Action::StartSecure { .. } => TransportEvent::Secured,
            Action::Write { tag, .. } => TransportEvent::Written(tag),
            Action::ReadLine { tag, .. } => match rest.windows(2).position(|w| w == b"\r\n") {
                Some(i) => {
                    let (line, tail) = rest.split_at(i + 2);
                    rest = tail;
                    TransportEvent::Data {
                        data: line.to_vec(),
                        tag,
                    }
                }
                None => TransportEvent::Disconnected(None),
            },
            Action::ReadExact { len, tag, .. } => {
                if rest.len() < len {
                    TransportEvent::Disconnected(None)
                } else {
                    let (block, tail) = rest.split_at(len);
                    rest = tail;
                    TransportEvent::Data {
                        data: block.to_vec(),
                        tag,
                    }
                }
            }
            Action::Close => TransportEvent::Disconnected(None),
        };
        exchange.handle_event(event).unwrap();
        while let Some(n) = exchange.poll_notification() {
            notifications.push(n);
        }
    }

    ExchangeRun {
        actions,
        notifications,
        outcome: exchange.outcome().cloned(),
    }
}
