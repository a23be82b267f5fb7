//! HTTP メッセージヘッダー
//!
//! 1 つのリクエスト / レスポンスのヘッダーブロックを扱う。
//!
//! ## 使い方
//!
//! ### 受信 (ストリーミング)
//!
//! ```rust
//! use http11_exchange::MessageHeader;
//!
//! let mut header = MessageHeader::streaming_response();
//! header.append(b"HTTP/1.1 200 OK\r\n").unwrap();
//! header.append(b"Content-Length: 5\r\n").unwrap();
//! assert!(!header.is_complete());
//! header.append(b"\r\n").unwrap();
//! assert!(header.is_complete());
//!
//! assert_eq!(header.status_code(), Some(200));
//! assert_eq!(header.get_field("content-length"), Some("5"));
//! ```
//!
//! ### 送信 (構築済み)
//!
//! ```rust
//! use http11_exchange::MessageHeader;
//!
//! let request = MessageHeader::request("GET", "/index.php").field("Host", "example.com");
//! assert_eq!(
//!     request.serialize(),
//!     "GET /index.php HTTP/1.1\r\nHost: example.com\r\n\r\n"
//! );
//! ```

mod fields;
pub(crate) mod parse;

use std::fmt;
use std::sync::OnceLock;

use crate::error::Error;
use crate::limits::Limits;

pub use fields::Fields;

use parse::{Parsed, StartLine, parse_start_line};

/// ヘッダーブロックの終端
pub(crate) const TERMINATOR: &[u8; 4] = b"\r\n\r\n";

/// デフォルトの HTTP バージョン
const DEFAULT_VERSION: &str = "HTTP/1.1";

/// リクエストかレスポンスか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Request,
    Response,
}

/// 構築方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 受信したバイト列から少しずつ組み立てる
    Streaming,
    /// 送信用に最初から組み立て済み
    Prebuilt,
}

#[derive(Debug, Clone)]
enum Inner {
    Streaming {
        buf: Vec<u8>,
        max_size: usize,
        /// 完了後の最初の構造化アクセスで一度だけ埋まる
        parsed: OnceLock<Option<Parsed>>,
    },
    Prebuilt(Parsed),
}

/// HTTP メッセージヘッダー
#[derive(Debug, Clone)]
pub struct MessageHeader {
    role: Role,
    inner: Inner,
}

impl MessageHeader {
    /// 受信用の空のリクエストヘッダーを作成
    pub fn streaming_request() -> Self {
        Self::with_limits(Role::Request, &Limits::default())
    }

    /// 受信用の空のレスポンスヘッダーを作成
    pub fn streaming_response() -> Self {
        Self::with_limits(Role::Response, &Limits::default())
    }

    /// 制限付きで受信用の空のヘッダーを作成
    pub fn with_limits(role: Role, limits: &Limits) -> Self {
        Self {
            role,
            inner: Inner::Streaming {
                buf: Vec::new(),
                max_size: limits.max_header_size,
                parsed: OnceLock::new(),
            },
        }
    }

    /// 送信用のリクエストヘッダーを作成 (HTTP/1.1)
    pub fn request(method: &str, target: &str) -> Self {
        Self {
            role: Role::Request,
            inner: Inner::Prebuilt(Parsed {
                start: StartLine::Request {
                    method: method.to_string(),
                    target: target.to_string(),
                    version: DEFAULT_VERSION.to_string(),
                },
                fields: Fields::new(),
            }),
        }
    }

    /// 送信用のレスポンスヘッダーを作成 (HTTP/1.1)
    pub fn response(status_code: u16, status_text: &str) -> Self {
        Self {
            role: Role::Response,
            inner: Inner::Prebuilt(Parsed {
                start: StartLine::Response {
                    version: DEFAULT_VERSION.to_string(),
                    status_code: Some(status_code),
                    status_text: status_text.to_string(),
                },
                fields: Fields::new(),
            }),
        }
    }

    /// リクエストヘッダーの独立したコピーを作成
    ///
    /// 次の場合は None を返す:
    /// - `source` がレスポンス
    /// - `source` が受信途中 (未完了)
    /// - `source` のスタートラインが不正
    pub fn clone_as_request(source: &MessageHeader) -> Option<Self> {
        if source.role != Role::Request {
            return None;
        }
        let parsed = source.parsed()?.clone();
        Some(Self {
            role: Role::Request,
            inner: Inner::Prebuilt(parsed),
        })
    }

    /// レスポンスヘッダーの独立したコピーを作成
    ///
    /// `clone_as_request` と同じ条件に加え、ステータスコードが数値でない場合も None
    pub fn clone_as_response(source: &MessageHeader) -> Option<Self> {
        if source.role != Role::Response {
            return None;
        }
        let parsed = source.parsed()?.clone();
        if !matches!(
            parsed.start,
            StartLine::Response {
                status_code: Some(_),
                ..
            }
        ) {
            return None;
        }
        Some(Self {
            role: Role::Response,
            inner: Inner::Prebuilt(parsed),
        })
    }

    /// リクエストかレスポンスか
    pub fn role(&self) -> Role {
        self.role
    }

    /// 構築方法
    pub fn mode(&self) -> Mode {
        match self.inner {
            Inner::Streaming { .. } => Mode::Streaming,
            Inner::Prebuilt(_) => Mode::Prebuilt,
        }
    }

    pub fn is_request(&self) -> bool {
        self.role == Role::Request
    }

    pub fn is_response(&self) -> bool {
        self.role == Role::Response
    }

    /// 受信データを追加
    ///
    /// 終端 (CRLF CRLF) より後ろのバイトは取り込まない。
    /// 戻り値は実際に取り込んだバイト数で、完了済みなら 0。
    /// 終端は前回までのデータとの境界をまたいでいても検出する。
    ///
    /// パースは行わない。
    pub fn append(&mut self, data: &[u8]) -> Result<usize, Error> {
        let Inner::Streaming { buf, max_size, .. } = &mut self.inner else {
            return Err(Error::InvalidState(
                "append on a prebuilt header".to_string(),
            ));
        };

        if buf.ends_with(TERMINATOR) {
            return Ok(0);
        }

        let tail = &buf[buf.len().saturating_sub(TERMINATOR.len() - 1)..];
        let take = find_terminator_end(tail, data).unwrap_or(data.len());

        let new_size = buf.len() + take;
        if new_size > *max_size {
            return Err(Error::HeaderTooLarge {
                size: new_size,
                limit: *max_size,
            });
        }

        buf.extend_from_slice(&data[..take]);
        Ok(take)
    }

    /// ヘッダーブロックを最後まで受信したか
    ///
    /// バッファ末尾が CRLF CRLF かどうかだけを見る。内容の妥当性は問わない。
    /// 構築済みヘッダーは常に true
    pub fn is_complete(&self) -> bool {
        match &self.inner {
            Inner::Streaming { buf, .. } => buf.ends_with(TERMINATOR),
            Inner::Prebuilt(_) => true,
        }
    }

    /// これまでに受信した内容が HTTP ヘッダーとして妥当に見えるか
    ///
    /// 受信途中でも、最初の行が揃っていればその行だけで判定する。
    pub fn is_valid(&self) -> bool {
        match &self.inner {
            Inner::Prebuilt(_) => true,
            Inner::Streaming { buf, .. } => {
                if self.is_complete() {
                    return self.parsed().is_some();
                }
                let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") else {
                    return false;
                };
                let line = String::from_utf8_lossy(&buf[..pos]);
                parse_start_line(&line, self.role).is_some()
            }
        }
    }

    /// 受信済みのバイト数 (構築済みヘッダーはシリアライズ後の長さ)
    pub fn len(&self) -> usize {
        match &self.inner {
            Inner::Streaming { buf, .. } => buf.len(),
            Inner::Prebuilt(_) => self.serialize().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// HTTP メソッド (リクエストのみ)
    pub fn method(&self) -> Option<&str> {
        match &self.parsed()?.start {
            StartLine::Request { method, .. } => Some(method.as_str()),
            StartLine::Response { .. } => None,
        }
    }

    /// リクエストターゲット (リクエストのみ)
    pub fn request_target(&self) -> Option<&str> {
        match &self.parsed()?.start {
            StartLine::Request { target, .. } => Some(target.as_str()),
            StartLine::Response { .. } => None,
        }
    }

    /// HTTP バージョン
    pub fn version(&self) -> Option<&str> {
        Some(self.parsed()?.start.version())
    }

    /// ステータスコード (レスポンスのみ)
    pub fn status_code(&self) -> Option<u16> {
        match &self.parsed()?.start {
            StartLine::Response { status_code, .. } => *status_code,
            StartLine::Request { .. } => None,
        }
    }

    /// ステータステキスト (レスポンスのみ)
    pub fn status_text(&self) -> Option<&str> {
        match &self.parsed()?.start {
            StartLine::Response { status_text, .. } => Some(status_text.as_str()),
            StartLine::Request { .. } => None,
        }
    }

    /// すべてのフィールド
    pub fn fields(&self) -> Option<&Fields> {
        Some(&self.parsed()?.fields)
    }

    /// フィールドの値を取得 (大文字小文字を区別しない)
    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.fields()?.get(name)
    }

    /// Content-Length ヘッダーの値を取得
    pub fn content_length(&self) -> Option<u64> {
        self.get_field("Content-Length")
            .and_then(|v| v.trim().parse().ok())
    }

    /// Transfer-Encoding が chunked か (大文字小文字を区別しない)
    pub fn is_chunked(&self) -> bool {
        self.get_field("Transfer-Encoding")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("chunked"))
    }

    /// フィールドを設定 (ビルダーパターン)
    ///
    /// 受信用ヘッダーに対しては何もしない。
    pub fn field(mut self, name: &str, value: &str) -> Self {
        let _ = self.set_field(name, value);
        self
    }

    /// フィールドを設定
    ///
    /// 同名のフィールドがあれば値を置き換える。
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<(), Error> {
        match &mut self.inner {
            Inner::Prebuilt(parsed) => {
                parsed.fields.set(name, value);
                Ok(())
            }
            Inner::Streaming { .. } => Err(Error::InvalidState(
                "set_field on a streaming header".to_string(),
            )),
        }
    }

    /// テキストにシリアライズ
    ///
    /// 受信用ヘッダーは受信したままの内容を返す。
    pub fn serialize(&self) -> String {
        match &self.inner {
            Inner::Streaming { buf, .. } => String::from_utf8_lossy(buf).into_owned(),
            Inner::Prebuilt(parsed) => render(parsed),
        }
    }

    /// バイト列にシリアライズ
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.inner {
            Inner::Streaming { buf, .. } => buf.clone(),
            Inner::Prebuilt(parsed) => render(parsed).into_bytes(),
        }
    }

    /// 完了していればパース結果を返す (初回のみパースする)
    fn parsed(&self) -> Option<&Parsed> {
        match &self.inner {
            Inner::Prebuilt(parsed) => Some(parsed),
            Inner::Streaming { buf, parsed, .. } => {
                if !buf.ends_with(TERMINATOR) {
                    return None;
                }
                parsed
                    .get_or_init(|| parse::parse_block(&String::from_utf8_lossy(buf), self.role))
                    .as_ref()
            }
        }
    }
}

impl fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

fn render(parsed: &Parsed) -> String {
    let mut out = String::new();

    match &parsed.start {
        StartLine::Request {
            method,
            target,
            version,
        } => {
            out.push_str(&format!("{} {} {}\r\n", method, target, version));
        }
        StartLine::Response {
            version,
            status_code,
            status_text,
        } => {
            let code = status_code.map(|c| c.to_string()).unwrap_or_default();
            out.push_str(&format!("{} {} {}\r\n", version, code, status_text));
        }
    }

    for (name, value) in parsed.fields.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }

    out.push_str("\r\n");
    out
}

/// `tail` (既存バッファの末尾) と `data` を連結したものから最初の終端を探し、
/// 終端の直後にあたる `data` 内の位置を返す
fn find_terminator_end(tail: &[u8], data: &[u8]) -> Option<usize> {
    let byte_at = |i: usize| {
        if i < tail.len() {
            tail[i]
        } else {
            data[i - tail.len()]
        }
    };
    let total = tail.len() + data.len();

    (TERMINATOR.len()..=total)
        .filter(|&end| end > tail.len())
        .find(|&end| {
            TERMINATOR
                .iter()
                .enumerate()
                .all(|(k, b)| byte_at(end - TERMINATOR.len() + k) == *b)
        })
        .map(|end| end - tail.len())
}
