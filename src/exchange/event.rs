//! トランスポートとシンクとのやりとりに使う型

use std::time::Duration;

use crate::error::ExchangeError;
use crate::header::MessageHeader;

/// 読み書き要求の識別タグ
///
/// トランスポートは要求に付与されたタグをそのまま結果に付けて返す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// リクエストヘッダーの書き込み
    Request,
    /// レスポンスヘッダー行の読み取り
    Header,
    /// Content-Length 指定のボディ読み取り
    Body,
    /// chunked ボディの読み取り
    ChunkedBody,
}

/// トランスポートに実行させる操作
///
/// `timeout` が None の場合はタイムアウトなし。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// TCP 接続
    Connect { host: String, port: u16 },
    /// TLS ハンドシェイク開始
    StartSecure { server_name: String },
    /// 書き込み
    Write {
        data: Vec<u8>,
        timeout: Option<Duration>,
        tag: Tag,
    },
    /// CRLF までの 1 行を読み取り (CRLF を含む)
    ReadLine { timeout: Option<Duration>, tag: Tag },
    /// ちょうど `len` バイトを読み取り
    ReadExact {
        len: usize,
        timeout: Option<Duration>,
        tag: Tag,
    },
    /// 切断
    Close,
}

/// トランスポートから届くイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// 接続完了
    Connected { address: String, port: u16 },
    /// 接続失敗
    ConnectFailed(String),
    /// TLS ハンドシェイク完了
    Secured,
    /// TLS ハンドシェイク失敗
    SecureFailed(String),
    /// 書き込み完了
    Written(Tag),
    /// 書き込み失敗
    WriteFailed { error: String, tag: Tag },
    /// 読み取り完了
    Data { data: Vec<u8>, tag: Tag },
    /// `ReadExact` の途中経過 (これまでに受信したバイト数)
    PartialProgress { bytes_so_far: usize, tag: Tag },
    /// 読み書きのタイムアウト
    Timeout(Tag),
    /// 読み取り失敗
    ReadFailed { error: String, tag: Tag },
    /// 切断された (エラーがあればその内容)
    Disconnected(Option<String>),
}

/// シンクへの通知
#[derive(Debug, Clone)]
pub enum Notification {
    /// 接続した
    Connected { address: String, port: u16 },
    /// TLS で保護された
    Secured,
    /// リクエストヘッダーを送信した
    RequestSent(MessageHeader),
    /// レスポンスヘッダーを受信した
    HeaderReceived(MessageHeader),
    /// Content-Length 指定のボディの受信状況
    Progress { received: usize, total: usize },
    /// デコード済みボディの断片
    BodyFragment(Vec<u8>),
    /// chunked のトレーラーフィールド
    TrailerField { name: String, value: String },
    /// ボディをテキストとして扱えなかった (回復可能)
    EncodingError(ExchangeError),
    /// エクスチェンジ完了
    ExchangeComplete {
        header_bytes: usize,
        body_bytes: u64,
    },
    /// エクスチェンジ失敗
    ExchangeFailed(ExchangeError),
    /// 切断された
    Disconnected,
}
