//! # http11_exchange
//!
//! 依存なしの HTTP/1.1 スタイル テキストプロトコル向けエクスチェンジライブラリ (Sans I/O)
//!
//! ## 特徴
//!
//! - **依存なし**: 標準ライブラリのみ使用
//! - **Sans I/O**: I/O を完全に分離した設計
//! - **断片入力**: ヘッダーは任意の位置で分割されたバイト列を順に渡せる
//!
//! ## 構成
//!
//! - [`MessageHeader`]: リクエスト / レスポンスヘッダーの構築と逐次パース
//! - [`ChunkedDecoder`]: 行読み取りとブロック読み取りで進む chunked デコーダー
//! - [`Exchange`]: 接続から切断までの 1 回のやりとりを進める状態機械
//!
//! ## 使い方
//!
//! ### ヘッダーの構築
//!
//! ```rust
//! use http11_exchange::MessageHeader;
//!
//! let request = MessageHeader::request("GET", "/index.html")
//!     .field("Host", "example.com")
//!     .field("Connection", "close");
//! assert_eq!(
//!     request.serialize(),
//!     "GET /index.html HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n"
//! );
//! ```
//!
//! ### ヘッダーの逐次パース
//!
//! ```rust
//! use http11_exchange::MessageHeader;
//!
//! let mut response = MessageHeader::streaming_response();
//! response.append(b"HTTP/1.1 200 OK\r\nContent-Le").unwrap();
//! assert!(!response.is_complete());
//! response.append(b"ngth: 5\r\n\r\n").unwrap();
//! assert!(response.is_complete());
//! assert_eq!(response.status_code(), Some(200));
//! assert_eq!(response.content_length(), Some(5));
//! ```

mod chunked;
mod error;
mod exchange;
mod header;
mod limits;

pub use chunked::{
    ChunkSizeParsing, ChunkedDecoder, ChunkedInput, ChunkedOutput, ChunkedStage, ChunkedStep,
    ReadRequest,
};
pub use error::{Error, ExchangeError};
pub use exchange::{
    Action, Exchange, ExchangeConfig, ExchangeState, Notification, Outcome, Tag, TransportEvent,
};
pub use header::{Fields, MessageHeader, Mode, Role};
pub use limits::Limits;
