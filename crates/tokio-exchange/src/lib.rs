//! tokio_exchange - Tokio integration for http11_exchange
//!
//! tokio と tokio-rustls を使用して http11_exchange のエクスチェンジを実際のソケット上で動かす。
//!
//! ## Features
//!
//! - `client` - HTTP/HTTPS ダウンロードクライアント (デフォルト有効)
//! - `server` - 行エコーサーバー (デフォルト有効)
//! - `full` - すべての機能を有効化
//!
//! ## 特徴
//!
//! - **http11_exchange ベース**: Sans I/O の状態機械が出す操作を実行するだけの薄い層
//! - **非同期 I/O**: tokio による完全非同期対応
//! - **TLS 対応**: tokio-rustls による HTTPS 対応
//! - **ログ**: tracing で接続や通知を出力
//!
//! ## クライアント
//!
//! ```ignore
//! use tokio_exchange::Client;
//!
//! let client = Client::new();
//! let response = client.fetch("http://example.com/path").await?;
//! assert_eq!(response.status_code(), Some(200));
//! ```
//!
//! ## サーバー
//!
//! ```ignore
//! use tokio_exchange::EchoServer;
//!
//! let server = EchoServer::bind("0.0.0.0:15035").await?;
//! server.serve().await?;
//! ```

#[cfg(feature = "client")]
pub mod client;
pub mod error;
#[cfg(feature = "server")]
pub mod server;
pub mod sink;
pub mod transport;

#[cfg(feature = "client")]
pub use client::{Client, ParsedUrl, parse_url};
pub use error::{Error, Result};
#[cfg(feature = "server")]
pub use server::{EchoServer, WELCOME_MESSAGE};
pub use sink::{CollectSink, FetchedResponse, Sink, TracingSink};
pub use transport::Transport;

// http11_exchange の型を re-export
pub use http11_exchange::{
    Action, Exchange, ExchangeConfig, ExchangeError, MessageHeader, Notification, Tag,
    TransportEvent,
};
