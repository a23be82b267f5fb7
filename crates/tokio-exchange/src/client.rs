//! HTTP/HTTPS ダウンロードクライアント
//!
//! URL から [`ExchangeConfig`] を組み立て、[`Transport`] でエクスチェンジを実行する。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_exchange::Client;
//!
//! let client = Client::new();
//! let response = client.fetch("http://example.com/index.html").await?;
//! println!("{}", response.body_text());
//!
//! // 通知を逐次受け取る
//! client
//!     .fetch_with("https://example.com/", &mut |n| println!("{:?}", n))
//!     .await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use http11_exchange::{ChunkSizeParsing, Exchange, ExchangeConfig, Fields, Limits};
use rustls::ClientConfig;

use crate::error::{Error, Result};
use crate::sink::{CollectSink, FetchedResponse, Sink};
use crate::transport::Transport;

/// ダウンロードクライアント
///
/// 1 回の取得ごとに新しく接続し、終わったら切断する。
#[derive(Clone)]
pub struct Client {
    connect_timeout: Duration,
    header_timeout: Option<Duration>,
    body_timeout: Option<Duration>,
    tls_config: Option<Arc<ClientConfig>>,
    limits: Limits,
    chunk_size_parsing: ChunkSizeParsing,
    headers: Fields,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// 新しいクライアントを作成
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            header_timeout: Some(Duration::from_secs(10)),
            body_timeout: None,
            tls_config: None,
            limits: Limits::default(),
            chunk_size_parsing: ChunkSizeParsing::default(),
            headers: Fields::new(),
        }
    }

    /// TLS 設定を指定 (HTTPS 用)
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// 接続タイムアウトを設定
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// ヘッダー読み取りタイムアウトを設定
    ///
    /// リクエスト書き込み、チャンクサイズ行、トレーラー行にも同じ値を使う。
    pub fn header_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// ボディ読み取りタイムアウトを設定
    pub fn body_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.body_timeout = timeout;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn chunk_size_parsing(mut self, parsing: ChunkSizeParsing) -> Self {
        self.chunk_size_parsing = parsing;
        self
    }

    /// すべてのリクエストに付けるヘッダーを追加
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// URL の内容を取得
    pub async fn fetch(&self, url: &str) -> Result<FetchedResponse> {
        let mut sink = CollectSink::new();
        self.fetch_with(url, &mut sink).await?;
        Ok(sink.into_response())
    }

    /// URL の内容を取得し、通知をすべて `sink` に渡す
    pub async fn fetch_with<S: Sink>(&self, url: &str, sink: &mut S) -> Result<()> {
        let config = self.exchange_config(url)?;
        tracing::debug!(host = config.host(), target = config.target(), "fetch");

        let mut transport = Transport::new().connect_timeout(self.connect_timeout);
        if let Some(tls_config) = &self.tls_config {
            transport = transport.tls_config(tls_config.clone());
        }

        let mut exchange = Exchange::new(config);
        transport.run(&mut exchange, sink).await
    }

    /// URL からエクスチェンジの設定を作成
    pub fn exchange_config(&self, url: &str) -> Result<ExchangeConfig> {
        let parsed = parse_url(url)?;

        let mut config = ExchangeConfig::new(&parsed.host, &parsed.target)
            .port(parsed.port)
            .write_timeout(self.header_timeout)
            .header_timeout(self.header_timeout)
            .chunk_line_timeout(self.header_timeout)
            .footer_timeout(self.header_timeout)
            .body_timeout(self.body_timeout)
            .limits(self.limits.clone())
            .chunk_size_parsing(self.chunk_size_parsing);
        if parsed.secure {
            config = config.secure(&parsed.host);
        }
        for (name, value) in &self.headers {
            config = config.header(name, value);
        }
        Ok(config)
    }
}

/// パース済み URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    /// https かどうか
    pub secure: bool,
    pub host: String,
    pub port: u16,
    /// パスとクエリ (origin-form)
    pub target: String,
}

/// URL をパース
///
/// `http://` と `https://` のみ受け付ける。ユーザー情報とフラグメントは扱わない。
/// IPv6 アドレスは `[::1]` の形式で指定する。
pub fn parse_url(url: &str) -> Result<ParsedUrl> {
    let invalid = |msg: &str| Error::InvalidUrl(format!("{}: {}", msg, url));

    let (secure, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(invalid("URL must start with http:// or https://"));
    };

    let rest = rest.split('#').next().unwrap_or(rest);
    let (authority, target) = match rest.find(['/', '?']) {
        Some(i) if rest[i..].starts_with('?') => (&rest[..i], format!("/{}", &rest[i..])),
        Some(i) => (&rest[..i], rest[i..].to_string()),
        None => (rest, "/".to_string()),
    };

    let default_port = if secure { 443 } else { 80 };
    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| invalid("unterminated IPv6 address"))?;
        let port = match after.strip_prefix(':') {
            Some(port) => Some(port),
            None if after.is_empty() => None,
            None => return Err(invalid("unexpected characters after host")),
        };
        (host, port)
    } else {
        match authority.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(invalid("URL must have a host"));
    }
    let port = match port {
        Some(port) => port.parse().map_err(|_| invalid("invalid port"))?,
        None => default_port,
    };

    Ok(ParsedUrl {
        secure,
        host: host.to_string(),
        port,
        target,
    })
}
