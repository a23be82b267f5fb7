//! エクスチェンジの設定

use std::time::Duration;

use crate::chunked::ChunkSizeParsing;
use crate::header::Fields;
use crate::limits::Limits;

/// エクスチェンジの設定
///
/// タイムアウトが None の場合は無制限。
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) target: String,
    /// TLS を使う場合の証明書検証用サーバー名
    pub(crate) server_name: Option<String>,
    pub(crate) fields: Fields,
    pub(crate) write_timeout: Option<Duration>,
    pub(crate) header_timeout: Option<Duration>,
    pub(crate) chunk_line_timeout: Option<Duration>,
    pub(crate) footer_timeout: Option<Duration>,
    pub(crate) body_timeout: Option<Duration>,
    pub(crate) limits: Limits,
    pub(crate) chunk_size_parsing: ChunkSizeParsing,
}

impl ExchangeConfig {
    /// 平文 HTTP (ポート 80) で `target` を取得する設定を作成
    pub fn new(host: &str, target: &str) -> Self {
        Self {
            host: host.to_string(),
            port: 80,
            target: target.to_string(),
            server_name: None,
            fields: Fields::new(),
            write_timeout: Some(Duration::from_secs(10)),
            header_timeout: Some(Duration::from_secs(10)),
            chunk_line_timeout: Some(Duration::from_secs(10)),
            footer_timeout: Some(Duration::from_secs(10)),
            // ボディは大きい可能性があるのでデフォルトは無制限
            body_timeout: None,
            limits: Limits::default(),
            chunk_size_parsing: ChunkSizeParsing::default(),
        }
    }

    /// ポートを設定
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// TLS を有効にする
    ///
    /// `server_name` は証明書に期待するサーバー名。
    /// ポートが 80 のままなら 443 に切り替える。
    pub fn secure(mut self, server_name: &str) -> Self {
        self.server_name = Some(server_name.to_string());
        if self.port == 80 {
            self.port = 443;
        }
        self
    }

    /// リクエストヘッダーを追加
    ///
    /// Host は自動で付与されるが、ここで指定すれば上書きできる。
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.fields.set(name, value);
        self
    }

    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// ヘッダー 1 行ごとの読み取りタイムアウト
    pub fn header_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.header_timeout = timeout;
        self
    }

    /// チャンクサイズ行の読み取りタイムアウト
    pub fn chunk_line_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.chunk_line_timeout = timeout;
        self
    }

    /// トレーラー行の読み取りタイムアウト
    pub fn footer_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.footer_timeout = timeout;
        self
    }

    /// ボディ (固定長ボディ全体、またはチャンクデータ 1 つ) の読み取りタイムアウト
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

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn is_secure(&self) -> bool {
        self.server_name.is_some()
    }

    /// Host ヘッダー用の値
    ///
    /// IPv6 アドレスは角括弧で囲む。
    pub(crate) fn host_header_value(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let default_port = if self.is_secure() { 443 } else { 80 };
        if self.port == default_port {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}
