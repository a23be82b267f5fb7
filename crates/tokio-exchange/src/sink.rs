//! 通知の受け取り先
//!
//! [`Transport::run`](crate::Transport::run) はエクスチェンジの通知をすべて [`Sink`] に渡す。

use std::borrow::Cow;

use http11_exchange::{ExchangeError, MessageHeader, Notification};

/// 通知の受け取り先
pub trait Sink {
    fn notify(&mut self, notification: Notification);
}

/// 関数から Sink を作成
impl<F> Sink for F
where
    F: FnMut(Notification),
{
    fn notify(&mut self, notification: Notification) {
        (self)(notification)
    }
}

/// すべての通知を tracing で出力する Sink
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::Connected { address, port } => {
                tracing::info!(%address, port, "connected");
            }
            Notification::Secured => tracing::info!("secured"),
            Notification::RequestSent(header) => {
                tracing::debug!(header = %header.serialize().trim_end(), "request sent");
            }
            Notification::HeaderReceived(header) => {
                tracing::info!(
                    status = header.status_code(),
                    header = %header.serialize().trim_end(),
                    "header received"
                );
            }
            Notification::Progress { received, total } => {
                tracing::debug!(received, total, "progress");
            }
            Notification::BodyFragment(fragment) => {
                tracing::debug!(
                    len = fragment.len(),
                    text = %String::from_utf8_lossy(&fragment),
                    "body"
                );
            }
            Notification::TrailerField { name, value } => {
                tracing::debug!(%name, %value, "trailer");
            }
            Notification::EncodingError(e) => tracing::warn!(error = %e, "encoding error"),
            Notification::ExchangeComplete {
                header_bytes,
                body_bytes,
            } => {
                tracing::info!(header_bytes, body_bytes, "exchange complete");
            }
            Notification::ExchangeFailed(e) => tracing::error!(error = %e, "exchange failed"),
            Notification::Disconnected => tracing::info!("disconnected"),
        }
    }
}

/// 取得したレスポンス
#[derive(Debug, Clone, Default)]
pub struct FetchedResponse {
    /// レスポンスヘッダー
    pub header: Option<MessageHeader>,
    /// デコード済みボディ
    pub body: Vec<u8>,
    /// chunked のトレーラー
    pub trailers: Vec<(String, String)>,
    /// UTF-8 として不正だったボディ断片の数
    pub encoding_errors: usize,
}

impl FetchedResponse {
    /// ステータスコード
    pub fn status_code(&self) -> Option<u16> {
        self.header.as_ref()?.status_code()
    }

    /// ヘッダーフィールドの値 (大文字小文字を区別しない)
    pub fn get_field(&self, name: &str) -> Option<&str> {
        self.header.as_ref()?.get_field(name)
    }

    /// ボディをテキストとして取得 (不正な UTF-8 は置換する)
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// 通知を [`FetchedResponse`] にまとめる Sink
#[derive(Debug, Default)]
pub struct CollectSink {
    response: FetchedResponse,
    error: Option<ExchangeError>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 失敗していればその原因
    pub fn error(&self) -> Option<&ExchangeError> {
        self.error.as_ref()
    }

    /// ここまでに受け取った内容
    pub fn response(&self) -> &FetchedResponse {
        &self.response
    }

    pub fn into_response(self) -> FetchedResponse {
        self.response
    }
}

impl Sink for CollectSink {
    fn notify(&mut self, notification: Notification) {
        match notification {
            Notification::HeaderReceived(header) => self.response.header = Some(header),
            Notification::BodyFragment(fragment) => {
                self.response.body.extend_from_slice(&fragment)
            }
            Notification::TrailerField { name, value } => {
                self.response.trailers.push((name, value))
            }
            Notification::EncodingError(_) => self.response.encoding_errors += 1,
            Notification::ExchangeFailed(e) => self.error = Some(e),
            _ => {}
        }
    }
}
