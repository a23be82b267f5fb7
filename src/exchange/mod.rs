//! 1 回のリクエスト / レスポンスのやりとり (エクスチェンジ) を進める状態機械 (Sans I/O)
//!
//! I/O は一切行わない。トランスポートから届いた [`TransportEvent`] を
//! [`Exchange::handle_event`] に渡し、[`Exchange::poll_action`] で得た [`Action`] を
//! トランスポートで実行する。結果は [`Exchange::poll_notification`] で取り出す。
//!
//! ```text
//! Idle -> Connecting -> (Securing) -> ReadingHeader -+-> ReadingBody --------+-> Closing -> Idle
//!                                                    +-> ReadingChunkedBody -+
//! ```
//!
//! 読み取り要求は常に 1 つだけ発行する。前の読み取りの結果を処理し終えるまで、
//! 次の読み取りは発行しない。
//!
//! ## 使い方
//!
//! ```rust
//! use http11_exchange::{Action, Exchange, ExchangeConfig, Tag, TransportEvent};
//!
//! let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
//! exchange.start().unwrap();
//! assert!(matches!(exchange.poll_action(), Some(Action::Connect { .. })));
//!
//! exchange
//!     .handle_event(TransportEvent::Connected {
//!         address: "192.0.2.1".to_string(),
//!         port: 80,
//!     })
//!     .unwrap();
//! assert!(matches!(exchange.poll_action(), Some(Action::Write { tag: Tag::Request, .. })));
//! assert!(matches!(exchange.poll_action(), Some(Action::ReadLine { tag: Tag::Header, .. })));
//! ```

mod config;
mod event;

use std::collections::VecDeque;
use std::time::Duration;

use crate::chunked::{ChunkedDecoder, ChunkedInput, ChunkedOutput, ChunkedStage, ReadRequest};
use crate::error::{Error, ExchangeError};
use crate::header::{MessageHeader, Role};

pub use config::ExchangeConfig;
pub use event::{Action, Notification, Tag, TransportEvent};

/// 公開用の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// 開始前、または切断後
    Idle,
    Connecting,
    Securing,
    ReadingHeader,
    ReadingBody,
    ReadingChunkedBody,
    /// 終了処理中 (切断待ち)
    Closing,
}

/// エクスチェンジの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(ExchangeError),
    /// `abort` で中断された
    Aborted,
}

#[derive(Debug)]
enum Phase {
    Idle,
    Connecting,
    Securing,
    ReadingHeader { response: MessageHeader },
    ReadingBody { total: usize },
    ReadingChunked { decoder: ChunkedDecoder },
    Closing,
}

/// エクスチェンジ
#[derive(Debug)]
pub struct Exchange {
    config: ExchangeConfig,
    phase: Phase,
    /// 結果待ちの読み取り要求
    pending_read: Option<Tag>,
    actions: VecDeque<Action>,
    notifications: VecDeque<Notification>,
    outcome: Option<Outcome>,
    header_bytes: usize,
    body_bytes: u64,
}

impl Exchange {
    /// 新しいエクスチェンジを作成
    pub fn new(config: ExchangeConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            pending_read: None,
            actions: VecDeque::new(),
            notifications: VecDeque::new(),
            outcome: None,
            header_bytes: 0,
            body_bytes: 0,
        }
    }

    /// 設定を取得
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// 現在の状態
    pub fn state(&self) -> ExchangeState {
        match self.phase {
            Phase::Idle => ExchangeState::Idle,
            Phase::Connecting => ExchangeState::Connecting,
            Phase::Securing => ExchangeState::Securing,
            Phase::ReadingHeader { .. } => ExchangeState::ReadingHeader,
            Phase::ReadingBody { .. } => ExchangeState::ReadingBody,
            Phase::ReadingChunked { .. } => ExchangeState::ReadingChunkedBody,
            Phase::Closing => ExchangeState::Closing,
        }
    }

    /// 直近のエクスチェンジの結果 (進行中なら None)
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// エクスチェンジを開始
    ///
    /// 前回のエクスチェンジが切断まで終わっていない場合はエラー
    pub fn start(&mut self) -> Result<(), Error> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(Error::InvalidState(format!(
                "exchange is not idle: {:?}",
                self.state()
            )));
        }

        self.outcome = None;
        self.header_bytes = 0;
        self.body_bytes = 0;
        self.pending_read = None;
        self.actions.push_back(Action::Connect {
            host: self.config.host.clone(),
            port: self.config.port,
        });
        self.phase = Phase::Connecting;
        Ok(())
    }

    /// エクスチェンジを中断
    ///
    /// 受信途中のヘッダーやチャンクの状態は破棄され、再開できない。
    pub fn abort(&mut self) {
        if !self.is_active() {
            return;
        }
        self.outcome = Some(Outcome::Aborted);
        self.close();
    }

    /// 次にトランスポートで実行する操作を取り出す
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// 次の通知を取り出す
    pub fn poll_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    /// トランスポートからのイベントを処理
    ///
    /// 結果待ちの読み取りと一致しないタグの結果を受け取った場合は
    /// `Error::InvalidState` を返し、状態は変更しない。
    /// 切断処理中に届いた古い結果は無視する。
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), Error> {
        match event {
            TransportEvent::Connected { address, port } => {
                self.expect_phase(matches!(self.phase, Phase::Connecting), "connected")?;
                self.notify(Notification::Connected { address, port });
                if let Some(server_name) = self.config.server_name.clone() {
                    self.actions.push_back(Action::StartSecure { server_name });
                    self.phase = Phase::Securing;
                } else {
                    self.send_request();
                }
            }
            TransportEvent::ConnectFailed(error) => {
                self.expect_phase(matches!(self.phase, Phase::Connecting), "connect failed")?;
                self.fail(ExchangeError::Connection(format!("connect failed: {}", error)));
            }
            TransportEvent::Secured => {
                self.expect_phase(matches!(self.phase, Phase::Securing), "secured")?;
                self.notify(Notification::Secured);
                self.send_request();
            }
            TransportEvent::SecureFailed(error) => {
                self.expect_phase(matches!(self.phase, Phase::Securing), "secure failed")?;
                self.fail(ExchangeError::Connection(format!(
                    "TLS handshake failed: {}",
                    error
                )));
            }
            TransportEvent::Written(_) => {}
            TransportEvent::WriteFailed { error, .. } => {
                if self.is_active() {
                    self.fail(ExchangeError::Connection(format!("write failed: {}", error)));
                }
            }
            TransportEvent::Data { data, tag } => {
                if self.take_pending(tag)? {
                    self.on_data(data);
                }
            }
            TransportEvent::PartialProgress { bytes_so_far, tag } => {
                if let Phase::ReadingBody { total } = self.phase
                    && self.pending_read == Some(tag)
                {
                    self.notify(Notification::Progress {
                        received: bytes_so_far,
                        total,
                    });
                }
            }
            TransportEvent::Timeout(Tag::Request) => {
                if self.is_active() {
                    self.fail(ExchangeError::Connection("write timed out".to_string()));
                }
            }
            TransportEvent::Timeout(tag) => {
                if self.take_pending(tag)? {
                    self.fail(ExchangeError::Connection(format!(
                        "read timed out ({:?})",
                        tag
                    )));
                }
            }
            TransportEvent::ReadFailed { error, tag } => {
                if self.take_pending(tag)? {
                    self.fail(ExchangeError::Connection(format!("read failed: {}", error)));
                }
            }
            TransportEvent::Disconnected(error) => self.on_disconnected(error),
        }
        Ok(())
    }

    fn is_active(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Closing)
    }

    fn expect_phase(&self, ok: bool, event: &str) -> Result<(), Error> {
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidState(format!(
                "unexpected {} event in {:?}",
                event,
                self.state()
            )))
        }
    }

    /// 結果待ちの読み取りを消費する
    ///
    /// 終了処理中なら false (結果は捨てる)
    fn take_pending(&mut self, tag: Tag) -> Result<bool, Error> {
        if !self.is_active() {
            return Ok(false);
        }
        if self.pending_read != Some(tag) {
            return Err(Error::InvalidState(format!(
                "unexpected read result for {:?}, pending {:?}",
                tag, self.pending_read
            )));
        }
        self.pending_read = None;
        Ok(true)
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push_back(notification);
    }

    fn read_line(&mut self, timeout: Option<Duration>, tag: Tag) {
        self.pending_read = Some(tag);
        self.actions.push_back(Action::ReadLine { timeout, tag });
    }

    fn read_exact(&mut self, len: usize, timeout: Option<Duration>, tag: Tag) {
        self.pending_read = Some(tag);
        self.actions.push_back(Action::ReadExact { len, timeout, tag });
    }

    fn send_request(&mut self) {
        let mut request = MessageHeader::request("GET", &self.config.target)
            .field("Host", &self.config.host_header_value());
        for (name, value) in self.config.fields.iter() {
            request = request.field(name, value);
        }

        let data = request.to_bytes();
        self.notify(Notification::RequestSent(request));
        self.actions.push_back(Action::Write {
            data,
            timeout: self.config.write_timeout,
            tag: Tag::Request,
        });

        self.phase = Phase::ReadingHeader {
            response: MessageHeader::with_limits(Role::Response, &self.config.limits),
        };
        self.read_line(self.config.header_timeout, Tag::Header);
    }

    fn on_data(&mut self, data: Vec<u8>) {
        match std::mem::replace(&mut self.phase, Phase::Closing) {
            Phase::ReadingHeader { response } => self.on_header_line(response, &data),
            Phase::ReadingBody { total } => self.on_body(total, data),
            Phase::ReadingChunked { decoder } => self.on_chunked(decoder, &data),
            phase => self.phase = phase,
        }
    }

    fn on_header_line(&mut self, mut response: MessageHeader, line: &[u8]) {
        match response.append(line) {
            Ok(n) => self.header_bytes += n,
            Err(e) => return self.fail(e.into()),
        }

        if !response.is_complete() {
            self.phase = Phase::ReadingHeader { response };
            self.read_line(self.config.header_timeout, Tag::Header);
            return;
        }

        self.notify(Notification::HeaderReceived(response.clone()));

        let Some(status_code) = response.status_code() else {
            return self.fail(ExchangeError::Protocol(
                "malformed status line".to_string(),
            ));
        };
        if status_code != 200 {
            return self.fail(ExchangeError::UnsupportedStatus(status_code));
        }

        match response.content_length() {
            Some(len) if len > 0 => {
                if len > self.config.limits.max_body_size {
                    return self.fail(
                        Error::BodyTooLarge {
                            size: len,
                            limit: self.config.limits.max_body_size,
                        }
                        .into(),
                    );
                }
                let Ok(total) = usize::try_from(len) else {
                    return self.fail(ExchangeError::Protocol(format!(
                        "Content-Length too large: {}",
                        len
                    )));
                };
                self.phase = Phase::ReadingBody { total };
                self.read_exact(total, self.config.body_timeout, Tag::Body);
            }
            _ if response.is_chunked() => {
                let decoder = ChunkedDecoder::with_limits(self.config.limits.clone())
                    .size_parsing(self.config.chunk_size_parsing);
                self.phase = Phase::ReadingChunked { decoder };
                self.read_line(self.config.chunk_line_timeout, Tag::ChunkedBody);
            }
            _ => self.fail(ExchangeError::MissingLength),
        }
    }

    fn on_body(&mut self, total: usize, data: Vec<u8>) {
        if data.len() != total {
            return self.fail(ExchangeError::Protocol(format!(
                "expected {} bytes of body, got {}",
                total,
                data.len()
            )));
        }
        self.emit_fragment(data);
        self.complete();
    }

    fn on_chunked(&mut self, mut decoder: ChunkedDecoder, data: &[u8]) {
        let input = match decoder.next_request() {
            Some(ReadRequest::Line) => ChunkedInput::Line(data),
            Some(ReadRequest::Exact(_)) => ChunkedInput::Block(data),
            None => return self.complete(),
        };

        let step = match decoder.feed(input) {
            Ok(step) => step,
            Err(e) => return self.fail(e.into()),
        };

        match step.output {
            Some(ChunkedOutput::Payload(payload)) => self.emit_fragment(payload),
            Some(ChunkedOutput::Trailer { name, value }) => {
                self.notify(Notification::TrailerField { name, value })
            }
            None => {}
        }

        match step.next {
            None => self.complete(),
            Some(ReadRequest::Line) => {
                let timeout = if decoder.stage() == ChunkedStage::AwaitingFooter {
                    self.config.footer_timeout
                } else {
                    self.config.chunk_line_timeout
                };
                self.phase = Phase::ReadingChunked { decoder };
                self.read_line(timeout, Tag::ChunkedBody);
            }
            Some(ReadRequest::Exact(len)) => {
                self.phase = Phase::ReadingChunked { decoder };
                self.read_exact(len, self.config.body_timeout, Tag::ChunkedBody);
            }
        }
    }

    /// ボディ断片を通知
    ///
    /// UTF-8 として不正なら先に EncodingError を通知する。
    /// 断片末尾でマルチバイト文字が途切れているだけの場合はエラーにしない。
    fn emit_fragment(&mut self, fragment: Vec<u8>) {
        if let Err(e) = std::str::from_utf8(&fragment)
            && e.error_len().is_some()
        {
            self.notify(Notification::EncodingError(ExchangeError::Encoding {
                valid_up_to: e.valid_up_to(),
            }));
        }
        self.body_bytes += fragment.len() as u64;
        self.notify(Notification::BodyFragment(fragment));
    }

    fn complete(&mut self) {
        self.outcome = Some(Outcome::Completed);
        self.notify(Notification::ExchangeComplete {
            header_bytes: self.header_bytes,
            body_bytes: self.body_bytes,
        });
        self.close();
    }

    fn fail(&mut self, error: ExchangeError) {
        self.outcome = Some(Outcome::Failed(error.clone()));
        self.notify(Notification::ExchangeFailed(error));
        self.close();
    }

    fn close(&mut self) {
        self.pending_read = None;
        self.phase = Phase::Closing;
        self.actions.push_back(Action::Close);
    }

    fn on_disconnected(&mut self, error: Option<String>) {
        match self.phase {
            Phase::Idle => return,
            Phase::Closing => {}
            _ => {
                let reason = error.unwrap_or_else(|| "connection closed".to_string());
                let error = ExchangeError::Connection(reason);
                self.outcome = Some(Outcome::Failed(error.clone()));
                self.notify(Notification::ExchangeFailed(error));
            }
        }
        self.pending_read = None;
        self.phase = Phase::Idle;
        self.notify(Notification::Disconnected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(exchange: &mut Exchange) {
        exchange.start().unwrap();
        exchange.poll_action();
        exchange
            .handle_event(TransportEvent::Connected {
                address: "127.0.0.1".to_string(),
                port: 80,
            })
            .unwrap();
        while exchange.poll_action().is_some() {}
        while exchange.poll_notification().is_some() {}
    }

    fn line(exchange: &mut Exchange, data: &[u8], tag: Tag) {
        exchange
            .handle_event(TransportEvent::Data {
                data: data.to_vec(),
                tag,
            })
            .unwrap();
    }

    #[test]
    fn start_twice_fails() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        exchange.start().unwrap();
        assert!(exchange.start().is_err());
    }

    #[test]
    fn secure_handshake_before_request() {
        let config = ExchangeConfig::new("deusty.com", "/index.php").secure("www.deusty.com");
        let mut exchange = Exchange::new(config);
        exchange.start().unwrap();
        assert_eq!(
            exchange.poll_action(),
            Some(Action::Connect {
                host: "deusty.com".to_string(),
                port: 443,
            })
        );
        exchange
            .handle_event(TransportEvent::Connected {
                address: "192.0.2.1".to_string(),
                port: 443,
            })
            .unwrap();
        assert_eq!(
            exchange.poll_action(),
            Some(Action::StartSecure {
                server_name: "www.deusty.com".to_string(),
            })
        );
        assert_eq!(exchange.state(), ExchangeState::Securing);

        exchange.handle_event(TransportEvent::Secured).unwrap();
        let Some(Action::Write { data, .. }) = exchange.poll_action() else {
            panic!("expected write");
        };
        assert_eq!(
            data,
            b"GET /index.php HTTP/1.1\r\nHost: deusty.com\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn mismatched_tag_is_rejected() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        let result = exchange.handle_event(TransportEvent::Data {
            data: b"x".to_vec(),
            tag: Tag::Body,
        });
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(exchange.state(), ExchangeState::ReadingHeader);
    }

    #[test]
    fn header_timeout_is_fatal() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        line(&mut exchange, b"HTTP/1.1 200 OK\r\n", Tag::Header);
        exchange
            .handle_event(TransportEvent::Timeout(Tag::Header))
            .unwrap();
        assert!(matches!(
            exchange.outcome(),
            Some(Outcome::Failed(ExchangeError::Connection(_)))
        ));
        assert_eq!(exchange.state(), ExchangeState::Closing);
    }

    #[test]
    fn missing_length() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        line(&mut exchange, b"HTTP/1.1 200 OK\r\n", Tag::Header);
        line(&mut exchange, b"\r\n", Tag::Header);
        assert_eq!(
            exchange.outcome(),
            Some(&Outcome::Failed(ExchangeError::MissingLength))
        );
    }

    #[test]
    fn zero_content_length_is_missing_length() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        line(&mut exchange, b"HTTP/1.1 200 OK\r\n", Tag::Header);
        line(&mut exchange, b"Content-Length: 0\r\n", Tag::Header);
        line(&mut exchange, b"\r\n", Tag::Header);
        assert_eq!(
            exchange.outcome(),
            Some(&Outcome::Failed(ExchangeError::MissingLength))
        );
    }

    #[test]
    fn abort_discards_state() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        line(&mut exchange, b"HTTP/1.1 200 OK\r\n", Tag::Header);
        exchange.abort();
        assert_eq!(exchange.outcome(), Some(&Outcome::Aborted));
        assert_eq!(exchange.poll_action(), Some(Action::Close));

        // 切断後の遅延した結果は無視される
        line(&mut exchange, b"\r\n", Tag::Header);
        exchange
            .handle_event(TransportEvent::Disconnected(None))
            .unwrap();
        assert_eq!(exchange.state(), ExchangeState::Idle);
        assert!(exchange.start().is_ok());
    }

    #[test]
    fn unexpected_disconnect_fails() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        exchange
            .handle_event(TransportEvent::Disconnected(Some("reset".to_string())))
            .unwrap();
        assert_eq!(
            exchange.outcome(),
            Some(&Outcome::Failed(ExchangeError::Connection(
                "reset".to_string()
            )))
        );
        assert_eq!(exchange.state(), ExchangeState::Idle);
        assert!(matches!(
            exchange.poll_notification(),
            Some(Notification::ExchangeFailed(_))
        ));
        assert!(matches!(
            exchange.poll_notification(),
            Some(Notification::Disconnected)
        ));
    }

    #[test]
    fn encoding_error_is_recoverable() {
        let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
        connected(&mut exchange);
        line(&mut exchange, b"HTTP/1.1 200 OK\r\n", Tag::Header);
        line(&mut exchange, b"Content-Length: 2\r\n\r\n", Tag::Header);
        while exchange.poll_notification().is_some() {}

        line(&mut exchange, &[0xff, 0xfe], Tag::Body);
        assert!(matches!(
            exchange.poll_notification(),
            Some(Notification::EncodingError(ExchangeError::Encoding {
                valid_up_to: 0
            }))
        ));
        assert!(matches!(
            exchange.poll_notification(),
            Some(Notification::BodyFragment(ref body)) if body == &[0xff, 0xfe]
        ));
        assert_eq!(exchange.outcome(), Some(&Outcome::Completed));
    }
}
