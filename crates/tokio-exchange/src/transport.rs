//! tokio 上のトランスポート
//!
//! [`Action`] を TCP / TLS ソケットで実行し、結果を [`TransportEvent`] として返す。
//! [`Transport::run`] は [`Exchange`] が操作を出さなくなるまで両者の間を取り持つ。
//!
//! ## 使い方
//!
//! ```ignore
//! use http11_exchange::{Exchange, ExchangeConfig};
//! use tokio_exchange::{TracingSink, Transport};
//!
//! let mut exchange = Exchange::new(ExchangeConfig::new("example.com", "/"));
//! let mut transport = Transport::new();
//! transport.run(&mut exchange, &mut TracingSink).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use http11_exchange::{Action, Exchange, Outcome, Tag, TransportEvent};
use rustls::ClientConfig;
use rustls_pki_types::ServerName;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use crate::error::{Error, Result};
use crate::sink::Sink;

/// OS のルート証明書ストアを使用するデフォルトの TLS 設定を作成
pub(crate) fn default_tls_config() -> Arc<ClientConfig> {
    Arc::new(
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(rustls_platform_verifier::Verifier::new()))
            .with_no_client_auth(),
    )
}

trait Io: AsyncBufRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncBufRead + AsyncWrite + Unpin + Send> Io for T {}

enum Stream {
    Plain(BufReader<TcpStream>),
    Tls(Box<BufReader<TlsStream<TcpStream>>>),
}

/// TCP / TLS トランスポート
///
/// 同時に 1 本の接続だけを持つ。
pub struct Transport {
    stream: Option<Stream>,
    tls_config: Option<Arc<ClientConfig>>,
    connect_timeout: Duration,
    max_line_size: usize,
    read_buffer_size: usize,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    /// 新しいトランスポートを作成
    pub fn new() -> Self {
        Self {
            stream: None,
            tls_config: None,
            connect_timeout: Duration::from_secs(30),
            max_line_size: 64 * 1024,
            read_buffer_size: 8192,
        }
    }

    /// TLS 設定を指定
    ///
    /// 指定しない場合は OS の証明書ストアで検証する。
    pub fn tls_config(mut self, config: Arc<ClientConfig>) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// 接続 (TCP 接続と TLS ハンドシェイクそれぞれ) のタイムアウトを設定
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// 1 行の最大長を設定
    pub fn max_line_size(mut self, size: usize) -> Self {
        self.max_line_size = size;
        self
    }

    /// 読み取りバッファサイズを設定
    ///
    /// `ReadExact` の途中経過はおおよそこの単位で通知される。
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// TLS 接続かどうかを返す
    pub fn is_tls(&self) -> bool {
        matches!(self.stream, Some(Stream::Tls(_)))
    }

    /// エクスチェンジを最後 (切断) まで進める
    ///
    /// 通知はすべて `sink` に渡す。失敗した場合はその原因を返す。
    pub async fn run<S: Sink>(&mut self, exchange: &mut Exchange, sink: &mut S) -> Result<()> {
        exchange.start()?;

        loop {
            while let Some(notification) = exchange.poll_notification() {
                sink.notify(notification);
            }
            let Some(action) = exchange.poll_action() else {
                break;
            };
            let events = self.execute(action).await;
            self.deliver(exchange, events).await?;
        }

        match exchange.outcome() {
            Some(Outcome::Completed) => Ok(()),
            Some(Outcome::Failed(e)) => Err(Error::Exchange(e.clone())),
            Some(Outcome::Aborted) | None => Err(Error::ConnectionClosed),
        }
    }

    /// イベントをエクスチェンジに渡す
    ///
    /// 受け付けられなかった場合は接続を閉じてエラーを返す。
    async fn deliver(
        &mut self,
        exchange: &mut Exchange,
        events: Vec<TransportEvent>,
    ) -> Result<()> {
        for event in events {
            if let Err(e) = exchange.handle_event(event) {
                tracing::warn!(error = %e, "event rejected by exchange");
                self.close().await;
                return Err(e.into());
            }
        }
        Ok(())
    }

    /// 操作を 1 つ実行
    ///
    /// `ReadExact` の場合は `PartialProgress` が先に並ぶ。
    pub async fn execute(&mut self, action: Action) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        match action {
            Action::Connect { host, port } => {
                tracing::debug!(%host, port, "connect");
                events.push(match self.connect(&host, port).await {
                    Ok((address, port)) => TransportEvent::Connected { address, port },
                    Err(e) => {
                        tracing::warn!(%host, port, error = %e, "connect failed");
                        TransportEvent::ConnectFailed(e.to_string())
                    }
                });
            }
            Action::StartSecure { server_name } => {
                tracing::debug!(%server_name, "start TLS");
                events.push(match self.start_secure(&server_name).await {
                    Ok(()) => TransportEvent::Secured,
                    Err(e) => {
                        tracing::warn!(%server_name, error = %e, "TLS handshake failed");
                        TransportEvent::SecureFailed(e.to_string())
                    }
                });
            }
            Action::Write { data, timeout, tag } => {
                tracing::trace!(len = data.len(), ?tag, "write");
                events.push(match self.write(&data, timeout).await {
                    Ok(()) => TransportEvent::Written(tag),
                    Err(Error::Timeout) => TransportEvent::Timeout(tag),
                    Err(e) => TransportEvent::WriteFailed {
                        error: e.to_string(),
                        tag,
                    },
                });
            }
            Action::ReadLine { timeout, tag } => {
                tracing::trace!(?tag, "read line");
                let result = self.read_line(timeout).await;
                events.push(self.read_event(result, tag));
            }
            Action::ReadExact { len, timeout, tag } => {
                tracing::trace!(len, ?tag, "read exact");
                let result = self.read_exact(len, timeout, tag, &mut events).await;
                events.push(self.read_event(result, tag));
            }
            Action::Close => {
                self.close().await;
                events.push(TransportEvent::Disconnected(None));
            }
        }

        events
    }

    /// 接続を閉じる
    pub async fn close(&mut self) {
        let result = match self.stream.take() {
            Some(Stream::Plain(mut s)) => s.shutdown().await,
            Some(Stream::Tls(mut s)) => s.shutdown().await,
            None => return,
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "shutdown failed");
        }
    }

    fn read_event(&mut self, result: Result<Vec<u8>>, tag: Tag) -> TransportEvent {
        match result {
            Ok(data) => TransportEvent::Data { data, tag },
            Err(Error::Timeout) => TransportEvent::Timeout(tag),
            Err(Error::ConnectionClosed) => {
                // 相手に閉じられたので以後の操作は不要
                self.stream = None;
                TransportEvent::Disconnected(None)
            }
            Err(e) => TransportEvent::ReadFailed {
                error: e.to_string(),
                tag,
            },
        }
    }

    fn io(&mut self) -> Result<&mut dyn Io> {
        match self.stream.as_mut() {
            Some(Stream::Plain(s)) => Ok(s),
            Some(Stream::Tls(s)) => Ok(&mut **s),
            None => Err(Error::ConnectionClosed),
        }
    }

    async fn connect(&mut self, host: &str, port: u16) -> Result<(String, u16)> {
        let stream =
            tokio::time::timeout(self.connect_timeout, TcpStream::connect((host, port))).await??;
        let peer = stream.peer_addr()?;
        self.stream = Some(Stream::Plain(BufReader::with_capacity(
            self.read_buffer_size,
            stream,
        )));
        Ok((peer.ip().to_string(), peer.port()))
    }

    async fn start_secure(&mut self, server_name: &str) -> Result<()> {
        let reader = match self.stream.take() {
            Some(Stream::Plain(reader)) => reader,
            other => {
                self.stream = other;
                return Err(Error::Tls("no plain connection to secure".to_string()));
            }
        };

        let config = self.tls_config.clone().unwrap_or_else(default_tls_config);
        let connector = TlsConnector::from(config);
        let server_name = ServerName::try_from(server_name.to_string())?;
        let stream = tokio::time::timeout(
            self.connect_timeout,
            connector.connect(server_name, reader.into_inner()),
        )
        .await?
        .map_err(|e| Error::Tls(e.to_string()))?;

        self.stream = Some(Stream::Tls(Box::new(BufReader::with_capacity(
            self.read_buffer_size,
            stream,
        ))));
        Ok(())
    }

    async fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<()> {
        let io = self.io()?;
        with_timeout(timeout, async move {
            io.write_all(data).await?;
            io.flush().await?;
            Ok(())
        })
        .await
    }

    /// CRLF で終わる 1 行を読み取る (CRLF を含む)
    async fn read_line(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let max_line_size = self.max_line_size;
        let io = self.io()?;
        with_timeout(timeout, async move {
            read_crlf_line(io, max_line_size)
                .await?
                .ok_or(Error::ConnectionClosed)
        })
        .await
    }

    async fn read_exact(
        &mut self,
        len: usize,
        timeout: Option<Duration>,
        tag: Tag,
        events: &mut Vec<TransportEvent>,
    ) -> Result<Vec<u8>> {
        let io = self.io()?;
        with_timeout(timeout, async move {
            let mut data = Vec::with_capacity(len.min(1024 * 1024));
            while data.len() < len {
                let buf = io.fill_buf().await?;
                if buf.is_empty() {
                    return Err(Error::ConnectionClosed);
                }
                let n = buf.len().min(len - data.len());
                data.extend_from_slice(&buf[..n]);
                io.consume(n);
                events.push(TransportEvent::PartialProgress {
                    bytes_so_far: data.len(),
                    tag,
                });
            }
            Ok(data)
        })
        .await
    }
}

/// CRLF で終わる 1 行を読み取る (CRLF を含む)
///
/// 単独の LF は行の区切りとして扱わない。
/// 行が `max_line_size` を超えた時点で、CRLF の有無にかかわらず InvalidData を返す。
/// 行の途中で接続が閉じられたら None (途中までの行は捨てる)
pub(crate) async fn read_crlf_line<R>(
    reader: &mut R,
    max_line_size: usize,
) -> Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = Vec::new();
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(None);
        }
        let (n, lf) = match buf.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (buf.len(), false),
        };
        if line.len() + n > max_line_size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds {} bytes", max_line_size),
            )));
        }
        line.extend_from_slice(&buf[..n]);
        reader.consume(n);
        if lf && line.ends_with(b"\r\n") {
            return Ok(Some(line));
        }
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    future: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, future).await?,
        None => future.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http11_exchange::ExchangeConfig;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (Transport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut transport = Transport::new();
        let (events, accepted) = tokio::join!(
            transport.execute(Action::Connect {
                host: "127.0.0.1".to_string(),
                port,
            }),
            listener.accept()
        );
        assert!(matches!(events[0], TransportEvent::Connected { .. }));
        (transport, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_read_line_requires_crlf() {
        let (mut transport, mut peer) = connected_pair().await;
        peer.write_all(b"a\nb\r\nrest").await.unwrap();

        let events = transport
            .execute(Action::ReadLine {
                timeout: Some(Duration::from_secs(5)),
                tag: Tag::Header,
            })
            .await;
        assert_eq!(
            events,
            vec![TransportEvent::Data {
                data: b"a\nb\r\n".to_vec(),
                tag: Tag::Header,
            }]
        );
    }

    #[tokio::test]
    async fn test_read_line_over_limit_with_crlf() {
        let (transport, mut peer) = connected_pair().await;
        let mut transport = transport.max_line_size(16);
        let mut data = vec![b'a'; 1000];
        data.extend_from_slice(b"\r\n");
        peer.write_all(&data).await.unwrap();

        let events = transport
            .execute(Action::ReadLine {
                timeout: Some(Duration::from_secs(5)),
                tag: Tag::Header,
            })
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TransportEvent::ReadFailed {
                tag: Tag::Header,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_read_line_over_limit_without_lf() {
        let (transport, mut peer) = connected_pair().await;
        let mut transport = transport.max_line_size(16);
        // 接続は開いたまま LF を送らない
        peer.write_all(&[b'a'; 1000]).await.unwrap();

        let events = transport
            .execute(Action::ReadLine {
                timeout: Some(Duration::from_secs(5)),
                tag: Tag::Header,
            })
            .await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            TransportEvent::ReadFailed {
                tag: Tag::Header,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_read_line_at_limit() {
        let (transport, mut peer) = connected_pair().await;
        let mut transport = transport.max_line_size(8);
        peer.write_all(b"abcdef\r\n").await.unwrap();

        let events = transport
            .execute(Action::ReadLine {
                timeout: Some(Duration::from_secs(5)),
                tag: Tag::Header,
            })
            .await;
        assert_eq!(
            events,
            vec![TransportEvent::Data {
                data: b"abcdef\r\n".to_vec(),
                tag: Tag::Header,
            }]
        );
    }

    #[tokio::test]
    async fn test_rejected_event_closes_connection() {
        let (mut transport, mut peer) = connected_pair().await;

        let mut exchange = Exchange::new(ExchangeConfig::new("127.0.0.1", "/"));
        exchange.start().unwrap();
        exchange.poll_action();
        exchange
            .handle_event(TransportEvent::Connected {
                address: "127.0.0.1".to_string(),
                port: 80,
            })
            .unwrap();

        // ヘッダー行を待っているところにボディの結果を渡す
        let result = transport
            .deliver(
                &mut exchange,
                vec![TransportEvent::Data {
                    data: b"x".to_vec(),
                    tag: Tag::Body,
                }],
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::Http(http11_exchange::Error::InvalidState(_)))
        ));
        assert!(!transport.is_connected());

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_read_exact_reports_progress() {
        let (mut transport, mut peer) = connected_pair().await;
        peer.write_all(b"hello").await.unwrap();

        let events = transport
            .execute(Action::ReadExact {
                len: 5,
                timeout: Some(Duration::from_secs(5)),
                tag: Tag::Body,
            })
            .await;
        let last = events.last().unwrap();
        assert_eq!(
            last,
            &TransportEvent::Data {
                data: b"hello".to_vec(),
                tag: Tag::Body,
            }
        );
        assert!(events[..events.len() - 1].iter().all(|e| matches!(
            e,
            TransportEvent::PartialProgress { tag: Tag::Body, .. }
        )));
        assert!(events.contains(&TransportEvent::PartialProgress {
            bytes_so_far: 5,
            tag: Tag::Body,
        }));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (mut transport, _peer) = connected_pair().await;
        let events = transport
            .execute(Action::ReadLine {
                timeout: Some(Duration::from_millis(50)),
                tag: Tag::Header,
            })
            .await;
        assert_eq!(events, vec![TransportEvent::Timeout(Tag::Header)]);
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_peer_close_is_disconnect() {
        let (mut transport, peer) = connected_pair().await;
        drop(peer);
        let events = transport
            .execute(Action::ReadExact {
                len: 10,
                timeout: None,
                tag: Tag::Body,
            })
            .await;
        assert_eq!(events, vec![TransportEvent::Disconnected(None)]);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_write_and_close() {
        let (mut transport, mut peer) = connected_pair().await;
        let events = transport
            .execute(Action::Write {
                data: b"ping\r\n".to_vec(),
                timeout: None,
                tag: Tag::Request,
            })
            .await;
        assert_eq!(events, vec![TransportEvent::Written(Tag::Request)]);

        let events = transport.execute(Action::Close).await;
        assert_eq!(events, vec![TransportEvent::Disconnected(None)]);

        let mut received = Vec::new();
        peer.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"ping\r\n");
    }

    #[tokio::test]
    async fn test_read_without_connection() {
        let mut transport = Transport::new();
        let events = transport
            .execute(Action::ReadLine {
                timeout: None,
                tag: Tag::Header,
            })
            .await;
        assert_eq!(events, vec![TransportEvent::Disconnected(None)]);
    }
}
