//! 行エコーサーバー
//!
//! 接続ごとに歓迎メッセージを送り、以後は CRLF で終わる 1 行を受信するたびに
//! そのまま送り返す。受信した行はログに出力する。
//! UTF-8 として読めない行はエラーをログに出すが、送り返しは行う。
//!
//! ## 使い方
//!
//! ```ignore
//! use tokio_exchange::EchoServer;
//!
//! let server = EchoServer::bind("0.0.0.0:15035").await?;
//! server.serve().await?;
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::transport::read_crlf_line;

/// 接続時に送るメッセージ
pub const WELCOME_MESSAGE: &str = "Welcome to the AsyncSocket Echo Server\r\n";

/// 行エコーサーバー
pub struct EchoServer {
    listener: TcpListener,
    welcome: String,
    idle_timeout: Option<Duration>,
    max_line_size: usize,
}

impl EchoServer {
    /// 指定アドレスにバインド
    ///
    /// ポート 0 を指定すると空いているポートが選ばれる。
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            welcome: WELCOME_MESSAGE.to_string(),
            idle_timeout: None,
            max_line_size: 64 * 1024,
        })
    }

    /// 歓迎メッセージを変更
    pub fn welcome(mut self, message: &str) -> Self {
        self.welcome = message.to_string();
        self
    }

    /// 無通信タイムアウトを設定 (デフォルトは無制限)
    pub fn idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// 1 行の最大長を設定
    pub fn max_line_size(mut self, size: usize) -> Self {
        self.max_line_size = size;
        self
    }

    /// ローカルアドレスを取得
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// サーバーを起動
    ///
    /// 接続ごとにタスクを起動する。
    pub async fn serve(self) -> Result<()> {
        tracing::info!(addr = %self.local_addr()?, "echo server started");
        let config = Arc::new(self.connection_config());

        loop {
            let (stream, peer_addr) = self.listener.accept().await?;
            let config = config.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, &config).await {
                    tracing::warn!(%peer_addr, error = %e, "connection error");
                }
            });
        }
    }

    /// 単一の接続を処理 (テスト用)
    pub async fn handle_one(self) -> Result<()> {
        let (stream, peer_addr) = self.listener.accept().await?;
        handle_connection(stream, peer_addr, &self.connection_config()).await
    }

    fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            welcome: self.welcome.clone(),
            idle_timeout: self.idle_timeout,
            max_line_size: self.max_line_size,
        }
    }
}

struct ConnectionConfig {
    welcome: String,
    idle_timeout: Option<Duration>,
    max_line_size: usize,
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    config: &ConnectionConfig,
) -> Result<()> {
    tracing::info!(%peer_addr, "accepted client");
    let (reader, writer) = stream.into_split();
    let result = echo(reader, writer, config).await;
    tracing::info!(%peer_addr, "client disconnected");
    result
}

async fn echo<R, W>(reader: R, mut writer: W, config: &ConnectionConfig) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    writer.write_all(config.welcome.as_bytes()).await?;
    writer.flush().await?;

    loop {
        let line = match read_line(&mut reader, config).await {
            Ok(Some(line)) => line,
            Ok(None) => return Ok(()),
            Err(Error::Timeout) => return Ok(()),
            Err(e) => return Err(e),
        };

        match std::str::from_utf8(&line) {
            Ok(text) => tracing::info!(message = %text.trim_end(), "received"),
            Err(e) => tracing::error!(
                error = %e,
                "error converting received data into UTF-8 string"
            ),
        }

        writer.write_all(&line).await?;
        writer.flush().await?;
    }
}

/// CRLF で終わる 1 行を読み取る
///
/// 接続が閉じられたら None (途中までの行は捨てる)
async fn read_line<R>(
    reader: &mut BufReader<R>,
    config: &ConnectionConfig,
) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let read = read_crlf_line(reader, config.max_line_size);
    match config.idle_timeout {
        Some(timeout) => tokio::time::timeout(timeout, read).await?,
        None => read.await,
    }
}
