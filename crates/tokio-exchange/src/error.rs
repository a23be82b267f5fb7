//! tokio-exchange エラー型

use std::fmt;

use http11_exchange::ExchangeError;

/// tokio-exchange エラー
#[derive(Debug)]
pub enum Error {
    /// I/O エラー
    Io(std::io::Error),
    /// ヘッダー / chunked の状態エラー
    Http(http11_exchange::Error),
    /// エクスチェンジの失敗
    Exchange(ExchangeError),
    /// TLS エラー
    Tls(String),
    /// タイムアウト
    Timeout,
    /// 接続が閉じられた
    ConnectionClosed,
    /// 不正な URL
    #[cfg(feature = "client")]
    InvalidUrl(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
            Error::Exchange(e) => write!(f, "exchange failed: {}", e),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::Timeout => write!(f, "timeout"),
            Error::ConnectionClosed => write!(f, "connection closed"),
            #[cfg(feature = "client")]
            Error::InvalidUrl(msg) => write!(f, "invalid URL: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Exchange(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<http11_exchange::Error> for Error {
    fn from(e: http11_exchange::Error) -> Self {
        Error::Http(e)
    }
}

impl From<ExchangeError> for Error {
    fn from(e: ExchangeError) -> Self {
        Error::Exchange(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}

impl From<rustls_pki_types::InvalidDnsNameError> for Error {
    fn from(e: rustls_pki_types::InvalidDnsNameError) -> Self {
        Error::Tls(e.to_string())
    }
}

/// Result 型エイリアス
pub type Result<T> = std::result::Result<T, Error>;
