use std::fmt;

/// ヘッダー / chunked デコードのエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// 現在の状態では実行できない操作
    InvalidState(String),
    /// ヘッダーサイズ超過
    HeaderTooLarge { size: usize, limit: usize },
    /// 不正なチャンクサイズ行
    InvalidChunkSize(String),
    /// チャンクサイズ超過
    ChunkTooLarge { size: u64, limit: u64 },
    /// チャンクサイズ行が長すぎる
    ChunkLineTooLong { size: usize, limit: usize },
    /// ボディサイズ超過
    BodyTooLarge { size: u64, limit: u64 },
    /// トレーラー数超過
    TooManyTrailers { count: usize, limit: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Error::HeaderTooLarge { size, limit } => {
                write!(f, "header too large: {} > {}", size, limit)
            }
            Error::InvalidChunkSize(line) => write!(f, "invalid chunk size: {:?}", line),
            Error::ChunkTooLarge { size, limit } => {
                write!(f, "chunk too large: {} > {}", size, limit)
            }
            Error::ChunkLineTooLong { size, limit } => {
                write!(f, "chunk line too long: {} > {}", size, limit)
            }
            Error::BodyTooLarge { size, limit } => {
                write!(f, "body too large: {} > {}", size, limit)
            }
            Error::TooManyTrailers { count, limit } => {
                write!(f, "too many trailers: {} > {}", count, limit)
            }
        }
    }
}

impl std::error::Error for Error {}

/// エクスチェンジ (1 回のリクエスト / レスポンス) の失敗種別
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// 接続 / TLS / タイムアウトの失敗
    Connection(String),
    /// プロトコル違反 (不正なステータス行、サイズ超過など)
    Protocol(String),
    /// ダウンロード経路で 200 以外のステータスコードを受信
    UnsupportedStatus(u16),
    /// Content-Length がなく chunked でもない
    MissingLength,
    /// ボディをテキストとして解釈できない (回復可能)
    ///
    /// ボディ自体はそのまま通知される。
    Encoding { valid_up_to: usize },
}

impl ExchangeError {
    /// エクスチェンジを終了させるエラーかどうか
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ExchangeError::Encoding { .. })
    }
}

impl fmt::Display for ExchangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeError::Connection(msg) => write!(f, "connection error: {}", msg),
            ExchangeError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            ExchangeError::UnsupportedStatus(code) => {
                write!(f, "unsupported status code: {}", code)
            }
            ExchangeError::MissingLength => write!(
                f,
                "missing Content-Length and Transfer-Encoding is not chunked"
            ),
            ExchangeError::Encoding { valid_up_to } => {
                write!(f, "body is not valid UTF-8 after {} bytes", valid_up_to)
            }
        }
    }
}

impl std::error::Error for ExchangeError {}

impl From<Error> for ExchangeError {
    fn from(e: Error) -> Self {
        ExchangeError::Protocol(e.to_string())
    }
}
