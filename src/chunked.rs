//! chunked 転送エンコーディングのデコーダー (Sans I/O)
//!
//! バッファを持たないプル型の状態機械。
//! 呼び出し側 (トランスポート) に「1 行読んで」または「N バイト読んで」を要求し、
//! その結果を受け取るたびに次の要求と、デコード済みのペイロードやトレーラーを返す。
//!
//! ```text
//! AwaitingSize --(size > 0)--> AwaitingData --> AwaitingSize
//!      |
//!      +--(size == 0)--> AwaitingFooter --(空行)--> Done
//!                             ^    |
//!                             +----+ (トレーラー行)
//! ```
//!
//! ## 使い方
//!
//! ```rust
//! use http11_exchange::{ChunkedDecoder, ChunkedInput, ChunkedOutput, ReadRequest};
//!
//! let mut decoder = ChunkedDecoder::new();
//! assert_eq!(decoder.next_request(), Some(ReadRequest::Line));
//!
//! let step = decoder.feed(ChunkedInput::Line(b"4\r\n")).unwrap();
//! assert_eq!(step.next, Some(ReadRequest::Exact(6)));
//!
//! let step = decoder.feed(ChunkedInput::Block(b"Wiki\r\n")).unwrap();
//! assert_eq!(step.output, Some(ChunkedOutput::Payload(b"Wiki".to_vec())));
//!
//! decoder.feed(ChunkedInput::Line(b"0\r\n")).unwrap();
//! let step = decoder.feed(ChunkedInput::Line(b"\r\n")).unwrap();
//! assert_eq!(step.next, None);
//! assert!(decoder.is_done());
//! ```

use crate::error::Error;
use crate::header::parse::parse_field_line;
use crate::limits::Limits;

/// トランスポートへの読み取り要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRequest {
    /// CRLF までの 1 行 (CRLF を含む)
    Line,
    /// ちょうど N バイト
    Exact(usize),
}

/// 読み取り結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedInput<'a> {
    /// `ReadRequest::Line` の結果
    Line(&'a [u8]),
    /// `ReadRequest::Exact` の結果
    Block(&'a [u8]),
}

/// デコード結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkedOutput {
    /// チャンクデータ (末尾の CRLF は除去済み)
    Payload(Vec<u8>),
    /// トレーラーフィールド
    Trailer { name: String, value: String },
}

/// 1 回の `feed` の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedStep {
    /// この入力から得られた出力
    pub output: Option<ChunkedOutput>,
    /// 次に発行すべき読み取り要求 (None なら完了)
    pub next: Option<ReadRequest>,
}

/// デコーダーの段階
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkedStage {
    /// チャンクサイズ行待ち
    AwaitingSize,
    /// チャンクデータ + CRLF 待ち
    AwaitingData { size: u64 },
    /// トレーラー行 / 終端の空行待ち
    AwaitingFooter,
    /// 完了
    Done,
}

/// チャンクサイズ行の解釈方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkSizeParsing {
    /// 16 進数として解釈できない行はエラー
    #[default]
    Strict,
    /// 先頭の 16 進数字だけを読み、数字がなければ 0 (= 終端チャンク) とみなす
    Lenient,
}

/// chunked デコーダー
#[derive(Debug, Clone)]
pub struct ChunkedDecoder {
    stage: ChunkedStage,
    parsing: ChunkSizeParsing,
    limits: Limits,
    /// デコード済みペイロードの合計
    body_size: u64,
    trailer_count: usize,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    /// 新しいデコーダーを作成
    pub fn new() -> Self {
        Self::with_limits(Limits::default())
    }

    /// 制限付きでデコーダーを作成
    pub fn with_limits(limits: Limits) -> Self {
        Self {
            stage: ChunkedStage::AwaitingSize,
            parsing: ChunkSizeParsing::default(),
            limits,
            body_size: 0,
            trailer_count: 0,
        }
    }

    /// チャンクサイズ行の解釈方法を設定 (ビルダーパターン)
    pub fn size_parsing(mut self, parsing: ChunkSizeParsing) -> Self {
        self.parsing = parsing;
        self
    }

    /// 現在の段階
    pub fn stage(&self) -> ChunkedStage {
        self.stage
    }

    /// 完了したか
    pub fn is_done(&self) -> bool {
        self.stage == ChunkedStage::Done
    }

    /// デコード済みペイロードの合計バイト数
    pub fn body_size(&self) -> u64 {
        self.body_size
    }

    /// 現在の段階で発行すべき読み取り要求
    pub fn next_request(&self) -> Option<ReadRequest> {
        match self.stage {
            ChunkedStage::AwaitingSize | ChunkedStage::AwaitingFooter => Some(ReadRequest::Line),
            // size が usize に収まることは on_size_line で確認済み
            ChunkedStage::AwaitingData { size } => Some(ReadRequest::Exact(size as usize + 2)),
            ChunkedStage::Done => None,
        }
    }

    /// 読み取り結果を投入
    pub fn feed(&mut self, input: ChunkedInput<'_>) -> Result<ChunkedStep, Error> {
        match (self.stage, input) {
            (ChunkedStage::AwaitingSize, ChunkedInput::Line(line)) => self.on_size_line(line),
            (ChunkedStage::AwaitingData { size }, ChunkedInput::Block(block)) => {
                self.on_data(size, block)
            }
            (ChunkedStage::AwaitingFooter, ChunkedInput::Line(line)) => self.on_footer(line),
            (ChunkedStage::Done, _) => Err(Error::InvalidState(
                "chunked body is already complete".to_string(),
            )),
            (stage, input) => Err(Error::InvalidState(format!(
                "unexpected {} in stage {:?}",
                match input {
                    ChunkedInput::Line(_) => "line",
                    ChunkedInput::Block(_) => "block",
                },
                stage
            ))),
        }
    }

    fn on_size_line(&mut self, line: &[u8]) -> Result<ChunkedStep, Error> {
        let line = strip_crlf(line);
        if line.len() > self.limits.max_chunk_line_size {
            return Err(Error::ChunkLineTooLong {
                size: line.len(),
                limit: self.limits.max_chunk_line_size,
            });
        }

        let size = parse_chunk_size(line, self.parsing, self.limits.max_chunk_size)?;

        if size == 0 {
            self.stage = ChunkedStage::AwaitingFooter;
            return Ok(ChunkedStep {
                output: None,
                next: Some(ReadRequest::Line),
            });
        }

        if size > self.limits.max_chunk_size || size > (usize::MAX - 2) as u64 {
            return Err(Error::ChunkTooLarge {
                size,
                limit: self.limits.max_chunk_size,
            });
        }
        let total = self.body_size.saturating_add(size);
        if total > self.limits.max_body_size {
            return Err(Error::BodyTooLarge {
                size: total,
                limit: self.limits.max_body_size,
            });
        }

        self.stage = ChunkedStage::AwaitingData { size };
        Ok(ChunkedStep {
            output: None,
            next: self.next_request(),
        })
    }

    fn on_data(&mut self, size: u64, block: &[u8]) -> Result<ChunkedStep, Error> {
        if block.len() as u64 != size + 2 {
            return Err(Error::InvalidState(format!(
                "expected {} bytes of chunk data, got {}",
                size + 2,
                block.len()
            )));
        }

        // 末尾の 2 バイトは CRLF のはずだが検証しない
        let payload = block[..block.len() - 2].to_vec();
        self.body_size += size;
        self.stage = ChunkedStage::AwaitingSize;

        Ok(ChunkedStep {
            output: Some(ChunkedOutput::Payload(payload)),
            next: Some(ReadRequest::Line),
        })
    }

    fn on_footer(&mut self, line: &[u8]) -> Result<ChunkedStep, Error> {
        if line.len() <= 2 {
            self.stage = ChunkedStage::Done;
            return Ok(ChunkedStep {
                output: None,
                next: None,
            });
        }

        if self.trailer_count >= self.limits.max_trailer_count {
            return Err(Error::TooManyTrailers {
                count: self.trailer_count + 1,
                limit: self.limits.max_trailer_count,
            });
        }
        self.trailer_count += 1;

        let text = String::from_utf8_lossy(strip_crlf(line));
        let output = parse_field_line(&text).map(|(name, value)| ChunkedOutput::Trailer {
            name: name.to_string(),
            value: value.to_string(),
        });

        Ok(ChunkedStep {
            output,
            next: Some(ReadRequest::Line),
        })
    }
}

fn strip_crlf(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r\n").unwrap_or(line)
}

/// チャンクサイズ行をパース
///
/// `;` 以降のチャンク拡張は捨てる。
/// u64 に収まらないサイズは `max_chunk_size` を上限とする ChunkTooLarge
fn parse_chunk_size(
    line: &[u8],
    parsing: ChunkSizeParsing,
    max_chunk_size: u64,
) -> Result<u64, Error> {
    let size_part = line.split(|&b| b == b';').next().unwrap_or(line);
    let digits = size_part
        .iter()
        .take_while(|b| b.is_ascii_hexdigit())
        .count();

    let invalid = || Error::InvalidChunkSize(String::from_utf8_lossy(line).into_owned());

    match parsing {
        ChunkSizeParsing::Strict => {
            if digits == 0 {
                return Err(invalid());
            }
            // 数字の後ろは空白のみ許可
            if !size_part[digits..]
                .iter()
                .all(|&b| b == b' ' || b == b'\t')
            {
                return Err(invalid());
            }
        }
        ChunkSizeParsing::Lenient => {
            if digits == 0 {
                return Ok(0);
            }
        }
    }

    size_part[..digits].iter().try_fold(0u64, |acc, &b| {
        let digit = (b as char).to_digit(16).unwrap_or(0) as u64;
        acc.checked_mul(16)
            .and_then(|v| v.checked_add(digit))
            .ok_or(Error::ChunkTooLarge {
                size: u64::MAX,
                limit: max_chunk_size,
            })
    })
}
