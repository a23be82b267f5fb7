/// パーサー / デコーダーの制限設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// 最大ヘッダーサイズ (デフォルト: 64KB)
    ///
    /// 終端の空行 (CRLF CRLF) を含むヘッダーブロック全体の上限。
    pub max_header_size: usize,
    /// 最大チャンクサイズ (デフォルト: 16MB)
    pub max_chunk_size: u64,
    /// 最大ボディサイズ (デフォルト: 1GB)
    ///
    /// Content-Length とチャンクの合計の両方に適用される。
    pub max_body_size: u64,
    /// 最大チャンクサイズ行長 (デフォルト: 1KB)
    ///
    /// チャンク拡張を含むため、16 進数のサイズだけより長めに取る。
    pub max_chunk_line_size: usize,
    /// 最大トレーラー数 (デフォルト: 100)
    pub max_trailer_count: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_header_size: 64 * 1024,           // 64KB
            max_chunk_size: 16 * 1024 * 1024,     // 16MB
            max_body_size: 1024 * 1024 * 1024,    // 1GB
            max_chunk_line_size: 1024,            // 1KB
            max_trailer_count: 100,
        }
    }
}

impl Limits {
    /// 制限なしの設定を作成
    pub fn unlimited() -> Self {
        Self {
            max_header_size: usize::MAX,
            max_chunk_size: u64::MAX,
            max_body_size: u64::MAX,
            max_chunk_line_size: usize::MAX,
            max_trailer_count: usize::MAX,
        }
    }
}
