//! ヘッダーブロックのパース
//!
//! 寛容なパースを行う。不正なフィールド行は読み飛ばし、
//! 不正なスタートラインは「取得不可」として扱う (エラーにはしない)。

use super::fields::Fields;
use super::Role;

/// スタートライン
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StartLine {
    /// METHOD SP TARGET SP VERSION
    Request {
        method: String,
        target: String,
        version: String,
    },
    /// VERSION SP STATUS-CODE SP STATUS-TEXT
    ///
    /// ステータスコードが数値でない場合は None
    Response {
        version: String,
        status_code: Option<u16>,
        status_text: String,
    },
}

impl StartLine {
    pub(crate) fn version(&self) -> &str {
        match self {
            StartLine::Request { version, .. } | StartLine::Response { version, .. } => version,
        }
    }
}

/// パース結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Parsed {
    pub start: StartLine,
    pub fields: Fields,
}

/// ヘッダーブロック全体をパース
///
/// スタートラインが不正な場合は None を返す。
pub(crate) fn parse_block(text: &str, role: Role) -> Option<Parsed> {
    let mut lines = text.split("\r\n").filter(|line| !line.is_empty());

    let start = parse_start_line(lines.next()?, role)?;

    let mut fields = Fields::new();
    for line in lines {
        if let Some((name, value)) = parse_field_line(line) {
            fields.set(name, value);
        }
    }

    Some(Parsed { start, fields })
}

/// スタートラインをパース
///
/// 最初の 2 つの空白だけで分割する。
/// ステータステキストは空白を含みうるので 3 つ目以降をまとめて扱う。
pub(crate) fn parse_start_line(line: &str, role: Role) -> Option<StartLine> {
    let parts: Vec<&str> = line.splitn(3, ' ').collect();
    if parts.len() != 3 {
        return None;
    }

    match role {
        Role::Request => Some(StartLine::Request {
            method: parts[0].to_string(),
            target: parts[1].to_string(),
            version: parts[2].to_string(),
        }),
        Role::Response => Some(StartLine::Response {
            version: parts[0].to_string(),
            status_code: parts[1].parse().ok(),
            status_text: parts[2].trim().to_string(),
        }),
    }
}

/// フィールド行を最初のコロンで分割
///
/// 値の先頭の空白のみ取り除く。コロンがない行は None
pub(crate) fn parse_field_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name, value.trim_start()))
}
