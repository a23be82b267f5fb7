//! ヘッダーフィールドの順序付きマップ

/// ヘッダーフィールド
///
/// - 名前の比較は大文字小文字を区別しない
/// - 同じ名前を再設定すると値だけが置き換わる (最初の位置と綴りを保持)
/// - 挿入順を保持し、シリアライズはこの順で行う
#[derive(Debug, Clone, Default)]
pub struct Fields {
    entries: Vec<(String, String)>,
}

impl Fields {
    /// 空のフィールドを作成
    pub fn new() -> Self {
        Self::default()
    }

    /// フィールドを設定 (同名があれば値を置き換える)
    pub fn set(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// フィールドの値を取得 (大文字小文字を区別しない)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    /// フィールドが存在するか確認
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// フィールドを削除して値を返す
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    /// フィールド数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// フィールドが空か確認
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 挿入順にイテレート
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// 順序を問わず、名前 (大文字小文字無視) と値が一致すれば等しい
impl PartialEq for Fields {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(n, v)| other.get(n) == Some(v))
    }
}

impl Eq for Fields {}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a str, &'a str);
    type IntoIter = Box<dyn Iterator<Item = (&'a str, &'a str)> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}
