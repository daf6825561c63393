//! Naming Module
//!
//! アーカイブのエントリ名を決定するモジュール。
//!
//! デフォルトは行番号を0埋めした`output_001.xlsx`形式です。出力名パターン（例: `"invoice_{name}"`）が
//! 指定された場合は行の値を埋め込み、ファイル名として安全な文字列に整えます。
//! 同じ名前が生成された場合は`_2`、`_3`…を付けて一意にします。

use std::collections::HashSet;

use crate::error::XlsxMergeError;
use crate::mapping::DataRow;

/// デフォルト名の最小桁数
const MIN_INDEX_WIDTH: usize = 3;

/// 行番号からデフォルトのエントリ名を生成
///
/// `index`は1始まり。桁数は`max(3, totalの桁数)`で0埋めします。
///
/// ```rust
/// use xlsxmerge::default_entry_name;
///
/// assert_eq!(default_entry_name(1, 2, "xlsx"), "output_001.xlsx");
/// assert_eq!(default_entry_name(42, 1500, "xlsm"), "output_0042.xlsm");
/// ```
pub fn default_entry_name(index: usize, total: usize, extension: &str) -> String {
    format!(
        "{}.{}",
        default_stem(index, total),
        extension
    )
}

fn default_stem(index: usize, total: usize) -> String {
    let width = total.to_string().len().max(MIN_INDEX_WIDTH);
    format!("output_{:0width$}", index, width = width)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// 出力名パターン
///
/// `{field}`の部分を行の値で置き換えます。フィールド名は完全一致を優先し、
/// 見つからなければ大文字・小文字を区別せずに照合します。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePattern {
    source: String,
    segments: Vec<Segment>,
}

impl NamePattern {
    /// パターン文字列を解析
    ///
    /// 対応する`}`のない`{`や空の`{}`は文字としてそのまま扱います。
    pub fn parse(pattern: &str) -> Result<Self, XlsxMergeError> {
        if pattern.trim().is_empty() {
            return Err(XlsxMergeError::InvalidMapping(
                "Naming pattern must not be empty".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            let after_open = &rest[open + 1..];
            match after_open.find('}') {
                Some(close) if close > 0 => {
                    literal.push_str(&rest[..open]);
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(after_open[..close].trim().to_string()));
                    rest = &after_open[close + 1..];
                }
                _ => {
                    literal.push_str(&rest[..=open]);
                    rest = after_open;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// 元のパターン文字列
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// パターン内のフィールド名
    pub(crate) fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// 行の値を埋め込んだ名前（拡張子なし、空になることもある）
    pub(crate) fn render(&self, row: &DataRow) -> String {
        let mut filled = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => filled.push_str(&sanitize(text)),
                Segment::Field(name) => {
                    if let Some(value) = row.get_ignore_case(name) {
                        filled.push_str(&sanitize(&value.display_string()));
                    }
                }
            }
        }
        tidy(&filled)
    }
}

/// ファイル名に使えない文字と空白を`_`に置き換える（連続する空白は1つの`_`）
fn sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|') || c.is_control() {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// 連続する`_`をまとめ、前後の`_ - .`と空白を取り除く
fn tidy(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.trim_matches(|c: char| matches!(c, '_' | '-' | '.') || c.is_whitespace())
        .to_string()
}

/// 行ごとのエントリ名を一意に割り当てる
#[derive(Debug)]
pub(crate) struct OutputNamer<'a> {
    pattern: Option<&'a NamePattern>,
    total: usize,
    extension: &'a str,
    /// 使用済みの名前（大文字・小文字を区別しない）
    used: HashSet<String>,
}

impl<'a> OutputNamer<'a> {
    pub fn new(pattern: Option<&'a NamePattern>, total: usize, extension: &'a str) -> Self {
        Self {
            pattern,
            total,
            extension,
            used: HashSet::with_capacity(total),
        }
    }

    /// 1始まりの行番号に対するエントリ名（行順に呼び出すこと）
    pub fn next_name(&mut self, index: usize, row: &DataRow) -> String {
        let stem = self
            .pattern
            .map(|p| p.render(row))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default_stem(index, self.total));

        let mut candidate = format!("{}.{}", stem, self.extension);
        let mut suffix = 2;
        while !self.used.insert(candidate.to_lowercase()) {
            candidate = format!("{}_{}.{}", stem, suffix, self.extension);
            suffix += 1;
        }
        candidate
    }
}
