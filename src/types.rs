//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use std::fmt;

/// Excelの最大行数（1,048,576行）
pub(crate) const MAX_ROWS: u32 = 1_048_576;

/// Excelの最大列数（16,384列、XFD）
pub(crate) const MAX_COLS: u32 = 16_384;

/// セルの値を表す列挙型
///
/// 共有文字列インデックスは解決済みの状態で保持します。
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 文字列
    Text(String),

    /// 数値（f64）
    Number(f64),

    /// 論理値
    Bool(bool),

    /// エラー値（例: #DIV/0!）
    Error(String),

    /// 空セル
    Blank,
}

impl CellValue {
    /// 値が空かどうかを判定
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Blank)
    }

    /// 文字列値を取得（文字列セル以外は`None`）
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// セル座標（0始まり）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    /// 行インデックス（0始まり）
    pub row: u32,
    /// 列インデックス（0始まり）
    pub col: u32,
}

impl CellCoord {
    /// 新しい座標を生成
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1形式の文字列を座標に変換（例: "B2" -> (1, 1)）
    ///
    /// 絶対参照の`$`は無視します。列は大文字・小文字を区別しません。
    /// Excelのグリッド（XFD1048576）を超える座標は`None`になります。
    pub fn parse_a1(s: &str) -> Option<Self> {
        let s = s.trim();
        let bytes: Vec<u8> = s.bytes().filter(|b| *b != b'$').collect();
        let split = bytes.iter().position(|b| b.is_ascii_digit())?;
        let (letters, digits) = bytes.split_at(split);
        if letters.is_empty() || letters.len() > 3 || digits.is_empty() {
            return None;
        }
        if !letters.iter().all(|b| b.is_ascii_alphabetic()) {
            return None;
        }
        if !digits.iter().all(|b| b.is_ascii_digit()) || digits[0] == b'0' {
            return None;
        }

        let col = Self::letter_to_col_index(letters)?;
        let row: u32 = std::str::from_utf8(digits).ok()?.parse().ok()?;
        if row == 0 || row > MAX_ROWS || col >= MAX_COLS {
            return None;
        }
        Some(Self::new(row - 1, col))
    }

    /// A1形式の文字列に変換（例: (0, 0) -> "A1"）
    pub fn to_a1_notation(&self) -> String {
        format!("{}{}", Self::col_index_to_letter(self.col), self.row + 1)
    }

    /// 列インデックスを文字列に変換（0 -> "A", 25 -> "Z", 26 -> "AA"）
    pub(crate) fn col_index_to_letter(mut col: u32) -> String {
        let mut result = String::new();
        loop {
            let remainder = col % 26;
            result.insert(0, (b'A' + remainder as u8) as char);
            if col < 26 {
                break;
            }
            col = col / 26 - 1;
        }
        result
    }

    fn letter_to_col_index(letters: &[u8]) -> Option<u32> {
        let mut col: u32 = 0;
        for b in letters {
            let v = (b.to_ascii_uppercase() - b'A') as u32 + 1;
            col = col.checked_mul(26)?.checked_add(v)?;
        }
        col.checked_sub(1)
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_notation())
    }
}

/// セル範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    /// 左上セル
    pub start: CellCoord,
    /// 右下セル
    pub end: CellCoord,
}

impl CellRange {
    /// 新しい範囲を生成
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        Self { start, end }
    }

    /// `"A1:C3"`または`"B2"`形式の範囲参照を解析
    pub fn parse_ref(s: &str) -> Option<Self> {
        match s.split_once(':') {
            Some((a, b)) => {
                let a = CellCoord::parse_a1(a)?;
                let b = CellCoord::parse_a1(b)?;
                // 逆順の指定も正規化する
                Some(Self::new(
                    CellCoord::new(a.row.min(b.row), a.col.min(b.col)),
                    CellCoord::new(a.row.max(b.row), a.col.max(b.col)),
                ))
            }
            None => {
                let a = CellCoord::parse_a1(s)?;
                Some(Self::new(a, a))
            }
        }
    }

    /// 指定された座標が範囲内にあるかを判定
    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.col >= self.start.col
            && coord.col <= self.end.col
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// セル結合範囲の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MergedRegion {
    /// 結合範囲
    pub range: CellRange,

    /// 親セル（左上セル）の座標
    pub parent: CellCoord,
}

impl MergedRegion {
    /// 新しい結合範囲を生成
    pub fn new(range: CellRange) -> Self {
        Self {
            parent: range.start,
            range,
        }
    }

    /// 指定された座標が親セル以外の結合セル（従属セル）かを判定
    pub fn is_secondary(&self, coord: CellCoord) -> bool {
        self.range.contains(coord) && coord != self.parent
    }
}
