//! Security Module
//!
//! リソース制限とセキュリティ対策を実装するモジュール。
//! テンプレートサイズ・行数の上限、ZIP bomb攻撃、パストラバーサル攻撃への対策を提供します。

use crate::error::XlsxMergeError;

/// リソース制限の設定
///
/// すべての上限はテンプレートの解析やレンダリングを開始する前に検査されます。
///
/// # 使用例
///
/// ```rust
/// use xlsxmerge::Limits;
///
/// let limits = Limits::default()
///     .with_max_rows(500)
///     .with_max_template_size(10 * 1024 * 1024);
/// assert_eq!(limits.max_rows, 500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// テンプレートの最大サイズ（バイト）
    /// デフォルト: 100MB (104_857_600 bytes)
    pub max_template_size: u64,
    /// 1リクエストあたりの最大行数
    /// デフォルト: 10000
    pub max_rows: usize,
    /// ZIPアーカイブ内の最大ファイル数
    /// デフォルト: 10000
    pub max_part_count: usize,
    /// 単一パートの最大展開サイズ（バイト）
    /// デフォルト: 100MB (104_857_600 bytes)
    pub max_part_size: u64,
    /// 展開後の合計最大サイズ（バイト）
    /// デフォルト: 1GB (1_073_741_824 bytes)
    pub max_decompressed_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_template_size: 104_857_600, // 100MB
            max_rows: 10_000,
            max_part_count: 10_000,
            max_part_size: 104_857_600,           // 100MB
            max_decompressed_size: 1_073_741_824, // 1GB
        }
    }
}

impl Limits {
    /// テンプレートの最大サイズを設定
    pub fn with_max_template_size(mut self, bytes: u64) -> Self {
        self.max_template_size = bytes;
        self
    }

    /// 最大行数を設定
    pub fn with_max_rows(mut self, rows: usize) -> Self {
        self.max_rows = rows;
        self
    }

    /// ZIPアーカイブ内の最大ファイル数を設定
    pub fn with_max_part_count(mut self, count: usize) -> Self {
        self.max_part_count = count;
        self
    }

    /// 単一パートの最大展開サイズを設定
    pub fn with_max_part_size(mut self, bytes: u64) -> Self {
        self.max_part_size = bytes;
        self
    }

    /// 展開後の合計最大サイズを設定
    pub fn with_max_decompressed_size(mut self, bytes: u64) -> Self {
        self.max_decompressed_size = bytes;
        self
    }

    /// 0の上限を検出する（`GeneratorBuilder::build()`から呼ばれる）
    pub(crate) fn validate(&self) -> Result<(), XlsxMergeError> {
        let zero = [
            ("max_template_size", self.max_template_size == 0),
            ("max_rows", self.max_rows == 0),
            ("max_part_count", self.max_part_count == 0),
            ("max_part_size", self.max_part_size == 0),
            ("max_decompressed_size", self.max_decompressed_size == 0),
        ];
        if let Some((name, _)) = zero.iter().find(|(_, is_zero)| *is_zero) {
            return Err(XlsxMergeError::Config(format!(
                "Limit '{}' must be greater than zero",
                name
            )));
        }
        Ok(())
    }

    pub(crate) fn check_template_size(&self, len: usize) -> Result<(), XlsxMergeError> {
        if len as u64 > self.max_template_size {
            return Err(XlsxMergeError::ResourceLimit(format!(
                "Template size exceeds maximum: {} bytes (max: {} bytes)",
                len, self.max_template_size
            )));
        }
        Ok(())
    }

    pub(crate) fn check_row_count(&self, rows: usize) -> Result<(), XlsxMergeError> {
        if rows > self.max_rows {
            return Err(XlsxMergeError::ResourceLimit(format!(
                "Row count exceeds maximum: {} (max: {})",
                rows, self.max_rows
            )));
        }
        Ok(())
    }
}

/// ZIPエントリの展開サイズ累計を検査するカウンタ
#[derive(Debug)]
pub(crate) struct DecompressionBudget<'a> {
    limits: &'a Limits,
    total: u64,
}

impl<'a> DecompressionBudget<'a> {
    pub fn new(limits: &'a Limits, entry_count: usize) -> Result<Self, XlsxMergeError> {
        // セキュリティチェック: ファイル数の上限
        if entry_count > limits.max_part_count {
            return Err(XlsxMergeError::ResourceLimit(format!(
                "ZIP archive contains too many files: {} (max: {})",
                entry_count, limits.max_part_count
            )));
        }
        Ok(Self { limits, total: 0 })
    }

    /// ZIPヘッダが宣言するサイズを展開前に検査する（計上はしない）
    pub fn check_declared(&self, name: &str, size: u64) -> Result<(), XlsxMergeError> {
        self.check_part_size(name, size)?;
        if size > self.remaining() {
            return Err(XlsxMergeError::ResourceLimit(format!(
                "Total decompressed size exceeds maximum: {} bytes declared by '{}' (max: {} bytes)",
                self.total.saturating_add(size),
                name,
                self.limits.max_decompressed_size
            )));
        }
        Ok(())
    }

    /// 次のパートで実際に展開してよいバイト数
    pub fn allowance(&self) -> u64 {
        self.limits.max_part_size.min(self.remaining())
    }

    fn remaining(&self) -> u64 {
        self.limits.max_decompressed_size.saturating_sub(self.total)
    }

    fn check_part_size(&self, name: &str, size: u64) -> Result<(), XlsxMergeError> {
        if size > self.limits.max_part_size {
            return Err(XlsxMergeError::ResourceLimit(format!(
                "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                name, size, self.limits.max_part_size
            )));
        }
        Ok(())
    }

    /// 実際に展開したバイト数を計上する
    pub fn charge(&mut self, name: &str, size: u64) -> Result<(), XlsxMergeError> {
        self.check_part_size(name, size)?;

        self.total = self.total.checked_add(size).ok_or_else(|| {
            XlsxMergeError::ResourceLimit(
                "Total decompressed size calculation overflow".to_string(),
            )
        })?;

        if self.total > self.limits.max_decompressed_size {
            return Err(XlsxMergeError::ResourceLimit(format!(
                "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                self.total, self.limits.max_decompressed_size
            )));
        }
        Ok(())
    }
}

/// パッケージ内のパート名を検証
///
/// パストラバーサル攻撃を防ぐため、空のパス・絶対パス・`..`・バックスラッシュを拒否します。
pub(crate) fn check_part_name(path: &str) -> Result<(), XlsxMergeError> {
    let reason = if path.is_empty() {
        Some("empty path is not allowed".to_string())
    } else if path.starts_with('/') || path.get(1..3) == Some(":\\") {
        Some(format!("absolute path is not allowed: {}", path))
    } else if path.split('/').any(|segment| segment == "..") {
        Some(format!("path traversal detected: {}", path))
    } else if path.contains('\\') {
        Some(format!("backslash in path is not allowed: {}", path))
    } else {
        None
    };

    match reason {
        Some(reason) => Err(XlsxMergeError::ResourceLimit(format!(
            "Invalid ZIP path: {}",
            reason
        ))),
        None => Ok(()),
    }
}
