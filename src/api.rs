//! Public API Types
//!
//! 公開APIで使用する列挙型・出力型を定義するモジュール。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// ZIPアーカイブのMIMEタイプ
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// 空値の扱い
///
/// 行データに値がない（キーの欠落、`null`、空文字列）ときのセルの扱いを指定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ReplaceMode {
    /// 常に書き込む（デフォルト）
    ///
    /// 値がない場合はセルを空にします（書式は保持）。
    #[default]
    Always,

    /// 空値はスキップする
    ///
    /// 値がない場合はテンプレートのセル内容をそのまま残します。
    SkipBlank,
}

/// テンプレートのドキュメント形式
///
/// `[Content_Types].xml`のワークブックのコンテンツタイプから判定します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DocumentFormat {
    /// 通常のブック（.xlsx）
    Xlsx,
    /// マクロ有効ブック（.xlsm）
    Xlsm,
    /// テンプレート（.xltx）
    Xltx,
    /// マクロ有効テンプレート（.xltm）
    Xltm,
}

impl DocumentFormat {
    /// 拡張子（ドットなし）
    pub fn extension(&self) -> &'static str {
        match self {
            DocumentFormat::Xlsx => "xlsx",
            DocumentFormat::Xlsm => "xlsm",
            DocumentFormat::Xltx => "xltx",
            DocumentFormat::Xltm => "xltm",
        }
    }

    /// MIMEタイプ
    pub fn content_type(&self) -> &'static str {
        match self {
            DocumentFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            DocumentFormat::Xlsm => "application/vnd.ms-excel.sheet.macroEnabled.12",
            DocumentFormat::Xltx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.template"
            }
            DocumentFormat::Xltm => "application/vnd.ms-excel.template.macroEnabled.12",
        }
    }

    /// ワークブックパートのコンテンツタイプから形式を判定
    pub(crate) fn from_workbook_content_type(content_type: &str) -> Self {
        let macro_enabled = content_type.contains("macroEnabled");
        let template = content_type.contains(".template");
        match (macro_enabled, template) {
            (true, true) => DocumentFormat::Xltm,
            (true, false) => DocumentFormat::Xlsm,
            (false, true) => DocumentFormat::Xltx,
            (false, false) => DocumentFormat::Xlsx,
        }
    }
}

/// 生成結果
///
/// 行が0件の場合はテンプレートそのもの、それ以外はZIPアーカイブです。
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedOutput {
    /// 元のテンプレート（バイト列は入力と同一）
    Document {
        /// ドキュメントのバイト列
        bytes: Vec<u8>,
        /// ドキュメント形式
        format: DocumentFormat,
    },

    /// 行ごとのドキュメントを格納したZIPアーカイブ
    Archive {
        /// アーカイブのバイト列
        bytes: Vec<u8>,
        /// エントリ名（行順）
        entries: Vec<String>,
    },
}

impl GeneratedOutput {
    /// レスポンス用のMIMEタイプ
    pub fn content_type(&self) -> &'static str {
        match self {
            GeneratedOutput::Document { format, .. } => format.content_type(),
            GeneratedOutput::Archive { .. } => ARCHIVE_CONTENT_TYPE,
        }
    }

    /// ダウンロード用の既定ファイル名
    pub fn file_name(&self) -> String {
        match self {
            GeneratedOutput::Document { format, .. } => format!("template.{}", format.extension()),
            GeneratedOutput::Archive { .. } => "output.zip".to_string(),
        }
    }

    /// バイト列を参照
    pub fn bytes(&self) -> &[u8] {
        match self {
            GeneratedOutput::Document { bytes, .. } | GeneratedOutput::Archive { bytes, .. } => {
                bytes
            }
        }
    }

    /// バイト列を取り出す
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            GeneratedOutput::Document { bytes, .. } | GeneratedOutput::Archive { bytes, .. } => {
                bytes
            }
        }
    }

    /// アーカイブかどうか
    pub fn is_archive(&self) -> bool {
        matches!(self, GeneratedOutput::Archive { .. })
    }
}

/// `Generator::generate_into()`の結果サマリー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSummary {
    /// テンプレートの形式
    pub format: DocumentFormat,
    /// 書き込んだアーカイブのエントリ名（行が0件の場合は空で、テンプレートがそのまま書き込まれる）
    pub entries: Vec<String>,
}

impl GenerationSummary {
    /// アーカイブを書き込んだかどうか
    pub fn is_archive(&self) -> bool {
        !self.entries.is_empty()
    }
}

/// 協調的キャンセルのためのトークン
///
/// クローンはすべて同じフラグを共有します。生成処理は行の境界ごとにフラグを確認します。
///
/// # 使用例
///
/// ```rust
/// use xlsxmerge::CancellationToken;
///
/// let token = CancellationToken::new();
/// let handle = token.clone();
/// handle.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// 未キャンセル状態のトークンを生成
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// キャンセルが要求されたか
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_format_detection() {
        assert_eq!(
            DocumentFormat::from_workbook_content_type(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"
            ),
            DocumentFormat::Xlsx
        );
        assert_eq!(
            DocumentFormat::from_workbook_content_type(
                "application/vnd.ms-excel.sheet.macroEnabled.main+xml"
            ),
            DocumentFormat::Xlsm
        );
        assert_eq!(
            DocumentFormat::from_workbook_content_type(
                "application/vnd.openxmlformats-officedocument.spreadsheetml.template.main+xml"
            ),
            DocumentFormat::Xltx
        );
        assert_eq!(
            DocumentFormat::from_workbook_content_type(
                "application/vnd.ms-excel.template.macroEnabled.main+xml"
            ),
            DocumentFormat::Xltm
        );
    }

    #[test]
    fn test_generated_output_accessors() {
        let doc = GeneratedOutput::Document {
            bytes: vec![1, 2, 3],
            format: DocumentFormat::Xlsm,
        };
        assert!(!doc.is_archive());
        assert_eq!(doc.file_name(), "template.xlsm");
        assert_eq!(doc.content_type(), "application/vnd.ms-excel.sheet.macroEnabled.12");

        let archive = GeneratedOutput::Archive {
            bytes: vec![9],
            entries: vec!["output_001.xlsx".to_string()],
        };
        assert!(archive.is_archive());
        assert_eq!(archive.content_type(), ARCHIVE_CONTENT_TYPE);
        assert_eq!(archive.into_bytes(), vec![9]);
    }

    #[test]
    fn test_cancellation_token_shared() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.clone().cancel();
        assert!(token.is_cancelled());
    }
}
