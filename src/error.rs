//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。
//! 各バリアントは [`ErrorKind`] に対応し、呼び出し側（HTTP層など）が機械的に
//! 判別できる種別名を提供します。

use std::fmt;

use thiserror::Error;

/// xlsxmergeクレート全体で使用するエラー型
///
/// テンプレートの読み込み、マッピングの検証、バインディング解決、行のレンダリング、
/// アーカイブ出力のすべての段階で発生するエラーを統一的に扱います。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxmerge::{ErrorKind, GeneratorBuilder, XlsxMergeError};
///
/// # fn main() -> Result<(), XlsxMergeError> {
/// let generator = GeneratorBuilder::new().build()?;
/// match generator.generate(&[], r#"{"rows": []}"#) {
///     Err(e) => assert_eq!(e.kind(), ErrorKind::InvalidMappingError),
///     Ok(_) => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum XlsxMergeError {
    /// I/O操作中に発生したエラー
    ///
    /// `#[from]`属性により、`std::io::Error`から自動的に変換されます。
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// マッピングJSONの形式が不正
    ///
    /// JSONの構文エラー、必須キー（`fields`）の欠落、未定義フィールドを参照する行などで発生します。
    /// テンプレートの解析より前に検出されます。
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    /// テンプレート（XLSXパッケージ）の解析エラー
    ///
    /// ZIP構造の破損、必須パートの欠落、XMLの不正などで発生します。
    #[error("Failed to parse template: {0}")]
    Parse(String),

    /// マーカーがテンプレート内に見つからない
    #[error("Marker '{marker}' for field '{field}' was not found in the template")]
    MarkerNotFound {
        /// フィールド名
        field: String,
        /// 検索したマーカー文字列
        marker: String,
    },

    /// マーカーがテンプレート内に複数存在する
    #[error(
        "Marker '{marker}' for field '{field}' occurs {} times ({})",
        locations.len(),
        locations.join(", ")
    )]
    AmbiguousMarker {
        /// フィールド名
        field: String,
        /// 検索したマーカー文字列
        marker: String,
        /// 出現位置（`Sheet!A1`形式）
        locations: Vec<String>,
    },

    /// その他のバインディング解決エラー（未知のシート、セルの重複バインドなど）
    #[error("Binding error for field '{field}': {message}")]
    Binding {
        /// フィールド名
        field: String,
        /// エラーの詳細
        message: String,
    },

    /// 指定された名前のワークシートが存在しない
    #[error("Sheet '{0}' does not exist in the template")]
    UnknownSheet(String),

    /// シートの宣言範囲（`<dimension>`）外のセルへの書き込み
    #[error("Cell {cell} is outside the declared dimension {dimension} of sheet '{sheet}'")]
    OutOfBounds {
        /// シート名
        sheet: String,
        /// セル座標（A1記法）
        cell: String,
        /// シートの宣言範囲（A1記法）
        dimension: String,
    },

    /// 書き込み不可能なセル（結合セルの従属セル、数式セル）
    #[error("Cell {cell} on sheet '{sheet}' is not writable: {reason}")]
    UnwritableCell {
        /// シート名
        sheet: String,
        /// セル座標（A1記法）
        cell: String,
        /// 書き込めない理由
        reason: String,
    },

    /// セルに格納できない値（長すぎる文字列、XMLで使えない制御文字、非有限の数値）
    #[error("Invalid value for cell {cell}: {message}")]
    InvalidValue {
        /// セル座標（`Sheet!A1`形式）
        cell: String,
        /// エラーの詳細
        message: String,
    },

    /// 行のレンダリングに失敗した（値の変換エラーなど）
    ///
    /// 1行でも失敗すればリクエスト全体が中断されます。
    #[error("Row {row} could not be rendered: {message}")]
    Row {
        /// 行番号（1始まり）
        row: usize,
        /// エラーの詳細
        message: String,
    },

    /// リソース制限に違反したエラー
    ///
    /// テンプレートサイズ、行数、ZIP bomb対策の各上限、パストラバーサルを含みます。
    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// 出力アーカイブの書き込みエラー
    #[error("Archive error: {0}")]
    Archive(String),

    /// 設定の検証に失敗したエラー
    ///
    /// `GeneratorBuilder::build()`時に設定を検証し、無効な設定が検出された場合に発生します。
    #[error("Configuration error: {0}")]
    Config(String),

    /// キャンセルトークンによって処理が中断された
    #[error("Generation was cancelled")]
    Cancelled,
}

impl XlsxMergeError {
    /// 機械可読なエラー種別を取得
    pub fn kind(&self) -> ErrorKind {
        match self {
            XlsxMergeError::Io(_) => ErrorKind::IoError,
            XlsxMergeError::InvalidMapping(_) => ErrorKind::InvalidMappingError,
            XlsxMergeError::Parse(_) => ErrorKind::ParseError,
            XlsxMergeError::MarkerNotFound { .. } => ErrorKind::MarkerNotFoundError,
            XlsxMergeError::AmbiguousMarker { .. } => ErrorKind::AmbiguousMarkerError,
            XlsxMergeError::Binding { .. } | XlsxMergeError::UnknownSheet(_) => {
                ErrorKind::BindingError
            }
            XlsxMergeError::OutOfBounds { .. } => ErrorKind::OutOfBoundsError,
            XlsxMergeError::UnwritableCell { .. } => ErrorKind::UnwritableCellError,
            XlsxMergeError::Row { .. } | XlsxMergeError::InvalidValue { .. } => {
                ErrorKind::RowError
            }
            XlsxMergeError::ResourceLimit(_) => ErrorKind::ResourceError,
            XlsxMergeError::Archive(_) => ErrorKind::ArchiveError,
            XlsxMergeError::Config(_) => ErrorKind::ConfigError,
            XlsxMergeError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn parse(message: impl fmt::Display) -> Self {
        XlsxMergeError::Parse(message.to_string())
    }
}

impl From<quick_xml::Error> for XlsxMergeError {
    fn from(e: quick_xml::Error) -> Self {
        XlsxMergeError::Parse(format!("XML parse error: {}", e))
    }
}

impl From<quick_xml::events::attributes::AttrError> for XlsxMergeError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        XlsxMergeError::Parse(format!("XML attribute error: {}", e))
    }
}

/// エラー種別
///
/// トランスポート層へ返す機械可読な種別名です。`as_str()`の値はそのままレスポンスに使えます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// マッピングJSONが不正
    InvalidMappingError,
    /// テンプレートが不正
    ParseError,
    /// バインディング解決の失敗（下記2種を除く）
    BindingError,
    /// マーカーが見つからない
    MarkerNotFoundError,
    /// マーカーが複数存在する
    AmbiguousMarkerError,
    /// 宣言範囲外
    OutOfBoundsError,
    /// 書き込み不可セル
    UnwritableCellError,
    /// 行のレンダリング失敗
    RowError,
    /// リソース制限違反
    ResourceError,
    /// 出力アーカイブの書き込み失敗
    ArchiveError,
    /// 設定エラー
    ConfigError,
    /// I/Oエラー
    IoError,
    /// キャンセル
    Cancelled,
}

impl ErrorKind {
    /// 種別名を文字列で取得
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidMappingError => "InvalidMappingError",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::BindingError => "BindingError",
            ErrorKind::MarkerNotFoundError => "MarkerNotFoundError",
            ErrorKind::AmbiguousMarkerError => "AmbiguousMarkerError",
            ErrorKind::OutOfBoundsError => "OutOfBoundsError",
            ErrorKind::UnwritableCellError => "UnwritableCellError",
            ErrorKind::RowError => "RowError",
            ErrorKind::ResourceError => "ResourceError",
            ErrorKind::ArchiveError => "ArchiveError",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::IoError => "IoError",
            ErrorKind::Cancelled => "Cancelled",
        }
    }

    /// バインディング解決段階のエラーかどうか
    pub fn is_binding_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::BindingError
                | ErrorKind::MarkerNotFoundError
                | ErrorKind::AmbiguousMarkerError
                | ErrorKind::OutOfBoundsError
                | ErrorKind::UnwritableCellError
        )
    }

    /// 呼び出し側の入力に起因するエラー（4xx相当）かどうか
    pub fn is_input_error(&self) -> bool {
        self.is_binding_error()
            || matches!(
                self,
                ErrorKind::InvalidMappingError
                    | ErrorKind::ParseError
                    | ErrorKind::RowError
                    | ErrorKind::ResourceError
            )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
