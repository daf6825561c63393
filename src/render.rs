//! Render Module
//!
//! バインディングプランと1行分の値から、値を書き込んだドキュメントを作成するモジュール。
//!
//! テンプレートはコピーオンライトで複製されるため、複数の行を並列にレンダリングしても
//! ロックは不要です。

use std::io::{Cursor, Seek, Write};

use log::trace;

use crate::api::ReplaceMode;
use crate::binding::BindingPlan;
use crate::error::XlsxMergeError;
use crate::mapping::{DataRow, FieldValue};
use crate::template::{validate_value, Template};
use crate::types::CellValue;

/// 1行分の値を書き込んだドキュメント
///
/// アーカイブへの書き込みが終わり次第破棄されることを想定しています。
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    row: usize,
    template: Template,
}

impl RenderedDocument {
    /// 行番号（1始まり）
    pub fn row(&self) -> usize {
        self.row
    }

    /// 書き込み済みのドキュメントモデル
    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn into_template(self) -> Template {
        self.template
    }

    /// ZIPパッケージとして書き出す
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W, XlsxMergeError> {
        self.template.write_to(writer)
    }

    /// バイト列として書き出す
    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxMergeError> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }
}

/// 行レンダラー
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxmerge::{BindingPlan, DataRow, FieldDef, RowRenderer, Template};
///
/// # fn main() -> Result<(), xlsxmerge::XlsxMergeError> {
/// let template = Template::load(&std::fs::read("template.xlsx")?)?;
/// let plan = BindingPlan::resolve(&template, &[FieldDef::marker("name", "{{NAME}}")])?;
///
/// let renderer = RowRenderer::new(&template, &plan);
/// let document = renderer.render(1, &DataRow::new().with("name", "Alice"))?;
/// std::fs::write("alice.xlsx", document.to_bytes()?)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RowRenderer<'a> {
    template: &'a Template,
    plan: &'a BindingPlan,
    replace_mode: ReplaceMode,
    recalc_on_open: bool,
}

impl<'a> RowRenderer<'a> {
    /// デフォルト設定（`ReplaceMode::Always`、再計算フラグなし）のレンダラーを生成
    pub fn new(template: &'a Template, plan: &'a BindingPlan) -> Self {
        Self {
            template,
            plan,
            replace_mode: ReplaceMode::Always,
            recalc_on_open: false,
        }
    }

    /// 空値の扱いを指定
    pub fn with_replace_mode(mut self, mode: ReplaceMode) -> Self {
        self.replace_mode = mode;
        self
    }

    /// 書き出したブックを開いたときに数式を再計算させるか
    pub fn with_recalc_on_open(mut self, enabled: bool) -> Self {
        self.recalc_on_open = enabled;
        self
    }

    /// 1行をレンダリング（`row_number`は1始まり、エラーメッセージに使用）
    ///
    /// プランにないキーは無視します。値のないフィールドは`ReplaceMode`に従い、
    /// セルを空にするかテンプレートの内容を残します。
    ///
    /// # エラー
    ///
    /// 値がセルに格納できない場合（32,767文字を超える文字列、XMLで使えない制御文字）は`Row`エラーになります。
    pub fn render(
        &self,
        row_number: usize,
        row: &DataRow,
    ) -> Result<RenderedDocument, XlsxMergeError> {
        let mut document = self.template.clone();
        document.set_recalc_on_open(self.recalc_on_open);

        let mut written = 0usize;
        for binding in self.plan.bindings() {
            let value = match row.get(binding.field()) {
                Some(value) if !value.is_blank() => coerce(value),
                _ => match self.replace_mode {
                    ReplaceMode::SkipBlank => continue,
                    _ => CellValue::Blank,
                },
            };

            validate_value(&value).map_err(|message| XlsxMergeError::Row {
                row: row_number,
                message: format!(
                    "field '{}' at {}!{}: {}",
                    binding.field(),
                    binding.sheet_name(),
                    binding.coord(),
                    message
                ),
            })?;

            document.set_cell(binding.sheet, binding.coord(), &value);
            written += 1;
        }

        trace!("Rendered row {} ({} cell(s) written)", row_number, written);

        Ok(RenderedDocument {
            row: row_number,
            template: document,
        })
    }
}

/// 行の値をセル値に変換
///
/// 数値に見える文字列は数値として書き込みます。先頭が0の整数部（`"007"`など）は
/// 識別子として扱い、文字列のまま残します。
fn coerce(value: &FieldValue) -> CellValue {
    match value {
        FieldValue::Number(n) => CellValue::Number(*n),
        FieldValue::Bool(b) => CellValue::Bool(*b),
        FieldValue::Text(text) => match parse_numeric(text) {
            Some(n) => CellValue::Number(n),
            None => CellValue::Text(text.clone()),
        },
        FieldValue::Null => CellValue::Blank,
    }
}

fn parse_numeric(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let unsigned = trimmed.trim_start_matches(|c: char| c == '+' || c == '-');
    let first = unsigned.chars().next()?;
    if !(first.is_ascii_digit() || first == '.') {
        return None;
    }
    let mut digits = unsigned.chars();
    if digits.next() == Some('0') && digits.next().map_or(false, |c| c.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}
