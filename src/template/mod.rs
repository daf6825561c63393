//! Template Module
//!
//! テンプレート（XLSXパッケージ）をメモリ上のドキュメントモデルとして扱うモジュール。
//!
//! # 構造
//!
//! - `package`: ZIPパッケージの展開と書き出し、リレーションシップ解決
//! - `sheet`: ワークシートのセル単位の読み書き
//! - `shared_strings`: 共有文字列テーブル
//!
//! [`Template`]はコピーオンライトで、`clone()`はパートのバイト列や行データを共有します。
//! セルを書き換えると、その行とシートだけが複製されます。

mod package;
mod shared_strings;
mod sheet;

#[cfg(test)]
pub(crate) mod fixture;

use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Seek, Write};
use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::api::DocumentFormat;
use crate::error::XlsxMergeError;
use crate::mapping::format_cell_address;
use crate::security::Limits;
use crate::types::{CellCoord, CellRange, CellValue};

use package::{resolve_target, Package, REL_SHARED_STRINGS, REL_WORKSHEET};
use shared_strings::SharedStrings;
use sheet::{attr_value, element_prefix, CellWrite, Sheet};

/// Excelのセルに格納できる最大文字数
pub(crate) const MAX_CELL_TEXT_LEN: usize = 32_767;

/// `<calcPr>`より後ろに置かれるワークブックの子要素
const CALC_PR_SUCCESSORS: &[&[u8]] = &[
    b"oleSize",
    b"customWorkbookViews",
    b"pivotCaches",
    b"smartTagPr",
    b"smartTagTypes",
    b"webPublishing",
    b"fileRecoveryPr",
    b"webPublishObjects",
    b"extLst",
];

#[derive(Debug)]
struct SheetMeta {
    name: String,
    part_name: String,
}

/// 読み込み済みのテンプレート
///
/// ワークシート・共有文字列テーブル・スタイル参照を保持し、任意のセルの読み取りと
/// 書式を保ったままの値の書き換えができます。書き換えていないパートは元のバイト列のまま書き出されます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxmerge::{CellValue, Template};
///
/// # fn main() -> Result<(), xlsxmerge::XlsxMergeError> {
/// let bytes = std::fs::read("template.xlsx")?;
/// let template = Template::load(&bytes)?;
///
/// // B2 (0始まりで行1・列1) に書き込んだコピーを作成
/// let filled = template.with_cell_set("Sheet1", 1, 1, CellValue::Text("Alice".into()))?;
/// assert_eq!(filled.read_cell("Sheet1", 1, 1)?, CellValue::Text("Alice".into()));
///
/// let output = filled.to_bytes()?;
/// # let _ = output;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Template {
    package: Package,
    format: DocumentFormat,
    workbook_part: Arc<str>,
    meta: Arc<[SheetMeta]>,
    sheets: Vec<Arc<Sheet>>,
    shared_strings: SharedStrings,
    recalc_on_open: bool,
}

impl Template {
    /// バイト列からテンプレートを読み込む（デフォルトのリソース制限を使用）
    ///
    /// # エラー
    ///
    /// - サイズ上限の超過・ZIP bomb・不正なパート名: `ResourceLimit`
    /// - ZIP構造の破損、必須パートの欠落、XMLの不正: `Parse`
    pub fn load(bytes: &[u8]) -> Result<Self, XlsxMergeError> {
        Self::load_with_limits(bytes, &Limits::default())
    }

    /// リソース制限を指定してテンプレートを読み込む
    pub fn load_with_limits(bytes: &[u8], limits: &Limits) -> Result<Self, XlsxMergeError> {
        limits.check_template_size(bytes.len())?;
        let package = Package::read(bytes, limits)?;

        let workbook_part = package.workbook_part_name()?;
        let workbook_xml = package.require_str(&workbook_part)?;
        let format = DocumentFormat::from_workbook_content_type(
            &package.content_type_of(&workbook_part)?.unwrap_or_default(),
        );
        let rels = package.relationships_of(&workbook_part)?;

        let mut meta = Vec::new();
        let mut sheets = Vec::new();
        for (name, rel_id) in parse_workbook_sheets(workbook_xml)? {
            let rel = rels.iter().find(|r| r.id == rel_id).ok_or_else(|| {
                XlsxMergeError::parse(format!(
                    "Sheet '{}' references unknown relationship '{}'",
                    name, rel_id
                ))
            })?;
            // グラフシート・ダイアログシートは対象外
            if rel.external || !rel.rel_type.ends_with(REL_WORKSHEET) {
                continue;
            }
            let part_name = resolve_target(&workbook_part, &rel.target);
            let sheet = Sheet::parse(&part_name, package.require_str(&part_name)?)?;
            meta.push(SheetMeta { name, part_name });
            sheets.push(Arc::new(sheet));
        }

        if sheets.is_empty() {
            return Err(XlsxMergeError::parse("Workbook contains no worksheets"));
        }

        let shared_strings = match rels
            .iter()
            .find(|r| !r.external && r.rel_type.ends_with(REL_SHARED_STRINGS))
        {
            Some(rel) => {
                let part_name = resolve_target(&workbook_part, &rel.target);
                match package.get_str(&part_name)? {
                    Some(xml) => SharedStrings::parse(&part_name, xml)?,
                    None => SharedStrings::absent(),
                }
            }
            None => SharedStrings::absent(),
        };

        for (m, sheet) in meta.iter().zip(&sheets) {
            sheet.validate_shared_indices(&m.part_name, &shared_strings)?;
        }

        Ok(Self {
            package,
            format,
            workbook_part: workbook_part.into(),
            meta: meta.into(),
            sheets,
            shared_strings,
            recalc_on_open: false,
        })
    }

    /// ドキュメント形式
    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    /// ワークシート名の一覧（ブック内の順序）
    pub fn sheet_names(&self) -> Vec<&str> {
        self.meta.iter().map(|m| m.name.as_str()).collect()
    }

    /// シートの宣言範囲
    pub fn dimension(&self, sheet: &str) -> Result<CellRange, XlsxMergeError> {
        let index = self.require_sheet(sheet)?;
        Ok(self.sheets[index].dimension())
    }

    /// セルの値を取得（行・列は0始まり）
    ///
    /// 共有文字列インデックスは解決済みの文字列として返します。セルが存在しない場合は`Blank`です。
    pub fn read_cell(&self, sheet: &str, row: u32, col: u32) -> Result<CellValue, XlsxMergeError> {
        let index = self.require_sheet(sheet)?;
        Ok(self.cell_value(index, CellCoord::new(row, col)))
    }

    /// 1セルだけを書き換えた新しいテンプレートを返す（行・列は0始まり）
    ///
    /// セルの書式（スタイル）は保持され、値だけが置き換わります。
    ///
    /// # エラー
    ///
    /// - 宣言範囲外: `OutOfBounds`
    /// - 結合セルの従属セル、数式セル: `UnwritableCell`
    /// - 格納できない値: `InvalidValue`
    pub fn with_cell_set(
        &self,
        sheet: &str,
        row: u32,
        col: u32,
        value: CellValue,
    ) -> Result<Template, XlsxMergeError> {
        let index = self.require_sheet(sheet)?;
        let coord = CellCoord::new(row, col);
        self.check_writable(index, coord)?;
        validate_value(&value).map_err(|message| XlsxMergeError::InvalidValue {
            cell: self.location(index, coord),
            message,
        })?;

        let mut template = self.clone();
        template.set_cell(index, coord, &value);
        Ok(template)
    }

    /// ZIPパッケージとして書き出す
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<W, XlsxMergeError> {
        let mut replacements = HashMap::new();
        let mut modified = false;

        for (m, sheet) in self.meta.iter().zip(&self.sheets) {
            if sheet.is_modified() {
                replacements.insert(m.part_name.clone(), sheet.serialize().into_bytes());
                modified = true;
            }
        }

        if let Some(part_name) = self.shared_strings.part_name() {
            if self.shared_strings.is_modified() {
                replacements.insert(
                    part_name.to_string(),
                    self.shared_strings.serialize().into_bytes(),
                );
            }
        }

        if modified && self.recalc_on_open {
            let xml = self.package.require_str(&self.workbook_part)?;
            replacements.insert(
                self.workbook_part.to_string(),
                enable_full_calc_on_load(xml)?.into_bytes(),
            );
        }

        self.package.write_to(writer, &replacements)
    }

    /// バイト列として書き出す
    pub fn to_bytes(&self) -> Result<Vec<u8>, XlsxMergeError> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }

    /// シート名からインデックスを取得（完全一致を優先し、なければ大文字・小文字を区別せずに検索）
    pub(crate) fn sheet_index(&self, name: &str) -> Option<usize> {
        self.meta
            .iter()
            .position(|m| m.name == name)
            .or_else(|| {
                self.meta
                    .iter()
                    .position(|m| m.name.to_lowercase() == name.to_lowercase())
            })
    }

    pub(crate) fn sheet_name(&self, index: usize) -> &str {
        &self.meta[index].name
    }

    /// `Sheet!A1`形式の位置表記（必要ならシート名を`'`で囲む）
    pub(crate) fn location(&self, index: usize, coord: CellCoord) -> String {
        format_cell_address(&self.meta[index].name, coord)
    }

    pub(crate) fn cell_value(&self, index: usize, coord: CellCoord) -> CellValue {
        self.sheets[index]
            .cell(coord)
            .map_or(CellValue::Blank, |c| c.value(&self.shared_strings))
    }

    pub(crate) fn check_writable(&self, index: usize, coord: CellCoord) -> Result<(), XlsxMergeError> {
        self.sheets[index].check_writable(&self.meta[index].name, coord)
    }

    /// 全シートを1回走査し、セルの文字列と完全一致するマーカーの出現位置を集める
    ///
    /// 出現位置はシート順・行順・列順に並びます。
    pub(crate) fn find_markers(
        &self,
        markers: &HashSet<&str>,
    ) -> HashMap<String, Vec<(usize, CellCoord)>> {
        let mut found: HashMap<String, Vec<(usize, CellCoord)>> = HashMap::new();
        if markers.is_empty() {
            return found;
        }
        for (index, sheet) in self.sheets.iter().enumerate() {
            for cell in sheet.cells() {
                if let CellValue::Text(text) = cell.value(&self.shared_strings) {
                    if markers.contains(text.as_str()) {
                        found.entry(text).or_default().push((index, cell.coord()));
                    }
                }
            }
        }
        found
    }

    /// 検証済みの値をセルに書き込む
    ///
    /// 呼び出し側で`check_writable()`と`validate_value()`を済ませておくこと。
    pub(crate) fn set_cell(&mut self, index: usize, coord: CellCoord, value: &CellValue) {
        let write = match value {
            CellValue::Text(text) if self.shared_strings.is_present() => {
                CellWrite::Shared(self.shared_strings.intern(text))
            }
            CellValue::Text(text) => CellWrite::Inline(text.clone()),
            CellValue::Number(n) => CellWrite::Number(*n),
            CellValue::Bool(b) => CellWrite::Bool(*b),
            CellValue::Error(e) => CellWrite::Error(e.clone()),
            CellValue::Blank => CellWrite::Blank,
        };
        Arc::make_mut(&mut self.sheets[index]).write_cell(coord, &write);
    }

    /// 書き出し時に`fullCalcOnLoad`を付与するか
    pub(crate) fn set_recalc_on_open(&mut self, enabled: bool) {
        self.recalc_on_open = enabled;
    }

    fn require_sheet(&self, name: &str) -> Result<usize, XlsxMergeError> {
        self.sheet_index(name)
            .ok_or_else(|| XlsxMergeError::UnknownSheet(name.to_string()))
    }
}

/// セルに格納できる値かを検証
pub(crate) fn validate_value(value: &CellValue) -> Result<(), String> {
    match value {
        CellValue::Text(text) => {
            let len = text.chars().count();
            if len > MAX_CELL_TEXT_LEN {
                return Err(format!(
                    "text has {} characters (max: {})",
                    len, MAX_CELL_TEXT_LEN
                ));
            }
            if let Some(c) = text.chars().find(|c| {
                ((*c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r'))
                    || matches!(c, '\u{FFFE}' | '\u{FFFF}')
            }) {
                return Err(format!(
                    "text contains control character U+{:04X} which cannot be stored in XML",
                    c as u32
                ));
            }
            Ok(())
        }
        CellValue::Number(n) if !n.is_finite() => Err(format!("number {} is not finite", n)),
        _ => Ok(()),
    }
}

/// ワークブックXMLから`(シート名, リレーションシップID)`を文書順に取得
fn parse_workbook_sheets(xml: &str) -> Result<Vec<(String, String)>, XlsxMergeError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr_value(e, b"name")?;
                let mut rel_id = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    // `r:id`（名前空間プレフィックスは任意）
                    if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
                        rel_id = Some(attr.decode_and_unescape_value(&reader)?.into_owned());
                    }
                }
                match (name, rel_id) {
                    (Some(name), Some(rel_id)) => sheets.push((name, rel_id)),
                    _ => {
                        return Err(XlsxMergeError::parse(
                            "Workbook <sheet> element is missing name or r:id",
                        ))
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(sheets)
}

/// ワークブックXMLの`<calcPr>`に`fullCalcOnLoad="1"`を設定
///
/// `<calcPr>`がなければスキーマ上の正しい位置に挿入します。
fn enable_full_calc_on_load(xml: &str) -> Result<String, XlsxMergeError> {
    let mut reader = Reader::from_str(xml);
    let mut depth = 0usize;
    let mut prefix = String::new();
    let mut insert_at = None;

    loop {
        let before = reader.buffer_position();
        let event = reader.read_event()?;
        let after = reader.buffer_position();

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_start = matches!(event, Event::Start(_));
                if depth == 0 {
                    prefix = element_prefix(e);
                } else if depth == 1 {
                    let name = e.local_name();
                    if name.as_ref() == b"calcPr" {
                        let tag = rebuild_calc_pr(e, &prefix, is_start)?;
                        return Ok(format!("{}{}{}", &xml[..before], tag, &xml[after..]));
                    }
                    if insert_at.is_none() && CALC_PR_SUCCESSORS.iter().any(|s| *s == name.as_ref()) {
                        insert_at = Some(before);
                    }
                }
                if is_start {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 && insert_at.is_none() {
                    insert_at = Some(before);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let position =
        insert_at.ok_or_else(|| XlsxMergeError::parse("Workbook part has no root element"))?;
    Ok(format!(
        "{}<{}calcPr fullCalcOnLoad=\"1\"/>{}",
        &xml[..position],
        prefix,
        &xml[position..]
    ))
}

fn rebuild_calc_pr(
    e: &BytesStart<'_>,
    prefix: &str,
    is_start: bool,
) -> Result<String, XlsxMergeError> {
    let mut tag = format!("<{}calcPr", prefix);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"fullCalcOnLoad" {
            continue;
        }
        tag.push(' ');
        tag.push_str(&String::from_utf8_lossy(attr.key.as_ref()));
        tag.push_str("=\"");
        tag.push_str(&String::from_utf8_lossy(&attr.value));
        tag.push('"');
    }
    tag.push_str(" fullCalcOnLoad=\"1\"");
    tag.push_str(if is_start { ">" } else { "/>" });
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::fixture::{FixtureBuilder, SHEET1_XML};
    use super::*;
    use crate::error::ErrorKind;

    fn template() -> Template {
        Template::load(&FixtureBuilder::new().build()).unwrap()
    }

    #[test]
    fn test_load_structure() {
        let t = template();
        assert_eq!(t.format(), DocumentFormat::Xlsx);
        assert_eq!(t.sheet_names(), vec!["Sheet1", "Data Sheet"]);
        assert_eq!(t.dimension("Sheet1").unwrap().to_string(), "A1:D6");
        assert_eq!(
            t.read_cell("Sheet1", 0, 0).unwrap(),
            CellValue::Text("Invoice".to_string())
        );
        assert_eq!(
            t.read_cell("Sheet1", 1, 1).unwrap(),
            CellValue::Text("{{NAME}}".to_string())
        );
        assert_eq!(t.read_cell("Sheet1", 2, 1).unwrap(), CellValue::Number(100.0));
        assert_eq!(t.read_cell("Sheet1", 4, 3).unwrap(), CellValue::Blank);
        // シート名は大文字・小文字を区別しない
        assert!(t.read_cell("data sheet", 0, 0).is_ok());
    }

    #[test]
    fn test_macro_enabled_format() {
        let bytes = FixtureBuilder::new()
            .with_workbook_content_type("application/vnd.ms-excel.sheet.macroEnabled.main+xml")
            .build();
        let t = Template::load(&bytes).unwrap();
        assert_eq!(t.format(), DocumentFormat::Xlsm);
        assert_eq!(t.format().extension(), "xlsm");
    }

    #[test]
    fn test_unknown_sheet() {
        let err = template().read_cell("Missing", 0, 0).unwrap_err();
        assert!(matches!(err, XlsxMergeError::UnknownSheet(_)));
        assert_eq!(err.kind(), ErrorKind::BindingError);
    }

    #[test]
    fn test_with_cell_set_is_pure() {
        let original = template();
        let updated = original
            .with_cell_set("Sheet1", 1, 1, CellValue::Text("Alice".to_string()))
            .unwrap();

        assert_eq!(
            updated.read_cell("Sheet1", 1, 1).unwrap(),
            CellValue::Text("Alice".to_string())
        );
        assert_eq!(
            original.read_cell("Sheet1", 1, 1).unwrap(),
            CellValue::Text("{{NAME}}".to_string())
        );
        assert!(!original.shared_strings.is_modified());
    }

    #[test]
    fn test_with_cell_set_errors() {
        let t = template();
        let out_of_bounds = t.with_cell_set("Sheet1", 10, 0, CellValue::Number(1.0));
        assert_eq!(out_of_bounds.unwrap_err().kind(), ErrorKind::OutOfBoundsError);

        // A5:C5は結合セル
        let merged = t.with_cell_set("Sheet1", 4, 1, CellValue::Number(1.0));
        assert_eq!(merged.unwrap_err().kind(), ErrorKind::UnwritableCellError);
        assert!(t.with_cell_set("Sheet1", 4, 0, CellValue::Number(1.0)).is_ok());

        // C3は数式セル
        let formula = t.with_cell_set("Sheet1", 2, 2, CellValue::Number(1.0));
        assert_eq!(formula.unwrap_err().kind(), ErrorKind::UnwritableCellError);

        let invalid = t.with_cell_set("Sheet1", 1, 1, CellValue::Text("a\u{1}b".to_string()));
        assert!(matches!(invalid, Err(XlsxMergeError::InvalidValue { .. })));
    }

    #[test]
    fn test_roundtrip_unmodified_parts() {
        let t = template();
        let updated = t
            .with_cell_set("Sheet1", 2, 1, CellValue::Number(250.5))
            .unwrap();
        let bytes = updated.to_bytes().unwrap();
        let reloaded = Template::load(&bytes).unwrap();

        assert_eq!(reloaded.read_cell("Sheet1", 2, 1).unwrap(), CellValue::Number(250.5));
        assert_eq!(
            reloaded.read_cell("Sheet1", 0, 0).unwrap(),
            CellValue::Text("Invoice".to_string())
        );
        // 変更のないシートは元のバイト列のまま
        assert_eq!(
            reloaded.package.get("xl/worksheets/sheet2.xml"),
            t.package.get("xl/worksheets/sheet2.xml")
        );
    }

    #[test]
    fn test_unmodified_template_serializes_parts_verbatim() {
        let t = template();
        let reloaded = Template::load(&t.to_bytes().unwrap()).unwrap();
        assert_eq!(
            reloaded.package.get("xl/worksheets/sheet1.xml"),
            Some(SHEET1_XML.as_bytes())
        );
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let t = template()
            .with_cell_set("Sheet1", 1, 1, CellValue::Text("Bob".to_string()))
            .unwrap();
        assert_eq!(t.to_bytes().unwrap(), t.to_bytes().unwrap());
    }

    #[test]
    fn test_inline_strings_without_shared_string_table() {
        let bytes = FixtureBuilder::new().without_shared_strings().build();
        let t = Template::load(&bytes).unwrap();
        let updated = t
            .with_cell_set("Sheet1", 1, 1, CellValue::Text("Inline".to_string()))
            .unwrap();
        let reloaded = Template::load(&updated.to_bytes().unwrap()).unwrap();
        assert_eq!(
            reloaded.read_cell("Sheet1", 1, 1).unwrap(),
            CellValue::Text("Inline".to_string())
        );
    }

    #[test]
    fn test_find_markers() {
        let t = template();
        let wanted: HashSet<&str> = ["{{NAME}}", "{{DUP}}", "{{NONE}}"].into_iter().collect();
        let found = t.find_markers(&wanted);
        assert_eq!(found["{{NAME}}"], vec![(0, CellCoord::new(1, 1))]);
        assert_eq!(found["{{DUP}}"].len(), 2);
        assert!(!found.contains_key("{{NONE}}"));
    }

    #[test]
    fn test_invalid_shared_string_index() {
        let sheet = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="1"><c r="A1" t="s"><v>99</v></c></row></sheetData></worksheet>"#;
        let bytes = FixtureBuilder::new().with_sheet1(sheet).build();
        let err = Template::load(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        assert!(err.to_string().contains("shared string 99"));
    }

    #[test]
    fn test_template_size_limit() {
        let bytes = FixtureBuilder::new().build();
        let limits = Limits::default().with_max_template_size(10);
        let err = Template::load_with_limits(&bytes, &limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceError);
    }

    #[test]
    fn test_validate_value() {
        assert!(validate_value(&CellValue::Text("tab\tand\nnewline".to_string())).is_ok());
        assert!(validate_value(&CellValue::Text("x".repeat(MAX_CELL_TEXT_LEN))).is_ok());
        assert!(validate_value(&CellValue::Text("x".repeat(MAX_CELL_TEXT_LEN + 1))).is_err());
        assert!(validate_value(&CellValue::Text("\u{0}".to_string())).is_err());
        assert!(validate_value(&CellValue::Number(f64::NAN)).is_err());
        assert!(validate_value(&CellValue::Blank).is_ok());
    }

    #[test]
    fn test_enable_full_calc_on_load_existing() {
        let xml = r#"<workbook xmlns="m"><sheets/><calcPr calcId="191029" fullCalcOnLoad="0"/></workbook>"#;
        assert_eq!(
            enable_full_calc_on_load(xml).unwrap(),
            r#"<workbook xmlns="m"><sheets/><calcPr calcId="191029" fullCalcOnLoad="1"/></workbook>"#
        );
    }

    #[test]
    fn test_enable_full_calc_on_load_inserted() {
        let xml = r#"<workbook><sheets><sheet name="a" r:id="rId1"/></sheets><extLst/></workbook>"#;
        assert_eq!(
            enable_full_calc_on_load(xml).unwrap(),
            r#"<workbook><sheets><sheet name="a" r:id="rId1"/></sheets><calcPr fullCalcOnLoad="1"/><extLst/></workbook>"#
        );

        let xml = r#"<x:workbook xmlns:x="m"><x:sheets/></x:workbook>"#;
        assert_eq!(
            enable_full_calc_on_load(xml).unwrap(),
            r#"<x:workbook xmlns:x="m"><x:sheets/><x:calcPr fullCalcOnLoad="1"/></x:workbook>"#
        );
    }

    #[test]
    fn test_recalc_flag_only_applies_to_modified_documents() {
        let mut t = template();
        t.set_recalc_on_open(true);
        let untouched = Template::load(&t.to_bytes().unwrap()).unwrap();
        let workbook = untouched.package.get_str("xl/workbook.xml").unwrap().unwrap();
        assert!(!workbook.contains("fullCalcOnLoad"));

        t.set_cell(0, CellCoord::new(2, 1), &CellValue::Number(5.0));
        let touched = Template::load(&t.to_bytes().unwrap()).unwrap();
        let workbook = touched.package.get_str("xl/workbook.xml").unwrap().unwrap();
        assert!(workbook.contains("fullCalcOnLoad=\"1\""));
    }
}
