//! Worksheet Module
//!
//! ワークシートXML（`xl/worksheets/sheet*.xml`）をセル単位で書き換え可能な形に分解するモジュール。
//!
//! `<sheetData>`より前（列定義・dimensionなど）と後（結合セル・印刷設定など）は原文のまま保持し、
//! `<sheetData>`内の行・セルだけを構造化します。変更のないセルは原文のXMLをそのまま書き出すため、
//! 書き換えたセル以外の内容は変化しません。

use std::sync::Arc;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::XlsxMergeError;
use crate::types::{CellCoord, CellRange, CellValue, MergedRegion};

use super::shared_strings::{escape_text, SharedStrings};

/// セルに書き込む内容
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CellWrite {
    /// 共有文字列インデックス
    Shared(u32),
    /// インライン文字列
    Inline(String),
    Number(f64),
    Bool(bool),
    Error(String),
    /// 値を消去（書式は保持）
    Blank,
}

/// `<c>`要素
#[derive(Debug, Clone)]
pub(crate) struct Cell {
    coord: CellCoord,
    /// 変更されていないセルの原文XML（`r`属性は必ず含む）
    raw: Option<String>,
    /// `s`属性（スタイルインデックス）
    style: Option<String>,
    /// `r` / `s` / `t` / `cm` / `vm`以外の属性（` key="value"`形式の原文）
    extra_attrs: String,
    /// `t`属性
    cell_type: Option<String>,
    /// `<v>`の値
    value: Option<String>,
    /// `<is>`のテキスト
    inline_text: Option<String>,
    has_formula: bool,
}

impl Cell {
    fn new(coord: CellCoord, style: Option<String>) -> Self {
        Self {
            coord,
            raw: None,
            style,
            extra_attrs: String::new(),
            cell_type: None,
            value: None,
            inline_text: None,
            has_formula: false,
        }
    }

    pub fn coord(&self) -> CellCoord {
        self.coord
    }

    pub fn has_formula(&self) -> bool {
        self.has_formula
    }

    /// 共有文字列を解決した値を取得
    pub fn value(&self, sst: &SharedStrings) -> CellValue {
        let v = self.value.as_deref();
        match self.cell_type.as_deref() {
            Some("s") => v
                .and_then(|v| v.trim().parse::<u32>().ok())
                .and_then(|i| sst.text(i))
                .map(|s| CellValue::Text(s.to_string()))
                .unwrap_or(CellValue::Blank),
            Some("inlineStr") => match &self.inline_text {
                Some(text) => CellValue::Text(text.clone()),
                None => v.map_or(CellValue::Blank, |v| CellValue::Text(v.to_string())),
            },
            Some("str") | Some("d") => v.map_or(CellValue::Blank, |v| CellValue::Text(v.to_string())),
            Some("b") => v.map_or(CellValue::Blank, |v| {
                CellValue::Bool(matches!(v.trim(), "1" | "true"))
            }),
            Some("e") => v.map_or(CellValue::Blank, |v| CellValue::Error(v.to_string())),
            _ => match v {
                Some(v) => v
                    .trim()
                    .parse::<f64>()
                    .map(CellValue::Number)
                    .unwrap_or_else(|_| CellValue::Text(v.to_string())),
                None => CellValue::Blank,
            },
        }
    }

    /// 共有文字列インデックス（`t="s"`の場合のみ）
    fn shared_index(&self) -> Option<Result<u32, String>> {
        if self.cell_type.as_deref() != Some("s") {
            return None;
        }
        let v = self.value.as_deref()?;
        Some(
            v.trim()
                .parse::<u32>()
                .map_err(|_| format!("invalid shared string index '{}'", v)),
        )
    }

    fn apply(&mut self, write: &CellWrite) {
        self.raw = None;
        self.has_formula = false;
        self.inline_text = None;
        let (cell_type, value) = match write {
            CellWrite::Shared(index) => (Some("s"), Some(index.to_string())),
            CellWrite::Inline(text) => {
                self.inline_text = Some(text.clone());
                (Some("inlineStr"), None)
            }
            CellWrite::Number(n) => (None, Some(format_number(*n))),
            CellWrite::Bool(b) => (Some("b"), Some(if *b { "1" } else { "0" }.to_string())),
            CellWrite::Error(e) => (Some("e"), Some(e.clone())),
            CellWrite::Blank => (None, None),
        };
        self.cell_type = cell_type.map(str::to_string);
        self.value = value;
    }

    fn serialize_into(&self, out: &mut String, p: &str) {
        if let Some(raw) = &self.raw {
            out.push_str(raw);
            return;
        }

        out.push_str(&format!("<{}c r=\"{}\"", p, self.coord));
        if let Some(style) = &self.style {
            out.push_str(&format!(" s=\"{}\"", style));
        }
        out.push_str(&self.extra_attrs);
        if let Some(t) = &self.cell_type {
            out.push_str(&format!(" t=\"{}\"", t));
        }

        match (&self.inline_text, &self.value) {
            (Some(text), _) => out.push_str(&format!(
                "><{p}is><{p}t xml:space=\"preserve\">{}</{p}t></{p}is></{p}c>",
                escape_text(text),
                p = p
            )),
            (None, Some(value)) => out.push_str(&format!(
                "><{p}v>{}</{p}v></{p}c>",
                escape(value.as_str()),
                p = p
            )),
            (None, None) => out.push_str("/>"),
        }
    }
}

/// `<row>`要素
#[derive(Debug, Clone)]
pub(crate) struct Row {
    index: u32,
    /// 開始タグの原文（自己終了タグは開始タグ形式に正規化、`r`属性は必ず含む）
    open_tag: String,
    /// `customFormat="1"`の行スタイル
    style: Option<String>,
    cells: Vec<Cell>,
}

/// `<col>`要素のスタイル指定（列インデックスは0始まり、両端を含む）
#[derive(Debug, Clone)]
struct ColumnStyle {
    min: u32,
    max: u32,
    style: String,
}

/// 構造化されたワークシート
#[derive(Debug, Clone)]
pub(crate) struct Sheet {
    /// `<sheetData>`開始タグまで（開始タグを含む）
    head: Arc<str>,
    /// `</sheetData>`以降（終了タグを含む）
    tail: Arc<str>,
    prefix: Arc<str>,
    rows: Vec<Arc<Row>>,
    dimension: CellRange,
    merged: Arc<[MergedRegion]>,
    column_styles: Arc<[ColumnStyle]>,
    modified: bool,
}

#[derive(Default)]
struct CellBuilder {
    start: usize,
    cell: Option<Cell>,
    patch_ref: bool,
    in_v: bool,
    in_is: bool,
    in_t: bool,
    in_phonetic: bool,
}

impl Sheet {
    /// ワークシートXMLを解析
    pub fn parse(part_name: &str, xml: &str) -> Result<Self, XlsxMergeError> {
        let mut reader = Reader::from_str(xml);
        let bytes = xml.as_bytes();

        let mut head: Option<String> = None;
        let mut tail: Option<String> = None;
        let mut prefix = String::new();
        let mut in_sheet_data = false;
        let mut in_cols = false;

        let mut declared_dimension = None;
        let mut merged = Vec::new();
        let mut column_styles = Vec::new();
        let mut rows: Vec<Row> = Vec::new();
        let mut current_row: Option<Row> = None;
        let mut builder = CellBuilder::default();

        loop {
            let before = reader.buffer_position();
            let event = reader.read_event()?;
            let after = reader.buffer_position();

            match event {
                Event::Start(ref e) | Event::Empty(ref e) if !in_sheet_data => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"sheetData" if head.is_none() => {
                            prefix = element_prefix(e);
                            if is_empty {
                                head = Some(format!("{}<{}sheetData>", &xml[..before], prefix));
                                tail = Some(format!("</{}sheetData>{}", prefix, &xml[after..]));
                            } else {
                                head = Some(xml[..after].to_string());
                                in_sheet_data = true;
                            }
                        }
                        b"dimension" => {
                            declared_dimension = attr_value(e, b"ref")?
                                .and_then(|r| CellRange::parse_ref(&r));
                        }
                        b"cols" => in_cols = !is_empty,
                        b"col" if in_cols => {
                            if let Some(style) = parse_column_style(e)? {
                                column_styles.push(style);
                            }
                        }
                        b"mergeCell" => {
                            if let Some(range) =
                                attr_value(e, b"ref")?.and_then(|r| CellRange::parse_ref(&r))
                            {
                                merged.push(MergedRegion::new(range));
                            }
                        }
                        _ => {}
                    }
                }
                Event::End(ref e) if !in_sheet_data => {
                    if e.local_name().as_ref() == b"cols" {
                        in_cols = false;
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e) if builder.cell.is_none() => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"row" => {
                            let next_index = rows.last().map_or(0, |r| r.index + 1);
                            let row = parse_row(e, &xml[before..after], &prefix, next_index)?;
                            if is_empty {
                                rows.push(row);
                            } else {
                                current_row = Some(row);
                            }
                        }
                        b"c" => {
                            let row = current_row.as_ref().ok_or_else(|| {
                                XlsxMergeError::parse(format!(
                                    "Cell outside of <row> in '{}'",
                                    part_name
                                ))
                            })?;
                            let next_col = row.cells.last().map_or(0, |c| c.coord.col + 1);
                            let (cell, patch_ref) = parse_cell_start(e, row.index, next_col)?;
                            builder = CellBuilder {
                                start: before,
                                cell: Some(cell),
                                patch_ref,
                                ..CellBuilder::default()
                            };
                            if is_empty {
                                finish_cell(&mut builder, &mut current_row, bytes, after, &prefix);
                            }
                        }
                        _ => {}
                    }
                }
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    match e.local_name().as_ref() {
                        b"v" if !is_empty => builder.in_v = true,
                        b"f" => {
                            if let Some(cell) = builder.cell.as_mut() {
                                cell.has_formula = true;
                            }
                        }
                        b"is" if !is_empty => builder.in_is = true,
                        b"rPh" if !is_empty => builder.in_phonetic = true,
                        b"t" if !is_empty && builder.in_is && !builder.in_phonetic => {
                            builder.in_t = true
                        }
                        _ => {}
                    }
                }
                Event::Text(ref e) if builder.in_v || builder.in_t => {
                    let text = e.unescape()?;
                    push_cell_text(&mut builder, &text);
                }
                Event::CData(ref e) if builder.in_v || builder.in_t => {
                    let text = String::from_utf8_lossy(e).into_owned();
                    push_cell_text(&mut builder, &text);
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"v" => builder.in_v = false,
                    b"t" => builder.in_t = false,
                    b"rPh" => builder.in_phonetic = false,
                    b"is" => builder.in_is = false,
                    b"c" if builder.cell.is_some() => {
                        finish_cell(&mut builder, &mut current_row, bytes, after, &prefix);
                    }
                    b"row" => {
                        if let Some(row) = current_row.take() {
                            rows.push(row);
                        }
                    }
                    b"sheetData" => {
                        tail = Some(xml[before..].to_string());
                        in_sheet_data = false;
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        let (head, tail) = match (head, tail) {
            (Some(head), Some(tail)) => (head, tail),
            _ => {
                return Err(XlsxMergeError::parse(format!(
                    "Worksheet '{}' has no <sheetData> element",
                    part_name
                )))
            }
        };

        // Excelは昇順の行・列を要求するが、順序が乱れたファイルにも対応する
        rows.sort_by_key(|r| r.index);
        for row in rows.iter_mut() {
            row.cells.sort_by_key(|c| c.coord.col);
        }

        let dimension = declared_dimension.unwrap_or_else(|| used_range(&rows));

        Ok(Self {
            head: head.into(),
            tail: tail.into(),
            prefix: prefix.into(),
            rows: rows.into_iter().map(Arc::new).collect(),
            dimension,
            merged: merged.into(),
            column_styles: column_styles.into(),
            modified: false,
        })
    }

    /// 宣言範囲（`<dimension>`、なければ使用範囲）
    pub fn dimension(&self) -> CellRange {
        self.dimension
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// すべてのセルを行順・列順に走査
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.rows.iter().flat_map(|r| r.cells.iter())
    }

    /// 指定座標のセルを取得
    pub fn cell(&self, coord: CellCoord) -> Option<&Cell> {
        let row = self
            .rows
            .binary_search_by_key(&coord.row, |r| r.index)
            .ok()
            .map(|i| &self.rows[i])?;
        row.cells
            .binary_search_by_key(&coord.col, |c| c.coord.col)
            .ok()
            .map(|i| &row.cells[i])
    }

    /// 共有文字列インデックスがテーブル内に収まっているか検証
    pub fn validate_shared_indices(
        &self,
        part_name: &str,
        sst: &SharedStrings,
    ) -> Result<(), XlsxMergeError> {
        for cell in self.cells() {
            match cell.shared_index() {
                Some(Ok(index)) if (index as usize) < sst.len() => {}
                Some(Ok(index)) => {
                    return Err(XlsxMergeError::parse(format!(
                        "Cell {} in '{}' references shared string {} but the table has {} entries",
                        cell.coord,
                        part_name,
                        index,
                        sst.len()
                    )))
                }
                Some(Err(message)) => {
                    return Err(XlsxMergeError::parse(format!(
                        "Cell {} in '{}': {}",
                        cell.coord, part_name, message
                    )))
                }
                None => {}
            }
        }
        Ok(())
    }

    /// 書き込み可能なセルかを検証
    ///
    /// 宣言範囲外は`OutOfBounds`、結合セルの従属セルと数式セルは`UnwritableCell`になります。
    pub fn check_writable(&self, sheet_name: &str, coord: CellCoord) -> Result<(), XlsxMergeError> {
        if !self.dimension.contains(coord) {
            return Err(XlsxMergeError::OutOfBounds {
                sheet: sheet_name.to_string(),
                cell: coord.to_a1_notation(),
                dimension: self.dimension.to_string(),
            });
        }

        if let Some(region) = self.merged.iter().find(|m| m.is_secondary(coord)) {
            return Err(XlsxMergeError::UnwritableCell {
                sheet: sheet_name.to_string(),
                cell: coord.to_a1_notation(),
                reason: format!(
                    "cell is inside merged range {} whose anchor is {}",
                    region.range, region.parent
                ),
            });
        }

        if self.cell(coord).map_or(false, Cell::has_formula) {
            return Err(XlsxMergeError::UnwritableCell {
                sheet: sheet_name.to_string(),
                cell: coord.to_a1_notation(),
                reason: "cell contains a formula".to_string(),
            });
        }

        Ok(())
    }

    /// セルの値を書き換える（書式は保持）
    ///
    /// セル要素が存在しない場合は行スタイルまたは列スタイルを引き継いで新規作成します。
    /// 呼び出し側で`check_writable()`を済ませておくこと。
    pub fn write_cell(&mut self, coord: CellCoord, write: &CellWrite) {
        self.modified = true;

        let row_pos = match self.rows.binary_search_by_key(&coord.row, |r| r.index) {
            Ok(pos) => pos,
            Err(pos) => {
                let row = Row {
                    index: coord.row,
                    open_tag: format!("<{}row r=\"{}\">", self.prefix, coord.row + 1),
                    style: None,
                    cells: Vec::new(),
                };
                self.rows.insert(pos, Arc::new(row));
                pos
            }
        };

        let column_style = self
            .column_styles
            .iter()
            .find(|c| c.min <= coord.col && coord.col <= c.max)
            .map(|c| c.style.clone());

        let row = Arc::make_mut(&mut self.rows[row_pos]);
        let cell_pos = match row.cells.binary_search_by_key(&coord.col, |c| c.coord.col) {
            Ok(pos) => pos,
            Err(pos) => {
                let style = row.style.clone().or(column_style);
                row.cells.insert(pos, Cell::new(coord, style));
                pos
            }
        };
        row.cells[cell_pos].apply(write);
    }

    /// `<sheetData>`を再構築したワークシートXML
    pub fn serialize(&self) -> String {
        let p = &*self.prefix;
        let mut xml = String::with_capacity(self.head.len() + self.tail.len() + self.rows.len() * 64);
        xml.push_str(&self.head);
        for row in &self.rows {
            xml.push_str(&row.open_tag);
            for cell in &row.cells {
                cell.serialize_into(&mut xml, p);
            }
            xml.push_str(&format!("</{}row>", p));
        }
        xml.push_str(&self.tail);
        xml
    }
}

/// 数値をXMLの`<v>`表現に変換
pub(crate) fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if (1e-5..1e16).contains(&abs) {
        n.to_string()
    } else {
        format!("{:e}", n)
    }
}

pub(super) fn element_prefix(e: &BytesStart<'_>) -> String {
    e.name()
        .prefix()
        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
        .unwrap_or_default()
}

/// UTF-8として属性値をデコード・アンエスケープ（quick-xmlの`encoding`機能の有無に依存しない）
fn unescape_attr<'a>(
    attr: &quick_xml::events::attributes::Attribute<'a>,
) -> Result<std::borrow::Cow<'a, str>, quick_xml::Error> {
    attr.decode_and_unescape_value(&Reader::from_str(""))
}

pub(super) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, XlsxMergeError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(unescape_attr(&attr)?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_column_style(e: &BytesStart<'_>) -> Result<Option<ColumnStyle>, XlsxMergeError> {
    let min = attr_value(e, b"min")?.and_then(|v| v.parse::<u32>().ok());
    let max = attr_value(e, b"max")?.and_then(|v| v.parse::<u32>().ok());
    let style = attr_value(e, b"style")?;
    match (min, max, style) {
        // Excelの列番号は1始まりなので、0始まりに変換
        (Some(min), Some(max), Some(style)) if min >= 1 && max >= min && style != "0" => {
            Ok(Some(ColumnStyle {
                min: min - 1,
                max: max - 1,
                style,
            }))
        }
        _ => Ok(None),
    }
}

fn parse_row(
    e: &BytesStart<'_>,
    raw: &str,
    prefix: &str,
    next_index: u32,
) -> Result<Row, XlsxMergeError> {
    let mut index = None;
    let mut style = None;
    let mut custom_format = false;
    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                let value = unescape_attr(&attr)?;
                let r: u32 = value.trim().parse().map_err(|_| {
                    XlsxMergeError::parse(format!("Invalid row number '{}'", value))
                })?;
                if r == 0 {
                    return Err(XlsxMergeError::parse("Row number 0 is not allowed"));
                }
                index = Some(r - 1);
            }
            b"s" => style = Some(unescape_attr(&attr)?.into_owned()),
            b"customFormat" => {
                custom_format = matches!(unescape_attr(&attr)?.as_ref(), "1" | "true")
            }
            _ => {}
        }
    }

    // 自己終了タグは開始タグ形式に正規化
    let mut open_tag = match raw.strip_suffix("/>") {
        Some(stripped) => format!("{}>", stripped.trim_end()),
        None => raw.to_string(),
    };

    let index = match index {
        Some(index) => index,
        None => {
            let tag = format!("<{}row", prefix);
            open_tag.insert_str(tag.len(), &format!(" r=\"{}\"", next_index + 1));
            next_index
        }
    };

    Ok(Row {
        index,
        open_tag,
        style: if custom_format { style } else { None },
        cells: Vec::new(),
    })
}

fn parse_cell_start(
    e: &BytesStart<'_>,
    row_index: u32,
    next_col: u32,
) -> Result<(Cell, bool), XlsxMergeError> {
    let mut coord = None;
    let mut style = None;
    let mut cell_type = None;
    let mut extra_attrs = String::new();

    for attr in e.attributes() {
        let attr = attr?;
        match attr.key.as_ref() {
            b"r" => {
                let value = unescape_attr(&attr)?;
                coord = Some(CellCoord::parse_a1(&value).ok_or_else(|| {
                    XlsxMergeError::parse(format!("Invalid cell reference '{}'", value))
                })?);
            }
            b"s" => style = Some(unescape_attr(&attr)?.into_owned()),
            b"t" => cell_type = Some(unescape_attr(&attr)?.into_owned()),
            b"cm" | b"vm" => {}
            key => {
                extra_attrs.push(' ');
                extra_attrs.push_str(&String::from_utf8_lossy(key));
                extra_attrs.push_str("=\"");
                extra_attrs.push_str(&String::from_utf8_lossy(&attr.value));
                extra_attrs.push('"');
            }
        }
    }

    let patch_ref = coord.is_none();
    let coord = coord.unwrap_or_else(|| CellCoord::new(row_index, next_col));
    let mut cell = Cell::new(coord, style);
    cell.extra_attrs = extra_attrs;
    cell.cell_type = cell_type;
    Ok((cell, patch_ref))
}

fn push_cell_text(builder: &mut CellBuilder, text: &str) {
    let in_v = builder.in_v;
    if let Some(cell) = builder.cell.as_mut() {
        let target = if in_v {
            &mut cell.value
        } else {
            &mut cell.inline_text
        };
        target.get_or_insert_with(String::new).push_str(text);
    }
}

fn finish_cell(
    builder: &mut CellBuilder,
    current_row: &mut Option<Row>,
    bytes: &[u8],
    end: usize,
    prefix: &str,
) {
    let state = std::mem::take(builder);
    if let (Some(mut cell), Some(row)) = (state.cell, current_row.as_mut()) {
        let mut raw = String::from_utf8_lossy(&bytes[state.start..end]).into_owned();
        if state.patch_ref {
            // `r`属性のないセルは位置で列が決まるため、明示的な参照を補う
            let tag = format!("<{}c", prefix);
            raw.insert_str(tag.len(), &format!(" r=\"{}\"", cell.coord));
        }
        cell.raw = Some(raw);
        row.cells.push(cell);
    }
}

fn used_range(rows: &[Row]) -> CellRange {
    let mut cells = rows.iter().flat_map(|r| r.cells.iter().map(|c| c.coord));
    let first = match cells.next() {
        Some(first) => first,
        None => return CellRange::new(CellCoord::new(0, 0), CellCoord::new(0, 0)),
    };
    let (mut start, mut end) = (first, first);
    for coord in cells {
        start.row = start.row.min(coord.row);
        start.col = start.col.min(coord.col);
        end.row = end.row.max(coord.row);
        end.col = end.col.max(coord.col);
    }
    CellRange::new(start, end)
}
