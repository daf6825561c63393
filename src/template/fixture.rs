//! 単体テスト用の最小構成XLSXパッケージ
//!
//! XMLを正確に制御する必要があるテストのため、`zip`で直接パッケージを組み立てます。

use std::io::{Cursor, Write};

use zip::write::FileOptions;
use zip::ZipWriter;

pub(crate) const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";

/// Sheet1: A1="Invoice"(s=1), B2="{{NAME}}", B3=100, C3=B3*2(数式), A4="{{DUP}}",
/// A5:C5は結合セル、宣言範囲はA1:D6
pub(crate) const SHEET1_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><dimension ref="A1:D6"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetFormatPr defaultRowHeight="15"/><sheetData><row r="1"><c r="A1" s="1" t="s"><v>0</v></c></row><row r="2"><c r="A2" t="s"><v>3</v></c><c r="B2" s="2" t="s"><v>1</v></c></row><row r="3"><c r="B3" s="3"><v>100</v></c><c r="C3" s="3"><f>B3*2</f><v>200</v></c></row><row r="4"><c r="A4" t="s"><v>2</v></c></row><row r="5"><c r="A5" t="s"><v>4</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A5:C5"/></mergeCells><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

const SHEET1_INLINE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:D6"/><sheetData><row r="1"><c r="A1" s="1" t="inlineStr"><is><t>Invoice</t></is></c></row><row r="2"><c r="A2" t="inlineStr"><is><t>Name</t></is></c><c r="B2" s="2" t="inlineStr"><is><t>{{NAME}}</t></is></c></row><row r="3"><c r="B3" s="3"><v>100</v></c><c r="C3" s="3"><f>B3*2</f><v>200</v></c></row><row r="4"><c r="A4" t="inlineStr"><is><t>{{DUP}}</t></is></c></row><row r="5"><c r="A5" t="inlineStr"><is><t>Notes</t></is></c></row></sheetData><mergeCells count="1"><mergeCell ref="A5:C5"/></mergeCells></worksheet>"#;

/// Data Sheet: A1="{{DUP}}"、宣言範囲はA1:B2
const SHEET2_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:B2"/><sheetData><row r="1"><c r="A1" t="s"><v>2</v></c><c r="B1"><v>1.5</v></c></row></sheetData></worksheet>"#;

const SHEET2_INLINE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:B2"/><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>{{DUP}}</t></is></c><c r="B1"><v>1.5</v></c></row></sheetData></worksheet>"#;

const SHARED_STRINGS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="6" uniqueCount="5"><si><t>Invoice</t></si><si><t>{{NAME}}</t></si><si><t>{{DUP}}</t></si><si><t>Name</t></si><si><r><rPr><b/></rPr><t>Notes</t></r></si></sst>"#;

const WORKBOOK_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><bookViews><workbookView/></bookViews><sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/><sheet name="Data Sheet" sheetId="2" r:id="rId2"/></sheets><calcPr calcId="191029"/></workbook>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><cellXfs count="4"><xf numFmtId="0"/><xf numFmtId="0" applyFont="1"/><xf numFmtId="0" applyFill="1"/><xf numFmtId="4" applyNumberFormat="1"/></cellXfs></styleSheet>"#;

/// テスト用パッケージのビルダー
pub(crate) struct FixtureBuilder {
    workbook_content_type: String,
    shared_strings: bool,
    sheet1: Option<String>,
}

impl FixtureBuilder {
    pub fn new() -> Self {
        Self {
            workbook_content_type: XLSX_CONTENT_TYPE.to_string(),
            shared_strings: true,
            sheet1: None,
        }
    }

    pub fn with_workbook_content_type(mut self, content_type: &str) -> Self {
        self.workbook_content_type = content_type.to_string();
        self
    }

    /// 共有文字列テーブルを含めない（文字列はインライン文字列になる）
    pub fn without_shared_strings(mut self) -> Self {
        self.shared_strings = false;
        self
    }

    pub fn with_sheet1(mut self, xml: &str) -> Self {
        self.sheet1 = Some(xml.to_string());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let sst_override = if self.shared_strings {
            r#"<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/>"#
        } else {
            ""
        };
        let content_types = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="{}"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/>{}</Types>"#,
            self.workbook_content_type, sst_override
        );

        let sst_rel = if self.shared_strings {
            r#"<Relationship Id="rId4" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#
        } else {
            ""
        };
        let workbook_rels = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/><Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>{}</Relationships>"#,
            sst_rel
        );

        let default_sheet1 = if self.shared_strings {
            SHEET1_XML
        } else {
            SHEET1_INLINE_XML
        };
        let sheet1 = self.sheet1.as_deref().unwrap_or(default_sheet1);
        let sheet2 = if self.shared_strings {
            SHEET2_XML
        } else {
            SHEET2_INLINE_XML
        };

        let mut parts: Vec<(&str, &str)> = vec![
            ("[Content_Types].xml", &content_types),
            ("_rels/.rels", ROOT_RELS_XML),
            ("xl/workbook.xml", WORKBOOK_XML),
            ("xl/_rels/workbook.xml.rels", &workbook_rels),
            ("xl/styles.xml", STYLES_XML),
            ("xl/worksheets/sheet1.xml", sheet1),
            ("xl/worksheets/sheet2.xml", sheet2),
        ];
        if self.shared_strings {
            parts.push(("xl/sharedStrings.xml", SHARED_STRINGS_XML));
        }
        build_package(&parts)
    }
}

/// パート名と内容の組からZIPパッケージを作成
pub(crate) fn build_package(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        zip.start_file(*name, FileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap().into_inner()
}
