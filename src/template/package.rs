//! Package Module
//!
//! XLSXファイル（OPCパッケージ = ZIPアーカイブ）をパート単位でメモリに展開し、
//! 再びZIPとして書き出すためのモジュール。
//! リレーションシップ（`*.rels`）と`[Content_Types].xml`の解析もここで行います。

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};
use std::sync::Arc;

use quick_xml::events::Event;
use quick_xml::Reader;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::error::XlsxMergeError;
use crate::security::{check_part_name, DecompressionBudget, Limits};

pub(crate) const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const ROOT_RELS_PART: &str = "_rels/.rels";
const DEFAULT_WORKBOOK_PART: &str = "xl/workbook.xml";

const REL_OFFICE_DOCUMENT: &str = "/officeDocument";
pub(crate) const REL_WORKSHEET: &str = "/worksheet";
pub(crate) const REL_SHARED_STRINGS: &str = "/sharedStrings";

/// パッケージ内の1パート
#[derive(Debug, Clone)]
pub(crate) struct Part {
    /// パート名（例: `xl/worksheets/sheet1.xml`）
    pub name: String,
    /// 展開済みのバイト列（テンプレートと全レンダリング結果で共有）
    pub data: Arc<[u8]>,
    /// 元の圧縮方式（StoredかDeflatedのみ保持）
    pub compression: CompressionMethod,
    /// ディレクトリエントリかどうか
    pub is_dir: bool,
}

/// 展開済みのパッケージ
///
/// パートは元のZIPエントリ順で保持し、書き出し時も同じ順序を使います。
#[derive(Debug, Clone)]
pub(crate) struct Package {
    parts: Arc<[Part]>,
    index: Arc<HashMap<String, usize>>,
}

/// リレーションシップ1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
    pub external: bool,
}

impl Package {
    /// ZIPバイト列からパッケージを展開
    ///
    /// ファイル数・パートサイズ・展開後の合計サイズ・パート名をすべて検査します。
    pub fn read(bytes: &[u8], limits: &Limits) -> Result<Self, XlsxMergeError> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| XlsxMergeError::parse(format!("ZIP archive error: {}", e)))?;

        let mut budget = DecompressionBudget::new(limits, archive.len())?;
        let mut parts = Vec::with_capacity(archive.len());
        let mut index = HashMap::with_capacity(archive.len());

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| XlsxMergeError::parse(format!("ZIP archive error: {}", e)))?;

            let name = file.name().to_string();
            check_part_name(&name)?;
            budget.check_declared(&name, file.size())?;

            let compression = match file.compression() {
                CompressionMethod::Stored => CompressionMethod::Stored,
                _ => CompressionMethod::Deflated,
            };
            let is_dir = file.is_dir();

            let allowance = budget.allowance();
            let mut data = Vec::with_capacity(file.size().min(allowance) as usize);
            if !is_dir {
                // 宣言サイズは偽装できるため、実際の展開量を残り枠+1で打ち切って計上する
                (&mut file)
                    .take(allowance.saturating_add(1))
                    .read_to_end(&mut data)
                    .map_err(|e| {
                        XlsxMergeError::parse(format!("Failed to read part '{}': {}", name, e))
                    })?;
                budget.charge(&name, data.len() as u64)?;
            }

            if index.insert(name.clone(), parts.len()).is_some() {
                return Err(XlsxMergeError::parse(format!(
                    "Duplicate part name in package: {}",
                    name
                )));
            }
            parts.push(Part {
                name,
                data: data.into(),
                compression,
                is_dir,
            });
        }

        if !index.contains_key(CONTENT_TYPES_PART) {
            return Err(XlsxMergeError::parse(
                "Missing required part: [Content_Types].xml",
            ));
        }

        Ok(Self {
            parts: parts.into(),
            index: Arc::new(index),
        })
    }

    /// パート名でバイト列を取得
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.index.get(name).map(|&i| &*self.parts[i].data)
    }

    /// パート名でUTF-8文字列を取得
    pub fn get_str(&self, name: &str) -> Result<Option<&str>, XlsxMergeError> {
        match self.get(name) {
            Some(data) => std::str::from_utf8(data)
                .map(Some)
                .map_err(|e| XlsxMergeError::parse(format!("Part '{}' is not UTF-8: {}", name, e))),
            None => Ok(None),
        }
    }

    /// 必須パートをUTF-8文字列で取得
    pub fn require_str(&self, name: &str) -> Result<&str, XlsxMergeError> {
        self.get_str(name)?
            .ok_or_else(|| XlsxMergeError::parse(format!("Missing required part: {}", name)))
    }

    /// パッケージのルートリレーションシップからワークブックパート名を取得
    pub fn workbook_part_name(&self) -> Result<String, XlsxMergeError> {
        if let Some(xml) = self.get_str(ROOT_RELS_PART)? {
            let rels = parse_relationships(xml)?;
            if let Some(rel) = rels
                .iter()
                .find(|r| !r.external && r.rel_type.ends_with(REL_OFFICE_DOCUMENT))
            {
                return Ok(resolve_target("", &rel.target));
            }
        }
        Ok(DEFAULT_WORKBOOK_PART.to_string())
    }

    /// 指定パートのリレーションシップを取得（`.rels`がなければ空）
    pub fn relationships_of(&self, part_name: &str) -> Result<Vec<Relationship>, XlsxMergeError> {
        match self.get_str(&rels_part_name(part_name))? {
            Some(xml) => parse_relationships(xml),
            None => Ok(Vec::new()),
        }
    }

    /// `[Content_Types].xml`から指定パートのコンテンツタイプを取得
    pub fn content_type_of(&self, part_name: &str) -> Result<Option<String>, XlsxMergeError> {
        let xml = self.require_str(CONTENT_TYPES_PART)?;
        let wanted = format!("/{}", part_name);
        let extension = part_name.rsplit_once('.').map(|(_, ext)| ext);

        let mut reader = Reader::from_str(xml);
        let mut default_type = None;
        loop {
            match reader.read_event()? {
                Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                    b"Override" => {
                        let mut part = None;
                        let mut content_type = None;
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"PartName" => part = Some(attr.decode_and_unescape_value(&reader)?.into_owned()),
                                b"ContentType" => {
                                    content_type = Some(attr.decode_and_unescape_value(&reader)?.into_owned())
                                }
                                _ => {}
                            }
                        }
                        if part.as_deref().map(|p| p.eq_ignore_ascii_case(&wanted)) == Some(true) {
                            return Ok(content_type);
                        }
                    }
                    b"Default" => {
                        let mut ext = None;
                        let mut content_type = None;
                        for attr in e.attributes() {
                            let attr = attr?;
                            match attr.key.as_ref() {
                                b"Extension" => ext = Some(attr.decode_and_unescape_value(&reader)?.into_owned()),
                                b"ContentType" => {
                                    content_type = Some(attr.decode_and_unescape_value(&reader)?.into_owned())
                                }
                                _ => {}
                            }
                        }
                        if let (Some(ext), Some(wanted_ext)) = (ext, extension) {
                            if ext.eq_ignore_ascii_case(wanted_ext) {
                                default_type = content_type;
                            }
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }
        Ok(default_type)
    }

    /// パッケージをZIPとして書き出す
    ///
    /// `replacements`に含まれるパートは差し替えたバイト列で書き出します。
    /// タイムスタンプは固定値を使うため、同じ入力からは同じバイト列が得られます。
    pub fn write_to<W: Write + Seek>(
        &self,
        writer: W,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> Result<W, XlsxMergeError> {
        let mut zip = ZipWriter::new(writer);

        for part in self.parts.iter() {
            let options = FileOptions::default()
                .compression_method(part.compression)
                .last_modified_time(DateTime::default());

            if part.is_dir {
                zip.add_directory(part.name.as_str(), options)
                    .map_err(|e| XlsxMergeError::Archive(e.to_string()))?;
                continue;
            }

            zip.start_file(part.name.as_str(), options)
                .map_err(|e| XlsxMergeError::Archive(e.to_string()))?;
            match replacements.get(&part.name) {
                Some(data) => zip.write_all(data)?,
                None => zip.write_all(&part.data)?,
            }
        }

        zip.finish()
            .map_err(|e| XlsxMergeError::Archive(e.to_string()))
    }
}

/// パートに対応する`.rels`パート名（例: `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`）
pub(crate) fn rels_part_name(part_name: &str) -> String {
    match part_name.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part_name),
    }
}

/// リレーションシップのターゲットをパート名に解決
///
/// `source_part`からの相対パス（`worksheets/sheet1.xml`、`../x.xml`）と
/// パッケージルートからの絶対パス（`/xl/worksheets/sheet1.xml`）の両方を扱います。
pub(crate) fn resolve_target(source_part: &str, target: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let relative = match target.strip_prefix('/') {
        Some(absolute) => absolute,
        None => {
            if let Some((dir, _)) = source_part.rsplit_once('/') {
                segments.extend(dir.split('/').filter(|s| !s.is_empty()));
            }
            target
        }
    };

    for segment in relative.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

/// `.rels`パートのXMLを解析
pub(crate) fn parse_relationships(xml: &str) -> Result<Vec<Relationship>, XlsxMergeError> {
    let mut reader = Reader::from_str(xml);
    let mut relationships = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut rel_type = None;
                let mut target = None;
                let mut external = false;

                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.decode_and_unescape_value(&reader)?.into_owned()),
                        b"Type" => rel_type = Some(attr.decode_and_unescape_value(&reader)?.into_owned()),
                        b"Target" => target = Some(attr.decode_and_unescape_value(&reader)?.into_owned()),
                        b"TargetMode" => external = attr.decode_and_unescape_value(&reader)? == "External",
                        _ => {}
                    }
                }

                // IDまたはターゲットが欠落しているリレーションシップはスキップ
                if let (Some(id), Some(target)) = (id, target) {
                    relationships.push(Relationship {
                        id,
                        rel_type: rel_type.unwrap_or_default(),
                        target,
                        external,
                    });
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(relationships)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rels_part_name() {
        assert_eq!(rels_part_name("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(
            rels_part_name("xl/worksheets/sheet1.xml"),
            "xl/worksheets/_rels/sheet1.xml.rels"
        );
        assert_eq!(rels_part_name("workbook.xml"), "_rels/workbook.xml.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(
            resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"),
            "xl/worksheets/sheet1.xml"
        );
        assert_eq!(
            resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"),
            "xl/worksheets/sheet2.xml"
        );
        assert_eq!(
            resolve_target("xl/worksheets/sheet1.xml", "../drawings/drawing1.xml"),
            "xl/drawings/drawing1.xml"
        );
        assert_eq!(resolve_target("", "xl/workbook.xml"), "xl/workbook.xml");
    }

    #[test]
    fn test_parse_relationships() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://example.com/?a=1&amp;b=2" TargetMode="External"/>
  <Relationship Type="broken"/>
</Relationships>"#;

        let rels = parse_relationships(xml).unwrap();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].id, "rId1");
        assert!(rels[0].rel_type.ends_with(REL_WORKSHEET));
        assert!(!rels[0].external);
        assert_eq!(rels[1].target, "https://example.com/?a=1&b=2");
        assert!(rels[1].external);
    }

    #[test]
    fn test_read_rejects_non_zip() {
        let result = Package::read(b"not a zip file", &Limits::default());
        assert!(matches!(result, Err(XlsxMergeError::Parse(_))));
    }
}
