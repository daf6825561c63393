//! Shared Strings Module
//!
//! `xl/sharedStrings.xml`（共有文字列テーブル）の読み書きを担当するモジュール。
//! 既存の`<si>`要素はリッチテキストを含めて原文のまま保持し、
//! レンダリング時に追加された文字列だけを末尾に追記します。

use std::collections::HashMap;
use std::sync::Arc;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::XlsxMergeError;

/// 共有文字列テーブル
///
/// 元のテーブル部分は`Arc`で全レンダリング結果と共有し、追記分のみを各ドキュメントが保持します。
#[derive(Debug, Clone, Default)]
pub(crate) struct SharedStrings {
    /// パート名（テーブルが存在しない場合は`None`）
    part_name: Option<String>,
    /// `<sst>`開始タグより前（XML宣言など）
    prolog: Arc<str>,
    /// `<sst>`開始タグの属性（count / uniqueCountを除く、エスケープ済みの原文）
    sst_attrs: Arc<str>,
    /// 名前空間プレフィックス（例: `"x:"`、通常は空）
    prefix: Arc<str>,
    /// 元の`<si>`要素の原文
    items: Arc<[String]>,
    /// 各`<si>`のプレーンテキスト（ふりがなを除く）
    texts: Arc<[String]>,
    /// 最後の`<si>`以降、`</sst>`まで（extLstなど）
    epilog: Arc<str>,
    /// プレーンテキストのみの`<si>`のテキスト -> インデックス
    lookup: Arc<HashMap<String, u32>>,
    /// レンダリング時に追記された文字列
    appended: Vec<String>,
    appended_lookup: HashMap<String, u32>,
}

impl SharedStrings {
    /// 共有文字列テーブルが存在しないパッケージ用の空テーブル
    pub fn absent() -> Self {
        Self::default()
    }

    /// `sharedStrings.xml`を解析
    pub fn parse(part_name: &str, xml: &str) -> Result<Self, XlsxMergeError> {
        let mut reader = Reader::from_str(xml);
        let bytes = xml.as_bytes();

        let mut prolog_end = 0;
        let mut sst_attrs = String::new();
        let mut prefix = String::new();
        let mut items = Vec::new();
        let mut texts = Vec::new();
        let mut lookup = HashMap::new();
        let mut epilog_start = None;
        let mut epilog_end = xml.len();

        let mut si_start = 0;
        let mut depth_in_si = 0usize;
        let mut in_t = false;
        let mut in_phonetic = false;
        let mut has_runs = false;
        let mut current_text = String::new();

        loop {
            let before = reader.buffer_position();
            let event = reader.read_event()?;
            let after = reader.buffer_position();

            match event {
                Event::Start(ref e) | Event::Empty(ref e) if e.local_name().as_ref() == b"sst" => {
                    prolog_end = before;
                    let qname = e.name();
                    prefix = qname
                        .prefix()
                        .map(|p| format!("{}:", String::from_utf8_lossy(p.as_ref())))
                        .unwrap_or_default();
                    for attr in e.attributes() {
                        let attr = attr?;
                        let key = attr.key.as_ref();
                        if key == b"count" || key == b"uniqueCount" {
                            continue;
                        }
                        sst_attrs.push(' ');
                        sst_attrs.push_str(&String::from_utf8_lossy(key));
                        sst_attrs.push_str("=\"");
                        sst_attrs.push_str(&String::from_utf8_lossy(&attr.value));
                        sst_attrs.push('"');
                    }
                    if matches!(event, Event::Empty(_)) {
                        epilog_start = Some(after);
                        epilog_end = after;
                    } else {
                        epilog_start = Some(after);
                    }
                }
                Event::Start(ref e) => match e.local_name().as_ref() {
                    b"si" if depth_in_si == 0 => {
                        si_start = before;
                        depth_in_si = 1;
                        has_runs = false;
                        current_text.clear();
                    }
                    b"r" if depth_in_si > 0 => has_runs = true,
                    b"rPh" if depth_in_si > 0 => in_phonetic = true,
                    b"t" if depth_in_si > 0 && !in_phonetic => in_t = true,
                    _ => {}
                },
                Event::Empty(ref e) if depth_in_si == 0 && e.local_name().as_ref() == b"si" => {
                    items.push(String::from_utf8_lossy(&bytes[before..after]).into_owned());
                    texts.push(String::new());
                    epilog_start = Some(after);
                }
                Event::Text(ref e) if in_t => {
                    current_text.push_str(&e.unescape()?);
                }
                Event::CData(ref e) if in_t => {
                    current_text.push_str(&String::from_utf8_lossy(e));
                }
                Event::End(ref e) => match e.local_name().as_ref() {
                    b"t" => in_t = false,
                    b"rPh" => in_phonetic = false,
                    b"si" if depth_in_si > 0 => {
                        depth_in_si = 0;
                        let index = items.len() as u32;
                        items.push(String::from_utf8_lossy(&bytes[si_start..after]).into_owned());
                        if !has_runs {
                            lookup.entry(current_text.clone()).or_insert(index);
                        }
                        texts.push(std::mem::take(&mut current_text));
                        epilog_start = Some(after);
                    }
                    b"sst" => {
                        epilog_end = after;
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        let epilog_start = epilog_start.ok_or_else(|| {
            XlsxMergeError::parse(format!("Part '{}' has no <sst> element", part_name))
        })?;
        // `</sst>`自体は書き出し時に生成する
        let closing = format!("</{}sst>", prefix);
        let mut epilog = xml[epilog_start..epilog_end].to_string();
        if let Some(stripped) = epilog.trim_end().strip_suffix(&closing) {
            epilog = stripped.to_string();
        }

        Ok(Self {
            part_name: Some(part_name.to_string()),
            prolog: xml[..prolog_end].into(),
            sst_attrs: sst_attrs.into(),
            prefix: prefix.into(),
            items: items.into(),
            texts: texts.into(),
            epilog: epilog.into(),
            lookup: Arc::new(lookup),
            appended: Vec::new(),
            appended_lookup: HashMap::new(),
        })
    }

    /// パッケージに共有文字列テーブルが存在するか
    pub fn is_present(&self) -> bool {
        self.part_name.is_some()
    }

    pub fn part_name(&self) -> Option<&str> {
        self.part_name.as_deref()
    }

    /// 文字列の総数（追記分を含む）
    pub fn len(&self) -> usize {
        self.texts.len() + self.appended.len()
    }

    /// インデックスからテキストを取得
    pub fn text(&self, index: u32) -> Option<&str> {
        let index = index as usize;
        if index < self.texts.len() {
            Some(&self.texts[index])
        } else {
            self.appended
                .get(index - self.texts.len())
                .map(|s| s.as_str())
        }
    }

    /// 文字列を登録してインデックスを返す（同一のプレーン文字列があれば再利用）
    pub fn intern(&mut self, text: &str) -> u32 {
        if let Some(&index) = self.lookup.get(text) {
            return index;
        }
        if let Some(&index) = self.appended_lookup.get(text) {
            return index;
        }
        let index = self.len() as u32;
        self.appended.push(text.to_string());
        self.appended_lookup.insert(text.to_string(), index);
        index
    }

    /// 追記があったか（書き出しが必要か）
    pub fn is_modified(&self) -> bool {
        !self.appended.is_empty()
    }

    /// `sharedStrings.xml`を再構築
    pub fn serialize(&self) -> String {
        let p = &*self.prefix;
        let mut xml = String::with_capacity(
            self.prolog.len() + self.items.iter().map(|s| s.len()).sum::<usize>() + 256,
        );
        xml.push_str(&self.prolog);
        xml.push_str(&format!(
            "<{}sst{} uniqueCount=\"{}\">",
            p,
            self.sst_attrs,
            self.len()
        ));
        for item in self.items.iter() {
            xml.push_str(item);
        }
        for text in &self.appended {
            xml.push_str(&format!(
                "<{p}si><{p}t xml:space=\"preserve\">{}</{p}t></{p}si>",
                escape_text(text),
                p = p
            ));
        }
        xml.push_str(&self.epilog);
        xml.push_str(&format!("</{}sst>", p));
        xml
    }
}

/// テキストノード用のエスケープ
///
/// 生のCRは読み込み時の改行正規化で失われるため、文字参照にする。
pub(crate) fn escape_text(text: &str) -> String {
    let escaped = escape(text);
    if escaped.contains('\r') {
        escaped.replace('\r', "&#13;")
    } else {
        escaped.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SST: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="4" uniqueCount="3"><si><t>Hello</t></si><si><r><rPr><b/></rPr><t>Bold</t></r><r><t xml:space="preserve"> text</t></r></si><si><t>漢字</t><rPh sb="0" eb="2"><t>カンジ</t></rPh></si></sst>"#;

    #[test]
    fn test_escape_text_carriage_return() {
        assert_eq!(escape_text("a\r\nb"), "a&#13;\nb");
        assert_eq!(escape_text("x < y"), "x &lt; y");
    }

    #[test]
    fn test_parse_plain_and_rich() {
        let sst = SharedStrings::parse("xl/sharedStrings.xml", SST).unwrap();
        assert!(sst.is_present());
        assert_eq!(sst.len(), 3);
        assert_eq!(sst.text(0), Some("Hello"));
        assert_eq!(sst.text(1), Some("Bold text"));
        // ふりがなは本文に含めない
        assert_eq!(sst.text(2), Some("漢字"));
        assert_eq!(sst.text(3), None);
    }

    #[test]
    fn test_intern_reuses_plain_entries() {
        let mut sst = SharedStrings::parse("xl/sharedStrings.xml", SST).unwrap();
        assert_eq!(sst.intern("Hello"), 0);
        assert!(!sst.is_modified());

        // リッチテキストと同じ文字列は再利用しない
        assert_eq!(sst.intern("Bold text"), 3);
        assert_eq!(sst.intern("Bold text"), 3);
        assert_eq!(sst.intern("New"), 4);
        assert!(sst.is_modified());
        assert_eq!(sst.text(4), Some("New"));
    }

    #[test]
    fn test_serialize_preserves_items() {
        let mut sst = SharedStrings::parse("xl/sharedStrings.xml", SST).unwrap();
        sst.intern("A & B");
        let xml = sst.serialize();

        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("uniqueCount=\"4\""));
        assert!(!xml.contains("count=\"4\" "));
        assert!(xml.contains("<r><rPr><b/></rPr><t>Bold</t></r>"));
        assert!(xml.contains("<si><t xml:space=\"preserve\">A &amp; B</t></si></sst>"));

        let reparsed = SharedStrings::parse("xl/sharedStrings.xml", &xml).unwrap();
        assert_eq!(reparsed.len(), 4);
        assert_eq!(reparsed.text(3), Some("A & B"));
    }

    #[test]
    fn test_parse_empty_table() {
        let xml = r#"<?xml version="1.0"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="0" uniqueCount="0"/>"#;
        let mut sst = SharedStrings::parse("xl/sharedStrings.xml", xml).unwrap();
        assert_eq!(sst.len(), 0);
        assert_eq!(sst.intern("x"), 0);
        let out = sst.serialize();
        assert!(out.ends_with("<si><t xml:space=\"preserve\">x</t></si></sst>"));
    }

    #[test]
    fn test_absent_table() {
        let sst = SharedStrings::absent();
        assert!(!sst.is_present());
        assert_eq!(sst.len(), 0);
    }
}
