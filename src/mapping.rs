//! Mapping Module
//!
//! マッピングJSON（フィールド定義・データ行・出力名パターン）の解析と検証を行うモジュール。
//!
//! ```json
//! {
//!   "fields": [
//!     {"name": "name", "marker": "{{NAME}}"},
//!     {"name": "amount", "cell": "Sheet1!C5"}
//!   ],
//!   "rows": [{"name": "Alice", "amount": 1200}],
//!   "naming": {"pattern": "invoice_{name}"}
//! }
//! ```
//!
//! 検証はテンプレートの解析より前にすべて完了し、失敗は`InvalidMapping`になります。

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;

use crate::error::XlsxMergeError;
use crate::naming::NamePattern;
use crate::types::CellCoord;

/// フィールドの書き込み先
#[derive(Debug, Clone, PartialEq)]
pub enum FieldTarget {
    /// セル座標（シート省略時は先頭のワークシート）
    Cell {
        /// シート名
        sheet: Option<String>,
        /// セル座標
        coord: CellCoord,
    },

    /// テンプレート内のセル文字列と完全一致するマーカー
    Marker(String),
}

/// フィールド定義
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// フィールド名（データ行のキー）
    pub name: String,
    /// 書き込み先
    pub target: FieldTarget,
}

impl FieldDef {
    /// セル座標で書き込み先を指定したフィールド
    ///
    /// `A1`、`$A$1`、`Sheet1!A1`、`'Sheet name'!A1`の形式を受け付けます。
    pub fn cell(name: impl Into<String>, address: &str) -> Result<Self, XlsxMergeError> {
        let name = name.into();
        let (sheet, coord) = parse_cell_address(address).ok_or_else(|| {
            XlsxMergeError::InvalidMapping(format!(
                "Field '{}' has invalid cell address '{}'",
                name, address
            ))
        })?;
        Ok(Self {
            name,
            target: FieldTarget::Cell { sheet, coord },
        })
    }

    /// マーカーで書き込み先を指定したフィールド
    pub fn marker(name: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: FieldTarget::Marker(marker.into()),
        }
    }
}

/// データ行の値（スカラーのみ）
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    /// `null`
    Null,
}

impl FieldValue {
    /// 空値（`null`または空文字列）かどうか
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// 出力名の埋め込みに使う文字列表現
    pub(crate) fn display_string(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(FieldValue::Number),
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// データ行（フィールド名 -> 値）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataRow {
    values: HashMap<String, FieldValue>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// 値を設定（ビルダー形式）
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.values.insert(field.into(), value.into());
        self
    }

    /// フィールドの値を取得
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// 大文字・小文字を区別せずにフィールドの値を取得（完全一致を優先）
    pub(crate) fn get_ignore_case(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field).or_else(|| {
            let lower = field.to_lowercase();
            let mut keys: Vec<&String> = self
                .values
                .keys()
                .filter(|k| k.to_lowercase() == lower)
                .collect();
            // 複数一致した場合も結果を決定的にする
            keys.sort();
            keys.first().and_then(|k| self.values.get(*k))
        })
    }
}

/// 検証済みのマッピング
#[derive(Debug, Clone, PartialEq)]
pub struct MappingSpec {
    fields: Vec<FieldDef>,
    rows: Vec<DataRow>,
    naming: Option<NamePattern>,
}

#[derive(Deserialize)]
struct RawMapping {
    fields: Vec<RawField>,
    #[serde(default)]
    rows: Vec<serde_json::Map<String, Value>>,
    #[serde(default)]
    naming: Option<RawNaming>,
}

#[derive(Deserialize)]
struct RawField {
    name: String,
    #[serde(default)]
    cell: Option<String>,
    #[serde(default)]
    marker: Option<String>,
}

#[derive(Deserialize)]
struct RawNaming {
    pattern: String,
}

impl MappingSpec {
    /// フィールド定義とデータ行から検証済みのマッピングを作成
    pub fn new(fields: Vec<FieldDef>, rows: Vec<DataRow>) -> Result<Self, XlsxMergeError> {
        let spec = Self {
            fields,
            rows,
            naming: None,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// マッピングJSONを解析・検証
    pub fn from_json(json: &str) -> Result<Self, XlsxMergeError> {
        let raw: RawMapping = serde_json::from_str(json)
            .map_err(|e| XlsxMergeError::InvalidMapping(e.to_string()))?;

        let fields = raw
            .fields
            .into_iter()
            .map(|f| match (f.cell, f.marker) {
                (Some(cell), None) => FieldDef::cell(f.name, &cell),
                (None, Some(marker)) => Ok(FieldDef::marker(f.name, marker)),
                (Some(_), Some(_)) => Err(XlsxMergeError::InvalidMapping(format!(
                    "Field '{}' must have either 'cell' or 'marker', not both",
                    f.name
                ))),
                (None, None) => Err(XlsxMergeError::InvalidMapping(format!(
                    "Field '{}' must have either 'cell' or 'marker'",
                    f.name
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = raw
            .rows
            .into_iter()
            .enumerate()
            .map(|(i, object)| -> Result<DataRow, XlsxMergeError> {
                let mut row = DataRow::new();
                for (key, value) in object {
                    let value = FieldValue::from_json(&value).ok_or_else(|| {
                        XlsxMergeError::InvalidMapping(format!(
                            "Row {} field '{}' must be a string, number, boolean or null",
                            i + 1,
                            key
                        ))
                    })?;
                    row.values.insert(key, value);
                }
                Ok(row)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut spec = Self::new(fields, rows)?;
        if let Some(naming) = raw.naming {
            spec = spec.with_naming(&naming.pattern)?;
        }
        Ok(spec)
    }

    /// 出力名パターンを設定（例: `"invoice_{name}"`）
    pub fn with_naming(mut self, pattern: &str) -> Result<Self, XlsxMergeError> {
        let pattern = NamePattern::parse(pattern)?;
        let names: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        for placeholder in pattern.placeholders() {
            let known = names.contains(placeholder)
                || names
                    .iter()
                    .any(|n| n.to_lowercase() == placeholder.to_lowercase());
            if !known {
                return Err(XlsxMergeError::InvalidMapping(format!(
                    "Naming pattern references unknown field '{}'",
                    placeholder
                )));
            }
        }
        self.naming = Some(pattern);
        Ok(self)
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn naming(&self) -> Option<&NamePattern> {
        self.naming.as_ref()
    }

    fn validate(&self) -> Result<(), XlsxMergeError> {
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(XlsxMergeError::InvalidMapping(
                    "Field name must not be empty".to_string(),
                ));
            }
            if let FieldTarget::Marker(marker) = &field.target {
                if marker.is_empty() {
                    return Err(XlsxMergeError::InvalidMapping(format!(
                        "Field '{}' has an empty marker",
                        field.name
                    )));
                }
            }
        }

        // 未定義フィールドを参照する行は、レンダリング前にまとめて拒否する
        let names: HashSet<&str> = self.fields.iter().map(|f| f.name.as_str()).collect();
        for (i, row) in self.rows.iter().enumerate() {
            let mut unknown: Vec<&str> = row.keys().filter(|k| !names.contains(k)).collect();
            if !unknown.is_empty() {
                unknown.sort_unstable();
                return Err(XlsxMergeError::InvalidMapping(format!(
                    "Row {} references unknown field(s): {}",
                    i + 1,
                    unknown.join(", ")
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for MappingSpec {
    type Err = XlsxMergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_json(s)
    }
}

/// `A1` / `$A$1` / `Sheet!A1` / `'Sheet name'!A1`形式のセルアドレスを解析
pub(crate) fn parse_cell_address(address: &str) -> Option<(Option<String>, CellCoord)> {
    let address = address.trim();
    match address.rsplit_once('!') {
        Some((sheet, cell)) => {
            let sheet = match sheet
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
            {
                Some(quoted) => quoted.replace("''", "'"),
                None => sheet.to_string(),
            };
            if sheet.is_empty() {
                return None;
            }
            Some((Some(sheet), CellCoord::parse_a1(cell)?))
        }
        None => Some((None, CellCoord::parse_a1(address)?)),
    }
}

/// `parse_cell_address()`が受け付ける形式でセル位置を表記
///
/// 英数字・`_`・`.`以外を含むシート名と数字で始まるシート名は`'`で囲みます。
pub(crate) fn format_cell_address(sheet: &str, coord: CellCoord) -> String {
    let needs_quote = sheet.starts_with(|c: char| c.is_ascii_digit())
        || sheet
            .chars()
            .any(|c| !(c.is_alphanumeric() || c == '_' || c == '.'));
    if needs_quote {
        format!("'{}'!{}", sheet.replace('\'', "''"), coord)
    } else {
        format!("{}!{}", sheet, coord)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_format_cell_address() {
        let b2 = CellCoord::new(1, 1);
        assert_eq!(format_cell_address("Sheet1", b2), "Sheet1!B2");
        assert_eq!(format_cell_address("My Sheet", b2), "'My Sheet'!B2");
        assert_eq!(format_cell_address("Bob's", b2), "'Bob''s'!B2");
        assert_eq!(format_cell_address("2024", b2), "'2024'!B2");

        for sheet in ["Sheet1", "My Sheet", "Bob's", "2024", "請求書", "a!b"] {
            assert_eq!(
                parse_cell_address(&format_cell_address(sheet, b2)),
                Some((Some(sheet.to_string()), b2)),
                "sheet: {}",
                sheet
            );
        }
    }

    #[test]
    fn test_parse_cell_address() {
        assert_eq!(
            parse_cell_address("B2"),
            Some((None, CellCoord::new(1, 1)))
        );
        assert_eq!(
            parse_cell_address("$C$5"),
            Some((None, CellCoord::new(4, 2)))
        );
        assert_eq!(
            parse_cell_address("Sheet2!A1"),
            Some((Some("Sheet2".to_string()), CellCoord::new(0, 0)))
        );
        assert_eq!(
            parse_cell_address("'My ''Data'''!D4"),
            Some((Some("My 'Data'".to_string()), CellCoord::new(3, 3)))
        );
        assert_eq!(parse_cell_address("!A1"), None);
        assert_eq!(parse_cell_address("A1:B2"), None);
        assert_eq!(parse_cell_address("Sheet1!"), None);
    }

    #[test]
    fn test_from_json() {
        let spec = MappingSpec::from_json(
            r#"{
                "fields": [
                    {"name": "name", "marker": "{{NAME}}"},
                    {"name": "amount", "cell": "Sheet1!C5"}
                ],
                "rows": [
                    {"name": "Alice", "amount": 1200},
                    {"name": null, "amount": "12.5"},
                    {}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(spec.fields().len(), 2);
        assert_eq!(spec.fields()[0].target, FieldTarget::Marker("{{NAME}}".to_string()));
        assert_eq!(
            spec.fields()[1].target,
            FieldTarget::Cell {
                sheet: Some("Sheet1".to_string()),
                coord: CellCoord::new(4, 2)
            }
        );
        assert_eq!(spec.rows().len(), 3);
        assert_eq!(spec.rows()[0].get("amount"), Some(&FieldValue::Number(1200.0)));
        assert_eq!(spec.rows()[1].get("name"), Some(&FieldValue::Null));
        assert!(spec.rows()[2].is_empty());
        assert!(spec.naming().is_none());
    }

    #[test]
    fn test_rows_default_to_empty() {
        let spec = MappingSpec::from_json(r#"{"fields": []}"#).unwrap();
        assert!(spec.rows().is_empty());
    }

    fn invalid(json: &str) -> String {
        let err = MappingSpec::from_json(json).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidMappingError);
        err.to_string()
    }

    #[test]
    fn test_invalid_mappings() {
        assert!(invalid(r#"{"rows": []}"#).contains("fields"));
        invalid("not json");
        invalid(r#"{"fields": [{"name": "a"}]}"#);
        invalid(r#"{"fields": [{"name": "a", "cell": "A1", "marker": "x"}]}"#);
        invalid(r#"{"fields": [{"name": "a", "cell": "ZZZZ1"}]}"#);
        invalid(r#"{"fields": [{"name": "", "cell": "A1"}]}"#);
        invalid(r#"{"fields": [{"name": "a", "marker": ""}]}"#);
        invalid(r#"{"fields": [{"name": "a", "cell": "A1"}], "rows": [{"a": [1, 2]}]}"#);
        invalid(r#"{"fields": [{"name": "a", "cell": "A1"}], "rows": [{"a": {"b": 1}}]}"#);
    }

    #[test]
    fn test_unknown_row_field_rejected() {
        let msg = invalid(
            r#"{"fields": [{"name": "a", "cell": "A1"}], "rows": [{"a": 1}, {"a": 2, "zz": 3, "b": 4}]}"#,
        );
        assert!(msg.contains("Row 2"));
        assert!(msg.contains("b, zz"));
    }

    #[test]
    fn test_naming_pattern() {
        let spec = MappingSpec::from_json(
            r#"{"fields": [{"name": "Name", "cell": "A1"}], "naming": {"pattern": "inv_{name}"}}"#,
        )
        .unwrap();
        assert!(spec.naming().is_some());

        let msg = invalid(
            r#"{"fields": [{"name": "a", "cell": "A1"}], "naming": {"pattern": "x_{missing}"}}"#,
        );
        assert!(msg.contains("missing"));
    }

    #[test]
    fn test_programmatic_construction() {
        let fields = vec![
            FieldDef::cell("total", "B3").unwrap(),
            FieldDef::marker("name", "{{NAME}}"),
        ];
        let rows = vec![DataRow::new().with("name", "Alice").with("total", 10.0)];
        let spec = MappingSpec::new(fields.clone(), rows).unwrap();
        assert_eq!(spec.rows()[0].get("name"), Some(&FieldValue::from("Alice")));

        let bad = MappingSpec::new(fields, vec![DataRow::new().with("other", true)]);
        assert!(bad.is_err());
    }

    #[test]
    fn test_get_ignore_case() {
        let row = DataRow::new().with("Customer", "ACME");
        assert_eq!(row.get_ignore_case("customer"), Some(&FieldValue::from("ACME")));
        assert_eq!(row.get_ignore_case("Customer"), Some(&FieldValue::from("ACME")));
        assert_eq!(row.get_ignore_case("other"), None);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Number(42.0).display_string(), "42");
        assert_eq!(FieldValue::Number(1.5).display_string(), "1.5");
        assert_eq!(FieldValue::Bool(true).display_string(), "true");
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::from("").is_blank());
        assert!(!FieldValue::from(" ").is_blank());
    }
}
