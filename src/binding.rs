//! Binding Module
//!
//! フィールド定義をテンプレートに照合し、書き込み先セルの一覧（バインディングプラン）を作成するモジュール。
//!
//! 解決はリクエストごとに1回だけ行い、行数に関係なく同じプランを全行で再利用します。
//! マーカーの検索は全シートを1回走査するだけで済ませます。

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::error::XlsxMergeError;
use crate::mapping::{FieldDef, FieldTarget};
use crate::template::Template;
use crate::types::CellCoord;

/// 書き込み先セルとフィールド名の組
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub(crate) sheet: usize,
    sheet_name: String,
    coord: CellCoord,
    field: String,
}

impl Binding {
    /// シート名
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// セル座標
    pub fn coord(&self) -> CellCoord {
        self.coord
    }

    /// フィールド名
    pub fn field(&self) -> &str {
        &self.field
    }
}

/// 検証済みのバインディングプラン
///
/// すべての書き込み先は宣言範囲内にあり、結合セルの従属セルでも数式セルでもないことが保証されています。
/// バインディングはフィールド定義の順序を保ちます。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPlan {
    bindings: Vec<Binding>,
}

impl BindingPlan {
    /// フィールド定義をテンプレートに照合してプランを作成
    ///
    /// # エラー
    ///
    /// - マーカーが見つからない: `MarkerNotFound`
    /// - マーカーが複数存在する: `AmbiguousMarker`
    /// - 存在しないシート、同じセルへの重複バインド: `Binding`
    /// - 宣言範囲外: `OutOfBounds`
    /// - 結合セルの従属セル、数式セル: `UnwritableCell`
    pub fn resolve(template: &Template, fields: &[FieldDef]) -> Result<Self, XlsxMergeError> {
        let markers: HashSet<&str> = fields
            .iter()
            .filter_map(|f| match &f.target {
                FieldTarget::Marker(marker) => Some(marker.as_str()),
                FieldTarget::Cell { .. } => None,
            })
            .collect();
        let found = template.find_markers(&markers);

        let mut bindings = Vec::with_capacity(fields.len());
        let mut bound: HashMap<(usize, CellCoord), &str> = HashMap::new();

        for field in fields {
            let (sheet, coord) = match &field.target {
                FieldTarget::Cell { sheet, coord } => {
                    let index = match sheet {
                        Some(name) => template.sheet_index(name).ok_or_else(|| {
                            XlsxMergeError::Binding {
                                field: field.name.clone(),
                                message: format!("sheet '{}' does not exist", name),
                            }
                        })?,
                        None => 0,
                    };
                    (index, *coord)
                }
                FieldTarget::Marker(marker) => {
                    match found.get(marker.as_str()).map(|v| v.as_slice()) {
                        Some([location]) => *location,
                        Some(locations) if locations.len() > 1 => {
                            return Err(XlsxMergeError::AmbiguousMarker {
                                field: field.name.clone(),
                                marker: marker.clone(),
                                locations: locations
                                    .iter()
                                    .map(|(sheet, coord)| template.location(*sheet, *coord))
                                    .collect(),
                            })
                        }
                        _ => {
                            return Err(XlsxMergeError::MarkerNotFound {
                                field: field.name.clone(),
                                marker: marker.clone(),
                            })
                        }
                    }
                }
            };

            template.check_writable(sheet, coord)?;

            if let Some(previous) = bound.insert((sheet, coord), &field.name) {
                return Err(XlsxMergeError::Binding {
                    field: field.name.clone(),
                    message: format!(
                        "cell {} is already bound to field '{}'",
                        template.location(sheet, coord),
                        previous
                    ),
                });
            }

            bindings.push(Binding {
                sheet,
                sheet_name: template.sheet_name(sheet).to_string(),
                coord,
                field: field.name.clone(),
            });
        }

        debug!(
            "Resolved {} binding(s) ({} marker(s))",
            bindings.len(),
            markers.len()
        );

        Ok(Self { bindings })
    }

    /// バインディングの一覧（フィールド定義順）
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
