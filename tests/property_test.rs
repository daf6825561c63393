//! Property-based Tests
//!
//! `proptest`で任意の入力に対する性質を検証します。

use proptest::prelude::*;
use std::sync::OnceLock;
use xlsxmerge::{default_entry_name, CellValue, DataRow, MappingSpec, Template};

fn template() -> &'static Template {
    static TEMPLATE: OnceLock<Template> = OnceLock::new();
    TEMPLATE.get_or_init(|| {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let worksheet = workbook.add_worksheet();
        worksheet.write_string(0, 0, "Header").unwrap();
        worksheet.write_string(3, 3, "End").unwrap();
        Template::load(&workbook.save_to_buffer().unwrap()).unwrap()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // 書き込んだ文字列は書き出し後も同じ値で読める
    #[test]
    fn text_survives_write_and_reload(text in "\\PC{1,64}", row in 0u32..4, col in 0u32..4) {
        let filled = template()
            .with_cell_set("Sheet1", row, col, CellValue::Text(text.clone()))
            .unwrap();
        let reloaded = Template::load(&filled.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(reloaded.read_cell("Sheet1", row, col).unwrap(), CellValue::Text(text));
    }

    #[test]
    fn finite_numbers_survive_write_and_reload(n in any::<f64>().prop_filter("finite", |n| n.is_finite())) {
        let filled = template()
            .with_cell_set("Sheet1", 1, 1, CellValue::Number(n))
            .unwrap();
        let reloaded = Template::load(&filled.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(reloaded.read_cell("Sheet1", 1, 1).unwrap(), CellValue::Number(n));
    }

    // 書き込んだセル以外は変わらない
    #[test]
    fn write_touches_only_target_cell(text in "[a-z]{1,16}", row in 0u32..4, col in 0u32..4) {
        let filled = template()
            .with_cell_set("Sheet1", row, col, CellValue::Text(text))
            .unwrap();
        for r in 0..4 {
            for c in 0..4 {
                if (r, c) != (row, col) {
                    prop_assert_eq!(
                        filled.read_cell("Sheet1", r, c).unwrap(),
                        template().read_cell("Sheet1", r, c).unwrap()
                    );
                }
            }
        }
    }

    // デフォルト名は同じ長さで、辞書順が行順と一致する
    #[test]
    fn default_names_sort_in_row_order(total in 1usize..50_000, a in 1usize..50_000, b in 1usize..50_000) {
        let (a, b) = (a.min(total), b.min(total));
        let name_a = default_entry_name(a, total, "xlsx");
        let name_b = default_entry_name(b, total, "xlsx");
        prop_assert_eq!(name_a.len(), name_b.len());
        prop_assert_eq!(a.cmp(&b), name_a.cmp(&name_b));
    }

    // パターンから作る名前はファイル名として安全
    #[test]
    fn pattern_names_are_filesystem_safe(value in "\\PC{0,40}") {
        let mapping = MappingSpec::new(
            vec![xlsxmerge::FieldDef::marker("v", "{{V}}")],
            vec![DataRow::new().with("v", value)],
        )
        .unwrap()
        .with_naming("doc {v}")
        .unwrap();

        let pattern = mapping.naming().unwrap();
        prop_assert_eq!(pattern.as_str(), "doc {v}");

        let mut workbook = rust_xlsxwriter::Workbook::new();
        workbook.add_worksheet().write_string(0, 0, "{{V}}").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();
        let generator = xlsxmerge::GeneratorBuilder::new().build().unwrap();
        let output = generator
            .generate_mapping(&bytes, &mapping, &xlsxmerge::CancellationToken::new());

        if let Ok(xlsxmerge::GeneratedOutput::Archive { entries, .. }) = output {
            let name = &entries[0];
            prop_assert!(name.ends_with(".xlsx"));
            let stem = name.trim_end_matches(".xlsx");
            prop_assert!(!stem.is_empty());
            prop_assert!(!stem.chars().any(|c| matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')));
            prop_assert!(!stem.chars().any(char::is_whitespace));
            prop_assert!(!stem.starts_with(['_', '-', '.']));
            prop_assert!(!stem.ends_with(['_', '-', '.']));
        }
    }
}
