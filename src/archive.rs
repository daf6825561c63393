//! Archive Module
//!
//! レンダリング済みドキュメントを1つのZIPアーカイブにまとめるモジュール。
//!
//! ドキュメントは1件ずつシリアライズしてすぐに書き込むため、メモリに保持されるのは
//! 常に書き込み中の1件分だけです。エントリは追加した順に並びます。

use std::collections::HashSet;
use std::io::{Cursor, Seek, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::XlsxMergeError;
use crate::render::RenderedDocument;
use crate::security::check_part_name;
use crate::template::Template;

/// 順序付きでエントリを書き込むアーカイブライター
///
/// # 使用例
///
/// ```rust
/// use std::io::Cursor;
/// use xlsxmerge::ArchivePackager;
///
/// # fn main() -> Result<(), xlsxmerge::XlsxMergeError> {
/// let mut packager = ArchivePackager::new(Cursor::new(Vec::new()));
/// packager.add_entry("output_001.xlsx", b"...")?;
/// let (cursor, entries) = packager.finish()?;
/// assert_eq!(entries, vec!["output_001.xlsx".to_string()]);
/// assert!(!cursor.into_inner().is_empty());
/// # Ok(())
/// # }
/// ```
pub struct ArchivePackager<W: Write + Seek> {
    zip: ZipWriter<W>,
    entries: Vec<String>,
    /// 使用済みのエントリ名（大文字・小文字を区別しない）
    used: HashSet<String>,
}

impl<W: Write + Seek> ArchivePackager<W> {
    pub fn new(writer: W) -> Self {
        Self {
            zip: ZipWriter::new(writer),
            entries: Vec::new(),
            used: HashSet::new(),
        }
    }

    /// バイト列を1エントリとして追加
    ///
    /// エントリ名は空・絶対パス・`..`・バックスラッシュを含まず、アーカイブ内で一意でなければなりません。
    pub fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), XlsxMergeError> {
        check_part_name(name).map_err(|_| {
            XlsxMergeError::Archive(format!("Invalid entry name '{}'", name))
        })?;
        if !self.used.insert(name.to_lowercase()) {
            return Err(XlsxMergeError::Archive(format!(
                "Duplicate entry name '{}'",
                name
            )));
        }

        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());
        self.zip
            .start_file(name, options)
            .map_err(|e| XlsxMergeError::Archive(e.to_string()))?;
        self.zip.write_all(bytes)?;
        self.entries.push(name.to_string());
        Ok(())
    }

    /// テンプレートをシリアライズして追加
    pub fn add_template(&mut self, name: &str, template: &Template) -> Result<(), XlsxMergeError> {
        let bytes = template.to_bytes()?;
        self.add_entry(name, &bytes)
    }

    /// レンダリング済みドキュメントをシリアライズして追加
    pub fn add_document(
        &mut self,
        name: &str,
        document: &RenderedDocument,
    ) -> Result<(), XlsxMergeError> {
        self.add_template(name, document.template())
    }

    /// これまでに追加したエントリ名（追加順）
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// セントラルディレクトリを書き込み、ライターとエントリ名を返す
    pub fn finish(mut self) -> Result<(W, Vec<String>), XlsxMergeError> {
        let writer = self
            .zip
            .finish()
            .map_err(|e| XlsxMergeError::Archive(e.to_string()))?;
        Ok((writer, self.entries))
    }
}

/// `(エントリ名, ドキュメント)`の列を順にアーカイブへ書き込む
pub fn pack<I, N>(documents: I) -> Result<Vec<u8>, XlsxMergeError>
where
    I: IntoIterator<Item = (N, Template)>,
    N: AsRef<str>,
{
    let mut packager = ArchivePackager::new(Cursor::new(Vec::new()));
    for (name, template) in documents {
        packager.add_template(name.as_ref(), &template)?;
    }
    let (cursor, _) = packager.finish()?;
    Ok(cursor.into_inner())
}
