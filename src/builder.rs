//! Builder Module
//!
//! Fluent Builder APIを提供し、`Generator`インスタンスを段階的に構築する。
//! `Generator`はテンプレートとマッピングを受け取り、行ごとのドキュメントを生成するエントリーポイントです。

use std::borrow::Cow;
use std::io::{Cursor, Seek, Write};
use std::sync::Arc;

use log::{debug, info, warn};
use rayon::prelude::*;

use crate::api::{CancellationToken, DocumentFormat, GeneratedOutput, GenerationSummary, ReplaceMode};
use crate::archive::ArchivePackager;
use crate::binding::BindingPlan;
use crate::error::XlsxMergeError;
use crate::mapping::MappingSpec;
use crate::naming::OutputNamer;
use crate::render::RowRenderer;
use crate::security::Limits;
use crate::template::Template;

/// 生成処理の設定を保持する内部構造体
#[derive(Debug, Clone)]
pub(crate) struct GenerationConfig {
    /// リソース制限
    pub limits: Limits,

    /// 空値の扱い
    pub replace_mode: ReplaceMode,

    /// 専用スレッドプールのスレッド数（Noneの場合はグローバルプール）
    pub parallelism: Option<usize>,

    /// 書き換えたブックに`fullCalcOnLoad`を付与するか
    pub recalc_on_open: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            replace_mode: ReplaceMode::Always,
            parallelism: None,
            recalc_on_open: true,
        }
    }
}

/// Fluent Builder APIを提供する構造体
///
/// `Generator`インスタンスを段階的に構築するためのビルダーです。
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust
/// use xlsxmerge::{GeneratorBuilder, Limits, ReplaceMode};
///
/// # fn main() -> Result<(), xlsxmerge::XlsxMergeError> {
/// let generator = GeneratorBuilder::new()
///     .with_limits(Limits::default().with_max_rows(1000))
///     .with_replace_mode(ReplaceMode::SkipBlank)
///     .with_parallelism(Some(4))
///     .build()?;
/// # let _ = generator;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct GeneratorBuilder {
    /// 内部設定（構築中）
    config: GenerationConfig,
}

impl Default for GeneratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GeneratorBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - リソース制限: `Limits::default()`
    /// - 空値の扱い: `ReplaceMode::Always`（セルを空にする）
    /// - 並列度: rayonのグローバルスレッドプール
    /// - 開いたときの再計算: 有効
    pub fn new() -> Self {
        Self {
            config: GenerationConfig::default(),
        }
    }

    /// リソース制限を指定する
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// 行に値がないときのセルの扱いを指定する
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlsxmerge::{GeneratorBuilder, ReplaceMode};
    ///
    /// // 空値のフィールドはテンプレートの内容を残す
    /// let builder = GeneratorBuilder::new()
    ///     .with_replace_mode(ReplaceMode::SkipBlank);
    /// ```
    pub fn with_replace_mode(mut self, mode: ReplaceMode) -> Self {
        self.config.replace_mode = mode;
        self
    }

    /// レンダリングに使うスレッド数を指定する
    ///
    /// `Some(n)`の場合は`n`スレッドの専用プールを作成し、`None`の場合はrayonのグローバルプールを使います。
    /// `Some(0)`は`build()`時に`XlsxMergeError::Config`になります。
    pub fn with_parallelism(mut self, threads: Option<usize>) -> Self {
        self.config.parallelism = threads;
        self
    }

    /// 書き換えたブックを開いたときに数式を再計算させるかを指定する
    ///
    /// 有効な場合、値を書き込んだドキュメントのワークブックに`<calcPr fullCalcOnLoad="1"/>`を設定します。
    /// 書き込んだセルを参照する数式の結果が、開いた時点で更新されます。
    pub fn with_recalc_on_open(mut self, enabled: bool) -> Self {
        self.config.recalc_on_open = enabled;
        self
    }

    /// 設定を検証し、`Generator`インスタンスを生成する
    ///
    /// # 発生し得るエラー
    ///
    /// * `XlsxMergeError::Config(String)`: 設定の検証に失敗した場合
    ///   * いずれかのリソース制限が0
    ///   * スレッド数が0、またはスレッドプールの作成に失敗
    pub fn build(self) -> Result<Generator, XlsxMergeError> {
        // 1. リソース制限の検証
        self.config.limits.validate()?;

        // 2. スレッドプールの作成
        let pool = match self.config.parallelism {
            Some(0) => {
                return Err(XlsxMergeError::Config(
                    "Parallelism must be greater than zero".to_string(),
                ))
            }
            Some(threads) => Some(Arc::new(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("xlsxmerge-render-{}", i))
                    .build()
                    .map_err(|e| {
                        XlsxMergeError::Config(format!("Failed to create thread pool: {}", e))
                    })?,
            )),
            None => None,
        };

        Ok(Generator {
            config: self.config,
            pool,
        })
    }
}

/// 生成処理の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Validated,
    Resolving,
    Rendering,
    Packaging,
}

enum MappingSource<'a> {
    Json(&'a str),
    Spec(&'a MappingSpec),
}

enum Outcome {
    /// 行が0件のため、テンプレートをそのまま書き込んだ
    Original(DocumentFormat),
    Archive(DocumentFormat, Vec<String>),
}

/// 生成処理のファサード
///
/// テンプレートとマッピングから、行ごとのドキュメントを格納したアーカイブを生成します。
/// `Generator`自体は状態を持たないため、複数のリクエストから同時に使用できます。
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxmerge::{GeneratedOutput, GeneratorBuilder};
///
/// # fn main() -> Result<(), xlsxmerge::XlsxMergeError> {
/// let generator = GeneratorBuilder::new().build()?;
/// let template = std::fs::read("template.xlsx")?;
/// let mapping = r#"{
///     "fields": [{"name": "name", "marker": "{{NAME}}"}],
///     "rows": [{"name": "Alice"}, {"name": "Bob"}]
/// }"#;
///
/// match generator.generate(&template, mapping)? {
///     GeneratedOutput::Archive { bytes, entries } => {
///         assert_eq!(entries, vec!["output_001.xlsx", "output_002.xlsx"]);
///         std::fs::write("output.zip", bytes)?;
///     }
///     GeneratedOutput::Document { .. } => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Generator {
    /// 生成設定
    config: GenerationConfig,

    /// 専用スレッドプール（Noneの場合はグローバルプール）
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Generator {
    /// テンプレートとマッピングJSONからドキュメントを生成
    ///
    /// # 戻り値
    ///
    /// * 行が0件: `GeneratedOutput::Document`（入力と同一のバイト列）
    /// * それ以外: `GeneratedOutput::Archive`（`output_001.xlsx`から行順に格納）
    ///
    /// # 処理フロー
    ///
    /// 1. マッピングの検証とリソース制限の確認（テンプレートの解析前）
    /// 2. テンプレートの読み込みとバインディング解決（1回のみ）
    /// 3. 行ごとのレンダリング（並列）とアーカイブへの書き込み（行順）
    ///
    /// いずれかの段階で失敗した場合は処理全体を中断し、部分的な結果は返しません。
    pub fn generate(
        &self,
        template: &[u8],
        mapping_json: &str,
    ) -> Result<GeneratedOutput, XlsxMergeError> {
        self.generate_with_cancel(template, mapping_json, &CancellationToken::new())
    }

    /// キャンセルトークンを指定して生成
    ///
    /// トークンはバインディング解決の前と各行の境界で確認され、
    /// キャンセルされていれば`XlsxMergeError::Cancelled`を返します。
    pub fn generate_with_cancel(
        &self,
        template: &[u8],
        mapping_json: &str,
        cancel: &CancellationToken,
    ) -> Result<GeneratedOutput, XlsxMergeError> {
        self.generate_buffered(template, MappingSource::Json(mapping_json), cancel)
    }

    /// 検証済みの`MappingSpec`から生成
    pub fn generate_mapping(
        &self,
        template: &[u8],
        mapping: &MappingSpec,
        cancel: &CancellationToken,
    ) -> Result<GeneratedOutput, XlsxMergeError> {
        self.generate_buffered(template, MappingSource::Spec(mapping), cancel)
    }

    /// 生成結果を呼び出し側のライターに直接書き込む
    ///
    /// アーカイブ全体をメモリに保持しないため、大量の行を扱う場合に適しています。
    /// エラーが返された場合、ライターには途中までのデータが書き込まれている可能性があるため、
    /// 呼び出し側で破棄してください。
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use std::fs::File;
    /// use xlsxmerge::{CancellationToken, GeneratorBuilder};
    ///
    /// # fn main() -> Result<(), xlsxmerge::XlsxMergeError> {
    /// let generator = GeneratorBuilder::new().build()?;
    /// let template = std::fs::read("template.xlsx")?;
    /// let mapping = std::fs::read_to_string("mapping.json")?;
    /// let mut output = File::create("output.zip")?;
    ///
    /// let summary = generator.generate_into(&template, &mapping, &mut output, &CancellationToken::new())?;
    /// println!("{} entries", summary.entries.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn generate_into<W: Write + Seek>(
        &self,
        template: &[u8],
        mapping_json: &str,
        writer: W,
        cancel: &CancellationToken,
    ) -> Result<GenerationSummary, XlsxMergeError> {
        let (mut writer, outcome) =
            self.run(template, MappingSource::Json(mapping_json), writer, cancel)?;
        writer.flush()?;
        Ok(match outcome {
            Outcome::Original(format) => GenerationSummary {
                format,
                entries: Vec::new(),
            },
            Outcome::Archive(format, entries) => GenerationSummary { format, entries },
        })
    }

    fn generate_buffered(
        &self,
        template: &[u8],
        mapping: MappingSource<'_>,
        cancel: &CancellationToken,
    ) -> Result<GeneratedOutput, XlsxMergeError> {
        let (cursor, outcome) = self.run(template, mapping, Cursor::new(Vec::new()), cancel)?;
        let bytes = cursor.into_inner();
        Ok(match outcome {
            Outcome::Original(format) => GeneratedOutput::Document { bytes, format },
            Outcome::Archive(_, entries) => GeneratedOutput::Archive { bytes, entries },
        })
    }

    fn run<W: Write + Seek>(
        &self,
        template: &[u8],
        mapping: MappingSource<'_>,
        writer: W,
        cancel: &CancellationToken,
    ) -> Result<(W, Outcome), XlsxMergeError> {
        let mut stage = Stage::Received;
        let result = self.run_stages(template, mapping, writer, cancel, &mut stage);
        if let Err(ref e) = result {
            warn!("Generation aborted during {:?}: {} ({})", stage, e, e.kind());
        }
        result
    }

    fn run_stages<W: Write + Seek>(
        &self,
        template_bytes: &[u8],
        mapping: MappingSource<'_>,
        mut writer: W,
        cancel: &CancellationToken,
        stage: &mut Stage,
    ) -> Result<(W, Outcome), XlsxMergeError> {
        let limits = &self.config.limits;

        // Received -> Validated: マッピングの不備を先に報告し、その後に上限を検査
        let mapping: Cow<'_, MappingSpec> = match mapping {
            MappingSource::Json(json) => Cow::Owned(MappingSpec::from_json(json)?),
            MappingSource::Spec(spec) => Cow::Borrowed(spec),
        };
        limits.check_template_size(template_bytes.len())?;
        limits.check_row_count(mapping.rows().len())?;
        *stage = Stage::Validated;
        debug!(
            "Mapping validated: {} field(s), {} row(s)",
            mapping.fields().len(),
            mapping.rows().len()
        );

        // Validated -> Resolving
        check_cancelled(cancel)?;
        *stage = Stage::Resolving;
        let template = Template::load_with_limits(template_bytes, limits)?;
        let plan = BindingPlan::resolve(&template, mapping.fields())?;
        let format = template.format();
        debug!(
            "Template loaded ({:?}, {} sheet(s)); {} binding(s) resolved",
            format,
            template.sheet_names().len(),
            plan.len()
        );

        // 行が0件の場合はテンプレートをそのまま返す
        if mapping.rows().is_empty() {
            writer.write_all(template_bytes)?;
            info!("No rows supplied; returning the template unchanged");
            return Ok((writer, Outcome::Original(format)));
        }

        // Resolving -> Rendering
        *stage = Stage::Rendering;
        let mut packager = ArchivePackager::new(writer);
        self.render_rows(&template, &plan, &mapping, &mut packager, cancel)?;

        // Rendering -> Packaging
        *stage = Stage::Packaging;
        let (writer, entries) = packager.finish()?;
        info!("Generated archive with {} entr(ies)", entries.len());
        Ok((writer, Outcome::Archive(format, entries)))
    }

    /// 行をバッチ単位で並列にレンダリングし、行順にアーカイブへ書き込む
    ///
    /// 同時にメモリに存在するドキュメントは1バッチ分（スレッド数の2倍）までです。
    fn render_rows<W: Write + Seek>(
        &self,
        template: &Template,
        plan: &BindingPlan,
        mapping: &MappingSpec,
        packager: &mut ArchivePackager<W>,
        cancel: &CancellationToken,
    ) -> Result<(), XlsxMergeError> {
        let renderer = RowRenderer::new(template, plan)
            .with_replace_mode(self.config.replace_mode)
            .with_recalc_on_open(self.config.recalc_on_open);

        let rows = mapping.rows();
        let mut namer = OutputNamer::new(mapping.naming(), rows.len(), template.format().extension());
        let names: Vec<String> = rows
            .iter()
            .enumerate()
            .map(|(i, row)| namer.next_name(i + 1, row))
            .collect();

        let batch_size = self.batch_size();
        for (batch_index, batch) in rows.chunks(batch_size).enumerate() {
            let offset = batch_index * batch_size;

            // 各行の処理結果を並列に計算（インデックス付きイテレータのため順序は保たれる）
            let rendered: Vec<Result<(usize, Vec<u8>), XlsxMergeError>> = self.install(|| {
                batch
                    .par_iter()
                    .enumerate()
                    .map(|(i, row)| -> Result<(usize, Vec<u8>), XlsxMergeError> {
                        check_cancelled(cancel)?;
                        let row_number = offset + i + 1;
                        let document = renderer.render(row_number, row)?;
                        Ok((row_number, document.to_bytes()?))
                    })
                    .collect()
            });

            // 最初に失敗した行のエラーを返す
            for result in rendered {
                let (row_number, bytes) = result?;
                check_cancelled(cancel)?;
                packager.add_entry(&names[row_number - 1], &bytes)?;
            }
            debug!(
                "Packed rows {}..={} of {}",
                offset + 1,
                offset + batch.len(),
                rows.len()
            );
        }
        Ok(())
    }

    fn batch_size(&self) -> usize {
        let threads = match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        };
        (threads * 2).max(1)
    }

    fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(f),
            None => f(),
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), XlsxMergeError> {
    if cancel.is_cancelled() {
        Err(XlsxMergeError::Cancelled)
    } else {
        Ok(())
    }
}
