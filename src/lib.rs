//! xlsxmerge - Pure-Rust XLSX template filler
//!
//! This crate fills an Excel template (XLSX/XLSM/XLTX/XLTM) with one row of data per
//! output document and packs the results into a single ZIP archive. Cell styles, merged
//! regions, formulas and every part the engine does not touch are preserved byte for byte.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use xlsxmerge::{GeneratedOutput, GeneratorBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create a generator with default settings
//!     let generator = GeneratorBuilder::new().build()?;
//!
//!     let template = std::fs::read("invoice_template.xlsx")?;
//!     let mapping = r#"{
//!         "fields": [
//!             {"name": "customer", "marker": "{{CUSTOMER}}"},
//!             {"name": "amount", "cell": "Sheet1!C5"}
//!         ],
//!         "rows": [
//!             {"customer": "ACME", "amount": 1200},
//!             {"customer": "Globex", "amount": 880.5}
//!         ]
//!     }"#;
//!
//!     let output = generator.generate(&template, mapping)?;
//!     std::fs::write(output.file_name(), output.bytes())?;
//!
//!     if let GeneratedOutput::Archive { entries, .. } = output {
//!         // ["output_001.xlsx", "output_002.xlsx"]
//!         println!("{:?}", entries);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Custom Configuration
//!
//! ```rust,no_run
//! use std::fs::File;
//! use xlsxmerge::{CancellationToken, GeneratorBuilder, Limits, ReplaceMode};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let generator = GeneratorBuilder::new()
//!         .with_limits(Limits::default().with_max_rows(50_000))
//!         .with_replace_mode(ReplaceMode::SkipBlank) // keep template text for empty values
//!         .with_parallelism(Some(4))
//!         .build()?;
//!
//!     let template = std::fs::read("template.xlsx")?;
//!     let mapping = std::fs::read_to_string("mapping.json")?;
//!
//!     // Stream the archive straight to disk
//!     let output = File::create("output.zip")?;
//!     let summary = generator.generate_into(&template, &mapping, output, &CancellationToken::new())?;
//!     println!("{} document(s)", summary.entries.len());
//!     Ok(())
//! }
//! ```
//!
//! # Lower-level API
//!
//! The stages the generator runs are also available on their own:
//!
//! ```rust,no_run
//! use xlsxmerge::{pack, BindingPlan, DataRow, FieldDef, RowRenderer, Template};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let template = Template::load(&std::fs::read("template.xlsx")?)?;
//! let plan = BindingPlan::resolve(&template, &[FieldDef::marker("name", "{{NAME}}")])?;
//! let renderer = RowRenderer::new(&template, &plan);
//!
//! let alice = renderer.render(1, &DataRow::new().with("name", "Alice"))?;
//! let bytes = pack(vec![("alice.xlsx", alice.into_template())])?;
//! # let _ = bytes;
//! # Ok(())
//! # }
//! ```

mod api;
mod archive;
mod binding;
mod builder;
mod error;
mod mapping;
mod naming;
mod render;
mod security;
mod template;
mod types;

// 公開API
pub use api::{
    CancellationToken, DocumentFormat, GeneratedOutput, GenerationSummary, ReplaceMode,
    ARCHIVE_CONTENT_TYPE,
};
pub use archive::{pack, ArchivePackager};
pub use binding::{Binding, BindingPlan};
pub use builder::{Generator, GeneratorBuilder};
pub use error::{ErrorKind, XlsxMergeError};
pub use mapping::{DataRow, FieldDef, FieldTarget, FieldValue, MappingSpec};
pub use naming::{default_entry_name, NamePattern};
pub use render::{RenderedDocument, RowRenderer};
pub use security::Limits;
pub use template::Template;
pub use types::{CellCoord, CellRange, CellValue};
