//! CLI Tool Example
//!
//! This example demonstrates how to build a command-line tool
//! using xlsxmerge for filling an Excel template from a JSON mapping.

use std::fs::File;
use std::io::{self, Read};
use std::process;
use xlsxmerge::{
    CancellationToken, GeneratorBuilder, Limits, ReplaceMode, XlsxMergeError,
};

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 4 {
        eprintln!("Usage: {} <template.xlsx> <mapping.json> <output> [options]", args[0]);
        eprintln!("\nOptions:");
        eprintln!("  --skip-blank         Keep template content when a value is missing");
        eprintln!("  --threads <n>        Number of render threads");
        eprintln!("  --max-rows <n>       Maximum number of rows per request");
        eprintln!("  --no-recalc          Do not force formula recalculation on open");
        eprintln!("\nThe mapping may be read from stdin by passing '-'.");
        eprintln!("\nExamples:");
        eprintln!("  {} invoice.xlsx rows.json out.zip", args[0]);
        eprintln!("  {} invoice.xlsx - out.zip --threads 4 < rows.json", args[0]);
        process::exit(1);
    }

    let template_path = &args[1];
    let mapping_path = &args[2];
    let output_path = &args[3];

    // Parse options
    let mut builder = GeneratorBuilder::new();
    let mut limits = Limits::default();
    let mut i = 4;
    while i < args.len() {
        match args[i].as_str() {
            "--skip-blank" => {
                builder = builder.with_replace_mode(ReplaceMode::SkipBlank);
                i += 1;
            }
            "--threads" => {
                let threads = parse_value(&args, i, "--threads");
                builder = builder.with_parallelism(Some(threads));
                i += 2;
            }
            "--max-rows" => {
                limits = limits.with_max_rows(parse_value(&args, i, "--max-rows"));
                i += 2;
            }
            "--no-recalc" => {
                builder = builder.with_recalc_on_open(false);
                i += 1;
            }
            _ => {
                eprintln!("Error: Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
    }
    builder = builder.with_limits(limits);

    match generate(builder, template_path, mapping_path, output_path) {
        Ok(entries) if entries.is_empty() => {
            println!("No rows: template copied to {}", output_path);
        }
        Ok(entries) => {
            println!("Generated {} document(s) -> {}", entries.len(), output_path);
        }
        Err(e) => {
            handle_error(e);
            process::exit(1);
        }
    }
}

fn parse_value(args: &[String], i: usize, option: &str) -> usize {
    if i + 1 >= args.len() {
        eprintln!("Error: {} requires a value", option);
        process::exit(1);
    }
    args[i + 1].parse::<usize>().unwrap_or_else(|_| {
        eprintln!("Error: Invalid value for {}: {}", option, args[i + 1]);
        process::exit(1);
    })
}

fn generate(
    builder: GeneratorBuilder,
    template_path: &str,
    mapping_path: &str,
    output_path: &str,
) -> Result<Vec<String>, XlsxMergeError> {
    let generator = builder.build()?;

    let template = std::fs::read(template_path)?;
    let mut mapping = String::new();
    if mapping_path == "-" {
        io::stdin().lock().read_to_string(&mut mapping)?;
    } else {
        File::open(mapping_path)?.read_to_string(&mut mapping)?;
    }

    let output = File::create(output_path)?;
    let summary = generator.generate_into(&template, &mapping, output, &CancellationToken::new())?;
    Ok(summary.entries)
}

fn handle_error(error: XlsxMergeError) {
    eprintln!("{}: {}", error.kind(), error);
    match error {
        XlsxMergeError::Io(_) => {
            eprintln!("Please check that the files exist and you have permission to access them.");
        }
        XlsxMergeError::InvalidMapping(_) => {
            eprintln!("The mapping must be a JSON object with 'fields' and 'rows'.");
        }
        XlsxMergeError::Parse(_) => {
            eprintln!("The template may not be a valid Excel file or may be corrupted.");
        }
        XlsxMergeError::MarkerNotFound { .. } | XlsxMergeError::AmbiguousMarker { .. } => {
            eprintln!("Each marker must appear in exactly one cell of the template.");
        }
        XlsxMergeError::OutOfBounds { .. } | XlsxMergeError::UnwritableCell { .. } => {
            eprintln!("Bind fields to plain cells inside the sheet's used range.");
        }
        XlsxMergeError::ResourceLimit(_) => {
            eprintln!("The request exceeds a resource limit (see --max-rows).");
        }
        _ => {}
    }
}
