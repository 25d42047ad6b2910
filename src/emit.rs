//! The three output shapes rendered from one set of joined records.

use std::fs;

use camino::Utf8PathBuf;
use tracing::warn;

use crate::annotation::JoinedRecord;
use crate::classify::CATEGORIES;
use crate::domain::BASE_COLUMNS;
use crate::error::PostDeseqError;
use crate::layout::{OutputLayout, write_atomic};

pub const EXPRESSION_COLUMN: &str = "Expression";

/// Everything an emitter needs about one processed input file.
pub struct EmitContext<'r, 'a> {
    /// Input file name, used to derive output names.
    pub file_name: &'r str,
    pub records: &'r [JoinedRecord<'a>],
    /// Passthrough annotation column names.
    pub annotation_columns: &'r [String],
}

/// One output file rendered in memory, not yet on disk.
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub path: Utf8PathBuf,
    pub content: Vec<u8>,
}

pub trait OutputEmitter {
    fn render(&self, ctx: &EmitContext<'_, '_>) -> Vec<RenderedOutput>;

    fn emit(&self, ctx: &EmitContext<'_, '_>) -> Result<Vec<Utf8PathBuf>, PostDeseqError> {
        write_outputs(&self.render(ctx))
    }
}

/// Writes every output in order. When one write fails, the outputs already
/// written by this call are removed again before the error is returned.
pub fn write_outputs(outputs: &[RenderedOutput]) -> Result<Vec<Utf8PathBuf>, PostDeseqError> {
    let mut written: Vec<Utf8PathBuf> = Vec::with_capacity(outputs.len());
    for output in outputs {
        if let Err(err) = write_atomic(&output.path, &output.content) {
            for path in &written {
                if let Err(remove_err) = fs::remove_file(path.as_std_path()) {
                    warn!(path = %path, error = %remove_err, "could not remove partial output");
                }
            }
            return Err(err);
        }
        written.push(output.path.clone());
    }
    Ok(written)
}

#[derive(Default)]
struct Tsv {
    content: String,
}

impl Tsv {
    fn row<'s>(&mut self, fields: impl IntoIterator<Item = &'s str>) {
        let mut first = true;
        for field in fields {
            if !first {
                self.content.push('\t');
            }
            self.content.push_str(field);
            first = false;
        }
        self.content.push('\n');
    }

    fn into_bytes(self) -> Vec<u8> {
        self.content.into_bytes()
    }
}

/// Shortest round-trip digits, with a signed two-digit exponent in
/// scientific notation (`1e-05`, `2.5e+16`) the way pandas writes floats.
fn format_number(value: f64) -> String {
    let text = format!("{value:?}");
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text,
    }
}

fn numeric_columns(record: &JoinedRecord<'_>) -> Vec<String> {
    record
        .record
        .record
        .numeric_fields()
        .iter()
        .map(|value| format_number(*value))
        .collect()
}

/// One row per gene with category identifiers and annotation columns.
pub struct AnnotatedTableWriter<'l> {
    layout: &'l OutputLayout,
}

impl<'l> AnnotatedTableWriter<'l> {
    pub fn new(layout: &'l OutputLayout) -> Self {
        Self { layout }
    }
}

impl OutputEmitter for AnnotatedTableWriter<'_> {
    fn render(&self, ctx: &EmitContext<'_, '_>) -> Vec<RenderedOutput> {
        let mut tsv = Tsv::default();
        tsv.row(
            BASE_COLUMNS
                .iter()
                .copied()
                .chain(["loc", "Last"])
                .chain(CATEGORIES.iter().map(|category| category.label))
                .chain(ctx.annotation_columns.iter().map(String::as_str)),
        );

        for joined in ctx.records {
            let numbers = numeric_columns(joined);
            let clean_id = joined.record.clean_id();
            // Direct mode has no version; the column mirrors the identifier.
            let last = joined
                .record
                .id
                .version_suffix
                .as_deref()
                .unwrap_or(clean_id);
            tsv.row(
                std::iter::once(clean_id)
                    .chain(numbers.iter().map(String::as_str))
                    .chain([joined.record.join_key(), last])
                    .chain(
                        (0..CATEGORIES.len())
                            .map(|index| joined.flags.identifier_rendering(index, clean_id)),
                    )
                    .chain(joined.annotation_values(ctx.annotation_columns.len())),
            );
        }

        vec![RenderedOutput {
            path: self.layout.annotated_path(ctx.file_name),
            content: tsv.into_bytes(),
        }]
    }
}

/// GOseq input: `GeneID` and a `True`/`False` flag, one file per category.
pub struct ExpressionTableWriter<'l> {
    layout: &'l OutputLayout,
}

impl<'l> ExpressionTableWriter<'l> {
    pub fn new(layout: &'l OutputLayout) -> Self {
        Self { layout }
    }
}

impl OutputEmitter for ExpressionTableWriter<'_> {
    fn render(&self, ctx: &EmitContext<'_, '_>) -> Vec<RenderedOutput> {
        let mut rendered = Vec::with_capacity(CATEGORIES.len());
        for (index, category) in CATEGORIES.iter().enumerate() {
            let mut tsv = Tsv::default();
            tsv.row([BASE_COLUMNS[0], EXPRESSION_COLUMN]);
            for joined in ctx.records {
                tsv.row([
                    joined.record.clean_id(),
                    joined.flags.boolean_rendering(index),
                ]);
            }
            rendered.push(RenderedOutput {
                path: self.layout.expression_path(ctx.file_name, category.name),
                content: tsv.into_bytes(),
            });
        }
        rendered
    }
}

/// Rows passing each category, with statistics and annotation columns.
pub struct SignificantSubsetWriter<'l> {
    layout: &'l OutputLayout,
}

impl<'l> SignificantSubsetWriter<'l> {
    pub fn new(layout: &'l OutputLayout) -> Self {
        Self { layout }
    }
}

impl OutputEmitter for SignificantSubsetWriter<'_> {
    fn render(&self, ctx: &EmitContext<'_, '_>) -> Vec<RenderedOutput> {
        let mut rendered = Vec::with_capacity(CATEGORIES.len());
        for (index, category) in CATEGORIES.iter().enumerate() {
            let mut tsv = Tsv::default();
            tsv.row(
                BASE_COLUMNS
                    .iter()
                    .copied()
                    .chain(["locus"])
                    .chain(ctx.annotation_columns.iter().map(String::as_str)),
            );
            for joined in ctx.records.iter().filter(|joined| joined.flags.get(index)) {
                let numbers = numeric_columns(joined);
                tsv.row(
                    std::iter::once(joined.record.clean_id())
                        .chain(numbers.iter().map(String::as_str))
                        .chain([joined.record.join_key()])
                        .chain(joined.annotation_values(ctx.annotation_columns.len())),
                );
            }
            rendered.push(RenderedOutput {
                path: self.layout.sig_only_path(ctx.file_name, category.name),
                content: tsv.into_bytes(),
            });
        }
        rendered
    }
}
