use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::annotation::{AnnotationJoiner, AnnotationTable};
use crate::classify::CATEGORIES;
use crate::domain::AddressingMode;
use crate::emit::{
    AnnotatedTableWriter, EmitContext, ExpressionTableWriter, OutputEmitter,
    SignificantSubsetWriter, write_outputs,
};
use crate::error::PostDeseqError;
use crate::layout::{OutputLayout, file_stem};
use crate::loader::{LoaderOptions, discover_inputs, open_records};
use crate::normalize::IdentifierNormalizer;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub loader: LoaderOptions,
    /// Abort the whole run on the first failing file.
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The file's content could not be parsed or normalized.
    Input,
    /// Another input already owns the file's output names.
    Collision,
    Other,
}

impl FailureKind {
    pub fn of(error: &PostDeseqError) -> Self {
        if error.is_input_error() {
            FailureKind::Input
        } else if matches!(error, PostDeseqError::OutputNameCollision { .. }) {
            FailureKind::Collision
        } else {
            FailureKind::Other
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file: String,
    pub status: FileStatus,
    pub records: usize,
    pub annotated: usize,
    pub significant: BTreeMap<String, usize>,
    pub outputs: Vec<String>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: String,
    pub mode: AddressingMode,
    /// Annotation table the run joined against.
    pub annotation: Option<String>,
    pub key_column: String,
    pub files: Vec<FileReport>,
}

impl RunReport {
    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|file| file.status == FileStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }

    /// Error summarizing the failed files, if any. It counts as an input
    /// error when at least one file failed on its content.
    pub fn failure(&self) -> Option<PostDeseqError> {
        let failed = self.failed().count();
        if failed == 0 {
            return None;
        }
        Some(PostDeseqError::FilesFailed {
            failed,
            input_errors: self
                .failed()
                .any(|file| file.failure == Some(FailureKind::Input)),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Drives every discovered input file through load, normalize, classify,
/// join and the three emitters.
pub struct PipelineDriver<'a> {
    layout: OutputLayout,
    normalizer: IdentifierNormalizer,
    table: &'a AnnotationTable,
    options: PipelineOptions,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(
        layout: OutputLayout,
        normalizer: IdentifierNormalizer,
        table: &'a AnnotationTable,
        options: PipelineOptions,
    ) -> Self {
        Self {
            layout,
            normalizer,
            table,
            options,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn run_dir(
        &self,
        input_dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, PostDeseqError> {
        let inputs = discover_inputs(input_dir)?;
        info!(count = inputs.len(), dir = %input_dir, "discovered input files");
        self.run(&inputs, sink)
    }

    pub fn run(
        &self,
        inputs: &[Utf8PathBuf],
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, PostDeseqError> {
        let started_at = Utc::now().to_rfc3339();
        self.layout.ensure_dirs()?;

        let mut files = Vec::with_capacity(inputs.len());
        // One input per output stem.
        let mut claimed: HashMap<&str, &Utf8Path> = HashMap::new();
        for path in inputs {
            let stem = file_stem(display_name(path));
            let outcome = match claimed.get(stem) {
                Some(owner) => Err(PostDeseqError::OutputNameCollision {
                    file: display_name(path).to_string(),
                    other: display_name(owner).to_string(),
                    stem: stem.to_string(),
                }),
                None => self.process_file(path, sink),
            };
            match outcome {
                Ok(report) => {
                    claimed.insert(stem, path.as_path());
                    files.push(report);
                }
                Err(err) if self.options.strict => {
                    return Err(PostDeseqError::FileFailed {
                        file: path.to_string(),
                        source: Box::new(err),
                    });
                }
                Err(err) => {
                    error!(file = %path, error = %err, "skipping file");
                    sink.event(ProgressEvent {
                        message: format!("{} failed: {err}", display_name(path)),
                        elapsed: None,
                    });
                    files.push(FileReport {
                        file: display_name(path).to_string(),
                        status: FileStatus::Failed,
                        records: 0,
                        annotated: 0,
                        significant: BTreeMap::new(),
                        outputs: Vec::new(),
                        error: Some(err.to_string()),
                        failure: Some(FailureKind::of(&err)),
                    });
                }
            }
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now().to_rfc3339(),
            mode: self.normalizer.mode(),
            annotation: self.table.source().map(|path| path.to_string()),
            key_column: self.table.key_column().to_string(),
            files,
        })
    }

    /// Parses the file once and renders all three output shapes from the
    /// same joined records. Nothing is written until every table has been
    /// rendered.
    pub fn process_file(
        &self,
        path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<FileReport, PostDeseqError> {
        let start = Instant::now();
        let file_name = display_name(path);

        let mut records = open_records(path, self.options.loader)?;
        let mut normalized = Vec::new();
        while let Some(record) = records.next() {
            let record = self
                .normalizer
                .normalize_record(record?)
                .map_err(|err| PostDeseqError::AtLine {
                    path: records.source().to_string(),
                    line: records.line_no(),
                    source: Box::new(err),
                })?;
            normalized.push(record);
        }
        let joined = AnnotationJoiner::new(self.table).join_all(normalized);

        let ctx = EmitContext {
            file_name,
            records: &joined,
            annotation_columns: self.table.columns(),
        };

        let mut rendered = AnnotatedTableWriter::new(&self.layout).render(&ctx);
        sink.event(ProgressEvent {
            message: format!("{file_name} is done with annotation"),
            elapsed: Some(start.elapsed()),
        });
        rendered.extend(ExpressionTableWriter::new(&self.layout).render(&ctx));
        sink.event(ProgressEvent {
            message: format!("{file_name} is done with the expression"),
            elapsed: Some(start.elapsed()),
        });
        rendered.extend(SignificantSubsetWriter::new(&self.layout).render(&ctx));
        sink.event(ProgressEvent {
            message: format!("{file_name} is done with sig selection"),
            elapsed: Some(start.elapsed()),
        });
        let outputs = write_outputs(&rendered)?;

        let significant = CATEGORIES
            .iter()
            .enumerate()
            .map(|(index, category)| {
                let count = joined.iter().filter(|record| record.flags.get(index)).count();
                (category.name.to_string(), count)
            })
            .collect();
        let annotated = joined.iter().filter(|record| record.is_annotated()).count();
        info!(
            file = %file_name,
            records = joined.len(),
            annotated,
            outputs = outputs.len(),
            "processed"
        );

        Ok(FileReport {
            file: file_name.to_string(),
            status: FileStatus::Done,
            records: joined.len(),
            annotated,
            significant,
            outputs: outputs.into_iter().map(|path| path.to_string()).collect(),
            error: None,
            failure: None,
        })
    }
}

fn display_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or(path.as_str())
}
