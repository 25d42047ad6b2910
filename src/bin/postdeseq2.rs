use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use postdeseq2::annotation::{AnnotationIndex, AnnotationTable};
use postdeseq2::config::{ConfigLoader, ResolvedConfig};
use postdeseq2::domain::{AddressingMode, DuplicateKeyPolicy};
use postdeseq2::error::PostDeseqError;
use postdeseq2::layout::OutputLayout;
use postdeseq2::loader::LoaderOptions;
use postdeseq2::normalize::IdentifierNormalizer;
use postdeseq2::output::{ConsoleOutput, JsonOutput, OutputMode};
use postdeseq2::pipeline::{PipelineDriver, PipelineOptions, ProgressSink, RunReport};

#[derive(Parser)]
#[command(name = "postdeseq2")]
#[command(
    about = "Annotate DESeq2 results and split them into significance categories, GOseq expression tables and significant-only subsets"
)]
#[command(version, author)]
struct Cli {
    /// Never prompt; print the run report as JSON.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Run configuration (defaults to ./postdeseq2.json when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the DESeq2 result files.
    #[arg(long)]
    input: Option<Utf8PathBuf>,

    /// Directory the annotated, expression and sigOnly folders are written to.
    #[arg(long)]
    output: Option<Utf8PathBuf>,

    /// Annotation code from the annotation index.
    #[arg(long, short = 'a')]
    annotation: Option<String>,

    /// Annotation index workbook (defaults to ./annotations.xlsx when present).
    #[arg(long)]
    annotation_index: Option<Utf8PathBuf>,

    /// Annotation table to use directly, bypassing the index.
    #[arg(long, conflicts_with = "annotation")]
    annotation_file: Option<Utf8PathBuf>,

    /// direct (A) or locus-versioned (S).
    #[arg(long)]
    mode: Option<AddressingMode>,

    /// Prefix stripped from gene identifiers.
    #[arg(long)]
    id_prefix: Option<String>,

    /// Annotation column holding the join key.
    #[arg(long)]
    key_column: Option<String>,

    /// Discard the first line of every input file.
    #[arg(long)]
    skip_header: bool,

    /// Abort the run on the first file that fails.
    #[arg(long)]
    strict: bool,

    /// first or reject.
    #[arg(long)]
    duplicate_keys: Option<DuplicateKeyPolicy>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<PostDeseqError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PostDeseqError) -> u8 {
    if error.is_input_error() {
        return 2;
    }
    match error {
        PostDeseqError::UnknownAddressingMode(_)
        | PostDeseqError::UnknownDuplicatePolicy(_)
        | PostDeseqError::UnknownAnnotation(_)
        | PostDeseqError::NoAnnotationSelected
        | PostDeseqError::AnnotationKeyColumnMissing { .. }
        | PostDeseqError::Workbook { .. }
        | PostDeseqError::AnnotationLookupAmbiguity { .. }
        | PostDeseqError::MissingConfig(_)
        | PostDeseqError::ConfigRead(_)
        | PostDeseqError::ConfigParse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = apply_overrides(ConfigLoader::resolve(cli.config.as_deref())?, &cli);

    let table_path = match (&cli.annotation_file, &cli.annotation) {
        (Some(path), _) => path.clone(),
        (None, Some(code)) => config.annotation_entries()?.select(code)?.file.clone(),
        (None, None) => match output_mode {
            OutputMode::Interactive => prompt_annotation(&config.annotation_entries()?)?,
            OutputMode::NonInteractive => return Err(PostDeseqError::NoAnnotationSelected.into()),
        },
    };
    let key_column = config.join_column();
    info!(path = %table_path, key = %key_column, mode = %config.mode, "loading annotation table");
    let table = AnnotationTable::load(&table_path, key_column, config.duplicate_keys)?;

    let driver = PipelineDriver::new(
        OutputLayout::new(config.output_dir.clone()),
        IdentifierNormalizer::new(config.id_prefix.clone(), config.mode),
        &table,
        PipelineOptions {
            loader: LoaderOptions {
                skip_header: config.skip_header,
            },
            strict: config.strict,
        },
    );

    match output_mode {
        OutputMode::Interactive => {
            println!(
                "Processing DESeq2 results in {} ({} mode)\n",
                config.input_dir, config.mode
            );
            let report = driver.run_dir(&config.input_dir, &ConsoleOutput as &dyn ProgressSink)?;
            print_summary(&report);
            finish(&report)
        }
        OutputMode::NonInteractive => {
            let report = driver.run_dir(&config.input_dir, &JsonOutput as &dyn ProgressSink)?;
            JsonOutput::print_report(&report).into_diagnostic()?;
            finish(&report)
        }
    }
}

fn apply_overrides(mut config: ResolvedConfig, cli: &Cli) -> ResolvedConfig {
    if let Some(input) = &cli.input {
        config.input_dir = input.clone();
    }
    if let Some(output) = &cli.output {
        config.output_dir = output.clone();
    }
    if let Some(mode) = cli.mode {
        config.mode = mode;
    }
    if let Some(index) = &cli.annotation_index {
        config.annotation_index = Some(index.clone());
    }
    if let Some(prefix) = &cli.id_prefix {
        config.id_prefix = prefix.clone();
    }
    if let Some(key_column) = &cli.key_column {
        config.key_column = Some(key_column.clone());
    }
    if let Some(policy) = cli.duplicate_keys {
        config.duplicate_keys = policy;
    }
    config.skip_header |= cli.skip_header;
    config.strict |= cli.strict;
    config
}

fn prompt_annotation(index: &AnnotationIndex) -> miette::Result<Utf8PathBuf> {
    if index.is_empty() {
        return Err(PostDeseqError::NoAnnotationSelected.into());
    }
    let mut stdout = io::stdout();
    writeln!(stdout, "{:<12} name_file", "type").into_diagnostic()?;
    for entry in index.entries() {
        let name = entry.file.file_name().unwrap_or(entry.file.as_str());
        writeln!(stdout, "{:<12} {name}", entry.code).into_diagnostic()?;
    }
    write!(
        stdout,
        "Type the code from the 'type' column above to select an annotation file: "
    )
    .into_diagnostic()?;
    stdout.flush().into_diagnostic()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .into_diagnostic()?;
    let code = answer.trim().to_uppercase();
    Ok(index.select(&code)?.file.clone())
}

fn print_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let red = "\x1b[31m";
    let reset = "\x1b[0m";

    let failed = report.failed().count();
    println!("\n{cyan}postDESeq2 summary{reset}");
    println!(
        "{green}Processed files: {}{reset}",
        report.files.len() - failed
    );
    println!("{yellow}Failed files: {failed}{reset}");

    for file in &report.files {
        match &file.error {
            Some(err) => println!("{red}  {} failed: {err}{reset}", file.file),
            None => println!(
                "{green}  {} {} genes, {} annotated, {} outputs{reset}",
                file.file,
                file.records,
                file.annotated,
                file.outputs.len()
            ),
        }
    }
    println!("\nFINISHED!");
}

fn finish(report: &RunReport) -> miette::Result<()> {
    match report.failure() {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_files_keep_their_exit_code() {
        let input = PostDeseqError::FilesFailed {
            failed: 2,
            input_errors: true,
        };
        let other = PostDeseqError::FilesFailed {
            failed: 1,
            input_errors: false,
        };
        assert_eq!(map_exit_code(&input), 2);
        assert_eq!(map_exit_code(&other), 1);
        assert_eq!(map_exit_code(&PostDeseqError::NoAnnotationSelected), 3);
    }

    #[test]
    fn mode_override_keeps_configured_key_column() {
        let mut config = ConfigLoader::resolve_config(Default::default()).unwrap();
        config.key_column = Some("GeneID".to_string());
        let cli = Cli::parse_from(["postdeseq2", "--mode", "locus-versioned"]);
        let config = apply_overrides(config, &cli);
        assert_eq!(config.mode, AddressingMode::LocusVersioned);
        assert_eq!(config.join_column(), "GeneID");

        let defaults = ConfigLoader::resolve_config(Default::default()).unwrap();
        let config = apply_overrides(defaults, &cli);
        assert_eq!(config.join_column(), "locus");
    }
}
