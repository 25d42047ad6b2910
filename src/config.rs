use std::fs;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::annotation::{AnnotationEntry, AnnotationIndex};
use crate::domain::{AddressingMode, DuplicateKeyPolicy};
use crate::error::PostDeseqError;
use crate::normalize::DEFAULT_PREFIX;

pub const DEFAULT_CONFIG_FILE: &str = "postdeseq2.json";
/// Annotation index picked up from the working directory when present.
pub const DEFAULT_INDEX_FILE: &str = "annotations.xlsx";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub input_dir: Option<String>,
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub annotations_dir: Option<String>,
    #[serde(default)]
    pub annotations: Vec<AnnotationIndexEntry>,
    /// Workbook or TSV with `type` and `name_file` columns.
    #[serde(default)]
    pub annotation_index: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub id_prefix: Option<String>,
    #[serde(default)]
    pub skip_header: Option<bool>,
    #[serde(default)]
    pub strict: Option<bool>,
    #[serde(default)]
    pub duplicate_keys: Option<String>,
    #[serde(default)]
    pub key_column: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum AnnotationIndexEntry {
    Shorthand(String),
    Detailed(AnnotationIndexObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnnotationIndexObject {
    #[serde(rename = "type")]
    pub code: String,
    pub name_file: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub input_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub annotations_dir: Utf8PathBuf,
    pub annotations: AnnotationIndex,
    pub annotation_index: Option<Utf8PathBuf>,
    pub mode: AddressingMode,
    pub id_prefix: String,
    pub skip_header: bool,
    pub strict: bool,
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Explicitly configured key column. Without one the mode decides.
    pub key_column: Option<String>,
}

impl ResolvedConfig {
    /// Annotation column the join runs on.
    pub fn join_column(&self) -> &str {
        self.key_column
            .as_deref()
            .unwrap_or_else(|| self.mode.default_key_column())
    }

    /// Config entries, followed by entries of the index file for codes the
    /// config does not list.
    pub fn annotation_entries(&self) -> Result<AnnotationIndex, PostDeseqError> {
        let mut index = self.annotations.clone();
        if let Some(path) = &self.annotation_index {
            index.merge(AnnotationIndex::load(path, &self.annotations_dir)?);
        }
        Ok(index)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `postdeseq2.json` when it exists. Without either the
    /// defaults apply.
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, PostDeseqError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| PostDeseqError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| PostDeseqError::ConfigParse(err.to_string()))?
        } else if path.is_some() {
            return Err(PostDeseqError::MissingConfig(config_path));
        } else {
            Config::default()
        };

        let mut resolved = Self::resolve_config(config)?;
        if resolved.annotation_index.is_none() && Utf8Path::new(DEFAULT_INDEX_FILE).is_file() {
            resolved.annotation_index = Some(Utf8PathBuf::from(DEFAULT_INDEX_FILE));
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PostDeseqError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let annotations_dir =
            Utf8PathBuf::from(config.annotations_dir.as_deref().unwrap_or("annotations"));

        let entries = config
            .annotations
            .into_iter()
            .map(|entry| match entry {
                AnnotationIndexEntry::Shorthand(name_file) => AnnotationEntry {
                    code: shorthand_code(&name_file),
                    file: annotations_dir.join(name_file),
                },
                AnnotationIndexEntry::Detailed(obj) => AnnotationEntry {
                    code: obj.code.trim().to_uppercase(),
                    file: annotations_dir.join(obj.name_file),
                },
            })
            .collect();

        let mode = match config.mode {
            Some(value) => value.parse()?,
            None => AddressingMode::Direct,
        };
        let duplicate_keys = match config.duplicate_keys {
            Some(value) => value.parse()?,
            None => DuplicateKeyPolicy::First,
        };
        Ok(ResolvedConfig {
            schema_version,
            input_dir: Utf8PathBuf::from(config.input_dir.unwrap_or_else(|| "input".to_string())),
            output_dir: Utf8PathBuf::from(
                config.output_dir.unwrap_or_else(|| "output".to_string()),
            ),
            annotations: AnnotationIndex::new(entries),
            annotation_index: config.annotation_index.map(Utf8PathBuf::from),
            annotations_dir,
            mode,
            id_prefix: config
                .id_prefix
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            skip_header: config.skip_header.unwrap_or(false),
            strict: config.strict.unwrap_or(false),
            duplicate_keys,
            key_column: config.key_column,
        })
    }
}

/// `ITAG4.1_annotation.tsv` is listed under the code `ITAG4`.
fn shorthand_code(name_file: &str) -> String {
    name_file
        .split('.')
        .next()
        .unwrap_or(name_file)
        .trim()
        .to_uppercase()
}
