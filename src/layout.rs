use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::Builder;

use crate::error::PostDeseqError;

/// Directory layout of everything one run writes.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: Utf8PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn annotated_dir(&self) -> Utf8PathBuf {
        self.root.join("annotated")
    }

    pub fn expression_dir(&self) -> Utf8PathBuf {
        self.root.join("expression")
    }

    pub fn sig_only_dir(&self) -> Utf8PathBuf {
        self.root.join("sigOnly")
    }

    pub fn annotated_path(&self, file_name: &str) -> Utf8PathBuf {
        self.annotated_dir().join(format!("annotated_{file_name}"))
    }

    pub fn expression_path(&self, file_name: &str, category: &str) -> Utf8PathBuf {
        self.expression_dir()
            .join(format!("expression_{}_{category}.tab", file_stem(file_name)))
    }

    pub fn sig_only_path(&self, file_name: &str, category: &str) -> Utf8PathBuf {
        self.sig_only_dir()
            .join(format!("sig_{}_{category}.tab", file_stem(file_name)))
    }

    pub fn ensure_dirs(&self) -> Result<(), PostDeseqError> {
        for dir in [
            self.annotated_dir(),
            self.expression_dir(),
            self.sig_only_dir(),
        ] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| PostDeseqError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

/// File name up to its first `.`; `contrast.deseq.txt` becomes `contrast`.
pub fn file_stem(file_name: &str) -> &str {
    file_name
        .split_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
}

/// Writes through a temp file in the destination directory, replacing any
/// previous output of the same name.
pub fn write_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), PostDeseqError> {
    let parent = path
        .parent()
        .ok_or_else(|| PostDeseqError::Filesystem(format!("invalid output path {path}")))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| PostDeseqError::Filesystem(format!("create {parent}: {err}")))?;
    let mut temp = Builder::new()
        .prefix(".postdeseq2")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| PostDeseqError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| PostDeseqError::Filesystem(format!("write {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| PostDeseqError::Filesystem(format!("persist {path}: {err}")))?;
    Ok(())
}
