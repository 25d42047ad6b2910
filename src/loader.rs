use std::fs::{self, File};
use std::io::{BufRead, BufReader, Lines};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::ResultRecord;
use crate::error::PostDeseqError;

const FIELD_COUNT: usize = 7;
const NUMERIC_NAMES: [&str; 6] = ["BaseMean", "log2FC", "StdErr", "WaldStat", "Pvalue", "Padj"];

#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderOptions {
    /// Discard the first line of the file before parsing.
    pub skip_header: bool,
}

/// Lazy, single-pass reader of whitespace-delimited DESeq2 result rows.
pub struct Records<R: BufRead> {
    source: String,
    lines: Lines<R>,
    line_no: usize,
    skip_header: bool,
}

impl<R: BufRead> Records<R> {
    pub fn new(source: impl Into<String>, reader: R, options: LoaderOptions) -> Self {
        Self {
            source: source.into(),
            lines: reader.lines(),
            line_no: 0,
            skip_header: options.skip_header,
        }
    }

    /// Number of the line most recently read, counting from one.
    pub fn line_no(&self) -> usize {
        self.line_no
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    fn malformed(&self, reason: String) -> PostDeseqError {
        PostDeseqError::MalformedRecord {
            path: self.source.clone(),
            line: self.line_no,
            reason,
        }
    }
}

impl<R: BufRead> Iterator for Records<R> {
    type Item = Result<ResultRecord, PostDeseqError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => {
                    self.line_no += 1;
                    return Some(Err(self.malformed(err.to_string())));
                }
            };
            self.line_no += 1;
            if self.skip_header {
                self.skip_header = false;
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            return Some(parse_line(&line).map_err(|reason| self.malformed(reason)));
        }
    }
}

/// Splits one line on whitespace runs into the seven positional fields.
pub fn parse_line(line: &str) -> Result<ResultRecord, String> {
    let fields = line.split_whitespace().collect::<Vec<_>>();
    if fields.len() != FIELD_COUNT {
        return Err(format!(
            "expected {FIELD_COUNT} fields, found {}",
            fields.len()
        ));
    }

    let mut numbers = [0.0_f64; 6];
    for (slot, (raw, name)) in numbers
        .iter_mut()
        .zip(fields[1..].iter().zip(NUMERIC_NAMES))
    {
        let value = raw
            .parse::<f64>()
            .map_err(|_| format!("{name} is not a number: {raw}"))?;
        if !value.is_finite() {
            return Err(format!("{name} is not finite: {raw}"));
        }
        *slot = value;
    }

    Ok(ResultRecord {
        gene_id: fields[0].to_string(),
        base_mean: numbers[0],
        log2_fold_change: numbers[1],
        std_err: numbers[2],
        wald_stat: numbers[3],
        p_value: numbers[4],
        p_adj: numbers[5],
    })
}

pub fn open_records(
    path: &Utf8Path,
    options: LoaderOptions,
) -> Result<Records<BufReader<File>>, PostDeseqError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| PostDeseqError::Filesystem(format!("open {path}: {err}")))?;
    Ok(Records::new(path.as_str(), BufReader::new(file), options))
}

/// Parses a whole file, stopping at the first malformed line.
pub fn load_records(
    path: &Utf8Path,
    options: LoaderOptions,
) -> Result<Vec<ResultRecord>, PostDeseqError> {
    open_records(path, options)?.collect()
}

/// Regular, non-hidden files directly under `dir`, sorted by name.
pub fn discover_inputs(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, PostDeseqError> {
    let entries = fs::read_dir(dir.as_std_path())
        .map_err(|err| PostDeseqError::Filesystem(format!("read input dir {dir}: {err}")))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| PostDeseqError::Filesystem(err.to_string()))?;
        let path = Utf8PathBuf::from_path_buf(entry.path())
            .map_err(|path| PostDeseqError::Filesystem(format!("non UTF-8 path: {}", path.display())))?;
        let hidden = path.file_name().is_some_and(|name| name.starts_with('.'));
        if path.as_std_path().is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_tab_and_space_runs() {
        let record = parse_line("gene:AT1G01010.1\t12.5   -0.4 0.1\t-4.0  0.001 0.02").unwrap();
        assert_eq!(record.gene_id, "gene:AT1G01010.1");
        assert_eq!(record.base_mean, 12.5);
        assert_eq!(record.log2_fold_change, -0.4);
        assert_eq!(record.p_adj, 0.02);
    }

    #[test]
    fn rejects_wrong_field_count() {
        let err = parse_line("AT1G01010 1 2 3").unwrap_err();
        assert!(err.contains("expected 7 fields"));
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(parse_line("g 1 NaN 1 1 1 1").is_err());
        assert!(parse_line("g 1 1 1 1 1 inf").is_err());
        assert!(parse_line("g 1 1 1 1 1 NA").is_err());
    }

    #[test]
    fn reports_line_number_of_first_bad_row() {
        let input = "g1 1 1 1 1 1 1\n\ng2 1 1 1 1 x 1\ng3 1 1 1 1 1 1\n";
        let mut records = Records::new("demo.txt", Cursor::new(input), LoaderOptions::default());
        assert!(records.next().unwrap().is_ok());
        let err = records.next().unwrap().unwrap_err();
        assert_matches!(err, PostDeseqError::MalformedRecord { line: 3, .. });
    }

    #[test]
    fn skip_header_discards_first_line_only() {
        let input = "GeneID baseMean log2FC lfcSE stat pvalue padj\ng1 1 1 1 1 1 1\n";
        let records = Records::new(
            "demo.txt",
            Cursor::new(input),
            LoaderOptions { skip_header: true },
        )
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].gene_id, "g1");
    }

    #[test]
    fn discovery_skips_hidden_files_and_directories() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        for name in ["zeta.txt", "alpha.txt", "Mid.tab", ".DS_Store", ".hidden.txt"] {
            fs::write(dir.join(name).as_std_path(), "g1 1 1 1 1 1 1\n").unwrap();
        }
        fs::create_dir(dir.join("nested").as_std_path()).unwrap();
        fs::write(dir.join("nested/inner.txt").as_std_path(), "g1 1 1 1 1 1 1\n").unwrap();

        let names = discover_inputs(&dir)
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, ["Mid.tab", "alpha.txt", "zeta.txt"]);
    }

    #[test]
    fn discovery_of_missing_dir_fails() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("absent")).unwrap();
        assert_matches!(discover_inputs(&dir), Err(PostDeseqError::Filesystem(_)));
    }

    #[test]
    fn header_without_skip_is_malformed() {
        let input = "GeneID baseMean log2FC lfcSE stat pvalue padj\n";
        let result = Records::new("demo.txt", Cursor::new(input), LoaderOptions::default())
            .collect::<Result<Vec<_>, _>>();
        assert_matches!(result, Err(PostDeseqError::MalformedRecord { line: 1, .. }));
    }
}
