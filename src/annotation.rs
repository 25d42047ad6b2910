use std::collections::HashMap;
use std::fs;

use calamine::{Reader, open_workbook_auto};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::classify::{CategoryFlags, classify};
use crate::domain::DuplicateKeyPolicy;
use crate::error::PostDeseqError;
use crate::normalize::NormalizedRecord;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// One entry of the annotation index: a short code and the table it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEntry {
    pub code: String,
    pub file: Utf8PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct AnnotationIndex {
    entries: Vec<AnnotationEntry>,
}

impl AnnotationIndex {
    pub fn new(entries: Vec<AnnotationEntry>) -> Self {
        Self { entries }
    }

    /// Reads an index sheet with `type` and `name_file` columns, either a
    /// workbook or tab-separated text. Table names resolve against
    /// `annotations_dir`.
    pub fn load(path: &Utf8Path, annotations_dir: &Utf8Path) -> Result<Self, PostDeseqError> {
        let mut rows = read_rows(path)?.into_iter();
        let header = rows.next().ok_or_else(|| {
            PostDeseqError::AnnotationParse(format!("annotation index {path} is empty"))
        })?;
        let column = |name: &str| {
            header
                .iter()
                .position(|cell| cell.trim() == name)
                .ok_or_else(|| PostDeseqError::AnnotationKeyColumnMissing {
                    path: path.to_string(),
                    column: name.to_string(),
                })
        };
        let code_index = column("type")?;
        let file_index = column("name_file")?;

        let entries = rows
            .filter_map(|row| {
                let code = row.get(code_index)?.trim();
                let file = row.get(file_index)?.trim();
                if code.is_empty() || file.is_empty() {
                    return None;
                }
                Some(AnnotationEntry {
                    code: code.to_uppercase(),
                    file: annotations_dir.join(file),
                })
            })
            .collect::<Vec<_>>();
        debug!(path = %path, entries = entries.len(), "loaded annotation index");
        Ok(Self::new(entries))
    }

    /// Appends entries whose code is not listed yet.
    pub fn merge(&mut self, other: AnnotationIndex) {
        for entry in other.entries {
            if !self
                .entries
                .iter()
                .any(|known| known.code.eq_ignore_ascii_case(&entry.code))
            {
                self.entries.push(entry);
            }
        }
    }

    pub fn entries(&self) -> &[AnnotationEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Codes are compared case-insensitively.
    pub fn select(&self, code: &str) -> Result<&AnnotationEntry, PostDeseqError> {
        let wanted = code.trim();
        self.entries
            .iter()
            .find(|entry| entry.code.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PostDeseqError::UnknownAnnotation(code.to_string()))
    }
}

pub fn is_workbook(path: &Utf8Path) -> bool {
    path.extension().is_some_and(|extension| {
        WORKBOOK_EXTENSIONS
            .iter()
            .any(|known| extension.eq_ignore_ascii_case(known))
    })
}

/// Cells of the first worksheet rendered as text, row by row.
fn read_workbook_rows(path: &Utf8Path) -> Result<Vec<Vec<String>>, PostDeseqError> {
    let workbook_error = |reason: String| PostDeseqError::Workbook {
        path: path.to_string(),
        reason,
    };
    let mut workbook =
        open_workbook_auto(path.as_std_path()).map_err(|err| workbook_error(err.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| workbook_error("no worksheet".to_string()))?
        .map_err(|err| workbook_error(err.to_string()))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(ToString::to_string).collect())
        .collect())
}

fn text_rows(content: &str) -> Vec<Vec<String>> {
    content
        .lines()
        .map(|line| {
            line.trim_end_matches('\r')
                .split('\t')
                .map(str::to_string)
                .collect()
        })
        .collect()
}

fn read_rows(path: &Utf8Path) -> Result<Vec<Vec<String>>, PostDeseqError> {
    if is_workbook(path) {
        return read_workbook_rows(path);
    }
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|err| PostDeseqError::Filesystem(format!("read {path}: {err}")))?;
    Ok(text_rows(&content))
}

/// Annotation table keyed on one column, read from a workbook's first sheet
/// or from tab-separated text.
///
/// Every other column is carried through to the outputs untouched, in file
/// order. Rows with an empty key never match.
#[derive(Debug, Clone)]
pub struct AnnotationTable {
    source: Option<Utf8PathBuf>,
    key_column: String,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    by_key: HashMap<String, usize>,
    duplicate_keys: usize,
}

impl AnnotationTable {
    pub fn load(
        path: &Utf8Path,
        key_column: &str,
        policy: DuplicateKeyPolicy,
    ) -> Result<Self, PostDeseqError> {
        let rows = read_rows(path)?;
        let mut table = Self::from_rows(rows, key_column, policy).map_err(|err| match err {
            PostDeseqError::AnnotationKeyColumnMissing { column, .. } => {
                PostDeseqError::AnnotationKeyColumnMissing {
                    path: path.to_string(),
                    column,
                }
            }
            other => other,
        })?;
        table.source = Some(path.to_path_buf());
        debug!(
            path = %path,
            rows = table.rows.len(),
            columns = table.columns.len(),
            "loaded annotation table"
        );
        Ok(table)
    }

    /// Parses tab-separated text with a header row.
    pub fn parse(
        content: &str,
        key_column: &str,
        policy: DuplicateKeyPolicy,
    ) -> Result<Self, PostDeseqError> {
        Self::from_rows(text_rows(content), key_column, policy)
    }

    /// Builds the table from a header row followed by data rows.
    pub fn from_rows(
        rows: Vec<Vec<String>>,
        key_column: &str,
        policy: DuplicateKeyPolicy,
    ) -> Result<Self, PostDeseqError> {
        let mut rows_iter = rows.into_iter();
        let mut header = rows_iter
            .next()
            .ok_or_else(|| PostDeseqError::AnnotationParse("annotation table is empty".to_string()))?
            .into_iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();
        while header.last().is_some_and(String::is_empty) {
            header.pop();
        }
        let key_index = header
            .iter()
            .position(|name| name == key_column)
            .ok_or_else(|| PostDeseqError::AnnotationKeyColumnMissing {
                path: String::new(),
                column: key_column.to_string(),
            })?;

        let columns = header
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != key_index)
            .map(|(_, name)| name.clone())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        let mut by_key = HashMap::new();
        let mut counts = HashMap::<String, usize>::new();
        let mut blank_keys = 0;
        for (row_no, mut fields) in rows_iter.enumerate() {
            if fields.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            if fields
                .iter()
                .skip(header.len())
                .any(|field| !field.trim().is_empty())
            {
                return Err(PostDeseqError::AnnotationParse(format!(
                    "row {} has {} fields, header has {}",
                    row_no + 2,
                    fields.len(),
                    header.len()
                )));
            }
            fields.resize(header.len(), String::new());
            let key = fields.remove(key_index).trim().to_string();
            if key.is_empty() {
                blank_keys += 1;
                continue;
            }

            *counts.entry(key.clone()).or_default() += 1;
            if !by_key.contains_key(&key) {
                by_key.insert(key, rows.len());
                rows.push(fields);
            }
        }
        if blank_keys > 0 {
            debug!(rows = blank_keys, "ignoring annotation rows without a key");
        }

        let mut duplicates = counts
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .collect::<Vec<_>>();
        duplicates.sort();
        if let Some((key, count)) = duplicates.first() {
            match policy {
                DuplicateKeyPolicy::Reject => {
                    return Err(PostDeseqError::AnnotationLookupAmbiguity {
                        key: key.clone(),
                        count: *count,
                    });
                }
                DuplicateKeyPolicy::First => {
                    warn!(
                        duplicated = duplicates.len(),
                        example = %key,
                        "annotation table has duplicate keys; keeping the first row for each"
                    );
                }
            }
        }

        Ok(Self {
            source: None,
            key_column: key_column.to_string(),
            columns,
            rows,
            by_key,
            duplicate_keys: duplicates.len(),
        })
    }

    /// File the table was loaded from.
    pub fn source(&self) -> Option<&Utf8Path> {
        self.source.as_deref()
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Passthrough column names, without the key column.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn duplicate_keys(&self) -> usize {
        self.duplicate_keys
    }

    pub fn lookup(&self, key: &str) -> Option<&[String]> {
        self.by_key.get(key).map(|&index| self.rows[index].as_slice())
    }
}

/// A classified record together with its annotation row, if any.
#[derive(Debug, Clone)]
pub struct JoinedRecord<'a> {
    pub record: NormalizedRecord,
    pub flags: CategoryFlags,
    pub annotation: Option<&'a [String]>,
}

impl JoinedRecord<'_> {
    pub fn is_annotated(&self) -> bool {
        self.annotation.is_some()
    }

    /// Annotation values, or empty strings for unmatched genes.
    pub fn annotation_values(&self, width: usize) -> impl Iterator<Item = &str> + '_ {
        let values = self.annotation.unwrap_or(&[]);
        (0..width).map(move |index| values.get(index).map(String::as_str).unwrap_or(""))
    }
}

/// Left join of records against an annotation table on the record's join key.
pub struct AnnotationJoiner<'a> {
    table: &'a AnnotationTable,
}

impl<'a> AnnotationJoiner<'a> {
    pub fn new(table: &'a AnnotationTable) -> Self {
        Self { table }
    }

    pub fn join(&self, record: NormalizedRecord) -> JoinedRecord<'a> {
        let flags = classify(&record);
        let annotation = self.table.lookup(record.join_key());
        JoinedRecord {
            record,
            flags,
            annotation,
        }
    }

    pub fn join_all(&self, records: Vec<NormalizedRecord>) -> Vec<JoinedRecord<'a>> {
        records.into_iter().map(|record| self.join(record)).collect()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::{AddressingMode, ResultRecord};
    use crate::normalize::IdentifierNormalizer;

    const TABLE: &str = "locus\tdescription\tGO\nSolyc01g000100\tkinase\tGO:0016301\nSolyc01g000200\ttransporter\n";

    fn record(gene_id: &str) -> ResultRecord {
        ResultRecord {
            gene_id: gene_id.to_string(),
            base_mean: 10.0,
            log2_fold_change: 2.0,
            std_err: 0.1,
            wald_stat: 20.0,
            p_value: 1e-6,
            p_adj: 1e-4,
        }
    }

    #[test]
    fn parse_excludes_key_column_and_pads_rows() {
        let table = AnnotationTable::parse(TABLE, "locus", DuplicateKeyPolicy::First).unwrap();
        assert_eq!(table.columns(), ["description", "GO"]);
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.lookup("Solyc01g000200").unwrap(),
            ["transporter".to_string(), String::new()]
        );
    }

    #[test]
    fn missing_key_column() {
        let err = AnnotationTable::parse(TABLE, "GeneID", DuplicateKeyPolicy::First).unwrap_err();
        assert_matches!(err, PostDeseqError::AnnotationKeyColumnMissing { .. });
    }

    #[test]
    fn duplicate_keys_first_match() {
        let content = "GeneID\tdesc\nA\tfirst\nA\tsecond\nB\tother\n";
        let table = AnnotationTable::parse(content, "GeneID", DuplicateKeyPolicy::First).unwrap();
        assert_eq!(table.duplicate_keys(), 1);
        assert_eq!(table.lookup("A").unwrap(), ["first".to_string()]);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let content = "GeneID\tdesc\nA\tfirst\nA\tsecond\n";
        let err = AnnotationTable::parse(content, "GeneID", DuplicateKeyPolicy::Reject).unwrap_err();
        assert_matches!(err, PostDeseqError::AnnotationLookupAmbiguity { count: 2, .. });
    }

    #[test]
    fn left_join_keeps_unmatched_genes() {
        let table = AnnotationTable::parse(TABLE, "locus", DuplicateKeyPolicy::First).unwrap();
        let normalizer = IdentifierNormalizer::new("gene:", AddressingMode::LocusVersioned);
        let records = ["gene:Solyc01g000100.2", "gene:Solyc99g999999.1"]
            .into_iter()
            .map(|id| normalizer.normalize_record(record(id)).unwrap())
            .collect::<Vec<_>>();

        let joined = AnnotationJoiner::new(&table).join_all(records);
        assert_eq!(joined.len(), 2);
        assert!(joined[0].is_annotated());
        assert!(!joined[1].is_annotated());
        assert_eq!(
            joined[1].annotation_values(2).collect::<Vec<_>>(),
            ["", ""]
        );
        assert_eq!(joined[1].flags, joined[0].flags);
    }

    #[test]
    fn blank_key_rows_never_match() {
        let content = "locus\tdesc\n\tblank-key-row\nSolyc01g000100\tkinase\n \tpadded blank\n";
        let table = AnnotationTable::parse(content, "locus", DuplicateKeyPolicy::Reject).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(""), None);

        let normalizer = IdentifierNormalizer::new("gene:", AddressingMode::LocusVersioned);
        let empty_locus = normalizer.normalize_record(record("gene:.2")).unwrap();
        assert_eq!(empty_locus.join_key(), "");
        let joined = AnnotationJoiner::new(&table).join(empty_locus);
        assert!(!joined.is_annotated());
    }

    #[test]
    fn values_beyond_the_header_are_rejected() {
        let content = "locus\tdesc\nSolyc01g000100\tkinase\textra\n";
        let err = AnnotationTable::parse(content, "locus", DuplicateKeyPolicy::First).unwrap_err();
        assert_matches!(err, PostDeseqError::AnnotationParse(_));

        let trailing = "locus\tdesc\t\nSolyc01g000100\tkinase\t\n";
        let table = AnnotationTable::parse(trailing, "locus", DuplicateKeyPolicy::First).unwrap();
        assert_eq!(table.columns(), ["desc"]);
    }

    #[test]
    fn merge_keeps_existing_codes() {
        let entry = |code: &str, file: &str| AnnotationEntry {
            code: code.to_string(),
            file: Utf8PathBuf::from(file),
        };
        let mut index = AnnotationIndex::new(vec![entry("SL", "ITAG4.tsv")]);
        index.merge(AnnotationIndex::new(vec![
            entry("sl", "other.xlsx"),
            entry("AT", "araport11.xlsx"),
        ]));
        assert_eq!(index.entries().len(), 2);
        assert_eq!(index.select("SL").unwrap().file, "ITAG4.tsv");
        assert_eq!(index.select("at").unwrap().file, "araport11.xlsx");
    }

    #[test]
    fn workbook_extensions() {
        assert!(is_workbook(Utf8Path::new("annotations/ITAG4.xlsx")));
        assert!(is_workbook(Utf8Path::new("Araport11.XLS")));
        assert!(!is_workbook(Utf8Path::new("ITAG4.tsv")));
        assert!(!is_workbook(Utf8Path::new("xlsx")));
    }

    #[test]
    fn index_selection_is_case_insensitive() {
        let index = AnnotationIndex::new(vec![AnnotationEntry {
            code: "SL".to_string(),
            file: Utf8PathBuf::from("ITAG4.tsv"),
        }]);
        assert_eq!(index.select("sl").unwrap().file, "ITAG4.tsv");
        assert_matches!(index.select("AT"), Err(PostDeseqError::UnknownAnnotation(_)));
    }
}
