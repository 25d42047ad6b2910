use crate::domain::{AddressingMode, ResultRecord};
use crate::error::PostDeseqError;

pub const DEFAULT_PREFIX: &str = "gene:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedIdentifier {
    pub clean_id: String,
    pub join_key: String,
    /// Text after the first `.`, only set in locus-versioned mode.
    pub version_suffix: Option<String>,
}

/// Derives the clean identifier and join key for every record of a run.
#[derive(Debug, Clone)]
pub struct IdentifierNormalizer {
    prefix: String,
    mode: AddressingMode,
}

impl IdentifierNormalizer {
    pub fn new(prefix: impl Into<String>, mode: AddressingMode) -> Self {
        Self {
            prefix: prefix.into(),
            mode,
        }
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    pub fn normalize(&self, gene_id: &str) -> Result<NormalizedIdentifier, PostDeseqError> {
        // Repeated prefixes are all removed so that normalizing is idempotent.
        let clean_id = gene_id.trim_start_matches(self.prefix.as_str());
        match self.mode {
            AddressingMode::Direct => Ok(NormalizedIdentifier {
                clean_id: clean_id.to_string(),
                join_key: clean_id.to_string(),
                version_suffix: None,
            }),
            AddressingMode::LocusVersioned => {
                let (locus, version) = clean_id
                    .split_once('.')
                    .ok_or_else(|| PostDeseqError::MalformedIdentifier(gene_id.to_string()))?;
                Ok(NormalizedIdentifier {
                    clean_id: clean_id.to_string(),
                    join_key: locus.to_string(),
                    version_suffix: Some(version.to_string()),
                })
            }
        }
    }

    pub fn normalize_record(&self, record: ResultRecord) -> Result<NormalizedRecord, PostDeseqError> {
        let id = self.normalize(&record.gene_id)?;
        Ok(NormalizedRecord { record, id })
    }
}

impl Default for IdentifierNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX, AddressingMode::Direct)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub record: ResultRecord,
    pub id: NormalizedIdentifier,
}

impl NormalizedRecord {
    pub fn clean_id(&self) -> &str {
        &self.id.clean_id
    }

    pub fn join_key(&self) -> &str {
        &self.id.join_key
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn strips_prefix_only_at_start() {
        let normalizer = IdentifierNormalizer::default();
        assert_eq!(normalizer.normalize("gene:AT1G01010").unwrap().clean_id, "AT1G01010");
        assert_eq!(
            normalizer.normalize("AT1G01010gene:x").unwrap().clean_id,
            "AT1G01010gene:x"
        );
        assert_eq!(normalizer.normalize("gene:gene:X").unwrap().clean_id, "X");
    }

    #[test]
    fn direct_mode_keeps_versions() {
        let normalizer = IdentifierNormalizer::default();
        let id = normalizer.normalize("gene:AT1G01010.1").unwrap();
        assert_eq!(id.join_key, "AT1G01010.1");
        assert_eq!(id.version_suffix, None);
    }

    #[test]
    fn direct_mode_is_idempotent() {
        let normalizer = IdentifierNormalizer::default();
        for raw in ["gene:AT1G01010", "gene:gene:X.1", "plain", ""] {
            let once = normalizer.normalize(raw).unwrap();
            let twice = normalizer.normalize(&once.clean_id).unwrap();
            assert_eq!(once, twice, "{raw}");
        }
    }

    #[test]
    fn locus_mode_splits_on_first_dot() {
        let normalizer = IdentifierNormalizer::new("gene:", AddressingMode::LocusVersioned);
        let id = normalizer.normalize("gene:Solyc01g000100.2").unwrap();
        assert_eq!(id.clean_id, "Solyc01g000100.2");
        assert_eq!(id.join_key, "Solyc01g000100");
        assert_eq!(id.version_suffix.as_deref(), Some("2"));

        let id = normalizer.normalize("Solyc01g000100.3.1").unwrap();
        assert_eq!(id.join_key, "Solyc01g000100");
        assert_eq!(id.version_suffix.as_deref(), Some("3.1"));
    }

    #[test]
    fn locus_mode_requires_separator() {
        let normalizer = IdentifierNormalizer::new("gene:", AddressingMode::LocusVersioned);
        let err = normalizer.normalize("gene:Solyc01g000100").unwrap_err();
        assert_matches!(err, PostDeseqError::MalformedIdentifier(_));
    }
}
