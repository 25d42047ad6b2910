use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PostDeseqError;

/// How gene identifiers are turned into annotation join keys.
///
/// Selected once per run. `Direct` joins on the full accession, while
/// `LocusVersioned` drops the `.N` version suffix and joins on the locus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressingMode {
    Direct,
    LocusVersioned,
}

impl AddressingMode {
    /// Annotation column the join key is looked up in when none is configured.
    pub fn default_key_column(&self) -> &'static str {
        match self {
            AddressingMode::Direct => "GeneID",
            AddressingMode::LocusVersioned => "locus",
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressingMode::Direct => write!(f, "direct"),
            AddressingMode::LocusVersioned => write!(f, "locus-versioned"),
        }
    }
}

impl FromStr for AddressingMode {
    type Err = PostDeseqError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" | "a" => Ok(AddressingMode::Direct),
            "locus-versioned" | "locus" | "s" => Ok(AddressingMode::LocusVersioned),
            _ => Err(PostDeseqError::UnknownAddressingMode(value.to_string())),
        }
    }
}

/// What to do when the annotation table carries the same key more than once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateKeyPolicy {
    /// Keep the first row for each key and log a warning.
    First,
    /// Refuse to load the table.
    Reject,
}

impl fmt::Display for DuplicateKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKeyPolicy::First => write!(f, "first"),
            DuplicateKeyPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl FromStr for DuplicateKeyPolicy {
    type Err = PostDeseqError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(DuplicateKeyPolicy::First),
            "reject" => Ok(DuplicateKeyPolicy::Reject),
            _ => Err(PostDeseqError::UnknownDuplicatePolicy(value.to_string())),
        }
    }
}

/// One row of a DESeq2 result table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecord {
    pub gene_id: String,
    pub base_mean: f64,
    pub log2_fold_change: f64,
    pub std_err: f64,
    pub wald_stat: f64,
    pub p_value: f64,
    pub p_adj: f64,
}

impl ResultRecord {
    /// Numeric columns in file order.
    pub fn numeric_fields(&self) -> [f64; 6] {
        [
            self.base_mean,
            self.log2_fold_change,
            self.std_err,
            self.wald_stat,
            self.p_value,
            self.p_adj,
        ]
    }
}

/// Column headers of the seven input fields, used by every output table.
pub const BASE_COLUMNS: [&str; 7] = [
    "GeneID",
    "Base mean",
    "log2FC",
    "StdErr",
    "Wald-Stats",
    "P-value",
    "P-adj",
];

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_addressing_mode_aliases() {
        assert_eq!(
            "direct".parse::<AddressingMode>().unwrap(),
            AddressingMode::Direct
        );
        assert_eq!("A".parse::<AddressingMode>().unwrap(), AddressingMode::Direct);
        assert_eq!(
            "S".parse::<AddressingMode>().unwrap(),
            AddressingMode::LocusVersioned
        );
        assert_eq!(
            "Locus-Versioned".parse::<AddressingMode>().unwrap(),
            AddressingMode::LocusVersioned
        );
    }

    #[test]
    fn parse_addressing_mode_invalid() {
        let err = "species".parse::<AddressingMode>().unwrap_err();
        assert_matches!(err, PostDeseqError::UnknownAddressingMode(_));
    }

    #[test]
    fn default_key_columns() {
        assert_eq!(AddressingMode::Direct.default_key_column(), "GeneID");
        assert_eq!(AddressingMode::LocusVersioned.default_key_column(), "locus");
    }

    #[test]
    fn parse_duplicate_policy() {
        assert_eq!(
            "Reject".parse::<DuplicateKeyPolicy>().unwrap(),
            DuplicateKeyPolicy::Reject
        );
        let err = "fan-out".parse::<DuplicateKeyPolicy>().unwrap_err();
        assert_matches!(err, PostDeseqError::UnknownDuplicatePolicy(_));
    }
}
