//! Significance categories.
//!
//! The seven categories live in one table; the identifier rendering used by
//! the annotated table and the `True`/`False` rendering used by the
//! expression tables are both derived from the same predicate evaluation.

use crate::normalize::NormalizedRecord;

/// A fixed significance category over adjusted p-value and log2 fold change.
#[derive(Debug, Clone, Copy)]
pub struct Category {
    /// Short name used in output file names.
    pub name: &'static str,
    /// Column header used in the annotated table.
    pub label: &'static str,
    predicate: fn(f64, f64) -> bool,
}

impl Category {
    pub fn holds(&self, log2_fold_change: f64, p_adj: f64) -> bool {
        (self.predicate)(log2_fold_change, p_adj)
    }
}

pub static CATEGORIES: [Category; 7] = [
    Category {
        name: "padj_low_005",
        label: "padj<0.05",
        predicate: |_, padj| padj < 0.05,
    },
    Category {
        name: "log2FC_high_0_padj_low_005",
        label: "log2FC>0 and padj<0.05",
        predicate: |lfc, padj| padj < 0.05 && lfc > 0.0,
    },
    Category {
        name: "log2FC_low_0_and_padj_low005",
        label: "log2FC<0 and padj<0.05",
        predicate: |lfc, padj| padj < 0.05 && lfc < 0.0,
    },
    Category {
        name: "padj_low_001",
        label: "padj<0.01",
        predicate: |_, padj| padj < 0.01,
    },
    Category {
        name: "log2FC_high_1_and_padj_low_001",
        label: "log2FC>1 and padj<0.01",
        predicate: |lfc, padj| padj < 0.01 && lfc > 1.0,
    },
    Category {
        name: "log2FC_low_minus_1_and_padj_low_001",
        label: "log2FC<-1 and padj<0.01",
        predicate: |lfc, padj| padj < 0.01 && lfc < -1.0,
    },
    Category {
        name: "log2FC_higher_1_or_log2FC_low_minus_1_and_padj_001",
        label: "(log2FC>1 or log2FC<-1) and padj<0.01",
        predicate: |lfc, padj| padj < 0.01 && (lfc > 1.0 || lfc < -1.0),
    },
];

/// Truth value of every category for one record, in [`CATEGORIES`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryFlags([bool; 7]);

impl CategoryFlags {
    pub fn get(&self, index: usize) -> bool {
        self.0[index]
    }

    pub fn by_name(&self, name: &str) -> Option<bool> {
        CATEGORIES
            .iter()
            .position(|category| category.name == name)
            .map(|index| self.0[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static Category, bool)> + '_ {
        CATEGORIES.iter().zip(self.0.iter().copied())
    }

    /// Clean identifier when the category holds, empty otherwise.
    pub fn identifier_rendering<'a>(&self, index: usize, clean_id: &'a str) -> &'a str {
        if self.0[index] { clean_id } else { "" }
    }

    /// `"True"` or `"False"`, the format GOseq expects.
    pub fn boolean_rendering(&self, index: usize) -> &'static str {
        if self.0[index] { "True" } else { "False" }
    }
}

pub fn classify_values(log2_fold_change: f64, p_adj: f64) -> CategoryFlags {
    CategoryFlags(CATEGORIES.map(|category| category.holds(log2_fold_change, p_adj)))
}

pub fn classify(record: &NormalizedRecord) -> CategoryFlags {
    classify_values(record.record.log2_fold_change, record.record.p_adj)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LFC: [f64; 11] = [-3.0, -1.0, -0.999, -0.2, 0.0, 0.2, 0.999, 1.0, 1.001, 4.0, -1.001];
    const SAMPLE_PADJ: [f64; 8] = [0.0, 1e-6, 0.009, 0.01, 0.011, 0.049, 0.05, 0.9];

    fn expect(flags: CategoryFlags, expected: [bool; 7]) {
        for (index, value) in expected.iter().enumerate() {
            assert_eq!(flags.get(index), *value, "{}", CATEGORIES[index].name);
        }
    }

    #[test]
    fn category_names_are_fixed() {
        let names = CATEGORIES.map(|category| category.name);
        assert_eq!(
            names,
            [
                "padj_low_005",
                "log2FC_high_0_padj_low_005",
                "log2FC_low_0_and_padj_low005",
                "padj_low_001",
                "log2FC_high_1_and_padj_low_001",
                "log2FC_low_minus_1_and_padj_low_001",
                "log2FC_higher_1_or_log2FC_low_minus_1_and_padj_001",
            ]
        );
    }

    #[test]
    fn strongly_upregulated_gene() {
        expect(
            classify_values(1.3, 0.002),
            [true, true, false, true, true, false, true],
        );
    }

    #[test]
    fn padj_at_threshold_is_excluded() {
        for lfc in [-2.0, 0.0, 2.0] {
            let flags = classify_values(lfc, 0.05);
            assert!(!flags.get(0) && !flags.get(1) && !flags.get(2));
        }
        let flags = classify_values(2.0, 0.01);
        assert!(flags.get(0) && !flags.get(3) && !flags.get(4) && !flags.get(6));
    }

    #[test]
    fn fold_change_at_threshold_is_excluded() {
        expect(
            classify_values(1.0, 0.001),
            [true, true, false, true, false, false, false],
        );
        expect(
            classify_values(-1.0, 0.001),
            [true, false, true, true, false, false, false],
        );
        expect(
            classify_values(0.0, 0.001),
            [true, false, false, true, false, false, false],
        );
    }

    #[test]
    fn strong_change_is_union_of_up_and_down() {
        for lfc in SAMPLE_LFC {
            for padj in SAMPLE_PADJ {
                let flags = classify_values(lfc, padj);
                assert_eq!(flags.get(6), flags.get(4) || flags.get(5), "{lfc} {padj}");
            }
        }
    }

    #[test]
    fn renderings_agree() {
        for lfc in SAMPLE_LFC {
            for padj in SAMPLE_PADJ {
                let flags = classify_values(lfc, padj);
                for index in 0..CATEGORIES.len() {
                    let id = flags.identifier_rendering(index, "G1");
                    let boolean = flags.boolean_rendering(index);
                    assert_eq!(!id.is_empty(), boolean == "True");
                }
            }
        }
    }

    #[test]
    fn lookup_by_name() {
        let flags = classify_values(-2.0, 0.001);
        assert_eq!(flags.by_name("log2FC_low_minus_1_and_padj_low_001"), Some(true));
        assert_eq!(flags.by_name("log2FC_high_0_padj_low_005"), Some(false));
        assert_eq!(flags.by_name("unknown"), None);
    }
}
