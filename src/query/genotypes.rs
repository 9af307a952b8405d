//! Genotype strings, genotype classes and their expansion against the
//! genotypes loaded into a study.

use std::fmt::{self, Display};

use super::schema::NegatableValue;

/// Genotype filter value used when genotypes are not available.
pub const NA_GT_VALUE: &str = "NA";
/// Genotype that matches no variant.
pub const NONE_GT_VALUE: &str = "x/x";
/// Genotype of samples not covered by the index.
pub const UNKNOWN_GENOTYPE: &str = "?/?";

const DEFAULT_LOADED_GENOTYPES: &[&str] = &[
    "0/0", "0|0", "0/1", "1/0", "1/1", "./.", "0|1", "1|0", "1|1", ".|.", "0|2", "2|0", "2|1",
    "1|2", "2|2", "0/2", "2/0", "2/1", "1/2", "2/2", UNKNOWN_GENOTYPE,
];

/// Genotypes assumed loaded when a study does not declare any.
pub fn default_loaded_genotypes() -> Vec<String> {
    DEFAULT_LOADED_GENOTYPES
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A parsed genotype such as `0/1`, `1|0` or `./.`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Genotype {
    /// Allele indices; `None` for missing alleles.
    pub alleles: Vec<Option<u32>>,
    pub phased: bool,
}

impl Genotype {
    pub fn parse(value: &str) -> Option<Self> {
        if value.is_empty() {
            return None;
        }
        let phased = value.contains('|');
        let separator = if phased { '|' } else { '/' };
        let alleles = value
            .split(separator)
            .map(|a| match a {
                "." => Some(None),
                _ => a.parse::<u32>().ok().map(Some),
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alleles, phased })
    }

    fn called(&self) -> impl Iterator<Item = u32> + '_ {
        self.alleles.iter().flatten().copied()
    }

    pub fn is_missing(&self) -> bool {
        self.alleles.iter().any(|a| a.is_none())
    }

    /// Sorted allele indices, for comparing phased against unphased forms.
    fn sorted_alleles(&self) -> Vec<Option<u32>> {
        let mut alleles = self.alleles.clone();
        alleles.sort();
        alleles
    }

    /// Whether some allele index is above 1.
    pub fn is_multiallelic(&self) -> bool {
        self.called().any(|a| a > 1)
    }

    /// Whether `other` equals this genotype, allele indices above 1
    /// matching any other index above 1.
    fn matches_multiallelic(&self, other: &Genotype) -> bool {
        self.phased == other.phased
            && self.alleles.len() == other.alleles.len()
            && self
                .alleles
                .iter()
                .zip(other.alleles.iter())
                .all(|(a, b)| match (a, b) {
                    (Some(a), Some(b)) if *a > 1 => *b > 1,
                    (a, b) => a == b,
                })
    }
}

impl Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let separator = if self.phased { "|" } else { "/" };
        let alleles = self
            .alleles
            .iter()
            .map(|a| match a {
                Some(a) => a.to_string(),
                None => ".".to_string(),
            })
            .collect::<Vec<_>>();
        write!(f, "{}", alleles.join(separator))
    }
}

/// Named classes of genotypes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum GenotypeClass {
    /// All alleles are the reference.
    HomRef,
    /// All alleles are the same alternate.
    HomAlt,
    /// At least two different alleles.
    Het,
    /// Heterozygous with one reference allele.
    HetRef,
    /// Heterozygous without reference allele.
    HetAlt,
    /// Some allele is missing.
    Miss,
    /// Some allele is an alternate.
    NonRef,
    /// Some allele is the main alternate.
    MainAlt,
}

impl GenotypeClass {
    pub fn test(&self, gt: &Genotype) -> bool {
        let called = gt.called().collect::<Vec<_>>();
        let distinct = {
            let mut d = called.clone();
            d.sort_unstable();
            d.dedup();
            d
        };
        match self {
            GenotypeClass::HomRef => !gt.is_missing() && called.iter().all(|a| *a == 0),
            GenotypeClass::HomAlt => {
                !gt.is_missing() && distinct.len() == 1 && distinct[0] > 0
            }
            GenotypeClass::Het => !gt.is_missing() && distinct.len() > 1,
            GenotypeClass::HetRef => !gt.is_missing() && distinct.len() > 1 && distinct[0] == 0,
            GenotypeClass::HetAlt => !gt.is_missing() && distinct.len() > 1 && distinct[0] > 0,
            GenotypeClass::Miss => gt.is_missing(),
            GenotypeClass::NonRef => called.iter().any(|a| *a > 0),
            GenotypeClass::MainAlt => called.iter().any(|a| *a == 1),
        }
    }

    /// The loaded genotypes of this class, in loaded order.
    pub fn filter(&self, loaded: &[String]) -> Vec<String> {
        loaded
            .iter()
            .filter(|gt| Genotype::parse(gt).map(|gt| self.test(&gt)).unwrap_or(false))
            .cloned()
            .collect()
    }
}

/// Loaded genotypes equivalent to one literal genotype.
///
/// An unphased genotype also stands for its phased forms, a multiallelic one
/// for all other alternates above 1.
fn expand_literal(value: &str, loaded: &[String]) -> Vec<String> {
    let gt = match Genotype::parse(value) {
        Some(gt) => gt,
        None => {
            return loaded
                .iter()
                .filter(|l| l.as_str() == value)
                .cloned()
                .collect()
        }
    };
    loaded
        .iter()
        .filter(|l| {
            let other = match Genotype::parse(l) {
                Some(other) => other,
                None => return false,
            };
            if gt.is_multiallelic() {
                gt.matches_multiallelic(&other)
                    || (!gt.phased
                        && other.phased
                        && Genotype {
                            alleles: other.alleles.clone(),
                            phased: false,
                        }
                        .matches_multiallelic(&gt))
            } else if gt.phased {
                other == gt
            } else {
                other.alleles.len() == gt.alleles.len()
                    && ((!other.phased && other == gt)
                        || (other.phased && other.sorted_alleles() == gt.sorted_alleles()))
            }
        })
        .cloned()
        .collect()
}

/// Expand genotype classes and literal genotypes against `loaded`.
///
/// Negation is kept per value.  An empty result is replaced by the genotype
/// that matches nothing.
pub fn expand_genotypes(
    values: &[NegatableValue<String>],
    loaded: &[String],
) -> Vec<NegatableValue<String>> {
    let mut result: Vec<NegatableValue<String>> = Vec::new();
    for value in values {
        let expanded = match value.value.parse::<GenotypeClass>() {
            Ok(class) => class.filter(loaded),
            Err(_) if value.value == NA_GT_VALUE => vec![NA_GT_VALUE.to_string()],
            Err(_) => expand_literal(&value.value, loaded),
        };
        for gt in expanded {
            let gt = NegatableValue::new(value.negated, gt);
            if !result.contains(&gt) {
                result.push(gt);
            }
        }
    }
    if result.is_empty() {
        let negated = values.first().map(|v| v.negated).unwrap_or(false);
        result.push(NegatableValue::new(negated, NONE_GT_VALUE.to_string()));
    }
    result
}

/// Genotypes meaning "the sample carries the variant".
///
/// `NA` if the study does not keep genotypes or loaded `NA`, else the loaded
/// genotypes with the main alternate.
pub fn sample_genotypes(loaded: &[String], exclude_genotypes: bool) -> Vec<String> {
    if exclude_genotypes || loaded.iter().any(|gt| gt == NA_GT_VALUE) {
        vec![NA_GT_VALUE.to_string()]
    } else {
        GenotypeClass::MainAlt.filter(loaded)
    }
}

/// Whether the genotype `actual` of a sample satisfies the filter genotype
/// `expected`, which is already expanded.
pub fn genotype_matches(expected: &str, actual: Option<&str>) -> bool {
    match expected {
        NA_GT_VALUE => actual.is_some(),
        NONE_GT_VALUE => false,
        _ => actual == Some(expected),
    }
}
