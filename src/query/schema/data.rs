//! Variant records returned by the backends.

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// Variant types.
///
/// `SNP`, `MNP` and `CNV` are deprecated and map to `SNV`, `MNV` and
/// `COPY_NUMBER`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum VariantType {
    #[default]
    Snv,
    Snp,
    Mnv,
    Mnp,
    Indel,
    Insertion,
    Deletion,
    Inversion,
    Translocation,
    Duplication,
    TandemDuplication,
    Cnv,
    CopyNumber,
    CopyNumberGain,
    CopyNumberLoss,
    Breakend,
    Sv,
    NoVariation,
    Symbolic,
    Mixed,
}

impl VariantType {
    /// Canonical type for deprecated aliases.
    pub fn canonical(&self) -> Option<VariantType> {
        match self {
            VariantType::Snp => Some(VariantType::Snv),
            VariantType::Mnp => Some(VariantType::Mnv),
            VariantType::Cnv => Some(VariantType::CopyNumber),
            _ => None,
        }
    }

    pub fn is_deprecated(&self) -> bool {
        self.canonical().is_some()
    }

    /// Declared direct subtypes.
    pub fn direct_subtypes(&self) -> &'static [VariantType] {
        match self {
            VariantType::Sv => &[
                VariantType::Insertion,
                VariantType::Deletion,
                VariantType::Inversion,
                VariantType::Translocation,
                VariantType::Duplication,
                VariantType::CopyNumber,
                VariantType::Breakend,
            ],
            VariantType::CopyNumber => &[VariantType::CopyNumberGain, VariantType::CopyNumberLoss],
            VariantType::Duplication => &[VariantType::TandemDuplication],
            _ => &[],
        }
    }

    /// All transitive subtypes, without the type itself.
    pub fn subtypes(&self) -> BTreeSet<VariantType> {
        let mut result = BTreeSet::new();
        let mut stack = self.direct_subtypes().to_vec();
        while let Some(t) = stack.pop() {
            if result.insert(t) {
                stack.extend_from_slice(t.direct_subtypes());
            }
        }
        result
    }

    /// All non-deprecated types.
    pub fn universe() -> impl Iterator<Item = VariantType> {
        VariantType::iter().filter(|t| !t.is_deprecated())
    }

    pub fn is_structural(&self) -> bool {
        *self == VariantType::Sv || VariantType::Sv.subtypes().contains(self)
    }
}

/// One consequence of a variant on a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConsequenceType {
    pub gene_name: String,
    pub gene_id: String,
    pub transcript_id: Option<String>,
    pub biotype: String,
    /// Sequence ontology terms, e.g. `missense_variant`.
    pub sequence_ontology_terms: Vec<String>,
    /// Protein substitution scores by source, e.g. `sift` -> `0.1`.
    pub protein_substitution_scores: IndexMap<String, f64>,
}

/// Annotation of a variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantAnnotation {
    pub consequence_types: Vec<ConsequenceType>,
    /// External identifiers, e.g. `rs123`, `RCV000001`.
    pub xrefs: Vec<String>,
}

/// Per-sample data, `GT` plus further keys such as `DP`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleEntry {
    pub data: IndexMap<String, String>,
}

impl SampleEntry {
    pub fn with_gt(gt: &str) -> Self {
        let mut data = IndexMap::new();
        data.insert("GT".to_string(), gt.to_string());
        Self { data }
    }

    pub fn gt(&self) -> Option<&str> {
        self.data.get("GT").map(|s| s.as_str())
    }
}

/// Per-file data, `FILTER`, `QUAL` and further INFO keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileEntry {
    pub data: IndexMap<String, String>,
}

/// Precomputed statistics of one cohort.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantStats {
    pub alt_allele_freq: f64,
    pub alt_allele_count: u32,
}

/// Data of a variant within one study.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudyEntry {
    pub study_id: String,
    pub samples: IndexMap<String, SampleEntry>,
    pub files: IndexMap<String, FileEntry>,
    pub stats: IndexMap<String, VariantStats>,
    pub scores: IndexMap<String, f64>,
}

impl StudyEntry {
    pub fn sample_gt(&self, sample: &str) -> Option<&str> {
        self.samples.get(sample).and_then(|s| s.gt())
    }
}

/// A variant with its annotation and study entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Variant {
    pub chromosome: String,
    /// 1-based start position.
    pub start: u32,
    /// 1-based inclusive end position.
    pub end: u32,
    pub reference: String,
    pub alternate: String,
    #[serde(rename = "type")]
    pub variant_type: VariantType,
    pub names: Vec<String>,
    pub annotation: Option<VariantAnnotation>,
    pub studies: Vec<StudyEntry>,
}

/// Position of a breakend mate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakendMate {
    pub chromosome: String,
    pub position: u32,
}

impl Variant {
    /// Construct a variant from its coordinates, `end` derived from the
    /// reference length.
    pub fn new(chromosome: &str, start: u32, reference: &str, alternate: &str) -> Self {
        let end = if reference.is_empty() {
            start
        } else {
            start + reference.len() as u32 - 1
        };
        let variant_type = if reference.len() == 1 && alternate.len() == 1 {
            VariantType::Snv
        } else if reference.len() == alternate.len() && !alternate.starts_with('<') {
            VariantType::Mnv
        } else if alternate.contains(['[', ']']) {
            VariantType::Breakend
        } else {
            VariantType::Indel
        };
        Self {
            chromosome: chromosome.to_string(),
            start,
            end,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
            variant_type,
            ..Default::default()
        }
    }

    /// Identifier `chrom:start:ref:alt`, empty alleles rendered as `-`.
    pub fn id(&self) -> String {
        self.to_string()
    }

    pub fn study(&self, study: &str) -> Option<&StudyEntry> {
        self.studies.iter().find(|s| s.study_id == study)
    }

    /// Names of all genes of the consequence types.
    pub fn gene_names(&self) -> BTreeSet<&str> {
        self.annotation
            .iter()
            .flat_map(|a| a.consequence_types.iter())
            .filter(|ct| !ct.gene_name.is_empty())
            .map(|ct| ct.gene_name.as_str())
            .collect()
    }

    /// Mate position parsed from a breakend alternate such as `N[2:3215[`.
    pub fn breakend_mate(&self) -> Option<BreakendMate> {
        let start = self.alternate.find(['[', ']'])?;
        let rest = &self.alternate[start + 1..];
        let end = rest.find(['[', ']'])?;
        let (chromosome, position) = rest[..end].rsplit_once(':')?;
        Some(BreakendMate {
            chromosome: chromosome.to_string(),
            position: position.parse().ok()?,
        })
    }
}

impl Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allele = |s: &str| {
            if s.is_empty() {
                "-".to_string()
            } else {
                s.to_string()
            }
        };
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome,
            self.start,
            allele(&self.reference),
            allele(&self.alternate)
        )
    }
}

/// Parsed `chrom:start:ref:alt` identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantCoordinate {
    pub chromosome: String,
    pub start: u32,
    pub reference: String,
    pub alternate: String,
}

impl VariantCoordinate {
    /// Parse an identifier, splitting on the first three colons so that
    /// symbolic or breakend alternates may contain further colons.
    pub fn parse(s: &str) -> Option<Self> {
        let mut it = s.splitn(4, ':');
        let chromosome = it.next()?.to_string();
        let start = it.next()?.parse().ok()?;
        let reference = it.next()?;
        let alternate = it.next()?;
        let allele = |s: &str| if s == "-" { String::new() } else { s.to_string() };
        Some(Self {
            chromosome,
            start,
            reference: allele(reference),
            alternate: allele(alternate),
        })
    }

    pub fn matches(&self, variant: &Variant) -> bool {
        crate::common::canonicalize(&self.chromosome)
            == crate::common::canonicalize(&variant.chromosome)
            && self.start == variant.start
            && self.reference == variant.reference
            && self.alternate == variant.alternate
    }
}

impl Display for VariantCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let allele = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome,
            self.start,
            allele(&self.reference),
            allele(&self.alternate)
        )
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(VariantType::Snp, Some(VariantType::Snv))]
    #[case(VariantType::Cnv, Some(VariantType::CopyNumber))]
    #[case(VariantType::Indel, None)]
    fn variant_type_canonical(#[case] t: VariantType, #[case] expected: Option<VariantType>) {
        assert_eq!(t.canonical(), expected);
    }

    #[test]
    fn variant_type_subtypes() {
        assert_eq!(
            VariantType::CopyNumber.subtypes().into_iter().collect::<Vec<_>>(),
            vec![VariantType::CopyNumberGain, VariantType::CopyNumberLoss]
        );
        assert!(VariantType::Sv.subtypes().contains(&VariantType::TandemDuplication));
        assert!(VariantType::Snv.subtypes().is_empty());
        assert!(!VariantType::universe().any(|t| t.is_deprecated()));
    }

    #[test]
    fn variant_type_serde() {
        serde_test::assert_tokens(
            &VariantType::CopyNumberGain,
            &[serde_test::Token::UnitVariant {
                name: "VariantType",
                variant: "COPY_NUMBER_GAIN",
            }],
        );
        assert_eq!("indel".parse::<VariantType>().ok(), Some(VariantType::Indel));
    }

    #[test]
    fn variant_new_and_id() {
        let variant = Variant::new("1", 100, "AC", "A");
        assert_eq!(variant.end, 101);
        assert_eq!(variant.variant_type, VariantType::Indel);
        assert_eq!(variant.id(), "1:100:AC:A");
        assert_eq!(Variant::new("1", 100, "", "T").id(), "1:100:-:T");
    }

    #[rstest]
    #[case("N[2:3215[", Some(("2", 3215)))]
    #[case("]13:123456]T", Some(("13", 123456)))]
    #[case("<DEL>", None)]
    fn variant_breakend_mate(#[case] alt: &str, #[case] expected: Option<(&str, u32)>) {
        let variant = Variant::new("1", 100, "N", alt);
        assert_eq!(
            variant.breakend_mate(),
            expected.map(|(chromosome, position)| BreakendMate {
                chromosome: chromosome.to_string(),
                position,
            })
        );
    }

    #[test]
    fn variant_coordinate_parse() {
        let coord = VariantCoordinate::parse("1:100:A:<DEL:ME>");
        assert_eq!(
            coord,
            Some(VariantCoordinate {
                chromosome: "1".into(),
                start: 100,
                reference: "A".into(),
                alternate: "<DEL:ME>".into(),
            })
        );
        assert!(VariantCoordinate::parse("1:100").is_none());
        assert_eq!(
            VariantCoordinate::parse("2:5:-:T").map(|c| c.to_string()),
            Some("2:5:-:T".to_string())
        );
    }
}
