//! Sequence ontology consequence terms and the derived term sets.

/// Consequence terms and their SO accession numbers.
pub const SO_TERMS: &[(&str, u32)] = &[
    ("transcript_ablation", 1893),
    ("splice_acceptor_variant", 1574),
    ("splice_donor_variant", 1575),
    ("stop_gained", 1587),
    ("frameshift_variant", 1589),
    ("stop_lost", 1578),
    ("start_lost", 2012),
    ("transcript_amplification", 1889),
    ("inframe_insertion", 1821),
    ("inframe_deletion", 1822),
    ("missense_variant", 1583),
    ("protein_altering_variant", 1818),
    ("splice_region_variant", 1630),
    ("incomplete_terminal_codon_variant", 1626),
    ("start_retained_variant", 2019),
    ("stop_retained_variant", 1567),
    ("synonymous_variant", 1819),
    ("coding_sequence_variant", 1580),
    ("mature_miRNA_variant", 1620),
    ("5_prime_UTR_variant", 1623),
    ("3_prime_UTR_variant", 1624),
    ("non_coding_transcript_exon_variant", 1792),
    ("intron_variant", 1627),
    ("NMD_transcript_variant", 1621),
    ("non_coding_transcript_variant", 1619),
    ("upstream_gene_variant", 1631),
    ("downstream_gene_variant", 1632),
    ("TFBS_ablation", 1895),
    ("TFBS_amplification", 1892),
    ("TF_binding_site_variant", 1782),
    ("regulatory_region_ablation", 1894),
    ("regulatory_region_amplification", 1891),
    ("feature_elongation", 1907),
    ("regulatory_region_variant", 1566),
    ("feature_truncation", 1906),
    ("intergenic_variant", 1628),
];

/// Loss-of-function terms.
pub const LOSS_OF_FUNCTION: &[&str] = &[
    "frameshift_variant",
    "incomplete_terminal_codon_variant",
    "start_lost",
    "stop_gained",
    "stop_lost",
    "splice_acceptor_variant",
    "splice_donor_variant",
    "feature_truncation",
    "transcript_ablation",
];

/// Terms added to `LOSS_OF_FUNCTION` for protein altering variants.
const PROTEIN_ALTERING_EXTRA: &[&str] = &["inframe_deletion", "inframe_insertion", "missense_variant"];

/// Terms added to `PROTEIN_ALTERING` for compound heterozygous detection.
const LOF_EXTENDED_EXTRA: &[&str] = &["splice_region_variant"];

/// Biotype required by compound heterozygous detection.
pub const PROTEIN_CODING: &str = "protein_coding";

pub fn protein_altering() -> Vec<&'static str> {
    LOSS_OF_FUNCTION
        .iter()
        .chain(PROTEIN_ALTERING_EXTRA.iter())
        .copied()
        .collect()
}

pub fn loss_of_function_extended() -> Vec<&'static str> {
    protein_altering()
        .into_iter()
        .chain(LOF_EXTENDED_EXTRA.iter().copied())
        .collect()
}

/// Look up the term of an accession given as `SO:0001583` or `1583`.
pub fn term_for_accession(value: &str) -> Option<&'static str> {
    let number = match value.get(..3) {
        Some(prefix) if prefix.eq_ignore_ascii_case("SO:") => &value[3..],
        _ => value,
    };
    let accession = number.parse::<u32>().ok()?;
    SO_TERMS
        .iter()
        .find(|(_, acc)| *acc == accession)
        .map(|(term, _)| *term)
}

/// Look up a term, case-insensitive.
pub fn term(value: &str) -> Option<&'static str> {
    SO_TERMS
        .iter()
        .find(|(term, _)| term.eq_ignore_ascii_case(value))
        .map(|(term, _)| *term)
}
