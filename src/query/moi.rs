//! Mode of inheritance grouping for compound heterozygous variants.

use enum_map::EnumMap;
use indexmap::IndexMap;
use itertools::Itertools;

use crate::query::genotypes::{Genotype, GenotypeClass};
use crate::query::parser::filter::{CompoundHeterozygousFilter, VariantFilter};
use crate::query::parser::ParsedVariantQuery;
use crate::query::schema::ontology::{loss_of_function_extended, PROTEIN_CODING};
use crate::query::schema::Variant;
use crate::query::sorting::compare_variants;

/// Parent an alternate allele was inherited from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, enum_map::Enum, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Side {
    Father,
    Mother,
}

/// Consequence types and biotypes a damaging allele must hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamagingConsequences {
    pub consequence_types: Vec<String>,
    pub biotypes: Vec<String>,
}

impl DamagingConsequences {
    /// The query's own `ct` and `biotype`, defaulting to the extended
    /// loss-of-function terms on protein coding transcripts.
    pub fn of_query(query: &ParsedVariantQuery) -> Self {
        let mut result = Self::default();
        for filter in &query.filters {
            match filter {
                VariantFilter::ConsequenceType(ct) => result.consequence_types = ct.values().to_vec(),
                VariantFilter::Biotype(b) => result.biotypes = b.values().to_vec(),
                _ => (),
            }
        }
        result
    }

    /// Genes of the transcripts hit.
    fn genes<'a>(&self, variant: &'a Variant) -> Vec<&'a str> {
        variant
            .annotation
            .iter()
            .flat_map(|a| a.consequence_types.iter())
            .filter(|c| !c.gene_name.is_empty())
            .filter(|c| self.biotypes.is_empty() || self.biotypes.contains(&c.biotype))
            .filter(|c| {
                self.consequence_types.is_empty()
                    || c.sequence_ontology_terms
                        .iter()
                        .any(|t| self.consequence_types.contains(t))
            })
            .map(|c| c.gene_name.as_str())
            .unique()
            .collect()
    }
}

impl Default for DamagingConsequences {
    fn default() -> Self {
        Self {
            consequence_types: loss_of_function_extended()
                .into_iter()
                .map(String::from)
                .collect(),
            biotypes: vec![PROTEIN_CODING.to_string()],
        }
    }
}

/// Alleles of one gene, split by the parent they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneGroup {
    pub sides: EnumMap<Side, Vec<String>>,
}

impl GeneGroup {
    pub fn is_compound_heterozygous(&self) -> bool {
        self.sides.values().all(|ids| !ids.is_empty())
    }

    /// Variant ids of both sides, paternal first.
    pub fn ids(&self) -> Vec<String> {
        self.sides.values().flatten().cloned().collect()
    }
}

/// Outcome of the grouping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompoundHeterozygousResult {
    /// Compound heterozygous genes with the ids of their variants.
    pub genes: IndexMap<String, Vec<String>>,
    /// Variants of all compound heterozygous genes, deduplicated and
    /// sorted.
    pub variants: Vec<Variant>,
}

fn genotype(variant: &Variant, study: &str, sample: &str) -> Option<Genotype> {
    variant
        .study(study)
        .and_then(|s| s.sample_gt(sample))
        .and_then(Genotype::parse)
}

/// Parent the alternate allele of a variant came from.
///
/// With one parent missing, an allele absent from the present parent is
/// attributed to the missing one.
pub fn inherited_from(trio: &CompoundHeterozygousFilter, variant: &Variant) -> Option<Side> {
    let study = &trio.study.name;
    let proband = genotype(variant, study, &trio.proband.name)?;
    if !GenotypeClass::Het.test(&proband) || !GenotypeClass::NonRef.test(&proband) {
        return None;
    }
    let parent = |p: &Option<crate::query::schema::ResourceId>| {
        p.as_ref().map(|p| genotype(variant, study, &p.name))
    };
    let carries = |gt: &Genotype| GenotypeClass::Het.test(gt) && GenotypeClass::NonRef.test(gt);
    let hom_ref = |gt: &Genotype| GenotypeClass::HomRef.test(gt);
    match (parent(&trio.father), parent(&trio.mother)) {
        (Some(Some(f)), Some(Some(m))) if carries(&f) && hom_ref(&m) => Some(Side::Father),
        (Some(Some(f)), Some(Some(m))) if hom_ref(&f) && carries(&m) => Some(Side::Mother),
        (Some(Some(f)), None) if carries(&f) => Some(Side::Father),
        (Some(Some(f)), None) if hom_ref(&f) => Some(Side::Mother),
        (None, Some(Some(m))) if carries(&m) => Some(Side::Mother),
        (None, Some(Some(m))) if hom_ref(&m) => Some(Side::Father),
        _ => None,
    }
}

/// Group the candidate variants by gene and keep the genes with damaging
/// alleles from both parents.
pub fn compound_heterozygous(
    candidates: impl IntoIterator<Item = Variant>,
    trio: &CompoundHeterozygousFilter,
    consequences: &DamagingConsequences,
) -> CompoundHeterozygousResult {
    let mut groups: IndexMap<String, GeneGroup> = IndexMap::new();
    let mut variants: IndexMap<String, Variant> = IndexMap::new();
    for variant in candidates {
        let side = match inherited_from(trio, &variant) {
            Some(side) => side,
            None => continue,
        };
        let id = variant.id();
        for gene in consequences.genes(&variant) {
            let ids = &mut groups.entry(gene.to_string()).or_default().sides[side];
            if !ids.contains(&id) {
                ids.push(id.clone());
            }
        }
        variants.entry(id).or_insert(variant);
    }

    let genes = groups
        .into_iter()
        .filter(|(gene, group)| {
            let keep = group.is_compound_heterozygous();
            if !keep {
                tracing::trace!("gene {} has alleles from one parent only", gene);
            }
            keep
        })
        .map(|(gene, group)| (gene, group.ids()))
        .collect::<IndexMap<_, _>>();
    let mut variants = genes
        .values()
        .flatten()
        .unique()
        .filter_map(|id| variants.get(id).cloned())
        .collect::<Vec<_>>();
    variants.sort_by(compare_variants);
    tracing::debug!(
        "{} compound heterozygous variants in {} genes",
        variants.len(),
        genes.len()
    );
    CompoundHeterozygousResult { genes, variants }
}
