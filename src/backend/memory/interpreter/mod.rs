//! Apply the typed filters of a `ParsedVariantQuery` to `Variant` records.

use std::collections::HashMap;

mod consequences;
mod files;
mod genotype;
mod location;
mod scores;

use crate::metadata::MetadataRegistry;
use crate::query::parser::filter::VariantFilter;
use crate::query::parser::ParsedVariantQuery;
use crate::query::schema::{Values, Variant};

/// Parent names of `(study, sample)`.
pub type Parents = HashMap<(String, String), (Option<String>, Option<String>)>;

/// Hold data structures that support the interpretation of one query to
/// multiple `Variant` records.
#[derive(Debug, Clone, Default)]
pub struct QueryInterpreter {
    pub filters: Vec<VariantFilter>,
    /// Parents of the samples of the family filters.
    pub parents: Parents,
}

impl QueryInterpreter {
    /// Construct new `QueryInterpreter`, looking up the pedigree of the
    /// samples the family filters refer to.
    pub fn new(
        query: &ParsedVariantQuery,
        registry: &dyn MetadataRegistry,
    ) -> Result<Self, anyhow::Error> {
        let mut parents = Parents::new();
        for filter in &query.filters {
            let samples = match filter {
                VariantFilter::MendelianError(samples) | VariantFilter::DeNovo(samples) => samples,
                _ => continue,
            };
            for sample in samples.iter() {
                let metadata = match registry.sample(sample.study.id, sample.name())? {
                    Some(metadata) => metadata,
                    None => continue,
                };
                let name = |id: Option<u32>| -> Result<Option<String>, anyhow::Error> {
                    Ok(match id {
                        Some(id) => registry
                            .sample_by_id(sample.study.id, id)?
                            .map(|s| s.name),
                        None => None,
                    })
                };
                parents.insert(
                    (sample.study.name.clone(), sample.name().to_string()),
                    (name(metadata.father_id)?, name(metadata.mother_id)?),
                );
            }
        }
        Ok(Self {
            filters: query.filters.clone(),
            parents,
        })
    }

    fn consequence_filters(&self) -> (Option<&Values<String>>, Option<&Values<String>>) {
        let mut ct = None;
        let mut biotype = None;
        for filter in &self.filters {
            match filter {
                VariantFilter::ConsequenceType(v) => ct = Some(v),
                VariantFilter::Biotype(v) => biotype = Some(v),
                _ => (),
            }
        }
        (ct, biotype)
    }

    /// Determine whether the `Variant` passes all filters.
    pub fn passes(&self, variant: &Variant) -> Result<bool, anyhow::Error> {
        let (ct, biotype) = self.consequence_filters();
        if !consequences::passes(ct, biotype, variant) {
            return Ok(false);
        }
        for filter in &self.filters {
            let pass = match filter {
                VariantFilter::Location(l) => location::passes(l, variant),
                VariantFilter::Reference(v) => v.iter().any(|r| *r == variant.reference),
                VariantFilter::Alternate(v) => v.iter().any(|a| *a == variant.alternate),
                VariantFilter::Type(types) => types.contains(&variant.variant_type),
                VariantFilter::ConsequenceType(_) | VariantFilter::Biotype(_) => true,
                VariantFilter::GeneSet(g) => consequences::passes_gene_set(g, variant),
                VariantFilter::ProteinSubstitution(v) => {
                    consequences::passes_protein_substitution(v, variant)?
                }
                VariantFilter::Study(studies) => studies.test::<(), _>(|s| {
                    Ok(variant.study(&s.value.name).is_some() != s.negated)
                })
                .unwrap_or(false),
                VariantFilter::File(v) => files::passes(v, variant),
                VariantFilter::FileData(v) => files::passes_file_data(v, variant)?,
                VariantFilter::Genotype(v) => genotype::passes(v, variant),
                VariantFilter::SampleData(v) => genotype::passes_sample_data(v, variant)?,
                VariantFilter::MendelianError(v) => {
                    genotype::passes_mendelian_error(v, &self.parents, variant)
                }
                VariantFilter::DeNovo(v) => genotype::passes_de_novo(v, &self.parents, variant),
                VariantFilter::CompoundHeterozygous(trio) => {
                    genotype::passes_compound_heterozygous(trio, variant)
                }
                VariantFilter::Cohort(v) => scores::passes_cohort(v, variant),
                VariantFilter::Score(v) => scores::passes(v, variant),
            };
            if !pass {
                tracing::trace!("variant {} fails {}", variant, filter.describe());
                return Ok(false);
            }
        }
        Ok(true)
    }
}
