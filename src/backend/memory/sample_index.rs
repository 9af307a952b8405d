//! Sample index over the in-memory row store.

use std::sync::Arc;

use crate::backend::SampleIndex;
use crate::metadata::{MetadataRegistry, TaskStatus};
use crate::query::moi::{self, DamagingConsequences};
use crate::query::parser::filter::{CompoundHeterozygousFilter, StudyResource, VariantFilter};
use crate::query::parser::ParsedVariantQuery;

use super::MemoryVariantStore;

/// Genotypes of the indexed samples plus the family index of the probands
/// with a ready status.
pub struct MemorySampleIndex {
    store: Arc<MemoryVariantStore>,
    registry: Arc<dyn MetadataRegistry>,
}

impl MemorySampleIndex {
    pub fn new(store: Arc<MemoryVariantStore>, registry: Arc<dyn MetadataRegistry>) -> Self {
        Self { store, registry }
    }

    fn is_indexed(&self, sample: &StudyResource) -> bool {
        match self.registry.sample(sample.study.id, sample.name()) {
            Ok(Some(sample)) => sample.indexed,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!("could not look up sample {}: {}", sample.name(), e);
                false
            }
        }
    }
}

impl SampleIndex for MemorySampleIndex {
    fn supports(&self, query: &ParsedVariantQuery) -> bool {
        query.filters.iter().all(|f| match f {
            VariantFilter::Genotype(samples) => samples.iter().all(|kv| self.is_indexed(&kv.key)),
            VariantFilter::Location(l) => l.is_positional(),
            VariantFilter::Type(_)
            | VariantFilter::ConsequenceType(_)
            | VariantFilter::Biotype(_)
            | VariantFilter::Study(_) => true,
            _ => false,
        })
    }

    fn query_ids(&self, query: &ParsedVariantQuery) -> Result<Vec<String>, anyhow::Error> {
        self.store.matching(query)?.map(|v| v.map(|v| v.id())).collect()
    }

    fn has_family_index(&self, study: &str, proband: &str) -> Result<bool, anyhow::Error> {
        let study = match self.registry.study(study)? {
            Some(study) => study,
            None => return Ok(false),
        };
        Ok(self
            .registry
            .sample(study.id, proband)?
            .map(|s| s.family_index_status == TaskStatus::Ready)
            .unwrap_or(false))
    }

    fn compound_heterozygous(
        &self,
        query: &ParsedVariantQuery,
        trio: &CompoundHeterozygousFilter,
    ) -> Result<Vec<String>, anyhow::Error> {
        let candidates = self
            .store
            .matching(query)?
            .map(|v| v.map(|v| v.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let result =
            moi::compound_heterozygous(candidates, trio, &DamagingConsequences::of_query(query));
        Ok(result.variants.iter().map(|v| v.id()).collect())
    }
}
