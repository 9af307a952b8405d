//! Backends over one dataset held in memory.

pub mod interpreter;
pub mod sample_index;
pub mod search;

use std::sync::Arc;

use bio::data_structures::interval_tree::ArrayBackedIntervalTree;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::annotation::InMemoryAnnotation;
use crate::common::canonicalize;
use crate::metadata::memory::{InMemoryRegistry, StudyDefinition};
use crate::metadata::MetadataRegistry;
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::filter::VariantFilter;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::VariantCount;
use crate::query::schema::{EngineConfig, Region, Variant};
use crate::query::sorting::compare_variants;

use self::interpreter::QueryInterpreter;
use self::sample_index::MemorySampleIndex;
use self::search::MemorySearchIndex;

use super::{RecordIterator, VariantStore};

/// Alias for the interval tree that we use.
type IntervalTree = ArrayBackedIntervalTree<u32, u32>;

fn default_true() -> bool {
    true
}

/// Registry, variants and annotation lookups of one dataset file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryDataset {
    #[serde(default)]
    pub studies: Vec<StudyDefinition>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub annotation: InMemoryAnnotation,
    /// Whether the search index is in sync.
    #[serde(default = "default_true")]
    pub search_index: bool,
    /// Whether the sample index is available.
    #[serde(default = "default_true")]
    pub sample_index: bool,
}

impl MemoryDataset {
    /// Load a dataset from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("could not parse dataset: {}", e))
    }

    /// Build an engine whose backends all serve this dataset.
    pub fn into_engine(self, config: EngineConfig) -> Result<VariantQueryEngine, anyhow::Error> {
        let registry: Arc<dyn MetadataRegistry> = Arc::new(InMemoryRegistry::new(self.studies)?);
        let store = Arc::new(MemoryVariantStore::new(self.variants, registry.clone()));
        let mut engine = VariantQueryEngine::new(
            registry.clone(),
            Arc::new(self.annotation),
            store.clone(),
            config,
        );
        if self.search_index {
            engine = engine.with_search_index(Arc::new(MemorySearchIndex::new(store.clone())));
        }
        if self.sample_index {
            engine = engine.with_sample_index(Arc::new(MemorySampleIndex::new(store, registry)));
        }
        Ok(engine)
    }
}

/// Row store over a sorted vector of variants.
pub struct MemoryVariantStore {
    /// Records in genomic order.
    variants: Vec<Variant>,
    /// Interval trees by canonical chromosome, data is the record index.
    trees: IndexMap<String, IntervalTree>,
    registry: Arc<dyn MetadataRegistry>,
}

impl MemoryVariantStore {
    pub fn new(mut variants: Vec<Variant>, registry: Arc<dyn MetadataRegistry>) -> Self {
        variants.sort_by(compare_variants);
        let mut trees: IndexMap<String, IntervalTree> = IndexMap::new();
        for (i, variant) in variants.iter().enumerate() {
            let key = variant.start.saturating_sub(1)..variant.end.max(variant.start);
            trees
                .entry(canonicalize(&variant.chromosome))
                .or_insert_with(IntervalTree::new)
                .insert(key, i as u32);
        }
        trees.values_mut().for_each(|tree| tree.index());
        tracing::debug!(
            "memory store with {} variants on {} chromosomes",
            variants.len(),
            trees.len()
        );
        Self {
            variants,
            trees,
            registry,
        }
    }

    pub fn registry(&self) -> &dyn MetadataRegistry {
        self.registry.as_ref()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Indices of the records overlapping any of `regions`, sorted.
    fn overlapping(&self, regions: &[Region]) -> Vec<usize> {
        let mut indices = regions
            .iter()
            .flat_map(|region| {
                let tree = self.trees.get(&canonicalize(&region.chromosome));
                let start = region.start.saturating_sub(1);
                let end = region.end.unwrap_or(u32::MAX).max(start + 1);
                tree.map(|tree| {
                    tree.find(start..end)
                        .iter()
                        .map(|e| *e.data() as usize)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default()
            })
            .collect::<Vec<_>>();
        indices.sort_unstable();
        indices.dedup();
        indices
    }

    /// Indices of the records a scan for `query` must look at.
    fn candidates(&self, query: &ParsedVariantQuery) -> Vec<usize> {
        let regions = query.filters.iter().find_map(|f| match f {
            VariantFilter::Location(l) if l.is_positional() && !l.is_empty() => {
                Some(l.all_regions())
            }
            _ => None,
        });
        match regions {
            Some(regions) => self.overlapping(&regions),
            None => (0..self.variants.len()).collect(),
        }
    }

    /// Records passing all filters, in genomic order.
    pub fn matching<'a>(
        &'a self,
        query: &ParsedVariantQuery,
    ) -> Result<impl Iterator<Item = Result<&'a Variant, anyhow::Error>> + 'a, anyhow::Error> {
        let interpreter = QueryInterpreter::new(query, self.registry.as_ref())?;
        Ok(self.candidates(query).into_iter().filter_map(move |i| {
            let variant = &self.variants[i];
            match interpreter.passes(variant) {
                Ok(true) => Some(Ok(variant)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }
}

impl VariantStore for MemoryVariantStore {
    fn iterator<'a>(
        &'a self,
        query: &ParsedVariantQuery,
    ) -> Result<RecordIterator<'a>, anyhow::Error> {
        Ok(Box::new(self.matching(query)?.map(|r| r.cloned())))
    }

    fn region<'a>(&'a self, region: &Region) -> Result<RecordIterator<'a>, anyhow::Error> {
        Ok(Box::new(
            self.overlapping(std::slice::from_ref(region))
                .into_iter()
                .map(move |i| Ok(self.variants[i].clone())),
        ))
    }

    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Variant>, anyhow::Error> {
        let by_id = self
            .variants
            .iter()
            .map(|v| (v.id(), v))
            .collect::<IndexMap<_, _>>();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id).map(|v| (*v).clone()))
            .collect())
    }

    fn approximate_count(
        &self,
        query: &ParsedVariantQuery,
        sampling_size: usize,
    ) -> Result<VariantCount, anyhow::Error> {
        let interpreter = QueryInterpreter::new(query, self.registry.as_ref())?;
        let candidates = self.candidates(query);
        let mut matches = 0u64;
        for i in candidates.iter().take(sampling_size) {
            if interpreter.passes(&self.variants[*i])? {
                matches += 1;
            }
        }
        if candidates.len() <= sampling_size {
            return Ok(VariantCount::exact(matches));
        }
        let count = (matches as f64 * candidates.len() as f64 / sampling_size as f64).round();
        tracing::debug!(
            "extrapolated {} matches in {} of {} records to {}",
            matches,
            sampling_size,
            candidates.len(),
            count
        );
        Ok(VariantCount {
            count: count as u64,
            approximate: true,
            sampling_size: Some(sampling_size),
        })
    }
}
