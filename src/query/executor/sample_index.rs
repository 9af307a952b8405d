//! Queries answered by the sample index alone.

use crate::err::Result;
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::filter::VariantFilter;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::VariantCount;
use crate::query::schema::options::VariantQuerySource;
use crate::query::schema::VariantField;

use super::{VariantIterator, VariantQueryExecutor};

#[derive(Debug, Default)]
pub struct SampleIndexOnlyVariantQueryExecutor;

/// Whether every filter is one the sample index evaluates.
fn covered_by_sample_index(query: &ParsedVariantQuery) -> bool {
    query.filters.iter().all(|f| match f {
        VariantFilter::Location(l) => l.is_positional(),
        VariantFilter::Type(_)
        | VariantFilter::ConsequenceType(_)
        | VariantFilter::Biotype(_)
        | VariantFilter::Genotype(_)
        | VariantFilter::Study(_) => true,
        _ => false,
    })
}

impl VariantQueryExecutor for SampleIndexOnlyVariantQueryExecutor {
    fn name(&self) -> &'static str {
        "sample_index"
    }

    fn source(&self) -> VariantQuerySource {
        VariantQuerySource::SecondarySampleIndex
    }

    fn can_use_this_executor(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<bool> {
        let index = match engine.sample_index() {
            Some(index) => index,
            None => return Ok(false),
        };
        let has_genotypes = query
            .filters
            .iter()
            .any(|f| matches!(f, VariantFilter::Genotype(_)));
        Ok(has_genotypes
            && covered_by_sample_index(query)
            && query.projection.studies.len() == 1
            && !query.projection.fields.contains(&VariantField::Annotation)
            && index.supports(query))
    }

    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>> {
        let index = engine
            .sample_index()
            .ok_or_else(|| anyhow::anyhow!("no sample index configured"))?;
        let ids = index.query_ids(query)?;
        let variants = engine.store().get_by_ids(&ids)?;
        Ok(Box::new(variants.into_iter().map(Ok)))
    }

    fn count(&self, engine: &VariantQueryEngine, query: &ParsedVariantQuery) -> Result<VariantCount> {
        let index = engine
            .sample_index()
            .ok_or_else(|| anyhow::anyhow!("no sample index configured"))?;
        Ok(VariantCount::exact(index.query_ids(query)?.len() as u64))
    }
}
