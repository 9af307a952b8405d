//! Matching ids from the search index, rows from the row store.

use crate::err::Result;
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::VariantCount;
use crate::query::schema::options::{UseSearchIndex, VariantQuerySource};

use super::{VariantIterator, VariantQueryExecutor};

#[derive(Debug, Default)]
pub struct SearchIndexVariantQueryExecutor;

/// Whether the search index may and can answer `query`, whether or not it is
/// worth it.
pub fn search_index_usable(engine: &VariantQueryEngine, query: &ParsedVariantQuery) -> bool {
    match engine.search_index() {
        Some(index) => {
            engine.config().search_index_enabled
                && index.is_active()
                && query.options.use_search_index != UseSearchIndex::No
                && index.supports(query)
        }
        None => false,
    }
}

impl VariantQueryExecutor for SearchIndexVariantQueryExecutor {
    fn name(&self) -> &'static str {
        "search_index"
    }

    fn source(&self) -> VariantQuerySource {
        VariantQuerySource::SecondaryAnnotationIndex
    }

    fn can_use_this_executor(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<bool> {
        if !search_index_usable(engine, query) {
            return Ok(false);
        }
        Ok(query.options.use_search_index == UseSearchIndex::Yes
            || query.options.source == VariantQuerySource::SecondaryAnnotationIndex
            || query.has_annotation_filters())
    }

    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>> {
        let index = engine
            .search_index()
            .ok_or_else(|| anyhow::anyhow!("no search index configured"))?;
        let ids = index.search_ids(query)?;
        tracing::debug!("search index returned {} ids", ids.len());
        let variants = engine.store().get_by_ids(&ids)?;
        Ok(Box::new(variants.into_iter().map(Ok)))
    }

    fn count(&self, engine: &VariantQueryEngine, query: &ParsedVariantQuery) -> Result<VariantCount> {
        let index = engine
            .search_index()
            .ok_or_else(|| anyhow::anyhow!("no search index configured"))?;
        Ok(VariantCount::exact(index.count(query)?))
    }
}
