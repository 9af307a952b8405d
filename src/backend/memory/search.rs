//! Search index over the in-memory row store.

use std::sync::Arc;

use crate::backend::SearchIndex;
use crate::query::aggregation::categorical::{self, CategoricalFacet};
use crate::query::parser::filter::VariantFilter;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::FacetField;

use super::MemoryVariantStore;

/// Indexes variant and annotation fields; sample and file data are not
/// indexed.
pub struct MemorySearchIndex {
    store: Arc<MemoryVariantStore>,
}

impl MemorySearchIndex {
    pub fn new(store: Arc<MemoryVariantStore>) -> Self {
        Self { store }
    }
}

impl SearchIndex for MemorySearchIndex {
    fn is_active(&self) -> bool {
        true
    }

    fn supports(&self, query: &ParsedVariantQuery) -> bool {
        !query.filters.iter().any(|f| {
            matches!(
                f,
                VariantFilter::SampleData(_)
                    | VariantFilter::FileData(_)
                    | VariantFilter::MendelianError(_)
                    | VariantFilter::DeNovo(_)
                    | VariantFilter::CompoundHeterozygous(_)
            )
        })
    }

    fn search_ids(&self, query: &ParsedVariantQuery) -> Result<Vec<String>, anyhow::Error> {
        self.store.matching(query)?.map(|v| v.map(|v| v.id())).collect()
    }

    fn count(&self, query: &ParsedVariantQuery) -> Result<u64, anyhow::Error> {
        let mut count = 0;
        for variant in self.store.matching(query)? {
            variant?;
            count += 1;
        }
        Ok(count)
    }

    fn supports_facet(&self, facet: &str) -> bool {
        CategoricalFacet::parse(facet).is_ok()
    }

    fn facet(
        &self,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<Vec<FacetField>, anyhow::Error> {
        let facet = CategoricalFacet::parse(facet).map_err(|e| anyhow::anyhow!("{}", e))?;
        let variants = self.store.matching(query)?.collect::<Result<Vec<_>, _>>()?;
        Ok(categorical::count(&[facet], variants))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::schema::{Query, QueryOptions, QueryParam};
    use crate::test_utils;

    #[test]
    fn facet_over_matching_variants() -> Result<(), anyhow::Error> {
        let engine = test_utils::engine(true, false);
        let query = engine.parse(
            &Query::new().with(QueryParam::Gene, "G,H"),
            &QueryOptions::default(),
        )?;
        let index = engine.search_index().expect("search index attached");

        assert!(index.supports(&query));
        assert_eq!(index.count(&query)?, 4);
        let fields = index.facet(&query, "type")?;
        assert_eq!(fields[0].buckets[0].value, "SNV");
        assert_eq!(fields[0].buckets[0].count, 4);
        assert!(!index.supports_facet("chromDensity[1]"));
        Ok(())
    }
}
