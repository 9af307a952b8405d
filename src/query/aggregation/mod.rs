//! Facet queries, answered by the first aggregation executor accepting
//! them.

pub mod categorical;
pub mod chrom_density;

use std::time::Instant;

use crate::err::{Result, VariantQueryError};
use crate::query::engine::VariantQueryEngine;
use crate::query::executor::search_index::search_index_usable;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::{FacetField, VariantFacetResult};
use crate::query::utils::AND;

use self::categorical::{CategoricalCounter, CategoricalFacet};
use self::chrom_density::{is_density_facet, DensityFacet};

/// One strategy for answering facet queries.
pub trait VariantAggregationExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    fn can_use(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<bool>;

    fn aggregation(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<VariantFacetResult>;
}

/// The `;` separated facets of a request.
pub fn split_facets(facet: &str) -> Vec<&str> {
    facet
        .split(AND)
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect()
}

fn facet_result(
    name: &str,
    query: &ParsedVariantQuery,
    facets: Vec<FacetField>,
    num_matches: u64,
    started: Instant,
) -> VariantFacetResult {
    VariantFacetResult {
        facets,
        num_matches,
        time: started.elapsed().as_millis() as u64,
        events: query.events.clone(),
        source: name.to_string(),
    }
}

/// Density facets only.
#[derive(Debug, Default)]
pub struct ChromDensityVariantAggregationExecutor;

impl VariantAggregationExecutor for ChromDensityVariantAggregationExecutor {
    fn name(&self) -> &'static str {
        "chrom_density"
    }

    fn can_use(
        &self,
        _engine: &VariantQueryEngine,
        _query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<bool> {
        let facets = split_facets(facet);
        Ok(!facets.is_empty() && facets.iter().all(|f| is_density_facet(f)))
    }

    fn aggregation(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<VariantFacetResult> {
        let started = Instant::now();
        let facets = split_facets(facet)
            .into_iter()
            .map(|f| {
                let density = DensityFacet::parse(f, engine.config().density_default_step)?;
                chrom_density::aggregate(engine, query, &density)
            })
            .collect::<Result<Vec<_>>>()?;
        let num_matches = facets.first().map(|f| f.count).unwrap_or_default();
        Ok(facet_result(self.name(), query, facets, num_matches, started))
    }
}

/// Facets computed by the search index.
#[derive(Debug, Default)]
pub struct SearchIndexVariantAggregationExecutor;

impl VariantAggregationExecutor for SearchIndexVariantAggregationExecutor {
    fn name(&self) -> &'static str {
        "search_index"
    }

    fn can_use(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<bool> {
        Ok(match engine.search_index() {
            Some(index) if search_index_usable(engine, query) => {
                split_facets(facet).iter().all(|f| index.supports_facet(f))
            }
            _ => false,
        })
    }

    fn aggregation(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<VariantFacetResult> {
        let started = Instant::now();
        let index = engine
            .search_index()
            .ok_or_else(|| anyhow::anyhow!("no search index configured"))?;
        let mut facets = Vec::new();
        for f in split_facets(facet) {
            facets.extend(index.facet(query, f)?);
        }
        let num_matches = index.count(query)?;
        Ok(facet_result(self.name(), query, facets, num_matches, started))
    }
}

/// Categorical facets counted over the dispatched variant iterator, density
/// facets by region sub-queries.
#[derive(Debug, Default)]
pub struct DefaultVariantAggregationExecutor;

impl VariantAggregationExecutor for DefaultVariantAggregationExecutor {
    fn name(&self) -> &'static str {
        "variant_index"
    }

    fn can_use(
        &self,
        _engine: &VariantQueryEngine,
        _query: &ParsedVariantQuery,
        _facet: &str,
    ) -> Result<bool> {
        Ok(true)
    }

    fn aggregation(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<VariantFacetResult> {
        let started = Instant::now();
        let requested = split_facets(facet);
        if requested.is_empty() {
            return Err(VariantQueryError::malformed_param_with(
                "facet",
                facet,
                "No facet requested",
            ));
        }

        // Parse everything before running any sub-query.
        let mut categorical = Vec::new();
        let mut densities = Vec::new();
        for (i, f) in requested.iter().enumerate() {
            if is_density_facet(f) {
                densities.push((i, DensityFacet::parse(f, engine.config().density_default_step)?));
            } else {
                categorical.push((i, CategoricalFacet::parse(f)?));
            }
        }

        let mut slots: Vec<Option<FacetField>> = vec![None; requested.len()];
        let mut num_matches = 0u64;
        let mut counter =
            CategoricalCounter::new(categorical.iter().map(|(_, f)| f.clone()).collect());
        for variant in engine.iterator(query)? {
            counter.add(&variant?);
            num_matches += 1;
        }
        for ((i, _), field) in categorical.iter().zip(counter.finish()) {
            slots[*i] = Some(field);
        }
        for (i, density) in &densities {
            slots[*i] = Some(chrom_density::aggregate(engine, query, density)?);
        }
        Ok(facet_result(
            self.name(),
            query,
            slots.into_iter().flatten().collect(),
            num_matches,
            started,
        ))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn split_facets_trims() {
        assert_eq!(
            split_facets("chromosome; gene>>ct ;"),
            vec!["chromosome", "gene>>ct"]
        );
        assert!(split_facets("").is_empty());
    }
}
