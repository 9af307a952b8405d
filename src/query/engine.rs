//! Entry point of the query layer: parse, dispatch and run variant and facet
//! queries.

use std::sync::{Arc, OnceLock};

use thousands::Separable;

use crate::annotation::AnnotationLookup;
use crate::backend::{SampleIndex, SearchIndex, VariantStore};
use crate::err::{Result, VariantQueryError};
use crate::metadata::MetadataRegistry;
use crate::query::aggregation::{
    ChromDensityVariantAggregationExecutor, DefaultVariantAggregationExecutor,
    SearchIndexVariantAggregationExecutor, VariantAggregationExecutor,
};
use crate::query::executor::breakend::BreakendVariantQueryExecutor;
use crate::query::executor::compound_heterozygous::{
    CompoundHeterozygousQueryExecutor, PrecomputedCompoundHeterozygousQueryExecutor,
};
use crate::query::executor::db_adaptor::DbAdaptorVariantQueryExecutor;
use crate::query::executor::sample_index::SampleIndexOnlyVariantQueryExecutor;
use crate::query::executor::search_index::SearchIndexVariantQueryExecutor;
use crate::query::executor::{with_deadline, VariantIterator, VariantQueryExecutor};
use crate::query::parser::studies::MISSING_SAMPLE;
use crate::query::parser::{ParsedVariantQuery, VariantQueryParser};
use crate::query::result::{VariantCount, VariantFacetResult, VariantQueryResult};
use crate::query::schema::options::{UseSearchIndex, VariantQuerySource};
use crate::query::schema::{EngineConfig, Query, QueryOptions, QueryParam};

/// Query engine over one registry and its backends.
///
/// The engine holds no per-request state; the executor lists are built on
/// first use and shared by all requests.
pub struct VariantQueryEngine {
    registry: Arc<dyn MetadataRegistry>,
    annotation: Arc<dyn AnnotationLookup>,
    store: Arc<dyn VariantStore>,
    search_index: Option<Arc<dyn SearchIndex>>,
    sample_index: Option<Arc<dyn SampleIndex>>,
    config: EngineConfig,
    executors: OnceLock<Vec<Box<dyn VariantQueryExecutor>>>,
    aggregation_executors: OnceLock<Vec<Box<dyn VariantAggregationExecutor>>>,
}

impl VariantQueryEngine {
    pub fn new(
        registry: Arc<dyn MetadataRegistry>,
        annotation: Arc<dyn AnnotationLookup>,
        store: Arc<dyn VariantStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            annotation,
            store,
            search_index: None,
            sample_index: None,
            config,
            executors: OnceLock::new(),
            aggregation_executors: OnceLock::new(),
        }
    }

    pub fn with_search_index(mut self, index: Arc<dyn SearchIndex>) -> Self {
        self.search_index = Some(index);
        self
    }

    pub fn with_sample_index(mut self, index: Arc<dyn SampleIndex>) -> Self {
        self.sample_index = Some(index);
        self
    }

    pub fn registry(&self) -> &dyn MetadataRegistry {
        self.registry.as_ref()
    }

    pub fn store(&self) -> &dyn VariantStore {
        self.store.as_ref()
    }

    pub fn search_index(&self) -> Option<&dyn SearchIndex> {
        self.search_index.as_deref()
    }

    pub fn sample_index(&self) -> Option<&dyn SampleIndex> {
        self.sample_index.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executors in priority order; the last one accepts every query.
    fn executors(&self) -> &[Box<dyn VariantQueryExecutor>] {
        self.executors.get_or_init(|| {
            vec![
                Box::new(PrecomputedCompoundHeterozygousQueryExecutor),
                Box::new(CompoundHeterozygousQueryExecutor),
                Box::new(BreakendVariantQueryExecutor),
                Box::new(SampleIndexOnlyVariantQueryExecutor),
                Box::new(SearchIndexVariantQueryExecutor),
                Box::new(DbAdaptorVariantQueryExecutor),
            ]
        })
    }

    fn aggregation_executors(&self) -> &[Box<dyn VariantAggregationExecutor>] {
        self.aggregation_executors.get_or_init(|| {
            vec![
                Box::new(ChromDensityVariantAggregationExecutor),
                Box::new(SearchIndexVariantAggregationExecutor),
                Box::new(DefaultVariantAggregationExecutor),
            ]
        })
    }

    fn parser(&self) -> VariantQueryParser<'_> {
        VariantQueryParser::new(
            self.registry.as_ref(),
            self.annotation.as_ref(),
            &self.config,
        )
    }

    /// Validate and normalize `query`.
    pub fn parse(&self, query: &Query, options: &QueryOptions) -> Result<ParsedVariantQuery> {
        self.parser().parse(query, options)
    }

    /// The canonical form of `query`.
    pub fn preprocess(&self, query: &Query, options: &QueryOptions) -> Result<Query> {
        self.parser().preprocess(query, options, &mut Vec::new())
    }

    /// The executor answering `query`.
    ///
    /// With `source` or `useSearchIndex=yes` only executors of the requested
    /// index are considered, and finding none is an error.
    pub fn executor(&self, query: &ParsedVariantQuery) -> Result<&dyn VariantQueryExecutor> {
        let forced = match (query.options.source, query.options.use_search_index) {
            (VariantQuerySource::VariantIndex, UseSearchIndex::Yes) => {
                Some(VariantQuerySource::SecondaryAnnotationIndex)
            }
            (VariantQuerySource::VariantIndex, _) => None,
            (source, _) => Some(source),
        };
        for executor in self.executors() {
            if forced.map(|f| f != executor.source()).unwrap_or(false) {
                continue;
            }
            if executor.can_use_this_executor(self, query)? {
                tracing::debug!("using executor {}", executor.name());
                return Ok(executor.as_ref());
            }
            tracing::trace!("executor {} can not answer the query", executor.name());
        }
        match forced {
            Some(source) => Err(VariantQueryError::malformed_param_with(
                "source",
                source,
                "The requested index can not answer the query",
            )),
            None => unreachable!("cannot happen: the row store executor accepts all queries"),
        }
    }

    fn aggregation_executor(
        &self,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<&dyn VariantAggregationExecutor> {
        for executor in self.aggregation_executors() {
            if executor.can_use(self, query, facet)? {
                tracing::debug!("using aggregation executor {}", executor.name());
                return Ok(executor.as_ref());
            }
        }
        unreachable!("cannot happen: the default aggregation executor accepts all facets")
    }

    /// All matching variants of a parsed query, unpaged and unprojected.
    pub fn iterator<'a>(&'a self, query: &ParsedVariantQuery) -> Result<VariantIterator<'a>> {
        let executor = self.executor(query)?;
        Ok(with_deadline(executor.iterator(self, query)?, query.timeout))
    }

    /// One page of variants.
    pub fn get(&self, query: &Query, options: &QueryOptions) -> Result<VariantQueryResult> {
        let parsed = self.parse(query, options)?;
        self.get_parsed(&parsed)
    }

    pub fn get_parsed(&self, query: &ParsedVariantQuery) -> Result<VariantQueryResult> {
        let executor = self.executor(query)?;
        let result = executor.get(self, query)?;
        tracing::info!(
            "{} variants from {} in {} ms",
            result.num_results.separate_with_commas(),
            result.source,
            result.time
        );
        Ok(result)
    }

    /// Number of matching variants.
    pub fn count(&self, query: &Query, options: &QueryOptions) -> Result<VariantCount> {
        let parsed = self.parse(query, options)?;
        let executor = self.executor(&parsed)?;
        let count = executor.count(self, &parsed)?;
        tracing::info!(
            "{}{} matching variants from {}",
            if count.approximate { "~" } else { "" },
            count.count.separate_with_commas(),
            executor.name()
        );
        Ok(count)
    }

    /// Facet counts of the matching variants, facets taken from the options.
    pub fn facet(&self, query: &Query, options: &QueryOptions) -> Result<VariantFacetResult> {
        let facet = options
            .facet
            .clone()
            .filter(|f| !f.trim().is_empty())
            .ok_or_else(|| VariantQueryError::malformed_param("facet", ""))?;
        let parsed = self.parse(query, options)?;
        let executor = self.aggregation_executor(&parsed, &facet)?;
        let result = executor.aggregation(self, &parsed, &facet)?;
        tracing::info!(
            "{} facets over {} variants from {} in {} ms",
            result.facets.len(),
            result.num_matches.separate_with_commas(),
            result.source,
            result.time
        );
        Ok(result)
    }

    /// Compound heterozygous variants of `proband`.
    ///
    /// Without any parent given, both are taken from the pedigree.
    pub fn compound_heterozygous(
        &self,
        query: &Query,
        options: &QueryOptions,
        proband: &str,
        father: Option<&str>,
        mother: Option<&str>,
    ) -> Result<VariantQueryResult> {
        let trio = match (father, mother) {
            (None, None) => proband.to_string(),
            (father, mother) => format!(
                "{},{},{}",
                proband,
                father.unwrap_or(MISSING_SAMPLE),
                mother.unwrap_or(MISSING_SAMPLE)
            ),
        };
        let query = query
            .clone()
            .without(QueryParam::Sample)
            .without(QueryParam::Genotype)
            .with(QueryParam::SampleCompoundHeterozygous, trio);
        self.get(&query, options)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::*;
    use crate::query::schema::EventType;
    use crate::test_utils;

    fn ids(result: &VariantQueryResult) -> Vec<String> {
        result.results.iter().map(|v| v.id()).collect()
    }

    fn include(fields: &[&str]) -> QueryOptions {
        QueryOptions {
            include: Some(fields.iter().map(|f| f.to_string()).collect()),
            ..Default::default()
        }
    }

    #[rstest]
    #[case::row_store(Query::new().with(QueryParam::Study, "S1"), QueryOptions::default(), true, true, "variant_index")]
    #[case::annotation(Query::new().with(QueryParam::Gene, "G"), QueryOptions::default(), true, true, "search_index")]
    #[case::annotation_without_index(Query::new().with(QueryParam::Gene, "G"), QueryOptions::default(), false, true, "variant_index")]
    #[case::search_index_disabled(
        Query::new().with(QueryParam::Gene, "G"),
        QueryOptions { use_search_index: UseSearchIndex::No, ..Default::default() },
        true,
        true,
        "variant_index"
    )]
    #[case::breakend(Query::new().with(QueryParam::Type, "BREAKEND"), QueryOptions::default(), true, true, "breakend")]
    #[case::sample_index(
        Query::new().with(QueryParam::Study, "S1").with(QueryParam::Genotype, "John:0/1"),
        include(&["studies.samples"]),
        true,
        true,
        "sample_index"
    )]
    #[case::sample_index_with_annotation(
        Query::new().with(QueryParam::Study, "S1").with(QueryParam::Genotype, "John:0/1"),
        QueryOptions::default(),
        false,
        true,
        "variant_index"
    )]
    #[case::family_index(
        Query::new().with(QueryParam::Study, "S1").with(QueryParam::SampleCompoundHeterozygous, "John"),
        QueryOptions::default(),
        true,
        true,
        "sample_index_compound_heterozygous"
    )]
    #[case::detector(
        Query::new().with(QueryParam::Study, "S1").with(QueryParam::SampleCompoundHeterozygous, "John"),
        QueryOptions::default(),
        true,
        false,
        "compound_heterozygous"
    )]
    #[case::sample_data(
        Query::new().with(QueryParam::Study, "S1").with(QueryParam::SampleData, "John:DP>10"),
        QueryOptions::default(),
        true,
        true,
        "variant_index"
    )]
    fn dispatch(
        #[case] query: Query,
        #[case] options: QueryOptions,
        #[case] search_index: bool,
        #[case] sample_index: bool,
        #[case] expected: &str,
    ) -> Result<()> {
        let engine = test_utils::engine(search_index, sample_index);
        let parsed = engine.parse(&query, &options)?;
        assert_eq!(engine.executor(&parsed)?.name(), expected);
        Ok(())
    }

    #[test]
    fn forced_index_must_answer() -> Result<()> {
        let engine = test_utils::engine(true, true);
        let options = QueryOptions {
            source: VariantQuerySource::SecondarySampleIndex,
            ..Default::default()
        };
        let parsed = engine.parse(&Query::new().with(QueryParam::Type, "SNV"), &options)?;
        assert!(matches!(
            engine.executor(&parsed),
            Err(VariantQueryError::MalformedParam { .. })
        ));

        let options = QueryOptions {
            use_search_index: UseSearchIndex::Yes,
            ..Default::default()
        };
        let parsed = engine.parse(&Query::new().with(QueryParam::Type, "SNV"), &options)?;
        assert_eq!(engine.executor(&parsed)?.name(), "search_index");
        Ok(())
    }

    #[traced_test]
    #[test]
    fn get_pages_and_counts() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let options = QueryOptions {
            limit: Some(2),
            skip: Some(1),
            count: true,
            sample_metadata: true,
            ..Default::default()
        };
        let result = engine.get(&Query::new().with(QueryParam::Study, "S1"), &options)?;

        assert_eq!(ids(&result), vec!["1:2000:C:T", "1:5000:C:T"]);
        assert_eq!(result.num_results, 2);
        assert_eq!(result.num_matches, Some(5));
        assert!(!result.approximate_count);
        assert_eq!(result.source, "variant_index");
        assert_eq!(
            result.samples.as_ref().map(|s| s.keys().cloned().collect::<Vec<_>>()),
            Some(vec!["S1".to_string()])
        );
        assert!(logs_contain("2 variants from variant_index"));
        Ok(())
    }

    #[rstest]
    #[case::paged(Some(1), true, 1)]
    #[case::all_samples(None, false, 4)]
    fn sample_pagination_is_reported(
        #[case] sample_limit: Option<i64>,
        #[case] paginated: bool,
        #[case] num_samples: usize,
    ) -> Result<()> {
        let engine = test_utils::engine(false, false);
        let mut query = Query::new().with(QueryParam::Study, "S1");
        if let Some(limit) = sample_limit {
            query = query.with(QueryParam::SampleLimit, limit);
        }
        let parsed = engine.parse(&query, &QueryOptions::default())?;
        assert_eq!(parsed.projection.sample_pagination, paginated);

        let result = engine.get_parsed(&parsed)?;
        assert_eq!(result.num_samples, Some(num_samples));
        assert_eq!(result.num_total_samples, Some(4));
        assert_eq!(
            result.events.iter().any(|e| e.event_type == EventType::Info
                && e.message.starts_with("Returning 1 of 4 samples")),
            paginated
        );
        Ok(())
    }

    #[test]
    fn sub_queries_skip_missing_genes() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::Gene, "G,NOPE");
        let options = QueryOptions {
            skip_missing_genes: true,
            ..Default::default()
        };
        assert_eq!(engine.get(&query, &options)?.num_results, 2);

        let result = engine.compound_heterozygous(&query, &options, "John", None, None)?;
        assert_eq!(ids(&result), vec!["1:1000:C:T", "1:2000:C:T"]);

        let density = engine.facet(
            &query,
            &QueryOptions {
                facet: Some("chromDensity[1:1-10000]:1000".into()),
                ..options.clone()
            },
        )?;
        assert_eq!(density.source, "chrom_density");
        assert!(density
            .events
            .iter()
            .any(|e| e.event_type == EventType::Warning));
        Ok(())
    }

    #[test]
    fn limit_exceeded_before_any_backend_call() {
        let engine = test_utils::engine(false, false);
        let options = QueryOptions {
            limit: Some(100_000),
            ..Default::default()
        };
        assert!(matches!(
            engine.get(&Query::new(), &options),
            Err(VariantQueryError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn approximate_count_is_flagged() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let options = QueryOptions {
            approximate_count: true,
            approximate_count_sampling_size: Some(2),
            ..Default::default()
        };
        let count = engine.count(&Query::new().with(QueryParam::Study, "S1"), &options)?;
        assert_eq!(
            count,
            VariantCount {
                count: 5,
                approximate: true,
                sampling_size: Some(2),
            }
        );
        Ok(())
    }

    #[test]
    fn breakend_mates_are_returned() -> Result<()> {
        let mut dataset = test_utils::dataset(false, false);
        dataset.variants = vec![
            crate::query::schema::Variant::new("1", 100, "N", "N[2:300["),
            crate::query::schema::Variant::new("2", 300, "N", "]1:100]N"),
            crate::query::schema::Variant::new("2", 500, "N", "N[3:10["),
        ];
        let engine = dataset.into_engine(EngineConfig::default())?;
        let result = engine.get(
            &Query::new()
                .with(QueryParam::Type, "BREAKEND")
                .with(QueryParam::Region, "1"),
            &QueryOptions::default(),
        )?;
        assert_eq!(result.source, "breakend");
        assert_eq!(ids(&result), vec!["1:100:N:N[2:300[", "2:300:N:]1:100]N"]);
        Ok(())
    }

    #[test]
    fn compound_heterozygous_trio() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let result = engine.compound_heterozygous(
            &Query::new().with(QueryParam::Study, "S1"),
            &include(&["id"]),
            "John",
            None,
            None,
        )?;

        assert_eq!(result.source, "compound_heterozygous");
        assert_eq!(ids(&result), vec!["1:1000:C:T", "1:2000:C:T"]);
        assert!(result.results.iter().all(|v| v.annotation.is_some()));
        Ok(())
    }

    #[test]
    fn compound_heterozygous_with_missing_father() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let result = engine.compound_heterozygous(
            &Query::new().with(QueryParam::Study, "S1"),
            &QueryOptions::default(),
            "John",
            None,
            Some("Mary"),
        )?;
        // with only the mother known, hom-ref alleles of hers count as paternal
        assert_eq!(ids(&result), vec!["1:1000:C:T", "1:2000:C:T"]);
        Ok(())
    }

    #[test]
    fn density_facet() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let options = QueryOptions {
            facet: Some("chromDensity[1:1-10000]:1000".into()),
            ..Default::default()
        };
        let result = engine.facet(&Query::new().with(QueryParam::Study, "S1"), &options)?;

        assert_eq!(result.source, "chrom_density");
        assert_eq!(result.num_matches, 4);
        let region = &result.facets[0].buckets[0];
        assert_eq!(region.value, "1:1-10000");
        let windows = &region.facet_fields[0];
        assert_eq!(windows.buckets.len(), 10);
        assert_eq!(
            windows.buckets.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![1, 1, 0, 0, 1, 1, 0, 0, 0, 0]
        );
        assert_eq!(windows.buckets.iter().map(|b| b.count).sum::<u64>(), 4);
        assert_eq!(windows.buckets[1].value, "1001");
        Ok(())
    }

    #[test]
    fn categorical_facet_without_search_index() -> Result<()> {
        let engine = test_utils::engine(false, false);
        let options = QueryOptions {
            facet: Some("gene;chromDensity[2]".into()),
            ..Default::default()
        };
        let result = engine.facet(&Query::new(), &options)?;

        assert_eq!(result.source, "variant_index");
        assert_eq!(result.num_matches, 5);
        assert_eq!(result.facets[0].name, "gene");
        assert_eq!(result.facets[1].name, "chromDensity");
        assert_eq!(result.facets[1].count, 1);
        Ok(())
    }

    #[test]
    fn facet_required() {
        let engine = test_utils::engine(false, false);
        assert!(matches!(
            engine.facet(&Query::new(), &QueryOptions::default()),
            Err(VariantQueryError::MalformedParam { .. })
        ));
    }
}
