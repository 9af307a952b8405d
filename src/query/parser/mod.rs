//! From the raw query to the canonical query plus its typed filters.

pub mod annotation;
pub mod filter;
pub mod studies;

use std::time::Duration;

use itertools::Itertools;

use crate::annotation::AnnotationLookup;
use crate::err::{Result, VariantQueryError};
use crate::metadata::{MetadataRegistry, StudyMetadata};
use crate::query::executor::validate_timeout;
use crate::query::projection::{ProjectionResolver, VariantQueryProjection};
use crate::query::schema::{EngineConfig, Event, Query, QueryOptions, QueryParam};
use crate::query::utils::{IS, NONE};

use self::filter::VariantFilter;
use self::studies::StudyContext;

/// A validated query, ready for dispatch.
#[derive(Debug, Clone)]
pub struct ParsedVariantQuery {
    /// The canonical query.
    pub query: Query,
    /// The query as given by the caller.
    pub input_query: Query,
    pub options: QueryOptions,
    pub projection: VariantQueryProjection,
    pub filters: Vec<VariantFilter>,
    pub default_study: Option<StudyMetadata>,
    pub events: Vec<Event>,
    /// Resolved page size.
    pub limit: usize,
    pub skip: usize,
    pub timeout: Duration,
}

impl ParsedVariantQuery {
    pub fn filter<T>(&self, f: impl Fn(&VariantFilter) -> Option<&T>) -> Option<&T> {
        self.filters.iter().find_map(f)
    }

    /// Whether some filter applies to the variant annotation.
    pub fn has_annotation_filters(&self) -> bool {
        self.filters.iter().any(|f| f.is_annotation_filter())
    }
}

/// Normalizes and parses queries against one registry.
pub struct VariantQueryParser<'a> {
    registry: &'a dyn MetadataRegistry,
    annotation: &'a dyn AnnotationLookup,
    config: &'a EngineConfig,
}

impl<'a> VariantQueryParser<'a> {
    pub fn new(
        registry: &'a dyn MetadataRegistry,
        annotation: &'a dyn AnnotationLookup,
        config: &'a EngineConfig,
    ) -> Self {
        Self {
            registry,
            annotation,
            config,
        }
    }

    /// Rewrite `query` into its canonical form.
    ///
    /// The canonical form is a fixed point: preprocessing it again yields the
    /// same query.
    pub fn preprocess(
        &self,
        query: &Query,
        options: &QueryOptions,
        events: &mut Vec<Event>,
    ) -> Result<Query> {
        let (query, projection) = self.normalize(query, options, events)?;
        events.extend(projection.events);
        Ok(query)
    }

    /// The canonical query plus the projection it was completed from.
    ///
    /// Sample pagination is only visible in this projection; the canonical
    /// query lists the paged samples explicitly.
    fn normalize(
        &self,
        query: &Query,
        options: &QueryOptions,
        events: &mut Vec<Event>,
    ) -> Result<(Query, VariantQueryProjection)> {
        tracing::debug!("preprocessing {}", query);
        let query = annotation::preprocess(query.clone(), self.annotation, options, events)?;
        let ctx = StudyContext::new(self.registry, &query)?;
        let query = studies::preprocess(query, &ctx)?;
        let projection =
            ProjectionResolver::new(self.registry, self.config).resolve(&query, options)?;
        let query = complete_projection(query, &projection);
        tracing::debug!("canonical query {}", query);
        Ok((query, projection))
    }

    /// Validate paging and timeout, normalize `query` and build its filters.
    pub fn parse(&self, query: &Query, options: &QueryOptions) -> Result<ParsedVariantQuery> {
        let (limit, skip) = validate_limit(options, self.config)?;
        let timeout = validate_timeout(options, self.config)?;

        let mut events = Vec::new();
        let (canonical, projection) = self.normalize(query, options, &mut events)?;
        let ctx = StudyContext::new(self.registry, &canonical)?;
        events.extend(projection.events.iter().cloned());
        let filters = filter::parse_filters(&canonical, &ctx)?;

        Ok(ParsedVariantQuery {
            query: canonical,
            input_query: query.clone(),
            options: options.clone(),
            projection,
            filters,
            default_study: ctx.default_study().cloned(),
            events,
            limit,
            skip,
            timeout,
        })
    }
}

/// Resolve `limit` and `skip` against the configured bounds.
pub fn validate_limit(options: &QueryOptions, config: &EngineConfig) -> Result<(usize, usize)> {
    let limit = match options.limit {
        None => config.limit_default,
        Some(limit) if limit < 0 => {
            return Err(VariantQueryError::malformed_param_with(
                "limit",
                limit,
                "Expected a non-negative number",
            ))
        }
        Some(limit) if limit > config.limit_max => {
            return Err(VariantQueryError::limit_exceeded(
                "limit",
                limit,
                config.limit_max,
            ))
        }
        Some(limit) => limit,
    };
    let skip = match options.skip {
        None => 0,
        Some(skip) if skip < 0 => {
            return Err(VariantQueryError::malformed_param_with(
                "skip",
                skip,
                "Expected a non-negative number",
            ))
        }
        Some(skip) => skip,
    };
    Ok((limit as usize, skip as usize))
}

/// Write the resolved projection back into the query.
///
/// Skipped when all include lists are explicit and no sample paging was
/// requested.
fn complete_projection(query: Query, projection: &VariantQueryProjection) -> Query {
    let determined = query.is_valid(QueryParam::IncludeStudy)
        && query.is_valid(QueryParam::IncludeSample)
        && query.is_valid(QueryParam::IncludeFile);
    let paging =
        query.is_valid(QueryParam::SampleSkip) || query.is_valid(QueryParam::SampleLimit);
    if determined && !paging {
        return query;
    }

    let or_none = |values: Vec<String>| {
        if values.is_empty() {
            NONE.to_string()
        } else {
            values.join(",")
        }
    };
    let qualify = projection.studies.len() > 1;
    let resource = |study: &str, name: &str| {
        if qualify {
            format!("{}{}{}", study, IS, name)
        } else {
            name.to_string()
        }
    };
    let samples = projection
        .studies
        .iter()
        .flat_map(|(study, p)| p.samples.iter().map(|s| resource(study, &s.name)))
        .collect_vec();
    let files = projection
        .studies
        .iter()
        .flat_map(|(study, p)| p.files.iter().map(|f| resource(study, &f.name)))
        .collect_vec();

    query
        .without(QueryParam::SampleSkip)
        .without(QueryParam::SampleLimit)
        .with(QueryParam::NumTotalSamples, projection.num_total_samples)
        .with(QueryParam::NumSamples, projection.num_samples)
        .with(QueryParam::IncludeStudy, or_none(projection.study_names()))
        .with(QueryParam::IncludeSample, or_none(samples))
        .with(QueryParam::IncludeFile, or_none(files))
}
