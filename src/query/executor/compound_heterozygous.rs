//! Compound heterozygous queries, from the family index or by running the
//! two inheritance patterns as sub-queries.

use std::time::Instant;

use crate::err::{Result, VariantQueryError};
use crate::query::engine::VariantQueryEngine;
use crate::query::moi::{self, DamagingConsequences};
use crate::query::parser::filter::{CompoundHeterozygousFilter, VariantFilter};
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::VariantQueryResult;
use crate::query::schema::ontology::{loss_of_function_extended, PROTEIN_CODING};
use crate::query::schema::options::VariantQuerySource;
use crate::query::schema::{Query, QueryOptions, QueryParam, VariantField};
use crate::query::utils::{self, AND, IS};

use super::{page, with_deadline, VariantIterator, VariantQueryExecutor};

/// The trio of the compound heterozygous filter of `query`.
fn trio(query: &ParsedVariantQuery) -> Option<&CompoundHeterozygousFilter> {
    query.filter(|f| match f {
        VariantFilter::CompoundHeterozygous(trio) => Some(trio),
        _ => None,
    })
}

fn require_trio(query: &ParsedVariantQuery) -> Result<&CompoundHeterozygousFilter> {
    trio(query).ok_or_else(|| {
        VariantQueryError::malformed_param(QueryParam::SampleCompoundHeterozygous, "")
    })
}

/// Fail if the caller restricted the included samples without the trio.
fn check_trio_included(query: &ParsedVariantQuery, trio: &CompoundHeterozygousFilter) -> Result<()> {
    let value = match query.input_query.get_string(QueryParam::IncludeSample) {
        Some(value) if !utils::is_all_value(&value) => value,
        _ => return Ok(()),
    };
    let included = if utils::is_none_value(&value) {
        Vec::new()
    } else {
        utils::split_value(QueryParam::IncludeSample, &value)?
            .into_values()
            .into_iter()
            .map(|s| utils::split_study_resource(&s).1.to_string())
            .collect()
    };
    let missing = trio
        .members()
        .into_iter()
        .filter(|m| !included.iter().any(|i| i == m))
        .collect::<Vec<_>>();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(VariantQueryError::unsupported_combination(
            QueryParam::IncludeSample,
            value,
            QueryParam::SampleCompoundHeterozygous,
            trio.members().join(","),
        ))
    }
}

/// One page of results with annotation and genotypes always included.
fn get_with_genotypes(
    executor: &dyn VariantQueryExecutor,
    engine: &VariantQueryEngine,
    query: &ParsedVariantQuery,
) -> Result<VariantQueryResult> {
    let started = Instant::now();
    let mut query = query.clone();
    query.projection.fields.extend([
        VariantField::Annotation,
        VariantField::Studies,
        VariantField::StudiesSamples,
    ]);
    let count = if query.options.count {
        Some(executor.count(engine, &query)?)
    } else {
        None
    };
    let iter = with_deadline(executor.iterator(engine, &query)?, query.timeout);
    page(executor.name(), iter, &query, count, started)
}

/// Genotype filter with the proband het and the given parent classes.
fn pattern(trio: &CompoundHeterozygousFilter, father: &str, mother: &str) -> String {
    std::iter::once(format!("{}{}HET", trio.proband.name, IS))
        .chain(trio.father.iter().map(|f| format!("{}{}{}", f.name, IS, father)))
        .chain(trio.mother.iter().map(|m| format!("{}{}{}", m.name, IS, mother)))
        .collect::<Vec<_>>()
        .join(&AND.to_string())
}

/// The paternal and the maternal sub-query.
pub fn sub_queries(query: &ParsedVariantQuery, trio: &CompoundHeterozygousFilter) -> [Query; 2] {
    let mut base = query
        .query
        .clone()
        .without(QueryParam::SampleCompoundHeterozygous)
        .with(QueryParam::Study, trio.study.name.as_str());
    if !base.is_valid(QueryParam::ConsequenceType) {
        base = base.with(
            QueryParam::ConsequenceType,
            loss_of_function_extended().join(","),
        );
    }
    if !base.is_valid(QueryParam::Biotype) {
        base = base.with(QueryParam::Biotype, PROTEIN_CODING);
    }
    [
        base.clone()
            .with(QueryParam::Genotype, pattern(trio, "HET", "HOM_REF")),
        base.with(QueryParam::Genotype, pattern(trio, "HOM_REF", "HET")),
    ]
}

/// The caller's options with the projection and paging of a sub-query.
fn sub_query_options(query: &ParsedVariantQuery) -> QueryOptions {
    QueryOptions {
        include: Some(vec![
            VariantField::Annotation.to_string(),
            VariantField::StudiesSamples.to_string(),
        ]),
        exclude: None,
        sort: true,
        skip: None,
        limit: None,
        count: false,
        facet: None,
        ..query.options.clone()
    }
}

/// Runs both inheritance patterns and groups the candidates by gene.
#[derive(Debug, Default)]
pub struct CompoundHeterozygousQueryExecutor;

impl VariantQueryExecutor for CompoundHeterozygousQueryExecutor {
    fn name(&self) -> &'static str {
        "compound_heterozygous"
    }

    fn can_use_this_executor(
        &self,
        _engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<bool> {
        Ok(trio(query).is_some())
    }

    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>> {
        let trio = require_trio(query)?;
        check_trio_included(query, trio)?;

        let options = sub_query_options(query);
        let mut candidates = Vec::new();
        let mut consequences = DamagingConsequences::default();
        for sub_query in sub_queries(query, trio) {
            let parsed = engine.parse(&sub_query, &options)?;
            consequences = DamagingConsequences::of_query(&parsed);
            for variant in engine.iterator(&parsed)? {
                candidates.push(variant?);
            }
        }
        tracing::debug!("{} compound heterozygous candidates", candidates.len());

        let result = moi::compound_heterozygous(candidates, trio, &consequences);
        for (gene, ids) in &result.genes {
            tracing::trace!("gene {}: {}", gene, ids.join(", "));
        }
        Ok(Box::new(result.variants.into_iter().map(Ok)))
    }

    fn get(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantQueryResult> {
        get_with_genotypes(self, engine, query)
    }
}

/// Compound heterozygous variants precomputed in the family index.
#[derive(Debug, Default)]
pub struct PrecomputedCompoundHeterozygousQueryExecutor;

impl VariantQueryExecutor for PrecomputedCompoundHeterozygousQueryExecutor {
    fn name(&self) -> &'static str {
        "sample_index_compound_heterozygous"
    }

    fn source(&self) -> VariantQuerySource {
        VariantQuerySource::SecondarySampleIndex
    }

    fn can_use_this_executor(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<bool> {
        match (trio(query), engine.sample_index()) {
            (Some(trio), Some(index)) => {
                Ok(index.has_family_index(&trio.study.name, &trio.proband.name)?)
            }
            _ => Ok(false),
        }
    }

    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>> {
        let trio = require_trio(query)?;
        check_trio_included(query, trio)?;
        let index = engine
            .sample_index()
            .ok_or_else(|| anyhow::anyhow!("no sample index configured"))?;
        let ids = index.compound_heterozygous(query, trio)?;
        let variants = engine.store().get_by_ids(&ids)?;
        Ok(Box::new(variants.into_iter().map(Ok)))
    }

    fn get(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantQueryResult> {
        get_with_genotypes(self, engine, query)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::schema::ResourceId;
    use crate::test_utils;

    fn parsed(query: Query, options: QueryOptions) -> ParsedVariantQuery {
        test_utils::engine(false, false)
            .parse(&query, &options)
            .expect("valid query")
    }

    #[test]
    fn sub_queries_mirror_the_parents() {
        let query = parsed(
            Query::new()
                .with(QueryParam::Study, "S1")
                .with(QueryParam::SampleCompoundHeterozygous, "John"),
            QueryOptions::default(),
        );
        let trio = require_trio(&query).expect("trio");
        let [paternal, maternal] = sub_queries(&query, trio);

        assert_eq!(
            paternal.get_str_or_empty(QueryParam::Genotype),
            "John:HET;Pete:HET;Mary:HOM_REF"
        );
        assert_eq!(
            maternal.get_str_or_empty(QueryParam::Genotype),
            "John:HET;Pete:HOM_REF;Mary:HET"
        );
        assert_eq!(paternal.get_str_or_empty(QueryParam::Biotype), PROTEIN_CODING);
        assert!(!paternal.is_valid(QueryParam::SampleCompoundHeterozygous));
    }

    #[test]
    fn missing_parent_is_not_constrained() {
        let trio = CompoundHeterozygousFilter {
            study: ResourceId::new(1, "S1"),
            proband: ResourceId::new(1, "John"),
            father: None,
            mother: Some(ResourceId::new(3, "Mary")),
        };
        assert_eq!(pattern(&trio, "HET", "HOM_REF"), "John:HET;Mary:HOM_REF");
    }

    #[test]
    fn user_consequence_types_are_kept() {
        let query = parsed(
            Query::new()
                .with(QueryParam::Study, "S1")
                .with(QueryParam::SampleCompoundHeterozygous, "John")
                .with(QueryParam::ConsequenceType, "stop_gained"),
            QueryOptions::default(),
        );
        let trio = require_trio(&query).expect("trio");
        let [paternal, _] = sub_queries(&query, trio);
        assert_eq!(
            paternal.get_str_or_empty(QueryParam::ConsequenceType),
            "stop_gained"
        );
    }

    #[test]
    fn sub_query_options_keep_the_caller_options() {
        let query = parsed(
            Query::new()
                .with(QueryParam::Study, "S1")
                .with(QueryParam::SampleCompoundHeterozygous, "John"),
            QueryOptions {
                skip_missing_genes: true,
                timeout: Some(500),
                skip: Some(3),
                limit: Some(2),
                count: true,
                ..Default::default()
            },
        );
        let options = sub_query_options(&query);
        assert!(options.skip_missing_genes);
        assert_eq!(options.timeout, Some(500));
        assert_eq!((options.skip, options.limit, options.count), (None, None, false));
        assert!(options.sort);
    }

    #[test]
    fn include_sample_without_trio_fails() {
        let query = parsed(
            Query::new()
                .with(QueryParam::Study, "S1")
                .with(QueryParam::SampleCompoundHeterozygous, "John")
                .with(QueryParam::IncludeSample, "John,Pete"),
            QueryOptions::default(),
        );
        let trio = require_trio(&query).expect("trio");
        assert!(matches!(
            check_trio_included(&query, trio),
            Err(VariantQueryError::UnsupportedCombination { .. })
        ));
    }
}
