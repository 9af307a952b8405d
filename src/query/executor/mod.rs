//! Strategies answering a variant query against one backend or index.
//!
//! The engine tries the executors in a fixed priority order and uses the
//! first one that accepts the query.  The row store executor comes last and
//! accepts everything.

pub mod breakend;
pub mod compound_heterozygous;
pub mod db_adaptor;
pub mod sample_index;
pub mod search_index;

use std::time::{Duration, Instant};

use thousands::Separable;

use crate::backend::RecordIterator;
use crate::err::{Result, VariantQueryError};
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::{VariantCount, VariantQueryResult};
use crate::query::schema::options::VariantQuerySource;
use crate::query::schema::{EngineConfig, QueryOptions, Variant};

/// Matching variants in the order produced by the executor.
pub type VariantIterator<'a> = Box<dyn Iterator<Item = Result<Variant>> + 'a>;

/// One strategy for answering variant queries.
pub trait VariantQueryExecutor: Send + Sync {
    /// Name reported as `source` of the results.
    fn name(&self) -> &'static str;

    /// Index a caller may force with the `source` option.
    fn source(&self) -> VariantQuerySource {
        VariantQuerySource::VariantIndex
    }

    fn can_use_this_executor(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<bool>;

    /// All matching variants, without paging or projection.
    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>>;

    /// Number of matching variants.
    fn count(&self, engine: &VariantQueryEngine, query: &ParsedVariantQuery) -> Result<VariantCount> {
        let count = count_iterator(with_deadline(self.iterator(engine, query)?, query.timeout))?;
        Ok(VariantCount::exact(count))
    }

    /// One page of projected variants.
    fn get(
        &self,
        engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantQueryResult> {
        let started = Instant::now();
        let count = if query.options.count {
            Some(self.count(engine, query)?)
        } else {
            None
        };
        let iter = with_deadline(self.iterator(engine, query)?, query.timeout);
        page(self.name(), iter, query, count, started)
    }
}

/// Resolve the `timeout` option against the configured bounds.
///
/// A timeout of zero disables the deadline.
pub fn validate_timeout(options: &QueryOptions, config: &EngineConfig) -> Result<Duration> {
    let timeout = match options.timeout {
        None => config.timeout_default_ms,
        Some(timeout) if timeout < 0 => {
            return Err(VariantQueryError::malformed_param_with(
                "timeout",
                timeout,
                "Expected a non-negative number of milliseconds",
            ))
        }
        Some(timeout) if timeout > config.timeout_max_ms => {
            return Err(VariantQueryError::limit_exceeded(
                "timeout",
                timeout,
                config.timeout_max_ms,
            ))
        }
        Some(timeout) => timeout,
    };
    Ok(Duration::from_millis(timeout as u64))
}

/// Lift the records of a backend into the executor result type.
pub fn from_records(records: RecordIterator<'_>) -> VariantIterator<'_> {
    Box::new(records.map(|r| r.map_err(VariantQueryError::from)))
}

/// Iterator failing once its deadline passed.
pub struct DeadlineIterator<'a> {
    inner: VariantIterator<'a>,
    timeout: Duration,
    deadline: Instant,
    expired: bool,
}

impl<'a> Iterator for DeadlineIterator<'a> {
    type Item = Result<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.expired {
            return None;
        }
        if Instant::now() > self.deadline {
            self.expired = true;
            tracing::warn!("query timed out after {:?}", self.timeout);
            return Some(Err(VariantQueryError::Internal(anyhow::anyhow!(
                "query timed out after {} ms",
                self.timeout.as_millis()
            ))));
        }
        self.inner.next()
    }
}

/// Attach the deadline `timeout` from now to `iter`.
pub fn with_deadline(iter: VariantIterator<'_>, timeout: Duration) -> VariantIterator<'_> {
    if timeout.is_zero() {
        return iter;
    }
    Box::new(DeadlineIterator {
        inner: iter,
        timeout,
        deadline: Instant::now() + timeout,
        expired: false,
    })
}

pub fn count_iterator(iter: VariantIterator<'_>) -> Result<u64> {
    let mut count = 0u64;
    for record in iter {
        record?;
        count += 1;
    }
    Ok(count)
}

/// Sampling size of an approximate count.
pub fn sampling_size(engine: &VariantQueryEngine, query: &ParsedVariantQuery) -> usize {
    query
        .options
        .approximate_count_sampling_size
        .unwrap_or(engine.config().approximate_count_sampling_size)
        .max(1)
}

/// Page `iter` and wrap the projected variants into the result envelope.
pub fn page(
    source: &str,
    mut iter: VariantIterator<'_>,
    query: &ParsedVariantQuery,
    count: Option<VariantCount>,
    started: Instant,
) -> Result<VariantQueryResult> {
    // Skipped records may still carry backend errors.
    for record in iter.by_ref().take(query.skip) {
        record?;
    }
    let results = iter
        .take(query.limit)
        .map(|r| r.map(|v| query.projection.apply(v)))
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(
        "{} returned {} variants (skip {}, limit {})",
        source,
        results.len().separate_with_commas(),
        query.skip,
        query.limit
    );
    Ok(VariantQueryResult {
        num_results: results.len(),
        results,
        num_matches: count.map(|c| c.count),
        approximate_count: count.map(|c| c.approximate).unwrap_or(false),
        approximate_count_sampling_size: count.and_then(|c| c.sampling_size),
        time: started.elapsed().as_millis() as u64,
        events: query.events.clone(),
        source: source.to_string(),
        num_samples: Some(query.projection.num_samples),
        num_total_samples: Some(query.projection.num_total_samples),
        samples: query
            .options
            .sample_metadata
            .then(|| query.projection.samples_by_study()),
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, Ok(10_000))]
    #[case(Some(0), Ok(0))]
    #[case(Some(30_000), Ok(30_000))]
    #[case(Some(30_001), Err("limit"))]
    #[case(Some(-5), Err("malformed"))]
    fn timeout_bounds(#[case] timeout: Option<i64>, #[case] expected: std::result::Result<u64, &str>) {
        let options = QueryOptions {
            timeout,
            ..Default::default()
        };
        let result = validate_timeout(&options, &EngineConfig::default());
        match (result, expected) {
            (Ok(timeout), Ok(ms)) => assert_eq!(timeout, Duration::from_millis(ms)),
            (Err(VariantQueryError::LimitExceeded { what, .. }), Err("limit")) => {
                assert_eq!(what, "timeout")
            }
            (Err(VariantQueryError::MalformedParam { param, .. }), Err("malformed")) => {
                assert_eq!(param, "timeout")
            }
            (result, expected) => panic!("unexpected {:?}, expected {:?}", result, expected),
        }
    }

    #[test]
    fn expired_deadline_fails_once() {
        let variants: VariantIterator<'static> =
            Box::new((0..3).map(|i| Ok(Variant::new("1", 100 + i, "A", "T"))));
        let mut iter = DeadlineIterator {
            inner: variants,
            timeout: Duration::from_millis(1),
            deadline: Instant::now() - Duration::from_millis(1),
            expired: false,
        };
        assert!(matches!(iter.next(), Some(Err(VariantQueryError::Internal(_)))));
        assert!(iter.next().is_none());
    }

    fn failing_iterator(position: usize) -> VariantIterator<'static> {
        Box::new((0..3).map(move |i| {
            if i == position {
                Err(VariantQueryError::Internal(anyhow::anyhow!("backend I/O failure")))
            } else {
                Ok(Variant::new("1", 100 + i as u32, "A", "T"))
            }
        }))
    }

    #[rstest]
    #[case::in_skipped_records(1, 0)]
    #[case::in_page(1, 1)]
    #[case::without_skip(0, 0)]
    fn page_propagates_backend_errors(#[case] skip: i64, #[case] position: usize) -> Result<()> {
        let engine = crate::test_utils::engine(false, false);
        let options = QueryOptions {
            skip: Some(skip),
            ..Default::default()
        };
        let query = engine.parse(&crate::query::schema::Query::new(), &options)?;
        assert!(matches!(
            page("test", failing_iterator(position), &query, None, Instant::now()),
            Err(VariantQueryError::Internal(_))
        ));
        Ok(())
    }

    #[test]
    fn page_skips_records() -> Result<()> {
        let engine = crate::test_utils::engine(false, false);
        let options = QueryOptions {
            skip: Some(2),
            ..Default::default()
        };
        let query = engine.parse(&crate::query::schema::Query::new(), &options)?;
        let result = page("test", failing_iterator(3), &query, None, Instant::now())?;
        assert_eq!(result.num_results, 1);
        assert_eq!(result.results[0].start, 102);
        Ok(())
    }

    #[test]
    fn count_propagates_backend_errors() {
        assert!(matches!(
            count_iterator(failing_iterator(2)),
            Err(VariantQueryError::Internal(_))
        ));
    }

    #[test]
    fn zero_timeout_disables_deadline() -> Result<()> {
        let variants: VariantIterator<'static> =
            Box::new((0..3).map(|i| Ok(Variant::new("1", 100 + i, "A", "T"))));
        assert_eq!(count_iterator(with_deadline(variants, Duration::ZERO))?, 3);
        Ok(())
    }
}
