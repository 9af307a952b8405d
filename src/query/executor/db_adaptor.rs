//! Full scan of the row store; accepts every query.

use crate::err::Result;
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::VariantCount;

use super::{from_records, sampling_size, VariantIterator, VariantQueryExecutor};

#[derive(Debug, Default)]
pub struct DbAdaptorVariantQueryExecutor;

impl VariantQueryExecutor for DbAdaptorVariantQueryExecutor {
    fn name(&self) -> &'static str {
        "variant_index"
    }

    fn can_use_this_executor(
        &self,
        _engine: &VariantQueryEngine,
        _query: &ParsedVariantQuery,
    ) -> Result<bool> {
        Ok(true)
    }

    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>> {
        Ok(from_records(engine.store().iterator(query)?))
    }

    fn count(&self, engine: &VariantQueryEngine, query: &ParsedVariantQuery) -> Result<VariantCount> {
        if query.options.approximate_count {
            let sampling_size = sampling_size(engine, query);
            return Ok(engine.store().approximate_count(query, sampling_size)?);
        }
        let count = super::count_iterator(super::with_deadline(
            self.iterator(engine, query)?,
            query.timeout,
        ))?;
        Ok(VariantCount::exact(count))
    }
}
