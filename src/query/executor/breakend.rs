//! Breakend queries returning both ends of each breakend pair.

use indexmap::IndexMap;

use crate::err::Result;
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::filter::VariantFilter;
use crate::query::parser::ParsedVariantQuery;
use crate::query::schema::{Region, VariantType};
use crate::query::sorting::compare_variants;

use super::{with_deadline, VariantIterator, VariantQueryExecutor};

#[derive(Debug, Default)]
pub struct BreakendVariantQueryExecutor;

impl VariantQueryExecutor for BreakendVariantQueryExecutor {
    fn name(&self) -> &'static str {
        "breakend"
    }

    fn can_use_this_executor(
        &self,
        _engine: &VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<bool> {
        Ok(query.filters.iter().any(|f| match f {
            VariantFilter::Type(types) => types.len() == 1 && types[0] == VariantType::Breakend,
            _ => false,
        }))
    }

    fn iterator<'a>(
        &self,
        engine: &'a VariantQueryEngine,
        query: &ParsedVariantQuery,
    ) -> Result<VariantIterator<'a>> {
        let records = super::from_records(engine.store().iterator(query)?);
        let mut variants = IndexMap::new();
        for variant in with_deadline(records, query.timeout) {
            let variant = variant?;
            variants.insert(variant.id(), variant);
        }
        let mates = variants
            .values()
            .filter_map(|v| v.breakend_mate().map(|mate| (v.clone(), mate)))
            .collect::<Vec<_>>();
        for (variant, mate) in mates {
            let region = Region::new(&mate.chromosome, mate.position, mate.position);
            for candidate in engine.store().region(&region)? {
                let candidate = candidate?;
                let points_back = candidate.breakend_mate().is_some_and(|m| {
                    m.chromosome == variant.chromosome && m.position == variant.start
                });
                if candidate.variant_type == VariantType::Breakend && points_back {
                    tracing::trace!("mate of {} is {}", variant, candidate);
                    variants.entry(candidate.id()).or_insert(candidate);
                }
            }
        }
        let mut variants = variants.into_values().collect::<Vec<_>>();
        variants.sort_by(compare_variants);
        Ok(Box::new(variants.into_iter().map(Ok)))
    }
}
