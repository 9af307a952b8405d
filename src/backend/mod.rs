//! Storage backends consulted by the executors.
//!
//! The engine only sees the traits below.  The `memory` module implements all
//! of them over one dataset held in memory.

pub mod memory;

use crate::query::parser::filter::CompoundHeterozygousFilter;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::{FacetField, VariantCount};
use crate::query::schema::{Region, Variant};

/// Variants as produced by a backend; errors are collaborator failures.
pub type RecordIterator<'a> = Box<dyn Iterator<Item = Result<Variant, anyhow::Error>> + 'a>;

/// The row store holding all variants with their study data.
pub trait VariantStore: Send + Sync {
    /// Variants passing all filters of `query`, in genomic order.
    fn iterator<'a>(&'a self, query: &ParsedVariantQuery)
        -> Result<RecordIterator<'a>, anyhow::Error>;

    /// Variants overlapping `region` without any filtering, in genomic order.
    fn region<'a>(&'a self, region: &Region) -> Result<RecordIterator<'a>, anyhow::Error>;

    /// Variants by their `chrom:pos:ref:alt` id, in the order of `ids`; unknown
    /// ids are skipped.
    fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Variant>, anyhow::Error>;

    /// Count from the matches among the first `sampling_size` scanned records,
    /// extrapolated to all candidate records.
    fn approximate_count(
        &self,
        query: &ParsedVariantQuery,
        sampling_size: usize,
    ) -> Result<VariantCount, anyhow::Error>;
}

/// Secondary index answering annotation-heavy queries.
pub trait SearchIndex: Send + Sync {
    /// Whether the index is in sync with the row store.
    fn is_active(&self) -> bool;

    /// Whether the index can evaluate every filter of `query`.
    fn supports(&self, query: &ParsedVariantQuery) -> bool;

    /// Ids of the matching variants, in genomic order.
    fn search_ids(&self, query: &ParsedVariantQuery) -> Result<Vec<String>, anyhow::Error>;

    fn count(&self, query: &ParsedVariantQuery) -> Result<u64, anyhow::Error>;

    fn supports_facet(&self, facet: &str) -> bool;

    fn facet(
        &self,
        query: &ParsedVariantQuery,
        facet: &str,
    ) -> Result<Vec<FacetField>, anyhow::Error>;
}

/// Per-study genotype index over the indexed samples.
pub trait SampleIndex: Send + Sync {
    /// Whether the index can evaluate every filter of `query`.
    fn supports(&self, query: &ParsedVariantQuery) -> bool;

    /// Ids of the matching variants, in genomic order.
    fn query_ids(&self, query: &ParsedVariantQuery) -> Result<Vec<String>, anyhow::Error>;

    /// Whether the family index of `proband` in `study` is complete.
    fn has_family_index(&self, study: &str, proband: &str) -> Result<bool, anyhow::Error>;

    /// Ids of the compound heterozygous variants of a trio, in genomic order.
    fn compound_heterozygous(
        &self,
        query: &ParsedVariantQuery,
        trio: &CompoundHeterozygousFilter,
    ) -> Result<Vec<String>, anyhow::Error>;
}
