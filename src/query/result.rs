//! Result envelopes of variant and facet queries.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::query::schema::{Event, Variant};

/// One page of variants plus metadata on how it was produced.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantQueryResult {
    pub results: Vec<Variant>,
    pub num_results: usize,
    /// Number of matching variants, `None` unless counting was requested.
    pub num_matches: Option<u64>,
    pub approximate_count: bool,
    pub approximate_count_sampling_size: Option<usize>,
    /// Elapsed time in milliseconds.
    pub time: u64,
    pub events: Vec<Event>,
    /// Name of the executor that answered.
    pub source: String,
    pub num_samples: Option<usize>,
    pub num_total_samples: Option<usize>,
    /// Included sample names by study; only with `sampleMetadata`.
    pub samples: Option<IndexMap<String, Vec<String>>>,
}

/// Number of matches, possibly extrapolated from a sample of the rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantCount {
    pub count: u64,
    pub approximate: bool,
    pub sampling_size: Option<usize>,
}

impl VariantCount {
    pub fn exact(count: u64) -> Self {
        Self {
            count,
            approximate: false,
            sampling_size: None,
        }
    }
}

/// One bucket of a facet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
    /// Nested facets within the bucket.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub facet_fields: Vec<FacetField>,
}

/// Counts of one facet.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetField {
    pub name: String,
    pub count: u64,
    pub buckets: Vec<FacetBucket>,
    /// Range facets only.
    pub start: Option<u32>,
    pub end: Option<u32>,
    pub step: Option<u32>,
}

/// Envelope of a facet query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFacetResult {
    pub facets: Vec<FacetField>,
    pub num_matches: u64,
    pub time: u64,
    pub events: Vec<Event>,
    pub source: String,
}
