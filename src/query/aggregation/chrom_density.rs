//! Variant counts in fixed-size windows along chromosomes.

use std::sync::OnceLock;

use regex::Regex;
use thousands::Separable;

use crate::common::canonicalize;
use crate::err::{Result, VariantQueryError};
use crate::metadata::MetadataRegistry;
use crate::query::engine::VariantQueryEngine;
use crate::query::parser::ParsedVariantQuery;
use crate::query::result::{FacetBucket, FacetField};
use crate::query::schema::{QueryOptions, QueryParam, Region, VariantField};
use crate::query::utils::OR;

/// Name of the density facet.
pub const CHROM_DENSITY: &str = "chromDensity";

fn density_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^chromDensity\[([^\]]*)\](?::(\d+))?$")
            .expect("cannot happen: invalid density regex")
    })
}

/// Whether `facet` requests a density, well-formed or not.
pub fn is_density_facet(facet: &str) -> bool {
    facet.trim().starts_with(CHROM_DENSITY)
}

/// A parsed `chromDensity[regions](:step)?` facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityFacet {
    pub regions: Vec<Region>,
    pub step: u32,
}

impl DensityFacet {
    pub fn parse(facet: &str, default_step: u32) -> Result<Self> {
        let malformed = |detail: &str| VariantQueryError::malformed_param_with("facet", facet, detail);
        let caps = density_regex()
            .captures(facet.trim())
            .ok_or_else(|| malformed("Expected chromDensity[region,...]:step"))?;
        let regions = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .split(OR)
            .map(|r| Region::parse(r).ok_or_else(|| malformed("Invalid region")))
            .collect::<Result<Vec<_>>>()?;
        let step = match caps.get(2) {
            Some(step) => step
                .as_str()
                .parse::<u32>()
                .map_err(|_| malformed("Invalid step"))?,
            None => default_step,
        };
        if step == 0 {
            return Err(malformed("Step must be positive"));
        }
        Ok(Self { regions, step })
    }
}

/// Bound `region` on both sides, taking an open end from the contigs of the
/// first study declaring the chromosome.
pub fn resolve_region(region: &Region, registry: &dyn MetadataRegistry) -> Result<(u32, u32)> {
    let start = region.start.max(1);
    let end = match region.end {
        Some(end) => end,
        None => {
            let chrom = canonicalize(&region.chromosome);
            registry
                .studies()?
                .iter()
                .find_map(|s| {
                    s.contigs
                        .iter()
                        .find(|(name, _)| canonicalize(name) == chrom)
                        .map(|(_, length)| *length)
                })
                .ok_or_else(|| {
                    VariantQueryError::malformed_param_with(
                        "facet",
                        region,
                        "Unknown length of chromosome",
                    )
                })?
        }
    };
    Ok((start, end.max(start)))
}

/// Counts of all windows of one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityBuckets {
    pub region: Region,
    pub start: u32,
    pub end: u32,
    pub step: u32,
    pub counts: Vec<u64>,
}

impl DensityBuckets {
    pub fn new(region: Region, start: u32, end: u32, step: u32) -> Self {
        let num_buckets = ((end - start) / step + 1) as usize;
        Self {
            region,
            start,
            end,
            step,
            counts: vec![0; num_buckets],
        }
    }

    /// Count a variant starting at `pos`; false if it falls outside all
    /// windows.
    pub fn add(&mut self, pos: u32) -> bool {
        if pos < self.start {
            return false;
        }
        match self.counts.get_mut(((pos - self.start) / self.step) as usize) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    fn into_bucket(self) -> FacetBucket {
        let total = self.total();
        let windows = self
            .counts
            .iter()
            .enumerate()
            .map(|(i, count)| FacetBucket {
                value: (self.start as u64 + i as u64 * self.step as u64).to_string(),
                count: *count,
                facet_fields: Vec::new(),
            })
            .collect();
        FacetBucket {
            value: self.region.to_string(),
            count: total,
            facet_fields: vec![FacetField {
                name: "start".to_string(),
                count: total,
                buckets: windows,
                start: Some(self.start),
                end: Some(self.end),
                step: Some(self.step),
            }],
        }
    }
}

/// Count the variants of `query` per window of `facet`.
pub fn aggregate(
    engine: &VariantQueryEngine,
    query: &ParsedVariantQuery,
    facet: &DensityFacet,
) -> Result<FacetField> {
    let options = QueryOptions {
        include: Some(vec![VariantField::Id.to_string()]),
        exclude: None,
        sort: true,
        skip: None,
        limit: None,
        count: false,
        facet: None,
        ..query.options.clone()
    };
    let mut regions = Vec::new();
    for region in &facet.regions {
        let (start, end) = resolve_region(region, engine.registry())?;
        let mut buckets = DensityBuckets::new(region.clone(), start, end, facet.step);
        let sub_query = query.query.clone().with(
            QueryParam::Region,
            Region::new(&region.chromosome, start, end).to_string(),
        );
        let parsed = engine.parse(&sub_query, &options)?;
        let mut dropped = 0usize;
        for variant in engine.iterator(&parsed)? {
            if !buckets.add(variant?.start) {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::warn!(
                "dropped {} variants outside the windows of {}",
                dropped.separate_with_commas(),
                region
            );
        }
        tracing::debug!(
            "{}: {} variants in {} windows",
            region,
            buckets.total().separate_with_commas(),
            buckets.counts.len()
        );
        regions.push(buckets);
    }

    let total = regions.iter().map(|b| b.total()).sum();
    Ok(FacetField {
        name: CHROM_DENSITY.to_string(),
        count: total,
        buckets: regions.into_iter().map(|b| b.into_bucket()).collect(),
        ..Default::default()
    })
}
