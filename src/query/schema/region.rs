//! Genomic regions `chrom`, `chrom:pos` and `chrom:start-end`.

use std::fmt::{self, Display};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::common::canonicalize;

/// A genomic region with 1-based, inclusive positions.
///
/// `start == 0` and `end == None` mean that the region is not bounded on that
/// side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    pub chromosome: String,
    pub start: u32,
    pub end: Option<u32>,
}

fn region_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<chrom>[^:\s]+)(:(?P<start>\d+)(-(?P<end>\d+))?)?$")
            .expect("cannot happen: invalid region regex")
    })
}

impl Region {
    pub fn new(chromosome: &str, start: u32, end: u32) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            start,
            end: Some(end),
        }
    }

    pub fn whole_chrom(chromosome: &str) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            start: 0,
            end: None,
        }
    }

    /// Parse a region, returning `None` on syntax errors.
    pub fn parse(value: &str) -> Option<Self> {
        let caps = region_regex().captures(value.trim())?;
        let chromosome = caps.name("chrom")?.as_str().to_string();
        let start = match caps.name("start") {
            Some(start) => start.as_str().parse::<u32>().ok()?,
            None => 0,
        };
        let end = match (caps.name("start"), caps.name("end")) {
            (_, Some(end)) => Some(end.as_str().parse::<u32>().ok()?),
            (Some(_), None) => Some(start),
            (None, None) => None,
        };
        if let Some(end) = end {
            if end < start {
                return None;
            }
        }
        Some(Self {
            chromosome,
            start,
            end,
        })
    }

    /// Whether the region contains position `pos` on `chrom`.
    pub fn contains(&self, chrom: &str, pos: u32) -> bool {
        canonicalize(&self.chromosome) == canonicalize(chrom)
            && pos >= self.start
            && self.end.map(|end| pos <= end).unwrap_or(true)
    }

    /// Whether the region overlaps `[start, end]` on `chrom`.
    pub fn overlaps(&self, chrom: &str, start: u32, end: u32) -> bool {
        canonicalize(&self.chromosome) == canonicalize(chrom)
            && end >= self.start
            && self.end.map(|e| start <= e).unwrap_or(true)
    }
}

impl Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (0, None) => write!(f, "{}", self.chromosome),
            (start, None) => write!(f, "{}:{}-", self.chromosome, start),
            (start, Some(end)) => write!(f, "{}:{}-{}", self.chromosome, start, end),
        }
    }
}
