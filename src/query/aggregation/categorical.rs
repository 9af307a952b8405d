//! Counts of categorical variant fields, optionally nested with `>>`.

use indexmap::IndexMap;
use itertools::Itertools;

use crate::err::{Result, VariantQueryError};
use crate::query::result::{FacetBucket, FacetField};
use crate::query::schema::Variant;

/// Separator of nested facet fields.
pub const NESTED: &str = ">>";

/// Fields a categorical facet counts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum CategoricalField {
    Chromosome,
    Type,
    Gene,
    Biotype,
    Ct,
    Study,
}

impl CategoricalField {
    /// Distinct values of the field in `variant`.
    fn values(&self, variant: &Variant) -> Vec<String> {
        let consequence_types = || {
            variant
                .annotation
                .iter()
                .flat_map(|a| a.consequence_types.iter())
        };
        let values: Vec<String> = match self {
            CategoricalField::Chromosome => vec![variant.chromosome.clone()],
            CategoricalField::Type => vec![variant.variant_type.to_string()],
            CategoricalField::Gene => variant.gene_names().into_iter().map(String::from).collect(),
            CategoricalField::Biotype => consequence_types()
                .filter(|c| !c.biotype.is_empty())
                .map(|c| c.biotype.clone())
                .collect(),
            CategoricalField::Ct => consequence_types()
                .flat_map(|c| c.sequence_ontology_terms.iter().cloned())
                .collect(),
            CategoricalField::Study => variant.studies.iter().map(|s| s.study_id.clone()).collect(),
        };
        values.into_iter().unique().collect()
    }
}

/// A chain of nested categorical fields such as `chromosome>>type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoricalFacet {
    pub fields: Vec<CategoricalField>,
}

impl CategoricalFacet {
    pub fn parse(facet: &str) -> Result<Self> {
        let fields = facet
            .split(NESTED)
            .map(|f| {
                f.trim().parse::<CategoricalField>().map_err(|_| {
                    VariantQueryError::malformed_param_with(
                        "facet",
                        facet,
                        format!("Unknown facet field {:?}", f.trim()),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }
}

#[derive(Debug, Default)]
struct Node {
    count: u64,
    children: IndexMap<String, Node>,
}

impl Node {
    fn add(&mut self, fields: &[CategoricalField], variant: &Variant) {
        let (field, rest) = match fields.split_first() {
            Some(split) => split,
            None => return,
        };
        for value in field.values(variant) {
            let child = self.children.entry(value).or_default();
            child.count += 1;
            child.add(rest, variant);
        }
    }

    fn into_field(self, fields: &[CategoricalField]) -> FacetField {
        let (field, rest) = match fields.split_first() {
            Some(split) => split,
            None => return FacetField::default(),
        };
        let mut buckets = self
            .children
            .into_iter()
            .map(|(value, child)| FacetBucket {
                value,
                count: child.count,
                facet_fields: if rest.is_empty() {
                    Vec::new()
                } else {
                    vec![child.into_field(rest)]
                },
            })
            .collect::<Vec<_>>();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        FacetField {
            name: field.to_string(),
            count: self.count,
            buckets,
            ..Default::default()
        }
    }
}

/// Accumulates the counts of several categorical facets in one pass.
#[derive(Debug)]
pub struct CategoricalCounter {
    facets: Vec<(CategoricalFacet, Node)>,
}

impl CategoricalCounter {
    pub fn new(facets: Vec<CategoricalFacet>) -> Self {
        Self {
            facets: facets.into_iter().map(|f| (f, Node::default())).collect(),
        }
    }

    pub fn add(&mut self, variant: &Variant) {
        for (facet, root) in self.facets.iter_mut() {
            root.count += 1;
            root.add(&facet.fields, variant);
        }
    }

    /// Facet fields, buckets by decreasing count.
    pub fn finish(self) -> Vec<FacetField> {
        self.facets
            .into_iter()
            .map(|(facet, root)| root.into_field(&facet.fields))
            .collect()
    }
}

/// Count the categorical facets `facets` over `variants`.
pub fn count<'a>(
    facets: &[CategoricalFacet],
    variants: impl IntoIterator<Item = &'a Variant>,
) -> Vec<FacetField> {
    let mut counter = CategoricalCounter::new(facets.to_vec());
    for variant in variants {
        counter.add(variant);
    }
    counter.finish()
}
