//! Gene annotation lookups used to rewrite gene-level filters.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::query::schema::Region;

/// Resolution of gene ontology terms, expression terms and gene names.
pub trait AnnotationLookup: Send + Sync {
    /// Genes annotated with any of the GO `terms`.
    fn genes_by_go(&self, terms: &[String]) -> Result<Vec<String>, anyhow::Error>;

    /// Genes expressed in any of the tissues `terms`.
    fn genes_by_expression(&self, terms: &[String]) -> Result<Vec<String>, anyhow::Error>;

    /// Region of each known gene; unknown genes are absent from the result.
    fn gene_regions(&self, genes: &[String]) -> Result<IndexMap<String, Region>, anyhow::Error>;
}

/// Lookup tables held in memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryAnnotation {
    /// GO term to gene names.
    pub go: IndexMap<String, Vec<String>>,
    /// Tissue to gene names.
    pub expression: IndexMap<String, Vec<String>>,
    /// Gene name to region, as `chr:start-end`.
    pub genes: IndexMap<String, String>,
}

fn lookup(table: &IndexMap<String, Vec<String>>, terms: &[String]) -> Vec<String> {
    let mut result = Vec::new();
    for term in terms {
        for gene in table.get(term).into_iter().flatten() {
            if !result.contains(gene) {
                result.push(gene.clone());
            }
        }
    }
    result
}

impl AnnotationLookup for InMemoryAnnotation {
    fn genes_by_go(&self, terms: &[String]) -> Result<Vec<String>, anyhow::Error> {
        Ok(lookup(&self.go, terms))
    }

    fn genes_by_expression(&self, terms: &[String]) -> Result<Vec<String>, anyhow::Error> {
        Ok(lookup(&self.expression, terms))
    }

    fn gene_regions(&self, genes: &[String]) -> Result<IndexMap<String, Region>, anyhow::Error> {
        let mut result = IndexMap::new();
        for gene in genes {
            if let Some(region) = self.genes.get(gene) {
                let region = Region::parse(region).ok_or_else(|| {
                    anyhow::anyhow!("invalid region {:?} of gene {:?}", region, gene)
                })?;
                result.insert(gene.clone(), region);
            }
        }
        Ok(result)
    }
}
