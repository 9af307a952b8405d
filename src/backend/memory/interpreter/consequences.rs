use crate::query::parser::filter::GeneSet;
use crate::query::schema::data::ConsequenceType;
use crate::query::schema::{KeyOpValue, Values, Variant};

fn passes_consequence(
    ct: Option<&Values<String>>,
    biotype: Option<&Values<String>>,
    consequence: &ConsequenceType,
) -> bool {
    let pass_ct = ct
        .map(|ct| {
            ct.test::<(), _>(|term| Ok(consequence.sequence_ontology_terms.contains(term)))
                .unwrap_or(false)
        })
        .unwrap_or(true);
    let pass_biotype = biotype
        .map(|b| b.iter().any(|b| *b == consequence.biotype))
        .unwrap_or(true);
    pass_ct && pass_biotype
}

/// Determine whether the `Variant` passes the consequence type and biotype
/// filters; both must hold on the same transcript.
pub fn passes(
    ct: Option<&Values<String>>,
    biotype: Option<&Values<String>>,
    variant: &Variant,
) -> bool {
    if ct.is_none() && biotype.is_none() {
        return true;
    }
    let res = variant
        .annotation
        .iter()
        .flat_map(|a| a.consequence_types.iter())
        .any(|c| passes_consequence(ct, biotype, c));
    if !res {
        tracing::trace!("variant {} fails consequence filter", variant);
    }
    res
}

/// Determine whether the `Variant` hits the gene set.
pub fn passes_gene_set(gene_set: &GeneSet, variant: &Variant) -> bool {
    match gene_set {
        GeneSet::Nothing => false,
        GeneSet::Genes(genes) => variant
            .gene_names()
            .iter()
            .any(|g| genes.iter().any(|s| s == g)),
    }
}

/// Determine whether the `Variant` passes the protein substitution filter.
pub fn passes_protein_substitution(
    filter: &Values<KeyOpValue<String, String>>,
    variant: &Variant,
) -> Result<bool, anyhow::Error> {
    filter.test(|kov| {
        for consequence in variant
            .annotation
            .iter()
            .flat_map(|a| a.consequence_types.iter())
        {
            let score = consequence
                .protein_substitution_scores
                .get(&kov.key)
                .map(|s| s.to_string());
            if score.is_some() && kov.op.matches(score.as_deref(), &kov.value)? {
                return Ok(true);
            }
        }
        Ok(false)
    })
}
