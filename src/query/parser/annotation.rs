//! Rewrite of the annotation-level parameters.

use indexmap::IndexSet;

use crate::annotation::AnnotationLookup;
use crate::err::{Result, VariantQueryError};
use crate::query::schema::{
    ontology, Event, Query, QueryOperation, QueryOptions, QueryParam, Values, VariantType,
};
use crate::query::utils::{self, NONE};

/// Run all annotation rewrites in order.
pub fn preprocess(
    query: Query,
    annotation: &dyn AnnotationLookup,
    options: &QueryOptions,
    events: &mut Vec<Event>,
) -> Result<Query> {
    let query = resolve_gene_set(query, annotation)?;
    let query = classify_xrefs(query)?;
    let query = resolve_gene_regions(query, annotation, options.skip_missing_genes, events)?;
    let query = normalize_types(query)?;
    let query = fold_protein_substitution(query)?;
    normalize_consequence_types(query)
}

/// Replace `go` and `expression` by the gene set they resolve to.
///
/// Both parameters together intersect.  An empty gene set becomes `none` so
/// that it restricts to nothing instead of vanishing.
pub fn resolve_gene_set(query: Query, annotation: &dyn AnnotationLookup) -> Result<Query> {
    let mut sets: Vec<Vec<String>> = Vec::new();
    for param in [QueryParam::Go, QueryParam::Expression] {
        if let Some(value) = query.get_string(param) {
            let terms = utils::split_value(param, &value)?.into_values();
            let genes = match param {
                QueryParam::Go => annotation.genes_by_go(&terms)?,
                _ => annotation.genes_by_expression(&terms)?,
            };
            tracing::debug!("{} {:?} resolved to {} genes", param, terms, genes.len());
            sets.push(genes);
        }
    }
    if sets.is_empty() {
        return Ok(query);
    }
    if let Some(existing) = query.get_string(QueryParam::GeneSet) {
        if !utils::is_none_value(&existing) {
            sets.push(
                utils::split_value(QueryParam::GeneSet, &existing)?.into_values(),
            );
        } else {
            sets.push(Vec::new());
        }
    }

    let mut genes = sets.remove(0);
    for other in &sets {
        genes.retain(|g| other.contains(g));
    }
    let value = if genes.is_empty() {
        NONE.to_string()
    } else {
        genes.join(",")
    };
    Ok(query
        .without(QueryParam::Go)
        .without(QueryParam::Expression)
        .with(QueryParam::GeneSet, value))
}

/// Sort the tokens of `id` and `xref` into variant ids, accessions and
/// gene names.
pub fn classify_xrefs(query: Query) -> Result<Query> {
    if !query.is_valid(QueryParam::Id) && !query.is_valid(QueryParam::Xref) {
        return Ok(query);
    }
    let mut variant_ids = IndexSet::new();
    let mut accessions = IndexSet::new();
    let mut genes = IndexSet::new();
    if let Some(value) = query.get_string(QueryParam::Gene) {
        genes.extend(utils::split_value(QueryParam::Gene, &value)?.into_values());
    }
    for param in [QueryParam::Id, QueryParam::Xref] {
        let value = match query.get_string(param) {
            Some(value) => value,
            None => continue,
        };
        let values = utils::split_value(param, &value)?;
        if values.operation() == Some(QueryOperation::And) {
            return Err(VariantQueryError::malformed_param_with(
                param,
                &value,
                "Identifiers can only be combined with OR (,)",
            ));
        }
        for token in values {
            if utils::is_variant_id(&token) {
                variant_ids.insert(token);
            } else if utils::is_variant_accession(&token)
                || utils::is_clinical_accession(&token)
                || utils::is_gene_accession(&token)
            {
                accessions.insert(token);
            } else {
                genes.insert(token);
            }
        }
    }

    let set = |query: Query, param: QueryParam, values: IndexSet<String>| {
        if values.is_empty() {
            query.without(param)
        } else {
            query.with(param, values.into_iter().collect::<Vec<_>>().join(","))
        }
    };
    let query = set(query, QueryParam::Id, variant_ids);
    let query = set(query, QueryParam::Xref, accessions);
    Ok(set(query, QueryParam::Gene, genes))
}

/// Resolve `gene` into `geneRegions`.
///
/// Gene names stay in `gene` so that variants annotated with the gene also
/// match.
pub fn resolve_gene_regions(
    query: Query,
    annotation: &dyn AnnotationLookup,
    skip_missing_genes: bool,
    events: &mut Vec<Event>,
) -> Result<Query> {
    let value = match query.get_string(QueryParam::Gene) {
        Some(value) => value,
        None => return Ok(query),
    };
    let genes = utils::split_value(QueryParam::Gene, &value)?.into_values();
    let regions = annotation.gene_regions(&genes)?;
    let missing = genes
        .iter()
        .filter(|g| !regions.contains_key(*g))
        .cloned()
        .collect::<Vec<_>>();
    if !missing.is_empty() {
        if skip_missing_genes {
            tracing::warn!("skipping genes without region: {:?}", &missing);
            events.push(Event::warning(format!(
                "Skipped missing genes [{}]",
                missing.join(", ")
            )));
        } else {
            return Err(VariantQueryError::gene_not_found(missing.join(",")));
        }
    }
    Ok(if regions.is_empty() {
        query.without(QueryParam::GeneRegions)
    } else {
        query.with(
            QueryParam::GeneRegions,
            regions
                .values()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    })
}

/// Map deprecated types, expand subtypes and invert negated type lists.
pub fn normalize_types(query: Query) -> Result<Query> {
    let value = match query.get_string(QueryParam::Type) {
        Some(value) => value,
        None => return Ok(query),
    };
    let values = utils::split_negatable_value(QueryParam::Type, &value)?;
    let negated = values.iter().any(|v| v.negated);
    let requested = values
        .iter()
        .map(|v| {
            v.value.trim().parse::<VariantType>().map_err(|_| {
                VariantQueryError::malformed_param_with(
                    QueryParam::Type,
                    &value,
                    format!("Unknown variant type {:?}", v.value),
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut types = IndexSet::new();
    for t in &requested {
        match t.canonical() {
            Some(canonical) if !requested.contains(&canonical) => {
                return Err(VariantQueryError::malformed_param_with(
                    QueryParam::Type,
                    &value,
                    format!(
                        "Deprecated variant type {} requires {} to be queried as well",
                        t, canonical
                    ),
                ));
            }
            Some(canonical) => {
                types.insert(canonical);
                types.extend(canonical.subtypes());
            }
            None => {
                types.insert(*t);
                types.extend(t.subtypes());
            }
        }
    }

    let resolved = VariantType::universe()
        .filter(|t| types.contains(t) != negated)
        .map(|t| t.to_string())
        .collect::<Vec<_>>();
    Ok(query.with(QueryParam::Type, resolved.join(",")))
}

/// Fold the `sift` and `polyphen` shortcuts into `proteinSubstitution`.
pub fn fold_protein_substitution(query: Query) -> Result<Query> {
    if !query.is_valid(QueryParam::Sift) && !query.is_valid(QueryParam::Polyphen) {
        return Ok(query);
    }
    let mut sources: Vec<(QueryParam, Values<String>)> = Vec::new();
    if let Some(value) = query.get_string(QueryParam::ProteinSubstitution) {
        let values = utils::split_value(QueryParam::ProteinSubstitution, &value)?;
        for token in values.iter() {
            if utils::parse_key_op_value(token).key.is_none() {
                return Err(VariantQueryError::malformed_param_with(
                    QueryParam::ProteinSubstitution,
                    &value,
                    "Missing source, e.g. \"sift<0.2\"",
                ));
            }
        }
        sources.push((QueryParam::ProteinSubstitution, values));
    }
    for (param, source) in [(QueryParam::Sift, "sift"), (QueryParam::Polyphen, "polyphen")] {
        let value = match query.get_string(param) {
            Some(value) => value,
            None => continue,
        };
        let conflict = sources.iter().any(|(_, values)| {
            values
                .iter()
                .any(|t| utils::parse_key_op_value(t).key.as_deref() == Some(source))
        });
        if conflict {
            return Err(VariantQueryError::malformed_param_with(
                param,
                &value,
                format!("Conflict with \"{}\" in \"proteinSubstitution\"", source),
            ));
        }
        let values = utils::split_value(param, &value)?.try_map(|token| {
            let op_value = utils::parse_op_value(param, &token)?;
            Ok::<_, VariantQueryError>(format!("{}{}{}", source, op_value.op, op_value.value))
        })?;
        sources.push((param, values));
    }

    // Sources are combined with AND, so only single values or AND lists mix.
    if sources.len() > 1 {
        if let Some((param, _)) = sources
            .iter()
            .find(|(_, values)| values.operation() == Some(QueryOperation::Or))
        {
            let other = sources
                .iter()
                .map(|(p, _)| *p)
                .find(|p| p != param)
                .unwrap_or(*param);
            return Err(VariantQueryError::mixed_and_or_params(param, other));
        }
    }
    let operation = if sources.len() > 1 {
        Some(QueryOperation::And)
    } else {
        sources.first().and_then(|(_, values)| values.operation())
    };
    let tokens = sources
        .into_iter()
        .flat_map(|(_, values)| values.into_values())
        .collect::<Vec<_>>();
    Ok(query
        .without(QueryParam::Sift)
        .without(QueryParam::Polyphen)
        .with(
            QueryParam::ProteinSubstitution,
            Values::new(operation, tokens).to_query(),
        ))
}

/// Resolve consequence type aliases and accessions to SO terms.
pub fn normalize_consequence_types(query: Query) -> Result<Query> {
    let value = match query.get_string(QueryParam::ConsequenceType) {
        Some(value) => value,
        None => return Ok(query),
    };
    let values = utils::split_value(QueryParam::ConsequenceType, &value)?;
    let operation = values.operation();
    let mut terms = IndexSet::new();
    for token in values {
        let token = token.trim();
        match token.to_ascii_lowercase().as_str() {
            "lof" | "loss_of_function" => terms.extend(ontology::LOSS_OF_FUNCTION.iter().copied()),
            "pa" | "protein_altering" => terms.extend(ontology::protein_altering()),
            _ => {
                let term = ontology::term(token)
                    .or_else(|| ontology::term_for_accession(token))
                    .ok_or_else(|| {
                        VariantQueryError::malformed_param_with(
                            QueryParam::ConsequenceType,
                            &value,
                            format!("Unknown consequence type {:?}", token),
                        )
                    })?;
                terms.insert(term);
            }
        }
    }
    let terms = terms.into_iter().map(|t| t.to_string()).collect::<Vec<_>>();
    Ok(query.with(
        QueryParam::ConsequenceType,
        Values::new(operation, terms).to_query(),
    ))
}
