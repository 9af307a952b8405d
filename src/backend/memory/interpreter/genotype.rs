//! Per-sample filters: genotypes, sample data and family based filters.

use crate::query::genotypes::{genotype_matches, Genotype, GenotypeClass};
use crate::query::parser::filter::{CompoundHeterozygousFilter, StudyResource};
use crate::query::schema::{KeyOpValue, KeyValues, NegatableValue, Values, Variant};

use super::Parents;

fn sample_gt<'a>(variant: &'a Variant, study: &str, sample: &str) -> Option<&'a str> {
    variant.study(study).and_then(|s| s.sample_gt(sample))
}

fn parsed_gt(variant: &Variant, study: &str, sample: &str) -> Option<Genotype> {
    sample_gt(variant, study, sample).and_then(Genotype::parse)
}

/// Determine whether the `Variant` passes the genotype filter.
pub fn passes(
    filter: &Values<KeyValues<StudyResource, NegatableValue<String>>>,
    variant: &Variant,
) -> bool {
    let res = filter
        .test::<(), _>(|kv| {
            let actual = sample_gt(variant, &kv.key.study.name, kv.key.name());
            let negated = kv.values.iter().all(|gt| gt.negated);
            Ok(if negated {
                kv.values.iter().all(|gt| !genotype_matches(&gt.value, actual))
            } else {
                kv.values.iter().any(|gt| genotype_matches(&gt.value, actual))
            })
        })
        .unwrap_or(false);
    if !res {
        tracing::trace!("variant {} fails genotype filter", variant);
    }
    res
}

/// Determine whether the `Variant` passes the sample data filter.
pub fn passes_sample_data(
    filter: &Values<KeyValues<StudyResource, KeyOpValue<String, String>>>,
    variant: &Variant,
) -> Result<bool, anyhow::Error> {
    filter.test(|kv| {
        let data = variant
            .study(&kv.key.study.name)
            .and_then(|s| s.samples.get(kv.key.name()));
        kv.values.test(|kov| {
            let actual = data.and_then(|d| d.data.get(&kov.key)).map(|s| s.as_str());
            kov.op.matches(actual, &kov.value)
        })
    })
}

/// Whether the child genotype can not be explained by the parents.
///
/// Only calls with all three genotypes present are judged.
fn is_mendelian_error(child: &Genotype, father: &Genotype, mother: &Genotype) -> bool {
    if child.is_missing() || father.is_missing() || mother.is_missing() {
        return false;
    }
    match child.alleles.as_slice() {
        [Some(a), Some(b)] => {
            let from_father = |x: &u32| father.alleles.contains(&Some(*x));
            let from_mother = |x: &u32| mother.alleles.contains(&Some(*x));
            !((from_father(a) && from_mother(b)) || (from_father(b) && from_mother(a)))
        }
        _ => false,
    }
}

/// Determine whether the `Variant` is a mendelian error in any of the samples.
pub fn passes_mendelian_error(
    samples: &Values<StudyResource>,
    parents: &Parents,
    variant: &Variant,
) -> bool {
    samples.iter().any(|sample| {
        let study = &sample.study.name;
        let (father, mother) = match parents.get(&(study.clone(), sample.name().to_string())) {
            Some((Some(father), Some(mother))) => (father, mother),
            _ => return false,
        };
        match (
            parsed_gt(variant, study, sample.name()),
            parsed_gt(variant, study, father),
            parsed_gt(variant, study, mother),
        ) {
            (Some(c), Some(f), Some(m)) => is_mendelian_error(&c, &f, &m),
            _ => false,
        }
    })
}

/// Determine whether the `Variant` is de novo in any of the samples: the
/// sample carries an alternate allele that no parent has.
pub fn passes_de_novo(samples: &Values<StudyResource>, parents: &Parents, variant: &Variant) -> bool {
    samples.iter().any(|sample| {
        let study = &sample.study.name;
        let child = match parsed_gt(variant, study, sample.name()) {
            Some(child) if GenotypeClass::NonRef.test(&child) => child,
            _ => return false,
        };
        let (father, mother) = match parents.get(&(study.clone(), sample.name().to_string())) {
            Some(pair) => pair,
            None => return false,
        };
        let parent_has = |parent: &Option<String>, allele: u32| {
            parent
                .as_deref()
                .and_then(|p| parsed_gt(variant, study, p))
                .map(|gt| gt.alleles.contains(&Some(allele)))
                .unwrap_or(false)
        };
        let present = [father, mother]
            .iter()
            .filter(|p| p.as_deref().and_then(|p| parsed_gt(variant, study, p)).is_some())
            .count();
        present > 0
            && child
                .alleles
                .iter()
                .flatten()
                .filter(|a| **a > 0)
                .any(|a| !parent_has(father, *a) && !parent_has(mother, *a))
    })
}

/// Necessary condition for compound heterozygosity of one variant: the
/// proband is heterozygous and no present parent is homozygous alternate.
///
/// Pairing the variants into genes is left to the mode of inheritance
/// grouping.
pub fn passes_compound_heterozygous(trio: &CompoundHeterozygousFilter, variant: &Variant) -> bool {
    let study = &trio.study.name;
    let het = parsed_gt(variant, study, &trio.proband.name)
        .map(|gt| GenotypeClass::Het.test(&gt))
        .unwrap_or(false);
    het && [&trio.father, &trio.mother]
        .into_iter()
        .flatten()
        .all(|parent| {
            parsed_gt(variant, study, &parent.name)
                .map(|gt| !GenotypeClass::HomAlt.test(&gt))
                .unwrap_or(true)
        })
}
