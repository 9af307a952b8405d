use crate::query::parser::filter::{ScoreFilter, StudyResource};
use crate::query::schema::{NegatableValue, Values, Variant};

/// Determine whether the `Variant` passes the variant score filter; variants
/// without the score fail.
pub fn passes(filter: &Values<ScoreFilter>, variant: &Variant) -> bool {
    filter
        .test::<(), _>(|score| {
            Ok(variant
                .study(&score.score.study.name)
                .and_then(|s| s.scores.get(score.score.name()))
                .map(|actual| score.op.compare_numbers(*actual, score.value))
                .unwrap_or(false))
        })
        .unwrap_or(false)
}

/// Determine whether the `Variant` has alternate alleles in the cohorts.
pub fn passes_cohort(filter: &Values<NegatableValue<StudyResource>>, variant: &Variant) -> bool {
    filter
        .test::<(), _>(|cohort| {
            let carried = variant
                .study(&cohort.value.study.name)
                .and_then(|s| s.stats.get(cohort.value.name()))
                .map(|stats| stats.alt_allele_count > 0)
                .unwrap_or(false);
            Ok(carried != cohort.negated)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;
    use crate::query::schema::data::{StudyEntry, VariantStats};
    use crate::query::schema::{Comparator, ResourceId};

    fn variant() -> Variant {
        let mut variant = Variant::new("1", 100, "A", "T");
        let mut study = StudyEntry {
            study_id: "S1".into(),
            ..Default::default()
        };
        study.scores.insert("cadd".into(), 21.5);
        study.stats.insert(
            "ALL".into(),
            VariantStats {
                alt_allele_freq: 0.25,
                alt_allele_count: 2,
            },
        );
        variant.studies.push(study);
        variant
    }

    fn resource(name: &str) -> StudyResource {
        StudyResource::new(ResourceId::new(1, "S1"), ResourceId::new(1, name))
    }

    #[rstest]
    #[case("cadd", Comparator::Ge, 20.0, true)]
    #[case("cadd", Comparator::Lt, 20.0, false)]
    #[case("gerp", Comparator::Ge, 0.0, false)]
    fn passes_score(
        #[case] name: &str,
        #[case] op: Comparator,
        #[case] value: f64,
        #[case] expected: bool,
    ) {
        let filter = Values::single(ScoreFilter {
            score: resource(name),
            op,
            value,
        });
        assert_eq!(passes(&filter, &variant()), expected);
    }

    #[test]
    fn passes_cohort_negated() {
        let with = Values::single(NegatableValue::new(false, resource("ALL")));
        let without = Values::single(NegatableValue::new(true, resource("ALL")));
        assert!(passes_cohort(&with, &variant()));
        assert!(!passes_cohort(&without, &variant()));
    }
}
