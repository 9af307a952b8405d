use crate::query::parser::filter::StudyResource;
use crate::query::schema::{KeyOpValue, KeyValues, NegatableValue, Values, Variant};

/// Determine whether the `Variant` was called in the files of the filter.
pub fn passes(filter: &Values<NegatableValue<StudyResource>>, variant: &Variant) -> bool {
    filter
        .test::<(), _>(|file| {
            let called = variant
                .study(&file.value.study.name)
                .map(|s| s.files.contains_key(file.value.name()))
                .unwrap_or(false);
            Ok(called != file.negated)
        })
        .unwrap_or(false)
}

/// Determine whether the `Variant` passes the file data filter.
pub fn passes_file_data(
    filter: &Values<KeyValues<StudyResource, KeyOpValue<String, String>>>,
    variant: &Variant,
) -> Result<bool, anyhow::Error> {
    filter.test(|kv| {
        let data = match variant
            .study(&kv.key.study.name)
            .and_then(|s| s.files.get(kv.key.name()))
        {
            Some(data) => data,
            None => return Ok(false),
        };
        kv.values.test(|kov| {
            kov.op
                .matches(data.data.get(&kov.key).map(|s| s.as_str()), &kov.value)
        })
    })
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use super::*;
    use crate::query::schema::data::{FileEntry, StudyEntry};
    use crate::query::schema::{Comparator, QueryOperation, ResourceId};

    fn file(name: &str) -> StudyResource {
        StudyResource::new(ResourceId::new(1, "S1"), ResourceId::new(1, name))
    }

    fn variant() -> Variant {
        let mut variant = Variant::new("1", 100, "A", "T");
        let mut entry = FileEntry::default();
        entry.data.insert("FILTER".into(), "PASS".into());
        entry.data.insert("QUAL".into(), "45.5".into());
        let mut study = StudyEntry {
            study_id: "S1".into(),
            ..Default::default()
        };
        study.files.insert("f1".into(), entry);
        variant.studies.push(study);
        variant
    }

    #[rstest]
    #[case("f1", false, true)]
    #[case("f1", true, false)]
    #[case("f2", false, false)]
    #[case("f2", true, true)]
    fn passes_file(#[case] name: &str, #[case] negated: bool, #[case] expected: bool) {
        let filter = Values::single(NegatableValue::new(negated, file(name)));
        assert_eq!(passes(&filter, &variant()), expected);
    }

    #[rstest]
    #[case("PASS", "30", true)]
    #[case("PASS", "50", false)]
    #[case("LowQual", "30", false)]
    fn passes_filter_and_qual(
        #[case] filter: &str,
        #[case] qual: &str,
        #[case] expected: bool,
    ) -> Result<(), anyhow::Error> {
        let data = Values::single(KeyValues::new(
            file("f1"),
            Values::new(
                Some(QueryOperation::And),
                vec![
                    KeyOpValue::new("FILTER".to_string(), Comparator::Eq, filter.to_string()),
                    KeyOpValue::new("QUAL".to_string(), Comparator::Gt, qual.to_string()),
                ],
            ),
        ));
        assert_eq!(passes_file_data(&data, &variant())?, expected);
        Ok(())
    }
}
