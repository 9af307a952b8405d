//! Rewrite of the study-level parameters: samples, genotypes, files,
//! family filters, scores and cohorts.

use crate::err::{Result, VariantQueryError};
use crate::metadata::{
    CohortMetadata, FileMetadata, MetadataRegistry, SampleMetadata, StudyMetadata, TaskStatus,
    VariantScoreMetadata,
};
use crate::query::genotypes;
use crate::query::multikv;
use crate::query::schema::{KeyValues, NegatableValue, Query, QueryOperation, QueryParam, Values};
use crate::query::utils::{self, IS};

/// Placeholder for a missing parent in `sampleCompoundHeterozygous`.
pub const MISSING_SAMPLE: &str = "-";

/// Parameters of which at most one may be given.
const EXCLUSIVE_PARAMS: &[QueryParam] = &[
    QueryParam::Sample,
    QueryParam::Genotype,
    QueryParam::SampleDeNovo,
    QueryParam::SampleMendelianError,
    QueryParam::SampleCompoundHeterozygous,
];

/// Keys of the file data that every file has.
const FIXED_FILE_DATA_KEYS: &[&str] = &["FILTER", "QUAL"];

/// Registry access plus the default study of one query.
pub struct StudyContext<'a> {
    registry: &'a dyn MetadataRegistry,
    default_study: Option<StudyMetadata>,
}

impl<'a> StudyContext<'a> {
    /// Validate `study` and determine the default study.
    ///
    /// The default study is the single non-negated `study` value, else the
    /// only registered study, else there is none.
    pub fn new(registry: &'a dyn MetadataRegistry, query: &Query) -> Result<Self> {
        let mut positive = Vec::new();
        if let Some(value) = query.get_string(QueryParam::Study) {
            for study in utils::split_negatable_value(QueryParam::Study, &value)? {
                let metadata = registry
                    .study(&study.value)?
                    .ok_or_else(|| VariantQueryError::study_not_found(&study.value))?;
                if !study.negated {
                    positive.push(metadata);
                }
            }
        }
        let default_study = match positive.len() {
            1 => positive.pop(),
            0 => {
                let mut studies = registry.studies()?;
                if studies.len() == 1 {
                    studies.pop()
                } else {
                    None
                }
            }
            _ => None,
        };
        tracing::debug!(
            "default study: {:?}",
            default_study.as_ref().map(|s| s.name.as_str())
        );
        Ok(Self {
            registry,
            default_study,
        })
    }

    pub fn registry(&self) -> &'a dyn MetadataRegistry {
        self.registry
    }

    pub fn default_study(&self) -> Option<&StudyMetadata> {
        self.default_study.as_ref()
    }

    fn study_for(&self, kind: &str, qualifier: Option<&str>, name: &str) -> Result<StudyMetadata> {
        if let Some(study) = qualifier {
            return self
                .registry
                .study(study)?
                .ok_or_else(|| VariantQueryError::study_not_found(study));
        }
        match &self.default_study {
            Some(study) => Ok(study.clone()),
            None => Err(VariantQueryError::missing_study_for(
                kind,
                [name],
                self.registry.study_names()?,
            )),
        }
    }

    /// Resolve `sample` or `study:sample`.
    pub fn resolve_sample(&self, value: &str) -> Result<(StudyMetadata, SampleMetadata)> {
        let (qualifier, name) = utils::split_study_resource(value);
        let study = self.study_for("samples", qualifier, name)?;
        let sample = self
            .registry
            .sample(study.id, name)?
            .ok_or_else(|| VariantQueryError::sample_not_found(name, &study.name))?;
        Ok((study, sample))
    }

    pub fn resolve_file(&self, value: &str) -> Result<(StudyMetadata, FileMetadata)> {
        let (qualifier, name) = utils::split_study_resource(value);
        let study = self.study_for("files", qualifier, name)?;
        let file = self
            .registry
            .file(study.id, name)?
            .ok_or_else(|| VariantQueryError::file_not_found(name, &study.name))?;
        Ok((study, file))
    }

    pub fn resolve_cohort(&self, value: &str) -> Result<(StudyMetadata, CohortMetadata)> {
        let (qualifier, name) = utils::split_study_resource(value);
        let study = self.study_for("cohorts", qualifier, name)?;
        let cohort = self
            .registry
            .cohort(study.id, name)?
            .ok_or_else(|| VariantQueryError::cohort_not_found(name, &study.name))?;
        Ok((study, cohort))
    }

    pub fn resolve_score(&self, value: &str) -> Result<(StudyMetadata, VariantScoreMetadata)> {
        let (qualifier, name) = utils::split_study_resource(value);
        let study = self.study_for("scores", qualifier, name)?;
        let score = self
            .registry
            .variant_score(study.id, name)?
            .ok_or_else(|| VariantQueryError::score_not_found(name, &study.name))?;
        Ok((study, score))
    }

    /// Name of a sample, given by id, within `study`.
    fn sample_name(&self, study: &StudyMetadata, id: Option<u32>) -> Result<String> {
        match id {
            Some(id) => Ok(self
                .registry
                .sample_by_id(study.id, id)?
                .map(|s| s.name)
                .unwrap_or_else(|| MISSING_SAMPLE.to_string())),
            None => Ok(MISSING_SAMPLE.to_string()),
        }
    }
}

/// Run all study rewrites in order.
pub fn preprocess(query: Query, ctx: &StudyContext) -> Result<Query> {
    let query = extract_sample_operators(query)?;
    let query = multikv::extract_genotype_from_sample_data(query)?;
    check_exclusive(&query)?;
    let query = normalize_sample_data(query, ctx)?;
    let query = normalize_file_data(query, ctx)?;
    let query = normalize_files(query, ctx)?;
    let query = rewrite_sample(query, ctx)?;
    let query = normalize_genotypes(query, ctx)?;
    let query = normalize_family_filters(query, ctx)?;
    let query = normalize_compound_heterozygous(query, ctx)?;
    let query = normalize_scores(query, ctx)?;
    normalize_cohorts(query, ctx)
}

/// Pseudo-operator of `sample=name:<operator>`.
fn sample_operator(suffix: &str) -> Option<QueryParam> {
    match suffix.to_ascii_lowercase().as_str() {
        "denovo" | "isdenovo" => Some(QueryParam::SampleDeNovo),
        "mendelianerror" | "ismendelianerror" => Some(QueryParam::SampleMendelianError),
        "compoundheterozygous" | "iscompoundheterozygous" => {
            Some(QueryParam::SampleCompoundHeterozygous)
        }
        _ => None,
    }
}

/// Move `sample=John:denovo` and friends into their dedicated parameters.
pub fn extract_sample_operators(query: Query) -> Result<Query> {
    let value = match query.get_string(QueryParam::Sample) {
        Some(value) if value.contains(IS) => value,
        _ => return Ok(query),
    };
    let values = utils::split_value(QueryParam::Sample, &value)?;
    let mut target: Option<QueryParam> = None;
    let mut samples = Vec::new();
    let mut plain = 0;
    for token in values.iter() {
        match token
            .rsplit_once(IS)
            .and_then(|(name, suffix)| sample_operator(suffix).map(|p| (name, p)))
        {
            Some((name, param)) => {
                if target.map(|t| t != param).unwrap_or(false) {
                    return Err(VariantQueryError::malformed_param_with(
                        QueryParam::Sample,
                        &value,
                        "Can not combine different sample operators",
                    ));
                }
                target = Some(param);
                samples.push(name.to_string());
            }
            None => plain += 1,
        }
    }
    match target {
        None => Ok(query),
        Some(_) if plain > 0 => Err(VariantQueryError::malformed_param_with(
            QueryParam::Sample,
            &value,
            "Can not combine sample operators with genotype filters",
        )),
        Some(param) => {
            if query.is_valid(param) {
                return Err(VariantQueryError::unsupported_combination(
                    QueryParam::Sample,
                    &value,
                    param,
                    query.get_str_or_empty(param),
                ));
            }
            Ok(query
                .without(QueryParam::Sample)
                .with(param, samples.join(",")))
        }
    }
}

/// Fail if more than one of the mutually exclusive sample filters is given.
pub fn check_exclusive(query: &Query) -> Result<()> {
    let present = EXCLUSIVE_PARAMS
        .iter()
        .filter(|p| query.is_valid(**p))
        .collect::<Vec<_>>();
    if let [first, second, ..] = present.as_slice() {
        return Err(VariantQueryError::unsupported_combination(
            first,
            query.get_str_or_empty(**first),
            second,
            query.get_str_or_empty(**second),
        ));
    }
    Ok(())
}

/// Validate `sampleData` and write it in its composite form.
pub fn normalize_sample_data(query: Query, ctx: &StudyContext) -> Result<Query> {
    let raw = match query.get_string(QueryParam::SampleData) {
        Some(raw) => raw,
        None => return Ok(query),
    };
    let parsed = multikv::parse_sample_data(&query)?;
    for sample in parsed.iter() {
        let (study, _) = ctx.resolve_sample(&sample.key)?;
        if study.sample_data_keys.is_empty() {
            continue;
        }
        if let Some(unknown) = sample
            .values
            .iter()
            .find(|f| !study.sample_data_keys.contains(&f.key))
        {
            return Err(VariantQueryError::malformed_param_with(
                QueryParam::SampleData,
                &raw,
                format!(
                    "Unknown sample data key {:?} in study {:?}",
                    unknown.key, study.name
                ),
            ));
        }
    }
    if let Some(genotype) = query.get_string(QueryParam::Genotype) {
        let genotype_op = multikv::parse_genotype_filter(&genotype)?.operation();
        if let (Some(a), Some(b)) = (parsed.operation(), genotype_op) {
            if a != b {
                return Err(VariantQueryError::mixed_and_or_params(
                    QueryParam::Genotype,
                    QueryParam::SampleData,
                ));
            }
        }
    }
    Ok(query.with(QueryParam::SampleData, parsed.to_string()))
}

/// Validate `fileData` and write it in its composite form.
pub fn normalize_file_data(query: Query, ctx: &StudyContext) -> Result<Query> {
    let raw = match query.get_string(QueryParam::FileData) {
        Some(raw) => raw,
        None => return Ok(query),
    };
    let parsed = multikv::parse_file_data(&query)?;
    for file in parsed.iter() {
        let (study, _) = ctx.resolve_file(&file.key)?;
        if study.file_data_keys.is_empty() {
            continue;
        }
        if let Some(unknown) = file.values.iter().find(|f| {
            !study.file_data_keys.contains(&f.key) && !FIXED_FILE_DATA_KEYS.contains(&f.key.as_str())
        }) {
            return Err(VariantQueryError::malformed_param_with(
                QueryParam::FileData,
                &raw,
                format!(
                    "Unknown file data key {:?} in study {:?}",
                    unknown.key, study.name
                ),
            ));
        }
    }
    if let Some(file) = query.get_string(QueryParam::File) {
        let file_op = utils::check_operator(QueryParam::File, &file)?;
        if let (Some(a), Some(b)) = (file_op, parsed.operation()) {
            if a != b {
                return Err(VariantQueryError::mixed_and_or_params(
                    QueryParam::File,
                    QueryParam::FileData,
                ));
            }
        }
    }
    Ok(query.with(QueryParam::FileData, parsed.to_string()))
}

pub fn normalize_files(query: Query, ctx: &StudyContext) -> Result<Query> {
    if let Some(value) = query.get_string(QueryParam::File) {
        for file in utils::split_negatable_value(QueryParam::File, &value)? {
            ctx.resolve_file(&file.value)?;
        }
    }
    Ok(query)
}

/// Rewrite plain `sample` filters into `genotype` filters.
///
/// A sample stands for the genotypes carrying the main alternate, or `NA`
/// for studies without genotypes.  `sample=John:0/1` is a genotype filter.
pub fn rewrite_sample(query: Query, ctx: &StudyContext) -> Result<Query> {
    let value = match query.get_string(QueryParam::Sample) {
        Some(value) => value,
        None => return Ok(query),
    };
    if value.contains(IS) {
        return Ok(query
            .without(QueryParam::Sample)
            .with(QueryParam::Genotype, value));
    }
    let samples = utils::split_negatable_value(QueryParam::Sample, &value)?;
    let genotypes = samples.try_map(|sample| {
        let (study, _) = ctx.resolve_sample(&sample.value)?;
        let gts = genotypes::sample_genotypes(&study.loaded_genotypes, study.exclude_genotypes)
            .into_iter()
            .map(|gt| NegatableValue::new(sample.negated, gt))
            .collect::<Vec<_>>();
        Ok::<_, VariantQueryError>(KeyValues::new(
            sample.value,
            Values::new(Some(QueryOperation::Or), gts),
        ))
    })?;
    Ok(query
        .without(QueryParam::Sample)
        .with(QueryParam::Genotype, genotypes.to_query()))
}

/// Expand `genotype` values against the loaded genotypes of each study.
pub fn normalize_genotypes(query: Query, ctx: &StudyContext) -> Result<Query> {
    let value = match query.get_string(QueryParam::Genotype) {
        Some(value) => value,
        None => return Ok(query),
    };
    let parsed = multikv::parse_genotype_filter(&value)?;
    let expanded = parsed.values.try_map(|sample| {
        let (study, _) = ctx.resolve_sample(&sample.key)?;
        let gts = if study.exclude_genotypes {
            vec![NegatableValue::new(
                sample.values.iter().any(|gt| gt.negated),
                genotypes::NA_GT_VALUE.to_string(),
            )]
        } else {
            genotypes::expand_genotypes(sample.values.values(), &study.loaded_genotypes)
        };
        Ok::<_, VariantQueryError>(KeyValues::new(
            sample.key,
            Values::new(Some(QueryOperation::Or), gts),
        ))
    })?;
    Ok(query.with(QueryParam::Genotype, expanded.to_query()))
}

/// Validate the samples of the mendelian error and de novo filters.
pub fn normalize_family_filters(query: Query, ctx: &StudyContext) -> Result<Query> {
    for param in [QueryParam::SampleMendelianError, QueryParam::SampleDeNovo] {
        let value = match query.get_string(param) {
            Some(value) => value,
            None => continue,
        };
        for name in utils::split_value(param, &value)? {
            let (study, sample) = ctx.resolve_sample(&name)?;
            if sample.mendelian_error_status != TaskStatus::Ready {
                return Err(VariantQueryError::malformed_param_with(
                    param,
                    &value,
                    format!(
                        "Mendelian errors of sample {:?} in study {:?} are not computed ({})",
                        sample.name, study.name, sample.mendelian_error_status
                    ),
                ));
            }
        }
    }
    Ok(query)
}

/// Complete `sampleCompoundHeterozygous` to `proband,father,mother`.
pub fn normalize_compound_heterozygous(query: Query, ctx: &StudyContext) -> Result<Query> {
    let param = QueryParam::SampleCompoundHeterozygous;
    let value = match query.get_string(param) {
        Some(value) => value,
        None => return Ok(query),
    };
    let values = utils::split_value(param, &value)?.into_values();
    let (study, proband, father, mother) = match values.as_slice() {
        [proband] => {
            let (study, sample) = ctx.resolve_sample(proband)?;
            let father = ctx.sample_name(&study, sample.father_id)?;
            let mother = ctx.sample_name(&study, sample.mother_id)?;
            (study, sample, father, mother)
        }
        [proband, father, mother] => {
            let (study, sample) = ctx.resolve_sample(proband)?;
            (study, sample, father.clone(), mother.clone())
        }
        _ => {
            return Err(VariantQueryError::malformed_param_with(
                param,
                &value,
                "Expected the proband, or the proband, father and mother",
            ))
        }
    };
    if father == MISSING_SAMPLE && mother == MISSING_SAMPLE {
        return Err(VariantQueryError::malformed_param_with(
            param,
            &value,
            format!("Require at least one parent of sample {:?}", proband.name),
        ));
    }
    for parent in [&father, &mother] {
        if parent != MISSING_SAMPLE {
            let (_, name) = utils::split_study_resource(parent);
            ctx.registry()
                .sample(study.id, name)?
                .ok_or_else(|| VariantQueryError::sample_not_found(name, &study.name))?;
        }
    }
    let (qualifier, proband_name) = utils::split_study_resource(&values[0]);
    let proband_name = match qualifier {
        Some(qualifier) => format!("{}{}{}", qualifier, IS, proband_name),
        None => proband_name.to_string(),
    };
    Ok(query.with(param, format!("{},{},{}", proband_name, father, mother)))
}

/// Validate `score` filters `[study:]score<op>value`.
pub fn normalize_scores(query: Query, ctx: &StudyContext) -> Result<Query> {
    let value = match query.get_string(QueryParam::Score) {
        Some(value) => value,
        None => return Ok(query),
    };
    for token in utils::split_value(QueryParam::Score, &value)? {
        let kov = utils::parse_key_op_value(&token);
        let key = kov.key.ok_or_else(|| {
            VariantQueryError::malformed_param_with(QueryParam::Score, &value, "Missing score name")
        })?;
        if kov.value.parse::<f64>().is_err() {
            return Err(VariantQueryError::malformed_param_with(
                QueryParam::Score,
                &value,
                format!("Expected a number for score {:?}", key),
            ));
        }
        ctx.resolve_score(&key)?;
    }
    Ok(query)
}

pub fn normalize_cohorts(query: Query, ctx: &StudyContext) -> Result<Query> {
    if let Some(value) = query.get_string(QueryParam::Cohort) {
        for cohort in utils::split_negatable_value(QueryParam::Cohort, &value)? {
            ctx.resolve_cohort(&cohort.value)?;
        }
    }
    Ok(query)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::metadata::memory::InMemoryRegistry;
    use crate::test_utils;

    fn ctx<'a>(registry: &'a InMemoryRegistry, query: &Query) -> StudyContext<'a> {
        StudyContext::new(registry, query).expect("valid study context")
    }

    #[test]
    fn default_study_policy() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let none = Query::new();
        assert!(ctx(&registry, &none).default_study().is_none());

        let single = Query::new().with(QueryParam::Study, "S2");
        assert_eq!(
            ctx(&registry, &single).default_study().map(|s| s.name.as_str()),
            Some("S2")
        );

        let negated = Query::new().with(QueryParam::Study, "S1,!S2");
        assert_eq!(
            ctx(&registry, &negated).default_study().map(|s| s.name.as_str()),
            Some("S1")
        );

        let two = Query::new().with(QueryParam::Study, "S1,S2");
        assert!(ctx(&registry, &two).default_study().is_none());

        let unknown = Query::new().with(QueryParam::Study, "S9");
        assert!(matches!(
            StudyContext::new(&registry, &unknown),
            Err(VariantQueryError::NotFound { .. })
        ));

        let only = InMemoryRegistry::from_json_str(r#"[{"name": "ONLY"}]"#)?;
        assert_eq!(
            ctx(&only, &none).default_study().map(|s| s.name.as_str()),
            Some("ONLY")
        );
        Ok(())
    }

    #[test]
    fn missing_study_is_always_an_error() {
        let registry = test_utils::registry();
        let query = Query::new().with(QueryParam::Sample, "John");
        let ctx = ctx(&registry, &query);
        assert!(matches!(
            ctx.resolve_sample("John"),
            Err(VariantQueryError::MissingStudy { .. })
        ));
        assert!(ctx.resolve_sample("S1:John").is_ok());
    }

    #[rstest]
    #[case("John:denovo", QueryParam::SampleDeNovo, "John")]
    #[case("John:isMendelianError", QueryParam::SampleMendelianError, "John")]
    #[case("John:compoundHeterozygous", QueryParam::SampleCompoundHeterozygous, "John")]
    #[case("John:deNovo,Pete:deNovo", QueryParam::SampleDeNovo, "John,Pete")]
    fn sample_operators(
        #[case] value: &str,
        #[case] param: QueryParam,
        #[case] expected: &str,
    ) -> Result<(), anyhow::Error> {
        let query = extract_sample_operators(Query::new().with(QueryParam::Sample, value))?;
        assert!(!query.is_valid(QueryParam::Sample));
        assert_eq!(query.get_string(param), Some(expected.to_string()));
        Ok(())
    }

    #[test]
    fn sample_operators_mixed_with_genotypes() {
        let query = Query::new().with(QueryParam::Sample, "John:denovo,Pete:0/1");
        assert!(matches!(
            extract_sample_operators(query),
            Err(VariantQueryError::MalformedParam { .. })
        ));
    }

    #[rstest]
    #[case(QueryParam::Sample, "John", QueryParam::Genotype, "Pete:0/1")]
    #[case(QueryParam::Genotype, "John:0/1", QueryParam::SampleDeNovo, "John")]
    #[case(QueryParam::SampleMendelianError, "John", QueryParam::SampleDeNovo, "John")]
    #[case(QueryParam::Sample, "John", QueryParam::SampleCompoundHeterozygous, "John")]
    fn exclusive_params(
        #[case] p1: QueryParam,
        #[case] v1: &str,
        #[case] p2: QueryParam,
        #[case] v2: &str,
    ) {
        let query = Query::new().with(p1, v1).with(p2, v2);
        assert!(matches!(
            check_exclusive(&query),
            Err(VariantQueryError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn sample_rewritten_to_main_alt_genotypes() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::Sample, "John");
        let query = rewrite_sample(query.clone(), &ctx(&registry, &query))?;
        assert!(!query.is_valid(QueryParam::Sample));
        assert_eq!(
            query.get_string(QueryParam::Genotype),
            Some("John:0/1,1/1".to_string())
        );
        Ok(())
    }

    #[test]
    fn sample_in_study_without_genotypes() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S2")
            .with(QueryParam::Sample, "Sam");
        let query = rewrite_sample(query.clone(), &ctx(&registry, &query))?;
        assert_eq!(
            query.get_string(QueryParam::Genotype),
            Some("Sam:NA".to_string())
        );
        Ok(())
    }

    #[test]
    fn genotypes_expanded_and_idempotent() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::Genotype, "John:HET;Pete:HOM_REF;Mary:1/2");
        let ctx = ctx(&registry, &query);
        let query = normalize_genotypes(query, &ctx)?;
        assert_eq!(
            query.get_string(QueryParam::Genotype),
            Some("John:0/1;Pete:0/0;Mary:x/x".to_string())
        );
        assert_eq!(normalize_genotypes(query.clone(), &ctx)?, query);
        Ok(())
    }

    #[test]
    fn sample_data_keys_validated() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let base = Query::new().with(QueryParam::Study, "S1");
        let ok = base.clone().with(QueryParam::SampleData, "John:DP>=10;GQ>5");
        let ctx = ctx(&registry, &base);
        assert_eq!(
            normalize_sample_data(ok, &ctx)?.get_string(QueryParam::SampleData),
            Some("John:DP>=10;GQ>5".to_string())
        );
        let bad = base.with(QueryParam::SampleData, "John:XX>1");
        assert!(matches!(
            normalize_sample_data(bad, &ctx),
            Err(VariantQueryError::MalformedParam { .. })
        ));
        Ok(())
    }

    #[test]
    fn sample_data_and_genotype_operators_must_agree() {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::Genotype, "John:0/1,Pete:0/1")
            .with(QueryParam::SampleData, "John:DP>5;Pete:DP>5");
        let ctx = ctx(&registry, &query);
        assert!(matches!(
            normalize_sample_data(query, &ctx),
            Err(VariantQueryError::MixedAndOrParams { .. })
        ));
    }

    #[test]
    fn file_data_operator_must_match_file() {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::File, "f1,f2")
            .with(QueryParam::FileData, "f1:FILTER=PASS;f2:QUAL>10");
        let ctx = ctx(&registry, &query);
        assert!(matches!(
            normalize_file_data(query, &ctx),
            Err(VariantQueryError::MixedAndOrParams { .. })
        ));
    }

    #[test]
    fn mendelian_requires_ready_status() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let base = Query::new().with(QueryParam::Study, "S1");
        let ctx = ctx(&registry, &base);
        assert!(normalize_family_filters(
            base.clone().with(QueryParam::SampleMendelianError, "John"),
            &ctx
        )
        .is_ok());
        assert!(matches!(
            normalize_family_filters(base.with(QueryParam::SampleDeNovo, "Pete"), &ctx),
            Err(VariantQueryError::MalformedParam { .. })
        ));
        Ok(())
    }

    #[test]
    fn compound_heterozygous_parents_from_pedigree() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let base = Query::new().with(QueryParam::Study, "S1");
        let ctx = ctx(&registry, &base);
        let query = normalize_compound_heterozygous(
            base.clone()
                .with(QueryParam::SampleCompoundHeterozygous, "John"),
            &ctx,
        )?;
        assert_eq!(
            query.get_string(QueryParam::SampleCompoundHeterozygous),
            Some("John,Pete,Mary".to_string())
        );
        assert_eq!(normalize_compound_heterozygous(query.clone(), &ctx)?, query);

        assert!(matches!(
            normalize_compound_heterozygous(
                base.with(QueryParam::SampleCompoundHeterozygous, "Paul"),
                &ctx
            ),
            Err(VariantQueryError::MalformedParam { .. })
        ));
        Ok(())
    }

    #[test]
    fn scores_and_cohorts_validated() {
        let registry = test_utils::registry();
        let base = Query::new().with(QueryParam::Study, "S1");
        let ctx = ctx(&registry, &base);
        assert!(normalize_scores(base.clone().with(QueryParam::Score, "cadd>=20"), &ctx).is_ok());
        assert!(matches!(
            normalize_scores(base.clone().with(QueryParam::Score, "nope>=20"), &ctx),
            Err(VariantQueryError::NotFound { .. })
        ));
        assert!(matches!(
            normalize_scores(base.clone().with(QueryParam::Score, "cadd>=high"), &ctx),
            Err(VariantQueryError::MalformedParam { .. })
        ));
        assert!(normalize_cohorts(base.clone().with(QueryParam::Cohort, "ALL"), &ctx).is_ok());
        assert!(matches!(
            normalize_cohorts(base.with(QueryParam::Cohort, "NOPE"), &ctx),
            Err(VariantQueryError::NotFound { .. })
        ));
    }
}
