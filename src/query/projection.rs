//! Resolution of the studies, samples, files and fields a query returns.

use std::collections::BTreeSet;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::err::{Result, VariantQueryError};
use crate::metadata::{
    CohortMetadata, FileMetadata, MetadataRegistry, SampleMetadata, StudyMetadata,
};
use crate::query::multikv;
use crate::query::schema::{Event, Query, QueryOptions, QueryParam, Variant, VariantField};
use crate::query::utils::{self, IS};

use super::parser::studies::MISSING_SAMPLE;
use super::schema::EngineConfig;

/// Included resources of one study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyProjection {
    pub study: StudyMetadata,
    pub samples: Vec<SampleMetadata>,
    pub files: Vec<FileMetadata>,
    /// Cohorts whose statistics are returned.
    pub cohorts: Vec<CohortMetadata>,
}

impl StudyProjection {
    pub fn sample_names(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.name.clone()).collect()
    }
}

/// What a query returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantQueryProjection {
    pub fields: BTreeSet<VariantField>,
    /// Included studies by name, in registry order.
    pub studies: IndexMap<String, StudyProjection>,
    /// Number of samples before sample pagination.
    pub num_total_samples: usize,
    /// Number of included samples.
    pub num_samples: usize,
    /// Whether sample pagination dropped samples.
    pub sample_pagination: bool,
    pub events: Vec<Event>,
}

impl VariantQueryProjection {
    pub fn study_names(&self) -> Vec<String> {
        self.studies.keys().cloned().collect()
    }

    /// Included sample names of each study.
    pub fn samples_by_study(&self) -> IndexMap<String, Vec<String>> {
        self.studies
            .iter()
            .map(|(name, p)| (name.clone(), p.sample_names()))
            .collect()
    }

    /// Strip everything the projection does not include.
    pub fn apply(&self, mut variant: Variant) -> Variant {
        if !self.fields.contains(&VariantField::Annotation) {
            variant.annotation = None;
        }
        if !self.fields.contains(&VariantField::Studies) {
            variant.studies.clear();
            return variant;
        }
        let samples = self.fields.contains(&VariantField::StudiesSamples);
        let files = self.fields.contains(&VariantField::StudiesFiles);
        let stats = self.fields.contains(&VariantField::StudiesStats);
        let scores = self.fields.contains(&VariantField::StudiesScores);
        variant.studies = variant
            .studies
            .into_iter()
            .filter_map(|mut entry| {
                let projection = self.studies.get(&entry.study_id)?;
                entry.samples = if samples {
                    projection
                        .samples
                        .iter()
                        .filter_map(|s| {
                            entry
                                .samples
                                .swap_remove(&s.name)
                                .map(|data| (s.name.clone(), data))
                        })
                        .collect()
                } else {
                    IndexMap::new()
                };
                if files {
                    entry
                        .files
                        .retain(|name, _| projection.files.iter().any(|f| &f.name == name));
                } else {
                    entry.files.clear();
                }
                if stats {
                    entry
                        .stats
                        .retain(|name, _| projection.cohorts.iter().any(|c| &c.name == name));
                } else {
                    entry.stats.clear();
                }
                if !scores {
                    entry.scores.clear();
                }
                Some(entry)
            })
            .collect();
        variant
    }
}

/// Include list of a parameter: `None` if not given, `all` or names.
enum IncludeList {
    Unset,
    All,
    Nothing,
    Names(Vec<String>),
}

fn include_list(query: &Query, param: QueryParam) -> Result<IncludeList> {
    let value = match query.get_string(param) {
        Some(value) => value,
        None => return Ok(IncludeList::Unset),
    };
    let values = utils::split_value(param, &value)?.into_values();
    Ok(match values.as_slice() {
        [v] if utils::is_all_value(v) => IncludeList::All,
        [v] if utils::is_none_value(v) => IncludeList::Nothing,
        _ => IncludeList::Names(values),
    })
}

/// Whether `value`, plain or `study:name`, names `name` in `study`.
fn names_resource(value: &str, study: &str, name: &str) -> bool {
    match utils::split_study_resource(value) {
        (Some(qualifier), resource) => qualifier == study && resource == name,
        (None, resource) => resource == name,
    }
}

pub struct ProjectionResolver<'a> {
    registry: &'a dyn MetadataRegistry,
    config: &'a EngineConfig,
}

impl<'a> ProjectionResolver<'a> {
    pub fn new(registry: &'a dyn MetadataRegistry, config: &'a EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Resolve the projection of a normalized query.
    pub fn resolve(&self, query: &Query, options: &QueryOptions) -> Result<VariantQueryProjection> {
        let fields = VariantField::from_options(options)?;
        let mut events = Vec::new();

        let filter_samples = self.filter_samples(query)?;
        let pedigree_samples = self.pedigree_samples(query)?;
        let studies = self.include_studies(query, &fields, &filter_samples)?;

        let explicit_samples = query.is_valid(QueryParam::IncludeSample);
        let mut projections = IndexMap::new();
        for study in studies {
            let samples = self.include_samples(
                query,
                &fields,
                &study,
                &filter_samples,
                &pedigree_samples,
            )?;
            let files = self.include_files(query, &fields, &study, &samples)?;
            let cohorts = if fields.contains(&VariantField::StudiesStats) {
                self.registry
                    .cohorts(study.id)?
                    .into_iter()
                    .filter(|c| c.calculated)
                    .collect()
            } else {
                Vec::new()
            };
            projections.insert(
                study.name.clone(),
                StudyProjection {
                    study,
                    samples,
                    files,
                    cohorts,
                },
            );
        }
        self.check_pedigree_included(query, &projections, &pedigree_samples)?;

        let num_total_samples = projections.values().map(|p| p.samples.len()).sum::<usize>();
        let paginate = !explicit_samples
            || query.is_valid(QueryParam::SampleSkip)
            || query.is_valid(QueryParam::SampleLimit);
        let sample_pagination = if paginate {
            self.paginate_samples(query, &mut projections)?
        } else {
            false
        };
        let num_samples = projections.values().map(|p| p.samples.len()).sum::<usize>();
        let num_total_samples = match query.get_int(QueryParam::NumTotalSamples)? {
            Some(n) if !paginate => n.max(0) as usize,
            _ => num_total_samples,
        };
        if sample_pagination {
            events.push(Event::info(format!(
                "Returning {} of {} samples; use sampleSkip and sampleLimit to page",
                num_samples, num_total_samples
            )));
        }
        tracing::debug!(
            "projection: {} studies, {} of {} samples",
            projections.len(),
            num_samples,
            num_total_samples
        );

        Ok(VariantQueryProjection {
            fields,
            studies: projections,
            num_total_samples,
            num_samples,
            sample_pagination,
            events,
        })
    }

    /// Samples referenced by the sample filters, as given.
    fn filter_samples(&self, query: &Query) -> Result<Vec<String>> {
        let mut samples = IndexSet::new();
        if let Some(value) = query.get_string(QueryParam::Sample) {
            if value.contains(IS) {
                for kv in multikv::parse_genotype_filter(&value)?.iter() {
                    samples.insert(kv.key.clone());
                }
            } else {
                for token in utils::split_value(QueryParam::Sample, &value)? {
                    if !utils::is_negated(&token) {
                        samples.insert(token);
                    }
                }
            }
        }
        if let Some(value) = query.get_string(QueryParam::Genotype) {
            for kv in multikv::parse_genotype_filter(&value)?.iter() {
                samples.insert(kv.key.clone());
            }
        }
        for kv in multikv::parse_sample_data(query)?.iter() {
            samples.insert(kv.key.clone());
        }
        for param in [
            QueryParam::SampleMendelianError,
            QueryParam::SampleDeNovo,
            QueryParam::SampleCompoundHeterozygous,
        ] {
            if let Some(value) = query.get_string(param) {
                for name in utils::split_value(param, &value)? {
                    if name != MISSING_SAMPLE {
                        samples.insert(name);
                    }
                }
            }
        }
        Ok(samples.into_iter().collect())
    }

    /// Parents of the samples of the mendelian error and de novo filters,
    /// as `(child, parent)` pairs qualified by study.
    fn pedigree_samples(&self, query: &Query) -> Result<Vec<(StudyMetadata, SampleMetadata)>> {
        let mut result = Vec::new();
        for param in [QueryParam::SampleMendelianError, QueryParam::SampleDeNovo] {
            let value = match query.get_string(param) {
                Some(value) => value,
                None => continue,
            };
            for name in utils::split_value(param, &value)? {
                for study in self.registry.studies()? {
                    let (qualifier, sample) = utils::split_study_resource(&name);
                    if qualifier.map(|q| q != study.name).unwrap_or(false) {
                        continue;
                    }
                    let child = match self.registry.sample(study.id, sample)? {
                        Some(child) => child,
                        None => continue,
                    };
                    for parent in [child.father_id, child.mother_id].into_iter().flatten() {
                        if let Some(parent) = self.registry.sample_by_id(study.id, parent)? {
                            result.push((study.clone(), parent));
                        }
                    }
                }
            }
        }
        Ok(result)
    }

    fn include_studies(
        &self,
        query: &Query,
        fields: &BTreeSet<VariantField>,
        filter_samples: &[String],
    ) -> Result<Vec<StudyMetadata>> {
        if !fields.contains(&VariantField::Studies) {
            return Ok(Vec::new());
        }
        let all = self.registry.studies()?;
        let lookup = |names: &[String]| -> Result<Vec<StudyMetadata>> {
            names
                .iter()
                .map(|name| {
                    all.iter()
                        .find(|s| &s.name == name || s.id.to_string() == *name)
                        .cloned()
                        .ok_or_else(|| VariantQueryError::study_not_found(name))
                })
                .collect()
        };
        match include_list(query, QueryParam::IncludeStudy)? {
            IncludeList::All => return Ok(all.clone()),
            IncludeList::Nothing => return Ok(Vec::new()),
            IncludeList::Names(names) => return lookup(&names),
            IncludeList::Unset => (),
        }
        if let Some(value) = query.get_string(QueryParam::Study) {
            let values = utils::split_negatable_value(QueryParam::Study, &value)?;
            let (negated, positive): (Vec<_>, Vec<_>) = values.into_iter().partition(|v| v.negated);
            if !positive.is_empty() {
                return lookup(&positive.into_iter().map(|v| v.value).collect::<Vec<_>>());
            }
            let negated = lookup(&negated.into_iter().map(|v| v.value).collect::<Vec<_>>())?;
            return Ok(all
                .iter()
                .filter(|s| !negated.iter().any(|n| n.id == s.id))
                .cloned()
                .collect());
        }

        // Narrow to the studies of referenced samples and files.
        let mut referenced = filter_samples.to_vec();
        if let IncludeList::Names(names) = include_list(query, QueryParam::IncludeSample)? {
            referenced.extend(names);
        }
        let mut files = Vec::new();
        if let IncludeList::Names(names) = include_list(query, QueryParam::IncludeFile)? {
            files.extend(names);
        }
        if referenced.is_empty() && files.is_empty() {
            return Ok(all);
        }
        let mut result = Vec::new();
        for study in all {
            let has_sample = self
                .registry
                .samples(study.id)?
                .iter()
                .any(|s| referenced.iter().any(|r| names_resource(r, &study.name, &s.name)));
            let has_file = self
                .registry
                .files(study.id)?
                .iter()
                .any(|f| files.iter().any(|r| names_resource(r, &study.name, &f.name)));
            if has_sample || has_file {
                result.push(study);
            }
        }
        Ok(result)
    }

    fn include_samples(
        &self,
        query: &Query,
        fields: &BTreeSet<VariantField>,
        study: &StudyMetadata,
        filter_samples: &[String],
        pedigree_samples: &[(StudyMetadata, SampleMetadata)],
    ) -> Result<Vec<SampleMetadata>> {
        if !fields.contains(&VariantField::StudiesSamples) {
            return Ok(Vec::new());
        }
        let all = self.registry.samples(study.id)?;
        let select = |names: &[String]| -> Vec<SampleMetadata> {
            let mut selected = Vec::new();
            for name in names {
                if let Some(sample) = all
                    .iter()
                    .find(|s| names_resource(name, &study.name, &s.name))
                {
                    if !selected.contains(sample) {
                        selected.push(sample.clone());
                    }
                }
            }
            selected
        };
        let parents = || {
            pedigree_samples
                .iter()
                .filter(|(s, _)| s.id == study.id)
                .map(|(_, p)| p.clone())
        };

        let mut samples = match include_list(query, QueryParam::IncludeSample)? {
            IncludeList::All => all.clone(),
            IncludeList::Nothing => return Ok(Vec::new()),
            IncludeList::Names(names) => select(&names),
            IncludeList::Unset => {
                let from_filters = select(filter_samples);
                if !from_filters.is_empty() {
                    from_filters
                } else if let IncludeList::Names(files) = include_list(query, QueryParam::IncludeFile)? {
                    let files = self
                        .registry
                        .files(study.id)?
                        .into_iter()
                        .filter(|f| files.iter().any(|n| names_resource(n, &study.name, &f.name)))
                        .collect::<Vec<_>>();
                    all.iter()
                        .filter(|s| files.iter().any(|f| f.samples.contains(&s.id)))
                        .cloned()
                        .collect()
                } else if filter_samples.is_empty() {
                    all.clone()
                } else {
                    Vec::new()
                }
            }
        };
        for parent in parents() {
            if !samples.contains(&parent) {
                samples.push(parent);
            }
        }
        Ok(samples.into_iter().filter(|s| s.indexed).collect())
    }

    fn include_files(
        &self,
        query: &Query,
        fields: &BTreeSet<VariantField>,
        study: &StudyMetadata,
        samples: &[SampleMetadata],
    ) -> Result<Vec<FileMetadata>> {
        if !fields.contains(&VariantField::StudiesFiles) {
            return Ok(Vec::new());
        }
        let all = self.registry.files(study.id)?;
        let select = |names: &[String]| -> Vec<FileMetadata> {
            all.iter()
                .filter(|f| names.iter().any(|n| names_resource(n, &study.name, &f.name)))
                .cloned()
                .collect()
        };
        let files = match include_list(query, QueryParam::IncludeFile)? {
            IncludeList::All => all.clone(),
            IncludeList::Nothing => return Ok(Vec::new()),
            IncludeList::Names(names) => select(&names),
            IncludeList::Unset => {
                let mut names = Vec::new();
                if let Some(value) = query.get_string(QueryParam::File) {
                    names.extend(
                        utils::split_value(QueryParam::File, &value)?
                            .into_values()
                            .into_iter()
                            .filter(|f| !utils::is_negated(f)),
                    );
                }
                if query.is_valid(QueryParam::FileData) {
                    names.extend(multikv::parse_file_data(query)?.iter().map(|kv| kv.key.clone()));
                }
                if names.is_empty() {
                    all.iter()
                        .filter(|f| samples.iter().any(|s| f.samples.contains(&s.id)))
                        .cloned()
                        .collect()
                } else {
                    select(&names)
                }
            }
        };
        Ok(files.into_iter().filter(|f| f.indexed).collect())
    }

    /// Fail if a pedigree filter needs parents the caller excluded.
    fn check_pedigree_included(
        &self,
        query: &Query,
        projections: &IndexMap<String, StudyProjection>,
        pedigree_samples: &[(StudyMetadata, SampleMetadata)],
    ) -> Result<()> {
        if pedigree_samples.is_empty() {
            return Ok(());
        }
        let param = if query.is_valid(QueryParam::SampleMendelianError) {
            QueryParam::SampleMendelianError
        } else {
            QueryParam::SampleDeNovo
        };
        if let IncludeList::Nothing = include_list(query, QueryParam::IncludeSample)? {
            return Err(VariantQueryError::unsupported_combination(
                QueryParam::IncludeSample,
                query.get_str_or_empty(QueryParam::IncludeSample),
                param,
                query.get_str_or_empty(param),
            ));
        }
        if !query.is_valid(QueryParam::IncludeStudy) {
            return Ok(());
        }
        for (study, parent) in pedigree_samples {
            if !projections.contains_key(&study.name) {
                tracing::debug!(
                    "parent {:?} of study {:?} not included",
                    parent.name,
                    study.name
                );
                return Err(VariantQueryError::unsupported_combination(
                    QueryParam::IncludeStudy,
                    query.get_str_or_empty(QueryParam::IncludeStudy),
                    param,
                    query.get_str_or_empty(param),
                ));
            }
        }
        Ok(())
    }

    /// Page over the samples of all studies, in study order.
    fn paginate_samples(
        &self,
        query: &Query,
        projections: &mut IndexMap<String, StudyProjection>,
    ) -> Result<bool> {
        let limit = match query.get_int(QueryParam::SampleLimit)? {
            Some(limit) if limit < 0 => {
                return Err(VariantQueryError::malformed_param_with(
                    QueryParam::SampleLimit,
                    limit,
                    "Expected a non-negative number",
                ))
            }
            Some(limit) if limit > self.config.sample_limit_max => {
                return Err(VariantQueryError::limit_exceeded(
                    "sampleLimit",
                    limit,
                    self.config.sample_limit_max,
                ))
            }
            Some(limit) => limit as usize,
            None => self.config.sample_limit_default.max(0) as usize,
        };
        let mut skip = match query.get_int(QueryParam::SampleSkip)? {
            Some(skip) if skip < 0 => {
                return Err(VariantQueryError::malformed_param_with(
                    QueryParam::SampleSkip,
                    skip,
                    "Expected a non-negative number",
                ))
            }
            Some(skip) => skip as usize,
            None => 0,
        };

        let mut remaining = limit;
        let mut dropped = false;
        for projection in projections.values_mut() {
            let n = projection.samples.len();
            let skipped = skip.min(n);
            skip -= skipped;
            let kept = remaining.min(n - skipped);
            remaining -= kept;
            if skipped > 0 || kept < n - skipped {
                dropped = true;
            }
            projection.samples = projection
                .samples
                .drain(..)
                .skip(skipped)
                .take(kept)
                .collect();
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::metadata::memory::{InMemoryRegistry, SampleDefinition};
    use crate::query::schema::data::{SampleEntry, StudyEntry};
    use crate::test_utils;

    fn resolve(query: Query) -> Result<VariantQueryProjection> {
        let registry = test_utils::registry();
        let config = EngineConfig::default();
        ProjectionResolver::new(&registry, &config).resolve(&query, &QueryOptions::default())
    }

    #[test]
    fn plain_sample_projects_only_that_sample() -> Result<(), anyhow::Error> {
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::Genotype, "John:0/1,1/1")
            .with(QueryParam::Type, "SNV,INDEL");
        let projection = resolve(query)?;
        assert_eq!(projection.study_names(), vec!["S1"]);
        assert_eq!(projection.studies["S1"].sample_names(), vec!["John"]);
        assert_eq!(
            projection.studies["S1"]
                .files
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>(),
            vec!["f1"]
        );
        Ok(())
    }

    #[test]
    fn pedigree_filter_adds_parents() -> Result<(), anyhow::Error> {
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::SampleMendelianError, "John");
        let projection = resolve(query)?;
        assert_eq!(
            projection.studies["S1"].sample_names(),
            vec!["John", "Pete", "Mary"]
        );

        let explicit = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::SampleDeNovo, "John")
            .with(QueryParam::IncludeSample, "John");
        assert_eq!(
            resolve(explicit)?.studies["S1"].sample_names(),
            vec!["John", "Pete", "Mary"]
        );

        let excluded = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::SampleDeNovo, "John")
            .with(QueryParam::IncludeSample, "none");
        assert!(matches!(
            resolve(excluded),
            Err(VariantQueryError::UnsupportedCombination { .. })
        ));
        Ok(())
    }

    #[test]
    fn every_pedigree_study_must_be_included() -> Result<(), anyhow::Error> {
        let mut studies = test_utils::study_definitions();
        studies[1].samples.push(SampleDefinition {
            name: "Kid".into(),
            father: Some("Sam".into()),
            ..Default::default()
        });
        let registry = InMemoryRegistry::new(studies)?;
        let config = EngineConfig::default();
        let resolver = ProjectionResolver::new(&registry, &config);

        let options = QueryOptions::default();
        let both = Query::new().with(QueryParam::SampleMendelianError, "S1:John,S2:Kid");
        let included =
            resolver.resolve(&both.clone().with(QueryParam::IncludeStudy, "S1,S2"), &options)?;
        assert_eq!(included.studies["S2"].sample_names(), vec!["Kid", "Sam"]);
        assert!(matches!(
            resolver.resolve(&both.with(QueryParam::IncludeStudy, "S1"), &options),
            Err(VariantQueryError::UnsupportedCombination { .. })
        ));
        Ok(())
    }

    #[test]
    fn no_sample_filters_include_all_indexed() -> Result<(), anyhow::Error> {
        let projection = resolve(Query::new().with(QueryParam::Study, "S1"))?;
        assert_eq!(
            projection.studies["S1"].sample_names(),
            vec!["John", "Pete", "Mary", "Paul"]
        );
        assert!(!projection.sample_pagination);
        Ok(())
    }

    #[test]
    fn studies_narrowed_by_referenced_samples() -> Result<(), anyhow::Error> {
        let projection = resolve(Query::new().with(QueryParam::IncludeSample, "S2:Sam"))?;
        assert_eq!(projection.study_names(), vec!["S2"]);
        assert_eq!(projection.studies["S2"].sample_names(), vec!["Sam"]);
        Ok(())
    }

    #[test]
    fn sample_pagination_across_studies() -> Result<(), anyhow::Error> {
        let query = Query::new()
            .with(QueryParam::SampleSkip, 3i64)
            .with(QueryParam::SampleLimit, 2i64);
        let projection = resolve(query)?;
        assert!(projection.sample_pagination);
        assert_eq!(projection.num_total_samples, 5);
        assert_eq!(projection.num_samples, 2);
        assert_eq!(projection.studies["S1"].sample_names(), vec!["Paul"]);
        assert_eq!(projection.studies["S2"].sample_names(), vec!["Sam"]);
        Ok(())
    }

    #[test]
    fn sample_limit_exceeded() {
        let query = Query::new().with(QueryParam::SampleLimit, 100_000i64);
        assert!(matches!(
            resolve(query),
            Err(VariantQueryError::LimitExceeded { .. })
        ));
    }

    #[test]
    fn apply_strips_excluded() -> Result<(), anyhow::Error> {
        let projection = resolve(
            Query::new()
                .with(QueryParam::Study, "S1")
                .with(QueryParam::IncludeSample, "Pete,John"),
        )?;
        let mut variant = Variant::new("1", 100, "A", "T");
        let mut entry = StudyEntry {
            study_id: "S1".into(),
            ..Default::default()
        };
        for (name, gt) in [("John", "0/1"), ("Pete", "0/0"), ("Mary", "1/1")] {
            entry.samples.insert(name.into(), SampleEntry::with_gt(gt));
        }
        entry.scores.insert("cadd".into(), 21.0);
        variant.studies.push(entry);
        variant.studies.push(StudyEntry {
            study_id: "S2".into(),
            ..Default::default()
        });

        let variant = projection.apply(variant);
        assert_eq!(variant.studies.len(), 1);
        assert_eq!(
            variant.studies[0].samples.keys().collect::<Vec<_>>(),
            vec!["Pete", "John"]
        );
        assert_eq!(variant.studies[0].scores.len(), 1);
        Ok(())
    }
}
