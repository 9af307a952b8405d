//! Registry held in memory, loadable from JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    CohortMetadata, FileMetadata, MetadataRegistry, SampleMetadata, StudyMetadata, TaskStatus,
    VariantScoreMetadata,
};

/// Sample as declared in a dataset file; parents are given by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleDefinition {
    pub name: String,
    pub father: Option<String>,
    pub mother: Option<String>,
    pub indexed: Option<bool>,
    pub mendelian_error_status: TaskStatus,
    pub family_index_status: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDefinition {
    pub name: String,
    /// Names of the samples in the file.
    pub samples: Vec<String>,
    pub indexed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortDefinition {
    pub name: String,
    pub samples: Vec<String>,
    pub calculated: bool,
}

/// Study with all of its resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyDefinition {
    pub name: String,
    /// Defaults to the standard genotype list when empty.
    pub loaded_genotypes: Vec<String>,
    pub exclude_genotypes: bool,
    pub contigs: IndexMap<String, u32>,
    pub sample_data_keys: Vec<String>,
    pub file_data_keys: Vec<String>,
    pub samples: Vec<SampleDefinition>,
    pub files: Vec<FileDefinition>,
    pub cohorts: Vec<CohortDefinition>,
    pub scores: Vec<String>,
}

struct StudyRecord {
    study: StudyMetadata,
    samples: Vec<SampleMetadata>,
    files: Vec<FileMetadata>,
    cohorts: Vec<CohortMetadata>,
    scores: Vec<VariantScoreMetadata>,
}

/// Registry over a fixed set of studies.
///
/// Ids are assigned in declaration order, starting at 1 within each kind.
#[derive(Default)]
pub struct InMemoryRegistry {
    records: Vec<StudyRecord>,
}

impl InMemoryRegistry {
    pub fn new(definitions: Vec<StudyDefinition>) -> Result<Self, anyhow::Error> {
        let mut records = Vec::with_capacity(definitions.len());
        for (i, def) in definitions.into_iter().enumerate() {
            records.push(Self::build_record(i as u32 + 1, def)?);
        }
        Ok(Self { records })
    }

    pub fn from_json_str(json: &str) -> Result<Self, anyhow::Error> {
        let definitions: Vec<StudyDefinition> = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("could not parse study definitions: {}", e))?;
        Self::new(definitions)
    }

    fn build_record(study_id: u32, def: StudyDefinition) -> Result<StudyRecord, anyhow::Error> {
        let sample_id = |name: &str| -> Result<u32, anyhow::Error> {
            def.samples
                .iter()
                .position(|s| s.name == name)
                .map(|i| i as u32 + 1)
                .ok_or_else(|| {
                    anyhow::anyhow!("unknown sample {:?} in study {:?}", name, def.name)
                })
        };

        let mut files = Vec::with_capacity(def.files.len());
        for (i, file) in def.files.iter().enumerate() {
            files.push(FileMetadata {
                id: i as u32 + 1,
                study_id,
                name: file.name.clone(),
                samples: file
                    .samples
                    .iter()
                    .map(|s| sample_id(s))
                    .collect::<Result<Vec<_>, _>>()?,
                indexed: file.indexed.unwrap_or(true),
            });
        }

        let mut samples = Vec::with_capacity(def.samples.len());
        for (i, sample) in def.samples.iter().enumerate() {
            let id = i as u32 + 1;
            samples.push(SampleMetadata {
                id,
                study_id,
                name: sample.name.clone(),
                father_id: sample.father.as_deref().map(sample_id).transpose()?,
                mother_id: sample.mother.as_deref().map(sample_id).transpose()?,
                files: files
                    .iter()
                    .filter(|f| f.samples.contains(&id))
                    .map(|f| f.id)
                    .collect(),
                indexed: sample.indexed.unwrap_or(true),
                mendelian_error_status: sample.mendelian_error_status,
                family_index_status: sample.family_index_status,
            });
        }

        let mut cohorts = Vec::with_capacity(def.cohorts.len());
        for (i, cohort) in def.cohorts.iter().enumerate() {
            cohorts.push(CohortMetadata {
                id: i as u32 + 1,
                study_id,
                name: cohort.name.clone(),
                samples: cohort
                    .samples
                    .iter()
                    .map(|s| sample_id(s))
                    .collect::<Result<Vec<_>, _>>()?,
                calculated: cohort.calculated,
            });
        }

        let scores = def
            .scores
            .iter()
            .enumerate()
            .map(|(i, name)| VariantScoreMetadata {
                id: i as u32 + 1,
                study_id,
                name: name.clone(),
            })
            .collect();

        let loaded_genotypes = if def.loaded_genotypes.is_empty() {
            crate::query::genotypes::default_loaded_genotypes()
        } else {
            def.loaded_genotypes
        };

        Ok(StudyRecord {
            study: StudyMetadata {
                id: study_id,
                name: def.name,
                loaded_genotypes,
                exclude_genotypes: def.exclude_genotypes,
                contigs: def.contigs,
                sample_data_keys: def.sample_data_keys,
                file_data_keys: def.file_data_keys,
            },
            samples,
            files,
            cohorts,
            scores,
        })
    }

    fn record(&self, study_id: u32) -> Result<&StudyRecord, anyhow::Error> {
        self.records
            .iter()
            .find(|r| r.study.id == study_id)
            .ok_or_else(|| anyhow::anyhow!("unknown study id {}", study_id))
    }
}

impl MetadataRegistry for InMemoryRegistry {
    fn studies(&self) -> Result<Vec<StudyMetadata>, anyhow::Error> {
        Ok(self.records.iter().map(|r| r.study.clone()).collect())
    }

    fn samples(&self, study_id: u32) -> Result<Vec<SampleMetadata>, anyhow::Error> {
        Ok(self.record(study_id)?.samples.clone())
    }

    fn files(&self, study_id: u32) -> Result<Vec<FileMetadata>, anyhow::Error> {
        Ok(self.record(study_id)?.files.clone())
    }

    fn cohorts(&self, study_id: u32) -> Result<Vec<CohortMetadata>, anyhow::Error> {
        Ok(self.record(study_id)?.cohorts.clone())
    }

    fn variant_scores(&self, study_id: u32) -> Result<Vec<VariantScoreMetadata>, anyhow::Error> {
        Ok(self.record(study_id)?.scores.clone())
    }
}
