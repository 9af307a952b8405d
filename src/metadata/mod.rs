//! Read-only view on the study/sample/file registry.

pub mod memory;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Status of a precomputation task.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    None,
    Running,
    Ready,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub id: u32,
    pub name: String,
    /// Genotypes present in the loaded data.
    pub loaded_genotypes: Vec<String>,
    /// Whether genotypes were dropped on load.
    pub exclude_genotypes: bool,
    /// Declared contigs and their lengths.
    pub contigs: IndexMap<String, u32>,
    /// Declared per-sample data keys, `GT` included.
    pub sample_data_keys: Vec<String>,
    /// Declared per-file data keys, `FILTER` and `QUAL` included.
    pub file_data_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleMetadata {
    pub id: u32,
    pub study_id: u32,
    pub name: String,
    pub father_id: Option<u32>,
    pub mother_id: Option<u32>,
    /// Files the sample is part of.
    pub files: Vec<u32>,
    /// Whether the sample was loaded into the variant index.
    pub indexed: bool,
    pub mendelian_error_status: TaskStatus,
    pub family_index_status: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: u32,
    pub study_id: u32,
    pub name: String,
    pub samples: Vec<u32>,
    pub indexed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CohortMetadata {
    pub id: u32,
    pub study_id: u32,
    pub name: String,
    pub samples: Vec<u32>,
    /// Whether statistics were computed for the cohort.
    pub calculated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantScoreMetadata {
    pub id: u32,
    pub study_id: u32,
    pub name: String,
}

/// Lookups the query layer needs from the registry.
///
/// Implementations own their locking; all methods take `&self`.
pub trait MetadataRegistry: Send + Sync {
    /// All studies, in registration order.
    fn studies(&self) -> Result<Vec<StudyMetadata>, anyhow::Error>;

    /// Samples of a study, in registration order.
    fn samples(&self, study_id: u32) -> Result<Vec<SampleMetadata>, anyhow::Error>;

    /// Files of a study, in registration order.
    fn files(&self, study_id: u32) -> Result<Vec<FileMetadata>, anyhow::Error>;

    fn cohorts(&self, study_id: u32) -> Result<Vec<CohortMetadata>, anyhow::Error>;

    fn variant_scores(&self, study_id: u32) -> Result<Vec<VariantScoreMetadata>, anyhow::Error>;

    fn study_names(&self) -> Result<Vec<String>, anyhow::Error> {
        Ok(self.studies()?.into_iter().map(|s| s.name).collect())
    }

    /// Study by name or by numeric id.
    fn study(&self, name: &str) -> Result<Option<StudyMetadata>, anyhow::Error> {
        let id = name.parse::<u32>().ok();
        Ok(self
            .studies()?
            .into_iter()
            .find(|s| s.name == name || Some(s.id) == id))
    }

    fn study_by_id(&self, study_id: u32) -> Result<Option<StudyMetadata>, anyhow::Error> {
        Ok(self.studies()?.into_iter().find(|s| s.id == study_id))
    }

    fn sample(&self, study_id: u32, name: &str) -> Result<Option<SampleMetadata>, anyhow::Error> {
        Ok(self.samples(study_id)?.into_iter().find(|s| s.name == name))
    }

    fn sample_by_id(
        &self,
        study_id: u32,
        sample_id: u32,
    ) -> Result<Option<SampleMetadata>, anyhow::Error> {
        Ok(self
            .samples(study_id)?
            .into_iter()
            .find(|s| s.id == sample_id))
    }

    fn file(&self, study_id: u32, name: &str) -> Result<Option<FileMetadata>, anyhow::Error> {
        Ok(self.files(study_id)?.into_iter().find(|f| f.name == name))
    }

    fn file_by_id(
        &self,
        study_id: u32,
        file_id: u32,
    ) -> Result<Option<FileMetadata>, anyhow::Error> {
        Ok(self.files(study_id)?.into_iter().find(|f| f.id == file_id))
    }

    fn cohort(&self, study_id: u32, name: &str) -> Result<Option<CohortMetadata>, anyhow::Error> {
        Ok(self.cohorts(study_id)?.into_iter().find(|c| c.name == name))
    }

    fn variant_score(
        &self,
        study_id: u32,
        name: &str,
    ) -> Result<Option<VariantScoreMetadata>, anyhow::Error> {
        Ok(self
            .variant_scores(study_id)?
            .into_iter()
            .find(|s| s.name == name))
    }

    /// Indexed samples of a study.
    fn indexed_samples(&self, study_id: u32) -> Result<Vec<SampleMetadata>, anyhow::Error> {
        Ok(self
            .samples(study_id)?
            .into_iter()
            .filter(|s| s.indexed)
            .collect())
    }

    /// Indexed files of a study.
    fn indexed_files(&self, study_id: u32) -> Result<Vec<FileMetadata>, anyhow::Error> {
        Ok(self
            .files(study_id)?
            .into_iter()
            .filter(|f| f.indexed)
            .collect())
    }
}
