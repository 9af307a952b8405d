//! Query options and engine configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::err::{Result, VariantQueryError};

/// Which index must answer the query.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VariantQuerySource {
    /// Any executor may answer.
    #[default]
    VariantIndex,
    SecondaryAnnotationIndex,
    SecondarySampleIndex,
}

/// Whether the search index may be used.
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
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UseSearchIndex {
    #[default]
    Auto,
    Yes,
    No,
}

/// Options of one query.
#[serde_with::skip_serializing_none]
#[serde_with::serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[serde(rename_all = "camelCase", default)]
#[builder(default, setter(into))]
pub struct QueryOptions {
    /// Maximal number of variants to return.
    pub limit: Option<i64>,
    /// Number of variants to skip.
    pub skip: Option<i64>,
    /// Timeout in milliseconds.
    pub timeout: Option<i64>,
    /// Fields to include, comma-separated.
    #[serde_as(as = "Option<serde_with::StringWithSeparator::<serde_with::formats::CommaSeparator, String>>")]
    pub include: Option<Vec<String>>,
    /// Fields to exclude, comma-separated.
    #[serde_as(as = "Option<serde_with::StringWithSeparator::<serde_with::formats::CommaSeparator, String>>")]
    pub exclude: Option<Vec<String>>,
    /// Echo the per-study sample names in the result.
    pub sample_metadata: bool,
    /// Compute the number of matches.
    pub count: bool,
    /// Return variants in genomic order.
    pub sort: bool,
    pub approximate_count: bool,
    pub approximate_count_sampling_size: Option<usize>,
    pub source: VariantQuerySource,
    pub use_search_index: UseSearchIndex,
    /// Ignore genes that can not be resolved to regions.
    pub skip_missing_genes: bool,
    /// Facet request, e.g. `chromDensity[1]:100000`.
    pub facet: Option<String>,
}

/// Bounds and defaults of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_builder::Builder)]
#[serde(default)]
#[builder(default)]
pub struct EngineConfig {
    pub limit_default: i64,
    pub limit_max: i64,
    pub sample_limit_default: i64,
    pub sample_limit_max: i64,
    pub timeout_default_ms: i64,
    pub timeout_max_ms: i64,
    /// Default window width of `chromDensity` facets.
    pub density_default_step: u32,
    pub approximate_count_sampling_size: usize,
    /// Whether the search index is kept in sync and may be queried.
    pub search_index_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limit_default: 10,
            limit_max: 5000,
            sample_limit_default: 100,
            sample_limit_max: 1000,
            timeout_default_ms: 10_000,
            timeout_max_ms: 30_000,
            density_default_step: 1_000_000,
            approximate_count_sampling_size: 1000,
            search_index_enabled: true,
        }
    }
}

/// Projectable fields of a variant.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum VariantField {
    #[strum(serialize = "id")]
    Id,
    #[strum(serialize = "chromosome")]
    Chromosome,
    #[strum(serialize = "start")]
    Start,
    #[strum(serialize = "end")]
    End,
    #[strum(serialize = "reference")]
    Reference,
    #[strum(serialize = "alternate")]
    Alternate,
    #[strum(serialize = "type")]
    Type,
    #[strum(serialize = "annotation")]
    Annotation,
    #[strum(serialize = "studies")]
    Studies,
    #[strum(serialize = "studies.samples")]
    StudiesSamples,
    #[strum(serialize = "studies.files")]
    StudiesFiles,
    #[strum(serialize = "studies.stats")]
    StudiesStats,
    #[strum(serialize = "studies.scores")]
    StudiesScores,
}

impl VariantField {
    pub fn parent(&self) -> Option<VariantField> {
        match self {
            VariantField::StudiesSamples
            | VariantField::StudiesFiles
            | VariantField::StudiesStats
            | VariantField::StudiesScores => Some(VariantField::Studies),
            _ => None,
        }
    }

    pub fn children(&self) -> Vec<VariantField> {
        VariantField::iter()
            .filter(|f| f.parent() == Some(*self))
            .collect()
    }

    /// Fields always returned, whatever the include list says.
    pub fn is_mandatory(&self) -> bool {
        matches!(
            self,
            VariantField::Id
                | VariantField::Chromosome
                | VariantField::Start
                | VariantField::End
                | VariantField::Reference
                | VariantField::Alternate
                | VariantField::Type
        )
    }

    fn parse(param: &str, value: &str) -> Result<VariantField> {
        value.trim().parse().map_err(|_| {
            VariantQueryError::malformed_param_with(param, value, "Unknown variant field")
        })
    }

    /// Resolve the `include`/`exclude` options into the set of fields.
    pub fn from_options(options: &QueryOptions) -> Result<BTreeSet<VariantField>> {
        let mut fields = match options.include.as_ref().filter(|i| !i.is_empty()) {
            None => VariantField::iter().collect::<BTreeSet<_>>(),
            Some(include) => {
                let mut fields = VariantField::iter()
                    .filter(|f| f.is_mandatory())
                    .collect::<BTreeSet<_>>();
                for value in include {
                    let field = VariantField::parse("include", value)?;
                    fields.insert(field);
                    fields.extend(field.children());
                    if let Some(parent) = field.parent() {
                        fields.insert(parent);
                    }
                }
                fields
            }
        };
        if let Some(exclude) = options.exclude.as_ref() {
            for value in exclude {
                let field = VariantField::parse("exclude", value)?;
                if field.is_mandatory() {
                    continue;
                }
                fields.remove(&field);
                for child in field.children() {
                    fields.remove(&child);
                }
            }
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn query_options_from_json() -> Result<(), anyhow::Error> {
        let options: QueryOptions = serde_json::from_str(
            r#"{"limit": 20, "include": "annotation,studies.samples", "source": "secondary_sample_index"}"#,
        )?;
        assert_eq!(options.limit, Some(20));
        assert_eq!(
            options.include,
            Some(vec!["annotation".to_string(), "studies.samples".to_string()])
        );
        assert_eq!(options.source, VariantQuerySource::SecondarySampleIndex);
        assert!(!options.count);
        Ok(())
    }

    #[test]
    fn query_options_builder() -> Result<(), anyhow::Error> {
        let options = QueryOptionsBuilder::default()
            .limit(Some(5))
            .count(true)
            .build()?;
        assert_eq!(options.limit, Some(5));
        assert!(options.count);
        assert_eq!(options.timeout, None);
        Ok(())
    }

    #[test]
    fn engine_config_defaults_from_partial_json() -> Result<(), anyhow::Error> {
        let config: EngineConfig = serde_json::from_str(r#"{"limit_max": 100}"#)?;
        assert_eq!(config.limit_max, 100);
        assert_eq!(config.limit_default, 10);
        assert_eq!(config.density_default_step, 1_000_000);
        Ok(())
    }

    #[test]
    fn variant_fields_default_all() -> Result<(), anyhow::Error> {
        let fields = VariantField::from_options(&QueryOptions::default())?;
        assert_eq!(fields.len(), VariantField::iter().count());
        Ok(())
    }

    #[test]
    fn variant_fields_include_child_adds_parent() -> Result<(), anyhow::Error> {
        let options = QueryOptions {
            include: Some(vec!["studies.samples".into()]),
            ..Default::default()
        };
        let fields = VariantField::from_options(&options)?;
        assert!(fields.contains(&VariantField::Studies));
        assert!(fields.contains(&VariantField::StudiesSamples));
        assert!(!fields.contains(&VariantField::StudiesFiles));
        assert!(!fields.contains(&VariantField::Annotation));
        assert!(fields.contains(&VariantField::Chromosome));
        Ok(())
    }

    #[test]
    fn variant_fields_exclude_parent_removes_children() -> Result<(), anyhow::Error> {
        let options = QueryOptions {
            exclude: Some(vec!["studies".into(), "id".into()]),
            ..Default::default()
        };
        let fields = VariantField::from_options(&options)?;
        assert!(!fields.contains(&VariantField::StudiesStats));
        assert!(fields.contains(&VariantField::Annotation));
        assert!(fields.contains(&VariantField::Id));
        Ok(())
    }

    #[test]
    fn variant_fields_unknown() {
        let options = QueryOptions {
            include: Some(vec!["bogus".into()]),
            ..Default::default()
        };
        assert!(VariantField::from_options(&options).is_err());
    }
}
