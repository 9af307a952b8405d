//! The raw query: an ordered mapping from parameter to textual value.

use std::fmt::{self, Display};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::err::{Result, VariantQueryError};

/// Known query parameters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    serde_with::SerializeDisplay,
    serde_with::DeserializeFromStr,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "camelCase")]
pub enum QueryParam {
    /// Variant ids (`chr:pos:ref:alt`) and other identifiers.
    Id,
    /// Comma-separated regions `chr:start-end`.
    Region,
    Reference,
    Alternate,
    /// Variant types, e.g. `SNV,INDEL`.
    Type,
    /// Gene names.
    Gene,
    /// External cross-references.
    Xref,
    /// Consequence type SO terms or accessions.
    #[strum(serialize = "ct")]
    ConsequenceType,
    Biotype,
    /// Gene ontology terms.
    Go,
    /// Tissue expression terms.
    Expression,
    /// Protein substitution scores, e.g. `sift<0.2`.
    ProteinSubstitution,
    Sift,
    Polyphen,
    /// Gene set resolved from `go` and `expression`.
    GeneSet,
    /// Regions resolved from `gene`.
    GeneRegions,
    Study,
    File,
    /// Per-file filters, e.g. `file1:FILTER=PASS;QUAL>30`.
    FileData,
    Sample,
    /// Per-sample genotypes, e.g. `John:0/1,1/1;Mary:0/0`.
    Genotype,
    /// Per-sample data filters, e.g. `John:DP>=10`.
    SampleData,
    Cohort,
    Score,
    SampleMendelianError,
    SampleDeNovo,
    SampleCompoundHeterozygous,
    IncludeStudy,
    IncludeSample,
    IncludeFile,
    SampleLimit,
    SampleSkip,
    NumSamples,
    NumTotalSamples,
}

/// One raw query value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl QueryValue {
    pub fn is_empty(&self) -> bool {
        match self {
            QueryValue::Str(s) => s.is_empty(),
            QueryValue::List(l) => l.is_empty() || l.iter().all(|s| s.is_empty()),
            _ => false,
        }
    }
}

impl Display for QueryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryValue::Bool(b) => write!(f, "{}", b),
            QueryValue::Int(i) => write!(f, "{}", i),
            QueryValue::Float(x) => write!(f, "{}", x),
            QueryValue::Str(s) => write!(f, "{}", s),
            QueryValue::List(l) => write!(f, "{}", l.join(",")),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        QueryValue::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        QueryValue::Str(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(value: Vec<String>) -> Self {
        QueryValue::List(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        QueryValue::Int(value)
    }
}

impl From<usize> for QueryValue {
    fn from(value: usize) -> Self {
        QueryValue::Int(value as i64)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        QueryValue::Bool(value)
    }
}

/// Ordered mapping from parameter to raw value.
///
/// A `Query` is never mutated in place by the pipeline.  Each stage consumes
/// or clones it and returns the rewritten copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query {
    params: IndexMap<QueryParam, QueryValue>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy with `param` set to `value`.
    #[must_use]
    pub fn with(mut self, param: QueryParam, value: impl Into<QueryValue>) -> Self {
        self.params.insert(param, value.into());
        self
    }

    /// Return a copy without `param`.
    #[must_use]
    pub fn without(mut self, param: QueryParam) -> Self {
        self.params.shift_remove(&param);
        self
    }

    pub fn get(&self, param: QueryParam) -> Option<&QueryValue> {
        self.params.get(&param)
    }

    /// Whether `param` is present with a non-empty value.
    pub fn is_valid(&self, param: QueryParam) -> bool {
        self.params
            .get(&param)
            .map(|value| !value.is_empty())
            .unwrap_or(false)
    }

    /// Textual value of `param`, lists joined with `,`.
    pub fn get_string(&self, param: QueryParam) -> Option<String> {
        self.params
            .get(&param)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string())
    }

    /// Textual value of `param` or the empty string.
    pub fn get_str_or_empty(&self, param: QueryParam) -> String {
        self.get_string(param).unwrap_or_default()
    }

    pub fn get_int(&self, param: QueryParam) -> Result<Option<i64>> {
        match self.params.get(&param) {
            None => Ok(None),
            Some(QueryValue::Int(i)) => Ok(Some(*i)),
            Some(value) if value.is_empty() => Ok(None),
            Some(value) => value.to_string().trim().parse::<i64>().map(Some).map_err(|_| {
                VariantQueryError::malformed_param_with(param, value, "Expected an integer")
            }),
        }
    }

    pub fn get_bool(&self, param: QueryParam) -> bool {
        match self.params.get(&param) {
            Some(QueryValue::Bool(b)) => *b,
            Some(QueryValue::Str(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn params(&self) -> impl Iterator<Item = (&QueryParam, &QueryValue)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<(QueryParam, QueryValue)> for Query {
    fn from_iter<I: IntoIterator<Item = (QueryParam, QueryValue)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::{Query, QueryParam, QueryValue};

    #[rstest::rstest]
    #[case(QueryParam::ConsequenceType, "ct")]
    #[case(QueryParam::SampleData, "sampleData")]
    #[case(QueryParam::SampleCompoundHeterozygous, "sampleCompoundHeterozygous")]
    #[case(QueryParam::Id, "id")]
    fn query_param_names(#[case] param: QueryParam, #[case] name: &str) {
        assert_eq!(param.to_string(), name);
        assert_eq!(name.parse::<QueryParam>().ok(), Some(param));
    }

    #[test]
    fn query_from_json() -> Result<(), anyhow::Error> {
        let query: Query = serde_json::from_str(
            r#"{"study": "S1", "sample": "John", "type": ["SNV", "INDEL"], "sampleLimit": 10}"#,
        )?;
        assert_eq!(query.get_string(QueryParam::Study), Some("S1".to_string()));
        assert_eq!(
            query.get(QueryParam::Type),
            Some(&QueryValue::List(vec!["SNV".into(), "INDEL".into()]))
        );
        assert_eq!(query.get_string(QueryParam::Type), Some("SNV,INDEL".into()));
        assert_eq!(query.get_int(QueryParam::SampleLimit)?, Some(10));
        Ok(())
    }

    #[test]
    fn query_unknown_param_fails() {
        assert!(serde_json::from_str::<Query>(r#"{"bogus": "1"}"#).is_err());
    }

    #[test]
    fn query_copy_on_write() {
        let original = Query::new().with(QueryParam::Study, "S1");
        let rewritten = original.clone().with(QueryParam::Sample, "John");
        assert!(!original.is_valid(QueryParam::Sample));
        assert!(rewritten.is_valid(QueryParam::Sample));
        assert!(!rewritten.clone().without(QueryParam::Sample).is_valid(QueryParam::Sample));
    }

    #[test]
    fn query_is_valid_ignores_empty() {
        let query = Query::new()
            .with(QueryParam::Gene, "")
            .with(QueryParam::Type, Vec::<String>::new());
        assert!(!query.is_valid(QueryParam::Gene));
        assert!(!query.is_valid(QueryParam::Type));
        assert_eq!(query.get_string(QueryParam::Gene), None);
    }
}
