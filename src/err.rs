//! Error type of the variant query layer.

use itertools::Itertools;

/// Alias for results with `VariantQueryError`.
pub type Result<T, E = VariantQueryError> = std::result::Result<T, E>;

/// Errors raised while parsing, normalizing or executing a variant query.
#[derive(thiserror::Error, Debug)]
pub enum VariantQueryError {
    /// Grammar violation in one query parameter.
    #[error("Malformed query param \"{param}\" with value {value:?}{}", fmt_detail(.detail))]
    MalformedParam {
        param: String,
        value: String,
        detail: Option<String>,
    },
    /// AND and OR used at the same level of one parameter.
    #[error("Unable to mix AND (;) and OR (,) in query param \"{param}\" with value {value:?}")]
    MixedAndOr { param: String, value: String },
    /// Two parameters that must share their combinator use different ones.
    #[error("Unable to mix AND (;) and OR (,) across query params \"{param1}\" and \"{param2}\"")]
    MixedAndOrParams { param1: String, param2: String },
    /// Two parameters that can not be used together.
    #[error("Unsupported combination of params \"{param1}\"={value1:?} and \"{param2}\"={value2:?}")]
    UnsupportedCombination {
        param1: String,
        value1: String,
        param2: String,
        value2: String,
    },
    /// A sample or file scoped filter without a resolvable study.
    #[error(
        "Unknown study for {kind} [{}]. Specify the study with \"study\". Available studies: [{}]",
        .names.iter().join(", "),
        .available.iter().join(", ")
    )]
    MissingStudy {
        kind: String,
        names: Vec<String>,
        available: Vec<String>,
    },
    /// Named resource absent from the registry.
    #[error("{kind} {name:?} not found{}", fmt_study(.study))]
    NotFound {
        kind: String,
        name: String,
        study: Option<String>,
    },
    /// Requested value above the configured maximum.
    #[error("Requested {what} {value} exceeds the maximum of {max}")]
    LimitExceeded { what: String, value: i64, max: i64 },
    /// Wraps a collaborator failure.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn fmt_detail(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

fn fmt_study(study: &Option<String>) -> String {
    match study {
        Some(study) => format!(" in study {:?}", study),
        None => String::new(),
    }
}

impl VariantQueryError {
    pub fn malformed_param(param: impl ToString, value: impl ToString) -> Self {
        Self::MalformedParam {
            param: param.to_string(),
            value: value.to_string(),
            detail: None,
        }
    }

    pub fn malformed_param_with(
        param: impl ToString,
        value: impl ToString,
        detail: impl ToString,
    ) -> Self {
        Self::MalformedParam {
            param: param.to_string(),
            value: value.to_string(),
            detail: Some(detail.to_string()),
        }
    }

    pub fn mixed_and_or(param: impl ToString, value: impl ToString) -> Self {
        Self::MixedAndOr {
            param: param.to_string(),
            value: value.to_string(),
        }
    }

    pub fn mixed_and_or_params(param1: impl ToString, param2: impl ToString) -> Self {
        Self::MixedAndOrParams {
            param1: param1.to_string(),
            param2: param2.to_string(),
        }
    }

    pub fn unsupported_combination(
        param1: impl ToString,
        value1: impl ToString,
        param2: impl ToString,
        value2: impl ToString,
    ) -> Self {
        Self::UnsupportedCombination {
            param1: param1.to_string(),
            value1: value1.to_string(),
            param2: param2.to_string(),
            value2: value2.to_string(),
        }
    }

    pub fn missing_study_for<N: ToString, A: ToString>(
        kind: &str,
        names: impl IntoIterator<Item = N>,
        available: impl IntoIterator<Item = A>,
    ) -> Self {
        Self::MissingStudy {
            kind: kind.to_string(),
            names: names.into_iter().map(|s| s.to_string()).collect(),
            available: available.into_iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn not_found(kind: &str, name: impl ToString, study: Option<&str>) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            study: study.map(|s| s.to_string()),
        }
    }

    pub fn study_not_found(name: impl ToString) -> Self {
        Self::not_found("Study", name, None)
    }

    pub fn sample_not_found(name: impl ToString, study: &str) -> Self {
        Self::not_found("Sample", name, Some(study))
    }

    pub fn file_not_found(name: impl ToString, study: &str) -> Self {
        Self::not_found("File", name, Some(study))
    }

    pub fn cohort_not_found(name: impl ToString, study: &str) -> Self {
        Self::not_found("Cohort", name, Some(study))
    }

    pub fn score_not_found(name: impl ToString, study: &str) -> Self {
        Self::not_found("Variant score", name, Some(study))
    }

    pub fn gene_not_found(name: impl ToString) -> Self {
        Self::not_found("Gene", name, None)
    }

    pub fn limit_exceeded(what: &str, value: i64, max: i64) -> Self {
        Self::LimitExceeded {
            what: what.to_string(),
            value,
            max,
        }
    }
}
