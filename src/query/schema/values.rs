//! Typed values of the filter language.
//!
//! Raw query values are strings such as `"1:100-200,2"` or
//! `"John:DP>=10;GQ>20"`.  The parser turns them into the types defined here,
//! all of which render back to the textual form on `Display`.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use super::query::QueryParam;

/// Combinator between the values of one filter.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
pub enum QueryOperation {
    #[strum(serialize = "AND")]
    #[serde(rename = "AND")]
    And,
    #[strum(serialize = "OR")]
    #[serde(rename = "OR")]
    Or,
}

impl QueryOperation {
    /// Textual separator of the operation.
    pub fn separator(&self) -> char {
        match self {
            QueryOperation::And => ';',
            QueryOperation::Or => ',',
        }
    }

    pub fn from_separator(c: char) -> Option<Self> {
        match c {
            ';' => Some(QueryOperation::And),
            ',' => Some(QueryOperation::Or),
            _ => None,
        }
    }
}

/// Comparison operator of `key<op>value` tokens.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    serde_with::SerializeDisplay,
    serde_with::DeserializeFromStr,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
pub enum Comparator {
    #[default]
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "==")]
    EqEq,
    #[strum(to_string = "!=", serialize = "!")]
    Neq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    /// Less than, or value missing.
    #[strum(serialize = "<<")]
    LtOrMissing,
    #[strum(serialize = "<<=")]
    LeOrMissing,
    /// Greater than, or value missing.
    #[strum(serialize = ">>")]
    GtOrMissing,
    #[strum(serialize = ">>=")]
    GeOrMissing,
    #[strum(serialize = "~")]
    Regex,
    #[strum(serialize = "=~")]
    RegexCaseInsensitive,
    #[strum(serialize = "!~")]
    NotRegex,
    #[strum(serialize = "!=~")]
    NotRegexCaseInsensitive,
}

impl Comparator {
    /// Whether a missing value passes the comparison.
    pub fn accepts_missing(&self) -> bool {
        matches!(
            self,
            Comparator::LtOrMissing
                | Comparator::LeOrMissing
                | Comparator::GtOrMissing
                | Comparator::GeOrMissing
                | Comparator::Neq
                | Comparator::NotRegex
                | Comparator::NotRegexCaseInsensitive
        )
    }

    /// Whether the operator only makes sense on numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Comparator::Lt
                | Comparator::Le
                | Comparator::Gt
                | Comparator::Ge
                | Comparator::LtOrMissing
                | Comparator::LeOrMissing
                | Comparator::GtOrMissing
                | Comparator::GeOrMissing
        )
    }

    pub fn compare_numbers(&self, actual: f64, expected: f64) -> bool {
        match self {
            Comparator::Eq | Comparator::EqEq => actual == expected,
            Comparator::Neq => actual != expected,
            Comparator::Lt | Comparator::LtOrMissing => actual < expected,
            Comparator::Le | Comparator::LeOrMissing => actual <= expected,
            Comparator::Gt | Comparator::GtOrMissing => actual > expected,
            Comparator::Ge | Comparator::GeOrMissing => actual >= expected,
            Comparator::Regex
            | Comparator::RegexCaseInsensitive
            | Comparator::NotRegex
            | Comparator::NotRegexCaseInsensitive => {
                self.compare_strings(&actual.to_string(), &expected.to_string())
                    .unwrap_or(false)
            }
        }
    }

    fn compare_strings(&self, actual: &str, expected: &str) -> Result<bool, anyhow::Error> {
        let pattern = |case_insensitive: bool| {
            let pattern = if case_insensitive {
                format!("(?i){}", expected)
            } else {
                expected.to_string()
            };
            regex::Regex::new(&pattern)
                .map_err(|e| anyhow::anyhow!("invalid regular expression {:?}: {}", expected, e))
        };
        Ok(match self {
            Comparator::Regex => pattern(false)?.is_match(actual),
            Comparator::RegexCaseInsensitive => pattern(true)?.is_match(actual),
            Comparator::NotRegex => !pattern(false)?.is_match(actual),
            Comparator::NotRegexCaseInsensitive => !pattern(true)?.is_match(actual),
            Comparator::Neq => actual != expected,
            _ => actual == expected,
        })
    }

    /// Compare an (optional) actual value against the expected one.
    ///
    /// Numeric comparison is used when both sides parse as numbers.
    pub fn matches(&self, actual: Option<&str>, expected: &str) -> Result<bool, anyhow::Error> {
        let actual = match actual {
            Some(actual) if !actual.is_empty() && actual != "." => actual,
            _ => return Ok(self.accepts_missing()),
        };
        match (actual.parse::<f64>(), expected.parse::<f64>()) {
            (Ok(actual), Ok(expected)) => Ok(self.compare_numbers(actual, expected)),
            _ if self.is_numeric() => Ok(false),
            _ => self.compare_strings(actual, expected),
        }
    }
}

/// Textual description of a value for logs and events.
pub trait Describe {
    fn describe(&self) -> String;
}

impl Describe for String {
    fn describe(&self) -> String {
        self.clone()
    }
}

/// Ordered values plus the combinator between them.
///
/// A single value never carries an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Values<T> {
    operation: Option<QueryOperation>,
    values: Vec<T>,
}

impl<T> Default for Values<T> {
    fn default() -> Self {
        Self {
            operation: None,
            values: Vec::new(),
        }
    }
}

impl<T> Values<T> {
    pub fn new(operation: Option<QueryOperation>, values: Vec<T>) -> Self {
        let operation = if values.len() > 1 { operation } else { None };
        Self { operation, values }
    }

    pub fn single(value: T) -> Self {
        Self::new(None, vec![value])
    }

    pub fn operation(&self) -> Option<QueryOperation> {
        self.operation
    }

    /// Operation, falling back to `default` for degenerate lists.
    pub fn operation_or(&self, default: QueryOperation) -> QueryOperation {
        self.operation.unwrap_or(default)
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn map<U, F>(self, f: F) -> Values<U>
    where
        F: FnMut(T) -> U,
    {
        Values::new(self.operation, self.values.into_iter().map(f).collect())
    }

    pub fn try_map<U, E, F>(self, f: F) -> Result<Values<U>, E>
    where
        F: FnMut(T) -> Result<U, E>,
    {
        let values = self.values.into_iter().map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(Values::new(self.operation, values))
    }

    /// Evaluate `pred` for all values and combine with the operation.
    ///
    /// Degenerate lists combine with OR.
    pub fn test<E, F>(&self, mut pred: F) -> Result<bool, E>
    where
        F: FnMut(&T) -> Result<bool, E>,
    {
        match self.operation_or(QueryOperation::Or) {
            QueryOperation::And => {
                for value in &self.values {
                    if !pred(value)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            QueryOperation::Or => {
                for value in &self.values {
                    if pred(value)? {
                        return Ok(true);
                    }
                }
                Ok(self.values.is_empty())
            }
        }
    }
}

impl<T: Display> Values<T> {
    /// Render back to the textual query form.
    pub fn to_query(&self) -> String {
        let separator = self.operation_or(QueryOperation::Or).separator().to_string();
        self.values
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(&separator)
    }
}

impl Values<String> {
    /// Render like `to_query()`, quoting values that contain separators.
    pub fn to_quoted_query(&self) -> String {
        let separator = self.operation_or(QueryOperation::Or).separator().to_string();
        self.values
            .iter()
            .map(|v| {
                if v.contains([',', ';']) {
                    format!("\"{}\"", v)
                } else {
                    v.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(&separator)
    }
}

impl<T: Display> Display for Values<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query())
    }
}

impl<T: Describe> Describe for Values<T> {
    fn describe(&self) -> String {
        match self.operation {
            Some(op) if self.values.len() > 1 => format!(
                "( {} )",
                self.values
                    .iter()
                    .map(|v| v.describe())
                    .collect::<Vec<_>>()
                    .join(&format!(" {} ", op))
            ),
            _ => self
                .values
                .iter()
                .map(|v| v.describe())
                .collect::<Vec<_>>()
                .join(" OR "),
        }
    }
}

impl<T> IntoIterator for Values<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Values<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Operator and value, e.g. `>=0.5`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpValue<V> {
    pub op: Comparator,
    pub value: V,
}

impl<V: Display> Display for OpValue<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.value)
    }
}

impl<V: Display> Describe for OpValue<V> {
    fn describe(&self) -> String {
        format!("{} {}", self.op, self.value)
    }
}

/// Key, operator and value, e.g. `DP>=10`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyOpValue<K, V> {
    pub key: K,
    pub op: Comparator,
    pub value: V,
}

impl<K, V> KeyOpValue<K, V> {
    pub fn new(key: K, op: Comparator, value: V) -> Self {
        Self { key, op, value }
    }
}

impl<K: Display, V: Display> Display for KeyOpValue<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.key, self.op, self.value)
    }
}

impl<K: Display, V: Display> Describe for KeyOpValue<K, V> {
    fn describe(&self) -> String {
        format!("{} {} {}", self.key, self.op, self.value)
    }
}

/// A resource key plus the values of its composite filter.
///
/// E.g. `John:DP>=10;GT=0/1` has key `John` and two values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValues<K, V> {
    pub key: K,
    pub values: Values<V>,
}

impl<K, V> KeyValues<K, V> {
    pub fn new(key: K, values: Values<V>) -> Self {
        Self { key, values }
    }

    pub fn map_key<K2, F: FnOnce(K) -> K2>(self, f: F) -> KeyValues<K2, V> {
        KeyValues {
            key: f(self.key),
            values: self.values,
        }
    }
}

impl<K: Display, V: Display> Display for KeyValues<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.values.to_query())
    }
}

impl<K: Display, V: Describe> Describe for KeyValues<K, V> {
    fn describe(&self) -> String {
        format!("{} : {}", self.key, self.values.describe())
    }
}

/// Value with an individual negation marker (`!` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NegatableValue<T> {
    pub negated: bool,
    pub value: T,
}

impl NegatableValue<String> {
    /// Split off a leading `!`.
    pub fn parse(token: &str) -> Self {
        match token.strip_prefix('!') {
            Some(rest) => Self {
                negated: true,
                value: rest.to_string(),
            },
            None => Self {
                negated: false,
                value: token.to_string(),
            },
        }
    }
}

impl<T> NegatableValue<T> {
    pub fn new(negated: bool, value: T) -> Self {
        Self { negated, value }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> NegatableValue<U> {
        NegatableValue {
            negated: self.negated,
            value: f(self.value),
        }
    }
}

impl<T: Display> Display for NegatableValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!{}", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

impl<T: Display> Describe for NegatableValue<T> {
    fn describe(&self) -> String {
        if self.negated {
            format!("NOT {}", self.value)
        } else {
            self.value.to_string()
        }
    }
}

/// Registry identity of a study, sample, file or cohort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub id: u32,
    pub name: String,
}

impl ResourceId {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Describe for ResourceId {
    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// The resolved form of one query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuery<T> {
    pub param: QueryParam,
    pub values: Values<T>,
}

impl<T> ParsedQuery<T> {
    pub fn new(param: QueryParam, values: Values<T>) -> Self {
        Self { param, values }
    }

    pub fn empty(param: QueryParam) -> Self {
        Self::new(param, Values::default())
    }

    pub fn operation(&self) -> Option<QueryOperation> {
        self.values.operation()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }
}

impl<T: Display> Display for ParsedQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.values.to_query())
    }
}

impl<T: Describe> Describe for ParsedQuery<T> {
    fn describe(&self) -> String {
        format!("{} : {}", self.param, self.values.describe())
    }
}
