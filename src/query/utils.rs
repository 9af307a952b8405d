//! Parsing of the filter-expression language.
//!
//! A filter value is a list of tokens separated either by `,` (OR) or by `;`
//! (AND).  Double quotes make separators inside a token opaque.  Tokens are
//! either bare values, optionally negated with a leading `!`, or
//! `key<op>value` triples.

use std::sync::OnceLock;

use regex::Regex;

use crate::err::{Result, VariantQueryError};

use super::schema::{
    data::VariantCoordinate, Comparator, KeyOpValue, NegatableValue, OpValue, QueryOperation,
    QueryParam, Values,
};

/// Separator for OR.
pub const OR: char = ',';
/// Separator for AND.
pub const AND: char = ';';
/// Separator between a resource and its filter.
pub const IS: char = ':';
/// Negation prefix.
pub const NOT: char = '!';
pub const QUOTE: char = '"';

/// Sentinel for "include nothing".
pub const NONE: &str = "none";
/// Sentinel for "include everything".
pub const ALL: &str = "all";

fn operation_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^=<>~!]*)(<?<=?|>>?=?|!=?|!?=?~|==?)([^=<>~!]+.*)$")
            .expect("cannot happen: invalid operation regex")
    })
}

/// Determine the combinator of `value` with one pass over the string.
///
/// Separators inside double quotes are ignored.  Returns `None` when no
/// separator is found.
pub fn check_operator(param: QueryParam, value: &str) -> Result<Option<QueryOperation>> {
    let mut in_quotes = false;
    let mut has_and = false;
    let mut has_or = false;
    for c in value.chars() {
        match c {
            QUOTE => in_quotes = !in_quotes,
            AND if !in_quotes => has_and = true,
            OR if !in_quotes => has_or = true,
            _ => (),
        }
    }
    match (has_and, has_or) {
        (true, true) => Err(VariantQueryError::mixed_and_or(param, value)),
        (true, false) => Ok(Some(QueryOperation::And)),
        (false, true) => Ok(Some(QueryOperation::Or)),
        (false, false) => Ok(None),
    }
}

/// Split `value` on `separator` outside of quotes, dropping the quotes.
fn split_quotes(param: QueryParam, value: &str, separator: Option<char>) -> Result<Vec<String>> {
    let mut result = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in value.chars() {
        if c == QUOTE {
            in_quotes = !in_quotes;
        } else if Some(c) == separator && !in_quotes {
            result.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    if in_quotes {
        return Err(VariantQueryError::malformed_param_with(
            param,
            value,
            "Malformed value. Unbalanced quotes",
        ));
    }
    result.push(current);
    Ok(result)
}

/// Split a filter value into its tokens.
pub fn split_value(param: QueryParam, value: &str) -> Result<Values<String>> {
    let operation = check_operator(param, value)?;
    let tokens = split_quotes(param, value, operation.map(|op| op.separator()))?;
    Ok(Values::new(operation, tokens))
}

/// Split a filter value whose tokens may be negated.
///
/// Negated and plain tokens can not be mixed.
pub fn split_negatable_value(
    param: QueryParam,
    value: &str,
) -> Result<Values<NegatableValue<String>>> {
    let values = split_value(param, value)?.map(|token| NegatableValue::parse(&token));
    check_negation_uniform(param, value, &values)?;
    Ok(values)
}

/// Fail if some but not all values are negated.
pub fn check_negation_uniform<T>(
    param: QueryParam,
    value: &str,
    values: &Values<NegatableValue<T>>,
) -> Result<()> {
    let negated = values.iter().filter(|v| v.negated).count();
    if negated > 0 && negated < values.len() {
        Err(VariantQueryError::malformed_param_with(
            param,
            value,
            "Can not mix negated and non-negated values",
        ))
    } else {
        Ok(())
    }
}

pub fn is_negated(value: &str) -> bool {
    value.starts_with(NOT)
}

pub fn remove_negation(value: &str) -> &str {
    value.strip_prefix(NOT).unwrap_or(value)
}

/// Split `key<op>value`; bare values have no key and operator `=`.
pub fn parse_key_op_value(token: &str) -> KeyOpValue<Option<String>, String> {
    match operation_regex().captures(token) {
        Some(caps) => {
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let op = caps
                .get(2)
                .and_then(|m| m.as_str().parse::<Comparator>().ok())
                .unwrap_or_default();
            let value = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            KeyOpValue::new(
                if key.is_empty() {
                    None
                } else {
                    Some(key.to_string())
                },
                op,
                value.to_string(),
            )
        }
        None => KeyOpValue::new(None, Comparator::Eq, token.to_string()),
    }
}

/// Parse `<op>value`, rejecting tokens with a key.
pub fn parse_op_value(param: QueryParam, token: &str) -> Result<OpValue<String>> {
    let kov = parse_key_op_value(token);
    match kov.key {
        Some(key) => Err(VariantQueryError::malformed_param_with(
            param,
            token,
            format!("Unexpected key {:?}", key),
        )),
        None => Ok(OpValue {
            op: kov.op,
            value: kov.value,
        }),
    }
}

/// Whether `value` has the shape of a variant id `chr:pos:ref:alt`.
///
/// Symbolic and breakend alternates may contain further colons.
pub fn is_variant_id(value: &str) -> bool {
    let colons = value.matches(IS).count();
    (colons == 3 || (colons > 3 && value.contains(['<', '[', ']'])))
        && VariantCoordinate::parse(value).is_some()
}

pub fn is_variant_accession(value: &str) -> bool {
    value.starts_with("rs") || value.starts_with("VAR_")
}

pub fn is_clinical_accession(value: &str) -> bool {
    ["RCV", "SCV", "VCV", "COSM", "COSV"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

pub fn is_gene_accession(value: &str) -> bool {
    ["HP:", "OMIM:", "umls:"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
}

/// Split `study:resource` into its parts.
pub fn split_study_resource(value: &str) -> (Option<&str>, &str) {
    match value.split_once(IS) {
        Some((study, resource)) if !study.is_empty() && !resource.is_empty() => {
            (Some(study), resource)
        }
        _ => (None, value),
    }
}

pub fn is_none_value(value: &str) -> bool {
    value == NONE
}

pub fn is_all_value(value: &str) -> bool {
    value == ALL
}
