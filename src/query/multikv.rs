//! Parsing of composite per-resource filters.
//!
//! The `genotype`, `sampleData` and `fileData` parameters share the shape
//! `resource:filters;resource2:filters` where the resource is a sample or a
//! file.  All three go through `parse_multi_key_value_filter()` so that their
//! combinator and error semantics are identical.

use indexmap::IndexMap;

use crate::err::{Result, VariantQueryError};

use super::schema::{
    Comparator, KeyOpValue, KeyValues, NegatableValue, ParsedQuery, Query, QueryOperation,
    QueryParam, Values,
};
use super::utils::{self, AND, IS, NONE, OR};

/// Separators of `key<op>value` filters, in lookup order.
const COMPARATORS: &[&str] = &["<=", ">=", "!=", "=", ">", "<"];

/// One `key`/`separator`/`value` triple of the tokenizer.
struct Entry {
    key: String,
    separator: String,
    value: String,
}

/// Tokenize on `,`/`;` and group the tokens by resource key.
///
/// A token containing one of `separators` opens a new key, flushing the
/// previous one.  Plain tokens are appended to the open key.  Repeated keys
/// are merged, joined by the combinator.
fn parse_multi_key_value(
    param: QueryParam,
    value: &str,
    separators: &[&str],
) -> Result<(Option<QueryOperation>, Vec<Entry>)> {
    let mut entries: IndexMap<String, Entry> = IndexMap::new();
    let mut current: Option<Entry> = None;
    let mut pending_op: Option<char> = None;
    let mut logic_op: Option<QueryOperation> = None;

    let flush = |entries: &mut IndexMap<String, Entry>,
                 entry: Entry,
                 logic_op: Option<QueryOperation>| {
        let key = entry.key.trim().to_string();
        let entry = Entry {
            key: key.clone(),
            separator: entry.separator.trim().to_string(),
            value: entry.value.trim().to_string(),
        };
        match entries.get_mut(&key) {
            Some(existing) => {
                let separator = logic_op.unwrap_or(QueryOperation::Or).separator();
                existing.value = format!("{}{}{}", existing.value, separator, entry.value);
            }
            None => {
                entries.insert(key, entry);
            }
        }
    };

    for token in tokenize(value) {
        if token == ";" || token == "," {
            pending_op = token.chars().next();
            continue;
        }
        if let Some(separator) = separators.iter().find(|s| token.contains(**s)) {
            if let Some(previous) = current.take() {
                let op = pending_op.and_then(QueryOperation::from_separator);
                match (logic_op, op) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(VariantQueryError::mixed_and_or(param, value));
                    }
                    (_, Some(b)) => logic_op = Some(b),
                    _ => (),
                }
                flush(&mut entries, previous, logic_op);
            }
            let idx = token
                .rfind(*separator)
                .expect("cannot happen: separator was found in token");
            current = Some(Entry {
                key: token[..idx].to_string(),
                separator: separator.to_string(),
                value: token[idx + separator.len()..].to_string(),
            });
        } else {
            match current.as_mut() {
                Some(entry) => {
                    if let Some(op) = pending_op {
                        entry.value.push(op);
                    }
                    entry.value.push_str(token);
                }
                None => return Err(VariantQueryError::malformed_param(param, value)),
            }
        }
    }
    if let Some(previous) = current.take() {
        flush(&mut entries, previous, logic_op);
    }
    if entries.len() <= 1 {
        logic_op = None;
    }
    Ok((logic_op, entries.into_values().collect()))
}

/// Split keeping the `,` and `;` delimiters as tokens of their own.
fn tokenize(value: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    for (i, c) in value.char_indices() {
        if c == AND || c == OR {
            if start < i {
                result.push(&value[start..i]);
            }
            result.push(&value[i..i + 1]);
            start = i + 1;
        }
    }
    if start < value.len() {
        result.push(&value[start..]);
    }
    result
}

/// Parse `resource:body` groups into resource and raw body.
pub fn parse_multi_key_value_filter(
    param: QueryParam,
    value: &str,
) -> Result<Values<(String, String)>> {
    let is = IS.to_string();
    let (op, entries) = parse_multi_key_value(param, value, &[is.as_str()])?;
    Ok(Values::new(
        op,
        entries.into_iter().map(|e| (e.key, e.value)).collect(),
    ))
}

/// Parse `key<op>value` groups, e.g. `DP>=10;GQ>20`.
pub fn parse_multi_key_value_filter_comparators(
    param: QueryParam,
    value: &str,
) -> Result<Values<KeyOpValue<String, String>>> {
    let (op, entries) = parse_multi_key_value(param, value, COMPARATORS)?;
    let values = entries
        .into_iter()
        .map(|e| {
            let comparator = e.separator.parse::<Comparator>().map_err(|_| {
                VariantQueryError::malformed_param_with(param, value, "Unknown operator")
            })?;
            Ok(KeyOpValue::new(e.key, comparator, e.value))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Values::new(op, values))
}

/// Parse a genotype filter `sample:gt1,gt2;sample2:gt3`.
///
/// Genotypes of one sample are an OR list and must be all negated or all
/// plain.
pub fn parse_genotype_filter(
    value: &str,
) -> Result<ParsedQuery<KeyValues<String, NegatableValue<String>>>> {
    let entries = parse_multi_key_value_filter(QueryParam::Genotype, value)?;
    let op = entries.operation();
    let samples = entries
        .into_iter()
        .map(|(sample, gts)| {
            let gts = Values::new(
                Some(QueryOperation::Or),
                gts.split(OR).map(NegatableValue::parse).collect::<Vec<_>>(),
            );
            utils::check_negation_uniform(QueryParam::Genotype, value, &gts)?;
            Ok(KeyValues::new(sample, gts))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(ParsedQuery::new(
        QueryParam::Genotype,
        Values::new(op, samples),
    ))
}

/// Samples named by `sample`, `genotype` or `includeSample`, in that order,
/// plus their combinator.
fn samples_for_sample_data(query: &Query) -> Result<(Option<QueryOperation>, Vec<String>)> {
    if let Some(sample) = query.get_string(QueryParam::Sample) {
        let (op, samples) = if sample.contains(IS) {
            let parsed = parse_genotype_filter(&sample)?;
            (
                parsed.operation(),
                parsed.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>(),
            )
        } else {
            let values = utils::split_value(QueryParam::Sample, &sample)?;
            (values.operation(), values.into_values())
        };
        let samples = samples
            .into_iter()
            .filter(|s| !utils::is_negated(s))
            .collect::<Vec<_>>();
        if !samples.is_empty() {
            return Ok((op, samples));
        }
    }
    if let Some(genotype) = query.get_string(QueryParam::Genotype) {
        let parsed = parse_genotype_filter(&genotype)?;
        let samples = parsed.iter().map(|kv| kv.key.clone()).collect::<Vec<_>>();
        if !samples.is_empty() {
            return Ok((parsed.operation(), samples));
        }
    }
    if let Some(include) = query.get_string(QueryParam::IncludeSample) {
        let samples = utils::split_value(QueryParam::IncludeSample, &include)?
            .into_values()
            .into_iter()
            .filter(|s| !utils::is_none_value(s) && !utils::is_all_value(s))
            .collect::<Vec<_>>();
        return Ok((Some(QueryOperation::Or), samples));
    }
    Ok((None, Vec::new()))
}

/// Parse `sampleData`.
///
/// Without `:` the filter applies to the samples of `sample`, `genotype` or
/// `includeSample`.
pub fn parse_sample_data(
    query: &Query,
) -> Result<ParsedQuery<KeyValues<String, KeyOpValue<String, String>>>> {
    let value = match query.get_string(QueryParam::SampleData) {
        Some(value) => value,
        None => return Ok(ParsedQuery::empty(QueryParam::SampleData)),
    };
    if value.contains(IS) {
        let groups = parse_multi_key_value_filter(QueryParam::SampleData, &value)?;
        let op = groups.operation();
        let samples = groups
            .into_iter()
            .map(|(sample, body)| {
                Ok(KeyValues::new(
                    sample,
                    parse_multi_key_value_filter_comparators(QueryParam::SampleData, &body)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ParsedQuery::new(QueryParam::SampleData, Values::new(op, samples)))
    } else {
        let mut operator = utils::check_operator(QueryParam::SampleData, &value)?;
        let (samples_op, samples) = samples_for_sample_data(query)?;
        if samples.is_empty() {
            return Err(VariantQueryError::malformed_param_with(
                QueryParam::SampleData,
                &value,
                "Missing \"sample\" or \"genotype\" param",
            ));
        }
        if operator.is_none() && samples.len() > 1 {
            operator = samples_op;
        }
        let filters = parse_multi_key_value_filter_comparators(QueryParam::SampleData, &value)?;
        let samples = samples
            .into_iter()
            .map(|sample| KeyValues::new(sample, filters.clone()))
            .collect::<Vec<_>>();
        Ok(ParsedQuery::new(
            QueryParam::SampleData,
            Values::new(operator, samples),
        ))
    }
}

/// Parse `fileData`.
///
/// Without `:` the filter applies to the non-negated files of `file`, or of
/// `includeFile`.
pub fn parse_file_data(
    query: &Query,
) -> Result<ParsedQuery<KeyValues<String, KeyOpValue<String, String>>>> {
    let value = match query.get_string(QueryParam::FileData) {
        Some(value) => value,
        None => return Ok(ParsedQuery::empty(QueryParam::FileData)),
    };
    if value.contains(IS) {
        let groups = parse_multi_key_value_filter(QueryParam::FileData, &value)?;
        let op = groups.operation();
        let files = groups
            .into_iter()
            .map(|(file, body)| {
                Ok(KeyValues::new(
                    file,
                    parse_multi_key_value_filter_comparators(QueryParam::FileData, &body)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ParsedQuery::new(QueryParam::FileData, Values::new(op, files)))
    } else {
        let split_files = |param: QueryParam| -> Result<Values<String>> {
            match query.get_string(param) {
                Some(files) => {
                    let values = utils::split_value(param, &files)?;
                    let op = values.operation();
                    Ok(Values::new(
                        op,
                        values
                            .into_values()
                            .into_iter()
                            .filter(|f| !utils::is_negated(f) && f != NONE)
                            .collect(),
                    ))
                }
                None => Ok(Values::default()),
            }
        };
        let mut files = split_files(QueryParam::File)?;
        if files.is_empty() {
            files = split_files(QueryParam::IncludeFile)?;
        }
        if files.is_empty() {
            return Err(VariantQueryError::malformed_param_with(
                QueryParam::FileData,
                &value,
                "Missing \"file\" param",
            ));
        }
        let filters = parse_multi_key_value_filter_comparators(QueryParam::FileData, &value)?;
        let op = files.operation();
        let files = files
            .into_values()
            .into_iter()
            .map(|file| KeyValues::new(file, filters.clone()))
            .collect::<Vec<_>>();
        Ok(ParsedQuery::new(QueryParam::FileData, Values::new(op, files)))
    }
}

/// Move `GT` entries of `sampleData` into `genotype`.
///
/// Fails when `sample` or `genotype` is also given, or when `GT` is joined to
/// other keys with OR.
pub fn extract_genotype_from_sample_data(query: Query) -> Result<Query> {
    let parsed = parse_sample_data(&query)?;
    let has_gt = parsed
        .iter()
        .any(|kv| kv.values.iter().any(|f| f.key == "GT"));
    if !has_gt {
        return Ok(query);
    }
    let raw = query.get_str_or_empty(QueryParam::SampleData);
    if query.is_valid(QueryParam::Sample) || query.is_valid(QueryParam::Genotype) {
        return Err(VariantQueryError::malformed_param_with(
            QueryParam::SampleData,
            &raw,
            "Can not be used along with filter \"genotype\" or \"sample\"",
        ));
    }

    let separator = parsed.operation().unwrap_or(QueryOperation::And).separator();
    let mut genotypes = Vec::new();
    let mut others = Vec::new();
    for sample in parsed.iter() {
        let (gt, other): (Vec<_>, Vec<_>) = sample.values.iter().partition(|f| f.key == "GT");
        if !gt.is_empty() && !other.is_empty() && sample.values.operation() == Some(QueryOperation::Or)
        {
            return Err(VariantQueryError::malformed_param_with(
                QueryParam::SampleData,
                &raw,
                "Unable to add GT filter with operator OR (,)",
            ));
        }
        if !gt.is_empty() {
            let gts = gt.iter().map(|f| f.value.clone()).collect::<Vec<_>>();
            genotypes.push(format!("{}{}{}", sample.key, IS, gts.join(",")));
        }
        if !other.is_empty() {
            let op = sample
                .values
                .operation()
                .unwrap_or(QueryOperation::And)
                .separator()
                .to_string();
            let body = other.iter().map(|f| f.to_string()).collect::<Vec<_>>();
            others.push(format!("{}{}{}", sample.key, IS, body.join(&op)));
        }
    }

    let query = query.with(
        QueryParam::Genotype,
        genotypes.join(&separator.to_string()),
    );
    Ok(if others.is_empty() {
        query.without(QueryParam::SampleData)
    } else {
        query.with(QueryParam::SampleData, others.join(&separator.to_string()))
    })
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn comparators(value: &str) -> Vec<String> {
        parse_multi_key_value_filter_comparators(QueryParam::SampleData, value)
            .expect("valid filter")
            .iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn tokenize_keeps_delimiters() {
        assert_eq!(tokenize("a:1,b;c"), vec!["a:1", ",", "b", ";", "c"]);
        assert_eq!(tokenize("a"), vec!["a"]);
    }

    #[test]
    fn multi_key_value_groups() -> Result<(), anyhow::Error> {
        let values = parse_multi_key_value_filter(QueryParam::Genotype, "s1:0/1,1/1;s2:0/0")?;
        assert_eq!(values.operation(), Some(QueryOperation::And));
        assert_eq!(
            values.values(),
            &[
                ("s1".to_string(), "0/1,1/1".to_string()),
                ("s2".to_string(), "0/0".to_string())
            ]
        );
        Ok(())
    }

    #[test]
    fn multi_key_value_associative_over_repeated_keys() -> Result<(), anyhow::Error> {
        let repeated = parse_multi_key_value_filter(QueryParam::SampleData, "a:x=1;a:y=2")?;
        let merged = parse_multi_key_value_filter(QueryParam::SampleData, "a:x=1;y=2")?;
        assert_eq!(repeated, merged);
        assert_eq!(repeated.values(), &[("a".to_string(), "x=1;y=2".to_string())]);
        assert_eq!(repeated.operation(), None);
        Ok(())
    }

    #[test]
    fn multi_key_value_mixed_and_or() {
        let err = parse_multi_key_value_filter(QueryParam::SampleData, "a:x=1;b:y=2,c:z=3")
            .unwrap_err();
        assert!(matches!(err, VariantQueryError::MixedAndOr { .. }));
    }

    #[test]
    fn multi_key_value_plain_token_before_key() {
        let err = parse_multi_key_value_filter(QueryParam::SampleData, "x;a:y=2").unwrap_err();
        assert!(matches!(err, VariantQueryError::MalformedParam { .. }));
    }

    #[rstest]
    #[case("DP>=10", vec!["DP>=10"])]
    #[case("DP>=10;GQ>20", vec!["DP>=10", "GQ>20"])]
    #[case("FILTER=PASS,FILTER=LowQual", vec!["FILTER=PASS,LowQual"])]
    #[case("QUAL<=5", vec!["QUAL<=5"])]
    #[case("FILTER!=PASS", vec!["FILTER!=PASS"])]
    fn comparator_groups(#[case] value: &str, #[case] expected: Vec<&str>) {
        assert_eq!(comparators(value), expected);
    }

    #[test]
    fn genotype_filter() -> Result<(), anyhow::Error> {
        let parsed = parse_genotype_filter("John:0/1,1/1;Mary:!0/0")?;
        assert_eq!(parsed.operation(), Some(QueryOperation::And));
        assert_eq!(parsed.to_string(), "John:0/1,1/1;Mary:!0/0");
        let mary = &parsed.values.values()[1];
        assert_eq!(mary.key, "Mary");
        assert!(mary.values.values()[0].negated);
        Ok(())
    }

    #[test]
    fn genotype_filter_mixed_negation() {
        let err = parse_genotype_filter("John:0/1,!1/1").unwrap_err();
        assert!(
            matches!(&err, VariantQueryError::MalformedParam { param, .. } if param == "genotype")
        );
    }

    #[test]
    fn sample_data_with_samples() -> Result<(), anyhow::Error> {
        let query = Query::new().with(QueryParam::SampleData, "John:DP>=10;GQ>5;Mary:DP>3");
        let parsed = parse_sample_data(&query)?;
        assert_eq!(parsed.operation(), Some(QueryOperation::And));
        assert_eq!(parsed.values.len(), 2);
        assert_eq!(parsed.values.values()[0].values.len(), 2);
        Ok(())
    }

    #[test]
    fn sample_data_from_sample_param() -> Result<(), anyhow::Error> {
        let query = Query::new()
            .with(QueryParam::Sample, "John,Mary,!Paul")
            .with(QueryParam::SampleData, "DP>=10");
        let parsed = parse_sample_data(&query)?;
        assert_eq!(parsed.operation(), Some(QueryOperation::Or));
        assert_eq!(
            parsed.iter().map(|kv| kv.key.as_str()).collect::<Vec<_>>(),
            vec!["John", "Mary"]
        );
        Ok(())
    }

    #[test]
    fn sample_data_from_genotype_param() -> Result<(), anyhow::Error> {
        let query = Query::new()
            .with(QueryParam::Genotype, "John:0/1;Mary:1/1")
            .with(QueryParam::SampleData, "DP>=10");
        let parsed = parse_sample_data(&query)?;
        assert_eq!(parsed.operation(), Some(QueryOperation::And));
        assert_eq!(parsed.values.len(), 2);
        Ok(())
    }

    #[test]
    fn sample_data_without_samples() {
        let query = Query::new().with(QueryParam::SampleData, "DP>=10");
        assert!(matches!(
            parse_sample_data(&query),
            Err(VariantQueryError::MalformedParam { .. })
        ));
    }

    #[test]
    fn file_data_from_file_param() -> Result<(), anyhow::Error> {
        let query = Query::new()
            .with(QueryParam::File, "f1;f2")
            .with(QueryParam::FileData, "FILTER=PASS;QUAL>30");
        let parsed = parse_file_data(&query)?;
        assert_eq!(parsed.operation(), Some(QueryOperation::And));
        assert_eq!(parsed.to_string(), "f1:FILTER=PASS;QUAL>30;f2:FILTER=PASS;QUAL>30");
        Ok(())
    }

    #[test]
    fn file_data_without_files() {
        let query = Query::new()
            .with(QueryParam::File, "!f1")
            .with(QueryParam::FileData, "FILTER=PASS");
        assert!(matches!(
            parse_file_data(&query),
            Err(VariantQueryError::MalformedParam { .. })
        ));
    }

    #[test]
    fn extract_genotype() -> Result<(), anyhow::Error> {
        let query = Query::new().with(QueryParam::SampleData, "John:GT=0/1,1/1;Mary:GT=1/1;DP>5");
        let query = extract_genotype_from_sample_data(query)?;
        assert_eq!(
            query.get_string(QueryParam::Genotype),
            Some("John:0/1,1/1;Mary:1/1".to_string())
        );
        assert_eq!(
            query.get_string(QueryParam::SampleData),
            Some("Mary:DP>5".to_string())
        );
        Ok(())
    }

    #[test]
    fn extract_genotype_with_sample_fails() {
        let query = Query::new()
            .with(QueryParam::Sample, "John")
            .with(QueryParam::SampleData, "John:GT=0/1");
        assert!(extract_genotype_from_sample_data(query).is_err());
    }

    #[test]
    fn extract_genotype_with_or_fails() {
        let query = Query::new().with(QueryParam::SampleData, "John:DP>5,GT=0/1");
        assert!(extract_genotype_from_sample_data(query).is_err());
    }
}
