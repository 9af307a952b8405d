//! Typed filters produced from a normalized query.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::err::{Result, VariantQueryError};
use crate::query::multikv;
use crate::query::schema::{
    data::VariantCoordinate, Comparator, Describe, KeyOpValue, KeyValues, NegatableValue, Query,
    QueryParam, Region, ResourceId, Values, VariantType,
};
use crate::query::utils::{self, IS};

use super::studies::{StudyContext, MISSING_SAMPLE};

/// A sample, file or cohort together with its study.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StudyResource {
    pub study: ResourceId,
    pub resource: ResourceId,
}

impl StudyResource {
    pub fn new(study: ResourceId, resource: ResourceId) -> Self {
        Self { study, resource }
    }

    pub fn name(&self) -> &str {
        &self.resource.name
    }
}

impl Display for StudyResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource.name)
    }
}

impl Describe for StudyResource {
    fn describe(&self) -> String {
        format!("{}{}{}", self.study.name, IS, self.resource.name)
    }
}

/// Union of positional and identifier filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFilter {
    pub regions: Vec<Region>,
    /// Regions of the genes in `genes`.
    pub gene_regions: Vec<Region>,
    pub genes: Vec<String>,
    pub variant_ids: Vec<VariantCoordinate>,
    /// Accessions such as `rs123` or `RCV000001`.
    pub xrefs: Vec<String>,
}

impl LocationFilter {
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
            && self.gene_regions.is_empty()
            && self.genes.is_empty()
            && self.variant_ids.is_empty()
            && self.xrefs.is_empty()
    }

    /// Whether only positions are used, such that a range scan answers it.
    pub fn is_positional(&self) -> bool {
        self.genes.is_empty() && self.variant_ids.is_empty() && self.xrefs.is_empty()
    }

    /// All regions, explicit ones first.
    pub fn all_regions(&self) -> Vec<Region> {
        self.regions
            .iter()
            .chain(self.gene_regions.iter())
            .cloned()
            .collect()
    }
}

/// Restriction to a set of genes, or to nothing at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeneSet {
    Genes(Vec<String>),
    Nothing,
}

/// `score<op>value` on a registered score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFilter {
    pub score: StudyResource,
    pub op: Comparator,
    pub value: f64,
}

impl Display for ScoreFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.score, self.op, self.value)
    }
}

/// Trio of the compound heterozygous filter; absent parents are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompoundHeterozygousFilter {
    pub study: ResourceId,
    pub proband: ResourceId,
    pub father: Option<ResourceId>,
    pub mother: Option<ResourceId>,
}

impl CompoundHeterozygousFilter {
    /// Names of all present members, proband first.
    pub fn members(&self) -> Vec<&str> {
        std::iter::once(&self.proband)
            .chain(self.father.iter())
            .chain(self.mother.iter())
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// One kind of filter of a variant query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VariantFilter {
    Location(LocationFilter),
    Reference(Values<String>),
    Alternate(Values<String>),
    /// Admitted types, subtypes included.
    Type(Vec<VariantType>),
    ConsequenceType(Values<String>),
    Biotype(Values<String>),
    GeneSet(GeneSet),
    /// `source<op>score`, e.g. `sift<0.2`.
    ProteinSubstitution(Values<KeyOpValue<String, String>>),
    Study(Values<NegatableValue<ResourceId>>),
    File(Values<NegatableValue<StudyResource>>),
    FileData(Values<KeyValues<StudyResource, KeyOpValue<String, String>>>),
    /// Expanded genotypes per sample.
    Genotype(Values<KeyValues<StudyResource, NegatableValue<String>>>),
    SampleData(Values<KeyValues<StudyResource, KeyOpValue<String, String>>>),
    MendelianError(Values<StudyResource>),
    DeNovo(Values<StudyResource>),
    CompoundHeterozygous(CompoundHeterozygousFilter),
    Cohort(Values<NegatableValue<StudyResource>>),
    Score(Values<ScoreFilter>),
}

impl VariantFilter {
    /// Whether the filter applies to the variant annotation.
    pub fn is_annotation_filter(&self) -> bool {
        matches!(
            self,
            VariantFilter::ConsequenceType(_)
                | VariantFilter::Biotype(_)
                | VariantFilter::GeneSet(_)
                | VariantFilter::ProteinSubstitution(_)
        ) || matches!(self, VariantFilter::Location(l) if !l.genes.is_empty() || !l.xrefs.is_empty())
    }

    pub fn describe(&self) -> String {
        match self {
            VariantFilter::Location(l) => format!(
                "location : {} regions, {} genes, {} ids, {} xrefs",
                l.regions.len() + l.gene_regions.len(),
                l.genes.len(),
                l.variant_ids.len(),
                l.xrefs.len()
            ),
            VariantFilter::Reference(v) => format!("reference : {}", v.describe()),
            VariantFilter::Alternate(v) => format!("alternate : {}", v.describe()),
            VariantFilter::Type(t) => format!(
                "type : {}",
                t.iter().map(|t| t.to_string()).collect::<Vec<_>>().join(" OR ")
            ),
            VariantFilter::ConsequenceType(v) => format!("ct : {}", v.describe()),
            VariantFilter::Biotype(v) => format!("biotype : {}", v.describe()),
            VariantFilter::GeneSet(GeneSet::Nothing) => "geneSet : NONE".to_string(),
            VariantFilter::GeneSet(GeneSet::Genes(g)) => format!("geneSet : {} genes", g.len()),
            VariantFilter::ProteinSubstitution(v) => {
                format!("proteinSubstitution : {}", v.describe())
            }
            VariantFilter::Study(v) => format!("study : {}", v.describe()),
            VariantFilter::File(v) => format!("file : {}", v.describe()),
            VariantFilter::FileData(v) => format!("fileData : {}", v.describe()),
            VariantFilter::Genotype(v) => format!("genotype : {}", v.describe()),
            VariantFilter::SampleData(v) => format!("sampleData : {}", v.describe()),
            VariantFilter::MendelianError(v) => format!("sampleMendelianError : {}", v.describe()),
            VariantFilter::DeNovo(v) => format!("sampleDeNovo : {}", v.describe()),
            VariantFilter::CompoundHeterozygous(ch) => {
                format!("sampleCompoundHeterozygous : {}", ch.members().join(", "))
            }
            VariantFilter::Cohort(v) => format!("cohort : {}", v.describe()),
            VariantFilter::Score(v) => format!("score : {}", v.to_query()),
        }
    }
}

fn resource(id: u32, name: &str) -> ResourceId {
    ResourceId::new(id, name)
}

fn sample_resource(ctx: &StudyContext, value: &str) -> Result<StudyResource> {
    let (study, sample) = ctx.resolve_sample(value)?;
    Ok(StudyResource::new(
        resource(study.id, &study.name),
        resource(sample.id, &sample.name),
    ))
}

fn file_resource(ctx: &StudyContext, value: &str) -> Result<StudyResource> {
    let (study, file) = ctx.resolve_file(value)?;
    Ok(StudyResource::new(
        resource(study.id, &study.name),
        resource(file.id, &file.name),
    ))
}

fn parse_location(query: &Query) -> Result<LocationFilter> {
    let regions = |param: QueryParam| -> Result<Vec<Region>> {
        match query.get_string(param) {
            Some(value) => utils::split_value(param, &value)?
                .into_values()
                .into_iter()
                .map(|r| {
                    Region::parse(&r).ok_or_else(|| {
                        VariantQueryError::malformed_param_with(
                            param,
                            &value,
                            format!("Invalid region {:?}", r),
                        )
                    })
                })
                .collect(),
            None => Ok(Vec::new()),
        }
    };
    let list = |param: QueryParam| -> Result<Vec<String>> {
        match query.get_string(param) {
            Some(value) => Ok(utils::split_value(param, &value)?.into_values()),
            None => Ok(Vec::new()),
        }
    };
    let variant_ids = list(QueryParam::Id)?
        .iter()
        .map(|id| {
            VariantCoordinate::parse(id).ok_or_else(|| {
                VariantQueryError::malformed_param_with(
                    QueryParam::Id,
                    id,
                    "Expected chrom:pos:ref:alt",
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(LocationFilter {
        regions: regions(QueryParam::Region)?,
        gene_regions: regions(QueryParam::GeneRegions)?,
        genes: list(QueryParam::Gene)?,
        variant_ids,
        xrefs: list(QueryParam::Xref)?,
    })
}

fn parse_composite(
    parsed: Values<KeyValues<String, KeyOpValue<String, String>>>,
    mut resolve: impl FnMut(&str) -> Result<StudyResource>,
) -> Result<Values<KeyValues<StudyResource, KeyOpValue<String, String>>>> {
    parsed.try_map(|kv| {
        let key = resolve(&kv.key)?;
        Ok(kv.map_key(|_| key))
    })
}

/// Build the typed filters of a normalized query.
pub fn parse_filters(query: &Query, ctx: &StudyContext) -> Result<Vec<VariantFilter>> {
    let mut filters = Vec::new();

    let location = parse_location(query)?;
    if !location.is_empty() {
        filters.push(VariantFilter::Location(location));
    }
    let simple: [(QueryParam, fn(Values<String>) -> VariantFilter); 4] = [
        (QueryParam::Reference, VariantFilter::Reference),
        (QueryParam::Alternate, VariantFilter::Alternate),
        (QueryParam::ConsequenceType, VariantFilter::ConsequenceType),
        (QueryParam::Biotype, VariantFilter::Biotype),
    ];
    for (param, make) in simple {
        if let Some(value) = query.get_string(param) {
            filters.push(make(utils::split_value(param, &value)?));
        }
    }
    if let Some(value) = query.get_string(QueryParam::Type) {
        let types = utils::split_value(QueryParam::Type, &value)?
            .into_values()
            .into_iter()
            .map(|t| {
                t.parse::<VariantType>().map_err(|_| {
                    VariantQueryError::malformed_param_with(QueryParam::Type, &value, "Unknown type")
                })
            })
            .collect::<Result<Vec<_>>>()?;
        filters.push(VariantFilter::Type(types));
    }
    if let Some(value) = query.get_string(QueryParam::GeneSet) {
        filters.push(VariantFilter::GeneSet(if utils::is_none_value(&value) {
            GeneSet::Nothing
        } else {
            GeneSet::Genes(utils::split_value(QueryParam::GeneSet, &value)?.into_values())
        }));
    }
    if let Some(value) = query.get_string(QueryParam::ProteinSubstitution) {
        let values = utils::split_value(QueryParam::ProteinSubstitution, &value)?.try_map(|t| {
            let kov = utils::parse_key_op_value(&t);
            match kov.key {
                Some(key) => Ok(KeyOpValue::new(key, kov.op, kov.value)),
                None => Err(VariantQueryError::malformed_param_with(
                    QueryParam::ProteinSubstitution,
                    &value,
                    "Missing source",
                )),
            }
        })?;
        filters.push(VariantFilter::ProteinSubstitution(values));
    }
    if let Some(value) = query.get_string(QueryParam::Study) {
        let values = utils::split_negatable_value(QueryParam::Study, &value)?.try_map(|s| {
            let study = ctx
                .registry()
                .study(&s.value)?
                .ok_or_else(|| VariantQueryError::study_not_found(&s.value))?;
            Ok::<_, VariantQueryError>(NegatableValue::new(
                s.negated,
                resource(study.id, &study.name),
            ))
        })?;
        filters.push(VariantFilter::Study(values));
    }
    if let Some(value) = query.get_string(QueryParam::File) {
        let values = utils::split_negatable_value(QueryParam::File, &value)?.try_map(|f| {
            Ok::<_, VariantQueryError>(NegatableValue::new(f.negated, file_resource(ctx, &f.value)?))
        })?;
        filters.push(VariantFilter::File(values));
    }
    if query.is_valid(QueryParam::FileData) {
        let parsed = multikv::parse_file_data(query)?.values;
        filters.push(VariantFilter::FileData(parse_composite(parsed, |f| {
            file_resource(ctx, f)
        })?));
    }
    if let Some(value) = query.get_string(QueryParam::Genotype) {
        let parsed = multikv::parse_genotype_filter(&value)?.values;
        filters.push(VariantFilter::Genotype(parsed.try_map(|kv| {
            let key = sample_resource(ctx, &kv.key)?;
            Ok::<_, VariantQueryError>(kv.map_key(|_| key))
        })?));
    }
    if query.is_valid(QueryParam::SampleData) {
        let parsed = multikv::parse_sample_data(query)?.values;
        filters.push(VariantFilter::SampleData(parse_composite(parsed, |s| {
            sample_resource(ctx, s)
        })?));
    }
    let family: [(QueryParam, fn(Values<StudyResource>) -> VariantFilter); 2] = [
        (QueryParam::SampleMendelianError, VariantFilter::MendelianError),
        (QueryParam::SampleDeNovo, VariantFilter::DeNovo),
    ];
    for (param, make) in family {
        if let Some(value) = query.get_string(param) {
            let samples = utils::split_value(param, &value)?.try_map(|s| sample_resource(ctx, &s))?;
            filters.push(make(samples));
        }
    }
    if let Some(value) = query.get_string(QueryParam::SampleCompoundHeterozygous) {
        let members = utils::split_value(QueryParam::SampleCompoundHeterozygous, &value)?
            .into_values();
        let proband = sample_resource(ctx, &members[0])?;
        let parent = |name: Option<&String>| -> Result<Option<ResourceId>> {
            match name.map(|n| n.as_str()) {
                None | Some(MISSING_SAMPLE) => Ok(None),
                Some(name) => {
                    let (_, name) = utils::split_study_resource(name);
                    let qualified = format!("{}{}{}", proband.study.name, IS, name);
                    Ok(Some(sample_resource(ctx, &qualified)?.resource))
                }
            }
        };
        filters.push(VariantFilter::CompoundHeterozygous(
            CompoundHeterozygousFilter {
                father: parent(members.get(1))?,
                mother: parent(members.get(2))?,
                study: proband.study.clone(),
                proband: proband.resource.clone(),
            },
        ));
    }
    if let Some(value) = query.get_string(QueryParam::Cohort) {
        let values = utils::split_negatable_value(QueryParam::Cohort, &value)?.try_map(|c| {
            let (study, cohort) = ctx.resolve_cohort(&c.value)?;
            Ok::<_, VariantQueryError>(NegatableValue::new(
                c.negated,
                StudyResource::new(
                    resource(study.id, &study.name),
                    resource(cohort.id, &cohort.name),
                ),
            ))
        })?;
        filters.push(VariantFilter::Cohort(values));
    }
    if let Some(value) = query.get_string(QueryParam::Score) {
        let values = utils::split_value(QueryParam::Score, &value)?.try_map(|t| {
            let kov = utils::parse_key_op_value(&t);
            let key = kov.key.unwrap_or_default();
            let (study, score) = ctx.resolve_score(&key)?;
            let number = kov.value.parse::<f64>().map_err(|_| {
                VariantQueryError::malformed_param_with(QueryParam::Score, &value, "Expected a number")
            })?;
            Ok::<_, VariantQueryError>(ScoreFilter {
                score: StudyResource::new(
                    resource(study.id, &study.name),
                    resource(score.id, &score.name),
                ),
                op: kov.op,
                value: number,
            })
        })?;
        filters.push(VariantFilter::Score(values));
    }

    for filter in &filters {
        tracing::trace!("filter {}", filter.describe());
    }
    Ok(filters)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::schema::QueryOperation;
    use crate::test_utils;

    #[test]
    fn filters_of_normalized_query() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::Region, "1:100-200,2")
            .with(QueryParam::Type, "SNV,INDEL")
            .with(QueryParam::Genotype, "John:0/1;Pete:0/0")
            .with(QueryParam::GeneSet, "none");
        let ctx = StudyContext::new(&registry, &query)?;
        let filters = parse_filters(&query, &ctx)?;

        assert_eq!(filters.len(), 5);
        let location = match &filters[0] {
            VariantFilter::Location(l) => l,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(location.regions.len(), 2);
        assert!(location.is_positional());
        assert_eq!(
            filters[1],
            VariantFilter::Type(vec![VariantType::Snv, VariantType::Indel])
        );
        assert_eq!(filters[2], VariantFilter::GeneSet(GeneSet::Nothing));
        assert!(matches!(filters[3], VariantFilter::Study(_)));
        match &filters[4] {
            VariantFilter::Genotype(g) => {
                assert_eq!(g.operation(), Some(QueryOperation::And));
                assert_eq!(g.values()[0].key.name(), "John");
                assert_eq!(g.values()[0].key.study.name, "S1");
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn compound_heterozygous_with_missing_parent() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let query = Query::new()
            .with(QueryParam::Study, "S1")
            .with(QueryParam::SampleCompoundHeterozygous, "John,-,Mary");
        let ctx = StudyContext::new(&registry, &query)?;
        let filters = parse_filters(&query, &ctx)?;
        let ch = filters
            .iter()
            .find_map(|f| match f {
                VariantFilter::CompoundHeterozygous(ch) => Some(ch),
                _ => None,
            })
            .expect("compound heterozygous filter");
        assert_eq!(ch.father, None);
        assert_eq!(ch.members(), vec!["John", "Mary"]);
        Ok(())
    }

    #[test]
    fn invalid_region_is_malformed() -> Result<(), anyhow::Error> {
        let registry = test_utils::registry();
        let query = Query::new().with(QueryParam::Region, "1:200-100");
        let ctx = StudyContext::new(&registry, &query)?;
        assert!(matches!(
            parse_filters(&query, &ctx),
            Err(VariantQueryError::MalformedParam { .. })
        ));
        Ok(())
    }
}
