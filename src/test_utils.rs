//! Fixtures shared by the unit tests.

use crate::annotation::InMemoryAnnotation;
use crate::backend::memory::MemoryDataset;
use crate::metadata::memory::{
    CohortDefinition, FileDefinition, InMemoryRegistry, SampleDefinition, StudyDefinition,
};
use crate::metadata::TaskStatus;
use crate::query::engine::VariantQueryEngine;
use crate::query::schema::data::{ConsequenceType, SampleEntry, StudyEntry, VariantAnnotation};
use crate::query::schema::ontology::PROTEIN_CODING;
use crate::query::schema::{EngineConfig, Variant};

fn sample(name: &str, father: Option<&str>, mother: Option<&str>) -> SampleDefinition {
    SampleDefinition {
        name: name.into(),
        father: father.map(|s| s.into()),
        mother: mother.map(|s| s.into()),
        ..Default::default()
    }
}

fn file(name: &str, samples: &[&str]) -> FileDefinition {
    FileDefinition {
        name: name.into(),
        samples: samples.iter().map(|s| s.to_string()).collect(),
        indexed: None,
    }
}

/// Study `S1` with the trio John (child), Pete (father) and Mary (mother)
/// plus the unrelated Paul; study `S2` without genotypes holding Sam.
pub fn study_definitions() -> Vec<StudyDefinition> {
    let john = SampleDefinition {
        mendelian_error_status: TaskStatus::Ready,
        family_index_status: TaskStatus::Ready,
        ..sample("John", Some("Pete"), Some("Mary"))
    };
    vec![
        StudyDefinition {
            name: "S1".into(),
            loaded_genotypes: vec!["0/0".into(), "0/1".into(), "1/1".into()],
            contigs: [("1".to_string(), 248_956_422), ("2".to_string(), 242_193_529)]
                .into_iter()
                .collect(),
            sample_data_keys: vec!["GT".into(), "DP".into(), "GQ".into()],
            file_data_keys: vec!["FILTER".into(), "QUAL".into(), "DP".into()],
            samples: vec![
                john,
                sample("Pete", None, None),
                sample("Mary", None, None),
                sample("Paul", None, None),
            ],
            files: vec![file("f1", &["John", "Pete", "Mary"]), file("f2", &["Paul"])],
            cohorts: vec![CohortDefinition {
                name: "ALL".into(),
                samples: vec!["John".into(), "Pete".into(), "Mary".into(), "Paul".into()],
                calculated: true,
            }],
            scores: vec!["cadd".into()],
            ..Default::default()
        },
        StudyDefinition {
            name: "S2".into(),
            exclude_genotypes: true,
            sample_data_keys: vec!["GT".into()],
            file_data_keys: vec!["FILTER".into(), "QUAL".into()],
            samples: vec![sample("Sam", None, None)],
            files: vec![file("f3", &["Sam"])],
            ..Default::default()
        },
    ]
}

pub fn registry() -> InMemoryRegistry {
    InMemoryRegistry::new(study_definitions()).expect("valid fixture registry")
}

/// Variant hitting `gene` with `term` whose `S1` genotypes of John, Pete
/// and Mary are `gts`; Paul is always hom-ref.
pub fn trio_variant(chrom: &str, pos: u32, gene: &str, term: &str, gts: [&str; 3]) -> Variant {
    let mut variant = Variant::new(chrom, pos, "C", "T");
    variant.annotation = Some(VariantAnnotation {
        consequence_types: vec![ConsequenceType {
            gene_name: gene.into(),
            gene_id: format!("ENSG_{}", gene),
            biotype: PROTEIN_CODING.into(),
            sequence_ontology_terms: vec![term.into()],
            ..Default::default()
        }],
        xrefs: vec![],
    });
    let mut study = StudyEntry {
        study_id: "S1".into(),
        ..Default::default()
    };
    for (name, gt) in ["John", "Pete", "Mary", "Paul"]
        .into_iter()
        .zip(gts.into_iter().chain(["0/0"]))
    {
        study.samples.insert(name.into(), SampleEntry::with_gt(gt));
    }
    variant.studies.push(study);
    variant
}

/// Gene `G` with one damaging allele from each parent, gene `H` with two
/// paternal ones, and an intronic hom-alt variant of gene `K` on chr2.
pub fn trio_variants() -> Vec<Variant> {
    vec![
        trio_variant("1", 1_000, "G", "missense_variant", ["0/1", "0/1", "0/0"]),
        trio_variant("1", 2_000, "G", "stop_gained", ["0/1", "0/0", "0/1"]),
        trio_variant("1", 5_000, "H", "missense_variant", ["0/1", "0/1", "0/0"]),
        trio_variant("1", 6_000, "H", "frameshift_variant", ["0/1", "0/1", "0/0"]),
        trio_variant("2", 1_500_000, "K", "intron_variant", ["1/1", "0/1", "0/1"]),
    ]
}

pub fn dataset(search_index: bool, sample_index: bool) -> MemoryDataset {
    MemoryDataset {
        studies: study_definitions(),
        variants: trio_variants(),
        annotation: InMemoryAnnotation {
            genes: [
                ("G".to_string(), "1:900-2100".to_string()),
                ("H".to_string(), "1:4900-6100".to_string()),
                ("K".to_string(), "2:1400000-1600000".to_string()),
            ]
            .into_iter()
            .collect(),
            ..Default::default()
        },
        search_index,
        sample_index,
    }
}

/// Engine over `dataset`, with the selected secondary indexes attached.
pub fn engine(search_index: bool, sample_index: bool) -> VariantQueryEngine {
    dataset(search_index, sample_index)
        .into_engine(EngineConfig::default())
        .expect("valid fixture dataset")
}
