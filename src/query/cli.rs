//! Implementation of the `query *` sub commands.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::time::Instant;

use clap::Parser;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::memory::MemoryDataset;
use crate::query::engine::VariantQueryEngine;
use crate::query::schema::{EngineConfig, Query, QueryOptions};

/// Input and output files shared by all `query *` sub commands.
#[derive(Parser, Debug, Clone)]
pub struct InputArgs {
    /// Path to the dataset JSON file (studies, variants, annotation).
    #[arg(long, required = true)]
    pub path_dataset: String,
    /// Path to query JSON file; an empty query if omitted.
    #[arg(long)]
    pub path_query_json: Option<String>,
    /// Path to query options JSON file; defaults if omitted.
    #[arg(long)]
    pub path_options_json: Option<String>,
    /// Path to engine configuration JSON file; defaults if omitted.
    #[arg(long)]
    pub path_config: Option<String>,
    /// Path to the output JSON file; written to stdout if omitted.
    #[arg(long)]
    pub path_output: Option<String>,
}

/// Command line arguments for `query run` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Run a variant query", long_about = None)]
pub struct RunArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Command line arguments for `query count` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Count the variants matching a query", long_about = None)]
pub struct CountArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

/// Command line arguments for `query facet` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Aggregate the variants matching a query", long_about = None)]
pub struct FacetArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Facets to compute, overriding the `facet` option.
    #[arg(long)]
    pub facet: Option<String>,
}

/// Command line arguments for `query compound-het` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "Compound heterozygous variants of a proband", long_about = None)]
pub struct CompoundHetArgs {
    #[command(flatten)]
    pub input: InputArgs,
    /// Name of the proband.
    #[arg(long, required = true)]
    pub proband: String,
    /// Name of the father; taken from the pedigree if neither parent is given.
    #[arg(long)]
    pub father: Option<String>,
    /// Name of the mother; taken from the pedigree if neither parent is given.
    #[arg(long)]
    pub mother: Option<String>,
}

fn load_json<T: DeserializeOwned + Default>(
    path: Option<&str>,
    what: &str,
) -> Result<T, anyhow::Error> {
    match path {
        Some(path) => {
            tracing::info!("Loading {} from {}...", what, path);
            let reader = BufReader::new(
                File::open(path).map_err(|e| anyhow::anyhow!("could not open {}: {}", path, e))?,
            );
            serde_json::from_reader(reader)
                .map_err(|e| anyhow::anyhow!("could not parse {} from {}: {}", what, path, e))
        }
        None => Ok(T::default()),
    }
}

/// Everything loaded from the input files.
struct Inputs {
    engine: VariantQueryEngine,
    query: Query,
    options: QueryOptions,
}

fn load_inputs(args: &InputArgs) -> Result<Inputs, anyhow::Error> {
    let before_loading = Instant::now();
    let config: EngineConfig = load_json(args.path_config.as_deref(), "engine configuration")?;
    tracing::debug!("config = {:?}", &config);

    tracing::info!("Loading dataset from {}...", &args.path_dataset);
    let dataset = MemoryDataset::from_json_str(
        &std::fs::read_to_string(&args.path_dataset)
            .map_err(|e| anyhow::anyhow!("could not read {}: {}", &args.path_dataset, e))?,
    )?;
    tracing::info!(
        "... done loading {} studies and {} variants in {:?}",
        dataset.studies.len(),
        dataset.variants.len(),
        before_loading.elapsed()
    );

    let query: Query = load_json(args.path_query_json.as_deref(), "query")?;
    let options: QueryOptions = load_json(args.path_options_json.as_deref(), "query options")?;
    tracing::info!("query = {}", &query);

    Ok(Inputs {
        engine: dataset.into_engine(config)?,
        query,
        options,
    })
}

fn write_output<T: Serialize>(path: Option<&str>, value: &T) -> Result<(), anyhow::Error> {
    let mut writer: Box<dyn Write> = match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| anyhow::anyhow!("could not create {}: {}", path, e))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Main entry point for `query run` sub command.
pub fn run(args_common: &crate::common::Args, args: &RunArgs) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let inputs = load_inputs(&args.input)?;
    let result = inputs.engine.get(&inputs.query, &inputs.options)?;
    write_output(args.input.path_output.as_deref(), &result)?;

    tracing::info!("All of `query run` completed in {:?}", before_anything.elapsed());
    Ok(())
}

/// Main entry point for `query count` sub command.
pub fn count(args_common: &crate::common::Args, args: &CountArgs) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let inputs = load_inputs(&args.input)?;
    let count = inputs.engine.count(&inputs.query, &inputs.options)?;
    write_output(args.input.path_output.as_deref(), &count)?;

    tracing::info!("All of `query count` completed in {:?}", before_anything.elapsed());
    Ok(())
}

/// Main entry point for `query facet` sub command.
pub fn facet(args_common: &crate::common::Args, args: &FacetArgs) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let mut inputs = load_inputs(&args.input)?;
    if let Some(facet) = &args.facet {
        inputs.options.facet = Some(facet.clone());
    }
    let result = inputs.engine.facet(&inputs.query, &inputs.options)?;
    write_output(args.input.path_output.as_deref(), &result)?;

    tracing::info!("All of `query facet` completed in {:?}", before_anything.elapsed());
    Ok(())
}

/// Main entry point for `query compound-het` sub command.
pub fn compound_het(
    args_common: &crate::common::Args,
    args: &CompoundHetArgs,
) -> Result<(), anyhow::Error> {
    let before_anything = Instant::now();
    tracing::info!("args_common = {:?}", &args_common);
    tracing::info!("args = {:?}", &args);

    let inputs = load_inputs(&args.input)?;
    let result = inputs.engine.compound_heterozygous(
        &inputs.query,
        &inputs.options,
        &args.proband,
        args.father.as_deref(),
        args.mother.as_deref(),
    )?;
    write_output(args.input.path_output.as_deref(), &result)?;

    tracing::info!(
        "All of `query compound-het` completed in {:?}",
        before_anything.elapsed()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::query::result::{VariantCount, VariantFacetResult, VariantQueryResult};
    use crate::test_utils;

    /// Write the test dataset plus `query` and `options` into `tmp_dir`.
    fn input_args(
        tmp_dir: &tempfile::TempDir,
        query: &str,
        options: &str,
    ) -> Result<InputArgs, anyhow::Error> {
        let path = |name: &str| tmp_dir.path().join(name).to_string_lossy().to_string();
        std::fs::write(
            path("dataset.json"),
            serde_json::to_string(&test_utils::dataset(true, true))?,
        )?;
        std::fs::write(path("query.json"), query)?;
        std::fs::write(path("options.json"), options)?;
        std::fs::write(path("config.json"), r#"{"limit_max": 3}"#)?;
        Ok(InputArgs {
            path_dataset: path("dataset.json"),
            path_query_json: Some(path("query.json")),
            path_options_json: Some(path("options.json")),
            path_config: Some(path("config.json")),
            path_output: Some(path("out.json")),
        })
    }

    fn read_output<T: DeserializeOwned>(args: &InputArgs) -> Result<T, anyhow::Error> {
        let path = args.path_output.as_deref().unwrap_or_default();
        Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
    }

    #[test]
    fn run_writes_result() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let args = RunArgs {
            input: input_args(
                &tmp_dir,
                r#"{"study": "S1"}"#,
                r#"{"limit": 2, "count": true}"#,
            )?,
        };
        run(&crate::common::Args::default(), &args)?;

        let result: VariantQueryResult = read_output(&args.input)?;
        assert_eq!(result.num_results, 2);
        assert_eq!(result.num_matches, Some(5));
        Ok(())
    }

    #[test]
    fn run_honors_config_bounds() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let args = RunArgs {
            input: input_args(&tmp_dir, r#"{"study": "S1"}"#, r#"{"limit": 4}"#)?,
        };
        assert!(run(&crate::common::Args::default(), &args).is_err());
        Ok(())
    }

    #[test]
    fn count_writes_count() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let args = CountArgs {
            input: input_args(&tmp_dir, r#"{"study": "S1", "gene": "G"}"#, "{}")?,
        };
        count(&crate::common::Args::default(), &args)?;

        let count: VariantCount = read_output(&args.input)?;
        assert_eq!(count, VariantCount::exact(2));
        Ok(())
    }

    #[test]
    fn facet_from_command_line() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let args = FacetArgs {
            input: input_args(&tmp_dir, "{}", "{}")?,
            facet: Some("chromosome".into()),
        };
        facet(&crate::common::Args::default(), &args)?;

        let result: VariantFacetResult = read_output(&args.input)?;
        assert_eq!(result.facets[0].name, "chromosome");
        assert_eq!(result.facets[0].buckets[0].value, "1");
        assert_eq!(result.facets[0].buckets[0].count, 4);
        Ok(())
    }

    #[test]
    fn compound_het_writes_pairs() -> Result<(), anyhow::Error> {
        let tmp_dir = tempfile::tempdir()?;
        let args = CompoundHetArgs {
            input: input_args(&tmp_dir, r#"{"study": "S1"}"#, "{}")?,
            proband: "John".into(),
            father: None,
            mother: None,
        };
        compound_het(&crate::common::Args::default(), &args)?;

        let result: VariantQueryResult = read_output(&args.input)?;
        assert_eq!(
            result.results.iter().map(|v| v.id()).collect::<Vec<_>>(),
            vec!["1:1000:C:T", "1:2000:C:T"]
        );
        Ok(())
    }
}
