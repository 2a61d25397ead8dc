use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use concept_pipeline::model::{ExternalSource, PartCatalog};
use concept_pipeline::pipeline::{output, report, PipelineInputs, PipelineManager};
use concept_pipeline::template::select_template;
use concept_pipeline::PipelineConfig;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

const DELTA_FILE: &str = "delta.jsonl";

#[derive(Parser)]
#[command(name = "concept-pipeline")]
#[command(about = "Generates ontology concepts from external laboratory codes and emits the delta")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Model every external concept, classify against the saved state and write the delta
    Run {
        /// Directory holding concepts.tsv, part_links.tsv, part_mapping.tsv and optionally parts.tsv
        #[arg(short, long)]
        input: PathBuf,

        /// Directory holding ontology.json and alternate_index.json; updated in place
        #[arg(short, long)]
        state: PathBuf,

        /// Directory for the delta, reports and archive
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the template chosen for each external concept
    Select {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            input,
            state,
            output,
            config,
        } => run(&input, &state, output, config.as_deref()).await,
        Command::Select { input, config } => select(&input, config.as_deref()),
    }
}

async fn run(input: &Path, state: &Path, output_dir: PathBuf, config: Option<&Path>) -> Result<()> {
    let config = PipelineConfig::load(config).context("Failed to load pipeline configuration")?;
    let inputs = PipelineInputs::from_dirs(input, state);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let mut manager = PipelineManager::load(config, &inputs).context("Failed to load pipeline inputs")?;
    let outcome = manager.run().context("Pipeline run failed")?;
    let run_id = uuid::Uuid::new_v4().to_string();
    info!("Run {} produced {} delta records", run_id, outcome.delta.len());

    output::write_delta(&output_dir.join(DELTA_FILE), &outcome.delta).context("Failed to write delta")?;
    let all = outcome.all();
    let refset = manager
        .config()
        .dialect_refsets
        .first()
        .cloned()
        .unwrap_or_default();
    report::write_missing_mappings(&output_dir.join(report::MISSING_MAPPINGS), &outcome.audit)?;
    report::write_issues(&output_dir.join(report::ISSUES), &all)?;
    report::write_comparison(&output_dir.join(report::COMPARISON), &all, &refset)?;
    report::write_summary(&output_dir.join(report::SUMMARY), &outcome.summary)?;
    report::write_mapping_notes(
        &output_dir.join(report::MAPPING_NOTES),
        &outcome.audit,
        manager.mapping().load_notes(),
    )?;
    manager.save_state(&inputs).context("Failed to save pipeline state")?;

    let manifest = report::package_archive(output_dir.clone(), run_id, outcome.delta.clone())
        .await
        .context("Failed to package delta archive")?;

    println!("\n=== Run Summary ===");
    for (item, count) in outcome.summary.rows() {
        println!("{:<40} {}", item, count);
    }
    println!("Archive: {} records ({})", manifest.record_count, manifest.run_id);
    Ok(())
}

fn select(input: &Path, config: Option<&Path>) -> Result<()> {
    let config = PipelineConfig::load(config).context("Failed to load pipeline configuration")?;
    let inputs = PipelineInputs::from_dirs(input, input);
    let catalog = match &inputs.parts {
        Some(path) => PartCatalog::load(path)?,
        None => PartCatalog::default(),
    };
    let source = ExternalSource::load(&inputs.concepts, &inputs.part_links, &catalog, &config.usage)
        .context("Failed to load external concepts")?;
    for concept in source.iter() {
        println!(
            "{}\t{}",
            concept.identifier,
            select_template(concept, &config.manual_external_ids)
        );
    }
    Ok(())
}
