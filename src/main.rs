use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use pricelist_ingest::config::Config;
use pricelist_ingest::logging;
use pricelist_ingest::metrics;
use pricelist_ingest::pipeline::processing::BatchProcessor;
use pricelist_ingest::pipeline::{FileStatus, Orchestrator};
use pricelist_ingest::render_report;
use pricelist_ingest::pipeline::storage::open_storage;
use pricelist_ingest::types::{CanonicalField, SourceDescriptor, SupplierRef};

#[derive(Parser)]
#[command(name = "pricelist_ingest")]
#[command(about = "Supplier pricelist ingestion: validate, deduplicate and merge into the product catalog")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Directory for rotated JSON logs
    #[arg(long, global = true, default_value = "logs")]
    log_dir: PathBuf,

    /// Expose Prometheus metrics on this port
    #[arg(long, global = true)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and merge one or more pricelist files
    Import {
        #[arg(long)]
        supplier: String,
        #[arg(long)]
        org: Option<String>,
        /// Reuse a run id to resume an interrupted run
        #[arg(long)]
        run_id: Option<String>,
        /// Column override as field=Header (e.g. cost_price="Nett Price")
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        mappings: Vec<String>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate a pricelist without touching the store and print the report
    Validate {
        #[arg(long)]
        supplier: String,
        #[arg(long = "map", value_name = "FIELD=HEADER")]
        mappings: Vec<String>,
        /// Write the markdown report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
        file: PathBuf,
    },
    /// Show checkpoint state for a run
    Status {
        #[arg(long)]
        run_id: String,
    },
    /// Show the price history of one product
    History {
        #[arg(long)]
        supplier: String,
        #[arg(long)]
        sku: String,
    },
}

fn parse_mappings(mappings: &[String]) -> anyhow::Result<Vec<(CanonicalField, String)>> {
    mappings
        .iter()
        .map(|m| {
            let (field, header) = m
                .split_once('=')
                .ok_or_else(|| anyhow!("mapping '{}' is not FIELD=HEADER", m))?;
            let field = CanonicalField::parse(field)
                .ok_or_else(|| anyhow!("unknown field '{}' in mapping '{}'", field, m))?;
            Ok((field, header.trim().to_string()))
        })
        .collect()
}

fn descriptor(path: PathBuf, supplier: &SupplierRef, mappings: &[(CanonicalField, String)]) -> SourceDescriptor {
    mappings.iter().fold(
        SourceDescriptor::from_path(path, supplier.clone()),
        |d, (field, header)| d.with_override(*field, header.clone()),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_dir);

    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(port) = cli.metrics_port {
        metrics::init_metrics(port);
    }

    match cli.command {
        Commands::Import {
            supplier,
            org,
            run_id,
            mappings,
            json,
            files,
        } => {
            let mappings = parse_mappings(&mappings)?;
            let mut supplier_ref = SupplierRef::new(supplier);
            if let Some(org) = org {
                supplier_ref = supplier_ref.with_organization(org);
            }
            let run_id = run_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let sources = files
                .into_iter()
                .map(|f| descriptor(f, &supplier_ref, &mappings))
                .collect();

            let storage = open_storage(&config)?;
            let orchestrator = Orchestrator::new(config, storage)?;
            let token = orchestrator.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("⏹️ Interrupt received, finishing in-flight files");
                    token.cancel();
                }
            });

            println!("🔄 Importing run {}...", run_id);
            let summary = orchestrator.run(&run_id, sources).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\n📊 Run {} results:", summary.run_id);
                println!("   Files processed: {}", summary.files_processed);
                println!("   Files skipped: {}", summary.files_skipped);
                println!("   Files failed: {}", summary.files_failed);
                println!("   Records: {}", summary.total_records);
                println!("   Inserted: {}", summary.inserted);
                println!("   Updated: {}", summary.updated);
                println!("   Price changes: {}", summary.price_changes);
                println!("   Duplicates: {}", summary.duplicates);
                println!("   Errors: {}  Warnings: {}", summary.errors.len(), summary.warnings.len());
                for file in &summary.files {
                    match (&file.status, &file.batch) {
                        (FileStatus::Failed, _) => println!(
                            "   ❌ {}: {}",
                            file.source_file,
                            file.error.as_deref().unwrap_or("failed")
                        ),
                        (_, Some(batch)) => println!(
                            "   ✅ {}: quality {}/100{}",
                            file.source_file,
                            batch.quality_score,
                            file.resumed_from
                                .map(|r| format!(", resumed at row {}", r))
                                .unwrap_or_default()
                        ),
                        (status, None) => println!("   ⏭️ {}: {}", file.source_file, status.as_str()),
                    }
                }
                if summary.cancelled {
                    println!("\n⚠️  Run was cancelled; re-run with --run-id {} to resume", summary.run_id);
                }
            }
        }
        Commands::Validate {
            supplier,
            mappings,
            output,
            file,
        } => {
            let mappings = parse_mappings(&mappings)?;
            let source = descriptor(file, &SupplierRef::new(supplier), &mappings);
            let processor = BatchProcessor::new(&config)?;
            let batch = tokio::task::spawn_blocking(move || processor.prepare(&source)).await??;
            let report = render_report(&batch.result);
            match output {
                Some(path) => {
                    std::fs::write(&path, report)?;
                    info!("📝 Report written to {}", path.display());
                }
                None => println!("{}", report),
            }
        }
        Commands::Status { run_id } => {
            let storage = open_storage(&config)?;
            let rows = storage.list_progress(&run_id).await?;
            if rows.is_empty() {
                println!("No checkpoints recorded for run {}", run_id);
            }
            for p in rows {
                println!(
                    "{}  {}  watermark {}  processed {}/{}{}",
                    p.filename,
                    p.status,
                    p.watermark_row,
                    p.processed_rows,
                    p.total_rows,
                    p.last_error
                        .map(|e| format!("  last error: {}", e))
                        .unwrap_or_default()
                );
            }
        }
        Commands::History { supplier, sku } => {
            let storage = open_storage(&config)?;
            let sku = sku.trim().to_uppercase();
            let product = storage
                .get_product(&supplier, &sku)
                .await?
                .ok_or_else(|| anyhow!("no product {} for supplier {}", sku, supplier))?;
            println!(
                "{} {} ({})",
                product.supplier_sku,
                product.name.as_deref().unwrap_or("(no name)"),
                product.status.as_str()
            );
            for entry in storage.price_history(product.id).await? {
                println!(
                    "  {} {} from {}{}  {}",
                    if entry.is_current { "*" } else { " " },
                    entry.price,
                    entry.valid_from.format("%Y-%m-%d %H:%M:%S"),
                    entry
                        .valid_to
                        .map(|t| format!(" to {}", t.format("%Y-%m-%d %H:%M:%S")))
                        .unwrap_or_default(),
                    entry.change_reason
                );
            }
        }
    }

    Ok(())
}
