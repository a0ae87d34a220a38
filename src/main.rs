use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lineage_bridge::catalog::{CachedCredential, HttpCatalogClient, RelationshipSink, TokenProvider};
use lineage_bridge::config::{CatalogConfig, Config};
use lineage_bridge::pipeline::{EventProcessor, EventReceiver, ProcessOutcome, ReceiveOutcome};
use lineage_bridge::store::{BlobRef, FsBlobStore, MetadataStore, SqliteMetadataStore};
use lineage_bridge::synth::CommitLogSynthesizer;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lineage-bridge")]
#[command(about = "Publish OpenLineage run events as metadata catalog lineage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an inbound RunEvent payload and open its tracking record
    Receive {
        /// Path to the RunEvent JSON file
        payload: PathBuf,
    },
    /// Process one stored event (file name in the event container, or blob URL)
    Process {
        file_name: String,
    },
    /// Process every Unprocessed event of the team
    ProcessPending,
    /// Synthesize events from Delta commit logs
    Synthesize {
        /// Also open tracking records for the synthesized events
        #[arg(long)]
        register: bool,
    },
    /// Show the tracking and detail records of one event
    Status {
        file_name: String,
    },
}

struct Stores {
    blobs: Arc<FsBlobStore>,
    metadata: Arc<SqliteMetadataStore>,
}

impl Stores {
    fn open(config: &Config) -> Result<Self> {
        let metadata = SqliteMetadataStore::open(&config.metadata_db_path)
            .with_context(|| format!("opening metadata db {}", config.metadata_db_path.display()))?;
        metadata.ensure_tables()?;
        Ok(Self {
            blobs: Arc::new(FsBlobStore::new(&config.storage_root)),
            metadata: Arc::new(metadata),
        })
    }
}

fn processor_with_credential(config: &Config, stores: &Stores) -> Result<(EventProcessor, CachedCredential)> {
    let catalog = CatalogConfig::from_env().context("catalog configuration")?;
    let provider = TokenProvider::new(catalog.credentials.clone(), catalog.timeout)?;
    let credential = CachedCredential::new(provider, catalog.refresh_skew);

    let client = HttpCatalogClient::new(catalog.api_url.clone(), catalog.timeout)?;
    let sink = RelationshipSink::new(Arc::new(client), catalog.qualified_name_base.clone());
    let processor = EventProcessor::new(stores.metadata.clone(), stores.blobs.clone(), sink, &config.team_name)
        .with_missing_identity(config.missing_identity);
    Ok((processor, credential))
}

fn report(file_name: &str, outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::Skipped(reason) => println!("{}: skipped ({})", file_name, reason),
        ProcessOutcome::Processed { relationships, detail } => {
            println!("{}: Processed, {} relationship(s), detail {:?}", file_name, relationships, detail)
        }
        ProcessOutcome::Failed { message } => println!("{}: Failed {}", file_name, message),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let stores = Stores::open(&config)?;
    info!(team = %config.team_name, root = %config.storage_root.display(), "lineage-bridge starting");

    match cli.command {
        Commands::Receive { payload } => {
            let bytes = std::fs::read(&payload).with_context(|| format!("reading {}", payload.display()))?;
            let receiver = EventReceiver::new(
                stores.blobs.clone(),
                stores.metadata.clone(),
                &config.event_container,
                &config.team_name,
            )
            .with_job_patterns(config.job_patterns.clone());
            match receiver.receive(&bytes, Utc::now())? {
                ReceiveOutcome::Accepted { file_path, .. } => println!("stored {}", file_path),
                ReceiveOutcome::Ignored { reason } => println!("ignored: {}", reason),
            }
        }
        Commands::Process { file_name } => {
            let blob = if file_name.contains("://") {
                BlobRef::from_url(&file_name)?
            } else {
                BlobRef::new(&config.event_container, file_name)
            };
            let (processor, mut credential) = processor_with_credential(&config, &stores)?;
            let token = credential.current().await.context("acquiring catalog token")?;
            let outcome = processor.process(&blob, &token).await?;
            report(&blob.name, &outcome);
        }
        Commands::ProcessPending => {
            let (processor, mut credential) = processor_with_credential(&config, &stores)?;
            let results = processor
                .process_pending(&config.event_container, &mut credential)
                .await?;
            let mut errors = 0;
            for (file_name, outcome) in &results {
                match outcome {
                    Ok(outcome) => report(file_name, outcome),
                    Err(e) => {
                        errors += 1;
                        println!("{}: error {}", file_name, e);
                    }
                }
            }
            if errors > 0 {
                error!(errors, total = results.len(), "Some events could not be processed");
                anyhow::bail!("{} of {} event(s) could not be processed", errors, results.len());
            }
        }
        Commands::Synthesize { register } => {
            let mut synth = CommitLogSynthesizer::new(stores.blobs.clone(), &config.synth);
            if register {
                synth = synth.with_registration(stores.metadata.clone(), &config.team_name);
            }
            let report = synth.scan(Utc::now())?;
            println!(
                "{} table(s), {} event(s) written, {} skipped, {} registered",
                report.tables.len(),
                report.written.len(),
                report.skipped.len(),
                report.registered
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.name, skipped.reason);
            }
        }
        Commands::Status { file_name } => {
            let record = stores
                .metadata
                .get_event(&config.team_name, &file_name)?
                .with_context(|| format!("no event metadata for {}", file_name))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if let Some(detail) = stores.metadata.get_detail(&config.team_name, &file_name)? {
                println!("{}", serde_json::to_string_pretty(&detail)?);
            }
        }
    }

    Ok(())
}
