//! Basemirror CLI - mirror an Airtable base into Postgres from the terminal

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use basemirror_source::{AirtableClient, RecordSource};
use basemirror_store::{generate_table_sql, metadata_table_sql, PgStore, StoreError};
use basemirror_sync::{SyncEngine, SyncError};

#[derive(Parser)]
#[command(name = "basemirror")]
#[command(about = "Mirror an Airtable base into a Postgres destination")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full sync of every table in the base
    Sync {
        /// Postgres connection string (defaults to DATABASE_URL)
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },

    /// Generate the SQL migration for the metadata table and every base table
    GenerateMigration {
        /// Output path (defaults to migration-<timestamp>.sql)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Sync { database_url } => run_sync(&database_url).await?,
        Commands::GenerateMigration { output } => generate_migration(output).await?,
    }

    Ok(())
}

async fn run_sync(database_url: &str) -> Result<()> {
    let source = AirtableClient::from_env().context("Airtable credentials not configured")?;
    let store = PgStore::connect(database_url)
        .await
        .context("Failed to connect to destination database")?;

    let engine = SyncEngine::new(source, store);

    match engine.run().await {
        Ok(summary) => {
            info!(
                "Sync completed: {}/{} tables, {} records fetched, {} added, {} updated",
                summary.completed_tables,
                summary.total_tables,
                summary.total_records_fetched,
                summary.total_records_added,
                summary.total_records_updated
            );
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(SyncError::MetadataMissing) => {
            warn!("Metadata table does not exist");
            eprintln!(
                "Run this SQL against the destination, then sync again:\n\n{}\n",
                metadata_table_sql()
            );
            anyhow::bail!("metadata table missing in destination")
        }
        Err(SyncError::Store(StoreError::SchemaMissing { table, ddl })) => {
            warn!("Destination table '{}' does not exist", table);
            eprintln!("Run this SQL against the destination, then sync again:\n\n{ddl}\n");
            anyhow::bail!("destination schema missing for table '{table}'")
        }
        Err(error) => Err(error).context("Sync failed"),
    }
}

async fn generate_migration(output: Option<PathBuf>) -> Result<()> {
    let source = AirtableClient::from_env().context("Airtable credentials not configured")?;

    info!("Fetching tables from Airtable...");
    let tables = source.list_tables().await?;
    info!("Found {} tables", tables.len());

    let mut statements = vec![metadata_table_sql(), String::new()];

    for table in &tables {
        info!("Processing: {}", table.name);
        match source.table_schema(&table.id).await {
            Ok(fields) => {
                statements.push(format!("-- Table: {}", table.name));
                statements.push(generate_table_sql(&table.name, &table.id, &fields));
                statements.push(String::new());
            }
            Err(error) => {
                warn!("Skipping table '{}': {}", table.name, error);
            }
        }
    }

    let migration = statements.join("\n");
    let path = output.unwrap_or_else(|| {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S");
        PathBuf::from(format!("migration-{timestamp}.sql"))
    });

    std::fs::write(&path, migration)
        .with_context(|| format!("Failed to write migration to {}", path.display()))?;
    info!("Migration file generated: {}", path.display());
    println!("Wrote {}", path.display());

    Ok(())
}
