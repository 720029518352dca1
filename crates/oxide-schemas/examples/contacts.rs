//! Example: Contacts database
//!
//! Declares a contacts table that grew two timestamp columns over four
//! revisions, opens (or creates) a SQLite database at the requested
//! revision and prints the resolved schema.
//!
//! Run with: cargo run --example contacts -p oxide-schemas -- --version 2

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use oxide_schemas::prelude::*;

/// Opens a contacts database at a schema revision.
#[derive(Parser)]
#[command(name = "contacts")]
#[command(author, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(
        short,
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:contacts.sqlite3?mode=rwc"
    )]
    database: String,

    /// Revision to open the database at (current revision if not specified).
    #[arg(long)]
    version: Option<i32>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,
}

// =============================================================================
// Schema declaration
// =============================================================================

fn contacts_schemas() -> Result<Schemas> {
    Schemas::builder(
        4,
        vec![TableDefinition::new(
            "contacts",
            vec![
                TableOperation::add_column("id", "INTEGER PRIMARY KEY AUTOINCREMENT"),
                TableOperation::add_column("name", "TEXT"),
                TableOperation::add_column("created_at", "INTEGER"),
                TableOperation::add_column("updated_at", "INTEGER"),
            ],
        )?],
    )?
    .upgrade_to(
        4,
        vec![SimpleTableMigration::of("contacts")
            .with_mapping("updated_at", "COALESCE(created_at, STRFTIME('%s', 'now'))")
            .boxed()],
    )?
    .downgrade_to(
        2,
        vec![TableDowngrade::new(
            "contacts",
            vec![TableOperation::drop_column("updated_at")],
        )?],
    )?
    .downgrade_to(
        1,
        vec![TableDowngrade::new(
            "contacts",
            vec![TableOperation::drop_column("created_at")],
        )?],
    )?
    .build()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let schemas = contacts_schemas()?;
    let version = cli.version.unwrap_or_else(|| schemas.current_revision());

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&cli.database)
        .await?;

    let outcome = open_database(&pool, &schemas, version).await?;
    info!(outcome = ?outcome, "Database ready");

    let revision = schemas.schema_at(version)?;
    for table in revision.tables() {
        println!("{};", revision.create_table_statement(&table)?);
    }
    println!("{}", serde_json::to_string_pretty(&*revision)?);

    Ok(())
}
