use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::{ArgAction, Args, Parser, Subcommand};
use cookbook_store_core::{CookbookVersion, validate_versions};
use cookbook_store_db::{LogFormat, Overrides, Settings, VersionBundle, read_document};
use cookbook_store_sqlite::{
    CleanupCandidates, CookbookStore, Database, Migration, RejectFrozenOverwrite,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// CLI-specific log format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

impl From<CliLogFormat> for LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => Self::Text,
            CliLogFormat::Json => Self::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "cookbook-store")]
#[command(about = "Store, inspect and prune Chef cookbook versions in SQLite")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// YAML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Database file path (overrides settings and environment).
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Table prefix (overrides settings and environment).
    #[arg(long, global = true)]
    prefix: Option<String>,
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Log output format.
    #[arg(long, global = true)]
    log_format: Option<CliLogFormat>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// SQLite table migration and seeding operations.
    Migrate(MigrateArgs),
    /// List stored cookbooks with their version counts.
    List,
    /// List the versions of one cookbook, newest first.
    Versions(VersionsArgs),
    /// Print one cookbook version document as JSON.
    Show(ShowArgs),
    /// Validate and save cookbook version documents.
    Import(ImportArgs),
    /// Write stored versions to a bundle file.
    Export(ExportArgs),
    /// Delete a cookbook or one of its versions and print freed checksums.
    Delete(DeleteArgs),
    /// Validate cookbook version documents without touching the database.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct MigrateArgs {
    #[command(subcommand)]
    operation: MigrateOperation,
}

#[derive(Debug, Subcommand)]
enum MigrateOperation {
    /// Create the cookbook tables.
    Up,
    /// Drop the cookbook tables.
    Down,
    /// Show table status and row counts.
    Status,
    /// Seed the tables from a document directory or bundle file.
    Seed(SourceArgs),
    /// Drop tables, recreate, and reseed.
    Refresh(SourceArgs),
}

#[derive(Debug, Args)]
struct SourceArgs {
    /// Directory of cookbook version JSON documents, or a bundle file.
    #[arg(long)]
    source: PathBuf,
}

#[derive(Debug, Args)]
struct VersionsArgs {
    /// Cookbook name.
    cookbook: String,
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Cookbook name.
    cookbook: String,
    /// Version (e.g. 1.2 or 1.2.3).
    version: String,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Cookbook version JSON documents.
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Refuse to overwrite versions that are stored frozen.
    #[arg(long)]
    protect_frozen: bool,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Output JSON bundle path.
    #[arg(long)]
    output: PathBuf,
    /// Cookbooks to export (default: all).
    cookbooks: Vec<String>,
}

#[derive(Debug, Args)]
struct DeleteArgs {
    /// Cookbook name.
    cookbook: String,
    /// Delete only this version instead of the whole cookbook.
    version: Option<String>,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Cookbook version JSON documents.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    let result = resolve_settings(&cli.global).and_then(|settings| {
        init_logging(&settings);
        match cli.command {
            Command::Migrate(args) => run_migrate(&settings, args),
            Command::List => run_list(&settings),
            Command::Versions(args) => run_versions(&settings, args),
            Command::Show(args) => run_show(&settings, args),
            Command::Import(args) => run_import(&settings, args),
            Command::Export(args) => run_export(&settings, args),
            Command::Delete(args) => run_delete(&settings, args),
            Command::Validate(args) => run_validate(args),
        }
    });

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn resolve_settings(global: &GlobalArgs) -> Result<Settings, String> {
    let log_level = match global.verbose {
        0 => None,
        1 => Some("debug".to_string()),
        _ => Some("trace".to_string()),
    };
    let overrides = Overrides {
        database: global.db.clone(),
        prefix: global.prefix.clone(),
        busy_timeout_ms: None,
        log_level,
        log_format: global.log_format.map(LogFormat::from),
    };
    Settings::load(global.config.as_deref(), &overrides)
        .map_err(|e| format!("Failed to resolve settings: {e}"))
}

/// Installs the stderr subscriber. `RUST_LOG` wins over the resolved level.
fn init_logging(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn open_database(settings: &Settings) -> Result<Database, String> {
    let db = Database::from_settings(settings).map_err(|e| {
        format!(
            "Failed to open database '{}': {e}",
            settings.database.display()
        )
    })?;
    debug!(database = %settings.database.display(), prefix = %settings.prefix, "opened store");
    Ok(db)
}

fn open_store<'a>(
    db: &'a Database,
    settings: &Settings,
) -> Result<CookbookStore<&'a Database>, String> {
    CookbookStore::new(db, settings.prefix.as_str())
        .map_err(|e| format!("Failed to initialize store: {e}"))
}

fn close_database(db: Database) -> Result<(), String> {
    db.close().map_err(|e| format!("Failed to close database: {e}"))
}

// ---------------------------------------------------------------------------
// migrate
// ---------------------------------------------------------------------------

fn run_migrate(settings: &Settings, args: MigrateArgs) -> Result<(), String> {
    let db = open_database(settings)?;
    migrate(&db, settings, args.operation)?;
    close_database(db)
}

fn migrate(db: &Database, settings: &Settings, operation: MigrateOperation) -> Result<(), String> {
    let migration = Migration::new(db, settings.prefix.as_str())
        .map_err(|e| format!("Failed to initialize migration: {e}"))?;

    match operation {
        MigrateOperation::Up => {
            migration
                .up()
                .map_err(|e| format!("Migration up failed: {e}"))?;
            println!(
                "Migration up complete. Tables created with prefix '{}' in '{}'.",
                settings.prefix,
                settings.database.display()
            );
        }
        MigrateOperation::Down => {
            migration
                .down()
                .map_err(|e| format!("Migration down failed: {e}"))?;
            println!(
                "Migration down complete. Tables with prefix '{}' dropped from '{}'.",
                settings.prefix,
                settings.database.display()
            );
        }
        MigrateOperation::Status => {
            let status = migration
                .status()
                .map_err(|e| format!("Failed to get migration status: {e}"))?;
            println!("Migration Status:");
            println!(
                "  Tables exist: {}",
                if status.tables_exist { "yes" } else { "no" }
            );
            println!("  Cookbook count: {}", status.cookbook_count);
            println!("  Version count: {}", status.version_count);
        }
        MigrateOperation::Seed(source) => {
            let report = migration
                .seed(&source.source)
                .map_err(|e| format!("Seed failed: {e}"))?;
            println!("Seed complete:");
            println!("  Cookbooks created: {}", report.cookbooks_created);
            println!("  Versions inserted: {}", report.versions_inserted);
            println!("  Versions updated: {}", report.versions_updated);
        }
        MigrateOperation::Refresh(source) => {
            let report = migration
                .refresh(&source.source)
                .map_err(|e| format!("Refresh failed: {e}"))?;
            println!("Refresh complete (tables dropped, recreated, and reseeded):");
            println!("  Cookbooks created: {}", report.cookbooks_created);
            println!("  Versions inserted: {}", report.versions_inserted);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// read commands
// ---------------------------------------------------------------------------

fn run_list(settings: &Settings) -> Result<(), String> {
    let db = open_database(settings)?;
    {
        let store = open_store(&db, settings)?;
        let names = store
            .list_names()
            .map_err(|e| format!("Failed to list cookbooks: {e}"))?;
        if names.is_empty() {
            println!("No cookbooks stored.");
        }
        for name in names {
            let count = store
                .count_versions(&name)
                .map_err(|e| format!("Failed to count versions of '{name}': {e}"))?;
            println!("{name}\t{count}");
        }
    }
    close_database(db)
}

fn run_versions(settings: &Settings, args: VersionsArgs) -> Result<(), String> {
    let db = open_database(settings)?;
    {
        let store = open_store(&db, settings)?;
        let cookbook = store.load(&args.cookbook).map_err(|e| e.to_string())?;
        let versions = store
            .list_versions(&cookbook.name)
            .map_err(|e| format!("Failed to list versions of '{}': {e}", cookbook.name))?;
        for version in versions {
            if version.frozen {
                println!("{} (frozen)", version.version);
            } else {
                println!("{}", version.version);
            }
        }
    }
    close_database(db)
}

fn run_show(settings: &Settings, args: ShowArgs) -> Result<(), String> {
    let db = open_database(settings)?;
    {
        let store = open_store(&db, settings)?;
        let version = store
            .get_version(&args.cookbook, &args.version)
            .map_err(|e| e.to_string())?;
        let json = serde_json::to_string_pretty(&version)
            .map_err(|e| format!("Failed to serialize {}: {e}", version.name()))?;
        println!("{json}");
    }
    close_database(db)
}

// ---------------------------------------------------------------------------
// import / export / validate
// ---------------------------------------------------------------------------

/// Reads every document and validates them as one batch.
fn load_and_validate(files: &[PathBuf]) -> Result<Vec<CookbookVersion>, String> {
    let versions = files
        .iter()
        .map(|path| read_document(path).map_err(|e| e.to_string()))
        .collect::<Result<Vec<_>, String>>()?;

    let errors = validate_versions(&versions);
    if !errors.is_empty() {
        for err in &errors {
            eprintln!("  {err}");
        }
        return Err(format!("{} validation error(s)", errors.len()));
    }
    Ok(versions)
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let versions = load_and_validate(&args.files)?;
    let cookbooks: BTreeSet<&str> = versions
        .iter()
        .map(|version| version.cookbook_name.as_str())
        .collect();
    println!(
        "Validated {} document(s) for {} cookbook(s).",
        versions.len(),
        cookbooks.len()
    );
    Ok(())
}

fn run_import(settings: &Settings, args: ImportArgs) -> Result<(), String> {
    let mut versions = load_and_validate(&args.files)?;

    let db = open_database(settings)?;
    {
        let store = open_store(&db, settings)?;
        let store = if args.protect_frozen {
            store.with_policy(RejectFrozenOverwrite)
        } else {
            store
        };
        for version in &mut versions {
            store
                .save_version(version)
                .map_err(|e| format!("Failed to import {}: {e}", version.name()))?;
            println!("Imported {}", version.name());
        }
    }
    println!("Imported {} cookbook version(s).", versions.len());
    close_database(db)
}

fn run_export(settings: &Settings, args: ExportArgs) -> Result<(), String> {
    let db = open_database(settings)?;
    let bundle = {
        let store = open_store(&db, settings)?;
        let names = if args.cookbooks.is_empty() {
            store
                .list_names()
                .map_err(|e| format!("Failed to list cookbooks: {e}"))?
        } else {
            args.cookbooks.clone()
        };

        let mut bundle = VersionBundle::new(chrono::Utc::now().to_rfc3339());
        for name in &names {
            let cookbook = store.load(name).map_err(|e| e.to_string())?;
            let versions = store
                .list_versions(&cookbook.name)
                .map_err(|e| format!("Failed to list versions of '{name}': {e}"))?;
            bundle.versions.extend(versions);
        }
        bundle
    };
    close_database(db)?;

    bundle
        .save(&args.output)
        .map_err(|e| format!("Failed to write '{}': {e}", args.output.display()))?;
    println!(
        "Exported {} version(s) to '{}'.",
        bundle.versions.len(),
        args.output.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

fn run_delete(settings: &Settings, args: DeleteArgs) -> Result<(), String> {
    let (sender, receiver) = mpsc::channel::<CleanupCandidates>();
    let db = open_database(settings)?;
    {
        let store = open_store(&db, settings)?.with_cleanup(sender);
        match &args.version {
            Some(version) => {
                let stored = store
                    .get_version(&args.cookbook, version)
                    .map_err(|e| e.to_string())?;
                store
                    .delete_version(&stored)
                    .map_err(|e| format!("Failed to delete {}: {e}", stored.name()))?;
                println!("Deleted {}", stored.name());
            }
            None => {
                let cookbook = store.load(&args.cookbook).map_err(|e| e.to_string())?;
                store
                    .delete_cookbook(&cookbook)
                    .map_err(|e| format!("Failed to delete cookbook '{}': {e}", cookbook.name))?;
                println!("Deleted cookbook {}", cookbook.name);
            }
        }
    }
    close_database(db)?;

    let hashes: BTreeSet<String> = receiver
        .try_iter()
        .flat_map(|candidates| candidates.hashes)
        .collect();
    println!("Cleanup candidates: {}", hashes.len());
    for hash in hashes {
        println!("  {hash}");
    }
    Ok(())
}
