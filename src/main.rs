use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use s3_saveable::{
    ColumnMap, LifecycleBinder, PolicyOverrides, Record, RecordRepository, UniquenessScope,
    config::{AppConfig, ConfigKeys, EnvConfigSource, GlobalArgs, StoreSettings},
    index::SqliteIndex,
    models::policy::Acl,
    store::DiskObjectStore,
};
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, path::Path, path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload, move and delete stored files tracked in a local database")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the records table and exit
    Migrate,
    /// Upload a local file and insert a record for it
    Put {
        file: PathBuf,
        /// Directory prefix for the remote key
        #[arg(long)]
        dir: Option<String>,
        /// Explicit base filename (without extension)
        #[arg(long)]
        name: Option<String>,
        /// Fail instead of generating a random name
        #[arg(long)]
        no_random: bool,
        #[arg(long)]
        force_extension: Option<String>,
        #[arg(long)]
        ignore_original_extension: bool,
        #[arg(long)]
        no_guess: bool,
        /// none, local, remote or both
        #[arg(long)]
        unique: Option<UniquenessScope>,
        #[arg(long)]
        acl: Option<Acl>,
        /// Remove the local file after a successful upload
        #[arg(long)]
        delete_local: bool,
    },
    /// Move a record's object to a new key
    Move { id: i64, path: String },
    /// Delete a record and its object
    Delete { id: i64 },
    /// Download a record's object
    Download {
        id: i64,
        dest: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Print a record's public URL
    Url {
        id: i64,
        #[arg(long)]
        https: bool,
    },
    /// Print a record
    Show { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::from_env_and_args(&cli.global)?;
    tracing::debug!("Starting s3-saveable with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if !db_path.contains(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        if let Err(e) = fs::OpenOptions::new().create(true).append(true).open(db_path) {
            tracing::warn!("Failed to open database file manually: {}", e);
        }
    }

    let db = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(cfg.max_connections)
            .connect(&cfg.database_url)
            .await
            .with_context(|| format!("connecting to {}", cfg.database_url))?,
    );
    let index = SqliteIndex::new(db, cfg.table.clone(), ColumnMap::default())?;

    // --- Handle migration mode ---
    let command = match cli.command {
        Command::Migrate => {
            index.run_migrations().await?;
            tracing::info!("Database migration complete.");
            return Ok(()); // exit after migration
        }
        command => command,
    };

    let settings = StoreSettings::resolve(&EnvConfigSource, &ConfigKeys::default())?;
    tracing::debug!("Using store settings {:?}", settings);
    let store = Arc::new(DiskObjectStore::new(&cfg.storage_dir));
    let binder = LifecycleBinder::new(store, Arc::new(index.clone()), settings);
    let repo = RecordRepository::new(index, binder);

    match command {
        Command::Migrate => {}
        Command::Put {
            file,
            dir,
            name,
            no_random,
            force_extension,
            ignore_original_extension,
            no_guess,
            unique,
            acl,
            delete_local,
        } => {
            let overrides = PolicyOverrides {
                dir,
                base_filename: name,
                generate_random: no_random.then_some(false),
                force_extension,
                ignore_original_extension: ignore_original_extension.then_some(true),
                guess_extension: no_guess.then_some(false),
                uniqueness: unique,
                acl,
                delete_local_on_save: delete_local.then_some(true),
            };
            let mut record = Record::new();
            record.attach_local_file(&file, overrides).await?;
            repo.insert(&mut record).await?;
            print_record(&record)?;
        }
        Command::Move { id, path } => {
            let mut record = load(&repo, id).await?;
            record.set_path(path);
            repo.update(&mut record).await?;
            print_record(&record)?;
        }
        Command::Delete { id } => {
            let mut record = load(&repo, id).await?;
            repo.delete(&mut record).await?;
            print_record(&record)?;
        }
        Command::Download {
            id,
            dest,
            overwrite,
        } => {
            let record = load(&repo, id).await?;
            repo.binder().download_to(&record, &dest, overwrite).await?;
            tracing::info!("Downloaded record {} to {}", id, dest.display());
        }
        Command::Url { id, https } => {
            let record = load(&repo, id).await?;
            println!("{}", repo.binder().public_url(&record, https));
        }
        Command::Show { id } => print_record(&load(&repo, id).await?)?,
    }

    Ok(())
}

async fn load(repo: &RecordRepository, id: i64) -> Result<Record> {
    repo.find(id)
        .await?
        .with_context(|| format!("no record with id {}", id))
}

fn print_record(record: &Record) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}
