//! Capitol CLI: harvest, inspect and maintain meeting data.
//!
//! Usage:
//!   capitol harvest [--only KEY...]
//!   capitol events <CODE>
//!   capitol cache <list|clear> [--config path]

use capitol::adapter::{Fetcher, HttpFetcher};
use capitol::cache::{MemoryCache, ResultCache, SqliteCache};
use capitol::config::{CacheBackend, CapitolConfig};
use capitol::enrichment::{EnrichmentRunner, HttpSummarizer};
use capitol::{
    AdapterRegistry, Bill, CapitolApi, Event, EventStore, Harvester, OpenStore, SqliteStore,
};
use chrono::{Days, Local};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "capitol",
    version,
    about = "Government meeting and bill harvester"
)]
struct Cli {
    /// Path to the YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one harvest cycle and print its report as JSON
    Harvest {
        /// Only harvest these registry keys
        #[arg(long, num_args = 1..)]
        only: Vec<String>,
    },
    /// Print upcoming events for a jurisdiction as JSON
    Events {
        /// Jurisdiction code, e.g. NV
        code: String,
    },
    /// List configured sources and their calendars
    Sources,
    /// Inspect or clear the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Summarize bills whose content changed since their last summary
    Enrich {
        /// Summarize at most this many bills
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete events older than the retention window
    Purge {
        /// Retention in days (defaults to the configured value)
        #[arg(long)]
        days: Option<u32>,
    },
    /// Recompute all event fingerprints, merging collisions
    Refingerprint,
    /// JSON schema export
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cache entries with their age and expiry
    List {
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
    },
    /// Drop a jurisdiction's cache entry
    Clear {
        /// Jurisdiction code
        code: String,
    },
}

#[derive(Subcommand)]
enum SchemaAction {
    /// Write event.schema.json and bill.schema.json
    Export {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

/// Everything a command might need, built from config.
struct Runtime {
    config: CapitolConfig,
    store: Arc<SqliteStore>,
    cache: Arc<dyn ResultCache>,
}

impl Runtime {
    fn open(config: CapitolConfig) -> Result<Self, String> {
        let db_path = config.database_path();
        let store = SqliteStore::open(&db_path)
            .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))?;
        let cache: Arc<dyn ResultCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::Sqlite => Arc::new(
                SqliteCache::open(&db_path).map_err(|e| format!("Failed to open cache: {}", e))?,
            ),
        };
        Ok(Self {
            config,
            store: Arc::new(store),
            cache,
        })
    }

    fn registry(&self) -> Result<AdapterRegistry, String> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            HttpFetcher::new(&self.config.fetch_settings())
                .map_err(|e| format!("Failed to build HTTP client: {}", e))?,
        );
        let mut registry = AdapterRegistry::new();
        registry.initialize(&self.config.sources, fetcher);
        Ok(registry)
    }

    fn harvester(&self) -> Result<Harvester, String> {
        Ok(Harvester::new(
            Arc::new(self.registry()?),
            self.store.clone(),
            self.cache.clone(),
            self.config.harvest_settings(),
        ))
    }

    fn api(&self) -> Result<CapitolApi, String> {
        Ok(CapitolApi::new(self.store.clone(), self.cache.clone()).with_harvester(self.harvester()?))
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_harvest(runtime: &Runtime, only: Vec<String>) -> i32 {
    let harvester = match runtime.harvester() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let only = (!only.is_empty()).then_some(only);
    let report = harvester.run_cycle(only.as_deref()).await;
    let code = print_json(&report);
    if code != 0 {
        return code;
    }
    if report.failed().is_empty() {
        0
    } else {
        2
    }
}

async fn cmd_events(runtime: &Runtime, code: &str) -> i32 {
    match runtime.api() {
        Ok(api) => {
            let events: Vec<Event> = api.upcoming_events(code).await;
            print_json(&events)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_sources(runtime: &Runtime) -> i32 {
    let registry = match runtime.registry() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    println!("{:<18}  {:<18}  {}", "KEY", "JURISDICTION", "CALENDARS");
    println!("{}", "-".repeat(72));
    for source in registry.calendar_sources() {
        let names: Vec<&str> = source.calendars.iter().map(|c| c.name.as_str()).collect();
        println!(
            "{:<18}  {:<18}  {}",
            source.key,
            source.jurisdiction,
            names.join(", ")
        );
    }
    0
}

fn cmd_cache_list(runtime: &Runtime, prefix: Option<&str>) -> i32 {
    let entries = match runtime.cache.list_entries(prefix) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if entries.is_empty() {
        println!("No cache entries.");
        return 0;
    }
    println!(
        "{:<28}  {:<25}  {:>10}  {:>8}",
        "KEY", "STORED", "EXPIRES IN", "BYTES"
    );
    println!("{}", "-".repeat(78));
    for entry in entries {
        let expires = if entry.expired {
            "expired".to_string()
        } else {
            format!("{}s", entry.expires_in_secs)
        };
        println!(
            "{:<28}  {:<25}  {:>10}  {:>8}",
            entry.key,
            entry.stored_at.format("%Y-%m-%d %H:%M:%S UTC"),
            expires,
            entry.size_bytes
        );
    }
    0
}

fn cmd_cache_clear(runtime: &Runtime, code: &str) -> i32 {
    let api = CapitolApi::new(runtime.store.clone(), runtime.cache.clone());
    match api.refresh(code) {
        Ok(true) => {
            println!("Cleared cache for '{}'", code.to_uppercase());
            0
        }
        Ok(false) => {
            println!("No cache entry for '{}'", code.to_uppercase());
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_enrich(runtime: &Runtime, limit: Option<usize>) -> i32 {
    let enrichment = &runtime.config.enrichment;
    let summarizer = match HttpSummarizer::from_config(enrichment) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let runner = EnrichmentRunner::new(runtime.store.clone(), Arc::new(summarizer))
        .with_concurrency(enrichment.concurrency)
        .with_timeout(std::time::Duration::from_secs(enrichment.timeout_secs));
    match runner.run(limit).await {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_purge(runtime: &Runtime, days: Option<u32>) -> i32 {
    let days = days.unwrap_or(runtime.config.retention_days);
    let Some(cutoff) = Local::now()
        .date_naive()
        .checked_sub_days(Days::new(u64::from(days)))
    else {
        eprintln!("Error: retention of {} days is out of range", days);
        return 1;
    };
    match runtime.store.purge_events_before(cutoff) {
        Ok(removed) => {
            println!("Purged {} events dated before {}", removed, cutoff);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_refingerprint(runtime: &Runtime) -> i32 {
    match runtime.store.refingerprint_all() {
        Ok(summary) => {
            println!(
                "Examined {} events: {} re-keyed, {} merged",
                summary.examined, summary.updated, summary.merged
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn write_schema(path: &Path, schema: &schemars::Schema) -> Result<(), String> {
    let json = serde_json::to_string_pretty(schema).map_err(|e| e.to_string())?;
    std::fs::write(path, json).map_err(|e| format!("cannot write {}: {}", path.display(), e))
}

fn cmd_schema_export(out_dir: &Path) -> i32 {
    if let Err(e) = std::fs::create_dir_all(out_dir) {
        eprintln!("Error: cannot create {}: {}", out_dir.display(), e);
        return 1;
    }
    let schemas = [
        ("event.schema.json", schemars::schema_for!(Event)),
        ("bill.schema.json", schemars::schema_for!(Bill)),
    ];
    for (name, schema) in &schemas {
        let path = out_dir.join(name);
        if let Err(e) = write_schema(&path, schema) {
            eprintln!("Error: {}", e);
            return 1;
        }
        println!("Wrote {}", path.display());
    }
    0
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Commands::Schema {
        action: SchemaAction::Export { out_dir },
    } = &cli.command
    {
        std::process::exit(cmd_schema_export(out_dir));
    }

    let config = match CapitolConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let runtime = match Runtime::open(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Harvest { only } => cmd_harvest(&runtime, only).await,
        Commands::Events { code } => cmd_events(&runtime, &code).await,
        Commands::Sources => cmd_sources(&runtime),
        Commands::Cache { action } => match action {
            CacheAction::List { prefix } => cmd_cache_list(&runtime, prefix.as_deref()),
            CacheAction::Clear { code } => cmd_cache_clear(&runtime, &code),
        },
        Commands::Enrich { limit } => cmd_enrich(&runtime, limit).await,
        Commands::Purge { days } => cmd_purge(&runtime, days),
        Commands::Refingerprint => cmd_refingerprint(&runtime),
        Commands::Schema { .. } => 0,
    };
    std::process::exit(code);
}
