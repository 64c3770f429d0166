use clap::{Parser, Subcommand};
use log::{error, info};
use rust_manga_mapper::logging::RequestLog;
use rust_manga_mapper::orchestrator;
use rust_manga_mapper::{AniListCatalog, Aggregator, Config, ProviderRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Map catalog entries onto manga sites and pull chapter pages
#[derive(Parser, Debug)]
#[clap(name = "rust_manga_mapper", version)]
struct Cli {
    /// Configuration file (defaults to ./config.toml when present)
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a catalog id to a listing and its chapters
    Map {
        catalog_id: i64,
        provider: String,
    },

    /// Search a provider directly
    Search {
        provider: String,
        title: String,
        #[clap(long)]
        page: Option<u32>,
    },

    /// Show listing details and chapters
    Info { provider: String, id: String },

    /// List the page images of a chapter
    Pages { provider: String, chapter: String },

    /// List registered providers
    Providers,
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{}", s),
        Err(e) => error!("Failed to serialize output: {}", e),
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => match Config::load_from(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("{}", e);
                std::process::exit(2);
            }
        },
        None => Config::load(),
    };

    let registry = match ProviderRegistry::from_config(&config) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to build HTTP clients: {}", e);
            std::process::exit(1);
        }
    };
    info!("Providers: {}", registry.ids().join(", "));

    if let Err(message) = run(cli.command, &config, registry).await {
        error!("{}", message);
        std::process::exit(1);
    }
}

async fn run(command: Command, config: &Config, registry: ProviderRegistry) -> Result<(), String> {
    let lookup = |name: &str| {
        registry
            .get(name)
            .ok_or_else(|| format!("unknown provider: {}", name))
    };

    match command {
        Command::Map {
            catalog_id,
            provider,
        } => {
            let catalog = AniListCatalog::new(&config.catalog.api_url, config.http.client_config())
                .map_err(|e| e.to_string())?;
            let aggregator = Aggregator::new(Arc::new(catalog), registry.clone());
            let result = aggregator
                .map_listing(catalog_id, &provider)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&result);
        }
        Command::Search {
            provider,
            title,
            page,
        } => {
            let p = lookup(&provider)?;
            let log = RequestLog::for_provider(p.id());
            let results = p.search(&title, page, &log).await.map_err(|e| e.to_string())?;
            print_json(&results);
        }
        Command::Info { provider, id } => {
            let p = lookup(&provider)?;
            let log = RequestLog::for_provider(p.id());
            let details = p.get_manga_info(&id, &log).await.map_err(|e| e.to_string())?;
            print_json(&details);
        }
        Command::Pages { provider, chapter } => {
            let pages = orchestrator::fetch_pages(&registry, &provider, &chapter)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&pages);
        }
        Command::Providers => {
            for id in registry.ids() {
                if let Some(p) = registry.get(id) {
                    println!("{:<12} {:<14} {} (threshold {})", id, p.name(), p.base_url(), p.match_threshold());
                }
            }
        }
    }
    Ok(())
}
