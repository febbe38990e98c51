//! Command-line front end for browsing and installing add-on content.

use clap::{Parser, Subcommand, ValueEnum};
use knewstuff_engine::{DownloadEvent, DownloadManager, EngineOptions};
use knewstuff_feed::models::{Entry, SortMode, Status};
use miette::miette;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "khotnewstuff")]
#[command(version, about = "Get hot new stuff for an application", long_about = None)]
struct Args {
    /// Name of the application configuration (e.g. "wallpaper.knsrc"), or a
    /// path to one
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search all providers (the default)
    Search {
        term: Option<String>,
        #[arg(long, value_enum, default_value = "rating")]
        order: Order,
        #[arg(long, default_value = "0")]
        page: u32,
        #[arg(long, default_value = "100")]
        page_size: u32,
    },
    /// List installed entries with a newer version available
    Updates,
    /// List installed entries
    Installed,
    /// Install an entry by its unique ID
    Install { id: String },
    /// Remove an installed entry by its unique ID
    Uninstall { id: String },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    Newest,
    Rating,
    Alphabetical,
    Downloads,
}

impl From<Order> for SortMode {
    fn from(order: Order) -> Self {
        match order {
            Order::Newest => SortMode::Newest,
            Order::Rating => SortMode::Rating,
            Order::Alphabetical => SortMode::Alphabetical,
            Order::Downloads => SortMode::Downloads,
        }
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)))
        .init();

    let mut manager =
        DownloadManager::new(&args.config, EngineOptions::default()).await.map_err(|err| miette!("{err:?}"))?;
    let command = args.command.unwrap_or(Command::Search {
        term: None,
        order: Order::Rating,
        page: 0,
        page_size: 100,
    });
    let outcome = run(&mut manager, command).await;
    manager.close().await.map_err(|err| miette!("{err:?}"))?;
    outcome
}

async fn run(manager: &mut DownloadManager, command: Command) -> miette::Result<()> {
    match command {
        Command::Search { term, order, page, page_size } => {
            manager.set_search_order(order.into());
            if let Some(term) = term {
                manager.set_search_term(term);
            }
            manager.search(page, page_size);
            print_entries(&collect(manager, false).await?);
        },
        Command::Updates => {
            manager.check_for_updates();
            print_entries(&collect(manager, true).await?);
        },
        Command::Installed => {
            manager.check_for_installed();
            print_entries(&collect(manager, false).await?);
        },
        Command::Install { id } => {
            manager.set_search_term(id.clone());
            manager.search(0, 100);
            let entry = find(collect(manager, false).await?, &id)?;
            manager.install_entry(entry);
            let installed = wait_for(manager, &id, Status::Installed).await?;
            for file in &installed.installed_files {
                println!("{file}");
            }
        },
        Command::Uninstall { id } => {
            manager.check_for_installed();
            let entry = find(collect(manager, false).await?, &id)?;
            manager.uninstall_entry(entry);
            wait_for(manager, &id, Status::Deleted).await?;
            println!("Removed {id}");
        },
    }
    Ok(())
}

fn find(entries: Vec<Entry>, id: &str) -> miette::Result<Entry> {
    entries
        .into_iter()
        .find(|entry| entry.unique_id == id)
        .ok_or_else(|| miette!("no entry with ID \"{id}\" was found"))
}

/// Gather results until the engine goes idle after having been busy, or
/// reports that no provider is usable.
async fn collect(manager: &mut DownloadManager, updates: bool) -> miette::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    let mut busy = false;
    while let Some(event) = manager.next_event().await {
        match event {
            DownloadEvent::ProvidersUnavailable => return Err(miette!("no usable providers are available")),
            DownloadEvent::SearchResult(found) if !updates => entries.extend(found),
            DownloadEvent::UpdatesAvailable(found) if updates => entries.extend(found),
            DownloadEvent::ErrorFound(message) => eprintln!("error: {message}"),
            DownloadEvent::Busy(message) => {
                debug!(%message, "busy");
                // Discovery happens before the request is sent.
                busy |= manager.is_ready();
            },
            DownloadEvent::Idle if busy => return Ok(entries),
            _ => {},
        }
    }
    Err(miette!("the engine stopped unexpectedly"))
}

async fn wait_for(manager: &mut DownloadManager, id: &str, status: Status) -> miette::Result<Entry> {
    while let Some(event) = manager.next_event().await {
        match event {
            DownloadEvent::EntryStatusChanged(entry) if entry.unique_id == id && entry.status == status => {
                return Ok(entry);
            },
            DownloadEvent::ErrorFound(message) => return Err(miette!("{message}")),
            _ => {},
        }
    }
    Err(miette!("the engine stopped unexpectedly"))
}

fn print_entries(entries: &[Entry]) {
    for entry in entries {
        let version = if entry.update_version.is_empty() {
            entry.version.clone()
        } else {
            format!("{} -> {}", entry.version, entry.update_version)
        };
        println!("{:<12} {:<32} {:<16} {}", entry.status.as_str(), entry.unique_id, version, entry.name);
    }
}
