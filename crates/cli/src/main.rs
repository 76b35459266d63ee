use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use tripkit_core::{AccommodationType, TransportMethod, TripPurpose, TripRequest};
use tripkit_engine::ChecklistEngine;
use tripkit_observability::{init_tracing, AppMetrics};
use tripkit_rules::RuleSet;
use tripkit_storage::{ChecklistRepository, Store};
use tripkit_weather::{ForecastProvider, OpenWeatherClient};

#[derive(Debug, Parser)]
#[command(name = "tripkit")]
#[command(about = "Trip packing checklist generator")]
struct Cli {
    /// Rule set TOML; falls back to TRIPKIT_RULES_PATH, then the builtin set.
    #[arg(long)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a checklist and persist it.
    Generate {
        #[arg(long)]
        destination: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        #[arg(long, default_value = "leisure")]
        purpose: String,
        #[arg(long)]
        transport: Option<String>,
        #[arg(long)]
        accommodation: Option<String>,
        #[arg(long, default_value = "local")]
        user: String,
        /// Emit JSON instead of markdown.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print a stored checklist.
    Show {
        id: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Toggle an item's checked state by name.
    Check { id: String, item: String },
    /// List stored checklists for a user.
    List {
        #[arg(long, default_value = "local")]
        user: String,
    },
    /// Packing advice for a transport method.
    Recommend { method: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("tripkit_cli");
    let cli = Cli::parse();

    let rule_set = load_rule_set(cli.rules.as_deref())?;
    let store = open_store().await?;

    match cli.command {
        Command::Generate {
            destination,
            start,
            end,
            purpose,
            transport,
            accommodation,
            user,
            json,
        } => {
            let purpose = TripPurpose::parse(&purpose)
                .ok_or_else(|| anyhow!("invalid --purpose value: {purpose}"))?;
            let transport = transport
                .as_deref()
                .map(|value| {
                    TransportMethod::parse(value)
                        .ok_or_else(|| anyhow!("invalid --transport value: {value}"))
                })
                .transpose()?;
            let accommodation = accommodation
                .as_deref()
                .map(|value| {
                    AccommodationType::parse(value)
                        .ok_or_else(|| anyhow!("invalid --accommodation value: {value}"))
                })
                .transpose()?;

            let request = TripRequest::new(destination, start, end, purpose, transport, accommodation)
                .context("invalid trip request")?;

            let engine = build_engine(rule_set);
            let checklist = engine.generate(request, &user).await?;
            let reference = store.save(&checklist).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&checklist)?);
            } else {
                println!("{}", checklist.to_markdown());
            }
            eprintln!("saved as {reference}");
        }
        Command::Show { id, json } => {
            let checklist = store
                .fetch(&id)
                .await?
                .ok_or_else(|| anyhow!("no checklist with id {id}"))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&checklist)?);
            } else {
                println!("{}", checklist.to_markdown());
            }
        }
        Command::Check { id, item } => {
            let checklist = store
                .toggle_item(&id, &item)
                .await?
                .ok_or_else(|| anyhow!("no checklist {id} with item {item:?}"))?;
            let toggled = checklist
                .items
                .iter()
                .find(|entry| entry.name == item)
                .map(|entry| entry.checked)
                .unwrap_or(false);
            println!(
                "{} -> {} ({:.0}% done)",
                item,
                if toggled { "checked" } else { "unchecked" },
                checklist.completion_percentage()
            );
        }
        Command::List { user } => {
            let checklists = store.list_for_user(&user).await?;
            if checklists.is_empty() {
                println!("no checklists stored for {user}");
            }
            for checklist in checklists {
                println!(
                    "{}  {}  {} -> {}  ({} items)",
                    checklist.id,
                    checklist.request.destination,
                    checklist.request.start_date,
                    checklist.request.end_date,
                    checklist.items.len()
                );
            }
        }
        Command::Recommend { method } => {
            let method = TransportMethod::parse(&method)
                .ok_or_else(|| anyhow!("invalid transport method: {method}"))?;
            let engine = build_engine(rule_set);
            for line in engine.recommendations(Some(method)) {
                println!("- {line}");
            }
        }
    }

    Ok(())
}

fn load_rule_set(path: Option<&std::path::Path>) -> Result<Arc<RuleSet>> {
    if let Some(path) = path {
        return Ok(RuleSet::from_path(path)?);
    }
    if let Ok(path) = env::var("TRIPKIT_RULES_PATH") {
        return Ok(RuleSet::from_path(&path)?);
    }
    Ok(RuleSet::builtin()?)
}

fn build_engine(rule_set: Arc<RuleSet>) -> ChecklistEngine {
    let forecast: Option<Arc<dyn ForecastProvider>> =
        OpenWeatherClient::from_env().map(|client| Arc::new(client) as Arc<dyn ForecastProvider>);
    ChecklistEngine::with_default_rules(rule_set, AppMetrics::shared(), forecast)
}

async fn open_store() -> Result<Store> {
    let store = if let Ok(database_url) = env::var("TRIPKIT_DATABASE_URL") {
        Store::sqlite(&database_url).await?
    } else {
        Store::memory()
    };
    Ok(store)
}
