//! growth-tracker: keep a table of tickers valued on projected revenue growth.
//!
//! Usage:
//!   growth-tracker list
//!   growth-tracker add NVDA --growth 30,20,15
//!   growth-tracker refresh
//!   growth-tracker delete NVDA
//!   growth-tracker set-growth NVDA 25,20
//!   growth-tracker export valuations.csv

mod config;
mod output;

use config::TrackerConfig;
use polygon_client::PolygonClient;
use reconciliation::ReconciliationController;
use row_store::{SheetRowStore, SqliteSheet};
use std::path::PathBuf;
use valuation_core::{GrowthRates, TrackerError};

const USAGE: &str = "\
Usage:
  growth-tracker list                           Show the tracked tickers
  growth-tracker add <SYMBOL> [--growth RATES]  Start tracking a ticker
  growth-tracker refresh                        Re-fetch and re-value every ticker
  growth-tracker delete <SYMBOL>                Stop tracking a ticker
  growth-tracker set-growth <SYMBOL> <RATES>    Change growth assumptions (e.g. 20,15,10)
  growth-tracker export <PATH>                  Write the rounded table as CSV";

#[derive(Debug, Clone, PartialEq)]
enum Command {
    List,
    Add { symbol: String, growth: Option<GrowthRates> },
    Refresh,
    Delete { symbol: String },
    SetGrowth { symbol: String, growth: GrowthRates },
    Export { path: PathBuf },
}

impl Command {
    fn needs_provider(&self) -> bool {
        matches!(self, Command::Add { .. } | Command::Refresh)
    }
}

fn parse_args(args: &[String]) -> Result<Command, TrackerError> {
    let missing = |what: &str| TrackerError::InvalidInput(format!("missing {}", what));

    let command = args.first().map(String::as_str).ok_or_else(|| missing("command"))?;
    let rest = &args[1..];

    let parsed = match command {
        "list" => Command::List,
        "refresh" => Command::Refresh,
        "add" => {
            let symbol = rest.first().ok_or_else(|| missing("symbol"))?.clone();
            let growth = match rest.iter().position(|a| a == "--growth") {
                Some(i) => Some(rest.get(i + 1).ok_or_else(|| missing("growth rates"))?.parse::<GrowthRates>()?),
                None => None,
            };
            Command::Add { symbol, growth }
        }
        "delete" => Command::Delete {
            symbol: rest.first().ok_or_else(|| missing("symbol"))?.clone(),
        },
        "set-growth" => Command::SetGrowth {
            symbol: rest.first().ok_or_else(|| missing("symbol"))?.clone(),
            growth: rest.get(1).ok_or_else(|| missing("growth rates"))?.parse::<GrowthRates>()?,
        },
        "export" => Command::Export {
            path: PathBuf::from(rest.first().ok_or_else(|| missing("output path"))?),
        },
        other => return Err(TrackerError::InvalidInput(format!("unknown command '{}'", other))),
    };
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracker_cli=info,reconciliation=info,polygon_client=warn".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = TrackerConfig::from_env()?;
    let api_key = if command.needs_provider() {
        config.require_api_key()?.to_string()
    } else {
        config.polygon_api_key.clone().unwrap_or_default()
    };
    let provider = PolygonClient::with_rate_limit(api_key, config.polygon_rate_limit);

    tracing::debug!("Opening sheet '{}' at {}", config.sheet, config.db_url);
    let sheet = SqliteSheet::connect(&config.db_url, &config.sheet).await?;
    let store = SheetRowStore::new(sheet).with_default_growth(config.controller.default_growth.clone());
    let controller = ReconciliationController::with_config(provider, store, config.controller.clone());

    match command {
        Command::List => {
            let records = controller.list().await?;
            print!("{}", output::render_table(&records));
        }
        Command::Add { symbol, growth } => {
            let outcome = controller.add_ticker(&symbol, growth).await?;
            println!("{}", output::render_add(&outcome));
        }
        Command::Refresh => {
            let summary = controller.refresh_all().await?;
            println!("{}", output::render_summary(&summary));
        }
        Command::Delete { symbol } => {
            controller.delete_ticker(&symbol).await?;
            println!("Deleted {}", symbol.trim().to_uppercase());
        }
        Command::SetGrowth { symbol, growth } => {
            let record = controller.set_growth(&symbol, growth).await?;
            print!("{}", output::render_table(std::slice::from_ref(&record)));
        }
        Command::Export { path } => {
            let records = controller.list().await?;
            let file = std::fs::File::create(&path)?;
            output::write_csv(&records, file)?;
            tracing::info!("Exported {} rows to {}", records.len(), path.display());
        }
    }

    Ok(())
}
