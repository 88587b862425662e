pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::market::MarketData;
use crate::core::portfolio::Holding;
use crate::core::quote::Horizon;
use crate::core::screener::ScreenFilters;
use crate::providers::yahoo_finance::YahooFinanceProvider;
use crate::store::KeyValueStore;
use crate::store::portfolio::{PORTFOLIO_COLLECTION, PortfolioStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

const HISTORY_COLLECTION: &str = "history";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulateRequest {
    /// Saved or configured portfolio to simulate, instead of `holdings`.
    pub portfolio: Option<String>,
    pub holdings: Vec<Holding>,
    pub initial_capital: Option<f64>,
    pub horizon: Horizon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Overview,
    Quote {
        tickers: Vec<String>,
    },
    History {
        ticker: String,
        horizon: Horizon,
    },
    Screen(ScreenFilters),
    Simulate(SimulateRequest),
    Sectors,
    PortfolioSave {
        name: String,
        holdings: Vec<Holding>,
        initial_capital: Option<f64>,
    },
    PortfolioList,
    PortfolioShow {
        name: String,
    },
    PortfolioDelete {
        name: String,
    },
}

/// Services shared by every command, built once from the config.
pub struct AppContext {
    pub config: AppConfig,
    pub market: Arc<MarketData>,
    pub portfolios: PortfolioStore,
}

impl AppContext {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let data_path = config.default_data_path()?;
        let store = KeyValueStore::open(&data_path)
            .with_context(|| format!("Failed to open data directory: {}", data_path.display()))?;

        let provider = YahooFinanceProvider::new(
            &config.providers.yahoo.base_url,
            config.providers.request_timeout(),
        );
        let market = MarketData::new(Arc::new(provider), &config.cache)
            .with_saved_history(store.collection(HISTORY_COLLECTION)?);
        let portfolios = PortfolioStore::new(store.collection(PORTFOLIO_COLLECTION)?);

        Ok(AppContext {
            config,
            market: Arc::new(market),
            portfolios,
        })
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("stockdash starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let context = AppContext::from_config(config)?;
    match command {
        AppCommand::Overview => cli::overview::run(&context).await,
        AppCommand::Quote { tickers } => cli::quote::run(&context, &tickers).await,
        AppCommand::History { ticker, horizon } => {
            cli::history::run(&context, &ticker, horizon).await
        }
        AppCommand::Screen(filters) => cli::screen::run(&context, &filters).await,
        AppCommand::Simulate(request) => cli::simulate::run(&context, &request).await,
        AppCommand::Sectors => cli::sectors::run(&context).await,
        AppCommand::PortfolioSave {
            name,
            holdings,
            initial_capital,
        } => cli::portfolio::save(&context, &name, holdings, initial_capital).await,
        AppCommand::PortfolioList => cli::portfolio::list(&context).await,
        AppCommand::PortfolioShow { name } => cli::portfolio::show(&context, &name).await,
        AppCommand::PortfolioDelete { name } => cli::portfolio::delete(&context, &name).await,
    }
}
