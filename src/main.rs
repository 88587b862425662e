use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use stockdash::cli::setup::setup;
use stockdash::core::log::init_logging;
use stockdash::core::portfolio::Holding;
use stockdash::core::quote::{Horizon, Sector};
use stockdash::core::screener::ScreenFilters;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display major indices, top movers and market breadth
    Overview,
    /// Display quotes for one or more tickers
    Quote {
        #[arg(required = true)]
        tickers: Vec<String>,
    },
    /// Display price history, indicators and risk metrics for a ticker
    History {
        ticker: String,
        /// One of 6M, 1Y, 2Y, 5Y
        #[arg(long, default_value = "1Y")]
        horizon: Horizon,
    },
    /// Screen the stock universe by valuation, yield, sector and size
    Screen {
        #[arg(long)]
        min_pe: Option<f64>,
        #[arg(long)]
        max_pe: Option<f64>,
        /// Minimum dividend yield in percent, e.g. 2.5
        #[arg(long)]
        min_dividend: Option<f64>,
        #[arg(long)]
        sector: Option<Sector>,
        /// Minimum market cap in billions
        #[arg(long)]
        min_cap: Option<f64>,
        /// Maximum market cap in billions
        #[arg(long)]
        max_cap: Option<f64>,
    },
    /// Simulate a portfolio against the benchmark
    Simulate {
        /// Configured or saved portfolio name
        #[arg(short, long, conflicts_with = "holdings")]
        portfolio: Option<String>,
        /// TICKER=WEIGHT (percent) or TICKER:SHARES, repeatable
        #[arg(long = "holding", value_parser = parse_holding)]
        holdings: Vec<Holding>,
        #[arg(long)]
        capital: Option<f64>,
        #[arg(long, default_value = "1Y")]
        horizon: Horizon,
    },
    /// Display average daily change of sector leaders
    Sectors,
    /// Manage saved portfolios
    #[command(subcommand)]
    Portfolio(PortfolioCommands),
}

#[derive(Subcommand)]
enum PortfolioCommands {
    /// Save a portfolio, replacing one with the same name
    Save {
        name: String,
        /// TICKER=WEIGHT (percent) or TICKER:SHARES, repeatable
        #[arg(long = "holding", required = true, value_parser = parse_holding)]
        holdings: Vec<Holding>,
        #[arg(long)]
        capital: Option<f64>,
    },
    /// List configured and saved portfolios
    List,
    /// Show a portfolio valued at live prices
    Show { name: String },
    /// Delete a saved portfolio
    Delete { name: String },
}

/// Parses `AAPL=40` as a 40% weight and `AAPL:10` as 10 shares.
fn parse_holding(s: &str) -> Result<Holding, String> {
    let (ticker, amount, is_weight) = if let Some((ticker, weight)) = s.split_once('=') {
        (ticker, weight, true)
    } else if let Some((ticker, shares)) = s.split_once(':') {
        (ticker, shares, false)
    } else {
        return Err(format!(
            "expected TICKER=WEIGHT or TICKER:SHARES, got '{s}'"
        ));
    };

    let ticker = ticker.trim();
    if ticker.is_empty() {
        return Err(format!("missing ticker in '{s}'"));
    }
    let amount: f64 = amount
        .trim()
        .parse()
        .map_err(|_| format!("invalid amount in '{s}'"))?;

    Ok(if is_weight {
        Holding::weighted(ticker, amount)
    } else {
        Holding::with_shares(ticker, amount)
    })
}

const BILLION: f64 = 1e9;

impl From<Commands> for stockdash::AppCommand {
    fn from(cmd: Commands) -> stockdash::AppCommand {
        use stockdash::AppCommand;
        match cmd {
            Commands::Overview => AppCommand::Overview,
            Commands::Quote { tickers } => AppCommand::Quote { tickers },
            Commands::History { ticker, horizon } => AppCommand::History { ticker, horizon },
            Commands::Screen {
                min_pe,
                max_pe,
                min_dividend,
                sector,
                min_cap,
                max_cap,
            } => AppCommand::Screen(ScreenFilters {
                min_pe,
                max_pe,
                min_dividend_yield: min_dividend.map(|pct| pct / 100.0),
                sector,
                min_market_cap: min_cap.map(|b| b * BILLION),
                max_market_cap: max_cap.map(|b| b * BILLION),
            }),
            Commands::Simulate {
                portfolio,
                holdings,
                capital,
                horizon,
            } => AppCommand::Simulate(stockdash::SimulateRequest {
                portfolio,
                holdings,
                initial_capital: capital,
                horizon,
            }),
            Commands::Sectors => AppCommand::Sectors,
            Commands::Portfolio(PortfolioCommands::Save {
                name,
                holdings,
                capital,
            }) => AppCommand::PortfolioSave {
                name,
                holdings,
                initial_capital: capital,
            },
            Commands::Portfolio(PortfolioCommands::List) => AppCommand::PortfolioList,
            Commands::Portfolio(PortfolioCommands::Show { name }) => {
                AppCommand::PortfolioShow { name }
            }
            Commands::Portfolio(PortfolioCommands::Delete { name }) => {
                AppCommand::PortfolioDelete { name }
            }
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => stockdash::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockdash::AppCommand;

    #[test]
    fn test_parse_holding() {
        assert_eq!(parse_holding("AAPL=40"), Ok(Holding::weighted("AAPL", 40.0)));
        assert_eq!(
            parse_holding(" xom : 12.5"),
            Ok(Holding::with_shares("xom", 12.5))
        );
        assert!(parse_holding("AAPL").is_err());
        assert!(parse_holding("=40").is_err());
        assert!(parse_holding("AAPL=lots").is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_screen_units_are_converted() {
        let cli = Cli::parse_from([
            "stockdash",
            "screen",
            "--min-dividend",
            "2.5",
            "--min-cap",
            "10",
            "--sector",
            "tech",
        ]);
        let command: AppCommand = cli.command.unwrap().into();
        assert_eq!(
            command,
            AppCommand::Screen(ScreenFilters {
                min_dividend_yield: Some(0.025),
                sector: Some(Sector::Technology),
                min_market_cap: Some(1e10),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_simulate_arguments() {
        let cli = Cli::parse_from([
            "stockdash",
            "simulate",
            "--holding",
            "AAPL=60",
            "--holding",
            "MSFT=40",
            "--horizon",
            "2y",
        ]);
        let command: AppCommand = cli.command.unwrap().into();
        assert_eq!(
            command,
            AppCommand::Simulate(stockdash::SimulateRequest {
                portfolio: None,
                holdings: vec![
                    Holding::weighted("AAPL", 60.0),
                    Holding::weighted("MSFT", 40.0),
                ],
                initial_capital: None,
                horizon: Horizon::TwoYears,
            })
        );
    }
}
