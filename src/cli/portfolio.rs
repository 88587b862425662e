use super::simulate::sectors_table;
use super::ui;
use crate::AppContext;
use crate::core::portfolio::{Holding, Portfolio, PortfolioAnalytics, PortfolioValuation};
use anyhow::{Result, bail};
use comfy_table::Cell;
use tracing::{info, warn};

pub fn holdings_table(portfolio: &Portfolio) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Weight (%)"),
        ui::header_cell("Shares"),
    ]);
    for holding in &portfolio.holdings {
        table.add_row(vec![
            Cell::new(&holding.ticker),
            ui::format_optional_cell(holding.weight, |w| format!("{w:.2}")),
            ui::format_optional_cell(holding.shares, |s| format!("{s}")),
        ]);
    }
    table.to_string()
}

pub fn valuation_table(valuation: &PortfolioValuation) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Sector"),
        ui::header_cell("Shares"),
        ui::header_cell("Price"),
        ui::header_cell("Value"),
        ui::header_cell("Weight"),
    ]);
    for holding in &valuation.holdings {
        table.add_row(vec![
            Cell::new(&holding.ticker),
            Cell::new(holding.sector.to_string()),
            ui::right_cell(format!("{:.4}", holding.shares)),
            ui::right_cell(format!("{:.2}", holding.price)),
            ui::right_cell(format!("{:.2}", holding.value)),
            ui::right_cell(ui::percent(holding.weight)),
        ]);
    }
    table.add_row(vec![
        Cell::new(ui::style_text("Total", ui::StyleType::TotalLabel)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(""),
        ui::right_cell(ui::style_text(
            &format!("{:.2}", valuation.total_value),
            ui::StyleType::TotalValue,
        )),
        ui::right_cell(ui::percent(1.0)),
    ]);
    table.to_string()
}

pub fn portfolios_table(portfolios: &[Portfolio]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Name"),
        ui::header_cell("Holdings"),
        ui::header_cell("Capital"),
        ui::header_cell("Created"),
    ]);
    for portfolio in portfolios {
        let tickers: Vec<&str> = portfolio
            .holdings
            .iter()
            .map(|h| h.ticker.as_str())
            .collect();
        table.add_row(vec![
            Cell::new(&portfolio.name),
            Cell::new(tickers.join(", ")),
            ui::format_optional_cell(portfolio.initial_capital, |c| format!("{c:.2}")),
            Cell::new(portfolio.created_at.format("%Y-%m-%d").to_string()),
        ]);
    }
    table.to_string()
}

pub async fn save(
    context: &AppContext,
    name: &str,
    holdings: Vec<Holding>,
    initial_capital: Option<f64>,
) -> Result<()> {
    let mut portfolio = Portfolio::new(name, holdings);
    portfolio.initial_capital = initial_capital;
    context.portfolios.save(&portfolio).await?;

    info!("Saved portfolio {}", portfolio.name);
    println!(
        "{} {}",
        ui::style_text("Saved portfolio", ui::StyleType::TotalLabel),
        ui::style_text(&portfolio.name, ui::StyleType::TotalValue)
    );
    Ok(())
}

pub async fn list(context: &AppContext) -> Result<()> {
    let saved = context.portfolios.list().await?;
    let configured = &context.config.portfolios;

    if saved.is_empty() && configured.is_empty() {
        println!(
            "{}",
            ui::style_text("No portfolios saved yet", ui::StyleType::Subtle)
        );
        return Ok(());
    }
    if !configured.is_empty() {
        println!("{}\n", ui::style_text("Configured", ui::StyleType::Title));
        println!("{}", portfolios_table(configured));
    }
    if !saved.is_empty() {
        println!("{}\n", ui::style_text("Saved", ui::StyleType::Title));
        println!("{}", portfolios_table(&saved));
    }
    Ok(())
}

pub async fn show(context: &AppContext, name: &str) -> Result<()> {
    let portfolio = match context.config.find_portfolio(name) {
        Some(configured) => configured.clone(),
        None => match context.portfolios.load(name).await? {
            Some(saved) => saved,
            None => bail!("Portfolio not found: {name}"),
        },
    };

    println!("{}\n", ui::style_text(&portfolio.name, ui::StyleType::Title));
    println!("{}", holdings_table(&portfolio));
    if let Some(capital) = portfolio.initial_capital {
        println!(
            "{} {}",
            ui::style_text("Initial capital:", ui::StyleType::TotalLabel),
            ui::style_text(&format!("{capital:.2}"), ui::StyleType::TotalValue)
        );
    }

    let analytics = PortfolioAnalytics::new(context.market.clone(), &context.config.analytics);
    let pb = ui::new_progress_bar(1, true);
    pb.set_message("Fetching quotes...");
    let valuation = analytics.value_portfolio(&portfolio).await;
    pb.inc(1);
    pb.finish_and_clear();

    let valuation = match valuation {
        Ok(valuation) => valuation,
        Err(e) => {
            warn!("Could not value {}: {}", portfolio.name, e);
            println!("\n{}", ui::style_text(&e.to_string(), ui::StyleType::Error));
            return Ok(());
        }
    };
    println!("\n{}\n", ui::style_text("Current Value", ui::StyleType::Title));
    println!("{}", valuation_table(&valuation));
    if let Some(total_return) = valuation.total_return {
        println!(
            "{} {}",
            ui::style_text("Return on capital:", ui::StyleType::TotalLabel),
            ui::percent(total_return)
        );
    }
    if !valuation.skipped.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!("Not priced: {}", valuation.skipped.join(", ")),
                ui::StyleType::Subtle
            )
        );
    }
    println!("\n{}\n", ui::style_text("Sectors", ui::StyleType::Title));
    println!("{}", sectors_table(&valuation.sectors));
    Ok(())
}

pub async fn delete(context: &AppContext, name: &str) -> Result<()> {
    if !context.portfolios.delete(name).await? {
        bail!("Portfolio not found: {name}");
    }
    info!("Deleted portfolio {name}");
    println!(
        "{} {}",
        ui::style_text("Deleted portfolio", ui::StyleType::TotalLabel),
        name
    );
    Ok(())
}
