use super::ui;
use crate::core::analytics::MetricSet;
use crate::core::portfolio::{Portfolio, PortfolioAnalytics, PortfolioResult};
use crate::core::quote::Sector;
use crate::{AppContext, SimulateRequest};
use anyhow::{Result, anyhow, bail};
use comfy_table::Cell;
use tracing::{debug, info};

/// Picks the portfolio to simulate: a configured one, then a saved one, then
/// the ad-hoc holdings of the request.
async fn resolve_portfolio(context: &AppContext, request: &SimulateRequest) -> Result<Portfolio> {
    let mut portfolio = match &request.portfolio {
        Some(name) => match context.config.find_portfolio(name) {
            Some(configured) => {
                debug!("Using configured portfolio {}", configured.name);
                configured.clone()
            }
            None => context
                .portfolios
                .load(name)
                .await?
                .ok_or_else(|| anyhow!("Portfolio not found: {name}"))?,
        },
        None if request.holdings.is_empty() => {
            bail!("Specify a portfolio name or at least one holding")
        }
        None => Portfolio::new("Ad hoc", request.holdings.clone()),
    };

    if request.initial_capital.is_some() {
        portfolio.initial_capital = request.initial_capital;
    }
    Ok(portfolio)
}

fn metric_cells(metrics: &MetricSet) -> [Cell; 6] {
    [
        ui::fraction_change_cell(metrics.cumulative_return),
        ui::fraction_change_cell(metrics.annualized_return),
        ui::format_optional_cell(metrics.cagr, ui::percent),
        ui::right_cell(ui::percent(metrics.annualized_volatility)),
        ui::right_cell(format!("{:.2}", metrics.sharpe_ratio)),
        ui::right_cell(ui::percent(metrics.max_drawdown)),
    ]
}

pub fn metrics_table(result: &PortfolioResult) -> String {
    let mut table = ui::new_styled_table();
    let mut header = vec![ui::header_cell("Metric"), ui::header_cell("Portfolio")];
    if let Some(benchmark) = &result.benchmark {
        header.push(ui::header_cell(&benchmark.ticker));
    }
    table.set_header(header);

    let labels = [
        "Cumulative return",
        "Annualized return",
        "CAGR",
        "Annualized volatility",
        "Sharpe ratio",
        "Max drawdown",
    ];
    let portfolio = metric_cells(&result.metrics);
    let benchmark = result.benchmark.as_ref().map(|b| metric_cells(&b.metrics));
    for (i, (label, cell)) in labels.into_iter().zip(portfolio).enumerate() {
        let mut row = vec![Cell::new(label), cell];
        if let Some(cells) = &benchmark {
            row.push(cells[i].clone());
        }
        table.add_row(row);
    }
    table.to_string()
}

pub fn allocations_table(result: &PortfolioResult) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Weight"),
        ui::header_cell("Capital"),
        ui::header_cell("First Close"),
        ui::header_cell("Last Close"),
        ui::header_cell("Return"),
    ]);
    for allocation in &result.allocations {
        table.add_row(vec![
            Cell::new(&allocation.ticker),
            ui::right_cell(ui::percent(allocation.weight)),
            ui::right_cell(format!("{:.2}", allocation.capital)),
            ui::right_cell(format!("{:.2}", allocation.first_close)),
            ui::right_cell(format!("{:.2}", allocation.last_close)),
            ui::fraction_change_cell(allocation.cumulative_return),
        ]);
    }
    table.to_string()
}

pub fn sectors_table(sectors: &[(Sector, f64)]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Sector"), ui::header_cell("Share")]);
    for (sector, share) in sectors {
        table.add_row(vec![
            Cell::new(sector.to_string()),
            ui::right_cell(ui::percent(*share)),
        ]);
    }
    table.to_string()
}

pub fn value_summary(result: &PortfolioResult) -> String {
    let mut lines = vec![format!(
        "{} {:.2}  ->  {}",
        ui::style_text("Value:", ui::StyleType::TotalLabel),
        result.initial_capital,
        ui::style_text(
            &format!("{:.2}", result.final_value),
            ui::StyleType::TotalValue
        )
    )];
    if let Some(benchmark) = &result.benchmark {
        lines.push(format!(
            "{} {}  {} {:.2}  {} {:.2}",
            ui::style_text("Outperformance:", ui::StyleType::TotalLabel),
            ui::percent(benchmark.outperformance),
            ui::style_text("Beta:", ui::StyleType::TotalLabel),
            benchmark.beta,
            ui::style_text("Correlation:", ui::StyleType::TotalLabel),
            benchmark.correlation,
        ));
    }
    lines.join("\n")
}

pub async fn run(context: &AppContext, request: &SimulateRequest) -> Result<()> {
    let portfolio = resolve_portfolio(context, request).await?;
    portfolio.validate()?;
    info!(
        "Simulating {} with {} holdings over {}",
        portfolio.name,
        portfolio.holdings.len(),
        request.horizon
    );

    let analytics = PortfolioAnalytics::new(context.market.clone(), &context.config.analytics);
    let pb = ui::new_progress_bar(2, true);
    pb.set_message("Simulating portfolio...");
    let simulated = analytics
        .simulate_portfolio(&portfolio, request.horizon)
        .await;
    pb.inc(1);
    let result = match simulated {
        Ok(result) => result,
        Err(e) => {
            pb.finish_and_clear();
            return Err(e.into());
        }
    };
    let sectors = analytics.sector_allocation(&result.allocations).await;
    pb.inc(1);
    pb.finish_and_clear();

    println!(
        "{}\n",
        ui::style_text(
            &format!(
                "{} over {} ({} to {})",
                portfolio.name,
                result.horizon,
                result.dates.first().map_or_else(String::new, |d| d.to_string()),
                result.dates.last().map_or_else(String::new, |d| d.to_string()),
            ),
            ui::StyleType::Title
        )
    );
    println!("{}", value_summary(&result));
    println!("{}", metrics_table(&result));
    if result.benchmark.is_none() {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "Benchmark {} unavailable for this period",
                    context.config.analytics.benchmark
                ),
                ui::StyleType::Subtle
            )
        );
    }

    ui::print_separator();
    println!("{}", allocations_table(&result));
    println!("{}", sectors_table(&sectors));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::portfolio::{BenchmarkComparison, HoldingAllocation};
    use crate::core::quote::Horizon;

    fn metrics(cumulative: f64) -> MetricSet {
        MetricSet {
            cumulative_return: cumulative,
            annualized_return: 0.08,
            annualized_volatility: 0.2,
            sharpe_ratio: 0.3,
            max_drawdown: 0.12,
            cagr: None,
        }
    }

    fn result(benchmark: Option<BenchmarkComparison>) -> PortfolioResult {
        PortfolioResult {
            horizon: Horizon::OneYear,
            initial_capital: 10_000.0,
            dates: vec![],
            value_series: vec![10_000.0, 11_500.0],
            cumulative_returns: vec![0.0, 0.15],
            final_value: 11_500.0,
            metrics: metrics(0.15),
            benchmark,
            allocations: vec![HoldingAllocation {
                ticker: "AAPL".to_string(),
                capital: 10_000.0,
                weight: 1.0,
                first_close: 100.0,
                last_close: 115.0,
                cumulative_return: 0.15,
            }],
        }
    }

    #[test]
    fn test_metrics_table_with_benchmark_column() {
        let comparison = BenchmarkComparison {
            ticker: "^GSPC".to_string(),
            metrics: metrics(0.10),
            beta: 1.1,
            correlation: 0.9,
            outperformance: 0.05,
            aligned_points: 250,
        };
        let result = result(Some(comparison));
        let output = metrics_table(&result);
        assert!(output.contains("^GSPC"));
        assert!(output.contains("+15.00%"));
        assert!(output.contains("+10.00%"));

        let summary = console::strip_ansi_codes(&value_summary(&result)).to_string();
        assert!(summary.contains("10000.00  ->  11500.00"));
        assert!(summary.contains("Outperformance: 5.00%"));
    }

    #[test]
    fn test_metrics_table_without_benchmark() {
        let output = metrics_table(&result(None));
        assert!(!output.contains("^GSPC"));
        assert!(output.contains("N/A"));
    }

    #[test]
    fn test_allocations_and_sectors_tables() {
        let output = allocations_table(&result(None));
        assert!(output.contains("AAPL"));
        assert!(output.contains("100.00%"));

        let output = sectors_table(&[(Sector::Technology, 0.6), (Sector::Energy, 0.4)]);
        assert!(output.contains("Technology"));
        assert!(output.contains("40.00%"));
    }
}
