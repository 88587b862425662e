use super::ui;
use crate::AppContext;
use crate::core::quote::Quote;
use crate::core::screener::{ScreenFilters, Screener};
use anyhow::Result;
use comfy_table::Cell;
use tracing::info;

/// One line describing the active filters, e.g. `P/E <= 25, Sector = Energy`.
pub fn describe_filters(filters: &ScreenFilters) -> String {
    let mut parts = Vec::new();
    if let Some(min) = filters.min_pe {
        parts.push(format!("P/E >= {min}"));
    }
    if let Some(max) = filters.max_pe {
        parts.push(format!("P/E <= {max}"));
    }
    if let Some(min) = filters.min_dividend_yield {
        parts.push(format!("Dividend yield >= {}", ui::percent(min)));
    }
    if let Some(sector) = filters.sector {
        parts.push(format!("Sector = {sector}"));
    }
    if let Some(min) = filters.min_market_cap {
        parts.push(format!("Market cap >= {}", ui::format_large_number(min)));
    }
    if let Some(max) = filters.max_market_cap {
        parts.push(format!("Market cap <= {}", ui::format_large_number(max)));
    }

    if parts.is_empty() {
        "no filters".to_string()
    } else {
        parts.join(", ")
    }
}

pub fn results_table(quotes: &[Quote]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Sector"),
        ui::header_cell("Price"),
        ui::header_cell("Change (%)"),
        ui::header_cell("P/E"),
        ui::header_cell("Div Yield"),
        ui::header_cell("Market Cap"),
    ]);
    for quote in quotes {
        table.add_row(vec![
            Cell::new(&quote.ticker),
            Cell::new(quote.name.as_deref().unwrap_or("N/A")),
            Cell::new(quote.sector.to_string()),
            ui::right_cell(format!("{:.2}", quote.price)),
            ui::change_cell(quote.change_percent),
            ui::format_optional_cell(quote.pe_ratio, |pe| format!("{pe:.2}")),
            ui::format_optional_cell(quote.dividend_yield, ui::percent),
            ui::format_optional_cell(quote.market_cap, ui::format_large_number),
        ]);
    }
    table.to_string()
}

pub async fn run(context: &AppContext, filters: &ScreenFilters) -> Result<()> {
    filters.validate()?;
    let screener = Screener::new(context.market.clone());
    info!("Screening {} tickers", screener.universe_size());

    let pb = ui::new_progress_bar(screener.universe_size() as u64, true);
    pb.set_message("Screening...");
    let result = screener
        .screen_with_progress(filters, &|| pb.inc(1))
        .await;
    pb.finish_and_clear();
    let mut matches = result?;
    matches.sort_by(|a, b| {
        b.market_cap
            .unwrap_or(0.0)
            .total_cmp(&a.market_cap.unwrap_or(0.0))
    });

    println!(
        "{}",
        ui::style_text(
            &format!("Screen: {}", describe_filters(filters)),
            ui::StyleType::Title
        )
    );
    if matches.is_empty() {
        println!(
            "\n{}",
            ui::style_text("No stocks matched the filters", ui::StyleType::Subtle)
        );
        return Ok(());
    }

    println!("\n{}", results_table(&matches));
    println!(
        "{} {}",
        ui::style_text("Matches:", ui::StyleType::TotalLabel),
        ui::style_text(
            &format!("{} of {}", matches.len(), screener.universe_size()),
            ui::StyleType::TotalValue
        )
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quote::Sector;

    #[test]
    fn test_describe_filters() {
        assert_eq!(describe_filters(&ScreenFilters::default()), "no filters");

        let filters = ScreenFilters {
            max_pe: Some(25.0),
            min_dividend_yield: Some(0.02),
            sector: Some(Sector::Energy),
            min_market_cap: Some(1e10),
            ..Default::default()
        };
        assert_eq!(
            describe_filters(&filters),
            "P/E <= 25, Dividend yield >= 2.00%, Sector = Energy, Market cap >= 10.00B"
        );
    }
}
