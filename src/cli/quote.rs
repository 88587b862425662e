use super::ui;
use crate::AppContext;
use crate::core::error::MarketResult;
use crate::core::quote::Quote;
use anyhow::{Result, bail};
use comfy_table::Cell;

pub fn quotes_table(results: &[(String, MarketResult<Quote>)]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Name"),
        ui::header_cell("Price"),
        ui::header_cell("Change (%)"),
        ui::header_cell("Volume"),
        ui::header_cell("Market Cap"),
        ui::header_cell("P/E"),
        ui::header_cell("Div Yield"),
        ui::header_cell("52W Range"),
        ui::header_cell("Sector"),
    ]);

    for (ticker, result) in results {
        match result {
            Ok(quote) => {
                let range = match (quote.fifty_two_week_low, quote.fifty_two_week_high) {
                    (Some(low), Some(high)) => Some((low, high)),
                    _ => None,
                };
                table.add_row(vec![
                    Cell::new(&quote.ticker),
                    Cell::new(quote.name.as_deref().unwrap_or("N/A")),
                    ui::right_cell(format!("{:.2}", quote.price)),
                    ui::change_cell(quote.change_percent),
                    ui::format_optional_cell(quote.volume, |v| ui::format_large_number(v as f64)),
                    ui::format_optional_cell(quote.market_cap, ui::format_large_number),
                    ui::format_optional_cell(quote.pe_ratio, |pe| format!("{pe:.2}")),
                    ui::format_optional_cell(quote.dividend_yield, ui::percent),
                    ui::format_optional_cell(range, |(low, high)| format!("{low:.2} - {high:.2}")),
                    Cell::new(quote.sector.to_string()),
                ]);
            }
            Err(e) => {
                table.add_row(vec![
                    Cell::new(ticker),
                    Cell::new(ui::style_text(&e.to_string(), ui::StyleType::Error)),
                ]);
            }
        }
    }
    table.to_string()
}

pub async fn run(context: &AppContext, tickers: &[String]) -> Result<()> {
    if tickers.is_empty() {
        bail!("At least one ticker is required");
    }
    let tickers: Vec<&str> = tickers.iter().map(String::as_str).collect();

    let pb = ui::new_progress_bar(tickers.len() as u64, true);
    pb.set_message("Fetching quotes...");
    let results = context.market.get_quotes(&tickers).await;
    pb.inc(tickers.len() as u64);
    pb.finish_and_clear();

    println!("{}", quotes_table(&results));

    // A single requested ticker that failed is a failed command
    if let [(_, Err(e))] = results.as_slice() {
        return Err(e.clone().into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MarketError;
    use crate::core::quote::Sector;
    use chrono::Utc;

    #[test]
    fn test_quotes_table_shows_values_and_errors() {
        let quote = Quote {
            ticker: "AAPL".to_string(),
            name: Some("Apple Inc.".to_string()),
            price: 189.5,
            previous_close: Some(187.0),
            change: 2.5,
            change_percent: 1.34,
            volume: Some(51_234_567),
            market_cap: Some(2.95e12),
            pe_ratio: Some(29.4),
            dividend_yield: Some(0.0051),
            sector: Sector::Technology,
            industry: None,
            fifty_two_week_high: Some(199.6),
            fifty_two_week_low: Some(164.1),
            average_volume: None,
            fetched_at: Utc::now(),
        };
        let results = vec![
            ("AAPL".to_string(), Ok(quote)),
            (
                "ZZZZ".to_string(),
                Err(MarketError::NotFound("ZZZZ".to_string())),
            ),
        ];

        let output = console::strip_ansi_codes(&quotes_table(&results)).to_string();
        assert!(output.contains("Apple Inc."));
        assert!(output.contains("2.95T"));
        assert!(output.contains("0.51%"));
        assert!(output.contains("Ticker not found: ZZZZ"));
    }
}
