use super::ui;
use crate::AppContext;
use crate::core::market_view::{
    DEFAULT_MOVER_LIMIT, DEFAULT_MOVER_THRESHOLD, IndexSnapshot, MarketBreadth, MarketView,
    STOCK_UNIVERSE, top_movers,
};
use crate::core::quote::Quote;
use anyhow::Result;
use comfy_table::Cell;

pub fn indices_table(indices: &[IndexSnapshot]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Index"),
        ui::header_cell("Last"),
        ui::header_cell("Change"),
        ui::header_cell("Change (%)"),
    ]);
    for index in indices {
        table.add_row(vec![
            Cell::new(&index.name),
            ui::right_cell(format!("{:.2}", index.price)),
            ui::right_cell(format!("{:+.2}", index.change)),
            ui::change_cell(index.change_percent),
        ]);
    }
    table.to_string()
}

pub fn movers_table(movers: &[Quote]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Ticker"),
        ui::header_cell("Price"),
        ui::header_cell("Change"),
        ui::header_cell("Change (%)"),
        ui::header_cell("Sector"),
    ]);
    for quote in movers {
        table.add_row(vec![
            Cell::new(&quote.ticker),
            ui::right_cell(format!("{:.2}", quote.price)),
            ui::right_cell(format!("{:+.2}", quote.change)),
            ui::change_cell(quote.change_percent),
            Cell::new(quote.sector.to_string()),
        ]);
    }
    table.to_string()
}

pub fn breadth_summary(breadth: &MarketBreadth, monitored: usize) -> String {
    format!(
        "{} {}   {} {}   {} {}   {}",
        ui::style_text("Advancing:", ui::StyleType::TotalLabel),
        breadth.advancing,
        ui::style_text("Declining:", ui::StyleType::TotalLabel),
        breadth.declining,
        ui::style_text("Unchanged:", ui::StyleType::TotalLabel),
        breadth.unchanged,
        ui::style_text(
            &format!("({} of {monitored} tickers quoted)", breadth.total()),
            ui::StyleType::Subtle
        ),
    )
}

pub async fn run(context: &AppContext) -> Result<()> {
    let view = MarketView::new(context.market.clone());

    let pb = ui::new_progress_bar(2, true);
    pb.set_message("Fetching market data...");
    let indices = view.market_overview().await;
    pb.inc(1);
    let quotes = view.universe_quotes().await;
    pb.inc(1);
    pb.finish_and_clear();

    println!("{}\n", ui::style_text("Market Overview", ui::StyleType::Title));
    if indices.is_empty() {
        println!(
            "{}",
            ui::style_text("No index data available", ui::StyleType::Error)
        );
    } else {
        println!("{}", indices_table(&indices));
    }

    ui::print_separator();
    println!("{}\n", ui::style_text("Top Movers", ui::StyleType::Title));
    let movers = top_movers(&quotes, DEFAULT_MOVER_THRESHOLD, DEFAULT_MOVER_LIMIT);
    if movers.is_empty() {
        println!(
            "{}",
            ui::style_text(
                &format!("No stocks moved more than {DEFAULT_MOVER_THRESHOLD}% today"),
                ui::StyleType::Subtle
            )
        );
    } else {
        println!("{}", movers_table(&movers));
    }

    println!(
        "\n{}",
        breadth_summary(&MarketBreadth::from_quotes(&quotes), STOCK_UNIVERSE.len())
    );
    Ok(())
}
