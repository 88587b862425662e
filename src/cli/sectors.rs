use super::ui;
use crate::AppContext;
use crate::core::market_view::{MarketView, SectorPerformance};
use anyhow::Result;
use comfy_table::Cell;

pub fn sectors_table(sectors: &[SectorPerformance]) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Sector"),
        ui::header_cell("Avg Change (%)"),
        ui::header_cell("Quoted"),
    ]);
    for performance in sectors {
        table.add_row(vec![
            Cell::new(performance.sector.to_string()),
            ui::change_cell(performance.average_change_percent),
            ui::right_cell(performance.constituents),
        ]);
    }
    table.to_string()
}

pub async fn run(context: &AppContext) -> Result<()> {
    let view = MarketView::new(context.market.clone());

    let pb = ui::new_progress_bar(1, true);
    pb.set_message("Fetching sector leaders...");
    let sectors = view.sector_performance().await;
    pb.inc(1);
    pb.finish_and_clear();

    println!("{}\n", ui::style_text("Sector Performance", ui::StyleType::Title));
    if sectors.is_empty() {
        println!(
            "{}",
            ui::style_text("No sector data available", ui::StyleType::Error)
        );
    } else {
        println!("{}", sectors_table(&sectors));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quote::Sector;

    #[test]
    fn test_sectors_table() {
        let output = sectors_table(&[SectorPerformance {
            sector: Sector::RealEstate,
            average_change_percent: 1.256,
            constituents: 4,
        }]);
        assert!(output.contains("Real Estate"));
        assert!(output.contains("+1.26%"));
    }
}
