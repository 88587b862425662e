use super::ui;
use crate::AppContext;
use crate::core::analytics::MetricSet;
use crate::core::indicators::{
    IndicatorSnapshot, LONG_SMA_WINDOW, RSI_PERIOD, SHORT_SMA_WINDOW, VOLATILITY_WINDOW,
};
use crate::core::quote::{Horizon, PriceSeries};
use anyhow::Result;
use comfy_table::Cell;

const RECENT_ROWS: usize = 10;

pub fn summary_table(series: &PriceSeries, metrics: &MetricSet) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Metric"), ui::header_cell("Value")]);

    let first = series.points().first();
    let last = series.last();
    table.add_row(vec![
        Cell::new("First close"),
        ui::format_optional_cell(first, |p| format!("{:.2} ({})", p.close, p.date)),
    ]);
    table.add_row(vec![
        Cell::new("Last close"),
        ui::format_optional_cell(last, |p| format!("{:.2} ({})", p.close, p.date)),
    ]);
    table.add_row(vec![
        Cell::new("Cumulative return"),
        ui::fraction_change_cell(metrics.cumulative_return),
    ]);
    table.add_row(vec![
        Cell::new("Annualized return"),
        ui::fraction_change_cell(metrics.annualized_return),
    ]);
    table.add_row(vec![
        Cell::new("CAGR"),
        ui::format_optional_cell(metrics.cagr, ui::percent),
    ]);
    table.add_row(vec![
        Cell::new("Annualized volatility"),
        ui::right_cell(ui::percent(metrics.annualized_volatility)),
    ]);
    table.add_row(vec![
        Cell::new("Sharpe ratio"),
        ui::right_cell(format!("{:.2}", metrics.sharpe_ratio)),
    ]);
    table.add_row(vec![
        Cell::new("Max drawdown"),
        ui::right_cell(ui::percent(metrics.max_drawdown)),
    ]);
    table.to_string()
}

pub fn indicators_table(snapshot: &IndicatorSnapshot) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Indicator"), ui::header_cell("Latest")]);
    table.add_row(vec![
        Cell::new(format!("SMA {SHORT_SMA_WINDOW}")),
        ui::format_optional_cell(snapshot.sma_short, |v| format!("{v:.2}")),
    ]);
    table.add_row(vec![
        Cell::new(format!("SMA {LONG_SMA_WINDOW}")),
        ui::format_optional_cell(snapshot.sma_long, |v| format!("{v:.2}")),
    ]);
    table.add_row(vec![
        Cell::new(format!("RSI {RSI_PERIOD}")),
        ui::format_optional_cell(snapshot.rsi, |v| format!("{v:.1}")),
    ]);
    table.add_row(vec![
        Cell::new(format!("Volatility {VOLATILITY_WINDOW}d")),
        ui::format_optional_cell(snapshot.volatility, ui::percent),
    ]);
    table.to_string()
}

pub fn recent_closes_table(series: &PriceSeries, rows: usize) -> String {
    let mut table = ui::new_styled_table();
    table.set_header(vec![ui::header_cell("Date"), ui::header_cell("Close")]);
    let points = series.points();
    let start = points.len().saturating_sub(rows);
    for point in points[start..].iter().rev() {
        table.add_row(vec![
            Cell::new(point.date.to_string()),
            ui::right_cell(format!("{:.2}", point.close)),
        ]);
    }
    table.to_string()
}

pub async fn run(context: &AppContext, ticker: &str, horizon: Horizon) -> Result<()> {
    let pb = ui::new_progress_bar(1, true);
    pb.set_message(format!("Fetching {horizon} history for {ticker}..."));
    let result = context.market.get_history(ticker, horizon).await;
    pb.inc(1);
    pb.finish_and_clear();
    let series = result?;

    let metrics = MetricSet::from_values(
        &series.dates(),
        &series.closes(),
        context.config.analytics.risk_free_rate,
    )?;

    println!(
        "{}\n",
        ui::style_text(
            &format!("{} over {} ({} closes)", series.ticker, horizon, series.len()),
            ui::StyleType::Title
        )
    );
    println!("{}", summary_table(&series, &metrics));
    println!("{}", indicators_table(&IndicatorSnapshot::latest(&series)));

    ui::print_separator();
    println!("{}", recent_closes_table(&series, RECENT_ROWS));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        PriceSeries::new(
            "MSFT",
            Horizon::SixMonths,
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| (start + chrono::Days::new(i as u64), *c)),
        )
    }

    #[test]
    fn test_recent_closes_newest_first() {
        let output = recent_closes_table(&series(&[10.0, 11.0, 12.0, 13.0]), 2);
        let newest = output.find("13.00").unwrap();
        let older = output.find("12.00").unwrap();
        assert!(newest < older);
        assert!(!output.contains("11.00"));
    }

    #[test]
    fn test_summary_table() {
        let series = series(&[100.0, 110.0, 99.0, 121.0]);
        let metrics = MetricSet::from_values(&series.dates(), &series.closes(), 0.0).unwrap();
        let output = console::strip_ansi_codes(&summary_table(&series, &metrics)).to_string();
        assert!(output.contains("+21.00%"));
        assert!(output.contains("10.00%"));
        assert!(output.contains("121.00 (2024-01-04)"));
    }

    #[test]
    fn test_indicators_table_short_series() {
        let snapshot = IndicatorSnapshot::latest(&series(&[1.0, 2.0]));
        let output = indicators_table(&snapshot);
        assert!(output.contains("SMA 20"));
        assert!(output.contains("N/A"));
    }
}
