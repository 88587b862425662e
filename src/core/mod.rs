//! Market data, analytics and screening

pub mod analytics;
pub mod cache;
pub mod config;
pub mod error;
pub mod indicators;
pub mod log;
pub mod market;
pub mod market_view;
pub mod portfolio;
pub mod quote;
pub mod screener;

// Re-export main types for cleaner imports
pub use error::{MarketError, MarketResult};
pub use market::MarketData;
pub use quote::{Horizon, MarketDataProvider, PriceSeries, Quote, Sector};
