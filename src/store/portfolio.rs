use crate::core::portfolio::{Portfolio, portfolio_key};
use crate::store::KeyValueCollection;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::debug;

pub const PORTFOLIO_COLLECTION: &str = "portfolios";

/// Named portfolio definitions. Names are matched case-insensitively and
/// saving an existing name replaces it.
pub struct PortfolioStore {
    collection: Arc<dyn KeyValueCollection>,
}

impl PortfolioStore {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        PortfolioStore { collection }
    }

    pub async fn save(&self, portfolio: &Portfolio) -> Result<()> {
        portfolio.validate()?;
        let bytes = serde_json::to_vec(portfolio)
            .with_context(|| format!("Failed to serialize portfolio: {}", portfolio.name))?;
        self.collection
            .put(&portfolio_key(&portfolio.name), bytes, None)
            .await?;
        debug!("Saved portfolio {}", portfolio.name);
        Ok(())
    }

    pub async fn load(&self, name: &str) -> Result<Option<Portfolio>> {
        match self.collection.get(&portfolio_key(name)).await? {
            Some(bytes) => {
                let portfolio = serde_json::from_slice(&bytes)
                    .with_context(|| format!("Failed to read saved portfolio: {name}"))?;
                Ok(Some(portfolio))
            }
            None => Ok(None),
        }
    }

    /// All saved portfolios, ordered by name.
    pub async fn list(&self) -> Result<Vec<Portfolio>> {
        let mut portfolios = Vec::new();
        for key in self.collection.keys().await? {
            if let Some(portfolio) = self.load(&key).await? {
                portfolios.push(portfolio);
            }
        }
        Ok(portfolios)
    }

    /// Returns whether a portfolio was deleted.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let removed = self.collection.remove(&portfolio_key(name)).await?;
        debug!("Delete portfolio {}: {}", name, removed);
        Ok(removed)
    }
}
