use crate::core::portfolio::{Portfolio, portfolio_key};
use crate::providers::yahoo_finance::DEFAULT_BASE_URL;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub saved_data_expiry_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            ttl_secs: 300,
            max_entries: 1000,
            saved_data_expiry_secs: 3600,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn saved_data_expiry(&self) -> Duration {
        Duration::from_secs(self.saved_data_expiry_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

impl Default for YahooProviderConfig {
    fn default() -> Self {
        YahooProviderConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Keys for backup providers. Carried through config, the Yahoo provider needs none.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct ApiKeys {
    pub alpha_vantage: Option<String>,
    pub iex_cloud: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProvidersConfig {
    pub yahoo: YahooProviderConfig,
    pub request_timeout_secs: u64,
    pub api_keys: ApiKeys,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: YahooProviderConfig::default(),
            request_timeout_secs: 10,
            api_keys: ApiKeys::default(),
        }
    }
}

impl ProvidersConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Annual rate as a fraction.
    pub risk_free_rate: f64,
    pub benchmark: String,
    pub initial_capital: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        AnalyticsConfig {
            risk_free_rate: 0.02,
            benchmark: "^GSPC".to_string(),
            initial_capital: 10_000.0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "stockdash", "stockdash")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("dev", "stockdash", "stockdash")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn find_portfolio(&self, name: &str) -> Option<&Portfolio> {
        let key = portfolio_key(name);
        self.portfolios
            .iter()
            .find(|p| portfolio_key(&p.name) == key)
    }
}
