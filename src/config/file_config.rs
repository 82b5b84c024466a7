//! TOML file configuration. Every field is optional; resolution against
//! CLI arguments and defaults happens in [`super::AppConfig`].

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub kv_db_path: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    pub mirrors: Option<MirrorConfig>,
    pub catalog: Option<CatalogConfig>,
    pub paid: Option<PaidConfig>,
    pub enrichment: Option<EnrichmentConfig>,
}

impl FileConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    /// "openai", "anthropic" or "ollama".
    pub kind: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorConfig {
    pub family_a_hosts: Option<Vec<String>>,
    pub family_b_hosts: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaidConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub daily_quota: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnrichmentConfig {
    pub batch_size: Option<usize>,
    pub concurrency: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub hd_artwork: Option<bool>,
}
