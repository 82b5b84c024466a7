mod file_config;

pub use file_config::{
    CatalogConfig, EnrichmentConfig, FileConfig, MirrorConfig, PaidConfig, ProviderConfig,
};

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_METRICS_PORT: u16 = 9090;

const DEFAULT_FAMILY_A_HOSTS: &[&str] = &["https://yewtu.be", "https://inv.nadeko.net"];
const DEFAULT_FAMILY_B_HOSTS: &[&str] = &["https://pipedapi.kavin.rocks"];
const DEFAULT_ITUNES_BASE_URL: &str = "https://itunes.apple.com";
const DEFAULT_YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub kv_db_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Path of the SQLite key/value store. None runs without persistence:
    /// the cache and quota ledger fail open.
    pub kv_db_path: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,

    pub providers: Vec<ProviderSettings>,
    pub mirrors: MirrorSettings,
    pub catalog: CatalogSettings,
    pub paid: PaidSettings,
    pub enrichment: EnrichmentSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let kv_db_path = file
            .kv_db_path
            .map(PathBuf::from)
            .or_else(|| cli.kv_db_path.clone());
        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let providers = file
            .providers
            .into_iter()
            .map(|p| ProviderSettings {
                id: p.id,
                kind: p.kind,
                base_url: p.base_url,
                model: p.model,
                api_key: p.api_key,
                timeout_secs: p.timeout_secs.unwrap_or(60),
            })
            .collect();

        let mirrors_file = file.mirrors.unwrap_or_default();
        let mirrors = MirrorSettings {
            family_a_hosts: mirrors_file.family_a_hosts.unwrap_or_else(|| {
                DEFAULT_FAMILY_A_HOSTS.iter().map(|s| s.to_string()).collect()
            }),
            family_b_hosts: mirrors_file.family_b_hosts.unwrap_or_else(|| {
                DEFAULT_FAMILY_B_HOSTS.iter().map(|s| s.to_string()).collect()
            }),
            timeout_ms: mirrors_file.timeout_ms.unwrap_or(3000),
        };

        let catalog_file = file.catalog.unwrap_or_default();
        let catalog = CatalogSettings {
            enabled: catalog_file.enabled.unwrap_or(true),
            base_url: catalog_file
                .base_url
                .unwrap_or_else(|| DEFAULT_ITUNES_BASE_URL.to_string()),
        };

        let paid_file = file.paid.unwrap_or_default();
        let paid = PaidSettings {
            api_key: paid_file.api_key,
            base_url: paid_file
                .base_url
                .unwrap_or_else(|| DEFAULT_YOUTUBE_BASE_URL.to_string()),
            daily_quota: paid_file
                .daily_quota
                .unwrap_or(crate::quota::DEFAULT_DAILY_LIMIT),
        };

        let enrichment_file = file.enrichment.unwrap_or_default();
        let enrichment_defaults = EnrichmentSettings::default();
        let enrichment = EnrichmentSettings {
            batch_size: enrichment_file
                .batch_size
                .unwrap_or(enrichment_defaults.batch_size),
            concurrency: enrichment_file
                .concurrency
                .unwrap_or(enrichment_defaults.concurrency),
            timeout_secs: enrichment_file
                .timeout_secs
                .unwrap_or(enrichment_defaults.timeout_secs),
            hd_artwork: enrichment_file
                .hd_artwork
                .unwrap_or(enrichment_defaults.hd_artwork),
        };

        Ok(Self {
            kv_db_path,
            port,
            metrics_port,
            providers,
            mirrors,
            catalog,
            paid,
            enrichment,
        })
    }
}

/// Settings for one track-list provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub id: String,
    pub kind: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the free mirror tier.
#[derive(Debug, Clone)]
pub struct MirrorSettings {
    pub family_a_hosts: Vec<String>,
    pub family_b_hosts: Vec<String>,
    pub timeout_ms: u64,
}

impl MirrorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings for the catalog artwork tier.
#[derive(Debug, Clone)]
pub struct CatalogSettings {
    pub enabled: bool,
    pub base_url: String,
}

/// Settings for the paid search tier. The tier is active only when an API
/// key is configured.
#[derive(Debug, Clone)]
pub struct PaidSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub daily_quota: i64,
}

/// Settings for batch media enrichment during generation.
#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub batch_size: usize,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub hd_artwork: bool,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            batch_size: 4,
            concurrency: 3,
            timeout_secs: 20,
            hd_artwork: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli() -> CliConfig {
        CliConfig {
            kv_db_path: Some(PathBuf::from("/cli/kv.db")),
            port: 3001,
            metrics_port: 9091,
        }
    }

    #[test]
    fn test_resolve_cli_only() {
        let config = AppConfig::resolve(&cli(), None).unwrap();
        assert_eq!(config.kv_db_path, Some(PathBuf::from("/cli/kv.db")));
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_port, 9091);
        assert!(config.providers.is_empty());
        assert_eq!(config.mirrors.timeout_ms, 3000);
        assert!(config.catalog.enabled);
        assert!(config.paid.api_key.is_none());
        assert_eq!(config.paid.daily_quota, 10_000);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let file_config = FileConfig::from_toml(
            r#"
            kv_db_path = "/toml/kv.db"
            port = 4000
        "#,
        )
        .unwrap();
        let config = AppConfig::resolve(&cli(), Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.kv_db_path, Some(PathBuf::from("/toml/kv.db")));
        assert_eq!(config.port, 4000);
        // CLI value used when TOML doesn't specify
        assert_eq!(config.metrics_port, 9091);
    }

    #[test]
    fn test_default_mirror_families_are_distinct() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();
        assert!(!config.mirrors.family_a_hosts.is_empty());
        assert!(!config.mirrors.family_b_hosts.is_empty());
        for host in &config.mirrors.family_a_hosts {
            assert!(!config.mirrors.family_b_hosts.contains(host));
        }
    }

    #[test]
    fn test_provider_settings_carry_timeout_default() {
        let file_config = FileConfig::from_toml(
            r#"
            [[providers]]
            id = "gpt"
            kind = "openai"
            base_url = "https://api.openai.com/v1"
            model = "gpt-4o"
        "#,
        )
        .unwrap();
        let config = AppConfig::resolve(&CliConfig::default(), Some(file_config)).unwrap();
        assert_eq!(config.providers[0].timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_enrichment_defaults() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();
        assert_eq!(config.enrichment.batch_size, 4);
        assert_eq!(config.enrichment.concurrency, 3);
        assert_eq!(config.enrichment.timeout_secs, 20);
        assert!(!config.enrichment.hd_artwork);
    }
}
