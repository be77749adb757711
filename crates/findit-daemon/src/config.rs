//! Configuration loading for findit-daemon.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub daemon: Option<DaemonConfig>,
    pub resources: Option<ResourceConfig>,
    pub indexing: Option<IndexingConfig>,
    pub vlm: Option<VlmConfig>,
    pub search: Option<SearchConfig>,
    pub network: Option<NetworkConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct DaemonConfig {
    pub socket: Option<PathBuf>,
    pub autostart: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ResourceConfig {
    pub max_cpu_active: Option<u64>,
    pub max_cpu_idle: Option<u64>,
    pub max_total_mb: Option<u64>,
    pub max_per_folder_mb: Option<u64>,
    pub max_ram_mb: Option<u64>,
    /// Caps the indexer's in-flight textDescription calls, independent of
    /// the `[network]` gateway's requests-per-second (§0.2: "max
    /// concurrent VLM calls").
    pub max_concurrent_vlm_calls: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct IndexingConfig {
    pub worker_pool_size: Option<usize>,
    pub skip_layers: Option<Vec<String>>,
    pub coalesce_window_ms: Option<u64>,
    /// Seconds of no IPC activity before the throttler treats the daemon
    /// as idle and relaxes indexing limits (§0.2's "idle threshold before
    /// watcher-driven indexing kicks in").
    pub idle_threshold_secs: Option<u64>,
    /// How often an already-registered folder is re-scanned outside of
    /// watcher events, to pick up changes a missed/coalesced event
    /// dropped (§0.2's "stale-folder rescan interval").
    pub stale_folder_rescan_interval_secs: Option<u64>,
}

/// Hybrid-search fusion weight overrides and result-limit default
/// (§0.2's `[search]` section; §4.2's `FusionWeights`).
#[derive(Debug, Deserialize, Default, Clone)]
pub struct SearchConfig {
    pub w_fts: Option<f32>,
    pub w_clip: Option<f32>,
    pub w_text: Option<f32>,
    pub default_limit: Option<usize>,
}

/// Outbound network tunables: the VLM gateway's rate limit, base URL, and
/// request timeout (§0.2's `[network]` section).
#[derive(Debug, Deserialize, Default, Clone)]
pub struct NetworkConfig {
    pub requests_per_second: Option<u32>,
    pub gateway_base_url: Option<String>,
    pub gateway_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct VlmConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Mirrors the Auth/Subscription collaborator's "subscription summary"
    /// (§9 design note, §1 out-of-scope): the daemon has no direct
    /// visibility into the account/billing state itself, only whatever
    /// this config snapshot says, refreshed out of band by whatever
    /// process provisions it.
    pub is_cloud_enabled: Option<bool>,
    pub monthly_budget_usd: Option<f64>,
}

/// Default maximum total storage across all registered folders (2GB).
pub const DEFAULT_MAX_TOTAL_MB: u64 = 2048;

/// Default maximum storage per registered folder's thumbnail/audio cache (500MB).
pub const DEFAULT_MAX_PER_FOLDER_MB: u64 = 500;

/// Default textDescription VLM gateway request rate (§4.1 retry/backoff
/// context assumes a shared budget across all folders being indexed).
pub const DEFAULT_VLM_REQUESTS_PER_SECOND: u32 = 2;

/// Default cap on in-flight VLM calls when `[resources]` doesn't override it.
pub const DEFAULT_MAX_CONCURRENT_VLM_CALLS: u32 = 2;

/// Default idle threshold (seconds) before the throttler relaxes
/// indexing limits, matching [`crate::throttle::ThrottleConfig`]'s own
/// default.
pub const DEFAULT_IDLE_THRESHOLD_SECS: u64 = 300;

/// Default interval (seconds) between stale-folder rescans: 30 minutes.
pub const DEFAULT_STALE_FOLDER_RESCAN_INTERVAL_SECS: u64 = 1800;

/// Default hybrid-search result limit when neither the CLI nor the
/// `[search]` config overrides it.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Default VLM gateway request timeout.
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 30;

impl Config {
    pub fn daemon_socket_path(&self) -> Option<PathBuf> {
        self.daemon.as_ref().and_then(|daemon| daemon.socket.clone())
    }

    pub fn worker_pool_size(&self) -> Option<usize> {
        self.indexing.as_ref().and_then(|i| i.worker_pool_size)
    }

    pub fn coalesce_window_ms(&self) -> u64 {
        self.indexing
            .as_ref()
            .and_then(|i| i.coalesce_window_ms)
            .unwrap_or(1500)
    }

    pub fn skip_layers(&self) -> Vec<String> {
        self.indexing
            .as_ref()
            .and_then(|i| i.skip_layers.clone())
            .unwrap_or_default()
    }

    pub fn vlm_api_key(&self) -> Option<String> {
        self.vlm.as_ref().and_then(|v| v.api_key.clone())
    }

    pub fn vlm_model(&self) -> String {
        self.vlm
            .as_ref()
            .and_then(|v| v.model.clone())
            .unwrap_or_else(|| "openrouter/auto".to_string())
    }

    pub fn vlm_requests_per_second(&self) -> u32 {
        self.network
            .as_ref()
            .and_then(|n| n.requests_per_second)
            .unwrap_or(DEFAULT_VLM_REQUESTS_PER_SECOND)
    }

    /// `None` keeps [`findit_core::vlm::VlmClient`]'s built-in OpenRouter
    /// endpoint.
    pub fn vlm_gateway_base_url(&self) -> Option<String> {
        self.network.as_ref().and_then(|n| n.gateway_base_url.clone())
    }

    pub fn vlm_gateway_timeout(&self) -> std::time::Duration {
        let secs = self
            .network
            .as_ref()
            .and_then(|n| n.gateway_timeout_secs)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT_SECS);
        std::time::Duration::from_secs(secs)
    }

    /// Defaults to enabled when unconfigured, matching [`findit_core::indexer::CloudAccess`]'s
    /// default — an operator who hasn't wired a subscription summary yet
    /// gets cloud features on rather than silently disabled.
    pub fn is_cloud_enabled(&self) -> bool {
        self.vlm.as_ref().and_then(|v| v.is_cloud_enabled).unwrap_or(true)
    }

    pub fn monthly_budget_usd(&self) -> Option<f64> {
        self.vlm.as_ref().and_then(|v| v.monthly_budget_usd)
    }

    /// Maximum number of textDescription calls the indexer may have
    /// in flight at once, independent of the gateway's requests-per-second
    /// rate limit.
    pub fn max_concurrent_vlm_calls(&self) -> u32 {
        self.resources
            .as_ref()
            .and_then(|r| r.max_concurrent_vlm_calls)
            .unwrap_or(DEFAULT_MAX_CONCURRENT_VLM_CALLS)
    }

    /// Seconds of no IPC activity before the throttler treats the daemon
    /// as idle (feeds [`crate::throttle::ThrottleConfig::idle_threshold_secs`]).
    pub fn idle_threshold_secs(&self) -> u64 {
        self.indexing
            .as_ref()
            .and_then(|i| i.idle_threshold_secs)
            .unwrap_or(DEFAULT_IDLE_THRESHOLD_SECS)
    }

    /// Interval between periodic rescans of each registered folder,
    /// independent of watcher events (catches changes a missed or
    /// coalesced event dropped).
    pub fn stale_folder_rescan_interval(&self) -> std::time::Duration {
        let secs = self
            .indexing
            .as_ref()
            .and_then(|i| i.stale_folder_rescan_interval_secs)
            .unwrap_or(DEFAULT_STALE_FOLDER_RESCAN_INTERVAL_SECS);
        std::time::Duration::from_secs(secs)
    }

    /// Hybrid-search fusion weight overrides (§4.2), falling back to
    /// [`findit_core::search::FusionWeights::default`] per-field when
    /// unconfigured.
    pub fn search_weights(&self) -> findit_core::search::FusionWeights {
        let defaults = findit_core::search::FusionWeights::default();
        match &self.search {
            Some(search) => findit_core::search::FusionWeights {
                fts: search.w_fts.unwrap_or(defaults.fts),
                clip: search.w_clip.unwrap_or(defaults.clip),
                text: search.w_text.unwrap_or(defaults.text),
            },
            None => defaults,
        }
    }

    /// Default page size for a search request that omits `limit`.
    pub fn search_default_limit(&self) -> usize {
        self.search
            .as_ref()
            .and_then(|s| s.default_limit)
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
    }

    /// Maximum total bytes the daemon's thumbnail/audio caches may occupy
    /// across all registered folders before the oldest-touched folder's
    /// cache is evicted.
    pub fn max_total_bytes(&self) -> u64 {
        self.resources
            .as_ref()
            .and_then(|r| r.max_total_mb)
            .unwrap_or(DEFAULT_MAX_TOTAL_MB)
            .saturating_mul(1024 * 1024)
    }

    pub fn max_per_folder_bytes(&self) -> u64 {
        self.resources
            .as_ref()
            .and_then(|r| r.max_per_folder_mb)
            .unwrap_or(DEFAULT_MAX_PER_FOLDER_MB)
            .saturating_mul(1024 * 1024)
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "findit").context("could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents).context("failed to parse config file as TOML")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_have_no_overrides() {
        let config = Config::default();
        assert!(config.worker_pool_size().is_none());
        assert_eq!(config.coalesce_window_ms(), 1500);
        assert!(config.skip_layers().is_empty());
    }

    #[test]
    fn max_total_bytes_default_is_two_gigabytes() {
        let config = Config::default();
        assert_eq!(config.max_total_bytes(), 2048 * 1024 * 1024);
    }

    #[test]
    fn max_total_bytes_respects_override() {
        let config = Config {
            resources: Some(ResourceConfig {
                max_total_mb: Some(1024),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.max_total_bytes(), 1024 * 1024 * 1024);
    }

    #[test]
    fn max_per_folder_bytes_default_is_500mb() {
        let config = Config::default();
        assert_eq!(config.max_per_folder_bytes(), 500 * 1024 * 1024);
    }

    #[test]
    fn vlm_model_falls_back_to_auto_router() {
        let config = Config::default();
        assert_eq!(config.vlm_model(), "openrouter/auto");
    }

    #[test]
    fn daemon_socket_path_reads_configured_override() {
        let config = Config {
            daemon: Some(DaemonConfig {
                socket: Some(PathBuf::from("/tmp/findit-test.sock")),
                autostart: None,
            }),
            ..Default::default()
        };
        assert_eq!(config.daemon_socket_path().as_deref(), Some(Path::new("/tmp/findit-test.sock")));
    }

    #[test]
    fn load_config_missing_file_yields_default() {
        let config = load_config(Path::new("/nonexistent/findit/config.toml")).unwrap();
        assert!(config.daemon_socket_path().is_none());
    }

    #[test]
    fn cloud_access_defaults_to_enabled_with_no_budget() {
        let config = Config::default();
        assert!(config.is_cloud_enabled());
        assert!(config.monthly_budget_usd().is_none());
    }

    #[test]
    fn cloud_access_respects_configured_override() {
        let config = Config {
            vlm: Some(VlmConfig {
                is_cloud_enabled: Some(false),
                monthly_budget_usd: Some(20.0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(!config.is_cloud_enabled());
        assert_eq!(config.monthly_budget_usd(), Some(20.0));
    }

    #[test]
    fn search_weights_default_to_fusion_weights_default() {
        let config = Config::default();
        let defaults = findit_core::search::FusionWeights::default();
        let weights = config.search_weights();
        assert_eq!(weights.fts, defaults.fts);
        assert_eq!(weights.clip, defaults.clip);
        assert_eq!(weights.text, defaults.text);
        assert_eq!(config.search_default_limit(), DEFAULT_SEARCH_LIMIT);
    }

    #[test]
    fn search_weights_respect_partial_override() {
        let config = Config {
            search: Some(SearchConfig {
                w_fts: Some(0.8),
                w_clip: None,
                w_text: None,
                default_limit: Some(50),
            }),
            ..Default::default()
        };
        let defaults = findit_core::search::FusionWeights::default();
        let weights = config.search_weights();
        assert_eq!(weights.fts, 0.8);
        assert_eq!(weights.clip, defaults.clip);
        assert_eq!(weights.text, defaults.text);
        assert_eq!(config.search_default_limit(), 50);
    }

    #[test]
    fn network_config_defaults() {
        let config = Config::default();
        assert_eq!(config.vlm_requests_per_second(), DEFAULT_VLM_REQUESTS_PER_SECOND);
        assert!(config.vlm_gateway_base_url().is_none());
        assert_eq!(config.vlm_gateway_timeout(), std::time::Duration::from_secs(DEFAULT_GATEWAY_TIMEOUT_SECS));
    }

    #[test]
    fn network_config_respects_override() {
        let config = Config {
            network: Some(NetworkConfig {
                requests_per_second: Some(10),
                gateway_base_url: Some("https://example.test/v1/chat".to_string()),
                gateway_timeout_secs: Some(5),
            }),
            ..Default::default()
        };
        assert_eq!(config.vlm_requests_per_second(), 10);
        assert_eq!(config.vlm_gateway_base_url().as_deref(), Some("https://example.test/v1/chat"));
        assert_eq!(config.vlm_gateway_timeout(), std::time::Duration::from_secs(5));
    }

    #[test]
    fn indexing_idle_threshold_and_rescan_interval_defaults() {
        let config = Config::default();
        assert_eq!(config.idle_threshold_secs(), DEFAULT_IDLE_THRESHOLD_SECS);
        assert_eq!(
            config.stale_folder_rescan_interval(),
            std::time::Duration::from_secs(DEFAULT_STALE_FOLDER_RESCAN_INTERVAL_SECS)
        );
    }

    #[test]
    fn indexing_idle_threshold_and_rescan_interval_respect_override() {
        let config = Config {
            indexing: Some(IndexingConfig {
                idle_threshold_secs: Some(60),
                stale_folder_rescan_interval_secs: Some(120),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.idle_threshold_secs(), 60);
        assert_eq!(config.stale_folder_rescan_interval(), std::time::Duration::from_secs(120));
    }

    #[test]
    fn max_concurrent_vlm_calls_default_and_override() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_vlm_calls(), DEFAULT_MAX_CONCURRENT_VLM_CALLS);

        let config = Config {
            resources: Some(ResourceConfig {
                max_concurrent_vlm_calls: Some(8),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.max_concurrent_vlm_calls(), 8);
    }
}
