//! Run configuration: `trellis.toml`, `.env` and `TRELLIS_*` overrides

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use trellis_classify::{ClassifyLimits, RuleCatalog};
use trellis_indexer::{DEFAULT_MAX_DEPTH, DEFAULT_SIZE_BUDGET, PlatformSchema, SplitConfig};

pub const CONFIG_FILE: &str = "trellis.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub platform: String,
    /// Platform schema file; the built-in schema for `platform` when unset.
    pub schema: Option<PathBuf>,
    /// Rule catalog file; the built-in catalog for `platform` when unset.
    pub rules: Option<PathBuf>,
    pub split: SplitSettings,
    pub classifier: ClassifierSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitSettings {
    pub size_budget: usize,
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// `rules` or `remote`.
    pub provider: String,
    pub endpoint: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_concurrency: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Directory holding `.trellis/`; the working root when unset.
    pub root: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            platform: "tableau".to_string(),
            schema: None,
            rules: None,
            split: SplitSettings::default(),
            classifier: ClassifierSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl Default for SplitSettings {
    fn default() -> Self {
        SplitSettings {
            size_budget: DEFAULT_SIZE_BUDGET,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        let limits = ClassifyLimits::default();
        ClassifierSettings {
            provider: "rules".to_string(),
            endpoint: None,
            api_key: None,
            max_concurrency: limits.max_concurrency,
            timeout_secs: limits.timeout.as_secs(),
            max_retries: limits.max_retries,
            initial_backoff_ms: limits.initial_backoff.as_millis() as u64,
            max_backoff_ms: limits.max_backoff.as_millis() as u64,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            enabled: true,
            root: None,
        }
    }
}

impl RunConfig {
    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            size_budget: self.split.size_budget,
            max_depth: self.split.max_depth,
        }
    }

    pub fn limits(&self) -> ClassifyLimits {
        ClassifyLimits {
            max_concurrency: self.classifier.max_concurrency.max(1),
            timeout: Duration::from_secs(self.classifier.timeout_secs),
            max_retries: self.classifier.max_retries,
            initial_backoff: Duration::from_millis(self.classifier.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.classifier.max_backoff_ms),
        }
    }

    pub fn load_schema(&self) -> Result<PlatformSchema> {
        match &self.schema {
            Some(path) => PlatformSchema::from_path(path)
                .with_context(|| format!("Failed to load platform schema {}", path.display())),
            None => PlatformSchema::builtin(&self.platform)
                .ok_or_else(|| anyhow!("No built-in schema for platform '{}'; set `schema`", self.platform))?
                .context("Built-in platform schema is invalid"),
        }
    }

    pub fn load_catalog(&self) -> Result<RuleCatalog> {
        match &self.rules {
            Some(path) => {
                RuleCatalog::from_path(path).with_context(|| format!("Failed to load rule catalog {}", path.display()))
            }
            None => RuleCatalog::builtin(&self.platform)
                .ok_or_else(|| anyhow!("No built-in rule catalog for platform '{}'; set `rules`", self.platform))?
                .context("Built-in rule catalog is invalid"),
        }
    }

    /// Apply `TRELLIS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(platform) = var("TRELLIS_PLATFORM") {
            self.platform = platform;
        }
        if let Some(provider) = var("TRELLIS_CLASSIFIER") {
            self.classifier.provider = provider;
        }
        if let Some(endpoint) = var("TRELLIS_CLASSIFIER_URL") {
            self.classifier.endpoint = Some(endpoint);
        }
        if let Some(key) = var("TRELLIS_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Some(limit) = var("TRELLIS_MAX_CONCURRENCY") {
            self.classifier.max_concurrency = limit
                .trim()
                .parse()
                .with_context(|| format!("TRELLIS_MAX_CONCURRENCY is not a number: {}", limit))?;
        }
        Ok(())
    }

    /// Relative schema, rules and cache paths are taken from `base`.
    fn anchor(&mut self, base: &Path) {
        for path in [&mut self.schema, &mut self.rules, &mut self.cache.root].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

/// Read a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        return Ok(RunConfig::default());
    }

    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: RunConfig = toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}

/// Configuration for a run rooted at `root`: `.env`, then `trellis.toml`,
/// then the environment.
pub fn load(root: &Path) -> Result<RunConfig> {
    match dotenvy::from_path(root.join(".env")) {
        Ok(()) => tracing::debug!("Loaded {}", root.join(".env").display()),
        Err(e) if e.not_found() => {}
        Err(e) => return Err(e).context("Failed to read .env"),
    }

    let mut config = load_config(&root.join(CONFIG_FILE))?;
    config.anchor(root);
    if config.cache.root.is_none() {
        config.cache.root = Some(root.to_path_buf());
    }
    config.apply_env()?;
    Ok(config)
}
