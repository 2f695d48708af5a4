//! Application configuration for PromptForge.
//!
//! User config lives at `~/.promptforge/promptforge.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PromptForgeError, Result};
use crate::types::{EnrichmentMode, EnrichmentOptions, Language};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "promptforge.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".promptforge";

// ---------------------------------------------------------------------------
// Config structs (matching promptforge.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Pipeline defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Embedding provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Quality judge settings (agent mode).
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Reference corpus settings.
    #[serde(default)]
    pub corpus: CorpusConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default enrichment mode.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Default token budget for merged content.
    #[serde(default = "default_token_budget")]
    pub max_token_budget: usize,

    /// Default candidate cap per gap.
    #[serde(default = "default_per_gap")]
    pub max_candidates_per_gap: usize,

    /// Default total candidate cap.
    #[serde(default = "default_total")]
    pub max_total_candidates: usize,

    /// Default relevance floor for the strict ladder rung.
    #[serde(default = "default_min_relevance")]
    pub min_relevance_score: f32,

    /// Output language: "en" or "tr".
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            max_token_budget: default_token_budget(),
            max_candidates_per_gap: default_per_gap(),
            max_total_candidates: default_total(),
            min_relevance_score: default_min_relevance(),
            language: default_language(),
        }
    }
}

fn default_mode() -> String {
    "fast".into()
}
fn default_token_budget() -> usize {
    500
}
fn default_per_gap() -> usize {
    3
}
fn default_total() -> usize {
    8
}
fn default_min_relevance() -> f32 {
    0.65
}
fn default_language() -> String {
    "en".into()
}

/// `[provider]` section — embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible embeddings endpoint.
    #[serde(default = "default_embed_endpoint")]
    pub embed_endpoint: String,

    /// Embedding model identifier. Also partitions the embedding cache.
    #[serde(default = "default_embed_model")]
    pub embed_model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            embed_endpoint: default_embed_endpoint(),
            embed_model: default_embed_model(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_embed_endpoint() -> String {
    "https://api.openai.com/v1/embeddings".into()
}
fn default_embed_model() -> String {
    "text-embedding-3-small".into()
}

/// `[judge]` section — external quality scorer used by agent mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Judge HTTP endpoint; agent mode degrades to a single pass when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Stop iterating once this score is reached.
    #[serde(default = "default_target_score")]
    pub target_score: u32,

    /// Iteration cap (hard cap 5 applies regardless).
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            target_score: default_target_score(),
            max_iterations: default_max_iterations(),
        }
    }
}

fn default_target_score() -> u32 {
    90
}
fn default_max_iterations() -> usize {
    3
}

/// `[corpus]` section — the searchable reference library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Path to the corpus JSON export. A missing file means an empty library.
    #[serde(default = "default_corpus_path")]
    pub path: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: default_corpus_path(),
        }
    }
}

fn default_corpus_path() -> String {
    "~/.promptforge/prompts-export.json".into()
}

// ---------------------------------------------------------------------------
// Runtime options (merged from config + CLI flags)
// ---------------------------------------------------------------------------

impl From<&AppConfig> for EnrichmentOptions {
    fn from(config: &AppConfig) -> Self {
        let mode = config
            .defaults
            .mode
            .parse::<EnrichmentMode>()
            .unwrap_or(EnrichmentMode::Fast);
        let language = config
            .defaults
            .language
            .parse::<Language>()
            .unwrap_or_default();

        Self {
            mode,
            max_candidates_per_gap: config.defaults.max_candidates_per_gap,
            max_total_candidates: config.defaults.max_total_candidates,
            max_token_budget: config.defaults.max_token_budget,
            min_relevance_score: config.defaults.min_relevance_score,
            language,
            domain: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.promptforge/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PromptForgeError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.promptforge/promptforge.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PromptForgeError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PromptForgeError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PromptForgeError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PromptForgeError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PromptForgeError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~/` in a configured path against the user's home.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Check whether the embedding API key env var is set and non-empty.
///
/// A missing key is not fatal — the retriever degrades to lexical search —
/// so this returns a bool for the CLI to warn on, not an error.
pub fn has_api_key(config: &AppConfig) -> bool {
    matches!(std::env::var(&config.provider.api_key_env), Ok(val) if !val.is_empty())
}
