//! Application configuration for MeetNews.
//!
//! User config lives at `~/.meetnews/meetnews.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file; it names the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MeetNewsError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "meetnews.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".meetnews";

// ---------------------------------------------------------------------------
// Config structs (matching meetnews.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub ranking: RankingConfig,

    #[serde(default)]
    pub summarize: SummarizeConfig,

    #[serde(default)]
    pub queues: QueuesConfig,
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. A leading `~/` expands to home.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl DatabaseConfig {
    /// The database path with `~/` expanded.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match self.path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    MeetNewsError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.path)),
        }
    }
}

fn default_db_path() -> String {
    "~/.meetnews/meetnews.db".into()
}

/// `[search]` section (Google Custom Search JSON API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Env var holding the API key.
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,

    /// Env var holding the search engine id (`cx`).
    #[serde(default = "default_engine_id_env")]
    pub engine_id_env: String,

    /// Total number of results requested per search.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    /// Page size of a single API request (the API caps this at 10).
    #[serde(default = "default_results_per_request")]
    pub results_per_request: u32,

    /// Appended to the joined keywords.
    #[serde(default = "default_query_suffix")]
    pub query_suffix: String,

    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            api_key_env: default_search_key_env(),
            engine_id_env: default_engine_id_env(),
            result_count: default_result_count(),
            results_per_request: default_results_per_request(),
            query_suffix: default_query_suffix(),
            timeout_secs: default_search_timeout(),
        }
    }
}

fn default_search_endpoint() -> String {
    "https://www.googleapis.com/customsearch/v1".into()
}
fn default_search_key_env() -> String {
    "CUSTOM_SEARCH_JSON_API_KEY".into()
}
fn default_engine_id_env() -> String {
    "CUSTOM_SEARCH_ENGINE_API_KEY".into()
}
fn default_result_count() -> u32 {
    50
}
fn default_results_per_request() -> u32 {
    10
}
fn default_query_suffix() -> String {
    " news -filetype:pdf".into()
}
fn default_search_timeout() -> u64 {
    30
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum concurrent article fetches.
    #[serde(default = "default_fetch_concurrency")]
    pub concurrency: u32,

    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Extracted body text is cut to this many characters.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_fetch_concurrency(),
            timeout_secs: default_fetch_timeout(),
            max_chars: default_max_chars(),
        }
    }
}

fn default_fetch_concurrency() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(4)
}
fn default_fetch_timeout() -> u64 {
    20
}
fn default_max_chars() -> usize {
    20_000
}

/// `[ranking]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingConfig {
    /// Hugging Face sentence-transformer model id.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Prefer CUDA/Metal when compiled in and present.
    #[serde(default = "default_true")]
    pub use_gpu: bool,

    /// Token limit per text.
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// How long the orchestrator waits on a delegated ranking task.
    #[serde(default = "default_delegate_timeout")]
    pub delegate_timeout_secs: u64,

    /// Items kept, in fetch order, when ranking is unavailable.
    #[serde(default = "default_top_k")]
    pub fallback_count: usize,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            top_k: default_top_k(),
            use_gpu: true,
            max_length: default_max_length(),
            batch_size: default_batch_size(),
            delegate_timeout_secs: default_delegate_timeout(),
            fallback_count: default_top_k(),
        }
    }
}

fn default_model_id() -> String {
    "sentence-transformers/paraphrase-multilingual-MiniLM-L12-v2".into()
}
fn default_top_k() -> usize {
    5
}
fn default_true() -> bool {
    true
}
fn default_max_length() -> usize {
    128
}
fn default_batch_size() -> usize {
    32
}
fn default_delegate_timeout() -> u64 {
    300
}

/// `[summarize]` section (Gemini `generateContent`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizeConfig {
    #[serde(default = "default_gemini_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    /// Env var holding the API key.
    #[serde(default = "default_gemini_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_summarize_timeout")]
    pub timeout_secs: u64,

    /// Article text sent to the model is cut to this many characters.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Stored as the summary when summarization fails. Unset leaves it absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_placeholder: Option<String>,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gemini_endpoint(),
            model: default_gemini_model(),
            api_key_env: default_gemini_key_env(),
            timeout_secs: default_summarize_timeout(),
            max_input_chars: default_max_input_chars(),
            failure_placeholder: None,
        }
    }
}

fn default_gemini_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}
fn default_gemini_model() -> String {
    "gemini-2.5-flash-lite".into()
}
fn default_gemini_key_env() -> String {
    "GEMINI_API_KEY".into()
}
fn default_summarize_timeout() -> u64 {
    60
}
fn default_max_input_chars() -> usize {
    12_000
}

/// `[queues]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    /// Workers on the general-purpose queue.
    #[serde(default = "default_default_concurrency")]
    pub default_concurrency: u32,

    /// Workers on the ranking queue.
    #[serde(default = "default_dedicated_concurrency")]
    pub dedicated_concurrency: u32,

    /// Seconds between database polls in `meetnews worker`.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Pending records claimed per poll.
    #[serde(default = "default_poll_batch_size")]
    pub poll_batch_size: u32,

    /// Static route overrides, validated at startup.
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            default_concurrency: default_default_concurrency(),
            dedicated_concurrency: default_dedicated_concurrency(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_batch_size: default_poll_batch_size(),
            routes: Vec::new(),
        }
    }
}

fn default_default_concurrency() -> u32 {
    4
}
fn default_dedicated_concurrency() -> u32 {
    1
}
fn default_poll_interval_secs() -> u64 {
    5
}
fn default_poll_batch_size() -> u32 {
    16
}

/// `[[queues.routes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Task kind name, e.g. `process_news`.
    pub task: String,
    /// Queue name, `default` or `dedicated`.
    pub queue: String,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.meetnews/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MeetNewsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.meetnews/meetnews.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| MeetNewsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| MeetNewsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MeetNewsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MeetNewsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MeetNewsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a secret from the named env var. Unset or empty yields `None`.
pub fn read_secret(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}
