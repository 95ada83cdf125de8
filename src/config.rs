use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Openai,
    Openrouter,
    Ollama,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Openai => write!(f, "openai"),
            LlmProvider::Openrouter => write!(f, "openrouter"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

/// Which chats the relay answers in.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatFilter {
    #[default]
    All,
    /// One-to-one chats only; groups and channels are acknowledged silently.
    Private,
}

impl FromStr for ChatFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ChatFilter::All),
            "private" => Ok(ChatFilter::Private),
            other => bail!("unknown chat filter '{}' (expected 'all' or 'private')", other),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_telegram_api_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub chat_filter: ChatFilter,
}

impl TelegramConfig {
    /// The shared secret expected in the webhook header, if one is configured.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// `false` or `"none"` leaves the temperature out of requests.
    #[serde(
        default = "default_temperature",
        deserialize_with = "deserialize_temperature"
    )]
    pub temperature: Option<f32>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Returns the effective base_url: if the stored value is empty,
    /// fall back to the canonical URL for the configured provider.
    pub fn effective_base_url(&self) -> &str {
        if !self.base_url.is_empty() {
            return self.base_url.trim_end_matches('/');
        }
        match self.provider {
            LlmProvider::Openai => "https://api.openai.com/v1",
            LlmProvider::Openrouter => "https://openrouter.ai/api/v1",
            LlmProvider::Ollama => "http://localhost:11434/v1",
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_num_results")]
    pub num_results: usize,
}

impl SearchConfig {
    /// Web search is only offered to the model when a key is present.
    pub fn is_enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct MemoryConfig {
    /// SQLite file holding the chat history schema. Unset means no database.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_telegram_config")]
    pub telegram: TelegramConfig,
    #[serde(default = "default_llm_config")]
    pub llm: LlmConfig,
    #[serde(default = "default_search_config")]
    pub search: SearchConfig,
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("webhook_secret", &redact(self.webhook_secret().unwrap_or("")))
            .field("api_base_url", &self.api_base_url)
            .field("chat_filter", &self.chat_filter)
            .finish()
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("base_url", &self.effective_base_url())
            .field("api_key", &redact(&self.api_key))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl std::fmt::Debug for SearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("endpoint", &self.endpoint)
            .field("num_results", &self.num_results)
            .finish()
    }
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> Option<f32> {
    Some(0.2)
}

fn deserialize_temperature<'de, D>(deserializer: D) -> std::result::Result<Option<f32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f32),
        Flag(bool),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(t) => Ok(Some(t)),
        Raw::Flag(false) => Ok(None),
        Raw::Flag(true) => Ok(default_temperature()),
        Raw::Text(text) => parse_temperature(&text).map_err(serde::de::Error::custom),
    }
}

/// A number, or `none`/`off`/`false` to send no temperature at all.
fn parse_temperature(value: &str) -> Result<Option<f32>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "none" | "off" | "false" => Ok(None),
        number => number
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("expected a number or \"none\": {}", e)),
    }
}

fn default_system_prompt() -> String {
    "You are a friendly and concise assistant. \
     Answer in the language the user writes in."
        .to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_search_endpoint() -> String {
    "https://api.exa.ai/search".to_string()
}

fn default_num_results() -> usize {
    3
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_telegram_config() -> TelegramConfig {
    TelegramConfig {
        bot_token: String::new(),
        webhook_secret: None,
        api_base_url: default_telegram_api_url(),
        chat_filter: ChatFilter::default(),
    }
}

fn default_llm_config() -> LlmConfig {
    LlmConfig {
        provider: LlmProvider::default(),
        model: default_model(),
        base_url: String::new(),
        api_key: String::new(),
        max_tokens: default_max_tokens(),
        temperature: default_temperature(),
        system_prompt: default_system_prompt(),
        timeout_secs: default_llm_timeout(),
    }
}

fn default_search_config() -> SearchConfig {
    SearchConfig {
        api_key: String::new(),
        endpoint: default_search_endpoint(),
        num_results: default_num_results(),
    }
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

/// Parses an environment value, naming the variable on failure.
fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e))
}

impl Config {
    /// Loads the optional TOML file at `path`, then applies environment
    /// overrides. A missing file is not an error: everything can come from
    /// the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`] but without checking for credentials, for
    /// commands that never talk to Telegram or the model.
    pub fn read(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))
            }
        };

        Self::merge_sources(content.as_deref(), |key| std::env::var(key).ok())
    }

    /// Builds and validates the configuration from file content and an
    /// environment lookup. Empty environment values count as unset.
    pub fn from_sources<F>(file: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self::merge_sources(file, env)?;
        config.validate()?;
        Ok(config)
    }

    fn merge_sources<F>(file: Option<&str>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config =
            toml::from_str(file.unwrap_or("")).context("Failed to parse config file")?;

        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = env("TELEGRAM_TOKEN") {
            config.telegram.bot_token = token.trim().to_string();
        }
        if let Some(secret) = env("WEBHOOK_SECRET") {
            config.telegram.webhook_secret = Some(secret);
        }
        if let Some(filter) = env("CHAT_FILTER") {
            config.telegram.chat_filter = parse_env("CHAT_FILTER", &filter)?;
        }
        if let Some(key) = env("OPENAI_API_KEY") {
            config.llm.api_key = key.trim().to_string();
        }
        if let Some(model) = env("LLM_MODEL") {
            config.llm.model = model;
        }
        if let Some(base_url) = env("LLM_BASE_URL") {
            config.llm.base_url = base_url;
        }
        if let Some(max_tokens) = env("LLM_MAX_TOKENS") {
            config.llm.max_tokens = parse_env("LLM_MAX_TOKENS", &max_tokens)?;
        }
        if let Some(temperature) = env("LLM_TEMPERATURE") {
            config.llm.temperature = parse_temperature(&temperature)
                .map_err(|e| anyhow::anyhow!("Invalid value for LLM_TEMPERATURE: {}", e))?;
        }
        if let Some(key) = env("SEARCH_API_KEY") {
            config.search.api_key = key.trim().to_string();
        }
        if let Some(port) = env("PORT") {
            config.server.port = parse_env("PORT", &port)?;
        }
        if let Some(path) = env("HISTORY_DB_PATH") {
            config.memory.database_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            bail!(
                "TELEGRAM_TOKEN is not set. Export it (or put it in .env) \
                 or set telegram.bot_token in the config file"
            );
        }
        if self.llm.api_key.is_empty() && self.llm.provider != LlmProvider::Ollama {
            bail!(
                "OPENAI_API_KEY is not set. Export it (or put it in .env) \
                 or set llm.api_key in the config file"
            );
        }
        if self.llm.max_tokens == 0 {
            bail!("llm.max_tokens must be greater than zero");
        }
        if self.search.num_results == 0 {
            bail!("search.num_results must be greater than zero");
        }
        Ok(())
    }
}
