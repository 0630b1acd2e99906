//! Configuration management
//!
//! Configuration is resolved in this order:
//! 1. Environment variables
//! 2. `huddle.toml` configuration file
//! 3. Default values
//!
//! `${VAR_NAME}` inside the configuration file is expanded from the environment.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestration::ExhaustionPolicy;
use crate::Error;

/// LLM Provider type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Anthropic Claude API
    #[default]
    Claude,
    /// OpenAI-compatible API
    OpenAi,
}

impl LlmProvider {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "openai" | "groq" | "deepseek" | "glm" => LlmProvider::OpenAi,
            _ => LlmProvider::Claude,
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API key
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// API provider
    #[serde(default)]
    pub provider: LlmProvider,

    /// Base URL (optional, for custom endpoints)
    pub base_url: Option<String>,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            provider: LlmProvider::Claude,
            base_url: None,
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u64 {
    2048
}

fn default_llm_timeout() -> u64 {
    60
}

/// Bounds and deadlines for the orchestration engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationConfig {
    /// Upper bound on sub-queries produced by one decomposition
    pub max_subqueries: usize,
    /// Routing hops a supervisor may take before it is exhausted
    pub max_hops: usize,
    /// Sub-queries executed at the same time
    pub max_concurrency: usize,
    /// Outer deadline for the whole dispatch
    pub dispatch_deadline_secs: u64,
    /// Deadline for the synthesis call
    pub synthesis_timeout_secs: u64,
    /// What an exhausted supervisor returns
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            max_subqueries: 7,
            max_hops: 4,
            max_concurrency: 8,
            dispatch_deadline_secs: 120,
            synthesis_timeout_secs: 60,
            on_exhausted: ExhaustionPolicy::BestPartial,
        }
    }
}

impl OrchestrationConfig {
    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_secs(self.dispatch_deadline_secs)
    }

    pub fn synthesis_timeout(&self) -> Duration {
        Duration::from_secs(self.synthesis_timeout_secs)
    }

    /// Reject bounds that would make the engine unable to answer anything
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_subqueries == 0 {
            return Err(Error::Config("max_subqueries must be at least 1".to_string()));
        }
        if self.max_hops == 0 {
            return Err(Error::Config("max_hops must be at least 1".to_string()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Where domain definitions live and which one is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsConfig {
    /// Directory holding `<name>.toml` domain files
    pub dir: PathBuf,
    /// Domain used when none is requested explicitly
    pub default: String,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("domains"),
            default: "nba".to_string(),
        }
    }
}

/// Settings shared by the built-in tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// API key for the web search tool
    pub search_api_key: Option<String>,
    /// Base URL of the web search API
    pub search_base_url: String,
    /// Timeout for tool HTTP requests
    pub http_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_api_key: None,
            search_base_url: "https://api.tavily.com".to_string(),
            http_timeout_secs: 30,
        }
    }
}

/// Main configuration for huddle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub orchestration: OrchestrationConfig,

    #[serde(default)]
    pub domains: DomainsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Expand `${VAR_NAME}` references from the environment
    ///
    /// Unknown variables expand to an empty string.
    pub fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                while let Some(c) = chars.next() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        cfg.orchestration.validate()?;

        Ok(cfg)
    }

    /// Parse configuration from TOML text (environment references expanded)
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let config: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        Ok(Self::from_toml_config(config))
    }

    /// Load from `./huddle.toml` if present, otherwise from the environment only
    pub fn load() -> crate::Result<Self> {
        if Path::new("huddle.toml").exists() {
            return Self::from_toml_file("huddle.toml");
        }

        Self::from_env()
    }

    /// Build Config from the TOML structure
    fn from_toml_config(toml: TomlConfig) -> Self {
        let llm = toml.llm.unwrap_or_default();
        let llm_config = LlmConfig {
            api_key: llm.api_key.unwrap_or_default(),
            model: llm.model.unwrap_or_else(default_model),
            provider: LlmProvider::parse(&llm.provider.unwrap_or_default()),
            base_url: llm.base_url,
            max_tokens: llm.max_tokens.unwrap_or_else(default_max_tokens),
            timeout_secs: llm.timeout_secs.unwrap_or_else(default_llm_timeout),
        };

        let defaults = OrchestrationConfig::default();
        let orchestration = toml.orchestration.unwrap_or_default();
        let orchestration_config = OrchestrationConfig {
            max_subqueries: orchestration.max_subqueries.unwrap_or(defaults.max_subqueries),
            max_hops: orchestration.max_hops.unwrap_or(defaults.max_hops),
            max_concurrency: orchestration.max_concurrency.unwrap_or(defaults.max_concurrency),
            dispatch_deadline_secs: orchestration
                .dispatch_deadline_secs
                .unwrap_or(defaults.dispatch_deadline_secs),
            synthesis_timeout_secs: orchestration
                .synthesis_timeout_secs
                .unwrap_or(defaults.synthesis_timeout_secs),
            on_exhausted: orchestration.on_exhausted.unwrap_or(defaults.on_exhausted),
        };

        let domain_defaults = DomainsConfig::default();
        let domains = toml.domains.unwrap_or_default();
        let domains_config = DomainsConfig {
            dir: domains.dir.map(PathBuf::from).unwrap_or(domain_defaults.dir),
            default: domains.default.unwrap_or(domain_defaults.default),
        };

        let tool_defaults = ToolsConfig::default();
        let tools = toml.tools.unwrap_or_default();
        let tools_config = ToolsConfig {
            search_api_key: tools.search_api_key.filter(|k| !k.is_empty()),
            search_base_url: tools.search_base_url.unwrap_or(tool_defaults.search_base_url),
            http_timeout_secs: tools.http_timeout_secs.unwrap_or(tool_defaults.http_timeout_secs),
        };

        Config {
            llm: llm_config,
            orchestration: orchestration_config,
            domains: domains_config,
            tools: tools_config,
        }
    }

    /// Override values with environment variables
    fn apply_env_overrides(&mut self) {
        if let Some(api_key) = non_empty_env("LLM_API_KEY") {
            self.llm.api_key = api_key;
        }
        if let Some(model) = non_empty_env("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(provider) = non_empty_env("LLM_PROVIDER") {
            self.llm.provider = LlmProvider::parse(&provider);
        }
        if let Some(base_url) = non_empty_env("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }

        if let Some(n) = parsed_env("HUDDLE_MAX_SUBQUERIES") {
            self.orchestration.max_subqueries = n;
        }
        if let Some(n) = parsed_env("HUDDLE_MAX_HOPS") {
            self.orchestration.max_hops = n;
        }
        if let Some(n) = parsed_env("HUDDLE_MAX_CONCURRENCY") {
            self.orchestration.max_concurrency = n;
        }
        if let Some(secs) = parsed_env("HUDDLE_DISPATCH_DEADLINE_SECS") {
            self.orchestration.dispatch_deadline_secs = secs;
        }
        if let Some(policy) = non_empty_env("HUDDLE_ON_EXHAUSTED") {
            match policy.to_lowercase().as_str() {
                "fail" => self.orchestration.on_exhausted = ExhaustionPolicy::Fail,
                "best_partial" => self.orchestration.on_exhausted = ExhaustionPolicy::BestPartial,
                other => tracing::warn!("Ignoring unknown HUDDLE_ON_EXHAUSTED value: {}", other),
            }
        }

        if let Some(dir) = non_empty_env("HUDDLE_DOMAINS_DIR") {
            self.domains.dir = PathBuf::from(dir);
        }
        if let Some(domain) = non_empty_env("HUDDLE_DOMAIN") {
            self.domains.default = domain;
        }

        if let Some(key) = non_empty_env("TAVILY_API_KEY") {
            self.tools.search_api_key = Some(key);
        }
    }

    /// Load configuration from environment variables over the defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        cfg.orchestration.validate()?;
        Ok(cfg)
    }

    /// Get the effective LLM configuration
    pub fn llm_config(&self) -> &LlmConfig {
        &self.llm
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_env(key).and_then(|v| v.parse().ok())
}

// ============================================================================
// TOML file structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    orchestration: Option<TomlOrchestrationConfig>,
    domains: Option<TomlDomainsConfig>,
    tools: Option<TomlToolsConfig>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlLlmConfig {
    /// "claude" or "openai"
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    max_tokens: Option<u64>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlOrchestrationConfig {
    max_subqueries: Option<usize>,
    max_hops: Option<usize>,
    max_concurrency: Option<usize>,
    dispatch_deadline_secs: Option<u64>,
    synthesis_timeout_secs: Option<u64>,
    on_exhausted: Option<ExhaustionPolicy>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlDomainsConfig {
    dir: Option<String>,
    default: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlToolsConfig {
    search_api_key: Option<String>,
    search_base_url: Option<String>,
    http_timeout_secs: Option<u64>,
}
