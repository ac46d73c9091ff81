use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Every environment variable [`AppConfig::load`] reads.
pub const ENV_KEYS: &[&str] = &[
    "MESSENGER_KIND",
    "MESSENGER_BOOTSTRAP_SERVERS",
    "MESSENGER_CLIENT_ID",
    "MESSENGER_GROUP_ID",
    "MESSENGER_TOPIC_SRC",
    "MESSENGER_TOPIC_SINK",
    "MESSENGER_SRC_COUNT_MIN",
    "MESSENGER_SRC_COUNT_MAX",
    "MESSENGER_SINK_COUNT_MIN",
    "MESSENGER_SINK_COUNT_MAX",
    "PROMPT_PATH",
    "VERBOSE",
    "OLLAMA_BASE_URL",
    "OLLAMA_MODEL_NAME",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_MODEL_NAME",
    "H2PC_LLM_TIMEOUT_SECS",
    "H2PC_LOG_LEVEL",
    "H2PC_LOG_FORMAT",
];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub messenger: MessengerConfig,
    pub prompt: PromptConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct MessengerConfig {
    pub kind: Option<MessengerKind>,
    pub bootstrap_servers: Vec<String>,
    pub client_id: Option<String>,
    pub group_id: Option<String>,
    pub topic_src: Vec<String>,
    pub topic_sink: Vec<String>,
    pub src_count_min: usize,
    /// Read but not enforced by batching.
    pub src_count_max: Option<usize>,
    pub sink_count_min: usize,
    /// Read but not enforced by the sink loop.
    pub sink_count_max: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct PromptConfig {
    pub path: Option<PathBuf>,
    pub verbose: bool,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub timeout_secs: u64,
    pub ollama: OllamaConfig,
    pub openai: OpenAiConfig,
}

#[derive(Clone, Debug, Default)]
pub struct OllamaConfig {
    pub base_url: Option<String>,
    pub model_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessengerKind {
    Kafka,
    Nats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// The completion backend selected from the configured credentials.
#[derive(Clone, Debug)]
pub enum LlmBackend {
    Ollama { base_url: String, model_name: String },
    OpenAi { api_key: SecretString, base_url: String, model_name: String },
}

impl LlmBackend {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ollama { .. } => "ollama",
            Self::OpenAi { .. } => "openai",
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            Self::Ollama { model_name, .. } | Self::OpenAi { model_name, .. } => model_name,
        }
    }
}

/// Values set by the caller that win over the file and the environment.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub prompt_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            messenger: MessengerConfig {
                kind: None,
                bootstrap_servers: Vec::new(),
                client_id: None,
                group_id: None,
                topic_src: Vec::new(),
                topic_sink: Vec::new(),
                src_count_min: 1,
                src_count_max: None,
                sink_count_min: 1,
                sink_count_max: None,
            },
            prompt: PromptConfig { path: None, verbose: false },
            llm: LlmConfig {
                timeout_secs: 300,
                ollama: OllamaConfig::default(),
                openai: OpenAiConfig {
                    api_key: None,
                    base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
                    model_name: None,
                },
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl MessengerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kafka => "kafka",
            Self::Nats => "nats",
        }
    }
}

impl std::fmt::Display for MessengerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessengerKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "kafka" => Ok(Self::Kafka),
            "nats" => Ok(Self::Nats),
            other => Err(ConfigError::Validation(format!(
                "unsupported messenger kind `{other}` (expected kafka|nats)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl MessengerConfig {
    pub fn kind(&self) -> Result<MessengerKind, ConfigError> {
        self.kind.ok_or_else(|| {
            ConfigError::Validation("messenger.kind is required (expected kafka|nats)".to_string())
        })
    }
}

impl PromptConfig {
    pub fn path(&self) -> Result<&Path, ConfigError> {
        self.path
            .as_deref()
            .ok_or_else(|| ConfigError::Validation("prompt.path is required".to_string()))
    }
}

impl LlmConfig {
    /// Ollama wins when fully configured, then OpenAI; anything else is an error.
    pub fn backend(&self) -> Result<LlmBackend, ConfigError> {
        if let (Some(base_url), Some(model_name)) =
            (non_blank(&self.ollama.base_url), non_blank(&self.ollama.model_name))
        {
            return Ok(LlmBackend::Ollama {
                base_url: base_url.to_string(),
                model_name: model_name.to_string(),
            });
        }

        let api_key = self
            .openai
            .api_key
            .as_ref()
            .filter(|value| !value.expose_secret().trim().is_empty());
        if let (Some(api_key), Some(model_name)) = (api_key, non_blank(&self.openai.model_name)) {
            return Ok(LlmBackend::OpenAi {
                api_key: api_key.clone(),
                base_url: self.openai.base_url.clone(),
                model_name: model_name.to_string(),
            });
        }

        Err(ConfigError::Validation(
            "no completion backend is configured: set ollama_base_url + ollama_model_name \
             or openai_api_key + openai_model_name"
                .to_string(),
        ))
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("h2pc.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(messenger) = patch.messenger {
            if let Some(kind) = messenger.kind {
                self.messenger.kind = Some(kind);
            }
            if let Some(bootstrap_servers) = messenger.bootstrap_servers {
                self.messenger.bootstrap_servers = bootstrap_servers.into_list();
            }
            if let Some(client_id) = messenger.client_id {
                self.messenger.client_id = Some(client_id);
            }
            if let Some(group_id) = messenger.group_id {
                self.messenger.group_id = Some(group_id);
            }
            if let Some(topic_src) = messenger.topic_src {
                self.messenger.topic_src = topic_src.into_list();
            }
            if let Some(topic_sink) = messenger.topic_sink {
                self.messenger.topic_sink = topic_sink.into_list();
            }
            if let Some(src_count_min) = messenger.src_count_min {
                self.messenger.src_count_min = src_count_min;
            }
            if let Some(src_count_max) = messenger.src_count_max {
                self.messenger.src_count_max = Some(src_count_max);
            }
            if let Some(sink_count_min) = messenger.sink_count_min {
                self.messenger.sink_count_min = sink_count_min;
            }
            if let Some(sink_count_max) = messenger.sink_count_max {
                self.messenger.sink_count_max = Some(sink_count_max);
            }
        }

        if let Some(prompt) = patch.prompt {
            if let Some(path) = prompt.path {
                self.prompt.path = Some(path);
            }
            if let Some(verbose) = prompt.verbose {
                self.prompt.verbose = verbose;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(ollama) = llm.ollama {
                if let Some(base_url) = ollama.base_url {
                    self.llm.ollama.base_url = Some(base_url);
                }
                if let Some(model_name) = ollama.model_name {
                    self.llm.ollama.model_name = Some(model_name);
                }
            }
            if let Some(openai) = llm.openai {
                if let Some(openai_api_key_value) = openai.api_key {
                    self.llm.openai.api_key = Some(secret_value(openai_api_key_value));
                }
                if let Some(base_url) = openai.base_url {
                    self.llm.openai.base_url = base_url;
                }
                if let Some(model_name) = openai.model_name {
                    self.llm.openai.model_name = Some(model_name);
                }
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("MESSENGER_KIND") {
            self.messenger.kind = Some(value.parse()?);
        }
        if let Some(value) = read_env_list("MESSENGER_BOOTSTRAP_SERVERS") {
            self.messenger.bootstrap_servers = value;
        }
        if let Some(value) = read_env("MESSENGER_CLIENT_ID") {
            self.messenger.client_id = Some(value);
        }
        if let Some(value) = read_env("MESSENGER_GROUP_ID") {
            self.messenger.group_id = Some(value);
        }
        if let Some(value) = read_env_list("MESSENGER_TOPIC_SRC") {
            self.messenger.topic_src = value;
        }
        if let Some(value) = read_env_list("MESSENGER_TOPIC_SINK") {
            self.messenger.topic_sink = value;
        }
        if let Some(value) = read_env("MESSENGER_SRC_COUNT_MIN") {
            self.messenger.src_count_min = parse_usize("MESSENGER_SRC_COUNT_MIN", &value)?;
        }
        if let Some(value) = read_env("MESSENGER_SRC_COUNT_MAX") {
            self.messenger.src_count_max = Some(parse_usize("MESSENGER_SRC_COUNT_MAX", &value)?);
        }
        if let Some(value) = read_env("MESSENGER_SINK_COUNT_MIN") {
            self.messenger.sink_count_min = parse_usize("MESSENGER_SINK_COUNT_MIN", &value)?;
        }
        if let Some(value) = read_env("MESSENGER_SINK_COUNT_MAX") {
            self.messenger.sink_count_max =
                Some(parse_usize("MESSENGER_SINK_COUNT_MAX", &value)?);
        }

        if let Some(value) = read_env("PROMPT_PATH") {
            self.prompt.path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("VERBOSE") {
            self.prompt.verbose = parse_bool("VERBOSE", &value)?;
        }

        if let Some(value) = read_env("OLLAMA_BASE_URL") {
            self.llm.ollama.base_url = Some(value);
        }
        if let Some(value) = read_env("OLLAMA_MODEL_NAME") {
            self.llm.ollama.model_name = Some(value);
        }
        if let Some(value) = read_env("OPENAI_API_KEY") {
            self.llm.openai.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("OPENAI_BASE_URL") {
            self.llm.openai.base_url = value;
        }
        if let Some(value) = read_env("OPENAI_MODEL_NAME") {
            self.llm.openai.model_name = Some(value);
        }
        if let Some(value) = read_env("H2PC_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("H2PC_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("H2PC_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("H2PC_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(prompt_path) = overrides.prompt_path {
            self.prompt.path = Some(prompt_path);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_messenger(&self.messenger)?;
        validate_prompt(&self.prompt)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Splits a comma-separated list, dropping blank items.
pub fn parse_list(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty()).map(str::to_owned).collect()
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("h2pc.toml"), PathBuf::from("config/h2pc.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_messenger(messenger: &MessengerConfig) -> Result<(), ConfigError> {
    let kind = messenger.kind()?;
    let has_topics = !messenger.topic_src.is_empty() || !messenger.topic_sink.is_empty();

    if has_topics && messenger.bootstrap_servers.is_empty() {
        return Err(ConfigError::Validation(
            "messenger.bootstrap_servers is required when source or sink topics are configured"
                .to_string(),
        ));
    }

    if kind == MessengerKind::Nats && has_topics && non_blank(&messenger.group_id).is_none() {
        return Err(ConfigError::Validation(
            "messenger.group_id is required for nats (it names the stream and the durable consumer)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_prompt(prompt: &PromptConfig) -> Result<(), ConfigError> {
    let path = prompt.path()?;
    if path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("prompt.path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    let base_url = llm.openai.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "llm.openai.base_url must start with http:// or https://".to_string(),
        ));
    }

    llm.backend().map(|_| ())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

/// Settings keys are matched case-insensitively: `MESSENGER_KIND` or `messenger_kind`.
fn read_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .or_else(|| env::var(key.to_ascii_lowercase()).ok())
        .filter(|value| !value.trim().is_empty())
}

/// List keys keep a present but blank value as an explicit empty list.
fn read_env_list(key: &str) -> Option<Vec<String>> {
    env::var(key)
        .ok()
        .or_else(|| env::var(key.to_ascii_lowercase()).ok())
        .map(|value| parse_list(&value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// TOML lists may be written either as arrays or as comma-separated strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPatch {
    Csv(String),
    Items(Vec<String>),
}

impl ListPatch {
    fn into_list(self) -> Vec<String> {
        match self {
            Self::Csv(value) => parse_list(&value),
            Self::Items(items) => {
                items.iter().flat_map(|item| parse_list(item)).collect()
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    messenger: Option<MessengerPatch>,
    prompt: Option<PromptPatch>,
    llm: Option<LlmPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct MessengerPatch {
    kind: Option<MessengerKind>,
    bootstrap_servers: Option<ListPatch>,
    client_id: Option<String>,
    group_id: Option<String>,
    topic_src: Option<ListPatch>,
    topic_sink: Option<ListPatch>,
    src_count_min: Option<usize>,
    src_count_max: Option<usize>,
    sink_count_min: Option<usize>,
    sink_count_max: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PromptPatch {
    path: Option<PathBuf>,
    verbose: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    timeout_secs: Option<u64>,
    ollama: Option<OllamaPatch>,
    openai: Option<OpenAiPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct OllamaPatch {
    base_url: Option<String>,
    model_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
