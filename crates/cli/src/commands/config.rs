use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use h2pc_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key_path: &'static str,
    value: String,
    env_key: &'static str,
}

impl Field {
    fn new(key_path: &'static str, value: impl Into<String>, env_key: &'static str) -> Self {
        Self { key_path, value: value.into(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key_path,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    let backend = match config.llm.backend() {
        Ok(backend) => format!("{} ({})", backend.name(), backend.model_name()),
        Err(error) => format!("<none: {error}>"),
    };
    lines.push(render_line("llm.backend", &backend, "derived".to_string()));

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let messenger = &config.messenger;
    let api_key = config
        .llm
        .openai
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    vec![
        Field::new(
            "messenger.kind",
            messenger.kind.map(|kind| kind.to_string()).unwrap_or_else(|| "<unset>".to_string()),
            "MESSENGER_KIND",
        ),
        Field::new(
            "messenger.bootstrap_servers",
            render_list(&messenger.bootstrap_servers),
            "MESSENGER_BOOTSTRAP_SERVERS",
        ),
        Field::new("messenger.client_id", render_optional(&messenger.client_id), "MESSENGER_CLIENT_ID"),
        Field::new("messenger.group_id", render_optional(&messenger.group_id), "MESSENGER_GROUP_ID"),
        Field::new("messenger.topic_src", render_list(&messenger.topic_src), "MESSENGER_TOPIC_SRC"),
        Field::new("messenger.topic_sink", render_list(&messenger.topic_sink), "MESSENGER_TOPIC_SINK"),
        Field::new(
            "messenger.src_count_min",
            messenger.src_count_min.to_string(),
            "MESSENGER_SRC_COUNT_MIN",
        ),
        Field::new(
            "messenger.src_count_max",
            render_count(messenger.src_count_max),
            "MESSENGER_SRC_COUNT_MAX",
        ),
        Field::new(
            "messenger.sink_count_min",
            messenger.sink_count_min.to_string(),
            "MESSENGER_SINK_COUNT_MIN",
        ),
        Field::new(
            "messenger.sink_count_max",
            render_count(messenger.sink_count_max),
            "MESSENGER_SINK_COUNT_MAX",
        ),
        Field::new(
            "prompt.path",
            config
                .prompt
                .path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            "PROMPT_PATH",
        ),
        Field::new("prompt.verbose", config.prompt.verbose.to_string(), "VERBOSE"),
        Field::new("llm.timeout_secs", config.llm.timeout_secs.to_string(), "H2PC_LLM_TIMEOUT_SECS"),
        Field::new(
            "llm.ollama.base_url",
            render_optional(&config.llm.ollama.base_url),
            "OLLAMA_BASE_URL",
        ),
        Field::new(
            "llm.ollama.model_name",
            render_optional(&config.llm.ollama.model_name),
            "OLLAMA_MODEL_NAME",
        ),
        Field::new("llm.openai.api_key", api_key, "OPENAI_API_KEY"),
        Field::new("llm.openai.base_url", config.llm.openai.base_url.clone(), "OPENAI_BASE_URL"),
        Field::new(
            "llm.openai.model_name",
            render_optional(&config.llm.openai.model_name),
            "OPENAI_MODEL_NAME",
        ),
        Field::new("logging.level", config.logging.level.clone(), "H2PC_LOG_LEVEL"),
        Field::new("logging.format", format!("{:?}", config.logging.format), "H2PC_LOG_FORMAT"),
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for candidate in [env_key.to_string(), env_key.to_ascii_lowercase()] {
        if env::var_os(&candidate).is_some() {
            return format!("env ({candidate})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn render_list(values: &[String]) -> String {
    if values.is_empty() {
        return "<none>".to_string();
    }
    values.join(",")
}

fn render_optional(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "<unset>".to_string())
}

fn render_count(value: Option<usize>) -> String {
    value.map(|count| format!("{count} (not enforced)")).unwrap_or_else(|| "<unset>".to_string())
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{contains_path, field_source, redact_token, render_count, render_list};

    #[test]
    fn redacts_everything_after_the_key_prefix() {
        assert_eq!(redact_token("sk-proj-abcdef"), "sk-***");
        assert_eq!(redact_token("plainsecret"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn nested_key_paths_are_found_in_file_docs() {
        let doc: toml::Value =
            "[llm.ollama]\nbase_url = \"http://localhost:11434\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.ollama.base_url"));
        assert!(!contains_path(&doc, "llm.openai.base_url"));
    }

    #[test]
    fn lists_and_counts_render_placeholders() {
        assert_eq!(render_list(&[]), "<none>");
        assert_eq!(render_list(&["a".to_string(), "b".to_string()]), "a,b");
        assert_eq!(render_count(None), "<unset>");
        assert_eq!(render_count(Some(4)), "4 (not enforced)");
    }

    #[test]
    fn source_prefers_env_then_file_then_default() {
        let doc: toml::Value = "[prompt]\npath = \"prompt.yaml.j2\"\n".parse().expect("toml");
        let path = Path::new("h2pc.toml");

        assert_eq!(
            field_source("prompt.path", "H2PC_TEST_UNSET_KEY", Some(&doc), Some(path)),
            "file (h2pc.toml)"
        );
        assert_eq!(
            field_source("prompt.verbose", "H2PC_TEST_UNSET_KEY", Some(&doc), None),
            "default"
        );

        std::env::set_var("h2pc_test_field_source_key", "1");
        let source =
            field_source("prompt.path", "H2PC_TEST_FIELD_SOURCE_KEY", Some(&doc), Some(path));
        std::env::remove_var("h2pc_test_field_source_key");
        assert_eq!(source, "env (h2pc_test_field_source_key)");
    }
}
