use std::time::Duration;

use h2pc_agent::llm::{build_llm, LlmError};
use h2pc_agent::prompt::{PromptError, PromptRenderer};
use h2pc_agent::runtime::AgentRuntime;
use h2pc_core::config::{AppConfig, ConfigError};
use h2pc_core::domain::message::Message;
use h2pc_messenger::MessengerError;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error("completion backend setup failed: {0}")]
    Llm(#[from] LlmError),
    #[error("messenger setup failed: {0}")]
    Messenger(#[from] MessengerError),
}

/// Builds every collaborator of the agent from an already validated config.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let prompt_path = config.prompt.path()?;
    let renderer = PromptRenderer::from_path(prompt_path)?;
    info!(
        event_name = "system.bootstrap.prompt_loaded",
        path = %prompt_path.display(),
        "prompt template compiled"
    );

    let backend = config.llm.backend()?;
    let llm = build_llm(&backend, Duration::from_secs(config.llm.timeout_secs))?;
    info!(
        event_name = "system.bootstrap.llm_selected",
        backend = backend.name(),
        model = backend.model_name(),
        "completion backend selected"
    );

    let messenger = h2pc_messenger::connect::<Message, Message>(&config.messenger).await?;
    info!(
        event_name = "system.bootstrap.messenger_ready",
        messenger_kind = %config.messenger.kind()?,
        "messenger ready"
    );

    let agent_runtime =
        AgentRuntime::new(messenger, llm, renderer, config.messenger.sink_count_min)
            .with_verbose(config.prompt.verbose);

    Ok(Application { config, agent_runtime })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use h2pc_core::config::{AppConfig, ConfigError, LoadOptions};

    use super::{bootstrap_with_config, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        let config = AppConfig::load(options)?;
        bootstrap_with_config(config).await
    }

    const TEMPLATE: &str = "inputs:\n{% for input in inputs %}\n  - role: {{ input.role }}\n    content: {{ input.content | json_encode() }}\n{% endfor %}\n";

    fn write_config(dir: &Path, prompt_path: &Path, llm: &str) -> LoadOptions {
        let config_path = dir.join("h2pc.toml");
        let body = format!(
            r#"
[messenger]
kind = "nats"
bootstrap_servers = "nats://127.0.0.1:4222"
group_id = "bootstrap-test"
topic_src = "questions"
topic_sink = "answers"

[prompt]
path = "{}"

{llm}
"#,
            prompt_path.display()
        );
        fs::write(&config_path, body).expect("write config");
        LoadOptions { config_path: Some(config_path), require_file: true, ..LoadOptions::default() }
    }

    const OLLAMA: &str = "[llm.ollama]\nbase_url = \"http://127.0.0.1:11434\"\nmodel_name = \"llama3\"\n";

    #[tokio::test]
    async fn bootstrap_wires_agent_without_touching_the_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prompt_path = dir.path().join("prompt.j2");
        fs::write(&prompt_path, TEMPLATE).expect("write template");

        let app = bootstrap(write_config(dir.path(), &prompt_path, OLLAMA))
            .await
            .expect("bootstrap should succeed with a lazy messenger");

        assert_eq!(app.config.messenger.group_id.as_deref(), Some("bootstrap-test"));
        assert_eq!(app.config.llm.backend().expect("backend").name(), "ollama");
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_completion_backend() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prompt_path = dir.path().join("prompt.j2");
        fs::write(&prompt_path, TEMPLATE).expect("write template");

        let result = bootstrap(write_config(dir.path(), &prompt_path, "")).await;

        let error = result.err().expect("missing backend must fail");
        assert!(matches!(error, BootstrapError::Config(ConfigError::Validation(_))), "{error:?}");
        assert!(error.to_string().contains("no completion backend"));
    }

    #[tokio::test]
    async fn bootstrap_fails_on_missing_template() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prompt_path = dir.path().join("missing.j2");

        let result = bootstrap(write_config(dir.path(), &prompt_path, OLLAMA)).await;

        assert!(matches!(result, Err(BootstrapError::Prompt(_))));
    }
}
