use std::fs;
use std::path::{Path, PathBuf};

use h2pc_agent::prompt::PromptRenderer;
use h2pc_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use h2pc_core::domain::message::Message;

use super::CommandResult;

const COMMAND: &str = "render";

/// Renders the prompt template against a batch read from `input`.
///
/// The input is either a JSON array of messages or JSON Lines with one message
/// per line. Success prints the resulting prompt document as JSON.
pub fn run(input: &Path, template: Option<PathBuf>) -> CommandResult {
    let options = LoadOptions {
        overrides: ConfigOverrides { prompt_path: template },
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(COMMAND, "config_validation", error.to_string(), 2)
        }
    };

    let batch = match read_batch(input) {
        Ok(batch) => batch,
        Err(error) => return CommandResult::failure(COMMAND, "input", error, 3),
    };

    let rendered = config
        .prompt
        .path()
        .map_err(|error| error.to_string())
        .and_then(|path| PromptRenderer::from_path(path).map_err(|error| error.to_string()))
        .and_then(|renderer| renderer.render(&batch).map_err(|error| error.to_string()));

    match rendered {
        Ok(template) => match serde_json::to_string_pretty(&template) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), 1),
        },
        Err(error) => CommandResult::failure(COMMAND, "template", error, 4),
    }
}

fn read_batch(path: &Path) -> Result<Vec<Message>, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("could not read `{}`: {error}", path.display()))?;
    parse_batch(&raw)
}

fn parse_batch(raw: &str) -> Result<Vec<Message>, String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|error| format!("invalid message array: {error}"));
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line)
                .map_err(|error| format!("invalid message on line {}: {error}", index + 1))
        })
        .collect()
}
