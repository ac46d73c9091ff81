//! Prompt rendering.
//!
//! The template document is a Tera body that, rendered with `inputs` bound to
//! the current batch, must produce a YAML document shaped like
//! [`PromptTemplate`].

use std::fs;
use std::path::{Path, PathBuf};

use h2pc_core::domain::message::Message;
use h2pc_core::domain::prompt::PromptTemplate;
use tera::{Context, Tera};
use thiserror::Error;

const TEMPLATE_NAME: &str = "prompt";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("could not read prompt template `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("prompt template does not parse: {0}")]
    Syntax(String),
    #[error("prompt template failed to render: {0}")]
    Render(String),
    #[error("rendered prompt is not a valid prompt document: {0}")]
    Document(#[from] serde_yaml_ng::Error),
}

pub struct PromptRenderer {
    tera: Tera,
}

impl PromptRenderer {
    /// Loads and compiles the template once; every later render reuses it.
    pub fn from_path(path: &Path) -> Result<Self, PromptError> {
        let source = fs::read_to_string(path)
            .map_err(|source| PromptError::Read { path: path.to_path_buf(), source })?;
        Self::from_source(&source)
    }

    pub fn from_source(source: &str) -> Result<Self, PromptError> {
        let mut tera = Tera::default();
        tera.autoescape_on(Vec::new());
        tera.add_raw_template(TEMPLATE_NAME, source)
            .map_err(|error| PromptError::Syntax(describe(&error)))?;
        Ok(Self { tera })
    }

    pub fn render(&self, inputs: &[Message]) -> Result<PromptTemplate, PromptError> {
        let text = self.render_text(inputs)?;
        Ok(serde_yaml_ng::from_str(&text)?)
    }

    /// Rendered template body before YAML parsing.
    pub fn render_text(&self, inputs: &[Message]) -> Result<String, PromptError> {
        let mut context = Context::new();
        context.insert("inputs", inputs);
        self.tera
            .render(TEMPLATE_NAME, &context)
            .map_err(|error| PromptError::Render(describe(&error)))
    }
}

// tera keeps the useful detail in the source chain
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use h2pc_core::domain::message::Message;
    use h2pc_core::domain::prompt::Operator;

    use super::{PromptError, PromptRenderer};

    const ECHO_TEMPLATE: &str = r#"operator: Message
inputs:
  - role: system
    content: "You answer briefly."
{% for input in inputs %}
  - role: {{ input.role }}
    content: {{ input.content | json_encode() }}
{% endfor %}
"#;

    #[test]
    fn renders_batch_into_template_inputs() {
        let renderer = PromptRenderer::from_source(ECHO_TEMPLATE).expect("template");
        let batch = vec![Message::user("what is 6 x 7?"), Message::assistant("say \"42\"")];

        let template = renderer.render(&batch).expect("render");

        assert_eq!(template.operator, Operator::Message);
        assert_eq!(
            template.inputs,
            vec![
                Message::system("You answer briefly."),
                Message::user("what is 6 x 7?"),
                Message::assistant("say \"42\""),
            ]
        );
    }

    #[test]
    fn operator_defaults_to_message_and_index_is_read() {
        let implicit = PromptRenderer::from_source("inputs: []").expect("template");
        assert_eq!(implicit.render(&[]).expect("render").operator, Operator::Message);

        let index = PromptRenderer::from_source("operator: Index\ninputs: []").expect("template");
        assert_eq!(index.render(&[]).expect("render").operator, Operator::Index);
    }

    #[test]
    fn html_is_not_escaped() {
        let renderer = PromptRenderer::from_source(
            "inputs:\n  - role: user\n    content: {{ inputs.0.content | json_encode() }}\n",
        )
        .expect("template");

        let template = renderer.render(&[Message::user("<b>&</b>")]).expect("render");

        assert_eq!(template.inputs[0].content, "<b>&</b>");
    }

    #[test]
    fn loads_template_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(ECHO_TEMPLATE.as_bytes()).expect("write template");

        let renderer = PromptRenderer::from_path(file.path()).expect("template");

        assert_eq!(renderer.render(&[]).expect("render").inputs.len(), 1);
    }

    #[test]
    fn missing_file_is_fatal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let error = PromptRenderer::from_path(&dir.path().join("absent.j2"))
            .err()
            .expect("missing template must fail");

        assert!(matches!(error, PromptError::Read { .. }), "{error:?}");
    }

    #[test]
    fn syntax_errors_surface_at_load() {
        let error = PromptRenderer::from_source("{% for input in inputs %}")
            .err()
            .expect("unterminated block must fail");

        assert!(matches!(error, PromptError::Syntax(_)), "{error:?}");
    }

    #[test]
    fn structurally_invalid_documents_are_fatal() {
        let missing_inputs = PromptRenderer::from_source("operator: Message").expect("template");
        assert!(matches!(missing_inputs.render(&[]), Err(PromptError::Document(_))));

        let bad_operator =
            PromptRenderer::from_source("operator: Summarize\ninputs: []").expect("template");
        assert!(matches!(bad_operator.render(&[]), Err(PromptError::Document(_))));

        let bad_role = PromptRenderer::from_source(
            "inputs:\n  - role: narrator\n    content: once upon a time\n",
        )
        .expect("template");
        assert!(matches!(bad_role.render(&[]), Err(PromptError::Document(_))));
    }

    #[test]
    fn undefined_variables_fail_to_render() {
        let renderer = PromptRenderer::from_source("inputs: {{ missing }}").expect("template");

        assert!(matches!(renderer.render(&[]), Err(PromptError::Render(_))));
    }
}
