use h2pc_agent::prompt::PromptRenderer;
use h2pc_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

use super::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 3] = ["messenger_topics", "prompt_template", "completion_backend"];

pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_messenger_topics(&config));
            checks.push(check_prompt_template(&config));
            checks.push(check_completion_backend(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for name in DEPENDENT_CHECKS {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

// Disabled sides are legal, so this check only reports them.
fn check_messenger_topics(config: &AppConfig) -> DoctorCheck {
    let messenger = &config.messenger;
    let side = |topics: &[String]| {
        if topics.is_empty() {
            "disabled".to_string()
        } else {
            topics.join(",")
        }
    };
    let kind = messenger.kind.map(|kind| kind.to_string()).unwrap_or_default();

    DoctorCheck {
        name: "messenger_topics",
        status: CheckStatus::Pass,
        details: format!(
            "{kind}: source {} (batch >= {}), sink {} (loop {})",
            side(&messenger.topic_src),
            messenger.src_count_min,
            side(&messenger.topic_sink),
            messenger.sink_count_min
        ),
    }
}

fn check_prompt_template(config: &AppConfig) -> DoctorCheck {
    let result = config
        .prompt
        .path()
        .map_err(|error| error.to_string())
        .and_then(|path| {
            PromptRenderer::from_path(path)
                .map(|_| path.display().to_string())
                .map_err(|error| error.to_string())
        });

    match result {
        Ok(path) => DoctorCheck {
            name: "prompt_template",
            status: CheckStatus::Pass,
            details: format!("template `{path}` compiled"),
        },
        Err(error) => DoctorCheck { name: "prompt_template", status: CheckStatus::Fail, details: error },
    }
}

fn check_completion_backend(config: &AppConfig) -> DoctorCheck {
    match config.llm.backend() {
        Ok(backend) => DoctorCheck {
            name: "completion_backend",
            status: CheckStatus::Pass,
            details: format!(
                "{} selected with model `{}` (timeout {}s)",
                backend.name(),
                backend.model_name(),
                config.llm.timeout_secs
            ),
        },
        Err(error) => DoctorCheck {
            name: "completion_backend",
            status: CheckStatus::Fail,
            details: error.to_string(),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
