use std::sync::Arc;

use h2pc_core::domain::message::Message;
use h2pc_messenger::{BoxMessenger, MessengerError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::interpret::{interpret, InterpretError};
use crate::llm::{LlmClient, LlmError};
use crate::prompt::{PromptError, PromptRenderer};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Messenger(#[from] MessengerError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Interpret(#[from] InterpretError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cycle {
    Completed,
    Cancelled,
}

/// Drives consume, process, produce and flush cycles until cancelled.
pub struct AgentRuntime {
    messenger: BoxMessenger<Message, Message>,
    llm: Arc<dyn LlmClient>,
    renderer: PromptRenderer,
    sink_count_min: usize,
    verbose: bool,
}

impl AgentRuntime {
    pub fn new(
        messenger: BoxMessenger<Message, Message>,
        llm: Arc<dyn LlmClient>,
        renderer: PromptRenderer,
        sink_count_min: usize,
    ) -> Self {
        Self { messenger, llm, renderer, sink_count_min, verbose: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Runs until `cancel` fires or a cycle fails.
    ///
    /// The messenger is terminated exactly once on every exit path. A cycle
    /// error is returned after termination; cancellation returns `Ok`.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), AgentError> {
        info!(
            event_name = "agent.run.started",
            backend = self.llm.backend(),
            sink_count_min = self.sink_count_min,
            "agent loop started"
        );

        let outcome = self.run_cycles(&cancel).await;
        let terminated = self.messenger.terminate().await;

        match outcome {
            Ok(()) => {
                info!(event_name = "agent.run.cancelled", "cancellation received; messenger terminated");
                Ok(terminated?)
            }
            Err(error) => {
                if let Err(terminate_error) = terminated {
                    warn!(
                        event_name = "agent.run.terminate_failed",
                        error = %terminate_error,
                        "messenger termination failed after a fatal cycle error"
                    );
                }
                Err(error)
            }
        }
    }

    async fn run_cycles(&mut self, cancel: &CancellationToken) -> Result<(), AgentError> {
        while self.run_cycle(cancel).await? == Cycle::Completed {}
        Ok(())
    }

    async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<Cycle, AgentError> {
        let batch = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Cycle::Cancelled),
            batch = self.messenger.consume_batch() => batch?,
        };
        debug!(event_name = "agent.cycle.batch", size = batch.len(), "batch consumed");

        let mut produced = 0usize;
        for _ in 0..self.sink_count_min {
            if cancel.is_cancelled() {
                return Ok(Cycle::Cancelled);
            }
            let Some(output) = self.process(&batch).await? else {
                break;
            };
            if cancel.is_cancelled() {
                return Ok(Cycle::Cancelled);
            }
            self.messenger.produce(&output).await?;
            produced += 1;
        }

        if cancel.is_cancelled() {
            return Ok(Cycle::Cancelled);
        }
        self.messenger.flush().await?;
        debug!(event_name = "agent.cycle.flushed", produced, "cycle flushed");
        Ok(Cycle::Completed)
    }

    async fn process(&self, batch: &[Message]) -> Result<Option<Message>, AgentError> {
        let template = self.renderer.render(batch)?;
        let completion = self.llm.completions(&template.inputs).await?;
        if self.verbose {
            if let Some(completion) = &completion {
                info!(
                    event_name = "agent.completion.generated",
                    content = %completion.content,
                    "generated completion"
                );
            }
        }
        Ok(interpret(template.operator, completion, batch)?)
    }
}
