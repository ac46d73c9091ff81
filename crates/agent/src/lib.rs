//! Agent Runtime - prompt rendering, completion and output interpretation
//!
//! This crate is the processing half of the H2PC agent. Each cycle:
//! 1. **Consume** - pull one batch from the messenger
//! 2. **Render** (`prompt`) - bind the batch to the template and parse the result
//!    into a `PromptTemplate`
//! 3. **Complete** (`llm`) - send `template.inputs` to the configured backend
//! 4. **Interpret** (`interpret`) - strip thought preambles and apply the
//!    template operator
//! 5. **Produce/Flush** - publish the outputs and hand them off to the broker
//!
//! # Key Types
//!
//! - `AgentRuntime` - the cancellable run loop (see `runtime` module)
//! - `LlmClient` - pluggable trait for Ollama and OpenAI-compatible backends
//! - `PromptRenderer` - compiled Tera template producing YAML prompt documents

pub mod interpret;
pub mod llm;
pub mod prompt;
pub mod runtime;

pub use interpret::{interpret, strip_thought, InterpretError};
pub use llm::{build_llm, LlmClient, LlmError};
pub use prompt::{PromptError, PromptRenderer};
pub use runtime::{AgentError, AgentRuntime};
