//! Shared types for the H2PC agent runtime.
//!
//! - **Domain** (`domain`) - the wire [`Message`] and the rendered [`PromptTemplate`]
//! - **Config** (`config`) - layered settings (defaults, TOML file, environment, overrides)
//! - **Errors** (`errors`) - wire codec failures

pub mod config;
pub mod domain;
pub mod errors;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::message::{Message, Role};
pub use domain::prompt::{Operator, PromptTemplate};
pub use errors::WireError;
