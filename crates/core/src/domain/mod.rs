pub mod message;
pub mod prompt;
