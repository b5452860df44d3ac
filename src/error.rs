use thiserror::Error;

use crate::llm::TransportError;

/// Failure categories for a single agent invocation.
///
/// Non-emitter tool failures never show up here: they are folded into the
/// transcript as tool messages and the loop keeps going. Everything below is
/// fatal for the current agent and propagates to the owning stage.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("llm transport failed: {0}")]
    Transport(#[from] TransportError),

    #[error("terminal tool `{0}` was never called")]
    TerminalToolNotCalled(String),

    #[error("tool `{tool}` failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("market data invalid: {0}")]
    DataInvalid(String),

    #[error("debate produced no messages")]
    DebateEmpty,

    #[error("cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
            | matches!(self, AgentError::Transport(TransportError::Cancelled))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read config file {path}: {message}")]
    File { path: String, message: String },
}
