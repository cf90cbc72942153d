// error.rs
// Error taxonomy: analysis-phase errors recover locally and are logged,
// orchestrator-phase errors fail loudly naming the offending module.

use thiserror::Error;

/// Errors from the chat-completion endpoint.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Non-success HTTP status with whatever error body the provider sent.
    #[error("llm endpoint returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// Transport-level failure (connect, TLS, timeout).
    #[error("llm transport error: {0}")]
    Transport(String),

    /// The endpoint answered 200 but the response carried no usable content.
    #[error("llm returned no content")]
    Empty,

    /// Every model in the fallback chain failed.
    #[error("all models in the fallback chain failed; last error: {0}")]
    ChainExhausted(String),
}

impl LlmError {
    /// Whether the fallback chain should advance to the next model.
    ///
    /// Retryable: transport errors, request timeout (408), rate limiting
    /// (429), and all 5xx. Empty responses advance the chain too (the next
    /// provider may behave). Any other 4xx is fatal: the request itself is
    /// wrong and no model will accept it.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(_) | LlmError::Empty => true,
            LlmError::Status { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            LlmError::ChainExhausted(_) => false,
        }
    }
}

/// Errors from a single agent invocation over one module.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("model failure while documenting `{module}`: {source}")]
    Model {
        module: String,
        #[source]
        source: LlmError,
    },

    /// The agent finished its turns without producing the expected artifact.
    #[error("agent gave up on `{module}`: {reason}")]
    GaveUp { module: String, reason: String },

    #[error("io error during agent run: {0}")]
    Io(#[from] std::io::Error),
}

/// Run-level errors surfaced to the user. Only orchestrator-phase failures
/// reach this type; everything the analysis phase can recover from is logged
/// and swallowed there.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("documentation failed for module `{module}`: {source}")]
    Module {
        module: String,
        #[source]
        source: AgentError,
    },

    #[error("overview synthesis failed for `{module}`: {reason}")]
    Overview { module: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(LlmError::Transport("timed out".into()).is_retryable());
        assert!(LlmError::Status { status: 429, message: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 503, message: String::new() }.is_retryable());
        assert!(LlmError::Status { status: 408, message: String::new() }.is_retryable());
        assert!(LlmError::Empty.is_retryable());

        assert!(!LlmError::Status { status: 400, message: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 401, message: String::new() }.is_retryable());
        assert!(!LlmError::Status { status: 404, message: String::new() }.is_retryable());
        assert!(!LlmError::ChainExhausted("x".into()).is_retryable());
    }
}
