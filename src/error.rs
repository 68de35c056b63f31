//! Error taxonomy for the delegation engine.
//!
//! Capability failures are absorbed at the agent boundary and fed back to
//! the model as tool errors; only `Configuration`, an unrecoverable
//! `Timeout`, or a `Model` failure with no tool boundary above it reach the
//! transport layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Missing or malformed startup configuration. Fatal: the process must
    /// not start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An auxiliary provider (prompts, search) could not be reached.
    /// Recovered locally via a fallback, never shown to the user.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A run exhausted its model-invocation cap.
    #[error("call budget exhausted for agent '{agent}'")]
    BudgetExceeded { agent: String },

    /// A spreadsheet formula was rejected by the restricted parser.
    #[error("invalid formula: {0}")]
    InvalidFormula(String),

    /// An external capability call failed with no recovery left. Surfaced
    /// to the invoking model as a tool error, never as a run failure.
    #[error("tool call failed: {0}")]
    ToolCallFailure(String),

    /// A run or sub-call exceeded its deadline or was cancelled.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The model endpoint returned an error or an unusable response.
    #[error("model request failed: {0}")]
    Model(String),
}
