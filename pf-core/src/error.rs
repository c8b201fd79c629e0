//! Error taxonomy (see §7): account-level throttles propagate out of a
//! scenario, everything else is a soft failure the orchestrator logs and
//! continues past.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// Account-level throttle/ban signal (226/401/403, "authorization",
    /// "automated"). Must propagate out of the scenario to the Mode
    /// Manager, which latches a long pause and forces `normal` mode.
    #[error("account throttled: {0}")]
    AccountThrottle(String),

    /// Transient network/API failure (429, connection errors) that the
    /// adapter already retried with backoff and exhausted.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Not-found/gone (404): soft failure on a single entity.
    #[error("not found: {0}")]
    NotFound(String),

    /// LLM output failed to parse into the expected structured shape.
    #[error("llm format error: {0}")]
    LlmFormat(String),

    /// Structured-store or vector-index failure.
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Fatal at startup only: bad persona package, missing config keys.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AgentError {
    /// True for the one class of error that must be re-raised by a
    /// scenario instead of being swallowed into a soft failure.
    pub fn is_account_throttle(&self) -> bool {
        matches!(self, AgentError::AccountThrottle(_))
    }

    /// Classifies a string-matchable token coming from the platform
    /// adapter per the external interface contract in §6.
    pub fn from_platform_signal(signal: &str) -> Self {
        let lower = signal.to_lowercase();
        if lower.contains("226")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("authorization")
            || lower.contains("automated")
        {
            AgentError::AccountThrottle(signal.to_string())
        } else if lower.contains("429") {
            AgentError::Transient(signal.to_string())
        } else if lower.contains("404") {
            AgentError::NotFound(signal.to_string())
        } else {
            AgentError::Transient(signal.to_string())
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_throttle_signals() {
        assert!(AgentError::from_platform_signal("226 locked").is_account_throttle());
        assert!(AgentError::from_platform_signal("403 forbidden").is_account_throttle());
        assert!(!AgentError::from_platform_signal("429 too many requests").is_account_throttle());
        assert!(matches!(
            AgentError::from_platform_signal("404 not found"),
            AgentError::NotFound(_)
        ));
    }
}
