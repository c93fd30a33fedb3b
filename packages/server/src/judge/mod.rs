//! Program execution backends.

mod http;

use arena_common::judge::{ExecutionReport, ExecutionRequest};
use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpJudge;

#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Code execution is disabled")]
    Disabled,

    #[error("Judge request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Judge responded with HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Judge returned an unexpected response: {0}")]
    BadResponse(String),

    #[error("Judge did not finish after {polls} polls")]
    Timeout { polls: u32 },
}

/// Executes a program against a list of inputs.
///
/// Object-safe, stored as `Arc<dyn Judge>` in the application state.
#[async_trait]
pub trait Judge: Send + Sync {
    /// Outcomes are returned in the order of `request.cases`.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReport, JudgeError>;

    /// Submissions are refused up front when this is false.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Used when `judge.enabled` is false.
pub struct DisabledJudge;

#[async_trait]
impl Judge for DisabledJudge {
    async fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionReport, JudgeError> {
        Err(JudgeError::Disabled)
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
