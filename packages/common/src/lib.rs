pub mod config;
pub mod difficulty;
pub mod judge;
pub mod retry;
pub mod submission_status;

pub use difficulty::Difficulty;
pub use submission_status::{SubmissionStatus, Verdict};
