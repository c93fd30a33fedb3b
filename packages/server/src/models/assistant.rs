use serde::{Deserialize, Serialize};

use crate::assistant::ChatRole;
use crate::error::AppError;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ChatTurn {
    /// `user` or `assistant`.
    pub role: ChatRole,
    pub content: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct ChatRequest {
    /// Problem the conversation is about. Its statement is given to the assistant.
    pub problem_id: Option<i32>,
    /// Conversation so far, oldest first. The last turn must be from the user.
    pub messages: Vec<ChatTurn>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ChatResponse {
    pub reply: String,
}

pub fn validate_chat(req: &ChatRequest, max_message_length: usize) -> Result<(), AppError> {
    let Some(last) = req.messages.last() else {
        return Err(AppError::Validation("messages must not be empty".into()));
    };
    if last.role != ChatRole::User {
        return Err(AppError::Validation(
            "The last message must come from the user".into(),
        ));
    }
    for turn in &req.messages {
        if turn.role == ChatRole::System {
            return Err(AppError::Validation(
                "System messages are not accepted".into(),
            ));
        }
        if turn.content.trim().is_empty() || turn.content.chars().count() > max_message_length {
            return Err(AppError::Validation(format!(
                "Messages must be 1-{max_message_length} characters"
            )));
        }
    }
    Ok(())
}
