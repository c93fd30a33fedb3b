use arena_common::Difficulty;
use axum::Json;
use axum::extract::State;
use tracing::{info, instrument};

use crate::assistant::ChatMessage;
use crate::entity::problem;
use crate::error::{AppError, ErrorBody};
use crate::extractors::auth::AuthUser;
use crate::extractors::json::AppJson;
use crate::models::assistant::*;
use crate::state::AppState;
use crate::utils::contest::{find_readable_problem, in_running_contest};

const BASE_PROMPT: &str = "You are a programming tutor on a competitive-programming \
platform. Help the user understand the problem and guide them towards a solution with \
hints, explanations of algorithms and complexity, and debugging help. Do not hand out a \
complete solution unless the user explicitly asks for one after trying.";

fn problem_prompt(title: &str, difficulty: Difficulty, description: &str) -> String {
    format!(
        "{BASE_PROMPT}\n\nThe user is working on the following problem.\n\
         Title: {title}\nDifficulty: {difficulty}\n\n{description}"
    )
}

fn system_prompt(problem: Option<&problem::Model>) -> String {
    match problem {
        Some(p) => problem_prompt(&p.title, p.difficulty, &p.description),
        None => BASE_PROMPT.to_string(),
    }
}

/// Prepend the system prompt and keep only the last `max_history` turns.
fn build_conversation(
    problem: Option<&problem::Model>,
    turns: Vec<ChatTurn>,
    max_history: usize,
) -> Vec<ChatMessage> {
    let skip = turns.len().saturating_sub(max_history.max(1));
    std::iter::once(ChatMessage::system(system_prompt(problem)))
        .chain(turns.into_iter().skip(skip).map(|t| ChatMessage {
            role: t.role,
            content: t.content,
        }))
        .collect()
}

#[utoipa::path(
    post,
    path = "/chat",
    tag = "Assistant",
    operation_id = "chatWithAssistant",
    summary = "Ask the assistant about a problem",
    description = "Forwards the conversation to the configured language model with the problem statement as context and returns its reply. Refused for problems of a running contest unless the caller has `contest:manage`. Requires `assistant:chat` permission.",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Assistant reply", body = ChatResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Unauthorized (TOKEN_MISSING, TOKEN_INVALID)", body = ErrorBody),
        (status = 403, description = "Forbidden (PERMISSION_DENIED)", body = ErrorBody),
        (status = 404, description = "Problem not found (NOT_FOUND)", body = ErrorBody),
        (status = 503, description = "Assistant unavailable (ASSISTANT_UNAVAILABLE)", body = ErrorBody),
    ),
    security(("jwt" = [])),
)]
#[instrument(skip(state, auth_user, payload), fields(problem_id = ?payload.problem_id, turns = payload.messages.len()))]
pub async fn chat(
    auth_user: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    auth_user.require_permission("assistant:chat")?;
    validate_chat(&payload, state.config.assistant.max_message_length)?;

    let problem = match payload.problem_id {
        Some(id) => {
            let model = find_readable_problem(&state.db, Some(&auth_user), id).await?;
            if !auth_user.has_permission("contest:manage")
                && in_running_contest(&state.db, id).await?
            {
                return Err(AppError::Forbidden(
                    "The assistant is not available for problems of a running contest".into(),
                ));
            }
            Some(model)
        }
        None => None,
    };

    let conversation = build_conversation(
        problem.as_ref(),
        payload.messages,
        state.config.assistant.max_history,
    );
    let reply = state.assistant.reply(&conversation).await?;

    info!(user_id = auth_user.user_id, "Assistant replied");
    Ok(Json(ChatResponse { reply }))
}
