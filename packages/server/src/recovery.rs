use arena_common::SubmissionStatus;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use tracing::{info, warn};

use crate::entity::submission;

/// Stored on submissions whose judging was cut off by a restart.
pub const INTERRUPTED_MESSAGE: &str = "Judging was interrupted by a server restart";

/// Mark submissions left `Pending` or `Judging` by a previous process as `SystemError`.
///
/// Judging runs inside the server process, so at startup no worker can still own
/// these rows. They can be rejudged once marked.
pub async fn fail_interrupted_submissions(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let result = submission::Entity::update_many()
        .col_expr(
            submission::Column::Status,
            Expr::value(SubmissionStatus::SystemError),
        )
        .col_expr(
            submission::Column::ErrorMessage,
            Expr::value(Some(INTERRUPTED_MESSAGE.to_string())),
        )
        .col_expr(submission::Column::JudgedAt, Expr::value(Some(Utc::now())))
        .filter(
            submission::Column::Status
                .is_in([SubmissionStatus::Pending, SubmissionStatus::Judging]),
        )
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        warn!(
            count = result.rows_affected,
            "Marked interrupted submissions as SystemError"
        );
    } else {
        info!("No interrupted submissions found");
    }
    Ok(result.rows_affected)
}
