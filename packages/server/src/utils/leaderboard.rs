//! ICPC-style contest standings.
//!
//! A problem is solved by the first Accepted submission. Every judged,
//! non-accepted submission before it adds `penalty_minutes` to the penalty of
//! that problem. Compilation and system errors never count.

use std::collections::HashMap;

use arena_common::{SubmissionStatus, Verdict};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A problem of the contest as seen by the leaderboard.
#[derive(Clone, Debug)]
pub struct BoardProblem {
    pub problem_id: i32,
    pub label: String,
    pub points: i32,
}

#[derive(Clone, Debug)]
pub struct BoardParticipant {
    pub user_id: i32,
    pub username: String,
}

/// The submission fields that matter for scoring.
#[derive(Clone, Debug)]
pub struct BoardSubmission {
    pub id: i32,
    pub user_id: i32,
    pub problem_id: i32,
    pub status: SubmissionStatus,
    pub verdict: Option<Verdict>,
    pub created_at: DateTime<Utc>,
}

pub struct LeaderboardInput<'a> {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub penalty_minutes: i32,
    pub problems: &'a [BoardProblem],
    pub participants: &'a [BoardParticipant],
    /// Any order.
    pub submissions: &'a [BoardSubmission],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ProblemCell {
    #[schema(example = 3)]
    pub problem_id: i32,
    #[schema(example = "A")]
    pub label: String,
    pub solved: bool,
    /// Judged, non-accepted attempts before the first Accepted (or in total if unsolved).
    #[schema(example = 1)]
    pub rejected_attempts: i32,
    /// Whole minutes from contest start to the first Accepted.
    #[schema(example = 17)]
    pub solved_at_minute: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct LeaderboardRow {
    /// Competition rank: tied rows share a rank and the next rank is skipped.
    #[schema(example = 1)]
    pub rank: u32,
    #[schema(example = 42)]
    pub user_id: i32,
    #[schema(example = "alice")]
    pub username: String,
    /// Sum of points of solved problems.
    #[schema(example = 300)]
    pub score: i64,
    /// Sum over solved problems of solve minute plus penalty for rejected attempts.
    #[schema(example = 57)]
    pub penalty: i64,
    #[schema(example = 3)]
    pub solved: u32,
    pub problems: Vec<ProblemCell>,
}

/// Compute the ranked leaderboard.
pub fn compute(input: &LeaderboardInput<'_>) -> Vec<LeaderboardRow> {
    let problem_index: HashMap<i32, usize> = input
        .problems
        .iter()
        .enumerate()
        .map(|(i, p)| (p.problem_id, i))
        .collect();

    let mut rows: Vec<LeaderboardRow> = input
        .participants
        .iter()
        .map(|p| LeaderboardRow {
            rank: 0,
            user_id: p.user_id,
            username: p.username.clone(),
            score: 0,
            penalty: 0,
            solved: 0,
            problems: input
                .problems
                .iter()
                .map(|cp| ProblemCell {
                    problem_id: cp.problem_id,
                    label: cp.label.clone(),
                    solved: false,
                    rejected_attempts: 0,
                    solved_at_minute: None,
                })
                .collect(),
        })
        .collect();
    let row_index: HashMap<i32, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (r.user_id, i))
        .collect();

    let mut relevant: Vec<&BoardSubmission> = input
        .submissions
        .iter()
        .filter(|s| s.created_at >= input.start_time && s.created_at <= input.end_time)
        .filter(|s| problem_index.contains_key(&s.problem_id))
        .filter(|s| row_index.contains_key(&s.user_id))
        .collect();
    relevant.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    for sub in relevant {
        let (Some(&r), Some(&p)) = (row_index.get(&sub.user_id), problem_index.get(&sub.problem_id))
        else {
            continue;
        };
        let cell = &mut rows[r].problems[p];
        if cell.solved || sub.status != SubmissionStatus::Judged {
            continue;
        }
        match sub.verdict {
            Some(Verdict::Accepted) => {
                cell.solved = true;
                cell.solved_at_minute = Some((sub.created_at - input.start_time).num_minutes());
            }
            Some(Verdict::SystemError) | None => {}
            Some(_) => cell.rejected_attempts += 1,
        }
    }

    let penalty_per_attempt = i64::from(input.penalty_minutes);
    for row in &mut rows {
        for (cell, problem) in row.problems.iter().zip(input.problems) {
            if let Some(minute) = cell.solved_at_minute {
                row.solved += 1;
                row.score += i64::from(problem.points);
                row.penalty += minute + penalty_per_attempt * i64::from(cell.rejected_attempts);
            }
        }
    }

    rows.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.penalty.cmp(&b.penalty))
            .then_with(|| a.username.cmp(&b.username))
            .then(a.user_id.cmp(&b.user_id))
    });

    let mut previous: Option<(i64, i64, u32)> = None;
    for (i, row) in rows.iter_mut().enumerate() {
        let rank = match previous {
            Some((score, penalty, rank)) if score == row.score && penalty == row.penalty => rank,
            _ => i as u32 + 1,
        };
        row.rank = rank;
        previous = Some((row.score, row.penalty, rank));
    }

    rows
}
