pub mod contest;
pub mod contest_problem;
pub mod contest_user;
pub mod discussion;
pub mod discussion_comment;
pub mod problem;
pub mod problem_tag;
pub mod role;
pub mod role_permission;
pub mod solution_video;
pub mod submission;
pub mod test_case;
pub mod test_case_result;
pub mod user;
