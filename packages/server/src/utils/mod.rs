pub mod contest;
pub mod hash;
pub mod jwt;
pub mod leaderboard;
pub mod rate_limit;
