pub mod assistant;
pub mod auth;
pub mod contest;
pub mod discussion;
pub mod problem;
pub mod shared;
pub mod submission;
pub mod user;
pub mod video;
