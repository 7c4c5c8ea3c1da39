pub mod progress;
pub mod quiz_sessions;
pub mod streaks;
pub mod users;
pub mod words;
