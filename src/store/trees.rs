pub const USERS: &str = "users";
pub const WORDS: &str = "words";
pub const WORD_PROGRESS: &str = "word_progress";
pub const PROGRESS_DUE_INDEX: &str = "progress_due_index";
pub const QUIZ_SESSIONS: &str = "quiz_sessions";
pub const QUIZ_ANSWERS: &str = "quiz_answers";
pub const LEARNING_STREAKS: &str = "learning_streaks";
