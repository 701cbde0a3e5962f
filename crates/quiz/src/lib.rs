mod session;
mod streak;

pub use session::{Position, QuizSession, Transition};
pub use streak::{
    answer_status, compute_streak, AnswerStatus, ResponseRecord, STREAK_WINDOW_DAYS,
};
