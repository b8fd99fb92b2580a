pub mod config;
pub mod distractor;
pub mod error;
pub mod history;
pub mod progression;
pub mod rank;
pub mod scheduler;
pub mod scoring;
pub mod selector;
pub mod session;
pub mod telemetry;
pub mod types;

pub use config::QuestConfig;
pub use error::{QuestError, Result};
pub use history::{HistoryUpdate, ProgressSnapshot, ResponseSample};
pub use progression::{LevelOutcome, UnlockOutcome};
pub use rank::{evaluate_level, evaluate_table, fact_breakdown, mastery_report};
pub use scoring::{resolve_answer, score_answer, ScoreResult};
pub use selector::{select_bonus_question, select_question};
pub use session::{AnswerReport, BonusReport, Phase, Session, SessionEvent};
pub use telemetry::{init_logging, LogConfig};
pub use types::{FactId, LearningLevel, Mode, MultiplierRange, Question, Rank, Standing};
