use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{QuestConfig, ScoringConfig};
use crate::error::{QuestError, Result};
use crate::history::{round_tenth, HistoryUpdate, ProgressSnapshot, ResponseSample};
use crate::types::{Mode, Question};

/// Shortest response time ever recorded. Faster answers round up to it.
pub const MIN_RESPONSE_SECS: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub correct: bool,
    pub points_awarded: u32,
    pub new_streak: f64,
    pub speed_multiplier: f64,
    /// Seconds used, clamped to the time limit and rounded to a tenth.
    pub elapsed_secs: f64,
    /// `None` for untimed questions.
    pub remaining_secs: Option<f64>,
}

/// Harder tables are worth more: `clamp(floor(table / 4), 1, 5)`.
pub fn difficulty_weight(table: u32) -> u32 {
    (table / 4).clamp(1, 5)
}

pub fn speed_multiplier(remaining: f64, limit: f64, scoring: &ScoringConfig) -> f64 {
    if remaining >= limit * scoring.super_fast_ratio {
        scoring.super_fast_multiplier
    } else if remaining >= limit * scoring.fast_ratio {
        scoring.fast_multiplier
    } else {
        1.0
    }
}

pub fn next_streak(streak: f64, correct: bool, scoring: &ScoringConfig) -> f64 {
    if correct {
        (streak.max(1.0) + scoring.streak_step).min(scoring.streak_cap)
    } else {
        1.0
    }
}

/// Scores one submission. `submitted == None` means the countdown ran out.
///
/// Fails with [`QuestError::InvalidElapsed`] on a NaN or infinite time.
pub fn score_answer(
    question: &Question,
    submitted: Option<u32>,
    elapsed_secs: f64,
    mode: &Mode,
    streak: f64,
    config: &QuestConfig,
) -> Result<ScoreResult> {
    if !elapsed_secs.is_finite() {
        return Err(QuestError::InvalidElapsed(elapsed_secs));
    }
    let scoring = &config.scoring;
    let correct = submitted == Some(question.answer);

    let limit = question.time_limit.map(f64::from);
    let elapsed = match (submitted, limit) {
        (None, Some(limit)) => limit,
        (_, Some(limit)) => elapsed_secs.min(limit),
        (_, None) => elapsed_secs,
    };
    let elapsed = round_tenth(elapsed).max(MIN_RESPONSE_SECS);
    let remaining = limit.map(|limit| (limit - elapsed).max(0.0));

    let mut speed = 1.0;
    let points = match (correct, mode, limit, remaining) {
        (false, _, _, _) => 0,
        (true, Mode::Learning(_), _, _) => scoring.learning_points,
        (true, Mode::Arcade, Some(limit), Some(remaining)) => {
            speed = speed_multiplier(remaining, limit, scoring);
            let time_bonus = (remaining / 2.0).ceil().max(1.0);
            let raw = f64::from(scoring.base_points)
                * f64::from(difficulty_weight(question.multiplicand))
                * time_bonus
                * streak.max(1.0)
                * speed;
            raw.round() as u32
        }
        // An arcade question without a limit only gets the base award.
        (true, Mode::Arcade, _, _) => {
            let raw = f64::from(scoring.base_points)
                * f64::from(difficulty_weight(question.multiplicand))
                * streak.max(1.0);
            raw.round() as u32
        }
    };

    let new_streak = next_streak(streak, correct, scoring);

    debug!(
        fact = %question.fact(),
        correct = correct,
        timed_out = submitted.is_none(),
        elapsed = elapsed,
        points = points,
        speed_multiplier = speed,
        streak = new_streak,
        "Scored answer"
    );

    Ok(ScoreResult {
        correct,
        points_awarded: points,
        new_streak,
        speed_multiplier: speed,
        elapsed_secs: elapsed,
        remaining_secs: remaining,
    })
}

/// Running mastery for a table after one more answer to `c`/`w` prior counts.
pub fn running_mastery(prior_correct: u32, prior_wrong: u32, correct: bool) -> u8 {
    let total = u64::from(prior_correct) + u64::from(prior_wrong) + 1;
    let hits = u64::from(prior_correct) + u64::from(correct);
    (hits * 100 / total) as u8
}

/// The history changes caused by a scored answer, for the shell to apply.
pub fn resolve_answer(
    question: &Question,
    result: &ScoreResult,
    mode: &Mode,
    snapshot: &ProgressSnapshot,
    config: &QuestConfig,
    played_at: Option<DateTime<Utc>>,
) -> HistoryUpdate {
    let fact = question.fact();

    // NaN.max() yields the floor, so a hand-built result can't store a bad sample.
    let seconds = result.elapsed_secs.max(MIN_RESPONSE_SECS);
    let sample = match (result.correct, mode) {
        (false, _) => None,
        (true, Mode::Arcade) => Some(ResponseSample::Arcade(seconds)),
        (true, Mode::Learning(level)) => Some(ResponseSample::Learning {
            level: level.id,
            seconds,
        }),
    };

    let fast_answer = result.correct
        && matches!(mode, Mode::Arcade)
        && result
            .remaining_secs
            .is_some_and(|remaining| remaining >= config.scoring.fast_answer_min_remaining_secs);

    HistoryUpdate {
        fact,
        correct: result.correct,
        sample,
        table_mastery: running_mastery(snapshot.correct(fact), snapshot.wrong(fact), result.correct),
        fast_answer,
        played_at,
    }
}
