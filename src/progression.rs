use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::QuestConfig;
use crate::history::ProgressSnapshot;
use crate::rank::{evaluate_level, evaluate_table, LevelEvaluation};
use crate::types::{LearningLevel, Rank};

/// Which unlock requirements a table meets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockCheck {
    pub mastery: u8,
    pub fast_answers: u32,
    pub rank: Option<Rank>,
    pub mastery_met: bool,
    pub fast_answers_met: bool,
    pub rank_met: bool,
}

impl UnlockCheck {
    pub fn ready(&self) -> bool {
        self.mastery_met && self.fast_answers_met && self.rank_met
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnlockOutcome {
    /// `next` should be opened now.
    Unlock { next: u32 },
    AlreadyUnlocked { next: u32 },
    NotReady(UnlockCheck),
    /// `table` is locked, or a planet before `next` is still locked.
    NotFrontier,
    /// `table` is the last planet.
    NoNextPlanet,
}

pub fn unlock_check(table: u32, snapshot: &ProgressSnapshot, config: &QuestConfig) -> UnlockCheck {
    let unlock = &config.unlock;
    let mastery = snapshot.mastery(table);
    let fast_answers = snapshot.fast_answer_count(table);
    let rank = evaluate_table(table, snapshot, config.arcade_range, config).rank;

    UnlockCheck {
        mastery,
        fast_answers,
        rank,
        mastery_met: mastery >= unlock.min_mastery,
        fast_answers_met: fast_answers >= unlock.min_fast_answers,
        rank_met: rank.is_some_and(|rank| rank.at_least(unlock.min_rank)),
    }
}

/// Decides whether finishing work on `table` opens the planet after it.
pub fn check_unlock(table: u32, snapshot: &ProgressSnapshot, config: &QuestConfig) -> UnlockOutcome {
    let Some(next) = config.next_table(table) else {
        return UnlockOutcome::NoNextPlanet;
    };
    if snapshot.is_unlocked(next) {
        return UnlockOutcome::AlreadyUnlocked { next };
    }

    let frontier_ok = config
        .planets
        .iter()
        .take_while(|&&t| t != next)
        .all(|&t| snapshot.is_unlocked(t));
    if !frontier_ok {
        return UnlockOutcome::NotFrontier;
    }

    let check = unlock_check(table, snapshot, config);
    if !check.ready() {
        debug!(table = table, check = ?check, "Unlock requirements not met");
        return UnlockOutcome::NotReady(check);
    }

    info!(
        table = table,
        next = next,
        mastery = check.mastery,
        fast_answers = check.fast_answers,
        rank = ?check.rank,
        "Planet unlocked"
    );
    UnlockOutcome::Unlock { next }
}

/// Checks and, when due, records the unlock on `snapshot`.
pub fn advance_unlock(table: u32, snapshot: &mut ProgressSnapshot, config: &QuestConfig) -> UnlockOutcome {
    let outcome = check_unlock(table, snapshot, config);
    if let UnlockOutcome::Unlock { next } = outcome {
        snapshot.unlock(next);
    }
    outcome
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LevelOutcome {
    /// Just reached completion; `next_level` is the catalog entry to offer.
    Completed { next_level: Option<u32> },
    AlreadyCompleted,
    InProgress(LevelEvaluation),
}

/// Whether `eval` satisfies the coverage, volume and optional rank gates.
pub fn level_requirements_met(eval: &LevelEvaluation, config: &QuestConfig) -> bool {
    let learning = &config.learning;
    if eval.facts_in_range == 0 {
        return false;
    }

    let coverage = eval.facts_covered as f64 / eval.facts_in_range as f64;
    let required_answers = eval.facts_in_range * learning.answers_per_fact as usize;
    let rank_ok = match learning.min_rank {
        Some(min) => eval.standing.rank().is_some_and(|rank| rank.at_least(min)),
        None => true,
    };

    coverage >= learning.completion_coverage && eval.total_answers >= required_answers && rank_ok
}

pub fn check_level_completion(
    table: u32,
    level: &LearningLevel,
    snapshot: &ProgressSnapshot,
    config: &QuestConfig,
) -> LevelOutcome {
    if snapshot.is_level_completed(table, level.id) {
        return LevelOutcome::AlreadyCompleted;
    }

    let eval = evaluate_level(table, level, snapshot, config);
    if !level_requirements_met(&eval, config) {
        return LevelOutcome::InProgress(eval);
    }

    let next_level = config.next_level(level.id).map(|next| next.id);
    info!(
        table = table,
        level = level.id,
        answers = eval.total_answers,
        standing = %eval.standing,
        "Learning level completed"
    );
    LevelOutcome::Completed { next_level }
}

/// Checks and, when due, records the completion on `snapshot`.
pub fn advance_level(
    table: u32,
    level: &LearningLevel,
    snapshot: &mut ProgressSnapshot,
    config: &QuestConfig,
) -> LevelOutcome {
    let outcome = check_level_completion(table, level, snapshot, config);
    if matches!(outcome, LevelOutcome::Completed { .. }) {
        snapshot.complete_level(table, level.id);
    }
    outcome
}
