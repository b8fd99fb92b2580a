use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};
use tracing::{debug, warn};

use crate::config::QuestConfig;
use crate::error::Result;
use crate::types::FactId;

pub type FactCounts = BTreeMap<FactId, u32>;
pub type FactTimes = BTreeMap<FactId, Vec<f64>>;

/// Everything the game remembers about one player.
///
/// The core only reads a snapshot; answers produce a [`HistoryUpdate`] that the
/// embedding shell applies and persists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSnapshot {
    /// Arcade seconds per correct answer, grouped by table.
    pub response_times: BTreeMap<u32, FactTimes>,
    pub attempt_counts: FactCounts,
    pub correct_answers: FactCounts,
    pub wrong_answers: FactCounts,
    /// Learning-mode seconds per correct answer, by table then level id.
    pub learning_response_times: BTreeMap<u32, BTreeMap<u32, FactTimes>>,
    pub fast_answers: BTreeMap<u32, u32>,
    pub table_mastery: BTreeMap<u32, u8>,
    pub unlocked_tables: BTreeSet<u32>,
    pub completed_levels: BTreeMap<u32, BTreeSet<u32>>,
    pub last_played: Option<DateTime<Utc>>,
}

impl ProgressSnapshot {
    /// Fresh progress with only the first planet open.
    pub fn new(config: &QuestConfig) -> Self {
        let mut snapshot = Self::default();
        snapshot.unlocked_tables.insert(config.first_table());
        snapshot
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let snapshot: ProgressSnapshot = serde_json::from_str(raw)?;
        snapshot.check_counters();
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let snapshot: ProgressSnapshot = serde_json::from_reader(reader)?;
        snapshot.check_counters();
        Ok(snapshot)
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn attempts(&self, fact: FactId) -> u32 {
        self.attempt_counts.get(&fact).copied().unwrap_or(0)
    }

    pub fn correct(&self, fact: FactId) -> u32 {
        self.correct_answers.get(&fact).copied().unwrap_or(0)
    }

    pub fn wrong(&self, fact: FactId) -> u32 {
        self.wrong_answers.get(&fact).copied().unwrap_or(0)
    }

    pub fn samples(&self, fact: FactId) -> &[f64] {
        self.response_times
            .get(&fact.table)
            .and_then(|facts| facts.get(&fact))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn learning_samples(&self, fact: FactId, level: u32) -> &[f64] {
        self.learning_response_times
            .get(&fact.table)
            .and_then(|levels| levels.get(&level))
            .and_then(|facts| facts.get(&fact))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Mean arcade response time for `fact`, `None` before its first correct answer.
    pub fn average_time(&self, fact: FactId) -> Option<f64> {
        mean(self.samples(fact))
    }

    /// Distinct facts of `table` with at least one arcade sample.
    pub fn timed_fact_count(&self, table: u32) -> usize {
        self.response_times
            .get(&table)
            .map(|facts| facts.values().filter(|times| !times.is_empty()).count())
            .unwrap_or(0)
    }

    pub fn fast_answer_count(&self, table: u32) -> u32 {
        self.fast_answers.get(&table).copied().unwrap_or(0)
    }

    pub fn mastery(&self, table: u32) -> u8 {
        self.table_mastery.get(&table).copied().unwrap_or(0)
    }

    pub fn is_unlocked(&self, table: u32) -> bool {
        self.unlocked_tables.contains(&table)
    }

    pub fn is_level_completed(&self, table: u32, level: u32) -> bool {
        self.completed_levels
            .get(&table)
            .is_some_and(|levels| levels.contains(&level))
    }

    /// Whole days since the player last played, if ever.
    pub fn days_since_last_played(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_played.map(|last| (now - last).num_days().max(0))
    }

    /// Applies one resolved answer.
    pub fn apply(&mut self, update: &HistoryUpdate) {
        let fact = update.fact;
        *self.attempt_counts.entry(fact).or_insert(0) += 1;
        if update.correct {
            *self.correct_answers.entry(fact).or_insert(0) += 1;
        } else {
            *self.wrong_answers.entry(fact).or_insert(0) += 1;
        }

        match update.sample {
            Some(ResponseSample::Arcade(seconds)) => {
                self.response_times
                    .entry(fact.table)
                    .or_default()
                    .entry(fact)
                    .or_default()
                    .push(seconds);
            }
            Some(ResponseSample::Learning { level, seconds }) => {
                self.learning_response_times
                    .entry(fact.table)
                    .or_default()
                    .entry(level)
                    .or_default()
                    .entry(fact)
                    .or_default()
                    .push(seconds);
            }
            None => {}
        }

        if update.fast_answer {
            *self.fast_answers.entry(fact.table).or_insert(0) += 1;
        }
        self.table_mastery.insert(fact.table, update.table_mastery);

        if let Some(at) = update.played_at {
            self.last_played = Some(at);
        }

        debug!(
            fact = %fact,
            correct = update.correct,
            attempts = self.attempts(fact),
            mastery = update.table_mastery,
            "Applied answer to snapshot"
        );
    }

    /// Copy of this snapshot with `update` applied.
    pub fn with_update(&self, update: &HistoryUpdate) -> Self {
        let mut next = self.clone();
        next.apply(update);
        next
    }

    /// Opens `table`. Returns false when it was already open.
    pub fn unlock(&mut self, table: u32) -> bool {
        self.unlocked_tables.insert(table)
    }

    /// Marks a learning level done. Returns false when it already was.
    pub fn complete_level(&mut self, table: u32, level: u32) -> bool {
        self.completed_levels.entry(table).or_default().insert(level)
    }

    // Loaded data is kept as-is; suspicious entries are only logged.
    fn check_counters(&self) {
        for (fact, &attempts) in &self.attempt_counts {
            let resolved = self.correct(*fact) + self.wrong(*fact);
            if attempts < resolved {
                warn!(
                    fact = %fact,
                    attempts = attempts,
                    resolved = resolved,
                    "Attempt count below resolved answers"
                );
            }
        }

        let arcade = self.response_times.values().flatten();
        let learning = self.learning_response_times.values().flat_map(|levels| levels.values().flatten());
        for (fact, times) in arcade.chain(learning) {
            if times.iter().any(|&seconds| seconds.is_nan() || seconds <= 0.0) {
                warn!(fact = %fact, "Non-positive response time in history");
            }
        }
    }
}

/// Where a correct answer's time goes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ResponseSample {
    Arcade(f64),
    Learning { level: u32, seconds: f64 },
}

/// State changes produced by one resolved answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryUpdate {
    pub fact: FactId,
    pub correct: bool,
    /// Present only for correct answers.
    pub sample: Option<ResponseSample>,
    /// Running mastery for the fact's table after this answer.
    pub table_mastery: u8,
    pub fast_answer: bool,
    pub played_at: Option<DateTime<Utc>>,
}

pub(crate) fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

pub(crate) fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
