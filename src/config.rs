use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{QuestError, Result};
use crate::types::{LearningLevel, MultiplierRange, Rank};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuestConfig {
    /// Multipliers quizzed in arcade mode.
    pub arcade_range: MultiplierRange,
    /// Planet tables in unlock order. The first one starts unlocked.
    pub planets: Vec<u32>,
    pub time_limit: TimeLimitPolicy,
    pub selection: SelectionConfig,
    pub scoring: ScoringConfig,
    pub ranks: RankThresholds,
    pub unlock: UnlockConfig,
    pub learning: LearningConfig,
    pub timing: TimingConfig,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            arcade_range: MultiplierRange::FULL,
            planets: (1..=12).collect(),
            time_limit: TimeLimitPolicy::default(),
            selection: SelectionConfig::default(),
            scoring: ScoringConfig::default(),
            ranks: RankThresholds::default(),
            unlock: UnlockConfig::default(),
            learning: LearningConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl QuestConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: QuestConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let config: QuestConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        info!(path = %path.display(), planets = config.planets.len(), "Loaded quest config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.planets.is_empty() {
            return Err(invalid("at least one planet table is required"));
        }
        let largest_multiplier = self
            .learning
            .levels
            .iter()
            .map(|level| level.range.hi())
            .fold(self.arcade_range.hi(), u32::max);

        let mut seen = BTreeSet::new();
        for &table in &self.planets {
            if table == 0 {
                return Err(invalid("planet tables must be positive"));
            }
            if table.checked_mul(largest_multiplier).is_none() {
                return Err(invalid(format!(
                    "planet table {} times {} does not fit in u32",
                    table, largest_multiplier
                )));
            }
            if !seen.insert(table) {
                return Err(invalid(format!("planet table {} listed twice", table)));
            }
        }

        self.time_limit.validate()?;
        self.selection.validate()?;
        self.scoring.validate()?;
        self.ranks.validate()?;
        self.learning.validate()?;

        debug!("Quest config validated");
        Ok(())
    }

    pub fn first_table(&self) -> u32 {
        self.planets.first().copied().unwrap_or(1)
    }

    /// Table that follows `table` in unlock order.
    pub fn next_table(&self, table: u32) -> Option<u32> {
        let idx = self.planets.iter().position(|&t| t == table)?;
        self.planets.get(idx + 1).copied()
    }

    pub fn level(&self, id: u32) -> Result<&LearningLevel> {
        self.learning
            .levels
            .iter()
            .find(|level| level.id == id)
            .ok_or(QuestError::UnknownLevel(id))
    }

    /// Level after `id` in the catalog, if any.
    pub fn next_level(&self, id: u32) -> Option<&LearningLevel> {
        let idx = self.learning.levels.iter().position(|level| level.id == id)?;
        self.learning.levels.get(idx + 1)
    }
}

fn invalid(msg: impl Into<String>) -> QuestError {
    QuestError::InvalidConfig(msg.into())
}

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{} must be within 0..=1, got {}", name, value)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeLimitPolicy {
    /// Arcade seconds per question.
    pub default_secs: u32,
    /// Per-table overrides.
    pub per_table: BTreeMap<u32, u32>,
}

impl Default for TimeLimitPolicy {
    fn default() -> Self {
        Self {
            default_secs: 15,
            per_table: BTreeMap::new(),
        }
    }
}

impl TimeLimitPolicy {
    pub fn for_table(&self, table: u32) -> u32 {
        self.per_table
            .get(&table)
            .copied()
            .unwrap_or(self.default_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.default_secs == 0 || self.per_table.values().any(|&secs| secs == 0) {
            return Err(invalid("time limits must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub arcade_least_shown_share: f64,
    pub learning_least_shown_share: f64,
    /// Upper bound of the roll that still picks slowest-first.
    pub weighted_cutoff: f64,
    pub arcade_weighted_min_facts: usize,
    pub learning_weighted_min_facts: usize,
    /// How many of the least attempted candidates the least-shown strategy draws from.
    pub least_shown_pool: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            arcade_least_shown_share: 0.4,
            learning_least_shown_share: 0.5,
            weighted_cutoff: 0.8,
            arcade_weighted_min_facts: 6,
            learning_weighted_min_facts: 1,
            least_shown_pool: 3,
        }
    }
}

impl SelectionConfig {
    fn validate(&self) -> Result<()> {
        check_ratio("arcade_least_shown_share", self.arcade_least_shown_share)?;
        check_ratio("learning_least_shown_share", self.learning_least_shown_share)?;
        check_ratio("weighted_cutoff", self.weighted_cutoff)?;
        if self.least_shown_pool == 0 {
            return Err(invalid("least_shown_pool must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub base_points: u32,
    pub learning_points: u32,
    pub streak_step: f64,
    pub streak_cap: f64,
    pub super_fast_ratio: f64,
    pub super_fast_multiplier: f64,
    pub fast_ratio: f64,
    pub fast_multiplier: f64,
    /// Remaining seconds at or above which a correct arcade answer counts as fast.
    pub fast_answer_min_remaining_secs: f64,
    pub bonus_points: u32,
    pub bonus_chance: f64,
    pub bonus_time_limit_secs: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_points: 10,
            learning_points: 10,
            streak_step: 0.1,
            streak_cap: 2.0,
            super_fast_ratio: 0.8,
            super_fast_multiplier: 2.0,
            fast_ratio: 0.6,
            fast_multiplier: 1.5,
            fast_answer_min_remaining_secs: 5.0,
            bonus_points: 50,
            bonus_chance: 0.2,
            bonus_time_limit_secs: 15,
        }
    }
}

impl ScoringConfig {
    fn validate(&self) -> Result<()> {
        if self.streak_cap < 1.0 || self.streak_step < 0.0 {
            return Err(invalid("streak_cap must be >= 1 and streak_step >= 0"));
        }
        if self.super_fast_multiplier < 1.0 || self.fast_multiplier < 1.0 {
            return Err(invalid("speed multipliers must be >= 1"));
        }
        check_ratio("super_fast_ratio", self.super_fast_ratio)?;
        check_ratio("fast_ratio", self.fast_ratio)?;
        check_ratio("bonus_chance", self.bonus_chance)?;
        if self.bonus_time_limit_secs == 0 {
            return Err(invalid("bonus_time_limit_secs must be positive"));
        }
        Ok(())
    }
}

/// Inclusive upper bounds, in seconds, of each rank's worst per-fact average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankThresholds {
    pub god: f64,
    pub hacker: f64,
    pub pro: f64,
    pub journeyman: f64,
}

impl Default for RankThresholds {
    fn default() -> Self {
        Self {
            god: 1.0,
            hacker: 3.0,
            pro: 5.0,
            journeyman: 10.0,
        }
    }
}

impl RankThresholds {
    fn validate(&self) -> Result<()> {
        let bounds = [self.god, self.hacker, self.pro, self.journeyman];
        if bounds.windows(2).any(|w| w[0] > w[1]) || self.god < 0.0 {
            return Err(invalid("rank thresholds must be non-negative and ascending"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnlockConfig {
    pub min_mastery: u8,
    pub min_fast_answers: u32,
    pub min_rank: Rank,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            min_mastery: 85,
            min_fast_answers: 10,
            min_rank: Rank::Pro,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub levels: Vec<LearningLevel>,
    /// Share of the level's facts that must have been answered correctly.
    pub completion_coverage: f64,
    /// Average answers per fact required before a level can complete.
    pub answers_per_fact: u32,
    /// Optional rank gate on top of coverage and volume.
    pub min_rank: Option<Rank>,
}

impl Default for LearningConfig {
    fn default() -> Self {
        let level = |id: u32, name: &str, lo: u32, hi: u32| LearningLevel {
            id,
            name: name.to_string(),
            range: MultiplierRange::new(lo, hi).unwrap_or_default(),
        };

        Self {
            levels: vec![
                level(1, "Level 1", 1, 3),
                level(2, "Level 2", 4, 6),
                level(3, "Level 3", 7, 9),
                level(4, "Level 4", 10, 12),
                level(5, "Combined 1-2", 1, 6),
                level(6, "Combined 3-4", 7, 12),
            ],
            completion_coverage: 0.95,
            answers_per_fact: 5,
            min_rank: None,
        }
    }
}

impl LearningConfig {
    fn validate(&self) -> Result<()> {
        check_ratio("completion_coverage", self.completion_coverage)?;
        let mut ids = BTreeSet::new();
        for level in &self.levels {
            if !ids.insert(level.id) {
                return Err(invalid(format!("learning level {} listed twice", level.id)));
            }
        }
        Ok(())
    }
}

/// Delays for countdown ticks and deferred question changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub countdown_tick_ms: u64,
    pub advance_after_correct_ms: u64,
    pub advance_after_wrong_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_tick_ms: 1000,
            advance_after_correct_ms: 1500,
            advance_after_wrong_ms: 2000,
        }
    }
}
