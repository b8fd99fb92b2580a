use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{QuestError, Result};

/// One multiplication fact, `table × multiplier`.
///
/// Persisted as the string `"{table}x{multiplier}"` so stored snapshots keep
/// their key layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FactId {
    pub table: u32,
    pub multiplier: u32,
}

impl FactId {
    pub fn new(table: u32, multiplier: u32) -> Result<Self> {
        if table == 0 || multiplier == 0 || table.checked_mul(multiplier).is_none() {
            return Err(QuestError::InvalidFact(format!("{}x{}", table, multiplier)));
        }
        Ok(Self { table, multiplier })
    }

    pub fn answer(&self) -> Result<u32> {
        self.table
            .checked_mul(self.multiplier)
            .ok_or_else(|| QuestError::InvalidFact(self.to_string()))
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.table, self.multiplier)
    }
}

impl FromStr for FactId {
    type Err = QuestError;

    fn from_str(s: &str) -> Result<Self> {
        // Older saves used the multiplication sign as separator.
        let (table, multiplier) = s
            .split_once('x')
            .or_else(|| s.split_once('×'))
            .ok_or_else(|| QuestError::InvalidFact(s.to_string()))?;

        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| QuestError::InvalidFact(s.to_string()))
        };

        FactId::new(parse(table)?, parse(multiplier)?)
    }
}

impl Serialize for FactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FactId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Inclusive range of multipliers a question may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "[u32; 2]", into = "[u32; 2]")]
pub struct MultiplierRange {
    lo: u32,
    hi: u32,
}

impl MultiplierRange {
    pub const FULL: MultiplierRange = MultiplierRange { lo: 1, hi: 12 };

    pub fn new(lo: u32, hi: u32) -> Result<Self> {
        if lo == 0 || lo > hi {
            return Err(QuestError::InvalidRange { lo, hi });
        }
        Ok(Self { lo, hi })
    }

    pub fn lo(&self) -> u32 {
        self.lo
    }

    pub fn hi(&self) -> u32 {
        self.hi
    }

    pub fn len(&self) -> usize {
        (self.hi - self.lo + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, multiplier: u32) -> bool {
        (self.lo..=self.hi).contains(&multiplier)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.lo..=self.hi
    }

    /// Every fact of `table` inside this range.
    pub fn facts(&self, table: u32) -> impl Iterator<Item = FactId> {
        self.iter().map(move |multiplier| FactId { table, multiplier })
    }
}

impl Default for MultiplierRange {
    fn default() -> Self {
        Self::FULL
    }
}

impl TryFrom<[u32; 2]> for MultiplierRange {
    type Error = QuestError;

    fn try_from(bounds: [u32; 2]) -> Result<Self> {
        MultiplierRange::new(bounds[0], bounds[1])
    }
}

impl From<MultiplierRange> for [u32; 2] {
    fn from(range: MultiplierRange) -> Self {
        [range.lo, range.hi]
    }
}

impl fmt::Display for MultiplierRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "×{} to ×{}", self.lo, self.hi)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearningLevel {
    pub id: u32,
    pub name: String,
    pub range: MultiplierRange,
}

impl LearningLevel {
    pub fn description(&self) -> String {
        format!("Multiplication {}", self.range)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Timed play over the full multiplier range.
    Arcade,
    /// Untimed practice scoped to one level's sub-range.
    Learning(LearningLevel),
}

impl Mode {
    pub fn is_learning(&self) -> bool {
        matches!(self, Mode::Learning(_))
    }

    pub fn range(&self, arcade_range: MultiplierRange) -> MultiplierRange {
        match self {
            Mode::Arcade => arcade_range,
            Mode::Learning(level) => level.range,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub multiplicand: u32,
    pub multiplier: u32,
    pub answer: u32,
    /// Seconds allowed; `None` means untimed.
    pub time_limit: Option<u32>,
    pub options: [u32; 4],
}

impl Question {
    pub fn fact(&self) -> FactId {
        FactId {
            table: self.multiplicand,
            multiplier: self.multiplier,
        }
    }
}

/// Skill tier. Ordered fastest first, so `God < Noob`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rank {
    God,
    Hacker,
    Pro,
    Journeyman,
    Noob,
}

impl Rank {
    /// True when this rank is as fast as or faster than `min`.
    pub fn at_least(self, min: Rank) -> bool {
        self <= min
    }

    pub fn label(self) -> &'static str {
        match self {
            Rank::God => "God",
            Rank::Hacker => "Hacker",
            Rank::Pro => "Pro",
            Rank::Journeyman => "Journeyman",
            Rank::Noob => "Noob",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Learning-mode standing: a rank, or the `Learning` pseudo-rank while data is thin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Standing {
    Learning,
    Ranked(Rank),
}

impl Standing {
    pub fn rank(self) -> Option<Rank> {
        match self {
            Standing::Learning => None,
            Standing::Ranked(rank) => Some(rank),
        }
    }
}

impl fmt::Display for Standing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Standing::Learning => f.write_str("Learning"),
            Standing::Ranked(rank) => rank.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_id_uses_canonical_key() {
        let fact = FactId::new(5, 7).unwrap();
        assert_eq!(fact.to_string(), "5x7");
        assert_eq!("5x7".parse::<FactId>().unwrap(), fact);
        assert_eq!("5×7".parse::<FactId>().unwrap(), fact);
        assert_eq!(fact.answer().unwrap(), 35);
    }

    #[test]
    fn fact_id_rejects_products_past_u32() {
        assert!(FactId::new(u32::MAX / 2, 3).is_err());
        assert!(FactId::new(u32::MAX, 1).is_ok());

        let built = FactId { table: u32::MAX / 2, multiplier: 12 };
        assert!(matches!(built.answer(), Err(QuestError::InvalidFact(_))));
    }

    #[test]
    fn fact_id_rejects_zero_and_garbage() {
        assert!(FactId::new(0, 3).is_err());
        assert!("7x0".parse::<FactId>().is_err());
        assert!("table_7".parse::<FactId>().is_err());
        assert!("axb".parse::<FactId>().is_err());
    }

    #[test]
    fn fact_id_as_json_map_key() {
        let mut counts = std::collections::BTreeMap::new();
        counts.insert(FactId::new(3, 4).unwrap(), 2u32);
        let json = serde_json::to_string(&counts).unwrap();
        assert_eq!(json, r#"{"3x4":2}"#);
        let back: std::collections::BTreeMap<FactId, u32> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counts);
    }

    #[test]
    fn range_validation() {
        assert!(MultiplierRange::new(4, 3).is_err());
        assert!(MultiplierRange::new(0, 3).is_err());
        let range = MultiplierRange::new(4, 6).unwrap();
        assert_eq!(range.len(), 3);
        assert!(range.contains(5));
        assert!(!range.contains(7));
        assert!(serde_json::from_str::<MultiplierRange>("[9, 2]").is_err());
        assert_eq!(serde_json::from_str::<MultiplierRange>("[4, 6]").unwrap(), range);
    }

    #[test]
    fn rank_order_is_fastest_first() {
        assert!(Rank::God < Rank::Hacker);
        assert!(Rank::Journeyman < Rank::Noob);
        assert!(Rank::Hacker.at_least(Rank::Pro));
        assert!(Rank::Pro.at_least(Rank::Pro));
        assert!(!Rank::Journeyman.at_least(Rank::Pro));
    }

    #[test]
    fn standing_display() {
        assert_eq!(Standing::Learning.to_string(), "Learning");
        assert_eq!(Standing::Ranked(Rank::Hacker).to_string(), "Hacker");
        assert_eq!(Standing::Learning.rank(), None);
    }
}
