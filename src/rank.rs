use serde::{Deserialize, Serialize};

use crate::config::{QuestConfig, RankThresholds};
use crate::history::{mean, round_tenth, FactCounts, ProgressSnapshot};
use crate::types::{FactId, LearningLevel, MultiplierRange, Rank, Standing};

/// Tier for a worst-fact average. Each bound is inclusive.
pub fn rank_for(avg_response_time: f64, thresholds: &RankThresholds) -> Rank {
    if avg_response_time <= thresholds.god {
        Rank::God
    } else if avg_response_time <= thresholds.hacker {
        Rank::Hacker
    } else if avg_response_time <= thresholds.pro {
        Rank::Pro
    } else if avg_response_time <= thresholds.journeyman {
        Rank::Journeyman
    } else {
        Rank::Noob
    }
}

/// Largest per-fact mean over `range`, or `None` if any fact has no samples.
pub fn slowest_fact_average<'a, F>(table: u32, range: MultiplierRange, samples: F) -> Option<f64>
where
    F: Fn(FactId) -> &'a [f64],
{
    range
        .facts(table)
        .map(|fact| mean(samples(fact)).map(round_tenth))
        .try_fold(f64::MIN, |worst, avg| avg.map(|avg| worst.max(avg)))
}

fn percent(part: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    (u64::from(part) * 100 / u64::from(total)) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEvaluation {
    pub table: u32,
    pub avg_response_time: Option<f64>,
    pub rank: Option<Rank>,
    pub mastery_percent: u8,
    pub accuracy_percent: u8,
    pub total_correct: u32,
    pub total_wrong: u32,
}

pub fn evaluate_table(
    table: u32,
    snapshot: &ProgressSnapshot,
    range: MultiplierRange,
    config: &QuestConfig,
) -> TableEvaluation {
    let avg_response_time = slowest_fact_average(table, range, |fact| snapshot.samples(fact));
    let rank = avg_response_time.map(|avg| rank_for(avg, &config.ranks));

    let sum_for = |counts: &FactCounts| -> u32 {
        counts
            .iter()
            .filter(|(fact, _)| fact.table == table)
            .map(|(_, &count)| count)
            .sum()
    };
    let total_correct = sum_for(&snapshot.correct_answers);
    let total_wrong = sum_for(&snapshot.wrong_answers);
    let accuracy = percent(total_correct, total_correct + total_wrong);

    TableEvaluation {
        table,
        avg_response_time,
        rank,
        mastery_percent: accuracy,
        accuracy_percent: accuracy,
        total_correct,
        total_wrong,
    }
}

/// Arcade evaluation of every configured planet table.
pub fn mastery_report(snapshot: &ProgressSnapshot, config: &QuestConfig) -> Vec<TableEvaluation> {
    config
        .planets
        .iter()
        .map(|&table| evaluate_table(table, snapshot, config.arcade_range, config))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelEvaluation {
    pub table: u32,
    pub level: u32,
    pub facts_in_range: usize,
    /// Facts with at least one correct learning-mode answer.
    pub facts_covered: usize,
    pub total_answers: usize,
    /// Mean over every learning-mode sample in the level.
    pub avg_response_time: Option<f64>,
    pub slowest_fact_average: Option<f64>,
    pub standing: Standing,
    pub completion_percent: u8,
}

pub fn evaluate_level(
    table: u32,
    level: &LearningLevel,
    snapshot: &ProgressSnapshot,
    config: &QuestConfig,
) -> LevelEvaluation {
    let samples = |fact: FactId| snapshot.learning_samples(fact, level.id);

    let facts_in_range = level.range.len();
    let facts_covered = level
        .range
        .facts(table)
        .filter(|&fact| !samples(fact).is_empty())
        .count();
    let all: Vec<f64> = level
        .range
        .facts(table)
        .flat_map(|fact| samples(fact).iter().copied())
        .collect();

    let slowest = slowest_fact_average(table, level.range, samples);
    let standing = match slowest {
        Some(avg) => Standing::Ranked(rank_for(avg, &config.ranks)),
        None => Standing::Learning,
    };

    let target = facts_in_range as f64 * f64::from(config.learning.answers_per_fact);
    let completion_percent = if target > 0.0 {
        (all.len() as f64 / target * 100.0).round().min(100.0) as u8
    } else {
        100
    };

    LevelEvaluation {
        table,
        level: level.id,
        facts_in_range,
        facts_covered,
        total_answers: all.len(),
        avg_response_time: mean(&all),
        slowest_fact_average: slowest,
        standing,
        completion_percent,
    }
}

/// Per-fact numbers behind the heat map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactStats {
    pub fact: FactId,
    pub attempts: u32,
    pub correct: u32,
    pub wrong: u32,
    pub avg_time: Option<f64>,
}

pub fn fact_breakdown(
    table: u32,
    range: MultiplierRange,
    snapshot: &ProgressSnapshot,
) -> Vec<FactStats> {
    range
        .facts(table)
        .map(|fact| FactStats {
            fact,
            attempts: snapshot.attempts(fact),
            correct: snapshot.correct(fact),
            wrong: snapshot.wrong(fact),
            avg_time: snapshot.average_time(fact),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{HistoryUpdate, ResponseSample};
    use proptest::prelude::*;

    fn answer(snapshot: &mut ProgressSnapshot, table: u32, multiplier: u32, sample: Option<ResponseSample>) {
        snapshot.apply(&HistoryUpdate {
            fact: FactId::new(table, multiplier).unwrap(),
            correct: sample.is_some(),
            sample,
            table_mastery: 0,
            fast_answer: false,
            played_at: None,
        });
    }

    fn uniform_history(table: u32, seconds: f64) -> ProgressSnapshot {
        let mut snapshot = ProgressSnapshot::default();
        for multiplier in 1..=12 {
            answer(&mut snapshot, table, multiplier, Some(ResponseSample::Arcade(seconds)));
        }
        snapshot
    }

    #[test]
    fn thresholds_are_inclusive() {
        let t = RankThresholds::default();
        assert_eq!(rank_for(0.4, &t), Rank::God);
        assert_eq!(rank_for(1.0, &t), Rank::God);
        assert_eq!(rank_for(1.1, &t), Rank::Hacker);
        assert_eq!(rank_for(3.0, &t), Rank::Hacker);
        assert_eq!(rank_for(5.0, &t), Rank::Pro);
        assert_eq!(rank_for(10.0, &t), Rank::Journeyman);
        assert_eq!(rank_for(10.1, &t), Rank::Noob);
    }

    #[test]
    fn all_ones_is_god() {
        let config = QuestConfig::default();
        let snapshot = uniform_history(5, 1.0);
        let eval = evaluate_table(5, &snapshot, MultiplierRange::FULL, &config);
        assert_eq!(eval.avg_response_time, Some(1.0));
        assert_eq!(eval.rank, Some(Rank::God));
        assert_eq!(eval.mastery_percent, 100);
        assert_eq!(eval.accuracy_percent, 100);
    }

    #[test]
    fn slowest_fact_decides_rank() {
        let config = QuestConfig::default();
        let mut snapshot = ProgressSnapshot::default();
        for multiplier in 1..=12 {
            let seconds = if multiplier == 7 { 4.0 } else { 1.0 };
            answer(&mut snapshot, 5, multiplier, Some(ResponseSample::Arcade(seconds)));
        }
        let eval = evaluate_table(5, &snapshot, MultiplierRange::FULL, &config);
        assert_eq!(eval.avg_response_time, Some(4.0));
        assert_eq!(eval.rank, Some(Rank::Pro));
    }

    #[test]
    fn missing_fact_means_no_rank() {
        let config = QuestConfig::default();
        let mut snapshot = ProgressSnapshot::default();
        for multiplier in 1..=11 {
            answer(&mut snapshot, 8, multiplier, Some(ResponseSample::Arcade(0.5)));
        }
        // A wrong answer does not count as coverage.
        answer(&mut snapshot, 8, 12, None);
        let eval = evaluate_table(8, &snapshot, MultiplierRange::FULL, &config);
        assert_eq!(eval.rank, None);
        assert_eq!(eval.avg_response_time, None);
        assert_eq!(eval.total_correct, 11);
        assert_eq!(eval.total_wrong, 1);
        assert_eq!(eval.mastery_percent, 91);

        answer(&mut snapshot, 8, 12, Some(ResponseSample::Arcade(2.0)));
        let eval = evaluate_table(8, &snapshot, MultiplierRange::FULL, &config);
        assert_eq!(eval.rank, Some(Rank::Hacker));
    }

    #[test]
    fn per_fact_mean_is_rounded() {
        let config = QuestConfig::default();
        let mut snapshot = uniform_history(3, 1.0);
        // Mean 1.03 rounds to 1.0 and stays God.
        for _ in 0..4 {
            answer(&mut snapshot, 3, 2, Some(ResponseSample::Arcade(1.0)));
        }
        answer(&mut snapshot, 3, 2, Some(ResponseSample::Arcade(1.2)));
        let eval = evaluate_table(3, &snapshot, MultiplierRange::FULL, &config);
        assert_eq!(eval.rank, Some(Rank::God));
    }

    #[test]
    fn empty_table_reports_zero() {
        let eval = evaluate_table(4, &ProgressSnapshot::default(), MultiplierRange::FULL, &QuestConfig::default());
        assert_eq!(eval.mastery_percent, 0);
        assert_eq!(eval.rank, None);
    }

    #[test]
    fn report_covers_every_planet() {
        let config = QuestConfig::default();
        let report = mastery_report(&uniform_history(2, 2.0), &config);
        assert_eq!(report.len(), 12);
        assert_eq!(report[1].rank, Some(Rank::Hacker));
        assert_eq!(report[0].rank, None);
    }

    #[test]
    fn learning_level_standing_and_completion() {
        let config = QuestConfig::default();
        let level = config.level(1).unwrap().clone();
        let mut snapshot = ProgressSnapshot::default();
        let sample = |seconds| Some(ResponseSample::Learning { level: 1, seconds });

        answer(&mut snapshot, 6, 1, sample(2.0));
        answer(&mut snapshot, 6, 2, sample(2.0));
        let eval = evaluate_level(6, &level, &snapshot, &config);
        assert_eq!(eval.standing, Standing::Learning);
        assert_eq!(eval.facts_covered, 2);
        assert_eq!(eval.completion_percent, 13);

        answer(&mut snapshot, 6, 3, sample(5.0));
        let eval = evaluate_level(6, &level, &snapshot, &config);
        assert_eq!(eval.standing, Standing::Ranked(Rank::Pro));
        assert_eq!(eval.total_answers, 3);
        assert_eq!(eval.avg_response_time, Some(3.0));
    }

    #[test]
    fn breakdown_lists_each_fact() {
        let mut snapshot = ProgressSnapshot::default();
        answer(&mut snapshot, 9, 4, Some(ResponseSample::Arcade(3.0)));
        answer(&mut snapshot, 9, 4, None);
        let rows = fact_breakdown(9, MultiplierRange::new(3, 5).unwrap(), &snapshot);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].attempts, 2);
        assert_eq!(rows[1].correct, 1);
        assert_eq!(rows[1].wrong, 1);
        assert_eq!(rows[1].avg_time, Some(3.0));
        assert_eq!(rows[0].avg_time, None);
    }

    proptest! {
        #[test]
        fn faster_samples_never_lower_rank(
            times in proptest::collection::vec(0.1f64..20.0, 12),
            idx in 0usize..12,
            cut in 0.0f64..1.0,
        ) {
            let config = QuestConfig::default();
            let build = |times: &[f64]| {
                let mut snapshot = ProgressSnapshot::default();
                for (i, &seconds) in times.iter().enumerate() {
                    answer(&mut snapshot, 7, i as u32 + 1, Some(ResponseSample::Arcade(seconds)));
                }
                evaluate_table(7, &snapshot, MultiplierRange::FULL, &config).rank
            };

            let before = build(&times);
            let mut faster = times.clone();
            faster[idx] *= cut;
            let after = build(&faster);

            prop_assert!(before.is_some() && after.is_some());
            prop_assert!(after <= before);
        }
    }
}
