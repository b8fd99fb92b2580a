use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use tracing::{debug, warn};

use crate::config::QuestConfig;
use crate::distractor::{draw_mistake, shuffled_options, wrong_answers};
use crate::error::Result;
use crate::history::ProgressSnapshot;
use crate::types::{FactId, Mode, MultiplierRange, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LeastShown,
    SlowestFirst,
    Uniform,
}

/// Multipliers eligible for the next question.
pub fn candidates(range: MultiplierRange, exclude: Option<u32>) -> Vec<u32> {
    let available: Vec<u32> = range.iter().filter(|&m| Some(m) != exclude).collect();
    if available.is_empty() {
        // Single-value range: repeating is the only option.
        return range.iter().collect();
    }
    available
}

/// Chooses a multiplier for `table` and reports which strategy produced it.
pub fn pick_multiplier<R: Rng + ?Sized>(
    table: u32,
    exclude: Option<u32>,
    snapshot: &ProgressSnapshot,
    mode: &Mode,
    config: &QuestConfig,
    rng: &mut R,
) -> (u32, Strategy) {
    let selection = &config.selection;
    let range = mode.range(config.arcade_range);
    let mut available = candidates(range, exclude);

    let (least_shown_share, min_facts) = match mode {
        Mode::Arcade => (
            selection.arcade_least_shown_share,
            selection.arcade_weighted_min_facts,
        ),
        Mode::Learning(_) => (
            selection.learning_least_shown_share,
            selection.learning_weighted_min_facts,
        ),
    };

    let roll: f64 = rng.gen();
    let fact = |multiplier: u32| FactId { table, multiplier };

    if roll < least_shown_share {
        available.sort_by_key(|&m| snapshot.attempts(fact(m)));
        let pool = selection.least_shown_pool.min(available.len());
        let multiplier = available[rng.gen_range(0..pool)];
        return (multiplier, Strategy::LeastShown);
    }

    if roll < selection.weighted_cutoff && snapshot.timed_fact_count(table) >= min_facts {
        // Unseen facts keep weight 1 so they stay reachable.
        let weights: Vec<f64> = available
            .iter()
            .map(|&m| snapshot.average_time(fact(m)).unwrap_or(0.0).max(1.0))
            .collect();

        match WeightedIndex::new(&weights) {
            Ok(dist) => {
                let multiplier = available[dist.sample(rng)];
                debug!(
                    table = table,
                    multiplier = multiplier,
                    weights = ?weights,
                    "Slowest-first selection"
                );
                return (multiplier, Strategy::SlowestFirst);
            }
            Err(e) => warn!(table = table, error = %e, "Weighted selection failed, using uniform"),
        }
    }

    let multiplier = available[rng.gen_range(0..available.len())];
    (multiplier, Strategy::Uniform)
}

/// Builds the next question for `table` in `mode`.
pub fn select_question<R: Rng + ?Sized>(
    table: u32,
    exclude: Option<u32>,
    snapshot: &ProgressSnapshot,
    mode: &Mode,
    config: &QuestConfig,
    rng: &mut R,
) -> Result<Question> {
    // Every multiplier in range must have a representable product.
    let range = mode.range(config.arcade_range);
    FactId::new(table, range.hi())?;

    let (multiplier, strategy) = pick_multiplier(table, exclude, snapshot, mode, config, rng);
    let answer = FactId::new(table, multiplier)?.answer()?;
    let wrong = wrong_answers(answer, rng, |rng| draw_mistake(table, multiplier, rng));
    let options = shuffled_options(answer, wrong, rng);

    let time_limit = match mode {
        Mode::Arcade => Some(config.time_limit.for_table(table)),
        Mode::Learning(_) => None,
    };

    debug!(
        table = table,
        multiplier = multiplier,
        strategy = ?strategy,
        options = ?options,
        time_limit = ?time_limit,
        "Selected question"
    );

    Ok(Question {
        multiplicand: table,
        multiplier,
        answer,
        time_limit,
        options,
    })
}

/// A bonus round question over any two factors from 1 to 12.
pub fn select_bonus_question<R: Rng + ?Sized>(config: &QuestConfig, rng: &mut R) -> Question {
    let first = rng.gen_range(1..=12u32);
    let second = rng.gen_range(1..=12u32);
    let answer = first * second;

    let wrong = wrong_answers(answer, rng, |rng| {
        let (a, b) = (i64::from(first), i64::from(second));
        if rng.gen_bool(0.5) {
            let offset = rng.gen_range(1..=5);
            if rng.gen_bool(0.5) {
                a * b + offset
            } else {
                a * b - offset
            }
        } else if rng.gen_bool(0.5) {
            a + b
        } else {
            a * (b + 1)
        }
    });

    Question {
        multiplicand: first,
        multiplier: second,
        answer,
        time_limit: Some(config.scoring.bonus_time_limit_secs),
        options: shuffled_options(answer, wrong, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::Strategy;
    use crate::error::QuestError;
    use crate::history::{HistoryUpdate, ResponseSample};
    use crate::types::LearningLevel;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn record(snapshot: &mut ProgressSnapshot, table: u32, multiplier: u32, seconds: f64) {
        snapshot.apply(&HistoryUpdate {
            fact: FactId::new(table, multiplier).unwrap(),
            correct: true,
            sample: Some(ResponseSample::Arcade(seconds)),
            table_mastery: 100,
            fast_answer: false,
            played_at: None,
        });
    }

    fn learning(lo: u32, hi: u32) -> Mode {
        Mode::Learning(LearningLevel {
            id: 1,
            name: "Level".to_string(),
            range: MultiplierRange::new(lo, hi).unwrap(),
        })
    }

    #[test]
    fn empty_history_table_seven_excluding_three() {
        let config = QuestConfig::default();
        let snapshot = ProgressSnapshot::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let q = select_question(7, Some(3), &snapshot, &Mode::Arcade, &config, &mut rng).unwrap();
            assert_ne!(q.multiplier, 3);
            assert!((1..=12).contains(&q.multiplier));
            assert_eq!(q.answer, 7 * q.multiplier);
            assert_eq!(q.time_limit, Some(15));
        }
    }

    #[test]
    fn single_value_range_may_repeat() {
        let config = QuestConfig::default();
        let snapshot = ProgressSnapshot::default();
        let mut rng = StdRng::seed_from_u64(5);
        let q = select_question(4, Some(9), &snapshot, &learning(9, 9), &config, &mut rng).unwrap();
        assert_eq!(q.multiplier, 9);
        assert_eq!(q.time_limit, None);
    }

    #[test]
    fn learning_questions_stay_in_level_range() {
        let config = QuestConfig::default();
        let snapshot = ProgressSnapshot::default();
        let mut rng = StdRng::seed_from_u64(21);
        let mode = learning(4, 6);
        for _ in 0..100 {
            let q = select_question(8, None, &snapshot, &mode, &config, &mut rng).unwrap();
            assert!((4..=6).contains(&q.multiplier));
        }
    }

    #[test]
    fn zero_table_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = select_question(
            0,
            None,
            &ProgressSnapshot::default(),
            &Mode::Arcade,
            &QuestConfig::default(),
            &mut rng,
        );
        assert!(result.is_err());
    }

    #[test]
    fn oversized_table_is_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = select_question(
            u32::MAX / 2,
            None,
            &ProgressSnapshot::default(),
            &Mode::Arcade,
            &QuestConfig::default(),
            &mut rng,
        );
        assert!(matches!(result, Err(QuestError::InvalidFact(_))));

        // Largest table whose ×12 still fits.
        let q = select_question(
            u32::MAX / 12,
            None,
            &ProgressSnapshot::default(),
            &Mode::Arcade,
            &QuestConfig::default(),
            &mut rng,
        )
        .unwrap();
        assert_eq!(q.answer, q.multiplicand * q.multiplier);
        assert!(q.options.contains(&q.answer));
    }

    #[test]
    fn least_shown_prefers_unattempted_facts() {
        let mut config = QuestConfig::default();
        config.selection.arcade_least_shown_share = 1.0;
        let mut snapshot = ProgressSnapshot::default();
        for multiplier in 1..=12 {
            if ![2, 5, 11].contains(&multiplier) {
                record(&mut snapshot, 6, multiplier, 2.0);
            }
        }

        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..100 {
            let (m, strategy) = pick_multiplier(6, None, &snapshot, &Mode::Arcade, &config, &mut rng);
            assert_eq!(strategy, Strategy::LeastShown);
            assert!([2, 5, 11].contains(&m));
        }
    }

    #[test]
    fn slowest_first_needs_enough_timed_facts() {
        let mut config = QuestConfig::default();
        config.selection.arcade_least_shown_share = 0.0;
        config.selection.weighted_cutoff = 1.0;
        let mut snapshot = ProgressSnapshot::default();
        for multiplier in 1..=5 {
            record(&mut snapshot, 3, multiplier, 2.0);
        }

        let mut rng = StdRng::seed_from_u64(2);
        let (_, strategy) = pick_multiplier(3, None, &snapshot, &Mode::Arcade, &config, &mut rng);
        assert_eq!(strategy, Strategy::Uniform);

        record(&mut snapshot, 3, 6, 2.0);
        let (_, strategy) = pick_multiplier(3, None, &snapshot, &Mode::Arcade, &config, &mut rng);
        assert_eq!(strategy, Strategy::SlowestFirst);
    }

    #[test]
    fn slowest_first_favours_slow_facts() {
        let mut config = QuestConfig::default();
        config.selection.arcade_least_shown_share = 0.0;
        config.selection.weighted_cutoff = 1.0;
        let mut snapshot = ProgressSnapshot::default();
        for multiplier in 1..=12 {
            let seconds = if multiplier == 8 { 14.0 } else { 1.0 };
            record(&mut snapshot, 9, multiplier, seconds);
        }

        let mut rng = StdRng::seed_from_u64(17);
        let picks = (0..2000)
            .filter(|_| pick_multiplier(9, None, &snapshot, &Mode::Arcade, &config, &mut rng).0 == 8)
            .count();
        // Weight 14 out of 25: well above the uniform 1/12.
        assert!(picks > 900, "picked 8 only {} times", picks);
    }

    #[test]
    fn bonus_question_is_well_formed() {
        let config = QuestConfig::default();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..100 {
            let q = select_bonus_question(&config, &mut rng);
            assert_eq!(q.answer, q.multiplicand * q.multiplier);
            assert_eq!(q.time_limit, Some(15));
            assert_eq!(q.options.iter().filter(|&&o| o == q.answer).count(), 1);
        }
    }

    proptest! {
        #[test]
        fn never_repeats_and_options_are_valid(
            table in 1u32..=12,
            exclude in proptest::option::of(1u32..=12),
            seed in any::<u64>(),
            history in proptest::collection::vec((1u32..=12, 0.5f64..20.0), 0..40),
        ) {
            let config = QuestConfig::default();
            let mut snapshot = ProgressSnapshot::default();
            for (multiplier, seconds) in history {
                record(&mut snapshot, table, multiplier, seconds);
            }
            let mut rng = StdRng::seed_from_u64(seed);
            let q = select_question(table, exclude, &snapshot, &Mode::Arcade, &config, &mut rng).unwrap();

            prop_assert!(Some(q.multiplier) != exclude);
            prop_assert_eq!(q.answer, table * q.multiplier);
            prop_assert_eq!(q.options.iter().filter(|&&o| o == q.answer).count(), 1);
            let mut sorted = q.options;
            sorted.sort_unstable();
            prop_assert!(sorted.windows(2).all(|w| w[0] != w[1]));
            prop_assert!(sorted.iter().all(|&o| o > 0));
        }
    }
}
