use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::config::QuestConfig;
use crate::error::{QuestError, Result};
use crate::history::{HistoryUpdate, ProgressSnapshot};
use crate::progression::{advance_level, advance_unlock, LevelOutcome, UnlockOutcome};
use crate::scheduler::Scheduler;
use crate::scoring::{resolve_answer, score_answer, ScoreResult};
use crate::selector::{select_bonus_question, select_question};
use crate::types::{Mode, Question};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No question on screen.
    Idle,
    /// Waiting for an answer.
    Asking,
    /// Showing feedback until the next question.
    Feedback,
    /// Waiting for a bonus round answer.
    Bonus,
    BonusFeedback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerEvent {
    CountdownTick,
    Advance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerReport {
    pub question: Question,
    pub score: ScoreResult,
    pub update: HistoryUpdate,
    pub unlock: Option<UnlockOutcome>,
    pub level: Option<LevelOutcome>,
    pub total_score: u64,
    /// A bonus round comes next instead of a regular question.
    pub bonus_round: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusReport {
    pub correct: bool,
    pub answer: u32,
    pub points_awarded: u32,
    pub total_score: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    QuestionReady(Question),
    Countdown { remaining: u32 },
    TimedOut(Box<AnswerReport>),
    BonusReady(Question),
    BonusTimedOut(BonusReport),
}

/// One player's run on one planet: exactly one active question at a time.
///
/// The session owns a working copy of the snapshot. After every resolved
/// answer the shell should persist [`Session::snapshot`].
pub struct Session<R = StdRng> {
    config: QuestConfig,
    snapshot: ProgressSnapshot,
    table: u32,
    mode: Mode,
    rng: R,
    timers: Scheduler<TimerEvent>,
    // Wall-clock origin of the timer queue's virtual time.
    started: Instant,
    phase: Phase,
    current: Option<Question>,
    bonus: Option<Question>,
    bonus_next: bool,
    previous_multiplier: Option<u32>,
    asked_at: Duration,
    remaining: Option<u32>,
    streak: f64,
    score: u64,
}

impl Session<StdRng> {
    pub fn from_entropy(
        config: QuestConfig,
        snapshot: ProgressSnapshot,
        table: u32,
        mode: Mode,
    ) -> Result<Self> {
        Self::new(config, snapshot, table, mode, StdRng::from_entropy())
    }
}

impl<R: Rng> Session<R> {
    pub fn new(
        config: QuestConfig,
        snapshot: ProgressSnapshot,
        table: u32,
        mode: Mode,
        rng: R,
    ) -> Result<Self> {
        config.validate()?;
        if !snapshot.is_unlocked(table) {
            return Err(QuestError::PlanetLocked(table));
        }

        info!(table = table, learning = mode.is_learning(), "Starting session");
        Ok(Self {
            config,
            snapshot,
            table,
            mode,
            rng,
            timers: Scheduler::new(),
            started: Instant::now(),
            phase: Phase::Idle,
            current: None,
            bonus: None,
            bonus_next: false,
            previous_multiplier: None,
            asked_at: Duration::ZERO,
            remaining: None,
            streak: 1.0,
            score: 0,
        })
    }

    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }

    pub fn into_snapshot(self) -> ProgressSnapshot {
        self.snapshot
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current(&self) -> Option<&Question> {
        match self.phase {
            Phase::Bonus | Phase::BonusFeedback => self.bonus.as_ref(),
            _ => self.current.as_ref(),
        }
    }

    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn streak(&self) -> f64 {
        self.streak
    }

    pub fn score(&self) -> u64 {
        self.score
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// Replaces whatever is on screen with a fresh question.
    #[instrument(skip(self), fields(table = self.table))]
    pub fn next_question(&mut self) -> Result<Question> {
        self.timers.begin_generation();

        let question = select_question(
            self.table,
            self.previous_multiplier,
            &self.snapshot,
            &self.mode,
            &self.config,
            &mut self.rng,
        )?;

        self.previous_multiplier = Some(question.multiplier);
        self.remaining = question.time_limit;
        self.asked_at = self.sync_clock();
        self.phase = Phase::Asking;
        self.bonus = None;
        self.bonus_next = false;
        if question.time_limit.is_some() {
            self.timers.schedule(self.tick_interval(), TimerEvent::CountdownTick);
        }
        self.current = Some(question.clone());
        Ok(question)
    }

    /// Switches between arcade and a learning level and asks a new question.
    pub fn switch_mode(&mut self, mode: Mode) -> Result<Question> {
        info!(table = self.table, learning = mode.is_learning(), "Switching mode");
        self.mode = mode;
        self.previous_multiplier = None;
        self.next_question()
    }

    /// Leaves the screen. Pending countdowns and transitions become no-ops.
    pub fn leave(&mut self) {
        self.timers.begin_generation();
        self.phase = Phase::Idle;
        self.current = None;
        self.bonus = None;
        self.remaining = None;
        debug!(table = self.table, "Left session");
    }

    pub fn submit(&mut self, answer: u32) -> Result<AnswerReport> {
        if self.phase != Phase::Asking {
            return Err(QuestError::NoActiveQuestion);
        }
        let elapsed = self.sync_clock().saturating_sub(self.asked_at).as_secs_f64();
        self.resolve(Some(answer), elapsed)
    }

    pub fn submit_bonus(&mut self, answer: u32) -> Result<BonusReport> {
        if self.phase != Phase::Bonus {
            return Err(QuestError::NoActiveQuestion);
        }
        self.finish_bonus(Some(answer))
    }

    fn finish_bonus(&mut self, submitted: Option<u32>) -> Result<BonusReport> {
        let answer = self.bonus.as_ref().ok_or(QuestError::NoActiveQuestion)?.answer;

        let correct = submitted == Some(answer);
        let points = if correct { self.config.scoring.bonus_points } else { 0 };
        self.score += u64::from(points);
        self.sync_clock();
        self.remaining = None;
        self.phase = Phase::BonusFeedback;
        self.timers.begin_generation();
        self.timers.schedule(self.wrong_delay(), TimerEvent::Advance);

        info!(correct = correct, timed_out = submitted.is_none(), points = points, "Bonus round finished");
        Ok(BonusReport {
            correct,
            answer,
            points_awarded: points,
            total_score: self.score,
        })
    }

    /// Moves the session clock forward and handles every timer that came due.
    pub fn tick(&mut self, elapsed: Duration) -> Result<Vec<SessionEvent>> {
        let until = self.timers.now() + elapsed;
        let mut events = Vec::new();
        while let Some(timer) = self.timers.pop_due(until) {
            if let Some(event) = self.on_timer(timer)? {
                events.push(event);
            }
        }
        self.timers.settle(until);
        Ok(events)
    }

    /// Waits on the tokio clock for the next timer and handles it.
    /// Returns `None` when nothing is scheduled.
    ///
    /// Cancel safe: the deadline is absolute, so dropping this future midway
    /// (e.g. in a `select!` against player input) loses no time.
    pub async fn wait_for_timer(&mut self) -> Result<Option<Vec<SessionEvent>>> {
        let Some(wait) = self.timers.next_deadline() else {
            return Ok(None);
        };
        let due = self.timers.now() + wait;
        tokio::time::sleep_until(self.started + due).await;

        let caught_up = self.started.elapsed().max(due) - self.timers.now();
        self.tick(caught_up).map(Some)
    }

    /// Session time: the timer queue's clock, pulled forward to wall time when
    /// the host has let real time pass without ticking. Timers scheduled after
    /// this count from the returned instant.
    fn sync_clock(&mut self) -> Duration {
        let now = self.timers.now().max(self.started.elapsed());
        self.timers.settle(now);
        now
    }

    fn on_timer(&mut self, timer: TimerEvent) -> Result<Option<SessionEvent>> {
        match (timer, self.phase) {
            (TimerEvent::CountdownTick, Phase::Asking | Phase::Bonus) => {
                let remaining = self.remaining.unwrap_or(0).saturating_sub(1);
                self.remaining = Some(remaining);
                if remaining > 0 {
                    self.timers.schedule(self.tick_interval(), TimerEvent::CountdownTick);
                    return Ok(Some(SessionEvent::Countdown { remaining }));
                }
                if self.phase == Phase::Bonus {
                    let report = self.finish_bonus(None)?;
                    return Ok(Some(SessionEvent::BonusTimedOut(report)));
                }
                let elapsed = self.sync_clock().saturating_sub(self.asked_at).as_secs_f64();
                let report = self.resolve(None, elapsed)?;
                Ok(Some(SessionEvent::TimedOut(Box::new(report))))
            }
            (TimerEvent::Advance, Phase::Feedback) if self.bonus_next => {
                self.timers.begin_generation();
                let question = select_bonus_question(&self.config, &mut self.rng);
                self.bonus = Some(question.clone());
                self.bonus_next = false;
                self.remaining = question.time_limit;
                self.phase = Phase::Bonus;
                if question.time_limit.is_some() {
                    self.timers.schedule(self.tick_interval(), TimerEvent::CountdownTick);
                }
                Ok(Some(SessionEvent::BonusReady(question)))
            }
            (TimerEvent::Advance, Phase::Feedback | Phase::BonusFeedback) => {
                self.next_question().map(|q| Some(SessionEvent::QuestionReady(q)))
            }
            (timer, phase) => {
                debug!(timer = ?timer, phase = ?phase, "Ignored timer");
                Ok(None)
            }
        }
    }

    fn resolve(&mut self, submitted: Option<u32>, elapsed: f64) -> Result<AnswerReport> {
        let question = self.current.clone().ok_or(QuestError::NoActiveQuestion)?;

        let score = score_answer(&question, submitted, elapsed, &self.mode, self.streak, &self.config)?;
        let update = resolve_answer(
            &question,
            &score,
            &self.mode,
            &self.snapshot,
            &self.config,
            Some(Utc::now()),
        );
        self.snapshot.apply(&update);
        self.streak = score.new_streak;
        self.score += u64::from(score.points_awarded);

        let (unlock, level) = match (&self.mode, score.correct) {
            (Mode::Arcade, true) => (Some(advance_unlock(self.table, &mut self.snapshot, &self.config)), None),
            (Mode::Learning(level), true) => {
                let level = level.clone();
                (None, Some(advance_level(self.table, &level, &mut self.snapshot, &self.config)))
            }
            (_, false) => (None, None),
        };

        let bonus_round = score.correct
            && matches!(self.mode, Mode::Arcade)
            && self.rng.gen_bool(self.config.scoring.bonus_chance);

        // The countdown dies with this generation.
        self.timers.begin_generation();
        let delay = if score.correct { self.correct_delay() } else { self.wrong_delay() };
        self.timers.schedule(delay, TimerEvent::Advance);
        self.phase = Phase::Feedback;
        self.bonus_next = bonus_round;

        Ok(AnswerReport {
            question,
            score,
            update,
            unlock,
            level,
            total_score: self.score,
            bonus_round,
        })
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.config.timing.countdown_tick_ms)
    }

    fn correct_delay(&self) -> Duration {
        Duration::from_millis(self.config.timing.advance_after_correct_ms)
    }

    fn wrong_delay(&self) -> Duration {
        Duration::from_millis(self.config.timing.advance_after_wrong_ms)
    }
}
