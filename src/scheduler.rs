use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug)]
struct Pending<E> {
    id: TimerId,
    due: Duration,
    generation: Generation,
    event: E,
}

/// Virtual-clock timer queue. Time only moves when the owner advances it.
#[derive(Debug)]
pub struct Scheduler<E> {
    now: Duration,
    // Timers from an older generation never fire.
    generation: Generation,
    next_id: u64,
    pending: Vec<Pending<E>>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            generation: Generation(0),
            next_id: 0,
            pending: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Starts a new generation and drops every timer from earlier ones.
    pub fn begin_generation(&mut self) -> Generation {
        self.generation = Generation(self.generation.0 + 1);
        let before = self.pending.len();
        let current = self.generation;
        self.pending.retain(|timer| timer.generation == current);
        debug!(
            generation = current.0,
            dropped = before - self.pending.len(),
            "Started timer generation"
        );
        current
    }

    pub fn schedule(&mut self, delay: Duration, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.pending.push(Pending {
            id,
            due: self.now + delay,
            generation: self.generation,
            event,
        });
        id
    }

    /// Returns false if the timer already fired or was dropped.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|timer| timer.id != id);
        before != self.pending.len()
    }

    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Time from now until the earliest live timer.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending
            .iter()
            .filter(|timer| timer.generation == self.generation)
            .map(|timer| timer.due.saturating_sub(self.now))
            .min()
    }

    /// Pops the earliest live timer due at or before `until`, moving the clock
    /// to its deadline. Stale timers met on the way are discarded.
    pub fn pop_due(&mut self, until: Duration) -> Option<E> {
        loop {
            let idx = self
                .pending
                .iter()
                .enumerate()
                .filter(|(_, timer)| timer.due <= until)
                .min_by_key(|(_, timer)| (timer.due, timer.id))
                .map(|(idx, _)| idx)?;

            let timer = self.pending.swap_remove(idx);
            if timer.generation != self.generation {
                debug!(timer = timer.id.0, "Discarded stale timer");
                continue;
            }
            self.now = self.now.max(timer.due);
            return Some(timer.event);
        }
    }

    /// Moves the clock forward to `until` without firing anything.
    pub fn settle(&mut self, until: Duration) {
        self.now = self.now.max(until);
    }

    /// Advances by `by` and returns every live event that came due, in order.
    pub fn advance(&mut self, by: Duration) -> Vec<E> {
        let until = self.now + by;
        let mut fired = Vec::new();
        while let Some(event) = self.pop_due(until) {
            fired.push(event);
        }
        self.settle(until);
        fired
    }
}

/// Sleeps on the tokio clock until the scheduler's next deadline.
///
/// Returns how long it slept, which the caller feeds back into the scheduler,
/// or `None` when nothing is pending.
pub async fn sleep_until_due<E>(scheduler: &Scheduler<E>) -> Option<Duration> {
    let wait = scheduler.next_deadline()?;
    tokio::time::sleep(wait).await;
    Some(wait)
}

/// Sleeps until the next deadline, then advances and returns what fired.
pub async fn drive_until_next<E>(scheduler: &mut Scheduler<E>) -> Vec<E> {
    match sleep_until_due(scheduler).await {
        Some(waited) => scheduler.advance(waited),
        None => Vec::new(),
    }
}
