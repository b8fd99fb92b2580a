use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Random draws tried before falling back to walking outward from the answer.
pub const MAX_DISTRACTOR_ATTEMPTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MistakeKind {
    /// Off by one to three.
    SmallOffset,
    /// Added the factors instead of multiplying.
    Added,
    /// Used a neighbouring table.
    WrongTable,
    /// Somewhere near the answer.
    Nearby,
}

impl MistakeKind {
    fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let roll: f64 = rng.gen();
        if roll < 0.3 {
            MistakeKind::SmallOffset
        } else if roll < 0.6 {
            MistakeKind::Added
        } else if roll < 0.8 {
            MistakeKind::WrongTable
        } else {
            MistakeKind::Nearby
        }
    }
}

fn signed<R: Rng + ?Sized>(rng: &mut R, magnitude: i64) -> i64 {
    if rng.gen_bool(0.5) {
        magnitude
    } else {
        -magnitude
    }
}

/// One candidate wrong answer for `table × multiplier`; may collide or be non-positive.
pub fn draw_mistake<R: Rng + ?Sized>(table: u32, multiplier: u32, rng: &mut R) -> i64 {
    let table = i64::from(table);
    let multiplier = i64::from(multiplier);
    let answer = table * multiplier;

    match MistakeKind::roll(rng) {
        MistakeKind::SmallOffset => {
            let offset = rng.gen_range(1..=3);
            answer + signed(rng, offset)
        }
        MistakeKind::Added => table + multiplier,
        MistakeKind::WrongTable => {
            let offset = rng.gen_range(1..=2);
            (table + signed(rng, offset)) * multiplier
        }
        MistakeKind::Nearby => {
            let window = (answer / 5).max(5);
            answer + rng.gen_range(0..window * 2) - window
        }
    }
}

/// Three distinct positive wrong answers, none equal to `answer`.
///
/// `draw` proposes candidates. After [`MAX_DISTRACTOR_ATTEMPTS`] proposals the
/// remaining slots are filled with the closest unused values around `answer`.
pub fn wrong_answers<R, F>(answer: u32, rng: &mut R, mut draw: F) -> [u32; 3]
where
    R: Rng + ?Sized,
    F: FnMut(&mut R) -> i64,
{
    let mut picked: Vec<u32> = Vec::with_capacity(3);
    let accept = |candidate: i64, picked: &mut Vec<u32>| {
        if let Ok(value) = u32::try_from(candidate) {
            if value > 0 && value != answer && !picked.contains(&value) {
                picked.push(value);
            }
        }
    };

    let mut attempts = 0;
    while picked.len() < 3 && attempts < MAX_DISTRACTOR_ATTEMPTS {
        let candidate = draw(rng);
        accept(candidate, &mut picked);
        attempts += 1;
    }

    if picked.len() < 3 {
        debug!(
            answer = answer,
            found = picked.len(),
            attempts = attempts,
            "Distractor draws exhausted, widening around answer"
        );
        let answer = i64::from(answer);
        let mut offset = 1;
        while picked.len() < 3 {
            accept(answer + offset, &mut picked);
            if picked.len() < 3 {
                accept(answer - offset, &mut picked);
            }
            offset += 1;
        }
    }

    [picked[0], picked[1], picked[2]]
}

/// The answer plus its distractors in uniformly random order.
pub fn shuffled_options<R: Rng + ?Sized>(answer: u32, wrong: [u32; 3], rng: &mut R) -> [u32; 4] {
    let mut options = [answer, wrong[0], wrong[1], wrong[2]];
    options.shuffle(rng);
    options
}
