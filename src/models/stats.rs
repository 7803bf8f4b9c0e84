use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LetterCount {
    pub correct: u64,
    pub incorrect: u64,
}

impl LetterCount {
    pub fn total(&self) -> u64 {
        self.correct + self.incorrect
    }
}

/// Glyph-level recognition counts, keyed by glyph label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LetterTally {
    counts: BTreeMap<char, LetterCount>,
}

impl LetterTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: char, correct: bool) {
        let count = self.counts.entry(label).or_default();
        if correct {
            count.correct += 1;
        } else {
            count.incorrect += 1;
        }
    }

    pub fn add(&mut self, other: &LetterTally) {
        for (label, count) in &other.counts {
            let entry = self.counts.entry(*label).or_default();
            entry.correct += count.correct;
            entry.incorrect += count.incorrect;
        }
    }

    pub fn get(&self, label: char) -> LetterCount {
        self.counts.get(&label).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&char, &LetterCount)> {
        self.counts.iter()
    }

    pub fn totals(&self) -> LetterCount {
        self.counts.values().fold(LetterCount::default(), |acc, c| LetterCount {
            correct: acc.correct + c.correct,
            incorrect: acc.incorrect + c.incorrect,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Batch-wide accumulator shared between workers.
///
/// Each image builds its own [`LetterTally`] and merges it once, so the
/// final snapshot is the exact sum of the per-image tallies regardless of
/// how images were scheduled.
#[derive(Debug, Default)]
pub struct LetterStats {
    inner: Mutex<LetterTally>,
}

impl LetterStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&self, tally: &LetterTally) {
        if tally.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.add(tally);
    }

    pub fn snapshot(&self) -> LetterTally {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Clears every counter. Only meant for the start of a run.
    pub fn reset(&self) {
        *self.inner.lock().unwrap_or_else(|e| e.into_inner()) = LetterTally::default();
    }
}
