//! Aggregated statistics over classified runs.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::classify::Outcome;
use crate::run::Run;

/// Frequency table keyed by suspect-set size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Histogram(BTreeMap<usize, u64>);

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: usize) {
        *self.0.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: usize) -> u64 {
        self.0.get(&key).copied().unwrap_or(0)
    }

    /// Entries sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.0.iter().map(|(&k, &v)| (k, v))
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn merge(&mut self, other: &Histogram) {
        for (key, count) in other.iter() {
            *self.0.entry(key).or_insert(0) += count;
        }
    }
}

/// What one classified run contributes to a [`Summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSample {
    pub outcome: Outcome,
    pub found_files: usize,
    pub found_symbols: usize,
    /// The run's symbol scores contain the configured error sentinel.
    pub error_case: bool,
}

impl RunSample {
    pub fn from_run(run: &Run, outcome: Outcome, error_sentinel: Option<f64>) -> Self {
        Self {
            outcome,
            found_files: run.file_scores.len(),
            found_symbols: run.symbol_scores.len(),
            error_case: error_sentinel.is_some_and(|s| run.has_symbol_score(s)),
        }
    }
}

/// Per-outcome run counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub exact_finds: u64,
    pub indirect_finds: u64,
    pub bad_finds: u64,
    pub no_finds: u64,
    pub not_measurable: u64,
}

impl OutcomeCounts {
    pub fn get(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::ExactFind => self.exact_finds,
            Outcome::IndirectFind => self.indirect_finds,
            Outcome::BadFind => self.bad_finds,
            Outcome::NoFind => self.no_finds,
            Outcome::NotMeasurable => self.not_measurable,
        }
    }

    fn slot(&mut self, outcome: Outcome) -> &mut u64 {
        match outcome {
            Outcome::ExactFind => &mut self.exact_finds,
            Outcome::IndirectFind => &mut self.indirect_finds,
            Outcome::BadFind => &mut self.bad_finds,
            Outcome::NoFind => &mut self.no_finds,
            Outcome::NotMeasurable => &mut self.not_measurable,
        }
    }

    pub fn total(&self) -> u64 {
        Outcome::ALL.iter().map(|&o| self.get(o)).sum()
    }
}

/// Statistics over a set of runs.
///
/// Recording is commutative: any ordering of the same samples, or any split
/// into partial summaries merged afterwards, produces an equal summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: u64,
    pub outcomes: OutcomeCounts,
    /// Found-file set size per run.
    pub file_histogram: Histogram,
    /// Found-symbol set size per run.
    pub symbol_histogram: Histogram,
    /// Found-symbol set size per indirect-find run.
    pub indirect_histogram: Histogram,
    /// Runs whose symbol scores hit the error sentinel; `None` when no
    /// sentinel is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_cases: Option<u64>,
}

impl Summary {
    pub fn new(track_error_cases: bool) -> Self {
        Self {
            error_cases: track_error_cases.then_some(0),
            ..Self::default()
        }
    }

    pub fn record(&mut self, sample: &RunSample) {
        self.total += 1;
        *self.outcomes.slot(sample.outcome) += 1;
        self.file_histogram.record(sample.found_files);
        self.symbol_histogram.record(sample.found_symbols);
        if sample.outcome == Outcome::IndirectFind {
            self.indirect_histogram.record(sample.found_symbols);
        }
        if sample.error_case {
            if let Some(count) = self.error_cases.as_mut() {
                *count += 1;
            }
        }
    }

    pub fn merge(&mut self, other: &Summary) {
        self.total += other.total;
        for outcome in Outcome::ALL {
            *self.outcomes.slot(outcome) += other.outcomes.get(outcome);
        }
        self.file_histogram.merge(&other.file_histogram);
        self.symbol_histogram.merge(&other.symbol_histogram);
        self.indirect_histogram.merge(&other.indirect_histogram);
        self.error_cases = match (self.error_cases, other.error_cases) {
            (Some(a), Some(b)) => Some(a + b),
            (a, b) => a.or(b),
        };
    }

    /// Failed runs that never located the error; equal to the no-find count.
    pub fn error_cases_not_located(&self) -> Option<u64> {
        self.error_cases.map(|_| self.outcomes.no_finds)
    }
}

impl<'a> FromIterator<&'a RunSample> for Summary {
    fn from_iter<I: IntoIterator<Item = &'a RunSample>>(iter: I) -> Self {
        let mut summary = Summary::default();
        for sample in iter {
            summary.record(sample);
        }
        summary
    }
}
