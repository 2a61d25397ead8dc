use crate::template::{IterationIndicator, TemplatedConcept};
use serde::Serialize;
use std::collections::BTreeMap;

pub const MODELLED: &str = "Concepts modelled";
pub const DROPPED_OUT: &str = "Dropped out";
pub const MARKED_PRIMITIVE: &str = "Marked primitive";
pub const FULLY_DEFINED: &str = "Fully defined";
pub const WITH_ISSUES: &str = "Concepts with issues";

/// Run counters. Each modelling worker owns one; they are merged in chunk order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    iterations: BTreeMap<IterationIndicator, usize>,
    counters: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, counter: &str) {
        self.add(counter, 1);
    }

    pub fn add(&mut self, counter: &str, amount: usize) {
        *self.counters.entry(counter.to_string()).or_insert(0) += amount;
    }

    pub fn record_iteration(&mut self, iteration: IterationIndicator) {
        *self.iterations.entry(iteration).or_insert(0) += 1;
    }

    /// Counts the outcome of one modelling call.
    pub fn record_modelled(&mut self, tc: &TemplatedConcept) {
        if tc.is_manual() {
            return;
        }
        self.increment(MODELLED);
        if let Some(kind) = tc.kind {
            self.increment(&format!("Template {}", kind));
        }
        if tc.is_dropped() {
            self.increment(DROPPED_OUT);
        } else if tc.flags.contains(crate::template::ProcessingFlag::MarkAsPrimitive) {
            self.increment(MARKED_PRIMITIVE);
        } else {
            self.increment(FULLY_DEFINED);
        }
        if !tc.issues.is_empty() {
            self.increment(WITH_ISSUES);
        }
    }

    pub fn count(&self, counter: &str) -> usize {
        self.counters.get(counter).copied().unwrap_or(0)
    }

    pub fn iterations(&self, iteration: IterationIndicator) -> usize {
        self.iterations.get(&iteration).copied().unwrap_or(0)
    }

    /// Classification counts followed by the run counters, for reporting.
    pub fn rows(&self) -> Vec<(String, usize)> {
        self.iterations
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .chain(self.counters.iter().map(|(k, v)| (k.clone(), *v)))
            .collect()
    }

    pub fn merge(&mut self, other: RunSummary) {
        for (k, v) in other.iterations {
            *self.iterations.entry(k).or_insert(0) += v;
        }
        for (k, v) in other.counters {
            *self.counters.entry(k).or_insert(0) += v;
        }
    }
}
