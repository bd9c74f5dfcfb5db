//! Evaluation summary returned by [`Network::test`](crate::network::Network::test).

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// Counts of correct predictions plus a sparse confusion matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestResult {
    pub num_success: usize,
    pub num_total: usize,
    /// `confusion_matrix[predicted][actual]` = number of samples.
    pub confusion_matrix: BTreeMap<usize, BTreeMap<usize, usize>>,
}

impl TestResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one prediction.
    pub fn insert(&mut self, predicted: usize, actual: usize) {
        if predicted == actual {
            self.num_success += 1;
        }
        self.num_total += 1;
        *self
            .confusion_matrix
            .entry(predicted)
            .or_default()
            .entry(actual)
            .or_insert(0) += 1;
    }

    /// Accuracy in percent; 0 for an empty result.
    pub fn accuracy(&self) -> f32 {
        if self.num_total == 0 {
            0.0
        } else {
            self.num_success as f32 * 100.0 / self.num_total as f32
        }
    }

    /// Samples predicted as `predicted` whose label was `actual`.
    pub fn count(&self, predicted: usize, actual: usize) -> usize {
        self.confusion_matrix
            .get(&predicted)
            .and_then(|row| row.get(&actual))
            .copied()
            .unwrap_or(0)
    }

    pub fn print_summary<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        writeln!(
            out,
            "accuracy: {:.2}% ({}/{})",
            self.accuracy(),
            self.num_success,
            self.num_total
        )
    }

    /// Summary followed by the confusion matrix; rows are predicted
    /// classes, columns actual classes.
    pub fn print_detail<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        self.print_summary(out)?;

        let labels: BTreeSet<usize> = self
            .confusion_matrix
            .iter()
            .flat_map(|(&p, row)| std::iter::once(p).chain(row.keys().copied()))
            .collect();

        write!(out, "{:>6}", "")?;
        for actual in &labels {
            write!(out, "{:>6}", actual)?;
        }
        writeln!(out)?;

        for &predicted in &labels {
            write!(out, "{:>6}", predicted)?;
            for &actual in &labels {
                write!(out, "{:>6}", self.count(predicted, actual))?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}
