//! Aggregation of a [`Tally`] into the view pushed to observers.

use crate::candidate::CandidateIndex;
use crate::tally::{saturating_sum, Tally, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a percentage is relative to.
///
/// Both bases are in use by different deployments, the choice is left to
/// the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "property-test-api"),
    derive(test_strategy::Arbitrary)
)]
#[serde(rename_all = "kebab-case")]
pub enum PercentageBasis {
    /// `count / max(1, sum(counts)) * 100`
    ShareOfTotal,
    /// `count / max(1, max(counts)) * 100`, the leader always shows 100
    ShareOfLeader,
}

impl Default for PercentageBasis {
    fn default() -> Self {
        PercentageBasis::ShareOfTotal
    }
}

/// Derived view of exactly one tally version. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub counts: Vec<u64>,
    pub version: Version,
    pub percentages: Vec<f64>,
    /// every candidate tied for the highest count; empty while no ballot
    /// has been accepted
    pub winners: BTreeSet<CandidateIndex>,
}

impl ResultSnapshot {
    pub fn compute(tally: &Tally, basis: PercentageBasis) -> Self {
        let counts = tally.counts().to_vec();
        let leader = counts.iter().copied().max().unwrap_or(0);

        let denominator = match basis {
            PercentageBasis::ShareOfTotal => tally.total(),
            PercentageBasis::ShareOfLeader => leader,
        }
        .max(1);

        let percentages = counts
            .iter()
            .map(|count| percentage(*count, denominator))
            .collect();

        let winners = if leader == 0 {
            BTreeSet::new()
        } else {
            counts
                .iter()
                .enumerate()
                .filter(|(_, count)| **count == leader)
                .filter_map(|(position, _)| CandidateIndex::from_position(position))
                .collect()
        };

        Self {
            counts,
            version: tally.version(),
            percentages,
            winners,
        }
    }

    pub fn total(&self) -> u64 {
        saturating_sum(&self.counts)
    }

    /// percentages rounded to the nearest integer, as displayed
    pub fn rounded_percentages(&self) -> Vec<u32> {
        self.percentages.iter().map(|p| p.round() as u32).collect()
    }

    /// share of all ballots held by the leading count, 0 on an empty tally
    pub fn leader_share(&self) -> f64 {
        let leader = self.counts.iter().copied().max().unwrap_or(0);
        percentage(leader, self.total().max(1))
    }

    pub fn is_winner(&self, candidate: CandidateIndex) -> bool {
        self.winners.contains(&candidate)
    }
}

// multiply first so whole ratios stay exact
fn percentage(count: u64, denominator: u64) -> f64 {
    count as f64 * 100.0 / denominator as f64
}
