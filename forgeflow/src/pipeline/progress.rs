//! Deterministic progress percentages.

use serde::{Deserialize, Serialize};

/// A fixed linear split of 0-100 across the pipeline phases.
///
/// Planning owns the first `planning_percent`, finalization the last
/// `finalization_percent`, and the rest is divided evenly between artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressBudget {
    /// Share reserved for planning.
    pub planning_percent: u8,
    /// Share reserved for finalization.
    pub finalization_percent: u8,
}

impl Default for ProgressBudget {
    fn default() -> Self {
        Self {
            planning_percent: 10,
            finalization_percent: 10,
        }
    }
}

impl ProgressBudget {
    /// Creates a budget. Shares summing past 100 are scaled back on use.
    #[must_use]
    pub const fn new(planning_percent: u8, finalization_percent: u8) -> Self {
        Self {
            planning_percent,
            finalization_percent,
        }
    }

    fn generation_share(&self) -> u32 {
        100u32.saturating_sub(u32::from(self.planning_percent) + u32::from(self.finalization_percent))
    }

    /// Percent reported once planning is done.
    #[must_use]
    pub fn after_planning(&self) -> u8 {
        self.planning_percent.min(100)
    }

    /// Percent reported before generating artifact `index` (0-based) of `total`.
    #[must_use]
    pub fn for_artifact(&self, index: usize, total: usize) -> u8 {
        if total == 0 {
            return self.after_planning();
        }
        let index = index.min(total) as u64;
        let step = u64::from(self.generation_share()) * index / total as u64;
        // step <= generation_share <= 100
        (u64::from(self.after_planning()) + step).min(100) as u8
    }

    /// Percent reported when finalization begins.
    #[must_use]
    pub fn finalizing(&self) -> u8 {
        100u8.saturating_sub(self.finalization_percent).max(self.after_planning())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_split() {
        let budget = ProgressBudget::default();
        assert_eq!(budget.after_planning(), 10);
        assert_eq!(budget.for_artifact(0, 4), 10);
        assert_eq!(budget.for_artifact(1, 4), 30);
        assert_eq!(budget.for_artifact(2, 4), 50);
        assert_eq!(budget.for_artifact(3, 4), 70);
        assert_eq!(budget.finalizing(), 90);
    }

    #[test]
    fn test_monotonic_over_any_plan_size() {
        let budget = ProgressBudget::new(15, 5);
        for total in 1..20 {
            let mut last = budget.after_planning();
            for i in 0..total {
                let p = budget.for_artifact(i, total);
                assert!(p >= last);
                last = p;
            }
            assert!(budget.finalizing() >= last);
        }
    }

    #[test]
    fn test_empty_plan() {
        let budget = ProgressBudget::default();
        assert_eq!(budget.for_artifact(0, 0), 10);
    }

    #[test]
    fn test_oversized_shares_stay_in_range() {
        let budget = ProgressBudget::new(80, 70);
        assert_eq!(budget.for_artifact(3, 4), 80);
        assert_eq!(budget.finalizing(), 80);
    }
}
