//! Expanding-window fold schedule
//!
//! Training always covers a prefix of the time-ordered rows and the test
//! chunk starts right where it ends.

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Smallest training prefix used when the configured one does not fit
pub const MIN_FALLBACK_TRAIN: usize = 10;

/// One (train, test) split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub id: usize,
    pub train: Range<usize>,
    pub test: Range<usize>,
}

impl Fold {
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.len()
    }
}

/// Folds plus the training size actually used
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldPlan {
    pub folds: Vec<Fold>,
    pub effective_min_train: usize,
    /// True when the dataset was too small for the configured minimum
    pub fallback: bool,
}

impl FoldPlan {
    pub fn is_empty(&self) -> bool {
        self.folds.is_empty()
    }
}

/// Schedule folds over `n` rows with minimum training size `min_train` and
/// test chunks of `chunk` rows; the last chunk may be shorter.
///
/// When `n <= min_train` the minimum drops to 80% of `n` (at least
/// [`MIN_FALLBACK_TRAIN`]) and a single split is produced, or none if even
/// that leaves no test rows.
pub fn schedule_folds(n: usize, min_train: usize, chunk: usize) -> FoldPlan {
    let chunk = chunk.max(1);
    let min_train = min_train.max(1);

    if n <= min_train {
        let effective = MIN_FALLBACK_TRAIN.max(n * 4 / 5);
        let folds = if effective < n {
            vec![Fold {
                id: 0,
                train: 0..effective,
                test: effective..n,
            }]
        } else {
            Vec::new()
        };
        log::warn!(
            "Only {} rows for minimum training size {}; using {} training rows ({} fold)",
            n,
            min_train,
            effective,
            folds.len()
        );
        return FoldPlan {
            folds,
            effective_min_train: effective,
            fallback: true,
        };
    }

    let mut folds = Vec::new();
    let mut start = min_train;
    while start < n {
        let end = (start + chunk).min(n);
        folds.push(Fold {
            id: folds.len(),
            train: 0..start,
            test: start..end,
        });
        start = end;
    }
    FoldPlan {
        folds,
        effective_min_train: min_train,
        fallback: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(plan: &FoldPlan, n: usize) {
        let mut expected_start = plan.effective_min_train;
        for (i, fold) in plan.folds.iter().enumerate() {
            assert_eq!(fold.id, i);
            assert_eq!(fold.train.start, 0);
            assert!(fold.train.end <= fold.test.start);
            assert!(!fold.test.is_empty());
            assert_eq!(fold.test.start, expected_start);
            expected_start = fold.test.end;
        }
        if !plan.folds.is_empty() {
            assert_eq!(expected_start, n);
        }
    }

    #[test]
    fn test_standard_schedule() {
        let plan = schedule_folds(1000, 400, 100);
        assert_eq!(plan.folds.len(), 6);
        assert_eq!(plan.folds[0].train, 0..400);
        assert_eq!(plan.folds[0].test, 400..500);
        assert_eq!(plan.folds[5].train, 0..900);
        assert_eq!(plan.folds[5].test, 900..1000);
        assert!(!plan.fallback);
        assert_invariants(&plan, 1000);
    }

    #[test]
    fn test_partial_last_chunk() {
        let plan = schedule_folds(979, 400, 100);
        assert_eq!(plan.folds.len(), 6);
        assert_eq!(plan.folds[5].test, 900..979);
        assert_invariants(&plan, 979);
    }

    #[test]
    fn test_invariants_across_sizes() {
        for n in [11, 57, 401, 499, 500, 501, 1234] {
            for (m, c) in [(400, 100), (50, 7), (1, 1)] {
                let plan = schedule_folds(n, m, c);
                assert_invariants(&plan, n);
                // The training range is a strict prefix that keeps growing
                for w in plan.folds.windows(2) {
                    assert_eq!(w[1].train.end, w[0].test.end);
                }
            }
        }
    }

    #[test]
    fn test_small_dataset_fallback() {
        let plan = schedule_folds(50, 400, 100);
        assert!(plan.fallback);
        assert_eq!(plan.folds.len(), 1);
        assert_eq!(plan.folds[0].train, 0..40);
        assert_eq!(plan.folds[0].test, 40..50);
    }

    #[test]
    fn test_too_small_for_any_fold() {
        let plan = schedule_folds(10, 400, 100);
        assert!(plan.is_empty());
        let plan = schedule_folds(0, 400, 100);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_exact_minimum_uses_fallback() {
        let plan = schedule_folds(400, 400, 100);
        assert!(plan.fallback);
        assert_eq!(plan.folds[0].test, 320..400);
    }
}
