//! Best binary partition of samples along one candidate feature.
//!
//! Every finder returns `Ok(None)` when no partition leaves at least `min_samples`
//! samples on both sides. The numerical and categorical finders also require a positive
//! impurity decrease; the textual finder reports the score of its single partition,
//! which may be zero. The caller's sample list is never modified.
use crate::feature::FeatureKind;
use crate::impurity::{self, FrequencyStats, MeanStats, SplitStats};
use crate::table::{FeatureTable, TableError};
use log::trace;
use std::collections::BTreeSet;

/// Scores with a smaller magnitude count as no split.
pub const EPS: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct Split<V> {
    /// Impurity decrease.
    pub score: f64,
    pub left: Vec<usize>,
    pub right: Vec<usize>,
    pub value: V,
}

impl<V> Split<V> {
    pub fn len(&self) -> usize {
        self.left.len() + self.right.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Samples with a feature value of at most `value` go left.
pub type NumericalSplit = Split<f64>;

/// Category codes sent to each side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorySets {
    pub left: BTreeSet<u32>,
    pub right: BTreeSet<u32>,
}

pub type CategoricalSplit = Split<CategorySets>;

/// Samples whose hash set contains `value` go left.
pub type TextualSplit = Split<u32>;

impl FeatureTable {
    pub fn numerical_feature_split(
        &self,
        target_idx: usize,
        feature_idx: usize,
        min_samples: usize,
        sample_ics: &[usize],
    ) -> Result<Option<NumericalSplit>, TableError> {
        self.expect_kind(feature_idx, FeatureKind::Numerical)?;
        let split = match self.target_kind(target_idx)? {
            FeatureKind::Numerical => {
                self.numerical_split::<MeanStats>(target_idx, feature_idx, min_samples, sample_ics)
            }
            _ => self.numerical_split::<FrequencyStats>(
                target_idx,
                feature_idx,
                min_samples,
                sample_ics,
            ),
        };
        trace!(
            "Numerical split: target={}, feature={}, samples={}, result={:?}",
            target_idx,
            feature_idx,
            sample_ics.len(),
            split.as_ref().map(|s| (s.score, s.value, s.left.len(), s.right.len()))
        );
        Ok(split)
    }

    fn numerical_split<S: SplitStats>(
        &self,
        target_idx: usize,
        feature_idx: usize,
        min_samples: usize,
        sample_ics: &[usize],
    ) -> Option<NumericalSplit> {
        let sorted = self.filter_sort_ascending_by_feature(feature_idx, target_idx, sample_ics);
        if sorted.len() < 2 * min_samples {
            return None;
        }

        let (best, score) = impurity::best_threshold::<S>(&sorted.target, min_samples)?;
        let mut left = sorted.samples;
        let right = left.split_off(best + 1);
        Some(Split {
            score,
            left,
            right,
            value: sorted.feature[best],
        })
    }

    pub fn categorical_feature_split(
        &self,
        target_idx: usize,
        feature_idx: usize,
        min_samples: usize,
        sample_ics: &[usize],
    ) -> Result<Option<CategoricalSplit>, TableError> {
        self.expect_kind(feature_idx, FeatureKind::Categorical)?;
        let split = match self.target_kind(target_idx)? {
            FeatureKind::Numerical => self.categorical_split::<MeanStats>(
                target_idx,
                feature_idx,
                min_samples,
                sample_ics,
            ),
            _ => self.categorical_split::<FrequencyStats>(
                target_idx,
                feature_idx,
                min_samples,
                sample_ics,
            ),
        };
        trace!(
            "Categorical split: target={}, feature={}, samples={}, result={:?}",
            target_idx,
            feature_idx,
            sample_ics.len(),
            split.as_ref().map(|s| (s.score, &s.value, s.left.len(), s.right.len()))
        );
        Ok(split)
    }

    fn categorical_split<S: SplitStats>(
        &self,
        target_idx: usize,
        feature_idx: usize,
        min_samples: usize,
        sample_ics: &[usize],
    ) -> Option<CategoricalSplit> {
        let filtered = self.filter_pair(feature_idx, target_idx, sample_ics);
        if filtered.len() < 2 * min_samples {
            return None;
        }

        let groups =
            impurity::best_category_groups::<S>(&filtered.target, &filtered.feature, min_samples)?;
        if groups.score.abs() < EPS {
            return None;
        }

        let samples = |members: &impurity::CategoryMembers| {
            members
                .values()
                .flatten()
                .map(|&i| filtered.samples[i])
                .collect::<Vec<_>>()
        };
        Some(Split {
            score: groups.score,
            left: samples(&groups.left),
            right: samples(&groups.right),
            value: CategorySets {
                left: groups.left.keys().copied().collect(),
                right: groups.right.keys().copied().collect(),
            },
        })
    }

    /// Splits by presence of `hash` in a textual feature, in a single pass.
    ///
    /// Samples with a missing target are left out of both sides.
    pub fn textual_feature_split(
        &self,
        target_idx: usize,
        feature_idx: usize,
        hash: u32,
        min_samples: usize,
        sample_ics: &[usize],
    ) -> Result<Option<TextualSplit>, TableError> {
        self.expect_kind(feature_idx, FeatureKind::Textual)?;
        let split = match self.target_kind(target_idx)? {
            FeatureKind::Numerical => {
                self.textual_split::<MeanStats>(target_idx, feature_idx, hash, min_samples, sample_ics)
            }
            _ => self.textual_split::<FrequencyStats>(
                target_idx,
                feature_idx,
                hash,
                min_samples,
                sample_ics,
            ),
        };
        trace!(
            "Textual split: target={}, feature={}, hash={}, samples={}, result={:?}",
            target_idx,
            feature_idx,
            hash,
            sample_ics.len(),
            split.as_ref().map(|s| (s.score, s.left.len(), s.right.len()))
        );
        Ok(split)
    }

    fn textual_split<S: SplitStats>(
        &self,
        target_idx: usize,
        feature_idx: usize,
        hash: u32,
        min_samples: usize,
        sample_ics: &[usize],
    ) -> Option<TextualSplit> {
        let (feature, target) = (self.feature(feature_idx), self.feature(target_idx));

        let mut left = Vec::with_capacity(sample_ics.len());
        let mut right = Vec::with_capacity(sample_ics.len());
        let (mut stats_left, mut stats_right, mut stats_tot) =
            (S::default(), S::default(), S::default());
        for &i in sample_ics {
            let y = match target.value(i) {
                Some(y) => y,
                None => continue,
            };
            if feature.has_hash(i, hash) {
                left.push(i);
                stats_left.push(y);
            } else {
                right.push(i);
                stats_right.push(y);
            }
            stats_tot.push(y);
        }
        debug_assert_eq!(stats_tot.len(), left.len() + right.len());

        let min_samples = min_samples.max(1);
        if left.len() < min_samples || right.len() < min_samples {
            return None;
        }

        left.shrink_to_fit();
        right.shrink_to_fit();
        Some(Split {
            score: S::delta_impurity(&stats_tot, &stats_left, &stats_right),
            left,
            right,
            value: hash,
        })
    }

    fn expect_kind(&self, feature_idx: usize, expected: FeatureKind) -> Result<(), TableError> {
        let f = self.feature(feature_idx);
        if f.kind() != expected {
            return Err(TableError::FeatureTypeMismatch {
                feature: f.name().to_owned(),
                expected,
            });
        }
        Ok(())
    }

    /// Textual targets have no values to score.
    fn target_kind(&self, target_idx: usize) -> Result<FeatureKind, TableError> {
        let t = self.feature(target_idx);
        match t.kind() {
            FeatureKind::Textual => Err(TableError::FeatureTypeMismatch {
                feature: t.name().to_owned(),
                expected: FeatureKind::Numerical,
            }),
            kind => Ok(kind),
        }
    }
}
