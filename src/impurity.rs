//! Impurity decrease of a binary partition, and the threshold and category
//! grouping searches built on it.
use ordered_float::OrderedFloat;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Variance reduction, from the means and sizes of the parent and both children.
pub fn delta_impurity_regr(
    mu_tot: f64,
    n_tot: usize,
    mu_left: f64,
    n_left: usize,
    mu_right: f64,
    n_right: usize,
) -> f64 {
    let n_tot = n_tot as f64;
    -mu_tot.powi(2)
        + n_left as f64 / n_tot * mu_left.powi(2)
        + n_right as f64 / n_tot * mu_right.powi(2)
}

/// Gini reduction, from the squared class frequency sums and sizes of the parent and both children.
pub fn delta_impurity_class(
    sf_tot: usize,
    n_tot: usize,
    sf_left: usize,
    n_left: usize,
    sf_right: usize,
    n_right: usize,
) -> f64 {
    let n_tot = n_tot as f64;
    let side = |sf: usize, n: usize| {
        if n == 0 {
            0.0
        } else {
            sf as f64 / (n_tot * n as f64)
        }
    };
    -(sf_tot as f64) / n_tot.powi(2) + side(sf_left, n_left) + side(sf_right, n_right)
}

/// Incrementally maintained sufficient statistics of target values.
pub trait SplitStats: Clone + Default {
    fn push(&mut self, y: f64);

    /// Removes one earlier pushed `y`.
    fn pop(&mut self, y: f64);

    fn absorb(&mut self, other: &Self);

    /// Removes statistics that were earlier absorbed.
    fn remove(&mut self, other: &Self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn delta_impurity(total: &Self, left: &Self, right: &Self) -> f64;

    fn from_values(ys: impl Iterator<Item = f64>) -> Self {
        let mut stats = Self::default();
        for y in ys {
            stats.push(y);
        }
        stats
    }
}

/// Running mean, for numerical targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeanStats {
    mu: f64,
    n: usize,
}

impl MeanStats {
    pub fn mean(&self) -> f64 {
        self.mu
    }
}

impl SplitStats for MeanStats {
    fn push(&mut self, y: f64) {
        self.n += 1;
        self.mu += (y - self.mu) / self.n as f64;
    }

    fn pop(&mut self, y: f64) {
        self.n -= 1;
        if self.n == 0 {
            self.mu = 0.0;
        } else {
            self.mu -= (y - self.mu) / self.n as f64;
        }
    }

    fn absorb(&mut self, other: &Self) {
        let n = self.n + other.n;
        if n != 0 {
            self.mu = (self.n as f64 * self.mu + other.n as f64 * other.mu) / n as f64;
        }
        self.n = n;
    }

    fn remove(&mut self, other: &Self) {
        let n = self.n - other.n;
        if n == 0 {
            self.mu = 0.0;
        } else {
            self.mu = (self.n as f64 * self.mu - other.n as f64 * other.mu) / n as f64;
        }
        self.n = n;
    }

    fn len(&self) -> usize {
        self.n
    }

    fn delta_impurity(total: &Self, left: &Self, right: &Self) -> f64 {
        delta_impurity_regr(total.mu, total.n, left.mu, left.n, right.mu, right.n)
    }
}

/// Class counts and their sum of squares, for categorical targets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrequencyStats {
    freq: HashMap<OrderedFloat<f64>, usize>,
    sf: usize,
    n: usize,
}

impl FrequencyStats {
    pub fn squared_frequency(&self) -> usize {
        self.sf
    }

    fn add(&mut self, y: OrderedFloat<f64>, count: usize) {
        let c = self.freq.entry(y).or_default();
        self.sf += 2 * *c * count + count * count;
        *c += count;
        self.n += count;
    }

    fn sub(&mut self, y: OrderedFloat<f64>, count: usize) {
        if let Some(c) = self.freq.get_mut(&y) {
            debug_assert!(*c >= count);
            *c -= count;
            self.sf -= 2 * *c * count + count * count;
            self.n -= count;
            if *c == 0 {
                self.freq.remove(&y);
            }
        }
    }
}

impl SplitStats for FrequencyStats {
    fn push(&mut self, y: f64) {
        self.add(OrderedFloat(y), 1);
    }

    fn pop(&mut self, y: f64) {
        self.sub(OrderedFloat(y), 1);
    }

    fn absorb(&mut self, other: &Self) {
        for (&y, &c) in &other.freq {
            self.add(y, c);
        }
    }

    fn remove(&mut self, other: &Self) {
        for (&y, &c) in &other.freq {
            self.sub(y, c);
        }
    }

    fn len(&self) -> usize {
        self.n
    }

    fn delta_impurity(total: &Self, left: &Self, right: &Self) -> f64 {
        delta_impurity_class(total.sf, total.n, left.sf, left.n, right.sf, right.n)
    }
}

/// Scans every position of `tv` (target values ordered by the feature) as the last
/// element of the left side.
///
/// Returns the first position with the highest positive score among those leaving
/// at least `min_samples` (and at least one) elements on each side.
pub fn best_threshold<S: SplitStats>(tv: &[f64], min_samples: usize) -> Option<(usize, f64)> {
    let min_samples = min_samples.max(1);
    let n_tot = tv.len();
    if n_tot < 2 * min_samples {
        return None;
    }

    let total = S::from_values(tv.iter().copied());
    let mut left = S::default();
    let mut right = total.clone();

    let mut best = None;
    let mut best_score = 0.0;
    for (i, &y) in tv.iter().enumerate() {
        left.push(y);
        right.pop(y);
        if left.len() < min_samples {
            continue;
        }
        if right.len() < min_samples {
            break;
        }

        let score = S::delta_impurity(&total, &left, &right);
        if score > best_score {
            best_score = score;
            best = Some(i);
        }
    }
    best.map(|i| (i, best_score))
}

/// Positions of the members of each category, keyed by category code.
pub type CategoryMembers = BTreeMap<u32, Vec<usize>>;

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryGroups {
    pub left: CategoryMembers,
    pub right: CategoryMembers,
    pub score: f64,
}

/// Assigns the categories in `fv` to two groups.
///
/// Starting with every category on the right, the category whose move to the left
/// scores best (lowest code on ties) is moved, until a single category is left on the
/// right. The best grouping seen that keeps at least `min_samples` (and at least one)
/// elements on each side is returned.
pub fn best_category_groups<S: SplitStats>(
    tv: &[f64],
    fv: &[f64],
    min_samples: usize,
) -> Option<CategoryGroups> {
    debug_assert_eq!(tv.len(), fv.len());
    let min_samples = min_samples.max(1);

    let mut categories = BTreeMap::<u32, (Vec<usize>, S)>::new();
    for (i, (&y, &x)) in tv.iter().zip(fv.iter()).enumerate() {
        let (members, stats) = categories.entry(x as u32).or_default();
        members.push(i);
        stats.push(y);
    }

    let total = S::from_values(tv.iter().copied());
    let mut left = S::default();
    let mut right = total.clone();
    let mut in_left = BTreeSet::new();
    let mut best: Option<(f64, BTreeSet<u32>)> = None;

    while categories.len() - in_left.len() > 1 {
        let mut candidate: Option<(u32, f64)> = None;
        for (&code, (_, stats)) in categories.iter().filter(|(c, _)| !in_left.contains(*c)) {
            let mut l = left.clone();
            let mut r = right.clone();
            l.absorb(stats);
            r.remove(stats);
            let score = S::delta_impurity(&total, &l, &r);
            if candidate.map_or(true, |(_, s)| score > s) {
                candidate = Some((code, score));
            }
        }

        // A move may break `min_samples` and still lead to a valid grouping later.
        let (code, score) = match candidate {
            Some(c) => c,
            None => break,
        };
        let stats = &categories[&code].1;
        left.absorb(stats);
        right.remove(stats);
        in_left.insert(code);

        if score > 0.0
            && left.len() >= min_samples
            && right.len() >= min_samples
            && best.as_ref().map_or(true, |b| score > b.0)
        {
            best = Some((score, in_left.clone()));
        }
    }

    let (score, in_left) = best?;
    let (left, right) = categories
        .into_iter()
        .map(|(code, (members, _))| (code, members))
        .partition::<CategoryMembers, _>(|(code, _)| in_left.contains(code));
    Some(CategoryGroups { left, right, score })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn squared_frequency_bookkeeping_works() {
        let mut s = FrequencyStats::from_values([1.0, 1.0, 2.0, 1.0].iter().copied());
        assert_eq!(s.squared_frequency(), 9 + 1);
        s.pop(1.0);
        assert_eq!(s.squared_frequency(), 4 + 1);

        let other = FrequencyStats::from_values([2.0, 3.0].iter().copied());
        s.absorb(&other);
        assert_eq!(s.squared_frequency(), 4 + 4 + 1);
        assert_eq!(s.len(), 5);
        s.remove(&other);
        assert_eq!(s.squared_frequency(), 4 + 1);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn running_mean_works() {
        let mut s = MeanStats::from_values([1.0, 2.0, 3.0, 6.0].iter().copied());
        assert_eq!(s.mean(), 3.0);
        s.pop(6.0);
        assert!((s.mean() - 2.0).abs() < 1e-12);

        let other = MeanStats::from_values([8.0].iter().copied());
        s.absorb(&other);
        assert!((s.mean() - 3.5).abs() < 1e-12);
        s.remove(&other);
        assert!((s.mean() - 2.0).abs() < 1e-12);
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn delta_impurity_of_perfect_split() {
        // Variance of [0, 0, 2, 2] is 1 and both children are pure.
        assert_eq!(delta_impurity_regr(1.0, 4, 0.0, 2, 2.0, 2), 1.0);
        // Gini of a balanced two-class parent is 0.5.
        assert_eq!(delta_impurity_class(8, 4, 4, 2, 4, 2), 0.5);
        assert_eq!(delta_impurity_class(8, 4, 0, 0, 8, 4), 0.0);
    }

    #[test]
    fn best_threshold_finds_separating_position() {
        let tv = [1.0, 1.0, 1.0, 1.0, 5.0, 5.0, 5.0, 5.0];
        assert_eq!(best_threshold::<MeanStats>(&tv, 1).map(|t| t.0), Some(3));
        assert_eq!(best_threshold::<FrequencyStats>(&tv, 1).map(|t| t.0), Some(3));
        assert_eq!(best_threshold::<MeanStats>(&tv, 5), None);
        assert_eq!(best_threshold::<MeanStats>(&[2.0, 2.0], 1), None);
    }

    #[test]
    fn best_threshold_respects_min_samples() {
        let tv = [9.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        assert_eq!(best_threshold::<MeanStats>(&tv, 1).map(|t| t.0), Some(0));
        let (i, score) = best_threshold::<MeanStats>(&tv, 2).expect("split");
        assert!(i + 1 >= 2 && tv.len() - (i + 1) >= 2);
        assert!(score > 0.0);
    }

    #[test]
    fn category_groups_cover_all_categories() {
        let fv = [0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 3.0];
        let tv = [1.0, 10.0, 1.0, 1.0, 10.0, 1.0, 10.0];
        let groups = best_category_groups::<MeanStats>(&tv, &fv, 1).expect("split");
        assert_eq!(groups.left.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(groups.right.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(groups.left[&1], vec![1, 4]);
        assert!(groups.score > 0.0);

        let groups = best_category_groups::<FrequencyStats>(&tv, &fv, 1).expect("split");
        assert_eq!(groups.left.keys().copied().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn small_extreme_category_does_not_hide_valid_groups() {
        // Category 0 has a single outlier, 1 and 2 have five samples each.
        let fv = [0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0, 2.0];
        let tv = [100.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];

        let groups = best_category_groups::<MeanStats>(&tv, &fv, 1).expect("split");
        assert_eq!(groups.left.keys().copied().collect::<Vec<_>>(), vec![0]);

        let groups = best_category_groups::<MeanStats>(&tv, &fv, 2).expect("split");
        assert_eq!(groups.left.keys().copied().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(groups.right.keys().copied().collect::<Vec<_>>(), vec![1]);
        assert!((groups.score - 75.93).abs() < 0.01);
    }

    #[test]
    fn single_category_cannot_be_split() {
        let fv = [4.0, 4.0, 4.0];
        let tv = [1.0, 2.0, 3.0];
        assert_eq!(best_category_groups::<MeanStats>(&tv, &fv, 1), None);
    }
}
