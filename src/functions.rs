use ordered_float::OrderedFloat;

/// Drops `NaN`s and sorts the rest ascending.
///
/// Returns the sorted values and, for each of them, its position in `xs`.
/// Equal values keep their relative order.
pub fn filter_sort_ascending(xs: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut positions = (0..xs.len())
        .filter(|&i| !xs[i].is_nan())
        .collect::<Vec<_>>();
    positions.sort_by_key(|&i| OrderedFloat(xs[i]));
    let sorted = positions.iter().map(|&i| xs[i]).collect();
    (sorted, positions)
}

/// Reorders `xs` so that `xs[i]` becomes `xs[positions[i]]`.
pub fn sort_from_ref<T: Copy>(xs: &[T], positions: &[usize]) -> Vec<T> {
    positions.iter().map(|&i| xs[i]).collect()
}
