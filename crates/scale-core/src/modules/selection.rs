/// True where `lower < value <= upper`. NaN never matches.
pub fn in_half_open_range(value: f64, lower: f64, upper: f64) -> bool {
    lower < value && value <= upper
}

pub fn select_in_range(values: &[f64], lower: f64, upper: f64) -> Vec<bool> {
    values
        .iter()
        .map(|&value| in_half_open_range(value, lower, upper))
        .collect()
}

/// Keeps the items whose mask entry is true. A mask shorter than `items`
/// drops the unmatched tail.
pub fn retain_by_mask<T>(items: Vec<T>, mask: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(mask)
        .filter_map(|(item, &keep)| keep.then_some(item))
        .collect()
}
