//! Ratio helpers shared by the stores. Every division is guarded so an empty
//! log produces zeros instead of NaN or infinity.

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn mean_or_zero(values: &[f64]) -> f64 {
    mean(values).unwrap_or(0.0)
}

/// `part / whole * 100`, or zero when `whole` is zero.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    part as f64 / whole as f64 * 100.0
}

pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Share of `predicted` items that appear in `actual`, as a percentage.
pub fn precision<T: PartialEq>(predicted: &[T], actual: &[T]) -> f64 {
    let matched = predicted.iter().filter(|p| actual.contains(p)).count();
    percent(matched, predicted.len())
}

/// Share of `actual` items recovered by `predicted`, as a percentage.
pub fn recall<T: PartialEq>(predicted: &[T], actual: &[T]) -> f64 {
    let matched = predicted.iter().filter(|p| actual.contains(p)).count();
    percent(matched, actual.len())
}

pub fn f1_score(precision: f64, recall: f64) -> f64 {
    let sum = precision + recall;
    if sum == 0.0 {
        return 0.0;
    }
    2.0 * precision * recall / sum
}
