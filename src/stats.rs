/// Welford's online mean in O(1) memory
#[derive(Debug, Clone)]
pub struct WelfordStats {
    count: u64,
    mean: f64,
}

impl WelfordStats {
    pub fn new() -> Self {
        Self {
            count: 0,
            mean: 0.0,
        }
    }

    /// Add a new value to the running statistics; NaN is skipped
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
    }

    pub fn mean(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.mean)
        } else {
            None
        }
    }
}

impl Default for WelfordStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Quantile of already-sorted values using linear interpolation between
/// the two closest ranks.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }

    let position = q * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Equal-frequency bin edges for `bins` quantile bins.
///
/// NaN values are ignored. Duplicate edges are dropped, so data with few
/// distinct values yields fewer than `bins + 1` edges.
pub fn quantile_edges(values: &[f64], bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() || bins == 0 {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);

    let mut edges: Vec<f64> = (0..=bins)
        .filter_map(|i| quantile_sorted(&sorted, i as f64 / bins as f64))
        .collect();
    edges.dedup();
    edges
}

/// Number of bins described by `edges`; a single edge is one degenerate bin
pub fn bin_count(edges: &[f64]) -> usize {
    match edges.len() {
        0 => 0,
        1 => 1,
        n => n - 1,
    }
}

/// Index of the bin `value` falls in, given edges from [`quantile_edges`].
///
/// The first bin is closed on both sides, later bins are right-closed.
pub fn bin_index(edges: &[f64], value: f64) -> Option<usize> {
    if edges.is_empty() || value.is_nan() {
        return None;
    }
    if value < edges[0] || value > edges[edges.len() - 1] {
        return None;
    }
    if value == edges[0] {
        return Some(0);
    }
    edges
        .windows(2)
        .position(|w| value > w[0] && value <= w[1])
}
