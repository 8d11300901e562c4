//! Statistics helpers for edge similarities and cluster sizes.

use std::cmp::Ordering;

/// Population mean and variance of a sample; `(0, 0)` for an empty one.
pub fn mean_variance(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let variance = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n;
    (mean, variance)
}

/// Z-score of `x` under the given population moments; 0 when the variance
/// is zero.
pub fn z(mean: f64, variance: f64, x: f64) -> f64 {
    if variance == 0.0 {
        return 0.0;
    }
    (x - mean) / variance.sqrt()
}

/// Raw value at `z` standard deviations from the mean.
pub fn from_z(mean: f64, variance: f64, z: f64) -> f64 {
    mean + z * variance.sqrt()
}

/// `(max, min)` of a sample, or `None` for an empty one.
pub fn max_min(xs: &[f64]) -> Option<(f64, f64)> {
    let first = *xs.first()?;
    let mut max = first;
    let mut min = first;
    for &x in &xs[1..] {
        if x > max {
            max = x;
        }
        if x < min {
            min = x;
        }
    }
    Some((max, min))
}

/// One histogram bin: inclusive lower edge and a count.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Bin {
    pub lower: f64,
    pub count: u32,
}

/// Binned counts over `[min, max]` plus a final overflow bin for values
/// above `max`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Histogram {
    pub bins: Vec<Bin>,
}

impl Histogram {
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.bins.iter().map(|b| u64::from(b.count)).sum()
    }
}

/// Bin `xs` into `[min, min+step, min+2*step, ...]` up to `max`, with one
/// extra overflow bin covering values above `max`.
pub fn histogram(xs: &[f64], min: f64, max: f64, step: f64) -> Histogram {
    let mut edges = Vec::new();
    let mut edge = min;
    while edge <= max + f64::EPSILON {
        edges.push(edge);
        edge += step;
    }
    edges.push(edge);

    let mut counts = vec![0u32; edges.len()];
    let overflow = counts.len() - 1;
    for &x in xs {
        let idx = if x > max {
            overflow
        } else {
            let offset = ((x - min) / step).floor().max(0.0) as usize;
            offset.min(overflow - 1)
        };
        counts[idx] += 1;
    }

    Histogram {
        bins: edges
            .into_iter()
            .zip(counts)
            .map(|(lower, count)| Bin { lower, count })
            .collect(),
    }
}

/// Trim leading and trailing zero-count bins while more than three bins
/// remain.
pub fn clean_histogram(mut hist: Histogram) -> Histogram {
    while hist.bins.len() > 3 && hist.bins.first().is_some_and(|b| b.count == 0) {
        hist.bins.remove(0);
    }
    while hist.bins.len() > 3 && hist.bins.last().is_some_and(|b| b.count == 0) {
        hist.bins.pop();
    }
    hist
}

/// Sort descending by the index value of each item. Ties keep input order
/// (the underlying sort is stable).
pub fn sort_by_index<T: Clone>(items: &[T], index: impl Fn(&T) -> f64) -> Vec<T> {
    let mut out = items.to_vec();
    out.sort_by(|a, b| index(b).partial_cmp(&index(a)).unwrap_or(Ordering::Equal));
    out
}
