//! Agreement measures between two disjoint partitions.
//!
//! Labels are dense indices over the same node sequence: `truth[i]` and
//! `pred[i]` label the same node.
//!
//! | Measure | Range | Identical partitions |
//! |---------|-------|----------------------|
//! | [`nmi`] | [0, 1] | 1 |
//! | [`ami`] | ≤ 1 | 1 |
//! | [`ars`] | [-1, 1] | 1 |
//! | [`homogeneity`] | [0, 1] | 1 |
//! | [`completeness`] | [0, 1] | 1 |
//! | [`v_measure`] | [0, 1] | 1 |
//!
//! NMI and AMI normalize by the arithmetic mean of the two entropies. Two
//! trivial partitions (both empty, or both a single cluster) agree perfectly.
//!
//! # References
//!
//! - Hubert & Arabie (1985). "Comparing partitions" (ARI)
//! - Vinh et al. (2010). "Information theoretic measures for clusterings comparison"
//! - Rosenberg & Hirschberg (2007). "V-Measure"

use std::collections::HashMap;

use statrs::function::gamma::ln_gamma;

/// Joint label counts of two partitions
#[derive(Debug, Clone)]
pub struct Contingency {
    cells: HashMap<(usize, usize), usize>,
    truth_sums: HashMap<usize, usize>,
    pred_sums: HashMap<usize, usize>,
    n: usize,
}

impl Contingency {
    pub fn new(truth: &[usize], pred: &[usize]) -> Self {
        let mut cells = HashMap::new();
        let mut truth_sums = HashMap::new();
        let mut pred_sums = HashMap::new();

        for (&t, &p) in truth.iter().zip(pred.iter()) {
            *cells.entry((t, p)).or_insert(0) += 1;
            *truth_sums.entry(t).or_insert(0) += 1;
            *pred_sums.entry(p).or_insert(0) += 1;
        }

        Self {
            cells,
            truth_sums,
            pred_sums,
            n: truth.len().min(pred.len()),
        }
    }

    /// Both partitions empty, or both a single cluster
    fn is_trivial(&self) -> bool {
        let classes = self.truth_sums.len();
        classes == self.pred_sums.len() && classes <= 1
    }

    fn mutual_info(&self) -> f64 {
        let n = self.n as f64;
        self.cells
            .iter()
            .map(|(&(t, p), &count)| {
                let count = count as f64;
                let a = self.truth_sums[&t] as f64;
                let b = self.pred_sums[&p] as f64;
                count / n * (n * count / (a * b)).ln()
            })
            .sum::<f64>()
            .max(0.0)
    }

    fn truth_entropy(&self) -> f64 {
        entropy(self.truth_sums.values().copied(), self.n)
    }

    fn pred_entropy(&self) -> f64 {
        entropy(self.pred_sums.values().copied(), self.n)
    }

    /// Mutual information expected between random partitions with these
    /// cluster sizes (hypergeometric model)
    fn expected_mutual_info(&self) -> f64 {
        let n = self.n as f64;
        let ln_n_fact = ln_gamma(n + 1.0);
        let mut emi = 0.0;

        for &a in self.truth_sums.values() {
            for &b in self.pred_sums.values() {
                let start = (a + b).saturating_sub(self.n).max(1);
                let end = a.min(b);
                let (a, b) = (a as f64, b as f64);
                let ln_margins = ln_gamma(a + 1.0) + ln_gamma(b + 1.0) + ln_gamma(n - a + 1.0)
                    + ln_gamma(n - b + 1.0)
                    - ln_n_fact;

                for nij in start..=end {
                    let nij = nij as f64;
                    let ln_p = ln_margins
                        - ln_gamma(nij + 1.0)
                        - ln_gamma(a - nij + 1.0)
                        - ln_gamma(b - nij + 1.0)
                        - ln_gamma(n - a - b + nij + 1.0);
                    emi += nij / n * ((n * nij).ln() - (a * b).ln()) * ln_p.exp();
                }
            }
        }
        emi
    }

    /// Ordered node pairs: (together in both, split only in truth, split only
    /// in prediction, split in both)
    fn pair_counts(&self) -> (f64, f64, f64, f64) {
        let n = self.n as f64;
        let squares = |counts: &HashMap<usize, usize>| -> f64 {
            counts.values().map(|&c| (c as f64).powi(2)).sum()
        };
        let cell_squares: f64 = self.cells.values().map(|&c| (c as f64).powi(2)).sum();

        let together = cell_squares - n;
        let pred_only = squares(&self.pred_sums) - cell_squares;
        let truth_only = squares(&self.truth_sums) - cell_squares;
        let apart = n * n - pred_only - truth_only - cell_squares;
        (together, pred_only, truth_only, apart)
    }
}

/// Normalized mutual information (arithmetic-mean normalization)
pub fn nmi(truth: &[usize], pred: &[usize]) -> f64 {
    if truth.len() != pred.len() {
        return 0.0;
    }

    let table = Contingency::new(truth, pred);
    if table.is_trivial() {
        return 1.0;
    }

    let mi = table.mutual_info();
    if mi == 0.0 {
        return 0.0;
    }
    mi / ((table.truth_entropy() + table.pred_entropy()) / 2.0)
}

/// Adjusted mutual information (arithmetic-mean normalization)
pub fn ami(truth: &[usize], pred: &[usize]) -> f64 {
    if truth.len() != pred.len() {
        return 0.0;
    }

    let table = Contingency::new(truth, pred);
    if table.is_trivial() {
        return 1.0;
    }

    let mi = table.mutual_info();
    let emi = table.expected_mutual_info();
    let normalizer = (table.truth_entropy() + table.pred_entropy()) / 2.0;

    let mut denominator = normalizer - emi;
    if denominator < 0.0 {
        denominator = denominator.min(-f64::EPSILON);
    } else {
        denominator = denominator.max(f64::EPSILON);
    }
    (mi - emi) / denominator
}

/// Adjusted Rand score from pair counts
pub fn ars(truth: &[usize], pred: &[usize]) -> f64 {
    if truth.len() != pred.len() {
        return 0.0;
    }

    let table = Contingency::new(truth, pred);
    let (together, pred_only, truth_only, apart) = table.pair_counts();
    if pred_only == 0.0 && truth_only == 0.0 {
        return 1.0;
    }

    2.0 * (together * apart - truth_only * pred_only)
        / ((together + truth_only) * (truth_only + apart) + (together + pred_only) * (pred_only + apart))
}

/// Each predicted cluster holds members of a single true class
pub fn homogeneity(truth: &[usize], pred: &[usize]) -> f64 {
    homogeneity_completeness(truth, pred).0
}

/// All members of a true class land in the same predicted cluster
pub fn completeness(truth: &[usize], pred: &[usize]) -> f64 {
    homogeneity_completeness(truth, pred).1
}

/// Harmonic mean of homogeneity and completeness
pub fn v_measure(truth: &[usize], pred: &[usize]) -> f64 {
    let (h, c) = homogeneity_completeness(truth, pred);
    if h + c == 0.0 {
        return 0.0;
    }
    2.0 * h * c / (h + c)
}

fn homogeneity_completeness(truth: &[usize], pred: &[usize]) -> (f64, f64) {
    if truth.len() != pred.len() {
        return (0.0, 0.0);
    }
    if truth.is_empty() {
        return (1.0, 1.0);
    }

    let table = Contingency::new(truth, pred);
    let mi = table.mutual_info();
    let h_truth = table.truth_entropy();
    let h_pred = table.pred_entropy();

    let homogeneity = if h_truth > 0.0 { mi / h_truth } else { 1.0 };
    let completeness = if h_pred > 0.0 { mi / h_pred } else { 1.0 };
    (homogeneity, completeness)
}

fn entropy(counts: impl Iterator<Item = usize>, n: usize) -> f64 {
    let n = n as f64;
    counts
        .filter(|&c| c > 0)
        .map(|c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum()
}
