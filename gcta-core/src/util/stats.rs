//! Scalar statistics shared across the pipelines.

use statrs::distribution::{ChiSquared, Continuous, ContinuousCDF, Normal};

/// Median of a sample. Averages the two central order statistics for an
/// even count.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Quantile of an ascending-sorted sample with linear interpolation
/// between order statistics.
pub fn quantile(sorted: &[f64], prob: f64) -> f64 {
    assert!((0.0..=1.0).contains(&prob), "quantile probability out of range");
    if sorted.is_empty() {
        return f64::NAN;
    }
    let index = prob * (sorted.len() - 1) as f64;
    let below = index.floor() as usize;
    let above = index.ceil() as usize;
    if below == above {
        return sorted[above];
    }
    (above as f64 - index) * sorted[below] + (index - below as f64) * sorted[above]
}

/// Upper-tail probability of a 1-df chi-squared variable.
pub fn chisq_pval(x: f64) -> f64 {
    if !x.is_finite() {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    let chi2 = ChiSquared::new(1.0).unwrap();
    1.0 - chi2.cdf(x)
}

/// Benjamini-Hochberg adjustment of p-values supplied in descending
/// order. Element i has rank n - i; the adjusted values carry the
/// cumulative minimum from the largest p downward.
pub fn bh_adjust_descending(pvals: &[f64]) -> Vec<f64> {
    let n = pvals.len();
    let mut adjusted = vec![0.0; n];
    let mut running_min = f64::INFINITY;
    for i in 0..n {
        let rank = (n - i) as f64;
        let raw = pvals[i] * n as f64 / rank;
        running_min = running_min.min(raw);
        adjusted[i] = running_min.min(1.0);
    }
    adjusted
}

/// Observed-to-liability scale conversion factor for h2 given population
/// prevalence `k` and sample prevalence `p`.
pub fn liability_scale_factor(k: f64, p: f64) -> f64 {
    let norm = Normal::new(0.0, 1.0).unwrap();
    let t = norm.inverse_cdf(1.0 - k);
    let z = norm.pdf(t);
    (k * (1.0 - k) / (z * z)) * (k * (1.0 - k) / (p * (1.0 - p)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(quantile(&v, 0.0), 1.0);
        assert_eq!(quantile(&v, 1.0), 5.0);
        assert_eq!(quantile(&v, 0.5), 3.0);
        assert!((quantile(&v, 0.4) - 2.6).abs() < 1e-12);
        assert!((quantile(&v, 0.6) - 3.4).abs() < 1e-12);
    }

    #[test]
    fn test_chisq_pval() {
        assert!((chisq_pval(0.0) - 1.0).abs() < 1e-12);
        // qchisq(0.95, 1) = 3.841459
        assert!((chisq_pval(3.841459) - 0.05).abs() < 1e-5);
        assert!(chisq_pval(1e4) < 1e-12);
    }

    /// Against BH computed by hand: p = (0.04, 0.03, 0.02, 0.01), n = 4,
    /// descending input. Ranks 4..1; raw adjusted = (0.04, 0.04, 0.04,
    /// 0.04); cumulative min keeps them equal.
    #[test]
    fn test_bh_adjust_descending() {
        let adj = bh_adjust_descending(&[0.04, 0.03, 0.02, 0.01]);
        for a in adj {
            assert!((a - 0.04).abs() < 1e-12);
        }

        // p = (0.9, 0.5, 0.01): raw = (0.9, 0.75, 0.03), already monotone
        let adj = bh_adjust_descending(&[0.9, 0.5, 0.01]);
        assert!((adj[0] - 0.9).abs() < 1e-12);
        assert!((adj[1] - 0.75).abs() < 1e-12);
        assert!((adj[2] - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_bh_monotone_nonincreasing() {
        let adj = bh_adjust_descending(&[0.8, 0.79, 0.5, 0.2, 0.1, 0.0001]);
        for w in adj.windows(2) {
            assert!(w[1] <= w[0] + 1e-15);
        }
    }

    #[test]
    fn test_liability_factor_identity_regionless() {
        // K = P = 0.5: t = 0, z = dnorm(0), C = (0.25/z^2) * (0.25/0.25)
        let z = 0.3989422804014327_f64;
        let expected = 0.25 / (z * z);
        assert!((liability_scale_factor(0.5, 0.5) - expected).abs() < 1e-9);
    }
}
