//! LD computations over a reference genotype panel.
//!
//! Markers are turned into mean-centered, unit-variance vectors with
//! missing genotypes imputed to the allele-frequency mean; LD r is the
//! normalized dot product of two such vectors.

pub mod clump;
pub mod prune;

use anyhow::Result;
use gcta_geno::traits::GenotypeReader;
use gcta_linalg::DenseMatrix;

/// Standardize a dosage vector: impute missing to the mean, center,
/// scale to unit sample variance. A monomorphic marker comes back as all
/// zeros.
pub fn standardized_vector(dosages: &[f64]) -> Vec<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &d in dosages {
        if !d.is_nan() {
            sum += d;
            count += 1;
        }
    }
    if count == 0 {
        return vec![0.0; dosages.len()];
    }
    let mean = sum / count as f64;

    let mut x: Vec<f64> = dosages
        .iter()
        .map(|&d| if d.is_nan() { 0.0 } else { d - mean })
        .collect();

    let ss: f64 = x.iter().map(|v| v * v).sum();
    if dosages.len() < 2 || ss == 0.0 {
        return vec![0.0; dosages.len()];
    }
    let sd = (ss / (dosages.len() - 1) as f64).sqrt();
    for v in x.iter_mut() {
        *v /= sd;
    }
    x
}

/// LD correlation between two centered marker vectors.
pub fn ld_r(x: &[f64], y: &[f64]) -> f64 {
    let xy: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let xx: f64 = x.iter().map(|v| v * v).sum();
    let yy: f64 = y.iter().map(|v| v * v).sum();
    xy / (xx * yy).sqrt()
}

/// Pairwise LD-r matrix among the given panel markers, identity on the
/// diagonal.
pub fn ld_matrix(reader: &dyn GenotypeReader, markers: &[usize]) -> Result<DenseMatrix> {
    let k = markers.len();
    let mut vectors = Vec::with_capacity(k);
    for &m in markers {
        vectors.push(standardized_vector(&reader.read_marker(m)?.dosages));
    }
    let mut r_mat = DenseMatrix::identity(k);
    for i in 0..k {
        for j in (i + 1)..k {
            let r = ld_r(&vectors[i], &vectors[j]);
            r_mat.set(i, j, r);
            r_mat.set(j, i, r);
        }
    }
    Ok(r_mat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardize_imputes_missing() {
        let x = standardized_vector(&[0.0, 1.0, 2.0, f64::NAN]);
        // missing imputed to the mean => centered to zero
        assert_eq!(x[3], 0.0);
        let mean: f64 = x.iter().sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        let var: f64 = x.iter().map(|v| v * v).sum::<f64>() / 3.0;
        assert!((var - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_standardize_monomorphic() {
        let x = standardized_vector(&[2.0, 2.0, 2.0]);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_ld_r_perfect_and_inverse() {
        let x = standardized_vector(&[0.0, 1.0, 2.0, 1.0]);
        let y: Vec<f64> = x.iter().map(|v| -v).collect();
        assert!((ld_r(&x, &x) - 1.0).abs() < 1e-12);
        assert!((ld_r(&x, &y) + 1.0).abs() < 1e-12);
    }
}
