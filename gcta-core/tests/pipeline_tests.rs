//! End-to-end pipeline tests over synthesized fixture files.
//!
//! The mtCOJO fixture is built so every stage has an exact expected
//! outcome: instruments are mutually orthogonal in the reference panel
//! (Hadamard genotypes), the LDSC background SNPs follow the regression
//! model without noise, and the cross-trait products cancel pairwise so
//! the LDSC cross-intercept is exactly zero.

use std::io::Write;
use std::path::Path;

use gcta_core::fastfam::{run_fastfam, FastFamOptions};
use gcta_core::gsmr::GsmrParams;
use gcta_core::ld::standardized_vector;
use gcta_core::mtcojo::{run_mtcojo, MtcojoOptions};
use gcta_geno::plink::PlinkReader;

const N_INDI: usize = 16;
const N_INSTRUMENTS: usize = 12;
const N_BACKGROUND: usize = 30;
const N_TRAIT: f64 = 10_000.0;

/// Row r of the 16x16 Sylvester Hadamard matrix: (-1)^popcount(r & j).
fn hadamard_row(r: usize) -> Vec<f64> {
    (0..N_INDI)
        .map(|j| if (r & j).count_ones() % 2 == 0 { 1.0 } else { -1.0 })
        .collect()
}

/// Instrument dosages: 1 + Hadamard row (values 0 or 2), so centered
/// genotype vectors are exactly orthogonal across markers.
fn instrument_dosages(marker: usize) -> Vec<f64> {
    hadamard_row(marker + 1).iter().map(|h| 1.0 + h).collect()
}

fn write_panel(dir: &Path) -> std::path::PathBuf {
    let prefix = dir.join("ref_panel");

    let mut fam = std::fs::File::create(prefix.with_extension("fam")).unwrap();
    for i in 0..N_INDI {
        writeln!(fam, "F{i} I{i} 0 0 1 -9").unwrap();
    }

    let mut bim = std::fs::File::create(prefix.with_extension("bim")).unwrap();
    for m in 0..N_INSTRUMENTS {
        writeln!(bim, "{} rs{} 0 100000 A G", m + 1, m + 1).unwrap();
    }

    let mut bed = vec![0x6Cu8, 0x1B, 0x01];
    for m in 0..N_INSTRUMENTS {
        let dosages = instrument_dosages(m);
        let mut bytes = vec![0u8; N_INDI.div_ceil(4)];
        for (i, &d) in dosages.iter().enumerate() {
            let code: u8 = if d == 2.0 { 0b00 } else { 0b11 };
            bytes[i / 4] |= code << ((i % 4) * 2);
        }
        bed.extend_from_slice(&bytes);
    }
    std::fs::write(prefix.with_extension("bed"), bed).unwrap();
    prefix
}

/// Background SNP layout: pairs share an LD score l = 0.5*(pair+1); both
/// traits have chi2 = 1 + 2*l exactly, and the second SNP of each pair
/// flips the target z sign so z1*z2 cancels pairwise.
fn background_ld(k: usize) -> f64 {
    0.5 * ((k / 2) + 1) as f64
}

fn write_summaries(dir: &Path) -> (String, String) {
    let target_path = dir.join("target.cojo");
    let covar_path = dir.join("covar.cojo");
    let mut target = std::fs::File::create(&target_path).unwrap();
    let mut covar = std::fs::File::create(&covar_path).unwrap();
    writeln!(target, "SNP A1 A2 freq b se p N").unwrap();
    writeln!(covar, "SNP A1 A2 freq b se p N").unwrap();

    // instruments: bzx = 0.2, bzy = 0.05, bxy = 0.25 everywhere
    for m in 0..N_INSTRUMENTS {
        writeln!(
            covar,
            "rs{} A G 0.3 0.2 0.01 {:e} {}",
            m + 1,
            1e-50 * (m + 1) as f64,
            N_TRAIT
        )
        .unwrap();
        writeln!(target, "rs{} A G 0.3 0.05 0.01 1e-3 {}", m + 1, N_TRAIT).unwrap();
    }

    // LDSC background SNPs
    for k in 0..N_BACKGROUND {
        let l = background_ld(k);
        let z = (1.0 + 2.0 * l).sqrt();
        let se = 0.01 / z;
        let target_beta = if k % 2 == 0 { 0.01 } else { -0.01 };
        writeln!(covar, "b{} A G 0.4 0.01 {:.10} 0.5 {}", k + 1, se, N_TRAIT).unwrap();
        writeln!(
            target,
            "b{} A G 0.4 {} {:.10} 0.5 {}",
            k + 1,
            target_beta,
            se,
            N_TRAIT
        )
        .unwrap();
    }
    (
        target_path.display().to_string(),
        covar_path.display().to_string(),
    )
}

fn write_ld_tiles(dir: &Path) -> String {
    let prefix = format!("{}/", dir.display());
    for chr in 1..=22 {
        std::fs::write(format!("{}{}.l2.M_5_50", prefix, chr), "100.0\n").unwrap();
        let mut tile = std::fs::File::create(format!("{}{}.l2.ldscore", prefix, chr)).unwrap();
        writeln!(tile, "CHR SNP BP CM MAF L2").unwrap();
        if chr == 1 {
            for k in 0..N_BACKGROUND {
                writeln!(tile, "1 b{} {} 0 0.4 {}", k + 1, 1000 * (k + 1), background_ld(k))
                    .unwrap();
            }
        }
    }
    prefix
}

#[test]
fn test_mtcojo_single_covariate_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let panel_prefix = write_panel(dir.path());
    let (target_path, covar_path) = write_summaries(dir.path());
    let ld_prefix = write_ld_tiles(dir.path());

    let list_path = dir.path().join("traits.list");
    let mut list = std::fs::File::create(&list_path).unwrap();
    writeln!(list, "target {}", target_path).unwrap();
    writeln!(list, "covar {}", covar_path).unwrap();
    drop(list);

    let out_prefix = dir.path().join("result").display().to_string();
    let reader = PlinkReader::new(&panel_prefix).unwrap();
    let options = MtcojoOptions {
        mtcojo_file: list_path.display().to_string(),
        ref_ld_dir: ld_prefix.clone(),
        w_ld_dir: ld_prefix,
        out: out_prefix.clone(),
        gwas_thresh: 5e-8,
        gsmr: GsmrParams::default(),
    };
    run_mtcojo(&reader, &options).unwrap();

    let output = std::fs::read_to_string(format!("{}.mtcojo.cma", out_prefix)).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "SNP\tA1\tA2\tfreq\tb\tse\tp\tN\tbC\tbC_se\tbC_pval");
    assert_eq!(lines.len(), 1 + N_INSTRUMENTS + N_BACKGROUND);

    // orthogonal instruments with identical per-SNP estimates give
    // bxy_gsmr = 0.25 exactly; with a zero LDSC cross-intercept,
    // bC = b - bzx*0.25 and var(bC) = se^2 + 0.25^2 * se_zx^2
    let mut checked_instrument = false;
    let mut checked_background = false;
    for line in &lines[1..] {
        let fields: Vec<&str> = line.split('\t').collect();
        let b: f64 = fields[4].parse().unwrap();
        let se: f64 = fields[5].parse().unwrap();
        let bc: f64 = fields[8].parse().unwrap();
        let bc_se: f64 = fields[9].parse().unwrap();

        if fields[0] == "rs1" {
            assert!((b - 0.05).abs() < 1e-6);
            assert!(bc.abs() < 1e-6, "bC = {bc}");
            let expected_se = (se * se + 0.0625 * 0.01f64 * 0.01).sqrt();
            assert!((bc_se - expected_se).abs() < 1e-6);
            checked_instrument = true;
        }
        if fields[0] == "b1" {
            // bC = bzy - bzx*bxy with bzx = 0.01 and bxy = 0.25
            assert!((bc - (b - 0.01 * 0.25)).abs() < 1e-6);
            assert!(bc_se.is_finite() && bc_se > 0.0);
            checked_background = true;
        }
    }
    assert!(checked_instrument);
    assert!(checked_background);

    // clean fixture: no bad SNPs were produced
    assert!(!Path::new(&format!("{}.badsnps", out_prefix)).exists());
}

fn write_fastfam_fixture(dir: &Path) -> (std::path::PathBuf, String, String) {
    let prefix = write_panel(dir);

    // sparse GRM over all 16 individuals: unit diagonal plus a few
    // related pairs
    let grm_prefix = dir.join("cohort");
    let mut id = std::fs::File::create(grm_prefix.with_extension("grm.id")).unwrap();
    for i in 0..N_INDI {
        writeln!(id, "F{i} I{i}").unwrap();
    }
    let mut sp = std::fs::File::create(grm_prefix.with_extension("grm.sp")).unwrap();
    for i in 0..N_INDI {
        writeln!(sp, "{i} {i} 1.0").unwrap();
    }
    writeln!(sp, "8 0 0.5").unwrap();
    writeln!(sp, "9 1 0.45").unwrap();
    writeln!(sp, "10 2 0.55").unwrap();

    let pheno_path = dir.join("pheno.txt");
    let mut pheno = std::fs::File::create(&pheno_path).unwrap();
    for i in 0..N_INDI {
        let y = (i as f64 * 0.37).sin();
        writeln!(pheno, "F{i} I{i} {y:.6}").unwrap();
    }

    (
        prefix,
        grm_prefix.display().to_string(),
        pheno_path.display().to_string(),
    )
}

/// With fixed components VG = 0, VR = 1 the variance matrix is the
/// identity and the scan reduces to ordinary regression of the centered
/// phenotype on the standardized marker.
#[test]
fn test_fastfam_identity_v_matches_ols() {
    let dir = tempfile::tempdir().unwrap();
    let (prefix, grm_prefix, pheno_path) = write_fastfam_fixture(dir.path());

    let out_prefix = dir.path().join("assoc").display().to_string();
    let mut reader = PlinkReader::new(&prefix).unwrap();
    let options = FastFamOptions {
        grm_prefix,
        pheno_file: Some(pheno_path),
        mpheno: 1,
        qcovar_file: None,
        keep_file: None,
        remove_file: None,
        ge: Some((0.0, 1.0)),
        out: out_prefix.clone(),
    };
    run_fastfam(&mut reader, &options).unwrap();

    let output = std::fs::read_to_string(format!("{}.fastFAM.assoc", out_prefix)).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "CHR\tSNP\tPOS\tA1\tA2\tAF1\tbeta\tse\tp");
    assert_eq!(lines.len(), 1 + N_INSTRUMENTS);

    // expected OLS values for the first marker
    let mut y: Vec<f64> = (0..N_INDI).map(|i| (i as f64 * 0.37).sin()).collect();
    let mean = y.iter().sum::<f64>() / N_INDI as f64;
    for v in y.iter_mut() {
        *v -= mean;
    }
    let x = standardized_vector(&instrument_dosages(0));
    let xx: f64 = x.iter().map(|v| v * v).sum();
    let xy: f64 = x.iter().zip(y.iter()).map(|(a, b)| a * b).sum();
    let expected_beta = xy / xx;
    let expected_se = (1.0 / xx).sqrt();

    let fields: Vec<&str> = lines[1].split('\t').collect();
    assert_eq!(fields[1], "rs1");
    let beta: f64 = fields[6].parse().unwrap();
    let se: f64 = fields[7].parse().unwrap();
    assert!((beta - expected_beta).abs() < 1e-6, "beta {beta} vs {expected_beta}");
    assert!((se - expected_se).abs() < 1e-6);
}

/// Constant off-diagonal relatedness cannot support the HE regression.
#[test]
fn test_fastfam_insufficient_relatedness() {
    let dir = tempfile::tempdir().unwrap();
    let (prefix, _, pheno_path) = write_fastfam_fixture(dir.path());

    let grm_prefix = dir.path().join("flat");
    let mut id = std::fs::File::create(grm_prefix.with_extension("grm.id")).unwrap();
    for i in 0..N_INDI {
        writeln!(id, "F{i} I{i}").unwrap();
    }
    let mut sp = std::fs::File::create(grm_prefix.with_extension("grm.sp")).unwrap();
    for i in 0..N_INDI {
        writeln!(sp, "{i} {i} 1.0").unwrap();
    }
    for i in 0..8 {
        writeln!(sp, "{} {} 0.01", i + 8, i).unwrap();
    }

    let mut reader = PlinkReader::new(&prefix).unwrap();
    let options = FastFamOptions {
        grm_prefix: grm_prefix.display().to_string(),
        pheno_file: Some(pheno_path),
        mpheno: 1,
        qcovar_file: None,
        keep_file: None,
        remove_file: None,
        ge: None,
        out: dir.path().join("flat_out").display().to_string(),
    };
    let err = run_fastfam(&mut reader, &options).unwrap_err();
    let core_err = err.downcast_ref::<gcta_core::CoreError>().unwrap();
    assert!(matches!(
        core_err,
        gcta_core::CoreError::InsufficientRelatedness { .. }
    ));
}
