use ndarray::{Array1, Array2, ArrayView2, Axis, ErrorKind, ShapeError, s};
use ndarray_linalg::error::LinalgError;
use ndarray_linalg::{Eigh, SVD, UPLO};

/// A Moore-Penrose pseudo-inverse together with the rank it was built from.
#[derive(Debug, Clone)]
pub struct PseudoInverse {
    pub matrix: Array2<f64>,
    pub rank: usize,
}

/// Singular (or eigen) values at or below this bound are treated as zero.
fn cutoff(largest: f64, rows: usize, cols: usize) -> f64 {
    largest * rows.max(cols) as f64 * f64::EPSILON
}

/// Computes the Moore-Penrose pseudo-inverse of an arbitrary `m x n` matrix.
///
/// Rank-deficient and non-square inputs are handled through the thin SVD; the
/// result is `n x m`. If the SVD fails to converge on a square input, the
/// symmetric eigendecomposition is used instead, which is exact for the Gram
/// matrices this crate produces.
pub fn pseudo_inverse(a: &Array2<f64>) -> Result<PseudoInverse, LinalgError> {
    let (rows, cols) = a.dim();
    if rows == 0 || cols == 0 {
        return Ok(PseudoInverse {
            matrix: Array2::zeros((cols, rows)),
            rank: 0,
        });
    }

    match a.svd(true, true) {
        Ok((Some(u), sigma, Some(vt))) => Ok(from_svd(&u, &sigma, &vt, rows, cols)),
        Ok(_) if rows == cols => symmetric_pseudo_inverse(a),
        Ok(_) => Err(ShapeError::from_kind(ErrorKind::IncompatibleShape).into()),
        Err(err) if rows == cols => {
            log::debug!("SVD failed ({err}); retrying pseudo-inverse via eigendecomposition");
            symmetric_pseudo_inverse(a)
        }
        Err(err) => Err(err),
    }
}

fn from_svd(
    u: &Array2<f64>,
    sigma: &Array1<f64>,
    vt: &Array2<f64>,
    rows: usize,
    cols: usize,
) -> PseudoInverse {
    let largest = sigma.iter().fold(0.0_f64, |acc, &v| acc.max(v));
    let tolerance = cutoff(largest, rows, cols);
    let inverted = sigma.mapv(|v| if v > tolerance { 1.0 / v } else { 0.0 });
    let rank = inverted.iter().filter(|&&v| v != 0.0).count();

    let r = sigma.len();
    // Scale the columns of V_r by 1/sigma, then project back through U_r^T.
    let v_scaled = &vt.slice(s![..r, ..]).t() * &inverted;
    let matrix = v_scaled.dot(&u.slice(s![.., ..r]).t());

    PseudoInverse { matrix, rank }
}

/// Pseudo-inverse of a symmetric matrix from its eigendecomposition.
pub fn symmetric_pseudo_inverse(a: &Array2<f64>) -> Result<PseudoInverse, LinalgError> {
    let (rows, cols) = a.dim();
    let (eigvals, eigvecs) = a.eigh(UPLO::Lower)?;
    let largest = eigvals.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    let tolerance = cutoff(largest, rows, cols);

    let mut d_plus = Array1::zeros(eigvals.len());
    let mut rank = 0usize;
    for (i, &eig) in eigvals.iter().enumerate() {
        if eig.abs() > tolerance {
            d_plus[i] = 1.0 / eig;
            rank += 1;
        }
    }

    let matrix = (&eigvecs * &d_plus).dot(&eigvecs.t());
    Ok(PseudoInverse { matrix, rank })
}

/// Sum of squared entries of every column: `ones^T (M ⊙ M)`.
pub fn column_sum_squares(matrix: ArrayView2<f64>) -> Array1<f64> {
    matrix.fold_axis(Axis(0), 0.0, |acc, &v| acc + v * v)
}
