//! Small dense linear algebra for the regression code.
use crate::Result;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use qu::ick_use::*;

/// Pivots smaller than this, relative to the largest entry of the matrix, count as zero.
const SINGULAR_TOLERANCE: f64 = 1e-12;

/// Solve `a x = b` for every column of `b` by Gauss-Jordan elimination with partial pivoting.
fn gauss_jordan(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    ensure!(
        n == a.ncols() && n == b.nrows(),
        "matrix dimensions mismatch ({}x{} and {}x{})",
        a.nrows(),
        a.ncols(),
        b.nrows(),
        b.ncols()
    );
    let scale = a.iter().fold(0f64, |acc, v| acc.max(v.abs()));
    ensure!(scale.is_finite() && scale > 0., "matrix is singular");

    let mut a = a.clone();
    let mut b = b.clone();
    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&r1, &r2| a[[r1, col]].abs().total_cmp(&a[[r2, col]].abs()))
            .unwrap_or(col);
        if a[[pivot_row, col]].abs() < SINGULAR_TOLERANCE * scale {
            bail!("matrix is singular");
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
            }
            for j in 0..b.ncols() {
                b.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = a[[col, col]];
        a.row_mut(col).mapv_inplace(|v| v / pivot);
        b.row_mut(col).mapv_inplace(|v| v / pivot);
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0. {
                continue;
            }
            for j in 0..n {
                a[[row, j]] -= factor * a[[col, j]];
            }
            for j in 0..b.ncols() {
                b[[row, j]] -= factor * b[[col, j]];
            }
        }
    }
    Ok(b)
}

pub(crate) fn solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let rhs = b.view().insert_axis(Axis(1)).to_owned();
    Ok(gauss_jordan(a, &rhs)?.column(0).to_owned())
}

pub(crate) fn invert(a: &Array2<f64>) -> Result<Array2<f64>> {
    gauss_jordan(a, &Array2::eye(a.nrows()))
}

/// Coefficient of determination of the least squares fit of `y` on the columns of `x`.
///
/// With `centered` the total sum of squares is taken around the mean of `y`, which is only
/// meaningful when `x` spans a constant. Otherwise it is taken around zero.
pub(crate) fn r_squared(y: ArrayView1<f64>, x: &Array2<f64>, centered: bool) -> Result<f64> {
    let xt = x.t();
    let beta = solve(&xt.dot(x), &xt.dot(&y))?;
    let residuals = &y - &x.dot(&beta);
    let ss_res = residuals.dot(&residuals);
    let ss_tot = if centered {
        let mean = y.mean().unwrap_or(0.);
        y.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
    } else {
        y.dot(&y)
    };
    ensure!(ss_tot > 0., "response has no variation");
    Ok(1. - ss_res / ss_tot)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn solves_with_pivoting() {
        // zero in the top-left forces a row swap
        let a = array![[0., 2., 1.], [1., 1., 0.], [2., 0., 3.]];
        let b = array![5., 3., 11.];
        let x = solve(&a, &b).unwrap();
        let back = a.dot(&x);
        for (got, want) in back.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*got, *want, epsilon = 1e-10);
        }
    }

    #[test]
    fn inverse_times_matrix_is_identity() {
        let a = array![[4., 7.], [2., 6.]];
        let inv = invert(&a).unwrap();
        let id = a.dot(&inv);
        assert_abs_diff_eq!(id[[0, 0]], 1., epsilon = 1e-12);
        assert_abs_diff_eq!(id[[0, 1]], 0., epsilon = 1e-12);
        assert_abs_diff_eq!(id[[1, 0]], 0., epsilon = 1e-12);
        assert_abs_diff_eq!(id[[1, 1]], 1., epsilon = 1e-12);
    }

    #[test]
    fn singular_is_an_error() {
        let a = array![[1., 2.], [2., 4.]];
        assert!(invert(&a).is_err());
        assert!(invert(&Array2::zeros((2, 2))).is_err());
    }

    #[test]
    fn r_squared_of_exact_fit() {
        let x = array![[1., 1.], [1., 2.], [1., 3.], [1., 4.]];
        let y = array![3., 5., 7., 9.];
        assert_abs_diff_eq!(r_squared(y.view(), &x, true).unwrap(), 1., epsilon = 1e-10);

        let y = array![1., 3., 2., 4.];
        // slope 0.8, intercept 0.5
        let r2 = r_squared(y.view(), &x, true).unwrap();
        assert_abs_diff_eq!(r2, 0.64, epsilon = 1e-10);
    }
}
