//! Ridge and Lasso fits of realized returns on a factor matrix.
//!
//! Ridge uses the closed form (X'X + aI)^-1 X'y solved by Cholesky; Lasso
//! uses coordinate descent with soft thresholding. Both center the data so
//! the intercept is absorbed and only slope coefficients are returned.

use crate::domain::error::QuantError;
use ndarray::{Array1, Array2, Axis};
use std::collections::BTreeMap;

/// Build the `rows x names` design matrix; missing cells are 0.
pub fn design_matrix(rows: &[BTreeMap<String, f64>], names: &[String]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), names.len()), |(i, j)| {
        rows[i]
            .get(&names[j])
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    })
}

fn centered(x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>), QuantError> {
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| QuantError::invalid("empty design matrix"))?;
    let y_mean = y
        .mean()
        .ok_or_else(|| QuantError::invalid("empty target vector"))?;
    Ok((x - &x_mean, y - y_mean))
}

pub fn ridge_coefficients(
    x: &Array2<f64>,
    y: &Array1<f64>,
    alpha: f64,
) -> Result<Array1<f64>, QuantError> {
    let (xc, yc) = centered(x, y)?;
    let mut a = xc.t().dot(&xc);
    for i in 0..a.nrows() {
        a[[i, i]] += alpha.max(1e-8);
    }
    let b = xc.t().dot(&yc);
    cholesky_solve(&a, &b)
}

fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, QuantError> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(QuantError::invalid("matrix not positive definite"));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (z[i] - sum) / l[[i, i]];
    }
    Ok(x)
}

fn soft_threshold(x: f64, lambda: f64) -> f64 {
    if x > lambda {
        x - lambda
    } else if x < -lambda {
        x + lambda
    } else {
        0.0
    }
}

/// Minimizes (1/2n)||y - Xb||^2 + alpha * ||b||_1.
pub fn lasso_coefficients(
    x: &Array2<f64>,
    y: &Array1<f64>,
    alpha: f64,
    max_iter: usize,
    tolerance: f64,
) -> Result<Array1<f64>, QuantError> {
    let (xc, yc) = centered(x, y)?;
    let n_features = xc.ncols();
    let threshold = alpha.max(1e-4) * xc.nrows() as f64;
    let col_sq: Vec<f64> = xc.columns().into_iter().map(|c| c.dot(&c)).collect();

    let mut coef = Array1::<f64>::zeros(n_features);
    let mut residual = yc.clone();
    for _ in 0..max_iter {
        let mut delta = 0.0;
        for j in 0..n_features {
            let col = xc.column(j);
            let old = coef[j];
            // correlation with the partial residual that excludes feature j
            let rho = col.dot(&residual) + col_sq[j] * old;
            let new = if col_sq[j] > 1e-10 {
                soft_threshold(rho, threshold) / col_sq[j]
            } else {
                0.0
            };
            if new != old {
                residual.scaled_add(old - new, &col);
                coef[j] = new;
                delta += (new - old).abs();
            }
        }
        if delta < tolerance {
            break;
        }
    }
    Ok(coef)
}
