use crate::errors::DmlError;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(", ");
    }
    s
}

/// Mean over a full slice.
pub(crate) fn mean(v: &[f64]) -> f64 {
    v.iter().sum::<f64>() / v.len() as f64
}

/// Mean over the positions listed in `idx`.
pub(crate) fn mean_at(v: &[f64], idx: &[usize]) -> f64 {
    idx.iter().map(|&i| v[i]).sum::<f64>() / idx.len() as f64
}

/// Gather the listed positions into a new vector.
pub(crate) fn gather(v: &[f64], idx: &[usize]) -> Vec<f64> {
    idx.iter().map(|&i| v[i]).collect()
}

/// Median with the two middle values averaged for even lengths.
pub(crate) fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        0.5 * (sorted[n / 2 - 1] + sorted[n / 2])
    }
}

/// Empirical quantile with linear interpolation between order statistics.
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Solve the least squares problem `y ~ X` for a handful of columns via the
/// normal equations with partially pivoted Gaussian elimination.
pub(crate) fn least_squares(columns: &[Vec<f64>], y: &[f64]) -> Result<Vec<f64>, DmlError> {
    let k = columns.len();
    let n = y.len();
    let mut xtx = vec![vec![0.0_f64; k]; k];
    let mut xty = vec![0.0_f64; k];
    for a in 0..k {
        for b in a..k {
            let s: f64 = (0..n).map(|i| columns[a][i] * columns[b][i]).sum();
            xtx[a][b] = s;
            xtx[b][a] = s;
        }
        xty[a] = (0..n).map(|i| columns[a][i] * y[i]).sum();
    }
    // Forward elimination with partial pivoting.
    for col in 0..k {
        let mut pivot = col;
        for row in (col + 1)..k {
            if xtx[row][col].abs() > xtx[pivot][col].abs() {
                pivot = row;
            }
        }
        if xtx[pivot][col].abs() < f64::EPSILON {
            return Err(DmlError::InvalidParameter(
                "design matrix".to_string(),
                "linearly independent columns".to_string(),
                "a rank deficient matrix".to_string(),
            ));
        }
        xtx.swap(col, pivot);
        xty.swap(col, pivot);
        for row in (col + 1)..k {
            let factor = xtx[row][col] / xtx[col][col];
            for c in col..k {
                xtx[row][c] -= factor * xtx[col][c];
            }
            xty[row] -= factor * xty[col];
        }
    }
    // Back substitution.
    let mut beta = vec![0.0_f64; k];
    for row in (0..k).rev() {
        let mut acc = xty[row];
        for c in (row + 1)..k {
            acc -= xtx[row][c] * beta[c];
        }
        beta[row] = acc / xtx[row][row];
    }
    Ok(beta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn test_quantile_interpolation() {
        let v = vec![0.0, 1.0, 2.0, 3.0];
        assert_eq!(quantile(&v, 0.0), 0.0);
        assert_eq!(quantile(&v, 1.0), 3.0);
        assert!((quantile(&v, 0.5) - 1.5).abs() < 1e-12);
        assert!((quantile(&v, 0.25) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_least_squares_exact() {
        // y = 2*a - b, no noise.
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![0.0, 1.0, 0.0, 1.0];
        let y: Vec<f64> = a.iter().zip(&b).map(|(ai, bi)| 2.0 * ai - bi).collect();
        let beta = least_squares(&[a, b], &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] + 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_least_squares_rank_deficient() {
        let a = vec![1.0, 1.0, 1.0];
        let b = vec![2.0, 2.0, 2.0];
        let y = vec![1.0, 2.0, 3.0];
        assert!(least_squares(&[a, b], &y).is_err());
    }

    #[test]
    fn test_mean_at() {
        let v = vec![1.0, 10.0, 100.0, 1000.0];
        assert_eq!(mean_at(&v, &[0, 2]), 50.5);
    }
}
