//! Data
//!
//! Numeric containers for double machine learning: a contiguous column-major
//! matrix and the causal dataset bundling outcome, treatment, covariates and
//! optional instruments.
use crate::errors::DmlError;

/// Contiguous column major matrix view over a borrowed slice.
///
/// Column slicing is the hot operation during nuisance fitting, so data is
/// stored Fortran-style in a single block.
#[derive(Clone)]
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice, column by column.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix over `data`, which must hold `rows * cols` values
    /// in column-major order.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - The jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get an entire column of the matrix.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }
}

impl<'a, T: Copy> Matrix<'a, T> {
    /// Copy the listed rows into a new column-major buffer, preserving the
    /// column count. Pair with [`Matrix::new`] to view the result.
    pub fn take_rows(&self, rows: &[usize]) -> Vec<T> {
        let mut buf = Vec::with_capacity(rows.len() * self.cols);
        for j in 0..self.cols {
            let col = self.get_col(j);
            for &i in rows {
                buf.push(col[i]);
            }
        }
        buf
    }

    /// Concatenate the columns of `self` and `other` into one buffer,
    /// producing the backing store of an `[A | B]` design.
    pub fn hstack(&self, other: &Matrix<'a, T>) -> Vec<T> {
        let mut buf = Vec::with_capacity(self.data.len() + other.data.len());
        buf.extend_from_slice(self.data);
        buf.extend_from_slice(other.data);
        buf
    }
}

fn check_rows(name: &str, rows: usize, n_obs: usize) -> Result<(), DmlError> {
    if rows != n_obs {
        return Err(DmlError::ShapeMismatch(name.to_string(), rows, n_obs));
    }
    Ok(())
}

fn check_finite(name: &str, values: &[f64]) -> Result<(), DmlError> {
    if values.iter().any(|v| v.is_nan()) {
        return Err(DmlError::NanValueFound(name.to_string()));
    }
    Ok(())
}

/// Dataset for double machine learning estimators.
///
/// Holds the outcome vector, one or more treatment columns, the covariate
/// matrix and, for instrumental variable models, the instrument matrix. All
/// invariants (aligned row counts, no missing values) are checked eagerly at
/// construction.
pub struct DmlData<'a> {
    y: &'a [f64],
    d: Matrix<'a, f64>,
    x: Matrix<'a, f64>,
    z: Option<Matrix<'a, f64>>,
    d_names: Vec<String>,
}

impl<'a> DmlData<'a> {
    /// Create a new dataset.
    ///
    /// * `y` - Outcome vector.
    /// * `d` - Treatment matrix, one column per treatment variable.
    /// * `x` - Covariate matrix.
    /// * `z` - Optional instrument matrix.
    pub fn new(
        y: &'a [f64],
        d: Matrix<'a, f64>,
        x: Matrix<'a, f64>,
        z: Option<Matrix<'a, f64>>,
    ) -> Result<Self, DmlError> {
        let n_obs = y.len();
        check_rows("d", d.rows, n_obs)?;
        check_rows("x", x.rows, n_obs)?;
        check_finite("y", y)?;
        check_finite("d", d.data)?;
        check_finite("x", x.data)?;
        if let Some(z) = &z {
            check_rows("z", z.rows, n_obs)?;
            check_finite("z", z.data)?;
        }
        let d_names = (1..=d.cols).map(|j| format!("d{}", j)).collect();
        Ok(DmlData { y, d, x, z, d_names })
    }

    /// Replace the default treatment names used in reported tables.
    pub fn with_treatment_names(mut self, names: Vec<String>) -> Result<Self, DmlError> {
        if names.len() != self.d.cols {
            return Err(DmlError::ShapeMismatch("treatment names".to_string(), names.len(), self.d.cols));
        }
        self.d_names = names;
        Ok(self)
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    /// Number of treatment variables.
    pub fn n_treat(&self) -> usize {
        self.d.cols
    }

    /// Outcome vector.
    pub fn outcome(&self) -> &[f64] {
        self.y
    }

    /// A single treatment column.
    pub fn treatment(&self, i_treat: usize) -> &[f64] {
        self.d.get_col(i_treat)
    }

    /// Names of the treatment variables.
    pub fn treatment_names(&self) -> &[String] {
        &self.d_names
    }

    /// Covariate matrix.
    pub fn covariates(&self) -> &Matrix<'a, f64> {
        &self.x
    }

    /// Instrument matrix, if any.
    pub fn instruments(&self) -> Option<&Matrix<'a, f64>> {
        self.z.as_ref()
    }

    /// Instrument matrix, or an error for models that require one.
    pub fn instruments_required(&self) -> Result<&Matrix<'a, f64>, DmlError> {
        self.z.as_ref().ok_or(DmlError::MissingInstruments)
    }
}

/// Check that a column is coded 0/1, as the interactive models require.
pub(crate) fn check_binary(name: &str, values: &[f64]) -> Result<(), DmlError> {
    if values.iter().any(|&v| v != 0.0 && v != 1.0) {
        return Err(DmlError::NonBinary(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_column_major() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = Matrix::new(&data, 3, 2);
        assert_eq!(*m.get(0, 0), 1.0);
        assert_eq!(*m.get(2, 1), 6.0);
        assert_eq!(m.get_col(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_matrix_take_rows() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let m = Matrix::new(&data, 3, 2);
        let sub = m.take_rows(&[0, 2]);
        assert_eq!(sub, vec![1.0, 3.0, 4.0, 6.0]);
    }

    #[test]
    fn test_matrix_hstack() {
        let a = vec![1.0, 2.0];
        let b = vec![3.0, 4.0];
        let ma = Matrix::new(&a, 2, 1);
        let mb = Matrix::new(&b, 2, 1);
        let stacked = ma.hstack(&mb);
        assert_eq!(stacked, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_data_shape_mismatch() {
        let y = vec![1.0, 2.0];
        let d = vec![0.0, 1.0, 0.0];
        let x = vec![1.0, 2.0];
        let res = DmlData::new(&y, Matrix::new(&d, 3, 1), Matrix::new(&x, 2, 1), None);
        assert!(matches!(res, Err(DmlError::ShapeMismatch(_, 3, 2))));
    }

    #[test]
    fn test_data_nan_rejected() {
        let y = vec![1.0, f64::NAN];
        let d = vec![0.0, 1.0];
        let x = vec![1.0, 2.0];
        let res = DmlData::new(&y, Matrix::new(&d, 2, 1), Matrix::new(&x, 2, 1), None);
        assert!(matches!(res, Err(DmlError::NanValueFound(_))));
    }

    #[test]
    fn test_check_binary() {
        assert!(check_binary("d", &[0.0, 1.0, 1.0]).is_ok());
        assert!(check_binary("d", &[0.0, 0.5]).is_err());
    }
}
