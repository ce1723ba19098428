//! Small linear-algebra layer: sparse mat-vec and a reusable faer LU.
//!
//! Systems handed to [`DenseLu`] are assembled sparse (Jacobian, reduced
//! susceptance) and densified once for faer's partial-pivoting LU. A single
//! factorization serves any number of right-hand sides, which is what the
//! batched PTDF solve relies on.

use anyhow::{anyhow, Result};
use faer::prelude::SpSolver;
use faer::{solvers::PartialPivLu, FaerMat, Mat};
use sprs::CsMat;
use std::ops::{Add, Mul};

/// `y = A·x` for a row-compressed matrix.
pub fn mat_vec<N>(a: &CsMat<N>, x: &[N]) -> Vec<N>
where
    N: Copy + Default + Add<Output = N> + Mul<Output = N>,
{
    let mut y = vec![N::default(); a.rows()];
    if a.is_csr() {
        for (i, row) in a.outer_iterator().enumerate() {
            let mut acc = N::default();
            for (j, &v) in row.iter() {
                acc = acc + v * x[j];
            }
            y[i] = acc;
        }
    } else {
        for (j, col) in a.outer_iterator().enumerate() {
            for (i, &v) in col.iter() {
                y[i] = y[i] + v * x[j];
            }
        }
    }
    y
}

/// Dense copy of `A[rows, cols]`.
pub fn submatrix_dense(a: &CsMat<f64>, rows: &[usize], cols: &[usize]) -> Vec<Vec<f64>> {
    let mut col_pos = vec![usize::MAX; a.cols()];
    for (p, &j) in cols.iter().enumerate() {
        col_pos[j] = p;
    }
    let mut out = vec![vec![0.0; cols.len()]; rows.len()];
    for (r, &i) in rows.iter().enumerate() {
        if a.is_csr() {
            if let Some(row) = a.outer_view(i) {
                for (j, &v) in row.iter() {
                    if col_pos[j] != usize::MAX {
                        out[r][col_pos[j]] = v;
                    }
                }
            }
        } else {
            for (p, &j) in cols.iter().enumerate() {
                if let Some(&v) = a.get(i, j) {
                    out[r][p] = v;
                }
            }
        }
    }
    out
}

/// LU factorization with partial pivoting, kept for repeated solves.
pub struct DenseLu {
    n: usize,
    lu: PartialPivLu<f64>,
}

impl DenseLu {
    /// Factor a dense square matrix given row by row.
    pub fn factor(matrix: &[Vec<f64>]) -> Result<Self> {
        let n = matrix.len();
        if matrix.iter().any(|row| row.len() != n) {
            return Err(anyhow!("matrix must be square"));
        }
        let mat = Mat::from_fn(n, n, |i, j| matrix[i][j]);
        Ok(Self {
            n,
            lu: mat.partial_piv_lu(),
        })
    }

    /// Factor a sparse square matrix.
    pub fn factor_sparse(matrix: &CsMat<f64>) -> Result<Self> {
        let n = matrix.rows();
        if matrix.cols() != n {
            return Err(anyhow!(
                "matrix must be square, got {}x{}",
                n,
                matrix.cols()
            ));
        }
        let mut mat = Mat::zeros(n, n);
        for (&v, (i, j)) in matrix.iter() {
            mat.write(i, j, v);
        }
        Ok(Self {
            n,
            lu: mat.partial_piv_lu(),
        })
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    /// Solve `A·x = b`. Non-finite output means the matrix was singular.
    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>> {
        if rhs.len() != self.n {
            return Err(anyhow!(
                "rhs length ({}) does not match matrix dimension {}",
                rhs.len(),
                self.n
            ));
        }
        if self.n == 0 {
            return Ok(Vec::new());
        }
        let rhs_mat = Mat::from_fn(self.n, 1, |i, _| rhs[i]);
        let sol = self.lu.solve(&rhs_mat);
        let x: Vec<f64> = (0..self.n).map(|i| sol.read(i, 0)).collect();
        if x.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("singular matrix (faer LU)"));
        }
        Ok(x)
    }

    /// Solve for several right-hand sides at once.
    ///
    /// `rhs` is given column by column; the solution comes back the same way.
    pub fn solve_many(&self, rhs: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        if rhs.iter().any(|c| c.len() != self.n) {
            return Err(anyhow!("rhs columns must have length {}", self.n));
        }
        let m = rhs.len();
        if self.n == 0 || m == 0 {
            return Ok(vec![Vec::new(); m]);
        }
        let rhs_mat = Mat::from_fn(self.n, m, |i, j| rhs[j][i]);
        let sol = self.lu.solve(&rhs_mat);
        let mut out = Vec::with_capacity(m);
        for j in 0..m {
            let col: Vec<f64> = (0..self.n).map(|i| sol.read(i, j)).collect();
            if col.iter().any(|v| !v.is_finite()) {
                return Err(anyhow!("singular matrix (faer LU)"));
            }
            out.push(col);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;
    use sprs::TriMat;

    #[test]
    fn test_solve_matches_known_solution() {
        let a = vec![vec![4.0, 1.0], vec![2.0, 3.0]];
        let lu = DenseLu::factor(&a).unwrap();
        let x = lu.solve(&[1.0, 2.0]).unwrap();
        assert!((x[0] - 0.1).abs() < 1e-12);
        assert!((x[1] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_detected() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        let lu = DenseLu::factor(&a).unwrap();
        assert!(lu.solve(&[1.0, 1.0]).is_err());
    }

    #[test]
    fn test_solve_many_columns() {
        let a = vec![vec![2.0, 0.0], vec![0.0, 4.0]];
        let lu = DenseLu::factor(&a).unwrap();
        let sol = lu.solve_many(&[vec![2.0, 4.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(sol[0], vec![1.0, 1.0]);
        assert_eq!(sol[1], vec![0.5, 0.25]);
    }

    #[test]
    fn test_sparse_factor_and_mat_vec() {
        let mut t = TriMat::new((2, 2));
        t.add_triplet(0, 0, 4.0);
        t.add_triplet(0, 1, 1.0);
        t.add_triplet(1, 0, 2.0);
        t.add_triplet(1, 1, 3.0);
        let a: CsMat<f64> = t.to_csr();
        let lu = DenseLu::factor_sparse(&a).unwrap();
        let x = lu.solve(&[1.0, 2.0]).unwrap();
        let back = mat_vec(&a, &x);
        assert!((back[0] - 1.0).abs() < 1e-12);
        assert!((back[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_complex_mat_vec_csc() {
        let mut t = TriMat::new((2, 2));
        t.add_triplet(0, 1, Complex64::new(0.0, 1.0));
        t.add_triplet(1, 0, Complex64::new(2.0, 0.0));
        let a: CsMat<Complex64> = t.to_csc();
        let y = mat_vec(&a, &[Complex64::new(1.0, 0.0), Complex64::new(1.0, 1.0)]);
        assert_eq!(y[0], Complex64::new(-1.0, 1.0));
        assert_eq!(y[1], Complex64::new(2.0, 0.0));
    }

    #[test]
    fn test_submatrix() {
        let mut t = TriMat::new((3, 3));
        t.add_triplet(1, 2, 5.0);
        t.add_triplet(2, 1, 7.0);
        let a: CsMat<f64> = t.to_csr();
        let sub = submatrix_dense(&a, &[1, 2], &[1, 2]);
        assert_eq!(sub, vec![vec![0.0, 5.0], vec![7.0, 0.0]]);
    }
}
