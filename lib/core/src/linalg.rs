// Dense/sparse kernels for the truncated SVD
//
// Tall dense matrices are kept as a list of columns so Gram-Schmidt and the
// sparse products can run column-parallel.

use crate::sparse::WeightedVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

/// Columns whose norm shrinks below this fraction during orthogonalization
/// are linearly dependent on earlier ones and get dropped.
const DEPENDENT_COLUMN_TOL: f64 = 1e-10;

const JACOBI_MAX_SWEEPS: usize = 100;

/// Truncated SVD of a sparse row matrix: singular values (descending) and the
/// matching right singular vectors, each of length `cols`.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    pub singular_values: Vec<f64>,
    pub right_vectors: Vec<Vec<f64>>,
}

/// `cols x width` matrix of uniform(-1, 1) draws, as columns
pub fn random_columns(cols: usize, width: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width)
        .map(|_| (0..cols).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}

/// `A * X` for sparse rows `A` (n x d) and dense columns `X` (d x w)
pub fn sparse_mul_dense(rows: &[WeightedVector], columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    columns
        .par_iter()
        .map(|col| {
            rows.iter()
                .map(|row| row.iter().map(|(idx, w)| w as f64 * col[idx]).sum())
                .collect()
        })
        .collect()
}

/// `A^T * Y` for sparse rows `A` (n x d) and dense columns `Y` (n x w)
pub fn sparse_t_mul_dense(rows: &[WeightedVector], dim: usize, columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
    columns
        .par_iter()
        .map(|col| {
            let mut out = vec![0.0f64; dim];
            for (row, y) in rows.iter().zip(col.iter()) {
                if *y == 0.0 {
                    continue;
                }
                for (idx, w) in row.iter() {
                    out[idx] += w as f64 * y;
                }
            }
            out
        })
        .collect()
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Modified Gram-Schmidt with one re-orthogonalization pass.
///
/// Dependent columns are removed, so the result may be narrower than the input.
pub fn orthonormalize(columns: Vec<Vec<f64>>) -> Vec<Vec<f64>> {
    let mut basis: Vec<Vec<f64>> = Vec::with_capacity(columns.len());
    for mut col in columns {
        let original = dot(&col, &col).sqrt();
        if original == 0.0 {
            continue;
        }
        for _ in 0..2 {
            for q in &basis {
                let proj = dot(q, &col);
                for (c, qv) in col.iter_mut().zip(q) {
                    *c -= proj * qv;
                }
            }
        }
        let norm = dot(&col, &col).sqrt();
        if norm <= DEPENDENT_COLUMN_TOL * original {
            continue;
        }
        for c in &mut col {
            *c /= norm;
        }
        basis.push(col);
    }
    basis
}

/// Eigen-decomposition of a symmetric `n x n` row-major matrix (cyclic Jacobi).
///
/// Returns eigenvalues and eigenvectors (row-major, eigenvector `i` is column `i`)
/// in no particular order.
pub fn symmetric_eigen(mut a: Vec<f64>, n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut v = vec![0.0f64; n * n];
    for i in 0..n {
        v[i * n + i] = 1.0;
    }

    let total: f64 = a.iter().map(|x| x * x).sum();
    for _ in 0..JACOBI_MAX_SWEEPS {
        let mut off = 0.0;
        for p in 0..n {
            for q in (p + 1)..n {
                off += a[p * n + q] * a[p * n + q];
            }
        }
        if off <= f64::EPSILON * f64::EPSILON * total {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = a[p * n + q];
                if apq == 0.0 {
                    continue;
                }
                let theta = (a[q * n + q] - a[p * n + p]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let akp = a[k * n + p];
                    let akq = a[k * n + q];
                    a[k * n + p] = c * akp - s * akq;
                    a[k * n + q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let apk = a[p * n + k];
                    let aqk = a[q * n + k];
                    a[p * n + k] = c * apk - s * aqk;
                    a[q * n + k] = s * apk + c * aqk;
                }
                for k in 0..n {
                    let vkp = v[k * n + p];
                    let vkq = v[k * n + q];
                    v[k * n + p] = c * vkp - s * vkq;
                    v[k * n + q] = s * vkp + c * vkq;
                }
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i * n + i]).collect();
    (eigenvalues, v)
}

/// Randomized truncated SVD (range finder + subspace iteration + exact
/// decomposition of the small projected problem).
///
/// `width` is the sketch size; when it reaches `min(rows, dim)` the result is
/// exact up to floating point error.
pub fn truncated_svd(
    rows: &[WeightedVector],
    dim: usize,
    width: usize,
    power_iterations: usize,
    seed: u64,
) -> TruncatedSvd {
    let omega = random_columns(dim, width, seed);
    let mut q = orthonormalize(sparse_mul_dense(rows, &omega));
    for _ in 0..power_iterations {
        let z = orthonormalize(sparse_t_mul_dense(rows, dim, &q));
        q = orthonormalize(sparse_mul_dense(rows, &z));
    }

    // B^T = A^T Q (dim x l); the Gram matrix B B^T is l x l
    let bt = sparse_t_mul_dense(rows, dim, &q);
    let l = bt.len();
    let gram: Vec<f64> = (0..l * l)
        .into_par_iter()
        .map(|ij| dot(&bt[ij / l], &bt[ij % l]))
        .collect();

    let (eigenvalues, eigenvectors) = symmetric_eigen(gram, l);
    let mut order: Vec<usize> = (0..l).collect();
    order.sort_by(|&i, &j| eigenvalues[j].total_cmp(&eigenvalues[i]).then(i.cmp(&j)));

    let mut singular_values = Vec::with_capacity(l);
    let mut right_vectors = Vec::with_capacity(l);
    for i in order {
        let sigma = eigenvalues[i].max(0.0).sqrt();
        if sigma == 0.0 {
            break;
        }
        let mut v = vec![0.0f64; dim];
        for (j, col) in bt.iter().enumerate() {
            let u = eigenvectors[j * l + i];
            if u == 0.0 {
                continue;
            }
            for (out, x) in v.iter_mut().zip(col) {
                *out += u * x;
            }
        }
        for x in &mut v {
            *x /= sigma;
        }
        flip_sign(&mut v);
        singular_values.push(sigma);
        right_vectors.push(v);
    }

    TruncatedSvd {
        singular_values,
        right_vectors,
    }
}

/// Make the largest-magnitude component positive (first one on ties)
fn flip_sign(v: &mut [f64]) {
    let mut best = 0.0f64;
    let mut sign = 1.0f64;
    for x in v.iter() {
        if x.abs() > best {
            best = x.abs();
            sign = x.signum();
        }
    }
    if sign < 0.0 {
        for x in v.iter_mut() {
            *x = -*x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(dim: usize, pairs: &[(u32, f32)]) -> WeightedVector {
        WeightedVector::from_pairs(dim, pairs.to_vec())
    }

    #[test]
    fn test_symmetric_eigen_2x2() {
        // [[2, 1], [1, 2]] has eigenvalues 1 and 3
        let (mut values, _) = symmetric_eigen(vec![2.0, 1.0, 1.0, 2.0], 2);
        values.sort_by(|a, b| a.total_cmp(b));
        assert!((values[0] - 1.0).abs() < 1e-10);
        assert!((values[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_orthonormalize_drops_dependent_columns() {
        let cols = vec![vec![1.0, 0.0, 0.0], vec![2.0, 0.0, 0.0], vec![1.0, 1.0, 0.0]];
        let q = orthonormalize(cols);
        assert_eq!(q.len(), 2);
        assert!(dot(&q[0], &q[1]).abs() < 1e-12);
        assert!((dot(&q[1], &q[1]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_svd_of_diagonal_matrix() {
        let rows = vec![row(3, &[(0, 3.0)]), row(3, &[(1, 2.0)]), row(3, &[(2, 1.0)])];
        let svd = truncated_svd(&rows, 3, 3, 2, 7);
        assert_eq!(svd.singular_values.len(), 3);
        assert!((svd.singular_values[0] - 3.0).abs() < 1e-8);
        assert!((svd.singular_values[1] - 2.0).abs() < 1e-8);
        assert!((svd.singular_values[2] - 1.0).abs() < 1e-8);
        // sign convention: largest component positive
        assert!((svd.right_vectors[0][0] - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_svd_reports_rank() {
        // two identical rows: rank 1
        let rows = vec![row(2, &[(0, 0.6), (1, 0.8)]), row(2, &[(0, 0.6), (1, 0.8)])];
        let svd = truncated_svd(&rows, 2, 2, 2, 1);
        assert_eq!(svd.singular_values.len(), 1);
        assert!((svd.singular_values[0] - 2.0f64.sqrt()).abs() < 1e-6);
    }
}
