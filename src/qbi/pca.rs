//! Principal-component extraction by power iteration
//!
//! Extracts a small set of orthonormal directions from a stack of image
//! vectors and projects vectors into the component space. The arithmetic
//! follows the historical scoring pipeline exactly: the iteration step
//! scales each coordinate by its running column accumulation, seeding is
//! a deterministic alternating-sign pattern, and projections keep the
//! full pixel dimension. Changing any of these alters every stored score,
//! so they are kept as-is behind a seeding knob.

use rand::Rng;
use thiserror::Error;

use super::matrix::Matrix;

/// Number of refinement iterations per component.
const POWER_ITERATIONS: usize = 5;

#[derive(Debug, Error)]
pub enum PcaError {
    #[error("empty data matrix")]
    EmptyMatrix,
}

/// How component vectors are seeded before iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentInit {
    /// `v[j] = (-1)^(i+j)` for component i. Deterministic; every run of
    /// the same catalog yields identical components.
    Deterministic,
    /// Uniform random in [-1, 1).
    Random,
}

/// Extracted components with their singular-value estimates.
#[derive(Clone, Debug)]
pub struct PcaComponents {
    /// k x D matrix, one component per row.
    pub components: Matrix,
    /// `sigma[i] = max_l |X[l,:] . components[i]|`.
    pub singular_values: Vec<f64>,
}

/// Extract up to `k` components from the row stack `data`.
///
/// `k` is clamped to `min(k, rows, cols)`. Each component is refined for
/// a fixed number of iterations: accumulate `data[l][j] * v[j]` over all
/// rows, project out previously extracted components, then normalize.
/// A zero-norm iterate skips the normalization step instead of dividing.
pub fn extract_components(
    data: &Matrix,
    k: usize,
    init: ComponentInit,
) -> Result<PcaComponents, PcaError> {
    if data.rows() == 0 || data.cols() == 0 {
        return Err(PcaError::EmptyMatrix);
    }

    let rows = data.rows();
    let cols = data.cols();
    let k = k.min(rows).min(cols);

    let mut rng = rand::thread_rng();
    let mut components: Vec<Vec<f64>> = Vec::with_capacity(k);
    let mut singular_values = Vec::with_capacity(k);

    for i in 0..k {
        let mut component: Vec<f64> = match init {
            ComponentInit::Deterministic => (0..cols)
                .map(|j| if (i + j) % 2 == 0 { 1.0 } else { -1.0 })
                .collect(),
            ComponentInit::Random => (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect(),
        };

        for _ in 0..POWER_ITERATIONS {
            let mut next = vec![0.0; cols];
            for l in 0..rows {
                let row = data.row(l);
                for j in 0..cols {
                    next[j] += row[j] * component[j];
                }
            }

            // Orthogonalize against previously extracted components
            for previous in components.iter().take(i) {
                let proj = dot_product(&next, previous);
                for j in 0..cols {
                    next[j] -= proj * previous[j];
                }
            }

            let norm = vector_norm(&next);
            if norm > 0.0 {
                for j in 0..cols {
                    component[j] = next[j] / norm;
                }
            } else {
                component = next;
            }
        }

        singular_values.push(singular_value(data, &component));
        components.push(component);
    }

    Ok(PcaComponents {
        components: Matrix::from_rows(components),
        singular_values,
    })
}

/// Project `vec` into component space.
///
/// The projected vector has length `components.cols()` (the full pixel
/// dimension); entry `j` accumulates `vec[i] * components[i][j]` over the
/// component rows, so only the first k entries of `vec` contribute.
pub fn project(components: &Matrix, vec: &[f64]) -> Vec<f64> {
    let mut projected = vec![0.0; components.cols()];
    for i in 0..components.rows() {
        let row = components.row(i);
        let coefficient = vec[i];
        for (j, value) in row.iter().enumerate() {
            projected[j] += coefficient * value;
        }
    }
    projected
}

/// Column mean of a row stack.
pub fn mean_vector(data: &Matrix) -> Vec<f64> {
    let mut mean = vec![0.0; data.cols()];
    if data.rows() == 0 {
        return mean;
    }
    for l in 0..data.rows() {
        for (j, value) in data.row(l).iter().enumerate() {
            mean[j] += value;
        }
    }
    let n = data.rows() as f64;
    for value in &mut mean {
        *value /= n;
    }
    mean
}

/// Elementwise `vec - other`.
pub fn subtract_vector(vec: &[f64], other: &[f64]) -> Vec<f64> {
    vec.iter().zip(other.iter()).map(|(a, b)| a - b).collect()
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn dot_product(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn vector_norm(v: &[f64]) -> f64 {
    dot_product(v, v).sqrt()
}

fn singular_value(data: &Matrix, component: &[f64]) -> f64 {
    let mut max_value: f64 = 0.0;
    for l in 0..data.rows() {
        let value = dot_product(data.row(l), component).abs();
        max_value = max_value.max(value);
    }
    max_value
}
