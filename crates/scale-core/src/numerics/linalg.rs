use faer::Mat;

pub type DenseMatrix = Mat<f64>;

const NON_POSITIVE_PIVOT_EPSILON: f64 = 1.0e-300;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LinearSolveError {
    #[error("Cholesky factorization requires a square matrix, got {rows}x{cols}")]
    NonSquareMatrix { rows: usize, cols: usize },
    #[error("Cholesky factorization requires a non-empty matrix")]
    EmptyMatrix,
    #[error("matrix is not positive definite at pivot index {pivot_index} (pivot {pivot})")]
    NotPositiveDefinite { pivot_index: usize, pivot: f64 },
    #[error("right-hand side length mismatch: expected {expected}, got {actual}")]
    RhsLengthMismatch { expected: usize, actual: usize },
}

/// Lower-triangular factor `L` with `A = L * L^T`.
#[derive(Debug, Clone, PartialEq)]
pub struct CholeskyDecomposition {
    lower: DenseMatrix,
}

impl CholeskyDecomposition {
    pub fn dimension(&self) -> usize {
        self.lower.nrows()
    }

    pub fn lower(&self) -> &DenseMatrix {
        &self.lower
    }

    pub fn solve(&self, rhs: &[f64]) -> Result<Vec<f64>, LinearSolveError> {
        let dimension = self.dimension();
        if rhs.len() != dimension {
            return Err(LinearSolveError::RhsLengthMismatch {
                expected: dimension,
                actual: rhs.len(),
            });
        }

        let mut forward = vec![0.0; dimension];
        for row in 0..dimension {
            let mut value = rhs[row];
            for col in 0..row {
                value -= self.lower[(row, col)] * forward[col];
            }
            forward[row] = value / self.lower[(row, row)];
        }

        let mut solution = vec![0.0; dimension];
        for row in (0..dimension).rev() {
            let mut value = forward[row];
            for col in (row + 1)..dimension {
                value -= self.lower[(col, row)] * solution[col];
            }
            solution[row] = value / self.lower[(row, row)];
        }

        Ok(solution)
    }
}

pub fn cholesky_factorize(matrix: &DenseMatrix) -> Result<CholeskyDecomposition, LinearSolveError> {
    let rows = matrix.nrows();
    let cols = matrix.ncols();
    if rows == 0 || cols == 0 {
        return Err(LinearSolveError::EmptyMatrix);
    }
    if rows != cols {
        return Err(LinearSolveError::NonSquareMatrix { rows, cols });
    }

    let mut lower = DenseMatrix::zeros(rows, rows);
    for col in 0..rows {
        let mut pivot = matrix[(col, col)];
        for k in 0..col {
            pivot -= lower[(col, k)] * lower[(col, k)];
        }
        if pivot.is_nan() || pivot <= NON_POSITIVE_PIVOT_EPSILON {
            return Err(LinearSolveError::NotPositiveDefinite {
                pivot_index: col,
                pivot,
            });
        }
        let diagonal = pivot.sqrt();
        lower[(col, col)] = diagonal;

        for row in (col + 1)..rows {
            let mut value = matrix[(row, col)];
            for k in 0..col {
                value -= lower[(row, k)] * lower[(col, k)];
            }
            lower[(row, col)] = value / diagonal;
        }
    }

    Ok(CholeskyDecomposition { lower })
}

pub fn solve_symmetric_positive_definite(
    matrix: &DenseMatrix,
    rhs: &[f64],
) -> Result<Vec<f64>, LinearSolveError> {
    cholesky_factorize(matrix)?.solve(rhs)
}
