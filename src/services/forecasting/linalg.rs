//! Dense least-squares solving for the small design matrices the seasonal
//! model produces (a handful of Fourier and regressor columns).

/// Tiny ridge term keeping the normal equations invertible when columns are
/// collinear or constant.
const RIDGE: f64 = 1e-8;

/// Solves `min ||X b - y||` via the normal equations with a ridge floor.
/// `rows` are the rows of `X`; every row must have the same width. Returns
/// `None` for empty input or a singular system.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let n = rows.len();
    if n == 0 || n != y.len() {
        return None;
    }
    let width = rows[0].len();
    if width == 0 || rows.iter().any(|r| r.len() != width) {
        return None;
    }

    // X^T X and X^T y.
    let mut xtx = vec![vec![0.0; width]; width];
    let mut xty = vec![0.0; width];
    for (row, target) in rows.iter().zip(y) {
        for i in 0..width {
            xty[i] += row[i] * target;
            for j in 0..width {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for (i, row) in xtx.iter_mut().enumerate() {
        row[i] += RIDGE;
    }

    solve(xtx, xty)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_linear_coefficients() {
        // y = 2 + 3a - b.
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let a = i as f64;
                let b = (i * i % 7) as f64;
                vec![1.0, a, b]
            })
            .collect();
        let y: Vec<f64> = rows.iter().map(|r| 2.0 + 3.0 * r[1] - r[2]).collect();
        let beta = least_squares(&rows, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-6);
        assert!((beta[1] - 3.0).abs() < 1e-6);
        assert!((beta[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn collinear_columns_do_not_explode() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![1.0, i as f64, i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let beta = least_squares(&rows, &y).unwrap();
        assert!(beta.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(least_squares(&[], &[]).is_none());
        assert!(least_squares(&[vec![1.0], vec![1.0, 2.0]], &[1.0, 2.0]).is_none());
        assert!(least_squares(&[vec![1.0]], &[1.0, 2.0]).is_none());
    }
}
