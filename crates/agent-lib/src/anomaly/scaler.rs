//! Column standardization for feature matrices

/// Per-column zero-mean, unit-variance scaling fitted on one matrix
///
/// Uses the population variance. Constant columns keep a scale of zero and
/// transform to 0.0 for every row.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler {
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

impl StandardScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let n = rows.len() as f64;
        let mut means = vec![0.0; width];
        let mut std_devs = vec![0.0; width];
        if rows.is_empty() {
            return Self { means, std_devs };
        }

        for col in 0..width {
            let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
            let var = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
            means[col] = mean;
            std_devs[col] = var.sqrt();
        }
        Self { means, std_devs }
    }

    pub fn transform(&self, rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        rows.iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.std_devs))
                    .map(|(&x, (&mean, &sd))| {
                        if sd > f64::EPSILON {
                            (x - mean) / sd
                        } else {
                            0.0
                        }
                    })
                    .collect()
            })
            .collect()
    }

    pub fn fit_transform(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
        Self::fit(rows).transform(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_centered_and_scaled() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]];
        let scaled = StandardScaler::fit_transform(&rows);

        for col in 0..2 {
            let mean: f64 = scaled.iter().map(|r| r[col]).sum::<f64>() / 3.0;
            let var: f64 = scaled.iter().map(|r| r[col].powi(2)).sum::<f64>() / 3.0;
            assert!(mean.abs() < 1e-12);
            assert!((var - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let rows = vec![vec![50.0, 1.0], vec![50.0, 2.0], vec![50.0, 4.0]];
        let scaled = StandardScaler::fit_transform(&rows);
        assert!(scaled.iter().all(|r| r[0] == 0.0));
        assert!(scaled.iter().all(|r| r[1].is_finite()));
    }

    #[test]
    fn test_empty_matrix() {
        assert!(StandardScaler::fit_transform(&[]).is_empty());
    }
}
