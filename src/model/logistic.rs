//! L2-regularized logistic regression
//!
//! Minimizes `0.5 * |w|^2 + C * sum(log_loss)` with an unpenalized
//! intercept, solved by damped Newton iterations.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::{ModelConfig, OverlineError, Result};

/// Solver settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticConfig {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl LogisticConfig {
    pub fn from_model(config: &ModelConfig) -> Self {
        LogisticConfig {
            c: config.c,
            max_iter: config.max_iter,
            tolerance: config.tolerance,
        }
    }

    /// Settings for the one-dimensional sigmoid recalibration
    pub fn calibration(config: &ModelConfig) -> Self {
        LogisticConfig {
            c: config.calibration_c,
            ..Self::from_model(config)
        }
    }
}

impl Default for LogisticConfig {
    fn default() -> Self {
        LogisticConfig {
            c: 1.0,
            max_iter: 100,
            tolerance: 1e-8,
        }
    }
}

/// Fitted binary logistic model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub iterations: usize,
}

impl LogisticRegression {
    /// Fit on dense, already-preprocessed rows
    pub fn fit(x: &[Vec<f64>], y: &[u8], config: &LogisticConfig) -> Result<Self> {
        let n = x.len();
        if n == 0 || n != y.len() {
            return Err(OverlineError::InsufficientData(format!(
                "logistic fit needs aligned rows and labels ({} vs {})",
                n,
                y.len()
            )));
        }
        let positives = y.iter().filter(|&&v| v != 0).count();
        if positives == 0 || positives == n {
            return Err(OverlineError::SingleClass);
        }

        let p = x[0].len();
        // Design matrix with a trailing column of ones for the intercept
        let design = DMatrix::from_fn(n, p + 1, |i, j| if j < p { x[i][j] } else { 1.0 });
        if design.iter().any(|v| !v.is_finite()) {
            return Err(OverlineError::Numerical("non-finite input to logistic fit".into()));
        }
        let target = DVector::from_iterator(n, y.iter().map(|&v| if v != 0 { 1.0 } else { 0.0 }));

        let mut theta = DVector::<f64>::zeros(p + 1);
        let mut loss = objective(&design, &target, &theta, p, config.c);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < config.max_iter {
            iterations += 1;
            let probs = (&design * &theta).map(sigmoid);

            let mut grad = design.transpose() * (&probs - &target) * config.c;
            for j in 0..p {
                grad[j] += theta[j];
            }
            if grad.amax() < config.tolerance {
                converged = true;
                break;
            }

            let weights = probs.map(|q| (q * (1.0 - q)).max(1e-12) * config.c);
            let weighted = DMatrix::from_fn(n, p + 1, |i, j| design[(i, j)] * weights[i]);
            let mut hessian = design.transpose() * weighted;
            for j in 0..p {
                hessian[(j, j)] += 1.0;
            }

            let step = solve(hessian, &grad)?;
            let slope = -grad.dot(&step);

            // Backtracking line search on the objective
            let mut t = 1.0;
            let mut accepted = None;
            while t > 1e-10 {
                let candidate = &theta - &step * t;
                let candidate_loss = objective(&design, &target, &candidate, p, config.c);
                if candidate_loss.is_finite() && candidate_loss <= loss + 1e-4 * t * slope {
                    accepted = Some((candidate, candidate_loss));
                    break;
                }
                t *= 0.5;
            }
            let (next, next_loss) = match accepted {
                Some(found) => found,
                None => {
                    converged = true;
                    break;
                }
            };

            let moved = (&next - &theta).amax();
            theta = next;
            loss = next_loss;
            if moved < config.tolerance {
                converged = true;
                break;
            }
        }

        if theta.iter().any(|v| !v.is_finite()) || !loss.is_finite() {
            return Err(OverlineError::Numerical("logistic fit diverged".into()));
        }
        if !converged {
            log::warn!(
                "Logistic regression did not converge in {} iterations",
                config.max_iter
            );
        }

        Ok(LogisticRegression {
            weights: theta.rows(0, p).iter().copied().collect(),
            intercept: theta[p],
            iterations,
        })
    }

    pub fn decision(&self, row: &[f64]) -> f64 {
        self.weights
            .iter()
            .zip(row)
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.intercept
    }

    pub fn predict_proba_row(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision(row))
    }

    pub fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba_row(r)).collect()
    }
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// log(1 + exp(z)) without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn objective(design: &DMatrix<f64>, target: &DVector<f64>, theta: &DVector<f64>, p: usize, c: f64) -> f64 {
    let z = design * theta;
    let data: f64 = z
        .iter()
        .zip(target.iter())
        .map(|(&zi, &yi)| softplus(zi) - yi * zi)
        .sum();
    let penalty: f64 = theta.rows(0, p).iter().map(|w| w * w).sum::<f64>() * 0.5;
    penalty + c * data
}

/// Newton direction: Cholesky first, LU if the Hessian is not positive definite
fn solve(hessian: DMatrix<f64>, grad: &DVector<f64>) -> Result<DVector<f64>> {
    if let Some(chol) = hessian.clone().cholesky() {
        return Ok(chol.solve(grad));
    }
    hessian
        .lu()
        .solve(grad)
        .ok_or_else(|| OverlineError::Numerical("singular Hessian in logistic fit".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable_with_noise() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..200 {
            let v = (i as f64 - 100.0) / 25.0;
            x.push(vec![v]);
            // Labels follow the sign of v except every 7th row
            let label = (v > 0.0) != (i % 7 == 0);
            y.push(label as u8);
        }
        (x, y)
    }

    #[test]
    fn test_fit_learns_direction() {
        let (x, y) = separable_with_noise();
        let model = LogisticRegression::fit(&x, &y, &LogisticConfig::default()).unwrap();
        assert!(model.weights[0] > 0.5);
        assert!(model.predict_proba_row(&[3.0]) > 0.8);
        assert!(model.predict_proba_row(&[-3.0]) < 0.2);
    }

    #[test]
    fn test_stronger_regularization_shrinks_weights() {
        let (x, y) = separable_with_noise();
        let loose = LogisticRegression::fit(&x, &y, &LogisticConfig::default()).unwrap();
        let tight = LogisticRegression::fit(
            &x,
            &y,
            &LogisticConfig {
                c: 0.001,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(tight.weights[0].abs() < loose.weights[0].abs());
    }

    #[test]
    fn test_intercept_only_matches_base_rate() {
        // Constant feature: the optimum puts the base rate in the intercept
        let x = vec![vec![0.0]; 10];
        let y = vec![1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
        let model = LogisticRegression::fit(&x, &y, &LogisticConfig::default()).unwrap();
        assert!((model.predict_proba_row(&[0.0]) - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_single_class_is_error() {
        let x = vec![vec![1.0], vec![2.0]];
        let err = LogisticRegression::fit(&x, &[1, 1], &LogisticConfig::default()).unwrap_err();
        assert!(matches!(err, OverlineError::SingleClass));
    }

    #[test]
    fn test_non_finite_input_is_numerical_error() {
        let x = vec![vec![f64::NAN], vec![2.0]];
        let err = LogisticRegression::fit(&x, &[0, 1], &LogisticConfig::default()).unwrap_err();
        assert!(matches!(err, OverlineError::Numerical(_)));
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((softplus(-800.0)).abs() < 1e-300);
        assert!((softplus(800.0) - 800.0).abs() < 1e-9);
    }
}
