//! # Gradient Ascent
//!
//! A minimal consumer of the fitness contract. Production optimizers plug in
//! through the same two traits; this one exists so models can be fitted and
//! tested without an external solver.
//!
//! ## Example
//!
//! ```rust
//! use bayesgraph_prob::{FitnessFunction, FitnessFunctionGradient, GradientAscent, GradientAscentConfig, ProbError};
//!
//! /// -(x - 3)^2
//! struct Bowl;
//!
//! impl FitnessFunction for Bowl {
//!     fn evaluate(&self, point: &[f64]) -> Result<f64, ProbError> {
//!         Ok(-(point[0] - 3.0).powi(2))
//!     }
//! }
//!
//! impl FitnessFunctionGradient for Bowl {
//!     fn evaluate_gradient(&self, point: &[f64]) -> Result<Vec<f64>, ProbError> {
//!         Ok(vec![-2.0 * (point[0] - 3.0)])
//!     }
//! }
//!
//! let optimizer = GradientAscent::new(GradientAscentConfig::default().with_learning_rate(0.1));
//! let result = optimizer.maximize(&Bowl, vec![0.0]).unwrap();
//! assert!(result.converged);
//! assert!((result.point[0] - 3.0).abs() < 1e-6);
//! ```

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::error::ProbError;
use crate::fitness::{FitnessFunction, FitnessFunctionGradient};

/// Step size and stopping rule for [`GradientAscent`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientAscentConfig {
    /// Step size
    pub learning_rate: f64,
    /// Upper bound on gradient evaluations
    pub max_iterations: usize,
    /// Stop once the largest gradient component is below this
    pub tolerance: f64,
}

impl Default for GradientAscentConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            max_iterations: 10_000,
            tolerance: 1e-8,
        }
    }
}

impl GradientAscentConfig {
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    fn validate(&self) -> Result<(), ProbError> {
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ProbError::InvalidParameter {
                name: "learning_rate".to_string(),
                reason: format!("must be positive, got {}", self.learning_rate),
            });
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(ProbError::InvalidParameter {
                name: "tolerance".to_string(),
                reason: format!("must be non-negative, got {}", self.tolerance),
            });
        }
        Ok(())
    }
}

/// Outcome of [`GradientAscent::maximize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AscentResult {
    pub point: Vec<f64>,
    pub fitness: f64,
    pub iterations: usize,
    /// Whether the gradient fell below tolerance before the iteration cap.
    pub converged: bool,
}

/// Fixed-step gradient ascent.
///
/// Updates the point using: `x = x + lr * grad`
#[derive(Debug, Clone, Default)]
pub struct GradientAscent {
    config: GradientAscentConfig,
}

impl GradientAscent {
    pub fn new(config: GradientAscentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GradientAscentConfig {
        &self.config
    }

    /// Perform a single step in place.
    pub fn step(&self, point: &mut [f64], gradient: &[f64]) -> Result<(), ProbError> {
        if point.len() != gradient.len() {
            return Err(ProbError::PointLength {
                expected: point.len(),
                got: gradient.len(),
            });
        }
        for (x, g) in point.iter_mut().zip(gradient) {
            *x += self.config.learning_rate * g;
        }
        Ok(())
    }

    /// Climb from `start` until the gradient vanishes or the iteration cap
    /// is reached.
    ///
    /// A non-finite gradient component stops the climb unconverged, and a
    /// run that ends on a non-finite fitness never counts as converged.
    pub fn maximize<F>(&self, fitness: &F, start: Vec<f64>) -> Result<AscentResult, ProbError>
    where
        F: FitnessFunction + FitnessFunctionGradient + ?Sized,
    {
        self.config.validate()?;
        let mut point = start;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            let gradient = fitness.evaluate_gradient(&point)?;
            if gradient.iter().any(|g| !g.is_finite()) {
                warn!("non-finite gradient at iteration {}, stopping", iterations);
                break;
            }
            let largest = gradient.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if largest < self.config.tolerance {
                converged = true;
                break;
            }
            self.step(&mut point, &gradient)?;
            iterations += 1;
            trace!("iteration {}: largest gradient component {}", iterations, largest);
        }

        let value = fitness.evaluate(&point)?;
        if !value.is_finite() {
            converged = false;
        }
        debug!(
            "gradient ascent stopped after {} iterations (converged: {}), fitness {}",
            iterations, converged, value
        );
        Ok(AscentResult {
            point,
            fitness: value,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// -(x - 1)^2 - 2(y + 2)^2
    struct Paraboloid;

    impl FitnessFunction for Paraboloid {
        fn evaluate(&self, point: &[f64]) -> Result<f64, ProbError> {
            Ok(-(point[0] - 1.0).powi(2) - 2.0 * (point[1] + 2.0).powi(2))
        }
    }

    impl FitnessFunctionGradient for Paraboloid {
        fn evaluate_gradient(&self, point: &[f64]) -> Result<Vec<f64>, ProbError> {
            Ok(vec![-2.0 * (point[0] - 1.0), -4.0 * (point[1] + 2.0)])
        }
    }

    #[test]
    fn test_step_moves_uphill() {
        let optimizer = GradientAscent::new(GradientAscentConfig::default().with_learning_rate(0.5));
        let mut point = vec![0.0, 0.0];
        optimizer.step(&mut point, &[1.0, -2.0]).unwrap();
        assert_eq!(point, vec![0.5, -1.0]);
        assert!(optimizer.step(&mut point, &[1.0]).is_err());
    }

    #[test]
    fn test_maximize_paraboloid() {
        let optimizer = GradientAscent::new(GradientAscentConfig::default().with_learning_rate(0.1));
        let result = optimizer.maximize(&Paraboloid, vec![5.0, 5.0]).unwrap();
        assert!(result.converged);
        assert!((result.point[0] - 1.0).abs() < 1e-6);
        assert!((result.point[1] + 2.0).abs() < 1e-6);
        assert!(result.fitness.abs() < 1e-10);
    }

    #[test]
    fn test_iteration_cap() {
        let config = GradientAscentConfig::default()
            .with_learning_rate(1e-3)
            .with_max_iterations(3);
        let result = GradientAscent::new(config).maximize(&Paraboloid, vec![5.0, 5.0]).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
    }

    /// Every gradient component is NaN.
    struct Undefined;

    impl FitnessFunction for Undefined {
        fn evaluate(&self, _point: &[f64]) -> Result<f64, ProbError> {
            Ok(f64::NAN)
        }
    }

    impl FitnessFunctionGradient for Undefined {
        fn evaluate_gradient(&self, point: &[f64]) -> Result<Vec<f64>, ProbError> {
            Ok(vec![f64::NAN; point.len()])
        }
    }

    /// Flat at minus infinity: zero gradient everywhere.
    struct OutsideSupport;

    impl FitnessFunction for OutsideSupport {
        fn evaluate(&self, _point: &[f64]) -> Result<f64, ProbError> {
            Ok(f64::NEG_INFINITY)
        }
    }

    impl FitnessFunctionGradient for OutsideSupport {
        fn evaluate_gradient(&self, point: &[f64]) -> Result<Vec<f64>, ProbError> {
            Ok(vec![0.0; point.len()])
        }
    }

    #[test]
    fn test_nan_gradient_does_not_converge() {
        let result = GradientAscent::default().maximize(&Undefined, vec![1.0, 2.0]).unwrap();
        assert!(!result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.point, vec![1.0, 2.0]);
    }

    #[test]
    fn test_infinite_fitness_does_not_converge() {
        let result = GradientAscent::default().maximize(&OutsideSupport, vec![7.0]).unwrap();
        assert!(!result.converged);
        assert_eq!(result.fitness, f64::NEG_INFINITY);
    }

    #[test]
    fn test_rejects_bad_learning_rate() {
        let config = GradientAscentConfig::default().with_learning_rate(0.0);
        let err = GradientAscent::new(config).maximize(&Paraboloid, vec![0.0, 0.0]).unwrap_err();
        assert!(matches!(err, ProbError::InvalidParameter { .. }));
    }
}
