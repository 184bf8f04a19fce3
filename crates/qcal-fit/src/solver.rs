//! Levenberg–Marquardt least squares for the decaying-oscillation models.

use nalgebra::{Matrix5, Vector5};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FitError, FitResult};
use crate::guess::initial_guess;
use crate::model::{DecayModel, NUM_PARAMS, OscillationParams};

fn default_max_iterations() -> usize {
    200
}

fn default_tolerance() -> f64 {
    1e-10
}

/// Solver settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitOptions {
    /// Maximum accepted-or-rejected steps.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// Relative cost change below which the fit has converged.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Outcome of a successful fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillationFit {
    /// Model that was fitted.
    pub model: DecayModel,
    /// Best-fit parameters.
    pub params: OscillationParams,
    /// Parameter covariance, `σ²·(JᵀJ)⁻¹`, in `[a, f, phi, offset, decay]` order.
    pub covariance: [[f64; NUM_PARAMS]; NUM_PARAMS],
    /// Root-mean-square residual.
    pub residual_rms: f64,
    /// Iterations used.
    pub iterations: usize,
}

impl OscillationFit {
    /// Variance of the decay rate.
    pub fn decay_variance(&self) -> f64 {
        self.covariance[4][4]
    }

    /// One-sigma uncertainty of each parameter.
    pub fn std_errors(&self) -> [f64; NUM_PARAMS] {
        std::array::from_fn(|i| self.covariance[i][i].max(0.0).sqrt())
    }

    /// Evaluate the fitted curve on `t`.
    pub fn curve(&self, t: &[f64]) -> Vec<f64> {
        self.model.curve(t, &self.params)
    }
}

/// Fit `model` to `(t, y)` with default options.
///
/// `t` must be strictly increasing. Returns the canonical parameters
/// (`a >= 0`, `f >= 0`, `phi` in `(-π, π]`).
pub fn fit_oscillation_decay(model: DecayModel, t: &[f64], y: &[f64]) -> FitResult<OscillationFit> {
    fit_oscillation_decay_with(model, t, y, &FitOptions::default())
}

/// Fit `model` to `(t, y)`.
pub fn fit_oscillation_decay_with(
    model: DecayModel,
    t: &[f64],
    y: &[f64],
    options: &FitOptions,
) -> FitResult<OscillationFit> {
    check_input(t, y)?;
    let start = initial_guess(model, t, y);
    let solved = levenberg_marquardt(model, t, y, start, options)?;

    let mut params = OscillationParams::from_vector(&solved.params);
    params.canonicalize(model);

    // Jacobian at the canonical point, so the covariance is in its coordinates
    let dof = (y.len() - NUM_PARAMS) as f64;
    let sigma2 = solved.cost / dof;
    let (jtj, _, _) = normal_equations(model, t, y, &params);
    let inverse = jtj.try_inverse().ok_or(FitError::SingularMatrix)?;
    let covariance = std::array::from_fn(|i| {
        std::array::from_fn(|j| sigma2 * inverse[(i, j)])
    });

    debug!(
        %model,
        f = params.f,
        decay = params.decay,
        iterations = solved.iterations,
        "fit converged"
    );
    Ok(OscillationFit {
        model,
        params,
        covariance,
        residual_rms: (solved.cost / y.len() as f64).sqrt(),
        iterations: solved.iterations,
    })
}

fn check_input(t: &[f64], y: &[f64]) -> FitResult<()> {
    if t.len() != y.len() {
        return Err(FitError::LengthMismatch {
            t: t.len(),
            y: y.len(),
        });
    }
    let need = NUM_PARAMS + 1;
    if y.len() < need {
        return Err(FitError::TooFewPoints { got: y.len(), need });
    }
    for (i, (tv, yv)) in t.iter().zip(y).enumerate() {
        if !tv.is_finite() || !yv.is_finite() {
            return Err(FitError::NonFiniteData(i));
        }
    }
    if let Some(i) = t.windows(2).position(|w| w[1] <= w[0]) {
        return Err(FitError::UnsortedTime(i + 1));
    }
    Ok(())
}

struct Solved {
    params: Vector5<f64>,
    cost: f64,
    iterations: usize,
}

/// `(JᵀJ, Jᵀr, Σr²)` at `p`.
fn normal_equations(
    model: DecayModel,
    t: &[f64],
    y: &[f64],
    p: &OscillationParams,
) -> (Matrix5<f64>, Vector5<f64>, f64) {
    let mut jtj = Matrix5::zeros();
    let mut jtr = Vector5::zeros();
    let mut cost = 0.0;
    for (&t, &y) in t.iter().zip(y) {
        let r = y - model.eval(t, p);
        let g = model.gradient(t, p);
        jtj += g * g.transpose();
        jtr += g * r;
        cost += r * r;
    }
    (jtj, jtr, cost)
}

fn cost(model: DecayModel, t: &[f64], y: &[f64], p: &OscillationParams) -> f64 {
    t.iter()
        .zip(y)
        .map(|(&t, &y)| (y - model.eval(t, p)).powi(2))
        .sum()
}

fn levenberg_marquardt(
    model: DecayModel,
    t: &[f64],
    y: &[f64],
    start: OscillationParams,
    options: &FitOptions,
) -> FitResult<Solved> {
    let mut p = start.to_vector();
    let mut lambda = 1e-3;
    let (mut jtj, mut jtr, mut current) = normal_equations(model, t, y, &start);

    for iteration in 1..=options.max_iterations {
        let mut damped = jtj;
        for i in 0..NUM_PARAMS {
            damped[(i, i)] += lambda * jtj[(i, i)].max(f64::MIN_POSITIVE);
        }
        let Some(delta) = damped.cholesky().map(|c| c.solve(&jtr)) else {
            lambda *= 10.0;
            continue;
        };

        let candidate = p + delta;
        let trial = OscillationParams::from_vector(&candidate);
        let trial_cost = cost(model, t, y, &trial);

        if trial_cost.is_finite() && trial_cost < current {
            let improvement = (current - trial_cost) / current.max(f64::MIN_POSITIVE);
            p = candidate;
            (jtj, jtr, current) = normal_equations(model, t, y, &trial);
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < options.tolerance {
                return Ok(Solved {
                    params: p,
                    cost: current,
                    iterations: iteration,
                });
            }
        } else {
            lambda *= 10.0;
            // no downhill step left at any damping: a minimum
            if lambda > 1e12 {
                return Ok(Solved {
                    params: p,
                    cost: current,
                    iterations: iteration,
                });
            }
        }
    }

    Err(FitError::NoConvergence {
        iterations: options.max_iterations,
    })
}
