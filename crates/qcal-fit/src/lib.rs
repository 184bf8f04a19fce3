//! qcal Fitting
//!
//! Nonlinear least-squares fits of decaying oscillations, the analysis core
//! of Ramsey-type calibration nodes.
//!
//! # Overview
//!
//! - [`DecayModel`]: exponential or Gaussian envelope on a cosine
//! - [`fit_oscillation_decay`]: spectral initial guess followed by
//!   Levenberg–Marquardt; returns [`OscillationFit`] with the covariance
//!
//! # Example
//!
//! ```
//! use qcal_fit::{DecayModel, OscillationParams, fit_oscillation_decay};
//!
//! let truth = OscillationParams { a: 0.4, f: 0.005, phi: 0.0, offset: 0.5, decay: 5e-4 };
//! let t: Vec<f64> = (4..500).map(|c| 4.0 * c as f64).collect();
//! let y = DecayModel::Exponential.curve(&t, &truth);
//!
//! let fit = fit_oscillation_decay(DecayModel::Exponential, &t, &y).unwrap();
//! assert!((fit.params.f - 0.005).abs() < 1e-5);
//! ```

pub mod error;
pub mod guess;
pub mod model;
pub mod solver;

pub use error::{FitError, FitResult};
pub use guess::initial_guess;
pub use model::{
    DecayModel, NUM_PARAMS, OscillationParams, PARAM_NAMES, oscillation_decay_exp,
    oscillation_decay_gaussian,
};
pub use solver::{FitOptions, OscillationFit, fit_oscillation_decay, fit_oscillation_decay_with};
